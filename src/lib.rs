//! # Playground Explorer
//!
//! Find playgrounds near you from several sources at once, then rate them,
//! favorite them and keep private photos of them.
//!
//! ## Overview
//!
//! A search fans out concurrently to a places API, OpenStreetMap map data and
//! the database of user-submitted playgrounds. The answers are normalized
//! into one record shape, near-duplicates are dropped (same name, within
//! about 100m) and the rest is sorted by great-circle distance from the
//! reference point: the device location when known, else the geocoded query.
//!
//! ## Key Features
//!
//! - **Fail-soft search**: a provider that errors contributes an empty list
//! - **Explicit provenance**: every id carries its [`Source`]
//! - **Community ratings**: per-category scores, one per user and category
//! - **Thin proxies**: credential-injecting pass-through routes for the web client
//!
//! ## Layout
//!
//! - [`core`]: pure domain logic (distance, merge, ratings, config)
//! - [`ports`]: trait contracts for providers and stores
//! - [`adapters`]: HTTP providers, SQLite, local photo storage, fixtures
//! - [`search`]: the multi-source pipeline
//! - [`server`]: the axum HTTP surface
//!
//! ## Usage
//!
//! ```rust,ignore
//! use playground_explorer::{AppState, Config, SearchRequest};
//!
//! let state = AppState::from_config(Config::from_env()?)?;
//! let found = state.pipeline.search(SearchRequest::text("Hyde Park")).await;
//! for record in &found.results {
//!     println!("{} ({})", record.name, record.source());
//! }
//! ```

pub mod adapters;
pub mod core;
pub mod ports;
pub mod search;
pub mod server;

// Re-exports for convenience
pub use core::config::Config;
pub use core::{Coordinates, PlaygroundId, PlaygroundRecord, Source};
pub use search::{SearchPipeline, SearchRequest, SearchResponse};
pub use server::{AppError, AppState};
