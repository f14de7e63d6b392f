//! # Core Domain
//!
//! Pure logic, no I/O.
//!
//! This module contains the fundamental types and operations:
//! - `Coordinates` - A position on the globe
//! - `PlaygroundId` / `Source` - Identifier with explicit provenance
//! - `PlaygroundRecord` - The normalized shape every source maps into
//! - `Distance` - Trait for measuring how far apart places are
//! - `Merger` - Concatenate, dedupe and distance-sort result lists
//! - `ratings` - Scores and their aggregation
//! - `photo` - Deterministic stock photos
//!
//! Everything here is deterministic and testable in isolation.

mod coordinates;
mod id;
mod record;
pub mod config;
pub mod distance;
pub mod merge;
pub mod photo;
pub mod ratings;

// Re-exports
pub use coordinates::Coordinates;
pub use id::{IdParseError, PlaygroundId, Source};
pub use record::{Photo, PhotoKind, PlaygroundRecord, RatingInfo};
