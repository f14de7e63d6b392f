//! # Store Ports
//!
//! Contracts for persisted user data: submitted playgrounds, favorites,
//! ratings and private photos.
//!
//! Every mutation takes the caller's [`Session`]; rows are owned by the user
//! id that created them and only that user may change them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::session::Session;
use crate::core::ratings::{aggregate, RatingAggregate, RatingEntry, Score};
use crate::core::{Coordinates, PlaygroundId, PlaygroundRecord};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the data store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Mutation attempted without a signed-in user
    #[error("sign in required")]
    Unauthorized,

    /// The backend refused access to the rows
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Caller supplied unusable input
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Any other backend failure
    #[error("query failed: {0}")]
    Query(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A listing submitted by a user
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPlayground {
    pub name: String,
    /// Free-text location (street, neighborhood)
    pub location: Option<String>,
    pub city: Option<String>,
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub description: Option<String>,
}

/// A playground's place in the top-rated list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopRated {
    pub playground_id: PlaygroundId,
    /// Known for user-submitted playgrounds only
    pub name: Option<String>,
    pub overall: f64,
    pub total: u32,
}

/// A photo uploaded by a user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserPhoto {
    pub id: i64,
    pub user_id: String,
    pub playground_id: PlaygroundId,
    pub url: String,
    /// Unix seconds
    pub created_at: i64,
}

/// Trait for the user-submitted playground table
#[async_trait]
pub trait PlaygroundRepository: Send + Sync {
    /// Case-insensitive substring match on name or location, at most `limit` rows
    ///
    /// Rows without coordinates are placed near `anchor` when one is given,
    /// and dropped otherwise.
    async fn search(
        &self,
        filter: &str,
        limit: usize,
        anchor: Option<&Coordinates>,
    ) -> StoreResult<Vec<PlaygroundRecord>>;

    /// Fetch one user-submitted playground
    async fn get(&self, id: &PlaygroundId) -> StoreResult<Option<PlaygroundRecord>>;

    /// Add a listing owned by the session's user; returns its id
    async fn insert(&self, session: &Session, playground: NewPlayground) -> StoreResult<PlaygroundId>;
}

/// Trait for per-user favorites
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Flip the favorite flag; returns the new state
    async fn toggle_favorite(&self, session: &Session, id: &PlaygroundId) -> StoreResult<bool>;

    async fn is_favorite(&self, session: &Session, id: &PlaygroundId) -> StoreResult<bool>;

    /// All favorites of the session's user, most recent first
    async fn favorites(&self, session: &Session) -> StoreResult<Vec<PlaygroundId>>;
}

/// Trait for rating rows
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Upsert one entry per category; returns the number of entries written
    async fn submit_ratings(
        &self,
        session: &Session,
        id: &PlaygroundId,
        scores: &BTreeMap<String, Score>,
        review: Option<&str>,
    ) -> StoreResult<usize>;

    /// All entries for a playground
    async fn ratings_for(&self, id: &PlaygroundId) -> StoreResult<Vec<RatingEntry>>;

    /// Per-category means, overall mean and submission count
    async fn aggregate_ratings(&self, id: &PlaygroundId) -> StoreResult<RatingAggregate> {
        Ok(aggregate(&self.ratings_for(id).await?))
    }

    /// Aggregates for several playgrounds; unrated ones are omitted
    async fn summaries(&self, ids: &[PlaygroundId]) -> StoreResult<BTreeMap<PlaygroundId, RatingAggregate>> {
        let mut out = BTreeMap::new();
        for id in ids {
            let agg = self.aggregate_ratings(id).await?;
            if agg.total > 0 {
                out.insert(id.clone(), agg);
            }
        }
        Ok(out)
    }

    /// Best-rated playgrounds, highest overall first
    async fn top_rated(&self, limit: usize) -> StoreResult<Vec<TopRated>>;
}

/// Trait for private photo uploads
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Store the bytes and return the photo with its public URL
    async fn upload(
        &self,
        session: &Session,
        id: &PlaygroundId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> StoreResult<UserPhoto>;

    /// The session user's photos of a playground
    async fn photos_for(&self, session: &Session, id: &PlaygroundId) -> StoreResult<Vec<UserPhoto>>;
}
