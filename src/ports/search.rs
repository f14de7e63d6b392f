//! # Search Ports
//!
//! Contracts for the outside systems that find playgrounds and resolve
//! place names to coordinates.
//!
//! Implemented by the HTTP adapters (places API, map data, geocoder) and by
//! the synthetic fixture source. Errors are returned, never swallowed, at
//! this level; the search pipeline decides to degrade.

use async_trait::async_trait;

use crate::core::{Coordinates, PlaygroundRecord};

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by external providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No API credential configured
    #[error("{provider} is not configured: missing API credential")]
    MissingCredential { provider: &'static str },

    /// Network-level failure (connect, timeout, TLS)
    #[error("cannot reach {provider}: {message}")]
    Connection { provider: &'static str, message: String },

    /// Non-success HTTP status
    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The provider answered but refused the request in its payload
    #[error("{provider} rejected the request: {status}")]
    Rejected { provider: &'static str, status: String },

    /// Payload could not be decoded
    #[error("invalid {provider} response: {message}")]
    Decode { provider: &'static str, message: String },
}

impl ProviderError {
    /// Map a reqwest error onto the provider taxonomy
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode {
                provider,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            ProviderError::Status {
                provider,
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ProviderError::Connection {
                provider,
                message: err.to_string(),
            }
        }
    }

    /// HTTP status to relay at a proxy boundary
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for finding playgrounds at a provider
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Free-text search scoped to a country region
    async fn text_search(&self, query: &str, region: &str) -> ProviderResult<Vec<PlaygroundRecord>>;

    /// Playgrounds and parks within `radius_m` meters of `center`
    async fn nearby(&self, center: &Coordinates, radius_m: u32) -> ProviderResult<Vec<PlaygroundRecord>>;

    /// Provider name (for logging)
    fn name(&self) -> &'static str;
}

/// Trait for resolving free text into a coordinate
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best-match coordinate for `query`, optionally limited to a country
    ///
    /// `Ok(None)` means the provider answered but found nothing.
    async fn geocode(&self, query: &str, country: Option<&str>) -> ProviderResult<Option<Coordinates>>;

    /// Provider name (for logging)
    fn name(&self) -> &'static str;
}
