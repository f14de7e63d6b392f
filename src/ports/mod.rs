//! # Ports
//!
//! What the search pipeline and the HTTP layer need from the outside world,
//! as traits:
//! - `PlaceSearch` / `Geocoder` - providers reached over the network
//! - `PlaygroundRepository`, `FavoriteStore`, `RatingStore`, `PhotoStore` - persisted user data
//! - `Session` / `SessionContext` - who is asking
//!
//! Adapters implement these; nothing in `core` depends on them.

mod search;
mod session;
mod store;

// Re-export traits
pub use search::{Geocoder, PlaceSearch};
pub use store::{FavoriteStore, PhotoStore, PlaygroundRepository, RatingStore};

// Re-export types from search
pub use search::{ProviderError, ProviderResult};

// Re-export types from session
pub use session::{Session, SessionContext, Subscription};

// Re-export types from store
pub use store::{NewPlayground, StoreError, StoreResult, TopRated, UserPhoto};
