//! # Record
//!
//! The normalized playground shape every adapter produces.
//!
//! Records are transient: built fresh for each search, merged, rendered and
//! dropped. Only ratings, favorites and photos are ever persisted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Coordinates, PlaygroundId, Source};

/// Where a record's photo came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhotoKind {
    /// Supplied by the places provider
    Provider,
    /// Generic stock image, decorative only
    Stock,
    /// Uploaded by a user
    Uploaded,
}

/// A displayable photo
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub url: String,
    pub attribution: Option<String>,
    pub kind: PhotoKind,
}

/// Rating figures from the provider and from our own users
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingInfo {
    pub provider_average: Option<f64>,
    pub provider_count: Option<u32>,
    pub community_average: Option<f64>,
    pub community_count: Option<u32>,
}

/// A playground in the common in-memory schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundRecord {
    pub id: PlaygroundId,
    pub name: String,
    pub coordinates: Coordinates,
    pub address: Option<String>,
    pub city: Option<String>,
    pub amenities: BTreeSet<String>,
    pub rating: RatingInfo,
    pub photo: Option<Photo>,
    /// Coordinates were synthesized, not reported by the source
    #[serde(default)]
    pub approximate_location: bool,
}

impl PlaygroundRecord {
    /// Create a bare record; optional fields start empty
    pub fn new(id: PlaygroundId, name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            id,
            name: name.into(),
            coordinates,
            address: None,
            city: None,
            amenities: BTreeSet::new(),
            rating: RatingInfo::default(),
            photo: None,
            approximate_location: false,
        }
    }

    pub fn source(&self) -> Source {
        self.id.source()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_amenities<I, S>(mut self, amenities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.amenities.extend(
            amenities
                .into_iter()
                .map(|a| Into::<String>::into(a).trim().to_lowercase())
                .filter(|a| !a.is_empty()),
        );
        self
    }

    pub fn with_photo(mut self, photo: Photo) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    /// Best available average: community ratings win over the provider's
    pub fn average_rating(&self) -> Option<f64> {
        match self.rating.community_count {
            Some(n) if n > 0 => self.rating.community_average,
            _ => self.rating.provider_average,
        }
    }
}
