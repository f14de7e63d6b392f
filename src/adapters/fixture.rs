//! Synthetic playgrounds for running without a places credential.
//!
//! A small fixed catalog laid out around a center point. Proximity searches
//! place it around the requested center, scaled to the radius. Text searches
//! place it around the geocoded query when a geocoder is attached and fall
//! back to the fixed anchor when there is none or it finds nothing. Records
//! are tagged `Source::SyntheticFallback` so nobody mistakes them for real
//! listings.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::{Coordinates, PlaygroundId, PlaygroundRecord, Source};
use crate::ports::{Geocoder, PlaceSearch, ProviderResult};

const PROVIDER: &str = "fixture";

/// Name, offset as a fraction of the radius (north, east), amenities
const CATALOG: [(&str, f64, f64, &[&str]); 5] = [
    ("Sunshine Playground", 0.10, 0.05, &["swings", "slide", "sandpit"]),
    ("Maple Grove Park", -0.25, 0.30, &["climbing frame", "picnic tables"]),
    ("Riverside Adventure Play", 0.45, -0.20, &["zip line", "toilets"]),
    ("Little Acorns Tot Lot", -0.05, -0.60, &["toddler area", "shade"]),
    ("Hilltop Splash Pad", 0.80, 0.40, &["splash pad", "drinking water"]),
];

/// Deterministic synthetic places source
pub struct FixturePlaces {
    anchor: Coordinates,
    radius_m: u32,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl FixturePlaces {
    pub fn new(anchor: Coordinates, radius_m: u32) -> Self {
        Self {
            anchor,
            radius_m,
            geocoder: None,
        }
    }

    /// Center text searches on the geocoded query
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    async fn text_center(&self, query: &str, region: &str) -> Coordinates {
        let Some(geocoder) = &self.geocoder else {
            return self.anchor;
        };
        let country = Some(region).filter(|r| !r.is_empty());
        match geocoder.geocode(query, country).await {
            Ok(Some(center)) => center,
            Ok(None) => {
                debug!(query, "query not geocoded, using fixture anchor");
                self.anchor
            }
            Err(err) => {
                debug!(query, error = %err, "geocoder failed, using fixture anchor");
                self.anchor
            }
        }
    }

    /// Radius used to spread the catalog for text searches
    pub fn with_radius(mut self, radius_m: u32) -> Self {
        self.radius_m = radius_m;
        self
    }

    fn around(&self, center: &Coordinates, radius_m: u32) -> Vec<PlaygroundRecord> {
        let radius_deg_lat = radius_m as f64 / 111_195.0;
        let lon_scale = center.lat.to_radians().cos().abs().max(0.01);

        CATALOG
            .iter()
            .enumerate()
            .map(|(i, (name, north, east, amenities))| {
                let coordinates =
                    center.offset(north * radius_deg_lat, east * radius_deg_lat / lon_scale);
                PlaygroundRecord::new(
                    PlaygroundId::new(Source::SyntheticFallback, (i + 1).to_string()),
                    *name,
                    coordinates,
                )
                .with_amenities(amenities.iter().copied())
            })
            .collect()
    }
}

impl Default for FixturePlaces {
    /// Centered on Manhattan with the default search radius
    fn default() -> Self {
        Self {
            anchor: Coordinates {
                lat: 40.7831,
                lon: -73.9712,
            },
            radius_m: 5000,
            geocoder: None,
        }
    }
}

#[async_trait]
impl PlaceSearch for FixturePlaces {
    async fn text_search(&self, query: &str, region: &str) -> ProviderResult<Vec<PlaygroundRecord>> {
        let center = self.text_center(query, region).await;
        Ok(self.around(&center, self.radius_m))
    }

    async fn nearby(&self, center: &Coordinates, radius_m: u32) -> ProviderResult<Vec<PlaygroundRecord>> {
        Ok(self.around(center, radius_m))
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
