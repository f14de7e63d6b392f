//! # Coordinates
//!
//! A WGS84 position. The one piece of data every playground must have.
//!
//! A record without both components never reaches a result list, so the
//! constructors here are the single gate for that rule.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Create a coordinate pair, rejecting non-finite or out-of-range values
    ///
    /// # Example
    /// ```
    /// use playground_explorer::Coordinates;
    /// assert!(Coordinates::new(40.7, -74.0).is_some());
    /// assert!(Coordinates::new(f64::NAN, -74.0).is_none());
    /// assert!(Coordinates::new(91.0, 0.0).is_none());
    /// ```
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self { lat, lon })
    }

    /// Build from optional components, as they arrive from providers and rows
    ///
    /// Both components must be present and numeric.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) => Self::new(lat, lon),
            _ => None,
        }
    }

    /// Absolute per-axis difference in degrees
    pub fn delta(&self, other: &Coordinates) -> (f64, f64) {
        ((self.lat - other.lat).abs(), (self.lon - other.lon).abs())
    }

    /// Move by the given offsets in degrees, clamping into the valid range
    pub fn offset(&self, dlat: f64, dlon: f64) -> Self {
        Self {
            lat: (self.lat + dlat).clamp(-90.0, 90.0),
            lon: (self.lon + dlon).clamp(-180.0, 180.0),
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}
