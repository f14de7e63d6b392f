//! # Distance
//!
//! Trait and implementations for measuring how far apart two places are.
//!
//! Distance functions are pluggable. The search pipeline sorts with
//! [`Haversine`]; [`Equirectangular`] is a cheaper approximation that keeps
//! the same ordering over city-sized areas.

use super::Coordinates;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Trait for measuring distance between coordinates
///
/// Lower values mean closer. Implementations must be symmetric and return
/// zero for identical inputs.
pub trait Distance: Send + Sync {
    /// Distance between two coordinates in kilometers
    fn distance_km(&self, a: &Coordinates, b: &Coordinates) -> f64;

    /// Name of this distance function (for debugging/config)
    fn name(&self) -> &'static str;
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

/// Great-circle distance using the haversine formula
#[derive(Clone, Copy, Debug, Default)]
pub struct Haversine;

impl Distance for Haversine {
    fn distance_km(&self, a: &Coordinates, b: &Coordinates) -> f64 {
        haversine_km(a, b)
    }

    fn name(&self) -> &'static str {
        "haversine"
    }
}

/// Flat-earth approximation, accurate for short distances
#[derive(Clone, Copy, Debug, Default)]
pub struct Equirectangular;

impl Distance for Equirectangular {
    fn distance_km(&self, a: &Coordinates, b: &Coordinates) -> f64 {
        let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
        let x = (b.lon - a.lon).to_radians() * mean_lat.cos();
        let y = (b.lat - a.lat).to_radians();
        (x * x + y * y).sqrt() * EARTH_RADIUS_KM
    }

    fn name(&self) -> &'static str {
        "equirectangular"
    }
}

/// Haversine distance in kilometers
///
/// # Example
/// ```
/// use playground_explorer::Coordinates;
/// use playground_explorer::core::distance::haversine_km;
///
/// let paris = Coordinates::new(48.8566, 2.3522).unwrap();
/// let london = Coordinates::new(51.5074, -0.1278).unwrap();
/// let d = haversine_km(&paris, &london);
/// assert!((d - 343.5).abs() < 1.0);
/// ```
pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    // Rounding can push h a hair past 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}
