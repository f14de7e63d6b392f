//! # Merge
//!
//! Combining result lists from several sources into one.
//!
//! Three steps, always in this order:
//! 1. Concatenate, keeping each list's internal order. Callers pass the
//!    external-provider lists before the database list.
//! 2. Drop near-duplicates: same name (case-insensitive) and both coordinate
//!    deltas under the threshold. The first record seen wins, which favors
//!    the provider listed first (it usually has better photos).
//! 3. With a reference point, stable-sort ascending by distance. Without
//!    one, dedupe order is kept.

use std::sync::Arc;

use super::distance::{Distance, Haversine};
use super::{Coordinates, PlaygroundRecord};

/// Canonical duplicate threshold in degrees (roughly 100m)
pub const DEFAULT_DEDUPE_THRESHOLD_DEG: f64 = 0.001;

/// Merges, dedupes and orders playground records
#[derive(Clone)]
pub struct Merger {
    threshold_deg: f64,
    distance: Arc<dyn Distance>,
}

impl Merger {
    /// Create a merger with the given duplicate threshold in degrees
    pub fn new(threshold_deg: f64) -> Self {
        Self {
            threshold_deg,
            distance: Arc::new(Haversine),
        }
    }

    /// Set a custom distance function for the sort step
    pub fn with_distance<D: Distance + 'static>(mut self, distance: D) -> Self {
        self.distance = Arc::new(distance);
        self
    }

    pub fn threshold_deg(&self) -> f64 {
        self.threshold_deg
    }

    pub fn distance(&self) -> &dyn Distance {
        self.distance.as_ref()
    }

    /// Run all three steps over the given lists
    pub fn merge(
        &self,
        lists: Vec<Vec<PlaygroundRecord>>,
        reference: Option<&Coordinates>,
    ) -> Vec<PlaygroundRecord> {
        let combined: Vec<PlaygroundRecord> = lists.into_iter().flatten().collect();
        let mut merged = self.dedupe(combined);
        if let Some(reference) = reference {
            self.sort_by_distance(&mut merged, reference);
        }
        merged
    }

    /// Whether two records describe the same playground
    pub fn is_duplicate(&self, a: &PlaygroundRecord, b: &PlaygroundRecord) -> bool {
        let (dlat, dlon) = a.coordinates.delta(&b.coordinates);
        dlat < self.threshold_deg
            && dlon < self.threshold_deg
            && a.name.trim().to_lowercase() == b.name.trim().to_lowercase()
    }

    /// Drop records that duplicate an earlier one
    pub fn dedupe(&self, records: Vec<PlaygroundRecord>) -> Vec<PlaygroundRecord> {
        let mut kept: Vec<PlaygroundRecord> = Vec::with_capacity(records.len());
        for record in records {
            if !kept.iter().any(|k| self.is_duplicate(k, &record)) {
                kept.push(record);
            }
        }
        kept
    }

    /// Stable ascending sort by distance from `reference`
    pub fn sort_by_distance(&self, records: &mut [PlaygroundRecord], reference: &Coordinates) {
        records.sort_by(|a, b| {
            let da = self.distance.distance_km(reference, &a.coordinates);
            let db = self.distance.distance_km(reference, &b.coordinates);
            da.total_cmp(&db)
        });
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_THRESHOLD_DEG)
    }
}

impl std::fmt::Debug for Merger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger")
            .field("threshold_deg", &self.threshold_deg)
            .field("distance", &self.distance.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distance::{haversine_km, Equirectangular};
    use crate::core::{PlaygroundId, Source};

    fn rec(source: Source, raw: &str, name: &str, lat: f64, lon: f64) -> PlaygroundRecord {
        PlaygroundRecord::new(
            PlaygroundId::new(source, raw),
            name,
            Coordinates::new(lat, lon).unwrap(),
        )
    }

    fn ids(records: &[PlaygroundRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn test_near_duplicates_collapse_to_first() {
        let external = vec![rec(Source::ExternalPlaces, "a", "Central Playground", 40.0, -73.0)];
        let database = vec![rec(Source::UserDatabase, "1", "central playground", 40.0009, -73.0009)];

        let merged = Merger::default().merge(vec![external, database], None);
        assert_eq!(ids(&merged), vec!["google-a"]);
    }

    #[test]
    fn test_same_name_far_apart_both_kept() {
        let external = vec![rec(Source::ExternalPlaces, "a", "Central Playground", 40.0, -73.0)];
        let database = vec![rec(Source::UserDatabase, "1", "Central Playground", 40.01, -73.0)];

        let merged = Merger::default().merge(vec![external, database], None);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_different_names_same_spot_both_kept() {
        let list = vec![
            rec(Source::MapData, "node-1", "Swing Park", 40.0, -73.0),
            rec(Source::MapData, "node-2", "Slide Park", 40.0, -73.0),
        ];
        assert_eq!(Merger::default().merge(vec![list], None).len(), 2);
    }

    #[test]
    fn test_sorted_by_distance_from_reference() {
        let reference = Coordinates::new(0.0, 0.0).unwrap();
        // One degree of latitude is ~111.19 km, so pick offsets for 1, 5 and 2 km
        let km = |d: f64| d / 111.195;
        let list = vec![
            rec(Source::ExternalPlaces, "one", "One", km(1.0), 0.0),
            rec(Source::ExternalPlaces, "five", "Five", km(5.0), 0.0),
            rec(Source::ExternalPlaces, "two", "Two", km(2.0), 0.0),
        ];

        let merged = Merger::default().merge(vec![list], Some(&reference));
        assert_eq!(ids(&merged), vec!["google-one", "google-two", "google-five"]);
        assert!((haversine_km(&reference, &merged[0].coordinates) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_no_reference_keeps_dedupe_order() {
        let list = vec![
            rec(Source::ExternalPlaces, "far", "Far", 10.0, 10.0),
            rec(Source::ExternalPlaces, "near", "Near", 0.1, 0.1),
        ];
        let merged = Merger::default().merge(vec![list], None);
        assert_eq!(ids(&merged), vec!["google-far", "google-near"]);
    }

    #[test]
    fn test_empty_inputs() {
        let reference = Coordinates::new(1.0, 1.0).unwrap();
        assert!(Merger::default().merge(vec![], Some(&reference)).is_empty());
        assert!(Merger::default().merge(vec![vec![], vec![]], None).is_empty());
    }

    #[test]
    fn test_concatenation_order_external_first() {
        let external = vec![rec(Source::ExternalPlaces, "x", "X", 1.0, 1.0)];
        let osm = vec![rec(Source::MapData, "node-9", "Y", 2.0, 2.0)];
        let database = vec![rec(Source::UserDatabase, "7", "Z", 3.0, 3.0)];
        let merged = Merger::default().merge(vec![external, osm, database], None);
        assert_eq!(ids(&merged), vec!["google-x", "osm-node-9", "db-7"]);
    }

    #[test]
    fn test_custom_threshold() {
        let list = vec![
            rec(Source::ExternalPlaces, "a", "Park", 40.0, -73.0),
            rec(Source::UserDatabase, "1", "Park", 40.0009, -73.0),
        ];
        assert_eq!(Merger::new(0.0005).merge(vec![list], None).len(), 2);
    }

    #[test]
    fn test_custom_distance_same_order() {
        let reference = Coordinates::new(52.5, 13.4).unwrap();
        let list = vec![
            rec(Source::ExternalPlaces, "b", "B", 52.52, 13.4),
            rec(Source::ExternalPlaces, "a", "A", 52.51, 13.4),
        ];
        let merger = Merger::default().with_distance(Equirectangular);
        assert_eq!(merger.distance().name(), "equirectangular");
        let merged = merger.merge(vec![list], Some(&reference));
        assert_eq!(ids(&merged), vec!["google-a", "google-b"]);
    }
}
