//! # Search Pipeline
//!
//! Fans a query out to every places source, the geocoder and the playground
//! repository at once, then merges what came back.
//!
//! ```text
//!   places sources ─┐
//!   geocoder ───────┼─> merge (dedupe, distance sort) ─> stock photos ─> community ratings
//!   repository ─────┘
//! ```
//!
//! A failing source contributes nothing and the rest still answer. Nothing
//! here returns an error.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::adapters::fixture::FixturePlaces;
use crate::adapters::google::GooglePlacesClient;
use crate::adapters::nominatim::NominatimGeocoder;
use crate::adapters::overpass::OverpassClient;
use crate::adapters::sqlite::SqliteStore;
use crate::core::config::Config;
use crate::core::merge::Merger;
use crate::core::photo::{attach_stock_photos, DEFAULT_KEYWORD};
use crate::core::{Coordinates, PlaygroundRecord};
use crate::ports::{Geocoder, PlaceSearch, PlaygroundRepository, RatingStore, StoreError};

/// A search as the user asked it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free text: a place name, a city, a playground name
    pub query: String,
    /// Device location; switches the places sources to proximity mode
    pub near: Option<Coordinates>,
    /// Proximity radius; the pipeline default when absent
    pub radius_m: Option<u32>,
}

impl SearchRequest {
    /// Text search
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Proximity search around a location
    pub fn near(center: Coordinates) -> Self {
        Self {
            near: Some(center),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_radius(mut self, radius_m: u32) -> Self {
        self.radius_m = Some(radius_m);
        self
    }
}

/// Merged results and the point they are sorted from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub reference: Option<Coordinates>,
    pub results: Vec<PlaygroundRecord>,
}

/// Multi-source playground search
pub struct SearchPipeline {
    sources: Vec<Arc<dyn PlaceSearch>>,
    repository: Arc<dyn PlaygroundRepository>,
    geocoder: Arc<dyn Geocoder>,
    ratings: Option<Arc<dyn RatingStore>>,
    merger: Merger,
    region: String,
    radius_m: u32,
    row_limit: usize,
    photo_keyword: String,
}

impl SearchPipeline {
    /// Create a pipeline; `sources` are merged in the order given, ahead of the repository
    pub fn new(
        sources: Vec<Arc<dyn PlaceSearch>>,
        repository: Arc<dyn PlaygroundRepository>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            sources,
            repository,
            geocoder,
            ratings: None,
            merger: Merger::default(),
            region: defaults.region,
            radius_m: defaults.search_radius_m,
            row_limit: defaults.row_limit,
            photo_keyword: DEFAULT_KEYWORD.to_string(),
        }
    }

    /// Wire the stock providers from configuration
    ///
    /// The places API comes first when a key is configured; otherwise the
    /// synthetic source takes its slot if fixture fallback is enabled, laid
    /// out around the geocoded query for text searches. Map data always
    /// follows. `store` backs both the repository and community ratings.
    pub fn from_config(config: &Config, client: Client, store: SqliteStore) -> Self {
        let mut sources: Vec<Arc<dyn PlaceSearch>> = Vec::new();
        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(client.clone(), &config.geocoder_url));

        let google = GooglePlacesClient::new(client.clone(), &config.places_url, config.places_api_key.clone())
            .with_photo_proxy("/api/places/photo");
        if google.is_configured() {
            sources.push(Arc::new(google));
        } else if config.fixture_fallback {
            info!("no places credential, serving synthetic playgrounds");
            sources.push(Arc::new(
                FixturePlaces::default()
                    .with_radius(config.search_radius_m)
                    .with_geocoder(geocoder.clone()),
            ));
        } else {
            warn!("no places credential and fixture fallback disabled");
        }
        sources.push(Arc::new(OverpassClient::new(client.clone(), &config.overpass_url)));

        let store = Arc::new(store);
        Self::new(sources, store.clone(), geocoder)
        .with_rating_store(store)
        .with_merger(Merger::new(config.dedupe_threshold_deg))
        .with_region(&config.region)
        .with_radius(config.search_radius_m)
        .with_row_limit(config.row_limit)
    }

    /// Attach community ratings from this store to every result
    pub fn with_rating_store(mut self, ratings: Arc<dyn RatingStore>) -> Self {
        self.ratings = Some(ratings);
        self
    }

    pub fn with_merger(mut self, merger: Merger) -> Self {
        self.merger = merger;
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub fn with_radius(mut self, radius_m: u32) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn with_photo_keyword(mut self, keyword: &str) -> Self {
        self.photo_keyword = keyword.to_string();
        self
    }

    /// Names of the places sources, in merge order
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run a search
    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        let query = request.query.trim().to_string();
        let radius_m = request.radius_m.unwrap_or(self.radius_m);

        let places = self.query_sources(&query, request.near, radius_m);
        let geocode = async {
            match request.near {
                Some(near) => Some(near),
                None => self.geocode(&query).await,
            }
        };
        let rows = self.query_repository(&query, request.near.as_ref());

        let (place_lists, reference, rows) = tokio::join!(places, geocode, rows);

        let mut lists = place_lists;
        lists.push(rows);
        let mut results = self.merger.merge(lists, reference.as_ref());
        attach_stock_photos(&mut results, &self.photo_keyword);
        self.attach_community_ratings(&mut results).await;

        info!(
            query = query.as_str(),
            reference = ?reference,
            count = results.len(),
            "search completed"
        );
        SearchResponse { reference, results }
    }

    /// Proximity search around a point
    pub async fn nearby(&self, center: Coordinates, radius_m: Option<u32>) -> SearchResponse {
        self.search(SearchRequest {
            query: String::new(),
            near: Some(center),
            radius_m,
        })
        .await
    }

    /// Query every places source concurrently; each list keeps its source's slot
    async fn query_sources(&self, query: &str, near: Option<Coordinates>, radius_m: u32) -> Vec<Vec<PlaygroundRecord>> {
        let mut tasks = JoinSet::new();
        for (slot, source) in self.sources.iter().enumerate() {
            let source = source.clone();
            let query = query.to_string();
            let region = self.region.clone();
            tasks.spawn(async move {
                let result = match near {
                    Some(center) => source.nearby(&center, radius_m).await,
                    None if query.is_empty() => Ok(Vec::new()),
                    None => source.text_search(&query, &region).await,
                };
                (slot, source.name(), result)
            });
        }

        let mut lists = vec![Vec::new(); self.sources.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, name, Ok(records))) => {
                    debug!(source = name, count = records.len(), "source answered");
                    lists[slot] = records;
                }
                Ok((_, name, Err(e))) => {
                    warn!(source = name, error = %e, "places source failed, continuing without it");
                }
                Err(e) => {
                    warn!(error = %e, "places source task aborted");
                }
            }
        }
        lists
    }

    async fn geocode(&self, query: &str) -> Option<Coordinates> {
        if query.is_empty() {
            return None;
        }
        match self.geocoder.geocode(query, Some(&self.region)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(geocoder = self.geocoder.name(), error = %e, "geocoding failed, results stay unsorted");
                None
            }
        }
    }

    async fn query_repository(&self, query: &str, anchor: Option<&Coordinates>) -> Vec<PlaygroundRecord> {
        match self.repository.search(query, self.row_limit, anchor).await {
            Ok(rows) => rows,
            Err(StoreError::PermissionDenied(e)) => {
                warn!(error = e.as_str(), "playground rows not readable, continuing without them");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "playground query failed, continuing without it");
                Vec::new()
            }
        }
    }

    async fn attach_community_ratings(&self, records: &mut [PlaygroundRecord]) {
        let Some(ratings) = &self.ratings else {
            return;
        };
        if records.is_empty() {
            return;
        }

        let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        let summaries = match ratings.summaries(&ids).await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(error = %e, "community ratings unavailable");
                return;
            }
        };
        for record in records.iter_mut() {
            if let Some(summary) = summaries.get(&record.id) {
                record.rating.community_average = Some(summary.overall);
                record.rating.community_count = Some(summary.total);
            }
        }
    }
}
