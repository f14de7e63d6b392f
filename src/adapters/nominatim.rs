//! Nominatim geocoder.
//!
//! Resolves free text into the reference point used for distance sorting.
//! Nominatim encodes coordinates as strings.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::http::{forward, get_json, UpstreamResponse};
use crate::core::Coordinates;
use crate::ports::{Geocoder, ProviderError, ProviderResult};

const PROVIDER: &str = "nominatim";

/// Nominatim search client
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn params(query: &str, country: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
        ];
        if let Some(country) = country.filter(|c| !c.trim().is_empty()) {
            params.push(("countrycodes", country.trim().to_lowercase()));
        }
        params
    }

    /// Forward a search to the provider verbatim (proxy route)
    pub async fn forward(&self, query: &str, country: Option<&str>) -> ProviderResult<UpstreamResponse> {
        let url = format!("{}/search", self.base_url);
        forward(&self.client, PROVIDER, &url, &Self::params(query, country)).await
    }
}

/// First usable coordinate in a Nominatim result list
fn best_match(places: Vec<NominatimPlace>) -> ProviderResult<Option<Coordinates>> {
    let Some(first) = places.into_iter().next() else {
        return Ok(None);
    };

    let parse = |s: &str| {
        s.trim().parse::<f64>().map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: format!("bad coordinate {s:?}: {e}"),
        })
    };
    let coordinates = Coordinates::new(parse(&first.lat)?, parse(&first.lon)?);
    if let (Some(c), Some(name)) = (&coordinates, &first.display_name) {
        info!(provider = PROVIDER, %c, name = name.as_str(), "geocoded");
    }
    Ok(coordinates)
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str, country: Option<&str>) -> ProviderResult<Option<Coordinates>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let url = format!("{}/search", self.base_url);
        let places: Vec<NominatimPlace> =
            get_json(&self.client, PROVIDER, &url, &Self::params(query, country)).await?;
        best_match(places)
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
