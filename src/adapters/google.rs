//! Google Places Integration
//!
//! Client for the Places web service, providing:
//! - Text search scoped to a country region
//! - Nearby search over parks matching "playground"
//! - Photo reference resolution into displayable URLs
//! - Raw forwarding for the credential-injecting proxy routes
//!
//! # Example
//! ```rust,ignore
//! let client = GooglePlacesClient::new(http, "https://maps.googleapis.com/maps/api/place", Some(key));
//! let parks = client.nearby(&center, 5000).await?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::http::{forward, get_json, UpstreamResponse};
use crate::core::{Coordinates, Photo, PhotoKind, PlaygroundId, PlaygroundRecord, Source};
use crate::ports::{PlaceSearch, ProviderError, ProviderResult};

const PROVIDER: &str = "google-places";

/// Origin used only to encode relative proxy URLs
const PLACEHOLDER_ORIGIN: &str = "http://localhost/";

/// Default photo width requested from the provider
pub const DEFAULT_PHOTO_WIDTH: u32 = 400;

/// Place types too generic to be shown as amenities
const GENERIC_TYPES: [&str; 3] = ["point_of_interest", "establishment", "tourist_attraction"];

/// Places API client
pub struct GooglePlacesClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    photo_proxy: Option<String>,
}

/// Search response from the Places API
#[derive(Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct PlaceResult {
    place_id: String,
    name: String,
    geometry: Option<Geometry>,
    formatted_address: Option<String>,
    vicinity: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    photos: Vec<PlacePhoto>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Deserialize)]
struct PlacePhoto {
    photo_reference: String,
    #[serde(default)]
    html_attributions: Vec<String>,
}

impl GooglePlacesClient {
    /// Create a new Places client
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `base_url` - Places API root (e.g., "https://maps.googleapis.com/maps/api/place")
    /// * `api_key` - Credential; every call fails with `MissingCredential` without it
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            photo_proxy: None,
        }
    }

    /// Route photo URLs through our own proxy instead of embedding the key
    pub fn with_photo_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.photo_proxy = Some(proxy_url.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential { provider: PROVIDER })
    }

    /// Displayable URL for a photo reference
    pub fn photo_url(&self, reference: &str, max_width: u32) -> Option<String> {
        let (base, params) = match &self.photo_proxy {
            Some(proxy) => (
                proxy.clone(),
                vec![("reference", reference.to_string()), ("maxwidth", max_width.to_string())],
            ),
            None => (
                format!("{}/photo", self.base_url),
                vec![
                    ("maxwidth", max_width.to_string()),
                    ("photo_reference", reference.to_string()),
                    ("key", self.api_key.clone()?),
                ],
            ),
        };

        if let Ok(url) = reqwest::Url::parse_with_params(&base, &params) {
            return Some(url.into());
        }

        // Relative proxy path: resolve against a placeholder origin, keep path and query
        let mut url = reqwest::Url::parse(PLACEHOLDER_ORIGIN).ok()?.join(&base).ok()?;
        url.query_pairs_mut().extend_pairs(&params);
        Some(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
    }

    /// Forward a Places endpoint with the key injected (proxy routes)
    ///
    /// `endpoint` is the path under the API root, e.g. "textsearch/json".
    pub async fn forward(&self, endpoint: &str, params: &[(&str, String)]) -> ProviderResult<UpstreamResponse> {
        let key = self.key()?;
        let mut params = params.to_vec();
        params.push(("key", key.to_string()));
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        forward(&self.client, PROVIDER, &url, &params).await
    }

    async fn search(&self, endpoint: &str, params: Vec<(&str, String)>) -> ProviderResult<Vec<PlaygroundRecord>> {
        let key = self.key()?;
        let mut params = params;
        params.push(("key", key.to_string()));

        let url = format!("{}/{}", self.base_url, endpoint);
        let response: SearchResponse = get_json(&self.client, PROVIDER, &url, &params).await?;
        let records = self.normalize(response)?;
        info!(provider = PROVIDER, endpoint, count = records.len(), "places search completed");
        Ok(records)
    }

    fn normalize(&self, response: SearchResponse) -> ProviderResult<Vec<PlaygroundRecord>> {
        match response.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Ok(Vec::new()),
            other => {
                let status = match response.error_message {
                    Some(msg) => format!("{other}: {msg}"),
                    None => other.to_string(),
                };
                return Err(ProviderError::Rejected {
                    provider: PROVIDER,
                    status,
                });
            }
        }

        Ok(response
            .results
            .into_iter()
            .filter_map(|place| self.to_record(place))
            .collect())
    }

    fn to_record(&self, place: PlaceResult) -> Option<PlaygroundRecord> {
        let location = place.geometry?.location;
        let Some(coordinates) = Coordinates::from_parts(location.lat, location.lng) else {
            debug!(place_id = %place.place_id, "dropping place without coordinates");
            return None;
        };

        let amenities = place
            .types
            .iter()
            .filter(|t| !GENERIC_TYPES.contains(&t.as_str()))
            .map(|t| t.replace('_', " "));

        let mut record = PlaygroundRecord::new(
            PlaygroundId::new(Source::ExternalPlaces, place.place_id),
            place.name,
            coordinates,
        )
        .with_amenities(amenities);

        let city = match (&place.formatted_address, &place.vicinity) {
            (Some(address), _) => city_from_formatted_address(address),
            (None, Some(vicinity)) => city_from_vicinity(vicinity),
            (None, None) => None,
        };
        record.address = place.formatted_address.or(place.vicinity);
        record.city = city;
        record.rating.provider_average = place.rating;
        record.rating.provider_count = place.user_ratings_total;

        if let Some(photo) = place.photos.into_iter().next() {
            if let Some(url) = self.photo_url(&photo.photo_reference, DEFAULT_PHOTO_WIDTH) {
                record.photo = Some(Photo {
                    url,
                    attribution: photo.html_attributions.into_iter().next(),
                    kind: PhotoKind::Provider,
                });
            }
        }

        Some(record)
    }
}

#[async_trait]
impl PlaceSearch for GooglePlacesClient {
    async fn text_search(&self, query: &str, region: &str) -> ProviderResult<Vec<PlaygroundRecord>> {
        let query = if query.to_lowercase().contains("playground") {
            query.to_string()
        } else {
            format!("playground {query}")
        };
        self.search(
            "textsearch/json",
            vec![("query", query), ("region", region.to_lowercase())],
        )
        .await
    }

    async fn nearby(&self, center: &Coordinates, radius_m: u32) -> ProviderResult<Vec<PlaygroundRecord>> {
        self.search(
            "nearbysearch/json",
            vec![
                ("location", format!("{},{}", center.lat, center.lon)),
                ("radius", radius_m.to_string()),
                ("type", "park".to_string()),
                ("keyword", "playground".to_string()),
            ],
        )
        .await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

/// "123 Main St, Springfield, IL 62701, USA" -> "Springfield"
fn city_from_formatted_address(address: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    match parts.len() {
        0 | 1 => None,
        2 => Some(parts[0].to_string()),
        n => Some(parts[n - 3].to_string()),
    }
}

/// "123 Main St, Springfield" -> "Springfield"
fn city_from_vicinity(vicinity: &str) -> Option<String> {
    vicinity
        .rsplit(',')
        .next()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://maps.googleapis.com/maps/api/place";

    fn client(key: Option<&str>) -> GooglePlacesClient {
        GooglePlacesClient::new(Client::new(), BASE, key.map(String::from))
    }

    fn parse(body: &str) -> SearchResponse {
        serde_json::from_str(body).unwrap()
    }

    const SAMPLE: &str = r#"{
        "status": "OK",
        "results": [
            {
                "place_id": "ChIJ1",
                "name": "Maple Playground",
                "geometry": {"location": {"lat": 40.1, "lng": -74.2}},
                "formatted_address": "1 Maple Ave, Springfield, NJ 07081, USA",
                "rating": 4.6,
                "user_ratings_total": 120,
                "types": ["park", "point_of_interest", "establishment"],
                "photos": [{"photo_reference": "ref-1", "html_attributions": ["<a>Jane</a>"]}]
            },
            {
                "place_id": "ChIJ2",
                "name": "Nowhere Park",
                "geometry": {"location": {"lat": null, "lng": -74.0}}
            },
            {
                "place_id": "ChIJ3",
                "name": "Vicinity Park",
                "geometry": {"location": {"lat": 40.2, "lng": -74.3}},
                "vicinity": "5 Elm St, Summit"
            }
        ]
    }"#;

    #[test]
    fn test_client_creation() {
        let c = client(Some("k"));
        assert!(c.is_configured());
        assert_eq!(c.name(), "google-places");
        assert!(!client(Some("")).is_configured());
        assert!(!client(None).is_configured());
    }

    #[test]
    fn test_normalize_maps_fields() {
        let records = client(Some("k")).normalize(parse(SAMPLE)).unwrap();
        assert_eq!(records.len(), 2);

        let maple = &records[0];
        assert_eq!(maple.id.to_string(), "google-ChIJ1");
        assert_eq!(maple.source(), Source::ExternalPlaces);
        assert_eq!(maple.coordinates, Coordinates::new(40.1, -74.2).unwrap());
        assert_eq!(maple.city.as_deref(), Some("Springfield"));
        assert_eq!(maple.rating.provider_average, Some(4.6));
        assert_eq!(maple.rating.provider_count, Some(120));
        assert!(maple.amenities.contains("park"));
        assert!(!maple.amenities.contains("establishment"));

        let photo = maple.photo.as_ref().unwrap();
        assert_eq!(photo.kind, PhotoKind::Provider);
        assert!(photo.url.contains("photo_reference=ref-1"));
        assert_eq!(photo.attribution.as_deref(), Some("<a>Jane</a>"));

        let vicinity = &records[1];
        assert_eq!(vicinity.address.as_deref(), Some("5 Elm St, Summit"));
        assert_eq!(vicinity.city.as_deref(), Some("Summit"));
        assert!(vicinity.photo.is_none());
    }

    #[test]
    fn test_zero_results_is_empty() {
        let records = client(Some("k"))
            .normalize(parse(r#"{"status": "ZERO_RESULTS", "results": []}"#))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_denied_is_error() {
        let err = client(Some("k"))
            .normalize(parse(
                r#"{"status": "REQUEST_DENIED", "error_message": "bad key", "results": []}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { ref status, .. } if status == "REQUEST_DENIED: bad key"));
    }

    #[test]
    fn test_photo_url_through_proxy() {
        let c = client(None).with_photo_proxy("/api/places/photo");
        let url = c.photo_url("abc/def", 400).unwrap();
        assert_eq!(url, "/api/places/photo?reference=abc%2Fdef&maxwidth=400");
    }

    #[test]
    fn test_photo_url_through_proxy_encodes_separators() {
        let c = client(None).with_photo_proxy("/api/places/photo");
        let url = c.photo_url("a&b=c d", 200).unwrap();
        assert_eq!(url, "/api/places/photo?reference=a%26b%3Dc+d&maxwidth=200");

        let absolute = client(None).with_photo_proxy("https://example.com/photo");
        let url = absolute.photo_url("xyz", 100).unwrap();
        assert_eq!(url, "https://example.com/photo?reference=xyz&maxwidth=100");
    }

    #[test]
    fn test_photo_url_needs_key_without_proxy() {
        assert!(client(None).photo_url("abc", 400).is_none());
        let url = client(Some("k")).photo_url("abc", 300).unwrap();
        assert!(url.starts_with("https://maps.googleapis.com/maps/api/place/photo?"));
        assert!(url.contains("maxwidth=300"));
        assert!(url.contains("key=k"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let c = client(None);
        let err = c.text_search("Boston", "us").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
        let err = c.forward("textsearch/json", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
    }

    #[test]
    fn test_city_parsing() {
        assert_eq!(city_from_formatted_address("Springfield, USA").as_deref(), Some("Springfield"));
        assert_eq!(city_from_formatted_address("USA"), None);
        assert_eq!(
            city_from_formatted_address("2 Oak Rd, Portland, OR 97201, USA").as_deref(),
            Some("Portland")
        );
        assert_eq!(city_from_vicinity("Main St, Dover").as_deref(), Some("Dover"));
    }
}
