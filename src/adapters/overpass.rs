//! OpenStreetMap map data via the Overpass API.
//!
//! Playground and park features come back as nodes (with `lat`/`lon`) or as
//! ways and relations (with a computed `center`). Equipment lives in
//! `playground:*` tags and in the `playground` tag of individual devices.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::{Coordinates, PlaygroundId, PlaygroundRecord, Source};
use crate::ports::{PlaceSearch, ProviderError, ProviderResult};

const PROVIDER: &str = "overpass";

/// Query timeout sent to the interpreter, in seconds
const QUERY_TIMEOUT_SECS: u32 = 25;

/// Cap for name searches over a whole country
const TEXT_RESULT_LIMIT: u32 = 50;

/// Tags that map straight onto an amenity label when set to "yes"
const AMENITY_TAGS: [(&str, &str); 5] = [
    ("toilets", "toilets"),
    ("drinking_water", "drinking water"),
    ("wheelchair", "wheelchair accessible"),
    ("lit", "lit"),
    ("covered", "shade"),
];

/// Overpass interpreter client
pub struct OverpassClient {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Deserialize)]
struct Element {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<Center>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Center {
    lat: Option<f64>,
    lon: Option<f64>,
}

impl OverpassClient {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn run(&self, query: String) -> ProviderResult<Vec<PlaygroundRecord>> {
        debug!(provider = PROVIDER, query = query.as_str(), "running overpass query");

        let response = self
            .client
            .post(&self.url)
            .body(query)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status,
                body,
            });
        }

        let parsed: OverpassResponse = response.json().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

        let records = normalize(parsed);
        info!(provider = PROVIDER, count = records.len(), "map data query completed");
        Ok(records)
    }
}

#[async_trait]
impl PlaceSearch for OverpassClient {
    async fn text_search(&self, query: &str, region: &str) -> ProviderResult<Vec<PlaygroundRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.run(text_query(query, region)).await
    }

    async fn nearby(&self, center: &Coordinates, radius_m: u32) -> ProviderResult<Vec<PlaygroundRecord>> {
        self.run(nearby_query(center, radius_m)).await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

fn nearby_query(center: &Coordinates, radius_m: u32) -> String {
    let around = format!("(around:{},{},{})", radius_m, center.lat, center.lon);
    format!(
        r#"[out:json][timeout:{QUERY_TIMEOUT_SECS}];
(
  node["leisure"="playground"]{around};
  way["leisure"="playground"]{around};
  relation["leisure"="playground"]{around};
  way["leisure"="park"]["name"]{around};
);
out center;"#
    )
}

fn text_query(query: &str, region: &str) -> String {
    let name = escape_regex(query.trim());
    let region = region.trim().to_uppercase();
    format!(
        r#"[out:json][timeout:{QUERY_TIMEOUT_SECS}];
area["ISO3166-1"="{region}"][admin_level=2]->.region;
(
  nwr["leisure"="playground"]["name"~"{name}",i](area.region);
  nwr["leisure"="park"]["name"~"{name}",i](area.region);
);
out center {TEXT_RESULT_LIMIT};"#
    )
}

/// Escape text for use inside a quoted Overpass regex
fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '"' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn normalize(response: OverpassResponse) -> Vec<PlaygroundRecord> {
    response.elements.into_iter().filter_map(to_record).collect()
}

fn to_record(element: Element) -> Option<PlaygroundRecord> {
    let coordinates = match element.kind.as_str() {
        "node" => Coordinates::from_parts(element.lat, element.lon),
        "way" | "relation" => element
            .center
            .as_ref()
            .and_then(|c| Coordinates::from_parts(c.lat, c.lon)),
        _ => None,
    };
    let Some(coordinates) = coordinates else {
        debug!(kind = element.kind.as_str(), id = element.id, "dropping element without coordinates");
        return None;
    };

    let tags = &element.tags;
    let is_park = tags.get("leisure").map(String::as_str) == Some("park");
    let name = tags
        .get("name")
        .cloned()
        .unwrap_or_else(|| if is_park { "Unnamed park" } else { "Unnamed playground" }.to_string());

    let mut record = PlaygroundRecord::new(
        PlaygroundId::new(Source::MapData, format!("{}-{}", element.kind, element.id)),
        name,
        coordinates,
    )
    .with_amenities(amenities(tags));

    let street = match (tags.get("addr:housenumber"), tags.get("addr:street")) {
        (Some(number), Some(street)) => Some(format!("{number} {street}")),
        (None, Some(street)) => Some(street.clone()),
        _ => None,
    };
    record.address = street;
    record.city = tags.get("addr:city").cloned();
    Some(record)
}

fn amenities(tags: &BTreeMap<String, String>) -> Vec<String> {
    let mut found = Vec::new();

    for (key, value) in tags {
        if value == "no" {
            continue;
        }
        if let Some(device) = key.strip_prefix("playground:") {
            found.push(device.replace('_', " "));
        } else if key == "playground" {
            found.extend(value.split(';').map(|v| v.trim().replace('_', " ")));
        }
    }

    for (tag, label) in AMENITY_TAGS {
        if tags.get(tag).map(String::as_str) == Some("yes") {
            found.push(label.to_string());
        }
    }

    found
}
