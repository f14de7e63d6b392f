//! # Configuration
//!
//! Everything the service needs to know about its providers and storage.
//!
//! Values come from the environment (`Config::from_env`) with logged
//! defaults, and every field has a `with_*` setter for tests and CLI
//! overrides. The places API key is the only secret and is optional: without
//! it the external adapter degrades to an empty result (or synthetic
//! fixtures, when enabled).

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use super::merge::DEFAULT_DEDUPE_THRESHOLD_DEG;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Service configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Places provider credential
    pub places_api_key: Option<String>,

    /// Places provider base URL
    pub places_url: String,

    /// Geocoding provider base URL
    pub geocoder_url: String,

    /// Map-data (Overpass) interpreter URL
    pub overpass_url: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Directory receiving uploaded photos
    pub photo_root: PathBuf,

    /// Public URL prefix under which `photo_root` is served
    pub photo_public_base: String,

    /// Country code scoping text searches and geocoding
    pub region: String,

    /// Proximity search radius in meters
    pub search_radius_m: u32,

    /// Row limit for database searches and top lists
    pub row_limit: usize,

    /// Duplicate threshold in degrees
    pub dedupe_threshold_deg: f64,

    /// HTTP listen port
    pub port: u16,

    /// Serve synthetic playgrounds when no places credential is configured
    pub fixture_fallback: bool,

    /// Timeout for each outbound provider request
    pub http_timeout: Duration,

    /// Identifies us to providers that require it (Nominatim, Overpass)
    pub user_agent: String,
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            places_api_key: optional("PLACES_API_KEY"),
            places_url: load("PLACES_URL", defaults.places_url)?,
            geocoder_url: load("GEOCODER_URL", defaults.geocoder_url)?,
            overpass_url: load("OVERPASS_URL", defaults.overpass_url)?,
            database_path: load("DATABASE_PATH", defaults.database_path)?,
            photo_root: load("PHOTO_ROOT", defaults.photo_root)?,
            photo_public_base: load("PHOTO_PUBLIC_BASE", defaults.photo_public_base)?,
            region: load("REGION", defaults.region)?,
            search_radius_m: load("SEARCH_RADIUS_M", defaults.search_radius_m)?,
            row_limit: load("ROW_LIMIT", defaults.row_limit)?,
            dedupe_threshold_deg: load("DEDUPE_THRESHOLD_DEG", defaults.dedupe_threshold_deg)?,
            port: load("PORT", defaults.port)?,
            fixture_fallback: load("FIXTURE_FALLBACK", defaults.fixture_fallback)?,
            http_timeout: Duration::from_secs(load(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            user_agent: load("USER_AGENT", defaults.user_agent)?,
        })
    }

    /// Set the places provider credential
    pub fn with_places_api_key(mut self, key: impl Into<String>) -> Self {
        self.places_api_key = Some(key.into());
        self
    }

    /// Set the database file
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set photo storage location and public prefix
    pub fn with_photo_storage(mut self, root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        self.photo_root = root.into();
        self.photo_public_base = public_base.into();
        self
    }

    /// Set the search region (country code)
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the proximity radius in meters
    pub fn with_search_radius(mut self, meters: u32) -> Self {
        self.search_radius_m = meters;
        self
    }

    /// Set the duplicate threshold in degrees
    pub fn with_dedupe_threshold(mut self, degrees: f64) -> Self {
        self.dedupe_threshold_deg = degrees;
        self
    }

    /// Set the listen port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable synthetic fixtures
    pub fn with_fixture_fallback(mut self, enabled: bool) -> Self {
        self.fixture_fallback = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".playground-explorer");

        Self {
            places_api_key: None,
            places_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            database_path: data_dir.join("playgrounds.db"),
            photo_root: data_dir.join("photos"),
            photo_public_base: "http://localhost:3000/photos".to_string(),
            region: "us".to_string(),
            search_radius_m: 5000,
            row_limit: 20,
            dedupe_threshold_deg: DEFAULT_DEDUPE_THRESHOLD_DEG,
            port: 3000,
            fixture_fallback: true,
            http_timeout: Duration::from_secs(10),
            user_agent: concat!("playground-explorer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            info!("{key} not set");
            None
        }
    }
}

fn load<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => {
            debug!("{key} not set, using default: {default:?}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.places_api_key.is_none());
        assert_eq!(config.region, "us");
        assert_eq!(config.search_radius_m, 5000);
        assert_eq!(config.dedupe_threshold_deg, 0.001);
        assert!(config.database_path.ends_with("playgrounds.db"));
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_places_api_key("k")
            .with_region("ca")
            .with_search_radius(1200)
            .with_dedupe_threshold(0.0005)
            .with_port(8080)
            .with_fixture_fallback(false);

        assert_eq!(config.places_api_key.as_deref(), Some("k"));
        assert_eq!(config.region, "ca");
        assert_eq!(config.search_radius_m, 1200);
        assert_eq!(config.dedupe_threshold_deg, 0.0005);
        assert_eq!(config.port, 8080);
        assert!(!config.fixture_fallback);
    }

    #[test]
    fn test_load_parses_and_rejects() {
        env::set_var("PGX_TEST_LOAD_OK", " 42 ");
        assert_eq!(load::<u32>("PGX_TEST_LOAD_OK", 1).unwrap(), 42);

        env::set_var("PGX_TEST_LOAD_BAD", "many");
        assert!(matches!(
            load::<u32>("PGX_TEST_LOAD_BAD", 1),
            Err(ConfigError::Invalid { .. })
        ));

        assert_eq!(load::<u32>("PGX_TEST_LOAD_UNSET", 7).unwrap(), 7);
    }
}
