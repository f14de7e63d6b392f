//! Adapters - Implementations of the port interfaces
//!
//! Providers reached over HTTP (places, geocoding, map data), the SQLite
//! store, local photo storage and the synthetic fallback source.

pub mod fixture;
pub mod google;
pub mod http;
pub mod nominatim;
pub mod overpass;
pub mod sqlite;
pub mod storage;
