//! # Id
//!
//! Provenance-carrying identifier for playgrounds.
//!
//! Every provider has its own id space, so a raw id alone is ambiguous.
//! `PlaygroundId` keeps the originating [`Source`] next to the raw id.
//! The string form `"<tag>-<raw>"` (e.g. `google-ChIJ...`, `db-42`) is what
//! clients and the ratings/favorites tables use as the key.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which system produced a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Places API (text or nearby search)
    ExternalPlaces,
    /// User-submitted listing in our own database
    UserDatabase,
    /// Map-data (OpenStreetMap) feature
    MapData,
    /// Generated locally when no provider is configured
    SyntheticFallback,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::ExternalPlaces,
        Source::UserDatabase,
        Source::MapData,
        Source::SyntheticFallback,
    ];

    /// Short provenance tag used in the string form of ids
    pub fn tag(&self) -> &'static str {
        match self {
            Source::ExternalPlaces => "google",
            Source::UserDatabase => "db",
            Source::MapData => "osm",
            Source::SyntheticFallback => "mock",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.tag() == tag)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Identifier of a playground: provenance plus the provider's own id
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaygroundId {
    source: Source,
    raw: String,
}

impl PlaygroundId {
    pub fn new(source: Source, raw: impl Into<String>) -> Self {
        Self {
            source,
            raw: raw.into(),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// The provider's id, without the provenance tag
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Error parsing a playground id string
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdParseError {
    #[error("playground id is missing a provenance tag: {0}")]
    MissingTag(String),

    #[error("unknown provenance tag: {0}")]
    UnknownTag(String),

    #[error("playground id has an empty provider id: {0}")]
    EmptyRaw(String),
}

impl FromStr for PlaygroundId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, raw) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingTag(s.to_string()))?;
        let source = Source::from_tag(tag).ok_or_else(|| IdParseError::UnknownTag(tag.to_string()))?;
        if raw.is_empty() {
            return Err(IdParseError::EmptyRaw(s.to_string()));
        }
        Ok(Self::new(source, raw))
    }
}

impl std::fmt::Display for PlaygroundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.source.tag(), self.raw)
    }
}

impl Serialize for PlaygroundId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlaygroundId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
