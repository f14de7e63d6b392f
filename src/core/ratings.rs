//! # Ratings
//!
//! Rating entries and their aggregation. Pure; the stores only fetch rows.
//!
//! One entry exists per (user, playground, category). Re-submitting the same
//! triple replaces the score, so a user can never count twice in a category.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::PlaygroundId;

/// Categories offered by the rating form
///
/// Free-text categories are accepted too; these are just the standard set.
pub const STANDARD_CATEGORIES: [&str; 6] = [
    "overall",
    "safety",
    "cleanliness",
    "equipment",
    "shade",
    "accessibility",
];

/// A score between 1 and 5 inclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("score must be between 1 and 5, got {value}"))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> u8 {
        score.0
    }
}

/// One persisted rating row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub user_id: String,
    pub playground_id: PlaygroundId,
    pub category: String,
    pub score: Score,
    pub review: Option<String>,
}

/// Normalize a category name for storage and comparison
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Aggregated ratings of one playground
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregate {
    /// Mean score per category; standard categories are present at 0.0 when unrated
    pub categories: BTreeMap<String, f64>,
    /// Mean of the per-category means, over categories that have entries
    pub overall: f64,
    /// Number of distinct users who submitted ratings
    pub total: u32,
}

impl RatingAggregate {
    pub fn category(&self, name: &str) -> f64 {
        self.categories
            .get(&normalize_category(name))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Aggregate a playground's rating rows
///
/// # Example
/// ```
/// use playground_explorer::core::ratings::{aggregate, RatingEntry, Score};
/// use playground_explorer::{PlaygroundId, Source};
///
/// let id = PlaygroundId::new(Source::UserDatabase, "1");
/// let entries: Vec<RatingEntry> = [5, 3, 4]
///     .iter()
///     .enumerate()
///     .map(|(i, s)| RatingEntry {
///         user_id: format!("u{i}"),
///         playground_id: id.clone(),
///         category: "safety".into(),
///         score: Score::new(*s).unwrap(),
///         review: None,
///     })
///     .collect();
///
/// let agg = aggregate(&entries);
/// assert_eq!(agg.category("safety"), 4.0);
/// assert_eq!(agg.total, 3);
/// ```
pub fn aggregate(entries: &[RatingEntry]) -> RatingAggregate {
    let mut sums: BTreeMap<String, (u32, u32)> = STANDARD_CATEGORIES
        .iter()
        .map(|c| (c.to_string(), (0, 0)))
        .collect();
    let mut users: BTreeSet<&str> = BTreeSet::new();

    for entry in entries {
        let slot = sums.entry(normalize_category(&entry.category)).or_default();
        slot.0 += entry.score.value() as u32;
        slot.1 += 1;
        users.insert(entry.user_id.as_str());
    }

    let categories: BTreeMap<String, f64> = sums
        .iter()
        .map(|(name, (sum, count))| {
            let mean = if *count == 0 { 0.0 } else { *sum as f64 / *count as f64 };
            (name.clone(), mean)
        })
        .collect();

    let rated: Vec<f64> = sums
        .iter()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(name, _)| categories[name])
        .collect();
    let overall = if rated.is_empty() {
        0.0
    } else {
        rated.iter().sum::<f64>() / rated.len() as f64
    };

    RatingAggregate {
        categories,
        overall,
        total: users.len() as u32,
    }
}
