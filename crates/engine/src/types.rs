//! Boundary types shared across the recommendation pipeline.
//!
//! Every record here is resolved once at the storage boundary with explicit
//! defaults, so the scoring code never does tolerant field lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

/// Textual representation of a catalog item, as handed over by the storage
/// layer. Missing columns resolve to empty strings / empty tags there, not
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDocument {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ItemDocument {
    /// Text fed to the embedding capability: title + synopsis + tags.
    /// Any edit to one of them changes the text and thereby the cache key.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.synopsis);
        if !self.tags.is_empty() {
            text.push(' ');
            text.push_str(&self.tags.join(" "));
        }
        text
    }
}

/// Implicit engagement, pre-aggregated per (user, item) by the storage
/// layer: how often and for how long the user read the item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub count: u32,
    pub total_minutes: f32,
}

/// One explicit rating row. Only helpful ratings with a positive value
/// contribute to affinity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub rating: f32,
    pub helpful: bool,
}

/// Kind of a typed interaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Download,
    Bookmark,
    Share,
    Other,
}

/// One typed interaction row (view, download, bookmark, share, other).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub kind: InteractionKind,
    pub value: f32,
}

/// The three interaction feeds consumed by the affinity aggregator.
#[derive(Debug, Clone, Default)]
pub struct InteractionSignals {
    pub engagements: Vec<EngagementRecord>,
    pub ratings: Vec<RatingRecord>,
    pub interactions: Vec<InteractionRecord>,
}

/// Which strategy produced a recommendation. Also the grouping key for the
/// feedback metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationFamily {
    Collaborative,
    Content,
    Hybrid,
    Popularity,
}

impl RecommendationFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collaborative => "collaborative",
            Self::Content => "content",
            Self::Hybrid => "hybrid",
            Self::Popularity => "popularity",
        }
    }
}

impl fmt::Display for RecommendationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored item from the collaborative recommender, tagged with the method
/// that produced the score (collaborative voting or popularity fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: Uuid,
    pub score: f32,
    pub method: RecommendationFamily,
}

/// A semantic match from the content recommender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentMatch {
    pub item_id: Uuid,
    pub similarity: f32,
    pub relevance_percentage: f32,
}

/// One blended recommendation. Component scores are `None` when the item was
/// absent from that result set; the provenance flags make the distinction
/// explicit for downstream A/B analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub item_id: Uuid,
    pub content_score: Option<f32>,
    pub collaborative_score: Option<f32>,
    pub content_percentage: f32,
    pub collaborative_percentage: f32,
    pub blended_score: f32,
    pub confidence_percentage: f32,
    pub has_content: bool,
    pub has_collaborative: bool,
}

/// Clock abstraction so TTL expiry and day bucketing are deterministic under
/// test. Production code uses [`SystemClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub(crate) fn round_to(value: f32, places: i32) -> f32 {
    let factor = 10f32.powi(places);
    (value * factor).round() / factor
}
