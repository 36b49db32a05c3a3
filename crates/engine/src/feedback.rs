//! Feedback learning loop: impressions, rolling performance metrics and
//! retrain/triage signals.
//!
//! Every shown recommendation becomes an impression record; resolving it
//! once updates the per-(family, day) metric bucket. Resolution is
//! idempotent: a second update for the same recommendation id overwrites
//! the recorded outcome but never increments the counters again.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::types::{round_to, Clock, RecommendationFamily, SystemClock};

/// Resolved-feedback count per family before a retrain signal fires.
pub const FEEDBACK_THRESHOLD: usize = 10;
/// Metrics window scanned by [`FeedbackLoop::improvement_suggestions`].
const SUGGESTION_WINDOW_DAYS: i64 = 30;
/// Families averaging below this CTR (percent) get flagged.
const LOW_CTR_PERCENT: f32 = 10.0;
/// Families averaging below this rating get flagged.
const LOW_RATING: f32 = 3.0;

/// One shown recommendation. Created at serve-time, resolved at most once
/// at feedback-time, retained for analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpressionRecord {
    pub recommendation_id: String,
    pub user_id: Uuid,
    pub family: RecommendationFamily,
    pub item_id: Uuid,
    pub position: usize,
    pub context: Option<String>,
    pub shown_at: chrono::DateTime<chrono::Utc>,
    pub clicked: bool,
    pub rating: Option<f32>,
    pub feedback_kind: Option<String>,
    pub resolved: bool,
}

/// Rolling counters for one (family, day) bucket. Counts only increase;
/// the click-through rate is always recomputed from the two counters and
/// the average rating is a running weighted mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub family: RecommendationFamily,
    pub date: NaiveDate,
    pub total_shown: u64,
    pub total_clicked: u64,
    pub total_rated: u64,
    pub avg_rating: Option<f32>,
    pub click_through_rate: f32,
}

impl PerformanceMetric {
    fn new(family: RecommendationFamily, date: NaiveDate) -> Self {
        Self {
            family,
            date,
            total_shown: 0,
            total_clicked: 0,
            total_rated: 0,
            avg_rating: None,
            click_through_rate: 0.0,
        }
    }

    fn recompute_ctr(&mut self) {
        self.click_through_rate = if self.total_shown > 0 {
            (self.total_clicked as f32 / self.total_shown as f32) * 100.0
        } else {
            0.0
        };
    }
}

/// Why a family was flagged for attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    LowCtr,
    LowRating,
}

/// Advisory triage output; callers decide what to do about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub family: RecommendationFamily,
    pub value: f32,
    pub message: String,
}

/// Per-family aggregate over resolved impressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPattern {
    pub family: RecommendationFamily,
    pub total_feedback: u64,
    pub total_clicks: u64,
    pub avg_rating: Option<f32>,
    pub unique_users: u64,
    pub click_rate: f32,
}

/// Per-family summary of one user's impressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFeedbackSummary {
    pub family: RecommendationFamily,
    pub total_recommendations: u64,
    pub clicked_count: u64,
    pub avg_rating: Option<f32>,
}

/// The feedback learning loop. Methods take `&mut self`; concurrent metric
/// updates need external serialization.
pub struct FeedbackLoop {
    impressions: HashMap<String, ImpressionRecord>,
    metrics: HashMap<(RecommendationFamily, NaiveDate), PerformanceMetric>,
    feedback_threshold: usize,
    clock: Arc<dyn Clock>,
}

impl FeedbackLoop {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            impressions: HashMap::new(),
            metrics: HashMap::new(),
            feedback_threshold: FEEDBACK_THRESHOLD,
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn with_threshold(mut self, feedback_threshold: usize) -> Self {
        self.feedback_threshold = feedback_threshold;
        self
    }

    /// Record that a recommendation was shown and return its id. The
    /// (family, day) metric bucket is created lazily and its shown count
    /// incremented. Re-recording the exact same impression in the same
    /// second is a no-op returning the existing id, so shown counts cannot
    /// double.
    #[instrument(skip(self, context))]
    pub fn record_shown(
        &mut self,
        user_id: Uuid,
        family: RecommendationFamily,
        item_id: Uuid,
        position: usize,
        context: Option<String>,
    ) -> String {
        let now = self.clock.now();
        let recommendation_id =
            format!("{}_{}_{}_{}", user_id, family, item_id, now.timestamp());

        if self.impressions.contains_key(&recommendation_id) {
            return recommendation_id;
        }

        self.impressions.insert(
            recommendation_id.clone(),
            ImpressionRecord {
                recommendation_id: recommendation_id.clone(),
                user_id,
                family,
                item_id,
                position,
                context,
                shown_at: now,
                clicked: false,
                rating: None,
                feedback_kind: None,
                resolved: false,
            },
        );

        let metric = self
            .metrics
            .entry((family, now.date_naive()))
            .or_insert_with(|| PerformanceMetric::new(family, now.date_naive()));
        metric.total_shown += 1;
        metric.recompute_ctr();

        debug!(recommendation_id = %recommendation_id, "recorded impression");
        recommendation_id
    }

    /// Attach an outcome to a shown recommendation. Returns `false` for an
    /// unknown id. The first resolution updates the metric bucket; later
    /// resolutions overwrite the outcome fields only.
    #[instrument(skip(self))]
    pub fn record_feedback(
        &mut self,
        recommendation_id: &str,
        clicked: bool,
        rating: Option<f32>,
        feedback_kind: &str,
    ) -> bool {
        let Some(record) = self.impressions.get_mut(recommendation_id) else {
            debug!(recommendation_id, "feedback for unknown recommendation");
            return false;
        };

        let first_resolution = !record.resolved;
        record.clicked = clicked;
        record.rating = rating;
        record.feedback_kind = Some(feedback_kind.to_string());
        record.resolved = true;

        if first_resolution {
            let key = (record.family, record.shown_at.date_naive());
            let family = record.family;
            let date = record.shown_at.date_naive();
            let metric = self
                .metrics
                .entry(key)
                .or_insert_with(|| PerformanceMetric::new(family, date));

            if clicked {
                metric.total_clicked += 1;
            }
            if let Some(rating) = rating {
                let old_rated = metric.total_rated;
                metric.total_rated += 1;
                metric.avg_rating = Some(match metric.avg_rating {
                    Some(avg) => (avg * old_rated as f32 + rating) / metric.total_rated as f32,
                    None => rating,
                });
            }
            metric.recompute_ctr();
        }

        true
    }

    /// Look up one impression (analytics surface).
    pub fn impression(&self, recommendation_id: &str) -> Option<&ImpressionRecord> {
        self.impressions.get(recommendation_id)
    }

    /// One metric bucket (analytics surface).
    pub fn metric(
        &self,
        family: RecommendationFamily,
        date: NaiveDate,
    ) -> Option<&PerformanceMetric> {
        self.metrics.get(&(family, date))
    }

    /// Metric rows for the trailing window, optionally filtered by family,
    /// newest first. Averages and rates are rounded for presentation.
    pub fn performance(
        &self,
        family: Option<RecommendationFamily>,
        days: i64,
    ) -> Vec<PerformanceMetric> {
        let cutoff = self.clock.now().date_naive() - chrono::Duration::days(days);

        let mut rows: Vec<PerformanceMetric> = self
            .metrics
            .values()
            .filter(|m| m.date >= cutoff)
            .filter(|m| family.map_or(true, |f| m.family == f))
            .map(|m| PerformanceMetric {
                avg_rating: m.avg_rating.map(|r| round_to(r, 2)),
                click_through_rate: round_to(m.click_through_rate, 2),
                ..m.clone()
            })
            .collect();

        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.family.as_str().cmp(b.family.as_str()))
        });
        rows
    }

    /// True once the family has collected enough resolved feedback to make
    /// retraining worthwhile. What "retrain" means is the caller's call.
    pub fn should_retrain(&self, family: RecommendationFamily) -> bool {
        let resolved = self
            .impressions
            .values()
            .filter(|r| r.family == family && (r.clicked || r.rating.is_some()))
            .count();
        resolved >= self.feedback_threshold
    }

    /// Scan the last 30 days of metrics and flag families with a low
    /// average CTR or a low average rating. Advisory only.
    pub fn improvement_suggestions(&self) -> Vec<Suggestion> {
        let cutoff = self.clock.now().date_naive() - chrono::Duration::days(SUGGESTION_WINDOW_DAYS);

        let mut ctr_sums: HashMap<RecommendationFamily, (f32, u32)> = HashMap::new();
        let mut rating_sums: HashMap<RecommendationFamily, (f32, u32)> = HashMap::new();
        for metric in self.metrics.values().filter(|m| m.date >= cutoff) {
            let entry = ctr_sums.entry(metric.family).or_insert((0.0, 0));
            entry.0 += metric.click_through_rate;
            entry.1 += 1;

            if let Some(avg) = metric.avg_rating {
                let entry = rating_sums.entry(metric.family).or_insert((0.0, 0));
                entry.0 += avg;
                entry.1 += 1;
            }
        }

        let mut suggestions = Vec::new();

        let mut low_ctr: Vec<(RecommendationFamily, f32)> = ctr_sums
            .into_iter()
            .map(|(family, (sum, days))| (family, sum / days as f32))
            .filter(|(_, avg)| *avg < LOW_CTR_PERCENT)
            .collect();
        low_ctr.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        for (family, avg_ctr) in low_ctr {
            suggestions.push(Suggestion {
                kind: SuggestionKind::LowCtr,
                family,
                value: round_to(avg_ctr, 2),
                message: format!(
                    "Consider adjusting weights or improving content matching for {} recommendations",
                    family
                ),
            });
        }

        let mut low_rating: Vec<(RecommendationFamily, f32)> = rating_sums
            .into_iter()
            .map(|(family, (sum, days))| (family, sum / days as f32))
            .filter(|(_, avg)| *avg < LOW_RATING)
            .collect();
        low_rating.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        for (family, avg_rating) in low_rating {
            suggestions.push(Suggestion {
                kind: SuggestionKind::LowRating,
                family,
                value: round_to(avg_rating, 2),
                message: format!(
                    "User ratings are low for {} recommendations. Consider improving relevance.",
                    family
                ),
            });
        }

        suggestions
    }

    /// Per-family aggregates over impressions that received feedback.
    pub fn feedback_patterns(
        &self,
        family: Option<RecommendationFamily>,
    ) -> Vec<FeedbackPattern> {
        struct Acc {
            total: u64,
            clicks: u64,
            rating_sum: f32,
            rated: u64,
            users: std::collections::HashSet<Uuid>,
        }

        let mut groups: HashMap<RecommendationFamily, Acc> = HashMap::new();
        for record in self
            .impressions
            .values()
            .filter(|r| r.clicked || r.rating.is_some())
            .filter(|r| family.map_or(true, |f| r.family == f))
        {
            let acc = groups.entry(record.family).or_insert_with(|| Acc {
                total: 0,
                clicks: 0,
                rating_sum: 0.0,
                rated: 0,
                users: std::collections::HashSet::new(),
            });
            acc.total += 1;
            if record.clicked {
                acc.clicks += 1;
            }
            if let Some(rating) = record.rating {
                acc.rating_sum += rating;
                acc.rated += 1;
            }
            acc.users.insert(record.user_id);
        }

        let mut patterns: Vec<FeedbackPattern> = groups
            .into_iter()
            .map(|(family, acc)| FeedbackPattern {
                family,
                total_feedback: acc.total,
                total_clicks: acc.clicks,
                avg_rating: (acc.rated > 0)
                    .then(|| round_to(acc.rating_sum / acc.rated as f32, 2)),
                unique_users: acc.users.len() as u64,
                click_rate: round_to(acc.clicks as f32 / acc.total as f32 * 100.0, 2),
            })
            .collect();
        patterns.sort_by(|a, b| a.family.as_str().cmp(b.family.as_str()));
        patterns
    }

    /// Per-family summary of everything shown to one user.
    pub fn user_feedback_summary(&self, user_id: Uuid) -> Vec<UserFeedbackSummary> {
        struct Acc {
            total: u64,
            clicked: u64,
            rating_sum: f32,
            rated: u64,
        }

        let mut groups: HashMap<RecommendationFamily, Acc> = HashMap::new();
        for record in self.impressions.values().filter(|r| r.user_id == user_id) {
            let acc = groups.entry(record.family).or_insert(Acc {
                total: 0,
                clicked: 0,
                rating_sum: 0.0,
                rated: 0,
            });
            acc.total += 1;
            if record.clicked {
                acc.clicked += 1;
            }
            if let Some(rating) = record.rating {
                acc.rating_sum += rating;
                acc.rated += 1;
            }
        }

        let mut summary: Vec<UserFeedbackSummary> = groups
            .into_iter()
            .map(|(family, acc)| UserFeedbackSummary {
                family,
                total_recommendations: acc.total,
                clicked_count: acc.clicked,
                avg_rating: (acc.rated > 0)
                    .then(|| round_to(acc.rating_sum / acc.rated as f32, 2)),
            })
            .collect();
        summary.sort_by(|a, b| a.family.as_str().cmp(b.family.as_str()));
        summary
    }
}
