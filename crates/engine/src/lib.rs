//! Librarium recommendation engine
//!
//! The hybrid recommendation and feedback-learning core: turns raw user
//! activity and item content into ranked recommendations and closes the
//! loop by measuring how well those recommendations perform.
//!
//! The crate is library-shaped. Storage, authentication and the request
//! layer live elsewhere and hand over plain data structures; the only
//! external capability is text embedding, injected via [`TextEmbedder`].

pub mod affinity;
pub mod collaborative;
pub mod content_based;
pub mod embedding;
pub mod feedback;
pub mod hybrid;
pub mod similarity;
pub mod types;

// Re-export key types
pub use affinity::{build_matrix, AffinityMatrix};
pub use embedding::{EmbeddingCache, TextEmbedder, DEFAULT_TTL_SECS};
pub use feedback::{
    FeedbackLoop, FeedbackPattern, ImpressionRecord, PerformanceMetric, Suggestion,
    SuggestionKind, UserFeedbackSummary,
};
pub use hybrid::blend;
pub use similarity::{cosine_similarity, top_k_neighbors, Neighbor};
pub use types::*;

use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Content-based share of the blended score (default: 0.5)
    pub content_weight: f32,
    /// Collaborative share of the blended score (default: 0.5)
    pub collaborative_weight: f32,
    /// Minimum neighbor similarity admitted to the vote (default: 0.1)
    pub min_similarity: f32,
    /// Nearest neighbors feeding the vote (default: 20)
    pub neighbor_pool: usize,
    /// Engaged items below which popularity kicks in (default: 3)
    pub cold_start_threshold: usize,
    /// Embedding cache TTL in seconds (default: 300)
    pub embedding_ttl_secs: i64,
    /// Recently-engaged items feeding the profile text (default: 5)
    pub recent_history: usize,
    /// Per-item synopsis excerpt in characters (default: 200)
    pub synopsis_excerpt: usize,
    /// Profile budget in whitespace tokens (default: 500)
    pub profile_token_budget: usize,
    /// Resolved feedback per family before a retrain signal (default: 10)
    pub feedback_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_weight: 0.5,
            collaborative_weight: 0.5,
            min_similarity: 0.1,
            neighbor_pool: collaborative::NEIGHBOR_POOL,
            cold_start_threshold: collaborative::COLD_START_THRESHOLD,
            embedding_ttl_secs: embedding::DEFAULT_TTL_SECS,
            recent_history: content_based::RECENT_HISTORY,
            synopsis_excerpt: content_based::SYNOPSIS_EXCERPT,
            profile_token_budget: content_based::PROFILE_TOKEN_BUDGET,
            feedback_threshold: feedback::FEEDBACK_THRESHOLD,
        }
    }
}

/// Errors surfaced by the engine facade. Everything except an embedding
/// failure comes back as an empty result, never an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The injected embedding capability failed; passed through unmodified.
    #[error(transparent)]
    Embedding(#[from] anyhow::Error),
}

/// Engine facade composing the content recommender, the collaborative
/// recommender and the blender around one embedding cache.
pub struct RecommendationEngine {
    config: EngineConfig,
    embedder: Arc<dyn TextEmbedder>,
    cache: EmbeddingCache,
}

impl RecommendationEngine {
    pub fn new(embedder: Arc<dyn TextEmbedder>) -> Self {
        Self::with_config(embedder, EngineConfig::default())
    }

    pub fn with_config(embedder: Arc<dyn TextEmbedder>, config: EngineConfig) -> Self {
        let cache = EmbeddingCache::new(config.embedding_ttl_secs, Arc::new(SystemClock));
        Self {
            config,
            embedder,
            cache,
        }
    }

    /// Variant with an injected clock for deterministic cache expiry.
    pub fn with_clock(
        embedder: Arc<dyn TextEmbedder>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = EmbeddingCache::new(config.embedding_ttl_secs, clock);
        Self {
            config,
            embedder,
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Content-based recommendations from the user's recent history.
    ///
    /// Builds the profile text, embeds it and every candidate through the
    /// cache, and ranks by cosine similarity. Empty history or candidates
    /// yield an empty result.
    #[instrument(skip(self, recent_items, candidates), fields(recent = recent_items.len(), candidates = candidates.len()))]
    pub fn content_recommendations(
        &self,
        recent_items: &[ItemDocument],
        candidates: &[ItemDocument],
        k: usize,
    ) -> Result<Vec<ContentMatch>, EngineError> {
        if recent_items.is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }

        let profile = content_based::build_profile_with_limits(
            recent_items,
            self.config.recent_history,
            self.config.synopsis_excerpt,
            self.config.profile_token_budget,
        );
        if profile.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self
            .cache
            .get_vector("query", &profile, self.embedder.as_ref())?;
        let candidate_vectors = self.embed_candidates(candidates)?;

        Ok(content_based::rank(&query_vector, &candidate_vectors, k))
    }

    /// Items semantically close to one item ("more like this"). The item
    /// itself is never part of the result.
    #[instrument(skip(self, item, candidates), fields(item_id = %item.id, candidates = candidates.len()))]
    pub fn related_items(
        &self,
        item: &ItemDocument,
        candidates: &[ItemDocument],
        k: usize,
    ) -> Result<Vec<ContentMatch>, EngineError> {
        let query = format!("{} {}", item.title, item.synopsis);
        let query_vector = self
            .cache
            .get_vector("query", &query, self.embedder.as_ref())?;

        let others: Vec<ItemDocument> = candidates
            .iter()
            .filter(|candidate| candidate.id != item.id)
            .cloned()
            .collect();
        let candidate_vectors = self.embed_candidates(&others)?;

        Ok(content_based::rank(&query_vector, &candidate_vectors, k))
    }

    /// Hybrid recommendations: both recommenders over a doubled candidate
    /// window, blended with the configured weights. A missing matrix (empty
    /// user/item universe) degrades to content-only scoring.
    #[instrument(skip(self, matrix, recent_items, candidates), fields(user_id = %user_id))]
    pub fn hybrid_recommendations(
        &self,
        user_id: Uuid,
        matrix: Option<&AffinityMatrix>,
        recent_items: &[ItemDocument],
        candidates: &[ItemDocument],
        k: usize,
    ) -> Result<Vec<RecommendationResult>, EngineError> {
        let content = self.content_recommendations(recent_items, candidates, k * 2)?;

        let collaborative = match matrix {
            Some(matrix) => collaborative::recommend_with_pool(
                matrix,
                user_id,
                k * 2,
                self.config.min_similarity,
                self.config.neighbor_pool,
                self.config.cold_start_threshold,
            ),
            None => Vec::new(),
        };

        Ok(hybrid::blend(
            &content,
            &collaborative,
            self.config.content_weight,
            self.config.collaborative_weight,
            k,
        ))
    }

    fn embed_candidates(
        &self,
        candidates: &[ItemDocument],
    ) -> Result<Vec<(Uuid, Vec<f32>)>, EngineError> {
        candidates
            .iter()
            .map(|item| {
                let vector = self.cache.get_vector(
                    &item.id.to_string(),
                    &item.embedding_text(),
                    self.embedder.as_ref(),
                )?;
                Ok((item.id, vector))
            })
            .collect()
    }
}
