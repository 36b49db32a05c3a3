//! Neighbor-weighted collaborative scoring with a popularity fallback.
//!
//! Users with fewer than three positively-engaged items, or without any
//! positive-similarity neighbor, get globally popular items instead of
//! neighbor votes. Items the target user already engaged with are never
//! recommended.

use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::affinity::AffinityMatrix;
use crate::similarity::top_k_neighbors;
use crate::types::{RecommendationFamily, ScoredItem};

/// How many nearest neighbors feed the weighted vote.
pub const NEIGHBOR_POOL: usize = 20;
/// Minimum positively-engaged items before neighbor voting applies.
pub const COLD_START_THRESHOLD: usize = 3;

/// Collaborative recommendations for `user_id` with the default neighbor
/// pool and cold-start threshold.
pub fn recommend(
    matrix: &AffinityMatrix,
    user_id: Uuid,
    k: usize,
    min_similarity: f32,
) -> Vec<ScoredItem> {
    recommend_with_pool(
        matrix,
        user_id,
        k,
        min_similarity,
        NEIGHBOR_POOL,
        COLD_START_THRESHOLD,
    )
}

/// Fully parameterized variant used by the engine facade.
pub fn recommend_with_pool(
    matrix: &AffinityMatrix,
    user_id: Uuid,
    k: usize,
    min_similarity: f32,
    neighbor_pool: usize,
    cold_start_threshold: usize,
) -> Vec<ScoredItem> {
    if !matrix.contains_user(user_id) {
        return Vec::new();
    }

    let engaged = matrix.engaged_items(user_id);

    if engaged.len() < cold_start_threshold {
        debug!(user_id = %user_id, engaged = engaged.len(), "cold start, popularity fallback");
        return popularity_fallback(matrix, user_id, k);
    }

    let neighbors = top_k_neighbors(matrix, user_id, neighbor_pool);
    if neighbors.is_empty() {
        debug!(user_id = %user_id, "no positive-similarity neighbors, popularity fallback");
        return popularity_fallback(matrix, user_id, k);
    }

    // Weighted voting: surviving neighbor similarities renormalized to sum
    // to 1. A zero denominator yields zero weights, not a division error.
    let voters: Vec<_> = neighbors
        .into_iter()
        .filter(|n| n.similarity >= min_similarity)
        .collect();
    let total_similarity: f32 = voters.iter().map(|n| n.similarity).sum();

    let mut scores: HashMap<Uuid, f32> = HashMap::new();
    for neighbor in &voters {
        let weight = if total_similarity > 0.0 {
            neighbor.similarity / total_similarity
        } else {
            0.0
        };

        for item_id in matrix.items() {
            let affinity = matrix.score(neighbor.user_id, *item_id);
            if affinity > 0.0 && !engaged.contains(item_id) {
                *scores.entry(*item_id).or_insert(0.0) += weight * affinity;
            }
        }
    }

    // Rank in item enumeration order so equal scores stay deterministic.
    let mut ranked: Vec<(Uuid, f32)> = matrix
        .items()
        .iter()
        .filter_map(|item_id| scores.get(item_id).map(|score| (*item_id, *score)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    ranked.truncate(k);
    ranked
        .into_iter()
        .map(|(item_id, score)| ScoredItem {
            item_id,
            score,
            method: RecommendationFamily::Collaborative,
        })
        .collect()
}

/// Global popularity: per item, the summed affinity of every other user,
/// skipping items the target user already engaged with.
fn popularity_fallback(matrix: &AffinityMatrix, user_id: Uuid, k: usize) -> Vec<ScoredItem> {
    let engaged = matrix.engaged_items(user_id);

    let mut popularity: Vec<(Uuid, f32)> = Vec::new();
    for item_id in matrix.items() {
        if engaged.contains(item_id) {
            continue;
        }
        let total: f32 = matrix
            .users()
            .iter()
            .filter(|other| **other != user_id)
            .map(|other| matrix.score(*other, *item_id))
            .sum();
        if total > 0.0 {
            popularity.push((*item_id, total));
        }
    }

    popularity.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    popularity.truncate(k);
    popularity
        .into_iter()
        .map(|(item_id, score)| ScoredItem {
            item_id,
            score,
            method: RecommendationFamily::Popularity,
        })
        .collect()
}
