//! Weight-normalized blending of content and collaborative rankings.

use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::types::{round_to, ContentMatch, RecommendationResult, ScoredItem};

/// Blend the two result sets into one ranking.
///
/// Weights are normalized to sum to 1 before use; if both are 0 every
/// blended score collapses to 0, which is defined rather than an error.
/// Component scores are clamped to [0, 1] independently; an upstream score
/// above 1 is clamped with a warning instead of failing the request.
pub fn blend(
    content: &[ContentMatch],
    collaborative: &[ScoredItem],
    content_weight: f32,
    collaborative_weight: f32,
    k: usize,
) -> Vec<RecommendationResult> {
    let total_weight = content_weight + collaborative_weight;
    let (content_weight, collaborative_weight) = if total_weight > 0.0 {
        (content_weight / total_weight, collaborative_weight / total_weight)
    } else {
        (0.0, 0.0)
    };

    // Union of both result sets, first-seen order preserved so equal
    // blended scores rank deterministically.
    let mut order: Vec<Uuid> = Vec::new();
    let mut content_scores: HashMap<Uuid, f32> = HashMap::new();
    let mut collaborative_scores: HashMap<Uuid, f32> = HashMap::new();

    for result in content {
        if !content_scores.contains_key(&result.item_id) {
            order.push(result.item_id);
        }
        content_scores.insert(result.item_id, result.similarity);
    }
    for result in collaborative {
        if !content_scores.contains_key(&result.item_id)
            && !collaborative_scores.contains_key(&result.item_id)
        {
            order.push(result.item_id);
        }
        collaborative_scores.insert(result.item_id, result.score);
    }

    let mut blended: Vec<RecommendationResult> = order
        .into_iter()
        .map(|item_id| {
            let content_score = content_scores.get(&item_id).copied();
            let collaborative_score = collaborative_scores.get(&item_id).copied();

            let content_norm = clamp_unit(item_id, "content", content_score.unwrap_or(0.0));
            let collab_norm =
                clamp_unit(item_id, "collaborative", collaborative_score.unwrap_or(0.0));

            let score = content_norm * content_weight + collab_norm * collaborative_weight;

            RecommendationResult {
                item_id,
                content_score,
                collaborative_score,
                content_percentage: round_to(content_norm * 100.0, 1),
                collaborative_percentage: round_to(collab_norm * 100.0, 1),
                blended_score: round_to(score, 4),
                confidence_percentage: round_to(score * 100.0, 1),
                has_content: content_score.is_some(),
                has_collaborative: collaborative_score.is_some(),
            }
        })
        .collect();

    blended.sort_by(|a, b| b.blended_score.partial_cmp(&a.blended_score).unwrap());
    blended.truncate(k);
    blended
}

fn clamp_unit(item_id: Uuid, component: &str, score: f32) -> f32 {
    if score > 1.0 {
        warn!(item_id = %item_id, component, score, "component score above 1.0, clamping");
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecommendationFamily;

    fn content_match(item_id: Uuid, similarity: f32) -> ContentMatch {
        ContentMatch {
            item_id,
            similarity,
            relevance_percentage: round_to(similarity * 100.0, 1),
        }
    }

    fn scored(item_id: Uuid, score: f32) -> ScoredItem {
        ScoredItem {
            item_id,
            score,
            method: RecommendationFamily::Collaborative,
        }
    }

    #[test]
    fn test_content_only_item() {
        let item = Uuid::new_v4();
        let results = blend(&[content_match(item, 0.8)], &[], 0.5, 0.5, 10);

        assert_eq!(results.len(), 1);
        let rec = &results[0];
        assert!((rec.blended_score - 0.4).abs() < 1e-6);
        assert!(rec.has_content);
        assert!(!rec.has_collaborative);
        assert_eq!(rec.content_score, Some(0.8));
        assert_eq!(rec.collaborative_score, None);
    }

    #[test]
    fn test_both_components_combine() {
        let item = Uuid::new_v4();
        let results = blend(
            &[content_match(item, 0.6)],
            &[scored(item, 0.4)],
            0.5,
            0.5,
            10,
        );

        assert_eq!(results.len(), 1);
        assert!((results[0].blended_score - 0.5).abs() < 1e-6);
        assert!(results[0].has_content);
        assert!(results[0].has_collaborative);
    }

    #[test]
    fn test_weights_are_normalized() {
        let item = Uuid::new_v4();
        let a = blend(&[content_match(item, 0.8)], &[], 0.5, 0.5, 10);
        let b = blend(&[content_match(item, 0.8)], &[], 2.0, 2.0, 10);

        assert!((a[0].blended_score - b[0].blended_score).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weights_collapse_to_zero() {
        let item = Uuid::new_v4();
        let results = blend(
            &[content_match(item, 0.9)],
            &[scored(item, 0.9)],
            0.0,
            0.0,
            10,
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].blended_score, 0.0);
    }

    #[test]
    fn test_scores_above_one_clamp() {
        let item = Uuid::new_v4();
        // Popularity fallback scores are affinity sums and can exceed 1.
        let results = blend(&[], &[scored(item, 2.3)], 0.5, 0.5, 10);

        assert!((results[0].blended_score - 0.5).abs() < 1e-6);
        assert_eq!(results[0].collaborative_percentage, 100.0);
        assert_eq!(results[0].collaborative_score, Some(2.3));
    }

    #[test]
    fn test_monotone_in_each_component() {
        let item = Uuid::new_v4();
        let low = blend(
            &[content_match(item, 0.3)],
            &[scored(item, 0.5)],
            0.6,
            0.4,
            10,
        );
        let high = blend(
            &[content_match(item, 0.7)],
            &[scored(item, 0.5)],
            0.6,
            0.4,
            10,
        );
        assert!(high[0].blended_score >= low[0].blended_score);

        let low = blend(
            &[content_match(item, 0.5)],
            &[scored(item, 0.2)],
            0.6,
            0.4,
            10,
        );
        let high = blend(
            &[content_match(item, 0.5)],
            &[scored(item, 0.9)],
            0.6,
            0.4,
            10,
        );
        assert!(high[0].blended_score >= low[0].blended_score);
    }

    #[test]
    fn test_sorted_and_truncated() {
        let items: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let content = vec![
            content_match(items[0], 0.2),
            content_match(items[1], 0.9),
            content_match(items[2], 0.5),
        ];

        let results = blend(&content, &[], 1.0, 0.0, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item_id, items[1]);
        assert_eq!(results[1].item_id, items[2]);
    }
}
