//! Content-based recommendation: profile text construction from recent
//! history and ranked semantic retrieval against candidate vectors.

use tracing::debug;
use uuid::Uuid;

use crate::similarity::cosine_similarity;
use crate::types::{round_to, ContentMatch, ItemDocument};

/// How many recently-engaged items feed the profile text.
pub const RECENT_HISTORY: usize = 5;
/// Per-item synopsis excerpt length, in characters.
pub const SYNOPSIS_EXCERPT: usize = 200;
/// Overall profile budget, in whitespace tokens, to bound embedding cost.
pub const PROFILE_TOKEN_BUDGET: usize = 500;

/// Build the query text describing a user's recent taste: title, synopsis
/// excerpt and genre of the most recent items, joined and capped.
pub fn build_profile(recent_items: &[ItemDocument]) -> String {
    build_profile_with_limits(
        recent_items,
        RECENT_HISTORY,
        SYNOPSIS_EXCERPT,
        PROFILE_TOKEN_BUDGET,
    )
}

/// Fully parameterized variant used by the engine facade.
pub fn build_profile_with_limits(
    recent_items: &[ItemDocument],
    recent_history: usize,
    synopsis_excerpt: usize,
    token_budget: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    for item in recent_items.iter().take(recent_history) {
        parts.push(item.title.clone());
        if !item.synopsis.is_empty() {
            parts.push(item.synopsis.chars().take(synopsis_excerpt).collect());
        }
        if !item.genre.is_empty() {
            parts.push(item.genre.clone());
        }
    }

    let joined = parts.join(" ");
    let capped: Vec<&str> = joined.split_whitespace().take(token_budget).collect();
    capped.join(" ")
}

/// Rank candidate vectors against the query vector. Only strictly positive
/// similarities survive; the result is sorted descending and truncated to
/// `k`, each entry carrying a relevance percentage rounded to one decimal.
pub fn rank(query_vector: &[f32], candidates: &[(Uuid, Vec<f32>)], k: usize) -> Vec<ContentMatch> {
    let mut matches: Vec<ContentMatch> = candidates
        .iter()
        .filter_map(|(item_id, vector)| {
            let similarity = cosine_similarity(query_vector, vector);
            (similarity > 0.0).then(|| ContentMatch {
                item_id: *item_id,
                similarity,
                relevance_percentage: round_to(similarity * 100.0, 1),
            })
        })
        .collect();

    matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
    matches.truncate(k);

    debug!(candidates = candidates.len(), matched = matches.len(), "content ranking");
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, synopsis: &str, genre: &str) -> ItemDocument {
        ItemDocument {
            id: Uuid::new_v4(),
            title: title.to_string(),
            synopsis: synopsis.to_string(),
            genre: genre.to_string(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_profile_uses_five_most_recent() {
        let items: Vec<ItemDocument> = (0..7)
            .map(|i| doc(&format!("title{}", i), "", &format!("genre{}", i)))
            .collect();

        let profile = build_profile(&items);
        assert!(profile.contains("title0"));
        assert!(profile.contains("title4"));
        assert!(!profile.contains("title5"));
        assert!(!profile.contains("title6"));
    }

    #[test]
    fn test_profile_truncates_synopsis() {
        let long_synopsis = "word ".repeat(100);
        let items = vec![doc("Tides", &long_synopsis, "oceanography")];

        let profile = build_profile(&items);
        // Title + 200-char excerpt + genre.
        assert!(profile.starts_with("Tides word"));
        assert!(profile.ends_with("oceanography"));
        assert!(profile.len() <= "Tides ".len() + SYNOPSIS_EXCERPT + " oceanography".len());
    }

    #[test]
    fn test_profile_token_budget() {
        let many_words = "w ".repeat(400);
        let items: Vec<ItemDocument> = (0..5).map(|_| doc("t", &many_words, "g")).collect();

        let profile = build_profile(&items);
        assert_eq!(profile.split_whitespace().count(), PROFILE_TOKEN_BUDGET);
    }

    #[test]
    fn test_profile_skips_empty_fields() {
        let items = vec![doc("Only Title", "", "")];
        assert_eq!(build_profile(&items), "Only Title");
    }

    #[test]
    fn test_rank_keeps_positive_only() {
        let query = vec![1.0, 0.0];
        let close = Uuid::new_v4();
        let orthogonal = Uuid::new_v4();
        let opposed = Uuid::new_v4();
        let candidates = vec![
            (close, vec![0.9, 0.1]),
            (orthogonal, vec![0.0, 1.0]),
            (opposed, vec![-1.0, 0.0]),
        ];

        let results = rank(&query, &candidates, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id, close);
        assert!(results[0].similarity > 0.0);
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let query = vec![1.0, 0.0];
        let candidates: Vec<(Uuid, Vec<f32>)> = vec![
            (Uuid::new_v4(), vec![0.5, 0.5]),
            (Uuid::new_v4(), vec![1.0, 0.0]),
            (Uuid::new_v4(), vec![0.8, 0.2]),
        ];

        let results = rank(&query, &candidates, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item_id, candidates[1].0);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[test]
    fn test_rank_relevance_percentage_rounding() {
        let query = vec![1.0, 0.0];
        let candidates = vec![(Uuid::new_v4(), vec![1.0, 0.0])];

        let results = rank(&query, &candidates, 1);
        assert!((results[0].relevance_percentage - 100.0).abs() < 1e-6);

        let candidates = vec![(Uuid::new_v4(), vec![1.0, 1.0])];
        let results = rank(&query, &candidates, 1);
        // cos = 0.7071 -> 70.7
        assert!((results[0].relevance_percentage - 70.7).abs() < 1e-6);
    }

    #[test]
    fn test_rank_zero_query_is_empty() {
        let candidates = vec![(Uuid::new_v4(), vec![1.0, 0.0])];
        assert!(rank(&[0.0, 0.0], &candidates, 5).is_empty());
    }
}
