//! Cosine similarity and nearest-neighbor selection over affinity rows.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::affinity::AffinityMatrix;

/// Standard cosine similarity in [-1, 1]. Returns 0 for zero-magnitude or
/// length-mismatched vectors so ranking stays a total function.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);

    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// A user with positive affinity-row similarity to the target user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighbor {
    pub user_id: Uuid,
    pub similarity: f32,
}

/// The target user's `k` most similar users, positive similarities only,
/// sorted descending. The sort is stable, so ties keep the matrix's user
/// enumeration order.
pub fn top_k_neighbors(matrix: &AffinityMatrix, user_id: Uuid, k: usize) -> Vec<Neighbor> {
    let Some(target_row) = matrix.row_vector(user_id) else {
        return Vec::new();
    };

    let mut neighbors: Vec<Neighbor> = matrix
        .users()
        .iter()
        .filter(|other| **other != user_id)
        .filter_map(|other| {
            let row = matrix.row_vector(*other)?;
            let similarity = cosine_similarity(&target_row, &row);
            (similarity > 0.0).then_some(Neighbor {
                user_id: *other,
                similarity,
            })
        })
        .collect();

    neighbors.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
    neighbors.truncate(k);
    neighbors
}
