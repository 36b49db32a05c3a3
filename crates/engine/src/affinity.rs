//! User-item affinity aggregation.
//!
//! Builds a dense user x item matrix from the three interaction feeds. Each
//! signal type has a fixed contribution formula with its own cap, enforced
//! before summation, so no single signal can dominate unboundedly. The
//! matrix is a pure value rebuilt on demand; there is no hidden instance
//! state and no incremental update path.

use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use crate::types::{InteractionKind, InteractionSignals};

const ENGAGEMENT_COUNT_STEP: f32 = 0.3;
const ENGAGEMENT_FULL_CREDIT_MINUTES: f32 = 60.0;
const RATING_SCALE: f32 = 5.0;
const RATING_CAP: f32 = 0.8;
const VIEW_STEP: f32 = 0.1;
const VIEW_COUNT_CAP: u32 = 5;
const DOWNLOAD_WEIGHT: f32 = 0.6;
const BOOKMARK_WEIGHT: f32 = 0.5;
const SHARE_WEIGHT: f32 = 0.4;
const OTHER_SCALE: f32 = 0.3;

/// Dense affinity matrix over the known user and item universe.
///
/// Scores are non-negative sums of capped contributions (theoretical max
/// around 2.3). Row and column iteration preserve the input enumeration
/// order, which keeps downstream tie-breaks stable.
#[derive(Debug, Clone)]
pub struct AffinityMatrix {
    users: Vec<Uuid>,
    items: Vec<Uuid>,
    rows: HashMap<Uuid, HashMap<Uuid, f32>>,
}

impl AffinityMatrix {
    pub fn users(&self) -> &[Uuid] {
        &self.users
    }

    pub fn items(&self) -> &[Uuid] {
        &self.items
    }

    pub fn contains_user(&self, user_id: Uuid) -> bool {
        self.rows.contains_key(&user_id)
    }

    /// Affinity score for a cell; 0 for unknown users or items.
    pub fn score(&self, user_id: Uuid, item_id: Uuid) -> f32 {
        self.rows
            .get(&user_id)
            .and_then(|row| row.get(&item_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// A user's row as a dense vector in item enumeration order.
    pub fn row_vector(&self, user_id: Uuid) -> Option<Vec<f32>> {
        let row = self.rows.get(&user_id)?;
        Some(self.items.iter().map(|item| row[item]).collect())
    }

    /// Items the user has positively engaged with.
    pub fn engaged_items(&self, user_id: Uuid) -> HashSet<Uuid> {
        match self.rows.get(&user_id) {
            Some(row) => row
                .iter()
                .filter(|(_, score)| **score > 0.0)
                .map(|(item, _)| *item)
                .collect(),
            None => HashSet::new(),
        }
    }
}

/// Build the affinity matrix for the given user/item universe from the
/// three interaction feeds. Returns `None` when either enumeration is
/// empty. Signal rows referencing users or items outside the universe are
/// silently ignored.
pub fn build_matrix(
    users: &[Uuid],
    items: &[Uuid],
    signals: &InteractionSignals,
) -> Option<AffinityMatrix> {
    if users.is_empty() || items.is_empty() {
        return None;
    }

    let mut rows: HashMap<Uuid, HashMap<Uuid, f32>> = HashMap::with_capacity(users.len());
    for user_id in users {
        let row: HashMap<Uuid, f32> = items.iter().map(|item_id| (*item_id, 0.0)).collect();
        rows.insert(*user_id, row);
    }

    // Implicit engagement: average of a per-read count weight and a
    // duration weight, each capped at 1.0.
    for record in &signals.engagements {
        if let Some(cell) = cell_mut(&mut rows, record.user_id, record.item_id) {
            let count_weight = (record.count as f32 * ENGAGEMENT_COUNT_STEP).min(1.0);
            let duration_weight = (record.total_minutes / ENGAGEMENT_FULL_CREDIT_MINUTES).min(1.0);
            *cell += (count_weight + duration_weight) / 2.0;
        }
    }

    // Explicit ratings: only helpful rows with a positive value count,
    // averaged per (user, item) and scaled to at most 0.8.
    let mut rating_sums: HashMap<(Uuid, Uuid), (f32, u32)> = HashMap::new();
    for record in &signals.ratings {
        if record.helpful && record.rating > 0.0 {
            let entry = rating_sums
                .entry((record.user_id, record.item_id))
                .or_insert((0.0, 0));
            entry.0 += record.rating;
            entry.1 += 1;
        }
    }
    for ((user_id, item_id), (sum, count)) in rating_sums {
        if let Some(cell) = cell_mut(&mut rows, user_id, item_id) {
            let avg_rating = sum / count as f32;
            *cell += (avg_rating / RATING_SCALE) * RATING_CAP;
        }
    }

    // Typed interactions: fixed per-kind weight, grouped per
    // (user, item, kind).
    let mut interaction_groups: HashMap<(Uuid, Uuid, InteractionKind), (f32, u32)> = HashMap::new();
    for record in &signals.interactions {
        let entry = interaction_groups
            .entry((record.user_id, record.item_id, record.kind))
            .or_insert((0.0, 0));
        entry.0 += record.value;
        entry.1 += 1;
    }
    for ((user_id, item_id, kind), (value_sum, count)) in interaction_groups {
        if let Some(cell) = cell_mut(&mut rows, user_id, item_id) {
            let weight = match kind {
                InteractionKind::View => VIEW_STEP * count.min(VIEW_COUNT_CAP) as f32,
                InteractionKind::Download => DOWNLOAD_WEIGHT,
                InteractionKind::Bookmark => BOOKMARK_WEIGHT,
                InteractionKind::Share => SHARE_WEIGHT,
                InteractionKind::Other => (value_sum / count as f32) * OTHER_SCALE,
            };
            *cell += weight;
        }
    }

    debug!(
        users = users.len(),
        items = items.len(),
        "built affinity matrix"
    );

    Some(AffinityMatrix {
        users: users.to_vec(),
        items: items.to_vec(),
        rows,
    })
}

fn cell_mut(
    rows: &mut HashMap<Uuid, HashMap<Uuid, f32>>,
    user_id: Uuid,
    item_id: Uuid,
) -> Option<&mut f32> {
    rows.get_mut(&user_id).and_then(|row| row.get_mut(&item_id))
}
