//! Reciprocal rank fusion and result deduplication.

use std::collections::{HashMap, HashSet};

use super::models::{ResultSource, SearchResult};
use crate::config::DEFAULT_RRF_K;

/// Fuses ranked lists by reciprocal rank.
#[derive(Debug, Clone, Copy)]
pub struct HybridScorer {
    k: f32,
}

impl Default for HybridScorer {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl HybridScorer {
    pub fn new(k: f32) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f32 {
        self.k
    }

    /// Merge ranked lists into one.
    ///
    /// Each list contributes `1 / (k + rank + 1)` for the first occurrence
    /// of a node. Totals are sorted descending, ties keep first-seen order,
    /// and every output result is tagged [`ResultSource::Hybrid`].
    pub fn merge_rrf(&self, lists: &[Vec<SearchResult>], limit: usize) -> Vec<SearchResult> {
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut merged: Vec<SearchResult> = Vec::new();

        for list in lists {
            let mut seen_in_list: HashSet<&str> = HashSet::new();
            for (rank, result) in list.iter().enumerate() {
                if !seen_in_list.insert(result.node_id.as_str()) {
                    continue;
                }
                let contribution = 1.0 / (self.k + rank as f32 + 1.0);

                match slots.get(&result.node_id) {
                    Some(&slot) => {
                        let existing = &mut merged[slot];
                        existing.score += contribution;
                        merge_provenance(existing, result);
                    }
                    None => {
                        let mut fused = result.clone();
                        fused.score = contribution;
                        fused.source = ResultSource::Hybrid;
                        slots.insert(result.node_id.clone(), merged.len());
                        merged.push(fused);
                    }
                }
            }
        }

        sort_by_score(&mut merged);
        merged.truncate(limit);
        merged
    }
}

/// Collapse duplicates by node id, keeping the higher score.
///
/// Empty provenance on the kept copy is filled from the other one and
/// connected ids are unioned. Output keeps first-occurrence order.
pub fn deduplicate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<SearchResult> = Vec::with_capacity(results.len());

    for result in results {
        match slots.get(&result.node_id) {
            Some(&slot) => {
                let existing = &mut out[slot];
                if result.score > existing.score {
                    let mut winner = result;
                    merge_provenance(&mut winner, existing);
                    *existing = winner;
                } else {
                    merge_provenance(existing, &result);
                }
            }
            None => {
                slots.insert(result.node_id.clone(), out.len());
                out.push(result);
            }
        }
    }
    out
}

/// Stable sort, best first.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Fill `into`'s empty provenance from `other`; `into` wins when both
/// carry a value.
fn merge_provenance(into: &mut SearchResult, other: &SearchResult) {
    if into.bridged_from.is_none() {
        into.bridged_from = other.bridged_from.clone();
    }
    if into.bridge_edge_type.is_none() {
        into.bridge_edge_type = other.bridge_edge_type;
    }
    if into.expanded_from_node_id.is_none() {
        into.expanded_from_node_id = other.expanded_from_node_id.clone();
    }
    for id in &other.connected_node_ids {
        if !into.connected_node_ids.contains(id) {
            into.connected_node_ids.push(id.clone());
        }
    }
}
