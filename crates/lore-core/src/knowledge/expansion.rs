//! Cross-corpus expansion.
//!
//! Follows bridge edges from strong seed results into neighboring
//! corpora. Which bridges apply is a table keyed by the seed's corpus.

use std::collections::{HashMap, HashSet};

use super::cancel::CancellationToken;
use super::models::SearchResult;
use super::ontology::{Corpus, Direction, EdgeType};
use super::traversal::GraphTraversal;
use crate::config::RetrievalConfig;

/// One bridge hop out of a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bridge {
    pub edge_type: EdgeType,
    pub direction: Direction,
    pub target: Corpus,
}

const fn bridge(edge_type: EdgeType, direction: Direction, target: Corpus) -> Bridge {
    Bridge {
        edge_type,
        direction,
        target,
    }
}

const GAMEDATA_BRIDGES: &[Bridge] = &[
    bridge(EdgeType::ImplementedBy, Direction::Forward, Corpus::Code),
    bridge(EdgeType::UiBindsTo, Direction::Reverse, Corpus::Client),
];
const CODE_BRIDGES: &[Bridge] = &[bridge(EdgeType::ImplementedBy, Direction::Reverse, Corpus::Gamedata)];
const CLIENT_BRIDGES: &[Bridge] = &[bridge(EdgeType::UiBindsTo, Direction::Forward, Corpus::Gamedata)];
const DOCS_BRIDGES: &[Bridge] = &[
    bridge(EdgeType::DocsReferences, Direction::Forward, Corpus::Code),
    bridge(EdgeType::DocsReferences, Direction::Forward, Corpus::Gamedata),
];

/// Bridges followed from results in `corpus`.
pub fn bridges_for(corpus: Corpus) -> &'static [Bridge] {
    match corpus {
        Corpus::Gamedata => GAMEDATA_BRIDGES,
        Corpus::Code => CODE_BRIDGES,
        Corpus::Client => CLIENT_BRIDGES,
        Corpus::Docs => DOCS_BRIDGES,
    }
}

/// Tuning knobs for [`expand`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionParams {
    pub min_seed_score: f32,
    pub discount: f32,
    pub min_score: f32,
    pub per_seed: usize,
    pub max_seeds: usize,
}

impl From<&RetrievalConfig> for ExpansionParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            min_seed_score: config.expansion_min_seed_score,
            discount: config.expansion_discount,
            min_score: config.expansion_min_score,
            per_seed: config.expansion_per_seed,
            max_seeds: config.expansion_max_seeds,
        }
    }
}

impl Default for ExpansionParams {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

/// Outcome of one expansion pass.
#[derive(Debug, Default)]
pub struct Expansion {
    pub results: Vec<SearchResult>,
    /// Set when the pass stopped early on cancellation.
    pub cancelled: bool,
}

/// Expand from `seeds`, annotating each seed with the ids it reached.
///
/// Seeds are taken in order; at most `max_seeds` per corpus are used.
/// A traversal error stops expansion for that seed's corpus only.
pub fn expand(
    traversal: &GraphTraversal,
    seeds: &mut [SearchResult],
    params: &ExpansionParams,
    cancel: Option<&CancellationToken>,
) -> Expansion {
    let mut out = Expansion::default();
    let mut seeds_used: HashMap<Corpus, usize> = HashMap::new();
    let mut failed: HashSet<Corpus> = HashSet::new();

    for seed in seeds.iter_mut() {
        if seed.expanded_from_node_id.is_some() || seed.score < params.min_seed_score {
            continue;
        }
        let corpus = seed.corpus;
        if failed.contains(&corpus) {
            continue;
        }
        let used = seeds_used.entry(corpus).or_insert(0);
        if *used >= params.max_seeds {
            continue;
        }
        *used += 1;

        let score = seed.score * params.discount;
        if score < params.min_score {
            continue;
        }

        let mut reached: Vec<SearchResult> = Vec::new();
        for hop in bridges_for(corpus) {
            if reached.len() >= params.per_seed {
                break;
            }
            if cancel.is_some_and(|c| c.is_cancelled()) {
                tracing::debug!(seed = %seed.node_id, "expansion cancelled");
                out.cancelled = true;
                return out;
            }

            let hits = match traversal.bridge(&seed.node_id, hop.edge_type, hop.direction, hop.target) {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(corpus = %corpus, edge = %hop.edge_type, error = %e, "expansion failed, skipping corpus");
                    failed.insert(corpus);
                    break;
                }
            };

            for mut hit in hits {
                if reached.len() >= params.per_seed {
                    break;
                }
                if hit.node_id == seed.node_id || reached.iter().any(|r| r.node_id == hit.node_id) {
                    continue;
                }
                hit.score = score;
                hit.bridged_from = Some(seed.display_name.clone());
                hit.bridge_edge_type = Some(hop.edge_type);
                hit.expanded_from_node_id = Some(seed.node_id.clone());
                reached.push(hit);
            }
        }

        if failed.contains(&corpus) {
            continue;
        }
        for hit in &reached {
            if !seed.connected_node_ids.contains(&hit.node_id) {
                seed.connected_node_ids.push(hit.node_id.clone());
            }
        }
        out.results.extend(reached);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::db::GraphStore;
    use crate::knowledge::models::{Edge, Node, ResultSource};
    use std::sync::Arc;

    fn fixture() -> (GraphTraversal, Arc<GraphStore>) {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        store
            .upsert_nodes(&[
                Node::new("item:torch", "GameData", "Torch", Corpus::Gamedata).with_data_type("item"),
                Node::new("code:torch", "JavaClass", "TorchItem", Corpus::Code),
                Node::new("code:torch2", "JavaClass", "TorchRenderer", Corpus::Code),
                Node::new("ui:slot", "ui", "TorchSlot", Corpus::Client),
                Node::new("doc:light", "DocPage", "Lighting", Corpus::Docs),
            ])
            .unwrap();
        store
            .upsert_edges(&[
                Edge::new("item:torch", "code:torch", EdgeType::ImplementedBy),
                Edge::new("item:torch", "code:torch2", EdgeType::ImplementedBy),
                Edge::new("ui:slot", "item:torch", EdgeType::UiBindsTo),
                Edge::new("doc:light", "item:torch", EdgeType::DocsReferences),
            ])
            .unwrap();
        (GraphTraversal::new(Arc::clone(&store)), store)
    }

    fn seed(store: &GraphStore, id: &str, score: f32) -> SearchResult {
        let node = store.get_node(id).unwrap().unwrap();
        SearchResult::from_node(&node, score, ResultSource::Vector, 100)
    }

    #[test]
    fn test_every_corpus_has_bridges() {
        for corpus in Corpus::ALL {
            let bridges = bridges_for(corpus);
            assert!(!bridges.is_empty());
            assert!(bridges.iter().all(|b| b.edge_type.is_bridge() && b.target != corpus));
        }
    }

    #[test]
    fn test_gamedata_seed_reaches_code_and_client() {
        let (traversal, store) = fixture();
        let mut seeds = vec![seed(&store, "item:torch", 1.0)];
        let params = ExpansionParams {
            per_seed: 5,
            ..ExpansionParams::default()
        };

        let expansion = expand(&traversal, &mut seeds, &params, None);
        let ids: Vec<&str> = expansion.results.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["code:torch", "code:torch2", "ui:slot"]);

        let first = &expansion.results[0];
        assert!((first.score - 0.8).abs() < 1e-6);
        assert_eq!(first.bridged_from.as_deref(), Some("Torch"));
        assert_eq!(first.bridge_edge_type, Some(EdgeType::ImplementedBy));
        assert_eq!(first.expanded_from_node_id.as_deref(), Some("item:torch"));
        assert_eq!(expansion.results[2].bridge_edge_type, Some(EdgeType::UiBindsTo));

        assert_eq!(seeds[0].connected_node_ids, vec!["code:torch", "code:torch2", "ui:slot"]);
    }

    #[test]
    fn test_per_seed_cap_and_weak_seeds() {
        let (traversal, store) = fixture();
        let params = ExpansionParams {
            per_seed: 1,
            ..ExpansionParams::default()
        };

        let mut seeds = vec![seed(&store, "item:torch", 0.5), seed(&store, "doc:light", 0.001)];
        let expansion = expand(&traversal, &mut seeds, &params, None);
        assert_eq!(expansion.results.len(), 1);
        assert_eq!(expansion.results[0].node_id, "code:torch");
        assert!(seeds[1].connected_node_ids.is_empty());
    }

    #[test]
    fn test_code_and_client_bridge_back_to_gamedata() {
        let (traversal, store) = fixture();
        let mut seeds = vec![seed(&store, "code:torch", 1.0), seed(&store, "ui:slot", 1.0)];
        let expansion = expand(&traversal, &mut seeds, &ExpansionParams::default(), None);

        assert_eq!(expansion.results.len(), 2);
        assert!(expansion.results.iter().all(|r| r.node_id == "item:torch"));
        assert_eq!(expansion.results[0].bridged_from.as_deref(), Some("TorchItem"));
        assert_eq!(expansion.results[1].bridged_from.as_deref(), Some("TorchSlot"));
    }

    #[test]
    fn test_cancelled_before_first_hop() {
        let (traversal, store) = fixture();
        let token = CancellationToken::new();
        token.cancel();

        let mut seeds = vec![seed(&store, "item:torch", 1.0)];
        let expansion = expand(&traversal, &mut seeds, &ExpansionParams::default(), Some(&token));
        assert!(expansion.cancelled);
        assert!(expansion.results.is_empty());
    }

    #[test]
    fn test_expansion_results_are_not_reexpanded() {
        let (traversal, store) = fixture();
        let mut bridged = seed(&store, "code:torch", 1.0);
        bridged.expanded_from_node_id = Some("item:torch".to_string());
        let mut seeds = vec![bridged];

        let expansion = expand(&traversal, &mut seeds, &ExpansionParams::default(), None);
        assert!(expansion.results.is_empty());
    }
}
