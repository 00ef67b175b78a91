//! Approximate nearest-neighbor index over chunk embeddings.
//!
//! One index per corpus. Slot `i` holds the embedding of the node whose
//! `chunk_index` is `i`. An index is built in memory, saved to a single
//! file and later served from a read-only memory map.

mod disk;
mod graph;
mod search;

use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::KnowledgeError;
use crate::config::IndexConfig;
use disk::DiskGraph;
use graph::MemoryGraph;
use search::{beam_search, normalize, score_from_distance};

/// Read access shared by the in-memory and mapped graphs.
pub(crate) trait GraphView {
    fn node_count(&self) -> usize;
    fn dimension(&self) -> usize;
    fn entry_point(&self) -> u32;
    /// Cosine distance between node `id` and a unit `query`.
    fn distance_to(&self, id: u32, query: &[f32]) -> f32;
    fn neighbors(&self, id: u32) -> Vec<u32>;
}

/// Graph construction and search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    /// Maximum out-degree per node.
    pub max_degree: usize,
    /// Beam width while inserting.
    pub construction_beam: usize,
    /// Beam width while querying; raised to `k` when smaller.
    pub search_beam: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexConfig::default().into()
    }
}

impl From<IndexConfig> for IndexParams {
    fn from(config: IndexConfig) -> Self {
        Self {
            max_degree: config.max_degree,
            construction_beam: config.construction_beam,
            search_beam: config.search_beam,
        }
    }
}

enum IndexState {
    Empty,
    Memory(MemoryGraph),
    Disk(DiskGraph),
}

/// A per-corpus vector index.
pub struct VectorIndex {
    params: IndexParams,
    state: IndexState,
    fingerprint: [u8; 32],
    /// Set after an explicit build or load, even of zero vectors.
    loaded: bool,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("params", &self.params)
            .field("len", &self.len())
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl VectorIndex {
    pub fn new(params: IndexParams) -> Self {
        Self {
            params,
            state: IndexState::Empty,
            fingerprint: [0u8; 32],
            loaded: false,
        }
    }

    /// Map a saved index.
    pub fn open(path: &Path, params: IndexParams) -> Result<Self, KnowledgeError> {
        let mut index = Self::new(params);
        index.load(path)?;
        Ok(index)
    }

    /// Build from embeddings; slot `i` is `vectors[i]`. Replaces any
    /// previous contents. Returns the number of indexed vectors.
    pub fn build(&mut self, vectors: &[Vec<f32>]) -> Result<usize, KnowledgeError> {
        if let Some(first) = vectors.first() {
            let dim = first.len();
            if dim == 0 {
                return Err(KnowledgeError::Index("zero-dimension vectors".to_string()));
            }
            if let Some((slot, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
                return Err(KnowledgeError::Index(format!(
                    "vector {} has dimension {}, expected {}",
                    slot,
                    v.len(),
                    dim
                )));
            }
            if let Some(slot) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
                return Err(KnowledgeError::Index(format!("vector {} has non-finite values", slot)));
            }
        }

        let started = std::time::Instant::now();
        let graph = MemoryGraph::build(vectors, &self.params);
        tracing::info!(
            vectors = vectors.len(),
            max_degree = self.params.max_degree,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built vector index"
        );

        self.state = if vectors.is_empty() {
            IndexState::Empty
        } else {
            IndexState::Memory(graph)
        };
        self.loaded = true;
        Ok(vectors.len())
    }

    /// Persist to `path`. The write lands through a rename so readers
    /// never see a partial file.
    pub fn save(&self, path: &Path) -> Result<(), KnowledgeError> {
        let empty;
        let graph = match &self.state {
            IndexState::Memory(graph) => graph,
            IndexState::Empty if self.loaded => {
                empty = MemoryGraph::build(&[], &self.params);
                &empty
            }
            IndexState::Empty => return Err(KnowledgeError::IndexNotLoaded),
            IndexState::Disk(_) => {
                return Err(KnowledgeError::Index(
                    "index is memory-mapped; rebuild before saving".to_string(),
                ))
            }
        };
        disk::write(path, graph, self.params.max_degree.max(1), self.fingerprint)?;
        tracing::debug!(path = %path.display(), vectors = graph.adjacency.len(), "saved vector index");
        Ok(())
    }

    /// Replace contents with the index stored at `path`.
    pub fn load(&mut self, path: &Path) -> Result<(), KnowledgeError> {
        let mapped = DiskGraph::open(path)?;
        self.fingerprint = mapped.header().fingerprint;
        self.state = if mapped.node_count() == 0 {
            IndexState::Empty
        } else {
            IndexState::Disk(mapped)
        };
        self.loaded = true;
        tracing::debug!(path = %path.display(), vectors = self.len(), "loaded vector index");
        Ok(())
    }

    /// Release the graph. Later queries fail until the next build or load.
    pub fn close(&mut self) {
        self.state = IndexState::Empty;
        self.loaded = false;
    }

    /// Nearest `k` slots to `query` as `(slot, score)`, best first.
    /// Scores are in 0..=1. Fewer than `k` come back from a small index.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, KnowledgeError> {
        if !self.loaded {
            return Err(KnowledgeError::IndexNotLoaded);
        }
        match &self.state {
            IndexState::Empty => Ok(Vec::new()),
            IndexState::Memory(graph) => self.query_graph(graph, query, k),
            IndexState::Disk(graph) => self.query_graph(graph, query, k),
        }
    }

    fn query_graph<G: GraphView>(&self, graph: &G, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, KnowledgeError> {
        if query.len() != graph.dimension() {
            return Err(KnowledgeError::Index(format!(
                "query has dimension {}, index has {}",
                query.len(),
                graph.dimension()
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut unit = query.to_vec();
        normalize(&mut unit);

        let beam = self.params.search_beam.max(k);
        let hits = beam_search(graph, &unit, graph.entry_point(), beam);
        Ok(hits
            .into_iter()
            .take(k)
            .map(|(id, distance)| (id, score_from_distance(distance)))
            .collect())
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        match &self.state {
            IndexState::Empty => 0,
            IndexState::Memory(graph) => graph.node_count(),
            IndexState::Disk(graph) => graph.node_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True after a successful build or load.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Vector dimension, if any vectors are indexed.
    pub fn dimension(&self) -> Option<usize> {
        match &self.state {
            IndexState::Empty => None,
            IndexState::Memory(graph) => Some(graph.dimension()),
            IndexState::Disk(graph) => Some(graph.dimension()),
        }
    }

    /// Record which embedding model produced the vectors.
    pub fn set_model_id(&mut self, model_id: &str) {
        self.fingerprint = fingerprint(model_id);
    }

    /// Whether the index was built with `model_id`.
    pub fn matches_model(&self, model_id: &str) -> bool {
        self.fingerprint == fingerprint(model_id)
    }
}

fn fingerprint(model_id: &str) -> [u8; 32] {
    let digest = Sha256::digest(model_id.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
