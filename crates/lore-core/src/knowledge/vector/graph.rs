//! In-memory proximity graph and its construction.

use ordered_float::OrderedFloat;

use super::search::{beam_search, distance, normalize};
use super::{GraphView, IndexParams};

/// Flat vectors plus one bounded adjacency list per node.
#[derive(Debug, Clone)]
pub(crate) struct MemoryGraph {
    pub(crate) dimension: usize,
    pub(crate) vectors: Vec<f32>,
    pub(crate) adjacency: Vec<Vec<u32>>,
    pub(crate) entry: u32,
}

impl MemoryGraph {
    /// Build a graph over `vectors`. Ids are positions in the input.
    ///
    /// Vectors must be non-empty and share one dimension; the caller
    /// checks both.
    pub(crate) fn build(vectors: &[Vec<f32>], params: &IndexParams) -> Self {
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for v in vectors {
            let mut unit = v.clone();
            normalize(&mut unit);
            flat.extend_from_slice(&unit);
        }

        let mut graph = Self {
            dimension,
            vectors: flat,
            adjacency: Vec::with_capacity(vectors.len()),
            entry: 0,
        };

        let max_degree = params.max_degree.max(1);
        for id in 0..vectors.len() as u32 {
            graph.insert(id, max_degree, params.construction_beam);
        }

        graph.entry = graph.medoid();
        graph
    }

    fn vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    fn insert(&mut self, id: u32, max_degree: usize, beam: usize) {
        self.adjacency.push(Vec::new());
        if id == 0 {
            return;
        }

        let query = self.vector(id).to_vec();
        // Search only the nodes inserted so far
        let candidates: Vec<(u32, f32)> = beam_search(&Partial { graph: self, upto: id }, &query, 0, beam.max(max_degree))
            .into_iter()
            .filter(|(other, _)| *other != id)
            .collect();

        let selected = self.select_neighbors(&candidates, max_degree);
        self.adjacency[id as usize] = selected.clone();

        for neighbor in selected {
            let list = &mut self.adjacency[neighbor as usize];
            if list.contains(&id) {
                continue;
            }
            list.push(id);
            if list.len() > max_degree {
                self.prune(neighbor, max_degree);
            }
        }
    }

    /// Diversity heuristic: keep a candidate only if it is closer to the
    /// base than to every neighbor already kept, then fill up with the
    /// closest rejects.
    fn select_neighbors(&self, candidates: &[(u32, f32)], max_degree: usize) -> Vec<u32> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by_key(|(id, d)| (OrderedFloat(*d), *id));

        let mut kept: Vec<u32> = Vec::with_capacity(max_degree);
        let mut rejected: Vec<u32> = Vec::new();

        for (candidate, dist_to_base) in sorted {
            if kept.len() >= max_degree {
                break;
            }
            let cv = self.vector(candidate);
            let diverse = kept.iter().all(|k| distance(cv, self.vector(*k)) > dist_to_base);
            if diverse {
                kept.push(candidate);
            } else {
                rejected.push(candidate);
            }
        }

        for candidate in rejected {
            if kept.len() >= max_degree {
                break;
            }
            kept.push(candidate);
        }
        kept
    }

    fn prune(&mut self, node: u32, max_degree: usize) {
        let base = self.vector(node);
        let candidates: Vec<(u32, f32)> = self.adjacency[node as usize]
            .iter()
            .map(|n| (*n, distance(base, self.vector(*n))))
            .collect();
        let selected = self.select_neighbors(&candidates, max_degree);
        self.adjacency[node as usize] = selected;
    }

    /// Node closest to the centroid.
    fn medoid(&self) -> u32 {
        let count = self.adjacency.len();
        if count == 0 {
            return 0;
        }

        let mut centroid = vec![0.0f32; self.dimension];
        for id in 0..count as u32 {
            for (c, x) in centroid.iter_mut().zip(self.vector(id)) {
                *c += x;
            }
        }
        normalize(&mut centroid);

        (0..count as u32)
            .min_by_key(|id| (OrderedFloat(distance(self.vector(*id), &centroid)), *id))
            .unwrap_or(0)
    }
}

impl GraphView for MemoryGraph {
    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn entry_point(&self) -> u32 {
        self.entry
    }

    fn distance_to(&self, id: u32, query: &[f32]) -> f32 {
        distance(self.vector(id), query)
    }

    fn neighbors(&self, id: u32) -> Vec<u32> {
        self.adjacency[id as usize].clone()
    }
}

/// View of the first `upto` nodes while the graph is still growing.
struct Partial<'a> {
    graph: &'a MemoryGraph,
    upto: u32,
}

impl GraphView for Partial<'_> {
    fn node_count(&self) -> usize {
        self.upto as usize
    }

    fn dimension(&self) -> usize {
        self.graph.dimension
    }

    fn entry_point(&self) -> u32 {
        0
    }

    fn distance_to(&self, id: u32, query: &[f32]) -> f32 {
        self.graph.distance_to(id, query)
    }

    fn neighbors(&self, id: u32) -> Vec<u32> {
        self.graph.adjacency[id as usize]
            .iter()
            .copied()
            .filter(|n| *n < self.upto)
            .collect()
    }
}
