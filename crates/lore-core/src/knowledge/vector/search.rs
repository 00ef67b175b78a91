//! Best-first beam search over a proximity graph.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::GraphView;

/// Cosine distance between two unit vectors.
#[inline]
pub(crate) fn distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot(a, b)
}

#[inline]
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit length. Zero vectors are left as is.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Map a cosine distance to a similarity score in 0..=1.
#[inline]
pub(crate) fn score_from_distance(distance: f32) -> f32 {
    ((2.0 - distance) / 2.0).clamp(0.0, 1.0)
}

/// Greedy best-first walk from `entry`, keeping the `beam` closest nodes.
///
/// Stops once the closest unexpanded candidate is farther than the worst
/// kept result. Returns `(id, distance)` sorted closest first.
pub(crate) fn beam_search<G: GraphView + ?Sized>(
    graph: &G,
    query: &[f32],
    entry: u32,
    beam: usize,
) -> Vec<(u32, f32)> {
    let beam = beam.max(1);
    let mut visited = vec![false; graph.node_count()];
    let mut frontier: BinaryHeap<Reverse<(OrderedFloat<f32>, u32)>> = BinaryHeap::new();
    let mut kept: BinaryHeap<(OrderedFloat<f32>, u32)> = BinaryHeap::new();

    let entry_dist = OrderedFloat(graph.distance_to(entry, query));
    visited[entry as usize] = true;
    frontier.push(Reverse((entry_dist, entry)));
    kept.push((entry_dist, entry));

    while let Some(Reverse((dist, node))) = frontier.pop() {
        let worst = kept.peek().map(|(d, _)| *d).unwrap_or(OrderedFloat(f32::MAX));
        if kept.len() >= beam && dist > worst {
            break;
        }

        for neighbor in graph.neighbors(node) {
            let slot = neighbor as usize;
            if slot >= visited.len() || visited[slot] {
                continue;
            }
            visited[slot] = true;

            let d = OrderedFloat(graph.distance_to(neighbor, query));
            let worst = kept.peek().map(|(d, _)| *d).unwrap_or(OrderedFloat(f32::MAX));
            if kept.len() < beam || d < worst {
                frontier.push(Reverse((d, neighbor)));
                kept.push((d, neighbor));
                if kept.len() > beam {
                    kept.pop();
                }
            }
        }
    }

    let mut out: Vec<(u32, f32)> = kept.into_iter().map(|(d, id)| (id, d.0)).collect();
    out.sort_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)).then(a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_and_score() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);

        assert_eq!(score_from_distance(0.0), 1.0);
        assert_eq!(score_from_distance(1.0), 0.5);
        assert_eq!(score_from_distance(2.0), 0.0);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
