//! DBSCAN over a precomputed distance matrix.

use crate::models::NOISE;

/// Label every point of `distances` with a cluster id or [`NOISE`].
///
/// A point's neighbourhood is every point within `eps` (inclusive), itself
/// included. Points with at least `min_samples` neighbours are core points;
/// clusters grow from core points and absorb the border points they reach.
/// Clusters are numbered from 0 in the order their first core point appears.
///
/// `distances` must be square.
pub fn dbscan(distances: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<i32> {
    let n = distances.len();
    let neighbours: Vec<Vec<usize>> = distances
        .iter()
        .enumerate()
        .map(|(i, row)| {
            (0..n)
                .filter(|&j| i == j || row[j] <= eps)
                .collect::<Vec<_>>()
        })
        .collect();
    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_samples).collect();

    let mut labels = vec![NOISE; n];
    let mut next_label = 0;

    for start in 0..n {
        if labels[start] != NOISE || !is_core[start] {
            continue;
        }
        labels[start] = next_label;
        let mut frontier = vec![start];

        while let Some(point) = frontier.pop() {
            for &q in &neighbours[point] {
                if labels[q] != NOISE {
                    continue;
                }
                labels[q] = next_label;
                // border points join but do not extend the cluster
                if is_core[q] {
                    frontier.push(q);
                }
            }
        }
        next_label += 1;
    }

    labels
}
