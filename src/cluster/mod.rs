//! Near-duplicate collapsing for batches of embedded articles.
//!
//! Articles covering the same event tend to have close embeddings. This module
//! groups them with DBSCAN over cosine distance and keeps one representative
//! per group, so downstream reports mention each event once.
//!
//! # Pipeline
//!
//! 1. [`assign_clusters`]: cosine similarity → clamped distance → DBSCAN labels
//! 2. [`representative::promote_exclusive_noise`]: exclusive articles left as
//!    noise become their own singleton cluster
//! 3. [`extract_representatives`]: one article per cluster, every noise
//!    article kept
//!
//! [`deduplicate`] runs all three.

pub mod dbscan;
pub mod representative;

use crate::models::{ArticleRecord, NOISE};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, instrument};

pub use dbscan::dbscan;
pub use representative::{RepresentativePolicy, promote_exclusive_noise, select_representative};

#[derive(Debug, Error, PartialEq)]
pub enum ClusterError {
    #[error("article {id} has no embedding; embed the batch before clustering")]
    MissingEmbedding { id: String },
    #[error("article {id} has a {found}-dimensional embedding, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid clustering parameters: {0}")]
    InvalidParams(String),
}

/// DBSCAN settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Maximum cosine distance between neighbours.
    pub eps: f32,
    /// Neighbourhood size, the point itself included, for a core point.
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: 0.3,
            min_samples: 2,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<(), ClusterError> {
        if !(0.0..=1.0).contains(&self.eps) {
            return Err(ClusterError::InvalidParams(format!(
                "eps must be within [0, 1], got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(ClusterError::InvalidParams(
                "min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cosine similarity; 0 when either vector is zero or lengths differ.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

/// Cosine distance in [0, 1]. Rounding can push similarity of near-identical
/// vectors slightly above 1, so it is clamped first.
#[inline]
pub fn similarity_to_distance(similarity: f32) -> f32 {
    (1.0 - similarity.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

/// Symmetric N×N cosine distance matrix with a zero diagonal.
pub fn distance_matrix(vectors: &[&[f32]]) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut distances = vec![vec![0.0_f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = similarity_to_distance(cosine_similarity(vectors[i], vectors[j]));
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }
    distances
}

/// Label every record with a DBSCAN cluster id or [`NOISE`].
///
/// Every record must carry an embedding, and all embeddings must share one
/// length.
#[instrument(level = "info", skip_all, fields(count = records.len(), eps = params.eps, min_samples = params.min_samples))]
pub fn assign_clusters(records: &mut [ArticleRecord], params: &ClusterParams) -> Result<(), ClusterError> {
    params.validate()?;

    let mut vectors: Vec<&[f32]> = Vec::with_capacity(records.len());
    for record in records.iter() {
        let embedding = record
            .embedding
            .as_deref()
            .ok_or_else(|| ClusterError::MissingEmbedding { id: record.id.clone() })?;
        if let Some(first) = vectors.first()
            && first.len() != embedding.len()
        {
            return Err(ClusterError::DimensionMismatch {
                id: record.id.clone(),
                expected: first.len(),
                found: embedding.len(),
            });
        }
        vectors.push(embedding);
    }

    let distances = distance_matrix(&vectors);
    let labels = dbscan(&distances, params.eps, params.min_samples);

    for (record, label) in records.iter_mut().zip(labels) {
        record.cluster = Some(label);
    }

    let noise = records.iter().filter(|r| r.is_noise()).count();
    let clusters = records
        .iter()
        .filter_map(|r| r.cluster)
        .filter(|&c| c != NOISE)
        .unique()
        .count();
    info!(clusters, noise, "Clustered articles");
    Ok(())
}

/// Collapse each cluster to its representative; keep all noise records.
///
/// Records without a cluster label are kept as if they were noise. Output is
/// in input order.
pub fn extract_representatives(records: Vec<ArticleRecord>, policy: &RepresentativePolicy) -> Vec<ArticleRecord> {
    let groups = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.cluster.filter(|&c| c != NOISE).map(|c| (c, i)))
        .into_group_map();

    let mut keep: HashSet<usize> = HashSet::new();
    for members in groups.values() {
        let group: Vec<&ArticleRecord> = members.iter().map(|&i| &records[i]).collect();
        if let Some(chosen) = select_representative(&group, policy) {
            keep.insert(members[chosen]);
        }
    }

    records
        .into_iter()
        .enumerate()
        .filter(|(i, r)| keep.contains(i) || r.cluster.is_none_or(|c| c == NOISE))
        .map(|(_, r)| r)
        .collect()
}

/// Cluster, apply the exclusive-article override, and keep representatives.
///
/// # Arguments
///
/// * `records` - Articles that all carry an embedding
/// * `params` - DBSCAN `eps` (cosine distance) and `min_samples`
/// * `policy` - Exclusive markers and outlet priority for representatives
///
/// # Returns
///
/// The kept articles in input order, each with its cluster label: one
/// representative per cluster, every noise article, and exclusive articles
/// promoted out of noise into their own cluster.
///
/// # Examples
///
/// ```ignore
/// let kept = deduplicate(records, &ClusterParams { eps: 0.3, min_samples: 2 }, &policy)?;
/// rowstore::write_rows(&output, &kept).await?;
/// ```
///
/// # Errors
///
/// Returns [`ClusterError`] when the parameters are invalid, an article has
/// no embedding, or embeddings differ in length.
#[instrument(level = "info", skip_all, fields(count = records.len()))]
pub fn deduplicate(
    mut records: Vec<ArticleRecord>,
    params: &ClusterParams,
    policy: &RepresentativePolicy,
) -> Result<Vec<ArticleRecord>, ClusterError> {
    let total = records.len();
    assign_clusters(&mut records, params)?;
    let promoted = promote_exclusive_noise(&mut records, &policy.exclusive_markers);
    let kept = extract_representatives(records, policy);
    info!(total, kept = kept.len(), promoted, "Deduplicated articles");
    Ok(kept)
}
