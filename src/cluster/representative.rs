//! Editorial choice of one article per cluster.
//!
//! Priority, first match wins:
//! 1. a title carrying an exclusive or breaking marker ("단독", "속보")
//! 2. an article from a preferred outlet, outlets tried in list order
//! 3. the first article of the cluster
//!
//! Ties always go to the earliest article in input order.

use crate::models::{ArticleRecord, NOISE};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepresentativePolicy {
    /// Markers of exclusive reporting. Also drive the noise override pass.
    pub exclusive_markers: Vec<String>,
    pub breaking_markers: Vec<String>,
    /// Outlets in descending editorial priority.
    pub preferred_outlets: Vec<String>,
}

impl Default for RepresentativePolicy {
    fn default() -> Self {
        Self {
            exclusive_markers: vec!["단독".to_string()],
            breaking_markers: vec!["속보".to_string()],
            preferred_outlets: ["조선일보", "중앙일보", "동아일보", "서울경제", "한국경제", "매일경제"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RepresentativePolicy {
    fn is_flagged(&self, record: &ArticleRecord) -> bool {
        record.title_has_marker(&self.exclusive_markers)
            || record.title_has_marker(&self.breaking_markers)
    }
}

/// Index within `group` of the article that stands in for the whole group.
///
/// `group` must be in input order. Returns `None` only for an empty group.
pub fn select_representative(group: &[&ArticleRecord], policy: &RepresentativePolicy) -> Option<usize> {
    if group.is_empty() {
        return None;
    }

    if let Some(i) = group.iter().position(|r| policy.is_flagged(r)) {
        debug!(id = %group[i].id, "Representative chosen by title marker");
        return Some(i);
    }

    for outlet in &policy.preferred_outlets {
        if let Some(i) = group.iter().position(|r| r.outlet.trim() == outlet.as_str()) {
            debug!(id = %group[i].id, %outlet, "Representative chosen by outlet priority");
            return Some(i);
        }
    }

    Some(0)
}

/// Give every noise article with an exclusive marker its own new cluster.
///
/// New labels start above the current maximum label. Returns how many
/// articles were promoted.
pub fn promote_exclusive_noise(records: &mut [ArticleRecord], exclusive_markers: &[String]) -> usize {
    let mut next_label = records
        .iter()
        .filter_map(|r| r.cluster)
        .max()
        .unwrap_or(NOISE)
        .max(NOISE)
        + 1;
    let mut promoted = 0;

    for record in records
        .iter_mut()
        .filter(|r| r.is_noise() && r.title_has_marker(exclusive_markers))
    {
        record.cluster = Some(next_label);
        debug!(id = %record.id, cluster = next_label, "Promoted exclusive article out of noise");
        next_label += 1;
        promoted += 1;
    }

    promoted
}
