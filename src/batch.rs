//! Batch stages over row files.
//!
//! - [`summarize_rows`]: classify and summarize every article, a bounded number
//!   of LLM calls in flight
//! - [`cluster_rows`]: embed every article, then collapse near-duplicates to
//!   one representative each

use crate::api::AskAsync;
use crate::classify::classify_article;
use crate::cluster::{ClusterError, ClusterParams, RepresentativePolicy, deduplicate};
use crate::embeddings::{EmbeddingOptions, EmbeddingProvider, embed_all};
use crate::models::ArticleRecord;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Fill `summary`, `label` and `is_related` on every record.
///
/// Rows whose body repeats an earlier row's body are dropped first, so each
/// article text is classified once. Each request carries the row's keyword.
///
/// # Arguments
///
/// * `asker` - LLM client
/// * `records` - Rows loaded from the crawl stage
/// * `parallelism` - Requests in flight at once
///
/// # Returns
///
/// The de-duplicated rows in input order, classified. Rows the model could
/// not classify carry [`Classification::conservative`](crate::classify::Classification::conservative).
#[instrument(level = "info", skip_all, fields(count = records.len(), parallelism))]
pub async fn summarize_rows<A>(asker: &A, records: Vec<ArticleRecord>, parallelism: usize) -> Vec<ArticleRecord>
where
    A: AskAsync<Response = String>,
{
    let t0 = Instant::now();
    let total = records.len();
    let mut records: Vec<ArticleRecord> = records.into_iter().unique_by(|r| r.body.clone()).collect();
    if records.len() < total {
        info!(dropped = total - records.len(), "Dropped rows with duplicate bodies");
    }

    let results: Vec<_> = stream::iter(records.iter().enumerate())
        .map(|(i, record)| async move {
            debug!(index = i, id = %record.id, "Classifying article");
            (i, classify_article(asker, &record.body, &record.keyword).await)
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await;

    for (i, classification) in results {
        let record = &mut records[i];
        record.is_related = Some(classification.is_related);
        record.label = Some(classification.label);
        record.summary = Some(classification.summary);
    }
    info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Summarized rows");
    records
}

/// Embed, cluster and keep one representative per cluster plus all noise.
#[instrument(level = "info", skip_all, fields(count = records.len()))]
pub async fn cluster_rows<P: EmbeddingProvider>(
    provider: &P,
    mut records: Vec<ArticleRecord>,
    embedding: &EmbeddingOptions,
    params: &ClusterParams,
    policy: &RepresentativePolicy,
) -> Result<Vec<ArticleRecord>, ClusterError> {
    let texts: Vec<String> = records
        .iter()
        .map(|r| r.embedding_text(embedding.max_chars))
        .collect();
    let vectors = embed_all(provider, &texts, embedding).await;
    for (record, vector) in records.iter_mut().zip(vectors) {
        record.embedding = Some(vector);
    }

    let kept = deduplicate(records, params, policy)?;
    info!(kept = kept.len(), "Clustered rows");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Label, NOISE};
    use std::error::Error;
    use std::time::Duration;

    /// Embeds by topic word: texts about the same topic get the same vector.
    struct TopicProvider;

    impl EmbeddingProvider for TopicProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
            if text.contains("인수") {
                Ok(vec![1.0, 0.0, 0.0])
            } else if text.contains("실적") {
                Ok(vec![0.0, 1.0, 0.0])
            } else if text.contains("장애") {
                Err("upstream 500".into())
            } else {
                Ok(vec![0.0, 0.0, 1.0])
            }
        }
    }

    fn record(id: &str, title: &str, outlet: &str, body: &str) -> ArticleRecord {
        let mut r = ArticleRecord::new(id, title, outlet);
        r.body = body.to_string();
        r
    }

    fn options() -> EmbeddingOptions {
        EmbeddingOptions {
            dimensions: 3,
            batch_size: 2,
            retries: 2,
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cluster_rows_collapses_same_topic() {
        let records = vec![
            record("1", "단독 A", "조선일보", "보험사 인수 추진"),
            record("2", "B", "중앙일보", "보험사 인수 검토"),
            record("3", "C", "기타", "인수 협상"),
            record("4", "D", "한국경제", "분기 실적 개선"),
            record("5", "E", "기타", "시스템 장애"),
        ];
        let kept = cluster_rows(
            &TopicProvider,
            records,
            &options(),
            &ClusterParams { eps: 0.3, min_samples: 2 },
            &RepresentativePolicy::default(),
        )
        .await
        .unwrap();

        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4", "5"]);
        assert_eq!(kept[0].cluster, Some(0));
        assert_eq!(kept[1].cluster, Some(NOISE));
        assert_eq!(kept[2].embedding.as_deref(), Some(&[0.0, 0.0, 0.0][..]));
    }

    struct EchoLabel;

    impl AskAsync for EchoLabel {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            let label = if text.contains("논란") { "Negative" } else { "Positive" };
            let summary = serde_json::to_string(text)?;
            Ok(format!(r#"{{"is_related": true, "label": "{label}", "summary": {summary}}}"#))
        }
    }

    fn keyed(id: &str, body: &str, keyword: &str) -> ArticleRecord {
        let mut r = record(id, id, "KBS", body);
        r.keyword = keyword.to_string();
        r
    }

    #[tokio::test]
    async fn test_summarize_rows_fills_fields_in_order() {
        let records = vec![
            keyed("1", "불완전판매 논란", ""),
            keyed("2", "신상품 출시", ""),
            keyed("3", "배당 확대", ""),
        ];
        let records = summarize_rows(&EchoLabel, records, 2).await;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(records[0].label, Some(Label::Negative));
        assert_eq!(records[0].summary.as_deref(), Some("불완전판매 논란"));
        assert_eq!(records[1].label, Some(Label::Positive));
        assert_eq!(records[2].summary.as_deref(), Some("배당 확대"));
        assert!(records.iter().all(|r| r.is_related == Some(true)));
    }

    #[tokio::test]
    async fn test_summarize_rows_drops_duplicate_bodies() {
        let records = vec![
            keyed("1", "같은 본문", "삼성생명"),
            keyed("2", "다른 본문", "삼성생명"),
            keyed("3", "같은 본문", "홍원학"),
        ];
        let records = summarize_rows(&EchoLabel, records, 4).await;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_summarize_rows_sends_row_keyword() {
        let records = vec![keyed("1", "민원 증가", "삼성생명")];
        let records = summarize_rows(&EchoLabel, records, 1).await;
        assert_eq!(records[0].summary.as_deref(), Some("민원 증가\n\n관련 키워드: 삼성생명"));
    }
}
