//! Negative-coverage report for one day's summarized rows.
//!
//! Related articles labelled Negative are listed in a plain-text digest. The
//! LLM writes the report from that digest using the report chat template.

use crate::api::AskAsync;
use crate::models::{ArticleRecord, Label};
use std::error::Error;
use std::fmt::Write as _;
use tracing::{info, instrument};

/// Related articles labelled Negative, in input order.
pub fn negative_articles(records: &[ArticleRecord]) -> Vec<&ArticleRecord> {
    records
        .iter()
        .filter(|r| r.is_related == Some(true) && r.label == Some(Label::Negative))
        .collect()
}

/// Digest block per article: title, outlet, summary and the first
/// `excerpt_chars` characters of the body.
///
/// ```ignore
/// - 제목: 보험금 미지급 논란
///   언론사: 한겨레
///   요약: 소비자 불만 확산
///   본문일부: ...
/// ```
pub fn build_digest(articles: &[&ArticleRecord], excerpt_chars: usize) -> String {
    let mut digest = String::new();
    for article in articles {
        let excerpt: String = article.body.trim().chars().take(excerpt_chars).collect();
        let _ = write!(
            digest,
            "- 제목: {}\n  언론사: {}\n  요약: {}\n  본문일부: {}\n\n\n",
            article.title,
            article.outlet,
            article.summary.as_deref().unwrap_or(""),
            excerpt
        );
    }
    digest
}

/// Ask the LLM for a report on the day's negative coverage.
///
/// # Returns
///
/// `Ok(None)` when no related article is labelled Negative; the LLM is not
/// called in that case.
///
/// # Errors
///
/// Whatever the asker returns once its own retries are exhausted.
#[instrument(level = "info", skip_all, fields(rows = records.len()))]
pub async fn generate_report<A>(
    asker: &A,
    records: &[ArticleRecord],
    excerpt_chars: usize,
) -> Result<Option<String>, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let negatives = negative_articles(records);
    if negatives.is_empty() {
        info!("No negative articles to report");
        return Ok(None);
    }
    info!(negatives = negatives.len(), "Generating report");
    let digest = build_digest(&negatives, excerpt_chars);
    let report = asker.ask(&digest).await?;
    Ok(Some(report.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn row(id: &str, related: Option<bool>, label: Option<Label>) -> ArticleRecord {
        let mut r = ArticleRecord::new(id, format!("제목 {id}"), "한겨레");
        r.body = "보험금 지급을 둘러싼 분쟁이 이어지고 있다".to_string();
        r.summary = Some(format!("요약 {id}"));
        r.is_related = related;
        r.label = label;
        r
    }

    fn day() -> Vec<ArticleRecord> {
        vec![
            row("1", Some(true), Some(Label::Negative)),
            row("2", Some(false), Some(Label::Negative)),
            row("3", Some(true), Some(Label::Neutral)),
            row("4", None, None),
            row("5", Some(true), Some(Label::Negative)),
        ]
    }

    #[test]
    fn test_negative_articles_keeps_related_negatives() {
        let records = day();
        let ids: Vec<&str> = negative_articles(&records).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "5"]);
    }

    #[test]
    fn test_build_digest_format() {
        let mut article = row("1", Some(true), Some(Label::Negative));
        article.body = "  보험금 미지급 논란이 커지고 있다  ".to_string();
        let digest = build_digest(&[&article], 6);
        assert_eq!(
            digest,
            "- 제목: 제목 1\n  언론사: 한겨레\n  요약: 요약 1\n  본문일부: 보험금 미지\n\n\n"
        );
    }

    struct Capture(RefCell<Vec<String>>);

    impl AskAsync for Capture {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.0.borrow_mut().push(text.to_string());
            Ok("  오늘의 부정 기사 보고서\n".to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_report_sends_digest() {
        let asker = Capture(RefCell::new(Vec::new()));
        let report = generate_report(&asker, &day(), 100).await.unwrap();

        assert_eq!(report.as_deref(), Some("오늘의 부정 기사 보고서"));
        let sent = asker.0.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("- 제목: 제목 1\n"));
        assert!(sent[0].contains("- 제목: 제목 5\n"));
        assert!(!sent[0].contains("제목 3"));
    }

    #[tokio::test]
    async fn test_generate_report_without_negatives_skips_llm() {
        let asker = Capture(RefCell::new(Vec::new()));
        let records = vec![row("3", Some(true), Some(Label::Neutral))];
        let report = generate_report(&asker, &records, 100).await.unwrap();

        assert_eq!(report, None);
        assert!(asker.0.borrow().is_empty());
    }
}
