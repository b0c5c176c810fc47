//! Data models for crawled articles and their processed representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleRecord`]: one article as it moves from crawl to classification,
//!   clustering and storage
//! - [`Label`]: the sentiment / relatedness label assigned by the LLM
//! - [`SearchHit`]: a single result scraped from a Naver news search page
//!
//! Row files use the Korean column names the newsroom spreadsheets always had,
//! hence the `#[serde(rename = ...)]` attributes on [`ArticleRecord`].

use crate::utils::canonical_url;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Sentinel cluster label for records that do not belong to any dense cluster.
pub const NOISE: i32 = -1;

/// Label produced by the classification prompt.
///
/// The prompt answers either with a sentiment (`Positive`, `Negative`,
/// `Neutral`) or with a plain relatedness flag, which is carried as
/// `"True"` / `"False"` to stay compatible with existing row files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Positive,
    Negative,
    Neutral,
    #[serde(rename = "True")]
    Related,
    #[serde(rename = "False")]
    Unrelated,
}

impl Label {
    /// Parse the textual form used by the LLM and by row files.
    pub fn parse(s: &str) -> Option<Label> {
        match s.trim() {
            "Positive" => Some(Label::Positive),
            "Negative" => Some(Label::Negative),
            "Neutral" => Some(Label::Neutral),
            "True" | "true" => Some(Label::Related),
            "False" | "false" => Some(Label::Unrelated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Positive => "Positive",
            Label::Negative => "Negative",
            Label::Neutral => "Neutral",
            Label::Related => "True",
            Label::Unrelated => "False",
        }
    }
}

impl From<bool> for Label {
    fn from(related: bool) -> Self {
        if related { Label::Related } else { Label::Unrelated }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One article, created at crawl time and enriched in place.
///
/// `id` is the canonical article URL and is the identity used by the
/// seen-article tracker. `embedding` must be present before a cluster label
/// can be assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Canonical article URL.
    #[serde(rename = "URL")]
    pub id: String,
    #[serde(rename = "제목", default, deserialize_with = "null_as_empty")]
    pub title: String,
    /// Publishing outlet, e.g. "조선일보".
    #[serde(rename = "언론사", default, deserialize_with = "null_as_empty")]
    pub outlet: String,
    #[serde(rename = "카테고리", default, deserialize_with = "null_as_empty")]
    pub category: String,
    /// The search keyword that surfaced the article.
    #[serde(rename = "키워드", default, deserialize_with = "null_as_empty")]
    pub keyword: String,
    #[serde(rename = "본문", default, deserialize_with = "null_as_empty")]
    pub body: String,
    /// One-line summary from the LLM.
    #[serde(rename = "요약", default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "라벨", default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(rename = "관련성", default, skip_serializing_if = "Option::is_none")]
    pub is_related: Option<bool>,
    #[serde(rename = "임베딩", default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// DBSCAN label, [`NOISE`] when unclustered.
    #[serde(rename = "클러스터", default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<i32>,
}

impl ArticleRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, outlet: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            outlet: outlet.into(),
            ..Default::default()
        }
    }

    /// Record for a search hit found under `category` / `keyword`.
    ///
    /// The identifier is the canonical outlet URL, so the same story reached
    /// through different keywords or tracking parameters maps to one id.
    pub fn from_hit(hit: &SearchHit, category: &str, keyword: &str, body: String) -> Self {
        Self {
            id: canonical_url(&hit.link),
            title: hit.title.clone(),
            outlet: hit.outlet.clone(),
            category: category.to_string(),
            keyword: keyword.to_string(),
            body,
            ..Default::default()
        }
    }

    /// Whether the title carries any of the given markers (e.g. "단독").
    pub fn title_has_marker(&self, markers: &[String]) -> bool {
        markers
            .iter()
            .any(|m| !m.is_empty() && self.title.contains(m.as_str()))
    }

    /// Text submitted to the embedding model: the title followed by the body
    /// cut to `max_chars` characters, on a single line.
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let body: String = self.body.chars().take(max_chars).collect();
        format!("{} {}", self.title, body)
            .replace(['\n', '\r'], " ")
            .trim()
            .to_string()
    }

    pub fn is_noise(&self) -> bool {
        self.cluster == Some(NOISE)
    }
}

/// A single result from a Naver news search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    /// Outlet-hosted article URL.
    pub link: String,
    pub outlet: String,
    pub description: String,
    /// Relative publication time as displayed, e.g. "3분 전".
    pub time_text: String,
    /// Naver-hosted copy of the article, when Naver carries one.
    pub naver_link: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_and_display() {
        assert_eq!(Label::parse("Negative"), Some(Label::Negative));
        assert_eq!(Label::parse(" True "), Some(Label::Related));
        assert_eq!(Label::parse("false"), Some(Label::Unrelated));
        assert_eq!(Label::parse("Angry"), None);
        assert_eq!(Label::Related.to_string(), "True");
    }

    #[test]
    fn test_label_serializes_legacy_names() {
        let json = serde_json::to_string(&vec![Label::Related, Label::Neutral]).unwrap();
        assert_eq!(json, r#"["True","Neutral"]"#);
    }

    #[test]
    fn test_title_has_marker() {
        let record = ArticleRecord::new("u", "[단독] 보험사 인수 추진", "조선일보");
        assert!(record.title_has_marker(&["단독".to_string()]));
        assert!(!record.title_has_marker(&["속보".to_string()]));
        assert!(!record.title_has_marker(&[String::new()]));
    }

    #[test]
    fn test_embedding_text_truncates_body_by_chars() {
        let mut record = ArticleRecord::new("u", "제목", "기타");
        record.body = "가나다\n라마바".to_string();
        assert_eq!(record.embedding_text(5), "제목 가나다 라");
        assert_eq!(record.embedding_text(2), "제목 가나");
    }

    #[test]
    fn test_from_hit_uses_canonical_link() {
        let hit = SearchHit {
            title: "보험금 미지급 논란".to_string(),
            link: "https://news.example.com/a?sid=101#top".to_string(),
            outlet: "한겨레".to_string(),
            description: String::new(),
            time_text: "1분 전".to_string(),
            naver_link: Some("https://n.news.naver.com/1".to_string()),
        };
        let record = ArticleRecord::from_hit(&hit, "당사", "삼성생명", "본문".to_string());
        assert_eq!(record.id, "https://news.example.com/a");
        assert_eq!(record.category, "당사");
        assert_eq!(record.keyword, "삼성생명");
        assert_eq!(record.body, "본문");
        assert!(record.label.is_none());
    }

    #[test]
    fn test_record_deserializes_nulls_as_empty() {
        let json = r#"{"URL":"https://n.news.naver.com/a","제목":null,"언론사":"KBS","본문":"본문"}"#;
        let record: ArticleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.title, "");
        assert_eq!(record.outlet, "KBS");
        assert!(record.cluster.is_none());
    }
}
