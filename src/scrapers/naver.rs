//! Naver News search scraper.
//!
//! Two phases, like every scraper in this crate:
//!
//! 1. **Indexing**: one search results page per keyword and day, newest first
//! 2. **Fetching**: the Naver-hosted copy of an article for its body text
//!
//! Parsing is split from fetching so the HTML handling can be tested offline.

use super::NewsSource;
use crate::models::SearchHit;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

const SEARCH_BASE: &str = "https://search.naver.com/search.naver";
const NO_OUTLET: &str = "언론사 정보 없음";
const NO_DESCRIPTION: &str = "요약 정보 없음";

static NEWS_AREA: Lazy<Selector> = Lazy::new(|| Selector::parse(".news_area").unwrap());
static NEWS_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".news_tit").unwrap());
static PRESS: Lazy<Selector> = Lazy::new(|| Selector::parse(".info.press").unwrap());
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| Selector::parse(".dsc_txt_wrap").unwrap());
static INFO_GROUP: Lazy<Selector> = Lazy::new(|| Selector::parse("div.info_group").unwrap());
static INFO_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("span.info:not(.press)").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static ARTICLE_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#dic_area, #newsct_article, #articeBody").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Search URL for `query` restricted to a single day, newest first.
pub fn search_url(query: &str, date: NaiveDate) -> String {
    let day = date.format("%Y.%m.%d");
    format!(
        "{SEARCH_BASE}?where=news&query={}&sm=tab_opt&sort=1&photo=0&field=0&pd=3&ds={day}&de={day}",
        urlencoding::encode(query)
    )
}

/// Minutes encoded in a relative time such as "3분 전" or "2시간 전".
pub fn parse_relative_minutes(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(n) = text.strip_suffix("분 전") {
        return n.trim().parse().ok();
    }
    if let Some(n) = text.strip_suffix("시간 전") {
        return n.trim().parse::<u64>().ok().map(|h| h * 60);
    }
    None
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Extract search hits from a results page.
pub fn parse_search_page(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let base = Url::parse(SEARCH_BASE).ok();
    let resolve = |href: &str| match &base {
        Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    };

    let mut hits = Vec::new();
    for item in document.select(&NEWS_AREA) {
        let Some(title_el) = item.select(&NEWS_TITLE).next() else {
            continue;
        };
        let Some(href) = title_el.value().attr("href") else {
            continue;
        };

        let outlet = item
            .select(&PRESS)
            .next()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NO_OUTLET.to_string());
        let description = item
            .select(&DESCRIPTION)
            .next()
            .map(text_of)
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        let info_group = item.select(&INFO_GROUP).next();
        let time_text = info_group
            .and_then(|g| g.select(&INFO_TIME).next())
            .map(text_of)
            .unwrap_or_default();
        let naver_link = info_group
            .and_then(|g| g.select(&LINK).last())
            .and_then(|a| a.value().attr("href"))
            .filter(|href| href.contains("naver"))
            .map(&resolve);

        hits.push(SearchHit {
            title: text_of(title_el),
            link: resolve(href),
            outlet,
            description,
            time_text,
            naver_link,
        });
    }
    hits
}

/// Body text of a Naver article page.
///
/// Falls back to every paragraph when the known containers are absent.
pub fn parse_article_body(html: &str) -> String {
    let document = Html::parse_document(html);
    if let Some(body) = document.select(&ARTICLE_BODY).next() {
        return text_of(body);
    }
    document
        .select(&PARAGRAPH)
        .map(text_of)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fetch the search results for `query` on `date`.
#[instrument(level = "info", skip(client))]
pub async fn index_articles(client: &Client, query: &str, date: NaiveDate) -> Result<Vec<SearchHit>, Box<dyn Error>> {
    let url = search_url(query, date);
    let html = client.get(&url).send().await?.error_for_status()?.text().await?;
    let hits = parse_search_page(&html);
    info!(count = hits.len(), "Indexed Naver search results");
    debug!(hits = ?hits.iter().map(|h| &h.title).collect::<Vec<_>>(), "Naver hits");
    Ok(hits)
}

/// Fetch one article's body text.
#[instrument(level = "info", skip(client))]
pub async fn fetch_article_body(client: &Client, url: &str) -> Result<String, Box<dyn Error>> {
    let html = client.get(url).send().await?.error_for_status()?.text().await?;
    let body = parse_article_body(&html);
    if body.is_empty() {
        warn!("Article page had no body text");
    } else {
        debug!(chars = body.chars().count(), "Parsed Naver article");
    }
    Ok(body)
}

/// [`NewsSource`] backed by live Naver pages.
#[derive(Debug, Clone)]
pub struct NaverNews {
    client: Client,
}

impl NaverNews {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl NewsSource for NaverNews {
    async fn search(&self, query: &str, date: NaiveDate) -> Result<Vec<SearchHit>, Box<dyn Error>> {
        index_articles(&self.client, query, date).await
    }

    async fn fetch_body(&self, url: &str) -> Result<String, Box<dyn Error>> {
        fetch_article_body(&self.client, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
<html><body><ul>
  <li><div class="news_area">
    <div class="info_group">
      <a class="info press" href="https://www.chosun.com">조선일보</a>
      <span class="info">3분 전</span>
      <a class="info" href="https://n.news.naver.com/mnews/article/023/0003?sid=101">네이버뉴스</a>
    </div>
    <a class="news_tit" href="https://www.chosun.com/economy/1" title="t">[단독]  삼성생명
      신사업</a>
    <div class="dsc_txt_wrap">보험업계 요약</div>
  </div></li>
  <li><div class="news_area">
    <div class="info_group">
      <span class="info">2시간 전</span>
      <a class="info" href="/other">다른 링크</a>
    </div>
    <a class="news_tit" href="https://example.com/2">두번째 기사</a>
  </div></li>
  <li><div class="news_area"><span>제목 없음</span></div></li>
</ul></body></html>"#;

    #[test]
    fn test_search_url() {
        let url = search_url("삼성 생명", NaiveDate::from_ymd_opt(2025, 5, 6).unwrap());
        assert!(url.starts_with("https://search.naver.com/search.naver?where=news&query=%EC%82%BC%EC%84%B1%20%EC%83%9D%EB%AA%85"));
        assert!(url.ends_with("&ds=2025.05.06&de=2025.05.06"));
        assert!(url.contains("&sort=1&"));
    }

    #[test]
    fn test_parse_relative_minutes() {
        assert_eq!(parse_relative_minutes("3분 전"), Some(3));
        assert_eq!(parse_relative_minutes(" 2시간 전"), Some(120));
        assert_eq!(parse_relative_minutes("2025.05.06."), None);
        assert_eq!(parse_relative_minutes("1일 전"), None);
    }

    #[test]
    fn test_parse_search_page() {
        let hits = parse_search_page(SEARCH_PAGE);
        assert_eq!(hits.len(), 2);

        let first = &hits[0];
        assert_eq!(first.title, "[단독] 삼성생명 신사업");
        assert_eq!(first.link, "https://www.chosun.com/economy/1");
        assert_eq!(first.outlet, "조선일보");
        assert_eq!(first.description, "보험업계 요약");
        assert_eq!(first.time_text, "3분 전");
        assert_eq!(
            first.naver_link.as_deref(),
            Some("https://n.news.naver.com/mnews/article/023/0003?sid=101")
        );

        let second = &hits[1];
        assert_eq!(second.outlet, NO_OUTLET);
        assert_eq!(second.description, NO_DESCRIPTION);
        assert_eq!(second.time_text, "2시간 전");
        assert_eq!(second.naver_link, None);
    }

    #[test]
    fn test_parse_article_body_prefers_container() {
        let html = r#"<html><body><p>광고</p><article id="dic_area">첫 문단<br>둘째   문단</article></body></html>"#;
        assert_eq!(parse_article_body(html), "첫 문단 둘째 문단");
    }

    #[test]
    fn test_parse_article_body_falls_back_to_paragraphs() {
        let html = r#"<html><body><p>하나</p><p> </p><p>둘</p></body></html>"#;
        assert_eq!(parse_article_body(html), "하나 둘");
    }
}
