//! News source scrapers.
//!
//! Each scraper follows the same two-phase pattern:
//!
//! 1. **Indexing**: discover article hits for a keyword
//! 2. **Fetching**: download and parse the article body
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Naver News search | [`naver`] | HTML scraping of the news tab, Naver-hosted article pages |
//!
//! Scrapers never retry; a failed fetch is logged by the caller and the hit
//! is skipped. Pipelines take a [`NewsSource`] so they can run against canned
//! pages in tests.

use crate::models::SearchHit;
use chrono::NaiveDate;
use std::error::Error;

pub mod naver;

/// Both scraping phases behind one seam.
pub trait NewsSource {
    /// Search hits for `query` published on `date`, newest first.
    async fn search(&self, query: &str, date: NaiveDate) -> Result<Vec<SearchHit>, Box<dyn Error>>;

    /// Body text of the article at `url`.
    async fn fetch_body(&self, url: &str) -> Result<String, Box<dyn Error>>;
}
