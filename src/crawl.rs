//! Daily crawl: every keyword's search results for one day, with bodies, as a
//! row file for the batch stages.

use crate::models::ArticleRecord;
use crate::scrapers::NewsSource;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Search every keyword and fetch the Naver copy of each hit.
///
/// # Arguments
///
/// * `source` - Search and article fetcher
/// * `keywords` - Search keywords grouped by category
/// * `date` - Day to search
///
/// # Returns
///
/// One record per distinct article, in category → keyword → hit order. Hits
/// without a Naver-hosted copy, and hits whose body could not be fetched or is
/// empty, are left out. A failed search skips only that keyword.
///
/// # Examples
///
/// ```ignore
/// let rows = collect_rows(&NaverNews::new(client), &config.keywords, date).await;
/// rowstore::write_rows(&config.row_file("20250506", "naver"), &rows).await?;
/// ```
#[instrument(level = "info", skip_all, fields(date = %date))]
pub async fn collect_rows<S: NewsSource>(
    source: &S,
    keywords: &BTreeMap<String, Vec<String>>,
    date: NaiveDate,
) -> Vec<ArticleRecord> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for (category, words) in keywords {
        for keyword in words {
            let hits = match source.search(keyword, date).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(%category, %keyword, error = %e, "Search failed; skipping keyword");
                    continue;
                }
            };
            info!(%category, %keyword, hits = hits.len(), "Indexed search results");

            for hit in &hits {
                let Some(naver_link) = hit.naver_link.as_deref() else {
                    debug!(title = %hit.title, "No Naver copy; skipping");
                    continue;
                };
                let body = match source.fetch_body(naver_link).await {
                    Ok(body) if !body.trim().is_empty() => body,
                    Ok(_) => {
                        warn!(link = %naver_link, "Empty article body; skipping");
                        continue;
                    }
                    Err(e) => {
                        warn!(link = %naver_link, error = %e, "Article fetch failed; skipping");
                        continue;
                    }
                };

                let record = ArticleRecord::from_hit(hit, category, keyword, body);
                if seen.insert(record.id.clone()) {
                    records.push(record);
                } else {
                    debug!(id = %record.id, %keyword, "Already collected under another keyword");
                }
            }
        }
    }

    info!(count = records.len(), "Collected rows");
    records
}
