//! Real-time watch: poll Naver for every keyword, alert on new negative
//! articles.
//!
//! One cycle walks category → keyword → search hit. A hit is considered only
//! if it has a Naver-hosted copy, is not in the seen-article tracker and is
//! recent enough. Considered hits are fetched, classified, and alerted on when
//! their label is one of the configured alert labels. Every alert attempt is
//! recorded in the tracker, delivered or not, so a failed send is not repeated
//! on the next cycle. The caller saves the tracker after every cycle.

use crate::api::AskAsync;
use crate::classify::classify_article;
use crate::config::AppConfig;
use crate::models::{ArticleRecord, Label, SearchHit};
use crate::notify::{Notifier, format_alert, send_logged};
use crate::scrapers::{NewsSource, naver};
use crate::tracker::SeenTracker;
use crate::utils::canonical_url;
use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

/// Why a search hit was not looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    NoNaverLink,
    Seen,
    UnknownAge,
    Stale,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub hits: usize,
    pub skipped: usize,
    pub classified: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Decide whether `hit` deserves a fetch; returns the Naver link to fetch.
pub fn screen<'h>(hit: &'h SearchHit, tracker: &SeenTracker, max_age_minutes: u64) -> Result<&'h str, Skip> {
    let naver_link = hit.naver_link.as_deref().ok_or(Skip::NoNaverLink)?;
    if tracker.contains(&canonical_url(&hit.link)) {
        return Err(Skip::Seen);
    }
    match naver::parse_relative_minutes(&hit.time_text) {
        None => Err(Skip::UnknownAge),
        Some(age) if age > max_age_minutes => Err(Skip::Stale),
        Some(_) => Ok(naver_link),
    }
}

/// Classify `record` and alert if its label is in `alert_labels`.
///
/// The article is marked as seen once an alert was attempted, whether or not
/// the transport confirmed it. Returns whether the alert was delivered.
pub async fn classify_and_alert<A, N>(
    asker: &A,
    notifier: &N,
    tracker: &mut SeenTracker,
    record: &mut ArticleRecord,
    channel: &str,
    alert_labels: &[Label],
) -> bool
where
    A: AskAsync<Response = String>,
    N: Notifier,
{
    let classification = classify_article(asker, &record.body, &record.keyword).await;
    record.is_related = Some(classification.is_related);
    record.label = Some(classification.label);
    record.summary = Some(classification.summary);
    info!(
        id = %record.id,
        label = %classification.label,
        is_related = classification.is_related,
        "Analysed article"
    );

    if !alert_labels.contains(&classification.label) {
        return false;
    }
    let delivered = send_logged(notifier, channel, &format_alert(record), Some(&record.id)).await;
    tracker.add(record.id.clone());
    if delivered {
        info!(id = %record.id, title = %record.title, "Alert sent");
    } else {
        warn!(id = %record.id, "Alert not confirmed; marked as seen anyway");
    }
    delivered
}

/// One pass over every configured keyword.
#[instrument(level = "info", skip_all, fields(date = %date))]
pub async fn run_cycle<S, A, N>(
    source: &S,
    asker: &A,
    notifier: &N,
    tracker: &mut SeenTracker,
    config: &AppConfig,
    date: NaiveDate,
) -> CycleStats
where
    S: NewsSource,
    A: AskAsync<Response = String>,
    N: Notifier,
{
    let mut stats = CycleStats::default();

    for (category, keywords) in &config.keywords {
        for keyword in keywords {
            info!(%category, %keyword, "Searching");
            let hits = match source.search(keyword, date).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(%keyword, error = %e, "Search failed; skipping keyword");
                    stats.failed += 1;
                    continue;
                }
            };

            for hit in hits.iter().unique_by(|h| canonical_url(&h.link)) {
                stats.hits += 1;
                let naver_link = match screen(hit, tracker, config.max_age_minutes) {
                    Ok(link) => link,
                    Err(reason) => {
                        debug!(title = %hit.title, ?reason, "Skipping hit");
                        stats.skipped += 1;
                        continue;
                    }
                };

                let body = match source.fetch_body(naver_link).await {
                    Ok(body) if !body.trim().is_empty() => body,
                    Ok(_) => {
                        warn!(link = %naver_link, "Empty article body; skipping");
                        stats.failed += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(link = %naver_link, error = %e, "Article fetch failed; skipping");
                        stats.failed += 1;
                        continue;
                    }
                };

                let mut record = ArticleRecord::from_hit(hit, category, keyword, body);
                stats.classified += 1;
                if classify_and_alert(asker, notifier, tracker, &mut record, &config.channel, &config.notify_labels)
                    .await
                {
                    stats.notified += 1;
                }
            }
        }
    }

    info!(
        hits = stats.hits,
        skipped = stats.skipped,
        classified = stats.classified,
        notified = stats.notified,
        failed = stats.failed,
        "Watch cycle complete"
    );
    stats
}
