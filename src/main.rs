//! # News Watch
//!
//! Monitors Naver News for configured keywords, classifies articles with an
//! LLM and raises Slack or KakaoTalk alerts for negative coverage. Daily
//! batches collect a whole day of articles, classify them, collapse
//! near-duplicate stories to one representative each and report on the
//! negative ones.
//!
//! ## Usage
//!
//! ```sh
//! news_watch --config watch.yaml watch
//! news_watch crawl --date 20250506
//! news_watch summarize --date 20250506
//! news_watch cluster --date 20250506
//! news_watch report --date 20250506
//! ```
//!
//! ## Architecture
//!
//! 1. **Watch**: search → screen against the seen-article tracker → fetch →
//!    classify → alert → record as seen (tracker saved every cycle)
//! 2. **Crawl**: search every keyword for the day → fetch bodies →
//!    `{prefix}_{date}_naver.json`
//! 3. **Summarize**: `{prefix}_{date}_naver.json` → drop repeated bodies →
//!    classify (12 at a time) → `{prefix}_{date}_summary.json`
//! 4. **Cluster**: `{prefix}_{date}_summary.json` → embed (batched) → DBSCAN →
//!    representatives → `{prefix}_{date}_cluster.json`
//! 5. **Report**: `{prefix}_{date}_summary.json` → related negatives → digest →
//!    LLM → `{prefix}_{date}_report.txt`

use awful_aj::config::AwfulJadeConfig;
use awful_aj::template::ChatTemplate;
use awful_aj::config_dir;
use chrono::{Local, NaiveDate};
use clap::Parser;
use reqwest::Client;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod batch;
mod classify;
mod cli;
mod cluster;
mod config;
mod crawl;
mod embeddings;
mod models;
mod notify;
mod report;
mod rowstore;
mod scrapers;
mod tracker;
mod utils;
mod watch;

use api::{AwfulClient, LlmOptions, RetryAsk};
use cli::{BatchArgs, Cli, ClusterArgs, Command, CrawlArgs, WatchArgs};
use config::AppConfig;
use embeddings::OpenAiEmbeddings;
use notify::{KakaoClient, KakaoCredentials, NotifierKind, SlackClient, Transport};
use rowstore::REQUIRED_COLUMNS;
use scrapers::naver::NaverNews;
use tracker::SeenTracker;
use utils::ensure_writable_dir;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; news_watch/0.1)";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_watch starting up");

    let args = Cli::parse();
    debug!(?args.config, "Parsed CLI arguments");

    let app_config = AppConfig::load(args.config.as_deref())?;
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))?;

    match args.command {
        Command::Watch(watch_args) => run_watch(&client, &app_config, watch_args).await?,
        Command::Crawl(crawl_args) => run_crawl(&client, &app_config, crawl_args).await?,
        Command::Summarize(batch_args) => run_summarize(&app_config, batch_args).await?,
        Command::Cluster(cluster_args) => run_cluster(&client, &app_config, cluster_args).await?,
        Command::Report(batch_args) => run_report(&app_config, batch_args).await?,
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}

/// Load the `awful_aj` config and the chat template named `template`.
async fn load_llm(options: &LlmOptions, template: &str) -> Result<(AwfulJadeConfig, ChatTemplate), Box<dyn Error>> {
    let llm_template = awful_aj::template::load_template(template).await?;
    info!(%template, "Loaded template");

    let conf_file = match &options.config_path {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("LLM config path is not valid UTF-8")?;
    let llm_config = awful_aj::config::load_config(config_path)
        .map_err(|e| format!("could not load LLM config {config_path}: {e}"))?;
    info!(config_path, "Loaded configuration");
    Ok((llm_config, llm_template))
}

/// Alert transport chosen by `notifier.kind`, with credentials from `args`.
fn build_notifier(client: &Client, app_config: &AppConfig, args: &WatchArgs) -> Result<Transport, Box<dyn Error>> {
    let options = &app_config.notifier;
    let notifier = match options.kind {
        NotifierKind::Slack => {
            let token = args
                .slack_token
                .clone()
                .ok_or("SLACK_BOT_TOKEN is not set; the Slack transport needs a bot token")?;
            Transport::Slack(SlackClient::new(client.clone(), token, options))
        }
        NotifierKind::Kakao => {
            let rest_api_key = args
                .kakao_rest_api_key
                .clone()
                .ok_or("KAKAO_REST_API_KEY is not set; the Kakao transport needs the app key")?;
            let refresh_token = args
                .kakao_refresh_token
                .clone()
                .ok_or("KAKAO_REFRESH_TOKEN is not set; the Kakao transport needs a refresh token")?;
            let credentials = KakaoCredentials {
                rest_api_key,
                refresh_token,
                access_token: args.kakao_access_token.clone(),
            };
            Transport::Kakao(KakaoClient::new(client.clone(), credentials, options))
        }
    };
    info!(kind = ?options.kind, "Alert transport ready");
    Ok(notifier)
}

fn day_of(date: Option<NaiveDate>) -> String {
    date.unwrap_or_else(|| Local::now().date_naive())
        .format("%Y%m%d")
        .to_string()
}

/// Input and output row files for a batch stage.
fn batch_paths(app_config: &AppConfig, args: BatchArgs, input_stage: &str, output_stage: &str) -> (PathBuf, PathBuf) {
    let day = day_of(args.date);
    let input = args.input.unwrap_or_else(|| app_config.row_file(&day, input_stage));
    let output = args.output.unwrap_or_else(|| app_config.row_file(&day, output_stage));
    (input, output)
}

async fn ensure_parent_writable(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && let Err(e) = ensure_writable_dir(parent).await
    {
        error!(
            path = %parent.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(once = args.once))]
async fn run_watch(client: &Client, app_config: &AppConfig, args: WatchArgs) -> Result<(), Box<dyn Error>> {
    let notifier = build_notifier(client, app_config, &args)?;
    let (llm_config, llm_template) = load_llm(&app_config.llm, &app_config.llm.template).await?;
    let asker = RetryAsk::from_options(
        AwfulClient {
            config: &llm_config,
            template: &llm_template,
        },
        &app_config.llm,
    );
    let source = NaverNews::new(client.clone());

    let tracker_path = &app_config.tracker.path;
    let mut seen = SeenTracker::load(tracker_path, app_config.tracker.capacity).await;
    let interval = Duration::from_secs(app_config.poll_interval_secs);
    info!(
        channel = %app_config.channel,
        categories = app_config.keywords.len(),
        ?interval,
        seen = seen.len(),
        "Watching"
    );

    loop {
        let date = args.date.unwrap_or_else(|| Local::now().date_naive());
        notify::prepare_logged(&notifier).await;
        watch::run_cycle(&source, &asker, &notifier, &mut seen, app_config, date).await;

        if let Err(e) = seen.save(tracker_path).await {
            error!(path = %tracker_path.display(), error = %e, "Failed to save seen articles");
        }
        if args.once {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

#[instrument(level = "info", skip_all)]
async fn run_crawl(client: &Client, app_config: &AppConfig, args: CrawlArgs) -> Result<(), Box<dyn Error>> {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let output = args
        .output
        .unwrap_or_else(|| app_config.row_file(&day_of(Some(date)), "naver"));
    info!(output = %output.display(), "Crawling");
    ensure_parent_writable(&output).await?;

    let source = NaverNews::new(client.clone());
    let records = crawl::collect_rows(&source, &app_config.keywords, date).await;
    rowstore::write_rows(&output, &records).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_summarize(app_config: &AppConfig, args: BatchArgs) -> Result<(), Box<dyn Error>> {
    let (input, output) = batch_paths(app_config, args, "naver", "summary");
    info!(input = %input.display(), output = %output.display(), "Summarizing rows");
    ensure_parent_writable(&output).await?;

    let records = rowstore::load_rows(&input, REQUIRED_COLUMNS).await?;
    let (llm_config, llm_template) = load_llm(&app_config.llm, &app_config.llm.template).await?;
    let asker = RetryAsk::from_options(
        AwfulClient {
            config: &llm_config,
            template: &llm_template,
        },
        &app_config.llm,
    );

    let records = batch::summarize_rows(&asker, records, app_config.llm.parallelism).await;
    rowstore::write_rows(&output, &records).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_cluster(client: &Client, app_config: &AppConfig, args: ClusterArgs) -> Result<(), Box<dyn Error>> {
    let api_key = args
        .openai_api_key
        .ok_or("OPENAI_API_KEY is not set; the cluster command needs it for embeddings")?;
    let (input, output) = batch_paths(app_config, args.files, "summary", "cluster");
    info!(input = %input.display(), output = %output.display(), "Clustering rows");
    ensure_parent_writable(&output).await?;

    let records = rowstore::load_rows(&input, REQUIRED_COLUMNS).await?;
    let provider = OpenAiEmbeddings::new(client.clone(), api_key, &app_config.embedding);
    let kept = batch::cluster_rows(
        &provider,
        records,
        &app_config.embedding,
        &app_config.cluster,
        &app_config.representative,
    )
    .await?;
    rowstore::write_rows(&output, &kept).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_report(app_config: &AppConfig, args: BatchArgs) -> Result<(), Box<dyn Error>> {
    let day = day_of(args.date);
    let input = args.input.unwrap_or_else(|| app_config.row_file(&day, "summary"));
    let output = args.output.unwrap_or_else(|| app_config.report_file(&day));
    info!(input = %input.display(), output = %output.display(), "Reporting");

    let records = rowstore::load_rows(&input, REQUIRED_COLUMNS).await?;
    let (llm_config, llm_template) = load_llm(&app_config.llm, &app_config.llm.report_template).await?;
    let asker = RetryAsk::from_options(
        AwfulClient {
            config: &llm_config,
            template: &llm_template,
        },
        &app_config.llm,
    );

    match report::generate_report(&asker, &records, app_config.llm.report_excerpt_chars).await? {
        None => println!("no negative articles for {day}"),
        Some(text) => {
            ensure_parent_writable(&output).await?;
            tokio::fs::write(&output, text).await?;
            info!(path = %output.display(), "Wrote report");
            println!("{}", output.display());
        }
    }
    Ok(())
}
