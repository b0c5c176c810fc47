//! Command-line interface.
//!
//! Secrets are read from the environment when not given as flags.

use crate::utils::parse_yyyymmdd;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Naver news monitoring: real-time negative-article alerts and daily
/// summarize / deduplicate batches.
///
/// # Examples
///
/// ```sh
/// # Poll every minute and alert to Slack
/// news_watch --config watch.yaml watch
///
/// # Collect a day's articles, classify them, then collapse duplicates
/// news_watch crawl --date 20250506
/// news_watch summarize --date 20250506
/// news_watch cluster --date 20250506
///
/// # Ask for a report on the day's negative coverage
/// news_watch report --date 20250506
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll Naver and alert on new negative articles
    Watch(WatchArgs),
    /// Search every keyword for one day and save the articles as rows
    Crawl(CrawlArgs),
    /// Classify and summarize every row of a day's file
    Summarize(BatchArgs),
    /// Embed, cluster and keep one representative per story
    Cluster(ClusterArgs),
    /// Write an LLM report on a day's related negative articles
    Report(BatchArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Slack bot token
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Kakao REST API key (app key) for the Kakao transport
    #[arg(long, env = "KAKAO_REST_API_KEY", hide_env_values = true)]
    pub kakao_rest_api_key: Option<String>,

    /// Kakao OAuth refresh token
    #[arg(long, env = "KAKAO_REFRESH_TOKEN", hide_env_values = true)]
    pub kakao_refresh_token: Option<String>,

    /// Kakao access token; refreshed before each cycle anyway
    #[arg(long, env = "KAKAO_ACCESS_TOKEN", hide_env_values = true)]
    pub kakao_access_token: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Search a fixed day (YYYYMMDD) instead of today
    #[arg(long, value_parser = parse_yyyymmdd)]
    pub date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Day to search (YYYYMMDD); defaults to today
    #[arg(short, long, value_parser = parse_yyyymmdd)]
    pub date: Option<NaiveDate>,

    /// Output row file; overrides the name derived from the date
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Day of the row file (YYYYMMDD); defaults to today
    #[arg(short, long, value_parser = parse_yyyymmdd)]
    pub date: Option<NaiveDate>,

    /// Input row file; overrides the name derived from the date
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output row file; overrides the name derived from the date
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ClusterArgs {
    #[command(flatten)]
    pub files: BatchArgs,

    /// OpenAI API key for embeddings
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
}
