//! YAML configuration.
//!
//! Every key is optional; missing keys take the defaults below. Secrets (API
//! keys, bot token, Kakao tokens) come from the command line or the environment, never from
//! this file.
//!
//! ```yaml
//! keywords:
//!   당사: [삼성생명, 홍원학]
//!   보험: [생명보험, 손해보험, 실손]
//! channel: "#news-feed"
//! max_age_minutes: 2
//! notify_labels: [Negative]
//! notifier:
//!   kind: slack        # or kakao
//! tracker:
//!   path: sent_articles.json
//!   capacity: 50000
//! cluster:
//!   eps: 0.3
//!   min_samples: 2
//! embedding:
//!   batch_size: 30
//! ```

use crate::api::LlmOptions;
use crate::cluster::{ClusterError, ClusterParams, RepresentativePolicy};
use crate::embeddings::EmbeddingOptions;
use crate::models::Label;
use crate::notify::NotifierOptions;
use crate::tracker::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub path: PathBuf,
    /// `None` keeps every identifier forever.
    pub capacity: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sent_articles.json"),
            capacity: Some(DEFAULT_CAPACITY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Search keywords grouped by category.
    pub keywords: BTreeMap<String, Vec<String>>,
    /// Slack channel for alerts; unused by the Kakao transport.
    pub channel: String,
    /// Which transport delivers alerts, and its endpoints.
    pub notifier: NotifierOptions,
    pub poll_interval_secs: u64,
    /// Search hits older than this are not classified.
    pub max_age_minutes: u64,
    /// Labels that trigger an alert.
    pub notify_labels: Vec<Label>,
    /// Directory holding row files for batch commands.
    pub data_dir: PathBuf,
    /// File name prefix for row files, e.g. `회사_20250506_summary.json`.
    pub file_prefix: String,
    pub tracker: TrackerConfig,
    pub embedding: EmbeddingOptions,
    pub cluster: ClusterParams,
    pub representative: RepresentativePolicy,
    pub llm: LlmOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            "당사".to_string(),
            vec!["삼성생명".to_string(), "홍원학".to_string()],
        );
        Self {
            keywords,
            channel: "#news-feed".to_string(),
            notifier: NotifierOptions::default(),
            poll_interval_secs: 60,
            max_age_minutes: 2,
            notify_labels: vec![Label::Negative],
            data_dir: PathBuf::from("data"),
            file_prefix: "회사".to_string(),
            tracker: TrackerConfig::default(),
            embedding: EmbeddingOptions::default(),
            cluster: ClusterParams::default(),
            representative: RepresentativePolicy::default(),
            llm: LlmOptions::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => {
                info!("No config file given; using defaults");
                Self::default()
            }
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(path, &raw)?
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_yaml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.validate()?;
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be at least 1".into()));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid("embedding.dimensions must be at least 1".into()));
        }
        if self.llm.parallelism == 0 {
            return Err(ConfigError::Invalid("llm.parallelism must be at least 1".into()));
        }
        if self.tracker.capacity == Some(0) {
            return Err(ConfigError::Invalid("tracker.capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// `{data_dir}/{prefix}_{date}_{stage}.json`
    pub fn row_file(&self, date: &str, stage: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}_{}.json", self.file_prefix, date, stage))
    }

    /// `{data_dir}/{prefix}_{date}_report.txt`
    pub fn report_file(&self, date: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}_report.txt", self.file_prefix, date))
    }
}
