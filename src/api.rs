//! LLM access with exponential backoff.
//!
//! - [`AskAsync`]: one prompt in, one completion out
//! - [`AwfulClient`]: the `awful_aj` backed implementation; config and chat
//!   template are loaded once by the caller and handed in
//! - [`RetryAsk`]: decorator adding retries with exponential backoff and jitter
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// LLM settings read from the YAML config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmOptions {
    /// `awful_aj` chat template holding the classification prompt.
    pub template: String,
    /// `awful_aj` config file; defaults to `config.yaml` in its config dir.
    pub config_path: Option<String>,
    pub max_retries: usize,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Articles classified concurrently in batch mode.
    pub parallelism: usize,
    /// `awful_aj` chat template holding the negative-coverage report prompt.
    pub report_template: String,
    /// Characters of each article body quoted in the report digest.
    pub report_excerpt_chars: usize,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            template: "news_sentiment".to_string(),
            config_path: None,
            max_retries: 5,
            base_delay_secs: 1,
            max_delay_secs: 30,
            parallelism: 12,
            report_template: "news_negative_report".to_string(),
            report_excerpt_chars: 500,
        }
    }
}

/// Trait for async LLM interaction.
pub trait AskAsync {
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    pub fn from_options(inner: T, options: &LlmOptions) -> Self {
        Self::new(inner, options.max_retries, StdDuration::from_secs(options.base_delay_secs))
            .with_max_delay(StdDuration::from_secs(options.max_delay_secs))
    }

    pub fn with_max_delay(mut self, max_delay: StdDuration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// `awful_aj` client for one prompt template.
pub struct AwfulClient<'a> {
    pub config: &'a AwfulJadeConfig,
    pub template: &'a ChatTemplate,
}

impl fmt::Debug for AwfulClient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwfulClient").finish_non_exhaustive()
    }
}

impl AskAsync for AwfulClient<'_> {
    type Response = String;

    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Flaky {
        fail_first: usize,
        calls: Cell<usize>,
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n <= self.fail_first {
                Err("503 from upstream".into())
            } else {
                Ok(format!("echo: {text}"))
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_errors() {
        let api = RetryAsk::new(Flaky { fail_first: 2, calls: Cell::new(0) }, 5, StdDuration::from_millis(10));
        let out = api.ask("hi").await.unwrap();
        assert_eq!(out, "echo: hi");
        assert_eq!(api.inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let api = RetryAsk::new(Flaky { fail_first: 100, calls: Cell::new(0) }, 2, StdDuration::from_millis(10));
        assert!(api.ask("hi").await.is_err());
        assert_eq!(api.inner.calls.get(), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let api = RetryAsk::new(Flaky { fail_first: 0, calls: Cell::new(0) }, 5, StdDuration::from_secs(1))
            .with_max_delay(StdDuration::from_secs(4));
        let d = api.backoff(10);
        assert!(d >= StdDuration::from_secs(4));
        assert!(d <= StdDuration::from_millis(4250));
    }
}
