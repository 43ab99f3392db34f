use crate::content::SitemapContent;
use crate::error::FetchFailure;
use crate::source::{PageSource, USER_AGENT};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Retry and timeout settings for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Total attempts per URL, the first one included.
    pub max_retries: u32,
    pub timeout: Duration,
    /// Pause between attempts. Zero retries immediately.
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(60),
            retry_delay: Duration::ZERO,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Fetches sitemap content through a [`PageSource`] with bounded retries.
pub struct Fetcher<S> {
    source: S,
    config: FetchConfig,
    cancel: CancellationToken,
}

impl<S: PageSource> Fetcher<S> {
    pub fn new(source: S, cancel: CancellationToken) -> Self {
        Self::with_config(source, FetchConfig::default(), cancel)
    }

    pub fn with_config(source: S, config: FetchConfig, cancel: CancellationToken) -> Self {
        Self {
            source,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Fetches `url` and classifies what comes back.
    ///
    /// The cancellation token is checked before every attempt; an attempt
    /// already running is never interrupted.
    pub async fn fetch(&self, url: &Url) -> Result<SitemapContent, FetchFailure> {
        let mut attempts = 0;
        let mut last_error = String::from("no attempt made");

        while attempts < self.config.max_retries {
            if self.cancel.is_cancelled() {
                debug!("Skipping {}: run cancelled", url);
                return Err(FetchFailure::Cancelled {
                    url: url.to_string(),
                });
            }

            info!("[FETCHING] {}", url);
            match self.source.fetch_page(url, self.config.timeout).await {
                Ok(raw) => {
                    let content = SitemapContent::sniffed(raw, url.clone());
                    info!("Detected {} content at {}", content.format(), url);
                    return Ok(content);
                }
                Err(e) => {
                    attempts += 1;
                    warn!("[RETRY] Attempt {} failed for {}: {}", attempts, url, e);
                    last_error = e.to_string();
                }
            }

            if attempts < self.config.max_retries && !self.config.retry_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }

        error!("Failed to load {} after {} attempts", url, attempts);
        Err(FetchFailure::Exhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }
}
