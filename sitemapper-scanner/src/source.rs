use crate::error::{Result, ScanError};
use crate::fetcher::FetchConfig;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

pub const USER_AGENT: &str = "Sitemapper/0.1 (https://github.com/trapdoorsec/sitemapper)";

/// Anything that can turn a URL into page source.
///
/// A call is one attempt; retrying is the [`Fetcher`](crate::Fetcher)'s job.
pub trait PageSource {
    fn fetch_page(&self, url: &Url, timeout: Duration)
    -> impl Future<Output = Result<String>> + Send;
}

/// Plain HTTP source. Does not run scripts.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        Self::with_user_agent(USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch_page(&self, url: &Url, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        debug!(
            "{} answered {} ({:?})",
            url,
            response.status().as_u16(),
            response.content_length()
        );

        Ok(response.text().await?)
    }
}

/// Headless Chromium source for sitemaps that are rendered client-side.
pub struct BrowserSource {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSource {
    /// Launches a local headless browser.
    pub async fn launch(request_timeout: Duration) -> Result<Self> {
        info!("Starting browser session...");
        let config = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(ScanError::BrowserError)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("Browser session started");
        Ok(Self { browser, handler })
    }

    async fn render(&self, url: &Url) -> Result<String> {
        let page = self.browser.new_page("about:blank").await?;
        page.goto(url.as_str()).await?;
        let content = page.content().await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page for {}: {}", url, e);
        }

        Ok(content?)
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Waiting on browser process failed: {}", e);
        }
        self.handler.abort();
        info!("Browser session closed");
    }
}

impl PageSource for BrowserSource {
    async fn fetch_page(&self, url: &Url, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.render(url))
            .await
            .map_err(|_| ScanError::Timeout(timeout))?
    }
}

/// The one fetch session of a run.
///
/// Built once for the URL-based strategies and torn down with
/// [`FetchSession::shutdown`] whatever the outcome of the run.
pub enum FetchSession {
    Http(HttpSource),
    Browser(BrowserSource),
}

impl FetchSession {
    pub async fn open(render: bool, config: &FetchConfig) -> Result<Self> {
        if render {
            Ok(FetchSession::Browser(
                BrowserSource::launch(config.timeout).await?,
            ))
        } else {
            Ok(FetchSession::Http(HttpSource::with_user_agent(
                &config.user_agent,
            )?))
        }
    }

    pub async fn shutdown(self) {
        match self {
            FetchSession::Http(_) => debug!("HTTP session dropped"),
            FetchSession::Browser(browser) => browser.close().await,
        }
    }
}

impl PageSource for FetchSession {
    async fn fetch_page(&self, url: &Url, timeout: Duration) -> Result<String> {
        match self {
            FetchSession::Http(source) => source.fetch_page(url, timeout).await,
            FetchSession::Browser(source) => source.fetch_page(url, timeout).await,
        }
    }
}
