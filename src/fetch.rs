use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {secs}s: {url}")]
    Timeout { url: String, secs: u64 },
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Turns a URL into the markup a reader would see once the page is ready.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError>;

    /// Releases the backend. Calling it again is a no-op.
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Plain HTTP fetcher. It does not run page scripts.
pub struct HttpFetcher {
    client: Option<reqwest::Client>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;

        Ok(Self {
            client: Some(client),
            timeout,
        })
    }
}

pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        "upgrade-insecure-requests",
        HeaderValue::from_static("1"),
    );
    headers
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let Some(client) = self.client.as_ref() else {
            return Err(FetchError::Navigation {
                url: url.to_owned(),
                message: "http session is closed".to_owned(),
            });
        };

        tracing::debug!(url, "GET");
        let response = client.get(url).send().await.map_err(|err| self.classify(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|err| self.classify(url, err))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if self.client.take().is_some() {
            tracing::info!("http session closed");
        }
        Ok(())
    }
}

impl HttpFetcher {
    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_owned(),
                secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Navigation {
                url: url.to_owned(),
                message: format!("{err:#}"),
            }
        }
    }
}
