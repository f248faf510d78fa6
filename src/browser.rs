#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use anyhow::Context as _;
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::error::CdpError;
#[cfg(feature = "browser")]
use chromiumoxide::handler::viewport::Viewport;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt as _;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;

use crate::fetch::{FetchError, PageFetcher};

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub chrome_executable: Option<String>,
    pub ready_selector: String,
    pub timeout_secs: u64,
}

#[cfg(feature = "browser")]
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(feature = "browser")]
const WINDOW: (u32, u32) = (1920, 1080);

/// Headless Chrome over CDP. One tab per fetch.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    options: BrowserOptions,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    pub async fn launch(options: BrowserOptions) -> anyhow::Result<Self> {
        tracing::info!(chrome = ?options.chrome_executable, "launching headless browser");

        let config = browser_config(&options)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::debug!(%err, "browser handler stopped");
                    break;
                }
            }
        });

        tracing::info!("browser ready");
        Ok(Self {
            options,
            browser: Some(browser),
            handler: Some(handler),
        })
    }

    async fn render(&self, page: &Page, url: &str) -> Result<String, FetchError> {
        page.goto(url).await.map_err(|err| navigation(url, err))?;

        loop {
            match page.find_element(self.options.ready_selector.as_str()).await {
                Ok(_) => break,
                Err(err) if element_missing(&err) => {
                    tracing::trace!(url, %err, "ready selector not present yet");
                    tokio::time::sleep(READY_POLL_INTERVAL).await;
                }
                Err(err) => return Err(navigation(url, err)),
            }
        }

        page.content().await.map_err(|err| navigation(url, err))
    }
}

#[cfg(feature = "browser")]
fn browser_config(options: &BrowserOptions) -> anyhow::Result<BrowserConfig> {
    let (width, height) = WINDOW;
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(width, height)
        .viewport(Viewport {
            width,
            height,
            ..Viewport::default()
        })
        .request_timeout(Duration::from_secs(options.timeout_secs.max(1)))
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu");
    if let Some(path) = &options.chrome_executable {
        builder = builder.chrome_executable(PathBuf::from(path));
    }
    builder
        .build()
        .map_err(|err| anyhow::anyhow!("build browser config: {err}"))
}

/// Whether a selector lookup failed only because nothing matches yet.
///
/// An unmatched query surfaces as a CDP error response for node id 0; a
/// broken connection or a crashed tab shows up as any other variant.
#[cfg(feature = "browser")]
fn element_missing(err: &CdpError) -> bool {
    matches!(err, CdpError::NotFound | CdpError::Chrome(_))
}

#[cfg(feature = "browser")]
fn navigation(url: &str, err: CdpError) -> FetchError {
    FetchError::Navigation {
        url: url.to_owned(),
        message: err.to_string(),
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        let Some(browser) = self.browser.as_ref() else {
            return Err(FetchError::Navigation {
                url: url.to_owned(),
                message: "browser is closed".to_owned(),
            });
        };

        tracing::debug!(url, "navigate");
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| navigation(url, err))?;

        let timeout = Duration::from_secs(self.options.timeout_secs);
        let result = match tokio::time::timeout(timeout, self.render(&page, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_owned(),
                secs: self.options.timeout_secs,
            }),
        };

        if let Err(err) = page.close().await {
            tracing::debug!(%err, url, "close tab failed");
        }
        result
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let closed = browser.close().await.context("close browser");
        if let Err(err) = browser.wait().await {
            tracing::debug!(%err, "wait for browser exit");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        tracing::info!("browser closed");
        closed.map(|_| ())
    }
}

#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher;

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub async fn launch(_options: BrowserOptions) -> anyhow::Result<Self> {
        anyhow::bail!(
            "browser support not compiled in; rebuild with `--features browser` or use `--engine http`"
        )
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Navigation {
            url: url.to_owned(),
            message: "browser support not compiled in".to_owned(),
        })
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
