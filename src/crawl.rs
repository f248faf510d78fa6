use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::browser::{BrowserFetcher, BrowserOptions};
use crate::cli::{CrawlArgs, Engine};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::formats::ResultSet;
use crate::parse::{parse_detail, parse_list};
use crate::site::{CompiledProfile, SiteProfile};

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_pages: usize,
    /// Pause after each item; pages pause for twice as long.
    pub delay: Duration,
    pub keyword: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    MaxPages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages_visited: usize,
    pub records: usize,
    pub stop: StopReason,
}

/// Walks listing pages in order, enriching each item from its detail page.
///
/// Fetch failures count as "no data": a failed listing ends the crawl like
/// an empty page, a failed detail leaves the summary as parsed.
pub async fn crawl<F>(
    fetcher: &mut F,
    profile: &CompiledProfile,
    options: &CrawlOptions,
    results: &mut ResultSet,
) -> anyhow::Result<CrawlSummary>
where
    F: PageFetcher + ?Sized,
{
    tracing::info!(max_pages = options.max_pages, "crawl started");

    let mut pages_visited = 0;
    let mut records = 0;

    for page in 1..=options.max_pages {
        tracing::info!(page, "crawling page");
        pages_visited = page;

        let list_url = profile.page_url(page, &options.keyword, &options.category);
        let list_url = Url::parse(&list_url).with_context(|| format!("parse list url: {list_url}"))?;

        let books = match fetcher.fetch(list_url.as_str()).await {
            Ok(html) => parse_list(&html, profile, Some(&list_url)),
            Err(err) => {
                tracing::warn!(page, %err, "list page fetch failed");
                Vec::new()
            }
        };

        if books.is_empty() {
            tracing::info!(page, "no books on page; stopping");
            return Ok(CrawlSummary {
                pages_visited,
                records,
                stop: StopReason::EmptyPage,
            });
        }

        let on_page = books.len();
        for mut book in books {
            let detail_url = book
                .get(&profile.detail_url_field)
                .unwrap_or_default()
                .to_owned();
            if !detail_url.is_empty() {
                tracing::info!(url = %detail_url, "fetching book detail");
                match fetcher.fetch(&detail_url).await {
                    Ok(html) => {
                        let base = Url::parse(&detail_url).ok();
                        book.merge_detail(parse_detail(&html, profile, base.as_ref()));
                    }
                    Err(err) => {
                        tracing::warn!(url = %detail_url, %err, "detail fetch failed");
                    }
                }
            }

            results.push(book);
            records += 1;
            pause(options.delay).await;
        }

        tracing::info!(page, books = on_page, total = results.len(), "page done");
        pause(options.delay * 2).await;
    }

    Ok(CrawlSummary {
        pages_visited,
        records,
        stop: StopReason::MaxPages,
    })
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Finished(CrawlSummary),
    Failed(String),
    Interrupted,
}

#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub records: usize,
    pub json_saved: bool,
    pub csv_saved: bool,
}

/// Runs one crawl with exclusive use of `fetcher`.
///
/// The fetcher is closed exactly once whether the crawl finishes, fails or
/// is interrupted by `shutdown`; whatever was collected is then persisted.
pub async fn run_session<F, S>(
    fetcher: &mut F,
    profile: &CompiledProfile,
    options: &CrawlOptions,
    outputs: &OutputPaths,
    shutdown: S,
) -> SessionReport
where
    F: PageFetcher + ?Sized,
    S: Future<Output = ()>,
{
    let mut results = ResultSet::new();

    let outcome = {
        let crawl = crawl(&mut *fetcher, profile, options, &mut results);
        tokio::select! {
            biased;
            () = shutdown => SessionOutcome::Interrupted,
            summary = crawl => match summary {
                Ok(summary) => SessionOutcome::Finished(summary),
                Err(err) => SessionOutcome::Failed(format!("{err:#}")),
            },
        }
    };

    match &outcome {
        SessionOutcome::Finished(summary) => {
            tracing::info!(
                pages = summary.pages_visited,
                records = summary.records,
                stop = ?summary.stop,
                "crawl finished"
            );
        }
        SessionOutcome::Failed(err) => tracing::error!(%err, "crawl failed"),
        SessionOutcome::Interrupted => tracing::info!("crawl interrupted"),
    }

    if let Err(err) = fetcher.close().await {
        tracing::error!(err = %format!("{err:#}"), "release fetcher");
    }

    let json_saved = persist("json", &outputs.json, || {
        crate::export::save_json(results.as_slice(), &outputs.json)
    });
    let csv_saved = persist("csv", &outputs.csv, || {
        crate::export::save_csv(results.as_slice(), &outputs.csv)
    });

    SessionReport {
        outcome,
        records: results.len(),
        json_saved,
        csv_saved,
    }
}

fn persist(
    format: &str,
    path: &Path,
    save: impl FnOnce() -> anyhow::Result<bool>,
) -> bool {
    match save() {
        Ok(written) => written,
        Err(err) => {
            tracing::error!(
                format,
                path = %path.display(),
                err = %format!("{err:#}"),
                "save failed"
            );
            false
        }
    }
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let profile = SiteProfile::load_or_default(args.site.as_deref())
        .context("load site profile")?
        .compile()
        .context("compile site profile")?;

    let options = CrawlOptions {
        max_pages: args.max_pages,
        delay: Duration::from_millis(args.delay_ms),
        keyword: args.keyword.clone(),
        category: args.category.clone(),
    };
    let outputs = OutputPaths {
        json: PathBuf::from(&args.json_out),
        csv: PathBuf::from(&args.csv_out),
    };

    let mut fetcher: Box<dyn PageFetcher> = match args.engine {
        Engine::Browser => Box::new(
            BrowserFetcher::launch(BrowserOptions {
                chrome_executable: args.chrome.clone(),
                ready_selector: profile.ready_selector.clone(),
                timeout_secs: args.timeout_secs,
            })
            .await
            .context("initialize browser")?,
        ),
        Engine::Http => Box::new(
            HttpFetcher::new(Duration::from_secs(args.timeout_secs))
                .context("initialize http session")?,
        ),
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let report = run_session(fetcher.as_mut(), &profile, &options, &outputs, shutdown).await;

    tracing::info!(
        records = report.records,
        json = report.json_saved,
        csv = report.csv_saved,
        "crawl complete"
    );
    println!("collected {} book(s)", report.records);
    Ok(())
}
