use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::pool::SessionPool;
use crate::browser::session::SessionFactory;
use crate::browser::factory_for;
use crate::cli::config::CrawlerConfig;
use crate::crawler::aggregator::CrawlReport;
use crate::crawler::filter::LinkFilter;
use crate::crawler::job::{parse_seed, CrawlJob};
use crate::crawler::processor::PageProcessor;
use crate::crawler::scheduler::CrawlScheduler;
use crate::crawler::task::{CrawlOptions, CrawlTarget, PageSections, ScreenshotOptions, ScreenshotResult};
use crate::error::CrawlError;
use crate::storage::{FsScreenshotStore, ScreenshotStore};

/// Entry point for crawl and screenshot jobs.
///
/// Holds no per-job state: every call builds its own session pool, frontier
/// and aggregator, and shuts the pool down before returning.
pub struct Crawler {
    config: CrawlerConfig,
    factory: Arc<dyn SessionFactory>,
    store: Arc<dyn ScreenshotStore>,
    filter: LinkFilter,
}

impl Crawler {
    /// Create a crawler using the configured render backend and the filesystem screenshot store
    pub fn from_config(config: CrawlerConfig) -> Result<Self, CrawlError> {
        let factory = factory_for(&config.browser)?;
        let store = Arc::new(FsScreenshotStore::new(&config.storage));
        Ok(Self::with_factory(config, factory, store))
    }

    pub fn with_factory(
        config: CrawlerConfig,
        factory: Arc<dyn SessionFactory>,
        store: Arc<dyn ScreenshotStore>,
    ) -> Self {
        let filter = LinkFilter::new(&config.crawler);
        Self {
            config,
            factory,
            store,
            filter,
        }
    }

    /// Crawl options taken from the configuration defaults
    pub fn default_crawl_options(&self) -> CrawlOptions {
        CrawlOptions::from(&self.config.crawler)
    }

    /// Screenshot options taken from the configuration defaults
    pub fn default_screenshot_options(&self) -> ScreenshotOptions {
        ScreenshotOptions::from(&self.config.screenshot)
    }

    /// Crawl from a single seed
    pub async fn start_crawl(
        &self,
        seed: &str,
        max_requests: usize,
        depth: u32,
        options: CrawlOptions,
    ) -> Result<CrawlReport, CrawlError> {
        self.start_crawl_seeds(&[seed], max_requests, depth, options).await
    }

    /// Crawl from several seeds sharing one budget
    pub async fn start_crawl_seeds<S: AsRef<str>>(
        &self,
        seeds: &[S],
        max_requests: usize,
        depth: u32,
        options: CrawlOptions,
    ) -> Result<CrawlReport, CrawlError> {
        let job = CrawlJob::new(seeds, max_requests, depth, options)?;
        let pool = SessionPool::connect(Arc::clone(&self.factory), job.options.max_concurrency).await?;

        let mut scheduler = CrawlScheduler::new(job, Arc::clone(&pool), self.filter.clone());
        let report = scheduler.run().await;
        debug!(
            "Crawl ended as {:?}; {} of {} sessions started, at most {} busy at once",
            scheduler.finished_as(),
            pool.created(),
            pool.max_sessions(),
            pool.peak_active()
        );

        pool.shutdown().await;
        report
    }

    /// Capture one page as a JPEG and store it.
    ///
    /// Transient failures are retried; a failure on the last attempt fails the job.
    pub async fn capture_screenshot(&self, url: &str, options: ScreenshotOptions) -> Result<ScreenshotResult, CrawlError> {
        let url = parse_seed(url)?;
        if !(1..=100).contains(&options.quality) {
            return Err(CrawlError::setup(format!("quality must be between 1 and 100, got {}", options.quality)));
        }

        let settings = &self.config.screenshot;
        let processor = PageProcessor::new(
            Duration::from_secs(settings.navigation_timeout_secs),
            Duration::from_secs(settings.request_handler_timeout_secs),
            None,
        );

        let pool = SessionPool::connect(Arc::clone(&self.factory), 1).await?;
        info!("Capturing screenshot of {} (quality {}, full page: {})", url, options.quality, options.full_page);

        let mut target = CrawlTarget::seed(url.as_str());
        let result = loop {
            let mut session = match pool.acquire().await {
                Ok(session) => session,
                Err(e) => break Err(e),
            };

            let attempt = processor
                .capture_screenshot(&mut *session, &target, &options, self.store.as_ref())
                .await;
            match attempt {
                Ok(result) => break Ok(result),
                Err(e) if e.is_transient() && target.retry_count < settings.max_request_retries => {
                    warn!("Retrying screenshot of {} after error: {}", target.url, e);
                    target = target.retried();
                }
                Err(e) => {
                    warn!("Screenshot of {} failed: {}", target.url, e);
                    break Err(e);
                }
            }
        };

        pool.shutdown().await;
        result
    }

    /// Read the headings and paragraphs of one page.
    ///
    /// Uses the crawl timeouts and retry limit. A failure on the last attempt fails the job.
    pub async fn extract_text(&self, url: &str, wait_for_selector: Option<String>) -> Result<PageSections, CrawlError> {
        let url = parse_seed(url)?;

        let settings = &self.config.crawler;
        let processor = PageProcessor::new(
            Duration::from_secs(settings.navigation_timeout_secs),
            Duration::from_secs(settings.request_handler_timeout_secs),
            wait_for_selector,
        );

        let pool = SessionPool::connect(Arc::clone(&self.factory), 1).await?;
        info!("Extracting text from {}", url);

        let mut target = CrawlTarget::seed(url.as_str());
        let result = loop {
            let mut session = match pool.acquire().await {
                Ok(session) => session,
                Err(e) => break Err(e),
            };

            let attempt = processor.extract_sections(&mut *session, &target).await;
            match attempt {
                Ok(page) => break Ok(page),
                Err(e) if e.is_transient() && target.retry_count < settings.max_request_retries => {
                    warn!("Retrying text extraction of {} after error: {}", target.url, e);
                    target = target.retried();
                }
                Err(e) => {
                    warn!("Text extraction of {} failed: {}", target.url, e);
                    break Err(e);
                }
            }
        };

        pool.shutdown().await;
        result
    }
}
