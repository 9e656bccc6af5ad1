use chrono::Utc;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::browser::session::{CaptureSpec, Extractor, RenderSession};
use crate::crawler::job::CrawlJob;
use crate::crawler::task::{
    make_snippet, select_links, CrawlTarget, LinkInfo, PageResult, PageSections, PageSuccess,
    ScreenshotMetadata, ScreenshotOptions, ScreenshotResult, Section,
};
use crate::error::CrawlError;
use crate::storage::ScreenshotStore;

/// Navigates a session to a target and extracts its content
#[derive(Debug, Clone)]
pub struct PageProcessor {
    /// Bound on loading the page
    navigation_timeout: Duration,

    /// Bound on everything after the page has loaded
    handler_timeout: Duration,

    wait_for_selector: Option<String>,

    /// Elements whose text makes up the page content; the body when unset
    content_selector: Option<String>,
}

impl PageProcessor {
    pub fn new(navigation_timeout: Duration, handler_timeout: Duration, wait_for_selector: Option<String>) -> Self {
        Self {
            navigation_timeout,
            handler_timeout,
            wait_for_selector,
            content_selector: None,
        }
    }

    pub fn with_content_selector(mut self, selector: Option<String>) -> Self {
        self.content_selector = selector;
        self
    }

    pub fn for_job(job: &CrawlJob) -> Self {
        Self::new(
            job.navigation_timeout(),
            job.handler_timeout(),
            job.options.wait_for_selector.clone(),
        )
        .with_content_selector(job.options.content_selector.clone())
    }

    /// Process a target, turning any page-level error into a failure record
    pub async fn process(&self, session: &mut dyn RenderSession, target: &CrawlTarget) -> PageResult {
        match self.try_process(session, target).await {
            Ok(page) => PageResult::Success(page),
            Err(e) => {
                warn!("Error crawling {}: {}", target.url, e);
                PageResult::failure(target, &e)
            }
        }
    }

    /// Process a target, surfacing the error so the caller can decide on a retry
    pub async fn try_process(&self, session: &mut dyn RenderSession, target: &CrawlTarget) -> Result<PageSuccess, CrawlError> {
        self.load(session, &target.url).await?;

        with_timeout(self.extract(session, target), self.handler_timeout, || CrawlError::HandlerTimeout {
            url: target.url.clone(),
            timeout_secs: self.handler_timeout.as_secs(),
        })
        .await
    }

    /// Load a page and capture it, then hand the image to the store
    pub async fn capture_screenshot(
        &self,
        session: &mut dyn RenderSession,
        target: &CrawlTarget,
        options: &ScreenshotOptions,
        store: &dyn ScreenshotStore,
    ) -> Result<ScreenshotResult, CrawlError> {
        self.load(session, &target.url).await?;

        let spec = CaptureSpec {
            full_page: options.full_page,
            quality: options.quality,
        };
        let capture = async {
            if let Some(selector) = &options.wait_for_selector {
                session.wait_for_selector(selector, self.handler_timeout).await?;
            }
            session.screenshot(spec).await
        };
        let bytes = with_timeout(capture, self.handler_timeout, || CrawlError::HandlerTimeout {
            url: target.url.clone(),
            timeout_secs: self.handler_timeout.as_secs(),
        })
        .await?;

        let file_name = screenshot_file_name();
        let image_url = store.write(&file_name, &bytes).await?;
        debug!("Stored {} byte screenshot of {} as {}", bytes.len(), target.url, image_url);

        Ok(ScreenshotResult {
            image_url,
            metadata: ScreenshotMetadata {
                timestamp: Utc::now(),
                format: "jpeg".to_string(),
                quality: options.quality,
                full_page: options.full_page,
            },
        })
    }

    /// Load a page and read its headings and paragraphs
    pub async fn extract_sections(
        &self,
        session: &mut dyn RenderSession,
        target: &CrawlTarget,
    ) -> Result<PageSections, CrawlError> {
        self.load(session, &target.url).await?;

        let extraction = async {
            if let Some(selector) = &self.wait_for_selector {
                session.wait_for_selector(selector, self.handler_timeout).await?;
            }
            let title: String = evaluate_as(session, Extractor::Title).await?;
            let sections: Vec<Section> = evaluate_as(session, Extractor::Sections).await?;
            Ok::<_, CrawlError>((title, sections))
        };
        let (title, sections) = with_timeout(extraction, self.handler_timeout, || CrawlError::HandlerTimeout {
            url: target.url.clone(),
            timeout_secs: self.handler_timeout.as_secs(),
        })
        .await?;

        debug!("Read {} sections from {}", sections.len(), target.url);
        Ok(PageSections {
            url: target.url.clone(),
            title,
            sections,
            timestamp: Utc::now(),
        })
    }

    async fn load(&self, session: &mut dyn RenderSession, url: &str) -> Result<(), CrawlError> {
        with_timeout(session.navigate(url, self.navigation_timeout), self.navigation_timeout, || {
            CrawlError::NavigationTimeout {
                url: url.to_string(),
                timeout_secs: self.navigation_timeout.as_secs(),
            }
        })
        .await
    }

    async fn extract(&self, session: &mut dyn RenderSession, target: &CrawlTarget) -> Result<PageSuccess, CrawlError> {
        if let Some(selector) = &self.wait_for_selector {
            session.wait_for_selector(selector, self.handler_timeout).await?;
        }

        let title: String = evaluate_as(session, Extractor::Title).await?;
        let content = Extractor::Text { selector: self.content_selector.clone() };
        let text: String = evaluate_as(session, content).await?;
        let links: Vec<LinkInfo> = evaluate_as(session, Extractor::Links).await?;

        Ok(PageSuccess {
            url: target.url.clone(),
            title,
            snippet: make_snippet(&text),
            content_length: text.chars().count(),
            links: select_links(links),
            depth: target.depth,
            crawled_at: Utc::now(),
        })
    }
}

/// Run `operation`, replacing it with `on_timeout()` if it takes longer than `limit`
async fn with_timeout<F, T>(
    operation: F,
    limit: Duration,
    on_timeout: impl FnOnce() -> CrawlError,
) -> Result<T, CrawlError>
where
    F: Future<Output = Result<T, CrawlError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

async fn evaluate_as<T: DeserializeOwned>(session: &mut dyn RenderSession, extractor: Extractor) -> Result<T, CrawlError> {
    let name = format!("{:?}", extractor);
    let value = session.evaluate(extractor).await?;
    serde_json::from_value(value)
        .map_err(|e| CrawlError::extraction(format!("Unexpected {} result: {}", name, e)))
}

/// Timestamp-based file name with a random suffix against same-millisecond captures
fn screenshot_file_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("screenshot-{}-{}.jpg", Utc::now().timestamp_millis(), &suffix[..8])
}
