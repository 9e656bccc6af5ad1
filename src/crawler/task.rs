use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

use crate::cli::config::{CrawlerSettings, ScreenshotSettings};
use crate::error::CrawlError;

/// Maximum number of characters kept from a page's visible text
pub const SNIPPET_MAX_CHARS: usize = 500;

/// Maximum number of links reported per page
pub const MAX_LINKS_PER_PAGE: usize = 20;

/// A unit of work waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTarget {
    /// Absolute URL to visit
    pub url: String,

    /// Link hops from the seed (0 for seeds)
    pub depth: u32,

    /// How many times this target has already been retried
    pub retry_count: u32,

    /// Page the link was discovered on (None for seeds)
    pub parent_url: Option<String>,
}

impl CrawlTarget {
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            retry_count: 0,
            parent_url: None,
        }
    }

    /// A target for a link found on this page, one level deeper
    pub fn child(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: self.depth + 1,
            retry_count: 0,
            parent_url: Some(self.url.clone()),
        }
    }

    /// The same target, scheduled again after a transient failure
    pub fn retried(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

/// An outbound link extracted from a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub url: String,
    pub text: String,
    pub title: Option<String>,
}

/// Extracted content of a successfully processed page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSuccess {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub content_length: usize,
    pub links: Vec<LinkInfo>,
    pub depth: u32,
    pub crawled_at: DateTime<Utc>,
}

/// A page that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    pub url: String,
    pub error: String,
    pub depth: u32,
    pub crawled_at: DateTime<Utc>,
}

/// Recorded outcome of one crawl target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageResult {
    Success(PageSuccess),
    Failure(PageFailure),
}

impl PageResult {
    pub fn failure(target: &CrawlTarget, error: &CrawlError) -> Self {
        Self::Failure(PageFailure {
            url: target.url.clone(),
            error: error.to_string(),
            depth: target.depth,
            crawled_at: Utc::now(),
        })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Success(page) => &page.url,
            Self::Failure(page) => &page.url,
        }
    }

    pub fn depth(&self) -> u32 {
        match self {
            Self::Success(page) => page.depth,
            Self::Failure(page) => page.depth,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Truncate visible page text to a snippet, marking truncation with an ellipsis
pub fn make_snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_MAX_CHARS).collect();

    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Keep absolute http(s) links only, capped at `MAX_LINKS_PER_PAGE`
pub fn select_links(raw: Vec<LinkInfo>) -> Vec<LinkInfo> {
    raw.into_iter()
        .filter(|link| !link.url.is_empty() && link.url.starts_with("http"))
        .map(|link| LinkInfo {
            text: link.text.trim().to_string(),
            title: link.title.filter(|title| !title.is_empty()),
            url: link.url,
        })
        .take(MAX_LINKS_PER_PAGE)
        .collect()
}

/// Per-job crawl options; unknown fields are rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct CrawlOptions {
    pub wait_for_selector: Option<String>,
    /// Elements whose text makes up the page content; the body when unset
    pub content_selector: Option<String>,
    pub navigation_timeout_secs: u64,
    pub request_handler_timeout_secs: u64,
    pub max_concurrency: usize,
    pub max_request_retries: u32,
    pub dedupe: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&CrawlerSettings::default())
    }
}

impl From<&CrawlerSettings> for CrawlOptions {
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            wait_for_selector: None,
            content_selector: None,
            navigation_timeout_secs: settings.navigation_timeout_secs,
            request_handler_timeout_secs: settings.request_handler_timeout_secs,
            max_concurrency: settings.max_concurrency,
            max_request_retries: settings.max_request_retries,
            dedupe: settings.dedupe,
        }
    }
}

/// Screenshot capture options; unknown fields are rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub quality: u8,
    pub wait_for_selector: Option<String>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self::from(&ScreenshotSettings::default())
    }
}

impl From<&ScreenshotSettings> for ScreenshotOptions {
    fn from(settings: &ScreenshotSettings) -> Self {
        Self {
            full_page: settings.full_page,
            quality: settings.quality,
            wait_for_selector: None,
        }
    }
}

/// Capture details reported alongside a stored screenshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotMetadata {
    pub timestamp: DateTime<Utc>,
    pub format: String,
    pub quality: u8,
    pub full_page: bool,
}

/// Reference to a stored screenshot plus its capture metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotResult {
    pub image_url: String,
    pub metadata: ScreenshotMetadata,
}

/// A heading or paragraph of a page, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Heading { level: u8, text: String },
    Paragraph { text: String },
}

/// Readable structure of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSections {
    pub url: String,
    pub title: String,
    pub sections: Vec<Section>,
    pub timestamp: DateTime<Utc>,
}
