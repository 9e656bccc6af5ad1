use chrono::{DateTime, Utc};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::crawler::task::{CrawlOptions, CrawlTarget};
use crate::error::CrawlError;

/// One crawl invocation. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub id: Uuid,
    pub seeds: Vec<Url>,
    pub max_requests: usize,
    pub max_depth: u32,
    pub options: CrawlOptions,
    pub created_at: DateTime<Utc>,
}

impl CrawlJob {
    /// Build a job, rejecting malformed seeds and unusable budgets
    pub fn new<S: AsRef<str>>(
        seeds: &[S],
        max_requests: usize,
        max_depth: u32,
        options: CrawlOptions,
    ) -> Result<Self, CrawlError> {
        if seeds.is_empty() {
            return Err(CrawlError::setup("at least one seed URL is required"));
        }
        if max_requests == 0 {
            return Err(CrawlError::setup("maxRequests must be at least 1"));
        }
        if options.max_concurrency == 0 {
            return Err(CrawlError::setup("maxConcurrency must be at least 1"));
        }
        if options.navigation_timeout_secs == 0 || options.request_handler_timeout_secs == 0 {
            return Err(CrawlError::setup("timeouts must be at least 1 second"));
        }
        if options.content_selector.as_deref().map_or(false, |selector| selector.trim().is_empty()) {
            return Err(CrawlError::setup("contentSelector must not be empty"));
        }

        let seeds = seeds
            .iter()
            .map(|seed| parse_seed(seed.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: Uuid::new_v4(),
            seeds,
            max_requests,
            max_depth,
            options,
            created_at: Utc::now(),
        })
    }

    pub fn seed_targets(&self) -> Vec<CrawlTarget> {
        self.seeds.iter().map(|url| CrawlTarget::seed(url.as_str())).collect()
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.options.navigation_timeout_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.options.request_handler_timeout_secs)
    }
}

/// Parse a seed as an absolute http(s) URL
pub fn parse_seed(seed: &str) -> Result<Url, CrawlError> {
    let url = Url::parse(seed)
        .map_err(|e| CrawlError::setup(format!("invalid seed URL '{}': {}", seed, e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(CrawlError::setup(format!("seed URL must be absolute http(s): {}", seed))),
    }
}
