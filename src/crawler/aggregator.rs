use std::sync::Arc;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::crawler::task::PageResult;

/// Collects page outcomes in completion order
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    /// Shared result store
    inner: Arc<Mutex<Collected>>,

    /// When the job started
    started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Collected {
    pages: Vec<PageResult>,
    succeeded: usize,
    failed: usize,
}

/// Final output of a crawl job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub pages: Vec<PageResult>,
    pub stats: CrawlStats,
}

/// Summary statistics of a crawl job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    /// Number of recorded page results
    pub requests_total: usize,

    pub succeeded: usize,
    pub failed: usize,

    /// Seconds between start and completion
    pub crawl_duration: f64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Collected::default())),
            started_at: Utc::now(),
        }
    }

    /// Append a page outcome
    pub async fn record(&self, result: PageResult) {
        let mut collected = self.inner.lock().await;

        if result.is_success() {
            collected.succeeded += 1;
        } else {
            collected.failed += 1;
        }

        collected.pages.push(result);
    }

    /// Compute stats and hand over the recorded pages as a report
    pub async fn finalize(self) -> CrawlReport {
        let mut collected = self.inner.lock().await;
        let pages = std::mem::take(&mut collected.pages);
        let completed_at = Utc::now();

        CrawlReport {
            stats: CrawlStats {
                requests_total: pages.len(),
                succeeded: collected.succeeded,
                failed: collected.failed,
                crawl_duration: (completed_at - self.started_at).num_milliseconds() as f64 / 1000.0,
                started_at: self.started_at,
                completed_at,
            },
            pages,
        }
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}
