use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the crawl core.
///
/// Navigation, handler-timeout and extraction errors are page-level: the
/// scheduler records them as failed pages and keeps going. Storage and setup
/// errors fail the whole job.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Navigation timed out after {timeout_secs} seconds")]
    NavigationTimeout { url: String, timeout_secs: u64 },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Request handler timed out after {timeout_secs} seconds")]
    HandlerTimeout { url: String, timeout_secs: u64 },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Failed to write screenshot to {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job setup failed: {0}")]
    JobSetup(String),
}

impl CrawlError {
    pub fn navigation(url: &str, message: impl ToString) -> Self {
        Self::Navigation {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn extraction(message: impl ToString) -> Self {
        Self::Extraction(message.to_string())
    }

    pub fn setup(message: impl ToString) -> Self {
        Self::JobSetup(message.to_string())
    }

    /// Whether a retry of the same target could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NavigationTimeout { .. } | Self::Navigation { .. } | Self::HandlerTimeout { .. }
        )
    }

    /// Whether this error is confined to a single page
    pub fn is_page_level(&self) -> bool {
        !matches!(self, Self::Storage { .. } | Self::JobSetup(_))
    }
}
