pub mod pool;
pub mod script;
pub mod session;
pub mod static_html;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::cli::config::{BrowserSettings, RenderBackend};
use crate::error::CrawlError;

// Re-export common types
pub use pool::{PooledSession, SessionPool};
pub use session::{CaptureSpec, Extractor, RenderSession, SessionFactory, WebDriverFactory, WebDriverSession};
pub use static_html::{HttpSession, HttpSessionFactory};

/// Build the session factory for the configured backend
pub fn factory_for(config: &BrowserSettings) -> Result<Arc<dyn SessionFactory>, CrawlError> {
    match config.backend {
        RenderBackend::Webdriver => Ok(Arc::new(WebDriverFactory::new(config.clone()))),
        RenderBackend::Http => Ok(Arc::new(HttpSessionFactory::new(config)?)),
    }
}
