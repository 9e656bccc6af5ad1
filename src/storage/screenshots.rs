use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::cli::config::StorageSettings;
use crate::error::CrawlError;

/// Trait for screenshot storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    /// Persist an image under `file_name`, returning the reference callers use to fetch it
    async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<String, CrawlError>;
}

/// Filesystem implementation of ScreenshotStore
pub struct FsScreenshotStore {
    /// Directory images are written into
    dir: PathBuf,

    /// Prefix of the returned reference
    public_path: String,
}

impl FsScreenshotStore {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            dir: settings.screenshots_dir.clone(),
            public_path: settings.public_path.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ScreenshotStore for FsScreenshotStore {
    async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<String, CrawlError> {
        tokio::fs::create_dir_all(&self.dir).await
            .map_err(|source| CrawlError::Storage { path: self.dir.clone(), source })?;

        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await
            .map_err(|source| CrawlError::Storage { path: path.clone(), source })?;

        debug!("Saved screenshot to: {}", path.display());

        Ok(format!("{}/{}", self.public_path, file_name))
    }
}
