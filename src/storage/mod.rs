pub mod screenshots;

// Re-export common types
pub use screenshots::{FsScreenshotStore, ScreenshotStore};

#[cfg(test)]
pub use screenshots::MockScreenshotStore;
