pub mod aggregator;
pub mod controller;
pub mod filter;
pub mod frontier;
pub mod job;
pub mod processor;
pub mod scheduler;
pub mod task;

// Re-export common types
pub use aggregator::{CrawlReport, CrawlStats, ResultAggregator};
pub use controller::Crawler;
pub use filter::LinkFilter;
pub use frontier::Frontier;
pub use job::CrawlJob;
pub use processor::PageProcessor;
pub use scheduler::{CrawlScheduler, SchedulerState};
pub use task::{
    CrawlOptions, CrawlTarget, LinkInfo, PageFailure, PageResult, PageSections, PageSuccess,
    ScreenshotMetadata, ScreenshotOptions, ScreenshotResult, Section,
};
