//! Bounded-depth, bounded-concurrency web crawler.
//!
//! A [`crawler::Crawler`] takes seed URLs, visits linked pages on a pool of
//! render sessions within a depth and request budget, and returns a
//! [`crawler::CrawlReport`] holding every page's outcome. It can also capture
//! a single page as a stored JPEG screenshot.

pub mod browser;
pub mod cli;
pub mod crawler;
pub mod error;
pub mod storage;
pub mod utils;

pub use error::CrawlError;
