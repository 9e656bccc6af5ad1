use anyhow::{Result, Context};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cli::config::CrawlerConfig;
use crate::cli::validation;
use crate::crawler::controller::Crawler;

/// Arguments of the `crawl` command
#[derive(Debug, Clone)]
pub struct CrawlArgs {
    pub url: String,
    pub profile: Option<String>,
    pub depth: Option<u32>,
    pub limit: Option<usize>,
    pub concurrency: Option<usize>,
    pub wait_for_selector: Option<String>,
    pub content_selector: Option<String>,
    pub dedupe: bool,
    pub output: Option<PathBuf>,
}

/// Arguments of the `screenshot` command
#[derive(Debug, Clone)]
pub struct ScreenshotArgs {
    pub url: String,
    pub profile: Option<String>,
    pub quality: Option<u8>,
    pub viewport_only: bool,
    pub wait_for_selector: Option<String>,
    pub output: Option<PathBuf>,
}

/// Arguments of the `extract-text` command
#[derive(Debug, Clone)]
pub struct ExtractTextArgs {
    pub url: String,
    pub profile: Option<String>,
    pub wait_for_selector: Option<String>,
    pub output: Option<PathBuf>,
}

/// Run a crawl job and emit its report
pub async fn crawl(args: CrawlArgs) -> Result<()> {
    let seed = validation::normalize_seed(&args.url)?;
    let config = CrawlerConfig::load(args.profile.as_deref())?;

    let max_requests = validation::positive("limit", args.limit.unwrap_or(config.crawler.max_requests))?;
    let depth = args.depth.unwrap_or(config.crawler.max_depth);

    let crawler = Crawler::from_config(config)?;
    let mut options = crawler.default_crawl_options();
    if let Some(concurrency) = args.concurrency {
        options.max_concurrency = validation::positive("concurrency", concurrency)?;
    }
    options.wait_for_selector = args.wait_for_selector;
    options.content_selector = args.content_selector;
    options.dedupe |= args.dedupe;

    let report = crawler.start_crawl(&seed, max_requests, depth, options).await
        .context(format!("Crawl of {} failed", seed))?;

    if report.stats.failed > 0 {
        warn!("{} of {} pages failed", report.stats.failed, report.stats.requests_total);
        for page in report.pages.iter().filter(|page| !page.is_success()) {
            debug!("Failed page at depth {}: {}", page.depth(), page.url());
        }
    }

    write_json(&report, args.output.as_deref())
}

/// Capture a screenshot and emit the stored image reference
pub async fn screenshot(args: ScreenshotArgs) -> Result<()> {
    let url = validation::normalize_seed(&args.url)?;
    let config = CrawlerConfig::load(args.profile.as_deref())?;

    let crawler = Crawler::from_config(config)?;
    let mut options = crawler.default_screenshot_options();
    if let Some(quality) = args.quality {
        options.quality = validation::quality(quality)?;
    }
    if args.viewport_only {
        options.full_page = false;
    }
    options.wait_for_selector = args.wait_for_selector;

    let result = crawler.capture_screenshot(&url, options).await
        .context(format!("Screenshot of {} failed", url))?;

    info!("Screenshot stored at {}", result.image_url);
    write_json(&result, args.output.as_deref())
}

/// Read the headings and paragraphs of one page and emit them
pub async fn extract_text(args: ExtractTextArgs) -> Result<()> {
    let url = validation::normalize_seed(&args.url)?;
    let config = CrawlerConfig::load(args.profile.as_deref())?;

    let crawler = Crawler::from_config(config)?;
    let page = crawler.extract_text(&url, args.wait_for_selector).await
        .context(format!("Text extraction of {} failed", url))?;

    info!("Extracted {} sections from {}", page.sections.len(), url);
    write_json(&page, args.output.as_deref())
}

/// List all available configuration profiles
pub fn list_profiles() -> Result<()> {
    let profiles = CrawlerConfig::list_profiles()?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Show a profile, creating it from the defaults if it does not exist
pub fn manage_profile(profile_name: String) -> Result<()> {
    match CrawlerConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("# Profile: {}", profile_name);
            print!("{}", serde_yaml::to_string(&config)?);
        },
        Err(_) => {
            warn!("Profile '{}' does not exist. Creating a default profile.", profile_name);
            let config = CrawlerConfig::default();
            config.save_as_profile(&profile_name)?;
            println!("Created default profile: {}", profile_name);
        }
    }

    Ok(())
}

/// Show the current configuration
pub fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;
    println!("# Current configuration");
    print!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}

/// Pretty-print `value` as JSON to `output`, or stdout when no path is given
fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .context("Failed to serialize output")?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
            std::fs::write(path, json)
                .context(format!("Failed to write output file: {}", path.display()))?;
            info!("Output written to: {}", path.display());
        },
        None => println!("{}", json),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::{ScreenshotMetadata, ScreenshotResult};
    use chrono::Utc;

    #[test]
    fn test_write_json_to_file() {
        let dir = std::env::temp_dir().join(format!("site-crawler-out-{}", uuid::Uuid::new_v4()));
        let path = dir.join("result.json");
        let result = ScreenshotResult {
            image_url: "/uploads/screenshots/screenshot-1.jpg".to_string(),
            metadata: ScreenshotMetadata {
                timestamp: Utc::now(),
                format: "jpeg".to_string(),
                quality: 80,
                full_page: true,
            },
        };

        write_json(&result, Some(path.as_path())).unwrap();

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["imageUrl"], "/uploads/screenshots/screenshot-1.jpg");
        assert_eq!(written["metadata"]["fullPage"], true);
        assert_eq!(written["metadata"]["quality"], 80);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
