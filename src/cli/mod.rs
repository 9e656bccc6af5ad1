pub mod commands;
pub mod config;
pub mod validation;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file (the default location when no path is given)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a site starting from a seed URL
    Crawl {
        /// URL to start crawling from
        #[arg(required = true)]
        url: String,

        /// Site profile to use
        #[arg(short, long)]
        profile: Option<String>,

        /// Maximum crawling depth
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum number of pages to crawl
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum number of pages processed at once
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// CSS selector to wait for before extracting
        #[arg(long)]
        wait_for_selector: Option<String>,

        /// CSS selector of the elements whose text is reported (defaults to the body)
        #[arg(long)]
        content_selector: Option<String>,

        /// Skip URLs already enqueued in this crawl
        #[arg(long)]
        dedupe: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Capture a screenshot of a single page
    Screenshot {
        /// URL to capture
        #[arg(required = true)]
        url: String,

        /// Site profile to use
        #[arg(short, long)]
        profile: Option<String>,

        /// JPEG quality (1-100)
        #[arg(short, long)]
        quality: Option<u8>,

        /// Capture only the visible viewport
        #[arg(long)]
        viewport_only: bool,

        /// CSS selector to wait for before capturing
        #[arg(long)]
        wait_for_selector: Option<String>,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract the headings and paragraphs of a single page
    ExtractText {
        /// URL to read
        #[arg(required = true)]
        url: String,

        /// Site profile to use
        #[arg(short, long)]
        profile: Option<String>,

        /// CSS selector to wait for before extracting
        #[arg(long)]
        wait_for_selector: Option<String>,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to manage
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl { url, profile, depth, limit, concurrency, wait_for_selector, content_selector, dedupe, output } => {
            info!("Starting crawl on {}", url);
            let args = commands::CrawlArgs {
                url,
                profile,
                depth,
                limit,
                concurrency,
                wait_for_selector,
                content_selector,
                dedupe,
                output,
            };
            commands::crawl(args).await
        },
        Commands::Screenshot { url, profile, quality, viewport_only, wait_for_selector, output } => {
            info!("Capturing screenshot of {}", url);
            let args = commands::ScreenshotArgs {
                url,
                profile,
                quality,
                viewport_only,
                wait_for_selector,
                output,
            };
            commands::screenshot(args).await
        },
        Commands::ExtractText { url, profile, wait_for_selector, output } => {
            info!("Extracting text from {}", url);
            let args = commands::ExtractTextArgs {
                url,
                profile,
                wait_for_selector,
                output,
            };
            commands::extract_text(args).await
        },
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles()
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(profile_name)
            } else {
                info!("Showing current configuration");
                commands::show_config()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_parse_crawl_arguments() {
        let cli = Cli::try_parse_from([
            "site-crawler", "crawl", "example.com", "--depth", "2", "--limit", "25", "--dedupe", "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.log_file.is_none());
        match cli.command {
            Commands::Crawl { url, depth, limit, dedupe, profile, .. } => {
                assert_eq!(url, "example.com");
                assert_eq!(depth, Some(2));
                assert_eq!(limit, Some(25));
                assert!(dedupe);
                assert!(profile.is_none());
            }
            _ => panic!("expected crawl command"),
        }
    }

    #[test]
    fn test_parse_extract_text_and_content_selector() {
        let cli = Cli::try_parse_from(["site-crawler", "extract-text", "example.com", "-o", "page.json"]).unwrap();
        match cli.command {
            Commands::ExtractText { url, output, wait_for_selector, .. } => {
                assert_eq!(url, "example.com");
                assert_eq!(output, Some(PathBuf::from("page.json")));
                assert!(wait_for_selector.is_none());
            }
            _ => panic!("expected extract-text command"),
        }

        let cli = Cli::try_parse_from(["site-crawler", "crawl", "example.com", "--content-selector", "article p"]).unwrap();
        match cli.command {
            Commands::Crawl { content_selector, .. } => assert_eq!(content_selector.as_deref(), Some("article p")),
            _ => panic!("expected crawl command"),
        }
    }

    #[test]
    fn test_log_file_without_path() {
        let cli = Cli::try_parse_from(["site-crawler", "config", "--list", "--log-file"]).unwrap();
        assert_eq!(cli.log_file, Some(None));

        let cli = Cli::try_parse_from(["site-crawler", "config", "--log-file", "/tmp/crawl.log"]).unwrap();
        assert_eq!(cli.log_file, Some(Some(PathBuf::from("/tmp/crawl.log"))));
    }

    #[test]
    fn test_quality_must_fit_in_a_byte() {
        assert!(Cli::try_parse_from(["site-crawler", "screenshot", "example.com", "--quality", "300"]).is_err());
    }
}
