use std::collections::HashSet;
use regex::Regex;
use url::Url;
use tracing::{debug, warn};

use crate::cli::config::{CrawlerSettings, LinkScope};

/// Decides which discovered links are worth following
#[derive(Debug, Clone)]
pub struct LinkFilter {
    /// Scope relative to the page the link was found on
    scope: LinkScope,

    /// Compiled regex patterns for URL inclusion
    include_patterns: Vec<Regex>,

    /// Compiled regex patterns for URL exclusion
    exclude_patterns: Vec<Regex>,

    /// Allowed domains for crawling (if empty, any domain is allowed)
    allowed_domains: HashSet<String>,
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self::new(&CrawlerSettings::default())
    }
}

impl LinkFilter {
    /// Create a new filter from the crawler settings
    pub fn new(config: &CrawlerSettings) -> Self {
        Self {
            scope: config.link_scope,
            include_patterns: compile_patterns(&config.url_patterns.include, "include"),
            exclude_patterns: compile_patterns(&config.url_patterns.exclude, "exclude"),
            allowed_domains: config.allowed_domains.iter()
                .map(|domain| domain.to_lowercase())
                .collect(),
        }
    }

    /// Determine if a link found on `parent_url` should be followed
    pub fn should_follow(&self, parent_url: &str, link: &str) -> bool {
        let parsed = match Url::parse(link) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping invalid URL {}: {}", link, e);
                return false;
            }
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            debug!("Skipping non-http URL: {}", link);
            return false;
        }

        let host = match parsed.host_str() {
            Some(host) => host.to_lowercase(),
            None => {
                debug!("Skipping URL without host: {}", link);
                return false;
            }
        };

        if !self.in_scope(parent_url, &host) {
            debug!("Skipping out-of-scope URL: {}", link);
            return false;
        }

        if !self.allowed_domains.is_empty()
            && !self.allowed_domains.iter().any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
        {
            debug!("Skipping URL from non-allowed domain: {}", host);
            return false;
        }

        if self.exclude_patterns.iter().any(|pattern| pattern.is_match(link)) {
            debug!("Skipping URL matching exclusion pattern: {}", link);
            return false;
        }

        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|pattern| pattern.is_match(link))
        {
            debug!("Skipping URL not matching any inclusion pattern: {}", link);
            return false;
        }

        true
    }

    fn in_scope(&self, parent_url: &str, host: &str) -> bool {
        if self.scope == LinkScope::All {
            return true;
        }

        let parent_host = match Url::parse(parent_url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
            Some(parent_host) => parent_host,
            None => return false,
        };

        match self.scope {
            LinkScope::SameHostname => host == parent_host,
            LinkScope::SameDomain => base_domain(host) == base_domain(&parent_host),
            LinkScope::All => true,
        }
    }
}

fn compile_patterns(patterns: &[String], kind: &str) -> Vec<Regex> {
    patterns.iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!("Invalid {} pattern '{}': {}", kind, pattern, e);
                None
            }
        })
        .collect()
}

/// Last two labels of a host, e.g. `docs.example.com` -> `example.com`
fn base_domain(host: &str) -> &str {
    let mut dots = host.rmatch_indices('.');
    match (dots.next(), dots.next()) {
        (Some(_), Some((idx, _))) => &host[idx + 1..],
        _ => host,
    }
}

/// Normalize a URL so trivially different spellings compare equal
pub fn normalize_url(url: &str) -> String {
    let mut normalized = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => return url.to_string(),
    };

    // The parser already lowercases the host and drops default ports
    normalized.set_fragment(None);

    // Sort query parameters if present
    if let Some(query) = normalized.query().map(str::to_string) {
        if query.is_empty() {
            normalized.set_query(None);
        } else {
            let mut params: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
            params.sort_by(|a, b| a.split('=').next().cmp(&b.split('=').next()));
            normalized.set_query(Some(&params.join("&")));
        }
    }

    let mut out = normalized.to_string();

    // Bare root path
    if normalized.path() == "/" && normalized.query().is_none() && out.ends_with('/') {
        out.pop();
    }

    out
}
