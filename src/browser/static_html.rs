use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::browser::session::{CaptureSpec, Extractor, RenderSession, SessionFactory};
use crate::cli::config::BrowserSettings;
use crate::error::CrawlError;

/// Elements whose text never shows up on the rendered page
const HIDDEN_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Embedded content left out of page sections
const EMBEDDED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "img", "template"];

const SECTION_TAGS: &str = "h1, h2, h3, h4, h5, h6, p";

/// Session that fetches raw HTML over HTTP and extracts from the static DOM.
///
/// No JavaScript runs, so pages that build their content client-side come
/// back mostly empty. Screenshots are not supported.
pub struct HttpSession {
    client: Client,
    page: Option<LoadedPage>,
}

struct LoadedPage {
    /// URL after redirects, used to resolve relative links
    url: Url,
    html: String,
}

impl HttpSession {
    pub fn new(client: Client) -> Self {
        Self { client, page: None }
    }

    fn loaded(&self) -> Result<&LoadedPage, CrawlError> {
        self.page.as_ref()
            .ok_or_else(|| CrawlError::extraction("No page loaded"))
    }
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), CrawlError> {
        self.page = None;

        let to_navigation_error = |e: reqwest::Error| {
            if e.is_timeout() {
                CrawlError::NavigationTimeout { url: url.to_string(), timeout_secs: timeout.as_secs() }
            } else {
                CrawlError::navigation(url, e)
            }
        };

        debug!("Fetching: {}", url);
        let response = self.client.get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(to_navigation_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(CrawlError::navigation(url, format!("HTTP {}", status)));
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(to_navigation_error)?;

        self.page = Some(LoadedPage { url: final_url, html });
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<(), CrawlError> {
        // The DOM is static: the element is either there now or never
        let page = self.loaded()?;
        let parsed = parse_selector(selector)?;

        if Html::parse_document(&page.html).select(&parsed).next().is_some() {
            Ok(())
        } else {
            Err(CrawlError::extraction(format!("Element not found: {}", selector)))
        }
    }

    async fn evaluate(&mut self, extractor: Extractor) -> Result<Value, CrawlError> {
        let page = self.loaded()?;
        let document = Html::parse_document(&page.html);

        Ok(match extractor {
            Extractor::Title => Value::String(extract_title(&document)),
            Extractor::Text { selector } => {
                Value::String(extract_text(&document, selector.as_deref().unwrap_or("body"))?)
            }
            Extractor::Links => extract_links(&document, &page.url),
            Extractor::Sections => extract_sections(&document),
        })
    }

    async fn screenshot(&mut self, _spec: CaptureSpec) -> Result<Vec<u8>, CrawlError> {
        Err(CrawlError::extraction("Static HTML sessions cannot capture screenshots"))
    }

    async fn close(&mut self) {
        self.page = None;
    }
}

fn parse_selector(selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector)
        .map_err(|e| CrawlError::extraction(format!("Invalid selector '{}': {:?}", selector, e)))
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };

    document.select(&selector)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Text of every element matching `selector`, with hidden content left out
fn extract_text(document: &Html, selector: &str) -> Result<String, CrawlError> {
    let parsed = parse_selector(selector)?;

    let fragments: Vec<String> = document.select(&parsed)
        .map(|element| visible_text(element, HIDDEN_TEXT_TAGS))
        .filter(|text| !text.is_empty())
        .collect();

    Ok(fragments.join(" "))
}

fn extract_sections(document: &Html) -> Value {
    let Ok(selector) = Selector::parse(SECTION_TAGS) else {
        return Value::Array(vec![]);
    };

    let sections = document.select(&selector)
        .filter(|element| !inside(element, EMBEDDED_TAGS))
        .filter_map(|element| {
            let text = visible_text(element, EMBEDDED_TAGS);
            if text.is_empty() {
                return None;
            }

            let name = element.value().name();
            Some(match name[1..].parse::<u8>() {
                Ok(level) if name.starts_with('h') => json!({ "type": "heading", "level": level, "text": text }),
                _ => json!({ "type": "paragraph", "text": text }),
            })
        })
        .collect();

    Value::Array(sections)
}

/// Whitespace-collapsed text under `root`, skipping text inside `skipped` elements
fn visible_text(root: ElementRef<'_>, skipped: &[&str]) -> String {
    let mut fragments = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors()
            .take_while(|ancestor| ancestor.id() != root.id())
            .any(|ancestor| {
                ancestor.value().as_element()
                    .map_or(false, |element| skipped.contains(&element.name()))
            });
        if hidden {
            continue;
        }

        fragments.push(&**text);
    }

    fragments.concat().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn inside(element: &ElementRef<'_>, tags: &[&str]) -> bool {
    element.ancestors().any(|ancestor| {
        ancestor.value().as_element()
            .map_or(false, |ancestor| tags.contains(&ancestor.name()))
    })
}

fn extract_links(document: &Html, base: &Url) -> Value {
    let Ok(selector) = Selector::parse("a") else {
        return Value::Array(vec![]);
    };

    let links = document.select(&selector)
        .map(|anchor| {
            let url = anchor.value().attr("href")
                .and_then(|href| base.join(href.trim()).ok())
                .map(|url| url.to_string())
                .unwrap_or_default();
            let text = anchor.text().collect::<String>();

            json!({
                "url": url,
                "text": text.trim(),
                "title": anchor.value().attr("title"),
            })
        })
        .collect();

    Value::Array(links)
}

/// Creates HTTP sessions sharing one connection pool
pub struct HttpSessionFactory {
    client: Client,
}

impl HttpSessionFactory {
    pub fn new(config: &BrowserSettings) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()
            .map_err(|e| CrawlError::setup(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn create(&self) -> Result<Box<dyn RenderSession>, CrawlError> {
        Ok(Box::new(HttpSession::new(self.client.clone())))
    }
}
