//! In-memory render backend for tests: a fake site whose pages can be slow,
//! flaky or broken, instrumented to observe concurrent navigations.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::session::{CaptureSpec, Extractor, RenderSession, SessionFactory};
use crate::error::CrawlError;

#[derive(Debug, Clone, Default)]
struct FakePage {
    title: String,
    body: String,
    links: Vec<String>,
    /// Text served for a content selector
    content: HashMap<String, String>,
    sections: Vec<Value>,
    selectors: HashSet<String>,
    delay: Duration,
    failing_navigations: usize,
    broken_extraction: bool,
}

#[derive(Default)]
struct SiteState {
    pages: Mutex<HashMap<String, FakePage>>,
    visits: Mutex<Vec<String>>,
    captures: Mutex<Vec<CaptureSpec>>,
    concurrent: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<SiteState>,
}

pub struct PageBuilder<'a> {
    site: &'a FakeSite,
    url: String,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or keep editing) the page served at `url`
    pub fn page(&self, url: &str) -> PageBuilder<'_> {
        self.state.pages.lock().unwrap()
            .entry(url.to_string())
            .or_insert_with(|| FakePage { title: format!("Title of {}", url), ..FakePage::default() });
        PageBuilder { site: self, url: url.to_string() }
    }

    pub fn visits(&self, url: &str) -> usize {
        self.state.visits.lock().unwrap().iter().filter(|visited| *visited == url).count()
    }

    pub fn total_visits(&self) -> usize {
        self.state.visits.lock().unwrap().len()
    }

    pub fn peak_concurrent(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> Vec<CaptureSpec> {
        self.state.captures.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Option<FakePage> {
        self.state.pages.lock().unwrap().get(url).cloned()
    }
}

impl PageBuilder<'_> {
    fn edit(self, f: impl FnOnce(&mut FakePage)) -> Self {
        if let Some(page) = self.site.state.pages.lock().unwrap().get_mut(&self.url) {
            f(page);
        }
        self
    }

    pub fn title(self, title: &str) -> Self {
        let title = title.to_string();
        self.edit(|page| page.title = title)
    }

    pub fn body(self, body: &str) -> Self {
        let body = body.to_string();
        self.edit(|page| page.body = body)
    }

    pub fn links(self, links: &[&str]) -> Self {
        let links = links.iter().map(|link| link.to_string()).collect();
        self.edit(|page| page.links = links)
    }

    pub fn content(self, selector: &str, text: &str) -> Self {
        let (selector, text) = (selector.to_string(), text.to_string());
        self.edit(|page| {
            page.content.insert(selector, text);
        })
    }

    /// Headings as `(level, text)`, everything else as level 0 paragraphs
    pub fn sections(self, sections: &[(u8, &str)]) -> Self {
        let sections = sections.iter()
            .map(|&(level, text)| match level {
                0 => json!({ "type": "paragraph", "text": text }),
                level => json!({ "type": "heading", "level": level, "text": text }),
            })
            .collect();
        self.edit(|page| page.sections = sections)
    }

    pub fn selector(self, selector: &str) -> Self {
        let selector = selector.to_string();
        self.edit(|page| {
            page.selectors.insert(selector);
        })
    }

    pub fn delay(self, delay: Duration) -> Self {
        self.edit(|page| page.delay = delay)
    }

    /// Fail the first `count` navigations with a connection reset
    pub fn flaky(self, count: usize) -> Self {
        self.edit(|page| page.failing_navigations = count)
    }

    pub fn broken_extraction(self) -> Self {
        self.edit(|page| page.broken_extraction = true)
    }
}

struct InFlight(Arc<SiteState>);

impl InFlight {
    fn enter(state: &Arc<SiteState>) -> Self {
        let now = state.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(state))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.concurrent.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeSession {
    site: FakeSite,
    current: Option<FakePage>,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), CrawlError> {
        self.current = None;
        self.site.state.visits.lock().unwrap().push(url.to_string());

        let page = self.site.lookup(url)
            .ok_or_else(|| CrawlError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"))?;

        let _in_flight = InFlight::enter(&self.site.state);
        tokio::time::sleep(page.delay).await;

        if page.failing_navigations > 0 {
            if let Some(stored) = self.site.state.pages.lock().unwrap().get_mut(url) {
                stored.failing_navigations -= 1;
            }
            return Err(CrawlError::navigation(url, "net::ERR_CONNECTION_RESET"));
        }

        self.current = Some(page);
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<(), CrawlError> {
        match &self.current {
            Some(page) if page.selectors.contains(selector) => Ok(()),
            _ => Err(CrawlError::extraction(format!("Element not found: {}", selector))),
        }
    }

    async fn evaluate(&mut self, extractor: Extractor) -> Result<Value, CrawlError> {
        let page = self.current.as_ref().ok_or_else(|| CrawlError::extraction("No page loaded"))?;
        if page.broken_extraction {
            return Err(CrawlError::extraction("Evaluation failed: page crashed"));
        }

        Ok(match extractor {
            Extractor::Title => json!(page.title),
            Extractor::Text { selector: None } => json!(page.body),
            Extractor::Text { selector: Some(selector) } => {
                json!(page.content.get(&selector).cloned().unwrap_or_default())
            }
            Extractor::Sections => Value::Array(page.sections.clone()),
            Extractor::Links => Value::Array(
                page.links.iter()
                    .map(|link| json!({ "url": link, "text": format!(" {} ", link), "title": null }))
                    .collect(),
            ),
        })
    }

    async fn screenshot(&mut self, spec: CaptureSpec) -> Result<Vec<u8>, CrawlError> {
        if self.current.is_none() {
            return Err(CrawlError::extraction("No page loaded"));
        }
        self.site.state.captures.lock().unwrap().push(spec);
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0, spec.quality, 0xFF, 0xD9])
    }

    async fn close(&mut self) {
        self.site.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeFactory {
    site: FakeSite,
    /// Sessions the backend agrees to start; `None` is unlimited
    limit: Option<usize>,
    started: AtomicUsize,
}

impl FakeFactory {
    pub fn new(site: FakeSite) -> Self {
        Self { site, limit: None, started: AtomicUsize::new(0) }
    }

    /// A factory whose backend is unreachable
    pub fn failing() -> Self {
        Self::limited(FakeSite::new(), 0)
    }

    /// A factory that refuses every session after the first `limit`
    pub fn limited(site: FakeSite, limit: usize) -> Self {
        Self { site, limit: Some(limit), started: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(&self) -> Result<Box<dyn RenderSession>, CrawlError> {
        if let Some(limit) = self.limit {
            if self.started.load(Ordering::SeqCst) >= limit {
                return Err(CrawlError::setup("Failed to start a session at http://localhost:4444"));
            }
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession { site: self.site.clone(), current: None }))
    }
}
