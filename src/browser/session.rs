use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::time::Duration;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use tracing::{debug, error};

use crate::browser::script;
use crate::cli::config::BrowserSettings;
use crate::error::CrawlError;

/// A piece of content a session can extract from the loaded page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    /// Document title, as a JSON string
    Title,
    /// Visible text of every element matching `selector` (the body when
    /// unset), joined with spaces, as a JSON string
    Text { selector: Option<String> },
    /// Anchors as a JSON array of `{url, text, title}`
    Links,
    /// Headings and paragraphs in document order, as a JSON array of
    /// `{type: "heading", level, text}` and `{type: "paragraph", text}`
    Sections,
}

impl Extractor {
    /// Body text extractor
    pub fn body_text() -> Self {
        Extractor::Text { selector: None }
    }
}

/// Screenshot parameters handed to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSpec {
    pub full_page: bool,
    pub quality: u8,
}

/// One controllable page (a browser tab or equivalent).
///
/// Sessions are owned by the pool and lent to exactly one worker at a time.
#[async_trait]
pub trait RenderSession: Send {
    /// Load `url`, failing with a navigation error on network failure
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), CrawlError>;

    /// Wait until `selector` matches an element on the loaded page
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), CrawlError>;

    /// Run an extractor against the loaded page
    async fn evaluate(&mut self, extractor: Extractor) -> Result<Value, CrawlError>;

    /// Capture the loaded page as JPEG bytes
    async fn screenshot(&mut self, spec: CaptureSpec) -> Result<Vec<u8>, CrawlError>;

    /// Release the underlying browser resources
    async fn close(&mut self);
}

/// Creates sessions for a pool
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn RenderSession>, CrawlError>;
}

/// Session backed by a WebDriver-controlled Chrome
pub struct WebDriverSession {
    /// WebDriver instance
    driver: Option<WebDriver>,
}

impl WebDriverSession {
    /// Start a new browser session on the configured WebDriver server
    pub async fn connect(config: &BrowserSettings) -> Result<Self, CrawlError> {
        let mut caps = DesiredCapabilities::chrome();

        caps.add_chrome_arg(&format!("--user-agent={}", config.user_agent))
            .map_err(CrawlError::setup)?;
        caps.add_chrome_arg(&format!("--window-size={},{}", config.viewport.width, config.viewport.height))
            .map_err(CrawlError::setup)?;
        caps.add_chrome_arg("--disable-dev-shm-usage")
            .map_err(CrawlError::setup)?;

        if config.headless {
            caps.set_headless().map_err(CrawlError::setup)?;
        }

        let driver = WebDriver::new(&config.webdriver_url, caps).await
            .map_err(|e| CrawlError::setup(format!("Failed to connect to WebDriver at {}: {}", config.webdriver_url, e)))?;

        debug!("Browser session started on {}", config.webdriver_url);

        Ok(Self { driver: Some(driver) })
    }

    fn driver(&self) -> Result<&WebDriver, CrawlError> {
        self.driver.as_ref()
            .ok_or_else(|| CrawlError::extraction("Browser session already closed"))
    }
}

#[async_trait]
impl RenderSession for WebDriverSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), CrawlError> {
        let driver = self.driver()?;

        driver.set_page_load_timeout(timeout).await
            .map_err(|e| CrawlError::navigation(url, e))?;

        debug!("Navigating to: {}", url);
        driver.goto(url).await
            .map_err(|e| navigation_error(url, timeout, &e))
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), CrawlError> {
        let driver = self.driver()?;

        driver.query(By::Css(selector))
            .wait(timeout, Duration::from_millis(250))
            .first()
            .await
            .map_err(|e| CrawlError::extraction(format!("Element not found: {}: {}", selector, e)))?;

        Ok(())
    }

    async fn evaluate(&mut self, extractor: Extractor) -> Result<Value, CrawlError> {
        let driver = self.driver()?;

        if extractor == Extractor::Title {
            let title = driver.title().await
                .map_err(|e| CrawlError::extraction(format!("Failed to get page title: {}", e)))?;
            return Ok(Value::String(title));
        }

        let (source, args) = script::for_extractor(&extractor);
        let result = driver.execute(source, args).await
            .map_err(|e| CrawlError::extraction(format!("Failed to execute JavaScript: {}", e)))?;

        Ok(result.json().clone())
    }

    async fn screenshot(&mut self, spec: CaptureSpec) -> Result<Vec<u8>, CrawlError> {
        let driver = self.driver()?;
        let dev_tools = ChromeDevTools::new(driver.handle.clone());

        let mut params = json!({
            "format": "jpeg",
            "quality": spec.quality,
            "captureBeyondViewport": spec.full_page,
        });

        if spec.full_page {
            let metrics = dev_tools.execute_cdp("Page.getLayoutMetrics").await
                .map_err(|e| CrawlError::extraction(format!("Failed to read layout metrics: {}", e)))?;
            params["clip"] = full_page_clip(&metrics)?;
        }

        let response = dev_tools.execute_cdp_with_params("Page.captureScreenshot", params).await
            .map_err(|e| CrawlError::extraction(format!("Failed to take screenshot: {}", e)))?;

        let data = response["data"].as_str()
            .ok_or_else(|| CrawlError::extraction("Screenshot response carried no image data"))?;

        STANDARD.decode(data)
            .map_err(|e| CrawlError::extraction(format!("Screenshot data was not base64: {}", e)))
    }

    async fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.quit().await {
                error!("Error closing browser session: {}", e);
            }
            debug!("Browser session closed");
        }
    }
}

/// Page-load timeouts come back either as a thirtyfour timeout or as a
/// WebDriver command error with the `timeout` status
fn is_page_load_timeout(error: &WebDriverError) -> bool {
    match error {
        WebDriverError::Timeout(_) => true,
        WebDriverError::CmdError(_) => error.to_string().to_lowercase().contains("timeout"),
        _ => false,
    }
}

fn navigation_error(url: &str, timeout: Duration, error: &WebDriverError) -> CrawlError {
    if is_page_load_timeout(error) {
        CrawlError::NavigationTimeout { url: url.to_string(), timeout_secs: timeout.as_secs() }
    } else {
        CrawlError::navigation(url, error)
    }
}

/// Clip covering the whole document, from a `Page.getLayoutMetrics` response
fn full_page_clip(metrics: &Value) -> Result<Value, CrawlError> {
    let size = &metrics["cssContentSize"];
    let (width, height) = match (size["width"].as_f64(), size["height"].as_f64()) {
        (Some(width), Some(height)) => (width, height),
        _ => return Err(CrawlError::extraction("Layout metrics carried no content size")),
    };

    Ok(json!({
        "x": 0,
        "y": 0,
        "width": width,
        "height": height,
        "scale": 1,
    }))
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Quitting needs the runtime; without one the server reaps the session
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        error!("Error closing browser session during drop: {}", e);
                    }
                });
            }
        }
    }
}

/// Creates WebDriver sessions from the browser settings
pub struct WebDriverFactory {
    config: BrowserSettings,
}

impl WebDriverFactory {
    pub fn new(config: BrowserSettings) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn create(&self) -> Result<Box<dyn RenderSession>, CrawlError> {
        let session = WebDriverSession::connect(&self.config).await?;
        Ok(Box::new(session))
    }
}
