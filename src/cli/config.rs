use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerConfig {
    pub crawler: CrawlerSettings,
    pub browser: BrowserSettings,
    pub screenshot: ScreenshotSettings,
    pub storage: StorageSettings,
}

/// Crawl job defaults and link-following policy
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerSettings {
    pub max_requests: usize,
    pub max_depth: u32,
    pub max_concurrency: usize,
    pub max_request_retries: u32,
    pub navigation_timeout_secs: u64,
    pub request_handler_timeout_secs: u64,
    pub dedupe: bool,
    pub link_scope: LinkScope,
    pub allowed_domains: Vec<String>,
    pub url_patterns: UrlPatterns,
}

/// Which discovered links may be followed, relative to the page they were found on
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LinkScope {
    #[default]
    SameHostname,
    SameDomain,
    All,
}

/// URL pattern settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct UrlPatterns {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Which render backend sessions are created from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    #[default]
    Webdriver,
    Http,
}

/// Browser settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    pub backend: RenderBackend,
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: String,
}

/// Browser viewport settings
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Screenshot capture defaults
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenshotSettings {
    pub navigation_timeout_secs: u64,
    pub request_handler_timeout_secs: u64,
    pub max_request_retries: u32,
    pub quality: u8,
    pub full_page: bool,
}

/// Screenshot storage settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    /// Directory screenshots are written into
    pub screenshots_dir: PathBuf,

    /// Public path prefix returned as the image reference
    pub public_path: String,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            max_depth: 1,
            max_concurrency: 2,
            max_request_retries: 1,
            navigation_timeout_secs: 60,
            request_handler_timeout_secs: 60,
            dedupe: false,
            link_scope: LinkScope::SameHostname,
            allowed_domains: vec![],
            url_patterns: UrlPatterns::default(),
        }
    }
}

impl Default for UrlPatterns {
    fn default() -> Self {
        Self {
            include: vec![],
            exclude: vec![
                r"\.(pdf|zip|doc|docx|xls|xlsx)$".to_string(),
                "logout".to_string(),
                "signout".to_string(),
                "unsubscribe".to_string(),
            ],
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            backend: RenderBackend::Webdriver,
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            viewport: Viewport::default(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 800 }
    }
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 30,
            request_handler_timeout_secs: 60,
            max_request_retries: 1,
            quality: 80,
            full_page: true,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("public/uploads/screenshots"),
            public_path: "/uploads/screenshots".to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "site-crawler", "site-crawler") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        // Create the sites directory if it doesn't exist
        path.push("sites");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path.pop();
        path
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_as_default()?;
            Ok(config)
        }
    }

    /// Load a configuration profile
    pub fn load_profile(profile: &str) -> Result<Self> {
        let profile_path = Self::config_dir().join("sites").join(format!("{}.yaml", profile));

        if profile_path.exists() {
            Self::load_from_file(&profile_path)
        } else {
            anyhow::bail!("Profile '{}' not found", profile)
        }
    }

    /// Load a profile when named, otherwise the default configuration
    pub fn load(profile: Option<&str>) -> Result<Self> {
        match profile {
            Some(name) => Self::load_profile(name)
                .context(format!("Failed to load profile: {}", name)),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))
    }

    /// Parse a configuration document, rejecting unknown keys
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<()> {
        let config_path = Self::config_dir().join("default.yaml");
        self.save_to_file(&config_path)
    }

    /// Save the configuration as a profile
    pub fn save_as_profile(&self, profile: &str) -> Result<()> {
        let profile_path = Self::config_dir().join("sites").join(format!("{}.yaml", profile));
        self.save_to_file(&profile_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// List all available profiles
    pub fn list_profiles() -> Result<Vec<String>> {
        let sites_dir = Self::config_dir().join("sites");

        if !sites_dir.exists() {
            return Ok(vec![]);
        }

        let mut profiles = Vec::new();

        for entry in fs::read_dir(sites_dir)? {
            let path = entry?.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    profiles.push(name.to_string());
                }
            }
        }

        profiles.sort();
        Ok(profiles)
    }
}
