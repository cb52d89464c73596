// src/config.rs

//! Configuration loading.
//!
//! Settings live in a TOML file; every section falls back to defaults so a
//! missing or partial file still yields a runnable configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub crawler: CrawlerConfig,
    pub github: GitHubConfig,
}

/// Key-value store settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Store endpoint URL.
    pub server: String,
    /// Response timeout on the store connection, in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            server: "redis://127.0.0.1:6379".to_string(),
            idle_timeout_secs: 250,
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Connection (dial) timeout, in seconds.
    pub dial_timeout_secs: u64,
    /// End-to-end request timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "docdex/0.3 (+https://github.com/docdex/docdex)".to_string(),
            dial_timeout_secs: 10,
            request_timeout_secs: 20,
        }
    }
}

/// Crawl scheduling settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Base refresh interval for stored packages, in seconds.
    pub max_age_secs: u64,
    /// Maintenance task tick period, in seconds. Zero disables the task.
    pub crawl_interval_secs: u64,
    /// Hosting-service update poll period, in seconds. Zero disables it.
    pub github_interval_secs: u64,
    /// Inline-crawl deadline for known packages, in seconds.
    pub get_timeout_secs: u64,
    /// Inline-crawl deadline for never-seen packages, in seconds.
    pub first_get_timeout_secs: u64,
    /// Directory holding working copies for the generic VCS fetcher.
    pub repo_root: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 60 * 60,
            crawl_interval_secs: 0,
            github_interval_secs: 0,
            get_timeout_secs: 8,
            first_get_timeout_secs: 25,
            repo_root: "/tmp/docdex".to_string(),
        }
    }
}

/// Optional hosting-service credentials, appended as query parameters.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Load configuration, falling back to defaults if loading fails.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to load config from {path:?}: {e}; using defaults");
                Self::default()
            }
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.store.server.is_empty() {
            return Err(Error::config("store.server must not be empty"));
        }
        if self.crawler.max_age_secs == 0 {
            return Err(Error::config("crawler.max_age_secs must be positive"));
        }
        if self.http.request_timeout_secs == 0 {
            return Err(Error::config("http.request_timeout_secs must be positive"));
        }
        if self.github.client_id.is_some() != self.github.client_secret.is_some() {
            return Err(Error::config(
                "github.client_id and github.client_secret must be set together",
            ));
        }
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.crawler.max_age_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.http.dial_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.get_timeout_secs)
    }

    pub fn first_get_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.first_get_timeout_secs)
    }
}
