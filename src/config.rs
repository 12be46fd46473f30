//! Kit configuration.
//!
//! `KitConfig` holds the instance defaults for an [`HttpService`](crate::net::HttpService):
//! identity headers, the cache location and mode, and the repeat/timeout policy.
//! Each of the policy values can be overridden per call through
//! [`RequestOptions`](crate::net::RequestOptions).
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use kit::config::KitConfig;
//! let cfg = KitConfig::default();
//! assert_eq!(cfg.max_attempts, 10);
//! assert!(cfg.cache_dir.is_none());
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use kit::cache::CacheMode;
//! use kit::config::KitConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = KitConfig::builder()
//!     .cache_dir("/tmp/kit-cache")
//!     .cache_mode(CacheMode::Full)
//!     .cache_tag("prices")
//!     .repeat(true)
//!     .timeout_secs(30)
//!     .build()?;
//! # Ok(()) }
//! ```
//!
//! ## Load from JSON
//! Missing fields fall back to the defaults:
//! ```json
//! { "cache_dir": "cache", "cache_mode": "full", "timeout_secs": 20 }
//! ```
//!
//! # Errors
//!
//! Builder validation returns [`ConfigError`] for a zero attempt count, zero
//! timeout, zero redirect budget or an empty user agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheMode;
use crate::errors::ConfigError;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KitConfig {
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// `Accept` sent with every request.
    pub accept: String,
    /// `Accept-Language` sent with every request.
    pub accept_language: String,
    /// Directory holding the cache registry and bodies. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Default cache mode for calls that don't specify one.
    pub cache_mode: CacheMode,
    /// Default cache key tag.
    pub cache_tag: String,
    /// Repeat failed requests by default.
    pub repeat: bool,
    /// Attempts made by the repeat policy, first try included.
    pub max_attempts: u32,
    /// Pause between repeat attempts, in seconds.
    pub pause_secs: u64,
    /// Request timeout, in seconds.
    pub timeout_secs: u64,
    /// Extra tries for the handshake-level transport fault, inside a single attempt.
    pub transport_fault_retries: u32,
    /// Maximum chained redirects followed by one call.
    pub max_redirects: usize,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            cache_dir: None,
            cache_mode: CacheMode::Disabled,
            cache_tag: String::new(),
            repeat: false,
            max_attempts: 10,
            pause_secs: 10,
            timeout_secs: 100,
            transport_fault_retries: 3,
            max_redirects: 10,
        }
    }
}

impl KitConfig {
    pub fn builder() -> KitConfigBuilder {
        KitConfigBuilder::default()
    }

    /// Reads a JSON config file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<KitConfig, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {e}", path.display())))?;
        let cfg: KitConfig = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Unreadable(format!("{}: {e}", path.display())))?;
        validate(&cfg)?;
        Ok(cfg)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Builder for [`KitConfig`].
#[derive(Debug, Clone, Default)]
pub struct KitConfigBuilder {
    inner: KitConfig,
}

impl KitConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut KitConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn user_agent<S: Into<String>>(self, ua: S) -> Self { self.map(|c| c.user_agent = ua.into()) }
    pub fn accept<S: Into<String>>(self, accept: S) -> Self { self.map(|c| c.accept = accept.into()) }
    pub fn accept_language<S: Into<String>>(self, langs: S) -> Self { self.map(|c| c.accept_language = langs.into()) }
    pub fn cache_dir<P: Into<PathBuf>>(self, dir: P) -> Self { self.map(|c| c.cache_dir = Some(dir.into())) }
    pub fn cache_mode(self, mode: CacheMode) -> Self { self.map(|c| c.cache_mode = mode) }
    pub fn cache_tag<S: Into<String>>(self, tag: S) -> Self { self.map(|c| c.cache_tag = tag.into()) }
    pub fn repeat(self, on: bool) -> Self { self.map(|c| c.repeat = on) }
    pub fn max_attempts(self, n: u32) -> Self { self.map(|c| c.max_attempts = n) }
    pub fn pause_secs(self, secs: u64) -> Self { self.map(|c| c.pause_secs = secs) }
    pub fn timeout_secs(self, secs: u64) -> Self { self.map(|c| c.timeout_secs = secs) }
    pub fn transport_fault_retries(self, n: u32) -> Self { self.map(|c| c.transport_fault_retries = n) }
    pub fn max_redirects(self, n: usize) -> Self { self.map(|c| c.max_redirects = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut KitConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<KitConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

fn validate(c: &KitConfig) -> Result<(), ConfigError> {
    if c.max_attempts == 0 {
        return Err(ConfigError::ZeroAttempts);
    }
    if c.timeout_secs == 0 {
        return Err(ConfigError::ZeroTimeout);
    }
    if c.max_redirects == 0 {
        return Err(ConfigError::ZeroRedirects);
    }
    if c.user_agent.trim().is_empty() {
        return Err(ConfigError::EmptyUserAgent);
    }
    Ok(())
}
