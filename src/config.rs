//! Configuration management for edgeos-bouncer.
//!
//! Settings come from an optional YAML file and are then overridden by the
//! environment variables the bouncer has always been deployed with
//! (`CS_TOKEN`, `CS_URL`, `ER_USER`, `ER_PASS`, `ER_URL`, `ER_GROUP`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::planner::{UpdateStrategy, DEFAULT_MAX_BATCH_SIZE};
use crate::reconciler::EngineSettings;
use crate::validation::{parse_interval, validate_url};

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/edgeos-bouncer/config.yaml";

/// Secure string type that zeroizes memory on drop
/// Used for the feed API key and the device password
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decision feed (local API) settings
    pub feed: FeedConfig,

    /// EdgeOS device settings
    pub device: DeviceConfig,

    /// Reconciliation engine tuning
    pub engine: EngineConfig,

    /// Lock file preventing two bouncers from patching the same group
    pub lock_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            device: DeviceConfig::default(),
            engine: EngineConfig::default(),
            lock_file: PathBuf::from("/run/edgeos-bouncer.lock"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    /// Bouncer API key, overridden by `CS_TOKEN`
    pub api_key: SecureString,
    pub poll_interval: String,
    /// Request timeout for each poll
    pub timeout: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: SecureString::default(),
            poll_interval: "20s".to_string(),
            timeout: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub url: String,
    pub user: String,
    /// Overridden by `ER_PASS`
    pub password: SecureString,
    /// Address group kept in sync with the feed
    pub group: String,
    /// EdgeOS ships with a self-signed certificate
    pub accept_invalid_certs: bool,
    pub timeout: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: SecureString::default(),
            group: String::new(),
            accept_invalid_certs: false,
            timeout: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often the dirty flag is checked
    pub tick_interval: String,
    /// Maximum addresses per device update call
    pub max_batch_size: usize,
    /// Refetch the group after each apply and compare
    pub verify_after_apply: bool,
    /// Strategy used for the cycle following a detected divergence
    pub resync_strategy: UpdateStrategy,
    /// Start from an empty desired set and let the feed's startup
    /// delivery rebuild it, dropping stale device entries
    pub purge_on_start: bool,
    /// Upper bound for the retry backoff after failed cycles
    pub max_backoff: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: "5s".to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            verify_after_apply: true,
            resync_strategy: UpdateStrategy::Patch,
            purge_on_start: false,
            max_backoff: "5m".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file (if present) and the environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse the YAML file, falling back to defaults when it does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {:?}, using environment only", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Override settings from environment-style variables.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CS_TOKEN") {
            self.feed.api_key = SecureString::new(v);
        }
        if let Some(v) = lookup("CS_URL") {
            self.feed.url = v;
        }
        if let Some(v) = lookup("ER_USER") {
            self.device.user = v;
        }
        if let Some(v) = lookup("ER_PASS") {
            self.device.password = SecureString::new(v);
        }
        if let Some(v) = lookup("ER_URL") {
            self.device.url = v;
        }
        if let Some(v) = lookup("ER_GROUP") {
            self.device.group = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_url("feed.url (CS_URL)", &self.feed.url)?;
        validate_url("device.url (ER_URL)", &self.device.url)?;

        if self.feed.api_key.is_empty() {
            anyhow::bail!("feed.api_key (CS_TOKEN) must be set");
        }

        if self.device.user.is_empty() {
            anyhow::bail!("device.user (ER_USER) must be set");
        }

        if self.device.group.trim().is_empty() {
            anyhow::bail!("device.group (ER_GROUP) must be set");
        }

        if self.engine.max_batch_size == 0 {
            anyhow::bail!("engine.max_batch_size must be at least 1");
        }

        for (field, value) in [
            ("feed.poll_interval", &self.feed.poll_interval),
            ("feed.timeout", &self.feed.timeout),
            ("device.timeout", &self.device.timeout),
            ("engine.tick_interval", &self.engine.tick_interval),
            ("engine.max_backoff", &self.engine.max_backoff),
        ] {
            parse_interval(value).with_context(|| format!("Invalid {}", field))?;
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_interval(&self.feed.poll_interval)
    }

    pub fn feed_timeout(&self) -> Result<Duration> {
        parse_interval(&self.feed.timeout)
    }

    pub fn device_timeout(&self) -> Result<Duration> {
        parse_interval(&self.device.timeout)
    }

    /// Engine settings derived from the `engine` section
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            group: self.device.group.clone(),
            tick_interval: parse_interval(&self.engine.tick_interval)?,
            max_batch_size: self.engine.max_batch_size,
            verify_after_apply: self.engine.verify_after_apply,
            resync_strategy: self.engine.resync_strategy,
            purge_on_start: self.engine.purge_on_start,
            max_backoff: parse_interval(&self.engine.max_backoff)?,
        })
    }
}
