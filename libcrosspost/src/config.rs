//! Configuration management for Crosspost
//!
//! The TOML file only tunes the engine. Ads and credentials always come from
//! the caller. Each adapter resolves its [`AdapterSettings`] once at
//! construction and never re-reads configuration.
//!
//! ```toml
//! [engine]
//! headless = true
//! platforms = ["facebook", "craigslist"]
//!
//! [platforms.craigslist]
//! requests_per_second = 0.2
//! upload_timeout_secs = 90
//!
//! [platforms.ebay]
//! sandbox = false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::images::RetryPolicy;
use crate::rate_limiter::MAX_PERIOD;

pub const CONFIG_ENV: &str = "CROSSPOST_CONFIG";

const MIN_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub platforms: HashMap<String, PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Randomized pauses between interactions
    #[serde(default = "default_true")]
    pub human_pacing: bool,
    /// Directory for downloaded images awaiting upload
    #[serde(default)]
    pub temp_dir: Option<String>,
    /// Platforms used when the caller does not name any
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            human_pacing: true,
            temp_dir: None,
            platforms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub requests_per_second: Option<f64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub upload_timeout_secs: Option<u64>,
    #[serde(default)]
    pub element_timeout_secs: Option<u64>,
    /// eBay only: use the sandbox endpoint
    #[serde(default)]
    pub sandbox: Option<bool>,
    /// eBay only: explicit Trading API endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: None,
            requests_per_second: None,
            download_timeout_secs: None,
            upload_timeout_secs: None,
            element_timeout_secs: None,
            sandbox: None,
            endpoint: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Built-in values an adapter falls back to when the file is silent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformDefaults {
    pub requests_per_second: f64,
    pub upload_timeout: Duration,
}

/// Fully resolved, immutable settings for one adapter instance
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub headless: bool,
    pub requests_per_second: f64,
    /// Wait for required elements (forms, inputs)
    pub element_timeout: Duration,
    /// Short wait used to probe optional elements
    pub probe_timeout: Duration,
    /// How long to look for success or error signatures after submitting
    pub completion_timeout: Duration,
    pub poll_interval: Duration,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,
    pub human_pacing: bool,
    pub download_retry: RetryPolicy,
    pub temp_dir: PathBuf,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            headless: true,
            requests_per_second: 1.0,
            element_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
            completion_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            download_timeout: DEFAULT_TRANSFER_TIMEOUT,
            upload_timeout: DEFAULT_TRANSFER_TIMEOUT,
            human_pacing: true,
            download_retry: RetryPolicy::default(),
            temp_dir: std::env::temp_dir().join("crosspost"),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: the built-in defaults are used.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, platform) in &self.platforms {
            if let Some(rps) = platform.requests_per_second {
                if !rps.is_finite() || rps <= 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("platforms.{}.requests_per_second", name),
                        reason: format!("must be a positive number, got {}", rps),
                    }
                    .into());
                }
                let min_rate = 1.0 / MAX_PERIOD.as_secs_f64();
                if rps < min_rate {
                    return Err(ConfigError::InvalidValue {
                        field: format!("platforms.{}.requests_per_second", name),
                        reason: format!(
                            "must allow at least one request per {}, got {}",
                            humantime::format_duration(MAX_PERIOD),
                            rps
                        ),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.get(name)
    }

    /// A platform is enabled unless its section says otherwise
    pub fn is_enabled(&self, name: &str) -> bool {
        self.platform(name).map(|p| p.enabled).unwrap_or(true)
    }

    pub fn temp_dir(&self) -> PathBuf {
        match &self.engine.temp_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => std::env::temp_dir().join("crosspost"),
        }
    }

    /// Resolve the settings for one adapter
    ///
    /// Precedence: environment override, then the platform section, then
    /// `defaults`. Transfer timeouts are clamped to 30s (download) and 60s
    /// (upload) minimums.
    pub fn adapter_settings(&self, name: &str, defaults: PlatformDefaults) -> AdapterSettings {
        let section = self.platform(name).cloned().unwrap_or_default();
        let env_prefix = format!("CROSSPOST_{}", name.to_uppercase());

        let download_default = section
            .download_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TRANSFER_TIMEOUT);
        let upload_default = section
            .upload_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.upload_timeout);

        let base = AdapterSettings::default();
        AdapterSettings {
            headless: section.headless.unwrap_or(self.engine.headless),
            requests_per_second: section
                .requests_per_second
                .unwrap_or(defaults.requests_per_second),
            element_timeout: section
                .element_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.element_timeout),
            download_timeout: timeout_from_env(
                &format!("{}_DOWNLOAD_TIMEOUT", env_prefix),
                download_default,
            )
            .max(MIN_DOWNLOAD_TIMEOUT),
            upload_timeout: timeout_from_env(
                &format!("{}_UPLOAD_TIMEOUT", env_prefix),
                upload_default,
            )
            .max(MIN_UPLOAD_TIMEOUT),
            human_pacing: self.engine.human_pacing,
            temp_dir: self.temp_dir(),
            ..base
        }
    }
}

fn timeout_from_env(var: &str, default: Duration) -> Duration {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(
                    "Ignoring {}={:?}: expected whole seconds, using {}",
                    var,
                    raw,
                    humantime::format_duration(default)
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}
