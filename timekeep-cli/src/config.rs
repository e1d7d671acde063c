use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use timekeep::RefreshPolicy;

const API_URL_ENV: &str = "TIMEKEEP_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimekeepConfig {
    /// Base URL of the time tracking API, e.g. "http://localhost:5000/api"
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Status code the server uses for an expired access token
    #[serde(default = "default_refresh_status")]
    pub refresh_status: u16,
    /// Default log filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_refresh_status() -> u16 {
    403
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for TimekeepConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            refresh_status: default_refresh_status(),
            log_level: default_log_level(),
        }
    }
}

impl TimekeepConfig {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Cannot determine config directory")?
            .join("timekeep"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::root_dir()?.join("config.toml"))
    }

    /// Load config from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_with_env(&Self::config_path()?)
    }

    fn load_with_env(path: &Path) -> Result<Self> {
        let config = Self::load_from(path)?;
        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    /// Load config from disk. Returns default config if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write config at {}", path.display()))?;
        Ok(())
    }

    /// Write a default config at `path` unless one exists. Returns true if written.
    pub fn ensure_exists(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        Ok(true)
    }

    fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        self
    }

    pub fn refresh_policy(&self) -> Result<RefreshPolicy> {
        RefreshPolicy::from_code(self.refresh_status)
            .with_context(|| format!("Invalid refresh_status {}", self.refresh_status))
    }
}
