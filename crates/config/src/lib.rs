//! Configuration loading, validation, and management for mendstream.
//!
//! Loads configuration from `~/.mendstream/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage backends the store crate knows how to build.
pub const STORE_BACKENDS: &[&str] = &["none", "memory", "file"];

/// The root configuration structure.
///
/// Maps directly to `~/.mendstream/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retry loop and classifier settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Where healed conversations are persisted
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap applied before the per-kind multiplier
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// HTTP status treated as "provider overloaded" (full cleanup)
    #[serde(default = "default_overloaded_status")]
    pub overloaded_status: u16,

    /// Answer tool-level failures inside the running stream
    #[serde(default = "default_true")]
    pub in_place_healing: bool,

    /// In-place heals allowed per step before falling back to a restart
    #[serde(default = "default_max_in_place_heals")]
    pub max_in_place_heals: u32,

    /// How much of invalid tool arguments is echoed back to the model
    #[serde(default = "default_argument_preview_chars")]
    pub argument_preview_chars: usize,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_overloaded_status() -> u16 {
    529
}
fn default_true() -> bool {
    true
}
fn default_max_in_place_heals() -> u32 {
    3
}
fn default_argument_preview_chars() -> usize {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            overloaded_status: default_overloaded_status(),
            in_place_healing: true,
            max_in_place_heals: default_max_in_place_heals(),
            argument_preview_chars: default_argument_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "none", "memory" or "file"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// JSON-lines file for the "file" backend; `~/` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "memory".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The file the "file" backend writes to.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => match p.strip_prefix("~/") {
                Some(rest) => dirs_home().join(rest),
                None => PathBuf::from(p),
            },
            None => ResilienceConfig::config_dir().join("conversations.jsonl"),
        }
    }
}

impl ResilienceConfig {
    /// Load configuration from the default path (~/.mendstream/config.toml).
    ///
    /// Environment variables override the file:
    /// - `MENDSTREAM_MAX_ATTEMPTS`
    /// - `MENDSTREAM_BASE_DELAY_MS`
    /// - `MENDSTREAM_MAX_DELAY_MS`
    /// - `MENDSTREAM_OVERLOADED_STATUS`
    /// - `MENDSTREAM_STORE_BACKEND`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup` (the process environment in `load`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MENDSTREAM_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("MENDSTREAM_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("MENDSTREAM_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_env("MENDSTREAM_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("MENDSTREAM_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_env("MENDSTREAM_MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("MENDSTREAM_OVERLOADED_STATUS") {
            self.retry.overloaded_status = parse_env("MENDSTREAM_OVERLOADED_STATUS", &v)?;
        }
        if let Some(v) = lookup("MENDSTREAM_STORE_BACKEND") {
            self.store.backend = v.trim().to_lowercase();
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mendstream")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must be > 0".into(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_ms must be >= retry.base_delay_ms".into(),
            ));
        }

        if !(100..=599).contains(&self.retry.overloaded_status) {
            return Err(ConfigError::ValidationError(format!(
                "retry.overloaded_status must be an HTTP status, got {}",
                self.retry.overloaded_status
            )));
        }

        if !STORE_BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be one of {}, got '{}'",
                STORE_BACKENDS.join(", "),
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'"))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
