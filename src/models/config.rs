//! Configuration model.

use crate::models::preset::Preset;
use crate::utils::hash::HashAlgorithm;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine settings.
    #[serde(default)]
    pub settings: GlobalSettings,
    /// Named presets.
    #[serde(default)]
    pub presets: Vec<Preset>,
}

impl AppConfig {
    /// Find a preset by name (case-insensitive).
    ///
    /// The built-in `default` preset is always available.
    pub fn preset(&self, name: &str) -> Result<Preset> {
        if let Some(preset) = self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
            return Ok(preset.clone());
        }
        if name.eq_ignore_ascii_case("default") {
            return Ok(Preset::default());
        }
        Err(crate::Error::PresetNotFound(name.to_string()))
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Content hash algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// Whether to persist hashes between runs.
    pub cache_hashes: bool,
    /// Hash cache location.
    pub cache_path: PathBuf,
    /// Planning parallelism.
    pub workers: usize,
    /// Copy parallelism.
    pub max_concurrent_operations: usize,
    /// Read/write block size in bytes.
    pub buffer_size: usize,
    /// Retries for transient I/O failures.
    pub transfer_retry_count: u32,
    /// Base backoff between retries, doubled on each attempt.
    pub retry_backoff_ms: u64,
    /// Timeout per hash or copy operation.
    pub io_timeout_secs: u64,
    /// Re-hash the written file before renaming it into place.
    pub verify_after_copy: bool,
    /// Bound on collision suffix probing.
    pub max_collision_attempts: usize,
    /// Substitute for missing metadata fields.
    pub missing_metadata_placeholder: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha256,
            cache_hashes: true,
            cache_path: dirs_cache_path().join("hash_cache.jsonl"),
            workers: 4,
            max_concurrent_operations: 4,
            buffer_size: 65536,
            transfer_retry_count: 3,
            retry_backoff_ms: 200,
            io_timeout_secs: 600,
            verify_after_copy: true,
            max_collision_attempts: 100_000,
            missing_metadata_placeholder: "Unknown".to_string(),
        }
    }
}

impl GlobalSettings {
    /// Timeout per I/O operation.
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }

    /// Backoff before retry number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Get the configuration directory path.
pub fn dirs_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("media_ingest")
}

/// Get the cache directory path.
pub fn dirs_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("media_ingest")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs_config_path().join("config.toml")
}

/// Load configuration from the default location, falling back to defaults.
pub fn load_config() -> AppConfig {
    let config_path = default_config_path();

    if config_path.exists() {
        match load_config_from(&config_path) {
            Ok(config) => return config,
            Err(e) => tracing::warn!("Ignoring unreadable config {:?}: {}", config_path, e),
        }
    }

    AppConfig::default()
}

/// Load configuration from a specific file.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(crate::Error::PathNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}
