//! # Engine Configuration
//!
//! Configuration management for the distribution engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FABRICA_CADENCE_SECS=600                                           │
//! │     FABRICA_CHUNK_SIZE=25                                              │
//! │                                                                         │
//! │  2. TOML Config File (fabrica.toml)                                    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # fabrica.toml
//! log_level = "info"
//!
//! [api]
//! timeout_secs = 30
//! max_attempts = 3
//! retry_base_delay_ms = 2000
//!
//! [batch]
//! chunk_size = 50
//! max_item_retries = 3
//! max_concurrency = 4
//!
//! [cache]
//! enabled = true
//! default_ttl_secs = 3600
//!
//! [sync]
//! cadence_secs = 900
//! preserve_prices = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use fabrica_core::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ITEM_RETRIES, MAX_CHUNK_SIZE};

// =============================================================================
// API Client Settings
// =============================================================================

/// Settings for outbound HTTP calls to lojista APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per retryable request (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts (milliseconds).
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Verify TLS certificates. Disable only against local test stores.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Maximum redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    2000
}
fn default_max_redirects() -> usize {
    3
}
fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            verify_tls: true,
            max_redirects: default_max_redirects(),
        }
    }
}

// =============================================================================
// Batch Settings
// =============================================================================

/// Settings for chunked batch processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per chunk. Clamped to the hard ceiling at use.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Failed attempts per item before it is marked permanently failed.
    #[serde(default = "default_max_item_retries")]
    pub max_item_retries: i64,

    /// Concurrent item workers within one chunk.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Wall-clock budget for one processing pass (seconds). A pass that
    /// would exceed it suspends the job to `paused` at the next chunk
    /// boundary instead of dying mid-flight.
    #[serde(default = "default_max_execution")]
    pub max_execution_secs: u64,

    /// Completed-job retention before purge (days).
    #[serde(default = "default_success_retention")]
    pub success_retention_days: i64,

    /// Failed-job retention before purge (days). Shorter than success so
    /// operators re-run failures instead of hoarding them.
    #[serde(default = "default_failure_retention")]
    pub failure_retention_days: i64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_item_retries() -> i64 {
    DEFAULT_MAX_ITEM_RETRIES
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_execution() -> u64 {
    300
}
fn default_success_retention() -> i64 {
    7
}
fn default_failure_retention() -> i64 {
    3
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            chunk_size: default_chunk_size(),
            max_item_retries: default_max_item_retries(),
            max_concurrency: default_max_concurrency(),
            max_execution_secs: default_max_execution(),
            success_retention_days: default_success_retention(),
            failure_retention_days: default_failure_retention(),
        }
    }
}

impl BatchConfig {
    /// Chunk size with the hard ceiling applied. Configured values above
    /// the ceiling are clamped, never honored.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Settings for the in-process read cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false every read goes to its compute closure.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL for entries that don't specify their own (seconds).
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            default_ttl_secs: default_cache_ttl(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Settings for the recurring sync cycle and import payload shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between scheduled sync cycles (seconds).
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,

    /// Include variations in import payloads by default.
    #[serde(default = "default_true")]
    pub include_variations: bool,

    /// Include images in import payloads by default.
    #[serde(default = "default_true")]
    pub include_images: bool,

    /// Include categories in import payloads by default.
    #[serde(default = "default_true")]
    pub include_categories: bool,

    /// Send factory prices unchanged by default.
    #[serde(default = "default_true")]
    pub preserve_prices: bool,

    /// Basis-point markup applied when preserve_prices is off
    /// (100 bps = 1%).
    #[serde(default)]
    pub price_markup_bps: u32,
}

fn default_cadence() -> u64 {
    900
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            cadence_secs: default_cadence(),
            include_variations: true,
            include_images: true,
            include_categories: true,
            preserve_prices: true,
            price_markup_bps: 0,
        }
    }
}

impl SyncSettings {
    /// Default import options derived from configuration.
    pub fn import_options(&self) -> fabrica_core::ImportOptions {
        fabrica_core::ImportOptions {
            include_variations: self.include_variations,
            include_images: self.include_images,
            include_categories: self.include_categories,
            preserve_prices: self.preserve_prices,
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base log level for hosts that wire up [`crate::telemetry`].
    /// `RUST_LOG` still overrides at runtime.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Batch processing settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Read cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Sync cycle and payload settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_level: default_log_level(),
            api: ApiConfig::default(),
            batch: BatchConfig::default(),
            cache: CacheConfig::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (fabrica.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.api.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.api.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "api.max_attempts must be greater than 0".into(),
            ));
        }
        if self.batch.chunk_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch.chunk_size must be greater than 0".into(),
            ));
        }
        if self.batch.max_concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "batch.max_concurrency must be greater than 0".into(),
            ));
        }
        if self.sync.cadence_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.cadence_secs must be greater than 0".into(),
            ));
        }
        // 10_000 bps doubles the price; anything above is a config typo
        if self.sync.price_markup_bps > 10_000 {
            return Err(SyncError::InvalidConfig(
                "sync.price_markup_bps must be at most 10000".into(),
            ));
        }
        if !matches!(
            self.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(SyncError::InvalidConfig(format!(
                "log_level must be one of trace/debug/info/warn/error, got {:?}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("FABRICA_API_TIMEOUT_SECS") {
            if let Ok(v) = secs.parse() {
                self.api.timeout_secs = v;
            }
        }
        if let Ok(attempts) = std::env::var("FABRICA_API_MAX_ATTEMPTS") {
            if let Ok(v) = attempts.parse() {
                self.api.max_attempts = v;
            }
        }
        if let Ok(size) = std::env::var("FABRICA_CHUNK_SIZE") {
            if let Ok(v) = size.parse() {
                debug!(chunk_size = v, "Overriding chunk size from environment");
                self.batch.chunk_size = v;
            }
        }
        if let Ok(secs) = std::env::var("FABRICA_CADENCE_SECS") {
            if let Ok(v) = secs.parse() {
                debug!(cadence_secs = v, "Overriding sync cadence from environment");
                self.sync.cadence_secs = v;
            }
        }
        if let Ok(enabled) = std::env::var("FABRICA_CACHE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.cache.enabled = true,
                "0" | "false" | "no" => self.cache.enabled = false,
                other => warn!(value = %other, "Unknown FABRICA_CACHE_ENABLED value"),
            }
        }
        if let Ok(bps) = std::env::var("FABRICA_PRICE_MARKUP_BPS") {
            if let Ok(v) = bps.parse() {
                self.sync.price_markup_bps = v;
            }
        }
        if let Ok(level) = std::env::var("FABRICA_LOG_LEVEL") {
            self.log_level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.chunk_size, 50);
        assert_eq!(config.sync.cadence_secs, 900);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        let mut config = BatchConfig::default();
        config.chunk_size = 5000;
        assert_eq!(config.effective_chunk_size(), 200);

        config.chunk_size = 25;
        assert_eq!(config.effective_chunk_size(), 25);
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let mut config = EngineConfig::default();
        assert_eq!(config.log_level, "info");

        config.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut config = EngineConfig::default();
        config.batch.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.api.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reads_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabrica.toml");

        std::fs::write(&path, "[batch]\nchunk_size = 10\n").unwrap();
        let config = EngineConfig::load(Some(path.clone())).unwrap();
        assert_eq!(config.batch.chunk_size, 10);

        std::fs::write(&path, "[sync]\ncadence_secs = 0\n").unwrap();
        assert!(matches!(
            EngineConfig::load(Some(path)),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load(Some(PathBuf::from("/nonexistent/fabrica.toml"))).unwrap();
        assert_eq!(config.batch.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_toml_round_trip() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            [api]
            timeout_secs = 10

            [batch]
            chunk_size = 20

            [sync]
            preserve_prices = false
            price_markup_bps = 825
            "#,
        )
        .unwrap();

        assert_eq!(parsed.api.timeout_secs, 10);
        assert_eq!(parsed.batch.chunk_size, 20);
        // Omitted fields fall back to defaults
        assert_eq!(parsed.api.max_attempts, 3);
        assert!(!parsed.sync.preserve_prices);
        assert_eq!(parsed.sync.price_markup_bps, 825);

        let opts = parsed.sync.import_options();
        assert!(!opts.preserve_prices);
        assert!(opts.include_images);
    }
}
