//! # Sync Error Types
//!
//! Error types for distribution and collection operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Transport    │  │     Remote API          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  RemoteApi{status}      │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  RateLimited            │ │
//! │  │                 │  │                 │  │  Auth                   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Storage      │  │     Batch       │  │      Domain             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Database       │  │  PartialBatch   │  │  LojistaNotFound        │ │
//! │  │  Serialization  │  │  JobNotFound    │  │  ProductNotFound        │ │
//! │  │                 │  │                 │  │  Validation, Forbidden  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all distribution-engine failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized so retry logic can tell transient from permanent
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Network-level failure (DNS, connect, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// Credentials rejected by the lojista (401/403).
    #[error("Authentication failed for lojista {lojista_id}: {message}")]
    Auth { lojista_id: String, message: String },

    /// The lojista answered with an error status.
    #[error("Remote API error (status {status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// The lojista is throttling us (429). Retry after the given seconds.
    #[error("Rate limited by remote, retry after {0}s")]
    RateLimited(u64),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Payload (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Batch Errors
    // =========================================================================
    /// Batch job not found.
    #[error("Batch job not found: {0}")]
    JobNotFound(String),

    /// Job finished with permanently failed items.
    #[error("Batch job {job_id} finished with {failed} failed items: {message}")]
    PartialBatch {
        job_id: String,
        failed: i64,
        message: String,
    },

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// A cache compute closure failed. The failure is surfaced to the
    /// caller and never stored in the cache.
    #[error("Cache compute failed for key '{key}': {message}")]
    CacheCompute { key: String, message: String },

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Lojista not registered.
    #[error("Lojista not found: {0}")]
    LojistaNotFound(String),

    /// Product not in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// The lojista cannot participate (wrong status, live mappings, ...).
    #[error("Operation not allowed: {0}")]
    Conflict(String),

    /// Caller lacks the capability for this command.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] fabrica_core::ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<fabrica_db::DbError> for SyncError {
    fn from(err: fabrica_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the request can be
    /// retried with backoff.
    ///
    /// ## Retryable
    /// - Network failures and timeouts
    /// - Rate limiting (429)
    /// - Remote server errors (5xx)
    ///
    /// ## Non-Retryable
    /// - Authentication failures (4xx will repeat identically)
    /// - Validation and configuration errors
    /// - Domain conflicts
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::RateLimited(_) => true,
            SyncError::RemoteApi { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
