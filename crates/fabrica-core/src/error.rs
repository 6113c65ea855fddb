//! # Error Types
//!
//! Domain-specific error types for fabrica-core.
//!
//! ## Error Hierarchy
//! ```text
//! fabrica-core errors (this file)
//! ├── CoreError        - General domain errors
//! └── ValidationError  - Input validation failures
//!
//! fabrica-db errors (separate crate)
//! └── DbError          - Database operation failures
//!
//! fabrica-sync errors (separate crate)
//! └── SyncError        - Network, remote API and orchestration failures
//!
//! Flow: ValidationError → CoreError → SyncError → OperationResult
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, etc.)
//! 3. Errors are enum variants, never bare Strings

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated to user-facing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Canonical product cannot be found in the factory catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Lojista cannot be found in the registry.
    #[error("Lojista not found: {0}")]
    LojistaNotFound(String),

    /// A lojista in an unusable state was targeted by an operation.
    ///
    /// ## When This Occurs
    /// - Importing to a lojista whose credentials failed validation
    /// - Pulling sales from a disabled lojista
    #[error("Lojista {lojista_id} is {status}, cannot perform operation")]
    LojistaUnavailable { lojista_id: String, status: String },

    /// Monetary arithmetic overflowed i64 cents.
    #[error("Money overflow in {operation}")]
    MoneyOverflow { operation: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements. Used for early
/// validation before any persistence or network work runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., malformed URL).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate lojista name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Empty collection where at least one element is required.
    #[error("{field} must contain at least one entry")]
    Empty { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
