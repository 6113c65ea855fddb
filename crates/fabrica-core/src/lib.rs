//! # fabrica-core: Pure Domain Logic for the Fábrica Engine
//!
//! This crate is the heart of the catalog distribution system. It contains
//! the domain types and validation rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Boundary layer (dispatch table)                 │
//! │   import products ─► force sync ─► test connection ─► report   │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │
//! ┌────────────────────────────▼────────────────────────────────────┐
//! │              ★ fabrica-core (THIS CRATE) ★                      │
//! │                                                                 │
//! │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐   │
//! │   │   types   │  │   money   │  │   error   │  │ validation│   │
//! │   │  Product  │  │   Money   │  │ CoreError │  │   rules   │   │
//! │   │  Lojista  │  │  (cents)  │  │ Validation│  │  checks   │   │
//! │   └───────────┘  └───────────┘  └───────────┘  └───────────┘   │
//! │                                                                 │
//! │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │
//! ┌────────────────────────────▼────────────────────────────────────┐
//! │                 fabrica-db (Database Layer)                     │
//! │          SQLite queries, migrations, repositories               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Lojista, Product, ProductMapping, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Registration and snapshot validation rules

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default number of items processed per batch chunk.
///
/// ## Business Reason
/// Bounds the amount of re-work lost when a job is interrupted mid-chunk
/// to a size that re-processes in a few seconds.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Hard ceiling on the batch chunk size.
///
/// Configured values above this are clamped, never honored: a single
/// uncommitted chunk must stay small enough to re-run cheaply.
pub const MAX_CHUNK_SIZE: usize = 200;

/// Maximum automatic retries for a single batch item before it is marked
/// permanently failed.
pub const DEFAULT_MAX_ITEM_RETRIES: i64 = 3;
