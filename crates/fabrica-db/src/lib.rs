//! # fabrica-db: Database Layer for the Fábrica Engine
//!
//! This crate provides database access for the catalog distribution engine.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Fábrica Engine Data Flow                            │
//! │                                                                         │
//! │  Boundary command (import_products, force_sync, ...)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    fabrica-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (lojista.rs,  │    │  (embedded)  │  │   │
//! │  │   │               │    │  product.rs,  │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│  mapping.rs,  │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │    │  sales.rs,    │    │ ...          │  │   │
//! │  │   │ Management    │    │  job.rs)      │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (lojista, product, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fabrica_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/fabrica.db");
//! let db = Database::new(config).await?;
//!
//! let active = db.lojistas().list_by_status(LojistaStatus::Active).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::job::BatchJobRepository;
pub use repository::lojista::LojistaRepository;
pub use repository::mapping::MappingRepository;
pub use repository::product::ProductRepository;
pub use repository::sales::SalesRepository;
