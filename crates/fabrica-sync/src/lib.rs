//! # fabrica-sync: Distribution Engine for Fábrica
//!
//! This crate provides the synchronization layer for Fábrica, pushing the
//! canonical catalog to independently hosted lojista storefronts and
//! pulling their sales back into the factory's books.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Distribution Engine                                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    Dispatcher (boundary)                          │  │
//! │  │                                                                  │  │
//! │  │  Command table + one authorization check                         │  │
//! │  │  Every handler answers with OperationResult                      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                   SyncManager (orchestrator)                      │  │
//! │  │                                                                  │  │
//! │  │  Catalog import jobs, scheduled sales pulls, cached reads        │  │
//! │  └──┬───────────────┬───────────────┬───────────────┬───────────────┘  │
//! │     ▼               ▼               ▼               ▼                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────────┐    │
//! │  │  Registry  │  │  Importer  │  │   Batch    │  │     Cache      │    │
//! │  │            │  │            │  │            │  │                │    │
//! │  │ Lojista    │  │ Payload    │  │ Chunked    │  │ TTL'd reads    │    │
//! │  │ lifecycle, │  │ build +    │  │ resumable  │  │ invalidated    │    │
//! │  │ probing    │  │ mapping    │  │ jobs with  │  │ by writers     │    │
//! │  │            │  │ upkeep     │  │ retries    │  │                │    │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  └────────────────┘    │
//! │        │               │               │                               │
//! │        └───────┬───────┘               ▼                               │
//! │                ▼                  fabrica-db                            │
//! │          ┌────────────┐      (jobs, mappings, sales,                   │
//! │          │ ApiClient  │       cursors - SQLite/sqlx)                    │
//! │          │            │                                                │
//! │          │ reqwest +  │                                                │
//! │          │ retries,   │                                                │
//! │          │ idempotency│                                                │
//! │          └─────┬──────┘                                                │
//! │                ▼                                                       │
//! │        lojista storefronts (HTTP, bearer auth)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`batch`] - Chunked, resumable batch jobs with per-item retries
//! - [`cache`] - In-process TTL cache for report-style reads
//! - [`client`] - HTTP client for lojista APIs (retry, backoff, idempotency)
//! - [`config`] - Engine configuration (TOML file + env overrides)
//! - [`dispatch`] - Boundary command table and capability checks
//! - [`error`] - Sync error taxonomy
//! - [`importer`] - Product payload building and per-target import
//! - [`manager`] - Top-level orchestrator and scheduler
//! - [`registry`] - Lojista registration, probing and lifecycle
//! - [`telemetry`] - Tracing subscriber setup for hosts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fabrica_sync::{Capability, Command, Dispatcher, EngineConfig, SyncManager};
//! use fabrica_db::{Database, DbConfig};
//!
//! let config = EngineConfig::load_or_default(None);
//! fabrica_sync::init_tracing(&config.log_level);
//!
//! let db = Database::new(DbConfig::new("fabrica.db")).await?;
//! let manager = SyncManager::new(db, config)?;
//! let dispatcher = Dispatcher::new(manager);
//!
//! let result = dispatcher
//!     .execute(Command::DashboardOverview, &[Capability::ManageStore])
//!     .await;
//! println!("{}", result.message);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod importer;
pub mod manager;
pub mod registry;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use batch::{BatchProcessor, ItemWorker, JobStatusReport};
pub use cache::CacheLayer;
pub use client::{ApiClient, OrdersPage, RemoteOrder, RemoteProduct, RemoteStock};
pub use config::{ApiConfig, BatchConfig, CacheConfig, EngineConfig, SyncSettings};
pub use dispatch::{Capability, Command, Dispatcher};
pub use error::{SyncError, SyncResult};
pub use importer::{ImportOutcome, ImportStatus, ProductImporter};
pub use manager::{PullSummary, SyncManager};
pub use registry::LojistaRegistry;
pub use telemetry::init_tracing;
