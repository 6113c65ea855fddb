//! # Repository Module
//!
//! Database repository implementations for the Fábrica engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Sync manager / importer / batch processor                             │
//! │       │                                                                 │
//! │       │  db.mappings().record_success(lojista, product, remote_id)     │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  MappingRepository                                                     │
//! │  ├── get(&self, lojista_id, product_id)                                │
//! │  ├── record_success(...)                                               │
//! │  ├── record_failure(...)                                               │
//! │  └── list_for_lojista(...)                                             │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • Easy to test (in-memory database per test)                          │
//! │  • SQL is isolated in one place                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`lojista::LojistaRepository`] - Registry CRUD and status transitions
//! - [`product::ProductRepository`] - Canonical catalog storage
//! - [`mapping::MappingRepository`] - Per-lojista distribution state
//! - [`sales::SalesRepository`] - Sales ingestion, cursors and reports
//! - [`job::BatchJobRepository`] - Resumable batch job bookkeeping

pub mod job;
pub mod lojista;
pub mod mapping;
pub mod product;
pub mod sales;
