//! # Domain Types
//!
//! Core domain types used throughout the Fábrica engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐
//! │    Lojista      │   │    Product      │   │ ProductMapping  │
//! │  ─────────────  │   │  ─────────────  │   │  ─────────────  │
//! │  id (UUID)      │   │  id (UUID)      │   │  lojista_id     │
//! │  base_url       │   │  sku (business) │   │  product_id     │
//! │  api_key        │   │  price_cents    │   │  remote_id      │
//! │  status         │   │  variations[]   │   │  last_status    │
//! └─────────────────┘   └─────────────────┘   └─────────────────┘
//!
//! ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐
//! │   SalesRecord   │   │    BatchJob     │   │   BatchItem     │
//! │  ─────────────  │   │  ─────────────  │   │  ─────────────  │
//! │  lojista_id +   │   │  kind, status   │   │  outcome        │
//! │  remote_order_id│   │  cursor         │   │  retry_count    │
//! │  (unique pair)  │   │  total_items    │   │  message        │
//! └─────────────────┘   └─────────────────┘   └─────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Entities carry an immutable UUID `id` for relations plus a business
//! identifier (SKU, lojista name, remote order id) that humans recognize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Lojista
// =============================================================================

/// Lifecycle status of a registered lojista.
///
/// Transitions are owned exclusively by the registry:
/// `pending` on registration, `active`/`invalid` after connectivity tests,
/// `disabled` as the soft-delete state while mapped products still exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum LojistaStatus {
    /// Registered but never successfully probed.
    Pending,
    /// Last connectivity test succeeded.
    Active,
    /// Last connectivity test failed (reason in `last_error`).
    Invalid,
    /// Soft-deleted; excluded from sync but retained for audit.
    Disabled,
}

impl std::fmt::Display for LojistaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LojistaStatus::Pending => write!(f, "pending"),
            LojistaStatus::Active => write!(f, "active"),
            LojistaStatus::Invalid => write!(f, "invalid"),
            LojistaStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// An independently hosted retailer store that receives imported products
/// and reports sales back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Lojista {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, unique across the registry.
    pub name: String,

    /// Base URL of the retailer's API (http/https).
    pub base_url: String,

    /// Bearer credential for the retailer's API.
    pub api_key: String,

    /// Lifecycle status; mutated only by the registry.
    pub status: LojistaStatus,

    /// When connectivity was last tested.
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Failure reason from the last connectivity test, if any.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lojista {
    /// Returns true if the lojista participates in sync operations.
    pub fn is_syncable(&self) -> bool {
        self.status == LojistaStatus::Active
    }
}

// =============================================================================
// Product (canonical snapshot)
// =============================================================================

/// A variation of a canonical product (size, color, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariation {
    /// Variation SKU, unique within the product.
    pub sku: String,
    pub price_cents: i64,
    pub stock: i64,
    /// Free-form attribute map (e.g., {"size": "M", "color": "blue"}).
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// A canonical product owned by the factory store.
///
/// This is an immutable snapshot taken at import time: later edits on the
/// factory side require a new import cycle, the engine does not watch for
/// live source mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier, unique in the catalog.
    pub sku: String,

    /// Display title.
    pub title: String,

    pub description: Option<String>,

    /// Base price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Current factory stock level.
    pub stock: i64,

    /// Variations with their own SKU/price/stock/attributes.
    #[serde(default)]
    pub variations: Vec<ProductVariation>,

    /// Image references (URLs or asset ids).
    #[serde(default)]
    pub images: Vec<String>,

    /// Category paths, e.g. "clothing/shirts".
    #[serde(default)]
    pub categories: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the base price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Product Mapping
// =============================================================================

/// Outcome of the most recent import attempt for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Ok,
    Error,
}

/// The linkage between a canonical product and its representation on one
/// lojista. One row per (product, lojista) pair.
///
/// ## Invariant
/// A failed import attempt records the failure but never erases a
/// previously successful `remote_product_id` - the remote entity still
/// exists and the next attempt must update it, not duplicate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductMapping {
    pub lojista_id: String,
    pub product_id: String,

    /// The product's id on the retailer side, set on first successful import.
    pub remote_product_id: Option<String>,

    /// Stock level last reported by the retailer, recorded during pulls.
    pub remote_stock: Option<i64>,

    /// When the pair last synced successfully.
    pub last_synced_at: Option<DateTime<Utc>>,

    pub last_status: MappingStatus,
    pub last_error: Option<String>,
}

// =============================================================================
// Sales Record
// =============================================================================

/// A sale pulled from a lojista. Append-only from the engine's perspective;
/// duplicates (same lojista_id + remote_order_id) are suppressed on ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub lojista_id: String,

    /// The order id on the retailer side; unique per lojista.
    pub remote_order_id: String,

    /// Canonical product ids referenced by the order.
    #[serde(default)]
    pub product_ids: Vec<String>,

    pub quantity: i64,
    pub amount_cents: i64,

    /// When the order was placed on the retailer side.
    pub order_date: DateTime<Utc>,

    /// When this record was ingested.
    pub synced_at: DateTime<Utc>,
}

impl SalesRecord {
    /// Returns the order amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Batch Jobs
// =============================================================================

/// What kind of bulk work a batch job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BatchJobKind {
    ImportProducts,
    SyncSales,
}

impl std::fmt::Display for BatchJobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchJobKind::ImportProducts => write!(f, "import_products"),
            BatchJobKind::SyncSales => write!(f, "sync_sales"),
        }
    }
}

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum BatchJobStatus {
    /// Work remains and the job is eligible for processing.
    Running,
    /// Suspended cooperatively (pause flag or insufficient headroom);
    /// must be resumed explicitly or by the next scheduled tick.
    Paused,
    /// All items reached a terminal outcome, none permanently failed.
    Completed,
    /// All items reached a terminal outcome, at least one permanently failed.
    Failed,
}

impl std::fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchJobStatus::Running => write!(f, "running"),
            BatchJobStatus::Paused => write!(f, "paused"),
            BatchJobStatus::Completed => write!(f, "completed"),
            BatchJobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal or pending outcome of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    /// Not yet processed, or failed with retries remaining.
    Pending,
    Success,
    /// Permanently failed: retry ceiling exhausted.
    Failed,
    Skipped,
}

impl ItemOutcome {
    /// True once the item will never be processed again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemOutcome::Pending)
    }
}

/// A bounded-chunk, resumable unit of bulk work over an ordered item list.
///
/// ## Invariant
/// `cursor` only advances monotonically and is committed after each chunk:
/// a job resumed after interruption continues from the last committed
/// cursor, never re-processing committed items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BatchJob {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub kind: BatchJobKind,
    pub status: BatchJobStatus,

    /// Index of the next unprocessed position in the item list.
    pub cursor: i64,

    pub total_items: i64,

    /// Kind-specific parameters the job was started with, serialized as
    /// JSON. A resume reconstructs its worker from these, never from the
    /// current defaults.
    pub params: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-item bookkeeping for a batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BatchItem {
    pub item_id: String,

    /// Position in the job's ordered item list.
    pub position: i64,

    pub outcome: ItemOutcome,
    pub message: Option<String>,

    /// Failed attempts so far; bounded by the configured retry ceiling.
    pub retry_count: i64,
}

// =============================================================================
// Import Options
// =============================================================================

/// Per-import facet switches, applied when building a retailer payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Include product variations in the payload.
    pub include_variations: bool,
    /// Include image references in the payload.
    pub include_images: bool,
    /// Include category paths in the payload.
    pub include_categories: bool,
    /// Send factory prices unchanged. When false, the configured
    /// basis-point markup is applied.
    pub preserve_prices: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            include_variations: true,
            include_images: true,
            include_categories: true,
            preserve_prices: true,
        }
    }
}

// =============================================================================
// Boundary Result
// =============================================================================

/// Structured result returned to the boundary layer for every operation.
///
/// The boundary is responsible only for presenting this, never for
/// interpreting retry or caching behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl OperationResult {
    /// Builds a success result.
    pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        OperationResult {
            success: true,
            message: message.into(),
            data,
        }
    }

    /// Builds a failure result.
    pub fn err(message: impl Into<String>) -> Self {
        OperationResult {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
