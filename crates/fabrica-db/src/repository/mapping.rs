//! # Product Mapping Repository
//!
//! Distribution state for (lojista, product) pairs.
//!
//! ## The Remote ID Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            Why record_failure never clears remote_product_id            │
//! │                                                                         │
//! │  1. Import creates product on Loja A  → remote_product_id = "rp-77"   │
//! │  2. Later re-import fails (timeout)   → last_status = error            │
//! │                                          remote_product_id STAYS rp-77 │
//! │  3. Next import sees rp-77            → sends an UPDATE, not a CREATE  │
//! │                                                                         │
//! │  Clearing the remote id on failure would make the next attempt         │
//! │  create a duplicate product on the retailer side.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use fabrica_core::ProductMapping;

/// Repository for per-lojista product mappings.
#[derive(Debug, Clone)]
pub struct MappingRepository {
    pool: SqlitePool,
}

impl MappingRepository {
    /// Creates a new MappingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MappingRepository { pool }
    }

    /// Fetches the mapping for a (lojista, product) pair, if present.
    pub async fn get(&self, lojista_id: &str, product_id: &str) -> DbResult<Option<ProductMapping>> {
        let mapping = sqlx::query_as::<_, ProductMapping>(
            "SELECT * FROM product_mappings WHERE lojista_id = ?1 AND product_id = ?2",
        )
        .bind(lojista_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(mapping)
    }

    /// Records a successful import: sets the remote product id and stamps
    /// the sync time. Creates the mapping row on first success.
    pub async fn record_success(
        &self,
        lojista_id: &str,
        product_id: &str,
        remote_product_id: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_mappings
                (lojista_id, product_id, remote_product_id, last_synced_at, last_status, last_error)
            VALUES (?1, ?2, ?3, ?4, 'ok', NULL)
            ON CONFLICT(lojista_id, product_id) DO UPDATE SET
                remote_product_id = excluded.remote_product_id,
                last_synced_at = excluded.last_synced_at,
                last_status = 'ok',
                last_error = NULL
            "#,
        )
        .bind(lojista_id)
        .bind(product_id)
        .bind(remote_product_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(%lojista_id, %product_id, %remote_product_id, "Mapping success recorded");
        Ok(())
    }

    /// Records a failed import attempt.
    ///
    /// An existing `remote_product_id` is preserved: the remote entity still
    /// exists and the next attempt must update it, not duplicate it.
    pub async fn record_failure(
        &self,
        lojista_id: &str,
        product_id: &str,
        error: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_mappings
                (lojista_id, product_id, remote_product_id, last_status, last_error)
            VALUES (?1, ?2, NULL, 'error', ?3)
            ON CONFLICT(lojista_id, product_id) DO UPDATE SET
                last_status = 'error',
                last_error = excluded.last_error
            "#,
        )
        .bind(lojista_id)
        .bind(product_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        debug!(%lojista_id, %product_id, %error, "Mapping failure recorded");
        Ok(())
    }

    /// Records the stock level a lojista reported during a pull.
    pub async fn record_remote_stock(
        &self,
        lojista_id: &str,
        remote_product_id: &str,
        stock: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE product_mappings
            SET remote_stock = ?3
            WHERE lojista_id = ?1 AND remote_product_id = ?2
            "#,
        )
        .bind(lojista_id)
        .bind(remote_product_id)
        .bind(stock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lists all mappings for a lojista.
    pub async fn list_for_lojista(&self, lojista_id: &str) -> DbResult<Vec<ProductMapping>> {
        let mappings = sqlx::query_as::<_, ProductMapping>(
            "SELECT * FROM product_mappings WHERE lojista_id = ?1 ORDER BY product_id",
        )
        .bind(lojista_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(mappings)
    }

    /// Lists all mappings for a product across lojistas.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<ProductMapping>> {
        let mappings = sqlx::query_as::<_, ProductMapping>(
            "SELECT * FROM product_mappings WHERE product_id = ?1 ORDER BY lojista_id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(mappings)
    }

    /// Counts mappings for a lojista. Used as the delete guard: a lojista
    /// with live mappings is disabled rather than removed unless forced.
    pub async fn count_for_lojista(&self, lojista_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM product_mappings WHERE lojista_id = ?1")
                .bind(lojista_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Counts mappings currently in error state, for the dashboard overview.
    pub async fn count_errors(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM product_mappings WHERE last_status = 'error'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
