//! # Sales Repository
//!
//! Ingestion and reporting for sales pulled from lojistas, plus the
//! per-lojista incremental pull cursors.
//!
//! ## Dedupe on Ingest
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Overlapping Pull Windows                               │
//! │                                                                         │
//! │  Pull #1: orders 100..180   ──► 80 inserted                            │
//! │  Pull #2: orders 150..220   ──► 150..180 already present               │
//! │                                  (lojista_id, remote_order_id) UNIQUE  │
//! │                                  → INSERT OR IGNORE, 40 inserted        │
//! │                                                                         │
//! │  Ingest is idempotent: re-pulling a window never duplicates orders     │
//! │  and never inflates report totals.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use fabrica_core::SalesRecord;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SalesRow {
    id: String,
    lojista_id: String,
    remote_order_id: String,
    product_ids: String,
    quantity: i64,
    amount_cents: i64,
    order_date: DateTime<Utc>,
    synced_at: DateTime<Utc>,
}

impl SalesRow {
    fn into_record(self) -> DbResult<SalesRecord> {
        let product_ids: Vec<String> = serde_json::from_str(&self.product_ids)
            .map_err(|e| DbError::invalid_json("SalesRecord.product_ids", e))?;
        Ok(SalesRecord {
            id: self.id,
            lojista_id: self.lojista_id,
            remote_order_id: self.remote_order_id,
            product_ids,
            quantity: self.quantity,
            amount_cents: self.amount_cents,
            order_date: self.order_date,
            synced_at: self.synced_at,
        })
    }
}

/// Aggregated report line for one lojista over a date window.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct SalesReportRow {
    pub lojista_id: String,
    pub orders: i64,
    pub quantity: i64,
    pub amount_cents: i64,
}

/// Aggregated report line for one product over a date window.
///
/// An order covering several products counts once toward each of them,
/// with the order's full quantity and amount attributed to each.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct TopProductRow {
    pub product_id: String,
    pub orders: i64,
    pub quantity: i64,
    pub amount_cents: i64,
}

/// Input for ingesting one pulled order.
#[derive(Debug, Clone)]
pub struct NewSalesRecord {
    pub lojista_id: String,
    pub remote_order_id: String,
    pub product_ids: Vec<String>,
    pub quantity: i64,
    pub amount_cents: i64,
    pub order_date: DateTime<Utc>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sales records and pull cursors.
#[derive(Debug, Clone)]
pub struct SalesRepository {
    pool: SqlitePool,
}

impl SalesRepository {
    /// Creates a new SalesRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SalesRepository { pool }
    }

    /// Ingests one pulled order. Returns true if the row was inserted,
    /// false if the (lojista, remote_order) pair was already present.
    pub async fn ingest(&self, record: NewSalesRecord) -> DbResult<bool> {
        let product_ids = serde_json::to_string(&record.product_ids)
            .map_err(|e| DbError::invalid_json("SalesRecord.product_ids", e))?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sales_records
                (id, lojista_id, remote_order_id, product_ids,
                 quantity, amount_cents, order_date, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.lojista_id)
        .bind(&record.remote_order_id)
        .bind(&product_ids)
        .bind(record.quantity)
        .bind(record.amount_cents)
        .bind(record.order_date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists records for a lojista, newest first.
    pub async fn list_for_lojista(
        &self,
        lojista_id: &str,
        limit: i64,
    ) -> DbResult<Vec<SalesRecord>> {
        let rows = sqlx::query_as::<_, SalesRow>(
            "SELECT * FROM sales_records WHERE lojista_id = ?1 ORDER BY order_date DESC LIMIT ?2",
        )
        .bind(lojista_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SalesRow::into_record).collect()
    }

    /// Aggregates sales per lojista over a closed date window.
    pub async fn report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<SalesReportRow>> {
        let rows = sqlx::query_as::<_, SalesReportRow>(
            r#"
            SELECT
                lojista_id,
                COUNT(*) AS orders,
                COALESCE(SUM(quantity), 0) AS quantity,
                COALESCE(SUM(amount_cents), 0) AS amount_cents
            FROM sales_records
            WHERE order_date >= ?1 AND order_date <= ?2
            GROUP BY lojista_id
            ORDER BY amount_cents DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        debug!(lines = rows.len(), "Sales report computed");
        Ok(rows)
    }

    /// Ranks products by sales amount over a closed date window.
    ///
    /// `product_ids` is stored as a JSON array, so the ranking unnests it
    /// with `json_each` rather than keeping a separate line-item table.
    pub async fn top_products(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<TopProductRow>> {
        let rows = sqlx::query_as::<_, TopProductRow>(
            r#"
            SELECT
                je.value AS product_id,
                COUNT(*) AS orders,
                COALESCE(SUM(s.quantity), 0) AS quantity,
                COALESCE(SUM(s.amount_cents), 0) AS amount_cents
            FROM sales_records s, json_each(s.product_ids) je
            WHERE s.order_date >= ?1 AND s.order_date <= ?2
            GROUP BY je.value
            ORDER BY amount_cents DESC
            LIMIT ?3
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Total order count and amount across all lojistas (dashboard).
    pub async fn totals(&self) -> DbResult<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(amount_cents), 0) FROM sales_records",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    // =========================================================================
    // Pull Cursors
    // =========================================================================

    /// Returns the last committed pull cursor for a lojista, if any.
    pub async fn get_cursor(&self, lojista_id: &str) -> DbResult<Option<String>> {
        let cursor: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM sync_cursors WHERE lojista_id = ?1")
                .bind(lojista_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor)
    }

    /// Commits the pull cursor for a lojista.
    ///
    /// Called only after the pulled window has been fully ingested, so a
    /// crash between pull and commit re-pulls (idempotently) rather than
    /// skipping orders.
    pub async fn set_cursor(&self, lojista_id: &str, cursor: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (lojista_id, cursor, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(lojista_id) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(lojista_id)
        .bind(cursor)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;

    fn order(lojista_id: &str, remote_order_id: &str, amount_cents: i64) -> NewSalesRecord {
        NewSalesRecord {
            lojista_id: lojista_id.to_string(),
            remote_order_id: remote_order_id.to_string(),
            product_ids: vec!["p-1".to_string()],
            quantity: 2,
            amount_cents,
            order_date: Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_ingest_dedupes_remote_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        assert!(repo.ingest(order("loj-1", "ord-100", 5000)).await.unwrap());
        // Same remote order pulled again in an overlapping window
        assert!(!repo.ingest(order("loj-1", "ord-100", 5000)).await.unwrap());
        // Same remote order id on a different lojista is a different order
        assert!(repo.ingest(order("loj-2", "ord-100", 7000)).await.unwrap());

        let (orders, amount) = repo.totals().await.unwrap();
        assert_eq!(orders, 2);
        assert_eq!(amount, 12000);
    }

    #[tokio::test]
    async fn test_report_groups_by_lojista() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        repo.ingest(order("loj-1", "ord-1", 1000)).await.unwrap();
        repo.ingest(order("loj-1", "ord-2", 2000)).await.unwrap();
        repo.ingest(order("loj-2", "ord-1", 500)).await.unwrap();

        let from = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap();
        let report = repo.report(from, to).await.unwrap();

        assert_eq!(report.len(), 2);
        // Sorted by amount descending
        assert_eq!(report[0].lojista_id, "loj-1");
        assert_eq!(report[0].orders, 2);
        assert_eq!(report[0].amount_cents, 3000);
        assert_eq!(report[1].amount_cents, 500);
    }

    #[tokio::test]
    async fn test_report_window_excludes_outside_orders() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        repo.ingest(order("loj-1", "ord-1", 1000)).await.unwrap();

        let from = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 9, 30, 0, 0, 0).unwrap();
        assert!(repo.report(from, to).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_products_unnests_multi_product_orders() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();

        let mut multi = order("loj-1", "ord-1", 3000);
        multi.product_ids = vec!["p-1".to_string(), "p-2".to_string()];
        repo.ingest(multi).await.unwrap();
        repo.ingest(order("loj-2", "ord-1", 1000)).await.unwrap(); // p-1 only

        let from = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 8, 31, 0, 0, 0).unwrap();
        let top = repo.top_products(from, to, 10).await.unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].product_id, "p-1");
        assert_eq!(top[0].orders, 2);
        assert_eq!(top[0].amount_cents, 4000);
        assert_eq!(top[1].product_id, "p-2");
        assert_eq!(top[1].amount_cents, 3000);

        assert_eq!(repo.top_products(from, to, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let lojista = db
            .lojistas()
            .insert("Loja A", "https://a.example.com", "key")
            .await
            .unwrap();
        let repo = db.sales();

        assert!(repo.get_cursor(&lojista.id).await.unwrap().is_none());

        repo.set_cursor(&lojista.id, "2026-08-10T12:00:00Z").await.unwrap();
        repo.set_cursor(&lojista.id, "2026-08-11T09:30:00Z").await.unwrap();

        assert_eq!(
            repo.get_cursor(&lojista.id).await.unwrap().as_deref(),
            Some("2026-08-11T09:30:00Z")
        );
    }
}
