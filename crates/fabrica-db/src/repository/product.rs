//! # Product Repository
//!
//! Database operations for the canonical factory catalog.
//!
//! ## JSON Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Products Table ↔ Domain Type                               │
//! │                                                                         │
//! │  products.variations  TEXT '[{"sku":"S-M",...}]'  ◄─► Vec<Variation>   │
//! │  products.images      TEXT '["https://..."]'      ◄─► Vec<String>      │
//! │  products.categories  TEXT '["clothing/shirts"]'  ◄─► Vec<String>      │
//! │                                                                         │
//! │  An internal ProductRow struct maps the raw TEXT columns; conversion    │
//! │  to fabrica_core::Product parses the JSON and surfaces corrupt rows     │
//! │  as DbError::InvalidJson instead of panicking.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use fabrica_core::validation::validate_product_input;
use fabrica_core::{Product, ProductVariation};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw table row; JSON columns still serialized.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    sku: String,
    title: String,
    description: Option<String>,
    price_cents: i64,
    stock: i64,
    variations: String,
    images: String,
    categories: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> DbResult<Product> {
        let variations: Vec<ProductVariation> = serde_json::from_str(&self.variations)
            .map_err(|e| DbError::invalid_json("Product.variations", e))?;
        let images: Vec<String> = serde_json::from_str(&self.images)
            .map_err(|e| DbError::invalid_json("Product.images", e))?;
        let categories: Vec<String> = serde_json::from_str(&self.categories)
            .map_err(|e| DbError::invalid_json("Product.categories", e))?;

        Ok(Product {
            id: self.id,
            sku: self.sku,
            title: self.title,
            description: self.description,
            price_cents: self.price_cents,
            stock: self.stock,
            variations,
            images,
            categories,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for canonical product storage.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

/// Input for creating or refreshing a catalog snapshot.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub sku: String,
    pub title: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub stock: i64,
    pub variations: Vec<ProductVariation>,
    pub images: Vec<String>,
    pub categories: Vec<String>,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts or refreshes a product snapshot, keyed by SKU.
    ///
    /// Existing products keep their id and created_at; all other fields are
    /// replaced by the new snapshot. Snapshots that fail domain validation
    /// (blank title, negative price, bad SKUs) are rejected before any SQL.
    pub async fn upsert(&self, snapshot: ProductSnapshot) -> DbResult<Product> {
        validate_product_input(
            &snapshot.sku,
            &snapshot.title,
            snapshot.price_cents,
            &snapshot.variations,
        )?;

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let variations = serde_json::to_string(&snapshot.variations)
            .map_err(|e| DbError::invalid_json("Product.variations", e))?;
        let images = serde_json::to_string(&snapshot.images)
            .map_err(|e| DbError::invalid_json("Product.images", e))?;
        let categories = serde_json::to_string(&snapshot.categories)
            .map_err(|e| DbError::invalid_json("Product.categories", e))?;

        sqlx::query(
            r#"
            INSERT INTO products
                (id, sku, title, description, price_cents, stock,
                 variations, images, categories, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(sku) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                price_cents = excluded.price_cents,
                stock = excluded.stock,
                variations = excluded.variations,
                images = excluded.images,
                categories = excluded.categories,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&snapshot.sku)
        .bind(&snapshot.title)
        .bind(&snapshot.description)
        .bind(snapshot.price_cents)
        .bind(snapshot.stock)
        .bind(&variations)
        .bind(&images)
        .bind(&categories)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(sku = %snapshot.sku, "Product snapshot upserted");
        self.get_by_sku(&snapshot.sku).await
    }

    /// Fetches a product by ID.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;
        row.into_product()
    }

    /// Fetches a product by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = ?1")
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", sku))?;
        row.into_product()
    }

    /// Lists products ordered by SKU.
    pub async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products ORDER BY sku LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProductRow::into_product).collect()
    }

    /// Lists all product IDs in deterministic (SKU) order.
    ///
    /// Batch jobs snapshot this list once at job creation so a job's item
    /// ordering is stable across resumes.
    pub async fn list_ids(&self) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM products ORDER BY sku")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Total products in the catalog.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes a product. Mappings cascade.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
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

    fn snapshot(sku: &str, price_cents: i64) -> ProductSnapshot {
        ProductSnapshot {
            sku: sku.to_string(),
            title: format!("Product {sku}"),
            description: None,
            price_cents,
            stock: 10,
            variations: vec![ProductVariation {
                sku: format!("{sku}-M"),
                price_cents,
                stock: 5,
                attributes: serde_json::json!({"size": "M"}),
            }],
            images: vec!["https://img.example.com/1.jpg".to_string()],
            categories: vec!["clothing/shirts".to_string()],
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let product = repo.upsert(snapshot("SHIRT-001", 4990)).await.unwrap();
        assert_eq!(product.price_cents, 4990);
        assert_eq!(product.variations.len(), 1);
        assert_eq!(product.variations[0].sku, "SHIRT-001-M");

        let by_id = repo.get(&product.id).await.unwrap();
        assert_eq!(by_id.sku, "SHIRT-001");
    }

    #[tokio::test]
    async fn test_upsert_refreshes_by_sku() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let first = repo.upsert(snapshot("SHIRT-001", 4990)).await.unwrap();
        let second = repo.upsert(snapshot("SHIRT-001", 5290)).await.unwrap();

        // Same row: id is stable across refreshes
        assert_eq!(first.id, second.id);
        assert_eq!(second.price_cents, 5290);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_ids_ordered_by_sku() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let b = repo.upsert(snapshot("B-SKU", 100)).await.unwrap();
        let a = repo.upsert(snapshot("A-SKU", 100)).await.unwrap();

        let ids = repo.list_ids().await.unwrap();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let mut blank_title = snapshot("SHIRT-001", 4990);
        blank_title.title = "   ".to_string();
        let err = repo.upsert(blank_title).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        // The helper's variation inherits the negative price too
        let err = repo.upsert(snapshot("SHIRT-002", -500)).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        // Nothing reached the table
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.products().get("nope").await;
        assert!(matches!(err, Err(DbError::NotFound { .. })));
    }
}
