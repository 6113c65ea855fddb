//! # Lojista Repository
//!
//! Database operations for the retailer registry.
//!
//! ## Status Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Lojista Lifecycle (registry-owned)                     │
//! │                                                                         │
//! │  register()                                                             │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  [pending] ──test ok──► [active] ◄──test ok── [invalid]                │
//! │      │                     │                      ▲                     │
//! │      │                     └──────test fail───────┘                    │
//! │      │                                                                  │
//! │      └──────────── disable() ──► [disabled]                            │
//! │                                                                         │
//! │  Only this repository mutates the status column. All other             │
//! │  components read it through is_syncable().                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use fabrica_core::{Lojista, LojistaStatus};

/// Repository for lojista registry operations.
#[derive(Debug, Clone)]
pub struct LojistaRepository {
    pool: SqlitePool,
}

impl LojistaRepository {
    /// Creates a new LojistaRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LojistaRepository { pool }
    }

    /// Inserts a new lojista in `pending` status.
    ///
    /// ## Errors
    /// Returns `DbError::UniqueViolation` when the name is already taken.
    pub async fn insert(&self, name: &str, base_url: &str, api_key: &str) -> DbResult<Lojista> {
        let now = Utc::now();
        let lojista = Lojista {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            status: LojistaStatus::Pending,
            last_checked_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO lojistas (id, name, base_url, api_key, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&lojista.id)
        .bind(&lojista.name)
        .bind(&lojista.base_url)
        .bind(&lojista.api_key)
        .bind(lojista.status)
        .bind(lojista.created_at)
        .bind(lojista.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(lojista_id = %lojista.id, name = %lojista.name, "Lojista registered");
        Ok(lojista)
    }

    /// Fetches a lojista by ID.
    pub async fn get(&self, id: &str) -> DbResult<Lojista> {
        sqlx::query_as::<_, Lojista>("SELECT * FROM lojistas WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Lojista", id))
    }

    /// Fetches a lojista by display name, if present.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Lojista>> {
        let lojista = sqlx::query_as::<_, Lojista>("SELECT * FROM lojistas WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lojista)
    }

    /// Lists all lojistas ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Lojista>> {
        let lojistas = sqlx::query_as::<_, Lojista>("SELECT * FROM lojistas ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(lojistas)
    }

    /// Lists lojistas in a given status, ordered by name.
    pub async fn list_by_status(&self, status: LojistaStatus) -> DbResult<Vec<Lojista>> {
        let lojistas =
            sqlx::query_as::<_, Lojista>("SELECT * FROM lojistas WHERE status = ?1 ORDER BY name")
                .bind(status)
                .fetch_all(&self.pool)
                .await?;
        Ok(lojistas)
    }

    /// Updates endpoint details (name, base_url, api_key).
    ///
    /// Credentials changes reset the status to `pending`: the new endpoint
    /// has not been probed yet.
    pub async fn update_endpoint(
        &self,
        id: &str,
        name: &str,
        base_url: &str,
        api_key: &str,
    ) -> DbResult<Lojista> {
        let result = sqlx::query(
            r#"
            UPDATE lojistas
            SET name = ?2,
                base_url = ?3,
                api_key = ?4,
                status = 'pending',
                last_error = NULL,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(base_url.trim_end_matches('/'))
        .bind(api_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Lojista", id));
        }

        self.get(id).await
    }

    /// Records the result of a connectivity test.
    ///
    /// Success moves the lojista to `active` and clears `last_error`;
    /// failure moves it to `invalid` and stores the reason.
    pub async fn record_check(
        &self,
        id: &str,
        ok: bool,
        error: Option<&str>,
    ) -> DbResult<Lojista> {
        let status = if ok {
            LojistaStatus::Active
        } else {
            LojistaStatus::Invalid
        };
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE lojistas
            SET status = ?2,
                last_checked_at = ?3,
                last_error = ?4,
                updated_at = ?3
            WHERE id = ?1 AND status != 'disabled'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Lojista", id));
        }

        debug!(lojista_id = %id, status = %status, "Connectivity check recorded");
        self.get(id).await
    }

    /// Soft-deletes a lojista by moving it to `disabled`.
    ///
    /// The row is retained so mappings and sales history keep their context.
    pub async fn disable(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE lojistas SET status = 'disabled', updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Lojista", id));
        }
        Ok(())
    }

    /// Hard-deletes a lojista. Mappings cascade; sales records survive.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM lojistas WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Lojista", id));
        }
        Ok(())
    }

    /// Counts lojistas per status for the dashboard overview.
    pub async fn count_by_status(&self, status: LojistaStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lojistas WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = test_db().await;
        let repo = db.lojistas();

        let lojista = repo
            .insert("Loja Centro", "https://loja.example.com/", "key-1")
            .await
            .unwrap();

        assert_eq!(lojista.status, LojistaStatus::Pending);
        // Trailing slash is normalized away
        assert_eq!(lojista.base_url, "https://loja.example.com");

        let fetched = repo.get(&lojista.id).await.unwrap();
        assert_eq!(fetched.name, "Loja Centro");
    }

    #[tokio::test]
    async fn test_record_check_transitions() {
        let db = test_db().await;
        let repo = db.lojistas();

        let lojista = repo
            .insert("Loja A", "https://a.example.com", "key")
            .await
            .unwrap();

        let active = repo.record_check(&lojista.id, true, None).await.unwrap();
        assert_eq!(active.status, LojistaStatus::Active);
        assert!(active.last_checked_at.is_some());
        assert!(active.last_error.is_none());

        let invalid = repo
            .record_check(&lojista.id, false, Some("401 unauthorized"))
            .await
            .unwrap();
        assert_eq!(invalid.status, LojistaStatus::Invalid);
        assert_eq!(invalid.last_error.as_deref(), Some("401 unauthorized"));
    }

    #[tokio::test]
    async fn test_disable_is_sticky() {
        let db = test_db().await;
        let repo = db.lojistas();

        let lojista = repo
            .insert("Loja B", "https://b.example.com", "key")
            .await
            .unwrap();
        repo.disable(&lojista.id).await.unwrap();

        // A connectivity check must not resurrect a disabled lojista
        let err = repo.record_check(&lojista.id, true, None).await;
        assert!(matches!(err, Err(DbError::NotFound { .. })));

        let fetched = repo.get(&lojista.id).await.unwrap();
        assert_eq!(fetched.status, LojistaStatus::Disabled);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let db = test_db().await;
        let repo = db.lojistas();

        let a = repo
            .insert("Loja A", "https://a.example.com", "key")
            .await
            .unwrap();
        repo.insert("Loja B", "https://b.example.com", "key")
            .await
            .unwrap();
        repo.record_check(&a.id, true, None).await.unwrap();

        let active = repo.list_by_status(LojistaStatus::Active).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Loja A");

        assert_eq!(
            repo.count_by_status(LojistaStatus::Pending).await.unwrap(),
            1
        );
    }
}
