//! # Lojista Registry
//!
//! Registration, credential testing and lifecycle management for retailer
//! storefronts. This module is the only mutator of lojista status.
//!
//! ## Registration Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         register()                                       │
//! │                                                                         │
//! │  validate(name, url, key) ──► reject bad input before any I/O          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  duplicate name? ──► ValidationError::Duplicate                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT row (status = pending)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  probe /api/health ──► ok   → status = active                          │
//! │                    └─► fail → status = invalid, last_error = reason    │
//! │                                                                         │
//! │  The row is kept either way: a lojista that failed its first probe     │
//! │  can be fixed (update) and re-tested without re-registering.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{info, warn};

use crate::client::ApiClient;
use crate::error::{SyncError, SyncResult};
use fabrica_core::validation::validate_registration;
use fabrica_core::{Lojista, LojistaStatus, ValidationError};
use fabrica_db::Database;

/// Registry for lojista lifecycle management.
#[derive(Debug, Clone)]
pub struct LojistaRegistry {
    db: Database,
    client: ApiClient,
}

impl LojistaRegistry {
    /// Creates a registry over the shared database and API client.
    pub fn new(db: Database, client: ApiClient) -> Self {
        LojistaRegistry { db, client }
    }

    /// Registers a new lojista and immediately probes it.
    ///
    /// Returns the lojista in its post-probe status (`active` or
    /// `invalid`); a failed probe is not a registration failure.
    pub async fn register(
        &self,
        name: &str,
        base_url: &str,
        api_key: &str,
    ) -> SyncResult<Lojista> {
        validate_registration(name, base_url, api_key)?;

        if self.db.lojistas().get_by_name(name).await?.is_some() {
            return Err(ValidationError::Duplicate {
                field: "name".to_string(),
                value: name.to_string(),
            }
            .into());
        }

        let lojista = self.db.lojistas().insert(name, base_url, api_key).await?;
        info!(lojista_id = %lojista.id, name = %name, "Lojista registered, probing");

        self.run_probe(&lojista).await
    }

    /// Re-tests connectivity and credentials for a lojista.
    pub async fn test_connection(&self, id: &str) -> SyncResult<Lojista> {
        let lojista = self.get(id).await?;
        if lojista.status == LojistaStatus::Disabled {
            return Err(SyncError::Conflict(format!(
                "lojista {id} is disabled, enable it before testing"
            )));
        }
        self.run_probe(&lojista).await
    }

    async fn run_probe(&self, lojista: &Lojista) -> SyncResult<Lojista> {
        match self.client.probe(lojista).await {
            Ok(()) => {
                let updated = self.db.lojistas().record_check(&lojista.id, true, None).await?;
                info!(lojista_id = %lojista.id, "Connectivity test passed");
                Ok(updated)
            }
            Err(err) => {
                warn!(lojista_id = %lojista.id, error = %err, "Connectivity test failed");
                let updated = self
                    .db
                    .lojistas()
                    .record_check(&lojista.id, false, Some(&err.to_string()))
                    .await?;
                Ok(updated)
            }
        }
    }

    /// Fetches one lojista.
    pub async fn get(&self, id: &str) -> SyncResult<Lojista> {
        self.db
            .lojistas()
            .get(id)
            .await
            .map_err(|_| SyncError::LojistaNotFound(id.to_string()))
    }

    /// Lists all lojistas.
    pub async fn list(&self) -> SyncResult<Vec<Lojista>> {
        Ok(self.db.lojistas().list().await?)
    }

    /// Lists lojistas eligible for sync (status = active).
    pub async fn list_syncable(&self) -> SyncResult<Vec<Lojista>> {
        Ok(self.db.lojistas().list_by_status(LojistaStatus::Active).await?)
    }

    /// Updates endpoint details. The lojista drops back to `pending` until
    /// the new endpoint is tested.
    pub async fn update(
        &self,
        id: &str,
        name: &str,
        base_url: &str,
        api_key: &str,
    ) -> SyncResult<Lojista> {
        validate_registration(name, base_url, api_key)?;

        if let Some(existing) = self.db.lojistas().get_by_name(name).await? {
            if existing.id != id {
                return Err(ValidationError::Duplicate {
                    field: "name".to_string(),
                    value: name.to_string(),
                }
                .into());
            }
        }

        // Ensure NotFound maps to the domain error before mutating
        self.get(id).await?;
        Ok(self
            .db
            .lojistas()
            .update_endpoint(id, name, base_url, api_key)
            .await?)
    }

    /// Soft-deletes a lojista: excluded from all sync, retained for audit.
    /// `disabled` is sticky; probes no longer change the status.
    pub async fn disable(&self, id: &str) -> SyncResult<Lojista> {
        self.get(id).await?;
        self.db.lojistas().disable(id).await?;
        info!(lojista_id = %id, "Lojista disabled");
        self.get(id).await
    }

    /// Removes a lojista and cascades its mappings.
    ///
    /// Refused while product mappings reference it, unless `force` is set:
    /// the mappings are the record of what was distributed where, and
    /// dropping them must be deliberate. Sales history survives either way.
    pub async fn delete(&self, id: &str, force: bool) -> SyncResult<()> {
        self.get(id).await?;

        let mapping_count = self.db.mappings().count_for_lojista(id).await?;
        if mapping_count > 0 && !force {
            return Err(SyncError::Conflict(format!(
                "lojista {id} has {mapping_count} product mappings; pass force to delete, \
                 or disable it to keep the audit trail"
            )));
        }

        self.db.lojistas().delete(id).await?;
        info!(lojista_id = %id, forced = force, "Lojista deleted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use fabrica_db::DbConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn registry() -> LojistaRegistry {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = ApiClient::new(&ApiConfig {
            retry_base_delay_ms: 1,
            max_attempts: 1,
            ..ApiConfig::default()
        })
        .unwrap();
        LojistaRegistry::new(db, client)
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_register_probes_to_active() {
        let registry = registry().await;
        let server = healthy_server().await;

        let lojista = registry
            .register("Loja Centro", &server.uri(), "key-1")
            .await
            .unwrap();
        assert_eq!(lojista.status, LojistaStatus::Active);
        assert!(lojista.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_register_with_bad_credentials_is_kept_as_invalid() {
        let registry = registry().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let lojista = registry
            .register("Loja Ruim", &server.uri(), "bad-key")
            .await
            .unwrap();
        assert_eq!(lojista.status, LojistaStatus::Invalid);
        assert!(lojista.last_error.is_some());

        // The row exists and can be re-tested later
        assert!(registry.get(&lojista.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_name() {
        let registry = registry().await;
        let server = healthy_server().await;

        registry
            .register("Loja A", &server.uri(), "key")
            .await
            .unwrap();
        let err = registry
            .register("Loja A", &server.uri(), "other-key")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_url_before_io() {
        let registry = registry().await;
        let err = registry
            .register("Loja", "not a url", "key")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_resets_to_pending() {
        let registry = registry().await;
        let server = healthy_server().await;

        let lojista = registry
            .register("Loja A", &server.uri(), "key")
            .await
            .unwrap();
        assert_eq!(lojista.status, LojistaStatus::Active);

        let updated = registry
            .update(&lojista.id, "Loja A", &server.uri(), "rotated-key")
            .await
            .unwrap();
        assert_eq!(updated.status, LojistaStatus::Pending);
        assert_eq!(updated.api_key, "rotated-key");
    }

    #[tokio::test]
    async fn test_delete_with_mappings_conflicts_unless_forced() {
        let registry = registry().await;
        let server = healthy_server().await;

        let lojista = registry
            .register("Loja A", &server.uri(), "key")
            .await
            .unwrap();

        let product = registry
            .db
            .products()
            .upsert(fabrica_db::repository::product::ProductSnapshot {
                sku: "SHIRT-001".to_string(),
                title: "Shirt".to_string(),
                description: None,
                price_cents: 4990,
                stock: 1,
                variations: vec![],
                images: vec![],
                categories: vec![],
            })
            .await
            .unwrap();
        registry
            .db
            .mappings()
            .record_success(&lojista.id, &product.id, "rp-1")
            .await
            .unwrap();

        // Mapped lojista: delete without force is a conflict
        let err = registry.delete(&lojista.id, false).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        assert!(registry.get(&lojista.id).await.is_ok());

        // Forced delete removes the row and cascades the mappings
        registry.delete(&lojista.id, true).await.unwrap();
        assert!(matches!(
            registry.get(&lojista.id).await,
            Err(SyncError::LojistaNotFound(_))
        ));
        assert!(registry
            .db
            .mappings()
            .get(&lojista.id, &product.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_disable_is_sticky_across_probes() {
        let registry = registry().await;
        let server = healthy_server().await;

        let lojista = registry
            .register("Loja A", &server.uri(), "key")
            .await
            .unwrap();
        let disabled = registry.disable(&lojista.id).await.unwrap();
        assert_eq!(disabled.status, LojistaStatus::Disabled);

        // A disabled lojista cannot be probed back to life
        let err = registry.test_connection(&lojista.id).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        assert_eq!(
            registry.get(&lojista.id).await.unwrap().status,
            LojistaStatus::Disabled
        );
    }
}
