//! # Product Importer
//!
//! Pushes canonical products to lojista storefronts.
//!
//! ## Fan-Out Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              import(product, [loja A, loja B, loja C])                   │
//! │                                                                         │
//! │                     ┌──► loja A (active)   ──► POST/PUT ──► outcome    │
//! │  load product ──────┼──► loja B (invalid)  ──► skipped                 │
//! │  build payloads     └──► loja C (active)   ──► POST/PUT ──► outcome    │
//! │                                                                         │
//! │  Targets are independent: one lojista failing never aborts the rest.   │
//! │  The result is one outcome per target, in target order.                │
//! │                                                                         │
//! │  A per-(lojista, product) async lock serializes concurrent imports of  │
//! │  the same pair, so two overlapping cycles cannot race the create and   │
//! │  duplicate the product remotely.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, RemoteProduct};
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use fabrica_core::{ImportOptions, Lojista, Money, Product};
use fabrica_db::Database;

// =============================================================================
// Outcome Types
// =============================================================================

/// Per-target result status of one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    /// Product created or updated remotely.
    Ok,
    /// Base product landed, but the retailer rejected some parts
    /// (variations or images). The product is usable without them.
    OkWithWarnings,
    /// Target not syncable; nothing was sent.
    Skipped,
    /// Request failed; recorded on the mapping for retry.
    Failed,
}

/// Result of importing one product to one lojista.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub lojista_id: String,
    pub product_id: String,
    pub status: ImportStatus,
    pub remote_product_id: Option<String>,
    pub message: Option<String>,
}

// =============================================================================
// Importer
// =============================================================================

/// Pushes products to lojistas and maintains their mappings.
#[derive(Debug, Clone)]
pub struct ProductImporter {
    db: Database,
    client: ApiClient,
    settings: SyncSettings,
    /// Per-(lojista, product) locks. Entries are tiny and bounded by the
    /// number of live pairs, so they are never evicted.
    pair_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// One permit per lojista: at most one in-flight import per retailer,
    /// whatever the batch concurrency above is.
    lojista_slots: Arc<DashMap<String, Arc<Semaphore>>>,
}

impl ProductImporter {
    /// Creates an importer over the shared database and API client.
    pub fn new(db: Database, client: ApiClient, settings: SyncSettings) -> Self {
        ProductImporter {
            db,
            client,
            settings,
            pair_locks: Arc::new(DashMap::new()),
            lojista_slots: Arc::new(DashMap::new()),
        }
    }

    /// Imports one product to each target lojista concurrently.
    ///
    /// Returns one outcome per target, in target order. Only loading the
    /// product can fail the whole call; per-target failures are outcomes.
    pub async fn import(
        &self,
        product_id: &str,
        targets: &[String],
        options: ImportOptions,
    ) -> SyncResult<Vec<ImportOutcome>> {
        let product = self
            .db
            .products()
            .get(product_id)
            .await
            .map_err(|_| SyncError::ProductNotFound(product_id.to_string()))?;

        let futures = targets
            .iter()
            .map(|lojista_id| self.import_to_target(&product, lojista_id, options));
        let outcomes = join_all(futures).await;

        let failed = outcomes
            .iter()
            .filter(|o| o.status == ImportStatus::Failed)
            .count();
        info!(
            product_id = %product_id,
            targets = targets.len(),
            failed = failed,
            "Import fan-out finished"
        );

        Ok(outcomes)
    }

    async fn import_to_target(
        &self,
        product: &Product,
        lojista_id: &str,
        options: ImportOptions,
    ) -> ImportOutcome {
        let lojista = match self.db.lojistas().get(lojista_id).await {
            Ok(l) => l,
            Err(e) => {
                return ImportOutcome {
                    lojista_id: lojista_id.to_string(),
                    product_id: product.id.clone(),
                    status: ImportStatus::Failed,
                    remote_product_id: None,
                    message: Some(e.to_string()),
                }
            }
        };

        if !lojista.is_syncable() {
            debug!(lojista_id = %lojista.id, status = %lojista.status, "Target not syncable, skipping");
            return ImportOutcome {
                lojista_id: lojista.id.clone(),
                product_id: product.id.clone(),
                status: ImportStatus::Skipped,
                remote_product_id: None,
                message: Some(format!("lojista is {}", lojista.status)),
            };
        }

        match self.import_pair(&lojista, product, options).await {
            Ok(remote) if remote.warnings.is_empty() => ImportOutcome {
                lojista_id: lojista.id.clone(),
                product_id: product.id.clone(),
                status: ImportStatus::Ok,
                remote_product_id: Some(remote.id),
                message: None,
            },
            Ok(remote) => ImportOutcome {
                lojista_id: lojista.id.clone(),
                product_id: product.id.clone(),
                status: ImportStatus::OkWithWarnings,
                remote_product_id: Some(remote.id),
                message: Some(remote.warnings.join("; ")),
            },
            Err(err) => {
                warn!(
                    lojista_id = %lojista.id,
                    product_id = %product.id,
                    error = %err,
                    "Import failed"
                );
                ImportOutcome {
                    lojista_id: lojista.id.clone(),
                    product_id: product.id.clone(),
                    status: ImportStatus::Failed,
                    remote_product_id: None,
                    message: Some(err.to_string()),
                }
            }
        }
    }

    /// Imports one (lojista, product) pair under its locks.
    ///
    /// The lojista slot keeps at most one request in flight per retailer;
    /// the pair lock serializes overlapping cycles for the same pair so a
    /// create cannot race itself into a remote duplicate.
    pub async fn import_pair(
        &self,
        lojista: &Lojista,
        product: &Product,
        options: ImportOptions,
    ) -> SyncResult<RemoteProduct> {
        let slot = self
            .lojista_slots
            .entry(lojista.id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();
        let _slot = slot
            .acquire()
            .await
            .map_err(|_| SyncError::Internal("lojista import slot closed".to_string()))?;

        let lock = self
            .pair_locks
            .entry(format!("{}:{}", lojista.id, product.id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let existing = self.db.mappings().get(&lojista.id, &product.id).await?;
        let remote_id = existing.and_then(|m| m.remote_product_id);

        let payload = build_payload(product, options, self.settings.price_markup_bps)?;

        match self
            .client
            .upsert_product(lojista, &product.id, remote_id.as_deref(), &payload)
            .await
        {
            Ok(remote) => {
                self.db
                    .mappings()
                    .record_success(&lojista.id, &product.id, &remote.id)
                    .await?;
                Ok(remote)
            }
            Err(err) => {
                self.db
                    .mappings()
                    .record_failure(&lojista.id, &product.id, &err.to_string())
                    .await?;
                Err(err)
            }
        }
    }
}

// =============================================================================
// Payload Building
// =============================================================================

/// Builds the retailer-facing payload for one product.
///
/// Facets excluded by options are omitted entirely rather than sent empty,
/// so the retailer keeps whatever it already has for them.
pub fn build_payload(
    product: &Product,
    options: ImportOptions,
    markup_bps: u32,
) -> SyncResult<serde_json::Value> {
    let price = priced(product.price_cents, options, markup_bps)?;

    let mut map = serde_json::Map::new();
    map.insert("sku".to_string(), serde_json::json!(product.sku));
    map.insert("title".to_string(), serde_json::json!(product.title));
    map.insert("description".to_string(), serde_json::json!(product.description));
    map.insert("price_cents".to_string(), serde_json::json!(price));
    map.insert("stock".to_string(), serde_json::json!(product.stock));

    if options.include_variations {
        let variations = product
            .variations
            .iter()
            .map(|v| {
                Ok(serde_json::json!({
                    "sku": v.sku,
                    "price_cents": priced(v.price_cents, options, markup_bps)?,
                    "stock": v.stock,
                    "attributes": v.attributes,
                }))
            })
            .collect::<SyncResult<Vec<_>>>()?;
        map.insert("variations".to_string(), serde_json::Value::Array(variations));
    }
    if options.include_images {
        map.insert("images".to_string(), serde_json::json!(product.images));
    }
    if options.include_categories {
        map.insert("categories".to_string(), serde_json::json!(product.categories));
    }

    Ok(serde_json::Value::Object(map))
}

fn priced(cents: i64, options: ImportOptions, markup_bps: u32) -> SyncResult<i64> {
    if options.preserve_prices || markup_bps == 0 {
        return Ok(cents);
    }
    Money::from_cents(cents)
        .with_markup_bps(markup_bps)
        .map(|m| m.cents())
        .map_err(|e| SyncError::Internal(e.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use fabrica_core::ProductVariation;
    use fabrica_db::repository::product::ProductSnapshot;
    use fabrica_db::DbConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_product() -> Product {
        Product {
            id: "p-1".to_string(),
            sku: "SHIRT-001".to_string(),
            title: "Linen Shirt".to_string(),
            description: Some("A shirt".to_string()),
            price_cents: 1000,
            stock: 10,
            variations: vec![ProductVariation {
                sku: "SHIRT-001-M".to_string(),
                price_cents: 1100,
                stock: 4,
                attributes: serde_json::json!({"size": "M"}),
            }],
            images: vec!["https://img.example.com/1.jpg".to_string()],
            categories: vec!["clothing/shirts".to_string()],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_payload_facets_are_omitted_not_emptied() {
        let options = ImportOptions {
            include_variations: false,
            include_images: false,
            include_categories: true,
            preserve_prices: true,
        };
        let payload = build_payload(&sample_product(), options, 0).unwrap();

        assert!(payload.get("variations").is_none());
        assert!(payload.get("images").is_none());
        assert_eq!(payload["categories"][0], "clothing/shirts");
        assert_eq!(payload["price_cents"], 1000);
    }

    #[test]
    fn test_payload_markup_applies_to_all_prices() {
        let options = ImportOptions {
            preserve_prices: false,
            ..ImportOptions::default()
        };
        // 8.25% markup
        let payload = build_payload(&sample_product(), options, 825).unwrap();

        assert_eq!(payload["price_cents"], 1083);
        assert_eq!(payload["variations"][0]["price_cents"], 1191);
    }

    #[test]
    fn test_payload_preserve_prices_ignores_markup() {
        let payload = build_payload(&sample_product(), ImportOptions::default(), 825).unwrap();
        assert_eq!(payload["price_cents"], 1000);
    }

    async fn importer_with_db() -> (ProductImporter, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = ApiClient::new(&ApiConfig {
            retry_base_delay_ms: 1,
            max_attempts: 1,
            ..ApiConfig::default()
        })
        .unwrap();
        let importer = ProductImporter::new(db.clone(), client, SyncSettings::default());
        (importer, db)
    }

    async fn seed_product(db: &Database) -> Product {
        db.products()
            .upsert(ProductSnapshot {
                sku: "SHIRT-001".to_string(),
                title: "Linen Shirt".to_string(),
                description: None,
                price_cents: 1000,
                stock: 10,
                variations: vec![],
                images: vec![],
                categories: vec![],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_import_creates_then_updates() {
        let (importer, db) = importer_with_db().await;
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/products"))
            .and(body_partial_json(serde_json::json!({"sku": "SHIRT-001"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "rp-9"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/products/rp-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "rp-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let lojista = db
            .lojistas()
            .insert("Loja A", &server.uri(), "key")
            .await
            .unwrap();
        db.lojistas().record_check(&lojista.id, true, None).await.unwrap();
        let product = seed_product(&db).await;

        // First import: POST, mapping gains the remote id
        let outcomes = importer
            .import(&product.id, &[lojista.id.clone()], ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, ImportStatus::Ok);
        assert_eq!(outcomes[0].remote_product_id.as_deref(), Some("rp-9"));

        // Second import: PUT against the known remote id
        let outcomes = importer
            .import(&product.id, &[lojista.id.clone()], ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, ImportStatus::Ok);
    }

    #[tokio::test]
    async fn test_per_part_rejects_become_partial_success() {
        let (importer, db) = importer_with_db().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "rp-3",
                "warnings": ["variation SHIRT-001-M rejected: unknown size"]
            })))
            .mount(&server)
            .await;

        let lojista = db.lojistas().insert("Loja A", &server.uri(), "key").await.unwrap();
        db.lojistas().record_check(&lojista.id, true, None).await.unwrap();
        let product = seed_product(&db).await;

        let outcomes = importer
            .import(&product.id, &[lojista.id.clone()], ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, ImportStatus::OkWithWarnings);
        assert_eq!(outcomes[0].remote_product_id.as_deref(), Some("rp-3"));
        assert!(outcomes[0].message.as_ref().unwrap().contains("SHIRT-001-M"));

        // A partial success still records the mapping as ok
        let mapping = db.mappings().get(&lojista.id, &product.id).await.unwrap().unwrap();
        assert_eq!(mapping.last_status, fabrica_core::MappingStatus::Ok);
    }

    #[tokio::test]
    async fn test_non_syncable_target_is_skipped() {
        let (importer, db) = importer_with_db().await;

        // Never probed: still pending
        let lojista = db
            .lojistas()
            .insert("Loja Pendente", "https://p.example.com", "key")
            .await
            .unwrap();
        let product = seed_product(&db).await;

        let outcomes = importer
            .import(&product.id, &[lojista.id.clone()], ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, ImportStatus::Skipped);

        // Nothing was attempted, so no mapping row exists
        assert!(db
            .mappings()
            .get(&lojista.id, &product.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failure_recorded_but_other_targets_proceed() {
        let (importer, db) = importer_with_db().await;
        let good = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "rp-1"})),
            )
            .mount(&good)
            .await;
        let bad = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/products"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad payload"))
            .mount(&bad)
            .await;

        let loja_good = db.lojistas().insert("Loja Boa", &good.uri(), "key").await.unwrap();
        db.lojistas().record_check(&loja_good.id, true, None).await.unwrap();
        let loja_bad = db.lojistas().insert("Loja Ruim", &bad.uri(), "key").await.unwrap();
        db.lojistas().record_check(&loja_bad.id, true, None).await.unwrap();

        let product = seed_product(&db).await;
        let outcomes = importer
            .import(
                &product.id,
                &[loja_bad.id.clone(), loja_good.id.clone()],
                ImportOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes[0].status, ImportStatus::Failed);
        assert_eq!(outcomes[1].status, ImportStatus::Ok);

        // The failure is on the mapping for later inspection
        let mapping = db
            .mappings()
            .get(&loja_bad.id, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.last_status, fabrica_core::MappingStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_product_fails_whole_call() {
        let (importer, _db) = importer_with_db().await;
        let err = importer
            .import("ghost", &[], ImportOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ProductNotFound(_)));
    }
}
