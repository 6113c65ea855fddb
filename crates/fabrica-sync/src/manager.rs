//! # Sync Manager
//!
//! Orchestrates the push and pull sides of the distribution cycle.
//!
//! ## Cycle Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncManager                                     │
//! │                                                                         │
//! │  PUSH: import_catalog()                                                 │
//! │    product ids (SKU order) ──► BatchProcessor ──► ProductImporter      │
//! │                                 chunked job        fan-out per target   │
//! │                                                                         │
//! │  PULL: force_sync() / scheduler tick                                    │
//! │    per syncable lojista:                                                │
//! │      fetch_orders(cursor) ──► ingest (dedupe) ──► commit cursor        │
//! │      fetch_stock_levels() ──► record on mappings                        │
//! │                                                                         │
//! │  READS: dashboard_overview(), sales_report()                            │
//! │    served through CacheLayer; every write path above invalidates        │
//! │    the affected key families                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::batch::{BatchProcessor, ItemWorker, JobStatusReport};
use crate::cache::CacheLayer;
use crate::client::ApiClient;
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::importer::{ImportStatus, ProductImporter};
use crate::registry::LojistaRegistry;
use fabrica_core::{BatchJobKind, ImportOptions, ItemOutcome, Lojista};
use fabrica_db::repository::sales::NewSalesRecord;
use fabrica_db::Database;

/// Ranking depth for the report's top products section.
const TOP_PRODUCTS_LIMIT: i64 = 10;

// =============================================================================
// Pull Summary
// =============================================================================

/// Result of pulling sales from one lojista.
#[derive(Debug, Clone, Serialize)]
pub struct PullSummary {
    pub lojista_id: String,
    /// Orders newly ingested.
    pub ingested: u64,
    /// Orders already present (overlapping window).
    pub duplicates: u64,
    /// Pages fetched.
    pub pages: u64,
    /// Set when the pull failed; counts above are then zero.
    pub error: Option<String>,
}

// =============================================================================
// Manager
// =============================================================================

/// Top-level orchestrator owning the engine's components.
#[derive(Clone)]
pub struct SyncManager {
    db: Database,
    client: ApiClient,
    registry: LojistaRegistry,
    importer: ProductImporter,
    processor: BatchProcessor,
    cache: Arc<CacheLayer>,
    config: EngineConfig,
}

impl SyncManager {
    /// Wires up all components over a shared database.
    pub fn new(db: Database, config: EngineConfig) -> SyncResult<Self> {
        let client = ApiClient::new(&config.api)?;
        let registry = LojistaRegistry::new(db.clone(), client.clone());
        let importer = ProductImporter::new(db.clone(), client.clone(), config.sync.clone());
        let processor = BatchProcessor::new(db.clone(), config.batch.clone());
        let cache = Arc::new(CacheLayer::new(config.cache.clone()));

        Ok(SyncManager {
            db,
            client,
            registry,
            importer,
            processor,
            cache,
            config,
        })
    }

    /// Access to the lojista registry.
    pub fn registry(&self) -> &LojistaRegistry {
        &self.registry
    }

    /// Access to the product importer.
    pub fn importer(&self) -> &ProductImporter {
        &self.importer
    }

    /// Access to the batch processor.
    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    // =========================================================================
    // Push: Catalog Import
    // =========================================================================

    /// Imports the whole catalog to the given targets (or every syncable
    /// lojista) as a resumable batch job.
    ///
    /// The resolved targets and options are persisted on the job, so a
    /// later resume runs against this request, not the defaults of the day.
    pub async fn import_catalog(
        &self,
        targets: Option<Vec<String>>,
        options: Option<ImportOptions>,
    ) -> SyncResult<JobStatusReport> {
        let targets = match targets {
            Some(t) => t,
            None => self
                .registry
                .list_syncable()
                .await?
                .into_iter()
                .map(|l| l.id)
                .collect(),
        };
        let options = options.unwrap_or_else(|| self.config.sync.import_options());
        let params = ImportParams { targets, options };
        let raw_params = serde_json::to_string(&params)?;

        let product_ids = self.db.products().list_ids().await?;
        info!(
            products = product_ids.len(),
            targets = params.targets.len(),
            "Starting catalog import job"
        );

        let worker = CatalogImportWorker {
            importer: self.importer.clone(),
            params,
        };
        let job = self
            .processor
            .start(
                BatchJobKind::ImportProducts,
                &product_ids,
                Some(&raw_params),
                &worker,
            )
            .await?;

        self.cache.invalidate_prefix("dashboard");
        self.processor.status(&job.id).await
    }

    /// Resumes a suspended catalog import job against its original
    /// targets and options.
    pub async fn resume_import(&self, job_id: &str) -> SyncResult<JobStatusReport> {
        let job = self
            .db
            .batch_jobs()
            .get(job_id)
            .await
            .map_err(|_| SyncError::JobNotFound(job_id.to_string()))?;

        let params = match &job.params {
            Some(raw) => serde_json::from_str(raw)?,
            // Jobs from before parameters were recorded
            None => ImportParams {
                targets: self
                    .registry
                    .list_syncable()
                    .await?
                    .into_iter()
                    .map(|l| l.id)
                    .collect(),
                options: self.config.sync.import_options(),
            },
        };
        let worker = CatalogImportWorker {
            importer: self.importer.clone(),
            params,
        };

        let job = self.processor.resume(job_id, &worker).await?;
        self.cache.invalidate_prefix("dashboard");
        self.processor.status(&job.id).await
    }

    // =========================================================================
    // Pull: Sales Collection
    // =========================================================================

    /// Pulls sales now, for one lojista or every syncable one.
    ///
    /// Per-lojista failures are logged and reflected in the summaries;
    /// they never abort the other pulls.
    pub async fn force_sync(&self, lojista_id: Option<&str>) -> SyncResult<Vec<PullSummary>> {
        let lojistas = match lojista_id {
            Some(id) => {
                let lojista = self.registry.get(id).await?;
                if !lojista.is_syncable() {
                    return Err(SyncError::Conflict(format!(
                        "lojista {id} is {}, cannot pull sales",
                        lojista.status
                    )));
                }
                vec![lojista]
            }
            None => self.registry.list_syncable().await?,
        };

        let mut summaries = Vec::with_capacity(lojistas.len());
        for lojista in &lojistas {
            match self.pull_lojista(lojista).await {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    error!(lojista_id = %lojista.id, error = %err, "Sales pull failed");
                    summaries.push(PullSummary {
                        lojista_id: lojista.id.clone(),
                        ingested: 0,
                        duplicates: 0,
                        pages: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        self.cache.invalidate_prefix("report");
        self.cache.invalidate_prefix("dashboard");
        Ok(summaries)
    }

    /// Pulls all order pages from one lojista's cursor onward.
    async fn pull_lojista(&self, lojista: &Lojista) -> SyncResult<PullSummary> {
        let mut summary = PullSummary {
            lojista_id: lojista.id.clone(),
            ingested: 0,
            duplicates: 0,
            pages: 0,
            error: None,
        };

        let mut cursor = self.db.sales().get_cursor(&lojista.id).await?;
        loop {
            let page = self.client.fetch_orders(lojista, cursor.as_deref()).await?;
            summary.pages += 1;

            for order in &page.orders {
                let inserted = self
                    .db
                    .sales()
                    .ingest(NewSalesRecord {
                        lojista_id: lojista.id.clone(),
                        remote_order_id: order.order_id.clone(),
                        product_ids: order.product_ids.clone(),
                        quantity: order.quantity,
                        amount_cents: order.amount_cents,
                        order_date: order.order_date,
                    })
                    .await?;
                if inserted {
                    summary.ingested += 1;
                } else {
                    summary.duplicates += 1;
                }
            }

            // Commit only after the page is fully ingested: a crash between
            // fetch and commit re-pulls the same window, which ingest dedupes.
            match page.cursor {
                Some(next) => {
                    self.db.sales().set_cursor(&lojista.id, &next).await?;
                    cursor = Some(next);
                }
                None => break,
            }
        }

        // Best effort: stock levels are advisory, a failure here must not
        // fail an otherwise successful pull.
        match self.client.fetch_stock_levels(lojista).await {
            Ok(levels) => {
                for level in levels {
                    self.db
                        .mappings()
                        .record_remote_stock(&lojista.id, &level.remote_product_id, level.stock)
                        .await?;
                }
            }
            Err(err) => {
                warn!(lojista_id = %lojista.id, error = %err, "Stock level fetch failed")
            }
        }

        info!(
            lojista_id = %lojista.id,
            ingested = summary.ingested,
            duplicates = summary.duplicates,
            pages = summary.pages,
            "Sales pull finished"
        );
        Ok(summary)
    }

    /// Runs scheduled pull cycles until `shutdown` flips to true.
    pub async fn run_scheduler(&self, mut shutdown: watch::Receiver<bool>) {
        let cadence = Duration::from_secs(self.config.sync.cadence_secs);
        let mut ticker = tokio::time::interval(cadence);
        // The immediate first tick would race startup; skip it
        ticker.tick().await;

        info!(cadence_secs = self.config.sync.cadence_secs, "Sync scheduler running");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.force_sync(None).await {
                        error!(error = %err, "Scheduled sync cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Sync scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    // =========================================================================
    // Cached Reads
    // =========================================================================

    /// Aggregate engine health for the dashboard.
    pub async fn dashboard_overview(&self) -> SyncResult<serde_json::Value> {
        let db = self.db.clone();
        self.cache
            .get_or_compute("dashboard:overview", None, || async move {
                let lojistas = db.lojistas();
                let active = lojistas.count_by_status(fabrica_core::LojistaStatus::Active).await?;
                let pending = lojistas.count_by_status(fabrica_core::LojistaStatus::Pending).await?;
                let invalid = lojistas.count_by_status(fabrica_core::LojistaStatus::Invalid).await?;
                let disabled = lojistas.count_by_status(fabrica_core::LojistaStatus::Disabled).await?;

                let products = db.products().count().await?;
                let mapping_errors = db.mappings().count_errors().await?;
                let (orders, amount_cents) = db.sales().totals().await?;

                Ok(serde_json::json!({
                    "lojistas": {
                        "active": active,
                        "pending": pending,
                        "invalid": invalid,
                        "disabled": disabled,
                    },
                    "products": products,
                    "mapping_errors": mapping_errors,
                    "sales": {
                        "orders": orders,
                        "amount_cents": amount_cents,
                    },
                }))
            })
            .await
    }

    /// Per-lojista sales aggregates and top products over a date window.
    pub async fn sales_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<serde_json::Value> {
        let key = format!("report:{}:{}", from.to_rfc3339(), to.to_rfc3339());
        let db = self.db.clone();
        self.cache
            .get_or_compute(&key, None, || async move {
                let rows = db.sales().report(from, to).await?;
                let top = db.sales().top_products(from, to, TOP_PRODUCTS_LIMIT).await?;
                Ok(serde_json::json!({
                    "from": from,
                    "to": to,
                    "lines": rows,
                    "top_products": top,
                }))
            })
            .await
    }
}

// =============================================================================
// Catalog Import Worker
// =============================================================================

/// The request an import job was started with, serialized onto the job
/// row so resumes reconstruct an equivalent worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImportParams {
    targets: Vec<String>,
    options: ImportOptions,
}

/// Batch worker: one item = one product imported to every target.
struct CatalogImportWorker {
    importer: ProductImporter,
    params: ImportParams,
}

#[async_trait]
impl ItemWorker for CatalogImportWorker {
    async fn process(&self, item_id: &str) -> SyncResult<ItemOutcome> {
        let outcomes = self
            .importer
            .import(item_id, &self.params.targets, self.params.options)
            .await?;

        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| o.status == ImportStatus::Failed)
            .collect();
        if !failed.is_empty() {
            let first = failed[0];
            return Err(SyncError::Internal(format!(
                "{} of {} targets failed, first: {}",
                failed.len(),
                outcomes.len(),
                first.message.as_deref().unwrap_or("unknown error")
            )));
        }

        if outcomes.iter().all(|o| o.status == ImportStatus::Skipped) {
            // No syncable target wanted this product
            return Ok(ItemOutcome::Skipped);
        }
        Ok(ItemOutcome::Success)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
