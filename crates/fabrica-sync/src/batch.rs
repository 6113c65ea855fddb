//! # Batch Processor
//!
//! Chunked, resumable execution of bulk work (catalog-wide imports, full
//! sales sweeps).
//!
//! ## One Processing Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        run_pass(job, worker)                             │
//! │                                                                         │
//! │   ┌──► pause flag set?  ──► persist `paused`, stop                      │
//! │   │                                                                     │
//! │   ├──► time budget gone? ──► persist `paused`, stop                     │
//! │   │    (suspending at a chunk boundary loses nothing: the cursor        │
//! │   │     was committed after the previous chunk)                         │
//! │   │                                                                     │
//! │   └──► fetch next pending chunk from scan position                      │
//! │             │                                                           │
//! │             ├── empty, no pending left ──► completed / failed           │
//! │             ├── empty, failures awaiting retry ──► re-sweep from 0      │
//! │             │                                                           │
//! │             ▼                                                           │
//! │        process items (bounded concurrency)                              │
//! │        worker Ok(outcome)  → record terminal outcome                    │
//! │        worker Err(e)       → retry_count++, pending until ceiling,      │
//! │                              then permanently failed                    │
//! │             │                                                           │
//! │             ▼                                                           │
//! │        commit cursor past the chunk ──► loop                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::error::{SyncError, SyncResult};
use fabrica_core::{BatchItem, BatchJob, BatchJobKind, BatchJobStatus, ItemOutcome};
use fabrica_db::repository::job::ItemCounts;
use fabrica_db::Database;

// =============================================================================
// Worker Trait
// =============================================================================

/// Processes one batch item.
///
/// Return `Ok(Success)` or `Ok(Skipped)` for terminal outcomes. Returning
/// an error counts as a failed attempt: the item stays pending until the
/// retry ceiling, then becomes permanently failed. `Ok(Failed)` marks a
/// permanent failure without spending retries.
#[async_trait]
pub trait ItemWorker: Send + Sync {
    async fn process(&self, item_id: &str) -> SyncResult<ItemOutcome>;
}

// =============================================================================
// Status Report
// =============================================================================

/// Snapshot of a job, its per-outcome counts, and which items failed
/// permanently (with their final messages).
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub job: BatchJob,
    pub counts: ItemCounts,
    pub failed: Vec<BatchItem>,
}

// =============================================================================
// Processor
// =============================================================================

/// Runs batch jobs in bounded chunks with durable progress.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    db: Database,
    config: BatchConfig,
    /// Cooperative pause flags, checked between chunks.
    pause_flags: Arc<DashMap<String, Arc<AtomicBool>>>,
}

impl BatchProcessor {
    /// Creates a processor over the shared database.
    pub fn new(db: Database, config: BatchConfig) -> Self {
        BatchProcessor {
            db,
            config,
            pause_flags: Arc::new(DashMap::new()),
        }
    }

    /// Creates a job over an ordered item list and runs one pass.
    ///
    /// `params` (kind-specific, JSON) is persisted on the job row so the
    /// caller can rebuild an equivalent worker when resuming later.
    pub async fn start(
        &self,
        kind: BatchJobKind,
        item_ids: &[String],
        params: Option<&str>,
        worker: &dyn ItemWorker,
    ) -> SyncResult<BatchJob> {
        let job = self.db.batch_jobs().create(kind, item_ids, params).await?;

        if item_ids.is_empty() {
            self.db
                .batch_jobs()
                .set_status(&job.id, BatchJobStatus::Completed)
                .await?;
            return Ok(self.db.batch_jobs().get(&job.id).await?);
        }

        info!(job_id = %job.id, kind = %kind, items = item_ids.len(), "Batch job started");
        self.run_pass(&job.id, worker).await
    }

    /// Resumes a paused (or still running) job for another pass.
    pub async fn resume(&self, job_id: &str, worker: &dyn ItemWorker) -> SyncResult<BatchJob> {
        let job = self.get_job(job_id).await?;
        match job.status {
            BatchJobStatus::Running | BatchJobStatus::Paused => {}
            terminal => {
                return Err(SyncError::Conflict(format!(
                    "job {job_id} is {terminal:?} and cannot be resumed"
                )))
            }
        }

        self.pause_flag(job_id).store(false, Ordering::SeqCst);
        self.db
            .batch_jobs()
            .set_status(job_id, BatchJobStatus::Running)
            .await?;

        info!(job_id = %job_id, cursor = job.cursor, "Batch job resumed");
        self.run_pass(job_id, worker).await
    }

    /// Requests a cooperative pause. A running pass honors it at the next
    /// chunk boundary; the status flips to `paused` either way.
    pub async fn pause(&self, job_id: &str) -> SyncResult<()> {
        let job = self.get_job(job_id).await?;
        self.pause_flag(job_id).store(true, Ordering::SeqCst);

        if job.status == BatchJobStatus::Running {
            self.db
                .batch_jobs()
                .set_status(job_id, BatchJobStatus::Paused)
                .await?;
        }
        info!(job_id = %job_id, "Pause requested");
        Ok(())
    }

    /// Returns the job header plus per-outcome counts.
    pub async fn status(&self, job_id: &str) -> SyncResult<JobStatusReport> {
        let job = self.get_job(job_id).await?;
        let counts = self.db.batch_jobs().counts(job_id).await?;
        let failed = self.db.batch_jobs().failed_items(job_id).await?;
        Ok(JobStatusReport { job, counts, failed })
    }

    /// Purges finished jobs past their retention windows. Returns how many
    /// jobs were removed.
    pub async fn purge_expired(&self) -> SyncResult<u64> {
        let now = Utc::now();
        let completed = self
            .db
            .batch_jobs()
            .purge_finished_before(
                BatchJobStatus::Completed,
                now - chrono::Duration::days(self.config.success_retention_days),
            )
            .await?;
        let failed = self
            .db
            .batch_jobs()
            .purge_finished_before(
                BatchJobStatus::Failed,
                now - chrono::Duration::days(self.config.failure_retention_days),
            )
            .await?;

        if completed + failed > 0 {
            info!(completed, failed, "Purged expired batch jobs");
        }
        Ok(completed + failed)
    }

    // =========================================================================
    // Pass Execution
    // =========================================================================

    async fn run_pass(&self, job_id: &str, worker: &dyn ItemWorker) -> SyncResult<BatchJob> {
        let deadline = Instant::now() + Duration::from_secs(self.config.max_execution_secs);
        let chunk_size = self.config.effective_chunk_size() as i64;
        let flag = self.pause_flag(job_id);

        let mut scan_from = self.get_job(job_id).await?.cursor;
        // Each full sweep retries every still-pending failure once, so the
        // retry ceiling bounds the sweep count too.
        let mut sweeps_left = self.config.max_item_retries + 1;

        loop {
            if flag.load(Ordering::SeqCst) {
                debug!(job_id = %job_id, "Pause flag set, suspending at chunk boundary");
                return self.suspend(job_id).await;
            }
            if Instant::now() >= deadline {
                warn!(job_id = %job_id, "Execution budget exhausted, suspending");
                return self.suspend(job_id).await;
            }

            let chunk = self
                .db
                .batch_jobs()
                .pending_chunk(job_id, scan_from, chunk_size)
                .await?;

            if chunk.is_empty() {
                let counts = self.db.batch_jobs().counts(job_id).await?;
                if counts.pending == 0 {
                    return self.finalize(job_id, counts).await;
                }
                sweeps_left -= 1;
                if sweeps_left <= 0 {
                    // Should be unreachable: the retry ceiling turns every
                    // persistent failure terminal within the sweep budget.
                    warn!(job_id = %job_id, pending = counts.pending, "Sweep budget exhausted");
                    return self.suspend(job_id).await;
                }
                debug!(job_id = %job_id, pending = counts.pending, "Re-sweeping for retries");
                scan_from = 0;
                continue;
            }

            let last_position = chunk.last().map(|i| i.position).unwrap_or(scan_from);

            let results: Vec<(String, SyncResult<ItemOutcome>)> =
                stream::iter(chunk.iter().map(|item| {
                    let item_id = item.item_id.clone();
                    async move {
                        let result = worker.process(&item_id).await;
                        (item_id, result)
                    }
                }))
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

            for (item_id, result) in results {
                self.record(job_id, &item_id, result).await?;
            }

            scan_from = last_position + 1;
            self.db.batch_jobs().commit_cursor(job_id, scan_from).await?;
        }
    }

    async fn record(
        &self,
        job_id: &str,
        item_id: &str,
        result: SyncResult<ItemOutcome>,
    ) -> SyncResult<()> {
        match result {
            Ok(ItemOutcome::Pending) => Ok(()),
            Ok(outcome @ (ItemOutcome::Success | ItemOutcome::Skipped)) => {
                self.db
                    .batch_jobs()
                    .record_outcome(job_id, item_id, outcome, None)
                    .await?;
                Ok(())
            }
            Ok(ItemOutcome::Failed) => {
                self.db
                    .batch_jobs()
                    .record_outcome(
                        job_id,
                        item_id,
                        ItemOutcome::Failed,
                        Some("permanent failure"),
                    )
                    .await?;
                Ok(())
            }
            Err(err) => {
                let outcome = self
                    .db
                    .batch_jobs()
                    .record_retry(job_id, item_id, &err.to_string(), self.config.max_item_retries)
                    .await?;
                debug!(
                    job_id = %job_id,
                    item_id = %item_id,
                    ?outcome,
                    error = %err,
                    "Item attempt failed"
                );
                Ok(())
            }
        }
    }

    async fn suspend(&self, job_id: &str) -> SyncResult<BatchJob> {
        self.db
            .batch_jobs()
            .set_status(job_id, BatchJobStatus::Paused)
            .await?;
        Ok(self.get_job(job_id).await?)
    }

    async fn finalize(&self, job_id: &str, counts: ItemCounts) -> SyncResult<BatchJob> {
        let status = if counts.failed > 0 {
            BatchJobStatus::Failed
        } else {
            BatchJobStatus::Completed
        };
        self.db.batch_jobs().set_status(job_id, status).await?;
        self.pause_flags.remove(job_id);

        info!(
            job_id = %job_id,
            ?status,
            success = counts.success,
            failed = counts.failed,
            skipped = counts.skipped,
            "Batch job finished"
        );
        Ok(self.get_job(job_id).await?)
    }

    async fn get_job(&self, job_id: &str) -> SyncResult<BatchJob> {
        self.db
            .batch_jobs()
            .get(job_id)
            .await
            .map_err(|_| SyncError::JobNotFound(job_id.to_string()))
    }

    fn pause_flag(&self, job_id: &str) -> Arc<AtomicBool> {
        self.pause_flags
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use fabrica_db::DbConfig;

    /// Scriptable worker: fails each item a fixed number of times first.
    struct FlakyWorker {
        failures_per_item: usize,
        attempts: DashMap<String, usize>,
    }

    impl FlakyWorker {
        fn new(failures_per_item: usize) -> Self {
            FlakyWorker {
                failures_per_item,
                attempts: DashMap::new(),
            }
        }
    }

    #[async_trait]
    impl ItemWorker for FlakyWorker {
        async fn process(&self, item_id: &str) -> SyncResult<ItemOutcome> {
            let mut attempts = self.attempts.entry(item_id.to_string()).or_insert(0);
            *attempts += 1;
            if *attempts <= self.failures_per_item {
                Err(SyncError::Network("connection reset".into()))
            } else {
                Ok(ItemOutcome::Success)
            }
        }
    }

    /// Counts attempts per item, holding each one for a fixed delay.
    struct SlowCountingWorker {
        delay: Duration,
        attempts: DashMap<String, usize>,
    }

    #[async_trait]
    impl ItemWorker for SlowCountingWorker {
        async fn process(&self, item_id: &str) -> SyncResult<ItemOutcome> {
            *self.attempts.entry(item_id.to_string()).or_insert(0) += 1;
            tokio::time::sleep(self.delay).await;
            Ok(ItemOutcome::Success)
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item-{i}")).collect()
    }

    async fn processor(config: BatchConfig) -> BatchProcessor {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        BatchProcessor::new(db, config)
    }

    #[tokio::test]
    async fn test_clean_run_completes() {
        let processor = processor(BatchConfig::default()).await;
        let worker = FlakyWorker::new(0);

        let job = processor
            .start(BatchJobKind::ImportProducts, &ids(7), None, &worker)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);

        let report = processor.status(&job.id).await.unwrap();
        assert_eq!(report.counts.success, 7);
        assert_eq!(report.counts.pending, 0);
        assert!(report.job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_job_completes_immediately() {
        let processor = processor(BatchConfig::default()).await;
        let worker = FlakyWorker::new(0);

        let job = processor
            .start(BatchJobKind::SyncSales, &[], None, &worker)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);
    }

    #[tokio::test]
    async fn test_transient_failures_recover_within_ceiling() {
        let config = BatchConfig {
            max_item_retries: 3,
            ..BatchConfig::default()
        };
        let processor = processor(config).await;
        // Two failures then success: within the ceiling of 3
        let worker = FlakyWorker::new(2);

        let job = processor
            .start(BatchJobKind::ImportProducts, &ids(3), None, &worker)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);

        let report = processor.status(&job.id).await.unwrap();
        assert_eq!(report.counts.success, 3);
        assert_eq!(report.counts.failed, 0);
    }

    #[tokio::test]
    async fn test_persistent_failures_exhaust_ceiling() {
        let config = BatchConfig {
            max_item_retries: 2,
            ..BatchConfig::default()
        };
        let processor = processor(config).await;
        // Never succeeds
        let worker = FlakyWorker::new(usize::MAX);

        let job = processor
            .start(BatchJobKind::ImportProducts, &ids(2), None, &worker)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Failed);

        let report = processor.status(&job.id).await.unwrap();
        assert_eq!(report.counts.failed, 2);
        assert_eq!(report.counts.pending, 0);

        // The report names each failed item with its final error
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].item_id, "item-0");
        assert!(report.failed[0]
            .message
            .as_deref()
            .unwrap()
            .contains("connection reset"));

        // Each item got exactly ceiling attempts
        assert_eq!(*worker.attempts.get("item-0").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_time_budget_suspends_then_resumes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        // Zero budget: the pass suspends before the first chunk
        let starved = BatchProcessor::new(
            db.clone(),
            BatchConfig {
                max_execution_secs: 0,
                ..BatchConfig::default()
            },
        );
        let worker = FlakyWorker::new(0);
        let job = starved
            .start(BatchJobKind::ImportProducts, &ids(4), None, &worker)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Paused);
        assert_eq!(starved.status(&job.id).await.unwrap().counts.pending, 4);

        // A processor with a normal budget finishes the job from the cursor
        let rested = BatchProcessor::new(db, BatchConfig::default());
        let job = rested.resume(&job.id, &worker).await.unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);
    }

    #[tokio::test]
    async fn test_resume_never_reprocesses_committed_items() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        // Slow items against a one-second budget: the first chunk finishes
        // past the deadline and commits, then the pass suspends before the
        // second chunk.
        let starved = BatchProcessor::new(
            db.clone(),
            BatchConfig {
                chunk_size: 2,
                max_execution_secs: 1,
                ..BatchConfig::default()
            },
        );
        let first = SlowCountingWorker {
            delay: Duration::from_millis(1100),
            attempts: DashMap::new(),
        };
        let job = starved
            .start(BatchJobKind::ImportProducts, &ids(4), None, &first)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Paused);
        assert_eq!(job.cursor, 2);
        assert_eq!(*first.attempts.get("item-0").unwrap(), 1);
        assert_eq!(*first.attempts.get("item-1").unwrap(), 1);
        assert!(first.attempts.get("item-2").is_none());

        // A fresh worker on resume sees only the uncommitted tail
        let rested = BatchProcessor::new(
            db,
            BatchConfig {
                chunk_size: 2,
                ..BatchConfig::default()
            },
        );
        let second = SlowCountingWorker {
            delay: Duration::ZERO,
            attempts: DashMap::new(),
        };
        let job = rested.resume(&job.id, &second).await.unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);
        assert_eq!(rested.status(&job.id).await.unwrap().counts.success, 4);

        assert!(second.attempts.get("item-0").is_none());
        assert!(second.attempts.get("item-1").is_none());
        assert_eq!(*second.attempts.get("item-2").unwrap(), 1);
        assert_eq!(*second.attempts.get("item-3").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resume_rejects_terminal_jobs() {
        let processor = processor(BatchConfig::default()).await;
        let worker = FlakyWorker::new(0);

        let job = processor
            .start(BatchJobKind::ImportProducts, &ids(1), None, &worker)
            .await
            .unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);

        let err = processor.resume(&job.id, &worker).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_worker_skip_is_terminal() {
        struct SkipWorker;
        #[async_trait]
        impl ItemWorker for SkipWorker {
            async fn process(&self, _item_id: &str) -> SyncResult<ItemOutcome> {
                Ok(ItemOutcome::Skipped)
            }
        }

        let processor = processor(BatchConfig::default()).await;
        let job = processor
            .start(BatchJobKind::ImportProducts, &ids(3), None, &SkipWorker)
            .await
            .unwrap();

        // Skips are terminal and never count as failures
        assert_eq!(job.status, BatchJobStatus::Completed);
        let report = processor.status(&job.id).await.unwrap();
        assert_eq!(report.counts.skipped, 3);
    }

    #[tokio::test]
    async fn test_status_of_unknown_job() {
        let processor = processor(BatchConfig::default()).await;
        assert!(matches!(
            processor.status("ghost").await,
            Err(SyncError::JobNotFound(_))
        ));
    }
}
