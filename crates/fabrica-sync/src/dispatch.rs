//! # Boundary Dispatch
//!
//! The single entry point callers go through. Every command passes one
//! authorization check before touching any component, and every handler
//! answers with a structured `OperationResult` instead of raising.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Command ──► authorize(caps) ──► handler ──► OperationResult           │
//! │                   │                  │                                  │
//! │                   │ missing cap      │ error                            │
//! │                   ▼                  ▼                                  │
//! │            err("not allowed")   err(message)                            │
//! │                                                                         │
//! │  Components below this layer assume a pre-authorized caller.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SyncError;
use crate::manager::SyncManager;
use fabrica_core::{ImportOptions, OperationResult};

// =============================================================================
// Capabilities
// =============================================================================

/// What a caller is allowed to do.
///
/// `ManageStore` is the broader grant; `ManageIntegration` covers the same
/// commands for integration-only operators. Either one authorizes every
/// command here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    ManageIntegration,
    ManageStore,
}

fn authorize(command: &str, capabilities: &[Capability]) -> Result<(), SyncError> {
    let allowed = capabilities
        .iter()
        .any(|c| matches!(c, Capability::ManageIntegration | Capability::ManageStore));
    if allowed {
        Ok(())
    } else {
        Err(SyncError::Forbidden(format!(
            "{command} requires manage_integration or manage_store"
        )))
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Boundary commands, one per externally reachable operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    ImportProducts {
        targets: Option<Vec<String>>,
        options: Option<ImportOptions>,
    },
    ForceSync {
        lojista_id: Option<String>,
    },
    TestConnection {
        lojista_id: String,
    },
    RegisterLojista {
        name: String,
        base_url: String,
        api_key: String,
    },
    DeleteLojista {
        lojista_id: String,
        force: bool,
    },
    JobStatus {
        job_id: String,
    },
    ResumeJob {
        job_id: String,
    },
    DashboardOverview,
    SalesReport {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::ImportProducts { .. } => "import_products",
            Command::ForceSync { .. } => "force_sync",
            Command::TestConnection { .. } => "test_connection",
            Command::RegisterLojista { .. } => "register_lojista",
            Command::DeleteLojista { .. } => "delete_lojista",
            Command::JobStatus { .. } => "job_status",
            Command::ResumeJob { .. } => "resume_job",
            Command::DashboardOverview => "dashboard_overview",
            Command::SalesReport { .. } => "sales_report",
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Maps boundary commands onto the engine.
#[derive(Clone)]
pub struct Dispatcher {
    manager: SyncManager,
}

impl Dispatcher {
    pub fn new(manager: SyncManager) -> Self {
        Dispatcher { manager }
    }

    /// Executes one command for a caller holding `capabilities`.
    ///
    /// Never returns an error: failures become `OperationResult::err` so the
    /// boundary always answers with the same shape.
    pub async fn execute(
        &self,
        command: Command,
        capabilities: &[Capability],
    ) -> OperationResult {
        let name = command.name();
        if let Err(err) = authorize(name, capabilities) {
            warn!(command = name, "Command rejected, caller lacks capability");
            return OperationResult::err(err.to_string());
        }

        match self.run(command).await {
            Ok(result) => result,
            Err(err) => {
                warn!(command = name, error = %err, "Command failed");
                OperationResult::err(err.to_string())
            }
        }
    }

    async fn run(&self, command: Command) -> Result<OperationResult, SyncError> {
        match command {
            Command::ImportProducts { targets, options } => {
                let report = self.manager.import_catalog(targets, options).await?;
                let data = serde_json::to_value(&report)?;
                if report.counts.failed > 0 {
                    let detail = report
                        .failed
                        .iter()
                        .take(3)
                        .map(|i| {
                            format!(
                                "{}: {}",
                                i.item_id,
                                i.message.as_deref().unwrap_or("unknown error")
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("; ");
                    let err = SyncError::PartialBatch {
                        job_id: report.job.id.clone(),
                        failed: report.counts.failed,
                        message: format!(
                            "{} ok, {} skipped; failed: {}",
                            report.counts.success, report.counts.skipped, detail
                        ),
                    };
                    return Ok(OperationResult {
                        success: false,
                        message: err.to_string(),
                        data: Some(data),
                    });
                }
                Ok(OperationResult::ok(
                    format!(
                        "import job {} is {}: {} ok, {} skipped",
                        report.job.id,
                        report.job.status,
                        report.counts.success,
                        report.counts.skipped
                    ),
                    Some(data),
                ))
            }
            Command::ForceSync { lojista_id } => {
                let summaries = self.manager.force_sync(lojista_id.as_deref()).await?;
                let ingested: u64 = summaries.iter().map(|s| s.ingested).sum();
                let failed: Vec<&str> = summaries
                    .iter()
                    .filter(|s| s.error.is_some())
                    .map(|s| s.lojista_id.as_str())
                    .collect();
                let data = serde_json::to_value(&summaries)?;
                if failed.is_empty() {
                    Ok(OperationResult::ok(
                        format!(
                            "pulled {} lojistas, {} new orders",
                            summaries.len(),
                            ingested
                        ),
                        Some(data),
                    ))
                } else {
                    Ok(OperationResult {
                        success: false,
                        message: format!(
                            "pulled {} of {} lojistas ({} new orders), failed: {}",
                            summaries.len() - failed.len(),
                            summaries.len(),
                            ingested,
                            failed.join(", ")
                        ),
                        data: Some(data),
                    })
                }
            }
            Command::TestConnection { lojista_id } => {
                let lojista = self.manager.registry().test_connection(&lojista_id).await?;
                Ok(OperationResult::ok(
                    format!("lojista {} is {}", lojista.name, lojista.status),
                    Some(serde_json::to_value(&lojista)?),
                ))
            }
            Command::RegisterLojista {
                name,
                base_url,
                api_key,
            } => {
                let lojista = self
                    .manager
                    .registry()
                    .register(&name, &base_url, &api_key)
                    .await?;
                Ok(OperationResult::ok(
                    format!("registered {} as {}", lojista.name, lojista.status),
                    Some(serde_json::to_value(&lojista)?),
                ))
            }
            Command::DeleteLojista { lojista_id, force } => {
                self.manager.registry().delete(&lojista_id, force).await?;
                Ok(OperationResult::ok(
                    format!("lojista {lojista_id} deleted"),
                    None,
                ))
            }
            Command::JobStatus { job_id } => {
                let report = self.manager.processor().status(&job_id).await?;
                Ok(OperationResult::ok(
                    format!("job {} is {}", report.job.id, report.job.status),
                    Some(serde_json::to_value(&report)?),
                ))
            }
            Command::ResumeJob { job_id } => {
                let report = self.manager.resume_import(&job_id).await?;
                Ok(OperationResult::ok(
                    format!("job {} resumed, now {}", report.job.id, report.job.status),
                    Some(serde_json::to_value(&report)?),
                ))
            }
            Command::DashboardOverview => {
                let overview = self.manager.dashboard_overview().await?;
                Ok(OperationResult::ok("overview ready", Some(overview)))
            }
            Command::SalesReport { from, to } => {
                let report = self.manager.sales_report(from, to).await?;
                Ok(OperationResult::ok("report ready", Some(report)))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
