use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use super::orchestrator::SyncOrchestrator;
use crate::domains::notify::{Notice, Notifier};
use crate::kernel::ledger::CompactionOutcome;
use crate::kernel::scheduler::{JobHandler, JobKind};

/// Scheduled-job handler wrapping the orchestrator.
pub struct SyncService {
    orchestrator: SyncOrchestrator,
    notifier: Arc<dyn Notifier>,
    interval_minutes: u64,
}

impl SyncService {
    pub fn new(orchestrator: SyncOrchestrator, notifier: Arc<dyn Notifier>, interval_minutes: u64) -> Self {
        Self {
            orchestrator,
            notifier,
            interval_minutes,
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn into_orchestrator(self) -> SyncOrchestrator {
        self.orchestrator
    }

    async fn log_health(&mut self) -> anyhow::Result<()> {
        let snapshot = self.orchestrator.health_snapshot().await;
        let json = serde_json::to_string(&snapshot).context("serializing health snapshot")?;
        if snapshot.is_healthy() {
            info!(health = %json, "health check");
        } else {
            warn!(health = %json, "health check found problems");
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for SyncService {
    async fn on_start(&mut self) {
        self.notifier
            .notify(Notice::Started {
                interval_minutes: self.interval_minutes,
            })
            .await;
        if let Err(e) = self.log_health().await {
            warn!(error = %e, "startup health check failed");
        }
    }

    async fn run(&mut self, job: JobKind) -> anyhow::Result<()> {
        match job {
            JobKind::Sync => {
                self.orchestrator.run_cycle().await;
            }
            JobKind::CompactLedger => {
                let outcome = self
                    .orchestrator
                    .compact_ledger()
                    .await
                    .context("ledger compaction failed")?;
                if let CompactionOutcome::Skipped { bytes, entries } = outcome {
                    info!(bytes, entries, "ledger within limits");
                }
            }
            JobKind::HealthCheck => self.log_health().await?,
        }
        Ok(())
    }

    async fn report_failure(&mut self, job: JobKind, reason: String) {
        self.notifier
            .notify(Notice::error(format!("Scheduled job '{job}' failed: {reason}")))
            .await;
    }

    async fn on_shutdown(&mut self) {
        info!("sync service stopped");
        self.notifier.notify(Notice::Stopped).await;
    }
}
