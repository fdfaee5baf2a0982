//! One fetch → deliver → mark cycle.
//!
//! Every event that reaches the sink is recorded in the ledger whatever the
//! outcome, so a record the CRM refuses is never retried on later cycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::health::HealthSnapshot;
use crate::domains::auth::{TokenManager, TokenState};
use crate::domains::leads::{LeadFields, SinkGateway};
use crate::domains::notify::{Notice, Notifier};
use crate::domains::source::{AccountInfo, ApplicationEvent, SourceGateway};
use crate::error::{PersistenceError, SourceError};
use crate::kernel::ledger::{CompactionOutcome, DedupLedger, LedgerLimits};

/// Counts for one cycle. `attempted == succeeded + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pause between two deliveries in the same cycle
    pub event_delay: Duration,
    pub ledger_limits: LedgerLimits,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_delay: Duration::from_secs(2),
            ledger_limits: LedgerLimits::default(),
        }
    }
}

/// Owns the gateways and the ledger for the lifetime of the process.
pub struct SyncOrchestrator {
    source: SourceGateway,
    sink: SinkGateway,
    ledger: DedupLedger,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    started_at: chrono::DateTime<Utc>,
}

impl SyncOrchestrator {
    pub fn new(
        source: SourceGateway,
        sink: SinkGateway,
        ledger: DedupLedger,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            sink,
            ledger,
            notifier,
            config,
            started_at: Utc::now(),
        }
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn tokens(&self) -> &TokenManager {
        self.source.tokens()
    }

    pub fn tokens_mut(&mut self) -> &mut TokenManager {
        self.source.tokens_mut()
    }

    pub async fn verify_access(&mut self) -> Result<AccountInfo, SourceError> {
        self.source.verify_access().await
    }

    /// Run one full cycle. Failures are logged and notified, never returned.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        async {
            info!("sync cycle started");

            let account = match self.source.verify_access().await {
                Ok(account) => account,
                Err(e) => {
                    error!(error = %e, "upstream API not accessible, skipping cycle");
                    self.notifier
                        .notify(Notice::error(format!("Cannot access the HeadHunter API: {e}")))
                        .await;
                    return CycleReport::default();
                }
            };

            let events = match self.source.fetch_new_events(&account, &self.ledger).await {
                Ok(events) => events,
                Err(e) => {
                    error!(error = %e, "fetching applications failed");
                    self.notifier
                        .notify(Notice::error(format!("Failed to fetch applications: {e}")))
                        .await;
                    return CycleReport::default();
                }
            };

            if events.is_empty() {
                info!("no new applications");
                return CycleReport::default();
            }

            let report = self.deliver_all(&events).await;

            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                "sync cycle finished"
            );
            if report.attempted > 0 {
                self.notifier.notify(Notice::Summary(report)).await;
            }
            report
        }
        .instrument(info_span!("sync_cycle", %cycle_id))
        .await
    }

    async fn deliver_all(&mut self, events: &[ApplicationEvent]) -> CycleReport {
        let mut report = CycleReport::default();

        for (position, event) in events.iter().enumerate() {
            if self.ledger.contains(&event.id) {
                debug!(id = %event.id, "already processed, skipping");
                continue;
            }

            if position > 0 && report.attempted > 0 {
                tokio::time::sleep(self.config.event_delay).await;
            }

            report.attempted += 1;
            if self.deliver(event).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }

            self.mark_processed(&event.id).await;
        }

        report
    }

    /// Create the lead and tell the operator how it went.
    async fn deliver(&self, event: &ApplicationEvent) -> bool {
        let fields = LeadFields::from_event(event);

        match self.sink.create_lead(&fields).await {
            Ok(lead_id) => {
                info!(id = %event.id, %lead_id, "application delivered");
                self.notifier
                    .notify(Notice::LeadCreated {
                        lead_id,
                        phone: fields.first_phone(),
                        email: fields.first_email(),
                        name: fields.name,
                        last_name: fields.last_name,
                        title: fields.title,
                    })
                    .await;
                true
            }
            Err(e) => {
                warn!(id = %event.id, error = %e, "application not delivered");
                self.notifier
                    .notify(Notice::Error {
                        name: Some(fields.name),
                        last_name: Some(fields.last_name),
                        reason: e.to_string(),
                    })
                    .await;
                false
            }
        }
    }

    async fn mark_processed(&mut self, id: &str) {
        if let Err(e) = self.ledger.record(id) {
            error!(id, error = %e, "could not persist processed id");
            self.notifier
                .notify(Notice::error(format!(
                    "Could not save processed application {id}; it may be delivered again after a restart: {e}"
                )))
                .await;
            self.ledger.remember(id);
        }
    }

    /// Trim the ledger if it grew past its limits.
    pub async fn compact_ledger(&mut self) -> Result<CompactionOutcome, PersistenceError> {
        let outcome = self.ledger.compact(self.config.ledger_limits)?;
        if let CompactionOutcome::Compacted { kept, removed, .. } = &outcome {
            self.notifier
                .notify(Notice::Log(format!(
                    "Processed-ids ledger compacted: kept {kept}, removed {removed}"
                )))
                .await;
        }
        Ok(outcome)
    }

    pub async fn health_snapshot(&mut self) -> HealthSnapshot {
        let now = Utc::now();
        let tokens = self.source.tokens();
        let token_valid = tokens.state() != TokenState::Unauthenticated
            && !tokens.needs_reauthorization();
        let token_expires_at = tokens.expires_at();

        let (api_accessible, api_message) = if token_valid {
            match self.source.verify_access().await {
                Ok(account) => (true, Some(format!("employer account {}", account.email))),
                Err(e) => (false, Some(e.to_string())),
            }
        } else {
            (false, Some("no usable access token".to_string()))
        };

        HealthSnapshot {
            timestamp: now,
            uptime_secs: (now - self.started_at).num_seconds(),
            processed_count: self.ledger.len(),
            token_valid,
            token_expires_at,
            api_accessible,
            api_message,
            sink_accessible: self.sink.probe().await,
            ledger_degraded: self.ledger.is_degraded(),
        }
    }

    /// Flush the ledger and drop the gateways.
    pub fn close(self) -> Result<(), PersistenceError> {
        self.ledger.close()
    }
}
