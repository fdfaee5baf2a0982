//! Cooperative single-task scheduler.
//!
//! Jobs run one at a time on the caller's task, in declaration order when
//! several are due together. Between passes the loop sleeps at most
//! `poll_interval`, so a due job starts no later than one poll after its
//! deadline.
//!
//! ```text
//! on_start ─────────────► ┌─────────────────────────────────────┐
//!                         │ run every due job (errors caught)   │
//!                         │ sleep min(poll, next due)  ◄─ stop? │──► on_shutdown
//!                         └─────────────────────────────────────┘
//! ```
//!
//! Shutdown is observed only between passes; a running job always finishes.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Sync,
    CompactLedger,
    HealthCheck,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "sync",
            Self::CompactLedger => "compact_ledger",
            Self::HealthCheck => "health_check",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sync_every: Duration,
    pub compact_every: Duration,
    pub health_every: Duration,
    /// Longest single sleep between checks for due jobs
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_every: Duration::from_secs(10 * 60),
            compact_every: Duration::from_secs(24 * 60 * 60),
            health_every: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// The work the scheduler drives.
#[async_trait]
pub trait JobHandler: Send {
    async fn on_start(&mut self) {}

    async fn run(&mut self, job: JobKind) -> anyhow::Result<()>;

    /// Called after a job returned an error or panicked.
    async fn report_failure(&mut self, _job: JobKind, _reason: String) {}

    async fn on_shutdown(&mut self) {}
}

struct Slot {
    job: JobKind,
    every: Duration,
    next_due: Instant,
}

pub struct Scheduler<H> {
    handler: H,
    slots: Vec<Slot>,
    poll_interval: Duration,
}

impl<H: JobHandler> Scheduler<H> {
    /// The sync job is due immediately; maintenance jobs first run one
    /// period after startup.
    pub fn new(handler: H, config: SchedulerConfig) -> Self {
        let now = Instant::now();
        let slots = vec![
            Slot {
                job: JobKind::Sync,
                every: config.sync_every,
                next_due: now,
            },
            Slot {
                job: JobKind::CompactLedger,
                every: config.compact_every,
                next_due: now + config.compact_every,
            },
            Slot {
                job: JobKind::HealthCheck,
                every: config.health_every,
                next_due: now + config.health_every,
            },
        ];

        Self {
            handler,
            slots,
            poll_interval: config.poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Run until `shutdown` is cancelled, then hand the handler back.
    pub async fn run(mut self, shutdown: CancellationToken) -> H {
        info!(jobs = self.slots.len(), "scheduler started");
        self.handler.on_start().await;

        loop {
            self.run_pending(Instant::now()).await;

            let wait = self.until_next_due().min(self.poll_interval);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("scheduler stopping");
        self.handler.on_shutdown().await;
        self.handler
    }

    /// Run every job due at `now`, sequentially. Returns how many ran.
    pub async fn run_pending(&mut self, now: Instant) -> usize {
        let mut ran = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].next_due > now {
                continue;
            }
            let job = self.slots[index].job;
            self.execute(job).await;
            self.slots[index].next_due = Instant::now() + self.slots[index].every;
            ran += 1;
        }
        ran
    }

    fn until_next_due(&self) -> Duration {
        let now = Instant::now();
        self.slots
            .iter()
            .map(|slot| slot.next_due.saturating_duration_since(now))
            .min()
            .unwrap_or(self.poll_interval)
    }

    async fn execute(&mut self, job: JobKind) {
        debug!(%job, "running scheduled job");
        let outcome = AssertUnwindSafe(self.handler.run(job)).catch_unwind().await;

        let reason = match outcome {
            Ok(Ok(())) => {
                debug!(%job, "scheduled job finished");
                return;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        error!(%job, error = %reason, "scheduled job failed");
        self.handler.report_failure(job, reason).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
