//! Operator notifications.
//!
//! The core only depends on the [`Notifier`] contract; [`TelegramNotifier`]
//! is the production implementation and [`messages`] holds the text.

pub mod messages;
pub mod telegram;

use async_trait::async_trait;

use crate::domains::sync::CycleReport;

pub use telegram::TelegramNotifier;

/// Something an operator should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    LeadCreated {
        lead_id: String,
        name: String,
        last_name: String,
        phone: Option<String>,
        email: Option<String>,
        title: String,
    },
    Error {
        name: Option<String>,
        last_name: Option<String>,
        reason: String,
    },
    /// Informational system event (token refreshed, ledger compacted, ...)
    Log(String),
    Summary(CycleReport),
    Started {
        interval_minutes: u64,
    },
    Stopped,
}

impl Notice {
    /// An error that is not tied to a particular candidate.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            name: None,
            last_name: None,
            reason: reason.into(),
        }
    }
}

/// Delivers notices. Delivery failures are logged by the implementation and
/// never propagate into the sync cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: Notice);
}
