use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the service, computed on demand and logged.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
    /// Ids held by the ledger
    pub processed_count: usize,
    pub token_valid: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub api_accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_message: Option<String>,
    pub sink_accessible: bool,
    /// Some processed ids live only in memory
    pub ledger_degraded: bool,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.token_valid && self.api_accessible && self.sink_accessible && !self.ledger_degraded
    }
}
