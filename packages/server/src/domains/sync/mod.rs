//! Sync domain - the fetch → deliver → mark cycle and its scheduled jobs.

pub mod health;
pub mod orchestrator;
pub mod service;

pub use health::HealthSnapshot;
pub use orchestrator::{CycleReport, SyncConfig, SyncOrchestrator};
pub use service::SyncService;
