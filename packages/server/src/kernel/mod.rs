//! Kernel module - outbound transport, persistence and scheduling.

pub mod http;
pub mod ledger;
pub mod scheduler;
pub mod secret;
pub mod token_store;
pub mod transport;

pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use ledger::{CompactionOutcome, DedupLedger, LedgerLimits};
pub use scheduler::{JobHandler, JobKind, Scheduler, SchedulerConfig};
pub use secret::SecretString;
pub use token_store::{Credentials, TokenStore};
pub use transport::{ThrottledTransport, TransportConfig};
