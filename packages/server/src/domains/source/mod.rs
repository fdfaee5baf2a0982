//! Source domain - application events from the recruitment platform.
//!
//! ```text
//! GET /me ──► employer id ──► GET /vacancies (paged) ──► GET /negotiations per posting (paged)
//!                                                                  │
//!                                                  ledger filter ──┴──► ApplicationEvent
//! ```

pub mod gateway;
pub mod types;

pub use gateway::{SourceGateway, PAGE_SIZE};
pub use types::{AccountInfo, ApplicationEvent, Negotiation, Resume};
