//! Leads domain - delivery of application events into the CRM.

pub mod gateway;
pub mod mapping;

pub use gateway::SinkGateway;
pub use mapping::{LeadFields, MultiField};
