// HeadHunter -> Bitrix24 sync - core library
//
// Pulls job applications from the recruitment platform, creates one CRM lead
// per application exactly once, and reports to operators over Telegram.
// Components are organized per-domain in domains/*, infrastructure in kernel/.

pub mod config;
pub mod domains;
pub mod error;
pub mod kernel;
pub mod server;
pub mod testing;

pub use config::*;
