pub mod auth;
pub mod leads;
pub mod notify;
pub mod source;
pub mod sync;
