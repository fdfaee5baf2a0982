// Process wiring shared by the binary and the integration tests
pub mod app;

pub use app::*;
