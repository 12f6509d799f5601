pub mod shutdown;
pub mod telemetry;

pub use shutdown::{shutdown_signal, shutdown_token};
pub use telemetry::init_tracing;
