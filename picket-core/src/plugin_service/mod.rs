//! Plugin Service: supervises one OS process per plugin session.

pub mod error;
pub mod process;
pub mod session;
pub mod supervisor;

pub use error::PluginServiceError;
pub use process::ProcessExit;
pub use session::{PluginSession, StopReason};
pub use supervisor::{PluginService, PluginServiceHandle, SessionReport};

/// Environment variable carrying the session id into a runner process.
pub const ENV_SESSION_ID: &str = "PICKET_PLUGIN_SESSION_ID";
/// Environment variable carrying the Plugin Service base URL into a runner.
pub const ENV_SERVICE_API: &str = "PICKET_PLUGIN_SERVICE_API";
