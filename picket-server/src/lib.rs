//! # Picket Server
//!
//! HTTP surfaces for the two Picket services and the process entry points
//! that host them:
//!
//! - `picket-plugin-service` serves [`routes::plugin_service_router`] in
//!   front of a [`picket_core::PluginServiceHandle`].
//! - `picket-task-engine` serves [`routes::task_engine_router`] in front of a
//!   [`picket_core::TaskEngine`].
//! - `picket-plugin-runner` is the program the Plugin Service launches for
//!   every plugin session.
//!
//! Every answer is the JSON envelope `{success, error?, ...payload}`; the
//! HTTP status carries the coarse class of failure and the `error` field the
//! stable code.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use errors::{ApiError, ApiResult};
pub use routes::{plugin_service_router, task_engine_router};
