//! Picket core library.
//!
//! Holds the two cooperating services and everything they share:
//!
//! - [`plugin_service`]: supervisor for plugin processes. One actor task
//!   owns every plugin session and is the single sequencing point for the
//!   reports plugins push back.
//! - [`task_engine`]: expands plans into plugin sessions, advances them on a
//!   fixed tick through the Plugin Service's HTTP API, and hands finished
//!   scans to a [`scan_database`].
//! - [`runner`] and [`plugins`]: the process side of the plugin contract and
//!   the built-in plugin catalog.

pub mod plugin_service;
pub mod plugins;
pub mod runner;
pub mod scan_database;
pub mod task_engine;

pub use plugin_service::{PluginService, PluginServiceError, PluginServiceHandle};
pub use scan_database::{ScanDatabase, ScanDatabaseError};
pub use task_engine::{TaskEngine, TaskEngineError};
