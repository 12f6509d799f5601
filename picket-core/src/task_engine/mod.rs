//! Task Engine: turns plans into scans and drives their plugin sessions
//! through the Plugin Service on a fixed tick.

mod artifacts;
pub mod client;
mod coordinator;
mod engine;
pub mod error;
pub mod plans;

pub use artifacts::ArtifactStore;
pub use client::{ClientError, HttpPluginServiceClient, PluginServiceApi};
pub use engine::TaskEngine;
pub use error::TaskEngineError;
pub use plans::{PlanFileError, PlanRegistry};
