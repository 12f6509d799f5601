//! Shared configuration library for Picket.
//!
//! Both services load their settings through [`ConfigLoader`]: a `.env` file
//! (optional), then a TOML or JSON config file, then `PICKET_*` environment
//! variables. Command-line flags are applied by the binaries on top of the
//! result. Composition validates the merged values so a service never starts
//! with a half-usable configuration.

pub mod loader;
pub mod models;
pub mod util;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::{
    ArtifactsConfig, CoordinatorConfig, DatabaseConfig, DatabaseKind,
    PluginServiceClientConfig, PluginServiceConfig, RunnerConfig, ServerConfig,
    SupervisionConfig, TaskEngineConfig,
};
