//! Trait surfaces describing how plugins talk to the Plugin Service.
//!
//! A plugin runs in its own OS process. Whatever its execution style, it
//! reports upward through the same capability set ([`PluginCallbacks`]), and
//! its process exit code follows the convention in [`exit_codes`] for the
//! cases where it never gets to report an outcome itself.

pub mod catalog;
pub mod exit_codes;
pub mod plugin;
pub mod report;

pub use catalog::{PluginCatalog, PluginFactory};
pub use exit_codes::{EXIT_CODE_ABORTED, EXIT_CODE_FAILED, EXIT_CODE_SUCCESS};
pub use plugin::{
    BlockingPlugin, ExternalCommand, ExternalProcessPlugin, IncrementalPlugin,
    PluginContext, PluginError, PluginExecution, TickOutcome,
};
pub use report::{CallbackError, PluginCallbacks, Report, Reporter};

/// Frequently used items for plugin implementations.
pub mod prelude {
    pub use super::plugin::{
        BlockingPlugin, ExternalCommand, ExternalProcessPlugin,
        IncrementalPlugin, PluginContext, PluginError, PluginExecution,
        TickOutcome,
    };
    pub use super::report::Reporter;
    pub use picket_model::{
        ArtifactReport, IssueReport, PluginDescriptor, Progress, ReportedError,
        Severity,
    };
}
