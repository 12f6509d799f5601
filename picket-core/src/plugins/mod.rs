//! Plugins shipped with Picket.

pub mod diagnostics;
pub mod nmap;
pub mod web;

use picket_contracts::{PluginCatalog, PluginExecution, PluginFactory};

pub use diagnostics::{
    AbortedPlugin, ExceptionPlugin, FailedPlugin, IncrementalAsyncPlugin,
    IncrementalBlockingPlugin, IssueGeneratingPlugin, LongRunningPlugin, TimingOutPlugin,
};
pub use nmap::NmapPlugin;
pub use web::{HstsPlugin, XFrameOptionsPlugin};

const VERSION: &str = env!("CARGO_PKG_VERSION");

macro_rules! blocking {
    ($plugin:ty) => {
        || PluginExecution::Blocking(Box::new(<$plugin>::default()))
    };
}

/// Every built-in plugin, keyed by the name plans refer to.
pub fn builtin_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog
        .register(PluginFactory::new(
            "HSTSPlugin",
            VERSION,
            "picket::plugins::web::HstsPlugin",
            blocking!(HstsPlugin),
        ))
        .register(PluginFactory::new(
            "XFrameOptionsPlugin",
            VERSION,
            "picket::plugins::web::XFrameOptionsPlugin",
            blocking!(XFrameOptionsPlugin),
        ))
        .register(PluginFactory::new(
            "NmapPlugin",
            VERSION,
            "picket::plugins::nmap::NmapPlugin",
            || PluginExecution::ExternalProcess(Box::new(NmapPlugin::default())),
        ))
        .register(PluginFactory::new(
            "AbortedPlugin",
            VERSION,
            "picket::plugins::diagnostics::AbortedPlugin",
            blocking!(AbortedPlugin),
        ))
        .register(PluginFactory::new(
            "FailedPlugin",
            VERSION,
            "picket::plugins::diagnostics::FailedPlugin",
            blocking!(FailedPlugin),
        ))
        .register(PluginFactory::new(
            "ExceptionPlugin",
            VERSION,
            "picket::plugins::diagnostics::ExceptionPlugin",
            blocking!(ExceptionPlugin),
        ))
        .register(PluginFactory::new(
            "LongRunningPlugin",
            VERSION,
            "picket::plugins::diagnostics::LongRunningPlugin",
            blocking!(LongRunningPlugin),
        ))
        .register(PluginFactory::new(
            "TimingOutPlugin",
            VERSION,
            "picket::plugins::diagnostics::TimingOutPlugin",
            blocking!(TimingOutPlugin),
        ))
        .register(PluginFactory::new(
            "IncrementalBlockingPlugin",
            VERSION,
            "picket::plugins::diagnostics::IncrementalBlockingPlugin",
            blocking!(IncrementalBlockingPlugin),
        ))
        .register(PluginFactory::new(
            "IncrementalAsyncPlugin",
            VERSION,
            "picket::plugins::diagnostics::IncrementalAsyncPlugin",
            || PluginExecution::Incremental(Box::new(IncrementalAsyncPlugin::default())),
        ))
        .register(PluginFactory::new(
            "IssueGeneratingPlugin",
            VERSION,
            "picket::plugins::diagnostics::IssueGeneratingPlugin",
            blocking!(IssueGeneratingPlugin),
        ));
    catalog
}
