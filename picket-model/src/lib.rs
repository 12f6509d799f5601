//! Core data model definitions shared across Picket crates.
//!
//! Everything here is plain serde data: the records the Plugin Service keeps
//! for each plugin process, the scan summaries the Task Engine persists, and
//! the JSON envelope both services answer with.
#![allow(missing_docs)]

pub mod api;
pub mod cursor;
pub mod error;
pub mod ids;
pub mod issue;
pub mod plan;
pub mod scan;
pub mod session;

pub use api::{
    Acknowledgement, ApiResponse, ErrorCode, PlanBody, PlansBody, PluginsBody, ScanBody,
    ScanResultsBody, SessionBody, SessionResultsBody,
};
pub use cursor::ResultsCursor;
pub use error::{ModelError, Result as ModelResult};
pub use ids::{FileId, IssueId, ScanId, SessionId};
pub use issue::{
    ArtifactReport, FileRecord, Issue, IssueReport, Progress, ReportedError,
    Severity,
};
pub use plan::{Plan, PlanDescription, PlanStep};
pub use scan::{
    PluginSessionRef, ScanCommand, ScanResults, ScanState, ScanSummary,
    SessionResultsView,
};
pub use session::{
    PluginDescriptor, PluginSessionState, PluginSessionSummary, SessionCommand,
};

/// JSON object used for plugin and scan configuration.
pub type Configuration = serde_json::Map<String, serde_json::Value>;
