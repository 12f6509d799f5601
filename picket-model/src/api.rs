use std::fmt;

use serde::{Deserialize, Serialize};

use crate::issue::Issue;
use crate::plan::{Plan, PlanDescription};
use crate::scan::{ScanResults, ScanSummary};
use crate::session::{PluginDescriptor, PluginSessionSummary};

/// Stable error codes returned in `{success: false, error: <code>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NoSuchPlugin,
    NoSuchSession,
    UnknownState,
    UnknownStateTransition,
    NoSuchFile,
    FailedToReadFile,
    SessionNotRunning,
    NoSuchPlan,
    NoSuchScan,
    InvalidStateTransition,
    InvalidSessionId,
    InvalidScanId,
    InvalidToken,
    InvalidConfiguration,
    MalformedRequest,
    PluginServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoSuchPlugin => "no-such-plugin",
            Self::NoSuchSession => "no-such-session",
            Self::UnknownState => "unknown-state",
            Self::UnknownStateTransition => "unknown-state-transition",
            Self::NoSuchFile => "no-such-file",
            Self::FailedToReadFile => "failed-to-read-file",
            Self::SessionNotRunning => "session-not-running",
            Self::NoSuchPlan => "no-such-plan",
            Self::NoSuchScan => "no-such-scan",
            Self::InvalidStateTransition => "invalid-state-transition",
            Self::InvalidSessionId => "invalid-session-id",
            Self::InvalidScanId => "invalid-scan-id",
            Self::InvalidToken => "invalid-token",
            Self::InvalidConfiguration => "invalid-configuration",
            Self::MalformedRequest => "malformed-request",
            Self::PluginServiceUnavailable => "plugin-service-unavailable",
            Self::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON envelope shared by both services. The payload's fields are flattened
/// next to `success`, e.g. `{"success": true, "session": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        Self {
            success: false,
            error: Some(code),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    /// `{"success": true}` with no payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }
}

/// Payload-free view of any envelope, for calls whose answer is only
/// success or an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub success: bool,
    #[serde(default)]
    pub error: Option<ErrorCode>,
}

/// `GET /plugins` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsBody {
    pub plugins: Vec<PluginDescriptor>,
}

/// Payload carrying one plugin session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBody {
    pub session: PluginSessionSummary,
}

/// `GET /session/{id}/results` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResultsBody {
    pub session: PluginSessionSummary,
    pub issues: Vec<Issue>,
}

/// `GET /plans` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlansBody {
    pub plans: Vec<PlanDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBody {
    pub plan: Plan,
}

/// Payload carrying one scan summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBody {
    pub scan: ScanSummary,
}

/// `GET /scan/{id}/results` payload. `token` is absent once the scan has
/// nothing more to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResultsBody {
    pub scan: ScanResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
