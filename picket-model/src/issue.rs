use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FileId, IssueId};

/// Severity of a finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "low", alias = "LOW")]
    Low,
    #[serde(alias = "info", alias = "INFO", alias = "Informational")]
    Info,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
        };
        f.write_str(label)
    }
}

/// A finding as produced by a plugin, before the Plugin Service ingests it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IssueReport {
    pub summary: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub further_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IssueReport {
    pub fn new(summary: impl Into<String>, severity: Severity) -> Self {
        Self {
            summary: summary.into(),
            severity,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }
}

/// An ingested finding. `id` and `date` are assigned by the Plugin Service
/// when the report arrives; `date` is the ordering key for incremental
/// retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub report: IssueReport,
}

/// Last progress reported by a plugin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f32,
    #[serde(default)]
    pub description: String,
}

impl Progress {
    pub fn new(percentage: f32, description: impl Into<String>) -> Self {
        Self {
            percentage: percentage.clamp(0.0, 100.0),
            description: description.into(),
        }
    }
}

/// An error a plugin reports about itself, or one the supervisor records on
/// its behalf (spawn failure, watchdog expiry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ReportedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Body of an artifact report: a logical name plus the files that make it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

/// One retrievable file, created per reported artifact path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub path: PathBuf,
}

impl FileRecord {
    /// File name used when the file is materialized elsewhere, falling back
    /// to the record id when the path has no usable final component.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_accepts_lowercase_aliases() {
        let parsed: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(parsed, Severity::High);
        let parsed: Severity = serde_json::from_str("\"Info\"").unwrap();
        assert_eq!(parsed, Severity::Info);
    }

    #[test]
    fn issue_flattens_report_fields() {
        let issue = Issue {
            id: IssueId::new(),
            date: Utc::now(),
            report: IssueReport::new("Missing header", Severity::Medium)
                .with_url("https://example.test"),
        };
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["summary"], "Missing header");
        assert_eq!(value["severity"], "Medium");
        assert_eq!(value["urls"][0], "https://example.test");
        assert!(value.get("solution").is_none());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(Progress::new(140.0, "").percentage, 100.0);
        assert_eq!(Progress::new(-3.0, "").percentage, 0.0);
    }
}
