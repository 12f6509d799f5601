//! Static plan table, built once at startup.

use std::collections::BTreeMap;
use std::path::Path;

use picket_model::{Plan, PlanDescription, PlanStep};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

const TICKLE_PORTS: &str = "U:53,111,137,T:21-25,139,8080,8443";

#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("failed to read plans file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plans file {path} is not valid TOML: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("plans file {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("plan `{0}` has no steps")]
    EmptyWorkflow(String),
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    plans: Vec<Plan>,
}

/// Immutable lookup of plans by name.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    plans: BTreeMap<String, Plan>,
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlanRegistry {
    pub fn empty() -> Self {
        Self {
            plans: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(Plan {
            name: "tickle".into(),
            description: "Run basic tests and do a very basic port scan using NMAP.".into(),
            workflow: vec![
                PlanStep::new("HSTSPlugin"),
                PlanStep::new("XFrameOptionsPlugin"),
                PlanStep::new("NmapPlugin").with_default("ports", TICKLE_PORTS),
            ],
        });
        registry.insert(Plan {
            name: "basic".into(),
            description: "Run basic header checks.".into(),
            workflow: vec![
                PlanStep::new("HSTSPlugin"),
                PlanStep::new("XFrameOptionsPlugin"),
            ],
        });
        registry.insert(Plan {
            name: "diagnostics".into(),
            description: "Exercise the plugin machinery without touching the network.".into(),
            workflow: vec![
                PlanStep::new("IncrementalAsyncPlugin"),
                PlanStep::new("IssueGeneratingPlugin"),
            ],
        });
        registry
    }

    /// Built-in plans overlaid with the plans in `path`; a file plan with a
    /// built-in name replaces it.
    pub fn with_file(path: &Path) -> Result<Self, PlanFileError> {
        let mut registry = Self::builtin();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| PlanFileError::Io {
            path: display.clone(),
            source,
        })?;
        let file: PlanFile = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&raw).map_err(|source| PlanFileError::Json {
                path: display.clone(),
                source,
            })?
        } else {
            toml::from_str(&raw).map_err(|source| PlanFileError::Toml {
                path: display.clone(),
                source,
            })?
        };
        for plan in file.plans {
            if plan.workflow.is_empty() {
                return Err(PlanFileError::EmptyWorkflow(plan.name));
            }
            info!(plan = %plan.name, steps = plan.workflow.len(), "loaded plan");
            registry.insert(plan);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, plan: Plan) {
        self.plans.insert(plan.name.clone(), plan);
    }

    pub fn get(&self, name: &str) -> Option<&Plan> {
        self.plans.get(name)
    }

    pub fn descriptions(&self) -> Vec<PlanDescription> {
        self.plans.values().map(PlanDescription::from).collect()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tickle_plan() {
        let registry = PlanRegistry::builtin();
        let tickle = registry.get("tickle").unwrap();
        let names: Vec<_> = tickle.workflow.iter().map(|s| s.plugin_name.as_str()).collect();
        assert_eq!(names, vec!["HSTSPlugin", "XFrameOptionsPlugin", "NmapPlugin"]);
        assert_eq!(tickle.workflow[2].configuration["ports"], TICKLE_PORTS);
    }

    #[test]
    fn file_plans_extend_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.toml");
        std::fs::write(
            &path,
            r#"
[[plans]]
name = "basic"
description = "Only HSTS"

[[plans.workflow]]
plugin_name = "HSTSPlugin"

[[plans]]
name = "quick"
description = "Fast diagnostics"

[[plans.workflow]]
plugin_name = "IncrementalAsyncPlugin"
configuration = { interval_ms = 10 }
"#,
        )
        .unwrap();

        let registry = PlanRegistry::with_file(&path).unwrap();
        assert_eq!(registry.get("basic").unwrap().workflow.len(), 1);
        assert_eq!(
            registry.get("quick").unwrap().workflow[0].configuration["interval_ms"],
            10
        );
        assert!(registry.get("tickle").is_some());
    }

    #[test]
    fn empty_workflow_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");
        std::fs::write(
            &path,
            r#"{"plans": [{"name": "nothing", "description": "", "workflow": []}]}"#,
        )
        .unwrap();
        assert!(matches!(
            PlanRegistry::with_file(&path),
            Err(PlanFileError::EmptyWorkflow(name)) if name == "nothing"
        ));
    }
}
