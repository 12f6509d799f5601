use serde::{Deserialize, Serialize};

use crate::Configuration;

/// A named, ordered template of plugin steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub description: String,
    pub workflow: Vec<PlanStep>,
}

/// One plugin invocation within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub plugin_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub configuration: Configuration,
}

impl PlanStep {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            description: None,
            configuration: Configuration::new(),
        }
    }

    pub fn with_default(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    /// Step defaults overlaid by caller-supplied overrides.
    pub fn merged_configuration(&self, overrides: &Configuration) -> Configuration {
        let mut merged = self.configuration.clone();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Listing entry for `GET /plans`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDescription {
    pub name: String,
    pub description: String,
}

impl From<&Plan> for PlanDescription {
    fn from(plan: &Plan) -> Self {
        Self {
            name: plan.name.clone(),
            description: plan.description.clone(),
        }
    }
}
