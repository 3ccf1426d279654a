//! Remediation workflow catalog

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
        }
    }
}

/// Declared input of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub container_image: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl WorkflowDefinition {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Workflows the LLM may select from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCatalog {
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

impl WorkflowCatalog {
    pub fn new(workflows: Vec<WorkflowDefinition>) -> Self {
        Self { workflows }
    }

    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.iter().find(|w| w.workflow_id == workflow_id)
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// Source of the workflow catalog snapshot used for one investigation
#[async_trait]
pub trait WorkflowCatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> anyhow::Result<WorkflowCatalog>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_wire_format() {
        let catalog: WorkflowCatalog = serde_json::from_value(json!({
            "workflows": [{
                "workflowId": "restart-pod",
                "name": "Restart pod",
                "containerImage": "quay.io/kubernaut/restart:v1.2",
                "parameters": [
                    {"name": "NAMESPACE", "type": "string", "required": true},
                    {"name": "GRACE", "type": "integer", "minimum": 0, "maximum": 300},
                    {"name": "MODE", "type": "string", "enum": ["soft", "hard"]}
                ]
            }]
        }))
        .unwrap();

        let workflow = catalog.get("restart-pod").unwrap();
        assert!(workflow.parameter("NAMESPACE").unwrap().required);
        assert_eq!(workflow.parameter("GRACE").unwrap().maximum, Some(300.0));
        assert_eq!(
            workflow.parameter("MODE").unwrap().allowed_values.as_deref(),
            Some(&["soft".to_string(), "hard".to_string()][..])
        );
        assert!(catalog.get("scale-up").is_none());
    }
}
