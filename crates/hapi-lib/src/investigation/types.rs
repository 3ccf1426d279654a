//! Incident requests, LLM results and the response returned to callers

use crate::models::{DetectedLabels, HumanReviewReason, ResourceRef, ReviewVerdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Incident to investigate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRequest {
    pub incident_id: String,
    #[serde(default)]
    pub remediation_id: Option<String>,
    pub signal_type: String,
    #[serde(default)]
    pub severity: String,
    /// Resource the signal fired on
    pub signal_source: ResourceRef,
    /// Remediation target when already known to the caller
    #[serde(default)]
    pub rca_resource: Option<ResourceRef>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub current_spec_hash: Option<String>,
    /// Present when a previous remediation failed; makes this a recovery analysis
    #[serde(default)]
    pub previous_execution: Option<PreviousExecution>,
}

impl IncidentRequest {
    /// Resource labels are detected for: the RCA target, else the signal source
    pub fn target_resource(&self) -> &ResourceRef {
        self.rca_resource.as_ref().unwrap_or(&self.signal_source)
    }

    pub fn is_recovery(&self) -> bool {
        self.previous_execution.is_some()
    }
}

/// A remediation attempt that already failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousExecution {
    pub workflow_id: String,
    #[serde(default)]
    pub container_image: Option<String>,
    pub failure_reason: String,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub attempt_number: Option<u32>,
}

/// Outcome the LLM reports for its own investigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationOutcome {
    /// The problem resolved itself; nothing to execute
    Resolved,
    /// The LLM could not determine the state of the system
    Inconclusive,
    #[default]
    Actionable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    #[serde(
        default,
        rename = "affectedResource",
        alias = "affected_resource",
        skip_serializing_if = "Option::is_none"
    )]
    pub affected_resource: Option<ResourceRef>,
}

impl RootCauseAnalysis {
    /// An affected resource with a kind was identified
    pub fn has_target(&self) -> bool {
        self.affected_resource
            .as_ref()
            .map(ResourceRef::has_kind)
            .unwrap_or(false)
    }
}

/// Workflow chosen by the LLM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSelection {
    pub workflow_id: String,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Structured result parsed out of the LLM's analysis text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmAnalysis {
    #[serde(default)]
    pub investigation_outcome: InvestigationOutcome,
    #[serde(default)]
    pub root_cause_analysis: Option<RootCauseAnalysis>,
    #[serde(default)]
    pub selected_workflow: Option<WorkflowSelection>,
    #[serde(default)]
    pub alternative_workflows: Vec<WorkflowSelection>,
    #[serde(default)]
    pub confidence: f64,
}

impl LlmAnalysis {
    pub fn affected_resource(&self) -> Option<&ResourceRef> {
        self.root_cause_analysis
            .as_ref()
            .and_then(|rca| rca.affected_resource.as_ref())
    }
}

/// One pass of the self-correction loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    pub attempt_number: u32,
    pub errors: Vec<String>,
    pub is_valid: bool,
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of an investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    Resolved,
    Inconclusive,
    WorkflowSelected,
    /// Actionable, but no catalog workflow fits
    NoWorkflow,
    ValidationExhausted,
}

impl FinalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalOutcome::Resolved => "resolved",
            FinalOutcome::Inconclusive => "inconclusive",
            FinalOutcome::WorkflowSelected => "workflow_selected",
            FinalOutcome::NoWorkflow => "no_workflow",
            FinalOutcome::ValidationExhausted => "validation_exhausted",
        }
    }
}

/// Result of the self-correction loop, refined by the review policy
#[derive(Debug, Clone)]
pub struct InvestigationResult {
    /// Raw analysis text of the final attempt
    pub raw_analysis: String,
    /// Final attempt's structured result; `None` if it could not be parsed
    pub analysis: Option<LlmAnalysis>,
    pub review: ReviewVerdict,
    /// Set when every attempt failed validation
    pub exhausted_reason: Option<HumanReviewReason>,
    pub validation_attempts: Vec<ValidationAttempt>,
    pub warnings: Vec<String>,
}

impl InvestigationResult {
    pub fn llm_calls(&self) -> u32 {
        self.validation_attempts.len() as u32
    }

    pub fn confidence(&self) -> f64 {
        self.analysis.as_ref().map(|a| a.confidence).unwrap_or(0.0)
    }

    pub fn outcome(&self) -> FinalOutcome {
        if self.exhausted_reason.is_some() {
            return FinalOutcome::ValidationExhausted;
        }
        match &self.analysis {
            None => FinalOutcome::ValidationExhausted,
            Some(a) => match a.investigation_outcome {
                InvestigationOutcome::Resolved => FinalOutcome::Resolved,
                InvestigationOutcome::Inconclusive => FinalOutcome::Inconclusive,
                InvestigationOutcome::Actionable if a.selected_workflow.is_some() => {
                    FinalOutcome::WorkflowSelected
                }
                InvestigationOutcome::Actionable => FinalOutcome::NoWorkflow,
            },
        }
    }
}

/// LLM call settings forwarded to the investigator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default)]
    pub toolsets: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            toolsets: vec!["kubernetes/core".to_string(), "kubernetes/logs".to_string()],
            mcp_servers: Vec::new(),
        }
    }
}

/// Per-request configuration snapshot
#[derive(Debug, Clone)]
pub struct InvestigationConfig {
    pub llm: LlmConfig,
    pub confidence_threshold: f64,
    pub llm_timeout: Duration,
    pub k8s_query_timeout: Duration,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            confidence_threshold: 0.7,
            llm_timeout: Duration::from_secs(120),
            k8s_query_timeout: Duration::from_secs(5),
        }
    }
}

/// Response returned for an analyzed incident
#[derive(Debug, Clone, Serialize)]
pub struct IncidentResponse {
    pub incident_id: String,
    pub analysis: String,
    pub root_cause_analysis: Option<RootCauseAnalysis>,
    pub selected_workflow: Option<WorkflowSelection>,
    pub alternative_workflows: Vec<WorkflowSelection>,
    pub confidence: f64,
    pub investigation_outcome: FinalOutcome,
    #[serde(flatten)]
    pub review: ReviewVerdict,
    /// Attached only when the relationship to the affected resource is proven
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_labels: Option<DetectedLabels>,
    pub validation_attempts_history: Vec<ValidationAttempt>,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults_and_target() {
        let request: IncidentRequest = serde_json::from_value(json!({
            "incident_id": "inc-1",
            "signal_type": "OOMKilled",
            "signal_source": {"kind": "Pod", "namespace": "prod", "name": "api-7d9f-x2"}
        }))
        .unwrap();

        assert!(!request.is_recovery());
        assert!(request.rca_resource.is_none());
        assert_eq!(request.target_resource().kind, "Pod");
    }

    #[test]
    fn test_affected_resource_accepts_both_spellings() {
        let camel: RootCauseAnalysis = serde_json::from_value(json!({
            "summary": "memory leak",
            "affectedResource": {"kind": "Deployment", "namespace": "prod", "name": "api"}
        }))
        .unwrap();
        let snake: RootCauseAnalysis = serde_json::from_value(json!({
            "summary": "memory leak",
            "affected_resource": {"kind": "Deployment", "namespace": "prod", "name": "api"}
        }))
        .unwrap();

        assert_eq!(camel, snake);
        assert!(camel.has_target());
        assert!(!RootCauseAnalysis::default().has_target());
    }

    #[test]
    fn test_outcome_defaults_to_actionable() {
        let analysis: LlmAnalysis = serde_json::from_value(json!({"confidence": 0.8})).unwrap();
        assert_eq!(analysis.investigation_outcome, InvestigationOutcome::Actionable);
    }

    #[test]
    fn test_final_outcome() {
        let mut result = InvestigationResult {
            raw_analysis: String::new(),
            analysis: Some(LlmAnalysis::default()),
            review: ReviewVerdict::automatic(),
            exhausted_reason: None,
            validation_attempts: Vec::new(),
            warnings: Vec::new(),
        };
        assert_eq!(result.outcome(), FinalOutcome::NoWorkflow);

        result.analysis = Some(LlmAnalysis {
            selected_workflow: Some(WorkflowSelection::default()),
            ..Default::default()
        });
        assert_eq!(result.outcome(), FinalOutcome::WorkflowSelected);

        result.exhausted_reason = Some(HumanReviewReason::WorkflowNotFound);
        assert_eq!(result.outcome(), FinalOutcome::ValidationExhausted);
    }

    #[test]
    fn test_response_flattens_review() {
        let response = IncidentResponse {
            incident_id: "inc-1".into(),
            analysis: String::new(),
            root_cause_analysis: None,
            selected_workflow: None,
            alternative_workflows: Vec::new(),
            confidence: 0.0,
            investigation_outcome: FinalOutcome::NoWorkflow,
            review: ReviewVerdict::required(HumanReviewReason::NoMatchingWorkflows),
            detected_labels: None,
            validation_attempts_history: Vec::new(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["needs_human_review"], true);
        assert_eq!(value["human_review_reason"], "no_matching_workflows");
        assert_eq!(value["investigation_outcome"], "no_workflow");
        assert!(value.get("detected_labels").is_none());
    }
}
