//! Investigation prompt assembly

use super::catalog::WorkflowCatalog;
use super::types::IncidentRequest;
use crate::models::{DetectedLabels, DetectionField};
use std::fmt::Write;

/// Inputs of the investigation prompt
pub struct PromptContext<'a> {
    pub request: &'a IncidentRequest,
    /// Only set when the labels are proven to describe the investigated resource
    pub detected_labels: Option<&'a DetectedLabels>,
    /// Formatted remediation history, empty when there is none
    pub history: &'a str,
    pub catalog: &'a WorkflowCatalog,
}

pub fn build_investigation_prompt(ctx: &PromptContext<'_>) -> String {
    let mut out = String::new();

    write_incident(&mut out, ctx.request);
    if ctx.request.is_recovery() {
        write_recovery(&mut out, ctx.request);
    }
    if let Some(labels) = ctx.detected_labels {
        write_cluster_characteristics(&mut out, labels);
    }
    if !ctx.history.is_empty() {
        out.push_str(ctx.history);
        out.push('\n');
    }
    write_catalog(&mut out, ctx.catalog);
    out.push_str(RESPONSE_FORMAT);

    out
}

/// Block appended to the prompt of a retry listing what was wrong last time
pub fn build_feedback_block(next_attempt: u32, max_attempts: u32, errors: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## VALIDATION FEEDBACK (attempt {} of {})", next_attempt, max_attempts);
    out.push('\n');
    out.push_str("Your previous response failed validation:\n");
    for error in errors {
        let _ = writeln!(out, "- {}", error);
    }
    out.push('\n');
    out.push_str(
        "Correct these errors and respond again. Only select workflows and container \
         images that appear in the workflow catalog, and supply every required parameter \
         with the declared type.\n",
    );
    out
}

fn write_incident(out: &mut String, request: &IncidentRequest) {
    out.push_str("# Incident Investigation\n\n");
    let _ = writeln!(out, "- Incident ID: {}", request.incident_id);
    if let Some(id) = &request.remediation_id {
        let _ = writeln!(out, "- Remediation ID: {}", id);
    }
    let _ = writeln!(out, "- Signal type: {}", request.signal_type);
    if !request.severity.is_empty() {
        let _ = writeln!(out, "- Severity: {}", request.severity);
    }
    let _ = writeln!(out, "- Signal source: {}", request.signal_source);
    if let Some(rca) = &request.rca_resource {
        let _ = writeln!(out, "- Suspected target: {}", rca);
    }
    if !request.description.is_empty() {
        let _ = writeln!(out, "\n{}", request.description);
    }
    if let Some(error) = &request.error_message {
        let _ = writeln!(out, "\nError message:\n```\n{}\n```", error);
    }
    out.push('\n');
}

fn write_recovery(out: &mut String, request: &IncidentRequest) {
    let Some(previous) = &request.previous_execution else {
        return;
    };
    out.push_str("## Recovery Context\n\n");
    out.push_str("A previous remediation for this incident failed.\n\n");
    let _ = writeln!(out, "- Workflow: {}", previous.workflow_id);
    if let Some(image) = &previous.container_image {
        let _ = writeln!(out, "- Container image: {}", image);
    }
    if let Some(step) = &previous.failed_step {
        let _ = writeln!(out, "- Failed step: {}", step);
    }
    if let Some(n) = previous.attempt_number {
        let _ = writeln!(out, "- Attempt: {}", n);
    }
    let _ = writeln!(out, "- Failure reason: {}", previous.failure_reason);
    out.push_str(
        "\nDo not select the same workflow again unless the failure reason shows it \
         can now succeed. Prefer an alternative or escalate.\n\n",
    );
}

fn write_cluster_characteristics(out: &mut String, labels: &DetectedLabels) {
    out.push_str("## Cluster Characteristics\n\n");

    let mut line = |field: DetectionField, value: String| {
        if labels.detection_failed(field) {
            let _ = writeln!(out, "- {}: unknown (detection failed)", field);
        } else {
            let _ = writeln!(out, "- {}: {}", field, value);
        }
    };

    let gitops = if labels.git_ops_managed {
        format!("true ({})", labels.git_ops_tool)
    } else {
        "false".to_string()
    };
    line(DetectionField::GitOpsManaged, gitops);
    line(DetectionField::PdbProtected, labels.pdb_protected.to_string());
    line(DetectionField::HpaEnabled, labels.hpa_enabled.to_string());
    line(DetectionField::Stateful, labels.stateful.to_string());
    line(DetectionField::HelmManaged, labels.helm_managed.to_string());
    line(DetectionField::NetworkIsolated, labels.network_isolated.to_string());
    let mesh = match labels.service_mesh.to_string() {
        s if s.is_empty() => "none".to_string(),
        s => s,
    };
    line(DetectionField::ServiceMesh, mesh);

    out.push_str(
        "\nGitOps-managed resources are reconciled from git: prefer workflows that change \
         the source of truth. PDB-protected and stateful workloads need disruption-aware \
         workflows.\n\n",
    );
}

fn write_catalog(out: &mut String, catalog: &WorkflowCatalog) {
    out.push_str("## Workflow Catalog\n\n");
    if catalog.is_empty() {
        out.push_str("No remediation workflows are available.\n\n");
        return;
    }
    for workflow in &catalog.workflows {
        let _ = writeln!(out, "### {}", workflow.workflow_id);
        if !workflow.name.is_empty() {
            let _ = writeln!(out, "- Name: {}", workflow.name);
        }
        if !workflow.description.is_empty() {
            let _ = writeln!(out, "- Description: {}", workflow.description);
        }
        let _ = writeln!(out, "- Container image: {}", workflow.container_image);
        if !workflow.parameters.is_empty() {
            let params: Vec<String> = workflow
                .parameters
                .iter()
                .map(|p| {
                    let required = if p.required { ", required" } else { "" };
                    format!("{} ({}{})", p.name, p.param_type.as_str(), required)
                })
                .collect();
            let _ = writeln!(out, "- Parameters: {}", params.join(", "));
        }
        out.push('\n');
    }
}

const RESPONSE_FORMAT: &str = r#"## Response Format

Finish your analysis with a single ```json block of this shape:

```json
{
  "investigation_outcome": "actionable | resolved | inconclusive",
  "root_cause_analysis": {
    "summary": "...",
    "severity": "...",
    "contributing_factors": ["..."],
    "affectedResource": {"kind": "...", "namespace": "...", "name": "..."}
  },
  "selected_workflow": {
    "workflow_id": "...",
    "container_image": "...",
    "parameters": {},
    "rationale": "..."
  },
  "alternative_workflows": [],
  "confidence": 0.0
}
```

Use "resolved" only when the problem has cleared on its own, and "inconclusive"
when the state of the system cannot be determined. Set selected_workflow to null
when no catalog workflow fits.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::catalog::WorkflowDefinition;
    use crate::investigation::types::PreviousExecution;
    use crate::models::ResourceRef;

    fn request() -> IncidentRequest {
        IncidentRequest {
            incident_id: "inc-42".into(),
            remediation_id: Some("rr-42".into()),
            signal_type: "OOMKilled".into(),
            severity: "critical".into(),
            signal_source: ResourceRef::namespaced("Pod", "prod", "api-7d9f-x2"),
            rca_resource: None,
            description: "Container api restarted 5 times".into(),
            error_message: None,
            current_spec_hash: None,
            previous_execution: None,
        }
    }

    fn catalog() -> WorkflowCatalog {
        WorkflowCatalog::new(vec![WorkflowDefinition {
            workflow_id: "increase-memory".into(),
            name: "Increase memory limit".into(),
            description: String::new(),
            container_image: "quay.io/kubernaut/increase-memory:v1".into(),
            parameters: Vec::new(),
        }])
    }

    #[test]
    fn test_prompt_sections() {
        let request = request();
        let catalog = catalog();
        let prompt = build_investigation_prompt(&PromptContext {
            request: &request,
            detected_labels: None,
            history: "",
            catalog: &catalog,
        });

        assert!(prompt.contains("- Incident ID: inc-42"));
        assert!(prompt.contains("- Signal source: Pod/prod/api-7d9f-x2"));
        assert!(prompt.contains("### increase-memory"));
        assert!(prompt.contains("## Response Format"));
        assert!(!prompt.contains("## Cluster Characteristics"));
        assert!(!prompt.contains("## Recovery Context"));
    }

    #[test]
    fn test_recovery_and_history_sections() {
        let mut request = request();
        request.previous_execution = Some(PreviousExecution {
            workflow_id: "restart-pod".into(),
            container_image: None,
            failure_reason: "pod kept crashing after restart".into(),
            failed_step: None,
            attempt_number: Some(1),
        });
        let catalog = catalog();
        let prompt = build_investigation_prompt(&PromptContext {
            request: &request,
            detected_labels: None,
            history: "## Remediation History\n",
            catalog: &catalog,
        });

        let recovery = prompt.find("## Recovery Context").unwrap();
        let history = prompt.find("## Remediation History").unwrap();
        let workflows = prompt.find("## Workflow Catalog").unwrap();
        assert!(recovery < history && history < workflows);
        assert!(prompt.contains("- Failure reason: pod kept crashing after restart"));
    }

    #[test]
    fn test_failed_detections_reported_as_unknown() {
        let mut labels = DetectedLabels {
            git_ops_managed: true,
            git_ops_tool: crate::models::GitOpsTool::ArgoCd,
            ..Default::default()
        };
        labels.failed_detections.insert(DetectionField::PdbProtected);
        let request = request();
        let catalog = catalog();

        let prompt = build_investigation_prompt(&PromptContext {
            request: &request,
            detected_labels: Some(&labels),
            history: "",
            catalog: &catalog,
        });

        assert!(prompt.contains("- gitOpsManaged: true (argocd)"));
        assert!(prompt.contains("- pdbProtected: unknown (detection failed)"));
        assert!(prompt.contains("- serviceMesh: none"));
    }

    #[test]
    fn test_feedback_block() {
        let block = build_feedback_block(
            2,
            3,
            &["unknown workflow_id 'x'".to_string(), "missing required parameter 'A'".to_string()],
        );

        assert!(block.starts_with("## VALIDATION FEEDBACK (attempt 2 of 3)"));
        assert!(block.contains("- unknown workflow_id 'x'\n- missing required parameter 'A'"));
    }
}
