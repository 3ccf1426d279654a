//! Validation of the LLM's workflow selection against the catalog

use super::catalog::{ParameterSpec, ParameterType, WorkflowCatalog, WorkflowDefinition};
use super::types::{InvestigationOutcome, LlmAnalysis};
use crate::models::HumanReviewReason;
use serde_json::Value;
use std::fmt;

/// A single problem found in an LLM result
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    Unparseable(String),
    /// Confidence outside `[0, 1]`, for example a percentage
    ConfidenceOutOfRange(f64),
    WorkflowNotFound {
        workflow_id: String,
    },
    ImageMismatch {
        workflow_id: String,
        expected: String,
        actual: String,
    },
    MissingParameter {
        name: String,
    },
    UnknownParameter {
        name: String,
    },
    WrongParameterType {
        name: String,
        expected: ParameterType,
    },
    ValueNotAllowed {
        name: String,
        allowed: Vec<String>,
    },
    OutOfRange {
        name: String,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
}

impl ValidationIssue {
    fn is_parameter_issue(&self) -> bool {
        matches!(
            self,
            ValidationIssue::MissingParameter { .. }
                | ValidationIssue::UnknownParameter { .. }
                | ValidationIssue::WrongParameterType { .. }
                | ValidationIssue::ValueNotAllowed { .. }
                | ValidationIssue::OutOfRange { .. }
        )
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Unparseable(detail) => {
                write!(f, "LLM response could not be parsed: {}", detail)
            }
            ValidationIssue::ConfidenceOutOfRange(confidence) => write!(
                f,
                "confidence {} is out of range: must be between 0.0 and 1.0",
                confidence
            ),
            ValidationIssue::WorkflowNotFound { workflow_id } => {
                write!(f, "unknown workflow_id '{}': not in the workflow catalog", workflow_id)
            }
            ValidationIssue::ImageMismatch {
                workflow_id,
                expected,
                actual,
            } => write!(
                f,
                "wrong container image '{}' for workflow '{}': expected '{}'",
                actual, workflow_id, expected
            ),
            ValidationIssue::MissingParameter { name } => {
                write!(f, "missing required parameter '{}'", name)
            }
            ValidationIssue::UnknownParameter { name } => {
                write!(f, "unknown parameter '{}' is not declared by the workflow", name)
            }
            ValidationIssue::WrongParameterType { name, expected } => {
                write!(f, "parameter '{}' must be of type {}", name, expected.as_str())
            }
            ValidationIssue::ValueNotAllowed { name, allowed } => write!(
                f,
                "parameter '{}' must be one of: {}",
                name,
                allowed.join(", ")
            ),
            ValidationIssue::OutOfRange {
                name,
                minimum,
                maximum,
            } => match (minimum, maximum) {
                (Some(min), Some(max)) => {
                    write!(f, "parameter '{}' must be between {} and {}", name, min, max)
                }
                (Some(min), None) => write!(f, "parameter '{}' must be at least {}", name, min),
                (None, Some(max)) => write!(f, "parameter '{}' must be at most {}", name, max),
                (None, None) => write!(f, "parameter '{}' is out of range", name),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn errors(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Checks a parsed LLM result; pure, no side effects
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, analysis: &LlmAnalysis) -> ValidationResult;
}

/// Validates the selected workflow against a catalog snapshot
pub struct WorkflowResponseValidator {
    catalog: WorkflowCatalog,
}

impl WorkflowResponseValidator {
    pub fn new(catalog: WorkflowCatalog) -> Self {
        Self { catalog }
    }
}

impl ResponseValidator for WorkflowResponseValidator {
    fn validate(&self, analysis: &LlmAnalysis) -> ValidationResult {
        let mut issues = Vec::new();
        if !(0.0..=1.0).contains(&analysis.confidence) {
            issues.push(ValidationIssue::ConfidenceOutOfRange(analysis.confidence));
        }

        // Nothing will be executed, so there is no selection to validate
        if analysis.investigation_outcome == InvestigationOutcome::Resolved {
            return ValidationResult::from_issues(issues);
        }
        let Some(selection) = &analysis.selected_workflow else {
            return ValidationResult::from_issues(issues);
        };

        let Some(workflow) = self.catalog.get(&selection.workflow_id) else {
            issues.push(ValidationIssue::WorkflowNotFound {
                workflow_id: selection.workflow_id.clone(),
            });
            return ValidationResult::from_issues(issues);
        };

        if let Some(image) = &selection.container_image {
            if image != &workflow.container_image {
                issues.push(ValidationIssue::ImageMismatch {
                    workflow_id: workflow.workflow_id.clone(),
                    expected: workflow.container_image.clone(),
                    actual: image.clone(),
                });
            }
        }

        issues.extend(validate_parameters(workflow, &selection.parameters));
        ValidationResult::from_issues(issues)
    }
}

fn validate_parameters(
    workflow: &WorkflowDefinition,
    provided: &serde_json::Map<String, Value>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for spec in workflow.parameters.iter().filter(|p| p.required) {
        if provided.get(&spec.name).map_or(true, Value::is_null) {
            issues.push(ValidationIssue::MissingParameter {
                name: spec.name.clone(),
            });
        }
    }

    for (name, value) in provided {
        match workflow.parameter(name) {
            None => issues.push(ValidationIssue::UnknownParameter { name: name.clone() }),
            Some(_) if value.is_null() => {}
            Some(spec) => {
                if let Some(issue) = check_value(spec, value) {
                    issues.push(issue);
                }
            }
        }
    }

    issues
}

fn check_value(spec: &ParameterSpec, value: &Value) -> Option<ValidationIssue> {
    let type_ok = match spec.param_type {
        ParameterType::String => value.is_string(),
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Number => value.is_number(),
        ParameterType::Boolean => value.is_boolean(),
    };
    if !type_ok {
        return Some(ValidationIssue::WrongParameterType {
            name: spec.name.clone(),
            expected: spec.param_type,
        });
    }

    if let Some(allowed) = &spec.allowed_values {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !allowed.contains(&rendered) {
            return Some(ValidationIssue::ValueNotAllowed {
                name: spec.name.clone(),
                allowed: allowed.clone(),
            });
        }
    }

    if let Some(number) = value.as_f64() {
        let below = spec.minimum.map_or(false, |min| number < min);
        let above = spec.maximum.map_or(false, |max| number > max);
        if below || above {
            return Some(ValidationIssue::OutOfRange {
                name: spec.name.clone(),
                minimum: spec.minimum,
                maximum: spec.maximum,
            });
        }
    }

    None
}

/// Human-review reason for the issues of the final failed attempt
///
/// Malformed output (unparseable, or confidence out of range) outranks a
/// missing workflow, which outranks an image mismatch, which outranks
/// parameter problems.
pub fn classify_issues(issues: &[ValidationIssue]) -> Option<HumanReviewReason> {
    if issues.iter().any(|i| {
        matches!(
            i,
            ValidationIssue::Unparseable(_) | ValidationIssue::ConfidenceOutOfRange(_)
        )
    }) {
        Some(HumanReviewReason::LlmParsingError)
    } else if issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::WorkflowNotFound { .. }))
    {
        Some(HumanReviewReason::WorkflowNotFound)
    } else if issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::ImageMismatch { .. }))
    {
        Some(HumanReviewReason::ImageMismatch)
    } else if issues.iter().any(ValidationIssue::is_parameter_issue) {
        Some(HumanReviewReason::ParameterValidationFailed)
    } else {
        None
    }
}
