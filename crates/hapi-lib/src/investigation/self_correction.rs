//! Bounded LLM self-correction loop
//!
//! Each attempt calls the investigator, parses and validates the result, and
//! on failure retries with the validation errors fed back into the prompt.
//! Investigator failures and timeouts are fatal and never retried here.

use super::investigator::Investigator;
use super::parser::parse_llm_output;
use super::prompt::build_feedback_block;
use super::types::{InvestigationConfig, InvestigationResult, LlmAnalysis, ValidationAttempt};
use super::validator::{classify_issues, ResponseValidator, ValidationIssue, ValidationResult};
use crate::audit::{AuditEvent, AuditEventType, AuditStore};
use crate::error::InvestigationError;
use crate::models::{HumanReviewReason, ReviewVerdict};
use crate::observability::{HapiMetrics, StructuredLogger};
use chrono::Utc;
use serde_json::json;
use std::time::Instant;
use tracing::debug;

/// Maximum LLM calls per investigation
pub const MAX_VALIDATION_ATTEMPTS: u32 = 3;

/// Identifies the investigation in audit events
#[derive(Debug, Clone, Copy)]
pub struct AuditScope<'a> {
    pub incident_id: &'a str,
    pub remediation_id: Option<&'a str>,
}

pub struct SelfCorrectionLoop<'a> {
    pub investigator: &'a dyn Investigator,
    pub validator: &'a dyn ResponseValidator,
    pub audit: &'a AuditStore,
    pub config: &'a InvestigationConfig,
    pub scope: AuditScope<'a>,
    pub metrics: &'a HapiMetrics,
    pub logger: &'a StructuredLogger,
}

impl SelfCorrectionLoop<'_> {
    pub async fn run(&self, base_prompt: &str) -> Result<InvestigationResult, InvestigationError> {
        let mut prompt = base_prompt.to_string();
        let mut attempts: Vec<ValidationAttempt> = Vec::new();
        let mut errors_history: Vec<Vec<String>> = Vec::new();
        let mut final_issues: Vec<ValidationIssue> = Vec::new();
        let mut raw_analysis = String::new();
        let mut analysis: Option<LlmAnalysis> = None;

        for attempt in 1..=MAX_VALIDATION_ATTEMPTS {
            // Audited before the call so failed calls still leave a trail
            self.emit(
                AuditEventType::LlmRequest,
                Some(attempt),
                json!({
                    "model": self.config.llm.model,
                    "toolsets": self.config.llm.toolsets,
                    "prompt": prompt,
                    "promptLength": prompt.len(),
                }),
            );

            let started = Instant::now();
            let call = tokio::time::timeout(
                self.config.llm_timeout,
                self.investigator.investigate(&prompt, &self.config.llm),
            )
            .await;
            let response = match call {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    self.metrics.inc_llm_errors();
                    return Err(InvestigationError::LlmTransport(format!("{:#}", e)));
                }
                Err(_) => {
                    self.metrics.inc_llm_errors();
                    return Err(InvestigationError::LlmTimeout(self.config.llm_timeout));
                }
            };
            self.metrics
                .observe_llm_latency(started.elapsed().as_secs_f64());

            self.emit(
                AuditEventType::LlmResponse,
                Some(attempt),
                json!({
                    "analysis": response.analysis,
                    "analysisLength": response.analysis.len(),
                    "toolCallCount": response.tool_calls.len(),
                }),
            );
            for call in &response.tool_calls {
                self.emit(
                    AuditEventType::LlmToolCall,
                    Some(attempt),
                    serde_json::to_value(call).unwrap_or_default(),
                );
            }

            let (parsed, validation) = match parse_llm_output(&response.analysis) {
                Ok(parsed) => {
                    let validation = self.validator.validate(&parsed);
                    (Some(parsed), validation)
                }
                Err(e) => (
                    None,
                    ValidationResult::from_issues(vec![ValidationIssue::Unparseable(e)]),
                ),
            };
            let errors = validation.errors();

            self.emit(
                AuditEventType::WorkflowValidationAttempt,
                Some(attempt),
                json!({
                    "attempt": attempt,
                    "maxAttempts": MAX_VALIDATION_ATTEMPTS,
                    "isValid": validation.is_valid(),
                    "errors": errors,
                    "workflowId": parsed
                        .as_ref()
                        .and_then(|p| p.selected_workflow.as_ref())
                        .map(|w| w.workflow_id.as_str()),
                }),
            );

            attempts.push(ValidationAttempt {
                attempt_number: attempt,
                errors: errors.clone(),
                is_valid: validation.is_valid(),
                timestamp: Utc::now(),
            });
            raw_analysis = response.analysis;
            analysis = parsed;

            if validation.is_valid() {
                debug!(attempt = attempt, "LLM response passed validation");
                self.metrics.observe_validation_attempts(attempt);
                return Ok(InvestigationResult {
                    raw_analysis,
                    analysis,
                    review: ReviewVerdict::automatic(),
                    exhausted_reason: None,
                    validation_attempts: attempts,
                    warnings: Vec::new(),
                });
            }

            self.metrics.inc_validation_failures();
            self.logger
                .log_validation_failed(self.scope.incident_id, attempt, &errors);

            if attempt < MAX_VALIDATION_ATTEMPTS {
                prompt = format!(
                    "{}\n\n{}",
                    base_prompt,
                    build_feedback_block(attempt + 1, MAX_VALIDATION_ATTEMPTS, &errors)
                );
            } else {
                final_issues = validation.issues().to_vec();
            }
            errors_history.push(errors);
        }

        // Every attempt failed validation
        let reason =
            classify_issues(&final_issues).unwrap_or(HumanReviewReason::ParameterValidationFailed);
        let summary = exhaustion_summary(&errors_history);

        self.metrics.observe_validation_attempts(MAX_VALIDATION_ATTEMPTS);
        self.logger
            .log_validation_exhausted(self.scope.incident_id, MAX_VALIDATION_ATTEMPTS, reason.as_str());
        self.emit(
            AuditEventType::ValidationExhausted,
            None,
            json!({
                "exhaustionReason": reason,
                "attempts": MAX_VALIDATION_ATTEMPTS,
                "validationErrorsHistory": errors_history,
            }),
        );

        Ok(InvestigationResult {
            raw_analysis,
            analysis,
            review: ReviewVerdict::required(reason),
            exhausted_reason: Some(reason),
            validation_attempts: attempts,
            warnings: vec![summary],
        })
    }

    fn emit(&self, event_type: AuditEventType, attempt: Option<u32>, payload: serde_json::Value) {
        let event = AuditEvent::new(event_type, self.scope.incident_id, payload)
            .with_remediation_id(self.scope.remediation_id);
        let event = match attempt {
            Some(attempt) => event.with_attempt(attempt),
            None => event,
        };
        self.audit.store_audit(event);
    }
}

/// `"Attempt 1: a, b | Attempt 2: c"`
pub fn exhaustion_summary(errors_history: &[Vec<String>]) -> String {
    errors_history
        .iter()
        .enumerate()
        .map(|(i, errors)| format!("Attempt {}: {}", i + 1, errors.join(", ")))
        .collect::<Vec<_>>()
        .join(" | ")
}
