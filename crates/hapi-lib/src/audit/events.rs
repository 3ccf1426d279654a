//! Audit event records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    LlmRequest,
    LlmResponse,
    LlmToolCall,
    WorkflowValidationAttempt,
    InvestigationComplete,
    ValidationExhausted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LlmRequest => "llm_request",
            AuditEventType::LlmResponse => "llm_response",
            AuditEventType::LlmToolCall => "llm_tool_call",
            AuditEventType::WorkflowValidationAttempt => "workflow_validation_attempt",
            AuditEventType::InvestigationComplete => "investigation_complete",
            AuditEventType::ValidationExhausted => "validation_exhausted",
        }
    }
}

/// One audit record, written to Data Storage in batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: AuditEventType,
    pub incident_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_id: Option<String>,
    /// Self-correction attempt the event belongs to, when any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, incident_id: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            incident_id: incident_id.into(),
            remediation_id: None,
            attempt: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_remediation_id(mut self, remediation_id: Option<&str>) -> Self {
        self.remediation_id = remediation_id.map(str::to_string);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = AuditEvent::new(
            AuditEventType::WorkflowValidationAttempt,
            "inc-1",
            json!({"isValid": false}),
        )
        .with_remediation_id(Some("rr-9"))
        .with_attempt(2);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "workflow_validation_attempt");
        assert_eq!(value["incidentId"], "inc-1");
        assert_eq!(value["remediationId"], "rr-9");
        assert_eq!(value["attempt"], 2);
        assert_eq!(value["payload"]["isValid"], false);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let event = AuditEvent::new(AuditEventType::LlmRequest, "inc-1", json!({}));
        let value = serde_json::to_value(&event).unwrap();

        assert!(value.get("remediationId").is_none());
        assert!(value.get("attempt").is_none());
        assert_ne!(event.event_id, AuditEvent::new(AuditEventType::LlmRequest, "inc-1", json!({})).event_id);
    }
}
