//! Observability infrastructure for the investigation service
//!
//! Provides:
//! - Prometheus metrics (LLM latency, validation attempts, human review reasons,
//!   label detection failures, audit queue health)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for LLM call latency (in seconds)
const LLM_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];

/// Buckets for LLM calls made per investigation
const ATTEMPT_BUCKETS: &[f64] = &[1.0, 2.0, 3.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HapiMetricsInner> = OnceLock::new();

struct HapiMetricsInner {
    investigations_total: IntCounterVec,
    llm_latency_seconds: Histogram,
    llm_errors_total: IntCounter,
    validation_attempts: Histogram,
    validation_failures_total: IntCounter,
    human_review_total: IntCounterVec,
    detection_failures_total: IntCounterVec,
    audit_events_enqueued_total: IntCounter,
    audit_events_dropped_total: IntCounter,
    audit_events_flushed_total: IntCounter,
}

impl HapiMetricsInner {
    fn new() -> Self {
        Self {
            investigations_total: register_int_counter_vec!(
                "hapi_investigations_total",
                "Completed investigations by final outcome",
                &["outcome"]
            )
            .expect("Failed to register investigations_total"),

            llm_latency_seconds: register_histogram!(
                "hapi_llm_latency_seconds",
                "Time spent in a single LLM investigation call",
                LLM_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register llm_latency_seconds"),

            llm_errors_total: register_int_counter!(
                "hapi_llm_errors_total",
                "LLM investigation calls that failed or timed out"
            )
            .expect("Failed to register llm_errors_total"),

            validation_attempts: register_histogram!(
                "hapi_validation_attempts",
                "LLM calls made per investigation by the self-correction loop",
                ATTEMPT_BUCKETS.to_vec()
            )
            .expect("Failed to register validation_attempts"),

            validation_failures_total: register_int_counter!(
                "hapi_validation_failures_total",
                "LLM responses rejected by workflow validation"
            )
            .expect("Failed to register validation_failures_total"),

            human_review_total: register_int_counter_vec!(
                "hapi_human_review_total",
                "Investigations flagged for human review by reason",
                &["reason"]
            )
            .expect("Failed to register human_review_total"),

            detection_failures_total: register_int_counter_vec!(
                "hapi_label_detection_failures_total",
                "Cluster label detections that could not be determined",
                &["field"]
            )
            .expect("Failed to register detection_failures_total"),

            audit_events_enqueued_total: register_int_counter!(
                "hapi_audit_events_enqueued_total",
                "Audit events accepted into the buffer"
            )
            .expect("Failed to register audit_events_enqueued_total"),

            audit_events_dropped_total: register_int_counter!(
                "hapi_audit_events_dropped_total",
                "Audit events dropped because the buffer was full or a write failed"
            )
            .expect("Failed to register audit_events_dropped_total"),

            audit_events_flushed_total: register_int_counter!(
                "hapi_audit_events_flushed_total",
                "Audit events written to Data Storage"
            )
            .expect("Failed to register audit_events_flushed_total"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct HapiMetrics {
    _private: (),
}

impl Default for HapiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HapiMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HapiMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HapiMetricsInner {
        GLOBAL_METRICS.get_or_init(HapiMetricsInner::new)
    }

    pub fn inc_investigations(&self, outcome: &str) {
        self.inner()
            .investigations_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn observe_llm_latency(&self, duration_secs: f64) {
        self.inner().llm_latency_seconds.observe(duration_secs);
    }

    pub fn inc_llm_errors(&self) {
        self.inner().llm_errors_total.inc();
    }

    pub fn observe_validation_attempts(&self, attempts: u32) {
        self.inner().validation_attempts.observe(f64::from(attempts));
    }

    pub fn inc_validation_failures(&self) {
        self.inner().validation_failures_total.inc();
    }

    pub fn inc_human_review(&self, reason: &str) {
        self.inner()
            .human_review_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_detection_failure(&self, field: &str) {
        self.inner()
            .detection_failures_total
            .with_label_values(&[field])
            .inc();
    }

    pub fn inc_audit_enqueued(&self) {
        self.inner().audit_events_enqueued_total.inc();
    }

    pub fn inc_audit_dropped(&self, count: u64) {
        self.inner().audit_events_dropped_total.inc_by(count);
    }

    pub fn inc_audit_flushed(&self, count: u64) {
        self.inner().audit_events_flushed_total.inc_by(count);
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for investigations,
/// validation retries and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Log the start of an incident investigation
    pub fn log_investigation_started(&self, incident_id: &str, signal_type: &str, resource: &str) {
        info!(
            event = "investigation_started",
            service = %self.service_name,
            incident_id = %incident_id,
            signal_type = %signal_type,
            resource = %resource,
            "Starting incident investigation"
        );
    }

    /// Log a completed investigation
    pub fn log_investigation_complete(
        &self,
        incident_id: &str,
        attempts: u32,
        confidence: f64,
        needs_human_review: bool,
        human_review_reason: Option<&str>,
    ) {
        if needs_human_review {
            warn!(
                event = "investigation_complete",
                service = %self.service_name,
                incident_id = %incident_id,
                attempts = attempts,
                confidence = confidence,
                needs_human_review = true,
                human_review_reason = ?human_review_reason,
                "Investigation complete, human review required"
            );
        } else {
            info!(
                event = "investigation_complete",
                service = %self.service_name,
                incident_id = %incident_id,
                attempts = attempts,
                confidence = confidence,
                needs_human_review = false,
                "Investigation complete"
            );
        }
    }

    /// Log a rejected LLM response that will be retried with feedback
    pub fn log_validation_failed(&self, incident_id: &str, attempt: u32, errors: &[String]) {
        warn!(
            event = "validation_failed",
            service = %self.service_name,
            incident_id = %incident_id,
            attempt = attempt,
            errors = ?errors,
            "LLM response failed validation"
        );
    }

    /// Log exhaustion of the self-correction loop
    pub fn log_validation_exhausted(&self, incident_id: &str, attempts: u32, reason: &str) {
        warn!(
            event = "validation_exhausted",
            service = %self.service_name,
            incident_id = %incident_id,
            attempts = attempts,
            human_review_reason = %reason,
            "Validation attempts exhausted, escalating to human review"
        );
    }

    /// Log label detections that could not be determined
    pub fn log_detection_failures(&self, incident_id: &str, resource: &str, fields: &[&str]) {
        warn!(
            event = "label_detection_degraded",
            service = %self.service_name,
            incident_id = %incident_id,
            resource = %resource,
            failed_detections = ?fields,
            "Some cluster characteristics could not be detected"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model: &str) {
        info!(
            event = "service_started",
            service = %self.service_name,
            version = %version,
            model = %model,
            "HolmesGPT API started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service_name,
            reason = %reason,
            "HolmesGPT API shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        // Global registry: handles created repeatedly share one registration
        let metrics = HapiMetrics::new();
        let again = HapiMetrics::new();

        metrics.inc_investigations("workflow_selected");
        metrics.observe_llm_latency(1.5);
        metrics.observe_validation_attempts(2);
        metrics.inc_human_review("low_confidence");
        again.inc_detection_failure("pdbProtected");
        again.inc_audit_dropped(3);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("holmesgpt-api");
        assert_eq!(logger.service_name, "holmesgpt-api");
    }
}
