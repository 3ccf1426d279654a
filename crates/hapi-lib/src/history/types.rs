//! Remediation history as returned by Data Storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two-tier remediation history for one target resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationHistoryContext {
    pub target_resource: String,
    #[serde(default)]
    pub current_spec_hash: Option<String>,
    #[serde(default)]
    pub regression_detected: bool,
    #[serde(default)]
    pub tier1: HistoryTier<RemediationHistoryEntry>,
    #[serde(default)]
    pub tier2: HistoryTier<RemediationHistorySummary>,
}

impl RemediationHistoryContext {
    pub fn is_empty(&self) -> bool {
        self.tier1.chain.is_empty() && self.tier2.chain.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryTier<T> {
    #[serde(default)]
    pub window: String,
    #[serde(default = "Vec::new")]
    pub chain: Vec<T>,
}

impl<T> Default for HistoryTier<T> {
    fn default() -> Self {
        Self {
            window: String::new(),
            chain: Vec::new(),
        }
    }
}

/// Whether the target's current spec hash matches a recorded hash
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HashMatch {
    #[default]
    None,
    PreRemediation,
    PostRemediation,
}

/// Tier 1: recent remediation with full effectiveness detail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationHistoryEntry {
    #[serde(rename = "remediationUID")]
    pub remediation_uid: String,
    pub completed_at: DateTime<Utc>,
    pub outcome: String,
    pub workflow_type: String,
    pub signal_type: String,
    #[serde(default)]
    pub effectiveness_score: Option<f64>,
    #[serde(default)]
    pub hash_match: HashMatch,
    #[serde(default)]
    pub signal_resolved: Option<bool>,
    #[serde(default)]
    pub health_checks: Option<HealthChecks>,
    #[serde(default)]
    pub metric_deltas: Option<MetricDeltas>,
}

/// Tier 2: older remediation, summarized
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationHistorySummary {
    #[serde(rename = "remediationUID")]
    pub remediation_uid: String,
    pub completed_at: DateTime<Utc>,
    pub outcome: String,
    pub workflow_type: String,
    pub signal_type: String,
    #[serde(default)]
    pub effectiveness_score: Option<f64>,
    #[serde(default)]
    pub hash_match: HashMatch,
    #[serde(default)]
    pub signal_resolved: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    #[serde(default)]
    pub pod_running: Option<bool>,
    #[serde(default)]
    pub readiness_pass: Option<bool>,
    #[serde(default)]
    pub restart_delta: Option<i64>,
    #[serde(default)]
    pub crash_loops: Option<bool>,
    #[serde(default)]
    pub oom_killed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDeltas {
    #[serde(default)]
    pub cpu_before: Option<f64>,
    #[serde(default)]
    pub cpu_after: Option<f64>,
    #[serde(default)]
    pub memory_before: Option<f64>,
    #[serde(default)]
    pub memory_after: Option<f64>,
    #[serde(default)]
    pub latency_p95_before_ms: Option<f64>,
    #[serde(default)]
    pub latency_p95_after_ms: Option<f64>,
    #[serde(default)]
    pub error_rate_before: Option<f64>,
    #[serde(default)]
    pub error_rate_after: Option<f64>,
}
