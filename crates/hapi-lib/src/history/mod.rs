//! Remediation history for investigation prompts
//!
//! The Data Storage client also serves the workflow catalog and audit writes.

mod client;
mod formatter;
mod types;

pub use client::{DataStorageClient, HistorySource};
pub use formatter::{detect_declining_effectiveness, format_remediation_history, EffectivenessLevel};
pub use types::{
    HashMatch, HealthChecks, HistoryTier, MetricDeltas, RemediationHistoryContext,
    RemediationHistoryEntry, RemediationHistorySummary,
};
