//! Remediation history prompt section
//!
//! Renders the two-tier history into natural language for the investigation
//! prompt, flagging spec-hash regressions and workflows whose effectiveness
//! keeps declining.

use super::types::{
    HashMatch, HealthChecks, MetricDeltas, RemediationHistoryContext, RemediationHistoryEntry,
};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Minimum scored remediations of one workflow type to call a trend
const MIN_DECLINING_SEQUENCE: usize = 3;

const GOOD_EFFECTIVENESS: f64 = 0.7;
const MODERATE_EFFECTIVENESS: f64 = 0.4;

const REASONING_GUIDANCE: &str = "\
### How to use this history
- Prefer workflows that resolved this signal before with good effectiveness.
- Do not repeat a workflow that failed or scored poorly unless the root cause has changed.
- A regression means the previous fix was reverted; investigate why before reapplying it.
- Treat declining effectiveness as a sign the workflow treats symptoms, not the root cause.
";

/// Effectiveness bucket of a remediation score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectivenessLevel {
    Good,
    Moderate,
    Poor,
    Unknown,
}

impl EffectivenessLevel {
    pub fn classify(score: Option<f64>) -> Self {
        match score {
            Some(s) if s >= GOOD_EFFECTIVENESS => EffectivenessLevel::Good,
            Some(s) if s >= MODERATE_EFFECTIVENESS => EffectivenessLevel::Moderate,
            Some(_) => EffectivenessLevel::Poor,
            None => EffectivenessLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectivenessLevel::Good => "good",
            EffectivenessLevel::Moderate => "moderate",
            EffectivenessLevel::Poor => "poor",
            EffectivenessLevel::Unknown => "unknown",
        }
    }
}

fn describe_score(score: Option<f64>) -> String {
    let level = EffectivenessLevel::classify(score);
    match score {
        Some(s) => format!("{:.2} ({})", s, level.as_str()),
        None => level.as_str().to_string(),
    }
}

fn hash_match_label(hash_match: HashMatch) -> &'static str {
    match hash_match {
        HashMatch::None => "spec changed since this remediation",
        HashMatch::PreRemediation => "current spec matches the PRE-remediation state",
        HashMatch::PostRemediation => "current spec matches the post-remediation state",
    }
}

fn summarize_health(checks: &HealthChecks) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(running) = checks.pod_running {
        parts.push(format!("pod running: {}", yes_no(running)));
    }
    if let Some(ready) = checks.readiness_pass {
        parts.push(format!("readiness: {}", if ready { "pass" } else { "fail" }));
    }
    if let Some(delta) = checks.restart_delta {
        parts.push(format!("restarts since: {delta}"));
    }
    if let Some(true) = checks.crash_loops {
        parts.push("crash looping".to_string());
    }
    if let Some(true) = checks.oom_killed {
        parts.push("OOMKilled".to_string());
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn summarize_metrics(deltas: &MetricDeltas) -> Option<String> {
    let pairs = [
        ("cpu", deltas.cpu_before, deltas.cpu_after),
        ("memory", deltas.memory_before, deltas.memory_after),
        ("p95 latency ms", deltas.latency_p95_before_ms, deltas.latency_p95_after_ms),
        ("error rate", deltas.error_rate_before, deltas.error_rate_after),
    ];

    let parts: Vec<String> = pairs
        .iter()
        .filter_map(|(name, before, after)| match (before, after) {
            (Some(b), Some(a)) => Some(format!("{name} {b:.2} -> {a:.2}")),
            _ => None,
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join(", "))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Workflow types whose Tier 1 effectiveness strictly decreases over time
///
/// Entries are grouped by workflow type and ordered by completion time;
/// entries without a score are ignored.
pub fn detect_declining_effectiveness(entries: &[RemediationHistoryEntry]) -> Vec<String> {
    let mut by_workflow: BTreeMap<&str, Vec<&RemediationHistoryEntry>> = BTreeMap::new();
    for entry in entries {
        by_workflow
            .entry(entry.workflow_type.as_str())
            .or_default()
            .push(entry);
    }

    by_workflow
        .into_iter()
        .filter_map(|(workflow, mut group)| {
            group.sort_by_key(|e| e.completed_at);
            let scores: Vec<f64> = group.iter().filter_map(|e| e.effectiveness_score).collect();
            let declining = scores.len() >= MIN_DECLINING_SEQUENCE
                && scores.windows(2).all(|pair| pair[1] < pair[0]);
            declining.then(|| workflow.to_string())
        })
        .collect()
}

/// Render the remediation history prompt section
///
/// Returns an empty string when there is no context or both tiers are empty.
pub fn format_remediation_history(context: Option<&RemediationHistoryContext>) -> String {
    let Some(ctx) = context else {
        return String::new();
    };
    if ctx.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "## Remediation History for {}\n", ctx.target_resource);

    if ctx.regression_detected {
        let _ = writeln!(
            out,
            "**REGRESSION DETECTED**: the current spec hash{} matches a pre-remediation hash. \
             A previous remediation was reverted or undone.\n",
            ctx.current_spec_hash
                .as_deref()
                .map(|h| format!(" ({h})"))
                .unwrap_or_default()
        );
    }

    if !ctx.tier1.chain.is_empty() {
        let _ = writeln!(out, "### Recent remediations (last {})\n", window_or(&ctx.tier1.window));
        for entry in &ctx.tier1.chain {
            let _ = writeln!(
                out,
                "- {} at {}: workflow `{}` -> {} (signal: {})",
                entry.remediation_uid,
                entry.completed_at.to_rfc3339(),
                entry.workflow_type,
                entry.outcome,
                entry.signal_type
            );
            let _ = writeln!(out, "  - Effectiveness: {}", describe_score(entry.effectiveness_score));
            let _ = writeln!(out, "  - Spec: {}", hash_match_label(entry.hash_match));
            if let Some(resolved) = entry.signal_resolved {
                let _ = writeln!(out, "  - Signal resolved: {}", yes_no(resolved));
            }
            if let Some(health) = entry.health_checks.as_ref().and_then(summarize_health) {
                let _ = writeln!(out, "  - Health: {health}");
            }
            if let Some(metrics) = entry.metric_deltas.as_ref().and_then(summarize_metrics) {
                let _ = writeln!(out, "  - Metrics: {metrics}");
            }
        }
        out.push('\n');
    }

    if !ctx.tier2.chain.is_empty() {
        let _ = writeln!(out, "### Older remediations (last {})\n", window_or(&ctx.tier2.window));
        for entry in &ctx.tier2.chain {
            let _ = writeln!(
                out,
                "- {} {}: `{}` -> {}, effectiveness {}{}",
                entry.completed_at.format("%Y-%m-%d"),
                entry.remediation_uid,
                entry.workflow_type,
                entry.outcome,
                describe_score(entry.effectiveness_score),
                if entry.hash_match == HashMatch::PreRemediation {
                    ", spec matches pre-remediation"
                } else {
                    ""
                }
            );
        }
        out.push('\n');
    }

    let declining = detect_declining_effectiveness(&ctx.tier1.chain);
    if !declining.is_empty() {
        let _ = writeln!(
            out,
            "**DECLINING EFFECTIVENESS**: each application of {} has been less effective than the last.\n",
            declining
                .iter()
                .map(|w| format!("`{w}`"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    out.push_str(REASONING_GUIDANCE);
    out
}

fn window_or(window: &str) -> &str {
    if window.is_empty() {
        "period"
    } else {
        window
    }
}
