//! Human-review decision for completed investigations

use super::types::{InvestigationOutcome, InvestigationResult};
use crate::models::{HumanReviewReason, ReviewVerdict};

/// Maps a completed investigation to exactly one review verdict
///
/// Rules are checked in order and the first match decides:
/// resolved, inconclusive, no workflow, low confidence, incomplete RCA,
/// then the reason the validation loop was exhausted with.
#[derive(Debug, Clone, Copy)]
pub struct HumanReviewPolicy {
    confidence_threshold: f64,
}

impl Default for HumanReviewPolicy {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl HumanReviewPolicy {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn evaluate(&self, result: &InvestigationResult) -> ReviewVerdict {
        let verdict = self.first_matching_rule(result);

        // An exhausted loop always needs review, whatever the LLM claims
        match (verdict.needs_human_review(), result.exhausted_reason) {
            (false, Some(reason)) => ReviewVerdict::required(reason),
            _ => verdict,
        }
    }

    /// Set the verdict on `result`; a resolved investigation drops its workflow
    pub fn apply(&self, result: &mut InvestigationResult) {
        result.review = self.evaluate(result);
        if let Some(analysis) = result.analysis.as_mut() {
            if analysis.investigation_outcome == InvestigationOutcome::Resolved {
                analysis.selected_workflow = None;
            }
        }
    }

    fn first_matching_rule(&self, result: &InvestigationResult) -> ReviewVerdict {
        let Some(analysis) = &result.analysis else {
            // Final attempt could not be parsed
            return ReviewVerdict::required(
                result
                    .exhausted_reason
                    .unwrap_or(HumanReviewReason::LlmParsingError),
            );
        };

        match analysis.investigation_outcome {
            InvestigationOutcome::Resolved => return ReviewVerdict::automatic(),
            InvestigationOutcome::Inconclusive => {
                return ReviewVerdict::required(HumanReviewReason::InvestigationInconclusive)
            }
            InvestigationOutcome::Actionable => {}
        }

        if analysis.selected_workflow.is_none() {
            return ReviewVerdict::required(HumanReviewReason::NoMatchingWorkflows);
        }

        if analysis.confidence < self.confidence_threshold {
            return ReviewVerdict::required(HumanReviewReason::LowConfidence);
        }

        let rca_complete = analysis
            .root_cause_analysis
            .as_ref()
            .map(|rca| rca.has_target())
            .unwrap_or(false);
        if !rca_complete {
            return ReviewVerdict::required(HumanReviewReason::RcaIncomplete);
        }

        match result.exhausted_reason {
            Some(reason) => ReviewVerdict::required(reason),
            None => ReviewVerdict::automatic(),
        }
    }
}
