//! Incident analysis orchestration
//!
//! Wires catalog lookup, cluster context, label detection and gating,
//! remediation history, the self-correction loop and the review policy
//! into a single request flow.

use super::catalog::WorkflowCatalogSource;
use super::investigator::Investigator;
use super::prompt::{build_investigation_prompt, PromptContext};
use super::review::HumanReviewPolicy;
use super::self_correction::{AuditScope, SelfCorrectionLoop};
use super::types::{IncidentRequest, IncidentResponse, InvestigationConfig};
use super::validator::WorkflowResponseValidator;
use crate::audit::{AuditEvent, AuditEventType, AuditStore};
use crate::error::InvestigationError;
use crate::health::{components, HealthRegistry};
use crate::history::{format_remediation_history, HistorySource};
use crate::labels::{
    build_k8s_context, should_include_detected_labels, walk_owner_chain, BoundedQueries,
    K8sQueries, LabelDetector, OwnerChain,
};
use crate::models::{DetectedLabels, OwnerChainEntry};
use crate::observability::{HapiMetrics, StructuredLogger};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cluster facts gathered before the LLM is consulted
#[derive(Debug, Default)]
struct ClusterFacts {
    /// Owner chain of the signal source; `None` when it could not be resolved
    source_chain: Option<Vec<OwnerChainEntry>>,
    labels: Option<DetectedLabels>,
}

pub struct IncidentAnalyzer {
    investigator: Arc<dyn Investigator>,
    catalog: Arc<dyn WorkflowCatalogSource>,
    history: Arc<dyn HistorySource>,
    k8s: Option<Arc<dyn K8sQueries>>,
    audit: AuditStore,
    health: Option<HealthRegistry>,
    metrics: HapiMetrics,
    logger: StructuredLogger,
}

impl IncidentAnalyzer {
    pub fn new(
        investigator: Arc<dyn Investigator>,
        catalog: Arc<dyn WorkflowCatalogSource>,
        history: Arc<dyn HistorySource>,
        audit: AuditStore,
    ) -> Self {
        Self {
            investigator,
            catalog,
            history,
            k8s: None,
            audit,
            health: None,
            metrics: HapiMetrics::new(),
            logger: StructuredLogger::new("holmesgpt-api"),
        }
    }

    /// Enable cluster context and label detection
    pub fn with_kubernetes(mut self, queries: Arc<dyn K8sQueries>) -> Self {
        self.k8s = Some(queries);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Investigate one incident
    ///
    /// Business-logic failures end in a response flagged for human review.
    /// Only LLM and catalog unavailability are errors.
    pub async fn analyze(
        &self,
        request: &IncidentRequest,
        config: &InvestigationConfig,
    ) -> Result<IncidentResponse, InvestigationError> {
        let target = request.target_resource();
        self.logger.log_investigation_started(
            &request.incident_id,
            &request.signal_type,
            &target.to_string(),
        );

        let catalog_result = self.catalog.fetch_catalog().await;
        self.record_health(components::DATA_STORAGE, catalog_result.as_ref().map(|_| ()))
            .await;
        let catalog = catalog_result
            .map_err(|e| InvestigationError::CatalogUnavailable(format!("{:#}", e)))?;

        let facts = self.gather_cluster_facts(request, config).await;
        let prompt_labels = facts.labels.as_ref().filter(|_| {
            should_include_detected_labels(
                Some(&request.signal_source),
                Some(target),
                facts.source_chain.as_deref(),
            )
        });
        if facts.labels.is_some() && prompt_labels.is_none() {
            debug!(
                incident_id = %request.incident_id,
                "Detected labels withheld from prompt: relationship to target not proven"
            );
        }

        let history = self
            .history
            .remediation_history(target, request.current_spec_hash.as_deref())
            .await;
        let history_text = format_remediation_history(history.as_ref());

        let base_prompt = build_investigation_prompt(&PromptContext {
            request,
            detected_labels: prompt_labels,
            history: &history_text,
            catalog: &catalog,
        });

        let validator = WorkflowResponseValidator::new(catalog);
        let correction = SelfCorrectionLoop {
            investigator: self.investigator.as_ref(),
            validator: &validator,
            audit: &self.audit,
            config,
            scope: AuditScope {
                incident_id: &request.incident_id,
                remediation_id: request.remediation_id.as_deref(),
            },
            metrics: &self.metrics,
            logger: &self.logger,
        };
        let run = correction.run(&base_prompt).await;
        self.record_health(components::LLM, run.as_ref().map(|_| ()))
            .await;
        let mut result = run?;

        HumanReviewPolicy::new(config.confidence_threshold).apply(&mut result);

        // Labels reach the caller only if they describe what the LLM blamed
        let affected = result.analysis.as_ref().and_then(|a| a.affected_resource());
        let response_labels = facts.labels.clone().filter(|_| {
            should_include_detected_labels(
                Some(&request.signal_source),
                affected,
                facts.source_chain.as_deref(),
            )
        });

        let outcome = result.outcome();
        let review = result.review;
        self.audit.store_audit(
            AuditEvent::new(
                AuditEventType::InvestigationComplete,
                &request.incident_id,
                json!({
                    "outcome": outcome,
                    "confidence": result.confidence(),
                    "needsHumanReview": review.needs_human_review(),
                    "humanReviewReason": review.reason(),
                    "llmCalls": result.llm_calls(),
                    "warnings": result.warnings,
                }),
            )
            .with_remediation_id(request.remediation_id.as_deref()),
        );

        self.metrics.inc_investigations(outcome.as_str());
        if let Some(reason) = review.reason() {
            self.metrics.inc_human_review(reason.as_str());
        }
        self.logger.log_investigation_complete(
            &request.incident_id,
            result.llm_calls(),
            result.confidence(),
            review.needs_human_review(),
            review.reason().map(|r| r.as_str()),
        );

        let confidence = result.confidence();
        let analysis = result.analysis.unwrap_or_default();
        Ok(IncidentResponse {
            incident_id: request.incident_id.clone(),
            analysis: result.raw_analysis,
            root_cause_analysis: analysis.root_cause_analysis,
            selected_workflow: analysis.selected_workflow,
            alternative_workflows: analysis.alternative_workflows,
            confidence,
            investigation_outcome: outcome,
            review,
            detected_labels: response_labels,
            validation_attempts_history: result.validation_attempts,
            warnings: result.warnings,
            timestamp: Utc::now(),
        })
    }

    async fn gather_cluster_facts(
        &self,
        request: &IncidentRequest,
        config: &InvestigationConfig,
    ) -> ClusterFacts {
        let Some(k8s) = &self.k8s else {
            return ClusterFacts::default();
        };
        let source = &request.signal_source;
        let target = request.target_resource();
        // Every metadata read is bounded like the detector's list queries
        let bounded = BoundedQueries::new(Arc::clone(k8s), config.k8s_query_timeout);

        let chain_result = walk_owner_chain(&bounded, source).await;
        self.record_health(components::KUBERNETES, chain_result.as_ref().map(|_| ()))
            .await;
        let source_walk = match chain_result {
            Ok(chain) => Some(chain),
            Err(e) => {
                warn!(resource = %source, error = %e, "Owner chain unavailable");
                None
            }
        };

        let target_chain = if target.same_identity(source) {
            source_walk.clone().unwrap_or_default()
        } else {
            match walk_owner_chain(&bounded, target).await {
                Ok(chain) => chain,
                Err(e) => {
                    warn!(resource = %target, error = %e, "Owner chain unavailable");
                    OwnerChain::default()
                }
            }
        };

        let context = match build_k8s_context(&bounded, target, &target_chain).await {
            Ok(context) => context,
            Err(e) => {
                warn!(resource = %target, error = %e, "Cluster context unavailable");
                None
            }
        };

        let labels = LabelDetector::new(Arc::clone(k8s))
            .with_query_timeout(config.k8s_query_timeout)
            .detect_labels(context.as_ref(), &target_chain.entries)
            .await;

        if let Some(labels) = &labels {
            if !labels.failed_detections.is_empty() {
                let fields: Vec<&str> = labels.failed_detections.iter().map(|f| f.as_str()).collect();
                for field in &fields {
                    self.metrics.inc_detection_failure(field);
                }
                self.logger
                    .log_detection_failures(&request.incident_id, &target.to_string(), &fields);
            }
        }

        ClusterFacts {
            source_chain: source_walk.map(|chain| chain.entries),
            labels,
        }
    }

    async fn record_health<E: std::fmt::Display>(&self, component: &str, result: Result<(), E>) {
        if let Some(health) = &self.health {
            health.record_call(component, result).await;
        }
    }
}
