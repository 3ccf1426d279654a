//! Integration tests for the HolmesGPT API endpoints

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hapi_lib::{
    audit::{AuditConfig, AuditStore},
    health::{components, HealthRegistry},
    history::{HistorySource, RemediationHistoryContext},
    investigation::{
        IncidentAnalyzer, InvestigationConfig, InvestigationResponse, Investigator, LlmConfig,
        WorkflowCatalog, WorkflowCatalogSource,
    },
    models::ResourceRef,
};
use holmesgpt_api::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const IMAGE: &str = "quay.io/kubernaut/restart-pod:v2";

/// Investigator answering every prompt with the same text, or failing
struct FixedInvestigator(Option<String>);

#[async_trait]
impl Investigator for FixedInvestigator {
    async fn investigate(&self, _prompt: &str, _config: &LlmConfig) -> Result<InvestigationResponse> {
        match &self.0 {
            Some(analysis) => Ok(InvestigationResponse {
                analysis: analysis.clone(),
                tool_calls: Vec::new(),
            }),
            None => Err(anyhow!("connection refused")),
        }
    }
}

struct FixedCatalog(bool);

#[async_trait]
impl WorkflowCatalogSource for FixedCatalog {
    async fn fetch_catalog(&self) -> Result<WorkflowCatalog> {
        if !self.0 {
            return Err(anyhow!("data storage unreachable"));
        }
        Ok(serde_json::from_value(json!({
            "workflows": [{
                "workflowId": "restart-pod",
                "containerImage": IMAGE,
                "parameters": [{"name": "POD_NAME", "type": "string", "required": true}]
            }]
        }))?)
    }
}

struct NoHistory;

#[async_trait]
impl HistorySource for NoHistory {
    async fn remediation_history(
        &self,
        _target: &ResourceRef,
        _spec_hash: Option<&str>,
    ) -> Option<RemediationHistoryContext> {
        None
    }
}

fn llm_answer(confidence: f64) -> String {
    let body = json!({
        "root_cause_analysis": {
            "summary": "pod stuck after node pressure",
            "affectedResource": {"kind": "Pod", "namespace": "prod", "name": "api-0"}
        },
        "selected_workflow": {
            "workflow_id": "restart-pod",
            "container_image": IMAGE,
            "parameters": {"POD_NAME": "api-0"}
        },
        "confidence": confidence
    });
    format!("Analysis complete.\n```json\n{}\n```", body)
}

async fn setup_test_app(llm: Option<String>, catalog_up: bool) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_critical(components::LLM).await;
    health_registry.register_optional(components::DATA_STORAGE).await;

    // Receiver dropped: audit events are discarded
    let (audit, _) = AuditStore::new(&AuditConfig::default());
    let analyzer = IncidentAnalyzer::new(
        Arc::new(FixedInvestigator(llm)),
        Arc::new(FixedCatalog(catalog_up)),
        Arc::new(NoHistory),
        audit,
    )
    .with_health(health_registry.clone());

    let state = Arc::new(AppState::new(
        health_registry,
        analyzer,
        InvestigationConfig::default(),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn analyze(app: Router, payload: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/incident/analyze")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn incident() -> String {
    json!({
        "incident_id": "inc-7",
        "signal_type": "PodStuckTerminating",
        "severity": "warning",
        "signal_source": {"kind": "Pod", "namespace": "prod", "name": "api-0"}
    })
    .to_string()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app(None, true).await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = tokio_test::assert_ok!(serde_json::from_slice(&body));
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_degraded_by_optional_component() {
    let (app, state) = setup_test_app(None, true).await;

    state
        .health_registry
        .set_unhealthy(components::DATA_STORAGE, "connection refused")
        .await;

    // Optional dependency down still serves traffic
    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_llm_unhealthy() {
    let (app, state) = setup_test_app(None, true).await;

    state
        .health_registry
        .set_unhealthy(components::LLM, "timeout")
        .await;

    let (status, _) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, state) = setup_test_app(None, true).await;

    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: Value = tokio_test::assert_ok!(serde_json::from_slice(&body));
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_investigations() {
    let (app, _state) = setup_test_app(Some(llm_answer(0.9)), true).await;

    let (status, _) = analyze(app.clone(), incident()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("hapi_investigations_total"));
}

#[tokio::test]
async fn test_analyze_selects_validated_workflow() {
    let (app, _state) = setup_test_app(Some(llm_answer(0.9)), true).await;

    let (status, body) = analyze(app, incident()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["incident_id"], "inc-7");
    assert_eq!(body["selected_workflow"]["workflow_id"], "restart-pod");
    assert_eq!(body["investigation_outcome"], "workflow_selected");
    assert_eq!(body["needs_human_review"], false);
    assert!(body["human_review_reason"].is_null());
    assert_eq!(body["validation_attempts_history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_analyze_low_confidence_needs_review() {
    let (app, _state) = setup_test_app(Some(llm_answer(0.4)), true).await;

    let (status, body) = analyze(app, incident()).await;

    // Business outcomes are still 200
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_human_review"], true);
    assert_eq!(body["human_review_reason"], "low_confidence");
}

#[tokio::test]
async fn test_analyze_llm_failure_returns_502() {
    let (app, state) = setup_test_app(None, true).await;

    let (status, body) = analyze(app, incident()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "llm_unavailable");
    assert_eq!(body["incident_id"], "inc-7");

    let health = state.health_registry.health().await;
    assert!(!health.status.is_operational());
}

#[tokio::test]
async fn test_analyze_catalog_failure_returns_503() {
    let (app, _state) = setup_test_app(Some(llm_answer(0.9)), false).await;

    let (status, body) = analyze(app, incident()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "catalog_unavailable");
}

#[tokio::test]
async fn test_analyze_rejects_malformed_request() {
    let (app, _state) = setup_test_app(Some(llm_answer(0.9)), true).await;

    let (status, _) = analyze(app, json!({"incident_id": "inc-8"}).to_string()).await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_unknown_routes_and_methods_rejected() {
    let (app, _state) = setup_test_app(Some(llm_answer(0.9)), true).await;

    let (status, _) = get(app.clone(), "/api/v1/incident/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(app, "/api/v1/incident/analyze").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
