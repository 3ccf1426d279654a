//! HTTP API: incident analysis, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hapi_lib::{
    health::HealthRegistry,
    investigation::{IncidentAnalyzer, IncidentRequest, InvestigationConfig},
    InvestigationError,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub analyzer: IncidentAnalyzer,
    /// Snapshot passed to every investigation
    pub investigation: InvestigationConfig,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        analyzer: IncidentAnalyzer,
        investigation: InvestigationConfig,
    ) -> Self {
        Self {
            health_registry,
            analyzer,
            investigation,
        }
    }
}

/// Health check response - returns 200 if operational, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Investigate an incident and select a remediation workflow
async fn analyze_incident(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IncidentRequest>,
) -> Response {
    match state
        .analyzer
        .analyze(&request, &state.investigation)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(&request.incident_id, e),
    }
}

fn error_response(incident_id: &str, err: InvestigationError) -> Response {
    let status = match &err {
        InvestigationError::LlmTransport(_) => StatusCode::BAD_GATEWAY,
        InvestigationError::LlmTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        InvestigationError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    error!(
        incident_id = %incident_id,
        code = err.code(),
        error = %err,
        "Incident analysis failed"
    );

    (
        status,
        Json(json!({
            "incident_id": incident_id,
            "error": err.to_string(),
            "code": err.code(),
        })),
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/incident/analyze", post(analyze_incident))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                InvestigationError::LlmTransport("reset".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                InvestigationError::LlmTimeout(std::time::Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                InvestigationError::CatalogUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(error_response("inc-1", err).status(), expected);
        }
    }
}
