//! HolmesGPT API - incident investigation service
//!
//! Accepts incident analysis requests, enriches them with cluster context
//! and remediation history, and asks an LLM to select a validated
//! remediation workflow.

use anyhow::{Context, Result};
use hapi_lib::{
    audit::{AuditStore, AuditWorker},
    health::{components, HealthRegistry},
    history::DataStorageClient,
    investigation::{HttpInvestigator, IncidentAnalyzer},
    labels::KubeQueries,
    observability::{HapiMetrics, StructuredLogger},
};
use holmesgpt_api::{api, config::HapiConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time allowed for the audit worker to flush on shutdown
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting holmesgpt-api");

    let config = HapiConfig::load()?;
    info!(
        llm_endpoint = %config.llm.endpoint,
        data_storage = %config.data_storage.url,
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_critical(components::LLM).await;
    health_registry.register_optional(components::KUBERNETES).await;
    health_registry.register_optional(components::DATA_STORAGE).await;
    health_registry.register_optional(components::AUDIT).await;

    // Register metrics before the first scrape
    let _metrics = HapiMetrics::new();
    let logger = StructuredLogger::new("holmesgpt-api");
    logger.log_startup(SERVICE_VERSION, &config.llm.model);

    let data_storage = Arc::new(
        DataStorageClient::new(
            &config.data_storage.url,
            Duration::from_secs(config.data_storage.timeout_secs),
        )
        .context("Failed to create Data Storage client")?,
    );
    let investigator = Arc::new(
        HttpInvestigator::new(&config.llm.endpoint, Duration::from_secs(config.llm.timeout_secs))
            .context("Failed to create LLM client")?,
    );

    let audit_config = config.audit_config();
    let (audit_store, audit_rx) = AuditStore::new(&audit_config);
    let audit_handle = tokio::spawn(
        AuditWorker::new(audit_config, audit_rx, data_storage.clone())
            .with_health(health_registry.clone())
            .run(),
    );

    let mut analyzer = IncidentAnalyzer::new(
        investigator,
        data_storage.clone(),
        data_storage,
        audit_store,
    )
    .with_health(health_registry.clone());

    if config.kubernetes.enabled {
        match kube::Client::try_default().await {
            Ok(client) => {
                analyzer = analyzer.with_kubernetes(Arc::new(KubeQueries::new(client)));
            }
            Err(e) => {
                warn!(error = %e, "Kubernetes client unavailable, label detection disabled");
                health_registry
                    .set_unhealthy(components::KUBERNETES, e.to_string())
                    .await;
            }
        }
    }

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        analyzer,
        config.investigation_config(),
    ));

    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            api_handle.abort();
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    // The server owned the last audit handle; the worker flushes once it is gone
    health_registry.set_ready(false).await;
    if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit_handle)
        .await
        .is_err()
    {
        warn!("Audit worker did not drain before shutdown deadline");
    }

    info!("Shutting down");
    Ok(())
}
