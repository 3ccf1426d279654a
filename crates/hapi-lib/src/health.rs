//! Health check infrastructure for the investigation service
//!
//! Tracks the LLM endpoint, the Kubernetes API, Data Storage and the audit
//! pipeline. Only components registered as critical can take the service
//! out of readiness; the rest degrade investigations without blocking them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational, but investigations lose some context
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Health of a single dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, critical: bool, message: Option<String>) -> Self {
        Self {
            status,
            critical,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status wins, except that a failed non-critical dependency
    /// only degrades the service.
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| match (health.status, health.critical) {
                (ComponentStatus::Unhealthy, false) => ComponentStatus::Degraded,
                (status, _) => status,
            })
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const LLM: &str = "llm";
    pub const KUBERNETES: &str = "kubernetes";
    pub const DATA_STORAGE: &str = "data_storage";
    pub const AUDIT: &str = "audit";
}

/// Shared registry of dependency health, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency whose failure makes the service unready
    pub async fn register_critical(&self, name: &str) {
        self.insert(name, ComponentHealth::with_status(ComponentStatus::Healthy, true, None))
            .await;
    }

    /// Register a dependency whose failure only degrades investigations
    pub async fn register_optional(&self, name: &str) {
        self.insert(name, ComponentHealth::with_status(ComponentStatus::Healthy, false, None))
            .await;
    }

    async fn insert(&self, name: &str, health: ComponentHealth) {
        self.components.write().await.insert(name.to_string(), health);
    }

    async fn set_status(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut components = self.components.write().await;
        // Unregistered components are treated as optional
        let critical = components.get(name).map(|c| c.critical).unwrap_or(false);
        components.insert(
            name.to_string(),
            ComponentHealth::with_status(status, critical, message),
        );
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set_status(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set_status(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set_status(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Record the outcome of a call against a dependency
    pub async fn record_call<E: std::fmt::Display>(&self, name: &str, result: Result<(), E>) {
        match result {
            Ok(()) => self.set_healthy(name).await,
            Err(e) => self.set_unhealthy(name, e.to_string()).await,
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Service not yet initialized".to_string()),
            };
        }

        let components = self.components.read().await;
        let failed: Vec<&str> = components
            .iter()
            .filter(|(_, h)| h.critical && h.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();

        if failed.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Critical component unhealthy: {}", failed.join(", "))),
            }
        }
    }
}
