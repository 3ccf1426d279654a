//! Data Storage REST client
//!
//! Serves remediation history, the workflow catalog and audit batch writes.
//! History lookups degrade to `None` on any failure; catalog and audit
//! failures are returned to the caller.

use super::types::RemediationHistoryContext;
use crate::audit::{AuditEvent, AuditWriter};
use crate::investigation::{WorkflowCatalog, WorkflowCatalogSource};
use crate::models::ResourceRef;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const HISTORY_PATH: &str = "/api/v1/remediation-history/context";
const WORKFLOWS_PATH: &str = "/api/v1/workflows";
const AUDIT_BATCH_PATH: &str = "/api/v1/audit/events/batch";

/// Source of remediation history for a target resource
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// `None` when no history is available for any reason
    async fn remediation_history(
        &self,
        target: &ResourceRef,
        current_spec_hash: Option<&str>,
    ) -> Option<RemediationHistoryContext>;
}

pub struct DataStorageClient {
    client: Client,
    base_url: Url,
}

impl DataStorageClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid Data Storage URL")?;

        Ok(Self { client, base_url })
    }

    async fn fetch_history(
        &self,
        target: &ResourceRef,
        current_spec_hash: Option<&str>,
    ) -> Result<Option<RemediationHistoryContext>> {
        let mut url = self.base_url.join(HISTORY_PATH).context("Invalid path")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("targetKind", &target.kind);
            query.append_pair("targetName", &target.name);
            if let Some(ns) = target.namespace() {
                query.append_pair("targetNamespace", ns);
            }
            if let Some(hash) = current_spec_hash {
                query.append_pair("currentSpecHash", hash);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Data Storage error ({}): {}", status, body);
        }

        let context: Option<RemediationHistoryContext> = response
            .json()
            .await
            .context("Failed to parse remediation history")?;
        Ok(context)
    }
}

#[async_trait]
impl HistorySource for DataStorageClient {
    async fn remediation_history(
        &self,
        target: &ResourceRef,
        current_spec_hash: Option<&str>,
    ) -> Option<RemediationHistoryContext> {
        match self.fetch_history(target, current_spec_hash).await {
            Ok(context) => {
                debug!(target = %target, found = context.is_some(), "Remediation history fetched");
                context
            }
            Err(e) => {
                warn!(target = %target, error = %format!("{:#}", e), "Remediation history unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl WorkflowCatalogSource for DataStorageClient {
    async fn fetch_catalog(&self) -> Result<WorkflowCatalog> {
        let url = self.base_url.join(WORKFLOWS_PATH).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Data Storage error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse workflow catalog")
    }
}

#[derive(Serialize)]
struct AuditBatch<'a> {
    events: &'a [AuditEvent],
}

#[async_trait]
impl AuditWriter for DataStorageClient {
    async fn write_batch(&self, events: &[AuditEvent]) -> Result<()> {
        let url = self.base_url.join(AUDIT_BATCH_PATH).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(&AuditBatch { events })
            .send()
            .await
            .context("Failed to send audit batch")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Data Storage rejected audit batch ({}): {}", status, body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEventType;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server) -> DataStorageClient {
        DataStorageClient::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_history_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", HISTORY_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("targetKind".into(), "Deployment".into()),
                Matcher::UrlEncoded("targetName".into(), "api".into()),
                Matcher::UrlEncoded("targetNamespace".into(), "prod".into()),
                Matcher::UrlEncoded("currentSpecHash".into(), "sha256:abc".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "targetResource": "Deployment/prod/api",
                    "currentSpecHash": "sha256:abc",
                    "regressionDetected": true,
                    "tier1": {"window": "24h", "chain": [{
                        "remediationUID": "rr-1",
                        "completedAt": "2026-10-01T12:00:00Z",
                        "outcome": "Completed",
                        "workflowType": "restart",
                        "signalType": "OOMKilled",
                        "effectivenessScore": 0.4
                    }]},
                    "tier2": {"window": "90d", "chain": []}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let target = ResourceRef::namespaced("Deployment", "prod", "api");
        let context = client(&server)
            .remediation_history(&target, Some("sha256:abc"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(context.regression_detected);
        assert_eq!(context.tier1.chain[0].remediation_uid, "rr-1");
        assert_eq!(context.tier1.chain[0].effectiveness_score, Some(0.4));
    }

    #[tokio::test]
    async fn test_history_failure_degrades_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", HISTORY_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let target = ResourceRef::cluster_scoped("Node", "worker-1");
        assert!(client(&server)
            .remediation_history(&target, None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_history_unreachable_degrades_to_none() {
        let client = DataStorageClient::new("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let target = ResourceRef::namespaced("Pod", "prod", "api-1");

        assert!(client.remediation_history(&target, None).await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_catalog() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", WORKFLOWS_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"workflows": [{
                    "workflowId": "restart-pod",
                    "containerImage": "quay.io/kubernaut/restart:v1"
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let catalog = client(&server).fetch_catalog().await.unwrap();
        assert!(catalog.get("restart-pod").is_some());
    }

    #[tokio::test]
    async fn test_fetch_catalog_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", WORKFLOWS_PATH)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = client(&server).fetch_catalog().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_write_audit_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", AUDIT_BATCH_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""eventType":"llm_request""#.into()),
                Matcher::Regex(r#""incidentId":"inc-1""#.into()),
            ]))
            .with_status(202)
            .create_async()
            .await;

        let events = vec![AuditEvent::new(AuditEventType::LlmRequest, "inc-1", json!({}))];
        client(&server).write_batch(&events).await.unwrap();

        mock.assert_async().await;
    }
}
