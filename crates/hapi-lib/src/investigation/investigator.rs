//! LLM investigation backend

use super::types::LlmConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Tool invocation the LLM made while investigating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResponse {
    pub analysis: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// Runs one LLM investigation for a prompt
///
/// Errors are transport failures; invalid content comes back as `Ok`.
#[async_trait]
pub trait Investigator: Send + Sync {
    async fn investigate(&self, prompt: &str, config: &LlmConfig) -> Result<InvestigationResponse>;
}

#[derive(Serialize)]
struct InvestigateRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    toolsets: &'a [String],
    mcp_servers: &'a [String],
}

/// Investigator backed by a HolmesGPT runtime over HTTP
pub struct HttpInvestigator {
    client: Client,
    base_url: Url,
}

impl HttpInvestigator {
    /// Create a client for the runtime at `base_url`
    ///
    /// `timeout` is a transport ceiling; callers apply their own per-call bound.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid LLM endpoint URL")?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Investigator for HttpInvestigator {
    async fn investigate(&self, prompt: &str, config: &LlmConfig) -> Result<InvestigationResponse> {
        let url = self
            .base_url
            .join("/api/v1/investigate")
            .context("Invalid path")?;

        let body = InvestigateRequest {
            prompt,
            model: &config.model,
            toolsets: &config.toolsets,
            mcp_servers: &config.mcp_servers,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to send investigation request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM runtime error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse investigation response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_investigate_posts_prompt_and_config() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/investigate")
            .match_body(Matcher::PartialJson(json!({
                "prompt": "why is api crashing?",
                "model": "gpt-4o",
                "mcp_servers": []
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "analysis": "```json\n{}\n```",
                    "tool_calls": [{"tool_name": "kubectl_logs", "arguments": {"pod": "api-1"}}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let investigator = HttpInvestigator::new(&server.url(), Duration::from_secs(5)).unwrap();
        let response = investigator
            .investigate("why is api crashing?", &LlmConfig::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool_name, "kubectl_logs");
    }

    #[tokio::test]
    async fn test_investigate_surfaces_runtime_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/investigate")
            .with_status(502)
            .with_body("upstream model unavailable")
            .create_async()
            .await;

        let investigator = HttpInvestigator::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = investigator
            .investigate("prompt", &LlmConfig::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("502"));
    }
}
