//! Service configuration
//!
//! Read from an optional file named by `HAPI_CONFIG_FILE`, then from
//! environment variables prefixed with `HAPI`, sections separated by `__`
//! (for example `HAPI__LLM__MODEL`).

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use hapi_lib::audit::AuditConfig;
use hapi_lib::investigation::{InvestigationConfig, LlmConfig};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE_ENV: &str = "HAPI_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct HapiConfig {
    /// Port for the incident API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub kubernetes: KubernetesSettings,

    #[serde(default)]
    pub data_storage: DataStorageSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub investigation: InvestigationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// HolmesGPT runtime serving investigations
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_toolsets")]
    pub toolsets: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_model(),
            toolsets: default_toolsets(),
            mcp_servers: Vec::new(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesSettings {
    /// Without cluster access investigations run with no detected labels
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_k8s_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            query_timeout_secs: default_k8s_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataStorageSettings {
    #[serde(default = "default_data_storage_url")]
    pub url: String,
    #[serde(default = "default_data_storage_timeout")]
    pub timeout_secs: u64,
}

impl Default for DataStorageSettings {
    fn default() -> Self {
        Self {
            url: default_data_storage_url(),
            timeout_secs: default_data_storage_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
    #[serde(default = "default_audit_batch")]
    pub batch_size: usize,
    #[serde(default = "default_audit_flush")]
    pub flush_interval_secs: u64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_audit_buffer(),
            batch_size: default_audit_batch(),
            flush_interval_secs: default_audit_flush(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvestigationSettings {
    /// Selections below this confidence need human review
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for InvestigationSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_llm_endpoint() -> String {
    "http://holmesgpt-runtime:8000".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_toolsets() -> Vec<String> {
    vec!["kubernetes/core".to_string(), "kubernetes/logs".to_string()]
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_k8s_timeout() -> u64 {
    5
}

fn default_data_storage_url() -> String {
    "http://data-storage:8080".to_string()
}

fn default_data_storage_timeout() -> u64 {
    10
}

fn default_audit_buffer() -> usize {
    10_000
}

fn default_audit_batch() -> usize {
    50
}

fn default_audit_flush() -> u64 {
    5
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl HapiConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("HAPI")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("llm.toolsets")
                .with_list_parse_key("llm.mcp_servers"),
        );
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Per-request snapshot handed to the analyzer
    pub fn investigation_config(&self) -> InvestigationConfig {
        InvestigationConfig {
            llm: LlmConfig {
                model: self.llm.model.clone(),
                toolsets: self.llm.toolsets.clone(),
                mcp_servers: self.llm.mcp_servers.clone(),
            },
            confidence_threshold: self.investigation.confidence_threshold,
            llm_timeout: Duration::from_secs(self.llm.timeout_secs),
            k8s_query_timeout: Duration::from_secs(self.kubernetes.query_timeout_secs),
        }
    }

    pub fn audit_config(&self) -> AuditConfig {
        AuditConfig {
            buffer_size: self.audit.buffer_size,
            batch_size: self.audit.batch_size,
            flush_interval: Duration::from_secs(self.audit.flush_interval_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> HapiConfig {
        HapiConfig::from_builder(
            config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.llm.model, "gpt-4o");
        assert!(config.kubernetes.enabled);

        let investigation = config.investigation_config();
        assert_eq!(investigation.confidence_threshold, 0.7);
        assert_eq!(investigation.llm_timeout, Duration::from_secs(120));
        assert_eq!(investigation.k8s_query_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = from_toml(
            r#"
            api_port = 9090

            [llm]
            model = "claude-sonnet"
            toolsets = ["kubernetes/core"]
            timeout_secs = 30

            [kubernetes]
            enabled = false

            [audit]
            batch_size = 10
            flush_interval_secs = 1

            [investigation]
            confidence_threshold = 0.8
            "#,
        );

        assert_eq!(config.api_port, 9090);
        assert!(!config.kubernetes.enabled);

        let investigation = config.investigation_config();
        assert_eq!(investigation.llm.model, "claude-sonnet");
        assert_eq!(investigation.llm.toolsets, vec!["kubernetes/core".to_string()]);
        assert_eq!(investigation.llm_timeout, Duration::from_secs(30));
        assert_eq!(investigation.confidence_threshold, 0.8);

        let audit = config.audit_config();
        assert_eq!(audit.batch_size, 10);
        assert_eq!(audit.flush_interval, Duration::from_secs(1));
        assert_eq!(audit.buffer_size, 10_000);
    }
}
