//! Fatal investigation errors
//!
//! Only infrastructure failures surface as errors. Validation failures,
//! detection failures and missing history all end in a structured result.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvestigationError {
    #[error("LLM investigation call failed: {0}")]
    LlmTransport(String),

    #[error("LLM investigation call timed out after {0:?}")]
    LlmTimeout(Duration),

    #[error("Workflow catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

impl InvestigationError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            InvestigationError::LlmTransport(_) => "llm_unavailable",
            InvestigationError::LlmTimeout(_) => "llm_timeout",
            InvestigationError::CatalogUnavailable(_) => "catalog_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_messages() {
        let timeout = InvestigationError::LlmTimeout(Duration::from_secs(30));
        assert_eq!(timeout.code(), "llm_timeout");
        assert_eq!(
            timeout.to_string(),
            "LLM investigation call timed out after 30s"
        );

        let catalog = InvestigationError::CatalogUnavailable("connection refused".into());
        assert_eq!(catalog.code(), "catalog_unavailable");
        assert!(catalog.to_string().contains("connection refused"));
    }
}
