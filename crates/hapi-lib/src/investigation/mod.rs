//! LLM-driven incident investigation
//!
//! This module provides:
//! - The `Investigator` seam and its HTTP implementation
//! - Prompt assembly and structured output parsing
//! - Workflow validation against the catalog
//! - The bounded self-correction loop and the human-review policy
//! - `IncidentAnalyzer`, which runs the whole flow for one request

mod catalog;
mod investigator;
mod parser;
mod prompt;
mod review;
mod self_correction;
mod service;
mod types;
mod validator;


pub use catalog::{
    ParameterSpec, ParameterType, WorkflowCatalog, WorkflowCatalogSource, WorkflowDefinition,
};
pub use investigator::{HttpInvestigator, InvestigationResponse, Investigator, ToolCall};
pub use parser::parse_llm_output;
pub use prompt::{build_feedback_block, build_investigation_prompt, PromptContext};
pub use review::HumanReviewPolicy;
pub use self_correction::{
    exhaustion_summary, AuditScope, SelfCorrectionLoop, MAX_VALIDATION_ATTEMPTS,
};
pub use service::IncidentAnalyzer;
pub use types::{
    FinalOutcome, IncidentRequest, IncidentResponse, InvestigationConfig, InvestigationOutcome,
    InvestigationResult, LlmAnalysis, LlmConfig, PreviousExecution, RootCauseAnalysis,
    ValidationAttempt, WorkflowSelection,
};
pub use validator::{
    classify_issues, ResponseValidator, ValidationIssue, ValidationResult,
    WorkflowResponseValidator,
};
