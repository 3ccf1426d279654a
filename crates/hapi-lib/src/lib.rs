//! Core library for the HolmesGPT API
//!
//! This crate provides the core functionality for:
//! - Cluster characteristic detection and disclosure gating
//! - LLM investigation with validation and bounded self-correction
//! - Human-review decisions
//! - Remediation history formatting and Data Storage access
//! - Fire-and-forget audit
//! - Health checks and observability

pub mod audit;
pub mod error;
pub mod health;
pub mod history;
pub mod investigation;
pub mod labels;
pub mod models;
pub mod observability;

pub use error::InvestigationError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{HapiMetrics, StructuredLogger};
