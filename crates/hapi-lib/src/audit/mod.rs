//! Best-effort audit trail of LLM interactions and validation
//!
//! Events are buffered in a bounded channel and written in batches by a
//! background worker. Enqueueing never blocks a request.

mod events;
mod store;

pub use events::{AuditEvent, AuditEventType};
pub use store::{AuditConfig, AuditStore, AuditWorker, AuditWriter};
