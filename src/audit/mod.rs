//! Security audit trail.

pub mod service;
pub mod types;

pub use service::{AuditEntry, AuditService};
pub use types::AuditEventType;
