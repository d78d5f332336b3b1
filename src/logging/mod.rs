//! Logging infrastructure for Queen
//!
//! Process logging goes through `tracing`; the audit trail is a separate
//! JSONL recorder that holds the historical record of routing decisions.

pub mod audit;

pub use audit::{AuditEvent, AuditRecord, AuditTrail};
