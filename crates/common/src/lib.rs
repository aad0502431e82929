//! Shared plumbing for the hermod workspace: the audit log and small types
//! used on both sides of a crate seam.

pub mod audit;
pub mod types;

pub use {
    audit::{AuditEvent, AuditKind, AuditLog, AuditStatus},
    types::MediaKind,
};
