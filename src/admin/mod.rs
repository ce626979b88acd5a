/// Privileged moderation
///
/// Role gating, the audit trail, content and account moderation, and the
/// user report workflow.

pub mod audit;
pub mod moderation;
pub mod reports;
pub mod roles;

pub use audit::{AuditAction, AuditFailure, AuditFilter, AuditLog, AuditRecord, AuditTarget};
pub use moderation::{verify_password, ModerationStateMachine, TemporaryPassword};
pub use reports::{Report, ReportStatus, ReportTarget, ReportWorkflow};
pub use roles::{AccessGate, Role};
