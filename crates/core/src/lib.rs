//! Core domain logic for the absence compliance orchestrator: the org
//! directory, the approval chain, absence verification against the HR
//! system, and the reminder escalation ladder.
//!
//! Everything here is a pure state machine plus the collaborator traits
//! the orchestrator drives them with. No I/O happens in this crate
//! outside the in-memory collaborator fakes.

pub mod approvals;
pub mod audit;
pub mod collab;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod reminders;
pub mod schedule;
pub mod verification;

pub use approvals::{ApprovalEngine, ApprovalOutcome, ApprovalSignal};
pub use audit::{AuditAction, AuditEntry};
pub use config::{AppConfig, ConfigError};
pub use directory::OrgDirectory;
pub use errors::DomainError;
pub use reminders::ReminderEscalator;
pub use schedule::DueQueue;
pub use verification::{CheckOutcome, VerificationTracker};
