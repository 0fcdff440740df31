//! SQLite persistence for the absence compliance orchestrator.
//!
//! Repositories are trait objects so the orchestrator and tests can swap
//! the SQLite implementations for in-memory ones.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::connect;
pub use migrations::MIGRATOR;
pub use repositories::{
    ApprovalRepository, AuditLogRepository, ReminderRepository, RepositoryError,
    VerificationRepository,
};
