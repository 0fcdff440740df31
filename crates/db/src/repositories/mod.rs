use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use absentia_core::audit::AuditEntry;
use absentia_core::domain::approval::{ApprovalRequest, ApprovalRequestId};
use absentia_core::domain::reminder::ReminderRecord;
use absentia_core::domain::verification::{VerificationId, VerificationRecord};
use absentia_core::domain::MessageRef;

pub mod approval;
pub mod audit;
pub mod memory;
pub mod reminder;
pub mod verification;

pub use approval::SqlApprovalRepository;
pub use audit::SqlAuditLogRepository;
pub use memory::{
    InMemoryApprovalRepository, InMemoryAuditLogRepository, InMemoryReminderRepository,
    InMemoryVerificationRepository,
};
pub use reminder::SqlReminderRepository;
pub use verification::SqlVerificationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row `{id}`: {reason}")]
    CorruptRow { id: String, reason: String },
}

/// Approval requests are saved whole via upsert; the chain travels as
/// one JSON column so a save can never leave a half-written chain.
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn save(&self, request: &ApprovalRequest) -> Result<(), RepositoryError>;
    async fn find(&self, id: &ApprovalRequestId)
        -> Result<Option<ApprovalRequest>, RepositoryError>;
    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;
    /// Pending requests only; corrupt rows are quarantined (logged and
    /// skipped), never returned and never fatal to the listing.
    async fn list_pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError>;
}

#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn save(&self, record: &VerificationRecord) -> Result<(), RepositoryError>;
    async fn find(&self, id: &VerificationId)
        -> Result<Option<VerificationRecord>, RepositoryError>;
    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<VerificationRecord>, RepositoryError>;
    /// Non-terminal records, corrupt rows quarantined.
    async fn list_open(&self) -> Result<Vec<VerificationRecord>, RepositoryError>;
    /// Purge terminal records whose last transition predates `cutoff`.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn save(&self, record: &ReminderRecord) -> Result<(), RepositoryError>;
    async fn find(&self, id: &VerificationId) -> Result<Option<ReminderRecord>, RepositoryError>;
    /// Unresolved records, corrupt rows quarantined.
    async fn list_unresolved(&self) -> Result<Vec<ReminderRecord>, RepositoryError>;
    /// Purge resolved records closed before `cutoff`.
    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Append-only; audit rows are never updated or deleted.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entries: &[AuditEntry]) -> Result<(), RepositoryError>;
    async fn list_for(
        &self,
        request_id: &ApprovalRequestId,
    ) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Enums persist as their snake_case serde names in TEXT columns.
pub(crate) fn enum_to_text<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(text) => Ok(text),
        other => Err(RepositoryError::CorruptRow {
            id: String::new(),
            reason: format!("expected a string-like enum, got {other}"),
        }),
    }
}

pub(crate) fn enum_from_text<T: serde::de::DeserializeOwned>(
    text: &str,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory database");
    crate::migrations::MIGRATOR.run(&pool).await.expect("run migrations");
    pool
}
