//! In-memory repository implementations, used by tests and local runs
//! without a database file. Behavior mirrors the SQLite repositories,
//! including upsert-on-save and quarantine-free listings (nothing can
//! corrupt in memory).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use absentia_core::audit::AuditEntry;
use absentia_core::domain::approval::{ApprovalRequest, ApprovalRequestId, ApprovalStatus};
use absentia_core::domain::reminder::ReminderRecord;
use absentia_core::domain::verification::{VerificationId, VerificationRecord};
use absentia_core::domain::MessageRef;

use super::{
    ApprovalRepository, AuditLogRepository, ReminderRepository, RepositoryError,
    VerificationRepository,
};

#[derive(Debug, Default)]
pub struct InMemoryApprovalRepository {
    requests: RwLock<HashMap<ApprovalRequestId, ApprovalRequest>>,
}

impl InMemoryApprovalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn save(&self, request: &ApprovalRequest) -> Result<(), RepositoryError> {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn find(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        Ok(self.requests.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned())
    }

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        Ok(self
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|request| request.message_ref == *message_ref)
            .cloned())
    }

    async fn list_pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let mut pending: Vec<ApprovalRequest> = self
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|request| request.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(pending)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVerificationRepository {
    records: RwLock<HashMap<VerificationId, VerificationRecord>>,
}

impl InMemoryVerificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationRepository for InMemoryVerificationRepository {
    async fn save(&self, record: &VerificationRecord) -> Result<(), RepositoryError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find(
        &self,
        id: &VerificationId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        Ok(self.records.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned())
    }

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|record| record.message_ref == *message_ref)
            .cloned())
    }

    async fn list_open(&self) -> Result<Vec<VerificationRecord>, RepositoryError> {
        let mut open: Vec<VerificationRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|record| !record.state.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|left, right| left.detected_at.cmp(&right.detected_at));
        Ok(open)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| {
            !(record.state.is_terminal() && record.last_transition_at < cutoff)
        });
        Ok((before - records.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReminderRepository {
    records: RwLock<HashMap<VerificationId, ReminderRecord>>,
}

impl InMemoryReminderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderRepository for InMemoryReminderRepository {
    async fn save(&self, record: &ReminderRecord) -> Result<(), RepositoryError> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.verification_id.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, id: &VerificationId) -> Result<Option<ReminderRecord>, RepositoryError> {
        Ok(self.records.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned())
    }

    async fn list_unresolved(&self) -> Result<Vec<ReminderRecord>, RepositoryError> {
        let mut unresolved: Vec<ReminderRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|record| !record.resolved)
            .cloned()
            .collect();
        unresolved.sort_by(|left, right| left.detected_at.cmp(&right.detected_at));
        Ok(unresolved)
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| {
            !(record.resolved && record.resolved_at.map(|at| at < cutoff).unwrap_or(false))
        });
        Ok((before - records.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLogRepository {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, entries: &[AuditEntry]) -> Result<(), RepositoryError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(entries);
        Ok(())
    }

    async fn list_for(
        &self,
        request_id: &ApprovalRequestId,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.request_id == *request_id)
            .cloned()
            .collect())
    }
}
