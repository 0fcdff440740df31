use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalRequestId;
use crate::domain::employee::Handle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    AutoApprove,
    Approve,
    Reject,
    OverrideApprove,
    OverrideReject,
    Escalate,
    Expire,
}

/// One row of the approval decision audit log, kept for compliance
/// reporting. Overrides are always audited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub request_id: ApprovalRequestId,
    pub actor: Handle,
    pub action: AuditAction,
    pub level: Option<u32>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        request_id: ApprovalRequestId,
        actor: Handle,
        action: AuditAction,
        level: Option<u32>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self { id: Uuid::new_v4().to_string(), request_id, actor, action, level, reason, occurred_at }
    }
}
