use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::Handle;
use crate::domain::{AbsenceKind, MessageRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalRequestId(pub String);

impl std::fmt::Display for ApprovalRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
    Escalated,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Pending,
    Approved,
    Rejected,
}

/// One rung of the approval chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub approver_handle: Handle,
    pub approver_email: String,
    pub approver_name: String,
    pub status: LevelStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl ApprovalLevel {
    pub fn pending(handle: Handle, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            approver_handle: handle,
            approver_email: email.into(),
            approver_name: name.into(),
            status: LevelStatus::Pending,
            decided_at: None,
            reason: None,
        }
    }
}

/// A leave or remote-work request moving through its approval chain.
///
/// Overall status is `Approved` iff every level approved; the first
/// rejection makes the whole request `Rejected` with no further levels
/// contacted. Terminal requests are archived, not deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalRequestId,
    pub employee_handle: Handle,
    pub employee_email: String,
    pub employee_name: String,
    pub channel: String,
    pub message_ref: MessageRef,
    pub dates: Vec<NaiveDate>,
    pub duration_days: u32,
    pub kind: AbsenceKind,
    pub chain: Vec<ApprovalLevel>,
    pub current_level: usize,
    pub status: ApprovalStatus,
    pub rejection_reason: Option<String>,
    pub escalation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// The approver expected to act next, if the request is still pending.
    pub fn current_approver(&self) -> Option<&ApprovalLevel> {
        if self.status != ApprovalStatus::Pending {
            return None;
        }
        self.chain.get(self.current_level)
    }
}
