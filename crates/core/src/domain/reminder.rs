use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::Handle;
use crate::domain::verification::VerificationId;
use crate::domain::MessageRef;

/// Escalation rungs, in firing order. Each level has a delay measured
/// from the original detection and a fixed channel set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderLevel {
    FirstFollowup,
    SecondEscalation,
    Urgent,
}

impl ReminderLevel {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::FirstFollowup => Some(Self::SecondEscalation),
            Self::SecondEscalation => Some(Self::Urgent),
            Self::Urgent => None,
        }
    }
}

/// Delivery channels a reminder level fans out to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderChannel {
    /// Direct message to the employee.
    Direct,
    /// Reply in the thread of the original announcement.
    Thread,
    /// Administrative channel, tagging the employee's manager.
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEntry {
    pub level: ReminderLevel,
    pub channels: Vec<ReminderChannel>,
    pub sent_at: DateTime<Utc>,
}

/// One-to-one with a `VerificationRecord` once verification has failed
/// at least once. Resolved the moment a re-check confirms the absence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub verification_id: VerificationId,
    pub employee_handle: Handle,
    pub employee_email: String,
    pub employee_name: String,
    pub channel: String,
    pub message_ref: MessageRef,
    pub dates: Vec<NaiveDate>,
    /// Detection time of the originating mention. All level delays are
    /// measured from here, not from the previous send.
    pub detected_at: DateTime<Utc>,
    /// Highest level sent so far. `None` until the first follow-up.
    pub level: Option<ReminderLevel>,
    pub next_due: Option<DateTime<Utc>>,
    pub history: Vec<ReminderEntry>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReminderRecord {
    pub fn urgent_already_sent(&self) -> bool {
        self.history.iter().any(|entry| entry.level == ReminderLevel::Urgent)
    }
}
