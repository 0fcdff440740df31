use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::Handle;
use crate::domain::MessageRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationId(pub String);

impl std::fmt::Display for VerificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verification state machine:
/// `Detected -> GracePeriod -> PendingVerification -> {Verified | NotFound}`.
/// An unconfirmed check records `NotFound`, then the record returns to
/// `PendingVerification` until the next configured offset, escalating
/// once every offset is spent. `Resolved` marks records closed
/// out-of-band (the employee filed after escalation, or an operator
/// intervened).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Detected,
    GracePeriod,
    PendingVerification,
    Verified,
    NotFound,
    Escalated,
    Resolved,
}

impl VerificationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Escalated | Self::Resolved)
    }
}

/// One entry in the append-only check history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEntry {
    pub checked_at: DateTime<Utc>,
    pub confirmed: bool,
    pub check_number: u32,
}

/// Record of a state transition, kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: VerificationState,
    pub to: VerificationState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Tracks whether an announced absence was actually filed in the HR
/// system. Mutated only by the verification tracker; history lists are
/// append-only and strictly time-ordered (single-threaded driver).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: VerificationId,
    pub employee_handle: Handle,
    pub employee_email: String,
    pub employee_name: String,
    pub channel: String,
    pub message_ref: MessageRef,
    pub dates: Vec<NaiveDate>,
    pub kind_is_remote: bool,
    pub state: VerificationState,
    pub detected_at: DateTime<Utc>,
    pub grace_until: DateTime<Utc>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub checks_performed: u32,
    pub check_history: Vec<CheckEntry>,
    pub transitions: Vec<StateTransition>,
    pub last_transition_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn transition(&mut self, to: VerificationState, reason: impl Into<String>, now: DateTime<Utc>) {
        let from = self.state;
        self.state = to;
        self.last_transition_at = now;
        self.transitions.push(StateTransition { from, to, reason: reason.into(), at: now });
    }
}
