use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::collab::AbsenceEntry;
use crate::config::VerificationPolicy;
use crate::domain::employee::Employee;
use crate::domain::verification::{
    CheckEntry, VerificationId, VerificationRecord, VerificationState,
};
use crate::domain::{AbsenceKind, MessageRef};
use crate::errors::DomainError;

/// What a completed check asks the orchestrator to do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Absence confirmed in the HR system; record is terminal.
    Verified,
    /// Not found yet; another check is scheduled.
    RecheckScheduled { at: DateTime<Utc> },
    /// Every scheduled re-check failed; compliance follow-up owns it now.
    Escalated,
}

/// Pure state machine for absence verification. Owns every transition of
/// a `VerificationRecord`; HR lookups and persistence stay with the
/// orchestrator.
#[derive(Clone, Debug)]
pub struct VerificationTracker {
    policy: VerificationPolicy,
}

impl VerificationTracker {
    pub fn new(policy: VerificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Open a record for a freshly detected absence mention. The record
    /// starts in its grace period; the first check is due when the grace
    /// window closes.
    pub fn create_record(
        &self,
        employee: &Employee,
        dates: Vec<NaiveDate>,
        kind: AbsenceKind,
        channel: &str,
        message_ref: &MessageRef,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, DomainError> {
        if dates.is_empty() {
            return Err(DomainError::validation("verification needs at least one absence date"));
        }

        let grace_until = now + Duration::minutes(self.policy.grace_period_minutes);
        let mut record = VerificationRecord {
            id: VerificationId(Uuid::new_v4().to_string()),
            employee_handle: employee.handle.clone(),
            employee_email: employee.email.clone(),
            employee_name: employee.name.clone(),
            channel: channel.to_string(),
            message_ref: message_ref.clone(),
            dates,
            kind_is_remote: kind == AbsenceKind::RemoteWork,
            state: VerificationState::Detected,
            detected_at: now,
            grace_until,
            next_check_at: Some(grace_until),
            checks_performed: 0,
            check_history: Vec::new(),
            transitions: Vec::new(),
            last_transition_at: now,
        };
        record.transition(VerificationState::GracePeriod, "absence mention detected", now);
        Ok(record)
    }

    /// Whether this record wants a check right now.
    pub fn is_due(&self, record: &VerificationRecord, now: DateTime<Utc>) -> bool {
        !record.state.is_terminal()
            && record.next_check_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Apply the result of one HR lookup.
    ///
    /// A confirmed lookup is terminal regardless of how many checks came
    /// before. An unconfirmed one schedules the next configured offset
    /// from detection, or escalates once every offset has been consumed.
    /// Checking a terminal record is a validation error, not a repeat.
    pub fn record_check(
        &self,
        mut record: VerificationRecord,
        confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<(VerificationRecord, CheckOutcome), DomainError> {
        if record.state.is_terminal() {
            return Err(DomainError::validation(format!(
                "verification {} is already terminal ({:?})",
                record.id, record.state
            )));
        }

        if record.state == VerificationState::GracePeriod {
            record.transition(VerificationState::PendingVerification, "grace period elapsed", now);
        }

        record.checks_performed += 1;
        record.check_history.push(CheckEntry {
            checked_at: now,
            confirmed,
            check_number: record.checks_performed,
        });

        if confirmed {
            record.transition(VerificationState::Verified, "confirmed in HR system", now);
            record.next_check_at = None;
            return Ok((record, CheckOutcome::Verified));
        }

        // Check #1 burns the grace slot; failed check #n consumes
        // offset n-1. One more failure than there are offsets escalates.
        let offset_index = record.checks_performed as usize - 1;
        match self.policy.recheck_offsets_hours.get(offset_index) {
            Some(offset_hours) => {
                let at = record.detected_at + Duration::hours(*offset_hours);
                // Detection-relative offsets can land in the past when a
                // check ran late; fire the next one immediately then.
                let at = at.max(now);
                record.transition(
                    VerificationState::NotFound,
                    format!("not found on check {}", record.checks_performed),
                    now,
                );
                // Between checks the record waits in pending; NotFound
                // is the per-check verdict, recorded in the history.
                record.transition(
                    VerificationState::PendingVerification,
                    "next re-check scheduled",
                    now,
                );
                record.next_check_at = Some(at);
                Ok((record, CheckOutcome::RecheckScheduled { at }))
            }
            None => {
                record.transition(
                    VerificationState::Escalated,
                    format!("still unfiled after {} checks", record.checks_performed),
                    now,
                );
                record.next_check_at = None;
                Ok((record, CheckOutcome::Escalated))
            }
        }
    }

    /// Close a record out-of-band: the employee filed after escalation,
    /// or an operator intervened. Idempotent on already-resolved records.
    pub fn resolve(
        &self,
        mut record: VerificationRecord,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> VerificationRecord {
        if record.state == VerificationState::Resolved {
            return record;
        }
        record.transition(VerificationState::Resolved, reason, now);
        record.next_check_at = None;
        record
    }

    /// Terminal records older than the retention window are purged.
    pub fn past_retention(&self, record: &VerificationRecord, now: DateTime<Utc>) -> bool {
        record.state.is_terminal()
            && now - record.last_transition_at > Duration::days(self.policy.retention_days)
    }
}

/// HR lookups are scoped to one calendar year; absences spanning a year
/// boundary need one query per year involved.
pub fn dates_by_year(dates: &[NaiveDate]) -> BTreeMap<i32, Vec<NaiveDate>> {
    let mut by_year: BTreeMap<i32, Vec<NaiveDate>> = BTreeMap::new();
    for date in dates {
        by_year.entry(date.year()).or_default().push(*date);
    }
    by_year
}

/// An absence is confirmed only when every announced date is covered by
/// an approved HR entry. Partial filings stay unconfirmed.
pub fn entries_cover(dates: &[NaiveDate], entries: &[AbsenceEntry]) -> bool {
    !dates.is_empty()
        && dates.iter().all(|date| {
            entries
                .iter()
                .any(|entry| entry.approved && entry.start <= *date && *date <= entry.end)
        })
}
