use chrono::{DateTime, Duration, Utc};

use crate::config::ReminderSchedule;
use crate::domain::reminder::{ReminderChannel, ReminderEntry, ReminderLevel, ReminderRecord};
use crate::domain::verification::VerificationRecord;

/// Drives the three-rung reminder ladder for unverified absences.
///
/// Delays are measured from the original detection, never from the
/// previous send, so a stalled process catches up to the right rung
/// instead of replaying the whole ladder.
#[derive(Clone, Debug)]
pub struct ReminderEscalator {
    schedule: ReminderSchedule,
}

impl ReminderEscalator {
    pub fn new(schedule: ReminderSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &ReminderSchedule {
        &self.schedule
    }

    /// Open the ladder for a verification that has failed at least once.
    pub fn create_for(&self, verification: &VerificationRecord) -> ReminderRecord {
        ReminderRecord {
            verification_id: verification.id.clone(),
            employee_handle: verification.employee_handle.clone(),
            employee_email: verification.employee_email.clone(),
            employee_name: verification.employee_name.clone(),
            channel: verification.channel.clone(),
            message_ref: verification.message_ref.clone(),
            dates: verification.dates.clone(),
            detected_at: verification.detected_at,
            level: None,
            next_due: Some(self.due_at(verification.detected_at, ReminderLevel::FirstFollowup)),
            history: Vec::new(),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn delay_hours(&self, level: ReminderLevel) -> i64 {
        match level {
            ReminderLevel::FirstFollowup => self.schedule.first_followup_hours,
            ReminderLevel::SecondEscalation => self.schedule.second_escalation_hours,
            ReminderLevel::Urgent => self.schedule.urgent_hours,
        }
    }

    pub fn due_at(&self, detected_at: DateTime<Utc>, level: ReminderLevel) -> DateTime<Utc> {
        detected_at + Duration::hours(self.delay_hours(level))
    }

    /// Channel fan-out per rung. Urgent goes to the admin channel with a
    /// manager tag instead of the announcement thread.
    pub fn channels_for(&self, level: ReminderLevel) -> Vec<ReminderChannel> {
        match level {
            ReminderLevel::FirstFollowup => vec![ReminderChannel::Direct],
            ReminderLevel::SecondEscalation => {
                vec![ReminderChannel::Direct, ReminderChannel::Thread]
            }
            ReminderLevel::Urgent => vec![ReminderChannel::Direct, ReminderChannel::Admin],
        }
    }

    pub fn template_key(&self, level: ReminderLevel) -> &'static str {
        match level {
            ReminderLevel::FirstFollowup => "reminder_first_followup",
            ReminderLevel::SecondEscalation => "reminder_second_escalation",
            ReminderLevel::Urgent => "reminder_urgent",
        }
    }

    /// The rung that should fire now, if any. Skips rungs whose window
    /// has already passed so a catch-up send lands on the highest due
    /// level, and never repeats `Urgent`.
    pub fn due_level(&self, record: &ReminderRecord, now: DateTime<Utc>) -> Option<ReminderLevel> {
        if record.resolved || record.urgent_already_sent() {
            return None;
        }
        let next = match record.level {
            None => ReminderLevel::FirstFollowup,
            Some(level) => level.next()?,
        };

        let mut candidate = next;
        let mut due = None;
        loop {
            if self.due_at(record.detected_at, candidate) <= now {
                due = Some(candidate);
                match candidate.next() {
                    Some(higher) => candidate = higher,
                    None => break,
                }
            } else {
                break;
            }
        }
        due
    }

    /// Record a completed send, advancing the ladder and scheduling the
    /// next rung (or closing the schedule after `Urgent`).
    pub fn mark_sent(
        &self,
        mut record: ReminderRecord,
        level: ReminderLevel,
        now: DateTime<Utc>,
    ) -> ReminderRecord {
        record.history.push(ReminderEntry {
            level,
            channels: self.channels_for(level),
            sent_at: now,
        });
        record.level = Some(level);
        record.next_due = level.next().map(|next| self.due_at(record.detected_at, next));
        record
    }

    /// Stop the ladder the moment verification succeeds or the record is
    /// otherwise closed. Idempotent.
    pub fn resolve(&self, mut record: ReminderRecord, now: DateTime<Utc>) -> ReminderRecord {
        if record.resolved {
            return record;
        }
        record.resolved = true;
        record.resolved_at = Some(now);
        record.next_due = None;
        record
    }

    /// Resolved records older than the retention window are purged.
    pub fn past_retention(&self, record: &ReminderRecord, now: DateTime<Utc>) -> bool {
        match (record.resolved, record.resolved_at) {
            (true, Some(resolved_at)) => {
                now - resolved_at > Duration::days(self.schedule.retention_days)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::ReminderEscalator;
    use crate::config::{ReminderSchedule, VerificationPolicy};
    use crate::domain::employee::{Employee, Handle};
    use crate::domain::reminder::{ReminderChannel, ReminderLevel};
    use crate::domain::verification::VerificationRecord;
    use crate::domain::{AbsenceKind, MessageRef};
    use crate::verification::VerificationTracker;

    fn verification() -> VerificationRecord {
        let employee = Employee {
            handle: Handle("U-dev".to_string()),
            email: "dev@example.com".to_string(),
            name: "dev".to_string(),
            department: "engineering".to_string(),
            manager: Some("mgr@example.com".to_string()),
            is_senior_manager: false,
            is_hr: false,
        };
        VerificationTracker::new(VerificationPolicy::default())
            .create_record(
                &employee,
                vec!["2026-09-07".parse().expect("date")],
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("3001.1".to_string()),
                Utc::now(),
            )
            .expect("create")
    }

    fn escalator() -> ReminderEscalator {
        ReminderEscalator::new(ReminderSchedule::default())
    }

    #[test]
    fn ladder_fires_in_order_at_detection_relative_delays() {
        let escalator = escalator();
        let verification = verification();
        let detected = verification.detected_at;
        let mut record = escalator.create_for(&verification);

        assert_eq!(record.next_due, Some(detected + Duration::hours(12)));
        assert!(escalator.due_level(&record, detected + Duration::hours(11)).is_none());

        let now = detected + Duration::hours(12);
        assert_eq!(escalator.due_level(&record, now), Some(ReminderLevel::FirstFollowup));
        record = escalator.mark_sent(record, ReminderLevel::FirstFollowup, now);
        assert_eq!(record.next_due, Some(detected + Duration::hours(48)));

        let now = detected + Duration::hours(48);
        record = escalator.mark_sent(record, ReminderLevel::SecondEscalation, now);
        assert_eq!(record.next_due, Some(detected + Duration::hours(72)));

        let now = detected + Duration::hours(72);
        record = escalator.mark_sent(record, ReminderLevel::Urgent, now);
        assert!(record.next_due.is_none());
    }

    #[test]
    fn urgent_fires_exactly_once() {
        let escalator = escalator();
        let verification = verification();
        let record = escalator.create_for(&verification);

        let late = verification.detected_at + Duration::hours(100);
        let record = escalator.mark_sent(record, ReminderLevel::Urgent, late);
        assert!(escalator.due_level(&record, late + Duration::hours(24)).is_none());
    }

    #[test]
    fn catch_up_lands_on_the_highest_due_rung() {
        let escalator = escalator();
        let verification = verification();
        let record = escalator.create_for(&verification);

        // Process was down for four days; go straight to urgent rather
        // than replaying the lower rungs.
        let now = verification.detected_at + Duration::hours(96);
        assert_eq!(escalator.due_level(&record, now), Some(ReminderLevel::Urgent));
    }

    #[test]
    fn channel_fanout_matches_the_rung() {
        let escalator = escalator();
        assert_eq!(
            escalator.channels_for(ReminderLevel::FirstFollowup),
            vec![ReminderChannel::Direct]
        );
        assert_eq!(
            escalator.channels_for(ReminderLevel::SecondEscalation),
            vec![ReminderChannel::Direct, ReminderChannel::Thread]
        );
        assert_eq!(
            escalator.channels_for(ReminderLevel::Urgent),
            vec![ReminderChannel::Direct, ReminderChannel::Admin]
        );
    }

    #[test]
    fn resolved_records_never_fire_and_age_out() {
        let escalator = escalator();
        let verification = verification();
        let record = escalator.create_for(&verification);

        let now = verification.detected_at + Duration::hours(12);
        let resolved = escalator.resolve(record, now);
        assert!(escalator.due_level(&resolved, now + Duration::hours(100)).is_none());

        assert!(!escalator.past_retention(&resolved, now + Duration::days(7)));
        assert!(escalator.past_retention(&resolved, now + Duration::days(8)));
    }
}
