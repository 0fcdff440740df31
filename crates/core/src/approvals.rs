use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::config::ApprovalPolicy;
use crate::directory::OrgDirectory;
use crate::domain::approval::{
    ApprovalLevel, ApprovalRequest, ApprovalRequestId, ApprovalStatus, Decision, LevelStatus,
};
use crate::domain::employee::{Employee, Handle};
use crate::domain::{AbsenceKind, MessageRef};
use crate::errors::DomainError;

/// Side effects an approval operation asks the orchestrator to perform.
/// The engine itself never talks to collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalSignal {
    NotifyApprover { level: usize },
    NotifyEmployeeApproved,
    NotifyEmployeeRejected { reason: String },
    NotifyHrEscalated { reason: String },
}

#[derive(Clone, Debug)]
pub struct ApprovalOutcome {
    pub request: ApprovalRequest,
    pub signals: Vec<ApprovalSignal>,
    pub audit: Vec<AuditEntry>,
}

/// Pure state machine for the approval chain. All mutations flow
/// through here; persistence and notification are the caller's job.
#[derive(Clone, Debug)]
pub struct ApprovalEngine {
    policy: ApprovalPolicy,
}

impl ApprovalEngine {
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Whether an absence of this duration and kind needs a chain at
    /// all. Remote work has its own threshold and switch.
    pub fn requires_approval(&self, duration_days: u32, kind: AbsenceKind) -> bool {
        match kind {
            AbsenceKind::RemoteWork => {
                self.policy.remote_requires_approval
                    && duration_days > self.policy.remote_auto_approve_days
            }
            AbsenceKind::Leave => duration_days > self.policy.auto_approve_days,
        }
    }

    /// Validate and create a request for a detected absence mention.
    ///
    /// Sub-threshold durations (or an empty chain) auto-approve. A cycle
    /// in the manager graph escalates to HR with a diagnostic reason;
    /// it never approves and never loops.
    #[allow(clippy::too_many_arguments)]
    pub fn create_request(
        &self,
        directory: &OrgDirectory,
        employee: &Employee,
        dates: &[NaiveDate],
        kind: AbsenceKind,
        channel: &str,
        message_ref: &MessageRef,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, DomainError> {
        let dates = normalize_dates(dates)?;
        let duration_days = dates.len() as u32;
        validate_date_window(&dates, now)?;

        let mut request = ApprovalRequest {
            id: ApprovalRequestId(Uuid::new_v4().to_string()),
            employee_handle: employee.handle.clone(),
            employee_email: employee.email.clone(),
            employee_name: employee.name.clone(),
            channel: channel.to_string(),
            message_ref: message_ref.clone(),
            dates,
            duration_days,
            kind,
            chain: Vec::new(),
            current_level: 0,
            status: ApprovalStatus::Pending,
            rejection_reason: None,
            escalation_reason: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
            expires_at: now + Duration::hours(self.policy.timeout_hours),
        };

        if !self.policy.enabled || !self.requires_approval(duration_days, kind) {
            request.status = ApprovalStatus::AutoApproved;
            request.decided_at = Some(now);
            let audit = vec![self.audit(&request, &employee.handle, AuditAction::AutoApprove, None, None, now)];
            return Ok(ApprovalOutcome { request, signals: Vec::new(), audit });
        }

        let threshold_policy = self.effective_policy(kind);
        match directory.approval_chain(employee, duration_days, &threshold_policy) {
            Ok(chain) if chain.is_empty() => {
                // Approval required but nobody to route to: auto-approve
                // rather than strand the request.
                request.status = ApprovalStatus::AutoApproved;
                request.decided_at = Some(now);
                let audit =
                    vec![self.audit(&request, &employee.handle, AuditAction::AutoApprove, None, None, now)];
                Ok(ApprovalOutcome { request, signals: Vec::new(), audit })
            }
            Ok(chain) => {
                request.chain = chain
                    .into_iter()
                    .map(|approver| {
                        ApprovalLevel::pending(approver.handle, approver.email, approver.name)
                    })
                    .collect();
                let audit =
                    vec![self.audit(&request, &employee.handle, AuditAction::Create, None, None, now)];
                Ok(ApprovalOutcome {
                    request,
                    signals: vec![ApprovalSignal::NotifyApprover { level: 0 }],
                    audit,
                })
            }
            Err(DomainError::CycleDetected { at }) => {
                let reason = format!("manager chain cycle at `{at}`");
                request.status = ApprovalStatus::Escalated;
                request.escalation_reason = Some(reason.clone());
                if let Some(hr) = directory.hr_staff().first() {
                    request.chain = vec![ApprovalLevel::pending(
                        hr.handle.clone(),
                        hr.email.clone(),
                        hr.name.clone(),
                    )];
                }
                let audit = vec![self.audit(
                    &request,
                    &employee.handle,
                    AuditAction::Escalate,
                    None,
                    Some(reason.clone()),
                    now,
                )];
                Ok(ApprovalOutcome {
                    request,
                    signals: vec![ApprovalSignal::NotifyHrEscalated { reason }],
                    audit,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Record an approve/reject from the expected approver at the
    /// current level. Wrong actor is `NotAuthorized` with no state
    /// change; a repeated approve of an already-approved level is a
    /// no-op. Rejection short-circuits: the whole request is terminal
    /// and no further level is ever contacted.
    pub fn record_decision(
        &self,
        mut request: ApprovalRequest,
        level_index: usize,
        actor: &Handle,
        decision: Decision,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, DomainError> {
        if request.status != ApprovalStatus::Pending {
            return Err(DomainError::validation(format!(
                "request {} is no longer pending ({:?})",
                request.id, request.status
            )));
        }

        if now > request.expires_at {
            // The sweep normally catches this first; a late decision on
            // an expired request applies the timeout transition instead.
            return Ok(self.apply_timeout(request, now));
        }

        // Duplicate delivery of an approve that already advanced the
        // chain: acknowledge without touching state.
        if decision == Decision::Approve
            && level_index < request.current_level
            && request
                .chain
                .get(level_index)
                .map(|level| {
                    level.status == LevelStatus::Approved && level.approver_handle == *actor
                })
                .unwrap_or(false)
        {
            return Ok(ApprovalOutcome { request, signals: Vec::new(), audit: Vec::new() });
        }

        if level_index != request.current_level || level_index >= request.chain.len() {
            return Err(DomainError::validation(format!(
                "level {level_index} is not the active level for request {}",
                request.id
            )));
        }

        let expected = request.chain[level_index].approver_handle.clone();
        if expected != *actor {
            return Err(DomainError::NotAuthorized { actor: actor.clone(), expected: expected.0 });
        }

        match decision {
            Decision::Approve => {
                if request.chain[level_index].status == LevelStatus::Approved {
                    // Duplicate delivery of the same approval.
                    return Ok(ApprovalOutcome { request, signals: Vec::new(), audit: Vec::new() });
                }

                let level = &mut request.chain[level_index];
                level.status = LevelStatus::Approved;
                level.decided_at = Some(now);
                request.current_level += 1;
                request.updated_at = now;

                let audit = vec![self.audit(
                    &request,
                    actor,
                    AuditAction::Approve,
                    Some(level_index as u32),
                    None,
                    now,
                )];

                if request.current_level >= request.chain.len() {
                    request.status = ApprovalStatus::Approved;
                    request.decided_at = Some(now);
                    Ok(ApprovalOutcome {
                        request,
                        signals: vec![ApprovalSignal::NotifyEmployeeApproved],
                        audit,
                    })
                } else {
                    let next = request.current_level;
                    Ok(ApprovalOutcome {
                        request,
                        signals: vec![ApprovalSignal::NotifyApprover { level: next }],
                        audit,
                    })
                }
            }
            Decision::Reject => {
                let reason = reason.unwrap_or_else(|| "rejected by approver".to_string());
                let level = &mut request.chain[level_index];
                level.status = LevelStatus::Rejected;
                level.decided_at = Some(now);
                level.reason = Some(reason.clone());

                request.status = ApprovalStatus::Rejected;
                request.rejection_reason = Some(reason.clone());
                request.decided_at = Some(now);
                request.updated_at = now;

                let audit = vec![self.audit(
                    &request,
                    actor,
                    AuditAction::Reject,
                    Some(level_index as u32),
                    Some(reason.clone()),
                    now,
                )];
                Ok(ApprovalOutcome {
                    request,
                    signals: vec![ApprovalSignal::NotifyEmployeeRejected { reason }],
                    audit,
                })
            }
        }
    }

    /// HR-only forced terminal decision, regardless of in-flight level
    /// states. Always audited with the override reason.
    pub fn admin_override(
        &self,
        directory: &OrgDirectory,
        mut request: ApprovalRequest,
        actor: &Handle,
        decision: Decision,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, DomainError> {
        let is_hr = directory.lookup_handle(actor).map(|employee| employee.is_hr).unwrap_or(false);
        if !is_hr {
            return Err(DomainError::NotAuthorized {
                actor: actor.clone(),
                expected: "an HR-flagged directory entry".to_string(),
            });
        }

        request.updated_at = now;
        request.decided_at = Some(now);
        let (action, signal) = match decision {
            Decision::Approve => {
                request.status = ApprovalStatus::Approved;
                (AuditAction::OverrideApprove, ApprovalSignal::NotifyEmployeeApproved)
            }
            Decision::Reject => {
                request.status = ApprovalStatus::Rejected;
                request.rejection_reason = Some(reason.clone());
                (
                    AuditAction::OverrideReject,
                    ApprovalSignal::NotifyEmployeeRejected { reason: reason.clone() },
                )
            }
        };

        let audit = vec![self.audit(&request, actor, action, None, Some(reason), now)];
        Ok(ApprovalOutcome { request, signals: vec![signal], audit })
    }

    /// Timeout sweep step for one request. Returns `None` when the
    /// request is still live. The transition is one-way: no ordinary
    /// approval action is accepted afterward.
    pub fn sweep_timeout(
        &self,
        request: ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Option<ApprovalOutcome> {
        if request.status != ApprovalStatus::Pending || now <= request.expires_at {
            return None;
        }
        Some(self.apply_timeout(request, now))
    }

    fn apply_timeout(&self, mut request: ApprovalRequest, now: DateTime<Utc>) -> ApprovalOutcome {
        request.updated_at = now;
        if self.policy.escalation_enabled && self.policy.auto_escalate_on_timeout {
            let reason =
                format!("no approval decision within {} hours", self.policy.timeout_hours);
            request.status = ApprovalStatus::Escalated;
            request.escalation_reason = Some(reason.clone());
            let audit = vec![self.audit(
                &request,
                &request.employee_handle.clone(),
                AuditAction::Escalate,
                None,
                Some(reason.clone()),
                now,
            )];
            ApprovalOutcome {
                request,
                signals: vec![ApprovalSignal::NotifyHrEscalated { reason }],
                audit,
            }
        } else {
            request.status = ApprovalStatus::Expired;
            let audit = vec![self.audit(
                &request,
                &request.employee_handle.clone(),
                AuditAction::Expire,
                None,
                None,
                now,
            )];
            ApprovalOutcome { request, signals: Vec::new(), audit }
        }
    }

    /// Chain thresholds parameterized by absence kind: same algorithm,
    /// remote-work threshold when applicable.
    fn effective_policy(&self, kind: AbsenceKind) -> ApprovalPolicy {
        let mut policy = self.policy.clone();
        if kind == AbsenceKind::RemoteWork {
            policy.auto_approve_days = policy.remote_auto_approve_days;
        }
        policy
    }

    fn audit(
        &self,
        request: &ApprovalRequest,
        actor: &Handle,
        action: AuditAction,
        level: Option<u32>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AuditEntry {
        AuditEntry::new(request.id.clone(), actor.clone(), action, level, reason, now)
    }
}

fn normalize_dates(dates: &[NaiveDate]) -> Result<Vec<NaiveDate>, DomainError> {
    if dates.is_empty() {
        return Err(DomainError::validation("absence date list must not be empty"));
    }
    let mut dates = dates.to_vec();
    dates.sort_unstable();
    dates.dedup();
    if dates.len() > 365 {
        return Err(DomainError::validation(format!(
            "absence duration ({} days) exceeds the 365 day maximum",
            dates.len()
        )));
    }
    Ok(dates)
}

fn validate_date_window(dates: &[NaiveDate], now: DateTime<Utc>) -> Result<(), DomainError> {
    let today = now.date_naive();
    let min_allowed = today - Duration::days(7);
    let max_allowed = today + Duration::days(365);
    for date in dates {
        if *date < min_allowed {
            return Err(DomainError::validation(format!(
                "absence date {date} is more than 7 days in the past"
            )));
        }
        if *date > max_allowed {
            return Err(DomainError::validation(format!(
                "absence date {date} is more than 365 days ahead"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};

    use super::{ApprovalEngine, ApprovalSignal};
    use crate::audit::AuditAction;
    use crate::config::ApprovalPolicy;
    use crate::directory::OrgDirectory;
    use crate::domain::approval::{ApprovalStatus, Decision, LevelStatus};
    use crate::domain::employee::{Employee, Handle};
    use crate::domain::{AbsenceKind, MessageRef};
    use crate::errors::DomainError;

    fn employee(
        handle: &str,
        email: &str,
        manager: Option<&str>,
        senior: bool,
        hr: bool,
    ) -> Employee {
        Employee {
            handle: Handle(handle.to_string()),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            department: "engineering".to_string(),
            manager: manager.map(str::to_string),
            is_senior_manager: senior,
            is_hr: hr,
        }
    }

    fn directory() -> OrgDirectory {
        OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("mgr@example.com"), false, false),
            employee("U-mgr", "mgr@example.com", Some("vp@example.com"), false, false),
            employee("U-vp", "vp@example.com", None, true, false),
            employee("U-hr", "hr@example.com", None, false, true),
        ])
    }

    fn engine() -> ApprovalEngine {
        ApprovalEngine::new(ApprovalPolicy {
            auto_approve_days: 2,
            senior_approval_days: 5,
            ..ApprovalPolicy::default()
        })
    }

    fn dates(from: &str, count: u32) -> Vec<NaiveDate> {
        let start: NaiveDate = from.parse().expect("date");
        (0..count).map(|offset| start + Duration::days(i64::from(offset))).collect()
    }

    fn near_future_dates(count: u32) -> Vec<NaiveDate> {
        let start = Utc::now().date_naive() + Duration::days(14);
        (0..count).map(|offset| start + Duration::days(i64::from(offset))).collect()
    }

    #[test]
    fn one_day_absence_auto_approves_with_empty_chain() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let outcome = engine()
            .create_request(
                &directory,
                &dev,
                &near_future_dates(1),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.1".to_string()),
                Utc::now(),
            )
            .expect("create");

        assert_eq!(outcome.request.status, ApprovalStatus::AutoApproved);
        assert!(outcome.request.chain.is_empty());
        assert!(outcome.signals.is_empty(), "no approver should ever be notified");
        assert_eq!(outcome.audit[0].action, AuditAction::AutoApprove);
    }

    #[test]
    fn five_day_absence_routes_to_direct_manager_then_approves() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(5),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.2".to_string()),
                now,
            )
            .expect("create");
        assert_eq!(outcome.request.status, ApprovalStatus::Pending);
        assert_eq!(outcome.request.chain.len(), 1);
        assert_eq!(outcome.signals, vec![ApprovalSignal::NotifyApprover { level: 0 }]);

        let decided = engine
            .record_decision(
                outcome.request,
                0,
                &Handle("U-mgr".to_string()),
                Decision::Approve,
                None,
                now,
            )
            .expect("approve");
        assert_eq!(decided.request.status, ApprovalStatus::Approved);
        assert_eq!(decided.signals, vec![ApprovalSignal::NotifyEmployeeApproved]);
    }

    #[test]
    fn rejection_at_second_level_short_circuits_with_reason() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(7),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.3".to_string()),
                now,
            )
            .expect("create");
        assert_eq!(outcome.request.chain.len(), 2);

        let after_manager = engine
            .record_decision(
                outcome.request,
                0,
                &Handle("U-mgr".to_string()),
                Decision::Approve,
                None,
                now,
            )
            .expect("manager approve");
        assert_eq!(after_manager.request.status, ApprovalStatus::Pending);
        assert_eq!(after_manager.signals, vec![ApprovalSignal::NotifyApprover { level: 1 }]);

        let rejected = engine
            .record_decision(
                after_manager.request,
                1,
                &Handle("U-vp".to_string()),
                Decision::Reject,
                Some("headcount freeze that week".to_string()),
                now,
            )
            .expect("senior reject");
        assert_eq!(rejected.request.status, ApprovalStatus::Rejected);
        assert_eq!(
            rejected.request.rejection_reason.as_deref(),
            Some("headcount freeze that week")
        );
        assert_eq!(
            rejected.signals,
            vec![ApprovalSignal::NotifyEmployeeRejected {
                reason: "headcount freeze that week".to_string()
            }]
        );
        // The senior decision is final; no further level exists to contact.
        assert_eq!(rejected.request.chain[1].status, LevelStatus::Rejected);
    }

    #[test]
    fn wrong_actor_is_rejected_without_state_change() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(5),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.4".to_string()),
                now,
            )
            .expect("create");

        let error = engine
            .record_decision(
                outcome.request.clone(),
                0,
                &Handle("U-dev".to_string()),
                Decision::Approve,
                None,
                now,
            )
            .expect_err("not authorized");
        assert!(matches!(error, DomainError::NotAuthorized { .. }));
    }

    #[test]
    fn duplicate_approve_of_same_level_is_a_noop() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(7),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.5".to_string()),
                now,
            )
            .expect("create");
        let first = engine
            .record_decision(
                outcome.request,
                0,
                &Handle("U-mgr".to_string()),
                Decision::Approve,
                None,
                now,
            )
            .expect("first approve");
        assert_eq!(first.request.current_level, 1);

        // The same approve delivered again must not advance anything.
        let replayed = engine
            .record_decision(
                first.request,
                0,
                &Handle("U-mgr".to_string()),
                Decision::Approve,
                None,
                now,
            )
            .expect("replay");
        assert_eq!(replayed.request.current_level, 1);
        assert_eq!(replayed.request.chain[0].status, LevelStatus::Approved);
        assert!(replayed.signals.is_empty());
        assert!(replayed.audit.is_empty());
    }

    #[test]
    fn cycle_during_chain_build_escalates_to_hr() {
        let directory = OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("a@example.com"), false, false),
            employee("U-a", "a@example.com", Some("b@example.com"), false, false),
            employee("U-b", "b@example.com", Some("a@example.com"), false, false),
            employee("U-hr", "hr@example.com", None, false, true),
        ]);
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();

        let outcome = engine()
            .create_request(
                &directory,
                &dev,
                &near_future_dates(7),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.6".to_string()),
                Utc::now(),
            )
            .expect("create");

        assert_eq!(outcome.request.status, ApprovalStatus::Escalated);
        assert_eq!(outcome.request.chain.len(), 1);
        assert_eq!(outcome.request.chain[0].approver_email, "hr@example.com");
        assert!(matches!(outcome.signals[0], ApprovalSignal::NotifyHrEscalated { .. }));
        assert_eq!(outcome.audit[0].action, AuditAction::Escalate);
    }

    #[test]
    fn remote_work_uses_its_own_threshold() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = ApprovalEngine::new(ApprovalPolicy {
            auto_approve_days: 2,
            remote_auto_approve_days: 5,
            remote_requires_approval: true,
            ..ApprovalPolicy::default()
        });

        // 4 remote days: over the leave threshold, under the remote one.
        let remote = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(4),
                AbsenceKind::RemoteWork,
                "C-leave",
                &MessageRef("1001.7".to_string()),
                Utc::now(),
            )
            .expect("remote");
        assert_eq!(remote.request.status, ApprovalStatus::AutoApproved);

        let leave = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(4),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.8".to_string()),
                Utc::now(),
            )
            .expect("leave");
        assert_eq!(leave.request.status, ApprovalStatus::Pending);
    }

    #[test]
    fn remote_work_switch_disables_approval_entirely() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = ApprovalEngine::new(ApprovalPolicy {
            remote_requires_approval: false,
            ..ApprovalPolicy::default()
        });

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(30),
                AbsenceKind::RemoteWork,
                "C-leave",
                &MessageRef("1001.9".to_string()),
                Utc::now(),
            )
            .expect("remote");
        assert_eq!(outcome.request.status, ApprovalStatus::AutoApproved);
    }

    #[test]
    fn empty_and_out_of_window_dates_are_rejected_locally() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();
        let message = MessageRef("1001.10".to_string());

        let empty = engine.create_request(
            &directory,
            &dev,
            &[],
            AbsenceKind::Leave,
            "C-leave",
            &message,
            now,
        );
        assert!(matches!(empty, Err(DomainError::Validation(_))));

        let stale = engine.create_request(
            &directory,
            &dev,
            &dates("2020-01-06", 2),
            AbsenceKind::Leave,
            "C-leave",
            &message,
            now,
        );
        assert!(matches!(stale, Err(DomainError::Validation(_))));
    }

    #[test]
    fn override_requires_hr_and_forces_terminal_status() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(7),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.11".to_string()),
                now,
            )
            .expect("create");

        let denied = engine.admin_override(
            &directory,
            outcome.request.clone(),
            &Handle("U-mgr".to_string()),
            Decision::Approve,
            "manager trying to shortcut".to_string(),
            now,
        );
        assert!(matches!(denied, Err(DomainError::NotAuthorized { .. })));

        let forced = engine
            .admin_override(
                &directory,
                outcome.request,
                &Handle("U-hr".to_string()),
                Decision::Approve,
                "employee on emergency travel".to_string(),
                now,
            )
            .expect("override");
        assert_eq!(forced.request.status, ApprovalStatus::Approved);
        assert_eq!(forced.audit[0].action, AuditAction::OverrideApprove);
        assert_eq!(forced.audit[0].reason.as_deref(), Some("employee on emergency travel"));
    }

    #[test]
    fn timeout_sweep_escalates_pending_requests_one_way() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let created = Utc::now() - Duration::hours(72);

        let mut outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(5),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.12".to_string()),
                created,
            )
            .expect("create");
        outcome.request.expires_at = created + Duration::hours(48);

        let now = Utc::now();
        let swept = engine.sweep_timeout(outcome.request, now).expect("expired");
        assert_eq!(swept.request.status, ApprovalStatus::Escalated);
        assert!(matches!(swept.signals[0], ApprovalSignal::NotifyHrEscalated { .. }));

        // Afterward ordinary approval action is refused.
        let late = engine.record_decision(
            swept.request,
            0,
            &Handle("U-mgr".to_string()),
            Decision::Approve,
            None,
            now,
        );
        assert!(matches!(late, Err(DomainError::Validation(_))));
    }

    #[test]
    fn timeout_sweep_expires_when_auto_escalation_is_off() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = ApprovalEngine::new(ApprovalPolicy {
            auto_escalate_on_timeout: false,
            ..ApprovalPolicy::default()
        });
        let created = Utc::now() - Duration::hours(72);

        let mut outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(5),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.13".to_string()),
                created,
            )
            .expect("create");
        outcome.request.expires_at = created + Duration::hours(48);

        let swept = engine.sweep_timeout(outcome.request, Utc::now()).expect("expired");
        assert_eq!(swept.request.status, ApprovalStatus::Expired);
        assert!(swept.signals.is_empty());
    }

    #[test]
    fn live_pending_requests_are_left_alone_by_the_sweep() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let engine = engine();
        let now = Utc::now();

        let outcome = engine
            .create_request(
                &directory,
                &dev,
                &near_future_dates(5),
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("1001.14".to_string()),
                now,
            )
            .expect("create");
        assert!(engine.sweep_timeout(outcome.request, now).is_none());
    }
}
