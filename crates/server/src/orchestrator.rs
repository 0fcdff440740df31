use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use absentia_core::approvals::ApprovalEngine;
use absentia_core::collab::{
    ChatMessage, ChatPlatform, CollabError, DateExtractor, HrSystem, TemplateRenderer,
};
use absentia_core::config::AppConfig;
use absentia_core::directory::OrgDirectory;
use absentia_core::domain::employee::Handle;
use absentia_core::domain::verification::{VerificationId, VerificationRecord, VerificationState};
use absentia_core::errors::DomainError;
use absentia_core::notify::{
    approval_notifications, reminder_notifications, Notification, NotificationTarget, Notifier,
};
use absentia_core::reminders::ReminderEscalator;
use absentia_core::schedule::DueQueue;
use absentia_core::verification::{dates_by_year, entries_cover, CheckOutcome, VerificationTracker};
use absentia_db::repositories::{
    ApprovalRepository, AuditLogRepository, ReminderRepository, VerificationRepository,
};

use crate::commands::{self, Command};

pub struct Collaborators {
    pub chat: Arc<dyn ChatPlatform>,
    pub hr: Arc<dyn HrSystem>,
    pub extractor: Arc<dyn DateExtractor>,
    pub templates: Arc<dyn TemplateRenderer>,
}

pub struct Repositories {
    pub approvals: Arc<dyn ApprovalRepository>,
    pub verifications: Arc<dyn VerificationRepository>,
    pub reminders: Arc<dyn ReminderRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
}

/// Single-threaded driver of the whole pipeline. Each tick polls the
/// leave channel, runs the approval and verification sweeps, fires due
/// reminders, and purges aged-out records. A failure on one item is
/// logged and retried next tick; it never aborts the tick.
pub struct Orchestrator {
    config: AppConfig,
    directory: OrgDirectory,
    approvals: ApprovalEngine,
    tracker: VerificationTracker,
    escalator: ReminderEscalator,
    notifier: Notifier,
    collab: Collaborators,
    repos: Repositories,
    /// High-water mark of processed message timestamps.
    cursor: DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        directory: OrgDirectory,
        collab: Collaborators,
        repos: Repositories,
        started_at: DateTime<Utc>,
    ) -> Self {
        let approvals = ApprovalEngine::new(config.approvals.clone());
        let tracker = VerificationTracker::new(config.verification.clone());
        let escalator = ReminderEscalator::new(config.reminders.clone());
        let notifier = Notifier::new(collab.chat.clone());
        Self {
            config,
            directory,
            approvals,
            tracker,
            escalator,
            notifier,
            collab,
            repos,
            cursor: started_at,
        }
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(
            self.config.orchestrator.tick_interval_secs,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }
    }

    pub async fn tick(&mut self, now: DateTime<Utc>) {
        self.intake(now).await;
        self.sweep_approval_timeouts(now).await;
        self.sweep_verifications(now).await;
        self.sweep_reminders(now).await;
        self.cleanup(now).await;
    }

    async fn intake(&mut self, now: DateTime<Utc>) {
        let channel = self.config.chat.leave_channel.clone();
        let messages = match self
            .with_timeout("chat", self.collab.chat.fetch_messages(&channel, self.cursor))
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "could not poll the leave channel");
                return;
            }
        };

        for message in messages {
            self.cursor = self.cursor.max(message.sent_at);
            if let Err(err) = self.handle_message(&message, now).await {
                warn!(message_ref = %message.message_ref, error = %err, "message handling failed");
            }
        }
    }

    async fn handle_message(
        &self,
        message: &ChatMessage,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if let Some(command) = commands::parse(&message.text) {
            return self.handle_command(&message.sender, command, now).await;
        }

        let Some(employee) = self.directory.lookup_handle(&message.sender).cloned() else {
            debug!(sender = %message.sender, "sender not in the org directory, ignoring");
            return Ok(());
        };

        // One verification per announcement, however many times the
        // message is re-fetched.
        if self.repos.verifications.find_by_message(&message.message_ref).await?.is_some() {
            return Ok(());
        }

        let extracted = self
            .with_timeout("date extractor", self.collab.extractor.extract(message))
            .await?;
        if extracted.is_empty() {
            debug!(message_ref = %message.message_ref, "no absence detected, ignoring");
            return Ok(());
        }
        debug!(
            message_ref = %message.message_ref,
            confidence = extracted.confidence,
            is_range = extracted.is_range,
            "absence announcement detected"
        );

        match self.approvals.create_request(
            &self.directory,
            &employee,
            &extracted.dates,
            extracted.kind,
            &message.channel,
            &message.message_ref,
            now,
        ) {
            Ok(outcome) => {
                self.repos.approvals.save(&outcome.request).await?;
                self.repos.audit.append(&outcome.audit).await?;
                for signal in &outcome.signals {
                    let notes = approval_notifications(
                        signal,
                        &outcome.request,
                        &self.config.chat.admin_channel,
                        self.collab.templates.as_ref(),
                    );
                    self.deliver(&notes).await;
                }
                info!(
                    request_id = %outcome.request.id,
                    status = ?outcome.request.status,
                    "approval request processed"
                );
            }
            Err(DomainError::Validation(reason)) => {
                // Bad dates are the announcer's to fix; tell them in the
                // thread and skip verification entirely.
                let note = Notification {
                    target: NotificationTarget::Thread {
                        channel: message.channel.clone(),
                        parent: message.message_ref.clone(),
                    },
                    text: format!("Could not process this absence: {reason}"),
                };
                self.deliver(std::slice::from_ref(&note)).await;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        let record = self.tracker.create_record(
            &employee,
            extracted.dates,
            extracted.kind,
            &message.channel,
            &message.message_ref,
            now,
        )?;
        self.repos.verifications.save(&record).await?;
        info!(verification_id = %record.id, "verification opened");
        Ok(())
    }

    async fn handle_command(
        &self,
        actor: &Handle,
        command: Command,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        match command {
            Command::Decide { request_id, decision, reason } => {
                let Some(request) = self.repos.approvals.find(&request_id).await? else {
                    debug!(request_id = %request_id, "decision for unknown request");
                    return Ok(());
                };
                let level = request.current_level;
                match self.approvals.record_decision(request, level, actor, decision, reason, now)
                {
                    Ok(outcome) => {
                        self.repos.approvals.save(&outcome.request).await?;
                        self.repos.audit.append(&outcome.audit).await?;
                        for signal in &outcome.signals {
                            let notes = approval_notifications(
                                signal,
                                &outcome.request,
                                &self.config.chat.admin_channel,
                                self.collab.templates.as_ref(),
                            );
                            self.deliver(&notes).await;
                        }
                    }
                    Err(DomainError::NotAuthorized { expected, .. }) => {
                        let note = Notification {
                            target: NotificationTarget::Direct(actor.clone()),
                            text: format!(
                                "You are not the approver for {request_id}; waiting on {expected}."
                            ),
                        };
                        self.deliver(std::slice::from_ref(&note)).await;
                    }
                    Err(err) => {
                        warn!(request_id = %request_id, error = %err, "decision rejected");
                    }
                }
            }
            Command::Override { request_id, decision, reason } => {
                let Some(request) = self.repos.approvals.find(&request_id).await? else {
                    debug!(request_id = %request_id, "override for unknown request");
                    return Ok(());
                };
                match self.approvals.admin_override(
                    &self.directory,
                    request,
                    actor,
                    decision,
                    reason,
                    now,
                ) {
                    Ok(outcome) => {
                        self.repos.approvals.save(&outcome.request).await?;
                        self.repos.audit.append(&outcome.audit).await?;
                        for signal in &outcome.signals {
                            let notes = approval_notifications(
                                signal,
                                &outcome.request,
                                &self.config.chat.admin_channel,
                                self.collab.templates.as_ref(),
                            );
                            self.deliver(&notes).await;
                        }
                        info!(request_id = %outcome.request.id, actor = %actor, "hr override applied");
                    }
                    Err(DomainError::NotAuthorized { .. }) => {
                        let note = Notification {
                            target: NotificationTarget::Direct(actor.clone()),
                            text: "Overrides are restricted to HR.".to_string(),
                        };
                        self.deliver(std::slice::from_ref(&note)).await;
                    }
                    Err(err) => {
                        warn!(request_id = %request_id, error = %err, "override rejected");
                    }
                }
            }
            Command::Resolve { verification_id, reason } => {
                // Closing tracking out-of-band is an HR action; the
                // tracked employee must not be able to silence their
                // own record.
                let is_hr = self
                    .directory
                    .lookup_handle(actor)
                    .map(|employee| employee.is_hr)
                    .unwrap_or(false);
                if !is_hr {
                    let note = Notification {
                        target: NotificationTarget::Direct(actor.clone()),
                        text: "Resolving verifications is restricted to HR.".to_string(),
                    };
                    self.deliver(std::slice::from_ref(&note)).await;
                    return Ok(());
                }
                let id = VerificationId(verification_id);
                let Some(record) = self.repos.verifications.find(&id).await? else {
                    debug!(verification_id = %id, "resolve for unknown verification");
                    return Ok(());
                };
                let resolved =
                    self.tracker.resolve(record, format!("operator: {reason}"), now);
                self.repos.verifications.save(&resolved).await?;
                self.resolve_reminder(&id, now).await?;
                info!(verification_id = %id, actor = %actor, "verification resolved out-of-band");
            }
        }
        Ok(())
    }

    async fn sweep_approval_timeouts(&self, now: DateTime<Utc>) {
        let pending = match self.repos.approvals.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "could not list pending approvals");
                return;
            }
        };

        for request in pending {
            let Some(outcome) = self.approvals.sweep_timeout(request, now) else {
                continue;
            };
            let request_id = outcome.request.id.clone();
            if let Err(err) = self.repos.approvals.save(&outcome.request).await {
                warn!(request_id = %request_id, error = %err, "timeout save failed");
                continue;
            }
            if let Err(err) = self.repos.audit.append(&outcome.audit).await {
                warn!(request_id = %request_id, error = %err, "timeout audit failed");
            }
            for signal in &outcome.signals {
                let notes = approval_notifications(
                    signal,
                    &outcome.request,
                    &self.config.chat.admin_channel,
                    self.collab.templates.as_ref(),
                );
                self.deliver(&notes).await;
            }
            info!(request_id = %request_id, status = ?outcome.request.status, "approval timed out");
        }
    }

    async fn sweep_verifications(&self, now: DateTime<Utc>) {
        let open = match self.repos.verifications.list_open().await {
            Ok(open) => open,
            Err(err) => {
                warn!(error = %err, "could not list open verifications");
                return;
            }
        };

        // Drain in due order so the longest-overdue record is checked
        // first when a tick has been delayed.
        let mut queue = DueQueue::new();
        let mut by_id = HashMap::new();
        for record in open {
            if let Some(due_at) = record.next_check_at {
                queue.push(due_at, record.id.0.clone());
                by_id.insert(record.id.0.clone(), record);
            }
        }

        for (_, id) in queue.drain_due(now) {
            let Some(record) = by_id.remove(&id) else { continue };
            if let Err(err) = self.check_and_advance(record, now).await {
                warn!(verification_id = %id, error = %err, "verification check failed, will retry");
            }
        }
    }

    async fn check_and_advance(
        &self,
        record: VerificationRecord,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let confirmed = self.absence_filed(&record).await?;
        let (updated, outcome) = self.tracker.record_check(record, confirmed, now)?;
        self.repos.verifications.save(&updated).await?;

        match outcome {
            CheckOutcome::Verified => {
                info!(verification_id = %updated.id, "absence verified");
                self.resolve_reminder(&updated.id, now).await?;
                let note = Notification {
                    target: NotificationTarget::Thread {
                        channel: updated.channel.clone(),
                        parent: updated.message_ref.clone(),
                    },
                    text: "Absence confirmed in the HR system, thank you.".to_string(),
                };
                self.deliver(std::slice::from_ref(&note)).await;
            }
            CheckOutcome::RecheckScheduled { at } => {
                debug!(verification_id = %updated.id, next_check = %at, "absence not filed yet");
                if self.repos.reminders.find(&updated.id).await?.is_none() {
                    let reminder = self.escalator.create_for(&updated);
                    self.repos.reminders.save(&reminder).await?;
                }
            }
            CheckOutcome::Escalated => {
                warn!(verification_id = %updated.id, "verification escalated");
                let note = Notification {
                    target: NotificationTarget::Channel(self.config.chat.admin_channel.clone()),
                    text: format!(
                        "Compliance escalation: {} announced an absence that was never \
                         filed in the HR system despite repeated checks.",
                        updated.employee_name
                    ),
                };
                self.deliver(std::slice::from_ref(&note)).await;
            }
        }
        Ok(())
    }

    /// All announced dates must be covered by approved filings; lookups
    /// run once per calendar year involved and the results are ANDed.
    async fn absence_filed(&self, record: &VerificationRecord) -> Result<bool, CollabError> {
        for (year, dates) in dates_by_year(&record.dates) {
            let entries = self
                .with_timeout(
                    "hr system",
                    self.collab.hr.absences_for(&record.employee_email, year),
                )
                .await?;
            if !entries_cover(&dates, &entries) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn sweep_reminders(&self, now: DateTime<Utc>) {
        let unresolved = match self.repos.reminders.list_unresolved().await {
            Ok(unresolved) => unresolved,
            Err(err) => {
                warn!(error = %err, "could not list unresolved reminders");
                return;
            }
        };

        let mut queue = DueQueue::new();
        let mut by_id = HashMap::new();
        for record in unresolved {
            if let Some(due_at) = record.next_due {
                queue.push(due_at, record.verification_id.0.clone());
                by_id.insert(record.verification_id.0.clone(), record);
            }
        }

        for (_, id) in queue.drain_due(now) {
            let Some(record) = by_id.remove(&id) else { continue };
            if let Err(err) = self.fire_reminder_if_due(record, now).await {
                warn!(verification_id = %id, error = %err, "reminder send failed, will retry");
            }
        }
    }

    async fn fire_reminder_if_due(
        &self,
        record: absentia_core::domain::reminder::ReminderRecord,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let Some(level) = self.escalator.due_level(&record, now) else {
            return Ok(());
        };

        // Pre-send re-check: never remind someone whose filing just
        // landed or whose record was closed out-of-band. An escalated
        // verification keeps the ladder running; the filing still has
        // not happened.
        let verification = self.repos.verifications.find(&record.verification_id).await?;
        match verification {
            None => {
                let resolved = self.escalator.resolve(record, now);
                self.repos.reminders.save(&resolved).await?;
                return Ok(());
            }
            Some(verification)
                if matches!(
                    verification.state,
                    VerificationState::Verified | VerificationState::Resolved
                ) =>
            {
                let resolved = self.escalator.resolve(record, now);
                self.repos.reminders.save(&resolved).await?;
                return Ok(());
            }
            Some(verification) => {
                if self.absence_filed(&verification).await? {
                    let updated = if verification.state == VerificationState::Escalated {
                        self.tracker.resolve(verification, "filed after escalation", now)
                    } else {
                        self.tracker.record_check(verification, true, now)?.0
                    };
                    self.repos.verifications.save(&updated).await?;
                    let resolved = self.escalator.resolve(record, now);
                    self.repos.reminders.save(&resolved).await?;
                    // The filing landed between checks; confirm instead
                    // of reminding.
                    let note = Notification {
                        target: NotificationTarget::Thread {
                            channel: updated.channel.clone(),
                            parent: updated.message_ref.clone(),
                        },
                        text: "Absence confirmed in the HR system, thank you.".to_string(),
                    };
                    self.deliver(std::slice::from_ref(&note)).await;
                    return Ok(());
                }
            }
        }

        let channels = self.escalator.channels_for(level);
        let notes = reminder_notifications(
            &record,
            level,
            &channels,
            self.escalator.template_key(level),
            &self.directory,
            &self.config.chat.admin_channel,
            self.collab.templates.as_ref(),
        );
        self.notifier.deliver_all(&notes).await?;
        let updated = self.escalator.mark_sent(record, level, now);
        self.repos.reminders.save(&updated).await?;
        info!(
            verification_id = %updated.verification_id,
            level = ?level,
            "reminder sent"
        );
        Ok(())
    }

    async fn resolve_reminder(&self, id: &VerificationId, now: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(reminder) = self.repos.reminders.find(id).await? {
            if !reminder.resolved {
                let resolved = self.escalator.resolve(reminder, now);
                self.repos.reminders.save(&resolved).await?;
            }
        }
        Ok(())
    }

    async fn cleanup(&self, now: DateTime<Utc>) {
        let verification_cutoff = now - Duration::days(self.tracker.policy().retention_days);
        match self.repos.verifications.delete_terminal_before(verification_cutoff).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged terminal verification records"),
            Err(err) => warn!(error = %err, "verification retention pass failed"),
        }

        let reminder_cutoff = now - Duration::days(self.escalator.schedule().retention_days);
        match self.repos.reminders.delete_resolved_before(reminder_cutoff).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged resolved reminder records"),
            Err(err) => warn!(error = %err, "reminder retention pass failed"),
        }
    }

    /// Best-effort delivery; a failed notification is logged and the
    /// pipeline moves on (the state change it announced is already
    /// persisted).
    async fn deliver(&self, notes: &[Notification]) {
        if let Err(err) = self.notifier.deliver_all(notes).await {
            warn!(error = %err, "notification delivery failed");
        }
    }

    async fn with_timeout<T, F>(&self, collaborator: &str, future: F) -> Result<T, CollabError>
    where
        F: Future<Output = Result<T, CollabError>>,
    {
        let budget =
            StdDuration::from_secs(self.config.orchestrator.collaborator_timeout_secs);
        match tokio::time::timeout(budget, future).await {
            Ok(result) => result,
            Err(_) => Err(CollabError::Unavailable(format!("{collaborator} call timed out"))),
        }
    }
}
