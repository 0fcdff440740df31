use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::approvals::ApprovalSignal;
use crate::collab::{ChatPlatform, CollabError, TemplateRenderer};
use crate::directory::OrgDirectory;
use crate::domain::approval::ApprovalRequest;
use crate::domain::employee::Handle;
use crate::domain::reminder::{ReminderChannel, ReminderLevel, ReminderRecord};
use crate::domain::MessageRef;

/// Where a rendered notification goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationTarget {
    Direct(Handle),
    Thread { channel: String, parent: MessageRef },
    Channel(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub target: NotificationTarget,
    pub text: String,
}

fn format_dates(dates: &[NaiveDate]) -> String {
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) if first != last => format!("{first} to {last}"),
        (Some(only), _) => only.to_string(),
        _ => String::new(),
    }
}

/// Template lookup with an inline fallback; a missing template never
/// drops a message.
fn render_or(
    templates: &dyn TemplateRenderer,
    key: &str,
    context: &HashMap<String, String>,
    fallback: impl FnOnce() -> String,
) -> String {
    templates.render(key, context).unwrap_or_else(fallback)
}

fn approval_context(request: &ApprovalRequest, reason: Option<&str>) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert("employee".to_string(), request.employee_name.clone());
    context.insert("dates".to_string(), format_dates(&request.dates));
    context.insert("duration_days".to_string(), request.duration_days.to_string());
    context.insert("request_id".to_string(), request.id.0.clone());
    if let Some(reason) = reason {
        context.insert("reason".to_string(), reason.to_string());
    }
    context
}

/// Render the concrete notifications for one approval signal. The engine
/// decides WHO must hear WHAT; this is the only place wording lives.
pub fn approval_notifications(
    signal: &ApprovalSignal,
    request: &ApprovalRequest,
    admin_channel: &str,
    templates: &dyn TemplateRenderer,
) -> Vec<Notification> {
    let dates = format_dates(&request.dates);
    match signal {
        ApprovalSignal::NotifyApprover { level } => match request.chain.get(*level) {
            Some(approver) => {
                let mut context = approval_context(request, None);
                context.insert("approver".to_string(), approver.approver_name.clone());
                let text = render_or(templates, "approval_prompt", &context, || {
                    format!(
                        "Approval needed: {} requested {} day(s) off ({}). \
                         Reply `approve {}` or `reject {} <reason>`.",
                        request.employee_name, request.duration_days, dates, request.id, request.id
                    )
                });
                vec![Notification {
                    target: NotificationTarget::Direct(approver.approver_handle.clone()),
                    text,
                }]
            }
            None => Vec::new(),
        },
        ApprovalSignal::NotifyEmployeeApproved => {
            let context = approval_context(request, None);
            let text = render_or(templates, "approval_approved", &context, || {
                format!("Your absence request for {dates} has been approved.")
            });
            vec![Notification {
                target: NotificationTarget::Direct(request.employee_handle.clone()),
                text,
            }]
        }
        ApprovalSignal::NotifyEmployeeRejected { reason } => {
            let context = approval_context(request, Some(reason));
            let text = render_or(templates, "approval_rejected", &context, || {
                format!("Your absence request for {dates} was rejected: {reason}")
            });
            vec![Notification {
                target: NotificationTarget::Direct(request.employee_handle.clone()),
                text,
            }]
        }
        ApprovalSignal::NotifyHrEscalated { reason } => {
            let context = approval_context(request, Some(reason));
            let text = render_or(templates, "approval_escalated", &context, || {
                format!("Approval escalation for {} ({dates}): {reason}", request.employee_name)
            });
            vec![Notification {
                target: NotificationTarget::Channel(admin_channel.to_string()),
                text,
            }]
        }
    }
}

/// Render one reminder rung as concrete notifications. The urgent rung
/// tags the employee's manager in the admin channel when one exists.
pub fn reminder_notifications(
    record: &ReminderRecord,
    level: ReminderLevel,
    channels: &[ReminderChannel],
    template_key: &str,
    directory: &OrgDirectory,
    admin_channel: &str,
    templates: &dyn TemplateRenderer,
) -> Vec<Notification> {
    let dates = format_dates(&record.dates);
    let mut context = HashMap::new();
    context.insert("employee".to_string(), record.employee_name.clone());
    context.insert("dates".to_string(), dates.clone());

    channels
        .iter()
        .map(|channel| match channel {
            ReminderChannel::Direct => Notification {
                target: NotificationTarget::Direct(record.employee_handle.clone()),
                text: render_or(templates, template_key, &context, || match level {
                    ReminderLevel::FirstFollowup => format!(
                        "Friendly reminder: your announced absence ({dates}) is not yet \
                         filed in the HR system. Please file it when you get a moment."
                    ),
                    ReminderLevel::SecondEscalation => format!(
                        "Second reminder: your absence ({dates}) still is not filed in \
                         the HR system. Please file it today."
                    ),
                    ReminderLevel::Urgent => format!(
                        "Urgent: your absence ({dates}) remains unfiled and has been \
                         escalated. Please file it immediately."
                    ),
                }),
            },
            ReminderChannel::Thread => Notification {
                target: NotificationTarget::Thread {
                    channel: record.channel.clone(),
                    parent: record.message_ref.clone(),
                },
                text: format!(
                    "{}: please file this absence ({dates}) in the HR system.",
                    record.employee_name
                ),
            },
            ReminderChannel::Admin => {
                let manager_tag = directory
                    .lookup_email(&record.employee_email)
                    .and_then(|employee| directory.manager_of(employee))
                    .map(|manager| format!(" cc <@{}>", manager.handle))
                    .unwrap_or_default();
                Notification {
                    target: NotificationTarget::Channel(admin_channel.to_string()),
                    text: format!(
                        "Unfiled absence: {} announced {dates} and has not filed it \
                         despite repeated reminders.{manager_tag}",
                        record.employee_name
                    ),
                }
            }
        })
        .collect()
}

/// Delivers rendered notifications through the chat platform.
#[derive(Clone)]
pub struct Notifier {
    chat: Arc<dyn ChatPlatform>,
}

impl Notifier {
    pub fn new(chat: Arc<dyn ChatPlatform>) -> Self {
        Self { chat }
    }

    pub async fn deliver(&self, notification: &Notification) -> Result<(), CollabError> {
        match &notification.target {
            NotificationTarget::Direct(recipient) => {
                self.chat.send_direct(recipient, &notification.text).await
            }
            NotificationTarget::Thread { channel, parent } => {
                self.chat.post_in_thread(channel, parent, &notification.text).await
            }
            NotificationTarget::Channel(channel) => {
                self.chat.post_to_channel(channel, &notification.text).await
            }
        }
    }

    pub async fn deliver_all(&self, notifications: &[Notification]) -> Result<(), CollabError> {
        for notification in notifications {
            self.deliver(notification).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::{approval_notifications, reminder_notifications, NotificationTarget, Notifier};
    use crate::approvals::{ApprovalEngine, ApprovalSignal};
    use crate::collab::{DeliveredMessage, InMemoryChatPlatform, InMemoryTemplateRenderer};
    use crate::config::{ApprovalPolicy, ReminderSchedule, VerificationPolicy};
    use crate::directory::OrgDirectory;
    use crate::domain::employee::{Employee, Handle};
    use crate::domain::reminder::ReminderLevel;
    use crate::domain::{AbsenceKind, MessageRef};
    use crate::reminders::ReminderEscalator;
    use crate::verification::VerificationTracker;

    fn employee(handle: &str, email: &str, manager: Option<&str>) -> Employee {
        Employee {
            handle: Handle(handle.to_string()),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            department: "engineering".to_string(),
            manager: manager.map(str::to_string),
            is_senior_manager: false,
            is_hr: false,
        }
    }

    fn directory() -> OrgDirectory {
        OrgDirectory::new(vec![
            employee("U-dev", "dev@example.com", Some("mgr@example.com")),
            employee("U-mgr", "mgr@example.com", None),
        ])
    }

    fn pending_outcome(message: &str) -> crate::approvals::ApprovalOutcome {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let start = Utc::now().date_naive() + chrono::Duration::days(14);
        let dates: Vec<_> = (0..5).map(|d| start + chrono::Duration::days(d)).collect();
        ApprovalEngine::new(ApprovalPolicy::default())
            .create_request(
                &directory,
                &dev,
                &dates,
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef(message.to_string()),
                Utc::now(),
            )
            .expect("create")
    }

    #[test]
    fn approver_prompt_goes_to_the_active_level() {
        let outcome = pending_outcome("4001.1");
        let templates = InMemoryTemplateRenderer::new();

        let notes =
            approval_notifications(&outcome.signals[0], &outcome.request, "C-admin", &templates);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].target, NotificationTarget::Direct(Handle("U-mgr".to_string())));
        assert!(notes[0].text.contains("5 day(s)"));
    }

    #[test]
    fn defined_template_overrides_the_inline_default() {
        let outcome = pending_outcome("4001.2");
        let templates = InMemoryTemplateRenderer::new();
        templates.define("approval_prompt", "{employee} wants {duration_days} days: {dates}");

        let notes =
            approval_notifications(&outcome.signals[0], &outcome.request, "C-admin", &templates);
        assert!(notes[0].text.starts_with("dev wants 5 days:"));
    }

    #[test]
    fn urgent_reminder_tags_the_manager_in_the_admin_channel() {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let verification = VerificationTracker::new(VerificationPolicy::default())
            .create_record(
                &dev,
                vec!["2026-09-07".parse().expect("date")],
                AbsenceKind::Leave,
                "C-leave",
                &MessageRef("4001.3".to_string()),
                Utc::now(),
            )
            .expect("create");
        let escalator = ReminderEscalator::new(ReminderSchedule::default());
        let record = escalator.create_for(&verification);
        let templates = InMemoryTemplateRenderer::new();

        let notes = reminder_notifications(
            &record,
            ReminderLevel::Urgent,
            &escalator.channels_for(ReminderLevel::Urgent),
            escalator.template_key(ReminderLevel::Urgent),
            &directory,
            "C-admin",
            &templates,
        );
        assert_eq!(notes.len(), 2);
        let admin = notes
            .iter()
            .find(|note| note.target == NotificationTarget::Channel("C-admin".to_string()))
            .expect("admin note");
        assert!(admin.text.contains("<@U-mgr>"));
    }

    #[tokio::test]
    async fn notifier_routes_each_target_kind() {
        let chat = Arc::new(InMemoryChatPlatform::new());
        let notifier = Notifier::new(chat.clone());
        let templates = InMemoryTemplateRenderer::new();

        let outcome = pending_outcome("4001.4");
        let rejected = approval_notifications(
            &ApprovalSignal::NotifyEmployeeRejected { reason: "coverage gap".to_string() },
            &outcome.request,
            "C-admin",
            &templates,
        );
        notifier.deliver_all(&rejected).await.expect("deliver");

        let delivered = chat.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(matches!(delivered[0], DeliveredMessage::Direct { .. }));
    }
}
