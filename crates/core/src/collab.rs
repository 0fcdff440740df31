use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::employee::Handle;
use crate::domain::{AbsenceKind, MessageRef};

/// Failure of an external collaborator. Always retryable at the item
/// level: the orchestrator logs it and tries again next tick.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// One message observed in the monitored leave channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub channel: String,
    pub sender: Handle,
    pub text: String,
    pub message_ref: MessageRef,
    pub sent_at: DateTime<Utc>,
}

/// Dates and kind pulled out of a free-form announcement. An empty date
/// list means "no absence detected"; the pipeline must treat that as
/// ordinary chatter, never as an error.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedDates {
    pub dates: Vec<NaiveDate>,
    pub kind: AbsenceKind,
    pub confidence: f64,
    pub is_range: bool,
}

impl ExtractedDates {
    pub fn none() -> Self {
        Self { dates: Vec::new(), kind: AbsenceKind::Leave, confidence: 0.0, is_range: false }
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// One absence entry as filed in the HR system. `approved` is false for
/// drafts and pending filings; only approved entries count as coverage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbsenceEntry {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub remote: bool,
    pub approved: bool,
}

/// Chat platform surface the orchestrator needs: reading the monitored
/// channel and delivering notifications. Implementations own auth,
/// retries against the wire, and rate limiting.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Messages in `channel` sent strictly after `since`, oldest first.
    async fn fetch_messages(
        &self,
        channel: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, CollabError>;

    async fn send_direct(&self, recipient: &Handle, text: &str) -> Result<(), CollabError>;

    async fn post_in_thread(
        &self,
        channel: &str,
        parent: &MessageRef,
        text: &str,
    ) -> Result<(), CollabError>;

    async fn post_to_channel(&self, channel: &str, text: &str) -> Result<(), CollabError>;
}

/// Read-only view of the HR leave system. Lookups are scoped to one
/// employee and one calendar year per call.
#[async_trait]
pub trait HrSystem: Send + Sync {
    async fn absences_for(
        &self,
        employee_email: &str,
        year: i32,
    ) -> Result<Vec<AbsenceEntry>, CollabError>;
}

/// Turns a free-form chat message into structured absence dates.
#[async_trait]
pub trait DateExtractor: Send + Sync {
    async fn extract(&self, message: &ChatMessage) -> Result<ExtractedDates, CollabError>;
}

/// Optional message-template override. `None` means no template is
/// defined for the key; callers fall back to an inline default body
/// instead of dropping the message.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, key: &str, context: &HashMap<String, String>) -> Option<String>;
}

/// A message delivered through the in-memory chat fake, captured for
/// assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveredMessage {
    Direct { recipient: Handle, text: String },
    Thread { channel: String, parent: MessageRef, text: String },
    Channel { channel: String, text: String },
}

/// In-memory chat platform for tests and local runs: scripted inbox,
/// captured outbox.
#[derive(Debug, Default)]
pub struct InMemoryChatPlatform {
    inbox: Mutex<Vec<ChatMessage>>,
    outbox: Mutex<Vec<DeliveredMessage>>,
}

impl InMemoryChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_message(&self, message: ChatMessage) {
        self.inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
    }

    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record(&self, message: DeliveredMessage) {
        self.outbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
    }
}

#[async_trait]
impl ChatPlatform for InMemoryChatPlatform {
    async fn fetch_messages(
        &self,
        channel: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChatMessage>, CollabError> {
        let mut messages: Vec<ChatMessage> = self
            .inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|message| message.channel == channel && message.sent_at > since)
            .cloned()
            .collect();
        messages.sort_by(|left, right| left.sent_at.cmp(&right.sent_at));
        Ok(messages)
    }

    async fn send_direct(&self, recipient: &Handle, text: &str) -> Result<(), CollabError> {
        self.record(DeliveredMessage::Direct {
            recipient: recipient.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn post_in_thread(
        &self,
        channel: &str,
        parent: &MessageRef,
        text: &str,
    ) -> Result<(), CollabError> {
        self.record(DeliveredMessage::Thread {
            channel: channel.to_string(),
            parent: parent.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn post_to_channel(&self, channel: &str, text: &str) -> Result<(), CollabError> {
        self.record(DeliveredMessage::Channel {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// In-memory HR system keyed by employee email and calendar year.
#[derive(Debug, Default)]
pub struct InMemoryHrSystem {
    entries: Mutex<HashMap<(String, i32), Vec<AbsenceEntry>>>,
    unavailable: Mutex<bool>,
}

impl InMemoryHrSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_absence(&self, employee_email: &str, year: i32, entry: AbsenceEntry) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry((employee_email.to_string(), year))
            .or_default()
            .push(entry);
    }

    /// Simulate an outage; every lookup fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = unavailable;
    }
}

#[async_trait]
impl HrSystem for InMemoryHrSystem {
    async fn absences_for(
        &self,
        employee_email: &str,
        year: i32,
    ) -> Result<Vec<AbsenceEntry>, CollabError> {
        if *self.unavailable.lock().unwrap_or_else(std::sync::PoisonError::into_inner) {
            return Err(CollabError::Unavailable("hr system offline".to_string()));
        }
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(employee_email.to_string(), year))
            .cloned()
            .unwrap_or_default())
    }
}

/// Extractor scripted per message reference. Unscripted messages are
/// treated as ordinary chatter.
#[derive(Debug, Default)]
pub struct ScriptedDateExtractor {
    by_message: Mutex<HashMap<MessageRef, ExtractedDates>>,
}

impl ScriptedDateExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, message_ref: MessageRef, extracted: ExtractedDates) {
        self.by_message
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(message_ref, extracted);
    }
}

#[async_trait]
impl DateExtractor for ScriptedDateExtractor {
    async fn extract(&self, message: &ChatMessage) -> Result<ExtractedDates, CollabError> {
        Ok(self
            .by_message
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&message.message_ref)
            .cloned()
            .unwrap_or_else(ExtractedDates::none))
    }
}

/// Template store keyed by template name, with `{placeholder}`
/// substitution from the context map. Keys without a stored template
/// return `None` so callers use their inline defaults.
#[derive(Debug, Default)]
pub struct InMemoryTemplateRenderer {
    templates: Mutex<HashMap<String, String>>,
}

impl InMemoryTemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, key: impl Into<String>, body: impl Into<String>) {
        self.templates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.into(), body.into());
    }
}

impl TemplateRenderer for InMemoryTemplateRenderer {
    fn render(&self, key: &str, context: &HashMap<String, String>) -> Option<String> {
        let body = self
            .templates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()?;
        let mut rendered = body;
        for (name, value) in context {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        Some(rendered)
    }
}
