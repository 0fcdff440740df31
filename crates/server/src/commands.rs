//! Approver and HR commands typed into the monitored channel.

use absentia_core::domain::approval::{ApprovalRequestId, Decision};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Ordinary decision by the approver at the active chain level.
    Decide { request_id: ApprovalRequestId, decision: Decision, reason: Option<String> },
    /// HR-only forced decision.
    Override { request_id: ApprovalRequestId, decision: Decision, reason: String },
    /// Close an escalated verification out-of-band.
    Resolve { verification_id: String, reason: String },
}

/// Parse a chat message as a command. Anything unrecognized is `None`
/// and falls through to absence-mention extraction.
pub fn parse(text: &str) -> Option<Command> {
    let mut words = text.split_whitespace();
    match words.next()? {
        "approve" => {
            let request_id = ApprovalRequestId(words.next()?.to_string());
            Some(Command::Decide { request_id, decision: Decision::Approve, reason: None })
        }
        "reject" => {
            let request_id = ApprovalRequestId(words.next()?.to_string());
            let reason = rest(words);
            Some(Command::Decide { request_id, decision: Decision::Reject, reason })
        }
        "override" => {
            let decision = match words.next()? {
                "approve" => Decision::Approve,
                "reject" => Decision::Reject,
                _ => return None,
            };
            let request_id = ApprovalRequestId(words.next()?.to_string());
            // Overrides are always audited, so the reason is mandatory.
            let reason = rest(words)?;
            Some(Command::Override { request_id, decision, reason })
        }
        "resolve" => {
            let verification_id = words.next()?.to_string();
            let reason = rest(words).unwrap_or_else(|| "resolved by operator".to_string());
            Some(Command::Resolve { verification_id, reason })
        }
        _ => None,
    }
}

fn rest<'a>(words: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined = words.collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
