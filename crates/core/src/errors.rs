use thiserror::Error;

use crate::domain::employee::Handle;

/// Error taxonomy for the compliance core.
///
/// Validation and authorization errors are terminal for the single
/// operation and surfaced to the caller immediately. Collaborator
/// failures are swallowed at the record level by the orchestration loop
/// (logged, retried next tick) so one failing item never blocks the
/// tick for all others.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("actor `{actor}` is not authorized: expected `{expected}`")]
    NotAuthorized { actor: Handle, expected: String },
    #[error("collaborator `{collaborator}` unavailable: {reason}")]
    CollaboratorUnavailable { collaborator: String, reason: String },
    #[error("cycle detected in manager chain at `{at}`")]
    CycleDetected { at: String },
    #[error("corrupt persisted state for record `{record_id}`: {reason}")]
    CorruptState { record_id: String, reason: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Collaborator failures must never fail the whole tick; callers use
    /// this to decide between "skip and retry next tick" and "surface".
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::DomainError;
    use crate::domain::employee::Handle;

    #[test]
    fn only_collaborator_failures_are_retryable() {
        assert!(DomainError::CollaboratorUnavailable {
            collaborator: "hr_system".to_string(),
            reason: "timeout".to_string(),
        }
        .is_retryable());

        assert!(!DomainError::validation("empty date list").is_retryable());
        assert!(!DomainError::NotAuthorized {
            actor: Handle("U1".to_string()),
            expected: "U2".to_string(),
        }
        .is_retryable());
    }
}
