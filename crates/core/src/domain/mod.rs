pub mod approval;
pub mod employee;
pub mod reminder;
pub mod verification;

use serde::{Deserialize, Serialize};

/// Unique, monotonic reference to a chat message. Used for deduplication
/// and for threading replies back to the original announcement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageRef(pub String);

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an announced absence is ordinary leave or a remote-work day.
/// Remote work carries its own auto-approve threshold and on/off switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceKind {
    Leave,
    RemoteWork,
}
