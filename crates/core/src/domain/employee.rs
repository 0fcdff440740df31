use serde::{Deserialize, Serialize};

/// Stable chat-platform handle for an employee (e.g. a Slack user id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(pub String);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry in the org directory. Immutable within a process lifetime;
/// the directory is reloaded wholesale, never patched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub handle: Handle,
    pub email: String,
    pub name: String,
    pub department: String,
    /// Email of the direct manager. `None` at the top of the chain.
    pub manager: Option<String>,
    #[serde(default)]
    pub is_senior_manager: bool,
    #[serde(default)]
    pub is_hr: bool,
}
