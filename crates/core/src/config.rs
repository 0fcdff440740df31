use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration for the orchestrator process.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub chat: ChatConfig,
    pub directory: DirectoryConfig,
    pub approvals: ApprovalPolicy,
    pub verification: VerificationPolicy,
    pub reminders: ReminderSchedule,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_token: SecretString,
    /// Channel monitored for absence mentions.
    pub leave_channel: String,
    /// Channel for administrative notifications (urgent escalations).
    pub admin_channel: String,
}

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    /// Path to the org directory JSON document.
    pub path: PathBuf,
}

/// Approval-chain thresholds and timeout policy.
#[derive(Clone, Debug)]
pub struct ApprovalPolicy {
    pub enabled: bool,
    /// Max duration (days) that auto-approves without any chain.
    pub auto_approve_days: u32,
    /// Durations above this additionally require a senior manager.
    pub senior_approval_days: u32,
    pub timeout_hours: i64,
    pub escalation_enabled: bool,
    pub auto_escalate_on_timeout: bool,
    /// Remote-work absences carry their own threshold and switch,
    /// independent of the ordinary-absence thresholds.
    pub remote_auto_approve_days: u32,
    pub remote_requires_approval: bool,
}

#[derive(Clone, Debug)]
pub struct VerificationPolicy {
    pub grace_period_minutes: i64,
    /// Re-check offsets measured in hours from detection.
    pub recheck_offsets_hours: Vec<i64>,
    /// Terminal records older than this are purged.
    pub retention_days: i64,
}

#[derive(Clone, Debug)]
pub struct ReminderSchedule {
    pub first_followup_hours: i64,
    pub second_escalation_hours: i64,
    pub urgent_hours: i64,
    pub retention_days: i64,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub tick_interval_secs: u64,
    /// Bound on every collaborator call; a timeout is a hard failure for
    /// that item, retried next tick.
    pub collaborator_timeout_secs: u64,
    pub lock_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://absentia.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            chat: ChatConfig {
                bot_token: String::new().into(),
                leave_channel: String::new(),
                admin_channel: String::new(),
            },
            directory: DirectoryConfig { path: PathBuf::from("org_directory.json") },
            approvals: ApprovalPolicy::default(),
            verification: VerificationPolicy::default(),
            reminders: ReminderSchedule::default(),
            orchestrator: OrchestratorConfig {
                tick_interval_secs: 10,
                collaborator_timeout_secs: 30,
                lock_path: PathBuf::from(".absentia.lock"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_approve_days: 2,
            senior_approval_days: 5,
            timeout_hours: 48,
            escalation_enabled: true,
            auto_escalate_on_timeout: true,
            remote_auto_approve_days: 2,
            remote_requires_approval: true,
        }
    }
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            grace_period_minutes: 30,
            recheck_offsets_hours: vec![12, 24, 48],
            retention_days: 30,
        }
    }
}

impl Default for ReminderSchedule {
    fn default() -> Self {
        Self {
            first_followup_hours: 12,
            second_escalation_hours: 48,
            urgent_hours: 72,
            retention_days: 7,
        }
    }
}

/// Partial document shape accepted from the TOML file. Every field is
/// optional; missing values keep their defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    chat: Option<ChatPatch>,
    directory: Option<DirectoryPatch>,
    approvals: Option<ApprovalsPatch>,
    verification: Option<VerificationPatch>,
    reminders: Option<RemindersPatch>,
    orchestrator: Option<OrchestratorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    bot_token: Option<String>,
    leave_channel: Option<String>,
    admin_channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    enabled: Option<bool>,
    auto_approve_days: Option<u32>,
    senior_approval_days: Option<u32>,
    timeout_hours: Option<i64>,
    escalation_enabled: Option<bool>,
    auto_escalate_on_timeout: Option<bool>,
    remote_auto_approve_days: Option<u32>,
    remote_requires_approval: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct VerificationPatch {
    grace_period_minutes: Option<i64>,
    recheck_offsets_hours: Option<Vec<i64>>,
    retention_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RemindersPatch {
    first_followup_hours: Option<i64>,
    second_escalation_hours: Option<i64>,
    urgent_hours: Option<i64>,
    retention_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    tick_interval_secs: Option<u64>,
    collaborator_timeout_secs: Option<u64>,
    lock_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Load configuration: defaults, then the TOML file (if present),
    /// then `ABSENTIA_*` environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| env::var("ABSENTIA_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("absentia.toml"));

        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
            let patch: ConfigPatch = toml::from_str(&raw)
                .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
            config.apply_patch(patch);
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(db) = patch.database {
            apply(&mut self.database.url, db.url);
            apply(&mut self.database.max_connections, db.max_connections);
            apply(&mut self.database.timeout_secs, db.timeout_secs);
        }
        if let Some(chat) = patch.chat {
            if let Some(token) = chat.bot_token {
                self.chat.bot_token = token.into();
            }
            apply(&mut self.chat.leave_channel, chat.leave_channel);
            apply(&mut self.chat.admin_channel, chat.admin_channel);
        }
        if let Some(directory) = patch.directory {
            apply(&mut self.directory.path, directory.path);
        }
        if let Some(approvals) = patch.approvals {
            apply(&mut self.approvals.enabled, approvals.enabled);
            apply(&mut self.approvals.auto_approve_days, approvals.auto_approve_days);
            apply(&mut self.approvals.senior_approval_days, approvals.senior_approval_days);
            apply(&mut self.approvals.timeout_hours, approvals.timeout_hours);
            apply(&mut self.approvals.escalation_enabled, approvals.escalation_enabled);
            apply(&mut self.approvals.auto_escalate_on_timeout, approvals.auto_escalate_on_timeout);
            apply(&mut self.approvals.remote_auto_approve_days, approvals.remote_auto_approve_days);
            apply(&mut self.approvals.remote_requires_approval, approvals.remote_requires_approval);
        }
        if let Some(verification) = patch.verification {
            apply(&mut self.verification.grace_period_minutes, verification.grace_period_minutes);
            apply(&mut self.verification.recheck_offsets_hours, verification.recheck_offsets_hours);
            apply(&mut self.verification.retention_days, verification.retention_days);
        }
        if let Some(reminders) = patch.reminders {
            apply(&mut self.reminders.first_followup_hours, reminders.first_followup_hours);
            apply(&mut self.reminders.second_escalation_hours, reminders.second_escalation_hours);
            apply(&mut self.reminders.urgent_hours, reminders.urgent_hours);
            apply(&mut self.reminders.retention_days, reminders.retention_days);
        }
        if let Some(orchestrator) = patch.orchestrator {
            apply(&mut self.orchestrator.tick_interval_secs, orchestrator.tick_interval_secs);
            apply(
                &mut self.orchestrator.collaborator_timeout_secs,
                orchestrator.collaborator_timeout_secs,
            );
            apply(&mut self.orchestrator.lock_path, orchestrator.lock_path);
        }
        if let Some(logging) = patch.logging {
            apply(&mut self.logging.level, logging.level);
            apply(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("ABSENTIA_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(token) = env::var("ABSENTIA_BOT_TOKEN") {
            self.chat.bot_token = token.into();
        }
        if let Ok(channel) = env::var("ABSENTIA_LEAVE_CHANNEL") {
            self.chat.leave_channel = channel;
        }
        if let Ok(channel) = env::var("ABSENTIA_ADMIN_CHANNEL") {
            self.chat.admin_channel = channel;
        }
        if let Ok(path) = env::var("ABSENTIA_DIRECTORY_PATH") {
            self.directory.path = PathBuf::from(path);
        }
        if let Ok(value) = env::var("ABSENTIA_AUTO_APPROVE_DAYS") {
            self.approvals.auto_approve_days = parse_env("ABSENTIA_AUTO_APPROVE_DAYS", &value)?;
        }
        if let Ok(value) = env::var("ABSENTIA_SENIOR_APPROVAL_DAYS") {
            self.approvals.senior_approval_days =
                parse_env("ABSENTIA_SENIOR_APPROVAL_DAYS", &value)?;
        }
        if let Ok(value) = env::var("ABSENTIA_APPROVAL_TIMEOUT_HOURS") {
            self.approvals.timeout_hours = parse_env("ABSENTIA_APPROVAL_TIMEOUT_HOURS", &value)?;
        }
        if let Ok(value) = env::var("ABSENTIA_GRACE_PERIOD_MINUTES") {
            self.verification.grace_period_minutes =
                parse_env("ABSENTIA_GRACE_PERIOD_MINUTES", &value)?;
        }
        if let Ok(value) = env::var("ABSENTIA_RECHECK_INTERVALS") {
            let offsets: Result<Vec<i64>, _> =
                value.split(',').map(|part| part.trim().parse::<i64>()).collect();
            self.verification.recheck_offsets_hours =
                offsets.map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "ABSENTIA_RECHECK_INTERVALS".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Ok(value) = env::var("ABSENTIA_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Ok(value) = env::var("ABSENTIA_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.verification.recheck_offsets_hours.is_empty() {
            return Err(ConfigError::Validation(
                "verification.recheck_offsets_hours must not be empty".to_string(),
            ));
        }
        if self.verification.grace_period_minutes <= 0 {
            return Err(ConfigError::Validation(
                "verification.grace_period_minutes must be positive".to_string(),
            ));
        }
        if self.approvals.timeout_hours <= 0 {
            return Err(ConfigError::Validation(
                "approvals.timeout_hours must be positive".to_string(),
            ));
        }
        if self.orchestrator.tick_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.tick_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
