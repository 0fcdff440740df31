use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use absentia_core::config::AppConfig;
use absentia_core::directory::OrgDirectory;
use absentia_core::errors::DomainError;
use absentia_db::repositories::{
    SqlApprovalRepository, SqlAuditLogRepository, SqlReminderRepository,
    SqlVerificationRepository,
};

use crate::lock::InstanceLock;
use crate::orchestrator::{Collaborators, Orchestrator, Repositories};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not acquire instance lock `{path}` (is another instance running?): {source}")]
    Lock { path: PathBuf, source: io::Error },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("could not read org directory `{path}`: {source}")]
    DirectoryRead { path: PathBuf, source: io::Error },
    #[error(transparent)]
    DirectoryParse(#[from] DomainError),
}

/// Fully wired process state. The instance lock lives here so it is held
/// for as long as the application does.
pub struct Application {
    pub pool: SqlitePool,
    pub orchestrator: Orchestrator,
    _lock: InstanceLock,
}

/// Assemble the application: lock, database, migrations, org directory,
/// repositories, orchestrator. Fails fast on any of them; a process
/// that cannot fully start must not half-run.
pub async fn build(
    config: AppConfig,
    collab: Collaborators,
) -> Result<Application, BootstrapError> {
    let lock_path = config.orchestrator.lock_path.clone();
    let lock = InstanceLock::acquire(&lock_path)
        .map_err(|source| BootstrapError::Lock { path: lock_path, source })?;

    let pool = absentia_db::connect(&config.database).await?;
    absentia_db::migrations::run(&pool).await?;
    info!(url = %config.database.url, "database ready");

    let directory_path = config.directory.path.clone();
    let raw = std::fs::read_to_string(&directory_path)
        .map_err(|source| BootstrapError::DirectoryRead { path: directory_path, source })?;
    let directory = OrgDirectory::from_json(&raw)?;
    info!(employees = directory.len(), "org directory loaded");

    let repos = Repositories {
        approvals: Arc::new(SqlApprovalRepository::new(pool.clone())),
        verifications: Arc::new(SqlVerificationRepository::new(pool.clone())),
        reminders: Arc::new(SqlReminderRepository::new(pool.clone())),
        audit: Arc::new(SqlAuditLogRepository::new(pool.clone())),
    };

    let orchestrator = Orchestrator::new(config, directory, collab, repos, Utc::now());
    Ok(Application { pool, orchestrator, _lock: lock })
}
