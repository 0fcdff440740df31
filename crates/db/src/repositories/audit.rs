use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use absentia_core::audit::AuditEntry;
use absentia_core::domain::approval::ApprovalRequestId;
use absentia_core::domain::employee::Handle;

use super::{enum_from_text, enum_to_text, AuditLogRepository, RepositoryError};

#[derive(Clone)]
pub struct SqlAuditLogRepository {
    pool: SqlitePool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let id: String = row.try_get("id")?;
    let action: String = row.try_get("action")?;

    Ok(AuditEntry {
        id: id.clone(),
        request_id: ApprovalRequestId(row.try_get("request_id")?),
        actor: Handle(row.try_get("actor")?),
        action: enum_from_text(&action)
            .map_err(|err| RepositoryError::CorruptRow { id, reason: err.to_string() })?,
        level: row.try_get::<Option<i64>, _>("level")?.map(|level| level as u32),
        reason: row.try_get("reason")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append(&self, entries: &[AuditEntry]) -> Result<(), RepositoryError> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO approval_audit_log (
                    id, request_id, actor, action, level, reason, occurred_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.request_id.0)
            .bind(&entry.actor.0)
            .bind(enum_to_text(&entry.action)?)
            .bind(entry.level.map(i64::from))
            .bind(&entry.reason)
            .bind(entry.occurred_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_for(
        &self,
        request_id: &ApprovalRequestId,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM approval_audit_log WHERE request_id = ?1 ORDER BY occurred_at, id",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use absentia_core::audit::{AuditAction, AuditEntry};
    use absentia_core::domain::approval::ApprovalRequestId;
    use absentia_core::domain::employee::Handle;

    use super::SqlAuditLogRepository;
    use crate::repositories::{test_pool, AuditLogRepository};

    #[tokio::test]
    async fn append_and_list_preserve_order_and_content() {
        let repo = SqlAuditLogRepository::new(test_pool().await);
        let request_id = ApprovalRequestId("req-1".to_string());
        let now = Utc::now();

        let entries = vec![
            AuditEntry::new(
                request_id.clone(),
                Handle("U-dev".to_string()),
                AuditAction::Create,
                None,
                None,
                now,
            ),
            AuditEntry::new(
                request_id.clone(),
                Handle("U-hr".to_string()),
                AuditAction::OverrideApprove,
                None,
                Some("emergency travel".to_string()),
                now + chrono::Duration::seconds(5),
            ),
        ];
        repo.append(&entries).await.expect("append");

        let listed = repo.list_for(&request_id).await.expect("list");
        assert_eq!(listed, entries);

        let other = repo
            .list_for(&ApprovalRequestId("req-2".to_string()))
            .await
            .expect("list");
        assert!(other.is_empty());
    }
}
