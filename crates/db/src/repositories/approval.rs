use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use absentia_core::domain::approval::{ApprovalRequest, ApprovalRequestId};
use absentia_core::domain::employee::Handle;
use absentia_core::domain::MessageRef;

use super::{enum_from_text, enum_to_text, ApprovalRepository, RepositoryError};

#[derive(Clone)]
pub struct SqlApprovalRepository {
    pool: SqlitePool,
}

impl SqlApprovalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_request(row: &SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let id: String = row.try_get("id")?;
    let corrupt = |reason: String| RepositoryError::CorruptRow { id: id.clone(), reason };

    let dates: String = row.try_get("dates")?;
    let chain: String = row.try_get("chain")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;

    Ok(ApprovalRequest {
        id: ApprovalRequestId(id.clone()),
        employee_handle: Handle(row.try_get("employee_handle")?),
        employee_email: row.try_get("employee_email")?,
        employee_name: row.try_get("employee_name")?,
        channel: row.try_get("channel")?,
        message_ref: MessageRef(row.try_get("message_ref")?),
        dates: serde_json::from_str(&dates).map_err(|err| corrupt(err.to_string()))?,
        duration_days: row.try_get::<i64, _>("duration_days")? as u32,
        kind: enum_from_text(&kind).map_err(|err| corrupt(err.to_string()))?,
        chain: serde_json::from_str(&chain).map_err(|err| corrupt(err.to_string()))?,
        current_level: row.try_get::<i64, _>("current_level")? as usize,
        status: enum_from_text(&status).map_err(|err| corrupt(err.to_string()))?,
        rejection_reason: row.try_get("rejection_reason")?,
        escalation_reason: row.try_get("escalation_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        decided_at: row.try_get("decided_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn save(&self, request: &ApprovalRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO approval_request (
                id, employee_handle, employee_email, employee_name, channel,
                message_ref, dates, duration_days, kind, chain, current_level,
                status, rejection_reason, escalation_reason, created_at,
                updated_at, decided_at, expires_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT (id) DO UPDATE SET
                chain = excluded.chain,
                current_level = excluded.current_level,
                status = excluded.status,
                rejection_reason = excluded.rejection_reason,
                escalation_reason = excluded.escalation_reason,
                updated_at = excluded.updated_at,
                decided_at = excluded.decided_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&request.id.0)
        .bind(&request.employee_handle.0)
        .bind(&request.employee_email)
        .bind(&request.employee_name)
        .bind(&request.channel)
        .bind(&request.message_ref.0)
        .bind(serde_json::to_string(&request.dates)?)
        .bind(request.duration_days as i64)
        .bind(enum_to_text(&request.kind)?)
        .bind(serde_json::to_string(&request.chain)?)
        .bind(request.current_level as i64)
        .bind(enum_to_text(&request.status)?)
        .bind(&request.rejection_reason)
        .bind(&request.escalation_reason)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.decided_at)
        .bind(request.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        id: &ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM approval_request WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM approval_request WHERE message_ref = ?1")
            .bind(&message_ref.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_request).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM approval_request WHERE status = 'pending' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_request(row) {
                Ok(request) => requests.push(request),
                Err(err) => {
                    tracing::warn!(error = %err, "quarantined corrupt approval row");
                }
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use absentia_core::approvals::ApprovalEngine;
    use absentia_core::config::ApprovalPolicy;
    use absentia_core::directory::OrgDirectory;
    use absentia_core::domain::approval::{ApprovalStatus, Decision};
    use absentia_core::domain::employee::{Employee, Handle};
    use absentia_core::domain::{AbsenceKind, MessageRef};

    use super::SqlApprovalRepository;
    use crate::repositories::{test_pool, ApprovalRepository};

    fn directory() -> OrgDirectory {
        OrgDirectory::new(vec![
            Employee {
                handle: Handle("U-dev".to_string()),
                email: "dev@example.com".to_string(),
                name: "dev".to_string(),
                department: "engineering".to_string(),
                manager: Some("mgr@example.com".to_string()),
                is_senior_manager: false,
                is_hr: false,
            },
            Employee {
                handle: Handle("U-mgr".to_string()),
                email: "mgr@example.com".to_string(),
                name: "mgr".to_string(),
                department: "engineering".to_string(),
                manager: None,
                is_senior_manager: false,
                is_hr: false,
            },
        ])
    }

    fn pending_request(message: &str) -> absentia_core::domain::approval::ApprovalRequest {
        let directory = directory();
        let dev = directory.lookup_email("dev@example.com").expect("dev").clone();
        let start = Utc::now().date_naive() + Duration::days(14);
        let dates: Vec<_> = (0..5).map(|d| start + Duration::days(d)).collect();
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
            .request
    }

    #[tokio::test]
    async fn save_find_round_trips_the_whole_chain() {
        let repo = SqlApprovalRepository::new(test_pool().await);
        let request = pending_request("5001.1");

        repo.save(&request).await.expect("save");
        let loaded = repo.find(&request.id).await.expect("find").expect("present");
        assert_eq!(loaded, request);

        let by_message =
            repo.find_by_message(&request.message_ref).await.expect("find").expect("present");
        assert_eq!(by_message.id, request.id);
    }

    #[tokio::test]
    async fn save_is_an_upsert_on_id() {
        let repo = SqlApprovalRepository::new(test_pool().await);
        let request = pending_request("5001.2");
        repo.save(&request).await.expect("save");

        let decided = ApprovalEngine::new(ApprovalPolicy::default())
            .record_decision(
                request,
                0,
                &Handle("U-mgr".to_string()),
                Decision::Approve,
                None,
                Utc::now(),
            )
            .expect("approve")
            .request;
        repo.save(&decided).await.expect("resave");

        let loaded = repo.find(&decided.id).await.expect("find").expect("present");
        assert_eq!(loaded.status, ApprovalStatus::Approved);
        assert_eq!(loaded.current_level, 1);
    }

    #[tokio::test]
    async fn list_pending_skips_terminal_and_corrupt_rows() {
        let pool = test_pool().await;
        let repo = SqlApprovalRepository::new(pool.clone());

        let pending = pending_request("5001.3");
        repo.save(&pending).await.expect("save");

        let decided = ApprovalEngine::new(ApprovalPolicy::default())
            .record_decision(
                pending_request("5001.4"),
                0,
                &Handle("U-mgr".to_string()),
                Decision::Approve,
                None,
                Utc::now(),
            )
            .expect("approve")
            .request;
        repo.save(&decided).await.expect("save");

        // A row with unparseable JSON must be skipped, not fatal.
        sqlx::query(
            r#"
            INSERT INTO approval_request (
                id, employee_handle, employee_email, employee_name, channel,
                message_ref, dates, duration_days, kind, chain, current_level,
                status, created_at, updated_at, expires_at
            )
            VALUES ('broken', 'U-x', 'x@example.com', 'x', 'C-leave', '5001.5',
                    'not json', 1, 'leave', 'not json', 0, 'pending',
                    '2026-08-01T00:00:00Z', '2026-08-01T00:00:00Z',
                    '2026-08-03T00:00:00Z')
            "#,
        )
        .execute(&pool)
        .await
        .expect("insert corrupt row");

        let listed = repo.list_pending().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, pending.id);
    }
}
