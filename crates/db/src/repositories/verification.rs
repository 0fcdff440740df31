use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use absentia_core::domain::employee::Handle;
use absentia_core::domain::verification::{VerificationId, VerificationRecord};
use absentia_core::domain::MessageRef;

use super::{enum_from_text, enum_to_text, RepositoryError, VerificationRepository};

#[derive(Clone)]
pub struct SqlVerificationRepository {
    pool: SqlitePool,
}

impl SqlVerificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<VerificationRecord, RepositoryError> {
    let id: String = row.try_get("id")?;
    let corrupt = |reason: String| RepositoryError::CorruptRow { id: id.clone(), reason };

    let dates: String = row.try_get("dates")?;
    let state: String = row.try_get("state")?;
    let check_history: String = row.try_get("check_history")?;
    let transitions: String = row.try_get("transitions")?;

    Ok(VerificationRecord {
        id: VerificationId(id.clone()),
        employee_handle: Handle(row.try_get("employee_handle")?),
        employee_email: row.try_get("employee_email")?,
        employee_name: row.try_get("employee_name")?,
        channel: row.try_get("channel")?,
        message_ref: MessageRef(row.try_get("message_ref")?),
        dates: serde_json::from_str(&dates).map_err(|err| corrupt(err.to_string()))?,
        kind_is_remote: row.try_get::<i64, _>("kind_is_remote")? != 0,
        state: enum_from_text(&state).map_err(|err| corrupt(err.to_string()))?,
        detected_at: row.try_get("detected_at")?,
        grace_until: row.try_get("grace_until")?,
        next_check_at: row.try_get("next_check_at")?,
        checks_performed: row.try_get::<i64, _>("checks_performed")? as u32,
        check_history: serde_json::from_str(&check_history)
            .map_err(|err| corrupt(err.to_string()))?,
        transitions: serde_json::from_str(&transitions).map_err(|err| corrupt(err.to_string()))?,
        last_transition_at: row.try_get("last_transition_at")?,
    })
}

#[async_trait]
impl VerificationRepository for SqlVerificationRepository {
    async fn save(&self, record: &VerificationRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO verification_record (
                id, employee_handle, employee_email, employee_name, channel,
                message_ref, dates, kind_is_remote, state, detected_at,
                grace_until, next_check_at, checks_performed, check_history,
                transitions, last_transition_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT (id) DO UPDATE SET
                state = excluded.state,
                next_check_at = excluded.next_check_at,
                checks_performed = excluded.checks_performed,
                check_history = excluded.check_history,
                transitions = excluded.transitions,
                last_transition_at = excluded.last_transition_at
            "#,
        )
        .bind(&record.id.0)
        .bind(&record.employee_handle.0)
        .bind(&record.employee_email)
        .bind(&record.employee_name)
        .bind(&record.channel)
        .bind(&record.message_ref.0)
        .bind(serde_json::to_string(&record.dates)?)
        .bind(record.kind_is_remote as i64)
        .bind(enum_to_text(&record.state)?)
        .bind(record.detected_at)
        .bind(record.grace_until)
        .bind(record.next_check_at)
        .bind(record.checks_performed as i64)
        .bind(serde_json::to_string(&record.check_history)?)
        .bind(serde_json::to_string(&record.transitions)?)
        .bind(record.last_transition_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(
        &self,
        id: &VerificationId,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM verification_record WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<VerificationRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM verification_record WHERE message_ref = ?1")
            .bind(&message_ref.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_open(&self) -> Result<Vec<VerificationRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM verification_record
            WHERE state NOT IN ('verified', 'escalated', 'resolved')
            ORDER BY detected_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_record(row) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(error = %err, "quarantined corrupt verification row");
                }
            }
        }
        Ok(records)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM verification_record
            WHERE state IN ('verified', 'escalated', 'resolved')
              AND last_transition_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
