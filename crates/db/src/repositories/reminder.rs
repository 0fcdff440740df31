use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use absentia_core::domain::employee::Handle;
use absentia_core::domain::reminder::ReminderRecord;
use absentia_core::domain::verification::VerificationId;
use absentia_core::domain::MessageRef;

use super::{enum_from_text, enum_to_text, ReminderRepository, RepositoryError};

#[derive(Clone)]
pub struct SqlReminderRepository {
    pool: SqlitePool,
}

impl SqlReminderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<ReminderRecord, RepositoryError> {
    let id: String = row.try_get("verification_id")?;
    let corrupt = |reason: String| RepositoryError::CorruptRow { id: id.clone(), reason };

    let dates: String = row.try_get("dates")?;
    let level: Option<String> = row.try_get("level")?;
    let history: String = row.try_get("history")?;

    Ok(ReminderRecord {
        verification_id: VerificationId(id.clone()),
        employee_handle: Handle(row.try_get("employee_handle")?),
        employee_email: row.try_get("employee_email")?,
        employee_name: row.try_get("employee_name")?,
        channel: row.try_get("channel")?,
        message_ref: MessageRef(row.try_get("message_ref")?),
        dates: serde_json::from_str(&dates).map_err(|err| corrupt(err.to_string()))?,
        detected_at: row.try_get("detected_at")?,
        level: level
            .as_deref()
            .map(enum_from_text)
            .transpose()
            .map_err(|err| corrupt(err.to_string()))?,
        next_due: row.try_get("next_due")?,
        history: serde_json::from_str(&history).map_err(|err| corrupt(err.to_string()))?,
        resolved: row.try_get::<i64, _>("resolved")? != 0,
        resolved_at: row.try_get("resolved_at")?,
    })
}

#[async_trait]
impl ReminderRepository for SqlReminderRepository {
    async fn save(&self, record: &ReminderRecord) -> Result<(), RepositoryError> {
        let level = record.level.as_ref().map(enum_to_text).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO reminder_record (
                verification_id, employee_handle, employee_email, employee_name,
                channel, message_ref, dates, detected_at, level, next_due,
                history, resolved, resolved_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT (verification_id) DO UPDATE SET
                level = excluded.level,
                next_due = excluded.next_due,
                history = excluded.history,
                resolved = excluded.resolved,
                resolved_at = excluded.resolved_at
            "#,
        )
        .bind(&record.verification_id.0)
        .bind(&record.employee_handle.0)
        .bind(&record.employee_email)
        .bind(&record.employee_name)
        .bind(&record.channel)
        .bind(&record.message_ref.0)
        .bind(serde_json::to_string(&record.dates)?)
        .bind(record.detected_at)
        .bind(level)
        .bind(record.next_due)
        .bind(serde_json::to_string(&record.history)?)
        .bind(record.resolved as i64)
        .bind(record.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: &VerificationId) -> Result<Option<ReminderRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM reminder_record WHERE verification_id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_unresolved(&self) -> Result<Vec<ReminderRecord>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM reminder_record WHERE resolved = 0 ORDER BY detected_at")
                .fetch_all(&self.pool)
                .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_record(row) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(error = %err, "quarantined corrupt reminder row");
                }
            }
        }
        Ok(records)
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM reminder_record WHERE resolved = 1 AND resolved_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
