use sqlx::migrate::{MigrateError, Migrator};
use sqlx::SqlitePool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run(pool: &SqlitePool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
