//! Journal database initialization.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (or create) the journal database and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5_000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;

    info!(path = db_path, "journal database ready");
    Ok(pool)
}

/// Applies every statement of the bundled schema. Statements are idempotent.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema_sql = include_str!("schema.sql");
    let mut applied = 0usize;
    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
            applied += 1;
        }
    }
    info!(statements = applied, "schema applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db_path(dir: &TempDir) -> String {
        dir.path().join("journal.db").to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_init_db_creates_journal_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = db_path(&temp_dir);
        let pool = init_db(&path).await.expect("init_db failed");
        assert!(Path::new(&path).exists());

        let result: (String,) = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='write_journal'",
        )
        .fetch_one(&pool)
        .await
        .expect("query failed");
        assert_eq!(result.0, "write_journal");
    }

    #[tokio::test]
    async fn test_schema_is_reapplicable() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");
        apply_schema(&pool).await.expect("second schema run failed");
    }

    #[tokio::test]
    async fn test_nested_directory_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir
            .path()
            .join("nested/dir/journal.db")
            .to_string_lossy()
            .to_string();
        init_db(&path).await.expect("init_db failed");
        assert!(Path::new(&path).exists());
    }

    #[tokio::test]
    async fn test_status_constraint() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");
        let result = sqlx::query(
            "INSERT INTO write_journal VALUES ('id', 'pause', 't', NULL, 's', 'd', '0x1', 'bogus', NULL, 0, 0)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
