//! Write journal repository.
//!
//! Every submitted write is recorded here before the gateway waits for it to
//! finalize, so that an interrupted or timed-out write can be recognised and
//! reconciled later.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalStatus {
    Pending,
    Confirmed,
    Reverted,
    Timeout,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Pending => "pending",
            JournalStatus::Confirmed => "confirmed",
            JournalStatus::Reverted => "reverted",
            JournalStatus::Timeout => "timeout",
        }
    }

    /// Still awaiting a final receipt.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JournalStatus::Pending | JournalStatus::Timeout)
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JournalStatus::Pending),
            "confirmed" => Ok(JournalStatus::Confirmed),
            "reverted" => Ok(JournalStatus::Reverted),
            "timeout" => Ok(JournalStatus::Timeout),
            other => Err(format!("unknown journal status: {}", other)),
        }
    }
}

/// One journaled write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: String,
    pub operation: String,
    pub target: String,
    /// Company a registry write concerns; `None` for asset writes.
    pub subject: Option<String>,
    pub signer: String,
    pub args_digest: String,
    pub tx_hash: String,
    pub status: JournalStatus,
    pub error: Option<String>,
    pub submitted_at: i64,
    pub updated_at: i64,
}

/// Fields of a write about to be journaled.
#[derive(Debug, Clone, Copy)]
pub struct NewJournalEntry<'a> {
    pub operation: &'a str,
    pub target: &'a str,
    pub subject: Option<&'a str>,
    pub signer: &'a str,
    pub args_digest: &'a str,
    pub tx_hash: &'a str,
}

fn entry_from_row(row: &SqliteRow) -> Result<JournalEntry, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = JournalStatus::from_str(&status).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: e.into(),
    })?;
    Ok(JournalEntry {
        id: row.try_get("id")?,
        operation: row.try_get("operation")?,
        target: row.try_get("target")?,
        subject: row.try_get("subject")?,
        signer: row.try_get("signer")?,
        args_digest: row.try_get("args_digest")?,
        tx_hash: row.try_get("tx_hash")?,
        status,
        error: row.try_get("error")?,
        submitted_at: row.try_get("submitted_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "SELECT id, operation, target, subject, signer, args_digest, tx_hash, \
    status, error, submitted_at, updated_at FROM write_journal";

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Records a submitted write as `pending`.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn record_submitted(
        &self,
        entry: NewJournalEntry<'_>,
    ) -> Result<JournalEntry, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO write_journal
                (id, operation, target, subject, signer, args_digest, tx_hash, status, error,
                 submitted_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(entry.operation)
        .bind(entry.target)
        .bind(entry.subject)
        .bind(entry.signer)
        .bind(entry.args_digest)
        .bind(entry.tx_hash)
        .bind(JournalStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(JournalEntry {
            id,
            operation: entry.operation.to_string(),
            target: entry.target.to_string(),
            subject: entry.subject.map(str::to_string),
            signer: entry.signer.to_string(),
            args_digest: entry.args_digest.to_string(),
            tx_hash: entry.tx_hash.to_string(),
            status: JournalStatus::Pending,
            error: None,
            submitted_at: now,
            updated_at: now,
        })
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: JournalStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE write_journal SET status = ?, error = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(chrono::Utc::now().timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Latest unresolved write with the same operation, target and arguments.
    pub async fn find_in_flight(
        &self,
        operation: &str,
        target: &str,
        args_digest: &str,
    ) -> Result<Option<JournalEntry>, sqlx::Error> {
        let sql = format!(
            "{} WHERE operation = ? AND target = ? AND args_digest = ? \
             AND status IN ('pending', 'timeout') ORDER BY submitted_at DESC, rowid DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(operation)
            .bind(target)
            .bind(args_digest)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Whether any write of `operation` against `target` is unresolved.
    pub async fn has_in_flight(&self, operation: &str, target: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM write_journal WHERE operation = ? AND target = ? \
             AND status IN ('pending', 'timeout')",
        )
        .bind(operation)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }

    pub async fn has_confirmed(&self, operation: &str, target: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM write_journal WHERE operation = ? AND target = ? \
             AND status = 'confirmed'",
        )
        .bind(operation)
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }

    /// Whether a write of `operation` concerning `subject` was confirmed.
    pub async fn has_confirmed_for_subject(
        &self,
        operation: &str,
        subject: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM write_journal WHERE operation = ? AND subject = ? \
             AND status = 'confirmed'",
        )
        .bind(operation)
        .bind(subject)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }

    /// All unresolved writes, oldest first.
    pub async fn in_flight_entries(&self) -> Result<Vec<JournalEntry>, sqlx::Error> {
        let sql = format!(
            "{} WHERE status IN ('pending', 'timeout') ORDER BY submitted_at ASC, rowid ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// All writes against `target`, oldest first.
    pub async fn entries_for_target(&self, target: &str) -> Result<Vec<JournalEntry>, sqlx::Error> {
        let sql = format!(
            "{} WHERE target = ? ORDER BY submitted_at ASC, rowid ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(target).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn entry<'a>(operation: &'a str, tx_hash: &'a str) -> NewJournalEntry<'a> {
        NewJournalEntry {
            operation,
            target: "0x00000000000000000000000000000000a55e7001",
            subject: None,
            signer: "0x000000000000000000000000000000000000000e",
            args_digest: "abc123",
            tx_hash,
        }
    }

    #[tokio::test]
    async fn test_record_and_resolve() {
        let (repo, _temp) = setup_test_db().await;
        let recorded = repo
            .record_submitted(entry("pause", "0x01"))
            .await
            .unwrap();
        assert_eq!(recorded.status, JournalStatus::Pending);

        let in_flight = repo
            .find_in_flight("pause", recorded.target.as_str(), "abc123")
            .await
            .unwrap();
        assert_eq!(in_flight.map(|e| e.id), Some(recorded.id.clone()));

        repo.update_status(&recorded.id, JournalStatus::Confirmed, None)
            .await
            .unwrap();
        assert!(repo
            .find_in_flight("pause", recorded.target.as_str(), "abc123")
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .has_confirmed("pause", recorded.target.as_str())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_timeout_rows_stay_in_flight() {
        let (repo, _temp) = setup_test_db().await;
        let recorded = repo
            .record_submitted(entry("activate_trading", "0x02"))
            .await
            .unwrap();
        repo.update_status(&recorded.id, JournalStatus::Timeout, Some("no receipt"))
            .await
            .unwrap();

        assert!(repo
            .has_in_flight("activate_trading", recorded.target.as_str())
            .await
            .unwrap());
        let pending = repo.in_flight_entries().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, JournalStatus::Timeout);
        assert_eq!(pending[0].error.as_deref(), Some("no receipt"));
    }

    #[tokio::test]
    async fn test_confirmed_by_subject() {
        let (repo, _temp) = setup_test_db().await;
        let recorded = repo
            .record_submitted(NewJournalEntry {
                subject: Some("7"),
                ..entry("create_asset", "0x05")
            })
            .await
            .unwrap();
        assert_eq!(recorded.subject.as_deref(), Some("7"));
        assert!(!repo.has_confirmed_for_subject("create_asset", "7").await.unwrap());

        repo.update_status(&recorded.id, JournalStatus::Confirmed, None)
            .await
            .unwrap();
        assert!(repo.has_confirmed_for_subject("create_asset", "7").await.unwrap());
        assert!(!repo.has_confirmed_for_subject("create_asset", "8").await.unwrap());
        let pending = repo.in_flight_entries().await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_entries_for_target_in_order() {
        let (repo, _temp) = setup_test_db().await;
        repo.record_submitted(entry("pause", "0x03")).await.unwrap();
        repo.record_submitted(entry("unpause", "0x04")).await.unwrap();

        let entries = repo
            .entries_for_target("0x00000000000000000000000000000000a55e7001")
            .await
            .unwrap();
        let ops: Vec<_> = entries.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(ops, vec!["pause", "unpause"]);
    }
}
