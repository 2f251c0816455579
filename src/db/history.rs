//! Persistent change history.
//!
//! Every committed save appends one row describing which entities it
//! touched and who wrote it. Readers remember the last token they
//! processed and ask for everything after it, which is how the session
//! notices writes made by the sync worker on other connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Author recorded for saves made by this session.
pub const AUTHOR_LOCAL: &str = "local";
/// Author recorded for changes applied from the cloud container.
pub const AUTHOR_REMOTE: &str = "remote";

/// Position in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryToken(pub i64);

impl HistoryToken {
    pub fn zero() -> Self {
        HistoryToken(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Upsert,
    Delete,
}

/// One entity-level change inside a committed save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    pub entity_type: String,
    pub entity_id: Uuid,
}

impl ChangeEntry {
    pub fn upsert(entity_type: &str, entity_id: Uuid) -> Self {
        ChangeEntry {
            kind: ChangeKind::Upsert,
            entity_type: entity_type.to_string(),
            entity_id,
        }
    }

    pub fn delete(entity_type: &str, entity_id: Uuid) -> Self {
        ChangeEntry {
            kind: ChangeKind::Delete,
            entity_type: entity_type.to_string(),
            entity_id,
        }
    }
}

/// A committed save as recorded in the log.
#[derive(Debug, Clone)]
pub struct HistoryBatch {
    pub token: HistoryToken,
    pub author: String,
    pub committed_at: DateTime<Utc>,
    pub entries: Vec<ChangeEntry>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    seq: i64,
    author: String,
    committed_at: String,
    changes: String,
}

/// Append a batch inside the caller's transaction.
pub async fn append(
    conn: &mut SqliteConnection,
    author: &str,
    entries: &[ChangeEntry],
) -> Result<HistoryToken, sqlx::Error> {
    let changes = serde_json::to_string(entries).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    let result = sqlx::query("INSERT INTO history (author, committed_at, changes) VALUES (?, ?, ?)")
        .bind(author)
        .bind(Utc::now().to_rfc3339())
        .bind(changes)
        .execute(&mut *conn)
        .await?;

    Ok(HistoryToken(result.last_insert_rowid()))
}

/// All batches committed after the token, oldest first.
pub async fn changes_since(
    pool: &SqlitePool,
    token: HistoryToken,
) -> Result<Vec<HistoryBatch>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT seq, author, committed_at, changes FROM history WHERE seq > ? ORDER BY seq",
    )
    .bind(token.0)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| HistoryBatch {
            token: HistoryToken(row.seq),
            author: row.author,
            committed_at: super::parse_datetime(&row.committed_at),
            entries: serde_json::from_str(&row.changes).unwrap_or_default(),
        })
        .collect())
}

/// Token of the newest batch, or zero for an empty log.
pub async fn latest_token(pool: &SqlitePool) -> Result<HistoryToken, sqlx::Error> {
    let seq: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM history")
        .fetch_one(pool)
        .await?;
    Ok(HistoryToken(seq.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn setup() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(Some(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let (pool, _temp_dir) = setup().await;

        let entries = vec![
            ChangeEntry::upsert("Customer", Uuid::new_v4()),
            ChangeEntry::delete("WorkOrder", Uuid::new_v4()),
        ];

        let mut conn = pool.acquire().await.unwrap();
        let token = append(&mut conn, "local", &entries).await.unwrap();
        drop(conn);

        let batches = changes_since(&pool, HistoryToken::zero()).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].token, token);
        assert_eq!(batches[0].author, "local");
        assert_eq!(batches[0].entries, entries);
    }

    #[tokio::test]
    async fn test_changes_since_skips_older_batches() {
        let (pool, _temp_dir) = setup().await;

        let mut conn = pool.acquire().await.unwrap();
        let first = append(&mut conn, "local", &[ChangeEntry::upsert("Customer", Uuid::new_v4())])
            .await
            .unwrap();
        append(&mut conn, "remote", &[ChangeEntry::upsert("Invoice", Uuid::new_v4())])
            .await
            .unwrap();
        drop(conn);

        let batches = changes_since(&pool, first).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].author, "remote");
    }

    #[tokio::test]
    async fn test_latest_token_tracks_newest_batch() {
        let (pool, _temp_dir) = setup().await;
        assert_eq!(latest_token(&pool).await.unwrap(), HistoryToken::zero());

        let mut conn = pool.acquire().await.unwrap();
        let token = append(&mut conn, "local", &[ChangeEntry::upsert("Customer", Uuid::new_v4())])
            .await
            .unwrap();
        drop(conn);

        assert_eq!(latest_token(&pool).await.unwrap(), token);
    }
}
