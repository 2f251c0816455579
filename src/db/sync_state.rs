//! Durable sync bookkeeping, currently just the pull cursor.

use sqlx::{SqliteConnection, SqlitePool};

use crate::cloud::SyncCursor;

const PULL_CURSOR_KEY: &str = "pull_cursor";

pub async fn load_cursor(pool: &SqlitePool) -> Result<SyncCursor, sqlx::Error> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
        .bind(PULL_CURSOR_KEY)
        .fetch_optional(pool)
        .await?;
    Ok(SyncCursor(value))
}

pub async fn store_cursor(
    conn: &mut SqliteConnection,
    cursor: &SyncCursor,
) -> Result<(), sqlx::Error> {
    match &cursor.0 {
        Some(position) => {
            sqlx::query(
                "INSERT INTO sync_state (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(PULL_CURSOR_KEY)
            .bind(position)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM sync_state WHERE key = ?")
                .bind(PULL_CURSOR_KEY)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cursor_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(Some(temp_dir.path().join("test.db")))
            .await
            .unwrap();

        assert_eq!(load_cursor(&pool).await.unwrap(), SyncCursor(None));

        let mut conn = pool.acquire().await.unwrap();
        store_cursor(&mut conn, &SyncCursor(Some("42".to_string())))
            .await
            .unwrap();
        store_cursor(&mut conn, &SyncCursor(Some("43".to_string())))
            .await
            .unwrap();
        drop(conn);

        assert_eq!(
            load_cursor(&pool).await.unwrap(),
            SyncCursor(Some("43".to_string()))
        );
    }
}
