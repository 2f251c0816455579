//! Payment QR code storage.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{PaymentQrCode, QrCodeKind};

use super::parse_datetime;

pub struct PaymentQrRepo {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PaymentQrRow {
    id: String,
    kind: String,
    image: Vec<u8>,
    created_at: String,
    updated_at: String,
}

impl PaymentQrRepo {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentQrRepo { pool }
    }

    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        code: &PaymentQrCode,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO payment_qr_codes (id, kind, image, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                image = excluded.image,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(code.id.to_string())
        .bind(code.kind.to_string())
        .bind(&code.image)
        .bind(code.created_at.to_rfc3339())
        .bind(code.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM payment_qr_codes WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<PaymentQrCode>, sqlx::Error> {
        let row = sqlx::query_as::<_, PaymentQrRow>(
            "SELECT id, kind, image, created_at, updated_at FROM payment_qr_codes WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(hydrate))
    }

    pub async fn list(&self) -> Result<Vec<PaymentQrCode>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PaymentQrRow>(
            "SELECT id, kind, image, created_at, updated_at FROM payment_qr_codes ORDER BY kind",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(hydrate).collect())
    }
}

fn hydrate(row: PaymentQrRow) -> PaymentQrCode {
    PaymentQrCode {
        id: Uuid::parse_str(&row.id).unwrap(),
        kind: row.kind.parse().unwrap_or(QrCodeKind::Venmo),
        image: row.image,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_get_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(Some(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        let repo = PaymentQrRepo::new(pool.clone());

        let code = PaymentQrCode::new(QrCodeKind::Cashapp, vec![0x89, 0x50, 0x4e, 0x47]);

        let mut conn = pool.acquire().await.unwrap();
        repo.upsert(&mut conn, &code).await.unwrap();
        drop(conn);

        let loaded = repo.get(&code.id).await.unwrap().unwrap();
        assert_eq!(loaded.kind, QrCodeKind::Cashapp);
        assert_eq!(loaded.image, vec![0x89, 0x50, 0x4e, 0x47]);

        let mut conn = pool.acquire().await.unwrap();
        repo.delete(&mut conn, &code.id).await.unwrap();
        drop(conn);
        assert!(repo.get(&code.id).await.unwrap().is_none());
    }
}
