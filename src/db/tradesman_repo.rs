//! Tradesman storage.

use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::codec::{self, TransformerRegistry};
use crate::models::{Badge, Tradesman};
use crate::session::{EventSink, SessionEvent};

use super::{parse_datetime, parse_opt_uuid, parse_uuid_list};

pub struct TradesmanRepo {
    pool: SqlitePool,
    codecs: Arc<TransformerRegistry>,
    events: Arc<dyn EventSink>,
}

#[derive(sqlx::FromRow)]
struct TradesmanRow {
    id: String,
    name: String,
    job_title: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    email: Option<String>,
    points: i64,
    work_order_points: i64,
    completed_jobs: i64,
    job_completion_streak: i64,
    badges: Option<Vec<u8>>,
    created_at: String,
    updated_at: String,
}

const SELECT_TRADESMAN: &str = r#"
    SELECT id, name, job_title, phone, address, email, points, work_order_points,
           completed_jobs, job_completion_streak, badges, created_at, updated_at
    FROM tradesmen
"#;

impl TradesmanRepo {
    pub fn new(
        pool: SqlitePool,
        codecs: Arc<TransformerRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        TradesmanRepo {
            pool,
            codecs,
            events,
        }
    }

    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        tradesman: &Tradesman,
    ) -> Result<(), sqlx::Error> {
        let badges = self
            .codecs
            .encode(codec::BADGES, &tradesman.badges)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO tradesmen (
                id, name, job_title, phone, address, email, points, work_order_points,
                completed_jobs, job_completion_streak, badges, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                job_title = excluded.job_title,
                phone = excluded.phone,
                address = excluded.address,
                email = excluded.email,
                points = excluded.points,
                work_order_points = excluded.work_order_points,
                completed_jobs = excluded.completed_jobs,
                job_completion_streak = excluded.job_completion_streak,
                badges = excluded.badges,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(tradesman.id.to_string())
        .bind(&tradesman.name)
        .bind(&tradesman.job_title)
        .bind(&tradesman.phone)
        .bind(&tradesman.address)
        .bind(&tradesman.email)
        .bind(tradesman.points)
        .bind(tradesman.work_order_points)
        .bind(tradesman.completed_jobs)
        .bind(tradesman.job_completion_streak)
        .bind(badges)
        .bind(tradesman.created_at.to_rfc3339())
        .bind(tradesman.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &Uuid) -> Result<(), sqlx::Error> {
        // Assignment rows cascade; an assigned inventory keeps its rows
        // with the reference cleared.
        sqlx::query("DELETE FROM tradesmen WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<Tradesman>, sqlx::Error> {
        let row = sqlx::query_as::<_, TradesmanRow>(&format!("{} WHERE id = ?", SELECT_TRADESMAN))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<Tradesman>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TradesmanRow>(&format!(
            "{} ORDER BY name",
            SELECT_TRADESMAN
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut tradesmen = Vec::with_capacity(rows.len());
        for row in rows {
            tradesmen.push(self.hydrate(row).await?);
        }
        Ok(tradesmen)
    }

    async fn hydrate(&self, row: TradesmanRow) -> Result<Tradesman, sqlx::Error> {
        let id = Uuid::parse_str(&row.id).unwrap();

        let work_order_ids: Vec<String> = sqlx::query_scalar(
            "SELECT work_order_id FROM work_order_tradesmen
             WHERE tradesman_id = ? ORDER BY work_order_id",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let inventory_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM inventories WHERE tradesman_id = ?")
                .bind(&row.id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(Tradesman {
            id,
            name: row.name,
            job_title: row.job_title,
            phone: row.phone,
            address: row.address,
            email: row.email,
            points: row.points,
            work_order_points: row.work_order_points,
            completed_jobs: row.completed_jobs,
            job_completion_streak: row.job_completion_streak,
            badges: self.decode_badges(row.badges.as_deref()),
            work_order_ids: parse_uuid_list(work_order_ids),
            inventory_id: parse_opt_uuid(inventory_id.as_deref()),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }

    fn decode_badges(&self, bytes: Option<&[u8]>) -> Vec<Badge> {
        let bytes = match bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Vec::new(),
        };
        match self.codecs.decode(codec::BADGES, bytes) {
            Ok(badges) => badges,
            Err(e) => {
                self.events.emit(SessionEvent::DecodeWarning {
                    entity_type: "Tradesman",
                    attribute: "badges",
                    detail: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}
