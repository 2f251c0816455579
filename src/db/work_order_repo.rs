//! Work order and task storage.
//!
//! Photos and materials live in BLOB columns encoded through the
//! transformer registry. A blob that fails to decode hydrates as an
//! empty list and raises a `DecodeWarning` instead of failing the read.

use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::codec::{self, TransformerRegistry};
use crate::models::{Material, Photo, Task, WorkOrder, WorkOrderStatus};
use crate::session::{EventSink, SessionEvent};

use super::{parse_datetime, parse_opt_datetime, parse_opt_uuid, parse_uuid_list};

pub struct WorkOrderRepo {
    pool: SqlitePool,
    codecs: Arc<TransformerRegistry>,
    events: Arc<dyn EventSink>,
}

#[derive(sqlx::FromRow)]
struct WorkOrderRow {
    id: String,
    number: i64,
    category: String,
    status: String,
    scheduled_at: Option<String>,
    description: Option<String>,
    notes: Option<String>,
    summary: Option<String>,
    technician: Option<String>,
    callback_requested: bool,
    signature: Option<Vec<u8>>,
    photos: Option<Vec<u8>>,
    materials: Option<Vec<u8>>,
    customer_id: Option<String>,
    job_option_id: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    work_order_id: String,
    summary: String,
    is_complete: bool,
    created_at: String,
    updated_at: String,
}

const SELECT_WORK_ORDER: &str = r#"
    SELECT id, number, category, status, scheduled_at, description, notes, summary,
           technician, callback_requested, signature, photos, materials,
           customer_id, job_option_id, created_at, updated_at
    FROM work_orders
"#;

impl WorkOrderRepo {
    pub fn new(
        pool: SqlitePool,
        codecs: Arc<TransformerRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        WorkOrderRepo {
            pool,
            codecs,
            events,
        }
    }

    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        order: &WorkOrder,
    ) -> Result<(), sqlx::Error> {
        let photos = codec::encode_list(&order.photos).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let materials = self
            .codecs
            .encode(codec::MATERIALS, &order.materials)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO work_orders (
                id, number, category, status, scheduled_at, description, notes, summary,
                technician, callback_requested, signature, photos, materials,
                customer_id, job_option_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                number = excluded.number,
                category = excluded.category,
                status = excluded.status,
                scheduled_at = excluded.scheduled_at,
                description = excluded.description,
                notes = excluded.notes,
                summary = excluded.summary,
                technician = excluded.technician,
                callback_requested = excluded.callback_requested,
                signature = excluded.signature,
                photos = excluded.photos,
                materials = excluded.materials,
                customer_id = excluded.customer_id,
                job_option_id = excluded.job_option_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(order.id.to_string())
        .bind(order.number)
        .bind(&order.category)
        .bind(order.status.to_string())
        .bind(order.scheduled_at.map(|at| at.to_rfc3339()))
        .bind(&order.description)
        .bind(&order.notes)
        .bind(&order.summary)
        .bind(&order.technician)
        .bind(order.callback_requested)
        .bind(&order.signature)
        .bind(photos)
        .bind(materials)
        .bind(order.customer_id.map(|id| id.to_string()))
        .bind(order.job_option_id.map(|id| id.to_string()))
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        self.replace_assignments(conn, order).await?;
        Ok(())
    }

    /// Rewrite the tradesman link rows to match the entity. Links to
    /// tradesmen not yet stored are skipped.
    async fn replace_assignments(
        &self,
        conn: &mut SqliteConnection,
        order: &WorkOrder,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM work_order_tradesmen WHERE work_order_id = ?")
            .bind(order.id.to_string())
            .execute(&mut *conn)
            .await?;

        for tradesman_id in &order.tradesman_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO work_order_tradesmen (work_order_id, tradesman_id)
                 VALUES (?, ?)",
            )
            .bind(order.id.to_string())
            .bind(tradesman_id.to_string())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &Uuid) -> Result<(), sqlx::Error> {
        // CASCADE removes tasks, the invoice, and assignment rows.
        sqlx::query("DELETE FROM work_orders WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<WorkOrder>, sqlx::Error> {
        let row = sqlx::query_as::<_, WorkOrderRow>(&format!("{} WHERE id = ?", SELECT_WORK_ORDER))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<WorkOrder>, sqlx::Error> {
        let rows = sqlx::query_as::<_, WorkOrderRow>(&format!(
            "{} ORDER BY number",
            SELECT_WORK_ORDER
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    async fn hydrate(&self, row: WorkOrderRow) -> Result<WorkOrder, sqlx::Error> {
        let id = Uuid::parse_str(&row.id).unwrap();

        let tradesman_ids: Vec<String> = sqlx::query_scalar(
            "SELECT tradesman_id FROM work_order_tradesmen
             WHERE work_order_id = ? ORDER BY tradesman_id",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let task_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM tasks WHERE work_order_id = ? ORDER BY created_at")
                .bind(&row.id)
                .fetch_all(&self.pool)
                .await?;

        let invoice_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM invoices WHERE work_order_id = ?")
                .bind(&row.id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(WorkOrder {
            id,
            number: row.number,
            category: row.category,
            status: row
                .status
                .parse()
                .unwrap_or(WorkOrderStatus::Scheduled),
            scheduled_at: parse_opt_datetime(row.scheduled_at.as_deref()),
            description: row.description,
            notes: row.notes,
            summary: row.summary,
            technician: row.technician,
            callback_requested: row.callback_requested,
            signature: row.signature,
            photos: self.decode_photos(row.photos.as_deref()),
            materials: self.decode_materials(row.materials.as_deref()),
            customer_id: parse_opt_uuid(row.customer_id.as_deref()),
            invoice_id: parse_opt_uuid(invoice_id.as_deref()),
            job_option_id: parse_opt_uuid(row.job_option_id.as_deref()),
            tradesman_ids: parse_uuid_list(tradesman_ids),
            task_ids: parse_uuid_list(task_ids),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }

    fn decode_photos(&self, bytes: Option<&[u8]>) -> Vec<Photo> {
        let bytes = match bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Vec::new(),
        };
        match codec::decode_list(bytes) {
            Ok(photos) => photos,
            Err(e) => {
                self.events.emit(SessionEvent::DecodeWarning {
                    entity_type: "WorkOrder",
                    attribute: "photos",
                    detail: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    fn decode_materials(&self, bytes: Option<&[u8]>) -> Vec<Material> {
        let bytes = match bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Vec::new(),
        };
        match self.codecs.decode(codec::MATERIALS, bytes) {
            Ok(materials) => materials,
            Err(e) => {
                self.events.emit(SessionEvent::DecodeWarning {
                    entity_type: "WorkOrder",
                    attribute: "materials",
                    detail: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    pub async fn upsert_task(
        &self,
        conn: &mut SqliteConnection,
        task: &Task,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, work_order_id, summary, is_complete, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                work_order_id = excluded.work_order_id,
                summary = excluded.summary,
                is_complete = excluded.is_complete,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.work_order_id.to_string())
        .bind(&task.summary)
        .bind(task.is_complete)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_task(
        &self,
        conn: &mut SqliteConnection,
        id: &Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_task(&self, id: &Uuid) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT id, work_order_id, summary, is_complete, created_at, updated_at
             FROM tasks WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(hydrate_task))
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, work_order_id, summary, is_complete, created_at, updated_at
             FROM tasks ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(hydrate_task).collect())
    }
}

fn hydrate_task(row: TaskRow) -> Task {
    Task {
        id: Uuid::parse_str(&row.id).unwrap(),
        work_order_id: Uuid::parse_str(&row.work_order_id).unwrap(),
        summary: row.summary,
        is_complete: row.is_complete,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    }
}
