//! Invoice storage.

use std::sync::Arc;

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::codec::{self, TransformerRegistry};
use crate::models::{Invoice, InvoiceStatus, ServiceItem};
use crate::session::{EventSink, SessionEvent};

use super::{parse_datetime, parse_opt_datetime, parse_opt_uuid};

pub struct InvoiceRepo {
    pool: SqlitePool,
    codecs: Arc<TransformerRegistry>,
    events: Arc<dyn EventSink>,
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: i64,
    issued_at: Option<String>,
    due_at: Option<String>,
    status: String,
    subtotal: f64,
    tax_rate: f64,
    total: f64,
    payment_method: Option<String>,
    callback_requested: bool,
    service_items: Option<Vec<u8>>,
    customer_id: Option<String>,
    work_order_id: Option<String>,
    created_at: String,
    updated_at: String,
}

const SELECT_INVOICE: &str = r#"
    SELECT id, invoice_number, issued_at, due_at, status, subtotal, tax_rate, total,
           payment_method, callback_requested, service_items, customer_id, work_order_id,
           created_at, updated_at
    FROM invoices
"#;

impl InvoiceRepo {
    pub fn new(
        pool: SqlitePool,
        codecs: Arc<TransformerRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        InvoiceRepo {
            pool,
            codecs,
            events,
        }
    }

    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        invoice: &Invoice,
    ) -> Result<(), sqlx::Error> {
        let service_items = self
            .codecs
            .encode(codec::SERVICE_ITEMS, &invoice.service_items)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, issued_at, due_at, status, subtotal, tax_rate, total,
                payment_method, callback_requested, service_items, customer_id, work_order_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                invoice_number = excluded.invoice_number,
                issued_at = excluded.issued_at,
                due_at = excluded.due_at,
                status = excluded.status,
                subtotal = excluded.subtotal,
                tax_rate = excluded.tax_rate,
                total = excluded.total,
                payment_method = excluded.payment_method,
                callback_requested = excluded.callback_requested,
                service_items = excluded.service_items,
                customer_id = excluded.customer_id,
                work_order_id = excluded.work_order_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(invoice.id.to_string())
        .bind(invoice.invoice_number)
        .bind(invoice.issued_at.map(|at| at.to_rfc3339()))
        .bind(invoice.due_at.map(|at| at.to_rfc3339()))
        .bind(invoice.status.to_string())
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.total)
        .bind(invoice.payment_method.map(|m| m.to_string()))
        .bind(invoice.callback_requested)
        .bind(service_items)
        .bind(invoice.customer_id.map(|id| id.to_string()))
        .bind(invoice.work_order_id.map(|id| id.to_string()))
        .bind(invoice.created_at.to_rfc3339())
        .bind(invoice.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<Invoice>, sqlx::Error> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!("{} WHERE id = ?", SELECT_INVOICE))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| self.hydrate(row)))
    }

    pub async fn list(&self) -> Result<Vec<Invoice>, sqlx::Error> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "{} ORDER BY invoice_number",
            SELECT_INVOICE
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| self.hydrate(row)).collect())
    }

    fn hydrate(&self, row: InvoiceRow) -> Invoice {
        Invoice {
            id: Uuid::parse_str(&row.id).unwrap(),
            invoice_number: row.invoice_number,
            issued_at: parse_opt_datetime(row.issued_at.as_deref()),
            due_at: parse_opt_datetime(row.due_at.as_deref()),
            status: row.status.parse().unwrap_or(InvoiceStatus::Draft),
            subtotal: row.subtotal,
            tax_rate: row.tax_rate,
            total: row.total,
            payment_method: row.payment_method.and_then(|m| m.parse().ok()),
            callback_requested: row.callback_requested,
            service_items: self.decode_service_items(row.service_items.as_deref()),
            customer_id: parse_opt_uuid(row.customer_id.as_deref()),
            work_order_id: parse_opt_uuid(row.work_order_id.as_deref()),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        }
    }

    fn decode_service_items(&self, bytes: Option<&[u8]>) -> Vec<ServiceItem> {
        let bytes = match bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Vec::new(),
        };
        match self.codecs.decode(codec::SERVICE_ITEMS, bytes) {
            Ok(items) => items,
            Err(e) => {
                self.events.emit(SessionEvent::DecodeWarning {
                    entity_type: "Invoice",
                    attribute: "service_items",
                    detail: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::PaymentMethod;
    use crate::session::MemorySink;
    use tempfile::TempDir;

    struct TestContext {
        repo: InvoiceRepo,
        events: Arc<MemorySink>,
        pool: SqlitePool,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(Some(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        let events = Arc::new(MemorySink::new());
        TestContext {
            repo: InvoiceRepo::new(
                pool.clone(),
                Arc::new(TransformerRegistry::standard()),
                events.clone(),
            ),
            events,
            pool,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_with_service_items() {
        let ctx = setup().await;
        let mut invoice = Invoice::new(5001).with_tax_rate(0.08);
        invoice.add_service_item(ServiceItem::new("Water heater install", 850.0, 1));
        invoice.add_service_item(ServiceItem::new("Haul away", 75.0, 1));
        invoice.mark_paid(PaymentMethod::Card);

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &invoice).await.unwrap();
        drop(conn);

        let loaded = ctx.repo.get(&invoice.id).await.unwrap().unwrap();
        assert_eq!(loaded.invoice_number, 5001);
        assert_eq!(loaded.status, InvoiceStatus::Paid);
        assert_eq!(loaded.payment_method, Some(PaymentMethod::Card));
        assert_eq!(loaded.service_items.len(), 2);
        assert_eq!(loaded.service_items[0].name, "Water heater install");
        assert!((loaded.total - 999.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_corrupt_service_items_blob_reads_as_empty_with_warning() {
        let ctx = setup().await;
        let mut invoice = Invoice::new(5001);
        invoice.add_service_item(ServiceItem::new("Diagnostic", 95.0, 1));

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &invoice).await.unwrap();
        drop(conn);

        sqlx::query("UPDATE invoices SET service_items = ? WHERE id = ?")
            .bind(vec![0x13, 0x37])
            .bind(invoice.id.to_string())
            .execute(&ctx.pool)
            .await
            .unwrap();

        let loaded = ctx.repo.get(&invoice.id).await.unwrap().unwrap();
        assert!(loaded.service_items.is_empty());
        assert_eq!(ctx.events.count_decode_warnings(), 1);
        // Scalar columns are unaffected by the bad blob.
        assert_eq!(loaded.invoice_number, 5001);
    }

    #[tokio::test]
    async fn test_unique_work_order_reference() {
        let ctx = setup().await;

        sqlx::query(
            "INSERT INTO work_orders (id, number, category, status, callback_requested,
             created_at, updated_at)
             VALUES (?, 1001, 'Plumbing', 'scheduled', 0, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&ctx.pool)
        .await
        .unwrap();

        let order_id: String = sqlx::query_scalar("SELECT id FROM work_orders")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        let order_id = Uuid::parse_str(&order_id).unwrap();

        let mut first = Invoice::new(5001);
        first.work_order_id = Some(order_id);
        let mut second = Invoice::new(5002);
        second.work_order_id = Some(order_id);

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &first).await.unwrap();
        // A second invoice on the same work order violates the 1-1 rule.
        let result = ctx.repo.upsert(&mut conn, &second).await;
        assert!(result.is_err());
    }
}
