//! Customer storage.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::Customer;

use super::{parse_datetime, parse_uuid_list};

pub struct CustomerRepo {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CustomerRepo {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepo { pool }
    }

    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        customer: &Customer,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, address, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone,
                address = excluded.address,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(customer.id.to_string())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(customer.created_at.to_rfc3339())
        .bind(customer.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &Uuid) -> Result<(), sqlx::Error> {
        // CASCADE removes the customer's work orders.
        sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<Customer>, sqlx::Error> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, phone, address, created_at, updated_at
             FROM customers WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<Customer>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, phone, address, created_at, updated_at
             FROM customers ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut customers = Vec::with_capacity(rows.len());
        for row in rows {
            customers.push(self.hydrate(row).await?);
        }
        Ok(customers)
    }

    async fn hydrate(&self, row: CustomerRow) -> Result<Customer, sqlx::Error> {
        let id = Uuid::parse_str(&row.id).unwrap();
        let work_order_ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM work_orders WHERE customer_id = ? ORDER BY created_at",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Customer {
            id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            work_order_ids: parse_uuid_list(work_order_ids),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: CustomerRepo,
        pool: SqlitePool,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(Some(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        TestContext {
            repo: CustomerRepo::new(pool.clone()),
            pool,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let ctx = setup().await;
        let customer = Customer::new("Dana Whitfield")
            .with_email("dana@example.com")
            .with_phone("555-0142");

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &customer).await.unwrap();
        drop(conn);

        let loaded = ctx.repo.get(&customer.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, customer.id);
        assert_eq!(loaded.name, "Dana Whitfield");
        assert_eq!(loaded.email.as_deref(), Some("dana@example.com"));
        assert_eq!(loaded.phone.as_deref(), Some("555-0142"));
        assert!(loaded.address.is_none());
    }

    #[tokio::test]
    async fn test_upsert_existing_updates_fields() {
        let ctx = setup().await;
        let mut customer = Customer::new("Dana Whitfield");

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &customer).await.unwrap();

        customer.name = "Dana Whitfield Jr.".to_string();
        customer.email = Some("dana@example.com".to_string());
        ctx.repo.upsert(&mut conn, &customer).await.unwrap();
        drop(conn);

        let loaded = ctx.repo.get(&customer.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Dana Whitfield Jr.");
        assert_eq!(loaded.email.as_deref(), Some("dana@example.com"));

        let all = ctx.repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let ctx = setup().await;
        let customer = Customer::new("Dana Whitfield");

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &customer).await.unwrap();
        ctx.repo.delete(&mut conn, &customer.id).await.unwrap();
        drop(conn);

        assert!(ctx.repo.get(&customer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let ctx = setup().await;
        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo
            .upsert(&mut conn, &Customer::new("Zoe Martin"))
            .await
            .unwrap();
        ctx.repo
            .upsert(&mut conn, &Customer::new("Abel Torres"))
            .await
            .unwrap();
        drop(conn);

        let all = ctx.repo.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Abel Torres");
        assert_eq!(all[1].name, "Zoe Martin");
    }
}
