//! Inventory and usage record storage.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{Inventory, UsageRecord};

use super::{parse_datetime, parse_opt_datetime, parse_opt_uuid, parse_uuid_list};

pub struct InventoryRepo {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: String,
    name: String,
    price: f64,
    quantity: i64,
    low_stock: i64,
    high_stock: i64,
    stocked_at: Option<String>,
    tradesman_id: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct UsageRecordRow {
    id: String,
    inventory_id: String,
    used_at: String,
    quantity_used: i64,
    created_at: String,
    updated_at: String,
}

impl InventoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepo { pool }
    }

    pub async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        item: &Inventory,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO inventories (
                id, name, price, quantity, low_stock, high_stock, stocked_at,
                tradesman_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                quantity = excluded.quantity,
                low_stock = excluded.low_stock,
                high_stock = excluded.high_stock,
                stocked_at = excluded.stocked_at,
                tradesman_id = excluded.tradesman_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.name)
        .bind(item.price)
        .bind(item.quantity)
        .bind(item.low_stock)
        .bind(item.high_stock)
        .bind(item.stocked_at.map(|at| at.to_rfc3339()))
        .bind(item.tradesman_id.map(|id| id.to_string()))
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: &Uuid) -> Result<(), sqlx::Error> {
        // CASCADE removes the item's usage records.
        sqlx::query("DELETE FROM inventories WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &Uuid) -> Result<Option<Inventory>, sqlx::Error> {
        let row = sqlx::query_as::<_, InventoryRow>(
            "SELECT id, name, price, quantity, low_stock, high_stock, stocked_at,
                    tradesman_id, created_at, updated_at
             FROM inventories WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<Inventory>, sqlx::Error> {
        let rows = sqlx::query_as::<_, InventoryRow>(
            "SELECT id, name, price, quantity, low_stock, high_stock, stocked_at,
                    tradesman_id, created_at, updated_at
             FROM inventories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.hydrate(row).await?);
        }
        Ok(items)
    }

    async fn hydrate(&self, row: InventoryRow) -> Result<Inventory, sqlx::Error> {
        let id = Uuid::parse_str(&row.id).unwrap();

        let usage_record_ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM usage_records WHERE inventory_id = ? ORDER BY used_at",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Inventory {
            id,
            name: row.name,
            price: row.price,
            quantity: row.quantity,
            low_stock: row.low_stock,
            high_stock: row.high_stock,
            stocked_at: parse_opt_datetime(row.stocked_at.as_deref()),
            tradesman_id: parse_opt_uuid(row.tradesman_id.as_deref()),
            usage_record_ids: parse_uuid_list(usage_record_ids),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }

    pub async fn upsert_usage_record(
        &self,
        conn: &mut SqliteConnection,
        record: &UsageRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (id, inventory_id, used_at, quantity_used, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                inventory_id = excluded.inventory_id,
                used_at = excluded.used_at,
                quantity_used = excluded.quantity_used,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.inventory_id.to_string())
        .bind(record.used_at.to_rfc3339())
        .bind(record.quantity_used)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_usage_record(
        &self,
        conn: &mut SqliteConnection,
        id: &Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM usage_records WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_usage_record(&self, id: &Uuid) -> Result<Option<UsageRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, UsageRecordRow>(
            "SELECT id, inventory_id, used_at, quantity_used, created_at, updated_at
             FROM usage_records WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(hydrate_usage_record))
    }

    pub async fn list_usage_records(&self) -> Result<Vec<UsageRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, UsageRecordRow>(
            "SELECT id, inventory_id, used_at, quantity_used, created_at, updated_at
             FROM usage_records ORDER BY used_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(hydrate_usage_record).collect())
    }
}

fn hydrate_usage_record(row: UsageRecordRow) -> UsageRecord {
    UsageRecord {
        id: Uuid::parse_str(&row.id).unwrap(),
        inventory_id: Uuid::parse_str(&row.inventory_id).unwrap(),
        used_at: parse_datetime(&row.used_at),
        quantity_used: row.quantity_used,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: InventoryRepo,
        pool: SqlitePool,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(Some(temp_dir.path().join("test.db")))
            .await
            .unwrap();
        TestContext {
            repo: InventoryRepo::new(pool.clone()),
            pool,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let ctx = setup().await;
        let item = Inventory::new("Copper pipe", 4.5, 40).with_stock_levels(10, 60);

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &item).await.unwrap();
        drop(conn);

        let loaded = ctx.repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Copper pipe");
        assert_eq!(loaded.quantity, 40);
        assert_eq!(loaded.low_stock, 10);
        assert_eq!(loaded.high_stock, 60);
    }

    #[tokio::test]
    async fn test_usage_records_hydrate_onto_item() {
        let ctx = setup().await;
        let mut item = Inventory::new("Copper pipe", 4.5, 40);
        let record = item.record_usage(5);

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &item).await.unwrap();
        ctx.repo.upsert_usage_record(&mut conn, &record).await.unwrap();
        drop(conn);

        let loaded = ctx.repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded.quantity, 35);
        assert_eq!(loaded.usage_record_ids, vec![record.id]);

        let loaded_record = ctx.repo.get_usage_record(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded_record.quantity_used, 5);
        assert_eq!(loaded_record.inventory_id, item.id);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_usage_records() {
        let ctx = setup().await;
        let mut item = Inventory::new("Copper pipe", 4.5, 40);
        let record = item.record_usage(5);

        let mut conn = ctx.pool.acquire().await.unwrap();
        ctx.repo.upsert(&mut conn, &item).await.unwrap();
        ctx.repo.upsert_usage_record(&mut conn, &record).await.unwrap();
        ctx.repo.delete(&mut conn, &item.id).await.unwrap();
        drop(conn);

        assert!(ctx.repo.get(&item.id).await.unwrap().is_none());
        assert!(ctx.repo.get_usage_record(&record.id).await.unwrap().is_none());
    }
}
