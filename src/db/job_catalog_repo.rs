//! Job category and option storage.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{JobCategory, JobOption};

use super::{parse_datetime, parse_opt_uuid, parse_uuid_list};

pub struct JobCatalogRepo {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct JobCategoryRow {
    id: String,
    name: String,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct JobOptionRow {
    id: String,
    name: String,
    price: f64,
    description: Option<String>,
    category_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobCatalogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        JobCatalogRepo { pool }
    }

    pub async fn upsert_category(
        &self,
        conn: &mut SqliteConnection,
        category: &JobCategory,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO job_categories (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(category.id.to_string())
        .bind(&category.name)
        .bind(category.created_at.to_rfc3339())
        .bind(category.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_category(
        &self,
        conn: &mut SqliteConnection,
        id: &Uuid,
    ) -> Result<(), sqlx::Error> {
        // CASCADE removes the category's options.
        sqlx::query("DELETE FROM job_categories WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_category(&self, id: &Uuid) -> Result<Option<JobCategory>, sqlx::Error> {
        let row = sqlx::query_as::<_, JobCategoryRow>(
            "SELECT id, name, created_at, updated_at FROM job_categories WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_category(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_categories(&self) -> Result<Vec<JobCategory>, sqlx::Error> {
        let rows = sqlx::query_as::<_, JobCategoryRow>(
            "SELECT id, name, created_at, updated_at FROM job_categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in rows {
            categories.push(self.hydrate_category(row).await?);
        }
        Ok(categories)
    }

    async fn hydrate_category(&self, row: JobCategoryRow) -> Result<JobCategory, sqlx::Error> {
        let option_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM job_options WHERE category_id = ? ORDER BY name")
                .bind(&row.id)
                .fetch_all(&self.pool)
                .await?;

        Ok(JobCategory {
            id: Uuid::parse_str(&row.id).unwrap(),
            name: row.name,
            option_ids: parse_uuid_list(option_ids),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }

    pub async fn upsert_option(
        &self,
        conn: &mut SqliteConnection,
        option: &JobOption,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO job_options (id, name, price, description, category_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                description = excluded.description,
                category_id = excluded.category_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(option.id.to_string())
        .bind(&option.name)
        .bind(option.price)
        .bind(&option.description)
        .bind(option.category_id.map(|id| id.to_string()))
        .bind(option.created_at.to_rfc3339())
        .bind(option.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_option(
        &self,
        conn: &mut SqliteConnection,
        id: &Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM job_options WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_option(&self, id: &Uuid) -> Result<Option<JobOption>, sqlx::Error> {
        let row = sqlx::query_as::<_, JobOptionRow>(
            "SELECT id, name, price, description, category_id, created_at, updated_at
             FROM job_options WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(hydrate_option))
    }

    pub async fn list_options(&self) -> Result<Vec<JobOption>, sqlx::Error> {
        let rows = sqlx::query_as::<_, JobOptionRow>(
            "SELECT id, name, price, description, category_id, created_at, updated_at
             FROM job_options ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(hydrate_option).collect())
    }
}

fn hydrate_option(row: JobOptionRow) -> JobOption {
    JobOption {
        id: Uuid::parse_str(&row.id).unwrap(),
        name: row.name,
        price: row.price,
        description: row.description,
        category_id: parse_opt_uuid(row.category_id.as_deref()),
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    }
}
