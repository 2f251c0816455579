//! SQLite storage.
//!
//! One repository per aggregate, all sharing a pool. Reads go straight
//! to the pool; writes take a connection so the session can group them
//! into a single transaction per save.

mod customer_repo;
mod history;
mod inventory_repo;
mod invoice_repo;
mod job_catalog_repo;
mod payment_qr_repo;
mod sync_state;
mod tradesman_repo;
mod work_order_repo;

pub use customer_repo::CustomerRepo;
pub use history::{
    ChangeEntry, ChangeKind, HistoryBatch, HistoryToken, AUTHOR_LOCAL, AUTHOR_REMOTE,
};
pub use inventory_repo::InventoryRepo;
pub use invoice_repo::InvoiceRepo;
pub use job_catalog_repo::JobCatalogRepo;
pub use payment_qr_repo::PaymentQrRepo;
pub use tradesman_repo::TradesmanRepo;
pub use work_order_repo::WorkOrderRepo;

pub mod changelog {
    pub use super::history::{append, changes_since, latest_token};
}

pub mod cursor {
    pub use super::sync_state::{load_cursor, store_cursor};
}

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Open (creating if needed) the database and bring the schema up to
/// date.
pub async fn init_db(database_path: Option<PathBuf>) -> Result<SqlitePool, sqlx::Error> {
    let db_path = match database_path {
        Some(path) => path,
        None => default_db_path()?,
    };

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path.display()))?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

fn default_db_path() -> Result<PathBuf, sqlx::Error> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| sqlx::Error::Configuration("could not determine data directory".into()))?;
    Ok(data_dir.join("fieldwork").join("fieldwork.db"))
}

pub(crate) fn parse_datetime(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.map(parse_datetime)
}

pub(crate) fn parse_opt_uuid(value: Option<&str>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v).ok())
}

pub(crate) fn parse_uuid_list(values: Vec<String>) -> Vec<Uuid> {
    values
        .iter()
        .filter_map(|v| Uuid::parse_str(v).ok())
        .collect()
}
