//! Background cloud sync.
//!
//! The push worker forwards committed batches to the cloud container.
//! The pull worker polls for foreign changes, writes them straight to
//! the store under the remote author, and broadcasts a notice so open
//! sessions fold them into their graphs.

pub mod directory;

use std::sync::{Arc, Weak};
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::cloud::record::uuid_ref;
use crate::cloud::{CloudContainer, CloudRecord, RecordRef, Recordable, RemoteRecord};
use crate::db::{changelog, cursor, ChangeEntry, AUTHOR_REMOTE};
use crate::models::{
    Customer, Inventory, Invoice, JobCategory, JobOption, PaymentQrCode, Task, Tradesman,
    UsageRecord, WorkOrder,
};
use crate::session::{EventSink, Repositories, SessionError, SessionEvent, StoreSession};

/// One committed save, ready to forward.
#[derive(Debug)]
pub struct PushBatch {
    pub saves: Vec<CloudRecord>,
    pub deletes: Vec<RecordRef>,
}

/// Broadcast after foreign changes reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteChangeNotice {
    pub changes: usize,
}

/// Forward save batches to the container until the channel closes.
/// Failures are reported and the batch dropped; the next full push
/// carries the record state anyway.
pub fn spawn_push_worker(
    container: Arc<dyn CloudContainer>,
    mut rx: mpsc::UnboundedReceiver<PushBatch>,
    events: Arc<dyn EventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            if !batch.saves.is_empty() {
                if let Err(e) = container.push(&batch.saves).await {
                    events.emit(SessionEvent::CloudPushFailed {
                        detail: e.to_string(),
                    });
                }
            }
            if !batch.deletes.is_empty() {
                if let Err(e) = container.delete(&batch.deletes).await {
                    events.emit(SessionEvent::CloudPushFailed {
                        detail: e.to_string(),
                    });
                }
            }
        }
    })
}

/// Poll the container on an interval, applying whatever arrived.
pub fn spawn_pull_worker(
    container: Arc<dyn CloudContainer>,
    pool: SqlitePool,
    repos: Repositories,
    remote_tx: broadcast::Sender<RemoteChangeNotice>,
    events: Arc<dyn EventSink>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = pull_once(container.as_ref(), &pool, &repos, &remote_tx).await {
                events.emit(SessionEvent::CloudPullFailed {
                    detail: e.to_string(),
                });
            }
        }
    })
}

/// React to remote-change notices by refreshing the session's graph.
pub fn spawn_remote_listener(
    session: Weak<StoreSession>,
    mut rx: broadcast::Receiver<RemoteChangeNotice>,
    events: Arc<dyn EventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(_) => {
                    let session = match session.upgrade() {
                        Some(session) => session,
                        None => break,
                    };
                    if let Err(e) = session.refresh().await {
                        events.emit(SessionEvent::RemoteRefreshFailed {
                            detail: e.to_string(),
                        });
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn save_rank(record_type: &str) -> usize {
    match record_type {
        "Customer" => 0,
        "JobCategory" => 1,
        "JobOption" => 2,
        "Tradesman" => 3,
        "WorkOrder" => 4,
        "Task" => 5,
        "Invoice" => 6,
        "Inventory" => 7,
        "UsageRecord" => 8,
        _ => 9,
    }
}

fn delete_rank(record_type: &str) -> usize {
    match record_type {
        "UsageRecord" => 0,
        "Task" => 1,
        "Invoice" => 2,
        "WorkOrder" => 3,
        "Inventory" => 4,
        "JobOption" => 5,
        "JobCategory" => 6,
        "Tradesman" => 7,
        "Customer" => 8,
        _ => 9,
    }
}

/// Pull one page of remote changes and write them to the store in a
/// single transaction logged under the remote author. Saves land
/// parents before children and deletes the other way around so foreign
/// key checks hold. Returns the number of applied changes.
pub async fn pull_once(
    container: &dyn CloudContainer,
    pool: &SqlitePool,
    repos: &Repositories,
    remote_tx: &broadcast::Sender<RemoteChangeNotice>,
) -> Result<usize, SessionError> {
    let since = cursor::load_cursor(pool).await?;
    let (records, next_cursor) = container
        .pull_since(&since)
        .await
        .map_err(SessionError::Cloud)?;

    if records.is_empty() && next_cursor == since {
        return Ok(0);
    }

    let mut saved = Vec::new();
    let mut deleted = Vec::new();
    for record in records {
        match record {
            RemoteRecord::Saved(record) => saved.push(record),
            RemoteRecord::Deleted(reference) => deleted.push(reference),
        }
    }
    saved.sort_by_key(|record| save_rank(&record.record_type));
    deleted.sort_by_key(|reference| delete_rank(&reference.record_type));

    let mut entries = Vec::new();
    let mut tx = pool.begin().await?;

    for record in &saved {
        let id = match uuid_ref(&record.fields, "id") {
            Some(id) => id,
            None => continue,
        };
        match record.record_type.as_str() {
            "Customer" => {
                let entity = match repos.customers.get(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => Customer::from_record(id, &record.fields),
                };
                repos.customers.upsert(&mut *tx, &entity).await?;
            }
            "WorkOrder" => {
                let entity = match repos.work_orders.get(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => WorkOrder::from_record(id, &record.fields),
                };
                repos.work_orders.upsert(&mut *tx, &entity).await?;
            }
            "Task" => {
                let entity = match repos.work_orders.get_task(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => Task::from_record(id, &record.fields),
                };
                repos.work_orders.upsert_task(&mut *tx, &entity).await?;
            }
            "Tradesman" => {
                let entity = match repos.tradesmen.get(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => Tradesman::from_record(id, &record.fields),
                };
                repos.tradesmen.upsert(&mut *tx, &entity).await?;
            }
            "Invoice" => {
                let entity = match repos.invoices.get(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => Invoice::from_record(id, &record.fields),
                };
                repos.invoices.upsert(&mut *tx, &entity).await?;
            }
            "Inventory" => {
                let entity = match repos.inventories.get(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => Inventory::from_record(id, &record.fields),
                };
                repos.inventories.upsert(&mut *tx, &entity).await?;
            }
            "UsageRecord" => {
                let entity = match repos.inventories.get_usage_record(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => UsageRecord::from_record(id, &record.fields),
                };
                repos
                    .inventories
                    .upsert_usage_record(&mut *tx, &entity)
                    .await?;
            }
            "JobCategory" => {
                let entity = match repos.job_catalog.get_category(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => JobCategory::from_record(id, &record.fields),
                };
                repos.job_catalog.upsert_category(&mut *tx, &entity).await?;
            }
            "JobOption" => {
                let entity = match repos.job_catalog.get_option(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => JobOption::from_record(id, &record.fields),
                };
                repos.job_catalog.upsert_option(&mut *tx, &entity).await?;
            }
            "PaymentQrCode" => {
                let entity = match repos.payment_qr.get(&id).await? {
                    Some(mut existing) => {
                        existing.apply_fields(&record.fields);
                        existing
                    }
                    None => PaymentQrCode::from_record(id, &record.fields),
                };
                repos.payment_qr.upsert(&mut *tx, &entity).await?;
            }
            _ => continue,
        }
        entries.push(ChangeEntry::upsert(&record.record_type, id));
    }

    for reference in &deleted {
        let id = reference.entity_id;
        match reference.record_type.as_str() {
            "Customer" => repos.customers.delete(&mut *tx, &id).await?,
            "WorkOrder" => repos.work_orders.delete(&mut *tx, &id).await?,
            "Task" => repos.work_orders.delete_task(&mut *tx, &id).await?,
            "Tradesman" => repos.tradesmen.delete(&mut *tx, &id).await?,
            "Invoice" => repos.invoices.delete(&mut *tx, &id).await?,
            "Inventory" => repos.inventories.delete(&mut *tx, &id).await?,
            "UsageRecord" => repos.inventories.delete_usage_record(&mut *tx, &id).await?,
            "JobCategory" => repos.job_catalog.delete_category(&mut *tx, &id).await?,
            "JobOption" => repos.job_catalog.delete_option(&mut *tx, &id).await?,
            "PaymentQrCode" => repos.payment_qr.delete(&mut *tx, &id).await?,
            _ => continue,
        }
        entries.push(ChangeEntry::delete(&reference.record_type, id));
    }

    let changes = entries.len();
    if !entries.is_empty() {
        changelog::append(&mut *tx, AUTHOR_REMOTE, &entries).await?;
    }
    cursor::store_cursor(&mut *tx, &next_cursor).await?;
    tx.commit().await?;

    if changes > 0 {
        let _ = remote_tx.send(RemoteChangeNotice { changes });
    }
    Ok(changes)
}
