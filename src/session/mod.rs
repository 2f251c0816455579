//! Persistence session.
//!
//! `StoreSession` owns the database pool, the in-memory object graph,
//! the throttled save loop, and the background sync workers. Hosts
//! construct one at launch, hand it around explicitly, and close it on
//! the way out. Edits go through the session, queue a debounced save,
//! and reach the store in batched transactions.

mod api;
mod events;
mod graph;
mod merge;
mod saver;

pub use api::EntityCounts;
pub use events::{EventSink, MemorySink, SessionEvent, TracingSink};
pub use graph::{EntitySet, ObjectGraph, PendingSet};
pub use saver::{FlushTarget, SaveScheduler, WriteOutcome};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cloud::{
    CloudContainer, CloudError, CloudRecord, RecordRef, Recordable, ShareHandle, SharePermission,
};
use crate::codec::TransformerRegistry;
use crate::db::{
    self, changelog, ChangeEntry, ChangeKind, CustomerRepo, HistoryToken, InventoryRepo,
    InvoiceRepo, JobCatalogRepo, PaymentQrRepo, TradesmanRepo, WorkOrderRepo, AUTHOR_LOCAL,
};
use crate::models::{
    Customer, Inventory, Invoice, JobCategory, JobOption, PaymentQrCode, Task, Tradesman,
    UsageRecord, WorkOrder,
};
use crate::sync::{self, PushBatch, RemoteChangeNotice};

/// Tuning knobs for a session. Defaults match production behavior;
/// tests shrink the timers.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub database_path: Option<PathBuf>,
    /// Quiet period after an edit before it is written.
    pub save_debounce: Duration,
    /// Upper bound between writes while edits keep arriving.
    pub save_interval: Duration,
    /// How often the pull worker polls the cloud container.
    pub cloud_poll_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            database_path: None,
            save_debounce: Duration::from_secs(5),
            save_interval: Duration::from_secs(30),
            cloud_poll_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    Database(sqlx::Error),
    Cloud(CloudError),
    Closed,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Database(e) => write!(f, "Database error: {}", e),
            SessionError::Cloud(e) => write!(f, "Cloud error: {}", e),
            SessionError::Closed => write!(f, "Session is closed"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        SessionError::Database(err)
    }
}

#[derive(Debug)]
pub enum ShareError {
    NotFound(EntityKind, Uuid),
    CloudDisabled,
    Cloud(CloudError),
}

impl std::fmt::Display for ShareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareError::NotFound(kind, id) => write!(f, "No {} with id {}", kind, id),
            ShareError::CloudDisabled => write!(f, "Sharing requires a cloud container"),
            ShareError::Cloud(e) => write!(f, "Share failed: {}", e),
        }
    }
}

impl std::error::Error for ShareError {}

/// The entity types a session manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EntityKind {
    Customer,
    WorkOrder,
    Task,
    Tradesman,
    Invoice,
    Inventory,
    UsageRecord,
    JobCategory,
    JobOption,
    PaymentQrCode,
}

impl EntityKind {
    pub fn record_type(&self) -> &'static str {
        match self {
            EntityKind::Customer => Customer::RECORD_TYPE,
            EntityKind::WorkOrder => WorkOrder::RECORD_TYPE,
            EntityKind::Task => Task::RECORD_TYPE,
            EntityKind::Tradesman => Tradesman::RECORD_TYPE,
            EntityKind::Invoice => Invoice::RECORD_TYPE,
            EntityKind::Inventory => Inventory::RECORD_TYPE,
            EntityKind::UsageRecord => UsageRecord::RECORD_TYPE,
            EntityKind::JobCategory => JobCategory::RECORD_TYPE,
            EntityKind::JobOption => JobOption::RECORD_TYPE,
            EntityKind::PaymentQrCode => PaymentQrCode::RECORD_TYPE,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.record_type())
    }
}

/// All repositories over one pool.
pub struct Repositories {
    pub customers: CustomerRepo,
    pub work_orders: WorkOrderRepo,
    pub tradesmen: TradesmanRepo,
    pub invoices: InvoiceRepo,
    pub inventories: InventoryRepo,
    pub job_catalog: JobCatalogRepo,
    pub payment_qr: PaymentQrRepo,
}

impl Repositories {
    pub fn new(
        pool: &SqlitePool,
        codecs: &Arc<TransformerRegistry>,
        events: &Arc<dyn EventSink>,
    ) -> Self {
        Repositories {
            customers: CustomerRepo::new(pool.clone()),
            work_orders: WorkOrderRepo::new(pool.clone(), codecs.clone(), events.clone()),
            tradesmen: TradesmanRepo::new(pool.clone(), codecs.clone(), events.clone()),
            invoices: InvoiceRepo::new(pool.clone(), codecs.clone(), events.clone()),
            inventories: InventoryRepo::new(pool.clone()),
            job_catalog: JobCatalogRepo::new(pool.clone()),
            payment_qr: PaymentQrRepo::new(pool.clone()),
        }
    }
}

struct PendingSnapshot {
    customers: PendingSet<Customer>,
    work_orders: PendingSet<WorkOrder>,
    tasks: PendingSet<Task>,
    tradesmen: PendingSet<Tradesman>,
    invoices: PendingSet<Invoice>,
    inventories: PendingSet<Inventory>,
    usage_records: PendingSet<UsageRecord>,
    job_categories: PendingSet<JobCategory>,
    job_options: PendingSet<JobOption>,
    payment_qr_codes: PendingSet<PaymentQrCode>,
}

impl PendingSnapshot {
    fn len(&self) -> usize {
        self.customers.len()
            + self.work_orders.len()
            + self.tasks.len()
            + self.tradesmen.len()
            + self.invoices.len()
            + self.inventories.len()
            + self.usage_records.len()
            + self.job_categories.len()
            + self.job_options.len()
            + self.payment_qr_codes.len()
    }

    fn change_entries(&self) -> Vec<ChangeEntry> {
        fn extend<T: Recordable>(entries: &mut Vec<ChangeEntry>, set: &PendingSet<T>) {
            for (item, _) in &set.upserts {
                entries.push(ChangeEntry::upsert(T::RECORD_TYPE, item.record_id()));
            }
            for id in &set.deletes {
                entries.push(ChangeEntry::delete(T::RECORD_TYPE, *id));
            }
        }

        let mut entries = Vec::new();
        extend(&mut entries, &self.customers);
        extend(&mut entries, &self.work_orders);
        extend(&mut entries, &self.tasks);
        extend(&mut entries, &self.tradesmen);
        extend(&mut entries, &self.invoices);
        extend(&mut entries, &self.inventories);
        extend(&mut entries, &self.usage_records);
        extend(&mut entries, &self.job_categories);
        extend(&mut entries, &self.job_options);
        extend(&mut entries, &self.payment_qr_codes);
        entries
    }

    fn push_batch(&self) -> PushBatch {
        fn collect<T: Recordable>(
            saves: &mut Vec<CloudRecord>,
            deletes: &mut Vec<RecordRef>,
            set: &PendingSet<T>,
        ) {
            for (item, _) in &set.upserts {
                saves.push(item.to_cloud_record());
            }
            for id in &set.deletes {
                deletes.push(RecordRef::new(T::RECORD_TYPE, *id));
            }
        }

        let mut saves = Vec::new();
        let mut deletes = Vec::new();
        collect(&mut saves, &mut deletes, &self.customers);
        collect(&mut saves, &mut deletes, &self.work_orders);
        collect(&mut saves, &mut deletes, &self.tasks);
        collect(&mut saves, &mut deletes, &self.tradesmen);
        collect(&mut saves, &mut deletes, &self.invoices);
        collect(&mut saves, &mut deletes, &self.inventories);
        collect(&mut saves, &mut deletes, &self.usage_records);
        collect(&mut saves, &mut deletes, &self.job_categories);
        collect(&mut saves, &mut deletes, &self.job_options);
        collect(&mut saves, &mut deletes, &self.payment_qr_codes);
        PushBatch { saves, deletes }
    }
}

pub struct StoreSession {
    pool: SqlitePool,
    repos: Repositories,
    graph: Mutex<ObjectGraph>,
    events: Arc<dyn EventSink>,
    codecs: Arc<TransformerRegistry>,
    scheduler: OnceLock<SaveScheduler>,
    history_token: AtomicI64,
    closed: AtomicBool,
    container: Option<Arc<dyn CloudContainer>>,
    push_tx: Mutex<Option<mpsc::UnboundedSender<PushBatch>>>,
    push_worker: Mutex<Option<JoinHandle<()>>>,
    poll_workers: Mutex<Vec<JoinHandle<()>>>,
    remote_tx: broadcast::Sender<RemoteChangeNotice>,
}

impl StoreSession {
    /// Open the store, load the graph, and start the save and sync
    /// loops. The transformer registry must already hold every codec
    /// the stored blobs need.
    pub async fn open(
        options: StoreOptions,
        codecs: TransformerRegistry,
        container: Option<Arc<dyn CloudContainer>>,
        events: Arc<dyn EventSink>,
    ) -> Result<Arc<Self>, SessionError> {
        let pool = db::init_db(options.database_path.clone()).await?;
        let codecs = Arc::new(codecs);
        let repos = Repositories::new(&pool, &codecs, &events);

        let mut graph = ObjectGraph::new();
        graph.customers.load(repos.customers.list().await?);
        graph.work_orders.load(repos.work_orders.list().await?);
        graph.tasks.load(repos.work_orders.list_tasks().await?);
        graph.tradesmen.load(repos.tradesmen.list().await?);
        graph.invoices.load(repos.invoices.list().await?);
        graph.inventories.load(repos.inventories.list().await?);
        graph
            .usage_records
            .load(repos.inventories.list_usage_records().await?);
        graph
            .job_categories
            .load(repos.job_catalog.list_categories().await?);
        graph.job_options.load(repos.job_catalog.list_options().await?);
        graph.payment_qr_codes.load(repos.payment_qr.list().await?);

        let token = changelog::latest_token(&pool).await?;
        let (remote_tx, _) = broadcast::channel(64);

        let session = Arc::new(StoreSession {
            pool,
            repos,
            graph: Mutex::new(graph),
            events,
            codecs,
            scheduler: OnceLock::new(),
            history_token: AtomicI64::new(token.0),
            closed: AtomicBool::new(false),
            container: container.clone(),
            push_tx: Mutex::new(None),
            push_worker: Mutex::new(None),
            poll_workers: Mutex::new(Vec::new()),
            remote_tx,
        });

        let weak_session = Arc::downgrade(&session);
        let flush_target: Weak<dyn FlushTarget> = weak_session;
        let scheduler =
            SaveScheduler::start(flush_target, options.save_debounce, options.save_interval);
        let _ = session.scheduler.set(scheduler);

        if let Some(container) = container {
            let (push_tx, push_rx) = mpsc::unbounded_channel();
            *session.lock_push_tx() = Some(push_tx);
            *session
                .push_worker
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sync::spawn_push_worker(
                container.clone(),
                push_rx,
                session.events.clone(),
            ));

            let mut poll_workers = session
                .poll_workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            poll_workers.push(sync::spawn_pull_worker(
                container,
                session.pool.clone(),
                Repositories::new(&session.pool, &session.codecs, &session.events),
                session.remote_tx.clone(),
                session.events.clone(),
                options.cloud_poll_interval,
            ));
            poll_workers.push(sync::spawn_remote_listener(
                Arc::downgrade(&session),
                session.remote_tx.subscribe(),
                session.events.clone(),
            ));
        }

        Ok(session)
    }

    pub(crate) fn graph(&self) -> MutexGuard<'_, ObjectGraph> {
        self.graph
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_push_tx(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<PushBatch>>> {
        self.push_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    pub(crate) fn request_save(&self) {
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.request_save();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.graph().is_empty()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.graph().has_pending()
    }

    pub fn pending_changes(&self) -> usize {
        self.graph().pending_len()
    }

    pub fn history_position(&self) -> HistoryToken {
        HistoryToken(self.history_token.load(Ordering::SeqCst))
    }

    pub fn subscribe_remote_changes(&self) -> broadcast::Receiver<RemoteChangeNotice> {
        self.remote_tx.subscribe()
    }

    /// Write every pending change now, bypassing the debounce.
    pub async fn save_now(&self) -> Result<WriteOutcome, SessionError> {
        match self.write_pending().await {
            Ok(outcome) => {
                if let WriteOutcome::Written { changes } = outcome {
                    self.events.emit(SessionEvent::SaveCompleted { changes });
                }
                Ok(outcome)
            }
            Err(e) => {
                self.events.emit(SessionEvent::SaveFailed {
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn write_pending(&self) -> Result<WriteOutcome, SessionError> {
        // Snapshot under the lock, write outside it so edits keep
        // landing while the transaction runs.
        let pending = {
            let graph = self.graph();
            PendingSnapshot {
                customers: graph.customers.pending(),
                work_orders: graph.work_orders.pending(),
                tasks: graph.tasks.pending(),
                tradesmen: graph.tradesmen.pending(),
                invoices: graph.invoices.pending(),
                inventories: graph.inventories.pending(),
                usage_records: graph.usage_records.pending(),
                job_categories: graph.job_categories.pending(),
                job_options: graph.job_options.pending(),
                payment_qr_codes: graph.payment_qr_codes.pending(),
            }
        };

        let changes = pending.len();
        if changes == 0 {
            return Ok(WriteOutcome::NoChanges);
        }

        let entries = pending.change_entries();
        let mut tx = self.pool.begin().await?;

        // Deletes first, children before parents.
        for id in &pending.usage_records.deletes {
            self.repos.inventories.delete_usage_record(&mut *tx, id).await?;
        }
        for id in &pending.tasks.deletes {
            self.repos.work_orders.delete_task(&mut *tx, id).await?;
        }
        for id in &pending.invoices.deletes {
            self.repos.invoices.delete(&mut *tx, id).await?;
        }
        for id in &pending.work_orders.deletes {
            self.repos.work_orders.delete(&mut *tx, id).await?;
        }
        for id in &pending.inventories.deletes {
            self.repos.inventories.delete(&mut *tx, id).await?;
        }
        for id in &pending.job_options.deletes {
            self.repos.job_catalog.delete_option(&mut *tx, id).await?;
        }
        for id in &pending.job_categories.deletes {
            self.repos.job_catalog.delete_category(&mut *tx, id).await?;
        }
        for id in &pending.tradesmen.deletes {
            self.repos.tradesmen.delete(&mut *tx, id).await?;
        }
        for id in &pending.customers.deletes {
            self.repos.customers.delete(&mut *tx, id).await?;
        }
        for id in &pending.payment_qr_codes.deletes {
            self.repos.payment_qr.delete(&mut *tx, id).await?;
        }

        // Upserts, parents before children.
        for (customer, _) in &pending.customers.upserts {
            self.repos.customers.upsert(&mut *tx, customer).await?;
        }
        for (category, _) in &pending.job_categories.upserts {
            self.repos.job_catalog.upsert_category(&mut *tx, category).await?;
        }
        for (option, _) in &pending.job_options.upserts {
            self.repos.job_catalog.upsert_option(&mut *tx, option).await?;
        }
        for (tradesman, _) in &pending.tradesmen.upserts {
            self.repos.tradesmen.upsert(&mut *tx, tradesman).await?;
        }
        for (order, _) in &pending.work_orders.upserts {
            self.repos.work_orders.upsert(&mut *tx, order).await?;
        }
        for (task, _) in &pending.tasks.upserts {
            self.repos.work_orders.upsert_task(&mut *tx, task).await?;
        }
        for (invoice, _) in &pending.invoices.upserts {
            self.repos.invoices.upsert(&mut *tx, invoice).await?;
        }
        for (item, _) in &pending.inventories.upserts {
            self.repos.inventories.upsert(&mut *tx, item).await?;
        }
        for (record, _) in &pending.usage_records.upserts {
            self.repos.inventories.upsert_usage_record(&mut *tx, record).await?;
        }
        for (code, _) in &pending.payment_qr_codes.upserts {
            self.repos.payment_qr.upsert(&mut *tx, code).await?;
        }

        changelog::append(&mut *tx, AUTHOR_LOCAL, &entries).await?;
        tx.commit().await?;

        {
            let mut graph = self.graph();
            graph.customers.confirm(&pending.customers);
            graph.work_orders.confirm(&pending.work_orders);
            graph.tasks.confirm(&pending.tasks);
            graph.tradesmen.confirm(&pending.tradesmen);
            graph.invoices.confirm(&pending.invoices);
            graph.inventories.confirm(&pending.inventories);
            graph.usage_records.confirm(&pending.usage_records);
            graph.job_categories.confirm(&pending.job_categories);
            graph.job_options.confirm(&pending.job_options);
            graph.payment_qr_codes.confirm(&pending.payment_qr_codes);
        }

        self.queue_push(&pending);

        Ok(WriteOutcome::Written { changes })
    }

    fn queue_push(&self, pending: &PendingSnapshot) {
        let guard = self.lock_push_tx();
        let tx = match guard.as_ref() {
            Some(tx) => tx,
            None => return,
        };
        let batch = pending.push_batch();
        if batch.saves.is_empty() && batch.deletes.is_empty() {
            return;
        }
        let _ = tx.send(batch);
    }

    /// Fold writes made by other connections (the sync worker) into the
    /// graph. Local batches advance the token without being re-applied.
    pub async fn refresh(&self) -> Result<usize, SessionError> {
        let token = self.history_position();
        let batches = changelog::changes_since(&self.pool, token).await?;
        if batches.is_empty() {
            return Ok(0);
        }

        let mut max_seq = token.0;
        let mut applied = 0usize;

        for batch in batches {
            max_seq = max_seq.max(batch.token.0);
            if batch.author == AUTHOR_LOCAL {
                continue;
            }
            for entry in batch.entries {
                applied += 1;
                match entry.kind {
                    ChangeKind::Upsert => self.adopt_remote_upsert(&entry).await?,
                    ChangeKind::Delete => self.adopt_remote_removal(&entry),
                }
            }
        }

        self.history_token.store(max_seq, Ordering::SeqCst);

        if applied > 0 {
            self.events.emit(SessionEvent::RemoteApplied { changes: applied });
            if self.graph().has_pending() {
                // Merges over dirty entities still need saving.
                self.request_save();
            }
        }
        Ok(applied)
    }

    async fn adopt_remote_upsert(&self, entry: &ChangeEntry) -> Result<(), SessionError> {
        match entry.entity_type.as_str() {
            "Customer" => {
                if let Some(entity) = self.repos.customers.get(&entry.entity_id).await? {
                    self.graph().customers.apply_remote(entity);
                }
            }
            "WorkOrder" => {
                if let Some(entity) = self.repos.work_orders.get(&entry.entity_id).await? {
                    self.graph().work_orders.apply_remote(entity);
                }
            }
            "Task" => {
                if let Some(entity) = self.repos.work_orders.get_task(&entry.entity_id).await? {
                    self.graph().tasks.apply_remote(entity);
                }
            }
            "Tradesman" => {
                if let Some(entity) = self.repos.tradesmen.get(&entry.entity_id).await? {
                    self.graph().tradesmen.apply_remote(entity);
                }
            }
            "Invoice" => {
                if let Some(entity) = self.repos.invoices.get(&entry.entity_id).await? {
                    self.graph().invoices.apply_remote(entity);
                }
            }
            "Inventory" => {
                if let Some(entity) = self.repos.inventories.get(&entry.entity_id).await? {
                    self.graph().inventories.apply_remote(entity);
                }
            }
            "UsageRecord" => {
                if let Some(entity) = self
                    .repos
                    .inventories
                    .get_usage_record(&entry.entity_id)
                    .await?
                {
                    self.graph().usage_records.apply_remote(entity);
                }
            }
            "JobCategory" => {
                if let Some(entity) = self.repos.job_catalog.get_category(&entry.entity_id).await? {
                    self.graph().job_categories.apply_remote(entity);
                }
            }
            "JobOption" => {
                if let Some(entity) = self.repos.job_catalog.get_option(&entry.entity_id).await? {
                    self.graph().job_options.apply_remote(entity);
                }
            }
            "PaymentQrCode" => {
                if let Some(entity) = self.repos.payment_qr.get(&entry.entity_id).await? {
                    self.graph().payment_qr_codes.apply_remote(entity);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Remove an entity the store already deleted, mirroring the same
    /// cascades the schema applied.
    fn adopt_remote_removal(&self, entry: &ChangeEntry) {
        let mut graph = self.graph();
        let id = &entry.entity_id;
        match entry.entity_type.as_str() {
            "Customer" => {
                let order_ids: Vec<Uuid> = graph
                    .work_orders
                    .iter()
                    .filter(|order| order.customer_id == Some(*id))
                    .map(|order| order.id)
                    .collect();
                for order_id in order_ids {
                    adopt_order_removal(&mut graph, &order_id);
                }
                graph.customers.adopt_removal(id);
            }
            "WorkOrder" => adopt_order_removal(&mut graph, id),
            "Task" => graph.tasks.adopt_removal(id),
            "Tradesman" => graph.tradesmen.adopt_removal(id),
            "Invoice" => graph.invoices.adopt_removal(id),
            "Inventory" => {
                let record_ids: Vec<Uuid> = graph
                    .usage_records
                    .iter()
                    .filter(|record| record.inventory_id == *id)
                    .map(|record| record.id)
                    .collect();
                for record_id in record_ids {
                    graph.usage_records.adopt_removal(&record_id);
                }
                graph.inventories.adopt_removal(id);
            }
            "UsageRecord" => graph.usage_records.adopt_removal(id),
            "JobCategory" => {
                let option_ids: Vec<Uuid> = graph
                    .job_options
                    .iter()
                    .filter(|option| option.category_id == Some(*id))
                    .map(|option| option.id)
                    .collect();
                for option_id in option_ids {
                    graph.job_options.adopt_removal(&option_id);
                }
                graph.job_categories.adopt_removal(id);
            }
            "JobOption" => graph.job_options.adopt_removal(id),
            "PaymentQrCode" => graph.payment_qr_codes.adopt_removal(id),
            _ => {}
        }
    }

    /// Pull remote changes once and fold them in. Used by hosts that
    /// want sync on demand instead of waiting for the poll loop.
    pub async fn pull_now(&self) -> Result<usize, SessionError> {
        let container = match &self.container {
            Some(container) => container.clone(),
            None => return Ok(0),
        };

        sync::pull_once(
            container.as_ref(),
            &self.pool,
            &self.repos,
            &self.remote_tx,
        )
        .await?;

        self.refresh().await
    }

    /// Share one record through the cloud container.
    pub async fn share_record(&self, kind: EntityKind, id: &Uuid) -> Result<ShareHandle, ShareError> {
        let container = match &self.container {
            Some(container) => container.clone(),
            None => return Err(ShareError::CloudDisabled),
        };

        let record = self
            .cloud_record_for(kind, id)
            .ok_or(ShareError::NotFound(kind, *id))?;

        container
            .share(record, SharePermission::ReadWrite)
            .await
            .map_err(ShareError::Cloud)
    }

    fn cloud_record_for(&self, kind: EntityKind, id: &Uuid) -> Option<CloudRecord> {
        let graph = self.graph();
        match kind {
            EntityKind::Customer => graph.customers.get(id).map(Recordable::to_cloud_record),
            EntityKind::WorkOrder => graph.work_orders.get(id).map(Recordable::to_cloud_record),
            EntityKind::Task => graph.tasks.get(id).map(Recordable::to_cloud_record),
            EntityKind::Tradesman => graph.tradesmen.get(id).map(Recordable::to_cloud_record),
            EntityKind::Invoice => graph.invoices.get(id).map(Recordable::to_cloud_record),
            EntityKind::Inventory => graph.inventories.get(id).map(Recordable::to_cloud_record),
            EntityKind::UsageRecord => {
                graph.usage_records.get(id).map(Recordable::to_cloud_record)
            }
            EntityKind::JobCategory => {
                graph.job_categories.get(id).map(Recordable::to_cloud_record)
            }
            EntityKind::JobOption => graph.job_options.get(id).map(Recordable::to_cloud_record),
            EntityKind::PaymentQrCode => {
                graph.payment_qr_codes.get(id).map(Recordable::to_cloud_record)
            }
        }
    }

    /// Flush, stop the background loops, and close the pool. Safe to
    /// call more than once.
    pub async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self.save_now().await.map(|_| ());

        if let Some(scheduler) = self.scheduler.get() {
            scheduler.shutdown().await;
        }

        // Dropping the sender lets the push worker drain and exit.
        let _ = self.lock_push_tx().take();
        let push_worker = self
            .push_worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = push_worker {
            let _ = handle.await;
        }

        let poll_workers = {
            let mut guard = self
                .poll_workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in poll_workers {
            handle.abort();
        }

        self.pool.close().await;
        result
    }
}

fn adopt_order_removal(graph: &mut ObjectGraph, order_id: &Uuid) {
    let task_ids: Vec<Uuid> = graph
        .tasks
        .iter()
        .filter(|task| task.work_order_id == *order_id)
        .map(|task| task.id)
        .collect();
    for task_id in task_ids {
        graph.tasks.adopt_removal(&task_id);
    }
    let invoice_ids: Vec<Uuid> = graph
        .invoices
        .iter()
        .filter(|invoice| invoice.work_order_id == Some(*order_id))
        .map(|invoice| invoice.id)
        .collect();
    for invoice_id in invoice_ids {
        graph.invoices.adopt_removal(&invoice_id);
    }
    graph.work_orders.adopt_removal(order_id);
}

#[async_trait]
impl FlushTarget for StoreSession {
    async fn flush(&self) -> Result<WriteOutcome, SessionError> {
        self.save_now().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{InMemoryContainer, SyncCursor};
    use crate::db::AUTHOR_REMOTE;
    use tempfile::TempDir;

    fn test_options(dir: &TempDir) -> StoreOptions {
        StoreOptions {
            database_path: Some(dir.path().join("test.db")),
            save_debounce: Duration::from_millis(40),
            save_interval: Duration::from_secs(60),
            cloud_poll_interval: Duration::from_millis(50),
        }
    }

    async fn open_session(
        dir: &TempDir,
        container: Option<Arc<dyn CloudContainer>>,
    ) -> (Arc<StoreSession>, Arc<MemorySink>) {
        let events = Arc::new(MemorySink::new());
        let session = StoreSession::open(
            test_options(dir),
            TransformerRegistry::standard(),
            container,
            events.clone(),
        )
        .await
        .unwrap();
        (session, events)
    }

    #[tokio::test]
    async fn test_save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        {
            let (session, _) = open_session(&dir, None).await;

            let customer = Customer::new("Dana Whitfield");
            let customer_id = customer.id;
            let order = WorkOrder::new(1001, "Plumbing");
            let order_id = order.id;

            session.insert_customer(customer).unwrap();
            session.insert_work_order(order).unwrap();
            session.attach_work_order(order_id, customer_id).unwrap();

            session.save_now().await.unwrap();
            session.close().await.unwrap();
        }

        let (session, _) = open_session(&dir, None).await;
        let customers = session.list_customers();
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].work_order_ids.len(), 1);

        let order = session.list_work_orders().pop().unwrap();
        assert_eq!(order.customer_id, Some(customers[0].id));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_of_edits_writes_one_batch() {
        let dir = TempDir::new().unwrap();
        let (session, events) = open_session(&dir, None).await;

        for i in 0..5 {
            session
                .insert_customer(Customer::new(format!("Customer {}", i)))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;

        let batches = changelog::changes_since(&session.pool, HistoryToken::zero())
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].entries.len(), 5);

        let saves = events
            .events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::SaveCompleted { .. }))
            .count();
        assert_eq!(saves, 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_without_changes_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (session, events) = open_session(&dir, None).await;

        assert_eq!(session.save_now().await.unwrap(), WriteOutcome::NoChanges);

        let batches = changelog::changes_since(&session.pool, HistoryToken::zero())
            .await
            .unwrap();
        assert!(batches.is_empty());
        assert!(events.events().is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_flushes_pending_edits() {
        let dir = TempDir::new().unwrap();
        {
            let events = Arc::new(MemorySink::new());
            let session = StoreSession::open(
                StoreOptions {
                    database_path: Some(dir.path().join("test.db")),
                    // Timers long enough that only close can write.
                    save_debounce: Duration::from_secs(600),
                    save_interval: Duration::from_secs(600),
                    ..StoreOptions::default()
                },
                TransformerRegistry::standard(),
                None,
                events,
            )
            .await
            .unwrap();

            session.insert_customer(Customer::new("Dana Whitfield")).unwrap();
            session.close().await.unwrap();
        }

        let (session, _) = open_session(&dir, None).await;
        assert_eq!(session.list_customers().len(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_rejects_edits() {
        let dir = TempDir::new().unwrap();
        let (session, _) = open_session(&dir, None).await;
        session.close().await.unwrap();

        let result = session.insert_customer(Customer::new("Too late"));
        assert!(matches!(result, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_refresh_folds_in_foreign_writes() {
        let dir = TempDir::new().unwrap();
        let (session, events) = open_session(&dir, None).await;

        // Another connection commits a customer with a remote author.
        let customer = Customer::new("From Elsewhere");
        let mut tx = session.pool.begin().await.unwrap();
        session.repos.customers.upsert(&mut tx, &customer).await.unwrap();
        changelog::append(
            &mut tx,
            AUTHOR_REMOTE,
            &[ChangeEntry::upsert("Customer", customer.id)],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let applied = session.refresh().await.unwrap();
        assert_eq!(applied, 1);
        assert!(session.get_customer(&customer.id).is_some());
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, SessionEvent::RemoteApplied { changes: 1 })));

        // A second refresh finds nothing new.
        assert_eq!(session.refresh().await.unwrap(), 0);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_skips_own_batches() {
        let dir = TempDir::new().unwrap();
        let (session, _) = open_session(&dir, None).await;

        session.insert_customer(Customer::new("Dana Whitfield")).unwrap();
        session.save_now().await.unwrap();

        assert_eq!(session.refresh().await.unwrap(), 0);
        assert!(session.history_position() > HistoryToken::zero());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_push_worker_forwards_saves_to_container() {
        let dir = TempDir::new().unwrap();
        let container = Arc::new(InMemoryContainer::new());
        let (session, _) =
            open_session(&dir, Some(container.clone() as Arc<dyn CloudContainer>)).await;

        let customer = Customer::new("Dana Whitfield");
        let record_name = customer.to_cloud_record().record_name;
        session.insert_customer(customer).unwrap();
        session.save_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(container.latest(&record_name).await.is_some());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pull_now_applies_container_records() {
        let dir = TempDir::new().unwrap();
        let container = Arc::new(InMemoryContainer::new());

        // A record already in the container, as if another device
        // pushed it.
        let remote_customer = Customer::new("From Another Device");
        container
            .push(&[remote_customer.to_cloud_record()])
            .await
            .unwrap();

        let (session, _) =
            open_session(&dir, Some(container as Arc<dyn CloudContainer>)).await;
        let applied = session.pull_now().await.unwrap();

        assert_eq!(applied, 1);
        let loaded = session.get_customer(&remote_customer.id).unwrap();
        assert_eq!(loaded.name, "From Another Device");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_share_record_returns_handle() {
        let dir = TempDir::new().unwrap();
        let container = Arc::new(InMemoryContainer::new());
        let (session, _) =
            open_session(&dir, Some(container as Arc<dyn CloudContainer>)).await;

        let order = WorkOrder::new(1001, "Plumbing");
        let order_id = order.id;
        session.insert_work_order(order).unwrap();

        let handle = session
            .share_record(EntityKind::WorkOrder, &order_id)
            .await
            .unwrap();
        assert!(handle.url.contains(&handle.record_name));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_share_record_without_container_fails() {
        let dir = TempDir::new().unwrap();
        let (session, _) = open_session(&dir, None).await;

        let result = session
            .share_record(EntityKind::Customer, &Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(ShareError::CloudDisabled)));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_share_record_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let container = Arc::new(InMemoryContainer::new());
        let (session, _) =
            open_session(&dir, Some(container as Arc<dyn CloudContainer>)).await;

        let missing = Uuid::new_v4();
        let result = session.share_record(EntityKind::Customer, &missing).await;
        assert!(matches!(result, Err(ShareError::NotFound(EntityKind::Customer, id)) if id == missing));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_poll_loop_delivers_remote_changes() {
        let dir = TempDir::new().unwrap();
        let container = Arc::new(InMemoryContainer::new());
        let (session, _) =
            open_session(&dir, Some(container.clone() as Arc<dyn CloudContainer>)).await;

        // Establish the cursor, then push a record from "elsewhere".
        tokio::time::sleep(Duration::from_millis(80)).await;
        let remote_customer = Customer::new("Polled In");
        container
            .push(&[remote_customer.to_cloud_record()])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(session.get_customer(&remote_customer.id).is_some());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_edit_and_remote_change_merge() {
        let dir = TempDir::new().unwrap();
        let (session, _) = open_session(&dir, None).await;

        let customer = Customer::new("Dana Whitfield").with_phone("555-0100");
        let customer_id = customer.id;
        session.insert_customer(customer.clone()).unwrap();
        session.save_now().await.unwrap();

        // Local edit not yet saved.
        session
            .update_customer(&customer_id, |c| {
                c.phone = Some("555-0199".to_string());
            })
            .unwrap();

        // Remote rename lands through another connection.
        let mut remote = customer;
        remote.name = "Dana W.".to_string();
        let mut tx = session.pool.begin().await.unwrap();
        session.repos.customers.upsert(&mut tx, &remote).await.unwrap();
        changelog::append(
            &mut tx,
            AUTHOR_REMOTE,
            &[ChangeEntry::upsert("Customer", customer_id)],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        session.refresh().await.unwrap();

        let merged = session.get_customer(&customer_id).unwrap();
        assert_eq!(merged.name, "Dana W.");
        assert_eq!(merged.phone.as_deref(), Some("555-0199"));
        assert!(session.has_pending_changes());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pull_cursor_survives_restart() {
        let dir = TempDir::new().unwrap();
        let container = Arc::new(InMemoryContainer::new());

        let remote_customer = Customer::new("Once Only");
        container
            .push(&[remote_customer.to_cloud_record()])
            .await
            .unwrap();

        {
            let (session, _) =
                open_session(&dir, Some(container.clone() as Arc<dyn CloudContainer>)).await;
            session.pull_now().await.unwrap();
            session.close().await.unwrap();
        }

        let cursor = {
            let pool = db::init_db(Some(dir.path().join("test.db"))).await.unwrap();
            let cursor = db::cursor::load_cursor(&pool).await.unwrap();
            pool.close().await;
            cursor
        };
        assert_ne!(cursor, SyncCursor(None));
    }
}
