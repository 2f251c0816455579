//! In-memory object graph.
//!
//! The session keeps every entity in memory and tracks which ones have
//! unsaved edits. Saves are two-phase: `pending` snapshots the dirty
//! entities with a change stamp, the store writes the snapshot, and
//! `confirm` clears only entities whose stamp has not moved since the
//! snapshot. Edits that land mid-save stay pending for the next one.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::cloud::{RecordFields, Recordable};
use crate::models::{
    Customer, Inventory, Invoice, JobCategory, JobOption, PaymentQrCode, Task, Tradesman,
    UsageRecord, WorkOrder,
};

use super::merge::merge_fields;

/// Snapshot of one entity set's unsaved changes.
pub struct PendingSet<T> {
    pub upserts: Vec<(T, u64)>,
    pub deletes: Vec<Uuid>,
}

impl<T> PendingSet<T> {
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// One entity type's live objects plus its dirty bookkeeping.
pub struct EntitySet<T> {
    items: BTreeMap<Uuid, T>,
    dirty: HashMap<Uuid, u64>,
    deleted: HashSet<Uuid>,
    // Fields as last persisted, the base concurrent merges diff against.
    saved_fields: HashMap<Uuid, RecordFields>,
    stamp: u64,
}

impl<T> Default for EntitySet<T> {
    fn default() -> Self {
        EntitySet {
            items: BTreeMap::new(),
            dirty: HashMap::new(),
            deleted: HashSet::new(),
            saved_fields: HashMap::new(),
            stamp: 0,
        }
    }
}

impl<T: Recordable + Clone> EntitySet<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&T> {
        self.items.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Seed the set from the store without marking anything dirty.
    pub fn load(&mut self, items: Vec<T>) {
        for item in items {
            let id = item.record_id();
            self.saved_fields.insert(id, item.record_fields());
            self.items.insert(id, item);
        }
    }

    fn mark_dirty(&mut self, id: Uuid) {
        self.stamp += 1;
        self.dirty.insert(id, self.stamp);
    }

    pub fn insert(&mut self, item: T) {
        let id = item.record_id();
        self.deleted.remove(&id);
        self.items.insert(id, item);
        self.mark_dirty(id);
    }

    pub fn update(&mut self, id: &Uuid, apply: impl FnOnce(&mut T)) -> bool {
        match self.items.get_mut(id) {
            Some(item) => {
                apply(item);
                self.mark_dirty(*id);
                true
            }
            None => false,
        }
    }

    /// Remove the entity, leaving a pending tombstone if it has ever
    /// been persisted.
    pub fn remove(&mut self, id: &Uuid) -> Option<T> {
        let item = self.items.remove(id)?;
        self.dirty.remove(id);
        if self.saved_fields.remove(id).is_some() {
            self.deleted.insert(*id);
        }
        Some(item)
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty() || !self.deleted.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        let upserts = self
            .dirty
            .keys()
            .filter(|id| self.items.contains_key(id))
            .count();
        upserts + self.deleted.len()
    }

    pub fn pending(&self) -> PendingSet<T> {
        let mut upserts: Vec<(T, u64)> = self
            .dirty
            .iter()
            .filter_map(|(id, stamp)| self.items.get(id).map(|item| (item.clone(), *stamp)))
            .collect();
        upserts.sort_by_key(|(item, _)| item.record_id());

        let mut deletes: Vec<Uuid> = self.deleted.iter().copied().collect();
        deletes.sort();

        PendingSet { upserts, deletes }
    }

    /// Mark a flushed snapshot as persisted. Entities edited after the
    /// snapshot keep their newer stamp and stay dirty.
    pub fn confirm(&mut self, pending: &PendingSet<T>) {
        for (item, stamp) in &pending.upserts {
            let id = item.record_id();
            if self.dirty.get(&id) == Some(stamp) {
                self.dirty.remove(&id);
            }
            self.saved_fields.insert(id, item.record_fields());
        }
        for id in &pending.deletes {
            self.deleted.remove(id);
        }
    }

    /// Fold in a version of the entity that already reached the store
    /// through the remote change path.
    pub fn apply_remote(&mut self, incoming: T) {
        let id = incoming.record_id();
        if self.deleted.contains(&id) {
            // The pending local tombstone wins until it flushes.
            return;
        }

        let remote_fields = incoming.record_fields();
        if self.dirty.contains_key(&id) {
            if let Some(existing) = self.items.get_mut(&id) {
                let base = self.saved_fields.get(&id).cloned().unwrap_or_default();
                let merged = merge_fields(&existing.record_fields(), &base, &remote_fields);
                existing.apply_fields(&merged);
                self.saved_fields.insert(id, remote_fields);
                return;
            }
        }

        self.items.insert(id, incoming);
        self.saved_fields.insert(id, remote_fields);
        self.dirty.remove(&id);
    }

    /// Fold in a deletion that already reached the store.
    pub fn adopt_removal(&mut self, id: &Uuid) {
        self.items.remove(id);
        self.dirty.remove(id);
        self.saved_fields.remove(id);
        self.deleted.remove(id);
    }
}

/// The full graph: one set per entity type plus relationship upkeep.
///
/// Relationship mutations maintain both sides, and deletions apply the
/// same cascade rules the store schema enforces, so the graph never
/// drifts from what a reload would produce.
#[derive(Default)]
pub struct ObjectGraph {
    pub customers: EntitySet<Customer>,
    pub work_orders: EntitySet<WorkOrder>,
    pub tasks: EntitySet<Task>,
    pub tradesmen: EntitySet<Tradesman>,
    pub invoices: EntitySet<Invoice>,
    pub inventories: EntitySet<Inventory>,
    pub usage_records: EntitySet<UsageRecord>,
    pub job_categories: EntitySet<JobCategory>,
    pub job_options: EntitySet<JobOption>,
    pub payment_qr_codes: EntitySet<PaymentQrCode>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        ObjectGraph::default()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
            && self.work_orders.is_empty()
            && self.tasks.is_empty()
            && self.tradesmen.is_empty()
            && self.invoices.is_empty()
            && self.inventories.is_empty()
            && self.usage_records.is_empty()
            && self.job_categories.is_empty()
            && self.job_options.is_empty()
            && self.payment_qr_codes.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        self.customers.has_pending()
            || self.work_orders.has_pending()
            || self.tasks.has_pending()
            || self.tradesmen.has_pending()
            || self.invoices.has_pending()
            || self.inventories.has_pending()
            || self.usage_records.has_pending()
            || self.job_categories.has_pending()
            || self.job_options.has_pending()
            || self.payment_qr_codes.has_pending()
    }

    pub fn pending_len(&self) -> usize {
        self.customers.pending_len()
            + self.work_orders.pending_len()
            + self.tasks.pending_len()
            + self.tradesmen.pending_len()
            + self.invoices.pending_len()
            + self.inventories.pending_len()
            + self.usage_records.pending_len()
            + self.job_categories.pending_len()
            + self.job_options.pending_len()
            + self.payment_qr_codes.pending_len()
    }

    pub fn next_work_order_number(&self) -> i64 {
        self.work_orders
            .iter()
            .map(|order| order.number)
            .max()
            .unwrap_or(1000)
            + 1
    }

    pub fn next_invoice_number(&self) -> i64 {
        self.invoices
            .iter()
            .map(|invoice| invoice.invoice_number)
            .max()
            .unwrap_or(5000)
            + 1
    }

    /// Attach a work order to a customer, detaching it from its current
    /// customer first.
    pub fn attach_work_order(&mut self, order_id: Uuid, customer_id: Uuid) -> bool {
        if !self.customers.contains(&customer_id) || !self.work_orders.contains(&order_id) {
            return false;
        }
        let previous = self.work_orders.get(&order_id).and_then(|o| o.customer_id);
        if previous == Some(customer_id) {
            return true;
        }
        if let Some(previous) = previous {
            self.customers.update(&previous, |customer| {
                customer.remove_work_order(&order_id);
            });
        }
        self.work_orders.update(&order_id, |order| {
            order.customer_id = Some(customer_id);
            order.updated_at = Utc::now();
        });
        self.customers.update(&customer_id, |customer| {
            customer.add_work_order(order_id);
        });
        true
    }

    pub fn assign_tradesman(&mut self, order_id: Uuid, tradesman_id: Uuid) -> bool {
        if !self.work_orders.contains(&order_id) || !self.tradesmen.contains(&tradesman_id) {
            return false;
        }
        self.work_orders.update(&order_id, |order| {
            order.add_tradesman(tradesman_id);
        });
        self.tradesmen.update(&tradesman_id, |tradesman| {
            tradesman.add_work_order(order_id);
        });
        true
    }

    pub fn unassign_tradesman(&mut self, order_id: Uuid, tradesman_id: Uuid) -> bool {
        let mut removed = false;
        self.work_orders.update(&order_id, |order| {
            removed = order.remove_tradesman(&tradesman_id);
        });
        if removed {
            self.tradesmen.update(&tradesman_id, |tradesman| {
                tradesman.remove_work_order(&order_id);
            });
        }
        removed
    }

    /// Attach an invoice to a work order. Each side holds at most one
    /// of the other, so existing pairings are broken first.
    pub fn attach_invoice(&mut self, invoice_id: Uuid, order_id: Uuid) -> bool {
        if !self.invoices.contains(&invoice_id) || !self.work_orders.contains(&order_id) {
            return false;
        }
        if let Some(current) = self.work_orders.get(&order_id).and_then(|o| o.invoice_id) {
            if current == invoice_id {
                return true;
            }
            self.invoices.update(&current, |invoice| {
                invoice.work_order_id = None;
                invoice.updated_at = Utc::now();
            });
        }
        if let Some(previous) = self.invoices.get(&invoice_id).and_then(|i| i.work_order_id) {
            self.work_orders.update(&previous, |order| {
                order.invoice_id = None;
                order.updated_at = Utc::now();
            });
        }

        let customer_id = self.work_orders.get(&order_id).and_then(|o| o.customer_id);
        self.work_orders.update(&order_id, |order| {
            order.invoice_id = Some(invoice_id);
            order.updated_at = Utc::now();
        });
        self.invoices.update(&invoice_id, |invoice| {
            invoice.work_order_id = Some(order_id);
            invoice.customer_id = customer_id;
            invoice.updated_at = Utc::now();
        });
        true
    }

    pub fn add_task(&mut self, task: Task) -> bool {
        if !self.work_orders.contains(&task.work_order_id) {
            return false;
        }
        let task_id = task.id;
        let order_id = task.work_order_id;
        self.tasks.insert(task);
        self.work_orders.update(&order_id, |order| {
            order.add_task(task_id);
        });
        true
    }

    /// Hand an inventory to a tradesman. One inventory per tradesman
    /// and one tradesman per inventory.
    pub fn assign_inventory(&mut self, inventory_id: Uuid, tradesman_id: Uuid) -> bool {
        if !self.inventories.contains(&inventory_id) || !self.tradesmen.contains(&tradesman_id) {
            return false;
        }
        if let Some(current) = self
            .tradesmen
            .get(&tradesman_id)
            .and_then(|t| t.inventory_id)
        {
            if current == inventory_id {
                return true;
            }
            self.inventories.update(&current, |item| {
                item.tradesman_id = None;
                item.updated_at = Utc::now();
            });
        }
        if let Some(previous) = self
            .inventories
            .get(&inventory_id)
            .and_then(|i| i.tradesman_id)
        {
            self.tradesmen.update(&previous, |tradesman| {
                tradesman.inventory_id = None;
                tradesman.updated_at = Utc::now();
            });
        }

        self.inventories.update(&inventory_id, |item| {
            item.tradesman_id = Some(tradesman_id);
            item.updated_at = Utc::now();
        });
        self.tradesmen.update(&tradesman_id, |tradesman| {
            tradesman.inventory_id = Some(inventory_id);
            tradesman.updated_at = Utc::now();
        });
        true
    }

    /// Pick a catalog option for a work order. The order's category
    /// text follows the option's category when one is set.
    pub fn choose_job_option(&mut self, order_id: Uuid, option_id: Uuid) -> bool {
        if !self.work_orders.contains(&order_id) || !self.job_options.contains(&option_id) {
            return false;
        }
        let category_name = self
            .job_options
            .get(&option_id)
            .and_then(|option| option.category_id)
            .and_then(|category_id| self.job_categories.get(&category_id))
            .map(|category| category.name.clone());

        self.work_orders.update(&order_id, |order| {
            order.job_option_id = Some(option_id);
            if let Some(name) = category_name {
                order.category = name;
            }
            order.updated_at = Utc::now();
        });
        true
    }

    pub fn add_option_to_category(&mut self, option_id: Uuid, category_id: Uuid) -> bool {
        if !self.job_options.contains(&option_id) || !self.job_categories.contains(&category_id) {
            return false;
        }
        if let Some(previous) = self.job_options.get(&option_id).and_then(|o| o.category_id) {
            if previous == category_id {
                return true;
            }
            self.job_categories.update(&previous, |category| {
                category.remove_option(&option_id);
            });
        }
        self.job_options.update(&option_id, |option| {
            option.category_id = Some(category_id);
            option.updated_at = Utc::now();
        });
        self.job_categories.update(&category_id, |category| {
            category.add_option(option_id);
        });
        true
    }

    /// Consume stock and create the matching usage record.
    pub fn record_usage(&mut self, inventory_id: Uuid, quantity: i64) -> Option<UsageRecord> {
        let mut produced = None;
        self.inventories.update(&inventory_id, |item| {
            produced = Some(item.record_usage(quantity));
        });
        let record = produced?;
        self.usage_records.insert(record.clone());
        Some(record)
    }

    pub fn delete_customer(&mut self, id: &Uuid) -> bool {
        if self.customers.remove(id).is_none() {
            return false;
        }
        let order_ids: Vec<Uuid> = self
            .work_orders
            .iter()
            .filter(|order| order.customer_id == Some(*id))
            .map(|order| order.id)
            .collect();
        for order_id in order_ids {
            self.delete_work_order(&order_id);
        }
        // Invoices referencing the customer directly survive with the
        // reference cleared.
        let invoice_ids: Vec<Uuid> = self
            .invoices
            .iter()
            .filter(|invoice| invoice.customer_id == Some(*id))
            .map(|invoice| invoice.id)
            .collect();
        for invoice_id in invoice_ids {
            self.invoices.update(&invoice_id, |invoice| {
                invoice.customer_id = None;
                invoice.updated_at = Utc::now();
            });
        }
        true
    }

    pub fn delete_work_order(&mut self, id: &Uuid) -> bool {
        let order = match self.work_orders.remove(id) {
            Some(order) => order,
            None => return false,
        };

        let task_ids: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|task| task.work_order_id == *id)
            .map(|task| task.id)
            .collect();
        for task_id in task_ids {
            self.tasks.remove(&task_id);
        }

        let invoice_ids: Vec<Uuid> = self
            .invoices
            .iter()
            .filter(|invoice| invoice.work_order_id == Some(*id))
            .map(|invoice| invoice.id)
            .collect();
        for invoice_id in invoice_ids {
            self.invoices.remove(&invoice_id);
        }

        if let Some(customer_id) = order.customer_id {
            self.customers.update(&customer_id, |customer| {
                customer.remove_work_order(id);
            });
        }
        for tradesman_id in &order.tradesman_ids {
            self.tradesmen.update(tradesman_id, |tradesman| {
                tradesman.remove_work_order(id);
            });
        }
        true
    }

    pub fn delete_task(&mut self, id: &Uuid) -> bool {
        let task = match self.tasks.remove(id) {
            Some(task) => task,
            None => return false,
        };
        self.work_orders.update(&task.work_order_id, |order| {
            order.remove_task(id);
        });
        true
    }

    pub fn delete_tradesman(&mut self, id: &Uuid) -> bool {
        let tradesman = match self.tradesmen.remove(id) {
            Some(tradesman) => tradesman,
            None => return false,
        };
        for order_id in &tradesman.work_order_ids {
            self.work_orders.update(order_id, |order| {
                order.remove_tradesman(id);
            });
        }
        if let Some(inventory_id) = tradesman.inventory_id {
            self.inventories.update(&inventory_id, |item| {
                item.tradesman_id = None;
                item.updated_at = Utc::now();
            });
        }
        true
    }

    pub fn delete_invoice(&mut self, id: &Uuid) -> bool {
        let invoice = match self.invoices.remove(id) {
            Some(invoice) => invoice,
            None => return false,
        };
        if let Some(order_id) = invoice.work_order_id {
            self.work_orders.update(&order_id, |order| {
                order.invoice_id = None;
                order.updated_at = Utc::now();
            });
        }
        true
    }

    pub fn delete_inventory(&mut self, id: &Uuid) -> bool {
        let item = match self.inventories.remove(id) {
            Some(item) => item,
            None => return false,
        };
        let record_ids: Vec<Uuid> = self
            .usage_records
            .iter()
            .filter(|record| record.inventory_id == *id)
            .map(|record| record.id)
            .collect();
        for record_id in record_ids {
            self.usage_records.remove(&record_id);
        }
        if let Some(tradesman_id) = item.tradesman_id {
            self.tradesmen.update(&tradesman_id, |tradesman| {
                tradesman.inventory_id = None;
                tradesman.updated_at = Utc::now();
            });
        }
        true
    }

    pub fn delete_usage_record(&mut self, id: &Uuid) -> bool {
        let record = match self.usage_records.remove(id) {
            Some(record) => record,
            None => return false,
        };
        self.inventories.update(&record.inventory_id, |item| {
            item.remove_usage_record(id);
        });
        true
    }

    pub fn delete_job_category(&mut self, id: &Uuid) -> bool {
        if self.job_categories.remove(id).is_none() {
            return false;
        }
        let option_ids: Vec<Uuid> = self
            .job_options
            .iter()
            .filter(|option| option.category_id == Some(*id))
            .map(|option| option.id)
            .collect();
        for option_id in option_ids {
            self.delete_job_option(&option_id);
        }
        true
    }

    pub fn delete_job_option(&mut self, id: &Uuid) -> bool {
        let option = match self.job_options.remove(id) {
            Some(option) => option,
            None => return false,
        };
        if let Some(category_id) = option.category_id {
            self.job_categories.update(&category_id, |category| {
                category.remove_option(id);
            });
        }
        let order_ids: Vec<Uuid> = self
            .work_orders
            .iter()
            .filter(|order| order.job_option_id == Some(*id))
            .map(|order| order.id)
            .collect();
        for order_id in order_ids {
            self.work_orders.update(&order_id, |order| {
                order.job_option_id = None;
                order.updated_at = Utc::now();
            });
        }
        true
    }

    pub fn delete_payment_qr_code(&mut self, id: &Uuid) -> bool {
        self.payment_qr_codes.remove(id).is_some()
    }
}
