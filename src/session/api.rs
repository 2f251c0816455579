//! Entity operations on the live graph.
//!
//! Every mutation checks the session is open, edits the graph under its
//! lock, and queues a debounced save. Reads clone out of the graph so
//! callers never hold the lock.

use serde::Serialize;
use uuid::Uuid;

use super::{SessionError, StoreSession};
use crate::models::{
    Customer, Inventory, Invoice, JobCategory, JobOption, PaymentQrCode, Task, Tradesman,
    UsageRecord, WorkOrder,
};

/// Entity totals, mostly for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub customers: usize,
    pub work_orders: usize,
    pub tasks: usize,
    pub tradesmen: usize,
    pub invoices: usize,
    pub inventories: usize,
    pub usage_records: usize,
    pub job_categories: usize,
    pub job_options: usize,
    pub payment_qr_codes: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.customers
            + self.work_orders
            + self.tasks
            + self.tradesmen
            + self.invoices
            + self.inventories
            + self.usage_records
            + self.job_categories
            + self.job_options
            + self.payment_qr_codes
    }
}

impl StoreSession {
    pub fn counts(&self) -> EntityCounts {
        let graph = self.graph();
        EntityCounts {
            customers: graph.customers.len(),
            work_orders: graph.work_orders.len(),
            tasks: graph.tasks.len(),
            tradesmen: graph.tradesmen.len(),
            invoices: graph.invoices.len(),
            inventories: graph.inventories.len(),
            usage_records: graph.usage_records.len(),
            job_categories: graph.job_categories.len(),
            job_options: graph.job_options.len(),
            payment_qr_codes: graph.payment_qr_codes.len(),
        }
    }

    /// Next free work order number.
    pub fn next_work_order_number(&self) -> i64 {
        self.graph().next_work_order_number()
    }

    /// Next free invoice number.
    pub fn next_invoice_number(&self) -> i64 {
        self.graph().next_invoice_number()
    }

    // Customers

    pub fn insert_customer(&self, customer: Customer) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().customers.insert(customer);
        self.request_save();
        Ok(())
    }

    pub fn update_customer(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut Customer),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().customers.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    /// Delete a customer and every work order that belongs to them.
    pub fn delete_customer(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_customer(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_customer(&self, id: &Uuid) -> Option<Customer> {
        self.graph().customers.get(id).cloned()
    }

    pub fn list_customers(&self) -> Vec<Customer> {
        self.graph().customers.iter().cloned().collect()
    }

    // Work orders

    pub fn insert_work_order(&self, order: WorkOrder) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().work_orders.insert(order);
        self.request_save();
        Ok(())
    }

    pub fn update_work_order(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut WorkOrder),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().work_orders.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    /// Delete a work order with its tasks and invoice.
    pub fn delete_work_order(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_work_order(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_work_order(&self, id: &Uuid) -> Option<WorkOrder> {
        self.graph().work_orders.get(id).cloned()
    }

    pub fn list_work_orders(&self) -> Vec<WorkOrder> {
        self.graph().work_orders.iter().cloned().collect()
    }

    /// Put a work order on a customer's schedule, detaching it from any
    /// previous customer.
    pub fn attach_work_order(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().attach_work_order(order_id, customer_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn assign_tradesman(
        &self,
        order_id: Uuid,
        tradesman_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().assign_tradesman(order_id, tradesman_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn unassign_tradesman(
        &self,
        order_id: Uuid,
        tradesman_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().unassign_tradesman(order_id, tradesman_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    /// Pick the job option (and with it the category) for a work order.
    pub fn choose_job_option(
        &self,
        order_id: Uuid,
        option_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().choose_job_option(order_id, option_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    // Tasks

    /// Add a task to its work order. Fails quietly when the order is
    /// not in the graph.
    pub fn add_task(&self, task: Task) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().add_task(task);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn update_task(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut Task),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().tasks.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn delete_task(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_task(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_task(&self, id: &Uuid) -> Option<Task> {
        self.graph().tasks.get(id).cloned()
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.graph().tasks.iter().cloned().collect()
    }

    // Tradesmen

    pub fn insert_tradesman(&self, tradesman: Tradesman) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().tradesmen.insert(tradesman);
        self.request_save();
        Ok(())
    }

    pub fn update_tradesman(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut Tradesman),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().tradesmen.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn delete_tradesman(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_tradesman(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_tradesman(&self, id: &Uuid) -> Option<Tradesman> {
        self.graph().tradesmen.get(id).cloned()
    }

    pub fn list_tradesmen(&self) -> Vec<Tradesman> {
        self.graph().tradesmen.iter().cloned().collect()
    }

    // Invoices

    pub fn insert_invoice(&self, invoice: Invoice) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().invoices.insert(invoice);
        self.request_save();
        Ok(())
    }

    pub fn update_invoice(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut Invoice),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().invoices.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn delete_invoice(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_invoice(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_invoice(&self, id: &Uuid) -> Option<Invoice> {
        self.graph().invoices.get(id).cloned()
    }

    pub fn list_invoices(&self) -> Vec<Invoice> {
        self.graph().invoices.iter().cloned().collect()
    }

    /// Bill a work order. The invoice takes over the order's customer
    /// and each side keeps a pointer to the other.
    pub fn attach_invoice(&self, invoice_id: Uuid, order_id: Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().attach_invoice(invoice_id, order_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    // Inventories

    pub fn insert_inventory(&self, inventory: Inventory) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().inventories.insert(inventory);
        self.request_save();
        Ok(())
    }

    pub fn update_inventory(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut Inventory),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().inventories.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    /// Delete an inventory and its usage history.
    pub fn delete_inventory(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_inventory(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_inventory(&self, id: &Uuid) -> Option<Inventory> {
        self.graph().inventories.get(id).cloned()
    }

    pub fn list_inventories(&self) -> Vec<Inventory> {
        self.graph().inventories.iter().cloned().collect()
    }

    pub fn assign_inventory(
        &self,
        inventory_id: Uuid,
        tradesman_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().assign_inventory(inventory_id, tradesman_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    /// Draw stock from an inventory, recording the withdrawal. Returns
    /// the new usage record, or `None` when the inventory is unknown.
    pub fn record_usage(
        &self,
        inventory_id: Uuid,
        quantity: i64,
    ) -> Result<Option<UsageRecord>, SessionError> {
        self.ensure_open()?;
        let record = self.graph().record_usage(inventory_id, quantity);
        if record.is_some() {
            self.request_save();
        }
        Ok(record)
    }

    pub fn delete_usage_record(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_usage_record(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_usage_record(&self, id: &Uuid) -> Option<UsageRecord> {
        self.graph().usage_records.get(id).cloned()
    }

    pub fn list_usage_records(&self) -> Vec<UsageRecord> {
        self.graph().usage_records.iter().cloned().collect()
    }

    // Job catalog

    pub fn insert_job_category(&self, category: JobCategory) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().job_categories.insert(category);
        self.request_save();
        Ok(())
    }

    pub fn update_job_category(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut JobCategory),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().job_categories.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    /// Delete a category and its options.
    pub fn delete_job_category(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_job_category(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_job_category(&self, id: &Uuid) -> Option<JobCategory> {
        self.graph().job_categories.get(id).cloned()
    }

    pub fn list_job_categories(&self) -> Vec<JobCategory> {
        self.graph().job_categories.iter().cloned().collect()
    }

    pub fn insert_job_option(&self, option: JobOption) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().job_options.insert(option);
        self.request_save();
        Ok(())
    }

    pub fn update_job_option(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut JobOption),
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().job_options.update(id, apply);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn delete_job_option(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_job_option(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_job_option(&self, id: &Uuid) -> Option<JobOption> {
        self.graph().job_options.get(id).cloned()
    }

    pub fn list_job_options(&self) -> Vec<JobOption> {
        self.graph().job_options.iter().cloned().collect()
    }

    pub fn add_option_to_category(
        &self,
        option_id: Uuid,
        category_id: Uuid,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().add_option_to_category(option_id, category_id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    // Payment QR codes

    pub fn insert_payment_qr_code(&self, code: PaymentQrCode) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.graph().payment_qr_codes.insert(code);
        self.request_save();
        Ok(())
    }

    pub fn delete_payment_qr_code(&self, id: &Uuid) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let changed = self.graph().delete_payment_qr_code(id);
        if changed {
            self.request_save();
        }
        Ok(changed)
    }

    pub fn get_payment_qr_code(&self, id: &Uuid) -> Option<PaymentQrCode> {
        self.graph().payment_qr_codes.get(id).cloned()
    }

    pub fn list_payment_qr_codes(&self) -> Vec<PaymentQrCode> {
        self.graph().payment_qr_codes.iter().cloned().collect()
    }
}
