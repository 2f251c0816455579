//! Cloud record representation.
//!
//! Each entity maps to a flat record of scalar fields: its id, its plain
//! attributes, and the to-one references it owns. Derived lists, blob
//! caches, and inverse relationships never become fields. Record names
//! are derived from the entity identity so the same entity always maps
//! to the same record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Customer, Inventory, Invoice, JobCategory, JobOption, PaymentQrCode, Task, Tradesman,
    UsageRecord, WorkOrder,
};

/// A scalar value a cloud record field can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Field map of a single record, ordered for stable serialization.
pub type RecordFields = BTreeMap<String, FieldValue>;

/// A record as pushed to or pulled from the cloud container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudRecord {
    pub record_name: String,
    pub record_type: String,
    pub fields: RecordFields,
}

/// Derive the stable record name for an entity.
///
/// The record name is computed as: base58check(sha256(type + ":" + id)[0:16])
pub fn record_name(record_type: &str, id: &Uuid) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(record_type.as_bytes());
    hasher.update(b":");
    hasher.update(id.to_string().as_bytes());
    let hash = hasher.finalize();
    bs58::encode(&hash[..16]).with_check().into_string()
}

/// Typed field lookups. Absent keys and type mismatches both read as None.
pub fn text(fields: &RecordFields, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(FieldValue::Text(v)) => Some(v.clone()),
        _ => None,
    }
}

pub fn integer(fields: &RecordFields, key: &str) -> Option<i64> {
    match fields.get(key) {
        Some(FieldValue::Integer(v)) => Some(*v),
        _ => None,
    }
}

pub fn double(fields: &RecordFields, key: &str) -> Option<f64> {
    match fields.get(key) {
        Some(FieldValue::Double(v)) => Some(*v),
        _ => None,
    }
}

pub fn boolean(fields: &RecordFields, key: &str) -> Option<bool> {
    match fields.get(key) {
        Some(FieldValue::Boolean(v)) => Some(*v),
        _ => None,
    }
}

pub fn timestamp(fields: &RecordFields, key: &str) -> Option<DateTime<Utc>> {
    match fields.get(key) {
        Some(FieldValue::Timestamp(v)) => Some(*v),
        _ => None,
    }
}

pub fn bytes(fields: &RecordFields, key: &str) -> Option<Vec<u8>> {
    match fields.get(key) {
        Some(FieldValue::Bytes(v)) => Some(v.clone()),
        _ => None,
    }
}

pub fn uuid_ref(fields: &RecordFields, key: &str) -> Option<Uuid> {
    text(fields, key).and_then(|v| Uuid::parse_str(&v).ok())
}

fn put_text(fields: &mut RecordFields, key: &str, value: &str) {
    fields.insert(key.to_string(), FieldValue::Text(value.to_string()));
}

fn put_opt_text(fields: &mut RecordFields, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        put_text(fields, key, value);
    }
}

fn put_integer(fields: &mut RecordFields, key: &str, value: i64) {
    fields.insert(key.to_string(), FieldValue::Integer(value));
}

fn put_double(fields: &mut RecordFields, key: &str, value: f64) {
    fields.insert(key.to_string(), FieldValue::Double(value));
}

fn put_boolean(fields: &mut RecordFields, key: &str, value: bool) {
    fields.insert(key.to_string(), FieldValue::Boolean(value));
}

fn put_timestamp(fields: &mut RecordFields, key: &str, value: DateTime<Utc>) {
    fields.insert(key.to_string(), FieldValue::Timestamp(value));
}

fn put_opt_timestamp(fields: &mut RecordFields, key: &str, value: &Option<DateTime<Utc>>) {
    if let Some(value) = value {
        put_timestamp(fields, key, *value);
    }
}

fn put_bytes(fields: &mut RecordFields, key: &str, value: &[u8]) {
    fields.insert(key.to_string(), FieldValue::Bytes(value.to_vec()));
}

fn put_opt_uuid(fields: &mut RecordFields, key: &str, value: &Option<Uuid>) {
    if let Some(value) = value {
        put_text(fields, key, &value.to_string());
    }
}

fn put_uuid(fields: &mut RecordFields, key: &str, value: Uuid) {
    put_text(fields, key, &value.to_string());
}

/// Conversion between an entity and its cloud record fields.
///
/// `record_fields` copies every present scalar; `apply_fields` writes a
/// field map back onto the entity, clearing optionals whose keys are
/// absent. Timestamps are written verbatim, never bumped.
pub trait Recordable {
    const RECORD_TYPE: &'static str;

    fn record_id(&self) -> Uuid;
    fn record_fields(&self) -> RecordFields;
    fn apply_fields(&mut self, fields: &RecordFields);
    fn from_record(id: Uuid, fields: &RecordFields) -> Self;

    fn to_cloud_record(&self) -> CloudRecord
    where
        Self: Sized,
    {
        CloudRecord {
            record_name: record_name(Self::RECORD_TYPE, &self.record_id()),
            record_type: Self::RECORD_TYPE.to_string(),
            fields: self.record_fields(),
        }
    }
}

fn apply_timestamps(
    fields: &RecordFields,
    created_at: &mut DateTime<Utc>,
    updated_at: &mut DateTime<Utc>,
) {
    if let Some(v) = timestamp(fields, "created_at") {
        *created_at = v;
    }
    if let Some(v) = timestamp(fields, "updated_at") {
        *updated_at = v;
    }
}

impl Recordable for Customer {
    const RECORD_TYPE: &'static str = "Customer";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_text(&mut fields, "name", &self.name);
        put_opt_text(&mut fields, "email", &self.email);
        put_opt_text(&mut fields, "phone", &self.phone);
        put_opt_text(&mut fields, "address", &self.address);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(name) = text(fields, "name") {
            self.name = name;
        }
        self.email = text(fields, "email");
        self.phone = text(fields, "phone");
        self.address = text(fields, "address");
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut customer = Customer::new(text(fields, "name").unwrap_or_default());
        customer.id = id;
        customer.apply_fields(fields);
        customer
    }
}

impl Recordable for WorkOrder {
    const RECORD_TYPE: &'static str = "WorkOrder";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_integer(&mut fields, "number", self.number);
        put_text(&mut fields, "category", &self.category);
        put_text(&mut fields, "status", &self.status.to_string());
        put_opt_timestamp(&mut fields, "scheduled_at", &self.scheduled_at);
        put_opt_text(&mut fields, "description", &self.description);
        put_opt_text(&mut fields, "notes", &self.notes);
        put_opt_text(&mut fields, "summary", &self.summary);
        put_opt_text(&mut fields, "technician", &self.technician);
        put_boolean(&mut fields, "callback_requested", self.callback_requested);
        if let Some(signature) = &self.signature {
            put_bytes(&mut fields, "signature", signature);
        }
        put_opt_uuid(&mut fields, "customer_id", &self.customer_id);
        put_opt_uuid(&mut fields, "job_option_id", &self.job_option_id);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(number) = integer(fields, "number") {
            self.number = number;
        }
        if let Some(category) = text(fields, "category") {
            self.category = category;
        }
        if let Some(status) = text(fields, "status").and_then(|s| s.parse().ok()) {
            self.status = status;
        }
        self.scheduled_at = timestamp(fields, "scheduled_at");
        self.description = text(fields, "description");
        self.notes = text(fields, "notes");
        self.summary = text(fields, "summary");
        self.technician = text(fields, "technician");
        if let Some(callback) = boolean(fields, "callback_requested") {
            self.callback_requested = callback;
        }
        self.signature = bytes(fields, "signature");
        self.customer_id = uuid_ref(fields, "customer_id");
        self.job_option_id = uuid_ref(fields, "job_option_id");
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut order = WorkOrder::new(
            integer(fields, "number").unwrap_or_default(),
            text(fields, "category").unwrap_or_default(),
        );
        order.id = id;
        order.apply_fields(fields);
        order
    }
}

impl Recordable for Task {
    const RECORD_TYPE: &'static str = "Task";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_uuid(&mut fields, "work_order_id", self.work_order_id);
        put_text(&mut fields, "summary", &self.summary);
        put_boolean(&mut fields, "is_complete", self.is_complete);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(work_order_id) = uuid_ref(fields, "work_order_id") {
            self.work_order_id = work_order_id;
        }
        if let Some(summary) = text(fields, "summary") {
            self.summary = summary;
        }
        if let Some(is_complete) = boolean(fields, "is_complete") {
            self.is_complete = is_complete;
        }
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut task = Task::new(
            uuid_ref(fields, "work_order_id").unwrap_or_else(Uuid::nil),
            text(fields, "summary").unwrap_or_default(),
        );
        task.id = id;
        task.apply_fields(fields);
        task
    }
}

impl Recordable for Tradesman {
    const RECORD_TYPE: &'static str = "Tradesman";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_text(&mut fields, "name", &self.name);
        put_opt_text(&mut fields, "job_title", &self.job_title);
        put_opt_text(&mut fields, "phone", &self.phone);
        put_opt_text(&mut fields, "address", &self.address);
        put_opt_text(&mut fields, "email", &self.email);
        put_integer(&mut fields, "points", self.points);
        put_integer(&mut fields, "work_order_points", self.work_order_points);
        put_integer(&mut fields, "completed_jobs", self.completed_jobs);
        put_integer(
            &mut fields,
            "job_completion_streak",
            self.job_completion_streak,
        );
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(name) = text(fields, "name") {
            self.name = name;
        }
        self.job_title = text(fields, "job_title");
        self.phone = text(fields, "phone");
        self.address = text(fields, "address");
        self.email = text(fields, "email");
        if let Some(points) = integer(fields, "points") {
            self.points = points;
        }
        if let Some(points) = integer(fields, "work_order_points") {
            self.work_order_points = points;
        }
        if let Some(jobs) = integer(fields, "completed_jobs") {
            self.completed_jobs = jobs;
        }
        if let Some(streak) = integer(fields, "job_completion_streak") {
            self.job_completion_streak = streak;
        }
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut tradesman = Tradesman::new(text(fields, "name").unwrap_or_default());
        tradesman.id = id;
        tradesman.apply_fields(fields);
        tradesman
    }
}

impl Recordable for Invoice {
    const RECORD_TYPE: &'static str = "Invoice";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_integer(&mut fields, "invoice_number", self.invoice_number);
        put_opt_timestamp(&mut fields, "issued_at", &self.issued_at);
        put_opt_timestamp(&mut fields, "due_at", &self.due_at);
        put_text(&mut fields, "status", &self.status.to_string());
        put_double(&mut fields, "subtotal", self.subtotal);
        put_double(&mut fields, "tax_rate", self.tax_rate);
        put_double(&mut fields, "total", self.total);
        if let Some(method) = &self.payment_method {
            put_text(&mut fields, "payment_method", &method.to_string());
        }
        put_boolean(&mut fields, "callback_requested", self.callback_requested);
        put_opt_uuid(&mut fields, "customer_id", &self.customer_id);
        put_opt_uuid(&mut fields, "work_order_id", &self.work_order_id);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(number) = integer(fields, "invoice_number") {
            self.invoice_number = number;
        }
        self.issued_at = timestamp(fields, "issued_at");
        self.due_at = timestamp(fields, "due_at");
        if let Some(status) = text(fields, "status").and_then(|s| s.parse().ok()) {
            self.status = status;
        }
        if let Some(subtotal) = double(fields, "subtotal") {
            self.subtotal = subtotal;
        }
        if let Some(tax_rate) = double(fields, "tax_rate") {
            self.tax_rate = tax_rate;
        }
        if let Some(total) = double(fields, "total") {
            self.total = total;
        }
        self.payment_method = text(fields, "payment_method").and_then(|s| s.parse().ok());
        if let Some(callback) = boolean(fields, "callback_requested") {
            self.callback_requested = callback;
        }
        self.customer_id = uuid_ref(fields, "customer_id");
        self.work_order_id = uuid_ref(fields, "work_order_id");
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut invoice = Invoice::new(integer(fields, "invoice_number").unwrap_or_default());
        invoice.id = id;
        invoice.apply_fields(fields);
        invoice
    }
}

impl Recordable for Inventory {
    const RECORD_TYPE: &'static str = "Inventory";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_text(&mut fields, "name", &self.name);
        put_double(&mut fields, "price", self.price);
        put_integer(&mut fields, "quantity", self.quantity);
        put_integer(&mut fields, "low_stock", self.low_stock);
        put_integer(&mut fields, "high_stock", self.high_stock);
        put_opt_timestamp(&mut fields, "stocked_at", &self.stocked_at);
        put_opt_uuid(&mut fields, "tradesman_id", &self.tradesman_id);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(name) = text(fields, "name") {
            self.name = name;
        }
        if let Some(price) = double(fields, "price") {
            self.price = price;
        }
        if let Some(quantity) = integer(fields, "quantity") {
            self.quantity = quantity;
        }
        if let Some(low_stock) = integer(fields, "low_stock") {
            self.low_stock = low_stock;
        }
        if let Some(high_stock) = integer(fields, "high_stock") {
            self.high_stock = high_stock;
        }
        self.stocked_at = timestamp(fields, "stocked_at");
        self.tradesman_id = uuid_ref(fields, "tradesman_id");
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut item = Inventory::new(
            text(fields, "name").unwrap_or_default(),
            double(fields, "price").unwrap_or_default(),
            integer(fields, "quantity").unwrap_or_default(),
        );
        item.id = id;
        item.apply_fields(fields);
        item
    }
}

impl Recordable for UsageRecord {
    const RECORD_TYPE: &'static str = "UsageRecord";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_uuid(&mut fields, "inventory_id", self.inventory_id);
        put_timestamp(&mut fields, "used_at", self.used_at);
        put_integer(&mut fields, "quantity_used", self.quantity_used);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(inventory_id) = uuid_ref(fields, "inventory_id") {
            self.inventory_id = inventory_id;
        }
        if let Some(used_at) = timestamp(fields, "used_at") {
            self.used_at = used_at;
        }
        if let Some(quantity_used) = integer(fields, "quantity_used") {
            self.quantity_used = quantity_used;
        }
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut record = UsageRecord::new(
            uuid_ref(fields, "inventory_id").unwrap_or_else(Uuid::nil),
            integer(fields, "quantity_used").unwrap_or_default(),
        );
        record.id = id;
        record.apply_fields(fields);
        record
    }
}

impl Recordable for JobCategory {
    const RECORD_TYPE: &'static str = "JobCategory";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_text(&mut fields, "name", &self.name);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(name) = text(fields, "name") {
            self.name = name;
        }
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut category = JobCategory::new(text(fields, "name").unwrap_or_default());
        category.id = id;
        category.apply_fields(fields);
        category
    }
}

impl Recordable for JobOption {
    const RECORD_TYPE: &'static str = "JobOption";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_text(&mut fields, "name", &self.name);
        put_double(&mut fields, "price", self.price);
        put_opt_text(&mut fields, "description", &self.description);
        put_opt_uuid(&mut fields, "category_id", &self.category_id);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(name) = text(fields, "name") {
            self.name = name;
        }
        if let Some(price) = double(fields, "price") {
            self.price = price;
        }
        self.description = text(fields, "description");
        self.category_id = uuid_ref(fields, "category_id");
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut option = JobOption::new(
            text(fields, "name").unwrap_or_default(),
            double(fields, "price").unwrap_or_default(),
        );
        option.id = id;
        option.apply_fields(fields);
        option
    }
}

impl Recordable for PaymentQrCode {
    const RECORD_TYPE: &'static str = "PaymentQrCode";

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn record_fields(&self) -> RecordFields {
        let mut fields = RecordFields::new();
        put_uuid(&mut fields, "id", self.id);
        put_text(&mut fields, "kind", &self.kind.to_string());
        put_bytes(&mut fields, "image", &self.image);
        put_timestamp(&mut fields, "created_at", self.created_at);
        put_timestamp(&mut fields, "updated_at", self.updated_at);
        fields
    }

    fn apply_fields(&mut self, fields: &RecordFields) {
        if let Some(kind) = text(fields, "kind").and_then(|s| s.parse().ok()) {
            self.kind = kind;
        }
        if let Some(image) = bytes(fields, "image") {
            self.image = image;
        }
        apply_timestamps(fields, &mut self.created_at, &mut self.updated_at);
    }

    fn from_record(id: Uuid, fields: &RecordFields) -> Self {
        let mut code = PaymentQrCode::new(
            text(fields, "kind")
                .and_then(|s| s.parse().ok())
                .unwrap_or(crate::models::QrCodeKind::Venmo),
            bytes(fields, "image").unwrap_or_default(),
        );
        code.id = id;
        code.apply_fields(fields);
        code
    }
}
