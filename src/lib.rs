//! Fieldwork Data Store
//!
//! Local-first persistence for the Fieldwork field service app: a
//! SQLite-backed object store with debounced saves, a history log,
//! background cloud sync, and the application launch sequence.

pub mod bootstrap;
pub mod cloud;
pub mod codec;
pub mod commands;
pub mod config;
pub mod db;
pub mod models;
pub mod session;
pub mod sync;

pub use bootstrap::{launch, Analytics, Launch, LogAnalytics};
pub use cloud::{
    CloudContainer, CloudError, CloudOptions, CloudRecord, DatabaseScope, HttpCloudContainer,
    InMemoryContainer, Recordable, ShareHandle, SharePermission, SyncCursor,
};
pub use codec::{CodecError, TransformerRegistry};
pub use config::{Config, ConfigError};
pub use models::{
    Badge, Customer, Inventory, Invoice, InvoiceStatus, JobCategory, JobOption, Material,
    PaymentMethod, PaymentQrCode, Photo, QrCodeKind, ServiceItem, Task, Tradesman, UsageRecord,
    WorkOrder, WorkOrderStatus,
};
pub use session::{
    EntityCounts, EntityKind, EventSink, MemorySink, SessionError, SessionEvent, ShareError,
    StoreOptions, StoreSession, TracingSink, WriteOutcome,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
