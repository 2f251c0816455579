mod customer;
mod inventory;
mod invoice;
mod job_catalog;
mod payment_qr;
mod tradesman;
mod work_order;

pub use customer::Customer;
pub use inventory::{Inventory, UsageRecord};
pub use invoice::{Invoice, InvoiceStatus, PaymentMethod, ServiceItem};
pub use job_catalog::{JobCategory, JobOption};
pub use payment_qr::{PaymentQrCode, QrCodeKind};
pub use tradesman::{Badge, Tradesman};
pub use work_order::{Material, Photo, Task, WorkOrder, WorkOrderStatus};
