//! Application launch.
//!
//! `launch` wires a session up the same way every host does: codecs
//! registered before the store is opened, an "app opened" ping, demo
//! data on first run, then a background roster import if a directory
//! is configured.

use std::sync::Arc;

use chrono::Utc;

use crate::cloud::{CloudContainer, HttpCloudContainer};
use crate::codec::TransformerRegistry;
use crate::config::Config;
use crate::models::{
    Customer, Inventory, Invoice, JobCategory, JobOption, Material, PaymentQrCode, Photo,
    QrCodeKind, ServiceItem, Task, Tradesman, WorkOrder, WorkOrderStatus,
};
use crate::session::{EventSink, SessionError, SessionEvent, StoreSession};
use crate::sync::directory::DirectoryClient;

/// Usage reporting hook. Hosts plug in their own backend.
pub trait Analytics: Send + Sync {
    fn app_opened(&self);
}

/// Analytics that just logs.
pub struct LogAnalytics;

impl Analytics for LogAnalytics {
    fn app_opened(&self) {
        tracing::info!("app opened");
    }
}

/// A launched application: the open session plus what launch did.
pub struct Launch {
    pub session: Arc<StoreSession>,
    pub seeded: bool,
}

/// Open the store and run the launch sequence.
pub async fn launch(
    config: &Config,
    analytics: &dyn Analytics,
    events: Arc<dyn EventSink>,
) -> Result<Launch, SessionError> {
    // The registry must be complete before the store loads any blob
    // columns, so it is built first.
    let codecs = TransformerRegistry::standard();

    analytics.app_opened();

    let container = config
        .cloud_options()
        .map(|options| Arc::new(HttpCloudContainer::new(&options)) as Arc<dyn CloudContainer>);

    let session =
        StoreSession::open(config.store_options(), codecs, container, events.clone()).await?;

    let seeded = session.is_empty();
    if seeded {
        seed_demo_data(&session).await?;
    }

    if let Some(url) = &config.directory_url {
        spawn_directory_sync(&session, url, config.directory_api_key.clone(), events);
    }

    Ok(Launch { session, seeded })
}

fn spawn_directory_sync(
    session: &Arc<StoreSession>,
    url: &str,
    api_key: Option<String>,
    events: Arc<dyn EventSink>,
) {
    let client = DirectoryClient::new(url, api_key);
    let weak = Arc::downgrade(session);
    tokio::spawn(async move {
        let session = match weak.upgrade() {
            Some(session) => session,
            None => return,
        };
        match client.sync_into(&session).await {
            Ok(imported) => events.emit(SessionEvent::DirectorySynced { imported }),
            Err(e) => events.emit(SessionEvent::DirectorySyncFailed {
                detail: e.to_string(),
            }),
        }
    });
}

/// Populate a fresh store with a browsable demo dataset and write it.
pub async fn seed_demo_data(session: &StoreSession) -> Result<(), SessionError> {
    // Customers
    let dana = Customer::new("Dana Whitfield")
        .with_email("dana@example.com")
        .with_phone("555-0142")
        .with_address("18 Candlewood Ln");
    let marcus = Customer::new("Marcus Boone")
        .with_phone("555-0168")
        .with_address("427 Fenmore Ave");
    let priya = Customer::new("Priya Raman").with_email("priya@example.com");
    let dana_id = dana.id;
    let marcus_id = marcus.id;
    session.insert_customer(dana)?;
    session.insert_customer(marcus)?;
    session.insert_customer(priya)?;

    // Tradesmen
    let lee = Tradesman::new("Lee Ortega")
        .with_job_title("Electrician")
        .with_phone("555-0117");
    let mut sam = Tradesman::new("Sam Kowalski")
        .with_job_title("Plumber")
        .with_email("sam@fieldwork.example");
    sam.record_completed_job(75);
    sam.award_badge("First Job");
    let lee_id = lee.id;
    let sam_id = sam.id;
    session.insert_tradesman(lee)?;
    session.insert_tradesman(sam)?;

    // Job catalog
    let plumbing = JobCategory::new("Plumbing");
    let electrical = JobCategory::new("Electrical");
    let plumbing_id = plumbing.id;
    let electrical_id = electrical.id;
    session.insert_job_category(plumbing)?;
    session.insert_job_category(electrical)?;

    let drain = JobOption::new("Drain cleaning", 149.0)
        .with_description("Clear one blocked drain line");
    let heater = JobOption::new("Water heater install", 1200.0);
    let panel = JobOption::new("Panel upgrade", 1800.0)
        .with_description("Replace panel, up to 200A service");
    let drain_id = drain.id;
    let panel_id = panel.id;
    let heater_id = heater.id;
    session.insert_job_option(drain)?;
    session.insert_job_option(heater)?;
    session.insert_job_option(panel)?;
    session.add_option_to_category(drain_id, plumbing_id)?;
    session.add_option_to_category(heater_id, plumbing_id)?;
    session.add_option_to_category(panel_id, electrical_id)?;

    // An upcoming work order
    let scheduled = WorkOrder::new(session.next_work_order_number(), "Plumbing")
        .with_description("Kitchen sink drains slowly, gurgles on the second floor")
        .with_scheduled_at(Utc::now() + chrono::Duration::days(3));
    let scheduled_id = scheduled.id;
    session.insert_work_order(scheduled)?;
    session.attach_work_order(scheduled_id, dana_id)?;
    session.choose_job_option(scheduled_id, drain_id)?;
    session.assign_tradesman(scheduled_id, sam_id)?;
    session.add_task(Task::new(scheduled_id, "Snake the kitchen line"))?;
    session.add_task(Task::new(scheduled_id, "Camera-inspect the main stack"))?;

    // A finished one, billed and photographed
    let mut finished = WorkOrder::new(session.next_work_order_number(), "Electrical")
        .with_description("No power in garage subpanel")
        .with_technician("Lee Ortega");
    finished.set_status(WorkOrderStatus::Completed);
    finished.summary = Some("Replaced failed breaker, tightened neutral bus".to_string());
    finished.add_material(Material::new("20A breaker", 1.0, 14.5));
    finished.add_material(Material::new("12 AWG wire (ft)", 25.0, 0.42));
    finished.add_photo(Photo::new(vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]));
    let finished_id = finished.id;
    session.insert_work_order(finished)?;
    session.attach_work_order(finished_id, marcus_id)?;
    session.choose_job_option(finished_id, panel_id)?;
    session.assign_tradesman(finished_id, lee_id)?;

    let mut invoice = Invoice::new(session.next_invoice_number()).with_tax_rate(0.08);
    invoice.add_service_item(ServiceItem::new("Panel upgrade", 1800.0, 1));
    invoice.add_service_item(ServiceItem::new("Materials", 25.0, 1));
    invoice.recalculate_totals();
    invoice.mark_sent();
    let invoice_id = invoice.id;
    session.insert_invoice(invoice)?;
    session.attach_invoice(invoice_id, finished_id)?;

    // Truck stock
    let pipe = Inventory::new("Copper pipe 1/2\" (ft)", 4.5, 40).with_stock_levels(10, 60);
    let cement = Inventory::new("PVC cement", 9.0, 12).with_stock_levels(4, 16);
    let pipe_id = pipe.id;
    let cement_id = cement.id;
    session.insert_inventory(pipe)?;
    session.insert_inventory(cement)?;
    session.assign_inventory(pipe_id, sam_id)?;
    session.assign_inventory(cement_id, lee_id)?;
    session.record_usage(pipe_id, 6)?;

    // Payment QR codes. Placeholder images.
    session.insert_payment_qr_code(PaymentQrCode::new(
        QrCodeKind::Venmo,
        vec![0x89, 0x50, 0x4E, 0x47, 0x01],
    ))?;
    session.insert_payment_qr_code(PaymentQrCode::new(
        QrCodeKind::Paypal,
        vec![0x89, 0x50, 0x4E, 0x47, 0x02],
    ))?;

    session.save_now().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloudConfig, ConfigSource, ConfigValue};
    use crate::session::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingAnalytics {
        opens: AtomicUsize,
    }

    impl CountingAnalytics {
        fn new() -> Self {
            CountingAnalytics {
                opens: AtomicUsize::new(0),
            }
        }
    }

    impl Analytics for CountingAnalytics {
        fn app_opened(&self) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        Config {
            database_path: ConfigValue::new(dir.path().join("test.db"), ConfigSource::Default),
            save_debounce_secs: ConfigValue::new(60, ConfigSource::Default),
            save_interval_secs: ConfigValue::new(60, ConfigSource::Default),
            directory_url: None,
            directory_api_key: None,
            config_file: None,
            cloud: CloudConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_launch_seeds_empty_store() {
        let dir = TempDir::new().unwrap();
        let analytics = CountingAnalytics::new();

        let launch = launch(&test_config(&dir), &analytics, Arc::new(MemorySink::new()))
            .await
            .unwrap();
        assert!(launch.seeded);
        assert_eq!(analytics.opens.load(Ordering::SeqCst), 1);

        let counts = launch.session.counts();
        assert_eq!(counts.customers, 3);
        assert_eq!(counts.work_orders, 2);
        assert_eq!(counts.tasks, 2);
        assert_eq!(counts.tradesmen, 2);
        assert_eq!(counts.invoices, 1);
        assert_eq!(counts.inventories, 2);
        assert_eq!(counts.usage_records, 1);
        assert_eq!(counts.job_categories, 2);
        assert_eq!(counts.job_options, 3);
        assert_eq!(counts.payment_qr_codes, 2);
        launch.session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_skips_seed_when_data_exists() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let first = launch(&config, &LogAnalytics, Arc::new(MemorySink::new()))
            .await
            .unwrap();
        let first_total = first.session.counts().total();
        first.session.close().await.unwrap();

        let second = launch(&config, &LogAnalytics, Arc::new(MemorySink::new()))
            .await
            .unwrap();
        assert!(!second.seeded);
        assert_eq!(second.session.counts().total(), first_total);
        second.session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_seeded_graph_is_connected() {
        let dir = TempDir::new().unwrap();
        let launch = launch(
            &test_config(&dir),
            &LogAnalytics,
            Arc::new(MemorySink::new()),
        )
        .await
        .unwrap();
        let session = &launch.session;

        let invoice = session.list_invoices().pop().unwrap();
        let order_id = invoice.work_order_id.unwrap();
        let order = session.get_work_order(&order_id).unwrap();
        assert_eq!(order.invoice_id, Some(invoice.id));
        assert_eq!(order.status, WorkOrderStatus::Completed);
        assert!(invoice.total > invoice.subtotal);
        assert!(invoice.customer_id.is_some());

        let with_usage = session
            .list_inventories()
            .into_iter()
            .find(|i| !i.usage_record_ids.is_empty())
            .unwrap();
        assert_eq!(with_usage.quantity, 34);

        for order in session.list_work_orders() {
            assert!(order.customer_id.is_some());
            assert!(order.job_option_id.is_some());
            assert_eq!(order.tradesman_ids.len(), 1);
        }
        session.close().await.unwrap();
    }
}
