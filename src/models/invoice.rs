use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Draft => write!(f, "draft"),
            InvoiceStatus::Sent => write!(f, "sent"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Overdue => write!(f, "overdue"),
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            _ => Err(format!(
                "Invalid invoice status '{}'. Valid options: draft, sent, paid, overdue",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    Card,
    QrCode,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Check => write!(f, "check"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::QrCode => write!(f, "qr_code"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "check" => Ok(PaymentMethod::Check),
            "card" => Ok(PaymentMethod::Card),
            "qr_code" => Ok(PaymentMethod::QrCode),
            _ => Err(format!(
                "Invalid payment method '{}'. Valid options: cash, check, card, qr_code",
                s
            )),
        }
    }
}

/// A billable line item, kept as a derived list on the invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

impl ServiceItem {
    pub fn new(name: impl Into<String>, price: f64, quantity: i64) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

impl fmt::Display for ServiceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} @ {:.2}", self.name, self.quantity, self.price)
    }
}

/// An invoice bound one-to-one to a work order.
///
/// Totals are derived from the service items and tax rate; callers mutate
/// the item list through the add/remove helpers so the totals stay
/// consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: i64,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: InvoiceStatus,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub total: f64,
    pub payment_method: Option<PaymentMethod>,
    pub callback_requested: bool,
    pub service_items: Vec<ServiceItem>,
    pub customer_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(invoice_number: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_number,
            issued_at: None,
            due_at: None,
            status: InvoiceStatus::Draft,
            subtotal: 0.0,
            tax_rate: 0.0,
            total: 0.0,
            payment_method: None,
            callback_requested: false,
            service_items: Vec::new(),
            customer_id: None,
            work_order_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tax_rate(mut self, tax_rate: f64) -> Self {
        self.tax_rate = tax_rate;
        self.recalculate_totals();
        self
    }

    pub fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Recompute subtotal and total from the service items and tax rate.
    pub fn recalculate_totals(&mut self) {
        self.subtotal = self.service_items.iter().map(ServiceItem::line_total).sum();
        self.total = self.subtotal * (1.0 + self.tax_rate);
    }

    pub fn add_service_item(&mut self, item: ServiceItem) {
        self.service_items.push(item);
        self.recalculate_totals();
        self.updated_at = Utc::now();
    }

    /// Remove a service item by name, case-insensitively.
    pub fn remove_service_item(&mut self, name: &str) -> bool {
        let len_before = self.service_items.len();
        self.service_items
            .retain(|item| !item.name.eq_ignore_ascii_case(name));
        if self.service_items.len() != len_before {
            self.recalculate_totals();
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    pub fn mark_sent(&mut self) {
        self.status = InvoiceStatus::Sent;
        self.issued_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn mark_paid(&mut self, method: PaymentMethod) {
        self.status = InvoiceStatus::Paid;
        self.payment_method = Some(method);
        self.updated_at = Utc::now();
    }

    /// Whether the invoice is unpaid and past its due date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.due_at) {
            (InvoiceStatus::Paid, _) => false,
            (_, Some(due_at)) => now > due_at,
            (_, None) => false,
        }
    }
}

impl fmt::Display for Invoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Invoice #{}", self.invoice_number)?;
        writeln!(f, "Status: {}", self.status)?;
        for item in &self.service_items {
            writeln!(f, "  {}", item)?;
        }
        writeln!(f, "Subtotal: {:.2}", self.subtotal)?;
        write!(f, "Total: {:.2}", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_invoice_new() {
        let invoice = Invoice::new(5001);

        assert_eq!(invoice.invoice_number, 5001);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.total, 0.0);
    }

    #[test]
    fn test_invoice_totals() {
        let mut invoice = Invoice::new(5001).with_tax_rate(0.08);
        invoice.add_service_item(ServiceItem::new("Drain cleaning", 149.0, 1));
        invoice.add_service_item(ServiceItem::new("Service call", 50.0, 2));

        assert!((invoice.subtotal - 249.0).abs() < 1e-9);
        assert!((invoice.total - 249.0 * 1.08).abs() < 1e-9);
    }

    #[test]
    fn test_invoice_remove_service_item() {
        let mut invoice = Invoice::new(5001);
        invoice.add_service_item(ServiceItem::new("Drain cleaning", 149.0, 1));
        invoice.add_service_item(ServiceItem::new("Service call", 50.0, 1));

        assert!(invoice.remove_service_item("DRAIN CLEANING"));
        assert_eq!(invoice.service_items.len(), 1);
        assert!((invoice.subtotal - 50.0).abs() < 1e-9);

        assert!(!invoice.remove_service_item("missing"));
    }

    #[test]
    fn test_invoice_mark_paid() {
        let mut invoice = Invoice::new(5001);
        invoice.mark_sent();
        assert!(invoice.issued_at.is_some());

        invoice.mark_paid(PaymentMethod::QrCode);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.payment_method, Some(PaymentMethod::QrCode));
    }

    #[test]
    fn test_invoice_is_overdue() {
        let now = Utc::now();
        let mut invoice = Invoice::new(5001).with_due_at(now - Duration::days(1));
        assert!(invoice.is_overdue(now));

        invoice.mark_paid(PaymentMethod::Cash);
        assert!(!invoice.is_overdue(now));

        let undated = Invoice::new(5002);
        assert!(!undated.is_overdue(now));
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(
            PaymentMethod::from_str("qr_code").unwrap(),
            PaymentMethod::QrCode
        );
        assert!(PaymentMethod::from_str("crypto").is_err());
    }

    #[test]
    fn test_invoice_json_roundtrip() {
        let mut invoice = Invoice::new(5001).with_tax_rate(0.05);
        invoice.add_service_item(ServiceItem::new("Panel upgrade", 1200.0, 1));

        let json = serde_json::to_string(&invoice).unwrap();
        let parsed: Invoice = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, invoice.id);
        assert_eq!(parsed.service_items, invoice.service_items);
        assert_eq!(parsed.status, invoice.status);
    }
}
