use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A customer that work orders are performed for.
///
/// Customers reference their work orders by ID (live lookup) rather than
/// embedding them. The inverse side of the relationship is maintained by
/// the object graph so both ends stay consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// References to work orders by UUID (resolved at display time)
    pub work_order_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
            phone: None,
            address: None,
            work_order_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Add a work order to this customer by ID.
    pub fn add_work_order(&mut self, work_order_id: Uuid) {
        if !self.work_order_ids.contains(&work_order_id) {
            self.work_order_ids.push(work_order_id);
            self.updated_at = Utc::now();
        }
    }

    /// Remove a work order from this customer by ID.
    pub fn remove_work_order(&mut self, work_order_id: &Uuid) -> bool {
        let len_before = self.work_order_ids.len();
        self.work_order_ids.retain(|id| id != work_order_id);
        if self.work_order_ids.len() != len_before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.name, email),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_new() {
        let customer = Customer::new("Dana Whitfield");

        assert_eq!(customer.name, "Dana Whitfield");
        assert!(customer.email.is_none());
        assert!(customer.work_order_ids.is_empty());
        assert_eq!(customer.created_at, customer.updated_at);
    }

    #[test]
    fn test_customer_builders() {
        let customer = Customer::new("Dana Whitfield")
            .with_email("dana@example.com")
            .with_phone("555-0142")
            .with_address("18 Candlewood Ln");

        assert_eq!(customer.email.as_deref(), Some("dana@example.com"));
        assert_eq!(customer.phone.as_deref(), Some("555-0142"));
        assert_eq!(customer.address.as_deref(), Some("18 Candlewood Ln"));
    }

    #[test]
    fn test_customer_add_work_order() {
        let mut customer = Customer::new("Dana Whitfield");
        let order_id = Uuid::new_v4();

        customer.add_work_order(order_id);
        assert_eq!(customer.work_order_ids.len(), 1);

        // Adding the same order again should not duplicate
        customer.add_work_order(order_id);
        assert_eq!(customer.work_order_ids.len(), 1);
    }

    #[test]
    fn test_customer_remove_work_order() {
        let mut customer = Customer::new("Dana Whitfield");
        let order_id = Uuid::new_v4();
        customer.add_work_order(order_id);

        assert!(customer.remove_work_order(&order_id));
        assert!(customer.work_order_ids.is_empty());

        // Removing again should return false
        assert!(!customer.remove_work_order(&order_id));
    }

    #[test]
    fn test_customer_display() {
        let customer = Customer::new("Dana Whitfield").with_email("dana@example.com");
        assert_eq!(format!("{}", customer), "Dana Whitfield <dana@example.com>");

        let plain = Customer::new("Lee Ortega");
        assert_eq!(format!("{}", plain), "Lee Ortega");
    }

    #[test]
    fn test_customer_json_roundtrip() {
        let customer = Customer::new("Dana Whitfield").with_phone("555-0142");

        let json = serde_json::to_string(&customer).unwrap();
        let parsed: Customer = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, customer.id);
        assert_eq!(parsed.name, customer.name);
        assert_eq!(parsed.phone, customer.phone);
    }
}
