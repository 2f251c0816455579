use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single deduction from an inventory item's stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub used_at: DateTime<Utc>,
    pub quantity_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(inventory_id: Uuid, quantity_used: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            inventory_id,
            used_at: now,
            quantity_used,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A stocked item carried on a tradesman's truck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    pub low_stock: i64,
    pub high_stock: i64,
    pub stocked_at: Option<DateTime<Utc>>,
    pub tradesman_id: Option<Uuid>,
    /// References to usage records by UUID
    pub usage_record_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    pub fn new(name: impl Into<String>, price: f64, quantity: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            quantity,
            low_stock: 0,
            high_stock: 0,
            stocked_at: None,
            tradesman_id: None,
            usage_record_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_stock_levels(mut self, low_stock: i64, high_stock: i64) -> Self {
        self.low_stock = low_stock;
        self.high_stock = high_stock;
        self
    }

    /// Record usage against this item, clamping the quantity at zero.
    ///
    /// Returns the usage record; the caller is responsible for inserting
    /// it into the graph or store.
    pub fn record_usage(&mut self, quantity_used: i64) -> UsageRecord {
        let record = UsageRecord::new(self.id, quantity_used);
        self.quantity = (self.quantity - quantity_used).max(0);
        self.usage_record_ids.push(record.id);
        self.updated_at = Utc::now();
        record
    }

    /// Restock up to the high water mark.
    pub fn restock(&mut self) {
        self.quantity = self.quantity.max(self.high_stock);
        self.stocked_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.low_stock
    }

    /// Remove a usage record reference by ID.
    pub fn remove_usage_record(&mut self, record_id: &Uuid) -> bool {
        let len_before = self.usage_record_ids.len();
        self.usage_record_ids.retain(|id| id != record_id);
        if self.usage_record_ids.len() != len_before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} on hand @ {:.2}", self.name, self.quantity, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_new() {
        let item = Inventory::new("Copper fitting 1/2in", 2.35, 40);

        assert_eq!(item.name, "Copper fitting 1/2in");
        assert_eq!(item.quantity, 40);
        assert!(item.usage_record_ids.is_empty());
    }

    #[test]
    fn test_inventory_record_usage() {
        let mut item = Inventory::new("Copper fitting 1/2in", 2.35, 10).with_stock_levels(5, 40);

        let record = item.record_usage(3);
        assert_eq!(record.inventory_id, item.id);
        assert_eq!(record.quantity_used, 3);
        assert_eq!(item.quantity, 7);
        assert_eq!(item.usage_record_ids, vec![record.id]);
        assert!(!item.is_low_stock());

        item.record_usage(4);
        assert!(item.is_low_stock());
    }

    #[test]
    fn test_inventory_usage_clamps_at_zero() {
        let mut item = Inventory::new("Wire nuts", 0.15, 2);
        item.record_usage(5);
        assert_eq!(item.quantity, 0);
    }

    #[test]
    fn test_inventory_restock() {
        let mut item = Inventory::new("Wire nuts", 0.15, 3).with_stock_levels(5, 50);
        item.restock();

        assert_eq!(item.quantity, 50);
        assert!(item.stocked_at.is_some());
        assert!(!item.is_low_stock());
    }

    #[test]
    fn test_inventory_remove_usage_record() {
        let mut item = Inventory::new("Wire nuts", 0.15, 10);
        let record = item.record_usage(1);

        assert!(item.remove_usage_record(&record.id));
        assert!(!item.remove_usage_record(&record.id));
    }

    #[test]
    fn test_inventory_json_roundtrip() {
        let mut item = Inventory::new("Copper fitting 1/2in", 2.35, 40).with_stock_levels(10, 80);
        item.record_usage(2);

        let json = serde_json::to_string(&item).unwrap();
        let parsed: Inventory = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, item.id);
        assert_eq!(parsed.quantity, item.quantity);
        assert_eq!(parsed.usage_record_ids, item.usage_record_ids);
    }
}
