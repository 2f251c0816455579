use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkOrderStatus::Scheduled => write!(f, "scheduled"),
            WorkOrderStatus::InProgress => write!(f, "in_progress"),
            WorkOrderStatus::Completed => write!(f, "completed"),
            WorkOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for WorkOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(WorkOrderStatus::Scheduled),
            "in_progress" => Ok(WorkOrderStatus::InProgress),
            "completed" => Ok(WorkOrderStatus::Completed),
            "cancelled" => Ok(WorkOrderStatus::Cancelled),
            _ => Err(format!(
                "Invalid work order status '{}'. Valid options: scheduled, in_progress, completed, cancelled",
                s
            )),
        }
    }
}

/// A photo captured on site, stored inline with the work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Photo {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            captured_at: Utc::now(),
        }
    }
}

/// A material consumed on a job, kept as a derived list on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub quantity: f64,
    pub unit_cost: f64,
}

impl Material {
    pub fn new(name: impl Into<String>, quantity: f64, unit_cost: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_cost,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} @ {:.2}", self.name, self.quantity, self.unit_cost)
    }
}

/// A checklist item belonging to a work order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub work_order_id: Uuid,
    pub summary: String,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(work_order_id: Uuid, summary: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            work_order_id,
            summary: summary.into(),
            is_complete: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self) {
        if !self.is_complete {
            self.is_complete = true;
            self.updated_at = Utc::now();
        }
    }
}

/// A scheduled job for a customer.
///
/// Work orders carry two derived lists (photos and materials) that are
/// persisted as opaque blobs and regenerated on every save. Relationships
/// are held as UUID references; both ends are maintained by the object
/// graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Uuid,
    pub number: i64,
    pub category: String,
    pub status: WorkOrderStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub summary: Option<String>,
    /// Display name of the technician recorded on the order
    pub technician: Option<String>,
    pub callback_requested: bool,
    pub signature: Option<Vec<u8>>,
    pub photos: Vec<Photo>,
    pub materials: Vec<Material>,
    pub customer_id: Option<Uuid>,
    /// Inverse of the invoice's work order reference, hydrated at load
    pub invoice_id: Option<Uuid>,
    pub job_option_id: Option<Uuid>,
    pub tradesman_ids: Vec<Uuid>,
    pub task_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    pub fn new(number: i64, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number,
            category: category.into(),
            status: WorkOrderStatus::Scheduled,
            scheduled_at: None,
            description: None,
            notes: None,
            summary: None,
            technician: None,
            callback_requested: false,
            signature: None,
            photos: Vec::new(),
            materials: Vec::new(),
            customer_id: None,
            invoice_id: None,
            job_option_id: None,
            tradesman_ids: Vec::new(),
            task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn with_technician(mut self, technician: impl Into<String>) -> Self {
        self.technician = Some(technician.into());
        self
    }

    pub fn set_status(&mut self, status: WorkOrderStatus) {
        if self.status != status {
            self.status = status;
            self.updated_at = Utc::now();
        }
    }

    /// Whether the order can still be edited in the field.
    pub fn is_open(&self) -> bool {
        !matches!(
            self.status,
            WorkOrderStatus::Completed | WorkOrderStatus::Cancelled
        )
    }

    /// Add a tradesman assignment by ID.
    pub fn add_tradesman(&mut self, tradesman_id: Uuid) {
        if !self.tradesman_ids.contains(&tradesman_id) {
            self.tradesman_ids.push(tradesman_id);
            self.updated_at = Utc::now();
        }
    }

    /// Remove a tradesman assignment by ID.
    pub fn remove_tradesman(&mut self, tradesman_id: &Uuid) -> bool {
        let len_before = self.tradesman_ids.len();
        self.tradesman_ids.retain(|id| id != tradesman_id);
        if self.tradesman_ids.len() != len_before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Add a task reference by ID.
    pub fn add_task(&mut self, task_id: Uuid) {
        if !self.task_ids.contains(&task_id) {
            self.task_ids.push(task_id);
            self.updated_at = Utc::now();
        }
    }

    /// Remove a task reference by ID.
    pub fn remove_task(&mut self, task_id: &Uuid) -> bool {
        let len_before = self.task_ids.len();
        self.task_ids.retain(|id| id != task_id);
        if self.task_ids.len() != len_before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    pub fn add_photo(&mut self, photo: Photo) {
        self.photos.push(photo);
        self.updated_at = Utc::now();
    }

    pub fn add_material(&mut self, material: Material) {
        self.materials.push(material);
        self.updated_at = Utc::now();
    }

    /// Remove a material by name, case-insensitively.
    pub fn remove_material(&mut self, name: &str) -> bool {
        let len_before = self.materials.len();
        self.materials
            .retain(|m| !m.name.eq_ignore_ascii_case(name));
        if self.materials.len() != len_before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Total cost of all materials on the order.
    pub fn material_cost(&self) -> f64 {
        self.materials.iter().map(Material::line_total).sum()
    }
}

impl fmt::Display for WorkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Work Order #{}", self.number)?;
        writeln!(f, "Category: {}", self.category)?;
        writeln!(f, "Status: {}", self.status)?;
        if let Some(scheduled_at) = &self.scheduled_at {
            writeln!(f, "Scheduled: {}", scheduled_at.to_rfc3339())?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "Description: {}", description)?;
        }
        if !self.materials.is_empty() {
            writeln!(f, "Materials: {} item(s)", self.materials.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_order_new() {
        let order = WorkOrder::new(1001, "Plumbing");

        assert_eq!(order.number, 1001);
        assert_eq!(order.category, "Plumbing");
        assert_eq!(order.status, WorkOrderStatus::Scheduled);
        assert!(order.is_open());
        assert!(order.tradesman_ids.is_empty());
    }

    #[test]
    fn test_work_order_status_transitions() {
        let mut order = WorkOrder::new(1001, "Plumbing");

        order.set_status(WorkOrderStatus::InProgress);
        assert_eq!(order.status, WorkOrderStatus::InProgress);
        assert!(order.is_open());

        order.set_status(WorkOrderStatus::Completed);
        assert!(!order.is_open());
    }

    #[test]
    fn test_work_order_add_remove_tradesman() {
        let mut order = WorkOrder::new(1001, "Electrical");
        let tradesman_id = Uuid::new_v4();

        order.add_tradesman(tradesman_id);
        order.add_tradesman(tradesman_id);
        assert_eq!(order.tradesman_ids.len(), 1);

        assert!(order.remove_tradesman(&tradesman_id));
        assert!(!order.remove_tradesman(&tradesman_id));
    }

    #[test]
    fn test_work_order_materials() {
        let mut order = WorkOrder::new(1001, "Plumbing");
        order.add_material(Material::new("PVC pipe", 3.0, 4.50));
        order.add_material(Material::new("Pipe cement", 1.0, 7.25));

        assert_eq!(order.materials.len(), 2);
        assert!((order.material_cost() - 20.75).abs() < f64::EPSILON);

        assert!(order.remove_material("pvc PIPE"));
        assert_eq!(order.materials.len(), 1);
    }

    #[test]
    fn test_work_order_status_parse() {
        assert_eq!(
            WorkOrderStatus::from_str("in_progress").unwrap(),
            WorkOrderStatus::InProgress
        );
        assert_eq!(
            WorkOrderStatus::from_str("COMPLETED").unwrap(),
            WorkOrderStatus::Completed
        );
        assert!(WorkOrderStatus::from_str("paused").is_err());
    }

    #[test]
    fn test_work_order_status_json() {
        let json = serde_json::to_string(&WorkOrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");

        let parsed: WorkOrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, WorkOrderStatus::InProgress);
    }

    #[test]
    fn test_task_complete() {
        let order_id = Uuid::new_v4();
        let mut task = Task::new(order_id, "Flush water heater");

        assert!(!task.is_complete);
        task.complete();
        assert!(task.is_complete);
        assert!(task.updated_at >= task.created_at);
    }

    #[test]
    fn test_work_order_json_roundtrip() {
        let mut order = WorkOrder::new(1002, "HVAC").with_description("Annual service");
        order.add_material(Material::new("Filter", 2.0, 12.0));
        order.add_photo(Photo::new(vec![1, 2, 3]));
        order.signature = Some(vec![9, 9, 9]);

        let json = serde_json::to_string(&order).unwrap();
        let parsed: WorkOrder = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, order.id);
        assert_eq!(parsed.materials, order.materials);
        assert_eq!(parsed.photos, order.photos);
        assert_eq!(parsed.signature, order.signature);
    }
}
