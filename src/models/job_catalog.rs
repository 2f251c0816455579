use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A category of work offered, such as plumbing or electrical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCategory {
    pub id: Uuid,
    pub name: String,
    /// References to options by UUID
    pub option_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobCategory {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            option_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add an option to this category by ID.
    pub fn add_option(&mut self, option_id: Uuid) {
        if !self.option_ids.contains(&option_id) {
            self.option_ids.push(option_id);
            self.updated_at = Utc::now();
        }
    }

    /// Remove an option from this category by ID.
    pub fn remove_option(&mut self, option_id: &Uuid) -> bool {
        let len_before = self.option_ids.len();
        self.option_ids.retain(|id| id != option_id);
        if self.option_ids.len() != len_before {
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }
}

/// A priced service offering within a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOption {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobOption {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            description: None,
            category_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_category_options() {
        let mut category = JobCategory::new("Plumbing");
        let option = JobOption::new("Drain cleaning", 149.0);

        category.add_option(option.id);
        category.add_option(option.id);
        assert_eq!(category.option_ids.len(), 1);

        assert!(category.remove_option(&option.id));
        assert!(!category.remove_option(&option.id));
    }

    #[test]
    fn test_job_option_builder() {
        let option =
            JobOption::new("Water heater install", 899.0).with_description("40 gallon tank");

        assert_eq!(option.name, "Water heater install");
        assert_eq!(option.description.as_deref(), Some("40 gallon tank"));
        assert!(option.category_id.is_none());
    }

    #[test]
    fn test_job_catalog_json_roundtrip() {
        let mut category = JobCategory::new("Electrical");
        category.add_option(Uuid::new_v4());

        let json = serde_json::to_string(&category).unwrap();
        let parsed: JobCategory = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, category.id);
        assert_eq!(parsed.option_ids, category.option_ids);
    }
}
