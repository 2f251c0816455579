use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An achievement earned by a tradesman, kept as a derived list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub name: String,
    pub earned_at: DateTime<Utc>,
}

impl Badge {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            earned_at: Utc::now(),
        }
    }
}

/// A field technician, with gamification counters maintained locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tradesman {
    pub id: Uuid,
    pub name: String,
    pub job_title: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub points: i64,
    pub work_order_points: i64,
    pub completed_jobs: i64,
    pub job_completion_streak: i64,
    pub badges: Vec<Badge>,
    pub work_order_ids: Vec<Uuid>,
    /// Inverse of the inventory's tradesman reference, hydrated at load
    pub inventory_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tradesman {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            job_title: None,
            phone: None,
            address: None,
            email: None,
            points: 0,
            work_order_points: 0,
            completed_jobs: 0,
            job_completion_streak: 0,
            badges: Vec::new(),
            work_order_ids: Vec::new(),
            inventory_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_job_title(mut self, job_title: impl Into<String>) -> Self {
        self.job_title = Some(job_title.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Add a work order assignment by ID.
    pub fn add_work_order(&mut self, work_order_id: Uuid) {
        if !self.work_order_ids.contains(&work_order_id) {
            self.work_order_ids.push(work_order_id);
            self.updated_at = Utc::now();
        }
    }

    /// Remove a work order assignment by ID.
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

    /// Check if a badge has been earned, case-insensitively.
    pub fn has_badge(&self, name: &str) -> bool {
        self.badges
            .iter()
            .any(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Award a badge. Duplicate names are ignored.
    pub fn award_badge(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.has_badge(&name) {
            return false;
        }
        self.badges.push(Badge::new(name));
        self.updated_at = Utc::now();
        true
    }

    /// Record a completed job, updating points and streak counters.
    pub fn record_completed_job(&mut self, points: i64) {
        self.completed_jobs += 1;
        self.job_completion_streak += 1;
        self.points += points;
        self.work_order_points += points;
        self.updated_at = Utc::now();
    }

    pub fn reset_streak(&mut self) {
        if self.job_completion_streak != 0 {
            self.job_completion_streak = 0;
            self.updated_at = Utc::now();
        }
    }
}

impl fmt::Display for Tradesman {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.job_title {
            Some(title) => write!(f, "{} ({}) - {} pts", self.name, title, self.points),
            None => write!(f, "{} - {} pts", self.name, self.points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tradesman_new() {
        let tradesman = Tradesman::new("Ray Delgado");

        assert_eq!(tradesman.name, "Ray Delgado");
        assert_eq!(tradesman.points, 0);
        assert_eq!(tradesman.completed_jobs, 0);
        assert!(tradesman.badges.is_empty());
    }

    #[test]
    fn test_tradesman_record_completed_job() {
        let mut tradesman = Tradesman::new("Ray Delgado");

        tradesman.record_completed_job(50);
        tradesman.record_completed_job(75);

        assert_eq!(tradesman.completed_jobs, 2);
        assert_eq!(tradesman.job_completion_streak, 2);
        assert_eq!(tradesman.points, 125);
        assert_eq!(tradesman.work_order_points, 125);
    }

    #[test]
    fn test_tradesman_reset_streak() {
        let mut tradesman = Tradesman::new("Ray Delgado");
        tradesman.record_completed_job(50);

        tradesman.reset_streak();
        assert_eq!(tradesman.job_completion_streak, 0);
        // Other counters are untouched
        assert_eq!(tradesman.completed_jobs, 1);
        assert_eq!(tradesman.points, 50);
    }

    #[test]
    fn test_tradesman_award_badge() {
        let mut tradesman = Tradesman::new("Ray Delgado");

        assert!(tradesman.award_badge("First Job"));
        assert!(!tradesman.award_badge("FIRST JOB"));
        assert_eq!(tradesman.badges.len(), 1);
        assert!(tradesman.has_badge("first job"));
    }

    #[test]
    fn test_tradesman_work_orders() {
        let mut tradesman = Tradesman::new("Ray Delgado");
        let order_id = Uuid::new_v4();

        tradesman.add_work_order(order_id);
        tradesman.add_work_order(order_id);
        assert_eq!(tradesman.work_order_ids.len(), 1);

        assert!(tradesman.remove_work_order(&order_id));
        assert!(!tradesman.remove_work_order(&order_id));
    }

    #[test]
    fn test_tradesman_json_roundtrip() {
        let mut tradesman = Tradesman::new("Ray Delgado").with_job_title("Plumber");
        tradesman.award_badge("First Job");
        tradesman.record_completed_job(50);

        let json = serde_json::to_string(&tradesman).unwrap();
        let parsed: Tradesman = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, tradesman.id);
        assert_eq!(parsed.badges, tradesman.badges);
        assert_eq!(parsed.points, tradesman.points);
    }
}
