//! Tradesmen directory import.
//!
//! The company directory is the source of truth for who is on staff.
//! A one-shot sync at launch pulls the roster and merges it into the
//! store: contact details follow the directory, everything earned
//! locally (points, badges, assignments) stays put.

use serde::Deserialize;
use uuid::Uuid;

use crate::models::Tradesman;
use crate::session::{SessionError, StoreSession};

/// One roster entry as the directory serves it.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug)]
pub enum DirectoryError {
    Http(String),
    Status(u16, String),
    Session(SessionError),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Http(detail) => write!(f, "Directory request failed: {}", detail),
            DirectoryError::Status(status, body) => {
                write!(f, "Directory returned status {}: {}", status, body)
            }
            DirectoryError::Session(e) => write!(f, "Directory import failed: {}", e),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        DirectoryError::Http(err.to_string())
    }
}

impl From<SessionError> for DirectoryError {
    fn from(err: SessionError) -> Self {
        DirectoryError::Session(err)
    }
}

/// Client for the company tradesmen directory.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        DirectoryClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn roster_url(&self) -> String {
        format!("{}/tradesmen", self.base_url.trim_end_matches('/'))
    }

    /// Fetch the full roster.
    pub async fn fetch_entries(&self) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut request = self.client.get(self.roster_url());
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status(status.as_u16(), body));
        }

        let entries = response.json().await?;
        Ok(entries)
    }

    /// Fetch the roster and merge it into the session. Returns how many
    /// entries were applied.
    pub async fn sync_into(&self, session: &StoreSession) -> Result<usize, DirectoryError> {
        let entries = self.fetch_entries().await?;
        let applied = apply_entries(session, entries)?;
        Ok(applied)
    }
}

/// Merge roster entries into the graph. Known tradesmen keep their
/// local counters and relationships; only contact details move.
pub fn apply_entries(
    session: &StoreSession,
    entries: Vec<DirectoryEntry>,
) -> Result<usize, SessionError> {
    let mut applied = 0;
    for entry in entries {
        let known = session.update_tradesman(&entry.id, |tradesman| {
            tradesman.name = entry.name.clone();
            tradesman.job_title = entry.job_title.clone();
            tradesman.phone = entry.phone.clone();
            tradesman.email = entry.email.clone();
            tradesman.address = entry.address.clone();
            tradesman.updated_at = chrono::Utc::now();
        })?;

        if !known {
            let mut tradesman = Tradesman::new(entry.name);
            tradesman.id = entry.id;
            tradesman.job_title = entry.job_title;
            tradesman.phone = entry.phone;
            tradesman.email = entry.email;
            tradesman.address = entry.address;
            session.insert_tradesman(tradesman)?;
        }
        applied += 1;
    }
    Ok(applied)
}
