//! Cloud container transport.
//!
//! The store exchanges flat records with a remote container. The
//! transport is behind the `CloudContainer` trait so the session works
//! the same against the HTTP backend, the in-memory test backend, or no
//! backend at all.

pub mod http;
pub mod memory;
pub mod record;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use http::HttpCloudContainer;
pub use memory::InMemoryContainer;
pub use record::{record_name, CloudRecord, FieldValue, RecordFields, Recordable};

/// Which database inside the container records are read from and
/// written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseScope {
    Private,
    Shared,
}

impl Default for DatabaseScope {
    fn default() -> Self {
        DatabaseScope::Private
    }
}

impl std::fmt::Display for DatabaseScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseScope::Private => write!(f, "private"),
            DatabaseScope::Shared => write!(f, "shared"),
        }
    }
}

/// Access level granted to participants of a shared record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    ReadOnly,
    ReadWrite,
}

/// The outcome of sharing a record: a share the caller can hand to
/// participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareHandle {
    pub record_name: String,
    pub url: String,
    pub permission: SharePermission,
}

/// Opaque position in the container change feed. `None` means "from the
/// beginning".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor(pub Option<String>);

/// Identity of a record, enough to delete it or map it back to the
/// entity it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_name: String,
    pub record_type: String,
    pub entity_id: Uuid,
}

impl RecordRef {
    pub fn new(record_type: &str, entity_id: Uuid) -> Self {
        RecordRef {
            record_name: record_name(record_type, &entity_id),
            record_type: record_type.to_string(),
            entity_id,
        }
    }
}

/// One change pulled from the container feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteRecord {
    Saved(CloudRecord),
    Deleted(RecordRef),
}

#[derive(Debug)]
pub enum CloudError {
    Http(String),
    Status(u16, String),
    Decode(String),
    Unavailable(String),
}

impl std::fmt::Display for CloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudError::Http(e) => write!(f, "Cloud request error: {}", e),
            CloudError::Status(code, body) => {
                write!(f, "Cloud server returned {}: {}", code, body)
            }
            CloudError::Decode(e) => write!(f, "Cloud response decode error: {}", e),
            CloudError::Unavailable(e) => write!(f, "Cloud container unavailable: {}", e),
        }
    }
}

impl std::error::Error for CloudError {}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        CloudError::Http(err.to_string())
    }
}

/// Connection settings for the HTTP container backend.
#[derive(Debug, Clone)]
pub struct CloudOptions {
    pub server_url: String,
    pub container_id: String,
    pub scope: DatabaseScope,
    pub api_key: Option<String>,
}

/// Record transport used by the session and the sync workers.
#[async_trait]
pub trait CloudContainer: Send + Sync {
    /// Save records to the container, replacing existing versions.
    async fn push(&self, records: &[CloudRecord]) -> Result<(), CloudError>;

    /// Remove records from the container.
    async fn delete(&self, refs: &[RecordRef]) -> Result<(), CloudError>;

    /// Fetch changes made after the cursor position, returning them with
    /// the cursor for the next call.
    async fn pull_since(
        &self,
        cursor: &SyncCursor,
    ) -> Result<(Vec<RemoteRecord>, SyncCursor), CloudError>;

    /// Create a share for a record and return the handle participants
    /// use to accept it.
    async fn share(
        &self,
        record: CloudRecord,
        permission: SharePermission,
    ) -> Result<ShareHandle, CloudError>;
}
