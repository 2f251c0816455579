//! In-memory container backend for tests and offline runs.

use tokio::sync::Mutex;

use super::{
    CloudContainer, CloudError, CloudRecord, RecordRef, RemoteRecord, ShareHandle,
    SharePermission, SyncCursor,
};
use async_trait::async_trait;

/// Append-only change journal standing in for a real container. The
/// cursor is the sequence number of the last change handed out.
#[derive(Default)]
pub struct InMemoryContainer {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_seq: i64,
    journal: Vec<(i64, RemoteRecord)>,
    shares: Vec<ShareHandle>,
    failing: bool,
}

impl InMemoryContainer {
    pub fn new() -> Self {
        InMemoryContainer::default()
    }

    /// Make every container call fail until cleared.
    pub async fn set_failing(&self, failing: bool) {
        self.state.lock().await.failing = failing;
    }

    /// Number of changes recorded in the journal.
    pub async fn journal_len(&self) -> usize {
        self.state.lock().await.journal.len()
    }

    /// Shares created so far.
    pub async fn shares(&self) -> Vec<ShareHandle> {
        self.state.lock().await.shares.clone()
    }

    /// Latest saved version of a record, if it has not been deleted.
    pub async fn latest(&self, record_name: &str) -> Option<CloudRecord> {
        let state = self.state.lock().await;
        let mut latest = None;
        for (_, change) in &state.journal {
            match change {
                RemoteRecord::Saved(record) if record.record_name == record_name => {
                    latest = Some(record.clone());
                }
                RemoteRecord::Deleted(record_ref) if record_ref.record_name == record_name => {
                    latest = None;
                }
                _ => {}
            }
        }
        latest
    }
}

impl State {
    fn append(&mut self, change: RemoteRecord) {
        self.next_seq += 1;
        self.journal.push((self.next_seq, change));
    }

    fn ensure_available(&self) -> Result<(), CloudError> {
        if self.failing {
            return Err(CloudError::Unavailable("container marked failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudContainer for InMemoryContainer {
    async fn push(&self, records: &[CloudRecord]) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        for record in records {
            state.append(RemoteRecord::Saved(record.clone()));
        }
        Ok(())
    }

    async fn delete(&self, refs: &[RecordRef]) -> Result<(), CloudError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        for record_ref in refs {
            state.append(RemoteRecord::Deleted(record_ref.clone()));
        }
        Ok(())
    }

    async fn pull_since(
        &self,
        cursor: &SyncCursor,
    ) -> Result<(Vec<RemoteRecord>, SyncCursor), CloudError> {
        let state = self.state.lock().await;
        state.ensure_available()?;

        let after = cursor
            .0
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        let mut changes = Vec::new();
        let mut last_seq = after;
        for (seq, change) in &state.journal {
            if *seq > after {
                changes.push(change.clone());
                last_seq = *seq;
            }
        }

        let next = if last_seq > 0 {
            SyncCursor(Some(last_seq.to_string()))
        } else {
            cursor.clone()
        };
        Ok((changes, next))
    }

    async fn share(
        &self,
        record: CloudRecord,
        permission: SharePermission,
    ) -> Result<ShareHandle, CloudError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;

        let handle = ShareHandle {
            url: format!("https://share.example/{}", record.record_name),
            record_name: record.record_name,
            permission,
        };
        state.shares.push(handle.clone());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::Recordable;
    use crate::models::Customer;

    #[tokio::test]
    async fn test_pull_since_returns_only_new_changes() {
        let container = InMemoryContainer::new();
        let first = Customer::new("Dana Whitfield").to_cloud_record();
        let second = Customer::new("Lee Ortega").to_cloud_record();

        container.push(&[first.clone()]).await.unwrap();
        let (changes, cursor) = container.pull_since(&SyncCursor::default()).await.unwrap();
        assert_eq!(changes.len(), 1);

        container.push(&[second.clone()]).await.unwrap();
        let (changes, _) = container.pull_since(&cursor).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0], RemoteRecord::Saved(second));
    }

    #[tokio::test]
    async fn test_cursor_unchanged_when_no_new_changes() {
        let container = InMemoryContainer::new();
        let record = Customer::new("Dana Whitfield").to_cloud_record();
        container.push(&[record]).await.unwrap();

        let (_, cursor) = container.pull_since(&SyncCursor::default()).await.unwrap();
        let (changes, next) = container.pull_since(&cursor).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(next, cursor);
    }

    #[tokio::test]
    async fn test_delete_tombstones_saved_record() {
        let container = InMemoryContainer::new();
        let customer = Customer::new("Dana Whitfield");
        let record = customer.to_cloud_record();
        let name = record.record_name.clone();

        container.push(&[record]).await.unwrap();
        assert!(container.latest(&name).await.is_some());

        container
            .delete(&[crate::cloud::RecordRef::new(
                Customer::RECORD_TYPE,
                customer.id,
            )])
            .await
            .unwrap();
        assert!(container.latest(&name).await.is_none());
    }

    #[tokio::test]
    async fn test_failing_container_rejects_calls() {
        let container = InMemoryContainer::new();
        container.set_failing(true).await;

        let record = Customer::new("Dana Whitfield").to_cloud_record();
        let result = container.push(&[record]).await;
        assert!(matches!(result, Err(CloudError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_share_returns_handle_with_url() {
        let container = InMemoryContainer::new();
        let record = Customer::new("Dana Whitfield").to_cloud_record();
        let name = record.record_name.clone();

        let handle = container
            .share(record, SharePermission::ReadOnly)
            .await
            .unwrap();
        assert_eq!(handle.record_name, name);
        assert!(handle.url.contains(&name));
        assert_eq!(container.shares().await.len(), 1);
    }
}
