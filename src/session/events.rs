//! Session event reporting.
//!
//! Store internals never log directly to the user. They emit events to
//! a caller-supplied sink, so hosts can surface save failures or decode
//! warnings however they like. `TracingSink` is the default and routes
//! everything through the `tracing` macros.

use std::sync::Mutex;

/// Something the session wants the host to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A flush wrote this many entity changes to the store.
    SaveCompleted { changes: usize },
    SaveFailed { detail: String },
    /// Remote changes were folded into the in-memory graph.
    RemoteApplied { changes: usize },
    RemoteRefreshFailed { detail: String },
    CloudPushFailed { detail: String },
    CloudPullFailed { detail: String },
    /// A stored blob failed to decode and was replaced with an empty
    /// list.
    DecodeWarning {
        entity_type: &'static str,
        attribute: &'static str,
        detail: String,
    },
    DirectorySynced { imported: usize },
    DirectorySyncFailed { detail: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Default sink: failures and warnings at warn, progress at debug.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::SaveCompleted { changes } => {
                tracing::debug!(changes, "save completed");
            }
            SessionEvent::SaveFailed { detail } => {
                tracing::warn!(detail, "save failed");
            }
            SessionEvent::RemoteApplied { changes } => {
                tracing::debug!(changes, "remote changes applied");
            }
            SessionEvent::RemoteRefreshFailed { detail } => {
                tracing::warn!(detail, "remote refresh failed");
            }
            SessionEvent::CloudPushFailed { detail } => {
                tracing::warn!(detail, "cloud push failed");
            }
            SessionEvent::CloudPullFailed { detail } => {
                tracing::warn!(detail, "cloud pull failed");
            }
            SessionEvent::DecodeWarning {
                entity_type,
                attribute,
                detail,
            } => {
                tracing::warn!(entity_type, attribute, detail, "stored blob failed to decode");
            }
            SessionEvent::DirectorySynced { imported } => {
                tracing::info!(imported, "tradesmen directory synced");
            }
            SessionEvent::DirectorySyncFailed { detail } => {
                tracing::warn!(detail, "tradesmen directory sync failed");
            }
        }
    }
}

/// Collects events in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SessionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count_decode_warnings(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::DecodeWarning { .. }))
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
