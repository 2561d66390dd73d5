//! Resumable event store.
//!
//! Every server→client MCP message on the Streamable-HTTP transport is
//! persisted here before emission, so a client reconnecting with
//! `Last-Event-ID` can replay everything it missed. Per-stream and whole
//! database size caps bound the on-disk footprint.

mod cleanup;
mod memory;
mod sqlite_store;

pub use cleanup::spawn_cleanup_task;
pub use memory::InMemoryEventStore;
pub use sqlite_store::SqliteEventStore;

use std::sync::Arc;

use anyhow::Result;

/// One stored server→client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub event_id: String,
    pub stream_id: String,
    pub message: String,
}

/// Size and retention limits for the store.
#[derive(Debug, Clone)]
pub struct EventStoreSettings {
    /// Newest-N cap per stream; oldest entries are evicted past it.
    pub max_events_per_stream: usize,
    /// Whole-database size cap. Exceeding it triggers global eviction down
    /// to 80% of the cap.
    pub max_db_size_mb: u64,
    /// Entries older than this are deleted by cleanup passes.
    pub max_event_age_days: i64,
    /// Sleep between background cleanup iterations.
    pub auto_cleanup_interval_hours: u64,
}

impl Default for EventStoreSettings {
    fn default() -> Self {
        Self {
            max_events_per_stream: 1000,
            max_db_size_mb: 100,
            max_event_age_days: 7,
            auto_cleanup_interval_hours: 24,
        }
    }
}

/// Persistent ordered log of per-stream MCP messages.
///
/// Implementations are synchronous; [`SharedEventStore`] moves the calls off
/// the scheduler thread.
pub trait EventStore: Send + Sync {
    /// Persist a message and return its freshly assigned event id.
    fn store_event(&self, stream_id: &str, message: &str) -> Result<String>;

    /// Emit all events stored for `last_event_id`'s stream after that event,
    /// in order. Returns the stream id, or `None` if the event id is unknown.
    fn replay_events_after(
        &self,
        last_event_id: &str,
        emit: &mut dyn FnMut(StoredEvent),
    ) -> Result<Option<String>>;

    /// Number of events currently stored for one stream.
    fn stream_event_count(&self, stream_id: &str) -> Result<usize>;

    /// Delete entries older than the retention window. Returns rows removed.
    fn cleanup_expired(&self) -> Result<usize>;

    /// Current on-disk footprint in bytes.
    fn db_size_bytes(&self) -> Result<u64>;
}

/// Cloneable async facade over an [`EventStore`].
///
/// All disk work happens on the blocking pool so transport dispatchers never
/// stall the scheduler.
#[derive(Clone)]
pub struct SharedEventStore {
    inner: Arc<dyn EventStore>,
}

impl SharedEventStore {
    pub fn new(inner: Arc<dyn EventStore>) -> Self {
        Self { inner }
    }

    /// Direct access to the synchronous store, for tests and cleanup.
    pub fn inner(&self) -> &Arc<dyn EventStore> {
        &self.inner
    }

    pub async fn store_event(&self, stream_id: String, message: String) -> Result<String> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || store.store_event(&stream_id, &message)).await?
    }

    /// Collected form of [`EventStore::replay_events_after`].
    pub async fn replay_events_after(
        &self,
        last_event_id: String,
    ) -> Result<Option<(String, Vec<StoredEvent>)>> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut events = Vec::new();
            let stream_id =
                store.replay_events_after(&last_event_id, &mut |event| events.push(event))?;
            Ok(stream_id.map(|id| (id, events)))
        })
        .await?
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || store.cleanup_expired()).await?
    }
}
