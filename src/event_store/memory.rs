//! In-memory fallback store.
//!
//! Used when the on-disk store cannot be initialized (unwritable working
//! directory and the like). Messages are still assigned event ids so the
//! transports behave uniformly, but nothing survives for replay: clients
//! reconnecting with `Last-Event-ID` get a fresh stream.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use super::{EventStore, StoredEvent};

pub struct InMemoryEventStore {
    max_events_per_stream: usize,
    streams: Mutex<HashMap<String, VecDeque<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new(max_events_per_stream: usize) -> Self {
        Self {
            max_events_per_stream,
            streams: Mutex::new(HashMap::new()),
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn store_event(&self, stream_id: &str, message: &str) -> Result<String> {
        let event_id = Uuid::new_v4().to_string();
        let mut streams = self.streams.lock().unwrap();
        let entries = streams.entry(stream_id.to_string()).or_default();
        entries.push_back(StoredEvent {
            event_id: event_id.clone(),
            stream_id: stream_id.to_string(),
            message: message.to_string(),
        });
        while entries.len() > self.max_events_per_stream {
            entries.pop_front();
        }
        Ok(event_id)
    }

    fn replay_events_after(
        &self,
        last_event_id: &str,
        _emit: &mut dyn FnMut(StoredEvent),
    ) -> Result<Option<String>> {
        warn!(
            "In-memory event store cannot replay (last event id {})",
            last_event_id
        );
        Ok(None)
    }

    fn stream_event_count(&self, stream_id: &str) -> Result<usize> {
        let streams = self.streams.lock().unwrap();
        Ok(streams.get(stream_id).map(VecDeque::len).unwrap_or(0))
    }

    fn cleanup_expired(&self) -> Result<usize> {
        Ok(0)
    }

    fn db_size_bytes(&self) -> Result<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_assigns_distinct_ids() {
        let store = InMemoryEventStore::new(10);
        let a = store.store_event("A", "m1").unwrap();
        let b = store.store_event("A", "m2").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.stream_event_count("A").unwrap(), 2);
    }

    #[test]
    fn test_replay_always_returns_none() {
        let store = InMemoryEventStore::new(10);
        let e1 = store.store_event("A", "m1").unwrap();
        store.store_event("A", "m2").unwrap();

        let mut emitted = Vec::new();
        let stream = store
            .replay_events_after(&e1, &mut |event| emitted.push(event))
            .unwrap();
        assert!(stream.is_none());
        assert!(emitted.is_empty());
    }

    #[test]
    fn test_per_stream_cap() {
        let store = InMemoryEventStore::new(2);
        for i in 0..5 {
            store.store_event("A", &format!("m{}", i)).unwrap();
        }
        assert_eq!(store.stream_event_count("A").unwrap(), 2);
    }
}
