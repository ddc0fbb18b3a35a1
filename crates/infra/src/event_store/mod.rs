//! Append-only event store boundary.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

use std::sync::Mutex;

use moneyflow_core::{AggregateId, ExpectedVersion};
use moneyflow_events::{EventBus, EventEnvelope};
use serde_json::Value as JsonValue;

/// Adapter that publishes committed events to an `EventBus` after a successful append.
///
/// Publish happens only after append succeeds. If publishing fails the events
/// are still stored and the error is `EventStoreError::Publish`.
///
/// Append and publish run as one step under `publish_order`, so the bus sees
/// each stream's events in sequence order even with concurrent writers.
#[derive(Debug)]
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
    publish_order: Mutex<()>,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            publish_order: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let _ordered = self
            .publish_order
            .lock()
            .map_err(|_| EventStoreError::Unavailable("publish lock poisoned".to_string()))?;

        let committed = self.store.append(events, expected_version)?;

        for e in &committed {
            self.bus
                .publish(e.to_envelope())
                .map_err(|err| EventStoreError::Publish(format!("{err:?}")))?;
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_stream(aggregate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;
    use moneyflow_events::InMemoryEventBus;
    use uuid::Uuid;

    #[test]
    fn publishes_only_committed_events() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let store = PublishingEventStore::new(InMemoryEventStore::new(), bus.clone());
        let id = AggregateId::new();
        let event = || UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: id,
            aggregate_type: "t".to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };

        store.append(vec![event()], ExpectedVersion::NoStream).unwrap();
        assert!(store.append(vec![event()], ExpectedVersion::NoStream).is_err());

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].aggregate_id(), Some(id));
        assert_eq!(published[0].sequence_number(), Some(1));
    }

    #[test]
    fn concurrent_appends_are_published_in_stream_order() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let store = Arc::new(PublishingEventStore::new(InMemoryEventStore::new(), bus));
        let id = AggregateId::new();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let event = UncommittedEvent {
                            event_id: Uuid::now_v7(),
                            aggregate_id: id,
                            aggregate_type: "t".to_string(),
                            event_type: "test.happened".to_string(),
                            event_version: 1,
                            occurred_at: Utc::now(),
                            payload: serde_json::json!({}),
                        };
                        store.append(vec![event], ExpectedVersion::Any).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let sequence: Vec<u64> = sub
            .drain()
            .iter()
            .filter_map(|env| env.sequence_number())
            .collect();
        assert_eq!(sequence, (1..=400).collect::<Vec<_>>());
    }
}
