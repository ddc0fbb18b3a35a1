//! Event-sourced aggregate repository.
//!
//! The repository is the only way the command side touches the event store:
//!
//! ```text
//! load(id)            → load stream → validate → rehydrate (fold) → aggregate
//! execute(agg, cmd)   → handle (decide) → append with Exact(version) → apply
//!                       └─ on version conflict: reload, re-decide, retry
//! new_instance(id, c) → empty aggregate → handle → append with NoStream → apply
//! ```
//!
//! Writers to the same id are serialized by the compare-and-swap on the
//! expected version. A failed append leaves the aggregate untouched.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use moneyflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use moneyflow_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No event history exists for the id.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// `new_instance` was called for an id that already has history.
    #[error("aggregate already exists: {0}")]
    AlreadyExists(AggregateId),

    /// The expected version kept moving under us, even after retries.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The loaded stream breaks the store contract (gaps, wrong stream).
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// A stored payload does not decode into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<EventStoreError> for RepositoryError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency { .. } => RepositoryError::Concurrency(value.to_string()),
            other => RepositoryError::Store(other),
        }
    }
}

/// Aggregate plus the events committed while creating it.
#[derive(Debug, Clone)]
pub struct Committed<A> {
    pub aggregate: A,
    pub events: Vec<StoredEvent>,
}

/// Repository contract for event-sourced aggregates.
pub trait Repository<A: Aggregate>: Send + Sync {
    /// Create and register a brand-new aggregate by running its creation command.
    ///
    /// Fails with `AlreadyExists` if the id already has history.
    fn new_instance(&self, id: A::Id, command: &A::Command)
    -> Result<Committed<A>, RepositoryError>;

    /// Rebuild the aggregate from its stream.
    ///
    /// Fails with `AggregateNotFound` if no history exists. Never creates a
    /// stream.
    fn load(&self, id: A::Id) -> Result<A, RepositoryError>;

    /// Run a command against a loaded aggregate and persist what it decides.
    ///
    /// On success the committed events have been applied to `aggregate`.
    fn execute(
        &self,
        aggregate: &mut A,
        command: &A::Command,
    ) -> Result<Vec<StoredEvent>, RepositoryError>;
}

/// Repository over any `EventStore`, storing events as JSON.
pub struct EventSourcedRepository<A: Aggregate, S> {
    store: S,
    aggregate_type: String,
    max_conflict_retries: u32,
    factory: fn(A::Id) -> A,
}

impl<A: Aggregate, S> EventSourcedRepository<A, S> {
    /// `factory` builds the empty, not-yet-created instance that history is
    /// folded into (e.g. `Account::empty`).
    pub fn new(store: S, aggregate_type: impl Into<String>, factory: fn(A::Id) -> A) -> Self {
        Self {
            store,
            aggregate_type: aggregate_type.into(),
            max_conflict_retries: 0,
            factory,
        }
    }

    /// Number of reload-and-retry rounds `execute` attempts after a version conflict.
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }
}

impl<A, S> EventSourcedRepository<A, S>
where
    A: Aggregate<Error = DomainError>,
    A::Id: Copy + Into<AggregateId>,
    A::Event: Event + Serialize + DeserializeOwned,
    S: EventStore,
{
    fn rehydrate(&self, id: A::Id) -> Result<A, RepositoryError> {
        let aggregate_id: AggregateId = id.into();
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &self.aggregate_type, &history)?;

        let mut aggregate = (self.factory)(id);
        for stored in history {
            let event: A::Event = serde_json::from_value(stored.payload).map_err(|e| {
                RepositoryError::Deserialize(format!(
                    "{} #{}: {e}",
                    stored.event_type, stored.sequence_number
                ))
            })?;
            aggregate.apply(&event);
        }

        Ok(aggregate)
    }

    /// Decide, append at `expected`, then apply. Nothing is applied unless the
    /// append succeeded.
    fn commit(
        &self,
        aggregate: &mut A,
        command: &A::Command,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, RepositoryError> {
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_id: AggregateId = (*aggregate.id()).into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    self.aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type,
            appended = committed.len(),
            "events appended"
        );

        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(committed)
    }
}

impl<A, S> Repository<A> for EventSourcedRepository<A, S>
where
    A: Aggregate<Error = DomainError>,
    A::Id: Copy + Into<AggregateId>,
    A::Event: Event + Serialize + DeserializeOwned,
    S: EventStore,
{
    fn new_instance(
        &self,
        id: A::Id,
        command: &A::Command,
    ) -> Result<Committed<A>, RepositoryError> {
        let aggregate_id: AggregateId = id.into();
        if !self.store.load_stream(aggregate_id)?.is_empty() {
            return Err(RepositoryError::AlreadyExists(aggregate_id));
        }

        let mut aggregate = (self.factory)(id);
        let events = self
            .commit(&mut aggregate, command, ExpectedVersion::NoStream)
            .map_err(|e| match e {
                // Lost the race against another creator.
                RepositoryError::Concurrency(_) => RepositoryError::AlreadyExists(aggregate_id),
                other => other,
            })?;

        Ok(Committed { aggregate, events })
    }

    fn load(&self, id: A::Id) -> Result<A, RepositoryError> {
        let aggregate = self.rehydrate(id)?;
        let aggregate_id: AggregateId = id.into();

        if aggregate.version() == 0 {
            tracing::debug!(aggregate_id = %aggregate_id, "no history for aggregate");
            return Err(RepositoryError::AggregateNotFound(aggregate_id));
        }

        tracing::debug!(
            aggregate_id = %aggregate_id,
            version = aggregate.version(),
            "aggregate loaded"
        );
        Ok(aggregate)
    }

    fn execute(
        &self,
        aggregate: &mut A,
        command: &A::Command,
    ) -> Result<Vec<StoredEvent>, RepositoryError> {
        let id = *aggregate.id();
        let aggregate_id: AggregateId = id.into();
        let mut retries = 0u32;

        loop {
            let expected = ExpectedVersion::Exact(aggregate.version());
            match self.commit(aggregate, command, expected) {
                Err(RepositoryError::Concurrency(msg)) if retries < self.max_conflict_retries => {
                    retries += 1;
                    tracing::warn!(
                        aggregate_id = %aggregate_id,
                        retry = retries,
                        "{msg}; reloading aggregate"
                    );
                    *aggregate = self.rehydrate(id)?;
                }
                Err(RepositoryError::Concurrency(msg)) => {
                    return Err(RepositoryError::Concurrency(format!(
                        "{msg} (gave up after {retries} retries)"
                    )));
                }
                other => return other,
            }
        }
    }
}

/// Reject streams that break the store contract: foreign events, gaps or
/// reordering in sequence numbers, or a different aggregate type.
fn validate_loaded_stream(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), RepositoryError> {
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(RepositoryError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(RepositoryError::CorruptStream(format!(
                "expected aggregate_type '{aggregate_type}', found '{}' at index {idx}",
                e.aggregate_type
            )));
        }
        let expected_seq = idx as u64 + 1;
        if e.sequence_number != expected_seq {
            return Err(RepositoryError::CorruptStream(format!(
                "expected sequence_number {expected_seq}, found {} at index {idx}",
                e.sequence_number
            )));
        }
    }
    Ok(())
}
