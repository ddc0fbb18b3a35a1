use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use moneyflow_core::AggregateId;

use crate::Event;

/// Where an event sits in an aggregate stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    /// Monotonically increasing position in the aggregate stream (starts at 1).
    pub sequence_number: u64,
}

/// Envelope for an event as it travels over the bus.
///
/// Events appended to a stream carry a `stream` position. Standalone events
/// (published without any aggregate, e.g. a transfer leg whose account does
/// not exist) have `stream == None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    stream: Option<StreamPosition>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        stream: Option<StreamPosition>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            event_version,
            occurred_at,
            stream,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn stream(&self) -> Option<&StreamPosition> {
        self.stream.as_ref()
    }

    pub fn is_standalone(&self) -> bool {
        self.stream.is_none()
    }

    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.stream.as_ref().map(|s| s.aggregate_id)
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.stream.as_ref().map(|s| s.sequence_number)
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Wrap a typed event that belongs to no stream.
    pub fn standalone<E>(event: &E) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self::new(
            Uuid::now_v7(),
            event.event_type(),
            event.version(),
            event.occurred_at(),
            None,
            serde_json::to_value(event)?,
        ))
    }

    /// Decode the JSON payload back into a typed event.
    pub fn decode<E>(&self) -> Result<E, serde_json::Error>
    where
        E: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.payload.clone())
    }
}
