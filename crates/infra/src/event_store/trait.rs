use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use farmstand_core::{AggregateId, ExpectedVersion, MarketId};

/// An event ready to be appended to a stream (not yet assigned a sequence
/// number).
///
/// Lifecycle: a typed domain event becomes an `UncommittedEvent` (via
/// [`UncommittedEvent::from_typed`]), the store turns it into a
/// [`StoredEvent`] on append, and publication wraps it in an
/// `EventEnvelope` for consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub market_id: MarketId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are assigned by the store during append: monotonically
/// increasing, scoped to one `(market_id, aggregate_id)` stream, immutable
/// once assigned. They drive ordering, optimistic concurrency, and replay
/// deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub market_id: MarketId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a market-scoped event envelope for
    /// publication.
    pub fn to_envelope(&self) -> farmstand_events::EventEnvelope<JsonValue> {
        farmstand_events::EventEnvelope::new(
            self.event_id,
            self.market_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// These are infrastructure errors (storage, concurrency, isolation) as
/// opposed to domain errors (validation, preconditions).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("market isolation violation: {0}")]
    MarketIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Append-only, market-scoped event store.
///
/// Events are organized into streams, one per aggregate instance, keyed by
/// `(market_id, aggregate_id)`. Within a stream, sequence numbers increase
/// monotonically from 1 with no gaps.
///
/// Implementations must:
/// - enforce market isolation on read and write
/// - enforce optimistic concurrency against the current stream version
/// - assign sequence numbers starting at `current_version + 1`
/// - persist each batch atomically (all events or none)
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream (append-only).
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a market + aggregate.
    ///
    /// Events come back in sequence order; an empty vector means the stream
    /// does not exist yet.
    fn load_stream(
        &self,
        market_id: MarketId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        market_id: MarketId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(market_id, aggregate_id)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed event.
    ///
    /// Keeps infra decoupled from business, while still capturing event
    /// metadata needed for future deserialization.
    pub fn from_typed<E>(
        market_id: MarketId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: farmstand_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            market_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
