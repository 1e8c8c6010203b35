//! Command execution pipeline (application-level orchestration).
//!
//! The `CommandDispatcher` implements the full event-sourcing lifecycle for
//! the ledger:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (market-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections, streams, etc.)
//! ```
//!
//! The optimistic check in step 4 is what serializes the ledger: a command
//! decided against stale state loses the append race and fails with
//! `Concurrency` instead of producing a partial or interleaved mutation.
//! Events are persisted before publication; if publication fails the events
//! are already durable, so retrying is at-least-once for consumers.
//!
//! This module contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits, so tests run against the in-memory implementations.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use farmstand_core::{Aggregate, AggregateId, ExpectedVersion, MarketError, MarketId};
use farmstand_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. a racing append on the stream).
    Concurrency(String),
    /// Market isolation violation (cross-market or cross-aggregate stream
    /// mixing).
    MarketIsolation(String),
    /// Deterministic domain rejection; carries the ledger error and its
    /// numeric code.
    Domain(MarketError),
    /// Failed to deserialize historical event payloads into the aggregate
    /// event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may
    /// duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::MarketIsolation(msg) => DispatchError::MarketIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<MarketError> for DispatchError {
    fn from(value: MarketError) -> Self {
        match value {
            MarketError::Conflict(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Domain(other),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests can use the in-memory
/// implementations and deployments can swap backends without touching domain
/// code. Aggregates must be deterministic, side-effect free, and track their
/// version in `apply()`.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` is a factory for a fresh (empty) aggregate instance;
    /// domain code controls construction, the dispatcher stays generic.
    /// Returns the committed `StoredEvent`s with their assigned sequence
    /// numbers; callers read decision outputs (assigned item ids, withdrawn
    /// amounts) from the committed payloads.
    ///
    /// On a concurrency failure the caller may reload and re-execute the
    /// command, or surface the conflict; nothing was persisted.
    pub fn dispatch<A>(
        &self,
        market_id: MarketId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(MarketId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = MarketError>,
        A::Event: farmstand_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (market-scoped)
        let history = self.store.load_stream(market_id, aggregate_id)?;
        validate_loaded_stream(market_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(market_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    market_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    market_id: MarketId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce market isolation even if a buggy backend returns cross-market
    // data. Also ensure the stream is monotonically increasing by sequence
    // number.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.market_id != market_id {
            return Err(DispatchError::MarketIsolation(format!(
                "loaded stream contains wrong market_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::MarketIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
