use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections transform events (write model) into queryable state (read
/// model). Read models are **disposable**: they can be deleted and rebuilt
/// from events at any time, because events are the source of truth.
///
/// Projections must be **idempotent** (applying the same event twice must
/// produce the same result) since the bus delivers at-least-once. The
/// [`crate::ProjectionRunner`] helps by tracking sequence numbers and
/// rejecting replays, but projections should stay idempotent at the domain
/// level too.
///
/// Persistence of the read model is an infrastructure concern; this trait is
/// a pure event consumer.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// The envelope includes `market_id`, which must scope any read-model
    /// update so one market's events never leak into another's view.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
