use farmstand_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent** - a request to perform an action on an
/// aggregate. They are transient (not persisted) and are transformed into
/// events (which are persisted). A command is rejected if invalid; events
/// represent accepted changes.
///
/// Commands must specify which aggregate they target via
/// `target_aggregate_id()` so infrastructure can route them, and each command
/// operates on exactly one aggregate (the transaction boundary).
///
/// Market scoping is enforced at the event level (envelopes), not on the
/// command trait; the market context is provided by the dispatching layer.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
