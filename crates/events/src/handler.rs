use crate::{Command, Event};

/// Handles a command and emits events.
///
/// A standalone command → events interface, independent of the aggregate
/// lifecycle. Useful for background workers and for tests that don't need the
/// full dispatch pipeline. Errors are domain-specific, hence the associated
/// error type; the trait makes no storage assumptions.
pub trait CommandHandler {
    type Cmd: Command;
    type Ev: Event;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, command: Self::Cmd) -> Result<Vec<Self::Ev>, Self::Error>;
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical event-sourced lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events (no mutation)
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`
///
/// The aggregate mutates in place; version tracking is the aggregate's
/// responsibility (typically +1 per applied event). For the full pipeline with
/// persistence and publication, use the infra `CommandDispatcher` instead.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: farmstand_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
