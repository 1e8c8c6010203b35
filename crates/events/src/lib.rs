//! `farmstand-events` — event/command abstractions and pub/sub mechanics.
//!
//! Domain-agnostic building blocks for the event-sourced ledger: the [`Event`]
//! and [`Command`] traits, market-scoped envelopes, the bus contract with an
//! in-memory implementation, and projection/read-model mechanics.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod market;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{CommandHandler, execute};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use market::MarketScoped;
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
