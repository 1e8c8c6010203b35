//! Settlement & earnings module.
//!
//! This crate owns per-seller, per-currency earning balances: credit on sale,
//! debit-to-zero on withdrawal. Like the catalog, it is a pure state component
//! driven by the market ledger.

pub mod earnings;

pub use earnings::{Currency, EarningsBook};
