//! Marketplace ledger module (event-sourced).
//!
//! This crate composes the item catalog and the earnings book into one
//! aggregate behind a total-order event stream. All business rules live in
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod ledger;

pub use ledger::{
    BuyItem, EarningsWithdrawn, ItemListed, ItemPurchased, LedgerId, ListItem, MarketCommand,
    MarketEvent, MarketLedger, WithdrawEarnings,
};
