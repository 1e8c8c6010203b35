//! Item catalog module.
//!
//! This crate owns item records: creation, quantity decrement, deactivation.
//! It is a pure state component driven by the market ledger; it performs no
//! IO and holds no settlement knowledge.

pub mod item;

pub use item::{
    DESCRIPTION_MAX_LEN, IMAGE_URL_MAX_LEN, Item, ItemCatalog, ListingDraft, NAME_MAX_LEN,
};
