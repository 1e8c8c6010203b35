//! Read-model projections over published ledger events.
//!
//! Read models are disposable and rebuildable; the event stream is the
//! source of truth.

pub mod catalog_items;
pub mod seller_earnings;

pub use catalog_items::{CatalogItemsProjection, CatalogProjectionError, ItemReadModel};
pub use seller_earnings::{EarningsProjectionError, EarningsReadModel, SellerEarningsProjection};
