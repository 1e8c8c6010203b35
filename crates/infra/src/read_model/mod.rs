//! Disposable read-model storage.

mod market_store;

pub use market_store::{InMemoryMarketStore, MarketStore};
