use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use farmstand_core::MarketId;

/// Market-isolated key/value store abstraction for disposable read models.
pub trait MarketStore<K, V>: Send + Sync {
    fn get(&self, market_id: MarketId, key: &K) -> Option<V>;
    fn upsert(&self, market_id: MarketId, key: K, value: V);
    fn list(&self, market_id: MarketId) -> Vec<V>;
    /// Clear all read-model records for a market (rebuild support).
    fn clear_market(&self, market_id: MarketId);
}

impl<K, V, S> MarketStore<K, V> for Arc<S>
where
    S: MarketStore<K, V> + ?Sized,
{
    fn get(&self, market_id: MarketId, key: &K) -> Option<V> {
        (**self).get(market_id, key)
    }

    fn upsert(&self, market_id: MarketId, key: K, value: V) {
        (**self).upsert(market_id, key, value)
    }

    fn list(&self, market_id: MarketId) -> Vec<V> {
        (**self).list(market_id)
    }

    fn clear_market(&self, market_id: MarketId) {
        (**self).clear_market(market_id)
    }
}

/// In-memory market-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryMarketStore<K, V> {
    inner: RwLock<HashMap<(MarketId, K), V>>,
}

impl<K, V> InMemoryMarketStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryMarketStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MarketStore<K, V> for InMemoryMarketStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, market_id: MarketId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(market_id, key.clone())).cloned()
    }

    fn upsert(&self, market_id: MarketId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((market_id, key), value);
        }
    }

    fn list(&self, market_id: MarketId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((m, _k), v)| if *m == market_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_market(&self, market_id: MarketId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(m, _k), _v| *m != market_id);
        }
    }
}
