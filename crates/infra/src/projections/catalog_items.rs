use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use farmstand_core::{AggregateId, ItemId, MarketId, PrincipalId};
use farmstand_events::EventEnvelope;
use farmstand_market::MarketEvent;

use crate::read_model::MarketStore;

/// Queryable catalog read model: one row per listed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReadModel {
    pub item_id: ItemId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: u64,
    pub quantity: u64,
    pub seller: PrincipalId,
    pub active: bool,
}

/// Market+aggregate cursor to support at-least-once delivery (idempotent
/// projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    market_id: MarketId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize market event: {0}")]
    Deserialize(String),

    #[error("market isolation violation: {0}")]
    MarketIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Catalog items projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// market-isolated read model of the item table. Read models are disposable
/// and rebuildable from the event stream.
#[derive(Debug)]
pub struct CatalogItemsProjection<S>
where
    S: MarketStore<ItemId, ItemReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> CatalogItemsProjection<S>
where
    S: MarketStore<ItemId, ItemReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query read model for one market/item.
    pub fn get(&self, market_id: MarketId, item_id: &ItemId) -> Option<ItemReadModel> {
        self.store.get(market_id, item_id)
    }

    /// List all items for a market, in id order.
    pub fn list(&self, market_id: MarketId) -> Vec<ItemReadModel> {
        let mut items = self.store.list(market_id);
        items.sort_by_key(|i| i.item_id);
        items
    }

    /// List the purchasable (active) items for a market, in id order.
    pub fn list_active(&self, market_id: MarketId) -> Vec<ItemReadModel> {
        let mut items: Vec<_> = self
            .store
            .list(market_id)
            .into_iter()
            .filter(|i| i.active)
            .collect();
        items.sort_by_key(|i| i.item_id);
        items
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces market isolation
    /// - Enforces monotonic sequence per (market, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        let market_id = envelope.market_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Cursor check (per market + aggregate stream).
        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                market_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                // The first event may arrive at any positive sequence (some
                // stores start above 1); after that, strict increments only.
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: MarketEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;

            // Validate market isolation at the event level.
            let (event_market, event_ledger) = match &event {
                MarketEvent::ItemListed(e) => (e.market_id, e.ledger_id),
                MarketEvent::ItemPurchased(e) => (e.market_id, e.ledger_id),
                MarketEvent::EarningsWithdrawn(e) => (e.market_id, e.ledger_id),
            };

            if event_market != market_id {
                return Err(CatalogProjectionError::MarketIsolation(
                    "event market_id does not match envelope market_id".to_string(),
                ));
            }

            if event_ledger.0 != aggregate_id {
                return Err(CatalogProjectionError::MarketIsolation(
                    "event ledger_id does not match envelope aggregate_id".to_string(),
                ));
            }

            // Apply update.
            match event {
                MarketEvent::ItemListed(e) => {
                    self.store.upsert(
                        market_id,
                        e.item_id,
                        ItemReadModel {
                            item_id: e.item_id,
                            name: e.name,
                            description: e.description,
                            image_url: e.image_url,
                            price: e.price,
                            quantity: e.quantity,
                            seller: e.seller,
                            active: true,
                        },
                    );
                }
                MarketEvent::ItemPurchased(e) => {
                    if let Some(mut rm) = self.store.get(market_id, &e.item_id) {
                        rm.quantity = rm.quantity.saturating_sub(e.quantity);
                        if rm.quantity == 0 {
                            rm.active = false;
                        }
                        self.store.upsert(market_id, e.item_id, rm);
                    }
                }
                MarketEvent::EarningsWithdrawn(_) => {
                    // Settlement-only event; the catalog view is unaffected.
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CatalogProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per market before rebuilding.
        {
            let mut markets = envs.iter().map(|e| e.market_id()).collect::<Vec<_>>();
            markets.sort_by_key(|m| *m.as_uuid().as_bytes());
            markets.dedup();
            for m in markets {
                self.store.clear_market(m);
            }
        }

        // Deterministic replay order: market, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.market_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
