use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use farmstand_core::{AggregateId, MarketId, PrincipalId};
use farmstand_events::EventEnvelope;
use farmstand_market::MarketEvent;
use farmstand_settlement::Currency;

use crate::read_model::MarketStore;

/// Queryable settlement read model: one row per `(seller, currency)` balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningsReadModel {
    pub seller: PrincipalId,
    pub currency: Currency,
    pub balance: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    market_id: MarketId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum EarningsProjectionError {
    #[error("failed to deserialize market event: {0}")]
    Deserialize(String),

    #[error("market isolation violation: {0}")]
    MarketIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Seller earnings projection.
///
/// Mirrors the ledger's earnings book per market: purchases credit a
/// `(seller, currency)` row, withdrawals zero it. Rows persist at zero, like
/// the write model's balances.
#[derive(Debug)]
pub struct SellerEarningsProjection<S>
where
    S: MarketStore<(PrincipalId, Currency), EarningsReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> SellerEarningsProjection<S>
where
    S: MarketStore<(PrincipalId, Currency), EarningsReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Current balance; zero if never credited.
    pub fn balance(&self, market_id: MarketId, seller: PrincipalId, currency: Currency) -> u64 {
        self.store
            .get(market_id, &(seller, currency))
            .map(|rm| rm.balance)
            .unwrap_or(0)
    }

    /// Both balances for a seller, in `Currency::ALL` order.
    pub fn balances(&self, market_id: MarketId, seller: PrincipalId) -> Vec<EarningsReadModel> {
        Currency::ALL
            .iter()
            .map(|&currency| EarningsReadModel {
                seller,
                currency,
                balance: self.balance(market_id, seller, currency),
            })
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// Same guarantees as the catalog projection: market isolation, monotonic
    /// sequencing, idempotent replays.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), EarningsProjectionError> {
        let market_id = envelope.market_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                market_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(EarningsProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(EarningsProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: MarketEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| EarningsProjectionError::Deserialize(e.to_string()))?;

            let (event_market, event_ledger) = match &event {
                MarketEvent::ItemListed(e) => (e.market_id, e.ledger_id),
                MarketEvent::ItemPurchased(e) => (e.market_id, e.ledger_id),
                MarketEvent::EarningsWithdrawn(e) => (e.market_id, e.ledger_id),
            };

            if event_market != market_id {
                return Err(EarningsProjectionError::MarketIsolation(
                    "event market_id does not match envelope market_id".to_string(),
                ));
            }

            if event_ledger.0 != aggregate_id {
                return Err(EarningsProjectionError::MarketIsolation(
                    "event ledger_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                MarketEvent::ItemListed(_) => {
                    // Catalog-only event; balances are unaffected.
                }
                MarketEvent::ItemPurchased(e) => {
                    let mut rm = self
                        .store
                        .get(market_id, &(e.seller, e.currency))
                        .unwrap_or(EarningsReadModel {
                            seller: e.seller,
                            currency: e.currency,
                            balance: 0,
                        });
                    rm.balance += e.amount;
                    self.store.upsert(market_id, (e.seller, e.currency), rm);
                }
                MarketEvent::EarningsWithdrawn(e) => {
                    self.store.upsert(
                        market_id,
                        (e.seller, e.currency),
                        EarningsReadModel {
                            seller: e.seller,
                            currency: e.currency,
                            balance: 0,
                        },
                    );
                }
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), EarningsProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut markets = envs.iter().map(|e| e.market_id()).collect::<Vec<_>>();
            markets.sort_by_key(|m| *m.as_uuid().as_bytes());
            markets.dedup();
            for m in markets {
                self.store.clear_market(m);
            }
        }

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
