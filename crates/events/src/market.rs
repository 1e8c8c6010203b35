use farmstand_core::MarketId;

use crate::EventEnvelope;

/// Helper trait for market-scoped messages.
///
/// Marks types that carry the market they belong to, so infrastructure
/// components (subscribers, projections) can filter or validate by market
/// without knowing the payload type.
pub trait MarketScoped {
    fn market_id(&self) -> MarketId;
}

impl<E> MarketScoped for EventEnvelope<E> {
    fn market_id(&self) -> MarketId {
        self.market_id()
    }
}
