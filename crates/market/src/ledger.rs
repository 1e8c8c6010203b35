use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use farmstand_catalog::{Item, ItemCatalog, ListingDraft};
use farmstand_core::{
    Aggregate, AggregateId, AggregateRoot, ItemId, MarketError, MarketId, PrincipalId,
};
use farmstand_events::{Command, Event};
use farmstand_settlement::{Currency, EarningsBook};

/// Market ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: MarketLedger.
///
/// The whole marketplace ledger behind one total-order event stream. The item
/// catalog and the earnings book evolve together, one operation per log
/// entry: a purchase decrements stock and credits the seller in a single
/// event, so both mutations become visible together or not at all. Every
/// precondition is checked in `handle` before any event is emitted; `apply`
/// only ever sees accepted facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketLedger {
    id: LedgerId,
    market_id: Option<MarketId>,
    catalog: ItemCatalog,
    earnings: EarningsBook,
    version: u64,
}

impl MarketLedger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            market_id: None,
            catalog: ItemCatalog::new(),
            earnings: EarningsBook::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn market_id(&self) -> Option<MarketId> {
        self.market_id
    }

    /// Pure lookup; `None` if the id was never assigned.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.catalog.item(id)
    }

    /// Id the next listing will receive.
    pub fn next_item_id(&self) -> ItemId {
        self.catalog.next_item_id()
    }

    /// Seller balance for one currency; zero if never credited.
    pub fn earnings(&self, seller: PrincipalId, currency: Currency) -> u64 {
        self.earnings.balance(seller, currency)
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }
}

impl AggregateRoot for MarketLedger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ListItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub market_id: MarketId,
    pub ledger_id: LedgerId,
    /// Caller identity; becomes the item's immutable `seller`.
    pub seller: PrincipalId,
    pub listing: ListingDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BuyItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyItem {
    pub market_id: MarketId,
    pub ledger_id: LedgerId,
    pub buyer: PrincipalId,
    pub item_id: ItemId,
    pub quantity: u64,
    /// Settlement currency; the charged amount is the same either way.
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawEarnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawEarnings {
    pub market_id: MarketId,
    pub ledger_id: LedgerId,
    /// Caller identity; only a seller's own balance can be withdrawn.
    pub seller: PrincipalId,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketCommand {
    ListItem(ListItem),
    BuyItem(BuyItem),
    WithdrawEarnings(WithdrawEarnings),
}

impl Command for MarketCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            MarketCommand::ListItem(cmd) => cmd.ledger_id.0,
            MarketCommand::BuyItem(cmd) => cmd.ledger_id.0,
            MarketCommand::WithdrawEarnings(cmd) => cmd.ledger_id.0,
        }
    }
}

/// Event: ItemListed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemListed {
    pub market_id: MarketId,
    pub ledger_id: LedgerId,
    /// Sequential id assigned by the ledger at decision time.
    pub item_id: ItemId,
    pub seller: PrincipalId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: u64,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemPurchased.
///
/// Carries the full settlement outcome (seller, unit price, total amount,
/// currency) so the catalog decrement and the earnings credit replay from a
/// single fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPurchased {
    pub market_id: MarketId,
    pub ledger_id: LedgerId,
    pub item_id: ItemId,
    pub buyer: PrincipalId,
    pub seller: PrincipalId,
    pub quantity: u64,
    pub unit_price: u64,
    /// `quantity * unit_price`, checked against overflow at decision time.
    pub amount: u64,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EarningsWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsWithdrawn {
    pub market_id: MarketId,
    pub ledger_id: LedgerId,
    pub seller: PrincipalId,
    pub currency: Currency,
    /// The balance that was read and zeroed; the external transfer layer
    /// moves exactly this amount.
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    ItemListed(ItemListed),
    ItemPurchased(ItemPurchased),
    EarningsWithdrawn(EarningsWithdrawn),
}

impl Event for MarketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::ItemListed(_) => "market.ledger.item_listed",
            MarketEvent::ItemPurchased(_) => "market.ledger.item_purchased",
            MarketEvent::EarningsWithdrawn(_) => "market.ledger.earnings_withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::ItemListed(e) => e.occurred_at,
            MarketEvent::ItemPurchased(e) => e.occurred_at,
            MarketEvent::EarningsWithdrawn(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MarketLedger {
    type Command = MarketCommand;
    type Event = MarketEvent;
    type Error = MarketError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MarketEvent::ItemListed(e) => {
                self.id = e.ledger_id;
                if self.market_id.is_none() {
                    self.market_id = Some(e.market_id);
                }
                self.catalog.apply_listed(Item {
                    id: e.item_id,
                    name: e.name.clone(),
                    description: e.description.clone(),
                    image_url: e.image_url.clone(),
                    price: e.price,
                    quantity: e.quantity,
                    seller: e.seller,
                    active: true,
                });
            }
            MarketEvent::ItemPurchased(e) => {
                self.catalog.apply_purchased(e.item_id, e.quantity);
                self.earnings.apply_credited(e.seller, e.currency, e.amount);
            }
            MarketEvent::EarningsWithdrawn(e) => {
                self.earnings.apply_withdrawn(e.seller, e.currency);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MarketCommand::ListItem(cmd) => self.handle_list(cmd),
            MarketCommand::BuyItem(cmd) => self.handle_buy(cmd),
            MarketCommand::WithdrawEarnings(cmd) => self.handle_withdraw(cmd),
        }
    }
}

impl MarketLedger {
    fn ensure_market(&self, market_id: MarketId) -> Result<(), MarketError> {
        match self.market_id {
            Some(own) if own != market_id => Err(MarketError::conflict("market mismatch")),
            _ => Ok(()),
        }
    }

    fn ensure_ledger_id(&self, ledger_id: LedgerId) -> Result<(), MarketError> {
        if self.id != ledger_id {
            return Err(MarketError::conflict("ledger_id mismatch"));
        }
        Ok(())
    }

    fn handle_list(&self, cmd: &ListItem) -> Result<Vec<MarketEvent>, MarketError> {
        self.ensure_market(cmd.market_id)?;
        self.ensure_ledger_id(cmd.ledger_id)?;
        cmd.listing.validate()?;

        Ok(vec![MarketEvent::ItemListed(ItemListed {
            market_id: cmd.market_id,
            ledger_id: cmd.ledger_id,
            item_id: self.catalog.next_item_id(),
            seller: cmd.seller,
            name: cmd.listing.name.clone(),
            description: cmd.listing.description.clone(),
            image_url: cmd.listing.image_url.clone(),
            price: cmd.listing.price,
            quantity: cmd.listing.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_buy(&self, cmd: &BuyItem) -> Result<Vec<MarketEvent>, MarketError> {
        self.ensure_market(cmd.market_id)?;
        self.ensure_ledger_id(cmd.ledger_id)?;

        let item = self.catalog.check_purchase(cmd.item_id, cmd.quantity)?;

        let amount = item
            .price
            .checked_mul(cmd.quantity)
            .ok_or_else(|| MarketError::validation("purchase amount overflows"))?;
        self.earnings
            .balance(item.seller, cmd.currency)
            .checked_add(amount)
            .ok_or_else(|| MarketError::validation("seller balance overflows"))?;

        Ok(vec![MarketEvent::ItemPurchased(ItemPurchased {
            market_id: cmd.market_id,
            ledger_id: cmd.ledger_id,
            item_id: cmd.item_id,
            buyer: cmd.buyer,
            seller: item.seller,
            quantity: cmd.quantity,
            unit_price: item.price,
            amount,
            currency: cmd.currency,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &WithdrawEarnings) -> Result<Vec<MarketEvent>, MarketError> {
        self.ensure_market(cmd.market_id)?;
        self.ensure_ledger_id(cmd.ledger_id)?;

        let amount = self.earnings.check_withdraw(cmd.seller, cmd.currency)?;

        Ok(vec![MarketEvent::EarningsWithdrawn(EarningsWithdrawn {
            market_id: cmd.market_id,
            ledger_id: cmd.ledger_id,
            seller: cmd.seller,
            currency: cmd.currency,
            amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}
