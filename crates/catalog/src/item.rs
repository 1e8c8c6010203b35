use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use farmstand_core::{Entity, ItemId, MarketError, MarketResult, PrincipalId, ValueObject};

/// Listing field bounds, in characters.
pub const NAME_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 200;
pub const IMAGE_URL_MAX_LEN: usize = 200;

/// Caller-supplied fields of a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Unit price in the smallest unit of account. The same numeric amount is
    /// charged whichever settlement currency the buyer selects.
    pub price: u64,
    pub quantity: u64,
}

impl ListingDraft {
    /// Validate listing field bounds.
    ///
    /// Zero-quantity drafts pass: the catalog accepts them, and the resulting
    /// item is simply never purchasable.
    pub fn validate(&self) -> MarketResult<()> {
        if self.name.trim().is_empty() {
            return Err(MarketError::validation("name cannot be empty"));
        }
        if self.name.chars().count() > NAME_MAX_LEN {
            return Err(MarketError::validation(format!(
                "name exceeds {NAME_MAX_LEN} characters"
            )));
        }
        if self.description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(MarketError::validation(format!(
                "description exceeds {DESCRIPTION_MAX_LEN} characters"
            )));
        }
        if self.image_url.chars().count() > IMAGE_URL_MAX_LEN {
            return Err(MarketError::validation(format!(
                "image_url exceeds {IMAGE_URL_MAX_LEN} characters"
            )));
        }
        Ok(())
    }
}

impl ValueObject for ListingDraft {}

/// A listed, purchasable unit of inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Unit price in the smallest unit of account (currency-agnostic).
    pub price: u64,
    /// Remaining stock; never negative, decremented by purchases only.
    pub quantity: u64,
    /// Identity of the lister; immutable after creation.
    pub seller: PrincipalId,
    /// Cleared when quantity reaches zero. Deactivation is terminal: there is
    /// no restock operation.
    pub active: bool,
}

impl Item {
    /// Whether a purchase of `requested` units can be served right now.
    pub fn can_serve(&self, requested: u64) -> bool {
        self.active && requested >= 1 && requested <= self.quantity
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &ItemId {
        &self.id
    }
}

/// The catalog's item table plus its sequential id allocator.
///
/// Single writer: the market ledger aggregate owns the only mutable handle,
/// so id allocation and quantity decrements are serialized by the ledger's
/// event stream. `check_*` methods evaluate preconditions without mutating;
/// `apply_*` methods record accepted events and must stay infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCatalog {
    items: BTreeMap<ItemId, Item>,
    next_id: ItemId,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            next_id: ItemId::FIRST,
        }
    }

    /// Id the next listing will receive.
    pub fn next_item_id(&self) -> ItemId {
        self.next_id
    }

    /// Pure lookup; `None` if the id was never assigned.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// All items, in id order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Purchase preconditions, checked in order; first failure wins.
    ///
    /// Insufficient stock, an inactive item, and a zero request all report
    /// `ItemUnavailable`; only a never-assigned id reports `ItemNotFound`.
    pub fn check_purchase(&self, item_id: ItemId, requested: u64) -> MarketResult<&Item> {
        let item = self.items.get(&item_id).ok_or(MarketError::ItemNotFound)?;
        if !item.can_serve(requested) {
            return Err(MarketError::ItemUnavailable);
        }
        Ok(item)
    }

    /// Record a new listing.
    ///
    /// The item must carry the id `next_item_id()` returned when the listing
    /// was decided; ids advance by one per listing and are never reused.
    pub fn apply_listed(&mut self, item: Item) {
        debug_assert_eq!(item.id, self.next_id);
        self.next_id = item.id.next();
        self.items.insert(item.id, item);
    }

    /// Record a purchase decrement; reaching zero deactivates the item.
    pub fn apply_purchased(&mut self, item_id: ItemId, quantity: u64) {
        if let Some(item) = self.items.get_mut(&item_id) {
            item.quantity = item.quantity.saturating_sub(quantity);
            if item.quantity == 0 {
                item.active = false;
            }
        }
    }
}

impl Default for ItemCatalog {
    fn default() -> Self {
        Self::new()
    }
}
