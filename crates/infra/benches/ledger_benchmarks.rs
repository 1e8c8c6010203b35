//! Dispatch-pipeline benchmarks: listing and purchasing against the ledger.

use std::sync::Arc;

use chrono::Utc;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use farmstand_catalog::ListingDraft;
use farmstand_core::{AggregateId, ItemId, MarketId, PrincipalId};
use farmstand_events::{EventEnvelope, InMemoryEventBus};
use farmstand_infra::command_dispatcher::CommandDispatcher;
use farmstand_infra::event_store::InMemoryEventStore;
use farmstand_market::{BuyItem, LedgerId, ListItem, MarketCommand, MarketLedger};
use farmstand_settlement::Currency;

const LEDGER_AGGREGATE_TYPE: &str = "market.ledger";

type Dispatcher = CommandDispatcher<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
>;

struct Bench {
    dispatcher: Dispatcher,
    market_id: MarketId,
    ledger_id: LedgerId,
}

fn fresh() -> Bench {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    Bench {
        dispatcher: CommandDispatcher::new(store, bus),
        market_id: MarketId::new(),
        ledger_id: LedgerId::new(AggregateId::new()),
    }
}

fn list_cmd(bench: &Bench, seller: PrincipalId, quantity: u64) -> MarketCommand {
    MarketCommand::ListItem(ListItem {
        market_id: bench.market_id,
        ledger_id: bench.ledger_id,
        seller,
        listing: ListingDraft {
            name: "Tomatoes".to_string(),
            description: "fresh produce".to_string(),
            image_url: "https://example.com/img.jpg".to_string(),
            price: 500,
            quantity,
        },
        occurred_at: Utc::now(),
    })
}

fn buy_cmd(bench: &Bench, buyer: PrincipalId, item_id: ItemId) -> MarketCommand {
    MarketCommand::BuyItem(BuyItem {
        market_id: bench.market_id,
        ledger_id: bench.ledger_id,
        buyer,
        item_id,
        quantity: 1,
        currency: Currency::Native,
        occurred_at: Utc::now(),
    })
}

fn dispatch(bench: &Bench, command: MarketCommand) {
    bench
        .dispatcher
        .dispatch::<MarketLedger>(
            bench.market_id,
            bench.ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            command,
            |_, id| MarketLedger::empty(LedgerId::new(id)),
        )
        .expect("dispatch failed");
}

fn bench_list_then_buy(c: &mut Criterion) {
    c.bench_function("list_then_buy", |b| {
        b.iter_batched(
            fresh,
            |bench| {
                let seller = PrincipalId::new();
                let buyer = PrincipalId::new();
                dispatch(&bench, list_cmd(&bench, seller, 10));
                dispatch(&bench, buy_cmd(&bench, buyer, ItemId::FIRST));
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_dispatch_on_deep_stream(c: &mut Criterion) {
    // Rehydration cost grows with stream depth; measure a purchase against a
    // ledger that has already seen 100 operations.
    c.bench_function("buy_after_100_listings", |b| {
        b.iter_batched(
            || {
                let bench = fresh();
                let seller = PrincipalId::new();
                for _ in 0..100 {
                    dispatch(&bench, list_cmd(&bench, seller, 10));
                }
                bench
            },
            |bench| {
                let buyer = PrincipalId::new();
                dispatch(&bench, buy_cmd(&bench, buyer, ItemId::FIRST));
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_list_then_buy, bench_dispatch_on_deep_stream);
criterion_main!(benches);
