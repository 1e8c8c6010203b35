use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower::ServiceBuilder;
use uuid::Uuid;

use farmstand_auth::{Hs256JwtValidator, JwtValidator};
use farmstand_catalog::ListingDraft;
use farmstand_core::{AggregateId, ItemId, MarketError, MarketId, PrincipalId};
use farmstand_events::{EventBus, EventEnvelope, InMemoryEventBus};
use farmstand_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    projections::{
        CatalogItemsProjection, EarningsReadModel, ItemReadModel, SellerEarningsProjection,
    },
    read_model::InMemoryMarketStore,
};
use farmstand_market::{
    BuyItem, LedgerId, ListItem, MarketCommand, MarketEvent, MarketLedger, WithdrawEarnings,
};
use farmstand_settlement::Currency;

use crate::context::CallerContext;

const LEDGER_AGGREGATE_TYPE: &str = "market.ledger";

#[derive(Debug, Clone, Serialize)]
struct RealtimeMessage {
    market_id: MarketId,
    topic: String,
    payload: serde_json::Value,
}

type InMemoryDispatcher = CommandDispatcher<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
>;
type ItemsProjection = CatalogItemsProjection<Arc<InMemoryMarketStore<ItemId, ItemReadModel>>>;
type EarningsProjection =
    SellerEarningsProjection<Arc<InMemoryMarketStore<(PrincipalId, Currency), EarningsReadModel>>>;

/// Shared services behind every route: one market, one ledger stream.
#[derive(Clone)]
struct AppServices {
    dispatcher: Arc<InMemoryDispatcher>,
    items: Arc<ItemsProjection>,
    earnings: Arc<EarningsProjection>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    market_id: MarketId,
    ledger_id: LedgerId,
}

impl AppServices {
    fn dispatch(&self, command: MarketCommand) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch::<MarketLedger>(
            self.market_id,
            self.ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            command,
            |_, id| MarketLedger::empty(LedgerId::new(id)),
        )
    }
}

fn build_services() -> AppServices {
    // In-memory infra wiring: store + bus + projections.
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());

    let items_store: Arc<InMemoryMarketStore<ItemId, ItemReadModel>> =
        Arc::new(InMemoryMarketStore::new());
    let items: Arc<ItemsProjection> = Arc::new(CatalogItemsProjection::new(items_store));

    let earnings_store: Arc<InMemoryMarketStore<(PrincipalId, Currency), EarningsReadModel>> =
        Arc::new(InMemoryMarketStore::new());
    let earnings: Arc<EarningsProjection> = Arc::new(SellerEarningsProjection::new(earnings_store));

    // Realtime channel (SSE): lossy broadcast, market-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> projections -> realtime notifications.
    {
        let sub = bus.subscribe();
        let items = items.clone();
        let earnings = earnings.clone();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        if let Err(e) = items.apply_envelope(&env) {
                            tracing::warn!("catalog projection apply failed: {e}");
                            continue;
                        }
                        if let Err(e) = earnings.apply_envelope(&env) {
                            tracing::warn!("earnings projection apply failed: {e}");
                            continue;
                        }

                        // Broadcast the update (lossy; no backpressure on the core).
                        let _ = realtime_tx.send(RealtimeMessage {
                            market_id: env.market_id(),
                            topic: "market.projection_updated".to_string(),
                            payload: serde_json::json!({
                                "kind": "projection_update",
                                "aggregate_type": env.aggregate_type(),
                                "aggregate_id": env.aggregate_id().to_string(),
                                "sequence_number": env.sequence_number(),
                            }),
                        });
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher: Arc<InMemoryDispatcher> = Arc::new(CommandDispatcher::new(store, bus));

    AppServices {
        dispatcher,
        items,
        earnings,
        realtime_tx,
        market_id: MarketId::new(),
        ledger_id: LedgerId::new(AggregateId::new()),
    }
}

pub fn build_app(jwt_secret: String) -> Router {
    let jwt: Arc<dyn JwtValidator> = Arc::new(Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = crate::middleware::AuthState { jwt };

    let services = build_services();

    // Protected routes: require a valid session token.
    let protected = Router::new()
        .route("/whoami", get(whoami))
        .route("/stream", get(stream))
        .nest("/market", market_router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::middleware::auth_middleware,
        ));

    Router::new().route("/healthz", get(healthz)).merge(protected)
}

fn market_router() -> Router {
    Router::new()
        .route("/items", post(create_listing).get(list_items))
        .route("/items/next-id", get(next_item_id))
        .route("/items/:id", get(get_item))
        .route("/items/:id/purchases", post(purchase_item))
        .route("/sellers/:seller/earnings", get(seller_earnings))
        .route(
            "/sellers/:seller/earnings/:currency",
            get(seller_earnings_for_currency),
        )
        .route("/withdrawals/:currency", post(withdraw_earnings))
}

// ---- request/response mapping ----

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u32>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn domain_error_response(err: MarketError) -> ApiError {
    let status = match &err {
        MarketError::ItemNotFound => StatusCode::NOT_FOUND,
        MarketError::ItemUnavailable | MarketError::NoEarnings | MarketError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        MarketError::Validation(_) | MarketError::InvalidId(_) => StatusCode::BAD_REQUEST,
    };
    let body = ErrorBody {
        error: err.to_string(),
        code: err.ledger_code(),
    };
    (status, Json(body))
}

fn error_response(err: DispatchError) -> ApiError {
    match err {
        DispatchError::Domain(e) => domain_error_response(e),
        DispatchError::Concurrency(msg) => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: msg,
                code: None,
            }),
        ),
        other => {
            tracing::error!("dispatch failed: {other:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "internal error".to_string(),
                    code: None,
                }),
            )
        }
    }
}

fn committed_event(stored: &[StoredEvent]) -> Option<MarketEvent> {
    stored
        .first()
        .and_then(|s| serde_json::from_value(s.payload.clone()).ok())
}

#[derive(Debug, Serialize)]
struct ItemDto {
    id: u64,
    name: String,
    description: String,
    image_url: String,
    price: u64,
    quantity: u64,
    seller: String,
    active: bool,
}

impl From<ItemReadModel> for ItemDto {
    fn from(rm: ItemReadModel) -> Self {
        Self {
            id: rm.item_id.value(),
            name: rm.name,
            description: rm.description,
            image_url: rm.image_url,
            price: rm.price,
            quantity: rm.quantity,
            seller: rm.seller.to_string(),
            active: rm.active,
        }
    }
}

// ---- handlers ----

async fn healthz() -> &'static str {
    "ok"
}

async fn whoami(
    Extension(services): Extension<AppServices>,
    Extension(caller): Extension<CallerContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "principal_id": caller.principal_id().to_string(),
        "market_id": services.market_id.to_string(),
    }))
}

async fn stream(
    Extension(services): Extension<AppServices>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx.subscribe();
    let market_id = services.market_id;

    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(msg) if msg.market_id == market_id => {
            let data = serde_json::to_string(&msg).ok()?;
            Some(Ok(SseEvent::default().event(msg.topic.clone()).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[derive(Debug, Deserialize)]
struct ListItemRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    image_url: String,
    price: u64,
    quantity: u64,
}

#[derive(Debug, Serialize)]
struct ListItemResponse {
    item_id: u64,
}

async fn create_listing(
    Extension(services): Extension<AppServices>,
    Extension(caller): Extension<CallerContext>,
    Json(req): Json<ListItemRequest>,
) -> Result<(StatusCode, Json<ListItemResponse>), ApiError> {
    let command = MarketCommand::ListItem(ListItem {
        market_id: services.market_id,
        ledger_id: services.ledger_id,
        seller: caller.principal_id(),
        listing: ListingDraft {
            name: req.name,
            description: req.description,
            image_url: req.image_url,
            price: req.price,
            quantity: req.quantity,
        },
        occurred_at: Utc::now(),
    });

    let stored = services.dispatch(command).map_err(error_response)?;
    match committed_event(&stored) {
        Some(MarketEvent::ItemListed(e)) => Ok((
            StatusCode::CREATED,
            Json(ListItemResponse {
                item_id: e.item_id.value(),
            }),
        )),
        _ => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "listing produced no committed event".to_string(),
                code: None,
            }),
        )),
    }
}

async fn list_items(Extension(services): Extension<AppServices>) -> impl IntoResponse {
    let items: Vec<ItemDto> = services
        .items
        .list_active(services.market_id)
        .into_iter()
        .map(ItemDto::from)
        .collect();
    Json(items)
}

async fn get_item(
    Extension(services): Extension<AppServices>,
    Path(id): Path<u64>,
) -> Result<Json<ItemDto>, StatusCode> {
    services
        .items
        .get(services.market_id, &ItemId::new(id))
        .map(|rm| Json(ItemDto::from(rm)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn next_item_id(Extension(services): Extension<AppServices>) -> impl IntoResponse {
    // Item ids are dense, so the read model's highest id + 1 equals the
    // ledger's counter (modulo projection lag).
    let next = services
        .items
        .list(services.market_id)
        .last()
        .map(|i| i.item_id.value() + 1)
        .unwrap_or(1);
    Json(serde_json::json!({ "next_item_id": next }))
}

#[derive(Debug, Deserialize)]
struct PurchaseRequest {
    quantity: u64,
    currency: Currency,
}

async fn purchase_item(
    Extension(services): Extension<AppServices>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<u64>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let command = MarketCommand::BuyItem(BuyItem {
        market_id: services.market_id,
        ledger_id: services.ledger_id,
        buyer: caller.principal_id(),
        item_id: ItemId::new(id),
        quantity: req.quantity,
        currency: req.currency,
        occurred_at: Utc::now(),
    });

    services.dispatch(command).map_err(error_response)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn seller_earnings(
    Extension(services): Extension<AppServices>,
    Path(seller): Path<Uuid>,
) -> impl IntoResponse {
    let seller = PrincipalId::from_uuid(seller);
    let mut body = serde_json::Map::new();
    for rm in services.earnings.balances(services.market_id, seller) {
        body.insert(rm.currency.to_string(), rm.balance.into());
    }
    Json(serde_json::Value::Object(body))
}

async fn seller_earnings_for_currency(
    Extension(services): Extension<AppServices>,
    Path((seller, currency)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let currency: Currency = currency.parse().map_err(domain_error_response)?;
    let balance =
        services
            .earnings
            .balance(services.market_id, PrincipalId::from_uuid(seller), currency);
    Ok(Json(serde_json::json!({
        "currency": currency.to_string(),
        "balance": balance,
    })))
}

async fn withdraw_earnings(
    Extension(services): Extension<AppServices>,
    Extension(caller): Extension<CallerContext>,
    Path(currency): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let currency: Currency = currency.parse().map_err(domain_error_response)?;

    let command = MarketCommand::WithdrawEarnings(WithdrawEarnings {
        market_id: services.market_id,
        ledger_id: services.ledger_id,
        seller: caller.principal_id(),
        currency,
        occurred_at: Utc::now(),
    });

    let stored = services.dispatch(command).map_err(error_response)?;
    match committed_event(&stored) {
        Some(MarketEvent::EarningsWithdrawn(e)) => Ok(Json(serde_json::json!({
            "currency": currency.to_string(),
            "amount": e.amount,
        }))),
        _ => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "withdrawal produced no committed event".to_string(),
                code: None,
            }),
        )),
    }
}
