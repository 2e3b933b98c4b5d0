use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, DeserializeOwned},
};
use serde_json::json;
use std::str::FromStr;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Path, Query, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use rust_decimal::Decimal;

use crate::{
    credit::CreditHook,
    engine::MatchingEngine,
    errors::EngineError,
    orderbook::BookView,
    orders::{Order, OrderId, OrderType, Side},
    state::AppState,
    symbol::Symbol,
    trade::Trade,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

fn engine_error_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientFunds => StatusCode::BAD_REQUEST,
        EngineError::CorruptedSnapshot(_) => StatusCode::OK,
    }
}

fn log_rejected(payload: &NewOrder, reason: &str) {
    warn!(
        reason,
        side = ?payload.side,
        order_type = ?payload.order_type,
        price = ?payload.price,
        quantity = %payload.quantity,
        symbol = %payload.symbol,
        "order rejected"
    );
}

pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| (err(StatusCode::BAD_REQUEST, &e.to_string())))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri=%uri,
                    body_preview = %preview,
                    "order rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
            }
        }
    }
}

fn default_limit() -> usize {
    100
}
#[derive(Deserialize)]
pub struct TradesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    after: Option<String>,
}

#[derive(Serialize)]
pub struct TradesPage {
    items: Vec<Trade>,
    next: Option<String>,
}

/// Request payload for `POST /orders`.
///
/// `price`/`stop_price`/`take_profit_price`/`quantity` are decimals,
/// serialized as JSON strings (`rust_decimal`'s `serde-with-str`) to avoid
/// float precision loss over the wire.
#[derive(Deserialize)]
pub struct NewOrder {
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub quantity: Decimal,
    #[serde(deserialize_with = "parse_symbol")]
    pub symbol: Symbol,
    pub user_id: Option<String>,
}

fn parse_symbol<'de, D>(deserializer: D) -> Result<Symbol, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Err(de::Error::custom("symbol must not be empty"));
    }
    Symbol::from_str(&s).map_err(de::Error::custom)
}

/// A websocket message, either a depth snapshot or a single trade event.
///
/// Serialized as an internally-tagged enum:
/// ```text
/// {"type": "Book", "data": { /* BookView fields */ }}
/// {"type": "Trade", "data": { /* Trade fields */ }}
/// ```
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsFrame {
    Book(BookView),
    Trade(Trade),
}

/// Response for `POST /orders`.
#[derive(Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub trades: Vec<Trade>,
}

/// `GET /trades/{symbol}` — cursor-paged trade history for `symbol`.
pub async fn get_trade_log(
    Path(symbol): Path<Symbol>,
    State(state): State<AppState>,
    Query(q): Query<TradesQuery>,
) -> Result<Json<TradesPage>, StatusCode> {
    let limit = q.limit.min(1000);
    let (items, next) = {
        let store = state.store.read().await;
        store
            .page_trade_asc(symbol.code(), q.after.as_deref(), limit)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    };
    Ok(Json(TradesPage { items, next }))
}

/// `GET /book/{symbol}` — current top-of-book depth.
pub async fn get_order_book(
    Path(symbol): Path<Symbol>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let engine = state.engine.read().await;
    Json(engine.depth(&symbol, 10)).into_response()
}

/// `POST /orders` — submits a new order.
///
/// *Success:* 200, JSON `OrderAck`.
/// *Bad Request:* 400, JSON `{ "error": "..." }` for `InvalidOrder`/
///   `InsufficientFunds`.
/// *Failure:* 500 if persistence of the resulting trades fails.
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<NewOrder>,
) -> Result<Json<OrderAck>, ApiErr> {
    let mut order = Order::new(
        payload.symbol.clone(),
        payload.order_type,
        payload.side,
        payload.quantity,
        payload.price,
        payload.stop_price,
        payload.take_profit_price,
    );
    order.user_id = payload.user_id.clone();

    let order_id = order.id;
    let symbol = payload.symbol.clone();

    let trades = {
        let mut engine = state.engine.write().await;
        engine.submit(order).map_err(|e| {
            log_rejected(&payload, &e.to_string());
            (engine_error_status(&e), Json(json!({ "error": e.to_string() })))
        })?
    };

    if !trades.is_empty() {
        let mut store = state.store.write().await;
        for trade in &trades {
            store
                .insert_trade(trade)
                .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
        }
        drop(store);

        for trade in &trades {
            let _ = state.trade_tx.send(trade.clone());
        }
        let _ = state.book_tx.send(symbol);
    }

    Ok(Json(OrderAck { order_id, trades }))
}

/// `DELETE /orders/{symbol}/{id}` — cancels a resting or parked order.
///
/// *Success:* 200, JSON `{ "status": "cancelled" }`.
/// *Failure:* 404, JSON `{ "error": "order not found" }`.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path((symbol, order_id)): Path<(Symbol, OrderId)>,
) -> impl IntoResponse {
    let cancelled = {
        let mut engine = state.engine.write().await;
        engine.cancel_by_id(&symbol, order_id)
    };

    if cancelled {
        info!(%symbol, order_id, "order cancelled");
        let _ = state.book_tx.send(symbol);
        (StatusCode::OK, Json(json!({"status": "cancelled"})))
    } else {
        warn!(%symbol, order_id, "cancel failed: order not found");
        err(StatusCode::NOT_FOUND, "order not found")
    }
}

/// `GET /ws/{symbol}` — upgrades to a WebSocket streaming depth snapshots
/// and trade events for `symbol`.
pub async fn ws_handler(
    Path(symbol): Path<Symbol>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, symbol))
}

pub async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: Symbol) {
    let mut trade_rx = state.trade_tx.subscribe();
    let mut book_rx = state.book_tx.subscribe();

    let initial = {
        let engine = state.engine.read().await;
        engine.depth(&symbol, 10)
    };
    if let Err(e) = socket
        .send(Message::Text(
            serde_json::to_string(&WsFrame::Book(initial)).unwrap().into(),
        ))
        .await
    {
        error!("failed to send initial book snapshot: {:?}", e);
        return;
    }

    loop {
        tokio::select! {
            Ok(trade) = trade_rx.recv() => {
                if trade.symbol == symbol {
                    if let Err(e) = socket.send(Message::Text(serde_json::to_string(&WsFrame::Trade(trade)).unwrap().into())).await {
                        error!("ws send trade failed: {:?}", e);
                        break;
                    }
                }
            }
            Ok(updated_symbol) = book_rx.recv() => {
                if updated_symbol == symbol {
                    let view = {
                        let engine = state.engine.read().await;
                        engine.depth(&symbol, 10)
                    };
                    if let Err(e) = socket.send(Message::Text(serde_json::to_string(&WsFrame::Book(view)).unwrap().into())).await {
                        error!("ws send book failed: {:?}", e);
                        break;
                    }
                }
            }
            else => break,
        }
    }
}

/// Installs the pre-trade credit hook on the shared engine.
pub async fn install_credit_hook(state: &AppState, hook: CreditHook) {
    let mut engine = state.engine.write().await;
    MatchingEngine::set_balance_hook(&mut engine, hook);
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let root = Router::new().route("/orders", post(create_order));

    let symbol_router = Router::new()
        .route("/orders/{symbol}/{id}", delete(cancel_order))
        .route("/trades/{symbol}", get(get_trade_log))
        .route("/book/{symbol}", get(get_order_book))
        .route("/ws/{symbol}", get(ws_handler));

    root.merge(symbol_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
