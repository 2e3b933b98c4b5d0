use errors::MarketMakerError;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMsg};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{OrderAck, WsFrame},
    errors,
    orders::{OrderType, Side},
    symbol::Symbol,
};

// # Market Maker Bot
//
// Posts a two-sided quote around the book's current midpoint, refreshing
// it whenever the midpoint moves by more than a tick. A synthetic traffic
// driver (spec.md §1: out of scope for the core, kept here as a thin
// adapter over the HTTP/WS surface).
//
// 1. Connects to the engine's `/ws/{symbol}` feed and receives `Book`
//    frames (top-of-book depth).
// 2. Computes `mid = (best_bid + best_ask) / 2`.
// 3. Every `PACE_MS` ms, if the midpoint moved since the last quote:
//    cancels the previous bid/ask and posts fresh ones at
//    `mid - SPREAD` / `mid + SPREAD`.

const SPREAD: &str = "2";
const PACE_MS: u64 = 500;

#[derive(Deserialize, Serialize)]
struct NewOrder {
    side: Side,
    order_type: OrderType,
    price: Option<Decimal>,
    quantity: Decimal,
    symbol: String,
}

/// Starts the market maker loop against a REST+WS API at `api_base`.
pub async fn run_market_maker(
    api_base: &str,
    symbol: Symbol,
    token: CancellationToken,
) -> Result<(), MarketMakerError> {
    let ws_url = format!(
        "ws://{host}/ws/{symbol}",
        host = api_base.trim_start_matches("http://"),
        symbol = symbol.code()
    );
    tracing::warn!("market maker: connecting to: {:?}", ws_url);
    let ws_stream = loop {
        match connect_async(&ws_url).await {
            Ok((stream, _)) => {
                tracing::info!("market maker: ws connected successfully");
                break stream;
            }
            Err(e) => {
                tracing::warn!("market maker: ws connect failed: {}; retrying...", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await
            }
        }
    };

    let (_write, read) = ws_stream.split();

    let (mid_tx, mid_rx) = watch::channel(None::<Decimal>);

    let target = symbol.clone();
    let frames = read.filter_map(|msg| async move {
        match msg {
            Ok(WsMsg::Text(txt)) => match serde_json::from_str::<WsFrame>(&txt) {
                Ok(frame) => Some(frame),
                Err(err) => {
                    tracing::warn!("invalid WS frame: {err}");
                    None
                }
            },
            _ => None,
        }
    });
    tokio::spawn(async move {
        tokio::pin!(frames);
        while let Some(frame) = frames.next().await {
            if let WsFrame::Book(view) = frame {
                if view.symbol != target {
                    continue;
                }
                if let (Some((bb, _)), Some((aa, _))) = (view.bids.first(), view.asks.first()) {
                    let mid = (*bb + *aa) / Decimal::from(2);
                    let _ = mid_tx.send(Some(mid));
                }
            }
        }
    });

    let spread: Decimal = SPREAD.parse().expect("SPREAD parses");
    let client = reqwest::Client::new();
    let mut outstanding: Vec<u128> = Vec::new();
    let mut interval = time::interval(time::Duration::from_millis(PACE_MS));
    let mut last_mid: Option<Decimal> = None;
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("market maker: shutdown requested, tearing down...");
                break;
            }
            _ = interval.tick() => {
                let mid_opt: Option<Decimal> = *mid_rx.borrow();
                if let Some(mid_price) = mid_opt {
                    if Some(mid_price) != last_mid {
                        for id in outstanding.drain(..) {
                            let _ = client
                                .delete(format!("{}/orders/{}/{}", api_base, symbol.code(), id))
                                .send()
                                .await;
                        }
                        let bid_price = (mid_price - spread).max(Decimal::from_f64(0.01).unwrap());
                        tracing::info!(%bid_price, "placing bid");
                        if let Ok(resp) = client
                            .post(format!("{}/orders", api_base))
                            .json(&NewOrder {
                                side: Side::Buy,
                                order_type: OrderType::Limit,
                                price: Some(bid_price),
                                quantity: Decimal::from(1),
                                symbol: symbol.code().to_string(),
                            })
                            .send()
                            .await
                        {
                            if let Ok(ack) = resp.json::<OrderAck>().await {
                                outstanding.push(ack.order_id);
                            }
                        }
                        let ask_price = mid_price + spread;
                        tracing::info!(%ask_price, "placing ask");
                        if let Ok(resp) = client
                            .post(format!("{}/orders", api_base))
                            .json(&NewOrder {
                                side: Side::Sell,
                                order_type: OrderType::Limit,
                                price: Some(ask_price),
                                quantity: Decimal::from(1),
                                symbol: symbol.code().to_string(),
                            })
                            .send()
                            .await
                        {
                            if let Ok(ack) = resp.json::<OrderAck>().await {
                                outstanding.push(ack.order_id);
                            }
                        }
                        last_mid = Some(mid_price);
                    }
                }
            }
        }
    }
    Ok(())
}
