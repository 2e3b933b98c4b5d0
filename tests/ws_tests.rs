use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use order_book_engine::{
    api::{WsFrame, router},
    state::AppState,
};
use serde_json::json;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let state = AppState::new(dir.path()).await.unwrap();
    let app: Router = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let ok = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(r) = client.get(format!("{}/book/BTC-USD", base)).send().await {
                if r.status().is_success() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok();
    assert!(ok, "server did not become ready in time");

    (base, handle, dir)
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_frame(ws: &mut WsStream) -> WsFrame {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("ws recv timeout")
        .expect("ws closed")
        .expect("ws error");
    let text = match msg {
        tokio_tungstenite::tungstenite::Message::Text(t) => t,
        other => panic!("expected text frame, got {:?}", other),
    };
    serde_json::from_str(&text).expect("parse WsFrame")
}

#[tokio::test]
async fn websocket_snapshot_and_trade_flow() {
    let (http_base, server, _tmpdir) = spawn_server().await;
    let ws_url = http_base.replace("http://", "ws://") + "/ws/BTC-USD";

    let (mut ws, _resp) = connect_async(&ws_url).await.expect("ws connect");

    let initial_view = match next_frame(&mut ws).await {
        WsFrame::Book(view) => view,
        WsFrame::Trade(_) => panic!("expected initial Book frame"),
    };
    assert!(initial_view.bids.is_empty());
    assert!(initial_view.asks.is_empty());

    let client = reqwest::Client::new();
    let body = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": "48000",
        "quantity": "5",
        "symbol": "BTC-USD"
    });
    let r = client
        .post(format!("{}/orders", http_base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(r.status().is_success());

    let (bids, asks) = match next_frame(&mut ws).await {
        WsFrame::Book(view) => (view.bids, view.asks),
        WsFrame::Trade(_) => panic!("expected a Book update after resting a limit order"),
    };
    assert!(asks.is_empty(), "should not have asks yet");
    assert_eq!(bids[0].0.to_string(), "48000");
    assert_eq!(bids[0].1.to_string(), "5");

    let market = json!({
        "side": "Sell",
        "order_type": "Market",
        "quantity": "2",
        "symbol": "BTC-USD"
    });
    let r = client
        .post(format!("{}/orders", http_base))
        .json(&market)
        .send()
        .await
        .unwrap();
    assert!(r.status().is_success());

    let trade = loop {
        match next_frame(&mut ws).await {
            WsFrame::Trade(t) => break t,
            WsFrame::Book(_) => continue,
        }
    };

    assert_eq!(trade.price.to_string(), "48000");
    assert_eq!(trade.quantity.to_string(), "2");

    server.abort();
}
