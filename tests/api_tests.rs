use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;

use order_book_engine::{
    api::{OrderAck, router},
    state::AppState,
};
use serde_json::{Value, json};
use tempfile::tempdir;
use tower::ServiceExt;
use urlencoding::encode;

async fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let state = AppState::new(dir.path()).await.unwrap();
    (router(state), dir)
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn json<T: serde::de::DeserializeOwned>(res: Response) -> T {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_order(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn unknown_symbol_auto_creates_an_empty_book() {
    let (app, _tmp) = test_app().await;
    let res = app
        .oneshot(
            Request::builder()
                .uri("/book/WHATEVER-PAIR")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["bids"].as_array().unwrap().len(), 0);
    assert_eq!(v["asks"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn create_order_rejects_zero_qty() {
    let (app, _tmp) = test_app().await;

    let body = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": "50",
        "quantity": "0",
        "symbol": "BTC-USD"
    });

    let res = app.oneshot(post_order(body)).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["error"].as_str().unwrap().contains("quantity"));
}

#[tokio::test]
async fn create_order_rejects_non_positive_limit_price() {
    let (app, _tmp) = test_app().await;

    let body = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": "0",
        "quantity": "1",
        "symbol": "BTC-USD"
    });

    let res = app.oneshot(post_order(body)).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["error"].as_str().unwrap().contains("price"));
}

#[tokio::test]
async fn create_order_malformed_json_yields_422() {
    let (app, _tmp) = test_app().await;

    let body = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": "50",
        "quantity": "1",
        // symbol omitted entirely: required field missing
    });

    let res = app.oneshot(post_order(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn limit_order_rests_then_cancel_removes_it() {
    let (app, _tmp) = test_app().await;

    let create = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": "48000",
        "quantity": "10",
        "symbol": "BTC-USD"
    });

    let res = app.clone().oneshot(post_order(create)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack: OrderAck = json(res).await;
    let order_id = ack.order_id;
    assert!(ack.trades.is_empty());

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/book/BTC-USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let snap = body_json(res).await;
    assert_eq!(snap["bids"][0][0].as_str(), Some("48000"));

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/orders/BTC-USD/{}", order_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/book/BTC-USD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let snap = body_json(res).await;
    assert_eq!(snap["bids"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn cancel_of_unknown_order_returns_404() {
    let (app, _tmp) = test_app().await;

    let res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/orders/BTC-USD/123456789")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn simple_match_produces_one_trade() {
    let (app, _tmp) = test_app().await;

    let sell = json!({
        "side": "Sell",
        "order_type": "Limit",
        "price": "50000",
        "quantity": "1",
        "symbol": "BTC-USD"
    });
    let res = app.clone().oneshot(post_order(sell)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let buy = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": "50000",
        "quantity": "1",
        "symbol": "BTC-USD"
    });
    let res = app.oneshot(post_order(buy)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack: OrderAck = json(res).await;
    assert_eq!(ack.trades.len(), 1);
    assert_eq!(ack.trades[0].price.to_string(), "50000");
}

#[tokio::test]
async fn trades_endpoint_paginates_forward() {
    let (app, _tmp) = test_app().await;

    let seed = json!({
        "side": "Sell",
        "order_type": "Limit",
        "price": "52000",
        "quantity": "3",
        "symbol": "BTC-USD"
    });
    app.clone().oneshot(post_order(seed)).await.unwrap();

    let market_buy = |qty: &str| {
        json!({
            "side": "Buy",
            "order_type": "Market",
            "quantity": qty,
            "symbol": "BTC-USD"
        })
    };

    for _ in 0..2 {
        let _ = app.clone().oneshot(post_order(market_buy("1"))).await.unwrap();
    }

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/trades/BTC-USD?limit=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page1 = body_json(res).await;
    assert_eq!(page1["items"].as_array().unwrap().len(), 1);
    let next = page1["next"].as_str().unwrap();

    let res = app
        .oneshot(
            Request::builder()
                .uri(format!("/trades/BTC-USD?limit=1&after={}", encode(next)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page2 = body_json(res).await;
    assert_eq!(page2["items"].as_array().unwrap().len(), 1);
}
