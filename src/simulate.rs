//! Simulation harness for noisy order flow against the engine's HTTP
//! surface. A synthetic benchmark driver (spec.md §1: out of scope for the
//! core, kept here as a thin adapter).

use rand::Rng;
use rand_distr::{Distribution, Exp, Exp1, Normal};
use reqwest::{Client, ClientBuilder};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::symbol::Symbol;

#[derive(Clone)]
pub struct SimConfig {
    pub api_base: String,
    pub run_secs: Option<u64>,
    pub attack_rate_hz: f64, // Poisson rate λ
}

impl SimConfig {
    fn symbol(&self) -> Symbol {
        Symbol::new("BTC-USDT")
    }
}

#[derive(Deserialize)]
struct Ack {
    trades: Vec<AckTrade>,
}

#[derive(Deserialize)]
struct AckTrade {
    price: Decimal,
    quantity: Decimal,
}

fn apply_fills(side: &str, trades: Vec<AckTrade>, iv: &mut f64, pnl: &mut f64) {
    for t in trades {
        let price = t.price.to_f64().unwrap_or(0.0);
        let qty = t.quantity.to_f64().unwrap_or(0.0);
        if side == "Buy" {
            *iv -= qty; // maker sold to us
            *pnl += price * qty;
        } else {
            *iv += qty; // maker bought from us
            *pnl -= price * qty;
        }
    }
}

/// Noisy limit-order simulation loop: random side, Poisson inter-arrival,
/// a mid-price that drifts via a small Gaussian step each tick.
pub async fn run_simulation(cfg: SimConfig, cancel_token: CancellationToken) -> anyhow::Result<()> {
    let client: Client = ClientBuilder::new()
        .timeout(Duration::from_secs(5))
        .build()?;

    let ia = Exp::new(cfg.attack_rate_hz).expect("attack_rate_hz must be > 0");
    let drift = Normal::new(0.0, 0.5).expect("sigma >= 0");
    let size = Exp1;
    let symbol = cfg.symbol();

    let mut iv: f64 = 0.0;
    let mut pnl: f64 = 0.0;
    let mut mid: f64 = 50000.0;
    let start = Instant::now();
    let spread = 5.0_f64;

    loop {
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }

        let wait_secs: f64 = ia.sample(&mut rand::rng());
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("received shutdown; exiting simulation loop");
                break;
            }
            _ = sleep(Duration::from_secs_f64(wait_secs)) => {}
        }

        let unit: f64 = size.sample(&mut rand::rng());
        let qty = (unit * 2.0).max(0.1);

        mid += drift.sample(&mut rand::rng());
        mid = mid.max(1.0);

        let (price, side) = if rand::rng().random_bool(0.5) {
            (mid - spread, "Buy")
        } else {
            (mid + spread, "Sell")
        };
        let price = price.max(0.01);

        match client
            .post(format!("{}/orders", cfg.api_base))
            .json(&json!({
                "side": side,
                "order_type": "Limit",
                "price": format!("{:.2}", price),
                "quantity": format!("{:.4}", qty),
                "symbol": symbol.code(),
            }))
            .send()
            .await
        {
            Ok(resp) => {
                if let Err(e) = resp.error_for_status_ref() {
                    warn!(error = %e, "order post returned non-success");
                    continue;
                }
                match resp.json::<Ack>().await {
                    Ok(ack) => {
                        apply_fills(side, ack.trades, &mut iv, &mut pnl);
                        info!(
                            elapsed = format_args!("{:.1}s", start.elapsed().as_secs_f64()),
                            side,
                            qty = format_args!("{:.4}", qty),
                            price = format_args!("{:.2}", price),
                            mid = format_args!("{:.2}", mid),
                            inventory = format_args!("{:.4}", iv),
                            pnl = format_args!("{:.2}", pnl),
                            "sim tick"
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to parse Ack JSON"),
                }
            }
            Err(e) => {
                warn!(error = %e, "HTTP request failed");
                continue;
            }
        }
    }

    info!(
        inventory = format_args!("{:.4}", iv),
        pnl = format_args!("{:.2}", pnl),
        "simulation done"
    );
    Ok(())
}
