//! Synchronous trade fan-out and last-trade-price tracking.
//!
//! Listeners are advisory (market-data fan-out, logging) and run in-band on
//! the matching path, in registration order, per spec.md §4.4 and §5. A
//! panicking listener is caught and logged; it never aborts matching or
//! reaches the caller (spec.md §7: "Listener errors are strictly local").

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use rust_decimal::Decimal;
use tracing::error;

use crate::symbol::Symbol;
use crate::trade::Trade;

pub type Listener = Box<dyn Fn(&Trade) + Send + Sync>;

#[derive(Default)]
pub struct TradeNotifier {
    listeners: Vec<Listener>,
    last_trade_prices: HashMap<Symbol, Decimal>,
}

impl TradeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.last_trade_prices.get(symbol).copied()
    }

    /// Sets the last-trade price directly, without a trade — used by
    /// `MatchingEngine::update_market_price` (spec.md §4.2 step 6).
    pub fn set_last_price(&mut self, symbol: Symbol, price: Decimal) {
        self.last_trade_prices.insert(symbol, price);
    }

    /// Updates last price, then fires every listener in registration order.
    pub fn notify(&mut self, trade: &Trade) {
        self.last_trade_prices
            .insert(trade.symbol.clone(), trade.price);

        for listener in &self.listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(trade)));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "listener panicked".to_string());
                error!(trade_id = trade.trade_id, %message, "trade listener failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::Side;
    use std::sync::{Arc, Mutex};

    fn sample_trade(symbol: &str, price: Decimal) -> Trade {
        Trade::new(
            Symbol::new(symbol),
            price,
            Decimal::new(1, 0),
            Side::Buy,
            1,
            2,
            Decimal::ZERO,
            Decimal::ZERO,
            "USDT".to_string(),
        )
    }

    #[test]
    fn updates_last_price_and_fires_listeners_in_order() {
        let mut notifier = TradeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_a = seen.clone();
        let seen_b = seen.clone();
        notifier.subscribe(Box::new(move |_t| seen_a.lock().unwrap().push("a")));
        notifier.subscribe(Box::new(move |_t| seen_b.lock().unwrap().push("b")));

        let trade = sample_trade("BTC-USD", Decimal::new(50000, 0));
        notifier.notify(&trade);

        assert_eq!(
            notifier.last_price(&Symbol::new("BTC-USD")),
            Some(Decimal::new(50000, 0))
        );
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn panicking_listener_does_not_stop_later_listeners_or_propagate() {
        let mut notifier = TradeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_b = seen.clone();
        notifier.subscribe(Box::new(|_t| panic!("boom")));
        notifier.subscribe(Box::new(move |_t| seen_b.lock().unwrap().push("b")));

        let trade = sample_trade("BTC-USD", Decimal::new(1, 0));
        notifier.notify(&trade);

        assert_eq!(*seen.lock().unwrap(), vec!["b"]);
    }
}
