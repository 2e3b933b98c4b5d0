//! Trigger rules and synthesis for STOP_LOSS/STOP_LIMIT/TAKE_PROFIT orders
//! (spec.md §4.3). The repeat-until-dry cascade loop itself lives on
//! `MatchingEngine`, since re-entering the matching core needs `FeeConfig`
//! and the notifier; this module is the pure trigger-rule/synthesis layer.

use rust_decimal::Decimal;

use crate::orderbook::OrderBook;
use crate::orders::{Order, OrderType, Side};

fn stop_triggers(order: &Order, last_price: Decimal) -> bool {
    let stop = order
        .stop_price
        .expect("stop orders always carry a stop_price");
    match order.side {
        Side::Buy => last_price >= stop,
        Side::Sell => last_price <= stop,
    }
}

fn take_profit_triggers(order: &Order, last_price: Decimal) -> bool {
    let target = order
        .take_profit_price
        .expect("take-profit orders always carry a take_profit_price");
    match order.side {
        Side::Buy => last_price <= target,
        Side::Sell => last_price >= target,
    }
}

/// Synthesizes the derived order a triggered conditional becomes, per
/// spec.md §4.3's three synthesis rules.
fn synthesize(original: &Order) -> Order {
    match original.order_type {
        OrderType::StopLimit => {
            Order::derive_triggered(original, OrderType::Limit, original.price)
        }
        OrderType::StopLoss => Order::derive_triggered(original, OrderType::Market, None),
        OrderType::TakeProfit => {
            let price = original.price.or(original.take_profit_price);
            Order::derive_triggered(original, OrderType::Limit, price)
        }
        other => panic!("synthesize called with non-conditional order type {other:?}"),
    }
}

/// One scan pass: removes every stop/take-profit order in `book` whose
/// trigger condition holds against `last_price`, returning the synthesized
/// orders ready for re-entry into the matching core.
///
/// Each conditional list holds both BUY- and SELL-side orders in arrival
/// order, so a triggered order can sit anywhere in the list; this is a
/// full linear pass over each list, not a sorted-list short-circuit.
pub fn collect_triggered(book: &mut OrderBook, last_price: Decimal) -> Vec<Order> {
    let mut triggered = Vec::new();

    let mut i = 0;
    while i < book.stop_orders.len() {
        if stop_triggers(&book.stop_orders[i], last_price) {
            let order = book.stop_orders.remove(i);
            triggered.push(synthesize(&order));
        } else {
            i += 1;
        }
    }

    let mut i = 0;
    while i < book.take_profit_orders.len() {
        if take_profit_triggers(&book.take_profit_orders[i], last_price) {
            let order = book.take_profit_orders.remove(i);
            triggered.push(synthesize(&order));
        } else {
            i += 1;
        }
    }

    triggered
}
