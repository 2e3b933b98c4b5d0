//! The aggressor matching loop: FOK feasibility, price guards, fee
//! attribution, and residual disposition (spec.md §4.2).
//!
//! Credit checks and the conditional-trigger cascade are one layer up, in
//! `engine.rs` — they need the credit hook and cross-symbol state that this
//! module, scoped to a single symbol's book, does not have.

use rust_decimal::Decimal;

use crate::fees::FeeConfig;
use crate::notifier::TradeNotifier;
use crate::orderbook::OrderBook;
use crate::orders::{Order, OrderType, Side};
use crate::trade::Trade;

/// Runs `order` against `book`, emitting trades to `notifier` as they occur
/// and disposing of any residual per spec.md §4.2 step 4. Mutates `order` in
/// place (its `quantity` becomes the unfilled residual).
pub fn process(
    order: &mut Order,
    book: &mut OrderBook,
    fees: &FeeConfig,
    notifier: &mut TradeNotifier,
) -> Vec<Trade> {
    let mut trades = Vec::new();

    // STOP_LOSS/STOP_LIMIT/TAKE_PROFIT submitted directly never enter the
    // loop; they go straight to parking (spec.md §4.2 step 4 note).
    if order.order_type.is_conditional() {
        book.add_conditional(order.clone());
        return trades;
    }

    if order.order_type == OrderType::Fok && !is_feasible(order, book) {
        return trades;
    }

    run_matching_loop(order, book, fees, notifier, &mut trades);
    dispose_residual(order, book);

    trades
}

/// FOK feasibility scan (spec.md §4.2 step 2), symmetric for BUY and SELL
/// per spec.md §9's open-question resolution. MARKET FOK's "limit" is
/// absent, so feasibility is total resting opposite-side quantity.
fn is_feasible(order: &Order, book: &OrderBook) -> bool {
    let opposite = order.side.opposite();
    let available = book.available_through(opposite, order.price);
    available >= order.quantity
}

fn price_guard_fails(order: &Order, best_opposite_price: Decimal) -> bool {
    match order.order_type {
        OrderType::Market => false,
        OrderType::Limit | OrderType::Ioc | OrderType::Fok => match order.side {
            Side::Buy => order
                .price
                .is_some_and(|limit| limit < best_opposite_price),
            Side::Sell => order
                .price
                .is_some_and(|limit| limit > best_opposite_price),
        },
        OrderType::StopLoss | OrderType::StopLimit | OrderType::TakeProfit => false,
    }
}

fn run_matching_loop(
    order: &mut Order,
    book: &mut OrderBook,
    fees: &FeeConfig,
    notifier: &mut TradeNotifier,
    trades: &mut Vec<Trade>,
) {
    let opposite = order.side.opposite();

    while order.quantity > Decimal::ZERO {
        let Some(best_price) = book.best_price(opposite) else {
            break;
        };

        if price_guard_fails(order, best_price) {
            break;
        }

        let exec_price = best_price;
        let exec_qty = {
            let head = book
                .head_mut(opposite, best_price)
                .expect("best_price implies a non-empty queue");
            let exec_qty = order.quantity.min(head.quantity);

            let trade = Trade::new(
                order.symbol.clone(),
                exec_price,
                exec_qty,
                order.side,
                head.id,
                order.id,
                fees.maker_fee(exec_qty, exec_price),
                fees.taker_fee(exec_qty, exec_price),
                fees.fee_currency.clone(),
            );
            // Trade emission precedes residual decrement (spec.md §4.2
            // step 3, §5's ordering guarantee).
            notifier.notify(&trade);
            trades.push(trade);

            head.quantity -= exec_qty;
            exec_qty
        };

        order.quantity -= exec_qty;
        book.pop_head_if_exhausted(opposite, exec_price);
    }
}

/// Step 4: routes whatever quantity remains on `order` after the matching
/// loop. `order.quantity` already reflects the residual.
fn dispose_residual(order: &Order, book: &mut OrderBook) {
    match order.order_type {
        OrderType::Limit => {
            if order.quantity > Decimal::ZERO {
                book.add(order.clone());
            }
        }
        OrderType::Market | OrderType::Ioc | OrderType::Fok => {
            // Residual discarded: no resting, no partial rest for IOC/FOK.
        }
        OrderType::StopLoss | OrderType::StopLimit | OrderType::TakeProfit => {
            unreachable!("conditional orders short-circuit before the loop")
        }
    }
}
