//! Per-symbol price level book: two ordered price→FIFO-queue maps plus the
//! two conditional-order lists (spec.md §3, §4.1).

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::{Order, OrderId, OrderType, Side};
use crate::symbol::Symbol;

/// Internal enum to unify forward (ascending) and reverse (descending)
/// `BTreeMap` iteration without duplicating the matching/depth walks.
enum EitherIter<'a> {
    Fwd(std::collections::btree_map::Iter<'a, Decimal, VecDeque<Order>>),
    Rev(std::iter::Rev<std::collections::btree_map::Iter<'a, Decimal, VecDeque<Order>>>),
}

impl<'a> Iterator for EitherIter<'a> {
    type Item = (&'a Decimal, &'a VecDeque<Order>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EitherIter::Fwd(iter) => iter.next(),
            EitherIter::Rev(iter) => iter.next(),
        }
    }
}

/// Top-N aggregated resting quantity per side, for the live depth query
/// (spec.md §4.5) and the WebSocket book feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    pub symbol: Symbol,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl BookView {
    pub fn empty(symbol: Symbol) -> Self {
        BookView {
            symbol,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }
}

/// The persisted-snapshot wire shape from spec.md §6: an ordered list of
/// `(price, [orders…])` pairs per side, plus the two conditional lists.
/// Decimals and timestamps round-trip as strings/ISO-8601 via `Order`'s and
/// `Decimal`'s own `serde` implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedBook {
    pub bids: Vec<(Decimal, Vec<Order>)>,
    pub asks: Vec<(Decimal, Vec<Order>)>,
    pub stop_orders: Vec<Order>,
    pub take_profit_orders: Vec<Order>,
}

pub struct OrderBook {
    /// Buy orders, keyed ascending; walked in reverse for best-first order.
    pub bids: BTreeMap<Decimal, VecDeque<Order>>,
    /// Sell orders, keyed ascending; walked forward for best-first order.
    pub asks: BTreeMap<Decimal, VecDeque<Order>>,
    /// STOP_LOSS/STOP_LIMIT orders awaiting trigger, in arrival order.
    pub stop_orders: Vec<Order>,
    /// TAKE_PROFIT orders awaiting trigger, in arrival order.
    pub take_profit_orders: Vec<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            stop_orders: Vec::new(),
            take_profit_orders: Vec::new(),
        }
    }

    fn side_map(&self, side: Side) -> &BTreeMap<Decimal, VecDeque<Order>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, VecDeque<Order>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best price and the FIFO head at that price for `side`, or `None` if
    /// that side is empty. O(log L) for the price lookup.
    pub fn best(&self, side: Side) -> Option<(Decimal, &Order)> {
        match side {
            Side::Buy => self.bids.iter().next_back(),
            Side::Sell => self.asks.iter().next(),
        }
        .and_then(|(price, queue)| queue.front().map(|order| (*price, order)))
    }

    pub fn best_price(&self, side: Side) -> Option<Decimal> {
        match side {
            Side::Buy => self.bids.keys().next_back().copied(),
            Side::Sell => self.asks.keys().next().copied(),
        }
    }

    /// Iterates price levels of `side` best-first: descending for bids,
    /// ascending for asks.
    fn levels_best_first(&self, side: Side) -> impl Iterator<Item = (&Decimal, &VecDeque<Order>)> {
        match side {
            Side::Buy => EitherIter::Rev(self.bids.iter().rev()),
            Side::Sell => EitherIter::Fwd(self.asks.iter()),
        }
    }

    fn levels_best_first_mut(
        &mut self,
        side: Side,
    ) -> Box<dyn Iterator<Item = (&Decimal, &mut VecDeque<Order>)> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.iter_mut().rev()),
            Side::Sell => Box::new(self.asks.iter_mut()),
        }
    }

    /// Total resting quantity on `side` at prices not worse than `limit`
    /// (for BUY: ask price ≤ limit; for SELL: bid price ≥ limit), or the
    /// whole side if `limit` is `None` (MARKET FOK feasibility — spec.md
    /// §9's open question, resolved as "take from the top until filled").
    pub fn available_through(&self, side: Side, limit: Option<Decimal>) -> Decimal {
        let mut total = Decimal::ZERO;
        for (&price, queue) in self.levels_best_first(side) {
            if let Some(limit) = limit {
                let beyond = match side {
                    Side::Buy => price < limit,
                    Side::Sell => price > limit,
                };
                if beyond {
                    break;
                }
            }
            for order in queue {
                total += order.quantity;
            }
        }
        total
    }

    /// Mutable access to the FIFO head resting at `price` on `side`, for the
    /// matching loop's partial-decrement step.
    pub fn head_mut(&mut self, side: Side, price: Decimal) -> Option<&mut Order> {
        self.side_map_mut(side)
            .get_mut(&price)
            .and_then(|queue| queue.front_mut())
    }

    /// Pops the FIFO head at `price` on `side` if it has been fully
    /// exhausted, pruning the level if it empties (spec.md §4.2 step 3).
    pub fn pop_head_if_exhausted(&mut self, side: Side, price: Decimal) {
        let book = self.side_map_mut(side);
        let Some(queue) = book.get_mut(&price) else {
            return;
        };
        if queue
            .front()
            .is_some_and(|head| head.quantity <= Decimal::ZERO)
        {
            queue.pop_front();
        }
        if queue.is_empty() {
            book.remove(&price);
        }
    }

    /// Appends a LIMIT (or triggered LIMIT) order to the tail of its price
    /// level's queue, creating the level if needed.
    pub fn add(&mut self, order: Order) {
        let side = order.side;
        self.side_map_mut(side)
            .entry(order.price.expect("resting orders always carry a price"))
            .or_default()
            .push_back(order);
    }

    /// Appends a stop or take-profit order to its conditional list.
    pub fn add_conditional(&mut self, order: Order) {
        match order.order_type {
            OrderType::StopLoss | OrderType::StopLimit => self.stop_orders.push(order),
            OrderType::TakeProfit => self.take_profit_orders.push(order),
            _ => panic!("add_conditional called with a non-conditional order type"),
        }
    }

    /// Removes the order with `order_id` resting at `price` on `side`.
    /// O(q) in the queue length at that price. Prunes the level if it
    /// empties. Returns whether a removal occurred — no error on a miss,
    /// per spec.md §7.
    pub fn remove(&mut self, price: Decimal, order_id: OrderId, side: Side) -> bool {
        let book = self.side_map_mut(side);
        let Some(queue) = book.get_mut(&price) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|o| o.id == order_id) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            book.remove(&price);
        }
        true
    }

    /// Removes the order with `order_id` from wherever it rests — either
    /// side's price levels or either conditional list — without the caller
    /// needing to know its price or side up front. Used by the HTTP cancel
    /// endpoint, which only has an order id; the typed `remove`/
    /// `remove_conditional` above implement spec.md §4.1's literal
    /// `remove(price, order_id, side)` signature for callers that already
    /// track that state.
    pub fn remove_by_id(&mut self, order_id: OrderId) -> bool {
        for side in [Side::Buy, Side::Sell] {
            let hit = self
                .side_map(side)
                .iter()
                .find_map(|(&price, queue)| {
                    queue.iter().any(|o| o.id == order_id).then_some(price)
                });
            if let Some(price) = hit {
                return self.remove(price, order_id, side);
            }
        }
        self.remove_conditional(order_id)
    }

    /// Removes a conditional order by id from whichever list it's waiting
    /// in, regardless of type.
    pub fn remove_conditional(&mut self, order_id: OrderId) -> bool {
        if let Some(pos) = self.stop_orders.iter().position(|o| o.id == order_id) {
            self.stop_orders.remove(pos);
            return true;
        }
        if let Some(pos) = self
            .take_profit_orders
            .iter()
            .position(|o| o.id == order_id)
        {
            self.take_profit_orders.remove(pos);
            return true;
        }
        false
    }

    /// Top `levels` price levels per side, aggregated, best-first.
    pub fn depth(&self, levels: usize) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        let agg = |queue: &VecDeque<Order>| queue.iter().fold(Decimal::ZERO, |a, o| a + o.quantity);
        let bids = self
            .levels_best_first(Side::Buy)
            .take(levels)
            .map(|(&price, q)| (price, agg(q)))
            .collect();
        let asks = self
            .levels_best_first(Side::Sell)
            .take(levels)
            .map(|(&price, q)| (price, agg(q)))
            .collect();
        (bids, asks)
    }

    pub fn view(&self, symbol: Symbol, levels: usize) -> BookView {
        let (bids, asks) = self.depth(levels);
        BookView {
            symbol,
            bids,
            asks,
        }
    }

    /// No side is crossed: best bid strictly below best ask, when both
    /// exist (spec.md §3, §8).
    pub fn is_crossed(&self) -> bool {
        match (self.best_price(Side::Buy), self.best_price(Side::Sell)) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// No occupied price level is empty (spec.md §3, §8) — used by tests.
    pub fn has_empty_level(&self) -> bool {
        self.bids.values().any(|q| q.is_empty()) || self.asks.values().any(|q| q.is_empty())
    }

    pub fn snapshot(&self) -> PersistedBook {
        PersistedBook {
            bids: self
                .bids
                .iter()
                .map(|(&p, q)| (p, q.iter().cloned().collect()))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(&p, q)| (p, q.iter().cloned().collect()))
                .collect(),
            stop_orders: self.stop_orders.clone(),
            take_profit_orders: self.take_profit_orders.clone(),
        }
    }

    pub fn restore(snapshot: PersistedBook) -> Self {
        let mut book = OrderBook::new();
        for (price, orders) in snapshot.bids {
            book.bids.insert(price, orders.into_iter().collect());
        }
        for (price, orders) in snapshot.asks {
            book.asks.insert(price, orders.into_iter().collect());
        }
        book.stop_orders = snapshot.stop_orders;
        book.take_profit_orders = snapshot.take_profit_orders;
        book
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
pub fn order_timestamp(order: &Order) -> DateTime<Utc> {
    order.timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderType;

    fn limit(id: OrderId, side: Side, price: i64, qty: i64) -> Order {
        let mut o = Order::new(
            Symbol::new("BTC-USD"),
            OrderType::Limit,
            side,
            Decimal::new(qty, 0),
            Some(Decimal::new(price, 0)),
            None,
            None,
        );
        o.id = id;
        o
    }

    #[test]
    fn empty_levels_are_pruned_on_full_removal() {
        let mut ob = OrderBook::new();
        let order = limit(1, Side::Buy, 100, 5);
        ob.add(order);
        assert!(ob.remove(Decimal::new(100, 0), 1, Side::Buy));
        assert!(!ob.bids.contains_key(&Decimal::new(100, 0)));
    }

    #[test]
    fn best_is_highest_bid_lowest_ask() {
        let mut ob = OrderBook::new();
        ob.add(limit(1, Side::Buy, 99, 1));
        ob.add(limit(2, Side::Buy, 101, 1));
        ob.add(limit(3, Side::Sell, 105, 1));
        ob.add(limit(4, Side::Sell, 103, 1));

        assert_eq!(ob.best_price(Side::Buy), Some(Decimal::new(101, 0)));
        assert_eq!(ob.best_price(Side::Sell), Some(Decimal::new(103, 0)));
    }

    #[test]
    fn depth_is_sorted_best_first_each_side() {
        let mut ob = OrderBook::new();
        ob.add(limit(1, Side::Buy, 99, 1));
        ob.add(limit(2, Side::Buy, 101, 1));
        ob.add(limit(3, Side::Sell, 105, 1));
        ob.add(limit(4, Side::Sell, 103, 1));

        let (bids, asks) = ob.depth(10);
        assert_eq!(bids[0].0, Decimal::new(101, 0));
        assert_eq!(bids[1].0, Decimal::new(99, 0));
        assert_eq!(asks[0].0, Decimal::new(103, 0));
        assert_eq!(asks[1].0, Decimal::new(105, 0));
    }

    #[test]
    fn conditional_orders_queue_in_arrival_order() {
        let mut ob = OrderBook::new();
        let mut stop_sell = |stop: i64| {
            let mut o = Order::new(
                Symbol::new("BTC-USD"),
                OrderType::StopLoss,
                Side::Sell,
                Decimal::new(1, 0),
                None,
                Some(Decimal::new(stop, 0)),
                None,
            );
            o.id = stop as u128;
            o
        };
        ob.add_conditional(stop_sell(49000));
        ob.add_conditional(stop_sell(51000));
        ob.add_conditional(stop_sell(50000));

        let prices: Vec<_> = ob
            .stop_orders
            .iter()
            .map(|o| o.stop_price.unwrap())
            .collect();
        assert_eq!(
            prices,
            vec![
                Decimal::new(49000, 0),
                Decimal::new(51000, 0),
                Decimal::new(50000, 0)
            ]
        );
    }
}
