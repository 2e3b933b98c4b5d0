//! `MatchingEngine`: wires the per-symbol order books, the matching core,
//! the conditional-order cascade, the trade notifier, and the optional
//! credit hook behind the external surface from spec.md §6.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::conditional;
use crate::credit::{self, CreditHook};
use crate::errors::EngineError;
use crate::fees::FeeConfig;
use crate::matching;
use crate::notifier::{Listener, TradeNotifier};
use crate::orderbook::{BookView, OrderBook, PersistedBook};
use crate::orders::{Order, OrderId, Side};
use crate::symbol::Symbol;
use crate::trade::Trade;

pub struct MatchingEngine {
    books: HashMap<Symbol, OrderBook>,
    fees: FeeConfig,
    notifier: TradeNotifier,
    credit_hook: Option<CreditHook>,
}

impl MatchingEngine {
    pub fn new(fees: FeeConfig) -> Self {
        Self {
            books: HashMap::new(),
            fees,
            notifier: TradeNotifier::new(),
            credit_hook: None,
        }
    }

    /// Installs the pre-trade credit predicate (spec.md §6
    /// `set_balance_hook`).
    pub fn set_balance_hook(&mut self, hook: CreditHook) {
        self.credit_hook = Some(hook);
    }

    /// Registers a trade listener (spec.md §6 `subscribe_trades`).
    pub fn subscribe_trades(&mut self, listener: Listener) {
        self.notifier.subscribe(listener);
    }

    fn book_mut(&mut self, symbol: &Symbol) -> &mut OrderBook {
        // Auto-creates the book on first reference to an unseen symbol,
        // per spec.md §9's "auto-symbol creation" design note.
        self.books.entry(symbol.clone()).or_default()
    }

    /// Entry point from spec.md §4.2/§6: validates, checks credit, matches,
    /// and drives the conditional cascade. `order.symbol` selects (and, if
    /// unseen, creates) the per-symbol book.
    pub fn submit(&mut self, mut order: Order) -> Result<Vec<Trade>, EngineError> {
        order.validate()?;

        if credit::requires_check(&order) {
            if let Some(hook) = &self.credit_hook {
                let user_id = order.user_id.as_deref().unwrap_or("");
                let required = credit::required_amount(&order);
                if !hook(user_id, &self.fees.fee_currency, required) {
                    return Err(EngineError::InsufficientFunds);
                }
            }
        }

        let symbol = order.symbol.clone();
        let book = self.book_mut(&symbol);
        let mut trades = matching::process(&mut order, book, &self.fees, &mut self.notifier);

        if !trades.is_empty() {
            let cascade = self.drive_conditional_cascade(&symbol);
            trades.extend(cascade);
        }

        Ok(trades)
    }

    /// Re-runs the trigger scan against the symbol's current last-trade
    /// price until a pass produces nothing (spec.md §4.3's iteration rule).
    /// Each triggered order re-enters `matching::process` and may itself
    /// produce trades that move the price further and trigger more orders.
    fn drive_conditional_cascade(&mut self, symbol: &Symbol) -> Vec<Trade> {
        let mut all_trades = Vec::new();

        loop {
            let Some(last_price) = self.notifier.last_price(symbol) else {
                break;
            };
            let book = self.book_mut(symbol);
            let triggered = conditional::collect_triggered(book, last_price);
            if triggered.is_empty() {
                break;
            }

            for mut derived in triggered {
                let book = self.book_mut(symbol);
                let trades =
                    matching::process(&mut derived, book, &self.fees, &mut self.notifier);
                all_trades.extend(trades);
            }
        }

        all_trades
    }

    /// Sets the last-trade price out-of-band and re-scans conditional
    /// queues (spec.md §4.2 step 6, §6 `update_market_price`).
    pub fn update_market_price(&mut self, symbol: &Symbol, price: Decimal) -> Vec<Trade> {
        self.notifier.set_last_price(symbol.clone(), price);
        self.drive_conditional_cascade(symbol)
    }

    /// Cancels a resting LIMIT order (spec.md §6, via `OrderBook::remove`).
    pub fn cancel(&mut self, symbol: &Symbol, price: Decimal, order_id: OrderId, side: Side) -> bool {
        self.book_mut(symbol).remove(price, order_id, side)
    }

    /// Cancels a parked conditional order regardless of its trigger price.
    pub fn cancel_conditional(&mut self, symbol: &Symbol, order_id: OrderId) -> bool {
        self.book_mut(symbol).remove_conditional(order_id)
    }

    /// Cancels `order_id` wherever it rests in `symbol`'s book, without the
    /// caller needing to supply its price or side — the shape an HTTP
    /// `DELETE /orders/{symbol}/{id}` endpoint actually has on hand.
    pub fn cancel_by_id(&mut self, symbol: &Symbol, order_id: OrderId) -> bool {
        self.book_mut(symbol).remove_by_id(order_id)
    }

    pub fn depth(&self, symbol: &Symbol, levels: usize) -> BookView {
        match self.books.get(symbol) {
            Some(book) => book.view(symbol.clone(), levels),
            None => BookView::empty(symbol.clone()),
        }
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.notifier.last_price(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.books.keys()
    }

    /// Persisted snapshot of one symbol's book (spec.md §6 `snapshot`).
    pub fn snapshot(&self, symbol: &Symbol) -> PersistedBook {
        match self.books.get(symbol) {
            Some(book) => book.snapshot(),
            None => OrderBook::new().snapshot(),
        }
    }

    /// Restores a symbol's book from a snapshot (spec.md §6 `restore`). On
    /// malformed input this returns `EngineError::CorruptedSnapshot` and
    /// leaves the symbol with an empty book, per spec.md §7's propagation
    /// policy for restore failures. `PersistedBook` deserializes through
    /// `serde`, so the only failure mode reaching here is a structural
    /// invariant violation (a crossed book) — checked explicitly, since
    /// `serde` itself would already have rejected bad decimals/timestamps.
    pub fn restore(&mut self, symbol: &Symbol, snapshot: PersistedBook) -> Result<(), EngineError> {
        let book = OrderBook::restore(snapshot);
        if book.is_crossed() {
            self.books.insert(symbol.clone(), OrderBook::new());
            return Err(EngineError::CorruptedSnapshot(format!(
                "restored book for {symbol} is crossed"
            )));
        }
        self.books.insert(symbol.clone(), book);
        Ok(())
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(FeeConfig::default())
    }
}
