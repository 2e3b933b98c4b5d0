//! Order descriptors: immutable on the wire, but `quantity` is mutated
//! downward in place while an order rests in or walks through the book —
//! it represents the residual, not the original size.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::symbol::Symbol;

pub type OrderId = u128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Ioc,
    Fok,
    StopLoss,
    StopLimit,
    TakeProfit,
}

impl OrderType {
    /// STOP_LOSS/STOP_LIMIT/TAKE_PROFIT never enter the matching loop when
    /// submitted directly — they go straight to residual disposition
    /// (parking in the book's conditional lists). See spec.md §4.2 step 4.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            OrderType::StopLoss | OrderType::StopLimit | OrderType::TakeProfit
        )
    }
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Next value of the strictly-increasing arrival counter (spec.md §3:
/// "either a strictly-increasing monotonic counter or stable insertion
/// order suffices").
pub fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

fn next_order_id() -> OrderId {
    Uuid::new_v4().as_u128()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub side: Side,
    /// Residual quantity; decremented in place during matching.
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    /// Arrival sequence; breaks ties at a price level (FIFO).
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Subject of the pre-trade credit check, if one is configured.
    pub user_id: Option<String>,
}

impl Order {
    /// Builds an order, assigning an id and arrival sequence if not already set.
    pub fn new(
        symbol: Symbol,
        order_type: OrderType,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
        take_profit_price: Option<Decimal>,
    ) -> Self {
        Order {
            id: next_order_id(),
            symbol,
            order_type,
            side,
            quantity,
            price,
            stop_price,
            take_profit_price,
            sequence: next_sequence(),
            timestamp: Utc::now(),
            user_id: None,
        }
    }

    /// Derives a triggered order from a conditional original, per spec.md
    /// §4.3: same side/quantity/symbol, a derived id, a fresh sequence (it
    /// is a new arrival at the book), and the synthesized type/price.
    pub fn derive_triggered(
        original: &Order,
        order_type: OrderType,
        price: Option<Decimal>,
    ) -> Self {
        Order {
            id: next_order_id(),
            symbol: original.symbol.clone(),
            order_type,
            side: original.side,
            quantity: original.quantity,
            price,
            stop_price: None,
            take_profit_price: None,
            sequence: next_sequence(),
            timestamp: Utc::now(),
            user_id: original.user_id.clone(),
        }
    }

    /// Validates admission invariants from spec.md §3: positive quantity,
    /// positive price for price-bearing types, required trigger prices for
    /// conditional types. Rejects before the order ever touches the book.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(
                "quantity must be positive".to_string(),
            ));
        }

        match self.order_type {
            OrderType::Limit => {
                if self.price.is_none_or(|p| p <= Decimal::ZERO) {
                    return Err(EngineError::InvalidOrder(
                        "price is required and must be positive for LIMIT".to_string(),
                    ));
                }
            }
            OrderType::Fok | OrderType::Ioc => {
                if let Some(price) = self.price {
                    if price <= Decimal::ZERO {
                        return Err(EngineError::InvalidOrder(
                            "price must be positive when present".to_string(),
                        ));
                    }
                }
            }
            OrderType::Market => {}
            OrderType::StopLoss => {
                if self.stop_price.is_none_or(|p| p <= Decimal::ZERO) {
                    return Err(EngineError::InvalidOrder(
                        "stop_price is required and must be positive for STOP_LOSS".to_string(),
                    ));
                }
            }
            OrderType::StopLimit => {
                if self.stop_price.is_none_or(|p| p <= Decimal::ZERO) {
                    return Err(EngineError::InvalidOrder(
                        "stop_price is required and must be positive for STOP_LIMIT".to_string(),
                    ));
                }
                if self.price.is_none_or(|p| p <= Decimal::ZERO) {
                    return Err(EngineError::InvalidOrder(
                        "price is required and must be positive for STOP_LIMIT".to_string(),
                    ));
                }
            }
            OrderType::TakeProfit => {
                if self.take_profit_price.is_none_or(|p| p <= Decimal::ZERO) {
                    return Err(EngineError::InvalidOrder(
                        "take_profit_price is required and must be positive for TAKE_PROFIT"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(order_type: OrderType, quantity: Decimal, price: Option<Decimal>) -> Order {
        let mut o = Order::new(
            Symbol::new("BTC-USD"),
            order_type,
            Side::Buy,
            quantity,
            price,
            None,
            None,
        );
        o.stop_price = None;
        o
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let o = sample(OrderType::Market, Decimal::ZERO, None);
        assert!(o.validate().is_err());
    }

    #[test]
    fn rejects_missing_price_for_limit_when_zero() {
        let o = sample(OrderType::Limit, Decimal::new(1, 0), Some(Decimal::ZERO));
        assert!(o.validate().is_err());
    }

    #[test]
    fn rejects_limit_with_no_price() {
        let o = sample(OrderType::Limit, Decimal::new(1, 0), None);
        assert!(o.validate().is_err());
    }

    #[test]
    fn ioc_and_fok_may_omit_price() {
        let ioc = sample(OrderType::Ioc, Decimal::new(1, 0), None);
        assert!(ioc.validate().is_ok());
        let fok = sample(OrderType::Fok, Decimal::new(1, 0), None);
        assert!(fok.validate().is_ok());
    }

    #[test]
    fn market_order_needs_no_price() {
        let o = sample(OrderType::Market, Decimal::new(1, 0), None);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn stop_limit_requires_both_stop_and_limit_price() {
        let mut o = sample(
            OrderType::StopLimit,
            Decimal::new(1, 0),
            Some(Decimal::new(48900, 0)),
        );
        assert!(o.validate().is_err(), "missing stop_price should fail");
        o.stop_price = Some(Decimal::new(49000, 0));
        assert!(o.validate().is_ok());
    }
}
