//! Immutable execution records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::{OrderId, Side};
use crate::symbol::Symbol;

/// A matched transaction between a resting (maker) and incoming (taker) order.
///
/// - `price` is always the maker's resting price — price improvement flows
///   to the taker (spec.md §4.2 step 3).
/// - `maker_fee`/`taker_fee` are `quantity × price × rate_for_role`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u128,
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub price: Decimal,
    pub quantity: Decimal,
    pub aggressor_side: Side,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub fee_currency: String,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        price: Decimal,
        quantity: Decimal,
        aggressor_side: Side,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_fee: Decimal,
        taker_fee: Decimal,
        fee_currency: String,
    ) -> Self {
        Trade {
            trade_id: Uuid::new_v4().as_u128(),
            timestamp: Utc::now(),
            symbol,
            price,
            quantity,
            aggressor_side,
            maker_order_id,
            taker_order_id,
            maker_fee,
            taker_fee,
            fee_currency,
        }
    }
}
