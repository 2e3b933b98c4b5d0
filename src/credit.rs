//! Optional pre-trade credit check, invoked before matching for BUY orders.
//!
//! Modeled as a plug-in predicate rather than real account bookkeeping —
//! balances, debits, and credits are an external collaborator's concern
//! (spec.md §1: "authentication and account balance bookkeeping ... modeled
//! only as a pre-trade credit check hook").

use rust_decimal::Decimal;

use crate::orders::{Order, OrderType, Side};

/// `(user_id, currency, required) -> sufficient?`
pub type CreditHook = Box<dyn Fn(&str, &str, Decimal) -> bool + Send + Sync>;

/// True if `order` is subject to the credit check at all: BUY orders of the
/// basic types, per spec.md §4.2 step 1. Conditional orders are parked, not
/// matched, when submitted directly, so they are exempt until triggered —
/// at which point the *derived* order is a plain LIMIT/MARKET order and is
/// subject to the check like any other.
pub fn requires_check(order: &Order) -> bool {
    order.side == Side::Buy
        && matches!(
            order.order_type,
            OrderType::Limit | OrderType::Market | OrderType::Ioc | OrderType::Fok
        )
}

/// `required = price × quantity` for priced orders, else `quantity` as a
/// sentinel (spec.md §4.2 step 1).
pub fn required_amount(order: &Order) -> Decimal {
    match order.price {
        Some(price) => price * order.quantity,
        None => order.quantity,
    }
}
