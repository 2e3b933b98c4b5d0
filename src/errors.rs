use thiserror::Error;

/// Errors surfaced by the matching core's external surface (`MatchingEngine`).
///
/// Internal inconsistencies (e.g. canceling an order that no longer exists)
/// return `false`/`None`, not an error — see `OrderBook::remove`. Listener
/// failures never reach here; they are caught and logged where they occur
/// (`notifier::TradeNotifier::notify`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("corrupted snapshot: {0}")]
    CorruptedSnapshot(String),
}

#[derive(Error, Debug)]
pub enum MarketMakerError {
    #[error("connection error")]
    ConnectError(String),
}
