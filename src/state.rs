//! Shared application state for the HTTP/WS layer.
//!
//! `spec.md` §5 describes a single-writer-per-symbol core with no internal
//! locking. `MatchingEngine` itself stays unlocked; this is where the
//! caller contract is enforced for the async transport: every handler takes
//! the whole-engine write lock for the duration of one `submit`/
//! `update_market_price` call, so serialization is structural within this
//! process, not advisory.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use crate::engine::MatchingEngine;
use crate::fees::FeeConfig;
use crate::store::{Store, StoreError};
use crate::symbol::Symbol;
use crate::trade::Trade;

const TRADE_CHANNEL_CAPACITY: usize = 1024;
const BOOK_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<MatchingEngine>>,
    pub store: Arc<RwLock<Store>>,
    /// Fan-out of every trade as it is produced — decouples the in-core
    /// synchronous notifier from WebSocket I/O (spec.md §9's design note on
    /// listeners).
    pub trade_tx: broadcast::Sender<Trade>,
    /// Signals "this symbol's book changed"; subscribers re-fetch depth.
    pub book_tx: broadcast::Sender<Symbol>,
}

impl AppState {
    pub async fn new(store_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Store::open(store_path)?;
        let (trade_tx, _) = broadcast::channel(TRADE_CHANNEL_CAPACITY);
        let (book_tx, _) = broadcast::channel(BOOK_CHANNEL_CAPACITY);

        Ok(AppState {
            engine: Arc::new(RwLock::new(MatchingEngine::new(FeeConfig::default()))),
            store: Arc::new(RwLock::new(store)),
            trade_tx,
            book_tx,
        })
    }
}
