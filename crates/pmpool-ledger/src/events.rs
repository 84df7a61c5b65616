//! Pool events.
//!
//! Published on a broadcast channel after an operation commits; a rejected
//! operation publishes nothing.

use alloy::primitives::{Address, U256};
use pmpool_core::{Book, PoolId, PoolKey};
use serde::Serialize;

/// State change notification for indexers and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// First deposit ever at this key.
    PoolCreated {
        pool_id: PoolId,
        book: Book,
        key: PoolKey,
        timestamp_ms: i64,
    },
    Deposited {
        pool_id: PoolId,
        book: Book,
        owner: Address,
        amount: U256,
        scaled: U256,
        /// Pending proceeds paid out before the position was topped up.
        flushed_yield: U256,
        timestamp_ms: i64,
    },
    Filled {
        pool_id: PoolId,
        book: Book,
        taker: Address,
        recipient: Address,
        /// Inventory units leaving the pool.
        inventory_out: U256,
        /// Proceeds credited to providers.
        yield_in: U256,
        /// The fill consumed the last of the inventory.
        depleted: bool,
        timestamp_ms: i64,
    },
    Claimed {
        pool_id: PoolId,
        book: Book,
        owner: Address,
        amount: U256,
        timestamp_ms: i64,
    },
    Withdrawn {
        pool_id: PoolId,
        book: Book,
        owner: Address,
        amount: U256,
        scaled_removed: U256,
        forfeited_yield: U256,
        merged: bool,
        timestamp_ms: i64,
    },
    ExitedDepleted {
        pool_id: PoolId,
        book: Book,
        owner: Address,
        scaled_removed: U256,
        claimed: U256,
        /// No ownership left; deposits are accepted again.
        pool_reset: bool,
        timestamp_ms: i64,
    },
}

impl PoolEvent {
    pub fn pool_id(&self) -> PoolId {
        match self {
            PoolEvent::PoolCreated { pool_id, .. }
            | PoolEvent::Deposited { pool_id, .. }
            | PoolEvent::Filled { pool_id, .. }
            | PoolEvent::Claimed { pool_id, .. }
            | PoolEvent::Withdrawn { pool_id, .. }
            | PoolEvent::ExitedDepleted { pool_id, .. } => *pool_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::PoolCreated { .. } => "pool_created",
            PoolEvent::Deposited { .. } => "deposited",
            PoolEvent::Filled { .. } => "filled",
            PoolEvent::Claimed { .. } => "claimed",
            PoolEvent::Withdrawn { .. } => "withdrawn",
            PoolEvent::ExitedDepleted { .. } => "exited_depleted",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
