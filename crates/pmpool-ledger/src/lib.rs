//! Shared-liquidity pool accounting for binary prediction markets.
//!
//! Providers pool standing offers at a fixed price; takers fill them in any
//! size; providers withdraw or claim at any time. Each operation costs O(1) in
//! the number of providers sharing a pool.
//!
//! - `accounting`: scaled units and the yield accumulator
//! - `book`: pool arena and the operations both books share
//! - `ask` / `bid`: book-specific funding and fill pricing
//! - `settlement`: compensating execution against the token collaborator
//! - `engine`: reentrancy-guarded, all-or-nothing entry point

pub mod accounting;
pub mod ask;
pub mod bid;
pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod settlement;
pub mod tokens;

pub use accounting::{PoolState, PoolStatus, Position};
pub use ask::{AskDeposit, AskFill, AskFunding, AskLedger};
pub use bid::{BidDeposit, BidFill, BidLedger};
pub use book::{
    DepositReceipt, ExitReceipt, FillReceipt, PoolBook, PoolRecord, PoolView, PositionView,
    Transition, WithdrawReceipt,
};
pub use config::EngineConfig;
pub use engine::{PoolEngine, SolvencyReport, TokenSolvency};
pub use error::{LedgerError, LedgerResult, TokenError, TokenResult};
pub use events::PoolEvent;
pub use settlement::{settle, SettlementStep};
pub use tokens::{InMemoryTokens, OutcomeTokens};
