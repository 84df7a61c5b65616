//! Core domain types for pmpool.
//!
//! This crate provides the fundamental types shared by the pool ledgers:
//! - `MarketId`, `Outcome`: which binary market and which side of it
//! - `PriceBps`: fixed-point price in basis points, exclusive of 0% and 100%
//! - `PoolKey`, `PoolId`, `Book`: pool addressing and deterministic handles
//! - `TokenId`: the collateral token and the outcome tokens of each market

pub mod error;
pub mod market;
pub mod price;

pub use error::{CoreError, CoreResult};
pub use market::{Book, MarketId, Outcome, PoolId, PoolKey, TokenId};
pub use price::{PriceBps, ACC_PRECISION, PRICE_DENOMINATOR};

/// Token amount in collaborator units (typically 18-decimal fixed point).
pub type Amount = alloy::primitives::U256;
