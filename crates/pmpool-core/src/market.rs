//! Market and pool identification types.
//!
//! A pool is addressed by the triple `(market, outcome, price)` within one
//! [`Book`]. The [`PoolId`] handle is a keccak256 hash of that tuple, so any
//! caller can derive it without a lookup.

use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::price::PriceBps;

/// Binary market identifier (the collaborator's market id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub B256);

impl MarketId {
    pub fn new(id: B256) -> Self {
        Self(id)
    }

    /// Market id from a human-readable label (`keccak256(label)`).
    pub fn from_label(label: &str) -> Self {
        Self(keccak256(label.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// The other side of the market.
    pub fn counter(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Outcome::Yes => 1,
            Outcome::No => 0,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Yes => write!(f, "yes"),
            Outcome::No => write!(f, "no"),
        }
    }
}

/// Which side of the book a pool provides liquidity to.
///
/// - `Ask`: providers sell outcome tokens; takers pay collateral.
/// - `Bid`: providers buy outcome tokens with collateral; takers sell into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Book {
    Ask,
    Bid,
}

impl Book {
    pub fn as_str(&self) -> &'static str {
        match self {
            Book::Ask => "ask",
            Book::Bid => "bid",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Book::Ask => 0xa5,
            Book::Bid => 0xb1,
        }
    }

    /// Token a pool of this book holds as tradable inventory.
    pub fn inventory_token(&self, key: &PoolKey) -> TokenId {
        match self {
            Book::Ask => key.outcome_token(),
            Book::Bid => TokenId::Collateral,
        }
    }

    /// Token takers pay into a pool of this book (the providers' proceeds).
    pub fn yield_token(&self, key: &PoolKey) -> TokenId {
        match self {
            Book::Ask => TokenId::Collateral,
            Book::Bid => key.outcome_token(),
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing pool key: one outcome of one market at one fixed price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub market: MarketId,
    pub outcome: Outcome,
    pub price: PriceBps,
}

impl PoolKey {
    pub fn new(market: MarketId, outcome: Outcome, price: PriceBps) -> Self {
        Self {
            market,
            outcome,
            price,
        }
    }

    /// Deterministic pool handle for this key in `book`.
    pub fn pool_id(&self, book: Book) -> PoolId {
        let mut data = Vec::with_capacity(36);
        data.push(book.tag());
        data.extend_from_slice(self.market.as_bytes());
        data.push(self.outcome.tag());
        data.extend_from_slice(&self.price.bps().to_be_bytes());
        PoolId(keccak256(&data))
    }

    /// Outcome token traded by this pool.
    pub fn outcome_token(&self) -> TokenId {
        TokenId::Outcome(self.market, self.outcome)
    }

    /// The opposite outcome token minted alongside this one.
    pub fn counter_token(&self) -> TokenId {
        TokenId::Outcome(self.market, self.outcome.counter())
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.market, self.outcome, self.price)
    }
}

/// Opaque pool handle (keccak256 of book, market, outcome and price).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub B256);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token handled by the outcome-token collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenId {
    /// The collateral backing every market.
    Collateral,
    /// One outcome token of one market.
    Outcome(MarketId, Outcome),
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenId::Collateral => write!(f, "collateral"),
            TokenId::Outcome(market, outcome) => write!(f, "{market}:{outcome}"),
        }
    }
}
