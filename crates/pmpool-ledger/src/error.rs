//! Ledger error types.

use alloy::primitives::{Address, U256};
use pmpool_core::{CoreError, PoolId, TokenId};
use thiserror::Error;

/// Failure reported by the outcome-token collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Insufficient {token} balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: Address,
        token: TokenId,
        needed: U256,
        available: U256,
    },

    #[error("Token operation rejected: {0}")]
    Rejected(String),
}

pub type TokenResult<T> = Result<T, TokenError>;

/// Rejection of a ledger operation.
///
/// Every variant rejects the whole operation; no state change survives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Pool exhausted: {0}")]
    PoolExhausted(PoolId),

    #[error("Pool not depleted: {0}")]
    NotDepleted(PoolId),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Fill rounds to zero")]
    ZeroFill,

    #[error("Unauthorized: {caller} may not act for {owner}")]
    Unauthorized { caller: Address, owner: Address },

    #[error("Reentrant call rejected")]
    ReentrantCall,

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Settlement failed: {0}")]
    Settlement(#[from] TokenError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::PoolExhausted(_) => "pool_exhausted",
            LedgerError::NotDepleted(_) => "not_depleted",
            LedgerError::LimitExceeded(_) => "limit_exceeded",
            LedgerError::ZeroFill => "zero_fill",
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::ReentrantCall => "reentrant_call",
            LedgerError::Overflow(_) => "overflow",
            LedgerError::Settlement(_) => "settlement",
            LedgerError::Config(_) => "config",
            LedgerError::Core(_) => "core",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
