//! Value movement against the outcome-token collaborator.
//!
//! An operation produces an ordered list of [`SettlementStep`]s. Steps run in
//! order; if one fails, the steps already applied are reversed newest-first
//! and the original error is returned, so the operation as a whole either
//! moves all of its value or none of it.

use alloy::primitives::{Address, U256};
use pmpool_core::{MarketId, TokenId};
use pmpool_telemetry::Metrics;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::TokenResult;
use crate::tokens::OutcomeTokens;

/// One collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SettlementStep {
    Transfer {
        token: TokenId,
        from: Address,
        to: Address,
        amount: U256,
    },
    MintPair {
        account: Address,
        market: MarketId,
        amount: U256,
    },
    BurnPair {
        account: Address,
        market: MarketId,
        amount: U256,
    },
}

impl SettlementStep {
    pub fn transfer(token: TokenId, from: Address, to: Address, amount: U256) -> Self {
        Self::Transfer {
            token,
            from,
            to,
            amount,
        }
    }

    /// Zero-amount steps and self-transfers are skipped.
    pub fn is_noop(&self) -> bool {
        match self {
            SettlementStep::Transfer {
                from, to, amount, ..
            } => amount.is_zero() || from == to,
            SettlementStep::MintPair { amount, .. } | SettlementStep::BurnPair { amount, .. } => {
                amount.is_zero()
            }
        }
    }

    /// The step that undoes this one.
    pub fn inverse(&self) -> Self {
        match *self {
            SettlementStep::Transfer {
                token,
                from,
                to,
                amount,
            } => SettlementStep::Transfer {
                token,
                from: to,
                to: from,
                amount,
            },
            SettlementStep::MintPair {
                account,
                market,
                amount,
            } => SettlementStep::BurnPair {
                account,
                market,
                amount,
            },
            SettlementStep::BurnPair {
                account,
                market,
                amount,
            } => SettlementStep::MintPair {
                account,
                market,
                amount,
            },
        }
    }

    fn apply<T: OutcomeTokens + ?Sized>(&self, tokens: &T) -> TokenResult<()> {
        match *self {
            SettlementStep::Transfer {
                token,
                from,
                to,
                amount,
            } => tokens.transfer(token, from, to, amount),
            SettlementStep::MintPair {
                account,
                market,
                amount,
            } => tokens.mint_pair(account, market, amount),
            SettlementStep::BurnPair {
                account,
                market,
                amount,
            } => tokens.burn_pair(account, market, amount),
        }
    }
}

/// Execute `steps` in order, reversing applied steps on the first failure.
pub fn settle<T: OutcomeTokens + ?Sized>(tokens: &T, steps: &[SettlementStep]) -> TokenResult<()> {
    let mut applied: Vec<&SettlementStep> = Vec::with_capacity(steps.len());

    for step in steps.iter().filter(|s| !s.is_noop()) {
        if let Err(e) = step.apply(tokens) {
            warn!(
                ?step,
                error = %e,
                applied = applied.len(),
                "Settlement step failed, compensating"
            );
            compensate(tokens, &applied);
            return Err(e);
        }
        applied.push(step);
    }

    Ok(())
}

fn compensate<T: OutcomeTokens + ?Sized>(tokens: &T, applied: &[&SettlementStep]) {
    for step in applied.iter().rev() {
        let inverse = step.inverse();
        if let Err(e) = inverse.apply(tokens) {
            // Only reachable if the collaborator breaks atomicity between calls
            error!(step = ?inverse, error = %e, "Compensation step failed");
        }
    }
    Metrics::compensated(applied.len() as u64);
}
