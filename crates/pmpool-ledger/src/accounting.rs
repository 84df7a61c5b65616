//! Scaled-unit accounting shared by the ask and bid ledgers.
//!
//! Each pool keeps four aggregates; each provider keeps a scaled balance and
//! a yield checkpoint. Everything a provider is owed derives from those two
//! numbers and the pool aggregates, so no operation walks the provider set:
//!
//! ```text
//! scaled_for(amount) = total_scaled == 0 ? amount : amount * total_scaled / total_inventory
//! withdrawable       = scaled * total_inventory / total_scaled
//! pending            = scaled * (acc_yield_per_scaled - yield_debt) / ACC_PRECISION
//! accrue(payment)    : acc_yield_per_scaled += payment * ACC_PRECISION / total_scaled
//! ```
//!
//! All divisions round down except where noted; the rounding always favours
//! the pool over the individual provider.

use alloy::primitives::U256;
use pmpool_core::{ACC_PRECISION, PRICE_DENOMINATOR};
use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};

/// `a * b / d`, rounded down.
pub(crate) fn mul_div(a: U256, b: U256, d: U256, ctx: &'static str) -> LedgerResult<U256> {
    if d.is_zero() {
        return Err(LedgerError::Overflow(ctx));
    }
    a.checked_mul(b).map(|n| n / d).ok_or(LedgerError::Overflow(ctx))
}

/// `a * b / d`, rounded up.
pub(crate) fn mul_div_up(a: U256, b: U256, d: U256, ctx: &'static str) -> LedgerResult<U256> {
    if d.is_zero() {
        return Err(LedgerError::Overflow(ctx));
    }
    let n = a.checked_mul(b).ok_or(LedgerError::Overflow(ctx))?;
    let q = n / d;
    if (n % d).is_zero() {
        Ok(q)
    } else {
        Ok(q + U256::from(1))
    }
}

pub(crate) fn add(a: U256, b: U256, ctx: &'static str) -> LedgerResult<U256> {
    a.checked_add(b).ok_or(LedgerError::Overflow(ctx))
}

pub(crate) fn sub(a: U256, b: U256, ctx: &'static str) -> LedgerResult<U256> {
    a.checked_sub(b).ok_or(LedgerError::Overflow(ctx))
}

/// Largest fill allowed against `available` under an optional bps cap.
pub(crate) fn fill_cap(available: U256, max_fill_bps: Option<u16>) -> LedgerResult<U256> {
    match max_fill_bps {
        None => Ok(available),
        Some(bps) if bps == 0 || bps > PRICE_DENOMINATOR => Err(LedgerError::InvalidAmount(
            format!("max_fill_bps {bps} outside [1, {PRICE_DENOMINATOR}]"),
        )),
        Some(bps) => mul_div(
            available,
            U256::from(bps),
            U256::from(PRICE_DENOMINATOR),
            "fill cap",
        ),
    }
}

// ============================================================================
// PoolState
// ============================================================================

/// Lifecycle state of a pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    /// No outstanding ownership; deposits accepted.
    Empty,
    /// Inventory available; every operation accepted.
    Active,
    /// Inventory fully consumed while ownership remains; only claim and exit.
    Depleted,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Empty => "empty",
            PoolStatus::Active => "active",
            PoolStatus::Depleted => "depleted",
        }
    }
}

/// Pool-wide aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolState {
    /// Unfilled tradable units held by the pool.
    pub total_inventory: U256,
    /// Sum of every provider's scaled units. Constant across fills.
    pub total_scaled: U256,
    /// Cumulative proceeds per scaled unit, times `ACC_PRECISION`.
    pub acc_yield_per_scaled: U256,
    /// Lifetime proceeds paid in by takers.
    pub total_yield_earned: U256,
    /// Lifetime proceeds paid out to providers.
    pub total_yield_claimed: U256,
    /// Lifetime pending proceeds discarded by withdraw-without-claim.
    pub total_yield_forfeited: U256,
}

impl PoolState {
    pub fn status(&self) -> PoolStatus {
        if self.total_scaled.is_zero() {
            PoolStatus::Empty
        } else if self.total_inventory.is_zero() {
            PoolStatus::Depleted
        } else {
            PoolStatus::Active
        }
    }

    #[inline]
    pub fn is_depleted(&self) -> bool {
        self.status() == PoolStatus::Depleted
    }

    /// Scaled units minted for a deposit of `amount`.
    ///
    /// Preserves the unfilled amount attributable to every existing provider.
    /// Must not be called on a depleted pool.
    pub fn scaled_for_deposit(&self, amount: U256) -> LedgerResult<U256> {
        if self.total_scaled.is_zero() {
            return Ok(amount);
        }
        mul_div(
            amount,
            self.total_scaled,
            self.total_inventory,
            "deposit scaling",
        )
    }

    /// Unfilled inventory attributable to `scaled` units.
    pub fn withdrawable(&self, scaled: U256) -> LedgerResult<U256> {
        if self.total_scaled.is_zero() {
            return Ok(U256::ZERO);
        }
        mul_div(
            scaled,
            self.total_inventory,
            self.total_scaled,
            "withdrawable",
        )
    }

    /// Accumulator increment a payment of `payment` would produce.
    pub fn accrual_for(&self, payment: U256) -> LedgerResult<U256> {
        mul_div(payment, ACC_PRECISION, self.total_scaled, "yield accrual")
    }

    /// Credit taker proceeds to every provider at once.
    ///
    /// Returns the accumulator increment. Zero means the payment is too small
    /// to be attributed to anyone and callers should reject the fill.
    pub fn accrue(&mut self, payment: U256) -> LedgerResult<U256> {
        let delta = self.accrual_for(payment)?;
        self.acc_yield_per_scaled = add(self.acc_yield_per_scaled, delta, "yield accumulator")?;
        self.total_yield_earned = add(self.total_yield_earned, payment, "yield earned")?;
        Ok(delta)
    }

    /// Proceeds earned by `position` since its last checkpoint.
    pub fn pending(&self, position: &Position) -> LedgerResult<U256> {
        position.pending(self.acc_yield_per_scaled)
    }
}

// ============================================================================
// Position
// ============================================================================

/// One provider's stake in one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Scaled ownership units.
    pub scaled: U256,
    /// Accumulator value at the last checkpoint.
    pub yield_debt: U256,
}

impl Position {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scaled.is_zero()
    }

    /// Proceeds earned since the last checkpoint at accumulator value `acc`.
    pub fn pending(&self, acc: U256) -> LedgerResult<U256> {
        let delta = sub(acc, self.yield_debt, "yield debt")?;
        mul_div(self.scaled, delta, ACC_PRECISION, "pending yield")
    }

    /// Move the checkpoint to `acc`, discarding anything pending.
    #[inline]
    pub fn checkpoint(&mut self, acc: U256) {
        self.yield_debt = acc;
    }
}
