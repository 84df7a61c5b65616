//! Fixed-point pool prices.
//!
//! Prices are integers in basis points of one unit of collateral per outcome
//! unit. `PRICE_DENOMINATOR` is 100%; valid pool prices exclude both 0% and
//! 100%, so every pool price has a valid complement on the other outcome.

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Price scale: 10_000 basis points = 1 collateral unit per outcome unit.
pub const PRICE_DENOMINATOR: u16 = 10_000;

/// Fixed-point multiplier applied to the per-scaled-unit yield accumulator (1e18).
pub const ACC_PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Pool price in basis points, always in `[1, PRICE_DENOMINATOR - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct PriceBps(u16);

impl PriceBps {
    /// Lowest valid price (0.01%).
    pub const MIN: Self = Self(1);
    /// Highest valid price (99.99%).
    pub const MAX: Self = Self(PRICE_DENOMINATOR - 1);

    pub fn new(bps: u16) -> CoreResult<Self> {
        if bps == 0 || bps >= PRICE_DENOMINATOR {
            return Err(CoreError::InvalidPrice(format!(
                "{bps} bps outside [1, {}]",
                PRICE_DENOMINATOR - 1
            )));
        }
        Ok(Self(bps))
    }

    /// Build from a probability such as `0.65`.
    ///
    /// The probability must land exactly on a basis point; no rounding is applied.
    pub fn from_probability(probability: Decimal) -> CoreResult<Self> {
        let bps = probability * Decimal::from(PRICE_DENOMINATOR);
        if !bps.fract().is_zero() {
            return Err(CoreError::InvalidProbability(format!(
                "{probability} is not a whole number of basis points"
            )));
        }
        let bps = bps
            .to_u16()
            .ok_or_else(|| CoreError::InvalidProbability(probability.to_string()))?;
        Self::new(bps)
    }

    #[inline]
    pub fn bps(&self) -> u16 {
        self.0
    }

    /// Price as a probability in `(0, 1)`.
    #[inline]
    pub fn probability(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 4)
    }

    /// Price of the other outcome at the same level (`100% - self`).
    #[inline]
    pub fn complement(&self) -> Self {
        Self(PRICE_DENOMINATOR - self.0)
    }

    /// Collateral owed for `shares` outcome units, rounded down.
    ///
    /// Returns `None` on overflow.
    pub fn collateral_for(&self, shares: U256) -> Option<U256> {
        shares.checked_mul(U256::from(self.0)).map(|n| n / U256::from(PRICE_DENOMINATOR))
    }

    /// Outcome units that `collateral` buys at this price, rounded down.
    ///
    /// Returns `None` on overflow.
    pub fn shares_for(&self, collateral: U256) -> Option<U256> {
        collateral.checked_mul(U256::from(PRICE_DENOMINATOR)).map(|n| n / U256::from(self.0))
    }
}

impl fmt::Display for PriceBps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

impl TryFrom<u16> for PriceBps {
    type Error = CoreError;

    fn try_from(bps: u16) -> Result<Self, Self::Error> {
        Self::new(bps)
    }
}

impl From<PriceBps> for u16 {
    fn from(price: PriceBps) -> Self {
        price.0
    }
}

impl FromStr for PriceBps {
    type Err = CoreError;

    /// Parses a probability string (`"0.65"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_probability(s.parse()?)
    }
}
