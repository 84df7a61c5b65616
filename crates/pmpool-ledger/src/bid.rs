//! Bid book: providers buy outcome tokens at a fixed price.
//!
//! Inventory is collateral; takers sell outcome units of the key's side into
//! the pool and those units accrue to providers as yield.

use alloy::primitives::{Address, U256};
use pmpool_core::{Book, PoolKey, TokenId};
use serde::{Deserialize, Serialize};

use crate::accounting::{fill_cap, sub, PoolState};
use crate::book::{DepositReceipt, FillReceipt, PoolBook, Transition};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{now_ms, PoolEvent};
use crate::settlement::SettlementStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidDeposit {
    pub key: PoolKey,
    /// Collateral pulled from the caller.
    pub amount: U256,
    pub recipient: Address,
}

/// Taker sells outcome units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidFill {
    pub key: PoolKey,
    pub requested: U256,
    /// Smallest collateral payout accepted.
    pub min_collateral_out: U256,
    pub min_filled: U256,
    pub recipient: Address,
    #[serde(default)]
    pub max_fill_bps: Option<u16>,
}

/// Bid-side pools.
#[derive(Debug)]
pub struct BidLedger {
    pools: PoolBook,
}

impl Default for BidLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BidLedger {
    pub fn new() -> Self {
        Self {
            pools: PoolBook::new(Book::Bid),
        }
    }

    pub fn pools(&self) -> &PoolBook {
        &self.pools
    }

    pub(crate) fn pools_mut(&mut self) -> &mut PoolBook {
        &mut self.pools
    }

    pub(crate) fn plan_deposit(
        &self,
        caller: Address,
        request: &BidDeposit,
        min_deposit: U256,
        custody: Address,
    ) -> LedgerResult<Transition<DepositReceipt>> {
        let pull = SettlementStep::transfer(TokenId::Collateral, caller, custody, request.amount);
        self.pools.plan_deposit(
            &request.key,
            request.recipient,
            request.amount,
            min_deposit,
            vec![pull],
            custody,
        )
    }

    fn size_fill(
        &self,
        key: &PoolKey,
        requested: U256,
        max_fill_bps: Option<u16>,
    ) -> LedgerResult<(PoolState, FillReceipt)> {
        if requested.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "requested fill must be > 0".to_string(),
            ));
        }
        let pool_id = self.pools.pool_id(key);
        let mut state = self
            .pools
            .state(key)
            .filter(|s| !s.total_inventory.is_zero())
            .ok_or(LedgerError::PoolExhausted(pool_id))?;

        let capacity = key
            .price
            .shares_for(state.total_inventory)
            .ok_or(LedgerError::Overflow("bid capacity"))?;
        let cap = fill_cap(capacity, max_fill_bps)?;
        let filled = requested.min(capacity).min(cap);

        // Taking the whole capacity sweeps the sub-unit remainder to the taker
        // so the pool lands exactly on zero.
        let payout = if filled == capacity {
            state.total_inventory
        } else {
            key.price.collateral_for(filled).ok_or(LedgerError::Overflow("fill payout"))?
        };
        if filled.is_zero() || payout.is_zero() {
            return Err(LedgerError::ZeroFill);
        }

        state.total_inventory = sub(state.total_inventory, payout, "total inventory")?;
        if state.accrue(filled)?.is_zero() {
            return Err(LedgerError::ZeroFill);
        }

        let receipt = FillReceipt {
            pool_id,
            filled,
            collateral: payout,
            depleted: state.total_inventory.is_zero(),
        };
        Ok((state, receipt))
    }

    /// What a fill would do right now. Bounds are not checked.
    pub fn quote_fill(
        &self,
        key: &PoolKey,
        requested: U256,
        max_fill_bps: Option<u16>,
    ) -> LedgerResult<FillReceipt> {
        self.size_fill(key, requested, max_fill_bps).map(|(_, receipt)| receipt)
    }

    pub(crate) fn plan_fill(
        &self,
        taker: Address,
        request: &BidFill,
        default_max_fill_bps: Option<u16>,
        custody: Address,
    ) -> LedgerResult<Transition<FillReceipt>> {
        let key = request.key;
        let (state, receipt) = self.size_fill(
            &key,
            request.requested,
            request.max_fill_bps.or(default_max_fill_bps),
        )?;

        if receipt.filled < request.min_filled {
            return Err(LedgerError::LimitExceeded(format!(
                "fill {} below min_filled {}",
                receipt.filled, request.min_filled
            )));
        }
        if receipt.collateral < request.min_collateral_out {
            return Err(LedgerError::LimitExceeded(format!(
                "payout {} below min_collateral_out {}",
                receipt.collateral, request.min_collateral_out
            )));
        }

        Ok(Transition {
            pool_id: receipt.pool_id,
            key,
            pool: Some(state),
            position: None,
            steps: vec![
                SettlementStep::transfer(key.outcome_token(), taker, custody, receipt.filled),
                SettlementStep::transfer(
                    TokenId::Collateral,
                    custody,
                    request.recipient,
                    receipt.collateral,
                ),
            ],
            events: vec![PoolEvent::Filled {
                pool_id: receipt.pool_id,
                book: Book::Bid,
                taker,
                recipient: request.recipient,
                inventory_out: receipt.collateral,
                yield_in: receipt.filled,
                depleted: receipt.depleted,
                timestamp_ms: now_ms(),
            }],
            receipt,
        })
    }
}
