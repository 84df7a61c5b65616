//! Ask book: providers sell outcome tokens at a fixed price.
//!
//! Inventory is outcome units of the key's side; takers pay collateral, which
//! accrues to providers as yield.

use alloy::primitives::{Address, U256};
use pmpool_core::{Book, PoolKey, TokenId};
use serde::{Deserialize, Serialize};

use crate::accounting::{fill_cap, sub, PoolState};
use crate::book::{DepositReceipt, FillReceipt, PoolBook, Transition, WithdrawReceipt};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{now_ms, PoolEvent};
use crate::settlement::SettlementStep;

/// Where deposited outcome tokens come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskFunding {
    /// Outcome tokens the caller already holds.
    #[default]
    Inventory,
    /// Split caller collateral into a pair; the key's side goes to the pool,
    /// the counter side to the recipient.
    MintFromCollateral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskDeposit {
    pub key: PoolKey,
    pub amount: U256,
    /// Position owner.
    pub recipient: Address,
    #[serde(default)]
    pub funding: AskFunding,
}

/// Taker buys outcome units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskFill {
    pub key: PoolKey,
    /// Outcome units wanted; the fill may be smaller.
    pub requested: U256,
    /// Highest collateral payment accepted.
    pub max_collateral_in: U256,
    /// Smallest acceptable fill.
    pub min_filled: U256,
    pub recipient: Address,
    /// Cap as a share of current inventory; engine default when `None`.
    #[serde(default)]
    pub max_fill_bps: Option<u16>,
}

/// Ask-side pools.
#[derive(Debug)]
pub struct AskLedger {
    pools: PoolBook,
}

impl Default for AskLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AskLedger {
    pub fn new() -> Self {
        Self {
            pools: PoolBook::new(Book::Ask),
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
        request: &AskDeposit,
        min_deposit: U256,
        custody: Address,
    ) -> LedgerResult<Transition<DepositReceipt>> {
        let AskDeposit {
            key,
            amount,
            recipient,
            funding,
        } = *request;

        let pull = SettlementStep::transfer(key.outcome_token(), caller, custody, amount);
        let steps = match funding {
            AskFunding::Inventory => vec![pull],
            AskFunding::MintFromCollateral => vec![
                SettlementStep::MintPair {
                    account: caller,
                    market: key.market,
                    amount,
                },
                pull,
                SettlementStep::transfer(key.counter_token(), caller, recipient, amount),
            ],
        };

        self.pools.plan_deposit(&key, recipient, amount, min_deposit, steps, custody)
    }

    /// Size a fill against the current pool without applying it.
    ///
    /// Returns the post-fill pool state alongside the receipt.
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

        let cap = fill_cap(state.total_inventory, max_fill_bps)?;
        let filled = requested.min(state.total_inventory).min(cap);
        let payment = key
            .price
            .collateral_for(filled)
            .ok_or(LedgerError::Overflow("fill payment"))?;
        if filled.is_zero() || payment.is_zero() {
            return Err(LedgerError::ZeroFill);
        }

        state.total_inventory = sub(state.total_inventory, filled, "total inventory")?;
        if state.accrue(payment)?.is_zero() {
            return Err(LedgerError::ZeroFill);
        }

        let receipt = FillReceipt {
            pool_id,
            filled,
            collateral: payment,
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
        request: &AskFill,
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
        if receipt.collateral > request.max_collateral_in {
            return Err(LedgerError::LimitExceeded(format!(
                "payment {} above max_collateral_in {}",
                receipt.collateral, request.max_collateral_in
            )));
        }

        Ok(Transition {
            pool_id: receipt.pool_id,
            key,
            pool: Some(state),
            position: None,
            steps: vec![
                SettlementStep::transfer(TokenId::Collateral, taker, custody, receipt.collateral),
                SettlementStep::transfer(
                    key.outcome_token(),
                    custody,
                    request.recipient,
                    receipt.filled,
                ),
            ],
            events: vec![PoolEvent::Filled {
                pool_id: receipt.pool_id,
                book: Book::Ask,
                taker,
                recipient: request.recipient,
                inventory_out: receipt.filled,
                yield_in: receipt.collateral,
                depleted: receipt.depleted,
                timestamp_ms: now_ms(),
            }],
            receipt,
        })
    }

    /// Withdraw, optionally merging the returned shares with the owner's
    /// counter-side tokens back into collateral.
    pub(crate) fn plan_withdraw(
        &self,
        key: &PoolKey,
        owner: Address,
        amount: U256,
        merge_to_collateral: bool,
        custody: Address,
    ) -> LedgerResult<Transition<WithdrawReceipt>> {
        let mut transition = self.pools.plan_withdraw(key, owner, amount, custody)?;
        if merge_to_collateral {
            transition.steps.push(SettlementStep::BurnPair {
                account: owner,
                market: key.market,
                amount: transition.receipt.amount,
            });
            for event in &mut transition.events {
                if let PoolEvent::Withdrawn { merged, .. } = event {
                    *merged = true;
                }
            }
        }
        Ok(transition)
    }
}
