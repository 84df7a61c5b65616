//! Pool arena and the operations both books share.
//!
//! A [`PoolBook`] owns every pool record of one [`Book`], addressed by
//! [`PoolId`], and every position, addressed by `(PoolId, owner)`. Operations
//! are planned against an immutable view and produce a [`Transition`]: the
//! next pool and position records, the settlement steps that move value, the
//! events to publish and a receipt. The engine settles the steps and only then
//! commits the transition, so a rejected or failed operation leaves no trace.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use pmpool_core::{Book, PoolId, PoolKey};
use serde::Serialize;

use crate::accounting::{add, mul_div_up, sub, PoolState, PoolStatus, Position};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{now_ms, PoolEvent};
use crate::settlement::SettlementStep;

// ============================================================================
// Records, views and receipts
// ============================================================================

/// Stored pool record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRecord {
    pub key: PoolKey,
    pub state: PoolState,
}

/// Read-only snapshot of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolView {
    pub pool_id: PoolId,
    pub book: Book,
    pub key: PoolKey,
    pub status: PoolStatus,
    pub state: PoolState,
}

/// Read-only snapshot of one provider's position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PositionView {
    pub scaled: U256,
    pub withdrawable: U256,
    pub pending_yield: U256,
    pub yield_debt: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    pub pool_id: PoolId,
    pub scaled: U256,
    /// Pending proceeds paid to the owner before topping up.
    pub flushed_yield: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FillReceipt {
    pub pool_id: PoolId,
    /// Outcome units traded.
    pub filled: U256,
    /// Collateral paid by (ask) or to (bid) the taker.
    pub collateral: U256,
    pub depleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawReceipt {
    pub pool_id: PoolId,
    pub amount: U256,
    pub scaled_removed: U256,
    /// Pending proceeds discarded because withdraw does not claim.
    pub forfeited_yield: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitReceipt {
    pub pool_id: PoolId,
    pub scaled_removed: U256,
    pub claimed: U256,
    pub pool_reset: bool,
}

/// Planned, not yet applied, effect of one operation.
#[derive(Debug, Clone)]
pub struct Transition<R> {
    pub pool_id: PoolId,
    pub key: PoolKey,
    /// Next pool record; `None` leaves the arena untouched.
    pub pool: Option<PoolState>,
    /// Next position record; an empty position is removed.
    pub position: Option<(Address, Position)>,
    pub steps: Vec<SettlementStep>,
    pub events: Vec<PoolEvent>,
    pub receipt: R,
}

impl<R> Transition<R> {
    fn noop(pool_id: PoolId, key: PoolKey, receipt: R) -> Self {
        Self {
            pool_id,
            key,
            pool: None,
            position: None,
            steps: Vec::new(),
            events: Vec::new(),
            receipt,
        }
    }
}

// ============================================================================
// PoolBook
// ============================================================================

/// All pools and positions of one book.
#[derive(Debug)]
pub struct PoolBook {
    book: Book,
    pools: HashMap<PoolId, PoolRecord>,
    positions: HashMap<(PoolId, Address), Position>,
}

impl PoolBook {
    pub fn new(book: Book) -> Self {
        Self {
            book,
            pools: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    pub fn book(&self) -> Book {
        self.book
    }

    /// Number of pool records (records are never deleted).
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn pool_id(&self, key: &PoolKey) -> PoolId {
        key.pool_id(self.book)
    }

    pub fn state(&self, key: &PoolKey) -> Option<PoolState> {
        self.pools.get(&self.pool_id(key)).map(|r| r.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolRecord> {
        self.pools.values()
    }

    pub fn view(&self, key: &PoolKey) -> Option<PoolView> {
        let pool_id = self.pool_id(key);
        self.pools.get(&pool_id).map(|r| PoolView {
            pool_id,
            book: self.book,
            key: r.key,
            status: r.state.status(),
            state: r.state,
        })
    }

    pub fn position(&self, key: &PoolKey, owner: Address) -> Option<Position> {
        self.positions.get(&(self.pool_id(key), owner)).copied()
    }

    pub fn position_view(&self, key: &PoolKey, owner: Address) -> LedgerResult<PositionView> {
        let (Some(state), Some(position)) = (self.state(key), self.position(key, owner)) else {
            return Ok(PositionView::default());
        };
        Ok(PositionView {
            scaled: position.scaled,
            withdrawable: state.withdrawable(position.scaled)?,
            pending_yield: state.pending(&position)?,
            yield_debt: position.yield_debt,
        })
    }

    /// Apply a settled transition.
    pub fn commit<R>(&mut self, transition: Transition<R>) -> (R, Vec<PoolEvent>) {
        let Transition {
            pool_id,
            key,
            pool,
            position,
            events,
            receipt,
            ..
        } = transition;

        if let Some(state) = pool {
            self.pools
                .entry(pool_id)
                .and_modify(|r| r.state = state)
                .or_insert(PoolRecord { key, state });
        }
        if let Some((owner, position)) = position {
            if position.is_empty() {
                self.positions.remove(&(pool_id, owner));
            } else {
                self.positions.insert((pool_id, owner), position);
            }
        }
        (receipt, events)
    }

    // ------------------------------------------------------------------------
    // Shared planning
    // ------------------------------------------------------------------------

    /// Plan a deposit of `amount` inventory for `owner`.
    ///
    /// `funding` pulls the inventory into custody; the owner's pending
    /// proceeds (if any) are paid out after it.
    pub(crate) fn plan_deposit(
        &self,
        key: &PoolKey,
        owner: Address,
        amount: U256,
        min_deposit: U256,
        funding: Vec<SettlementStep>,
        custody: Address,
    ) -> LedgerResult<Transition<DepositReceipt>> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "deposit amount must be > 0".to_string(),
            ));
        }
        if amount < min_deposit {
            return Err(LedgerError::InvalidAmount(format!(
                "deposit {amount} below minimum {min_deposit}"
            )));
        }

        let pool_id = self.pool_id(key);
        let existing = self.pools.get(&pool_id);
        let mut state = existing.map(|r| r.state).unwrap_or_default();
        if state.is_depleted() {
            return Err(LedgerError::PoolExhausted(pool_id));
        }

        let scaled = state.scaled_for_deposit(amount)?;
        if scaled.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "deposit {amount} too small to mint ownership"
            )));
        }

        let mut position = self.position(key, owner).unwrap_or_default();
        let flushed = state.pending(&position)?;
        position.scaled = add(position.scaled, scaled, "position scaled")?;
        position.checkpoint(state.acc_yield_per_scaled);

        state.total_inventory = add(state.total_inventory, amount, "total inventory")?;
        state.total_scaled = add(state.total_scaled, scaled, "total scaled")?;
        state.total_yield_claimed = add(state.total_yield_claimed, flushed, "yield claimed")?;

        let mut steps = funding;
        steps.push(SettlementStep::transfer(
            self.book.yield_token(key),
            custody,
            owner,
            flushed,
        ));

        let timestamp_ms = now_ms();
        let mut events = Vec::with_capacity(2);
        if existing.is_none() {
            events.push(PoolEvent::PoolCreated {
                pool_id,
                book: self.book,
                key: *key,
                timestamp_ms,
            });
        }
        events.push(PoolEvent::Deposited {
            pool_id,
            book: self.book,
            owner,
            amount,
            scaled,
            flushed_yield: flushed,
            timestamp_ms,
        });

        Ok(Transition {
            pool_id,
            key: *key,
            pool: Some(state),
            position: Some((owner, position)),
            steps,
            events,
            receipt: DepositReceipt {
                pool_id,
                scaled,
                flushed_yield: flushed,
            },
        })
    }

    /// Plan paying out `owner`'s pending proceeds. Zero pending is a no-op.
    pub(crate) fn plan_claim(
        &self,
        key: &PoolKey,
        owner: Address,
        custody: Address,
    ) -> LedgerResult<Transition<U256>> {
        let pool_id = self.pool_id(key);
        let (Some(mut state), Some(mut position)) = (self.state(key), self.position(key, owner))
        else {
            return Ok(Transition::noop(pool_id, *key, U256::ZERO));
        };

        let pending = state.pending(&position)?;
        if pending.is_zero() {
            return Ok(Transition::noop(pool_id, *key, U256::ZERO));
        }

        position.checkpoint(state.acc_yield_per_scaled);
        state.total_yield_claimed = add(state.total_yield_claimed, pending, "yield claimed")?;

        Ok(Transition {
            pool_id,
            key: *key,
            pool: Some(state),
            position: Some((owner, position)),
            steps: vec![SettlementStep::transfer(
                self.book.yield_token(key),
                custody,
                owner,
                pending,
            )],
            events: vec![PoolEvent::Claimed {
                pool_id,
                book: self.book,
                owner,
                amount: pending,
                timestamp_ms: now_ms(),
            }],
            receipt: pending,
        })
    }

    /// Plan returning unfilled inventory to `owner`. `requested == 0` means all.
    ///
    /// Pending proceeds are NOT paid: the checkpoint moves to the current
    /// accumulator and whatever was pending is forfeited. Claim first.
    ///
    /// A position whose share of the inventory floors to zero can still leave
    /// with `requested == 0`: its scaled units are burned for a zero payout and
    /// the dust stays with the remaining providers.
    pub(crate) fn plan_withdraw(
        &self,
        key: &PoolKey,
        owner: Address,
        requested: U256,
        custody: Address,
    ) -> LedgerResult<Transition<WithdrawReceipt>> {
        let pool_id = self.pool_id(key);
        let no_position =
            || LedgerError::InvalidAmount(format!("{owner} has no position in {pool_id}"));

        let mut state = self.state(key).ok_or_else(no_position)?;
        if state.is_depleted() {
            return Err(LedgerError::PoolExhausted(pool_id));
        }
        let mut position = self
            .position(key, owner)
            .filter(|p| !p.is_empty())
            .ok_or_else(no_position)?;

        let withdrawable = state.withdrawable(position.scaled)?;
        if requested > withdrawable {
            return Err(LedgerError::LimitExceeded(format!(
                "requested {requested} exceeds withdrawable {withdrawable}"
            )));
        }
        let mut amount = if requested.is_zero() {
            withdrawable
        } else {
            requested
        };

        // Round the burned ownership up so rounding never shifts value away
        // from the providers who stay. Burning the whole position pays out
        // everything it was worth.
        let scaled_removed = if amount == withdrawable {
            position.scaled
        } else {
            mul_div_up(amount, position.scaled, withdrawable, "withdraw scaling")?
                .min(position.scaled)
        };
        if scaled_removed == position.scaled {
            amount = withdrawable;
        }

        let forfeited = state.pending(&position)?;
        position.scaled = sub(position.scaled, scaled_removed, "position scaled")?;
        position.checkpoint(state.acc_yield_per_scaled);

        state.total_inventory = sub(state.total_inventory, amount, "total inventory")?;
        state.total_scaled = sub(state.total_scaled, scaled_removed, "total scaled")?;
        state.total_yield_forfeited =
            add(state.total_yield_forfeited, forfeited, "yield forfeited")?;

        Ok(Transition {
            pool_id,
            key: *key,
            pool: Some(state),
            position: Some((owner, position)),
            steps: vec![SettlementStep::transfer(
                self.book.inventory_token(key),
                custody,
                owner,
                amount,
            )],
            events: vec![PoolEvent::Withdrawn {
                pool_id,
                book: self.book,
                owner,
                amount,
                scaled_removed,
                forfeited_yield: forfeited,
                merged: false,
                timestamp_ms: now_ms(),
            }],
            receipt: WithdrawReceipt {
                pool_id,
                amount,
                scaled_removed,
                forfeited_yield: forfeited,
            },
        })
    }

    /// Plan removing `owner` from a depleted pool, paying pending proceeds.
    pub(crate) fn plan_exit(
        &self,
        key: &PoolKey,
        owner: Address,
        custody: Address,
    ) -> LedgerResult<Transition<ExitReceipt>> {
        let pool_id = self.pool_id(key);
        let mut state = self
            .state(key)
            .filter(PoolState::is_depleted)
            .ok_or(LedgerError::NotDepleted(pool_id))?;
        let position = self
            .position(key, owner)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!("{owner} has no position in {pool_id}"))
            })?;

        let pending = state.pending(&position)?;
        state.total_scaled = sub(state.total_scaled, position.scaled, "total scaled")?;
        state.total_yield_claimed = add(state.total_yield_claimed, pending, "yield claimed")?;
        let pool_reset = state.total_scaled.is_zero();

        Ok(Transition {
            pool_id,
            key: *key,
            pool: Some(state),
            position: Some((owner, Position::default())),
            steps: vec![SettlementStep::transfer(
                self.book.yield_token(key),
                custody,
                owner,
                pending,
            )],
            events: vec![PoolEvent::ExitedDepleted {
                pool_id,
                book: self.book,
                owner,
                scaled_removed: position.scaled,
                claimed: pending,
                pool_reset,
                timestamp_ms: now_ms(),
            }],
            receipt: ExitReceipt {
                pool_id,
                scaled_removed: position.scaled,
                claimed: pending,
                pool_reset,
            },
        })
    }
}
