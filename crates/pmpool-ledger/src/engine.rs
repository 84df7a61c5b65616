//! Pool engine: the serialized, all-or-nothing entry point.
//!
//! # Operation flow
//!
//! 1. Lock the engine (`ReentrantMutex`; other threads wait)
//! 2. Set the entry flag; already set → `ReentrantCall`
//! 3. Plan the transition from a read-only view of the ledgers
//! 4. Settle its steps against the collaborator (compensated on failure)
//! 5. Commit the transition, publish its events
//!
//! A collaborator that calls back into the engine during step 4 runs on the
//! same thread, re-acquires the lock and is stopped by the entry flag. Queries
//! skip the flag and see the last committed state.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, U256};
use parking_lot::ReentrantMutex;
use pmpool_core::{Book, PoolId, PoolKey, TokenId};
use pmpool_telemetry::Metrics;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::accounting::{add, sub};
use crate::ask::{AskDeposit, AskFill, AskLedger};
use crate::bid::{BidDeposit, BidFill, BidLedger};
use crate::book::{
    DepositReceipt, ExitReceipt, FillReceipt, PoolBook, PoolView, PositionView, Transition,
    WithdrawReceipt,
};
use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::PoolEvent;
use crate::settlement::settle;
use crate::tokens::OutcomeTokens;

// ============================================================================
// Internal state
// ============================================================================

#[derive(Debug, Default)]
struct LedgerState {
    ask: AskLedger,
    bid: BidLedger,
    /// Approved `(owner, operator)` pairs.
    operators: HashSet<(Address, Address)>,
}

impl LedgerState {
    fn pools(&self, book: Book) -> &PoolBook {
        match book {
            Book::Ask => self.ask.pools(),
            Book::Bid => self.bid.pools(),
        }
    }

    fn pools_mut(&mut self, book: Book) -> &mut PoolBook {
        match book {
            Book::Ask => self.ask.pools_mut(),
            Book::Bid => self.bid.pools_mut(),
        }
    }

    fn authorize(&self, caller: Address, owner: Address) -> LedgerResult<()> {
        if caller == owner || self.operators.contains(&(owner, caller)) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { caller, owner })
        }
    }
}

#[derive(Debug, Default)]
struct EngineCell {
    entered: Cell<bool>,
    state: RefCell<LedgerState>,
}

/// Holds the entry flag for the duration of one mutating operation.
struct EntryGuard<'a>(&'a Cell<bool>);

impl<'a> EntryGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> LedgerResult<Self> {
        if flag.replace(true) {
            return Err(LedgerError::ReentrantCall);
        }
        Ok(Self(flag))
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Approximate volume for metrics.
fn units(amount: U256) -> f64 {
    u128::try_from(amount).map(|v| v as f64).unwrap_or(f64::MAX)
}

// ============================================================================
// Solvency
// ============================================================================

/// Custody holdings of one token against what the pools owe in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenSolvency {
    pub token: TokenId,
    /// Unfilled inventory plus unclaimed proceeds across all pools.
    pub required: U256,
    /// Custody balance reported by the collaborator.
    pub held: U256,
}

impl TokenSolvency {
    pub fn is_solvent(&self) -> bool {
        self.held >= self.required
    }

    /// Held beyond obligations (forfeited proceeds, dust, direct transfers).
    pub fn surplus(&self) -> U256 {
        self.held.saturating_sub(self.required)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SolvencyReport {
    pub tokens: Vec<TokenSolvency>,
}

impl SolvencyReport {
    pub fn is_solvent(&self) -> bool {
        self.tokens.iter().all(TokenSolvency::is_solvent)
    }

    pub fn get(&self, token: TokenId) -> Option<&TokenSolvency> {
        self.tokens.iter().find(|t| t.token == token)
    }
}

// ============================================================================
// PoolEngine
// ============================================================================

/// Ask and bid pool ledgers behind one serialized entry point.
pub struct PoolEngine<T: OutcomeTokens> {
    config: EngineConfig,
    tokens: T,
    inner: ReentrantMutex<EngineCell>,
    events: broadcast::Sender<PoolEvent>,
}

impl<T: OutcomeTokens> PoolEngine<T> {
    pub fn new(config: EngineConfig, tokens: T) -> LedgerResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_channel_capacity);

        info!(
            custody = %config.custody_account,
            default_max_fill_bps = ?config.default_max_fill_bps,
            min_deposit = config.min_deposit,
            "Pool engine initialized"
        );

        Ok(Self {
            config,
            tokens,
            inner: ReentrantMutex::new(EngineCell::default()),
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn custody(&self) -> Address {
        self.config.custody_account
    }

    /// Events committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    fn min_deposit(&self) -> U256 {
        U256::from(self.config.min_deposit)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    fn execute<R>(
        &self,
        book: Book,
        op: &'static str,
        plan: impl FnOnce(&LedgerState) -> LedgerResult<Transition<R>>,
    ) -> LedgerResult<R> {
        let cell = self.inner.lock();
        let result =
            EntryGuard::enter(&cell.entered).and_then(|_entry| self.apply(&cell, book, plan));

        match &result {
            Ok(_) => Metrics::operation(book.as_str(), op),
            Err(e) => {
                debug!(
                    book = book.as_str(),
                    op,
                    reason = e.kind(),
                    error = %e,
                    "Operation rejected"
                );
                Metrics::rejected(book.as_str(), op, e.kind());
            }
        }
        result
    }

    fn apply<R>(
        &self,
        cell: &EngineCell,
        book: Book,
        plan: impl FnOnce(&LedgerState) -> LedgerResult<Transition<R>>,
    ) -> LedgerResult<R> {
        let transition = plan(&cell.state.borrow())?;
        settle(&self.tokens, &transition.steps)?;

        let (receipt, events) = {
            let mut state = cell.state.borrow_mut();
            let pools = state.pools_mut(book);
            let committed = pools.commit(transition);
            Metrics::pools(book.as_str(), pools.len());
            committed
        };

        for event in events {
            debug!(event = event.name(), pool_id = %event.pool_id(), "Publishing pool event");
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        Ok(receipt)
    }

    fn read<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        let cell = self.inner.lock();
        let result = f(&cell.state.borrow());
        result
    }

    // ------------------------------------------------------------------------
    // Ask book
    // ------------------------------------------------------------------------

    /// Add outcome tokens to an ask pool for `request.recipient`.
    pub fn deposit_ask(
        &self,
        caller: Address,
        request: AskDeposit,
    ) -> LedgerResult<DepositReceipt> {
        let receipt = self.execute(Book::Ask, "deposit", |s| {
            s.ask.plan_deposit(caller, &request, self.min_deposit(), self.custody())
        })?;
        self.record_deposit(Book::Ask, request.recipient, request.amount, &receipt);
        Ok(receipt)
    }

    /// Buy outcome tokens from an ask pool.
    pub fn fill_ask(&self, taker: Address, request: AskFill) -> LedgerResult<FillReceipt> {
        let receipt = self.execute(Book::Ask, "fill", |s| {
            s.ask.plan_fill(
                taker,
                &request,
                self.config.default_max_fill_bps,
                self.custody(),
            )
        })?;
        self.record_fill(Book::Ask, taker, &receipt);
        Ok(receipt)
    }

    pub fn quote_ask_fill(
        &self,
        key: &PoolKey,
        requested: U256,
        max_fill_bps: Option<u16>,
    ) -> LedgerResult<FillReceipt> {
        let cap = max_fill_bps.or(self.config.default_max_fill_bps);
        self.read(|s| s.ask.quote_fill(key, requested, cap))
    }

    /// Return unfilled outcome tokens to `owner`. `amount == 0` withdraws all.
    ///
    /// Pending proceeds are forfeited; claim first.
    pub fn withdraw_ask(
        &self,
        caller: Address,
        key: &PoolKey,
        owner: Address,
        amount: U256,
        merge_to_collateral: bool,
    ) -> LedgerResult<WithdrawReceipt> {
        let receipt = self.execute(Book::Ask, "withdraw", |s| {
            s.authorize(caller, owner)?;
            s.ask.plan_withdraw(key, owner, amount, merge_to_collateral, self.custody())
        })?;
        self.record_withdraw(Book::Ask, owner, &receipt);
        Ok(receipt)
    }

    // ------------------------------------------------------------------------
    // Bid book
    // ------------------------------------------------------------------------

    /// Add collateral to a bid pool for `request.recipient`.
    pub fn deposit_bid(
        &self,
        caller: Address,
        request: BidDeposit,
    ) -> LedgerResult<DepositReceipt> {
        let receipt = self.execute(Book::Bid, "deposit", |s| {
            s.bid.plan_deposit(caller, &request, self.min_deposit(), self.custody())
        })?;
        self.record_deposit(Book::Bid, request.recipient, request.amount, &receipt);
        Ok(receipt)
    }

    /// Sell outcome tokens into a bid pool.
    pub fn fill_bid(&self, taker: Address, request: BidFill) -> LedgerResult<FillReceipt> {
        let receipt = self.execute(Book::Bid, "fill", |s| {
            s.bid.plan_fill(
                taker,
                &request,
                self.config.default_max_fill_bps,
                self.custody(),
            )
        })?;
        self.record_fill(Book::Bid, taker, &receipt);
        Ok(receipt)
    }

    pub fn quote_bid_fill(
        &self,
        key: &PoolKey,
        requested: U256,
        max_fill_bps: Option<u16>,
    ) -> LedgerResult<FillReceipt> {
        let cap = max_fill_bps.or(self.config.default_max_fill_bps);
        self.read(|s| s.bid.quote_fill(key, requested, cap))
    }

    /// Return unspent collateral to `owner`. `amount == 0` withdraws all.
    ///
    /// Pending proceeds are forfeited; claim first.
    pub fn withdraw_bid(
        &self,
        caller: Address,
        key: &PoolKey,
        owner: Address,
        amount: U256,
    ) -> LedgerResult<WithdrawReceipt> {
        let receipt = self.execute(Book::Bid, "withdraw", |s| {
            s.authorize(caller, owner)?;
            s.bid.pools().plan_withdraw(key, owner, amount, self.custody())
        })?;
        self.record_withdraw(Book::Bid, owner, &receipt);
        Ok(receipt)
    }

    // ------------------------------------------------------------------------
    // Either book
    // ------------------------------------------------------------------------

    /// Pay `owner`'s pending proceeds. Returns 0 when nothing is pending.
    pub fn claim(
        &self,
        book: Book,
        caller: Address,
        key: &PoolKey,
        owner: Address,
    ) -> LedgerResult<U256> {
        let amount = self.execute(book, "claim", |s| {
            s.authorize(caller, owner)?;
            s.pools(book).plan_claim(key, owner, self.custody())
        })?;
        if !amount.is_zero() {
            info!(book = book.as_str(), %owner, %amount, "Yield claimed");
        }
        Ok(amount)
    }

    /// Remove `owner` from a depleted pool, paying pending proceeds.
    pub fn exit_depleted(
        &self,
        book: Book,
        caller: Address,
        key: &PoolKey,
        owner: Address,
    ) -> LedgerResult<ExitReceipt> {
        let receipt = self.execute(book, "exit", |s| {
            s.authorize(caller, owner)?;
            s.pools(book).plan_exit(key, owner, self.custody())
        })?;
        info!(
            book = book.as_str(),
            pool_id = %receipt.pool_id,
            %owner,
            scaled = %receipt.scaled_removed,
            claimed = %receipt.claimed,
            pool_reset = receipt.pool_reset,
            "Exited depleted pool"
        );
        Ok(receipt)
    }

    /// Approve or revoke `operator` acting on the caller's own positions.
    ///
    /// The caller is always the approving owner; nobody approves for others.
    pub fn set_operator(
        &self,
        caller: Address,
        operator: Address,
        approved: bool,
    ) -> LedgerResult<()> {
        let cell = self.inner.lock();
        let _entry = EntryGuard::enter(&cell.entered)?;
        let mut state = cell.state.borrow_mut();
        if approved {
            state.operators.insert((caller, operator));
        } else {
            state.operators.remove(&(caller, operator));
        }
        info!(owner = %caller, %operator, approved, "Operator updated");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn is_operator(&self, owner: Address, operator: Address) -> bool {
        self.read(|s| s.operators.contains(&(owner, operator)))
    }

    pub fn pool_id(&self, book: Book, key: &PoolKey) -> PoolId {
        key.pool_id(book)
    }

    pub fn pool(&self, book: Book, key: &PoolKey) -> Option<PoolView> {
        self.read(|s| s.pools(book).view(key))
    }

    pub fn position(
        &self,
        book: Book,
        key: &PoolKey,
        owner: Address,
    ) -> LedgerResult<PositionView> {
        self.read(|s| s.pools(book).position_view(key, owner))
    }

    /// Compare custody balances with what every pool owes.
    ///
    /// Walks pool records, never positions.
    pub fn solvency(&self) -> LedgerResult<SolvencyReport> {
        let cell = self.inner.lock();
        let mut required: HashMap<TokenId, U256> = HashMap::new();
        {
            let state = cell.state.borrow();
            for pools in [state.ask.pools(), state.bid.pools()] {
                let book = pools.book();
                for record in pools.iter() {
                    let unclaimed = sub(
                        record.state.total_yield_earned,
                        record.state.total_yield_claimed,
                        "unclaimed yield",
                    )?;
                    for (token, amount) in [
                        (book.inventory_token(&record.key), record.state.total_inventory),
                        (book.yield_token(&record.key), unclaimed),
                    ] {
                        let entry = required.entry(token).or_default();
                        *entry = add(*entry, amount, "solvency obligations")?;
                    }
                }
            }
        }

        let custody = self.custody();
        let tokens = required
            .into_iter()
            .map(|(token, required)| TokenSolvency {
                token,
                required,
                held: self.tokens.balance_of(custody, token),
            })
            .collect();
        Ok(SolvencyReport { tokens })
    }

    // ------------------------------------------------------------------------
    // Logging / metrics
    // ------------------------------------------------------------------------

    fn record_deposit(&self, book: Book, owner: Address, amount: U256, receipt: &DepositReceipt) {
        Metrics::deposited(book.as_str(), units(amount));
        info!(
            book = book.as_str(),
            pool_id = %receipt.pool_id,
            %owner,
            %amount,
            scaled = %receipt.scaled,
            flushed = %receipt.flushed_yield,
            "Deposit committed"
        );
    }

    fn record_fill(&self, book: Book, taker: Address, receipt: &FillReceipt) {
        Metrics::filled(book.as_str(), units(receipt.filled));
        if receipt.depleted {
            Metrics::depleted(book.as_str());
        }
        info!(
            book = book.as_str(),
            pool_id = %receipt.pool_id,
            %taker,
            filled = %receipt.filled,
            collateral = %receipt.collateral,
            depleted = receipt.depleted,
            "Fill committed"
        );
    }

    fn record_withdraw(&self, book: Book, owner: Address, receipt: &WithdrawReceipt) {
        info!(
            book = book.as_str(),
            pool_id = %receipt.pool_id,
            %owner,
            amount = %receipt.amount,
            scaled = %receipt.scaled_removed,
            forfeited = %receipt.forfeited_yield,
            "Withdraw committed"
        );
    }
}

impl<T: OutcomeTokens + std::fmt::Debug> std::fmt::Debug for PoolEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEngine")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
