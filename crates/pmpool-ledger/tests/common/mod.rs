//! Shared fixtures for pmpool-ledger integration tests.
//!
//! Every helper funds the acting account at the in-memory collaborator before
//! calling the engine, so tests only state the amounts they care about.

#![allow(dead_code)]

use alloy::primitives::{Address, U256};
use pmpool_core::{Book, MarketId, Outcome, PoolKey, PriceBps, TokenId};
use pmpool_ledger::{
    AskDeposit, AskFill, AskFunding, BidDeposit, BidFill, DepositReceipt, EngineConfig,
    FillReceipt, InMemoryTokens, OutcomeTokens, PoolEngine,
};

pub const ALICE: Address = Address::repeat_byte(0x0a);
pub const BOB: Address = Address::repeat_byte(0x0b);
pub const CAROL: Address = Address::repeat_byte(0x0c);
pub const DAVE: Address = Address::repeat_byte(0x0d);
pub const TAKER: Address = Address::repeat_byte(0x0f);

pub const PROVIDERS: [Address; 4] = [ALICE, BOB, CAROL, DAVE];

pub type Engine = PoolEngine<InMemoryTokens>;

/// `x * 1e18`
pub fn e18(x: u64) -> U256 {
    U256::from(x) * U256::from(1_000_000_000_000_000_000u64)
}

pub fn market() -> MarketId {
    MarketId::from_label("will-it-rain-tomorrow")
}

pub fn key(outcome: Outcome, bps: u16) -> PoolKey {
    PoolKey::new(market(), outcome, PriceBps::new(bps).unwrap())
}

pub fn engine() -> Engine {
    PoolEngine::new(EngineConfig::default(), InMemoryTokens::new()).unwrap()
}

pub fn custody(engine: &Engine) -> Address {
    engine.custody()
}

pub fn balance(engine: &Engine, account: Address, token: TokenId) -> U256 {
    engine.tokens().balance_of(account, token)
}

pub fn collateral(engine: &Engine, account: Address) -> U256 {
    balance(engine, account, TokenId::Collateral)
}

pub fn shares(engine: &Engine, account: Address, key: &PoolKey) -> U256 {
    balance(engine, account, key.outcome_token())
}

/// Deterministic xorshift64 stream for interleaving tests.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish in `[0, n)`.
    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }

    pub fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.below(items.len() as u64) as usize]
    }
}

/// Aggregate checks that hold after every operation on `key`.
pub fn assert_pool_consistent(engine: &Engine, book: Book, key: &PoolKey, owners: &[Address]) {
    let Some(pool) = engine.pool(book, key) else {
        return;
    };
    let state = pool.state;

    let mut scaled = U256::ZERO;
    let mut withdrawable = U256::ZERO;
    let mut pending = U256::ZERO;
    for owner in owners {
        let position = engine.position(book, key, *owner).unwrap();
        scaled += position.scaled;
        withdrawable += position.withdrawable;
        pending += position.pending_yield;
    }

    assert_eq!(scaled, state.total_scaled, "scaled units out of sync: {state:?}");
    assert!(
        withdrawable <= state.total_inventory,
        "withdrawable {withdrawable} above inventory: {state:?}"
    );
    assert!(
        state.total_yield_claimed + state.total_yield_forfeited + pending
            <= state.total_yield_earned,
        "pending {pending} overdraws earned yield: {state:?}"
    );
    assert!(engine.solvency().unwrap().is_solvent());
}

// ----------------------------------------------------------------------------
// Ask
// ----------------------------------------------------------------------------

pub fn ask_deposit(engine: &Engine, owner: Address, key: &PoolKey, amount: U256) -> DepositReceipt {
    engine.tokens().credit(owner, key.outcome_token(), amount);
    engine
        .deposit_ask(
            owner,
            AskDeposit {
                key: *key,
                amount,
                recipient: owner,
                funding: AskFunding::Inventory,
            },
        )
        .unwrap()
}

pub fn ask_fill_request(key: &PoolKey, requested: U256) -> AskFill {
    AskFill {
        key: *key,
        requested,
        max_collateral_in: U256::MAX,
        min_filled: U256::ZERO,
        recipient: TAKER,
        max_fill_bps: None,
    }
}

/// Buy `requested` shares; the taker is funded with exactly the payment.
pub fn ask_fill(engine: &Engine, key: &PoolKey, requested: U256) -> FillReceipt {
    let quote = engine.quote_ask_fill(key, requested, None).unwrap();
    engine.tokens().credit(TAKER, TokenId::Collateral, quote.collateral);
    engine
        .fill_ask(TAKER, ask_fill_request(key, requested))
        .unwrap()
}

// ----------------------------------------------------------------------------
// Bid
// ----------------------------------------------------------------------------

pub fn bid_deposit(engine: &Engine, owner: Address, key: &PoolKey, amount: U256) -> DepositReceipt {
    engine.tokens().credit(owner, TokenId::Collateral, amount);
    engine
        .deposit_bid(
            owner,
            BidDeposit {
                key: *key,
                amount,
                recipient: owner,
            },
        )
        .unwrap()
}

pub fn bid_fill_request(key: &PoolKey, requested: U256) -> BidFill {
    BidFill {
        key: *key,
        requested,
        min_collateral_out: U256::ZERO,
        min_filled: U256::ZERO,
        recipient: TAKER,
        max_fill_bps: None,
    }
}

/// Sell up to `requested` shares; the taker is funded with exactly the fill.
pub fn bid_fill(engine: &Engine, key: &PoolKey, requested: U256) -> FillReceipt {
    let quote = engine.quote_bid_fill(key, requested, None).unwrap();
    engine.tokens().credit(TAKER, key.outcome_token(), quote.filled);
    engine
        .fill_bid(TAKER, bid_fill_request(key, requested))
        .unwrap()
}
