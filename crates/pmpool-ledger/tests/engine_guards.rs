//! Engine-level guarantees: reentrancy rejection, rollback on collaborator
//! failure, operator authorization and event publication.

mod common;

use std::sync::{Arc, OnceLock, Weak};

use alloy::primitives::{Address, U256};
use common::*;
use mockall::mock;
use parking_lot::Mutex;
use pmpool_core::{Book, MarketId, Outcome, PoolKey, TokenId};
use pmpool_ledger::{
    AskDeposit, AskFunding, EngineConfig, InMemoryTokens, LedgerError, OutcomeTokens, PoolEngine,
    PoolEvent, TokenError, TokenResult,
};
use tokio::sync::broadcast::error::TryRecvError;

// ============================================================================
// Hostile collaborator
// ============================================================================

/// Calls back into the engine from inside every transfer.
#[derive(Default)]
struct Hostile {
    inner: InMemoryTokens,
    engine: OnceLock<Weak<PoolEngine<Hostile>>>,
    nested: Mutex<Vec<LedgerError>>,
    observed_inventory: Mutex<Vec<Option<U256>>>,
}

impl Hostile {
    fn target(&self) -> PoolKey {
        key(Outcome::Yes, 5_000)
    }
}

impl OutcomeTokens for Hostile {
    fn mint_pair(&self, account: Address, market: MarketId, collateral: U256) -> TokenResult<()> {
        self.inner.mint_pair(account, market, collateral)
    }

    fn burn_pair(&self, account: Address, market: MarketId, amount: U256) -> TokenResult<()> {
        self.inner.burn_pair(account, market, amount)
    }

    fn transfer(
        &self,
        token: TokenId,
        from: Address,
        to: Address,
        amount: U256,
    ) -> TokenResult<()> {
        if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
            let target = self.target();
            if let Err(e) = engine.claim(Book::Ask, from, &target, from) {
                self.nested.lock().push(e);
            }
            if let Err(e) = engine.withdraw_ask(from, &target, from, U256::ZERO, false) {
                self.nested.lock().push(e);
            }
            if let Err(e) = engine.set_operator(from, to, true) {
                self.nested.lock().push(e);
            }
            self.observed_inventory.lock().push(
                engine
                    .pool(Book::Ask, &target)
                    .map(|p| p.state.total_inventory),
            );
        }
        self.inner.transfer(token, from, to, amount)
    }

    fn balance_of(&self, account: Address, token: TokenId) -> U256 {
        self.inner.balance_of(account, token)
    }
}

#[test]
fn test_reentrant_calls_are_rejected() {
    let engine = Arc::new(PoolEngine::new(EngineConfig::default(), Hostile::default()).unwrap());
    let target = engine.tokens().target();
    engine.tokens().inner.credit(ALICE, target.outcome_token(), e18(100));
    engine.tokens().inner.credit(TAKER, TokenId::Collateral, e18(100));

    // Deposit before arming the callback
    engine
        .deposit_ask(
            ALICE,
            AskDeposit {
                key: target,
                amount: e18(100),
                recipient: ALICE,
                funding: AskFunding::Inventory,
            },
        )
        .unwrap();
    engine.tokens().engine.set(Arc::downgrade(&engine)).unwrap();

    let fill = engine
        .fill_ask(TAKER, ask_fill_request(&target, e18(40)))
        .unwrap();
    assert_eq!(fill.filled, e18(40));

    // Two transfers, three nested mutations each
    let nested = engine.tokens().nested.lock().clone();
    assert_eq!(nested.len(), 6);
    assert!(nested.iter().all(|e| *e == LedgerError::ReentrantCall));

    // Queries mid-operation see the last committed state
    let observed = engine.tokens().observed_inventory.lock().clone();
    assert_eq!(observed, vec![Some(e18(100)), Some(e18(100))]);

    // Nothing the nested calls attempted took effect
    assert!(!engine.is_operator(TAKER, Address::repeat_byte(0xcc)));
    let position = engine.position(Book::Ask, &target, ALICE).unwrap();
    assert_eq!(position.withdrawable, e18(60));
    assert_eq!(position.pending_yield, e18(20));

    // The flag is released afterwards; the callback fires again and is
    // rejected again while the outer claim succeeds
    assert_eq!(
        engine.claim(Book::Ask, ALICE, &target, ALICE).unwrap(),
        e18(20)
    );
    let nested = engine.tokens().nested.lock().clone();
    assert_eq!(nested.len(), 9);
    assert!(nested.iter().all(|e| *e == LedgerError::ReentrantCall));
}

// ============================================================================
// Collaborator failure
// ============================================================================

mock! {
    pub Tokens {}

    impl OutcomeTokens for Tokens {
        fn mint_pair(
            &self,
            account: Address,
            market: MarketId,
            collateral: U256,
        ) -> TokenResult<()>;
        fn burn_pair(&self, account: Address, market: MarketId, amount: U256) -> TokenResult<()>;
        fn transfer(
            &self,
            token: TokenId,
            from: Address,
            to: Address,
            amount: U256,
        ) -> TokenResult<()>;
        fn balance_of(&self, account: Address, token: TokenId) -> U256;
    }
}

#[test]
fn test_failed_mint_deposit_is_compensated() {
    let target = key(Outcome::Yes, 5_000);
    let custody = EngineConfig::default().custody_account;
    let yes = target.outcome_token();
    let no = target.counter_token();

    let mut tokens = MockTokens::new();
    tokens
        .expect_mint_pair()
        .withf(|account, _, amount| *account == ALICE && *amount == U256::from(10))
        .times(1)
        .returning(|_, _, _| Ok(()));
    tokens
        .expect_transfer()
        .withf(move |token, from, to, _| *token == yes && *from == ALICE && *to == custody)
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    tokens
        .expect_transfer()
        .withf(move |token, _, _, _| *token == no)
        .times(1)
        .returning(|_, _, _, _| Err(TokenError::Rejected("recipient frozen".to_string())));
    // Compensation, newest first
    tokens
        .expect_transfer()
        .withf(move |token, from, to, _| *token == yes && *from == custody && *to == ALICE)
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    tokens
        .expect_burn_pair()
        .withf(|account, _, amount| *account == ALICE && *amount == U256::from(10))
        .times(1)
        .returning(|_, _, _| Ok(()));

    let engine = PoolEngine::new(EngineConfig::default(), tokens).unwrap();
    let mut events = engine.subscribe();

    let err = engine
        .deposit_ask(
            ALICE,
            AskDeposit {
                key: target,
                amount: U256::from(10),
                recipient: BOB,
                funding: AskFunding::MintFromCollateral,
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        LedgerError::Settlement(TokenError::Rejected("recipient frozen".to_string()))
    );
    assert!(engine.pool(Book::Ask, &target).is_none());
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[test]
fn test_failed_fill_payout_leaves_pool_untouched() {
    let target = key(Outcome::No, 2_000);
    let custody = EngineConfig::default().custody_account;
    let no = target.outcome_token();

    let mut tokens = MockTokens::new();
    tokens
        .expect_transfer()
        .withf(move |token, from, _, _| *token == no && *from == ALICE)
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    tokens
        .expect_transfer()
        .withf(move |token, from, to, _| {
            *token == TokenId::Collateral && *from == TAKER && *to == custody
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    tokens
        .expect_transfer()
        .withf(move |token, from, _, _| *token == no && *from == custody)
        .times(1)
        .returning(|_, _, _, _| Err(TokenError::Rejected("paused".to_string())));
    tokens
        .expect_transfer()
        .withf(move |token, from, to, amount| {
            *token == TokenId::Collateral
                && *from == custody
                && *to == TAKER
                && *amount == U256::from(200)
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let engine = PoolEngine::new(EngineConfig::default(), tokens).unwrap();
    engine
        .deposit_ask(
            ALICE,
            AskDeposit {
                key: target,
                amount: U256::from(5_000),
                recipient: ALICE,
                funding: AskFunding::Inventory,
            },
        )
        .unwrap();
    let before = engine.pool(Book::Ask, &target).unwrap();

    let err = engine
        .fill_ask(TAKER, ask_fill_request(&target, U256::from(1_000)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Settlement(_)));
    assert_eq!(engine.pool(Book::Ask, &target).unwrap(), before);
    assert!(before.state.total_yield_earned.is_zero());
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_operator_authorization() {
    let engine = engine();
    let target = key(Outcome::Yes, 5_000);

    ask_deposit(&engine, ALICE, &target, e18(100));
    ask_fill(&engine, &target, e18(20));

    assert_eq!(
        engine.claim(Book::Ask, BOB, &target, ALICE),
        Err(LedgerError::Unauthorized {
            caller: BOB,
            owner: ALICE
        })
    );
    assert!(matches!(
        engine.withdraw_ask(BOB, &target, ALICE, U256::ZERO, false),
        Err(LedgerError::Unauthorized { .. })
    ));
    assert!(matches!(
        engine.exit_depleted(Book::Ask, BOB, &target, ALICE),
        Err(LedgerError::Unauthorized { .. })
    ));

    engine.set_operator(ALICE, BOB, true).unwrap();

    // Proceeds and inventory go to the owner, not the operator
    assert_eq!(engine.claim(Book::Ask, BOB, &target, ALICE).unwrap(), e18(10));
    engine
        .withdraw_ask(BOB, &target, ALICE, e18(30), false)
        .unwrap();
    assert_eq!(collateral(&engine, ALICE), e18(10));
    assert_eq!(shares(&engine, ALICE, &target), e18(30));
    assert_eq!(collateral(&engine, BOB), U256::ZERO);
    assert_eq!(shares(&engine, BOB, &target), U256::ZERO);

    engine.set_operator(ALICE, BOB, false).unwrap();
    assert!(matches!(
        engine.claim(Book::Ask, BOB, &target, ALICE),
        Err(LedgerError::Unauthorized { .. })
    ));
}

#[test]
fn test_unauthorized_checked_before_pool_state() {
    let engine = engine();
    let target = key(Outcome::Yes, 5_000);

    ask_deposit(&engine, ALICE, &target, e18(10));
    ask_fill(&engine, &target, e18(10));

    // Depleted pool, but the caller check wins
    assert!(matches!(
        engine.withdraw_ask(BOB, &target, ALICE, U256::ZERO, false),
        Err(LedgerError::Unauthorized { .. })
    ));
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_events_follow_commits() {
    let _ = pmpool_telemetry::init_logging();
    let engine = engine();
    let target = key(Outcome::Yes, 5_000);
    let mut events = engine.subscribe();

    ask_deposit(&engine, ALICE, &target, e18(10));
    ask_fill(&engine, &target, e18(10));
    engine
        .exit_depleted(Book::Ask, ALICE, &target, ALICE)
        .unwrap();

    let names: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.name())
        .collect();
    assert_eq!(
        names,
        vec!["pool_created", "deposited", "filled", "exited_depleted"]
    );

    // Rejections publish nothing
    assert!(engine
        .exit_depleted(Book::Ask, ALICE, &target, ALICE)
        .is_err());
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[test]
fn test_filled_event_payload() {
    let engine = engine();
    let target = key(Outcome::Yes, 5_000);
    ask_deposit(&engine, ALICE, &target, e18(10));

    let mut events = engine.subscribe();
    ask_fill(&engine, &target, e18(4));

    match events.try_recv().unwrap() {
        PoolEvent::Filled {
            pool_id,
            book,
            taker,
            inventory_out,
            yield_in,
            depleted,
            ..
        } => {
            assert_eq!(pool_id, target.pool_id(Book::Ask));
            assert_eq!(book, Book::Ask);
            assert_eq!(taker, TAKER);
            assert_eq!(inventory_out, e18(4));
            assert_eq!(yield_in, e18(2));
            assert!(!depleted);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// ============================================================================
// Serialization across threads
// ============================================================================

#[test]
fn test_concurrent_fills_are_serialized() {
    let engine = Arc::new(engine());
    let target = key(Outcome::Yes, 5_000);
    ask_deposit(&engine, ALICE, &target, e18(1_000));

    let takers: Vec<Address> = (1..=8u8).map(|i| Address::repeat_byte(0x40 + i)).collect();
    for taker in &takers {
        engine.tokens().credit(*taker, TokenId::Collateral, e18(100));
    }

    std::thread::scope(|scope| {
        for taker in &takers {
            let engine = Arc::clone(&engine);
            let taker = *taker;
            scope.spawn(move || {
                for _ in 0..10 {
                    let mut request = ask_fill_request(&target, e18(2));
                    request.recipient = taker;
                    engine.fill_ask(taker, request).unwrap();
                }
            });
        }
    });

    // 8 takers x 10 fills x 2 shares
    let pool = engine.pool(Book::Ask, &target).unwrap();
    assert_eq!(pool.state.total_inventory, e18(840));
    assert_eq!(pool.state.total_yield_earned, e18(80));
    for taker in &takers {
        assert_eq!(shares(&engine, *taker, &target), e18(20));
        assert_eq!(collateral(&engine, *taker), e18(90));
    }
    assert_eq!(
        engine.position(Book::Ask, &target, ALICE).unwrap().pending_yield,
        e18(80)
    );
    assert!(engine.solvency().unwrap().is_solvent());
}

#[test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!("pmpool-config-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "event_channel_capacity = 4\ndefault_max_fill_bps = 5000\n",
    )
    .unwrap();

    let config = EngineConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let engine = PoolEngine::new(config, InMemoryTokens::new()).unwrap();
    let target = key(Outcome::Yes, 5_000);
    engine.tokens().credit(ALICE, target.outcome_token(), e18(10));
    engine
        .deposit_ask(
            ALICE,
            AskDeposit {
                key: target,
                amount: e18(10),
                recipient: ALICE,
                funding: AskFunding::Inventory,
            },
        )
        .unwrap();

    // Default cap halves the fill
    let quote = engine.quote_ask_fill(&target, e18(10), None).unwrap();
    assert_eq!(quote.filled, e18(5));
    let quote = engine
        .quote_ask_fill(&target, e18(10), Some(10_000))
        .unwrap();
    assert_eq!(quote.filled, e18(10));
}
