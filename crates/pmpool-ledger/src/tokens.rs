//! Outcome-token collaborator.
//!
//! The ledgers never custody value themselves; they drive an external market
//! contract through four atomic primitives. [`InMemoryTokens`] is a complete
//! balance-sheet implementation used for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use parking_lot::Mutex;
use pmpool_core::{MarketId, Outcome, TokenId};

use crate::error::{TokenError, TokenResult};

/// Primitives consumed from the outcome-token market.
///
/// Each call either fully succeeds or fully fails.
pub trait OutcomeTokens: Send + Sync {
    /// Convert `collateral` of `account`'s collateral into the same amount of
    /// both outcome tokens of `market`.
    fn mint_pair(&self, account: Address, market: MarketId, collateral: U256) -> TokenResult<()>;

    /// Merge `amount` of both outcome tokens of `market` back into collateral.
    fn burn_pair(&self, account: Address, market: MarketId, amount: U256) -> TokenResult<()>;

    /// Move `amount` of `token` from `from` to `to`.
    fn transfer(&self, token: TokenId, from: Address, to: Address, amount: U256)
        -> TokenResult<()>;

    /// Current balance of `token` held by `account`.
    fn balance_of(&self, account: Address, token: TokenId) -> U256;
}

impl<T: OutcomeTokens + ?Sized> OutcomeTokens for Arc<T> {
    fn mint_pair(&self, account: Address, market: MarketId, collateral: U256) -> TokenResult<()> {
        (**self).mint_pair(account, market, collateral)
    }

    fn burn_pair(&self, account: Address, market: MarketId, amount: U256) -> TokenResult<()> {
        (**self).burn_pair(account, market, amount)
    }

    fn transfer(
        &self,
        token: TokenId,
        from: Address,
        to: Address,
        amount: U256,
    ) -> TokenResult<()> {
        (**self).transfer(token, from, to, amount)
    }

    fn balance_of(&self, account: Address, token: TokenId) -> U256 {
        (**self).balance_of(account, token)
    }
}

// ============================================================================
// InMemoryTokens
// ============================================================================

/// Balance sheet keyed by (account, token).
#[derive(Debug, Default)]
pub struct InMemoryTokens {
    balances: Mutex<HashMap<(Address, TokenId), U256>>,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` of `token` to `account` out of thin air (faucet).
    pub fn credit(&self, account: Address, token: TokenId, amount: U256) {
        let mut balances = self.balances.lock();
        let entry = balances.entry((account, token)).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Sum of all balances of `token`.
    pub fn total_supply(&self, token: TokenId) -> U256 {
        self.balances
            .lock()
            .iter()
            .filter(|((_, t), _)| *t == token)
            .fold(U256::ZERO, |acc, (_, v)| acc.saturating_add(*v))
    }
}

fn debit(
    balances: &mut HashMap<(Address, TokenId), U256>,
    account: Address,
    token: TokenId,
    amount: U256,
) -> TokenResult<()> {
    let available = balances.get(&(account, token)).copied().unwrap_or_default();
    if available < amount {
        return Err(TokenError::InsufficientBalance {
            account,
            token,
            needed: amount,
            available,
        });
    }
    balances.insert((account, token), available - amount);
    Ok(())
}

fn credit(
    balances: &mut HashMap<(Address, TokenId), U256>,
    account: Address,
    token: TokenId,
    amount: U256,
) -> TokenResult<()> {
    let entry = balances.entry((account, token)).or_default();
    *entry = entry
        .checked_add(amount)
        .ok_or_else(|| TokenError::Rejected(format!("{token} balance overflow")))?;
    Ok(())
}

impl OutcomeTokens for InMemoryTokens {
    fn mint_pair(&self, account: Address, market: MarketId, collateral: U256) -> TokenResult<()> {
        let mut balances = self.balances.lock();
        debit(&mut balances, account, TokenId::Collateral, collateral)?;
        credit(
            &mut balances,
            account,
            TokenId::Outcome(market, Outcome::Yes),
            collateral,
        )?;
        credit(
            &mut balances,
            account,
            TokenId::Outcome(market, Outcome::No),
            collateral,
        )
    }

    fn burn_pair(&self, account: Address, market: MarketId, amount: U256) -> TokenResult<()> {
        let mut balances = self.balances.lock();
        let yes = TokenId::Outcome(market, Outcome::Yes);
        let no = TokenId::Outcome(market, Outcome::No);

        // Check both legs before touching either
        for token in [yes, no] {
            let available = balances.get(&(account, token)).copied().unwrap_or_default();
            if available < amount {
                return Err(TokenError::InsufficientBalance {
                    account,
                    token,
                    needed: amount,
                    available,
                });
            }
        }
        debit(&mut balances, account, yes, amount)?;
        debit(&mut balances, account, no, amount)?;
        credit(&mut balances, account, TokenId::Collateral, amount)
    }

    fn transfer(
        &self,
        token: TokenId,
        from: Address,
        to: Address,
        amount: U256,
    ) -> TokenResult<()> {
        let mut balances = self.balances.lock();
        debit(&mut balances, from, token, amount)?;
        credit(&mut balances, to, token, amount)
    }

    fn balance_of(&self, account: Address, token: TokenId) -> U256 {
        self.balances
            .lock()
            .get(&(account, token))
            .copied()
            .unwrap_or_default()
    }
}
