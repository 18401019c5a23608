// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-TTL read-through balance cache.
//!
//! Sits in front of the chain client with explicit invalidation: the
//! payment engine invalidates sender and receiver keys after every
//! successful submission, and the monitor after every confirmed
//! transition. Token balances live 30 s, SOL 60 s.
//!
//! Keys follow the `balance:token:{TOKEN}:{pub}` / `balance:sol:{pub}`
//! scheme so a network-backed store can be slotted behind the same
//! contract.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::chain::{ChainApi, ChainError, Token};

/// TTL for token balance entries.
const TOKEN_TTL: Duration = Duration::from_secs(30);
/// TTL for SOL balance entries.
const SOL_TTL: Duration = Duration::from_secs(60);
/// Max cached keys.
const CAPACITY: usize = 4096;

/// Minimum SOL considered sufficient for transaction fees.
pub fn default_min_fee_sol() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Cached value with its fetch time.
struct CacheEntry {
    balance: Decimal,
    fetched_at: Instant,
}

/// Composite balances for one wallet.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalances {
    pub usdc: Decimal,
    pub usdt: Decimal,
    pub sol: Decimal,
}

/// Read-through balance cache over the chain client.
pub struct BalanceCache {
    chain: Arc<dyn ChainApi>,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

fn token_key(pubkey: &str, token: Token) -> String {
    format!("balance:token:{}:{pubkey}", token.symbol())
}

fn sol_key(pubkey: &str) -> String {
    format!("balance:sol:{pubkey}")
}

impl BalanceCache {
    pub fn new(chain: Arc<dyn ChainApi>) -> Self {
        Self {
            chain,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Cached lookup; expired entries are dropped. The lock is never held
    /// across an await point.
    fn lookup(&self, key: &str, ttl: Duration) -> Option<Decimal> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(key) {
            if entry.fetched_at.elapsed() < ttl {
                return Some(entry.balance);
            }
            cache.pop(key);
        }
        None
    }

    fn store(&self, key: String, balance: Decimal) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                key,
                CacheEntry {
                    balance,
                    fetched_at: Instant::now(),
                },
            );
        }
    }

    /// Token balance, served from cache unless `force` or expired.
    pub async fn get_token_balance(
        &self,
        pubkey: &str,
        token: Token,
        force: bool,
    ) -> Result<Decimal, ChainError> {
        let key = token_key(pubkey, token);
        if !force {
            if let Some(balance) = self.lookup(&key, TOKEN_TTL) {
                return Ok(balance);
            }
        }

        let balance = self.chain.get_token_balance(pubkey, token).await?;
        self.store(key, balance);
        Ok(balance)
    }

    /// SOL balance, served from cache unless `force` or expired.
    pub async fn get_sol_balance(&self, pubkey: &str, force: bool) -> Result<Decimal, ChainError> {
        let key = sol_key(pubkey);
        if !force {
            if let Some(balance) = self.lookup(&key, SOL_TTL) {
                return Ok(balance);
            }
        }

        let balance = self.chain.get_sol_balance(pubkey).await?;
        self.store(key, balance);
        Ok(balance)
    }

    /// USDC, USDT, and SOL fetched in parallel.
    pub async fn get_all_balances(
        &self,
        pubkey: &str,
        force: bool,
    ) -> Result<WalletBalances, ChainError> {
        let (usdc, usdt, sol) = tokio::join!(
            self.get_token_balance(pubkey, Token::Usdc, force),
            self.get_token_balance(pubkey, Token::Usdt, force),
            self.get_sol_balance(pubkey, force),
        );

        Ok(WalletBalances {
            usdc: usdc?,
            usdt: usdt?,
            sol: sol?,
        })
    }

    /// Drop the given token's key, or all three keys when `token` is None.
    pub fn invalidate(&self, pubkey: &str, token: Option<Token>) {
        if let Ok(mut cache) = self.cache.lock() {
            match token {
                Some(token) => {
                    cache.pop(&token_key(pubkey, token));
                }
                None => {
                    cache.pop(&token_key(pubkey, Token::Usdc));
                    cache.pop(&token_key(pubkey, Token::Usdt));
                    cache.pop(&sol_key(pubkey));
                }
            }
        }
    }

    /// `(sufficient, current)` for a required token amount, using cached
    /// reads.
    pub async fn check_sufficient_balance(
        &self,
        pubkey: &str,
        required: Decimal,
        token: Token,
    ) -> Result<(bool, Decimal), ChainError> {
        let current = self.get_token_balance(pubkey, token, false).await?;
        Ok((current >= required, current))
    }

    /// `(sufficient, current)` for fee SOL, default minimum 0.01.
    pub async fn check_sufficient_sol_for_fees(
        &self,
        pubkey: &str,
        min: Option<Decimal>,
    ) -> Result<(bool, Decimal), ChainError> {
        let min = min.unwrap_or_else(default_min_fee_sol);
        let current = self.get_sol_balance(pubkey, false).await?;
        Ok((current >= min, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use rust_decimal_macros::dec;

    fn setup(balance: Decimal) -> (Arc<MockChain>, BalanceCache) {
        let chain = Arc::new(MockChain::new());
        chain.set_token_balance("wallet-a", Token::Usdc, balance);
        chain.set_sol_balance("wallet-a", dec!(0.5));
        let cache = BalanceCache::new(chain.clone());
        (chain, cache)
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let (chain, cache) = setup(dec!(100));

        let first = cache
            .get_token_balance("wallet-a", Token::Usdc, false)
            .await
            .unwrap();
        assert_eq!(first, dec!(100));
        assert_eq!(chain.token_balance_calls(), 1);

        let second = cache
            .get_token_balance("wallet-a", Token::Usdc, false)
            .await
            .unwrap();
        assert_eq!(second, dec!(100));
        assert_eq!(chain.token_balance_calls(), 1);
    }

    #[tokio::test]
    async fn force_bypasses_cache() {
        let (chain, cache) = setup(dec!(100));

        cache
            .get_token_balance("wallet-a", Token::Usdc, false)
            .await
            .unwrap();
        cache
            .get_token_balance("wallet-a", Token::Usdc, true)
            .await
            .unwrap();
        assert_eq!(chain.token_balance_calls(), 2);
    }

    #[tokio::test]
    async fn invalidation_forces_chain_read() {
        let (chain, cache) = setup(dec!(100));

        cache
            .get_token_balance("wallet-a", Token::Usdc, false)
            .await
            .unwrap();
        cache.invalidate("wallet-a", Some(Token::Usdc));

        chain.set_token_balance("wallet-a", Token::Usdc, dec!(75));
        let after = cache
            .get_token_balance("wallet-a", Token::Usdc, false)
            .await
            .unwrap();
        assert_eq!(after, dec!(75));
        assert_eq!(chain.token_balance_calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_all_clears_sol_too() {
        let (chain, cache) = setup(dec!(100));

        cache.get_all_balances("wallet-a", false).await.unwrap();
        cache.invalidate("wallet-a", None);

        cache.get_sol_balance("wallet-a", false).await.unwrap();
        assert_eq!(chain.sol_balance_calls(), 2);
    }

    #[tokio::test]
    async fn all_balances_compose() {
        let (chain, cache) = setup(dec!(100));
        chain.set_token_balance("wallet-a", Token::Usdt, dec!(3));

        let balances = cache.get_all_balances("wallet-a", false).await.unwrap();
        assert_eq!(balances.usdc, dec!(100));
        assert_eq!(balances.usdt, dec!(3));
        assert_eq!(balances.sol, dec!(0.5));
    }

    #[tokio::test]
    async fn sufficiency_checks() {
        let (_chain, cache) = setup(dec!(10));

        let (ok, current) = cache
            .check_sufficient_balance("wallet-a", dec!(25), Token::Usdc)
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(current, dec!(10));

        let (ok, current) = cache
            .check_sufficient_sol_for_fees("wallet-a", None)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(current, dec!(0.5));
    }
}
