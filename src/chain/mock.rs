// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory [`ChainApi`] double for engine, cache, and monitor tests.
//!
//! Mirrors the client's contract: transient submission errors are retried
//! inside the real client, so scripted results here represent post-retry
//! outcomes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::client::{ChainApi, ChainError, TxDetails};
use super::Token;

/// Scripted chain double.
#[derive(Default)]
pub struct MockChain {
    token_balances: Mutex<HashMap<(String, Token), Decimal>>,
    sol_balances: Mutex<HashMap<String, Decimal>>,
    /// Outcomes popped per `transfer_token` call; empty queue yields
    /// sequential `SIG{n}` signatures.
    transfer_script: Mutex<VecDeque<Result<String, String>>>,
    confirmed: Mutex<HashSet<String>>,
    details: Mutex<HashMap<String, TxDetails>>,
    token_balance_calls: AtomicUsize,
    sol_balance_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token_balance(&self, pubkey: &str, token: Token, balance: Decimal) {
        self.token_balances
            .lock()
            .unwrap()
            .insert((pubkey.to_string(), token), balance);
    }

    pub fn set_sol_balance(&self, pubkey: &str, balance: Decimal) {
        self.sol_balances
            .lock()
            .unwrap()
            .insert(pubkey.to_string(), balance);
    }

    /// Queue the outcome of the next transfer; `Err` strings become
    /// terminal `ChainError::Rpc` failures.
    pub fn script_transfer(&self, outcome: Result<&str, &str>) {
        self.transfer_script.lock().unwrap().push_back(
            outcome
                .map(|s| s.to_string())
                .map_err(|e| e.to_string()),
        );
    }

    pub fn mark_confirmed(&self, signature: &str) {
        self.confirmed.lock().unwrap().insert(signature.to_string());
    }

    pub fn set_details(&self, signature: &str, details: TxDetails) {
        self.details
            .lock()
            .unwrap()
            .insert(signature.to_string(), details);
    }

    pub fn token_balance_calls(&self) -> usize {
        self.token_balance_calls.load(Ordering::SeqCst)
    }

    pub fn sol_balance_calls(&self) -> usize {
        self.sol_balance_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainApi for MockChain {
    async fn transfer_token(
        &self,
        _secret: &[u8; 64],
        _recipient: &str,
        _amount: Decimal,
        _token: Token,
    ) -> Result<String, ChainError> {
        let call = self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        match self.transfer_script.lock().unwrap().pop_front() {
            Some(Ok(signature)) => Ok(signature),
            Some(Err(message)) => Err(ChainError::Rpc(message)),
            None => Ok(format!("SIG{}", call + 1)),
        }
    }

    async fn get_token_balance(&self, pubkey: &str, token: Token) -> Result<Decimal, ChainError> {
        self.token_balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&(pubkey.to_string(), token))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_sol_balance(&self, pubkey: &str) -> Result<Decimal, ChainError> {
        self.sol_balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .sol_balances
            .lock()
            .unwrap()
            .get(pubkey)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn ensure_ata(
        &self,
        _wallet_pub: &str,
        _token: Token,
        _payer: Option<&[u8; 64]>,
    ) -> Result<(), ChainError> {
        Ok(())
    }

    async fn is_confirmed(&self, signature: &str) -> Result<bool, ChainError> {
        Ok(self.confirmed.lock().unwrap().contains(signature))
    }

    async fn get_tx_details(&self, signature: &str) -> Result<Option<TxDetails>, ChainError> {
        Ok(self.details.lock().unwrap().get(signature).copied())
    }

    async fn estimate_transfer_fee(
        &self,
        _sender: &str,
        _recipient: &str,
        _token: Token,
    ) -> Result<u64, ChainError> {
        Ok(5_000)
    }

    async fn wait_for_confirmation(
        &self,
        signature: &str,
        _timeout: Duration,
    ) -> Result<bool, ChainError> {
        self.is_confirmed(signature).await
    }
}
