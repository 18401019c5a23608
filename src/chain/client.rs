// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! High-level Solana client for the payment pipeline.
//!
//! Wraps the JSON-RPC transport with typed operations: SPL token transfers
//! (including recipient ATA creation paid by the sender), balance reads,
//! signature status queries, fee estimation, and confirmation waits.
//!
//! ## Retry policy
//!
//! Submissions (`transfer_token`, `ensure_ata`) retry up to 3 times with
//! delays of 1s/2s/4s, but only on errors whose message indicates a
//! transient condition: blockhash, timeout, rate limit, connection, or
//! network. Validation failures, insufficient balance, and program errors
//! are terminal.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::rpc::{RpcClient, RpcError};
use super::tx::{
    self, create_ata_instruction, derive_associated_token_account, is_valid_address,
    pubkey_from_secret, token_transfer_instruction, Instruction, Message, Pubkey,
};
use super::{from_raw_amount, lamports_to_sol, to_raw_amount, Token};
use crate::config::SolanaConfig;

/// Submission retry schedule.
const SUBMIT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Poll interval for `wait_for_confirmation`.
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Flat fee fallback when the node cannot quote one (lamports).
const FALLBACK_FEE: u64 = 5_000;
/// Fallback when the transfer also creates the recipient ATA (lamports).
const FALLBACK_FEE_WITH_ATA: u64 = 2_044_280;

/// Message fragments that mark an RPC failure as transient.
const RETRYABLE_FRAGMENTS: [&str; 5] =
    ["blockhash", "timeout", "rate limit", "connection", "network"];

/// Chain operation errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("{0}")]
    Validation(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Associated token account missing for {wallet} ({token}) and no payer provided")]
    AtaMissing { wallet: String, token: Token },

    #[error("RPC failure: {0}")]
    Rpc(String),
}

impl ChainError {
    /// Whether a submission hitting this error should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Rpc(message) => is_retryable_message(message),
            _ => false,
        }
    }
}

impl From<RpcError> for ChainError {
    fn from(e: RpcError) -> Self {
        ChainError::Rpc(e.to_string())
    }
}

impl From<tx::TxError> for ChainError {
    fn from(e: tx::TxError) -> Self {
        ChainError::Validation(e.to_string())
    }
}

/// Classify an error message as transient.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Details of an on-chain transaction, as seen by the monitor.
#[derive(Debug, Clone, Copy)]
pub struct TxDetails {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub fee: u64,
    pub is_success: bool,
}

/// Chain operations consumed by the payment engine, balance cache, and
/// monitor. The trait seam keeps those components testable without a node.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Submit an SPL token transfer signed by `secret`. Creates the
    /// recipient's ATA (paid by the sender) when missing. Returns the
    /// submitted signature.
    async fn transfer_token(
        &self,
        secret: &[u8; 64],
        recipient: &str,
        amount: Decimal,
        token: Token,
    ) -> Result<String, ChainError>;

    /// Token balance for a wallet. Zero on any lookup failure; wallets
    /// without an ATA hold zero.
    async fn get_token_balance(&self, pubkey: &str, token: Token) -> Result<Decimal, ChainError>;

    /// Native SOL balance.
    async fn get_sol_balance(&self, pubkey: &str) -> Result<Decimal, ChainError>;

    /// Create the wallet's ATA for `token` if missing. Requires a payer
    /// when it is.
    async fn ensure_ata(
        &self,
        wallet_pub: &str,
        token: Token,
        payer: Option<&[u8; 64]>,
    ) -> Result<(), ChainError>;

    /// True iff the signature status is `confirmed` or `finalized`.
    async fn is_confirmed(&self, signature: &str) -> Result<bool, ChainError>;

    /// Slot, block time, fee, and success flag, or `None` if the chain has
    /// not seen the signature.
    async fn get_tx_details(&self, signature: &str) -> Result<Option<TxDetails>, ChainError>;

    /// Network fee in lamports for the transfer `sender → recipient`,
    /// falling back to flat estimates when the node cannot quote.
    async fn estimate_transfer_fee(
        &self,
        sender: &str,
        recipient: &str,
        token: Token,
    ) -> Result<u64, ChainError>;

    /// Poll `is_confirmed` every 500 ms until `timeout`.
    async fn wait_for_confirmation(
        &self,
        signature: &str,
        timeout: Duration,
    ) -> Result<bool, ChainError>;
}

/// Solana JSON-RPC client facade.
pub struct SolanaClient {
    rpc: RpcClient,
    commitment: String,
    use_devnet: bool,
}

impl SolanaClient {
    pub fn new(config: &SolanaConfig) -> Result<Self, ChainError> {
        Ok(Self {
            rpc: RpcClient::new(&config.rpc_url)?,
            commitment: config.commitment.clone(),
            use_devnet: config.use_devnet,
        })
    }

    fn mint(&self, token: Token) -> Result<Pubkey, ChainError> {
        Ok(Pubkey::from_base58(token.mint(self.use_devnet))?)
    }

    /// Fetch the latest blockhash as raw bytes.
    async fn latest_blockhash(&self) -> Result<[u8; 32], ChainError> {
        let result = self
            .rpc
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        let hash_str = result["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| ChainError::Rpc("malformed getLatestBlockhash response".into()))?;
        let bytes = bs58::decode(hash_str)
            .into_vec()
            .map_err(|e| ChainError::Rpc(format!("bad blockhash encoding: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| ChainError::Rpc("blockhash is not 32 bytes".into()))
    }

    /// Whether an account exists at the given address.
    async fn account_exists(&self, pubkey: &Pubkey) -> Result<bool, ChainError> {
        let result = self
            .rpc
            .call(
                "getAccountInfo",
                json!([
                    pubkey.to_base58(),
                    { "encoding": "base64", "commitment": self.commitment }
                ]),
            )
            .await?;
        Ok(!result["value"].is_null())
    }

    /// Raw token balance of an ATA. Missing accounts read as zero;
    /// transport failures propagate.
    async fn token_balance_raw(&self, ata: &Pubkey) -> Result<u64, ChainError> {
        let result = self
            .rpc
            .call(
                "getTokenAccountBalance",
                json!([ata.to_base58(), { "commitment": self.commitment }]),
            )
            .await;

        match result {
            Ok(value) => {
                let amount = value["value"]["amount"]
                    .as_str()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| {
                        ChainError::Rpc("malformed getTokenAccountBalance response".into())
                    })?;
                Ok(amount)
            }
            Err(RpcError::Node { message, .. }) if message.contains("could not find account") => {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize, submit, and return the signature of a signed transaction.
    async fn send_wire(&self, wire: &[u8]) -> Result<String, ChainError> {
        let encoded = BASE64.encode(wire);
        let result = self
            .rpc
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    { "encoding": "base64", "preflightCommitment": self.commitment }
                ]),
            )
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ChainError::Rpc("sendTransaction returned no signature".into()))
    }

    /// Build, sign, and submit in one attempt. The blockhash is fetched
    /// inside the attempt so a blockhash retry starts fresh.
    async fn submit_once(
        &self,
        instructions: &[Instruction],
        payer: Pubkey,
        secret: &[u8; 64],
    ) -> Result<String, ChainError> {
        let blockhash = self.latest_blockhash().await?;
        let message = Message::compile(instructions, payer, blockhash);
        let (_signature, wire) = tx::sign_and_serialize(&message, secret)?;
        self.send_wire(&wire).await
    }

    /// Submit with the bounded retry schedule for transient failures.
    async fn submit_with_retry(
        &self,
        instructions: &[Instruction],
        payer: Pubkey,
        secret: &[u8; 64],
    ) -> Result<String, ChainError> {
        let mut attempt = 0usize;
        loop {
            match self.submit_once(instructions, payer, secret).await {
                Ok(signature) => return Ok(signature),
                Err(e) if e.is_retryable() && attempt < SUBMIT_RETRY_DELAYS.len() => {
                    let delay = SUBMIT_RETRY_DELAYS[attempt];
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient submission failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ChainApi for SolanaClient {
    async fn transfer_token(
        &self,
        secret: &[u8; 64],
        recipient: &str,
        amount: Decimal,
        token: Token,
    ) -> Result<String, ChainError> {
        if amount <= Decimal::ZERO {
            return Err(ChainError::Validation(
                "transfer amount must be positive".to_string(),
            ));
        }
        if !is_valid_address(recipient) {
            return Err(ChainError::Validation(format!(
                "invalid recipient address: {recipient}"
            )));
        }
        let raw = to_raw_amount(amount)
            .ok_or_else(|| ChainError::Validation("amount out of range".to_string()))?;

        let sender = pubkey_from_secret(secret)?;
        let recipient_pub = Pubkey::from_base58(recipient)?;
        let mint = self.mint(token)?;

        let sender_ata = derive_associated_token_account(&sender, &mint)?;
        let recipient_ata = derive_associated_token_account(&recipient_pub, &mint)?;

        let available_raw = self.token_balance_raw(&sender_ata).await?;
        if available_raw < raw {
            return Err(ChainError::InsufficientBalance {
                requested: amount,
                available: from_raw_amount(available_raw),
            });
        }

        let mut instructions = Vec::with_capacity(2);
        if !self.account_exists(&recipient_ata).await? {
            tracing::info!(
                recipient = %recipient_pub,
                token = %token,
                "recipient ATA missing, sender pays creation"
            );
            instructions.push(create_ata_instruction(
                sender,
                recipient_ata,
                recipient_pub,
                mint,
            )?);
        }
        instructions.push(token_transfer_instruction(
            sender_ata,
            recipient_ata,
            sender,
            raw,
        )?);

        self.submit_with_retry(&instructions, sender, secret).await
    }

    async fn get_token_balance(&self, pubkey: &str, token: Token) -> Result<Decimal, ChainError> {
        let owner = match Pubkey::from_base58(pubkey) {
            Ok(p) => p,
            Err(_) => return Ok(Decimal::ZERO),
        };
        let mint = self.mint(token)?;
        let ata = derive_associated_token_account(&owner, &mint)?;

        match self.token_balance_raw(&ata).await {
            Ok(raw) => Ok(from_raw_amount(raw)),
            Err(e) => {
                tracing::debug!(pubkey, token = %token, error = %e, "balance lookup failed");
                Ok(Decimal::ZERO)
            }
        }
    }

    async fn get_sol_balance(&self, pubkey: &str) -> Result<Decimal, ChainError> {
        let result = self
            .rpc
            .call(
                "getBalance",
                json!([pubkey, { "commitment": self.commitment }]),
            )
            .await?;
        let lamports = result["value"]
            .as_u64()
            .ok_or_else(|| ChainError::Rpc("malformed getBalance response".into()))?;
        Ok(lamports_to_sol(lamports))
    }

    async fn ensure_ata(
        &self,
        wallet_pub: &str,
        token: Token,
        payer: Option<&[u8; 64]>,
    ) -> Result<(), ChainError> {
        let owner = Pubkey::from_base58(wallet_pub)?;
        let mint = self.mint(token)?;
        let ata = derive_associated_token_account(&owner, &mint)?;

        if self.account_exists(&ata).await? {
            return Ok(());
        }

        let payer_secret = payer.ok_or_else(|| ChainError::AtaMissing {
            wallet: wallet_pub.to_string(),
            token,
        })?;
        let payer_pub = pubkey_from_secret(payer_secret)?;

        let instruction = create_ata_instruction(payer_pub, ata, owner, mint)?;
        self.submit_with_retry(&[instruction], payer_pub, payer_secret)
            .await?;
        Ok(())
    }

    async fn is_confirmed(&self, signature: &str) -> Result<bool, ChainError> {
        let result = self
            .rpc
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        let status = &result["value"][0];
        if status.is_null() {
            return Ok(false);
        }
        let confirmation = status["confirmationStatus"].as_str().unwrap_or("");
        Ok(confirmation == "confirmed" || confirmation == "finalized")
    }

    async fn get_tx_details(&self, signature: &str) -> Result<Option<TxDetails>, ChainError> {
        let result = self
            .rpc
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": self.commitment,
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        let slot = result["slot"].as_u64().unwrap_or(0);
        let block_time = result["blockTime"].as_i64();
        let fee = result["meta"]["fee"].as_u64().unwrap_or(0);
        let is_success = result["meta"]["err"].is_null();

        Ok(Some(TxDetails {
            slot,
            block_time,
            fee,
            is_success,
        }))
    }

    async fn estimate_transfer_fee(
        &self,
        sender: &str,
        recipient: &str,
        token: Token,
    ) -> Result<u64, ChainError> {
        let sender_pub = Pubkey::from_base58(sender)?;
        let recipient_pub = Pubkey::from_base58(recipient)?;
        let mint = self.mint(token)?;

        let sender_ata = derive_associated_token_account(&sender_pub, &mint)?;
        let recipient_ata = derive_associated_token_account(&recipient_pub, &mint)?;

        let creates_ata = match self.account_exists(&recipient_ata).await {
            Ok(exists) => !exists,
            Err(_) => false,
        };

        let mut instructions = Vec::with_capacity(2);
        if creates_ata {
            if let Ok(ix) = create_ata_instruction(sender_pub, recipient_ata, recipient_pub, mint) {
                instructions.push(ix);
            }
        }
        // Fee quotes do not execute; a placeholder amount is fine.
        if let Ok(ix) = token_transfer_instruction(sender_ata, recipient_ata, sender_pub, 1) {
            instructions.push(ix);
        }

        let fallback = if creates_ata {
            FALLBACK_FEE_WITH_ATA
        } else {
            FALLBACK_FEE
        };

        let blockhash = match self.latest_blockhash().await {
            Ok(hash) => hash,
            Err(_) => return Ok(fallback),
        };
        let message = Message::compile(&instructions, sender_pub, blockhash);
        let encoded = BASE64.encode(message.serialize());

        match self
            .rpc
            .call(
                "getFeeForMessage",
                json!([encoded, { "commitment": self.commitment }]),
            )
            .await
        {
            Ok(result) => Ok(result["value"].as_u64().unwrap_or(fallback)),
            Err(_) => Ok(fallback),
        }
    }

    async fn wait_for_confirmation(
        &self,
        signature: &str,
        timeout: Duration,
    ) -> Result<bool, ChainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_confirmed(signature).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(is_retryable_message("Blockhash not found"));
        assert!(is_retryable_message("request timeout after 30s"));
        assert!(is_retryable_message("429 rate limit exceeded"));
        assert!(is_retryable_message("connection reset by peer"));
        assert!(is_retryable_message("network unreachable"));

        assert!(!is_retryable_message("ValidationException: bad input"));
        assert!(!is_retryable_message("insufficient funds for instruction"));
        assert!(!is_retryable_message("custom program error: 0x1"));
    }

    #[test]
    fn chain_error_retryability() {
        assert!(ChainError::Rpc("Blockhash not found".into()).is_retryable());
        assert!(!ChainError::Rpc("program error".into()).is_retryable());
        assert!(!ChainError::Validation("bad address".into()).is_retryable());
        assert!(!ChainError::InsufficientBalance {
            requested: Decimal::from(25),
            available: Decimal::from(10),
        }
        .is_retryable());
    }

    #[test]
    fn retry_schedule_is_bounded() {
        assert_eq!(SUBMIT_RETRY_DELAYS.len(), 3);
        assert_eq!(SUBMIT_RETRY_DELAYS[0], Duration::from_secs(1));
        assert_eq!(SUBMIT_RETRY_DELAYS[2], Duration::from_secs(4));
    }

    #[test]
    fn fee_fallbacks() {
        assert_eq!(FALLBACK_FEE, 5_000);
        assert_eq!(FALLBACK_FEE_WITH_ATA, 2_044_280);
    }
}
