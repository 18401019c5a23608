// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment engine: idempotent intake through chain submission.
//!
//! `send_payment` runs the full pipeline: idempotency lookup, rate limit,
//! account checks, daily/monthly limits, receiver resolution, cached
//! balance pre-check, persistence, scoped secret acquisition, submission,
//! cache invalidation, and audit.
//!
//! After a successful submit the record stays `Processing`; the monitor
//! owns the authoritative transition to Confirmed or Failed, which keeps
//! the status sequence monotone.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use super::limits::{advance_limit_windows, check_transfer_limits, record_transfer};
use super::rate_limit::RateLimiter;
use crate::auth::normalize_phone;
use crate::cache::BalanceCache;
use crate::chain::tx::is_valid_address;
use crate::chain::{ChainApi, ChainError, Token};
use crate::error::ServiceError;
use crate::monitor::scheduler::{AdhocJob, JobQueue};
use crate::storage::{
    AuditEntry, AuditLog, Database, IdempotentInsert, TransactionRecord, TxStatus, User,
    WalletRecord,
};
use crate::wallet::{WalletCrypto, WalletCryptoError};

/// Request bounds from the HTTP contract.
const MIN_AMOUNT: &str = "0.01";
const MAX_AMOUNT: &str = "10000";
const IDEMPOTENCY_KEY_MIN: usize = 16;
const IDEMPOTENCY_KEY_MAX: usize = 64;

/// A user-level transfer intent.
#[derive(Debug, Clone)]
pub struct SendPaymentRequest {
    pub recipient_phone: String,
    pub amount: Decimal,
    pub token: Token,
    pub idempotency_key: String,
}

/// A withdrawal intent to an external address.
#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub destination_address: String,
    pub amount: Decimal,
    pub token: Token,
    pub idempotency_key: String,
}

/// The payment pipeline.
pub struct PaymentEngine {
    db: Arc<Database>,
    chain: Arc<dyn ChainApi>,
    cache: Arc<BalanceCache>,
    crypto: Arc<WalletCrypto>,
    limiter: Arc<dyn RateLimiter>,
    audit: AuditLog,
    jobs: Option<JobQueue>,
}

impl PaymentEngine {
    pub fn new(
        db: Arc<Database>,
        chain: Arc<dyn ChainApi>,
        cache: Arc<BalanceCache>,
        crypto: Arc<WalletCrypto>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let audit = AuditLog::new(db.clone());
        Self {
            db,
            chain,
            cache,
            crypto,
            limiter,
            audit,
            jobs: None,
        }
    }

    /// Attach the ad-hoc job queue so successful submissions enqueue a
    /// confirmation watcher.
    pub fn with_job_queue(mut self, jobs: JobQueue) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Transfer between two internal users.
    pub async fn send_payment(
        &self,
        sender_id: Uuid,
        request: SendPaymentRequest,
    ) -> Result<TransactionRecord, ServiceError> {
        validate_amount(request.amount)?;
        validate_idempotency_key(&request.idempotency_key)?;

        // Idempotent replay returns the stored record without re-submitting.
        if let Some(existing) = self
            .db
            .find_transaction_by_idempotency_key(&request.idempotency_key)
            .map_err(internal)?
        {
            return Ok(existing);
        }

        if !self.limiter.check("transfer", &sender_id.to_string()) {
            return Err(ServiceError::RateLimited("transfer".to_string()));
        }

        let sender = self.load_active_user(&sender_id)?;
        self.enforce_limits(&sender, request.amount)?;

        let recipient_phone = normalize_phone(&request.recipient_phone)
            .ok_or_else(|| ServiceError::Validation("invalid recipient phone".to_string()))?;
        let receiver = self
            .db
            .find_user_by_phone(&recipient_phone)
            .map_err(internal)?
            .ok_or_else(|| ServiceError::NotFound("Recipient".to_string()))?;
        if receiver.id == sender.id {
            return Err(ServiceError::Validation(
                "cannot transfer to yourself".to_string(),
            ));
        }

        let sender_wallet = self.db.get_wallet(&sender.id).map_err(internal)?;
        let receiver_wallet = self.db.get_wallet(&receiver.id).map_err(internal)?;

        self.precheck_balance(&sender_wallet, request.amount, request.token)
            .await?;

        let tx = TransactionRecord::new_transfer(
            request.idempotency_key,
            sender.id,
            receiver.id,
            request.amount,
            request.token,
        );
        let tx = match self.db.insert_transaction_idempotent(&tx).map_err(internal)? {
            IdempotentInsert::Inserted => tx,
            // A concurrent caller with the same key won the insert.
            IdempotentInsert::Existing(existing) => return Ok(existing),
        };

        let result = self
            .submit(&tx, &sender_wallet, &receiver_wallet.public_key, request.amount, request.token)
            .await;

        self.cache.invalidate(&sender_wallet.public_key, None);
        self.cache.invalidate(&receiver_wallet.public_key, None);

        self.finalize(sender, tx, result).await
    }

    /// Withdrawal to a literal external address.
    pub async fn withdraw(
        &self,
        sender_id: Uuid,
        request: WithdrawRequest,
    ) -> Result<TransactionRecord, ServiceError> {
        validate_amount(request.amount)?;
        validate_idempotency_key(&request.idempotency_key)?;
        if !is_valid_address(&request.destination_address) {
            return Err(ServiceError::Validation(
                "invalid destination address".to_string(),
            ));
        }

        if let Some(existing) = self
            .db
            .find_transaction_by_idempotency_key(&request.idempotency_key)
            .map_err(internal)?
        {
            return Ok(existing);
        }

        if !self.limiter.check("transfer", &sender_id.to_string()) {
            return Err(ServiceError::RateLimited("transfer".to_string()));
        }

        let sender = self.load_active_user(&sender_id)?;
        self.enforce_limits(&sender, request.amount)?;

        let sender_wallet = self.db.get_wallet(&sender.id).map_err(internal)?;
        self.precheck_balance(&sender_wallet, request.amount, request.token)
            .await?;

        let tx = TransactionRecord::new_withdrawal(
            request.idempotency_key,
            sender.id,
            request.destination_address.clone(),
            request.amount,
            request.token,
        );
        let tx = match self.db.insert_transaction_idempotent(&tx).map_err(internal)? {
            IdempotentInsert::Inserted => tx,
            IdempotentInsert::Existing(existing) => return Ok(existing),
        };

        let result = self
            .submit(&tx, &sender_wallet, &request.destination_address, request.amount, request.token)
            .await;

        self.cache.invalidate(&sender_wallet.public_key, None);

        self.finalize(sender, tx, result).await
    }

    /// Newest-first transaction history for a user.
    pub fn history(
        &self,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionRecord>, ServiceError> {
        self.db
            .list_transactions_by_sender(&user_id, limit, offset)
            .map_err(internal)
    }

    fn load_active_user(&self, id: &Uuid) -> Result<User, ServiceError> {
        let user = match self.db.get_user(id) {
            Ok(user) => user,
            Err(crate::storage::DbError::NotFound(_)) => {
                return Err(ServiceError::NotFound("User".to_string()))
            }
            Err(e) => return Err(internal(e)),
        };
        if user.is_frozen {
            return Err(ServiceError::AccountFrozen);
        }
        if !user.is_active {
            return Err(ServiceError::Validation("account is disabled".to_string()));
        }
        Ok(user)
    }

    fn enforce_limits(&self, user: &User, amount: Decimal) -> Result<(), ServiceError> {
        let mut rolled = user.clone();
        if advance_limit_windows(&mut rolled, Utc::now()) {
            self.db.update_user(&rolled).map_err(internal)?;
        }
        check_transfer_limits(&self.db, &rolled, amount)
    }

    async fn precheck_balance(
        &self,
        wallet: &WalletRecord,
        amount: Decimal,
        token: Token,
    ) -> Result<(), ServiceError> {
        let (sufficient, available) = self
            .cache
            .check_sufficient_balance(&wallet.public_key, amount, token)
            .await
            .map_err(map_chain_error)?;
        if !sufficient {
            return Err(ServiceError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Scoped secret acquisition and chain submission. The secret buffer
    /// zeroizes when it drops at the end of this function, on every path.
    async fn submit(
        &self,
        tx: &TransactionRecord,
        sender_wallet: &WalletRecord,
        recipient: &str,
        amount: Decimal,
        token: Token,
    ) -> Result<String, ServiceError> {
        let secret = self
            .crypto
            .decrypt(sender_wallet)
            .await
            .map_err(map_wallet_error)?;

        tracing::info!(
            tx_id = %tx.id,
            sender = %sender_wallet.public_key,
            amount = %amount,
            token = %token,
            "submitting transfer"
        );

        self.chain
            .transfer_token(&secret, recipient, amount, token)
            .await
            .map_err(map_chain_error)
    }

    /// Persist the submission outcome, mirror counters, audit, and enqueue
    /// the confirmation watcher.
    async fn finalize(
        &self,
        mut sender: User,
        tx: TransactionRecord,
        result: Result<String, ServiceError>,
    ) -> Result<TransactionRecord, ServiceError> {
        let open = [TxStatus::Pending, TxStatus::Processing];

        match result {
            Ok(signature) => {
                let updated = self
                    .db
                    .transition_transaction(&tx.id, &open, |t| {
                        t.solana_signature = Some(signature.clone());
                    })
                    .map_err(internal)?
                    .unwrap_or(tx);

                record_transfer(&mut sender, updated.amount, Utc::now());
                self.db.update_user(&sender).map_err(internal)?;

                self.audit.record(
                    AuditEntry::new("payment_sent", "transaction")
                        .with_user(sender.id)
                        .with_entity_id(updated.id.to_string())
                        .with_new_values(json!({
                            "status": updated.status,
                            "signature": signature,
                            "amount": updated.amount,
                            "token": updated.token,
                        })),
                );

                if let Some(jobs) = &self.jobs {
                    jobs.enqueue(AdhocJob::WaitConfirmation { tx_id: updated.id });
                }

                Ok(updated)
            }
            Err(error) => {
                let message = error.to_string();
                self.db
                    .transition_transaction(&tx.id, &open, |t| {
                        t.status = TxStatus::Failed;
                        t.error_code = Some(format!("{:?}", error.code()));
                        t.error_message = Some(message.clone());
                        t.retry_count += 1;
                    })
                    .map_err(internal)?;

                self.audit.record(
                    AuditEntry::new("payment_failed", "transaction")
                        .with_user(sender.id)
                        .with_entity_id(tx.id.to_string())
                        .with_new_values(json!({ "error": message })),
                );

                Err(error)
            }
        }
    }
}

fn validate_amount(amount: Decimal) -> Result<(), ServiceError> {
    let min: Decimal = MIN_AMOUNT.parse().expect("valid constant");
    let max: Decimal = MAX_AMOUNT.parse().expect("valid constant");
    if amount < min || amount > max {
        return Err(ServiceError::Validation(format!(
            "amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

fn validate_idempotency_key(key: &str) -> Result<(), ServiceError> {
    if key.len() < IDEMPOTENCY_KEY_MIN || key.len() > IDEMPOTENCY_KEY_MAX {
        return Err(ServiceError::Validation(format!(
            "idempotency key must be {IDEMPOTENCY_KEY_MIN}-{IDEMPOTENCY_KEY_MAX} characters"
        )));
    }
    Ok(())
}

fn internal(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Internal(e.to_string())
}

/// Terminal chain errors mapped into the service taxonomy. Transient
/// errors never reach this point; the chain client retries them.
fn map_chain_error(e: ChainError) -> ServiceError {
    match e {
        ChainError::Validation(msg) => ServiceError::Validation(msg),
        ChainError::InsufficientBalance {
            requested,
            available,
        } => ServiceError::InsufficientBalance {
            requested,
            available,
        },
        ChainError::AtaMissing { .. } => ServiceError::Chain(e.to_string()),
        ChainError::Rpc(msg) => ServiceError::Chain(msg),
    }
}

fn map_wallet_error(e: WalletCryptoError) -> ServiceError {
    match e {
        WalletCryptoError::DecryptionFailed(_)
        | WalletCryptoError::InvalidPayload(_)
        | WalletCryptoError::UnsupportedVersion(_)
        | WalletCryptoError::UserMismatch
        | WalletCryptoError::KeyMismatch => ServiceError::CryptoAuth(e.to_string()),
        WalletCryptoError::WalletInvalid(msg) => ServiceError::Internal(msg),
    }
}
