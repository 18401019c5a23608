// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted entity types.
//!
//! These are the storage-layer shapes serialized into redb. API response
//! types live with their handlers; conversions are explicit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::chain::Token;

/// Default per-user transfer limits applied at registration.
pub const DEFAULT_DAILY_LIMIT: u64 = 1_000;
pub const DEFAULT_MONTHLY_LIMIT: u64 = 10_000;

/// A registered user, identified by a normalized E.164 phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Normalized E.164 phone number, unique.
    pub phone_number: String,
    pub daily_transfer_limit: Decimal,
    pub daily_transferred_amount: Decimal,
    pub daily_limit_reset_at: DateTime<Utc>,
    pub monthly_transfer_limit: Decimal,
    pub monthly_transferred_amount: Decimal,
    pub monthly_limit_reset_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_frozen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(phone_number: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_number,
            daily_transfer_limit: Decimal::from(DEFAULT_DAILY_LIMIT),
            daily_transferred_amount: Decimal::ZERO,
            daily_limit_reset_at: now,
            monthly_transfer_limit: Decimal::from(DEFAULT_MONTHLY_LIMIT),
            monthly_transferred_amount: Decimal::ZERO,
            monthly_limit_reset_at: now,
            is_active: true,
            is_frozen: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A custodial wallet, one per user.
///
/// The secret key only exists inside `encrypted_private_key`; cached
/// balances are advisory - the chain is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_id: Uuid,
    /// Base58 public key, unique.
    pub public_key: String,
    /// Envelope-encrypted blob (base64).
    pub encrypted_private_key: String,
    /// KMS key version the blob was wrapped under.
    pub key_version: String,
    pub key_algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_usdc_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_usdt_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_last_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Processing,
    Confirmed,
    Failed,
    Cancelled,
}

impl TxStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed | TxStatus::Cancelled)
    }
}

/// Transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Transfer,
    Withdrawal,
    Deposit,
}

/// A payment, withdrawal, or deposit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    /// Client-supplied key, unique; the idempotency anchor.
    pub idempotency_key: String,
    pub sender_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_address: Option<String>,
    pub amount: Decimal,
    pub token: Token,
    pub tx_type: TxType,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solana_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solana_slot: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solana_block_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// New internal transfer, entering the pipeline as Processing.
    pub fn new_transfer(
        idempotency_key: String,
        sender_id: Uuid,
        receiver_id: Uuid,
        amount: Decimal,
        token: Token,
    ) -> Self {
        Self::new(
            idempotency_key,
            sender_id,
            Some(receiver_id),
            None,
            amount,
            token,
            TxType::Transfer,
        )
    }

    /// New withdrawal to an external address.
    pub fn new_withdrawal(
        idempotency_key: String,
        sender_id: Uuid,
        external_address: String,
        amount: Decimal,
        token: Token,
    ) -> Self {
        Self::new(
            idempotency_key,
            sender_id,
            None,
            Some(external_address),
            amount,
            token,
            TxType::Withdrawal,
        )
    }

    fn new(
        idempotency_key: String,
        sender_id: Uuid,
        receiver_id: Option<Uuid>,
        external_address: Option<String>,
        amount: Decimal,
        token: Token,
        tx_type: TxType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            sender_id,
            receiver_id,
            external_address,
            amount,
            token,
            tx_type,
            status: TxStatus::Processing,
            solana_signature: None,
            solana_slot: None,
            solana_block_time: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
