// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ACID store backed by redb (pure Rust).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized User
//! - `users_by_phone`: E.164 phone → user id (unique index)
//! - `wallets`: user id → serialized WalletRecord
//! - `wallets_by_pubkey`: base58 public key → user id (unique index)
//! - `transactions`: transaction id → serialized TransactionRecord
//! - `tx_by_idempotency`: idempotency key → transaction id (unique index)
//! - `tx_open_index`: `created_at_be | id` → transaction id, only
//!   Pending/Processing rows, for ascending created_at batch scans
//! - `tx_by_sender`: `sender | !created_at_be | id` → transaction id,
//!   newest-first history scans
//! - `audit_log`: `timestamp_be | seq_be` → serialized entry, append-only
//! - `job_leases`: job name → serialized lease (single-leader election)
//!
//! redb serializes write transactions, which is what turns the
//! `tx_by_idempotency` check-and-insert into the at-most-once guarantee
//! the payment engine relies on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::AuditEntry;
use super::models::{TransactionRecord, TxStatus, User, WalletRecord};

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USERS_BY_PHONE: TableDefinition<&str, &str> = TableDefinition::new("users_by_phone");
const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
const WALLETS_BY_PUBKEY: TableDefinition<&str, &str> = TableDefinition::new("wallets_by_pubkey");
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");
const TX_BY_IDEMPOTENCY: TableDefinition<&str, &str> = TableDefinition::new("tx_by_idempotency");
const TX_OPEN_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("tx_open_index");
const TX_BY_SENDER: TableDefinition<&[u8], &str> = TableDefinition::new("tx_by_sender");
const AUDIT_LOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("audit_log");
const JOB_LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("job_leases");

/// Database errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Outcome of an idempotent transaction insert.
#[derive(Debug)]
pub enum IdempotentInsert {
    /// The record was inserted.
    Inserted,
    /// A record with the same idempotency key already exists.
    Existing(TransactionRecord),
}

/// A held single-leader lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobLease {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// Composite key for the open-transaction index: `created_at_be | id`.
fn open_index_key(created_at: DateTime<Utc>, id: &Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 16);
    key.extend_from_slice(&(created_at.timestamp_millis() as u64).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Composite key for the sender index: `sender | !created_at_be | id`.
/// The inverted timestamp yields newest-first forward scans.
fn sender_index_key(sender: &Uuid, created_at: DateTime<Utc>, id: &Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 8 + 16);
    key.extend_from_slice(sender.as_bytes());
    key.extend_from_slice(&(!(created_at.timestamp_millis() as u64)).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

fn sender_prefix_range(sender: &Uuid) -> (Vec<u8>, Vec<u8>) {
    let start = sender.as_bytes().to_vec();
    let mut end = start.clone();
    end.extend_from_slice(&[0xFF; 25]);
    (start, end)
}

/// Embedded application database.
pub struct Database {
    db: redb::Database,
    audit_seq: AtomicU64,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_PHONE)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLETS_BY_PUBKEY)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(TX_BY_IDEMPOTENCY)?;
            let _ = write_txn.open_table(TX_OPEN_INDEX)?;
            let _ = write_txn.open_table(TX_BY_SENDER)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
            let _ = write_txn.open_table(JOB_LEASES)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            audit_seq: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user. The phone number is a unique index.
    pub fn create_user(&self, user: &User) -> DbResult<()> {
        let id = user.id.to_string();
        let json = serde_json::to_vec(user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut phone_table = write_txn.open_table(USERS_BY_PHONE)?;
            if phone_table.get(user.phone_number.as_str())?.is_some() {
                return Err(DbError::AlreadyExists(format!(
                    "user with phone {}",
                    user.phone_number
                )));
            }
            phone_table.insert(user.phone_number.as_str(), id.as_str())?;

            let mut user_table = write_txn.open_table(USERS)?;
            user_table.insert(id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, id: &Uuid) -> DbResult<User> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id.to_string().as_str())? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(DbError::NotFound(format!("user {id}"))),
        }
    }

    pub fn find_user_by_phone(&self, phone: &str) -> DbResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let phone_table = read_txn.open_table(USERS_BY_PHONE)?;
        let id = match phone_table.get(phone)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let user_table = read_txn.open_table(USERS)?;
        match user_table.get(id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Overwrite an existing user row. Phone numbers are immutable.
    pub fn update_user(&self, user: &User) -> DbResult<()> {
        let id = user.id.to_string();
        let json = serde_json::to_vec(user)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            if table.get(id.as_str())?.is_none() {
                return Err(DbError::NotFound(format!("user {}", user.id)));
            }
            table.insert(id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Users whose `last_login_at` is at or after `cutoff`, capped.
    pub fn list_users_active_since(
        &self,
        cutoff: DateTime<Utc>,
        cap: usize,
    ) -> DbResult<Vec<User>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        let mut users = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let user: User = serde_json::from_slice(entry.1.value())?;
            if user.last_login_at.map(|t| t >= cutoff).unwrap_or(false) {
                users.push(user);
                if users.len() >= cap {
                    break;
                }
            }
        }
        Ok(users)
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Insert a new wallet. The public key is a unique index.
    pub fn create_wallet(&self, wallet: &WalletRecord) -> DbResult<()> {
        let user_id = wallet.user_id.to_string();
        let json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut pubkey_table = write_txn.open_table(WALLETS_BY_PUBKEY)?;
            if pubkey_table.get(wallet.public_key.as_str())?.is_some() {
                return Err(DbError::AlreadyExists(format!(
                    "wallet with public key {}",
                    wallet.public_key
                )));
            }
            pubkey_table.insert(wallet.public_key.as_str(), user_id.as_str())?;

            let mut wallet_table = write_txn.open_table(WALLETS)?;
            if wallet_table.get(user_id.as_str())?.is_some() {
                return Err(DbError::AlreadyExists(format!(
                    "wallet for user {user_id}"
                )));
            }
            wallet_table.insert(user_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_wallet(&self, user_id: &Uuid) -> DbResult<WalletRecord> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(user_id.to_string().as_str())? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(DbError::NotFound(format!("wallet for user {user_id}"))),
        }
    }

    pub fn find_wallet_by_pubkey(&self, public_key: &str) -> DbResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let pubkey_table = read_txn.open_table(WALLETS_BY_PUBKEY)?;
        let user_id = match pubkey_table.get(public_key)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let wallet_table = read_txn.open_table(WALLETS)?;
        match wallet_table.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Overwrite a wallet row (rotation, cached-balance refresh). The
    /// public key is immutable.
    pub fn update_wallet(&self, wallet: &WalletRecord) -> DbResult<()> {
        let user_id = wallet.user_id.to_string();
        let json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(user_id.as_str())?.is_none() {
                return Err(DbError::NotFound(format!("wallet for user {user_id}")));
            }
            table.insert(user_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All wallets, optionally capped.
    pub fn list_wallets(&self, cap: Option<usize>) -> DbResult<Vec<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            wallets.push(serde_json::from_slice(entry.1.value())?);
            if let Some(cap) = cap {
                if wallets.len() >= cap {
                    break;
                }
            }
        }
        Ok(wallets)
    }

    /// Histogram of wallet key versions.
    pub fn key_version_stats(&self) -> DbResult<HashMap<String, usize>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;

        let mut stats = HashMap::new();
        for entry in table.iter()? {
            let entry = entry?;
            let wallet: WalletRecord = serde_json::from_slice(entry.1.value())?;
            *stats.entry(wallet.key_version).or_insert(0) += 1;
        }
        Ok(stats)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Insert a transaction unless its idempotency key already exists.
    ///
    /// The check and insert happen in one serialized write transaction, so
    /// concurrent callers with the same key observe exactly one row.
    pub fn insert_transaction_idempotent(
        &self,
        tx: &TransactionRecord,
    ) -> DbResult<IdempotentInsert> {
        let id = tx.id.to_string();
        let json = serde_json::to_vec(tx)?;

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut idem_table = write_txn.open_table(TX_BY_IDEMPOTENCY)?;
            let existing_id = idem_table
                .get(tx.idempotency_key.as_str())?
                .map(|v| v.value().to_string());

            match existing_id {
                Some(existing_id) => {
                    let tx_table = write_txn.open_table(TRANSACTIONS)?;
                    let existing = tx_table
                        .get(existing_id.as_str())?
                        .ok_or_else(|| DbError::NotFound(format!("transaction {existing_id}")))?;
                    IdempotentInsert::Existing(serde_json::from_slice(existing.value())?)
                }
                None => {
                    idem_table.insert(tx.idempotency_key.as_str(), id.as_str())?;

                    let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
                    tx_table.insert(id.as_str(), json.as_slice())?;

                    let mut sender_table = write_txn.open_table(TX_BY_SENDER)?;
                    let sender_key = sender_index_key(&tx.sender_id, tx.created_at, &tx.id);
                    sender_table.insert(sender_key.as_slice(), id.as_str())?;

                    if !tx.status.is_terminal() {
                        let mut open_table = write_txn.open_table(TX_OPEN_INDEX)?;
                        let open_key = open_index_key(tx.created_at, &tx.id);
                        open_table.insert(open_key.as_slice(), id.as_str())?;
                    }
                    IdempotentInsert::Inserted
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    pub fn get_transaction(&self, id: &Uuid) -> DbResult<TransactionRecord> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(id.to_string().as_str())? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(DbError::NotFound(format!("transaction {id}"))),
        }
    }

    pub fn find_transaction_by_idempotency_key(
        &self,
        key: &str,
    ) -> DbResult<Option<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let idem_table = read_txn.open_table(TX_BY_IDEMPOTENCY)?;
        let id = match idem_table.get(key)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let tx_table = read_txn.open_table(TRANSACTIONS)?;
        match tx_table.get(id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Status-conditioned mutation of a transaction row.
    ///
    /// The mutation runs only when the current status is in `allowed_from`;
    /// otherwise `Ok(None)` is returned and the row is untouched. This is
    /// what enforces monotone state transitions under concurrency.
    pub fn transition_transaction(
        &self,
        id: &Uuid,
        allowed_from: &[TxStatus],
        mutate: impl FnOnce(&mut TransactionRecord),
    ) -> DbResult<Option<TransactionRecord>> {
        let id_str = id.to_string();

        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;

            let existing_bytes = {
                let existing = tx_table
                    .get(id_str.as_str())?
                    .ok_or_else(|| DbError::NotFound(format!("transaction {id}")))?;
                existing.value().to_vec()
            };

            let mut tx: TransactionRecord = serde_json::from_slice(&existing_bytes)?;
            if !allowed_from.contains(&tx.status) {
                None
            } else {
                mutate(&mut tx);
                tx.updated_at = Utc::now();

                let json = serde_json::to_vec(&tx)?;
                tx_table.insert(id_str.as_str(), json.as_slice())?;

                if tx.status.is_terminal() {
                    let mut open_table = write_txn.open_table(TX_OPEN_INDEX)?;
                    let open_key = open_index_key(tx.created_at, &tx.id);
                    open_table.remove(open_key.as_slice())?;
                }
                Some(tx)
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Pending/Processing transactions in created_at ascending order.
    pub fn list_open_transactions(&self, limit: usize) -> DbResult<Vec<TransactionRecord>> {
        self.scan_open(limit, None)
    }

    /// Open transactions created strictly before `cutoff`.
    pub fn list_open_transactions_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<TransactionRecord>> {
        self.scan_open(limit, Some(cutoff))
    }

    fn scan_open(
        &self,
        limit: usize,
        older_than: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let open_table = read_txn.open_table(TX_OPEN_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let mut results = Vec::new();
        for entry in open_table.iter()? {
            let entry = entry?;
            let id = entry.1.value().to_string();
            if let Some(value) = tx_table.get(id.as_str())? {
                let tx: TransactionRecord = serde_json::from_slice(value.value())?;
                if let Some(cutoff) = older_than {
                    if tx.created_at >= cutoff {
                        // Index is created_at ascending; nothing later matches.
                        break;
                    }
                }
                results.push(tx);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Newest-first transaction history for a sender.
    pub fn list_transactions_by_sender(
        &self,
        sender: &Uuid,
        limit: usize,
        offset: usize,
    ) -> DbResult<Vec<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let sender_table = read_txn.open_table(TX_BY_SENDER)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let (start, end) = sender_prefix_range(sender);
        let mut results = Vec::with_capacity(limit);
        let mut skipped = 0usize;

        for entry in sender_table.range(start.as_slice()..end.as_slice())? {
            let entry = entry?;
            if skipped < offset {
                skipped += 1;
                continue;
            }
            let id = entry.1.value().to_string();
            if let Some(value) = tx_table.get(id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Sum of non-failed, non-cancelled amounts sent by `sender` since
    /// `since`. Drives the daily and monthly limit checks.
    pub fn sum_transfers_since(&self, sender: &Uuid, since: DateTime<Utc>) -> DbResult<Decimal> {
        let read_txn = self.db.begin_read()?;
        let sender_table = read_txn.open_table(TX_BY_SENDER)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let (start, end) = sender_prefix_range(sender);
        let mut sum = Decimal::ZERO;

        for entry in sender_table.range(start.as_slice()..end.as_slice())? {
            let entry = entry?;
            let id = entry.1.value().to_string();
            if let Some(value) = tx_table.get(id.as_str())? {
                let tx: TransactionRecord = serde_json::from_slice(value.value())?;
                if tx.created_at < since {
                    // Newest-first scan: everything after this is older.
                    break;
                }
                if !matches!(tx.status, TxStatus::Failed | TxStatus::Cancelled) {
                    sum += tx.amount;
                }
            }
        }
        Ok(sum)
    }

    // =========================================================================
    // Audit log (append-only)
    // =========================================================================

    /// Append an audit entry. There is deliberately no update or delete.
    pub fn append_audit(&self, entry: &AuditEntry) -> DbResult<()> {
        let seq = self.audit_seq.fetch_add(1, Ordering::SeqCst);
        let mut key = Vec::with_capacity(16);
        key.extend_from_slice(&(entry.timestamp.timestamp_millis() as u64).to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());

        let json = serde_json::to_vec(entry)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Most recent audit entries, newest last.
    pub fn list_audit_recent(&self, limit: usize) -> DbResult<Vec<AuditEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        let mut entries = Vec::new();
        for entry in table.iter()?.rev() {
            let entry = entry?;
            entries.push(serde_json::from_slice(entry.1.value())?);
            if entries.len() >= limit {
                break;
            }
        }
        entries.reverse();
        Ok(entries)
    }

    // =========================================================================
    // Job leases (single-leader election)
    // =========================================================================

    /// Try to take the lease for `job`. Succeeds when the lease is free,
    /// expired, or already held by `holder` (renewal).
    pub fn acquire_lease(&self, job: &str, holder: &str, ttl_secs: i64) -> DbResult<bool> {
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        let acquired = {
            let mut table = write_txn.open_table(JOB_LEASES)?;
            let current: Option<JobLease> = match table.get(job)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let free = match &current {
                None => true,
                Some(lease) => lease.expires_at <= now || lease.holder == holder,
            };

            if free {
                let lease = JobLease {
                    holder: holder.to_string(),
                    expires_at: now + ChronoDuration::seconds(ttl_secs),
                };
                let json = serde_json::to_vec(&lease)?;
                table.insert(job, json.as_slice())?;
            }
            free
        };
        write_txn.commit()?;
        Ok(acquired)
    }

    /// Release a lease held by `holder`. Another holder's lease is left
    /// untouched.
    pub fn release_lease(&self, job: &str, holder: &str) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(JOB_LEASES)?;
            let held_by_us = match table.get(job)? {
                Some(value) => {
                    let lease: JobLease = serde_json::from_slice(value.value())?;
                    lease.holder == holder
                }
                None => false,
            };
            if held_by_us {
                table.remove(job)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
