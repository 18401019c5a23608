// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Monitor job bodies.
//!
//! The monitor owns the authoritative transaction state transitions:
//! `process_pending` advances submitted work, `mark_stale` finalizes
//! anything older than the staleness threshold one way or the other, and
//! the maintenance jobs keep caches warm and custody healthy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::cache::{default_min_fee_sol, BalanceCache};
use crate::chain::{ChainApi, ChainError, TxDetails};
use crate::storage::{
    AuditEntry, AuditLog, Database, DbError, TransactionRecord, TxStatus, WalletRecord,
};
use crate::wallet::WalletCrypto;

/// Batch size for `process_pending`.
const PENDING_BATCH: usize = 50;
/// Batch cap for `mark_stale`.
const STALE_BATCH: usize = 100;
/// Non-terminal transactions older than this are finalized.
const STALE_AFTER_MINUTES: i64 = 10;
/// Active-user window for cache warming.
const ACTIVE_WINDOW_HOURS: i64 = 24;
/// Wallet cap per warming run.
const ACTIVE_CAP: usize = 100;
/// Inter-wallet delay while warming, to stay under RPC rate limits.
const WARM_DELAY: Duration = Duration::from_millis(100);
/// Rotation batch size.
const ROTATE_BATCH: usize = 50;
/// `wait_confirmation` chain-side timeout.
const WAIT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Monitor job failures.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("confirmation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Busy(String),
}

/// States the monitor is allowed to transition from.
const OPEN: [TxStatus; 2] = [TxStatus::Pending, TxStatus::Processing];

/// Background transaction monitor.
pub struct TransactionMonitor {
    db: Arc<Database>,
    chain: Arc<dyn ChainApi>,
    cache: Arc<BalanceCache>,
    crypto: Arc<WalletCrypto>,
    audit: AuditLog,
}

impl TransactionMonitor {
    pub fn new(
        db: Arc<Database>,
        chain: Arc<dyn ChainApi>,
        cache: Arc<BalanceCache>,
        crypto: Arc<WalletCrypto>,
    ) -> Self {
        let audit = AuditLog::new(db.clone());
        Self {
            db,
            chain,
            cache,
            crypto,
            audit,
        }
    }

    fn stale_cutoff() -> DateTime<Utc> {
        Utc::now() - ChronoDuration::minutes(STALE_AFTER_MINUTES)
    }

    /// Advance open transactions by querying chain state. Returns the
    /// number of transactions finalized this run.
    pub async fn process_pending(&self) -> Result<usize, MonitorError> {
        let batch = self.db.list_open_transactions(PENDING_BATCH)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let cutoff = Self::stale_cutoff();
        let mut finalized = 0usize;

        for tx in batch {
            let Some(signature) = tx.solana_signature.clone() else {
                if tx.created_at < cutoff {
                    self.fail(&tx, "no signature").await?;
                    finalized += 1;
                }
                continue;
            };

            let details = match self.chain.get_tx_details(&signature).await {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(tx_id = %tx.id, error = %e, "detail lookup failed, will retry");
                    continue;
                }
            };

            match details {
                None => {
                    if tx.created_at < cutoff {
                        self.fail(&tx, "unseen on chain").await?;
                        finalized += 1;
                    }
                }
                Some(d) if d.is_success => {
                    self.confirm(&tx, Some(d)).await?;
                    finalized += 1;
                }
                Some(_) => {
                    self.fail(&tx, "chain error").await?;
                    finalized += 1;
                }
            }
        }

        if finalized > 0 {
            tracing::info!(finalized, "process_pending advanced transactions");
        }
        Ok(finalized)
    }

    /// Finalize every open transaction past the staleness threshold with
    /// one last confirmation probe. Returns the number finalized.
    pub async fn mark_stale(&self) -> Result<usize, MonitorError> {
        let stale = self
            .db
            .list_open_transactions_older_than(Self::stale_cutoff(), STALE_BATCH)?;

        let mut finalized = 0usize;
        for tx in stale {
            let confirmed = match &tx.solana_signature {
                Some(signature) => self.chain.is_confirmed(signature).await.unwrap_or(false),
                None => false,
            };

            if confirmed {
                self.confirm(&tx, None).await?;
            } else {
                self.fail(&tx, "Transaction timed out").await?;
            }
            finalized += 1;
        }

        if finalized > 0 {
            tracing::info!(finalized, "mark_stale finalized transactions");
        }
        Ok(finalized)
    }

    /// Watch one submitted transaction until the chain confirms it.
    /// Returns `Err(Timeout)` when the wait expires so the scheduler's
    /// retry policy re-runs it; `mark_stale` is the backstop.
    pub async fn wait_confirmation(&self, tx_id: Uuid) -> Result<(), MonitorError> {
        let tx = self.db.get_transaction(&tx_id)?;
        if tx.status.is_terminal() {
            return Ok(());
        }
        let Some(signature) = tx.solana_signature.clone() else {
            // Nothing to watch; staleness handling owns this case.
            return Ok(());
        };

        if !self
            .chain
            .wait_for_confirmation(&signature, WAIT_CONFIRMATION_TIMEOUT)
            .await?
        {
            return Err(MonitorError::Timeout(signature));
        }

        let details = self.chain.get_tx_details(&signature).await.ok().flatten();
        match details {
            Some(d) if !d.is_success => self.fail(&tx, "chain error").await?,
            other => self.confirm(&tx, other).await?,
        }
        Ok(())
    }

    /// Warm balances for wallets of recently active users.
    pub async fn refresh_active_balances(&self) -> Result<usize, MonitorError> {
        let cutoff = Utc::now() - ChronoDuration::hours(ACTIVE_WINDOW_HOURS);
        let users = self.db.list_users_active_since(cutoff, ACTIVE_CAP)?;

        let mut refreshed = 0usize;
        for user in users {
            let wallet = match self.db.get_wallet(&user.id) {
                Ok(wallet) => wallet,
                Err(DbError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = self.refresh_wallet_record(&wallet).await {
                tracing::warn!(wallet = %wallet.public_key, error = %e, "balance refresh failed");
            } else {
                refreshed += 1;
            }

            tokio::time::sleep(WARM_DELAY).await;
        }

        tracing::debug!(refreshed, "refresh_active_balances complete");
        Ok(refreshed)
    }

    /// Force-refresh one wallet's balances by public key.
    pub async fn refresh_wallet_balance(&self, pubkey: &str) -> Result<(), MonitorError> {
        match self.db.find_wallet_by_pubkey(pubkey)? {
            Some(wallet) => self.refresh_wallet_record(&wallet).await,
            None => {
                // Not an error: the wallet may be external.
                self.cache.get_all_balances(pubkey, true).await?;
                Ok(())
            }
        }
    }

    async fn refresh_wallet_record(&self, wallet: &WalletRecord) -> Result<(), MonitorError> {
        let balances = self.cache.get_all_balances(&wallet.public_key, true).await?;

        let mut updated = wallet.clone();
        updated.cached_usdc_balance = Some(balances.usdc);
        updated.cached_usdt_balance = Some(balances.usdt);
        updated.balance_last_updated_at = Some(Utc::now());
        updated.updated_at = Utc::now();
        self.db.update_wallet(&updated)?;
        Ok(())
    }

    /// Warn for every wallet whose SOL cannot cover fees. Returns how many
    /// are underfunded.
    pub async fn check_fee_sol(&self) -> Result<usize, MonitorError> {
        let min = default_min_fee_sol();
        let wallets = self.db.list_wallets(None)?;

        let mut underfunded = 0usize;
        for wallet in wallets {
            match self.cache.get_sol_balance(&wallet.public_key, false).await {
                Ok(sol) if sol < min => {
                    tracing::warn!(
                        wallet = %wallet.public_key,
                        sol = %sol,
                        min = %min,
                        "wallet SOL below fee minimum"
                    );
                    underfunded += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(wallet = %wallet.public_key, error = %e, "SOL check failed");
                }
            }
        }
        Ok(underfunded)
    }

    /// Confirm every wallet blob still decrypts. Returns the number of
    /// failures (also audited).
    pub async fn validate_encryptions(&self) -> Result<usize, MonitorError> {
        let wallets = self.db.list_wallets(None)?;
        let total = wallets.len();

        let mut failures = 0usize;
        for wallet in wallets {
            if !self.crypto.validate(&wallet).await {
                failures += 1;
                tracing::error!(
                    wallet = %wallet.public_key,
                    key_version = %wallet.key_version,
                    "wallet blob failed decryption validation"
                );
                self.audit.record(
                    AuditEntry::new("encryption_validation_failed", "wallet")
                        .with_user(wallet.user_id)
                        .with_entity_id(wallet.public_key.clone()),
                );
            }
        }

        tracing::info!(total, failures, "validate_encryptions complete");
        Ok(failures)
    }

    /// Emit the key-version histogram.
    pub async fn log_key_version_stats(&self) -> Result<(), MonitorError> {
        let stats = self.db.key_version_stats()?;
        for (version, count) in &stats {
            tracing::info!(key_version = %version, wallets = count, "key version in use");
        }
        Ok(())
    }

    /// Re-wrap every wallet still under `old_version`, in batches with a
    /// brief yield between them. Failed rotations leave the wallet
    /// untouched for the next run. Returns `(rotated, failed)`.
    pub async fn rotate_keys(&self, old_version: &str) -> Result<(usize, usize), MonitorError> {
        let wallets: Vec<WalletRecord> = self
            .db
            .list_wallets(None)?
            .into_iter()
            .filter(|w| w.key_version == old_version)
            .collect();

        let mut rotated = 0usize;
        let mut failed = 0usize;

        for chunk in wallets.chunks(ROTATE_BATCH) {
            for wallet in chunk {
                match self.crypto.rotate(wallet).await {
                    Ok(new_wallet) => {
                        self.db.update_wallet(&new_wallet)?;
                        rotated += 1;
                        self.audit.record(
                            AuditEntry::new("key_rotation", "wallet")
                                .with_user(wallet.user_id)
                                .with_entity_id(wallet.public_key.clone())
                                .with_old_values(json!({ "key_version": wallet.key_version }))
                                .with_new_values(json!({ "key_version": new_wallet.key_version })),
                        );
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(
                            wallet = %wallet.public_key,
                            error = %e,
                            "key rotation failed, wallet left on old version"
                        );
                        self.audit.record(
                            AuditEntry::new("key_rotation_failed", "wallet")
                                .with_user(wallet.user_id)
                                .with_entity_id(wallet.public_key.clone())
                                .with_old_values(json!({ "key_version": wallet.key_version }))
                                .with_new_values(json!({ "error": e.to_string() })),
                        );
                    }
                }
            }
            tokio::time::sleep(WARM_DELAY).await;
        }

        tracing::info!(rotated, failed, old_version, "rotate_keys complete");
        Ok((rotated, failed))
    }

    // =========================================================================
    // Transition helpers
    // =========================================================================

    async fn confirm(
        &self,
        tx: &TransactionRecord,
        details: Option<TxDetails>,
    ) -> Result<(), MonitorError> {
        let updated = self.db.transition_transaction(&tx.id, &OPEN, |t| {
            t.status = TxStatus::Confirmed;
            t.confirmed_at = Some(Utc::now());
            if let Some(d) = details {
                t.solana_slot = Some(d.slot);
                t.solana_block_time = d.block_time;
            }
        })?;

        if let Some(updated) = updated {
            tracing::info!(tx_id = %updated.id, "transaction confirmed");
            self.audit_transition(&updated, tx.status);
            self.invalidate_parties(&updated).await;
        }
        Ok(())
    }

    async fn fail(&self, tx: &TransactionRecord, message: &str) -> Result<(), MonitorError> {
        let message = message.to_string();
        let updated = self.db.transition_transaction(&tx.id, &OPEN, |t| {
            t.status = TxStatus::Failed;
            t.error_message = Some(message.clone());
        })?;

        if let Some(updated) = updated {
            tracing::warn!(
                tx_id = %updated.id,
                error = updated.error_message.as_deref().unwrap_or(""),
                "transaction failed"
            );
            self.audit_transition(&updated, tx.status);
        }
        Ok(())
    }

    fn audit_transition(&self, tx: &TransactionRecord, from: TxStatus) {
        self.audit.record(
            AuditEntry::new("transaction_status_update", "transaction")
                .with_user(tx.sender_id)
                .with_entity_id(tx.id.to_string())
                .with_old_values(json!({ "status": from }))
                .with_new_values(json!({
                    "status": tx.status,
                    "error": tx.error_message,
                })),
        );
    }

    async fn invalidate_parties(&self, tx: &TransactionRecord) {
        if let Ok(wallet) = self.db.get_wallet(&tx.sender_id) {
            self.cache.invalidate(&wallet.public_key, None);
        }
        if let Some(receiver_id) = tx.receiver_id {
            if let Ok(wallet) = self.db.get_wallet(&receiver_id) {
                self.cache.invalidate(&wallet.public_key, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::Token;
    use crate::kms::LocalKms;
    use crate::storage::{IdempotentInsert, User};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use rust_decimal_macros::dec;

    struct Fixture {
        monitor: TransactionMonitor,
        db: Arc<Database>,
        chain: Arc<MockChain>,
        crypto: Arc<WalletCrypto>,
        alice: User,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("monitor.redb")).unwrap());
        let chain = Arc::new(MockChain::new());
        let cache = Arc::new(BalanceCache::new(chain.clone()));
        let crypto = Arc::new(WalletCrypto::new(Arc::new(LocalKms::with_master_key(
            [5u8; 32],
        ))));

        let alice = User::new("+14155550101".to_string());
        db.create_user(&alice).unwrap();
        let wallet = crypto.generate(alice.id).await.unwrap();
        db.create_wallet(&wallet).unwrap();

        let monitor = TransactionMonitor::new(db.clone(), chain.clone(), cache, crypto.clone());
        Fixture {
            monitor,
            db,
            chain,
            crypto,
            alice,
            _dir: dir,
        }
    }

    fn seed_tx(
        f: &Fixture,
        key: &str,
        signature: Option<&str>,
        age_minutes: i64,
    ) -> TransactionRecord {
        let mut tx = TransactionRecord::new_transfer(
            key.to_string(),
            f.alice.id,
            Uuid::new_v4(),
            dec!(25.00),
            Token::Usdc,
        );
        tx.solana_signature = signature.map(|s| s.to_string());
        tx.created_at = Utc::now() - ChronoDuration::minutes(age_minutes);
        assert!(matches!(
            f.db.insert_transaction_idempotent(&tx).unwrap(),
            IdempotentInsert::Inserted
        ));
        tx
    }

    #[tokio::test]
    async fn process_pending_confirms_successful_transaction() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-1-aaaaaaaaaaaaa", Some("SIG1"), 1);
        f.chain.set_details(
            "SIG1",
            TxDetails {
                slot: 42,
                block_time: Some(1_700_000_000),
                fee: 5_000,
                is_success: true,
            },
        );

        let finalized = f.monitor.process_pending().await.unwrap();
        assert_eq!(finalized, 1);

        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Confirmed);
        assert_eq!(stored.solana_slot, Some(42));
        assert_eq!(stored.solana_block_time, Some(1_700_000_000));
        assert!(stored.confirmed_at.is_some());

        let audit = f.db.list_audit_recent(10).unwrap();
        assert!(audit.iter().any(|e| e.action == "transaction_status_update"));
    }

    #[tokio::test]
    async fn process_pending_fails_on_chain_error() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-2-aaaaaaaaaaaaa", Some("SIGBAD"), 1);
        f.chain.set_details(
            "SIGBAD",
            TxDetails {
                slot: 43,
                block_time: None,
                fee: 5_000,
                is_success: false,
            },
        );

        f.monitor.process_pending().await.unwrap();
        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("chain error"));
    }

    #[tokio::test]
    async fn process_pending_skips_fresh_unseen_transactions() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-3-aaaaaaaaaaaaa", Some("SIGUNKNOWN"), 1);

        f.monitor.process_pending().await.unwrap();
        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Processing);
    }

    #[tokio::test]
    async fn process_pending_fails_old_unseen_transactions() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-4-aaaaaaaaaaaaa", Some("SIGLOST"), 12);

        f.monitor.process_pending().await.unwrap();
        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("unseen on chain"));
    }

    #[tokio::test]
    async fn process_pending_fails_old_signatureless_transactions() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-5-aaaaaaaaaaaaa", None, 12);

        f.monitor.process_pending().await.unwrap();
        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("no signature"));
    }

    #[tokio::test]
    async fn mark_stale_finalizes_with_timeout_message() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-6-aaaaaaaaaaaaa", Some("SIGX"), 12);

        let finalized = f.monitor.mark_stale().await.unwrap();
        assert_eq!(finalized, 1);

        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Failed);
        assert_eq!(
            stored.error_message.as_deref(),
            Some("Transaction timed out")
        );

        let audit = f.db.list_audit_recent(10).unwrap();
        assert!(audit.iter().any(|e| e.action == "transaction_status_update"));
    }

    #[tokio::test]
    async fn mark_stale_confirms_when_final_probe_succeeds() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-7-aaaaaaaaaaaaa", Some("SIGLATE"), 12);
        f.chain.mark_confirmed("SIGLATE");

        f.monitor.mark_stale().await.unwrap();
        let stored = f.db.get_transaction(&tx.id).unwrap();
        assert_eq!(stored.status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn mark_stale_ignores_fresh_transactions() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-8-aaaaaaaaaaaaa", Some("SIGNEW"), 1);

        let finalized = f.monitor.mark_stale().await.unwrap();
        assert_eq!(finalized, 0);
        assert_eq!(
            f.db.get_transaction(&tx.id).unwrap().status,
            TxStatus::Processing
        );
    }

    #[tokio::test]
    async fn wait_confirmation_confirms_seen_signature() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-9-aaaaaaaaaaaaa", Some("SIGOK"), 1);
        f.chain.mark_confirmed("SIGOK");

        f.monitor.wait_confirmation(tx.id).await.unwrap();
        assert_eq!(
            f.db.get_transaction(&tx.id).unwrap().status,
            TxStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn wait_confirmation_times_out_for_unseen_signature() {
        let f = fixture().await;
        let tx = seed_tx(&f, "k-mon-10-aaaaaaaaaaaa", Some("SIGNEVER"), 1);

        let result = f.monitor.wait_confirmation(tx.id).await;
        assert!(matches!(result, Err(MonitorError::Timeout(_))));
        assert_eq!(
            f.db.get_transaction(&tx.id).unwrap().status,
            TxStatus::Processing
        );
    }

    #[tokio::test]
    async fn rotate_keys_rewraps_and_audits() {
        let f = fixture().await;
        let before = f.db.get_wallet(&f.alice.id).unwrap();

        let (rotated, failed) = f.monitor.rotate_keys("local-v1").await.unwrap();
        assert_eq!(rotated, 1);
        assert_eq!(failed, 0);

        let after = f.db.get_wallet(&f.alice.id).unwrap();
        assert_eq!(after.public_key, before.public_key);
        assert_ne!(after.encrypted_private_key, before.encrypted_private_key);
        assert!(f.crypto.validate(&after).await);

        let audit = f.db.list_audit_recent(10).unwrap();
        assert!(audit.iter().any(|e| e.action == "key_rotation"));
    }

    #[tokio::test]
    async fn rotate_keys_leaves_broken_wallets_untouched() {
        let f = fixture().await;
        let mut wallet = f.db.get_wallet(&f.alice.id).unwrap();
        let mut raw = BASE64.decode(&wallet.encrypted_private_key).unwrap();
        raw[30] ^= 0x01;
        wallet.encrypted_private_key = BASE64.encode(raw);
        f.db.update_wallet(&wallet).unwrap();

        let (rotated, failed) = f.monitor.rotate_keys("local-v1").await.unwrap();
        assert_eq!(rotated, 0);
        assert_eq!(failed, 1);

        let after = f.db.get_wallet(&f.alice.id).unwrap();
        assert_eq!(after.encrypted_private_key, wallet.encrypted_private_key);

        let audit = f.db.list_audit_recent(10).unwrap();
        assert!(audit.iter().any(|e| e.action == "key_rotation_failed"));
    }

    #[tokio::test]
    async fn validate_encryptions_counts_broken_wallets() {
        let f = fixture().await;
        assert_eq!(f.monitor.validate_encryptions().await.unwrap(), 0);

        let mut wallet = f.db.get_wallet(&f.alice.id).unwrap();
        let mut raw = BASE64.decode(&wallet.encrypted_private_key).unwrap();
        raw[35] ^= 0x01;
        wallet.encrypted_private_key = BASE64.encode(raw);
        f.db.update_wallet(&wallet).unwrap();

        assert_eq!(f.monitor.validate_encryptions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn refresh_active_balances_updates_cached_columns() {
        let f = fixture().await;
        let wallet = f.db.get_wallet(&f.alice.id).unwrap();
        f.chain
            .set_token_balance(&wallet.public_key, Token::Usdc, dec!(77));

        let mut alice = f.db.get_user(&f.alice.id).unwrap();
        alice.last_login_at = Some(Utc::now());
        f.db.update_user(&alice).unwrap();

        let refreshed = f.monitor.refresh_active_balances().await.unwrap();
        assert_eq!(refreshed, 1);

        let updated = f.db.get_wallet(&f.alice.id).unwrap();
        assert_eq!(updated.cached_usdc_balance, Some(dec!(77)));
        assert!(updated.balance_last_updated_at.is_some());
    }

    #[tokio::test]
    async fn refresh_skips_inactive_users() {
        let f = fixture().await;
        // No last_login_at set
        let refreshed = f.monitor.refresh_active_balances().await.unwrap();
        assert_eq!(refreshed, 0);
    }

    #[tokio::test]
    async fn check_fee_sol_counts_underfunded_wallets() {
        let f = fixture().await;
        let wallet = f.db.get_wallet(&f.alice.id).unwrap();
        f.chain.set_sol_balance(&wallet.public_key, dec!(0.001));

        assert_eq!(f.monitor.check_fee_sol().await.unwrap(), 1);
    }
}
