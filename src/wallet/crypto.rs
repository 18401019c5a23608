// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet crypto engine: generate, decrypt, rotate, validate.
//!
//! Secrets are only materialized inside a [`WalletSecret`] buffer that
//! zeroizes on drop; callers scope the acquisition and let it fall out of
//! scope on every exit path.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use super::payload::EncryptedPayload;
use crate::chain::tx::{generate_keypair, pubkey_from_secret};
use crate::kms::{KmsError, KmsProvider};
use crate::storage::models::WalletRecord;

/// Algorithm tag stored on every wallet.
pub const KEY_ALGORITHM: &str = "AES-256-GCM";

/// A 64-byte wallet secret, zeroized on drop.
pub type WalletSecret = Zeroizing<[u8; 64]>;

/// Wallet crypto failures.
#[derive(Debug, thiserror::Error)]
pub enum WalletCryptoError {
    #[error("Wallet record invalid: {0}")]
    WalletInvalid(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("Payload user id does not match wallet owner")]
    UserMismatch,

    #[error("Decrypted secret does not derive the stored public key")]
    KeyMismatch,
}

impl From<KmsError> for WalletCryptoError {
    fn from(e: KmsError) -> Self {
        match e {
            KmsError::InvalidBlob(msg) => WalletCryptoError::WalletInvalid(msg),
            KmsError::CryptoAuth(msg) | KmsError::Provider(msg) => {
                WalletCryptoError::DecryptionFailed(msg)
            }
        }
    }
}

/// Envelope-encryption engine over a KMS provider.
pub struct WalletCrypto {
    kms: Arc<dyn KmsProvider>,
}

impl WalletCrypto {
    pub fn new(kms: Arc<dyn KmsProvider>) -> Self {
        Self { kms }
    }

    /// Generate a fresh keypair for `user_id` and seal it into a wallet
    /// record. The plaintext secret is zeroized before returning.
    pub async fn generate(&self, user_id: Uuid) -> Result<WalletRecord, WalletCryptoError> {
        let (public_key, secret) = generate_keypair()
            .map_err(|e| WalletCryptoError::WalletInvalid(e.to_string()))?;
        let secret = Zeroizing::new(secret);

        let mut payload = EncryptedPayload::new(user_id, *secret);
        let plaintext = Zeroizing::new(payload.encode());
        payload.secret_key.zeroize();
        let (blob, key_version) = self.kms.encrypt(plaintext.as_ref()).await?;

        let now = Utc::now();
        Ok(WalletRecord {
            user_id,
            public_key,
            encrypted_private_key: blob,
            key_version,
            key_algorithm: KEY_ALGORITHM.to_string(),
            cached_usdc_balance: None,
            cached_usdt_balance: None,
            balance_last_updated_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Decrypt a wallet's secret, enforcing payload integrity, the user
    /// binding, and the public-key derivation check.
    pub async fn decrypt(&self, wallet: &WalletRecord) -> Result<WalletSecret, WalletCryptoError> {
        let plaintext = Zeroizing::new(
            self.kms
                .decrypt(&wallet.encrypted_private_key, &wallet.key_version)
                .await?,
        );

        let mut payload = EncryptedPayload::decode(&plaintext)?;
        if payload.user_id != wallet.user_id {
            payload.secret_key.zeroize();
            return Err(WalletCryptoError::UserMismatch);
        }

        let secret = Zeroizing::new(payload.secret_key);
        payload.secret_key.zeroize();
        let derived = pubkey_from_secret(&secret)
            .map_err(|_| WalletCryptoError::KeyMismatch)?;
        if derived.to_base58() != wallet.public_key {
            return Err(WalletCryptoError::KeyMismatch);
        }

        Ok(secret)
    }

    /// Re-encrypt the wallet's secret under the KMS's current key version.
    /// The public key does not change; a failed rotation leaves the record
    /// untouched.
    pub async fn rotate(&self, wallet: &WalletRecord) -> Result<WalletRecord, WalletCryptoError> {
        let secret = self.decrypt(wallet).await?;

        let mut payload = EncryptedPayload::new(wallet.user_id, *secret);
        let plaintext = Zeroizing::new(payload.encode());
        payload.secret_key.zeroize();
        let (blob, key_version) = self.kms.encrypt(plaintext.as_ref()).await?;

        let mut rotated = wallet.clone();
        rotated.encrypted_private_key = blob;
        rotated.key_version = key_version;
        rotated.updated_at = Utc::now();
        Ok(rotated)
    }

    /// True iff the wallet decrypts cleanly.
    pub async fn validate(&self, wallet: &WalletRecord) -> bool {
        self.decrypt(wallet).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::LocalKms;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn engine() -> WalletCrypto {
        WalletCrypto::new(Arc::new(LocalKms::with_master_key([9u8; 32])))
    }

    #[tokio::test]
    async fn generate_then_decrypt_round_trips() {
        let crypto = engine();
        let user_id = Uuid::new_v4();

        let wallet = crypto.generate(user_id).await.unwrap();
        assert_eq!(wallet.key_algorithm, "AES-256-GCM");
        assert_eq!(wallet.key_version, "local-v1");

        let secret = crypto.decrypt(&wallet).await.unwrap();
        let derived = pubkey_from_secret(&secret).unwrap();
        assert_eq!(derived.to_base58(), wallet.public_key);
    }

    #[tokio::test]
    async fn decrypt_rejects_swapped_owner() {
        let crypto = engine();
        let mut wallet = crypto.generate(Uuid::new_v4()).await.unwrap();

        // Simulate a row swap: same blob, different owner column.
        wallet.user_id = Uuid::new_v4();

        let result = crypto.decrypt(&wallet).await;
        assert!(matches!(result, Err(WalletCryptoError::UserMismatch)));
    }

    #[tokio::test]
    async fn decrypt_rejects_tampered_blob() {
        let crypto = engine();
        let mut wallet = crypto.generate(Uuid::new_v4()).await.unwrap();

        let mut raw = BASE64.decode(&wallet.encrypted_private_key).unwrap();
        let mid = raw.len() / 2;
        raw[mid] ^= 0x01;
        wallet.encrypted_private_key = BASE64.encode(raw);

        let result = crypto.decrypt(&wallet).await;
        assert!(matches!(result, Err(WalletCryptoError::DecryptionFailed(_))));
        assert!(!crypto.validate(&wallet).await);
    }

    #[tokio::test]
    async fn decrypt_rejects_mismatched_public_key() {
        let crypto = engine();
        let mut wallet = crypto.generate(Uuid::new_v4()).await.unwrap();
        let (other_pub, _) = generate_keypair().unwrap();
        wallet.public_key = other_pub;

        let result = crypto.decrypt(&wallet).await;
        assert!(matches!(result, Err(WalletCryptoError::KeyMismatch)));
    }

    #[tokio::test]
    async fn rotation_preserves_secret_and_public_key() {
        let crypto = engine();
        let wallet = crypto.generate(Uuid::new_v4()).await.unwrap();
        let original_secret = crypto.decrypt(&wallet).await.unwrap();

        let rotated = crypto.rotate(&wallet).await.unwrap();
        assert_eq!(rotated.public_key, wallet.public_key);
        assert_ne!(rotated.encrypted_private_key, wallet.encrypted_private_key);

        let rotated_secret = crypto.decrypt(&rotated).await.unwrap();
        assert_eq!(*original_secret, *rotated_secret);
    }

    #[tokio::test]
    async fn validate_is_true_for_healthy_wallet() {
        let crypto = engine();
        let wallet = crypto.generate(Uuid::new_v4()).await.unwrap();
        assert!(crypto.validate(&wallet).await);
    }
}
