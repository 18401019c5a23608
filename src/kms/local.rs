// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local development KMS provider.
//!
//! Wraps DEKs with raw AES-256-GCM under a 32-byte master key taken from
//! configuration. NOT for production: the master key lives in process
//! memory and in the environment.

use async_trait::async_trait;
use zeroize::{Zeroize, Zeroizing};

use super::{
    generate_dek, open_payload, seal_payload, EnvelopeBlob, KmsError, KmsProvider, DEK_LEN,
    IV_LEN, TAG_LEN,
};
use crate::config::KeyManagementConfig;

/// Key version emitted by this provider.
const LOCAL_KEY_VERSION: &str = "local-v1";

/// Local symmetric-master-key provider.
pub struct LocalKms {
    master_key: Zeroizing<[u8; DEK_LEN]>,
}

impl LocalKms {
    /// Build from configuration. Without a configured key a random one is
    /// generated, which makes existing blobs undecryptable across restarts
    /// - acceptable only for throwaway development environments.
    pub fn from_config(config: &KeyManagementConfig) -> Result<Self, KmsError> {
        match &config.local_development_key {
            Some(bytes) => {
                let key: [u8; DEK_LEN] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| KmsError::Provider("master key must be 32 bytes".to_string()))?;
                Ok(Self {
                    master_key: Zeroizing::new(key),
                })
            }
            None => {
                tracing::warn!(
                    "KeyManagement__LocalDevelopmentKey not set - generating ephemeral master key"
                );
                let mut key = Zeroizing::new([0u8; DEK_LEN]);
                getrandom::getrandom(key.as_mut())
                    .map_err(|e| KmsError::Provider(format!("entropy failure: {e}")))?;
                Ok(Self { master_key: key })
            }
        }
    }

    /// Construct with an explicit master key (tests).
    pub fn with_master_key(key: [u8; DEK_LEN]) -> Self {
        Self {
            master_key: Zeroizing::new(key),
        }
    }

    /// Wrap a DEK under the master key: `iv || ciphertext || tag`.
    fn wrap_dek(&self, dek: &[u8; DEK_LEN]) -> Result<Vec<u8>, KmsError> {
        let (iv, ct, tag) = seal_payload(&self.master_key, dek)?;
        let mut wrapped = Vec::with_capacity(IV_LEN + ct.len() + TAG_LEN);
        wrapped.extend_from_slice(&iv);
        wrapped.extend_from_slice(&ct);
        wrapped.extend_from_slice(&tag);
        Ok(wrapped)
    }

    fn unwrap_dek(&self, wrapped: &[u8]) -> Result<Zeroizing<[u8; DEK_LEN]>, KmsError> {
        if wrapped.len() != IV_LEN + DEK_LEN + TAG_LEN {
            return Err(KmsError::CryptoAuth(format!(
                "wrapped DEK has unexpected length {}",
                wrapped.len()
            )));
        }
        let iv: [u8; IV_LEN] = wrapped[..IV_LEN].try_into().expect("iv slice");
        let tag: [u8; TAG_LEN] = wrapped[wrapped.len() - TAG_LEN..]
            .try_into()
            .expect("tag slice");
        let ct = &wrapped[IV_LEN..wrapped.len() - TAG_LEN];

        let mut plain = open_payload(&self.master_key, &iv, ct, &tag)?;
        let dek: [u8; DEK_LEN] = plain
            .as_slice()
            .try_into()
            .map_err(|_| KmsError::CryptoAuth("unwrapped DEK is not 32 bytes".to_string()))?;
        plain.zeroize();
        Ok(Zeroizing::new(dek))
    }
}

#[async_trait]
impl KmsProvider for LocalKms {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), KmsError> {
        let dek = generate_dek()?;
        let wrapped_dek = self.wrap_dek(&dek)?;
        let (iv, ciphertext, tag) = seal_payload(&dek, plaintext)?;

        let blob = EnvelopeBlob {
            wrapped_dek,
            iv,
            ciphertext,
            tag,
        };
        Ok((blob.encode(), LOCAL_KEY_VERSION.to_string()))
    }

    async fn decrypt(&self, blob: &str, key_version: &str) -> Result<Vec<u8>, KmsError> {
        if key_version != LOCAL_KEY_VERSION {
            return Err(KmsError::Provider(format!(
                "unknown key version {key_version:?} for local provider"
            )));
        }
        let envelope = EnvelopeBlob::decode(blob)?;
        let dek = self.unwrap_dek(&envelope.wrapped_dek)?;
        open_payload(&dek, &envelope.iv, &envelope.ciphertext, &envelope.tag)
    }

    fn current_key_version(&self) -> String {
        LOCAL_KEY_VERSION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn provider() -> LocalKms {
        LocalKms::with_master_key([7u8; DEK_LEN])
    }

    #[tokio::test]
    async fn encrypt_decrypt_round_trip() {
        let kms = provider();
        let plaintext = b"ninety-three byte payload stand-in";

        let (blob, version) = kms.encrypt(plaintext).await.unwrap();
        assert_eq!(version, "local-v1");

        let decrypted = kms.decrypt(&blob, &version).await.unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn equal_plaintexts_produce_distinct_blobs() {
        let kms = provider();
        let (a, _) = kms.encrypt(b"same payload").await.unwrap();
        let (b, _) = kms.encrypt(b"same payload").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn any_flipped_bit_fails_auth() {
        let kms = provider();
        let (blob, version) = kms.encrypt(b"sensitive").await.unwrap();

        let mut raw = BASE64.decode(&blob).unwrap();
        let mid = raw.len() / 2;
        raw[mid] ^= 0x01;
        let tampered = BASE64.encode(raw);

        let result = kms.decrypt(&tampered, &version).await;
        assert!(matches!(result, Err(KmsError::CryptoAuth(_))));
    }

    #[tokio::test]
    async fn wrong_master_key_fails_auth() {
        let kms_a = LocalKms::with_master_key([1u8; DEK_LEN]);
        let kms_b = LocalKms::with_master_key([2u8; DEK_LEN]);

        let (blob, version) = kms_a.encrypt(b"secret").await.unwrap();
        let result = kms_b.decrypt(&blob, &version).await;
        assert!(matches!(result, Err(KmsError::CryptoAuth(_))));
    }

    #[tokio::test]
    async fn unknown_key_version_is_rejected() {
        let kms = provider();
        let (blob, _) = kms.encrypt(b"secret").await.unwrap();
        let result = kms.decrypt(&blob, "aws-key-arn").await;
        assert!(matches!(result, Err(KmsError::Provider(_))));
    }
}
