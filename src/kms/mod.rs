// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope-encryption KMS adapter.
//!
//! Every wallet secret is sealed under a fresh 256-bit data encryption key
//! (DEK); the DEK is wrapped by a master key that never leaves the KMS
//! boundary. Providers differ only in how the DEK is wrapped:
//!
//! - `LocalKms` - raw AES-256-GCM wrap under a configured 32-byte key
//!   (development only)
//! - `AwsKms` - `GenerateDataKey` / `Decrypt`
//! - `AzureKeyVault` - RSA-OAEP-256 `wrapKey` / `unwrapKey`
//!
//! ## Blob format
//!
//! All providers share one on-wire blob, base64 of:
//!
//! ```text
//! [u32 LE dek_len][wrapped_dek][iv 12B][ciphertext][tag 16B]
//! ```

pub mod aws;
pub mod azure;
pub mod local;

pub use aws::AwsKms;
pub use azure::AzureKeyVault;
pub use local::LocalKms;

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::Zeroizing;

use crate::config::{KeyManagementConfig, KmsProviderKind};

/// AES-256-GCM IV length.
pub const IV_LEN: usize = 12;
/// AES-256-GCM tag length.
pub const TAG_LEN: usize = 16;
/// DEK length (256 bits).
pub const DEK_LEN: usize = 32;

/// KMS adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    /// GCM tag check or DEK unwrap failure.
    #[error("Crypto authentication failed: {0}")]
    CryptoAuth(String),

    #[error("Malformed encrypted blob: {0}")]
    InvalidBlob(String),

    /// Remote provider call failure.
    #[error("KMS provider error: {0}")]
    Provider(String),
}

/// Wrap/unwrap contract every provider implements.
#[async_trait]
pub trait KmsProvider: Send + Sync {
    /// Envelope-encrypt `plaintext`. Returns the base64 blob and the
    /// provider's key version identifier.
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), KmsError>;

    /// Reverse of [`encrypt`](Self::encrypt). Fails with
    /// [`KmsError::CryptoAuth`] when the tag check or unwrap fails.
    async fn decrypt(&self, blob: &str, key_version: &str) -> Result<Vec<u8>, KmsError>;

    /// The key version new blobs will carry.
    fn current_key_version(&self) -> String;
}

/// Construct the configured provider.
pub fn provider_from_config(
    config: &KeyManagementConfig,
) -> Result<Arc<dyn KmsProvider>, KmsError> {
    match config.provider {
        KmsProviderKind::Local => Ok(Arc::new(LocalKms::from_config(config)?)),
        KmsProviderKind::AwsKms => Ok(Arc::new(AwsKms::from_config(config)?)),
        KmsProviderKind::AzureKeyVault => Ok(Arc::new(AzureKeyVault::from_config(config)?)),
    }
}

/// Decoded envelope blob.
#[derive(Debug, Clone)]
pub struct EnvelopeBlob {
    pub wrapped_dek: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl EnvelopeBlob {
    /// Encode to the shared base64 wire format.
    pub fn encode(&self) -> String {
        let mut out =
            Vec::with_capacity(4 + self.wrapped_dek.len() + IV_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&(self.wrapped_dek.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.wrapped_dek);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        BASE64.encode(out)
    }

    /// Decode from the shared base64 wire format.
    pub fn decode(blob: &str) -> Result<Self, KmsError> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|e| KmsError::InvalidBlob(e.to_string()))?;

        if bytes.len() < 4 {
            return Err(KmsError::InvalidBlob("truncated header".to_string()));
        }
        let dek_len = u32::from_le_bytes(bytes[..4].try_into().expect("4 bytes")) as usize;

        let min_len = 4 + dek_len + IV_LEN + TAG_LEN;
        if bytes.len() < min_len {
            return Err(KmsError::InvalidBlob(format!(
                "blob too short: {} < {min_len}",
                bytes.len()
            )));
        }

        let wrapped_dek = bytes[4..4 + dek_len].to_vec();
        let iv_start = 4 + dek_len;
        let iv: [u8; IV_LEN] = bytes[iv_start..iv_start + IV_LEN]
            .try_into()
            .expect("iv slice");
        let tag_start = bytes.len() - TAG_LEN;
        let ciphertext = bytes[iv_start + IV_LEN..tag_start].to_vec();
        let tag: [u8; TAG_LEN] = bytes[tag_start..].try_into().expect("tag slice");

        Ok(Self {
            wrapped_dek,
            iv,
            ciphertext,
            tag,
        })
    }
}

/// Generate a fresh random DEK, zeroized on drop.
pub(crate) fn generate_dek() -> Result<Zeroizing<[u8; DEK_LEN]>, KmsError> {
    let mut dek = Zeroizing::new([0u8; DEK_LEN]);
    getrandom::getrandom(dek.as_mut())
        .map_err(|e| KmsError::Provider(format!("entropy failure: {e}")))?;
    Ok(dek)
}

/// Encrypt `plaintext` under a plaintext DEK with a fresh IV.
pub(crate) fn seal_payload(
    dek: &[u8; DEK_LEN],
    plaintext: &[u8],
) -> Result<([u8; IV_LEN], Vec<u8>, [u8; TAG_LEN]), KmsError> {
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv)
        .map_err(|e| KmsError::Provider(format!("entropy failure: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(dek));
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| KmsError::Provider("AES-GCM encryption failed".to_string()))?;

    // aes-gcm appends the tag to the ciphertext
    let tag_start = sealed.len() - TAG_LEN;
    let tag: [u8; TAG_LEN] = sealed[tag_start..].try_into().expect("tag slice");
    sealed.truncate(tag_start);

    Ok((iv, sealed, tag))
}

/// Decrypt a payload sealed by [`seal_payload`].
pub(crate) fn open_payload(
    dek: &[u8; DEK_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> Result<Vec<u8>, KmsError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(dek));

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: &sealed,
                aad: &[],
            },
        )
        .map_err(|_| KmsError::CryptoAuth("GCM tag verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_encode_decode_round_trip() {
        let blob = EnvelopeBlob {
            wrapped_dek: vec![0xAB; 60],
            iv: [1u8; IV_LEN],
            ciphertext: vec![2u8; 93],
            tag: [3u8; TAG_LEN],
        };
        let encoded = blob.encode();
        let decoded = EnvelopeBlob::decode(&encoded).unwrap();
        assert_eq!(decoded.wrapped_dek, blob.wrapped_dek);
        assert_eq!(decoded.iv, blob.iv);
        assert_eq!(decoded.ciphertext, blob.ciphertext);
        assert_eq!(decoded.tag, blob.tag);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            EnvelopeBlob::decode("not-base64!!!"),
            Err(KmsError::InvalidBlob(_))
        ));
        assert!(matches!(
            EnvelopeBlob::decode(&BASE64.encode([0u8; 3])),
            Err(KmsError::InvalidBlob(_))
        ));
        // Header claims more DEK bytes than present
        let mut bytes = 1000u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 40]);
        assert!(matches!(
            EnvelopeBlob::decode(&BASE64.encode(bytes)),
            Err(KmsError::InvalidBlob(_))
        ));
    }

    #[test]
    fn seal_open_round_trip() {
        let dek = generate_dek().unwrap();
        let (iv, ct, tag) = seal_payload(&dek, b"wallet secret bytes").unwrap();
        let opened = open_payload(&dek, &iv, &ct, &tag).unwrap();
        assert_eq!(opened, b"wallet secret bytes");
    }

    #[test]
    fn open_fails_on_flipped_bit() {
        let dek = generate_dek().unwrap();
        let (iv, mut ct, tag) = seal_payload(&dek, b"payload").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(
            open_payload(&dek, &iv, &ct, &tag),
            Err(KmsError::CryptoAuth(_))
        ));
    }

    #[test]
    fn deks_are_unique() {
        let a = generate_dek().unwrap();
        let b = generate_dek().unwrap();
        assert_ne!(*a, *b);
    }
}
