// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-layout plaintext sealed into every wallet blob.
//!
//! ```text
//! magic "PPWK" (4) | version u8 = 1 | timestamp i64 BE (8)
//! | user_id (16) | secret_key (64)   = 93 bytes
//! ```
//!
//! Binding the owning user id into the authenticated plaintext means a
//! swapped database row cannot yield a usable secret for the wrong owner,
//! even when both blobs decrypt under the same master key.

use chrono::Utc;
use uuid::Uuid;

use super::crypto::WalletCryptoError;

/// Payload magic bytes.
pub const MAGIC: [u8; 4] = *b"PPWK";
/// Only supported payload version.
pub const VERSION: u8 = 1;
/// Total encoded length.
pub const PAYLOAD_LEN: usize = 93;

/// Decoded wallet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Seconds since the epoch at sealing time.
    pub timestamp: i64,
    /// Owning user.
    pub user_id: Uuid,
    /// 64-byte Ed25519 secret (seed || public key).
    pub secret_key: [u8; 64],
}

impl EncryptedPayload {
    pub fn new(user_id: Uuid, secret_key: [u8; 64]) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            user_id,
            secret_key,
        }
    }

    /// Encode to the fixed 93-byte layout.
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[..4].copy_from_slice(&MAGIC);
        out[4] = VERSION;
        out[5..13].copy_from_slice(&self.timestamp.to_be_bytes());
        out[13..29].copy_from_slice(self.user_id.as_bytes());
        out[29..].copy_from_slice(&self.secret_key);
        out
    }

    /// Decode and validate magic and version.
    pub fn decode(bytes: &[u8]) -> Result<Self, WalletCryptoError> {
        if bytes.len() != PAYLOAD_LEN {
            return Err(WalletCryptoError::InvalidPayload(format!(
                "expected {PAYLOAD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(WalletCryptoError::InvalidPayload(
                "bad magic bytes".to_string(),
            ));
        }
        if bytes[4] != VERSION {
            return Err(WalletCryptoError::UnsupportedVersion(bytes[4]));
        }

        let timestamp = i64::from_be_bytes(bytes[5..13].try_into().expect("8 bytes"));
        let user_id = Uuid::from_bytes(bytes[13..29].try_into().expect("16 bytes"));
        let secret_key: [u8; 64] = bytes[29..].try_into().expect("64 bytes");

        Ok(Self {
            timestamp,
            user_id,
            secret_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let payload = EncryptedPayload::new(Uuid::new_v4(), [42u8; 64]);
        let bytes = payload.encode();
        assert_eq!(bytes.len(), PAYLOAD_LEN);

        let decoded = EncryptedPayload::decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_wrong_length() {
        let result = EncryptedPayload::decode(&[0u8; 92]);
        assert!(matches!(result, Err(WalletCryptoError::InvalidPayload(_))));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = EncryptedPayload::new(Uuid::new_v4(), [0u8; 64]).encode();
        bytes[0] = b'X';
        let result = EncryptedPayload::decode(&bytes);
        assert!(matches!(result, Err(WalletCryptoError::InvalidPayload(_))));
    }

    #[test]
    fn rejects_future_version() {
        let mut bytes = EncryptedPayload::new(Uuid::new_v4(), [0u8; 64]).encode();
        bytes[4] = 2;
        let result = EncryptedPayload::decode(&bytes);
        assert!(matches!(
            result,
            Err(WalletCryptoError::UnsupportedVersion(2))
        ));
    }
}
