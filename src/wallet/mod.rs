// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet custody: keypair generation and envelope-encrypted secrets.
//!
//! ## Modules
//!
//! - `payload` - the fixed 93-byte plaintext sealed into every blob
//! - `crypto` - generate / decrypt / rotate / validate over the KMS

pub mod crypto;
pub mod payload;

pub use crypto::{WalletCrypto, WalletCryptoError, WalletSecret};
pub use payload::EncryptedPayload;
