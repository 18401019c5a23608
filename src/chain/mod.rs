// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana chain integration.
//!
//! This module provides a typed facade over the Solana JSON-RPC API:
//! keypair generation, SPL token transfers with associated-token-account
//! creation, balance reads, signature status queries, fee estimation, and
//! confirmation waits.
//!
//! ## Modules
//!
//! - `rpc` - JSON-RPC transport (reqwest)
//! - `tx` - Legacy transaction wire format, instruction builders, signing
//! - `client` - High-level [`SolanaClient`] facade with bounded retry

pub mod client;
#[cfg(test)]
pub mod mock;
pub mod rpc;
pub mod tx;

pub use client::{ChainApi, ChainError, SolanaClient, TxDetails};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Supported stablecoin tokens. Both carry 6 decimals on Solana.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Usdc,
    Usdt,
}

impl Token {
    /// Token decimals. USDC and USDT both use 6.
    pub const DECIMALS: u32 = 6;

    /// Symbol as used in cache keys and API payloads.
    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Usdc => "USDC",
            Token::Usdt => "USDT",
        }
    }

    /// Mint address for this token on the selected network.
    ///
    /// Devnet addresses are the commonly used test mints; mainnet addresses
    /// are the canonical Circle / Tether mints.
    pub fn mint(&self, use_devnet: bool) -> &'static str {
        match (self, use_devnet) {
            (Token::Usdc, false) => "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            (Token::Usdt, false) => "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
            (Token::Usdc, true) => "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            (Token::Usdt, true) => "EgQ3yNtVhdHz7g1ZhjfGbxhFKMPPaFkz8QHXM5RBZBgi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USDC" => Some(Token::Usdc),
            "USDT" => Some(Token::Usdt),
            _ => None,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Convert a user-facing decimal amount to raw token units.
///
/// `raw = round(amount * 10^6)`. Returns `None` for negative amounts or
/// amounts that overflow u64.
pub fn to_raw_amount(amount: Decimal) -> Option<u64> {
    use rust_decimal::prelude::ToPrimitive;
    if amount.is_sign_negative() {
        return None;
    }
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(Token::DECIMALS)))?
        .round();
    scaled.to_u64()
}

/// Convert raw token units back to a user-facing decimal amount.
pub fn from_raw_amount(raw: u64) -> Decimal {
    Decimal::from(raw) / Decimal::from(10u64.pow(Token::DECIMALS))
}

/// Convert raw lamports to a SOL decimal (9 decimals).
pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(1_000_000_000u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn raw_amount_conversion() {
        assert_eq!(to_raw_amount(dec!(25.00)), Some(25_000_000));
        assert_eq!(to_raw_amount(dec!(0.000001)), Some(1));
        assert_eq!(to_raw_amount(dec!(0.0000004)), Some(0));
        assert_eq!(to_raw_amount(dec!(-1)), None);
        assert_eq!(from_raw_amount(1_500_000), dec!(1.5));
    }

    #[test]
    fn token_symbols_and_parse() {
        assert_eq!(Token::Usdc.symbol(), "USDC");
        assert_eq!(Token::parse("usdt"), Some(Token::Usdt));
        assert_eq!(Token::parse("SOL"), None);
    }

    #[test]
    fn lamports_conversion() {
        assert_eq!(lamports_to_sol(1_000_000_000), dec!(1));
        assert_eq!(lamports_to_sol(5000), dec!(0.000005));
    }
}
