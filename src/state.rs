// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Application State
//!
//! Shared state passed to every Axum handler via the `State` extractor.
//! Components are constructed explicitly at startup and wired together
//! here; there is no container, and every collaborator is visible in the
//! struct.
//!
//! `AppState` is `Clone` and `Send + Sync`; all heavyweight members are
//! reference-counted.

use std::sync::Arc;

use crate::cache::BalanceCache;
use crate::chain::ChainApi;
use crate::config::AppConfig;
use crate::auth::{OtpSender, OtpStore};
use crate::payments::{PaymentEngine, RateLimiter};
use crate::storage::Database;
use crate::wallet::WalletCrypto;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub chain: Arc<dyn ChainApi>,
    pub cache: Arc<BalanceCache>,
    pub crypto: Arc<WalletCrypto>,
    pub engine: Arc<PaymentEngine>,
    pub limiter: Arc<dyn RateLimiter>,
    pub otp: Arc<OtpStore>,
    pub otp_sender: Arc<dyn OtpSender>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<Database>,
        chain: Arc<dyn ChainApi>,
        cache: Arc<BalanceCache>,
        crypto: Arc<WalletCrypto>,
        engine: Arc<PaymentEngine>,
        limiter: Arc<dyn RateLimiter>,
        otp: Arc<OtpStore>,
        otp_sender: Arc<dyn OtpSender>,
    ) -> Self {
        Self {
            config,
            db,
            chain,
            cache,
            crypto,
            engine,
            limiter,
            otp,
            otp_sender,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_state;

    #[test]
    fn state_can_be_cloned() {
        let (state, _chain, _dir) = test_state();
        let _cloned = state.clone();
    }
}
