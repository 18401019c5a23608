// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use stablepay::api;
use stablepay::auth::{LogOtpSender, OtpStore};
use stablepay::cache::BalanceCache;
use stablepay::chain::{ChainApi, SolanaClient};
use stablepay::config::AppConfig;
use stablepay::kms;
use stablepay::monitor::{Scheduler, TransactionMonitor};
use stablepay::payments::{FixedWindowLimiter, PaymentEngine, RateLimiter};
use stablepay::state::AppState;
use stablepay::storage::Database;
use stablepay::wallet::WalletCrypto;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Arc::new(AppConfig::from_env().expect("Failed to load configuration"));

    let db = Arc::new(
        Database::open(Path::new(&config.database.connection_string))
            .expect("Failed to open database"),
    );

    let kms_provider =
        kms::provider_from_config(&config.key_management).expect("Failed to build KMS provider");
    let crypto = Arc::new(WalletCrypto::new(kms_provider));

    let chain: Arc<dyn ChainApi> =
        Arc::new(SolanaClient::new(&config.solana).expect("Failed to build chain client"));
    let cache = Arc::new(BalanceCache::new(chain.clone()));

    let limiter: Arc<dyn RateLimiter> =
        Arc::new(FixedWindowLimiter::from_config(&config.rate_limit));

    let shutdown = CancellationToken::new();

    let monitor = Arc::new(TransactionMonitor::new(
        db.clone(),
        chain.clone(),
        cache.clone(),
        crypto.clone(),
    ));
    let jobs = Scheduler::start(db.clone(), monitor, shutdown.clone());

    let engine = Arc::new(
        PaymentEngine::new(
            db.clone(),
            chain.clone(),
            cache.clone(),
            crypto.clone(),
            limiter.clone(),
        )
        .with_job_queue(jobs),
    );

    let state = AppState::new(
        config.clone(),
        db,
        chain,
        cache,
        crypto,
        engine,
        limiter,
        Arc::new(OtpStore::new()),
        Arc::new(LogOtpSender),
    );
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(
        %addr,
        rpc = %config.solana.rpc_url,
        devnet = config.solana.use_devnet,
        "Stablepay server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .expect("Server failed");
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
