// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet endpoints: balance and withdrawal.

use axum::{
    extract::{Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::payments::PaymentResponse;
use crate::auth::Auth;
use crate::cache::WalletBalances;
use crate::chain::Token;
use crate::error::ServiceError;
use crate::payments::WithdrawRequest as EngineWithdrawRequest;
use crate::state::AppState;

/// Body for `POST /api/wallet/withdraw`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    /// External base58 address, 32-44 characters.
    pub destination_address: String,
    pub amount: Decimal,
    pub token: Token,
    pub idempotency_key: String,
}

/// Withdraw tokens to an external address.
#[utoipa::path(
    post,
    path = "/api/wallet/withdraw",
    tag = "Wallet",
    request_body = WithdrawRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Withdrawal accepted", body = PaymentResponse),
        (status = 400, description = "Validation, limit, or balance failure"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn withdraw(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(body): Json<WithdrawRequest>,
) -> Result<Json<PaymentResponse>, ServiceError> {
    let tx = state
        .engine
        .withdraw(
            user.user_id,
            EngineWithdrawRequest {
                destination_address: body.destination_address,
                amount: body.amount,
                token: body.token,
                idempotency_key: body.idempotency_key,
            },
        )
        .await?;
    Ok(Json(tx.into()))
}

/// Query parameters for the balance endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Bypass the cache and read from the chain.
    pub refresh: Option<bool>,
}

/// Wallet balance response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub public_key: String,
    #[serde(flatten)]
    pub balances: WalletBalances,
}

/// The caller's wallet balances (USDC, USDT, SOL).
#[utoipa::path(
    get,
    path = "/api/wallet/balance",
    tag = "Wallet",
    params(BalanceQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Balances", body = WalletBalance),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn balance(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<WalletBalance>, ServiceError> {
    let wallet = state
        .db
        .get_wallet(&user.user_id)
        .map_err(|e| match e {
            crate::storage::DbError::NotFound(_) => ServiceError::NotFound("Wallet".to_string()),
            other => ServiceError::Internal(other.to_string()),
        })?;

    let force = query.refresh.unwrap_or(false);
    let balances = state
        .cache
        .get_all_balances(&wallet.public_key, force)
        .await
        .map_err(|e| ServiceError::Chain(e.to_string()))?;

    Ok(Json(WalletBalance {
        public_key: wallet.public_key,
        balances,
    }))
}
