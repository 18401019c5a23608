// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment endpoints: send and history.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::Auth;
use crate::chain::Token;
use crate::error::ServiceError;
use crate::payments::SendPaymentRequest;
use crate::state::AppState;
use crate::storage::{TransactionRecord, TxStatus, TxType};

/// Body for `POST /api/payments/send`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Recipient's phone number (E.164).
    pub recipient_phone: String,
    /// Amount, 0.01-10000.
    pub amount: Decimal,
    pub token: Token,
    /// Client-chosen unique key, 16-64 characters.
    pub idempotency_key: String,
}

/// Payment outcome returned by send and withdraw.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub transaction_id: Uuid,
    pub status: TxStatus,
    pub amount: Decimal,
    pub token: Token,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for PaymentResponse {
    fn from(tx: TransactionRecord) -> Self {
        Self {
            transaction_id: tx.id,
            status: tx.status,
            amount: tx.amount,
            token: tx.token,
            signature: tx.solana_signature,
            created_at: tx.created_at,
        }
    }
}

/// Send tokens to another user by phone number.
#[utoipa::path(
    post,
    path = "/api/payments/send",
    tag = "Payments",
    request_body = PaymentRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Payment accepted", body = PaymentResponse),
        (status = 400, description = "Validation, limit, or balance failure"),
        (status = 401, description = "Unauthorized"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn send_payment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, ServiceError> {
    let tx = state
        .engine
        .send_payment(
            user.user_id,
            SendPaymentRequest {
                recipient_phone: body.recipient_phone,
                amount: body.amount,
                token: body.token,
                idempotency_key: body.idempotency_key,
            },
        )
        .await?;
    Ok(Json(tx.into()))
}

/// Query parameters for history pagination.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Page size, default 50, max 200.
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

/// One row of transaction history.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistory {
    pub transaction_id: Uuid,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub amount: Decimal,
    pub token: Token,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionHistory {
    fn from(tx: TransactionRecord) -> Self {
        Self {
            transaction_id: tx.id,
            tx_type: tx.tx_type,
            status: tx.status,
            amount: tx.amount,
            token: tx.token,
            external_address: tx.external_address,
            signature: tx.solana_signature,
            confirmed_at: tx.confirmed_at,
            created_at: tx.created_at,
        }
    }
}

/// The caller's transaction history, newest first.
#[utoipa::path(
    get,
    path = "/api/payments/history",
    tag = "Payments",
    params(HistoryQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Transaction list", body = [TransactionHistory]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn history(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionHistory>>, ServiceError> {
    let limit = query.limit.unwrap_or(50).min(200);
    let offset = query.offset.unwrap_or(0);

    let transactions = state.engine.history(user.user_id, limit, offset)?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}
