// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Phone OTP authentication endpoints.
//!
//! The first successful verification registers the user and creates
//! their custodial wallet; subsequent verifications refresh
//! `last_login_at` and issue a new token.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{issue_token, normalize_phone};
use crate::error::ServiceError;
use crate::state::AppState;
use crate::storage::{AuditEntry, AuditLog, User};

/// Body for `POST /api/auth/request-otp`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpBody {
    pub phone_number: String,
}

/// Body for `POST /api/auth/verify-otp`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpBody {
    pub phone_number: String,
    /// Six-digit code.
    pub code: String,
}

/// Issued session token.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub token: String,
    /// Unix timestamp the token expires at.
    pub expires_at: i64,
}

/// Request a one-time code for a phone number.
#[utoipa::path(
    post,
    path = "/api/auth/request-otp",
    tag = "Auth",
    request_body = RequestOtpBody,
    responses(
        (status = 200, description = "Code issued"),
        (status = 400, description = "Invalid phone number"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(body): Json<RequestOtpBody>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let phone = normalize_phone(&body.phone_number)
        .ok_or_else(|| ServiceError::Validation("invalid phone number".to_string()))?;

    if !state.limiter.check("otp", &phone) {
        return Err(ServiceError::RateLimited("otp".to_string()));
    }

    let code = state.otp.issue(&phone);
    state.otp_sender.send(&phone, &code);

    Ok(Json(json!({ "status": "sent" })))
}

/// Verify a one-time code; registers the user and wallet on first use.
#[utoipa::path(
    post,
    path = "/api/auth/verify-otp",
    tag = "Auth",
    request_body = VerifyOtpBody,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 400, description = "Invalid phone number"),
        (status = 401, description = "Invalid or expired code")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyOtpBody>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let phone = normalize_phone(&body.phone_number)
        .ok_or_else(|| ServiceError::Validation("invalid phone number".to_string()))?;

    if !state.otp.verify(&phone, &body.code) {
        return Err(ServiceError::InvalidOtp);
    }

    let audit = AuditLog::new(state.db.clone());

    let mut user = match state
        .db
        .find_user_by_phone(&phone)
        .map_err(|e| ServiceError::Internal(e.to_string()))?
    {
        Some(user) => user,
        None => {
            let user = User::new(phone.clone());
            state
                .db
                .create_user(&user)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;

            let wallet = state
                .crypto
                .generate(user.id)
                .await
                .map_err(|e| ServiceError::CryptoAuth(e.to_string()))?;
            state
                .db
                .create_wallet(&wallet)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;

            audit.record(
                AuditEntry::new("user_registered", "user")
                    .with_user(user.id)
                    .with_new_values(json!({ "phone": phone })),
            );
            audit.record(
                AuditEntry::new("wallet_created", "wallet")
                    .with_user(user.id)
                    .with_entity_id(wallet.public_key.clone()),
            );

            tracing::info!(user_id = %user.id, wallet = %wallet.public_key, "registered user");
            user
        }
    };

    if user.is_frozen {
        return Err(ServiceError::AccountFrozen);
    }

    user.last_login_at = Some(Utc::now());
    user.updated_at = Utc::now();
    state
        .db
        .update_user(&user)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

    let (token, expires_at) =
        issue_token(&state.config.jwt, &user).map_err(|_| ServiceError::Internal(
            "token issuance failed".to_string(),
        ))?;

    audit.record(AuditEntry::new("otp_verified", "user").with_user(user.id));

    Ok(Json(AuthResponse {
        user_id: user.id,
        token,
        expires_at,
    }))
}
