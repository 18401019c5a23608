// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication: phone normalization, OTP flow, JWT issue/verify.
//!
//! Users authenticate with a one-time code sent to their phone; a
//! successful verification issues an HS256 bearer token that the `Auth`
//! extractor validates on every protected route.

pub mod extractor;
pub mod otp;

pub use extractor::Auth;
pub use otp::{LogOtpSender, OtpSender, OtpStore};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::storage::User;

/// Normalize a phone number to E.164.
///
/// Accepts separators (spaces, dashes, dots, parentheses); requires a
/// leading `+` and 8-15 digits.
pub fn normalize_phone(input: &str) -> Option<String> {
    let trimmed: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = trimmed.strip_prefix('+')?;
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("+{digits}"))
}

/// The verified caller attached to a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub phone_number: String,
    pub expires_at: i64,
}

/// Authentication failures. All map to 401 with the standard envelope.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Malformed Authorization header")]
    InvalidAuthHeader,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token claims")]
    InvalidClaims,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "errorCode": "unauthorized",
            "message": self.to_string(),
            "traceId": Uuid::new_v4().to_string(),
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// JWT claims carried by issued tokens.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    phone: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Issue a bearer token for a verified user.
pub fn issue_token(config: &JwtConfig, user: &User) -> Result<(String, i64), AuthError> {
    let now = Utc::now();
    let expires_at = (now + Duration::minutes(config.expiry_minutes)).timestamp();
    let claims = Claims {
        sub: user.id.to_string(),
        phone: user.phone_number.clone(),
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
        iat: now.timestamp(),
        exp: expires_at,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|_| AuthError::MalformedToken)?;
    Ok((token, expires_at))
}

/// Verify a bearer token and extract the caller.
pub fn verify_token(config: &JwtConfig, token: &str) -> Result<AuthenticatedUser, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_audience(&[&config.audience]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidClaims,
        _ => AuthError::MalformedToken,
    })?;

    let user_id = data
        .claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| AuthError::InvalidClaims)?;

    Ok(AuthenticatedUser {
        user_id,
        phone_number: data.claims.phone,
        expires_at: data.claims.exp,
    })
}
