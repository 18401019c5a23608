// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Error Taxonomy
//!
//! Every fallible operation in the payment pipeline returns a
//! [`ServiceError`] carrying an explicit [`ErrorCode`]. At the HTTP
//! boundary the error is converted into a camelCase JSON envelope:
//!
//! ```json
//! { "errorCode": "insufficientBalance", "message": "...", "traceId": "..." }
//! ```
//!
//! Crypto and terminal chain failures are surfaced as generic envelopes;
//! the detailed cause is logged server-side with the trace id.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    Validation,
    NotFound,
    InsufficientBalance,
    DailyLimitExceeded,
    MonthlyLimitExceeded,
    RateLimited,
    AccountFrozen,
    InvalidOtp,
    Unauthorized,
    ChainError,
    CryptoAuth,
    Internal,
}

/// Service-level error with the taxonomy of the payment pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Daily transfer limit exceeded")]
    DailyLimitExceeded,

    #[error("Monthly transfer limit exceeded")]
    MonthlyLimitExceeded,

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Account is frozen")]
    AccountFrozen,

    #[error("Invalid or expired OTP code")]
    InvalidOtp,

    #[error("Authentication required")]
    Unauthorized,

    /// Terminal chain failure. Transient chain errors never reach this
    /// type; the chain client retries them internally.
    #[error("Chain error: {0}")]
    Chain(String),

    /// GCM tag, payload magic/version, or user-binding failure.
    #[error("Crypto authentication failure: {0}")]
    CryptoAuth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Self::DailyLimitExceeded => ErrorCode::DailyLimitExceeded,
            Self::MonthlyLimitExceeded => ErrorCode::MonthlyLimitExceeded,
            Self::RateLimited(_) => ErrorCode::RateLimited,
            Self::AccountFrozen => ErrorCode::AccountFrozen,
            Self::InvalidOtp => ErrorCode::InvalidOtp,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::Chain(_) => ErrorCode::ChainError,
            Self::CryptoAuth(_) => ErrorCode::CryptoAuth,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status for this error, per the surface table.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InsufficientBalance { .. }
            | Self::DailyLimitExceeded
            | Self::MonthlyLimitExceeded => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::AccountFrozen => StatusCode::FORBIDDEN,
            Self::InvalidOtp | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Chain(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::CryptoAuth(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the detailed message may be shown to the caller.
    ///
    /// Crypto and internal failures are replaced by a generic message; the
    /// real cause stays in the server log.
    fn surfaces_detail(&self) -> bool {
        !matches!(
            self,
            Self::Chain(_) | Self::CryptoAuth(_) | Self::Internal(_)
        )
    }
}

/// JSON body for error responses.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
    pub trace_id: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let status = self.status();
        let code = self.code();

        let message = if self.surfaces_detail() {
            self.to_string()
        } else {
            tracing::error!(trace_id = %trace_id, error = %self, "request failed");
            match code {
                ErrorCode::ChainError => "Blockchain temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        };

        let body = Json(ErrorBody {
            error_code: code,
            message,
            trace_id,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;

    #[test]
    fn status_mapping_matches_surface_table() {
        assert_eq!(
            ServiceError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("User".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::RateLimited("transfer".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServiceError::AccountFrozen.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::InvalidOtp.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::CryptoAuth("tag".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Chain("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn envelope_is_camel_case() {
        let response = ServiceError::InsufficientBalance {
            requested: dec!(25.00),
            available: dec!(10.00),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errorCode"], "insufficientBalance");
        assert!(body["traceId"].is_string());
        assert!(body["message"].as_str().unwrap().contains("25"));
    }

    #[tokio::test]
    async fn crypto_failures_do_not_leak_detail() {
        let response = ServiceError::CryptoAuth("GCM tag mismatch on wallet 42".into())
            .into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["errorCode"], "cryptoAuth");
    }
}
