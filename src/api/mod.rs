// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

use crate::state::AppState;

pub mod auth;
pub mod health;
pub mod payments;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Auth endpoints
        .route("/api/auth/request-otp", post(auth::request_otp))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        // Payment endpoints (auth required)
        .route("/api/payments/send", post(payments::send_payment))
        .route("/api/payments/history", get(payments::history))
        // Wallet endpoints (auth required)
        .route("/api/wallet/withdraw", post(wallet::withdraw))
        .route("/api/wallet/balance", get(wallet::balance))
        // OpenAPI document
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(build_cors_layer())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build CORS layer from environment configuration.
///
/// - If `CORS_ALLOWED_ORIGINS` is set, only those origins are allowed
///   (comma-separated).
/// - If not set, falls back to permissive CORS (development only).
fn build_cors_layer() -> CorsLayer {
    if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
        let allowed: Vec<_> = origins
            .split(',')
            .map(|s| s.trim().parse().expect("Invalid CORS origin"))
            .collect();
        tracing::info!(origins = %origins, "CORS: restricting to configured origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set - using permissive CORS (development only)");
        CorsLayer::permissive()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::request_otp,
        auth::verify_otp,
        payments::send_payment,
        payments::history,
        wallet::withdraw,
        wallet::balance,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            auth::RequestOtpBody,
            auth::VerifyOtpBody,
            auth::AuthResponse,
            payments::PaymentRequest,
            payments::PaymentResponse,
            payments::TransactionHistory,
            wallet::WithdrawRequest,
            wallet::WalletBalance,
            health::HealthResponse,
            crate::cache::WalletBalances,
            crate::chain::Token,
            crate::error::ErrorBody,
            crate::error::ErrorCode,
            crate::storage::TxStatus,
            crate::storage::TxType
        )
    ),
    tags(
        (name = "Auth", description = "Phone OTP authentication"),
        (name = "Payments", description = "Token transfers between users"),
        (name = "Wallet", description = "Balances and withdrawals"),
        (name = "Health", description = "Liveness and readiness checks")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

/// Security scheme for OpenAPI documentation
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
            let scheme = Http::builder()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some("Session JWT from /api/auth/verify-otp"))
                .build();
            components.add_security_scheme("bearer", SecurityScheme::Http(scheme));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Token;
    use crate::state::test_support::test_state;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _chain, _dir) = test_state();
        let app = router(state);
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _chain, _dir) = test_state();
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn payments_require_auth() {
        let (state, _chain, _dir) = test_state();
        let app = router(state);

        let response = app
            .oneshot(json_request(
                "/api/payments/send",
                serde_json::json!({
                    "recipientPhone": "+14155550102",
                    "amount": "25.00",
                    "token": "USDC",
                    "idempotencyKey": "k-001-aaaaaaaaaaaaaaaa",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn otp_flow_registers_and_authenticates() {
        let (state, chain, _dir) = test_state();
        let app = router(state.clone());

        // Request a code, then read it back via the store (the test
        // sender only logs it).
        let response = app
            .clone()
            .oneshot(json_request(
                "/api/auth/request-otp",
                serde_json::json!({ "phoneNumber": "+14155550101" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let code = state.otp.issue("+14155550101");
        let response = app
            .clone()
            .oneshot(json_request(
                "/api/auth/verify-otp",
                serde_json::json!({ "phoneNumber": "+14155550101", "code": code }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap().to_string();

        // The registered user has a wallet with balances readable
        let user = state
            .db
            .find_user_by_phone("+14155550101")
            .unwrap()
            .unwrap();
        let wallet = state.db.get_wallet(&user.id).unwrap();
        chain.set_token_balance(&wallet.public_key, Token::Usdc, dec!(100));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/wallet/balance")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["publicKey"].as_str().unwrap(), wallet.public_key);
    }

    #[tokio::test]
    async fn wrong_otp_code_is_unauthorized() {
        let (state, _chain, _dir) = test_state();
        let app = router(state.clone());
        state.otp.issue("+14155550101");

        let response = app
            .oneshot(json_request(
                "/api/auth/verify-otp",
                serde_json::json!({ "phoneNumber": "+14155550101", "code": "000000" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["errorCode"], "invalidOtp");
    }

    #[tokio::test]
    async fn send_payment_end_to_end() {
        let (state, chain, _dir) = test_state();
        let app = router(state.clone());

        // Register Alice and Bob through the OTP flow
        let mut tokens = Vec::new();
        for phone in ["+14155550101", "+14155550102"] {
            let code = state.otp.issue(phone);
            let response = app
                .clone()
                .oneshot(json_request(
                    "/api/auth/verify-otp",
                    serde_json::json!({ "phoneNumber": phone, "code": code }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            tokens.push(body["token"].as_str().unwrap().to_string());
        }

        let alice = state
            .db
            .find_user_by_phone("+14155550101")
            .unwrap()
            .unwrap();
        let alice_wallet = state.db.get_wallet(&alice.id).unwrap();
        chain.set_token_balance(&alice_wallet.public_key, Token::Usdc, dec!(100));

        let send = |key: &str| {
            json_request(
                "/api/payments/send",
                serde_json::json!({
                    "recipientPhone": "+14155550102",
                    "amount": "25.00",
                    "token": "USDC",
                    "idempotencyKey": key,
                }),
            )
        };

        let mut request = send("k-001-aaaaaaaaaaaaaaaa");
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", tokens[0]).parse().unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "processing");
        assert_eq!(body["token"], "USDC");
        assert!(body["signature"].is_string());
        let first_id = body["transactionId"].as_str().unwrap().to_string();

        // Idempotent replay returns the same transaction
        let mut replay = send("k-001-aaaaaaaaaaaaaaaa");
        replay.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", tokens[0]).parse().unwrap(),
        );
        let response = app.oneshot(replay).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["transactionId"].as_str().unwrap(), first_id);
        assert_eq!(chain.transfer_calls(), 1);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (state, _chain, _dir) = test_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api-doc/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert!(body["paths"]["/api/payments/send"].is_object());
    }
}
