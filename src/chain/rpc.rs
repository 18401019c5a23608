// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC transport for the Solana RPC API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// Default request timeout for RPC calls.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level RPC errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC connection error: {0}")]
    Connection(String),

    #[error("RPC error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("RPC response missing result")]
    EmptyResult,

    #[error("RPC decode error: {0}")]
    Decode(String),
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Thin JSON-RPC client over HTTP.
pub struct RpcClient {
    client: Client,
    url: String,
    request_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    /// Issue a single RPC call and return the raw `result` value.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, id, "solana rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Connection(e.to_string()))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            // Preflight failures carry the program logs in `data`; keep them
            // in the message so the retry classifier can see the cause.
            let message = match err.data {
                Some(data) => format!("{} ({data})", err.message),
                None => err.message,
            };
            return Err(RpcError::Node {
                code: err.code,
                message,
            });
        }

        body.result.ok_or(RpcError::EmptyResult)
    }

    /// Call and deserialize the `result` into `T`.
    pub async fn call_as<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_error_formats_code_and_message() {
        let err = RpcError::Node {
            code: -32002,
            message: "Blockhash not found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("-32002"));
        assert!(text.contains("Blockhash not found"));
    }
}
