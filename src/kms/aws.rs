// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AWS KMS provider.
//!
//! Wraps DEKs with `GenerateDataKey` / `Decrypt` calls against the KMS
//! JSON API, signed with SigV4. Credentials come from the standard
//! `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
//! environment variables.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{open_payload, seal_payload, EnvelopeBlob, KmsError, KmsProvider, DEK_LEN};
use crate::config::KeyManagementConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS KMS provider over the JSON 1.1 API.
pub struct AwsKms {
    client: Client,
    key_id: String,
    region: String,
}

#[derive(Debug, Deserialize)]
struct GenerateDataKeyResponse {
    #[serde(rename = "CiphertextBlob")]
    ciphertext_blob: String,
    #[serde(rename = "Plaintext")]
    plaintext: String,
    #[serde(rename = "KeyId")]
    key_id: String,
}

#[derive(Debug, Deserialize)]
struct DecryptResponse {
    #[serde(rename = "Plaintext")]
    plaintext: String,
}

impl AwsKms {
    pub fn from_config(config: &KeyManagementConfig) -> Result<Self, KmsError> {
        let key_id = config
            .aws_kms_key_id
            .clone()
            .ok_or_else(|| KmsError::Provider("KeyManagement__AwsKmsKeyId not set".to_string()))?;
        let region = config
            .aws_region
            .clone()
            .ok_or_else(|| KmsError::Provider("KeyManagement__AwsRegion not set".to_string()))?;

        Ok(Self {
            client: Client::new(),
            key_id,
            region,
        })
    }

    fn host(&self) -> String {
        format!("kms.{}.amazonaws.com", self.region)
    }

    /// Issue a signed KMS API call.
    async fn call(&self, target: &str, body: serde_json::Value) -> Result<serde_json::Value, KmsError> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| KmsError::Provider("AWS_ACCESS_KEY_ID not set".to_string()))?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| KmsError::Provider("AWS_SECRET_ACCESS_KEY not set".to_string()))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        let host = self.host();
        let body_bytes = serde_json::to_vec(&body)
            .map_err(|e| KmsError::Provider(format!("request encoding: {e}")))?;

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        // Canonical headers, sorted by name.
        let mut headers: Vec<(String, String)> = vec![
            ("content-type".into(), "application/x-amz-json-1.1".into()),
            ("host".into(), host.clone()),
            ("x-amz-date".into(), amz_date.clone()),
            ("x-amz-target".into(), target.to_string()),
        ];
        if let Some(token) = &session_token {
            headers.push(("x-amz-security-token".into(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let payload_hash = hex::encode(Sha256::digest(&body_bytes));
        let canonical_request =
            format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

        let scope = format!("{date}/{}/kms/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(&secret_key, &date, &self.region, "kms");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
        );

        let mut request = self
            .client
            .post(format!("https://{host}/"))
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", target)
            .header("X-Amz-Date", &amz_date)
            .header("Authorization", authorization)
            .body(body_bytes);
        if let Some(token) = &session_token {
            request = request.header("X-Amz-Security-Token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KmsError::Provider(format!("KMS request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| KmsError::Provider(format!("KMS response read failed: {e}")))?;

        if !status.is_success() {
            return Err(KmsError::Provider(format!("KMS {target} failed: {status} {text}")));
        }

        serde_json::from_str(&text).map_err(|e| KmsError::Provider(format!("KMS response decode: {e}")))
    }
}

#[async_trait]
impl KmsProvider for AwsKms {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), KmsError> {
        let response = self
            .call(
                "TrentService.GenerateDataKey",
                json!({ "KeyId": self.key_id, "KeySpec": "AES_256" }),
            )
            .await?;
        let parsed: GenerateDataKeyResponse = serde_json::from_value(response)
            .map_err(|e| KmsError::Provider(format!("GenerateDataKey decode: {e}")))?;

        let dek_bytes = Zeroizing::new(
            BASE64
                .decode(&parsed.plaintext)
                .map_err(|e| KmsError::Provider(format!("DEK decode: {e}")))?,
        );
        let dek: Zeroizing<[u8; DEK_LEN]> = Zeroizing::new(
            dek_bytes
                .as_slice()
                .try_into()
                .map_err(|_| KmsError::Provider("DEK is not 32 bytes".to_string()))?,
        );
        let wrapped_dek = BASE64
            .decode(&parsed.ciphertext_blob)
            .map_err(|e| KmsError::Provider(format!("CiphertextBlob decode: {e}")))?;

        let (iv, ciphertext, tag) = seal_payload(&dek, plaintext)?;

        let blob = EnvelopeBlob {
            wrapped_dek,
            iv,
            ciphertext,
            tag,
        };
        Ok((blob.encode(), parsed.key_id))
    }

    async fn decrypt(&self, blob: &str, key_version: &str) -> Result<Vec<u8>, KmsError> {
        let envelope = EnvelopeBlob::decode(blob)?;

        let response = self
            .call(
                "TrentService.Decrypt",
                json!({
                    "CiphertextBlob": BASE64.encode(&envelope.wrapped_dek),
                    "KeyId": key_version,
                }),
            )
            .await
            .map_err(|e| match e {
                // An unwrap refusal is an authentication failure, not an
                // availability problem.
                KmsError::Provider(msg) if msg.contains("InvalidCiphertext") => {
                    KmsError::CryptoAuth(msg)
                }
                other => other,
            })?;
        let parsed: DecryptResponse = serde_json::from_value(response)
            .map_err(|e| KmsError::Provider(format!("Decrypt decode: {e}")))?;

        let dek_bytes = Zeroizing::new(
            BASE64
                .decode(&parsed.plaintext)
                .map_err(|e| KmsError::Provider(format!("DEK decode: {e}")))?,
        );
        let dek: Zeroizing<[u8; DEK_LEN]> = Zeroizing::new(
            dek_bytes
                .as_slice()
                .try_into()
                .map_err(|_| KmsError::CryptoAuth("unwrapped DEK is not 32 bytes".to_string()))?,
        );

        open_payload(&dek, &envelope.iv, &envelope.ciphertext, &envelope.tag)
    }

    fn current_key_version(&self) -> String {
        self.key_id.clone()
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// SigV4 signing key derivation chain.
fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Key derivation vector from the AWS SigV4 documentation.
    #[test]
    fn signing_key_derivation_matches_aws_vector() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn from_config_requires_key_and_region() {
        let config = KeyManagementConfig {
            provider: crate::config::KmsProviderKind::AwsKms,
            local_development_key: None,
            azure_key_vault_uri: None,
            azure_key_name: None,
            aws_kms_key_id: None,
            aws_region: Some("eu-west-1".to_string()),
        };
        assert!(AwsKms::from_config(&config).is_err());
    }
}
