// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Azure Key Vault provider.
//!
//! Wraps DEKs with RSA-OAEP-256 via the vault's `wrapKey` / `unwrapKey`
//! REST operations. The bearer token comes from `AZURE_ACCESS_TOKEN` when
//! set, otherwise from the instance metadata (managed identity) endpoint.

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
    Engine,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

use super::{
    generate_dek, open_payload, seal_payload, EnvelopeBlob, KmsError, KmsProvider, DEK_LEN,
};
use crate::config::KeyManagementConfig;

const API_VERSION: &str = "7.4";
const WRAP_ALGORITHM: &str = "RSA-OAEP-256";
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token\
?api-version=2018-02-01&resource=https%3A%2F%2Fvault.azure.net";

/// Azure Key Vault provider.
pub struct AzureKeyVault {
    client: Client,
    vault_uri: String,
    key_name: String,
}

#[derive(Debug, Deserialize)]
struct KeyOperationResponse {
    kid: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ImdsTokenResponse {
    access_token: String,
}

impl AzureKeyVault {
    pub fn from_config(config: &KeyManagementConfig) -> Result<Self, KmsError> {
        let vault_uri = config.azure_key_vault_uri.clone().ok_or_else(|| {
            KmsError::Provider("KeyManagement__AzureKeyVaultUri not set".to_string())
        })?;
        let key_name = config
            .azure_key_name
            .clone()
            .ok_or_else(|| KmsError::Provider("KeyManagement__AzureKeyName not set".to_string()))?;

        Ok(Self {
            client: Client::new(),
            vault_uri: vault_uri.trim_end_matches('/').to_string(),
            key_name,
        })
    }

    async fn bearer_token(&self) -> Result<String, KmsError> {
        if let Ok(token) = std::env::var("AZURE_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        let response = self
            .client
            .get(IMDS_TOKEN_URL)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| KmsError::Provider(format!("managed identity token fetch: {e}")))?;
        let parsed: ImdsTokenResponse = response
            .json()
            .await
            .map_err(|e| KmsError::Provider(format!("managed identity token decode: {e}")))?;
        Ok(parsed.access_token)
    }

    /// POST a key operation (`wrapkey` / `unwrapkey`) at the given key URL.
    async fn key_operation(
        &self,
        key_url: &str,
        operation: &str,
        value: &[u8],
    ) -> Result<KeyOperationResponse, KmsError> {
        let token = self.bearer_token().await?;
        let url = format!("{key_url}/{operation}?api-version={API_VERSION}");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "alg": WRAP_ALGORITHM,
                "value": BASE64_URL.encode(value),
            }))
            .send()
            .await
            .map_err(|e| KmsError::Provider(format!("key vault request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| KmsError::Provider(format!("key vault response read: {e}")))?;

        if !status.is_success() {
            // A 400 on unwrap means the ciphertext does not match the key.
            if operation == "unwrapkey" && status.as_u16() == 400 {
                return Err(KmsError::CryptoAuth(format!("unwrapKey refused: {text}")));
            }
            return Err(KmsError::Provider(format!(
                "key vault {operation} failed: {status} {text}"
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| KmsError::Provider(format!("key vault response decode: {e}")))
    }
}

#[async_trait]
impl KmsProvider for AzureKeyVault {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), KmsError> {
        let dek = generate_dek()?;

        // Wrap against the unversioned key URL so the vault picks the
        // current version; the response kid pins it for decryption.
        let key_url = format!("{}/keys/{}", self.vault_uri, self.key_name);
        let wrapped = self.key_operation(&key_url, "wrapkey", dek.as_ref()).await?;

        let wrapped_dek = BASE64_URL
            .decode(&wrapped.value)
            .map_err(|e| KmsError::Provider(format!("wrapped DEK decode: {e}")))?;

        let (iv, ciphertext, tag) = seal_payload(&dek, plaintext)?;

        let blob = EnvelopeBlob {
            wrapped_dek,
            iv,
            ciphertext,
            tag,
        };
        Ok((blob.encode(), wrapped.kid))
    }

    async fn decrypt(&self, blob: &str, key_version: &str) -> Result<Vec<u8>, KmsError> {
        let envelope = EnvelopeBlob::decode(blob)?;

        let unwrapped = self
            .key_operation(key_version, "unwrapkey", &envelope.wrapped_dek)
            .await?;

        let dek_bytes = Zeroizing::new(
            BASE64_URL
                .decode(&unwrapped.value)
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
        format!("{}/keys/{}", self.vault_uri, self.key_name)
    }
}

/// Round-trip blobs are provider-agnostic; the shared format is exercised
/// in `kms::tests` and `kms::local::tests`. Only construction rules are
/// testable here without a vault.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KmsProviderKind;

    #[test]
    fn from_config_requires_uri_and_name() {
        let config = KeyManagementConfig {
            provider: KmsProviderKind::AzureKeyVault,
            local_development_key: None,
            azure_key_vault_uri: Some("https://example.vault.azure.net/".to_string()),
            azure_key_name: None,
            aws_kms_key_id: None,
            aws_region: None,
        };
        assert!(AzureKeyVault::from_config(&config).is_err());
    }

    #[test]
    fn vault_uri_is_normalized() {
        let config = KeyManagementConfig {
            provider: KmsProviderKind::AzureKeyVault,
            local_development_key: None,
            azure_key_vault_uri: Some("https://example.vault.azure.net/".to_string()),
            azure_key_name: Some("wallet-master".to_string()),
            aws_kms_key_id: None,
            aws_region: None,
        };
        let kms = AzureKeyVault::from_config(&config).unwrap();
        assert_eq!(
            kms.current_key_version(),
            "https://example.vault.azure.net/keys/wallet-master"
        );
    }
}
