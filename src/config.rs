// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Service keys
//! follow the `Section__Key` double-underscore convention; server-level
//! keys (`HOST`, `PORT`, `RUST_LOG`, `LOG_FORMAT`) are flat.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `Database__ConnectionString` | Path of the embedded redb database file | `data/stablepay.redb` |
//! | `Redis__ConnectionString` | External cache endpoint (reserved) | unset |
//! | `Solana__RpcUrl` | Solana JSON-RPC endpoint | devnet/mainnet per `Solana__UseDevnet` |
//! | `Solana__UseDevnet` | Use devnet mints and RPC | `true` |
//! | `Solana__Commitment` | Commitment for submissions and queries | `confirmed` |
//! | `KeyManagement__Provider` | `Local`, `AwsKms`, or `AzureKeyVault` | `Local` |
//! | `KeyManagement__LocalDevelopmentKey` | Base64 32-byte master key (Local only) | unset |
//! | `KeyManagement__AzureKeyVaultUri` | Key Vault base URI | required for AzureKeyVault |
//! | `KeyManagement__AzureKeyName` | Key name inside the vault | required for AzureKeyVault |
//! | `KeyManagement__AwsKmsKeyId` | KMS key id or ARN | required for AwsKms |
//! | `KeyManagement__AwsRegion` | AWS region | required for AwsKms |
//! | `Jwt__Secret` | HS256 signing secret | development fallback, warned |
//! | `Jwt__Issuer` | Token issuer claim | `stablepay` |
//! | `Jwt__Audience` | Token audience claim | `stablepay-api` |
//! | `Jwt__ExpiryMinutes` | Token lifetime | `60` |
//! | `RateLimit__TransferPerMinute` | `send_payment` calls per user per minute | `10` |
//! | `RateLimit__OtpPerHour` | OTP requests per phone per hour | `5` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Default RPC endpoints per network.
const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";
const MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration key: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Read a `Section__Key` environment variable.
fn section_var(section: &str, key: &str) -> Option<String> {
    env::var(format!("{section}__{key}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Which KMS backend wraps wallet data keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsProviderKind {
    /// Local symmetric master key. NOT for production.
    Local,
    /// AWS KMS (GenerateDataKey / Decrypt).
    AwsKms,
    /// Azure Key Vault (RSA wrapKey / unwrapKey).
    AzureKeyVault,
}

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Embedded database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the redb database file.
    pub connection_string: String,
}

/// External cache configuration.
///
/// Recognized for deployments that front the balance cache with a network
/// store; the in-process backend ignores it.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub connection_string: Option<String>,
}

/// Solana RPC configuration.
#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub use_devnet: bool,
    /// Commitment level for submissions and status queries.
    pub commitment: String,
}

/// Key-management (KMS) configuration.
#[derive(Debug, Clone)]
pub struct KeyManagementConfig {
    pub provider: KmsProviderKind,
    /// 32-byte master key for the Local provider.
    pub local_development_key: Option<Vec<u8>>,
    pub azure_key_vault_uri: Option<String>,
    pub azure_key_name: Option<String>,
    pub aws_kms_key_id: Option<String>,
    pub aws_region: Option<String>,
}

/// JWT issuance and validation configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiry_minutes: i64,
}

/// Fixed-window rate limits per operation.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub transfer_per_minute: u32,
    pub otp_per_hour: u32,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub solana: SolanaConfig,
    pub key_management: KeyManagementConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// Missing optional keys fall back to the documented defaults; missing
    /// provider-specific keys for the selected KMS provider are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let use_devnet = section_var("Solana", "UseDevnet")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);

        let rpc_url = section_var("Solana", "RpcUrl").unwrap_or_else(|| {
            if use_devnet {
                DEVNET_RPC_URL.to_string()
            } else {
                MAINNET_RPC_URL.to_string()
            }
        });

        let provider = match section_var("KeyManagement", "Provider").as_deref() {
            None | Some("Local") => KmsProviderKind::Local,
            Some("AwsKms") => KmsProviderKind::AwsKms,
            Some("AzureKeyVault") => KmsProviderKind::AzureKeyVault,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "KeyManagement__Provider".to_string(),
                    reason: format!("unknown provider {other:?}"),
                })
            }
        };

        let local_development_key = match section_var("KeyManagement", "LocalDevelopmentKey") {
            Some(b64) => {
                let bytes = BASE64.decode(&b64).map_err(|e| ConfigError::Invalid {
                    key: "KeyManagement__LocalDevelopmentKey".to_string(),
                    reason: e.to_string(),
                })?;
                if bytes.len() != 32 {
                    return Err(ConfigError::Invalid {
                        key: "KeyManagement__LocalDevelopmentKey".to_string(),
                        reason: format!("expected 32 bytes, got {}", bytes.len()),
                    });
                }
                Some(bytes)
            }
            None => None,
        };

        let key_management = KeyManagementConfig {
            provider,
            local_development_key,
            azure_key_vault_uri: section_var("KeyManagement", "AzureKeyVaultUri"),
            azure_key_name: section_var("KeyManagement", "AzureKeyName"),
            aws_kms_key_id: section_var("KeyManagement", "AwsKmsKeyId"),
            aws_region: section_var("KeyManagement", "AwsRegion"),
        };

        match provider {
            KmsProviderKind::AzureKeyVault => {
                if key_management.azure_key_vault_uri.is_none() {
                    return Err(ConfigError::Missing(
                        "KeyManagement__AzureKeyVaultUri".to_string(),
                    ));
                }
                if key_management.azure_key_name.is_none() {
                    return Err(ConfigError::Missing(
                        "KeyManagement__AzureKeyName".to_string(),
                    ));
                }
            }
            KmsProviderKind::AwsKms => {
                if key_management.aws_kms_key_id.is_none() {
                    return Err(ConfigError::Missing(
                        "KeyManagement__AwsKmsKeyId".to_string(),
                    ));
                }
                if key_management.aws_region.is_none() {
                    return Err(ConfigError::Missing("KeyManagement__AwsRegion".to_string()));
                }
            }
            KmsProviderKind::Local => {}
        }

        let jwt = JwtConfig {
            secret: section_var("Jwt", "Secret").unwrap_or_else(|| {
                tracing::warn!("Jwt__Secret not set - using development secret");
                "stablepay-development-secret".to_string()
            }),
            issuer: section_var("Jwt", "Issuer").unwrap_or_else(|| "stablepay".to_string()),
            audience: section_var("Jwt", "Audience").unwrap_or_else(|| "stablepay-api".to_string()),
            expiry_minutes: section_var("Jwt", "ExpiryMinutes")
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        };

        let rate_limit = RateLimitConfig {
            transfer_per_minute: section_var("RateLimit", "TransferPerMinute")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            otp_per_hour: section_var("RateLimit", "OtpPerHour")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        };

        Ok(Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                connection_string: section_var("Database", "ConnectionString")
                    .unwrap_or_else(|| "data/stablepay.redb".to_string()),
            },
            redis: RedisConfig {
                connection_string: section_var("Redis", "ConnectionString"),
            },
            solana: SolanaConfig {
                rpc_url,
                use_devnet,
                commitment: section_var("Solana", "Commitment")
                    .unwrap_or_else(|| "confirmed".to_string()),
            },
            key_management,
            jwt,
            rate_limit,
        })
    }
}
