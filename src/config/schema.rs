//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! orchestrator. All types derive Serde traits for deserialization from
//! config files. Secrets are never stored in the file itself; the schema only
//! names the environment variables they are read from.

use serde::{Deserialize, Serialize};

/// Root configuration for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Target network and RPC settings.
    pub network: NetworkSection,

    /// Where signing material comes from.
    pub signer: SignerConfig,

    /// Receipt wait settings.
    pub confirmation: ConfirmationConfig,

    /// Fixed gas limits per operation kind.
    pub gas: GasConfig,

    /// Optional defaults for vault operations.
    pub vault: VaultDefaults,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Network selection and RPC connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Network name (mainnet, sepolia, polygon, polygon-amoy, arbitrum,
    /// optimism, base).
    pub name: String,

    /// Provider project id used to fill the RPC URL template.
    pub provider_project_id: Option<String>,

    /// Explicit RPC URL. Overrides the template when set.
    pub rpc_url: Option<String>,

    /// Failover JSON-RPC endpoint URLs, used for read calls only.
    pub failover_urls: Vec<String>,

    /// Explicit chain id. Falls back to the network's known id.
    pub chain_id: Option<u64>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            name: "sepolia".to_string(),
            provider_project_id: None,
            rpc_url: None,
            failover_urls: Vec::new(),
            chain_id: None,
            rpc_timeout_secs: 10,
        }
    }
}

/// Signing key source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Environment variable holding the hex-encoded private key.
    pub private_key_env: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: "BACKEND_PRIVATE_KEY".to_string(),
        }
    }
}

/// Receipt polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Maximum time to wait for a receipt, in seconds.
    pub timeout_secs: u64,

    /// Delay between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_ms: 2000,
        }
    }
}

/// Fixed gas limits. Gas is not estimated dynamically.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GasConfig {
    pub native_transfer: u64,
    pub token_transfer: u64,
    pub token_approve: u64,
    pub pool_supply: u64,
    pub vault_deposit: u64,
    pub vault_redeem: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            native_transfer: 21_000,
            token_transfer: 100_000,
            token_approve: 100_000,
            pool_supply: 500_000,
            vault_deposit: 500_000,
            vault_redeem: 500_000,
        }
    }
}

/// Defaults applied by callers when a vault request omits addresses.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct VaultDefaults {
    /// Vault (ERC-4626) contract address.
    pub vault_address: Option<String>,

    /// Underlying asset token address.
    pub asset_address: Option<String>,

    /// Decimals of the underlying asset.
    pub asset_decimals: Option<u8>,

    /// Receiver of shares / redeemed assets.
    pub receiver: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.network.name, "sepolia");
        assert_eq!(config.confirmation.timeout_secs, 300);
        assert_eq!(config.gas.native_transfer, 21_000);
        assert_eq!(config.signer.private_key_env, "BACKEND_PRIVATE_KEY");
    }

    #[test]
    fn test_partial_toml() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            [network]
            name = "arbitrum"
            provider_project_id = "abc123"

            [gas]
            pool_supply = 650000
            "#,
        )
        .unwrap();

        assert_eq!(config.network.name, "arbitrum");
        assert_eq!(config.network.provider_project_id.as_deref(), Some("abc123"));
        assert_eq!(config.gas.pool_supply, 650_000);
        // Untouched fields keep their defaults
        assert_eq!(config.gas.token_transfer, 100_000);
        assert_eq!(config.network.rpc_timeout_secs, 10);
    }
}
