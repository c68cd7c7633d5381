//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::OrchestratorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `network.provider_project_id`.
pub const PROVIDER_ID_ENV_VAR: &str = "INFURA_PROJECT_ID";
/// Environment variable overriding `network.name`.
pub const NETWORK_ENV_VAR: &str = "NETWORK";
/// Environment variable overriding `network.chain_id`.
pub const CHAIN_ID_ENV_VAR: &str = "CHAIN_ID";
/// Environment variable overriding `network.rpc_url`.
pub const RPC_URL_ENV_VAR: &str = "RPC_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment override {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides to, and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_config_str(&content, |key| std::env::var(key).ok())
}

/// Build a config from process environment only, starting from defaults.
pub fn load_from_env() -> Result<OrchestratorConfig, ConfigError> {
    load_config_str("", |key| std::env::var(key).ok())
}

/// Parse TOML text, apply overrides from `lookup`, then validate.
pub fn load_config_str<F>(content: &str, lookup: F) -> Result<OrchestratorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: OrchestratorConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment values on top of file values.
pub fn apply_env_overrides<F>(config: &mut OrchestratorConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(id) = lookup(PROVIDER_ID_ENV_VAR).filter(|v| !v.is_empty()) {
        config.network.provider_project_id = Some(id);
    }
    if let Some(name) = lookup(NETWORK_ENV_VAR).filter(|v| !v.is_empty()) {
        config.network.name = name;
    }
    if let Some(url) = lookup(RPC_URL_ENV_VAR).filter(|v| !v.is_empty()) {
        config.network.rpc_url = Some(url);
    }
    if let Some(raw) = lookup(CHAIN_ID_ENV_VAR).filter(|v| !v.is_empty()) {
        let chain_id = raw.parse::<u64>().map_err(|e| ConfigError::Env {
            var: CHAIN_ID_ENV_VAR,
            message: e.to_string(),
        })?;
        config.network.chain_id = Some(chain_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = load_config_str(
            "[network]\nname = \"mainnet\"\n",
            env(&[("NETWORK", "base"), ("INFURA_PROJECT_ID", "p1"), ("CHAIN_ID", "8453")]),
        )
        .unwrap();

        assert_eq!(config.network.name, "base");
        assert_eq!(config.network.provider_project_id.as_deref(), Some("p1"));
        assert_eq!(config.network.chain_id, Some(8453));
    }

    #[test]
    fn test_bad_chain_id_override() {
        let err = load_config_str("", env(&[("CHAIN_ID", "one")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "CHAIN_ID", .. }));
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = load_config_str("[confirmation]\ntimeout_secs = 0\n", env(&[])).unwrap_err();
        assert!(err.to_string().contains("confirmation.timeout_secs"));
    }

    #[test]
    fn test_parse_error() {
        let err = load_config_str("[network\n", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
