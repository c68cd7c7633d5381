//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, gas limits sane)
//! - Check that addresses and network names parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OrchestratorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::schema::OrchestratorConfig;
use crate::network::parse_network_name;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if parse_network_name(&config.network.name).is_err() {
        errors.push(ValidationError::new(
            "network.name",
            format!("unsupported network '{}'", config.network.name),
        ));
    }

    if config.network.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("network.rpc_timeout_secs", "must be > 0"));
    }

    if let Some(url) = &config.network.rpc_url {
        if url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new("network.rpc_url", format!("invalid URL '{url}'")));
        }
    }

    if config.network.chain_id == Some(0) {
        errors.push(ValidationError::new("network.chain_id", "must be > 0"));
    }

    if config.confirmation.timeout_secs == 0 {
        errors.push(ValidationError::new("confirmation.timeout_secs", "must be > 0"));
    }

    if config.confirmation.poll_interval_ms == 0 {
        errors.push(ValidationError::new("confirmation.poll_interval_ms", "must be > 0"));
    }

    let gas = &config.gas;
    for (field, limit) in [
        ("gas.native_transfer", gas.native_transfer),
        ("gas.token_transfer", gas.token_transfer),
        ("gas.token_approve", gas.token_approve),
        ("gas.pool_supply", gas.pool_supply),
        ("gas.vault_deposit", gas.vault_deposit),
        ("gas.vault_redeem", gas.vault_redeem),
    ] {
        if limit < 21_000 {
            errors.push(ValidationError::new(field, format!("{limit} is below the 21000 intrinsic cost")));
        }
    }

    for (field, value) in [
        ("vault.vault_address", &config.vault.vault_address),
        ("vault.asset_address", &config.vault.asset_address),
        ("vault.receiver", &config.vault.receiver),
    ] {
        if let Some(address) = value {
            if address.parse::<Address>().is_err() {
                errors.push(ValidationError::new(field, format!("invalid address '{address}'")));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
