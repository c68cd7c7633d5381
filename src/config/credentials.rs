//! Secret resolution.
//!
//! Signing key and provider id are resolved once, at startup, and handed to
//! the caller as explicit values. Missing values fail fast.

use std::fmt;

use crate::config::schema::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Hex-encoded private key. Never printed.
#[derive(Clone)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Credentials needed to run operations against a provider-hosted network.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub private_key: SecretKey,
    pub provider_project_id: Option<String>,
}

impl Credentials {
    /// Resolve credentials from the process environment.
    pub fn from_config(config: &OrchestratorConfig) -> OrchestratorResult<Self> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve credentials with an explicit lookup.
    ///
    /// The provider id is mandatory unless an explicit `rpc_url` is set.
    pub fn resolve<F>(config: &OrchestratorConfig, lookup: F) -> OrchestratorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_var = &config.signer.private_key_env;
        let private_key = lookup(env_var)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                OrchestratorError::Configuration(format!("signing key not set (expected in {env_var})"))
            })?;

        let provider_project_id = config
            .network
            .provider_project_id
            .clone()
            .filter(|v| !v.trim().is_empty());

        if provider_project_id.is_none() && config.network.rpc_url.is_none() {
            return Err(OrchestratorError::Configuration(
                "provider project id not set (network.provider_project_id or INFURA_PROJECT_ID)".into(),
            ));
        }

        Ok(Self {
            private_key: SecretKey::new(private_key.trim()),
            provider_project_id,
        })
    }
}
