//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → OrchestratorConfig (validated, immutable)
//!     → credentials.rs (signing key + provider id, fail fast)
//! ```
//!
//! # Design Decisions
//! - Config is built explicitly by the caller; nothing is read implicitly
//!   at import time
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod credentials;
pub mod loader;
pub mod schema;
pub mod validation;

pub use credentials::{Credentials, SecretKey};
pub use loader::{load_config, ConfigError};
pub use schema::{
    ConfirmationConfig, GasConfig, NetworkSection, ObservabilityConfig, OrchestratorConfig,
    SignerConfig, VaultDefaults,
};
