//! On-chain transaction orchestration for EVM networks.
//!
//! Checks balances and allowances, builds transactions with a fresh nonce
//! and gas price, signs them with a held key, broadcasts and waits for a
//! receipt. Supports native and token transfers, approvals, lending pool
//! supply and ERC-4626 vault deposit/redeem.

pub mod config;
pub mod contracts;
pub mod error;
pub mod network;
pub mod observability;
pub mod orchestrator;
pub mod transaction;
pub mod wallet;

pub use config::schema::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use network::{MockChain, NetworkClient, RpcClient};
pub use orchestrator::{Orchestrator, TransactionOutcome, TxStatus};
pub use transaction::{OperationRequest, TokenRef};
pub use wallet::Account;
