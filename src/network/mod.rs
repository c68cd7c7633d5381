//! Chain access.
//!
//! # Data Flow
//! ```text
//! NetworkConfig (network id, rpc url, chain id)
//!     → RpcClient::connect (fail fast on unreachable / wrong chain)
//!     → NetworkClient trait (balances, nonces, gas price, calls,
//!       broadcast, receipts)
//! ```
//!
//! `MockChain` implements the same trait over an in-memory ledger.

pub mod client;
pub mod mock;
pub mod types;

pub use client::{NetworkClient, RpcClient};
pub use mock::{MockChain, ReceiptMode};
pub use types::{parse_network_name, NetworkConfig, NetworkId, Receipt, DEFAULT_CHAIN_ID, USDT_DECIMALS};
