//! Transaction building.
//!
//! # Data Flow
//! ```text
//! OperationRequest (human amounts)
//!     → amount.rs (decimal → base units)
//!     → builder.rs validate (balances, allowances, shares) → Plan
//!     → builder.rs build (fresh nonce + gas price) → UnsignedTransaction
//! ```

pub mod amount;
pub mod builder;
pub mod gas;
pub mod request;
pub mod types;

pub use builder::{BalanceProbe, Plan, TxBuilder};
pub use request::{ApprovalAmount, AssetRef, OperationKind, OperationRequest, TokenRef};
pub use types::{BalanceView, NativeTransferCost, OperationDetails, SignedTransaction, UnsignedTransaction};
