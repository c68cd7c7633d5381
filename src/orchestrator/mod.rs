//! Operation orchestration.
//!
//! # Data Flow
//! ```text
//! OperationRequest
//!     → locks.rs (per-account guard)
//!     → executor.rs (validate → approve? → build → sign → broadcast → confirm)
//!     → state.rs (ProgressEvent per transition)
//!     → outcome.rs (TransactionOutcome)
//! ```

pub mod executor;
pub mod locks;
pub mod outcome;
pub mod state;

pub use executor::Orchestrator;
pub use locks::AccountLocks;
pub use outcome::{TransactionOutcome, TxStatus};
pub use state::{OperationState, ProgressEvent};
