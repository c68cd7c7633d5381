//! Error taxonomy for the orchestration layer.
//!
//! Every failure path maps to one distinguishable variant. Precondition and
//! configuration errors are raised before anything is signed; once a
//! transaction has been broadcast its hash travels with the error.

use alloy::primitives::{Address, TxHash, U256};
use thiserror::Error;

/// Errors produced by the network client, builder, signer and orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Missing or malformed credentials / settings. Fatal, not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// RPC endpoint unreachable (or on the wrong chain) at construction.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read-only RPC call failed before anything was broadcast.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Insufficient {asset} balance for {account}: have {available}, need {required}")]
    InsufficientBalance {
        account: Address,
        asset: String,
        available: U256,
        required: U256,
    },

    #[error("Insufficient allowance for spender {spender}: have {available}, need {required}")]
    InsufficientAllowance {
        spender: Address,
        available: U256,
        required: U256,
    },

    #[error("Insufficient vault shares for {owner}: have {available}, need {required}")]
    InsufficientShares {
        owner: Address,
        available: U256,
        required: U256,
    },

    /// The approval sub-operation did not reach success; the main action was
    /// never attempted.
    #[error("Approval failed{}: {}", fmt_hash(.tx_hash), .reason)]
    ApprovalFailed {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// The node rejected the signed transaction, or did not answer. The
    /// nonce must be re-queried before any new attempt. When the node did
    /// not answer the transaction may still propagate, and its locally
    /// computed hash is attached.
    #[error("Broadcast failed{}: {}", fmt_hash(.tx_hash), .reason)]
    Broadcast {
        reason: String,
        tx_hash: Option<TxHash>,
    },

    /// No receipt within the wait bound. The transaction may still land;
    /// callers must poll by hash instead of resending.
    #[error("Transaction {tx_hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: TxHash, timeout_secs: u64 },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

fn fmt_hash(tx_hash: &Option<TxHash>) -> String {
    match tx_hash {
        Some(hash) => format!(" (tx {hash})"),
        None => String::new(),
    }
}

impl OrchestratorError {
    /// Broadcast refused by the node; nothing was propagated.
    pub fn broadcast_rejected(reason: impl Into<String>) -> Self {
        Self::Broadcast {
            reason: reason.into(),
            tx_hash: None,
        }
    }

    /// Transaction hash attached to this error, when the failure happened
    /// after a broadcast.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::ApprovalFailed { tx_hash, .. } | Self::Broadcast { tx_hash, .. } => *tx_hash,
            Self::ConfirmationTimeout { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    /// True for failures detected against on-chain state before signing.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::InsufficientAllowance { .. }
                | Self::InsufficientShares { .. }
                | Self::InvalidAmount(_)
        )
    }

    /// True when the caller may safely submit the same request again once the
    /// underlying cause is fixed. Ambiguous outcomes are never retryable.
    pub fn is_retryable_after_remediation(&self) -> bool {
        self.is_precondition() || matches!(self, Self::Rpc(_) | Self::Broadcast { tx_hash: None, .. })
    }

    /// Short stable label, used for metrics and progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Connection(_) => "connection",
            Self::Rpc(_) => "rpc",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientAllowance { .. } => "insufficient_allowance",
            Self::InsufficientShares { .. } => "insufficient_shares",
            Self::ApprovalFailed { .. } => "approval_failed",
            Self::Broadcast { .. } => "broadcast",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::InvalidTransaction(_) => "invalid_transaction",
            Self::InvalidAmount(_) => "invalid_amount",
        }
    }
}

/// Result type for orchestration operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
