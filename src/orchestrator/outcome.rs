//! Terminal result of a confirmed operation.

use std::fmt;

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transaction::{OperationDetails, OperationKind};

/// Receipt status. A reverted transaction is still a confirmed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Failed,
}

impl TxStatus {
    pub fn from_receipt(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Produced only after a receipt has been observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub tx_hash: TxHash,
    pub status: TxStatus,
    pub block_number: u64,
    pub gas_used: u64,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub explorer_url: String,
    pub details: OperationDetails,
}

impl TransactionOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
