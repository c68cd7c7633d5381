//! Transaction and operation value types.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::request::ApprovalAmount;

/// A fully parameterized transaction awaiting a signature.
///
/// Nonce and gas price are fetched at build time and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

/// EIP-2718 encoded, signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub raw: Bytes,
    pub from: Address,
    pub nonce: u64,
}

/// Operation-specific part of an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OperationDetails {
    NativeTransfer {
        to: Address,
        amount: Decimal,
        symbol: String,
        value: U256,
    },
    TokenTransfer {
        token: Address,
        symbol: String,
        to: Address,
        amount: Decimal,
        value: U256,
    },
    Approval {
        token: Address,
        symbol: String,
        spender: Address,
        amount: ApprovalAmount,
        value: U256,
    },
    PoolSupply {
        pool: Address,
        asset: Address,
        symbol: String,
        on_behalf_of: Address,
        amount: Decimal,
        value: U256,
        /// Approval sent first, if one was needed.
        approval_tx: Option<TxHash>,
    },
    VaultDeposit {
        vault: Address,
        asset: Address,
        symbol: String,
        receiver: Address,
        assets: Decimal,
        value: U256,
        /// Receiver's share balance delta, when measurable.
        shares_received: Option<U256>,
        approval_tx: Option<TxHash>,
    },
    VaultRedeem {
        vault: Address,
        receiver: Address,
        owner: Address,
        shares: U256,
        /// Receiver's asset balance delta, when measurable.
        assets_received: Option<U256>,
    },
}

impl OperationDetails {
    pub(crate) fn set_approval_tx(&mut self, hash: TxHash) {
        match self {
            Self::PoolSupply { approval_tx, .. } | Self::VaultDeposit { approval_tx, .. } => {
                *approval_tx = Some(hash);
            }
            _ => {}
        }
    }

    pub(crate) fn set_measured(&mut self, delta: U256) {
        match self {
            Self::VaultDeposit { shares_received, .. } => *shares_received = Some(delta),
            Self::VaultRedeem { assets_received, .. } => *assets_received = Some(delta),
            _ => {}
        }
    }
}

/// A balance in raw base units and human form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub account: Address,
    /// `None` for the native currency.
    pub token: Option<Address>,
    pub symbol: String,
    pub decimals: u8,
    pub raw: U256,
    pub amount: Decimal,
}

/// Fee estimate for a plain value transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransferCost {
    pub gas_limit: u64,
    pub gas_price: u128,
    /// `gas_limit * gas_price`
    pub fee: U256,
    /// `value + fee`
    pub total: U256,
}
