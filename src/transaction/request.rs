//! Operation requests accepted by the orchestrator.
//!
//! Amounts are human decimals; conversion to base units happens during
//! validation using the decimals carried by the token reference.

use std::fmt;

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Display symbol used when a token's `symbol()` cannot be read.
pub const FALLBACK_SYMBOL: &str = "TOKEN";

/// An ERC-20 token (or vault share token) reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: Address,
    pub decimals: u8,
    /// Display hint only; resolved lazily when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl TokenRef {
    pub fn new(address: Address, decimals: u8) -> Self {
        Self {
            address,
            decimals,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// Native currency or an ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AssetRef {
    Native,
    Token(TokenRef),
}

/// Allowance to grant in an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAmount {
    Exact(Decimal),
    /// `2^256 - 1`, the conventional unlimited allowance.
    Max,
}

impl fmt::Display for ApprovalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(amount) => write!(f, "{amount}"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// Operation kinds, used for gas limits, metrics and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    NativeTransfer,
    TokenTransfer,
    Approval,
    PoolSupply,
    VaultDeposit,
    VaultRedeem,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeTransfer => "native_transfer",
            Self::TokenTransfer => "token_transfer",
            Self::Approval => "approval",
            Self::PoolSupply => "pool_supply",
            Self::VaultDeposit => "vault_deposit",
            Self::VaultRedeem => "vault_redeem",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified operation. The orchestrator never chooses one itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum OperationRequest {
    SendNative {
        to: Address,
        amount: Decimal,
        /// Overrides the node's gas price.
        #[serde(default)]
        gas_price_gwei: Option<Decimal>,
    },
    SendToken {
        token: TokenRef,
        to: Address,
        amount: Decimal,
    },
    Approve {
        token: TokenRef,
        spender: Address,
        amount: ApprovalAmount,
    },
    SupplyToPool {
        pool: Address,
        asset: TokenRef,
        amount: Decimal,
        /// Defaults to the signing account.
        #[serde(default)]
        on_behalf_of: Option<Address>,
        #[serde(default)]
        referral_code: u16,
        #[serde(default = "default_true")]
        auto_approve: bool,
    },
    VaultDeposit {
        vault: Address,
        asset: TokenRef,
        assets: Decimal,
        #[serde(default)]
        receiver: Option<Address>,
        #[serde(default = "default_true")]
        auto_approve: bool,
    },
    VaultRedeem {
        vault: Address,
        /// Whole share units, no decimal scaling.
        shares: Decimal,
        #[serde(default)]
        receiver: Option<Address>,
        #[serde(default)]
        owner: Option<Address>,
        /// Underlying asset, used to measure the amount received.
        #[serde(default)]
        asset: Option<TokenRef>,
    },
}

fn default_true() -> bool {
    true
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::SendNative { .. } => OperationKind::NativeTransfer,
            Self::SendToken { .. } => OperationKind::TokenTransfer,
            Self::Approve { .. } => OperationKind::Approval,
            Self::SupplyToPool { .. } => OperationKind::PoolSupply,
            Self::VaultDeposit { .. } => OperationKind::VaultDeposit,
            Self::VaultRedeem { .. } => OperationKind::VaultRedeem,
        }
    }

    /// Contract or recipient the transaction is sent to.
    pub fn target(&self) -> Address {
        match self {
            Self::SendNative { to, .. } => *to,
            Self::SendToken { token, .. } | Self::Approve { token, .. } => token.address,
            Self::SupplyToPool { pool, .. } => *pool,
            Self::VaultDeposit { vault, .. } | Self::VaultRedeem { vault, .. } => *vault,
        }
    }
}
