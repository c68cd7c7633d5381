//! ABI encoding and decoding for the fixed contract function set.
//!
//! The binder holds nothing but the `sol!`-generated signature table, so it
//! is stateless and safe to share between threads.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::network::NetworkClient;

sol! {
    /// Minimal ERC-20 surface.
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Lending pool supply entry point (Aave V3 layout).
    interface ILendingPool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
    }

    /// ERC-4626 vault entry points.
    interface IVault {
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256 assets);
    }
}

/// Functions the binder can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractFunction {
    BalanceOf,
    Symbol,
    Allowance,
    Transfer,
    Approve,
    Supply,
    Deposit,
    Redeem,
}

impl ContractFunction {
    pub const ALL: [ContractFunction; 8] = [
        Self::BalanceOf,
        Self::Symbol,
        Self::Allowance,
        Self::Transfer,
        Self::Approve,
        Self::Supply,
        Self::Deposit,
        Self::Redeem,
    ];

    /// Solidity function name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BalanceOf => "balanceOf",
            Self::Symbol => "symbol",
            Self::Allowance => "allowance",
            Self::Transfer => "transfer",
            Self::Approve => "approve",
            Self::Supply => "supply",
            Self::Deposit => "deposit",
            Self::Redeem => "redeem",
        }
    }

    /// 4-byte function selector.
    pub fn selector(&self) -> [u8; 4] {
        match self {
            Self::BalanceOf => IERC20::balanceOfCall::SELECTOR,
            Self::Symbol => IERC20::symbolCall::SELECTOR,
            Self::Allowance => IERC20::allowanceCall::SELECTOR,
            Self::Transfer => IERC20::transferCall::SELECTOR,
            Self::Approve => IERC20::approveCall::SELECTOR,
            Self::Supply => ILendingPool::supplyCall::SELECTOR,
            Self::Deposit => IVault::depositCall::SELECTOR,
            Self::Redeem => IVault::redeemCall::SELECTOR,
        }
    }
}

impl fmt::Display for ContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContractFunction {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| OrchestratorError::UnsupportedOperation(format!("no encoding for function '{s}'")))
    }
}

/// A fully-typed call against one of the supported functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    BalanceOf { owner: Address },
    Symbol,
    Allowance { owner: Address, spender: Address },
    Transfer { to: Address, amount: U256 },
    Approve { spender: Address, amount: U256 },
    Supply { asset: Address, amount: U256, on_behalf_of: Address, referral_code: u16 },
    Deposit { assets: U256, receiver: Address },
    Redeem { shares: U256, receiver: Address, owner: Address },
}

impl ContractCall {
    pub fn function(&self) -> ContractFunction {
        match self {
            Self::BalanceOf { .. } => ContractFunction::BalanceOf,
            Self::Symbol => ContractFunction::Symbol,
            Self::Allowance { .. } => ContractFunction::Allowance,
            Self::Transfer { .. } => ContractFunction::Transfer,
            Self::Approve { .. } => ContractFunction::Approve,
            Self::Supply { .. } => ContractFunction::Supply,
            Self::Deposit { .. } => ContractFunction::Deposit,
            Self::Redeem { .. } => ContractFunction::Redeem,
        }
    }
}

/// Decoded return value of a supported function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Uint(U256),
    Text(String),
    Bool(bool),
    Unit,
}

impl DecodedValue {
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// ABI-encode a call, selector included.
pub fn encode_call(call: &ContractCall) -> Bytes {
    let data = match call {
        ContractCall::BalanceOf { owner } => IERC20::balanceOfCall { owner: *owner }.abi_encode(),
        ContractCall::Symbol => IERC20::symbolCall {}.abi_encode(),
        ContractCall::Allowance { owner, spender } => IERC20::allowanceCall {
            owner: *owner,
            spender: *spender,
        }
        .abi_encode(),
        ContractCall::Transfer { to, amount } => IERC20::transferCall {
            to: *to,
            amount: *amount,
        }
        .abi_encode(),
        ContractCall::Approve { spender, amount } => IERC20::approveCall {
            spender: *spender,
            amount: *amount,
        }
        .abi_encode(),
        ContractCall::Supply {
            asset,
            amount,
            on_behalf_of,
            referral_code,
        } => ILendingPool::supplyCall {
            asset: *asset,
            amount: *amount,
            onBehalfOf: *on_behalf_of,
            referralCode: *referral_code,
        }
        .abi_encode(),
        ContractCall::Deposit { assets, receiver } => IVault::depositCall {
            assets: *assets,
            receiver: *receiver,
        }
        .abi_encode(),
        ContractCall::Redeem {
            shares,
            receiver,
            owner,
        } => IVault::redeemCall {
            shares: *shares,
            receiver: *receiver,
            owner: *owner,
        }
        .abi_encode(),
    };
    Bytes::from(data)
}

/// Encode a call addressed by function name.
///
/// Fails with `UnsupportedOperation` for unknown names and with
/// `InvalidTransaction` when the arguments belong to another function.
pub fn encode_named(name: &str, call: &ContractCall) -> OrchestratorResult<Bytes> {
    let function: ContractFunction = name.parse()?;
    if function != call.function() {
        return Err(OrchestratorError::InvalidTransaction(format!(
            "arguments for '{}' passed to '{}'",
            call.function(),
            function
        )));
    }
    Ok(encode_call(call))
}

/// Decode the raw return data of `function`.
pub fn decode_result(function: ContractFunction, data: &[u8]) -> OrchestratorResult<DecodedValue> {
    let decode_err = |e: alloy::sol_types::Error| {
        OrchestratorError::Rpc(format!("failed to decode {function} result: {e}"))
    };

    let value = match function {
        ContractFunction::BalanceOf => {
            DecodedValue::Uint(IERC20::balanceOfCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Allowance => {
            DecodedValue::Uint(IERC20::allowanceCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Symbol => {
            DecodedValue::Text(IERC20::symbolCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Transfer => {
            DecodedValue::Bool(IERC20::transferCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Approve => {
            DecodedValue::Bool(IERC20::approveCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Deposit => {
            DecodedValue::Uint(IVault::depositCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Redeem => {
            DecodedValue::Uint(IVault::redeemCall::abi_decode_returns(data).map_err(decode_err)?)
        }
        ContractFunction::Supply => DecodedValue::Unit,
    };
    Ok(value)
}

/// `balanceOf(owner)` on `token`.
pub async fn token_balance<C>(client: &C, token: Address, owner: Address) -> OrchestratorResult<U256>
where
    C: NetworkClient + ?Sized,
{
    read_uint(client, token, &ContractCall::BalanceOf { owner }).await
}

/// `allowance(owner, spender)` on `token`.
pub async fn allowance<C>(
    client: &C,
    token: Address,
    owner: Address,
    spender: Address,
) -> OrchestratorResult<U256>
where
    C: NetworkClient + ?Sized,
{
    read_uint(client, token, &ContractCall::Allowance { owner, spender }).await
}

/// `symbol()` on `token`.
pub async fn symbol<C>(client: &C, token: Address) -> OrchestratorResult<String>
where
    C: NetworkClient + ?Sized,
{
    let raw = client.call(token, encode_call(&ContractCall::Symbol)).await?;
    decode_result(ContractFunction::Symbol, &raw)?
        .into_text()
        .ok_or_else(|| OrchestratorError::Rpc("symbol() returned a non-string".into()))
}

async fn read_uint<C>(client: &C, contract: Address, call: &ContractCall) -> OrchestratorResult<U256>
where
    C: NetworkClient + ?Sized,
{
    let raw = client.call(contract, encode_call(call)).await?;
    decode_result(call.function(), &raw)?
        .as_uint()
        .ok_or_else(|| OrchestratorError::Rpc(format!("{}() returned a non-integer", call.function())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use alloy::sol_types::SolValue;

    #[test]
    fn test_function_names_round_trip() {
        for function in ContractFunction::ALL {
            assert_eq!(function.name().parse::<ContractFunction>().unwrap(), function);
        }
    }

    #[test]
    fn test_unknown_function_is_unsupported() {
        let err = "withdraw".parse::<ContractFunction>().unwrap_err();
        assert!(matches!(err, OrchestratorError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(ContractFunction::Transfer.selector(), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(ContractFunction::Approve.selector(), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(ContractFunction::BalanceOf.selector(), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(ContractFunction::Supply.selector(), [0x61, 0x7b, 0xa0, 0x37]);
        assert_eq!(ContractFunction::Deposit.selector(), [0x6e, 0x55, 0x3f, 0x65]);
        assert_eq!(ContractFunction::Redeem.selector(), [0xba, 0x08, 0x76, 0x52]);
    }

    #[test]
    fn test_encode_transfer_layout() {
        let to = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        let data = encode_call(&ContractCall::Transfer {
            to,
            amount: U256::from(1_000_000u64),
        });
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(&data[..4], &ContractFunction::Transfer.selector());
        assert_eq!(&data[16..36], to.as_slice());
    }

    #[test]
    fn test_encode_named_rejects_mismatched_arguments() {
        let call = ContractCall::Symbol;
        assert!(encode_named("symbol", &call).is_ok());
        assert!(matches!(
            encode_named("approve", &call),
            Err(OrchestratorError::InvalidTransaction(_))
        ));
        assert!(matches!(
            encode_named("borrow", &call),
            Err(OrchestratorError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_decode_results() {
        let raw = U256::from(42u64).abi_encode();
        assert_eq!(
            decode_result(ContractFunction::BalanceOf, &raw).unwrap(),
            DecodedValue::Uint(U256::from(42u64))
        );

        let raw = "USDT".to_string().abi_encode();
        assert_eq!(
            decode_result(ContractFunction::Symbol, &raw).unwrap(),
            DecodedValue::Text("USDT".into())
        );

        assert!(decode_result(ContractFunction::Allowance, &[0x01]).is_err());
    }
}
