//! Fixed gas limits and native transfer fee estimates.

use alloy::primitives::U256;

use crate::config::schema::GasConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::network::NetworkClient;
use crate::transaction::request::OperationKind;
use crate::transaction::types::NativeTransferCost;

/// Gas limit for `kind`. Limits are fixed per operation, never estimated.
pub fn gas_limit_for(gas: &GasConfig, kind: OperationKind) -> u64 {
    match kind {
        OperationKind::NativeTransfer => gas.native_transfer,
        OperationKind::TokenTransfer => gas.token_transfer,
        OperationKind::Approval => gas.token_approve,
        OperationKind::PoolSupply => gas.pool_supply,
        OperationKind::VaultDeposit => gas.vault_deposit,
        OperationKind::VaultRedeem => gas.vault_redeem,
    }
}

/// Fee for sending `value` natively at the current gas price.
pub async fn estimate_native_transfer_cost<C>(
    client: &C,
    gas: &GasConfig,
    value: U256,
) -> OrchestratorResult<NativeTransferCost>
where
    C: NetworkClient + ?Sized,
{
    let gas_price = client.get_gas_price().await?;
    let fee = U256::from(gas_price)
        .checked_mul(U256::from(gas.native_transfer))
        .ok_or_else(|| OrchestratorError::Rpc(format!("gas price {gas_price} out of range")))?;
    let total = value
        .checked_add(fee)
        .ok_or_else(|| OrchestratorError::InvalidAmount("value plus fee overflows".into()))?;

    Ok(NativeTransferCost {
        gas_limit: gas.native_transfer,
        gas_price,
        fee,
        total,
    })
}

/// Convert a gwei gas price to wei.
pub fn gwei_to_wei(gwei: rust_decimal::Decimal) -> OrchestratorResult<u128> {
    let wei = crate::transaction::amount::to_base_units(gwei, 9)?;
    u128::try_from(wei).map_err(|_| OrchestratorError::InvalidAmount(format!("gas price {gwei} gwei is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MockChain;

    #[test]
    fn test_default_limits() {
        let gas = GasConfig::default();
        assert_eq!(gas_limit_for(&gas, OperationKind::NativeTransfer), 21_000);
        assert_eq!(gas_limit_for(&gas, OperationKind::Approval), 100_000);
        assert_eq!(gas_limit_for(&gas, OperationKind::VaultRedeem), 500_000);
    }

    #[tokio::test]
    async fn test_native_transfer_cost() {
        let chain = MockChain::new().with_gas_price(2_000_000_000);
        let value = U256::from(10u64).pow(U256::from(18u64));
        let cost = estimate_native_transfer_cost(&chain, &GasConfig::default(), value)
            .await
            .unwrap();
        assert_eq!(cost.fee, U256::from(42_000_000_000_000u64));
        assert_eq!(cost.total, value + cost.fee);
    }

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei("1.5".parse().unwrap()).unwrap(), 1_500_000_000);
        assert!(gwei_to_wei(rust_decimal::Decimal::ZERO).is_err());
    }
}
