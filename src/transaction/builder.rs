//! Precondition checks and unsigned transaction assembly.
//!
//! # Responsibilities
//! - Convert human amounts to base units
//! - Check balances, allowances and share balances against live chain state
//! - Decide whether an approval must precede the main action
//! - Assemble unsigned transactions with a fresh nonce and gas price

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::config::schema::GasConfig;
use crate::contracts::binder::{self, encode_call, ContractCall};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::network::{NetworkClient, USDT_DECIMALS};
use crate::transaction::amount::{allowance_units, from_base_units, to_base_units, whole_units, NATIVE_DECIMALS};
use crate::transaction::gas::{self, gas_limit_for, gwei_to_wei};
use crate::transaction::request::{
    ApprovalAmount, OperationKind, OperationRequest, TokenRef, FALLBACK_SYMBOL,
};
use crate::transaction::types::{BalanceView, NativeTransferCost, OperationDetails, UnsignedTransaction};

/// A token balance sampled before the main transaction, so the amount
/// received can be measured afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceProbe {
    pub token: Address,
    pub holder: Address,
    pub before: U256,
}

/// Validated operation, ready to be built.
#[derive(Debug, Clone)]
pub struct Plan {
    pub kind: OperationKind,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub call: Option<ContractCall>,
    pub gas_limit: u64,
    /// Explicit gas price; the node's price is used when absent.
    pub gas_price: Option<u128>,
    /// Approval that must be confirmed before this plan is built.
    pub approval: Option<OperationRequest>,
    pub probe: Option<BalanceProbe>,
    pub details: OperationDetails,
}

/// Builds transactions for one network.
pub struct TxBuilder {
    client: Arc<dyn NetworkClient>,
    gas: GasConfig,
    symbols: DashMap<Address, String>,
}

impl TxBuilder {
    pub fn new(client: Arc<dyn NetworkClient>, gas: GasConfig) -> Self {
        Self {
            client,
            gas,
            symbols: DashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<dyn NetworkClient> {
        &self.client
    }

    /// Check `request` against current chain state for `from`.
    ///
    /// Nothing is signed here; a failed check leaves the chain untouched.
    pub async fn validate(&self, from: Address, request: &OperationRequest) -> OrchestratorResult<Plan> {
        let kind = request.kind();
        let gas_limit = gas_limit_for(&self.gas, kind);

        let plan = match request {
            OperationRequest::SendNative {
                to,
                amount,
                gas_price_gwei,
            } => {
                let value = to_base_units(*amount, NATIVE_DECIMALS)?;
                let gas_price = gas_price_gwei.map(gwei_to_wei).transpose()?;
                let symbol = self.client.network().native_symbol().to_string();

                let available = self.client.get_balance(from).await?;
                if available < value {
                    return Err(OrchestratorError::InsufficientBalance {
                        account: from,
                        asset: symbol,
                        available,
                        required: value,
                    });
                }

                Plan {
                    kind,
                    from,
                    to: *to,
                    value,
                    call: None,
                    gas_limit,
                    gas_price,
                    approval: None,
                    probe: None,
                    details: OperationDetails::NativeTransfer {
                        to: *to,
                        amount: *amount,
                        symbol,
                        value,
                    },
                }
            }

            OperationRequest::SendToken { token, to, amount } => {
                let value = to_base_units(*amount, token.decimals)?;
                let symbol = self.symbol_for(token).await;
                self.ensure_token_balance(token.address, from, value, &symbol).await?;

                Plan {
                    kind,
                    from,
                    to: token.address,
                    value: U256::ZERO,
                    call: Some(ContractCall::Transfer { to: *to, amount: value }),
                    gas_limit,
                    gas_price: None,
                    approval: None,
                    probe: None,
                    details: OperationDetails::TokenTransfer {
                        token: token.address,
                        symbol,
                        to: *to,
                        amount: *amount,
                        value,
                    },
                }
            }

            OperationRequest::Approve { token, spender, amount } => {
                let value = match amount {
                    ApprovalAmount::Exact(amount) => allowance_units(*amount, token.decimals)?,
                    ApprovalAmount::Max => U256::MAX,
                };
                let symbol = self.symbol_for(token).await;

                Plan {
                    kind,
                    from,
                    to: token.address,
                    value: U256::ZERO,
                    call: Some(ContractCall::Approve {
                        spender: *spender,
                        amount: value,
                    }),
                    gas_limit,
                    gas_price: None,
                    approval: None,
                    probe: None,
                    details: OperationDetails::Approval {
                        token: token.address,
                        symbol,
                        spender: *spender,
                        amount: *amount,
                        value,
                    },
                }
            }

            OperationRequest::SupplyToPool {
                pool,
                asset,
                amount,
                on_behalf_of,
                referral_code,
                auto_approve,
            } => {
                let value = to_base_units(*amount, asset.decimals)?;
                let symbol = self.symbol_for(asset).await;
                let on_behalf_of = on_behalf_of.unwrap_or(from);

                self.ensure_token_balance(asset.address, from, value, &symbol).await?;
                let approval = self.approval_for(asset, from, *pool, value, *auto_approve).await?;

                Plan {
                    kind,
                    from,
                    to: *pool,
                    value: U256::ZERO,
                    call: Some(ContractCall::Supply {
                        asset: asset.address,
                        amount: value,
                        on_behalf_of,
                        referral_code: *referral_code,
                    }),
                    gas_limit,
                    gas_price: None,
                    approval,
                    probe: None,
                    details: OperationDetails::PoolSupply {
                        pool: *pool,
                        asset: asset.address,
                        symbol,
                        on_behalf_of,
                        amount: *amount,
                        value,
                        approval_tx: None,
                    },
                }
            }

            OperationRequest::VaultDeposit {
                vault,
                asset,
                assets,
                receiver,
                auto_approve,
            } => {
                let value = to_base_units(*assets, asset.decimals)?;
                let symbol = self.symbol_for(asset).await;
                let receiver = receiver.unwrap_or(from);

                self.ensure_token_balance(asset.address, from, value, &symbol).await?;
                let approval = self.approval_for(asset, from, *vault, value, *auto_approve).await?;
                let probe = self.probe(*vault, receiver).await;

                Plan {
                    kind,
                    from,
                    to: *vault,
                    value: U256::ZERO,
                    call: Some(ContractCall::Deposit {
                        assets: value,
                        receiver,
                    }),
                    gas_limit,
                    gas_price: None,
                    approval,
                    probe,
                    details: OperationDetails::VaultDeposit {
                        vault: *vault,
                        asset: asset.address,
                        symbol,
                        receiver,
                        assets: *assets,
                        value,
                        shares_received: None,
                        approval_tx: None,
                    },
                }
            }

            OperationRequest::VaultRedeem {
                vault,
                shares,
                receiver,
                owner,
                asset,
            } => {
                let shares = whole_units(*shares)?;
                let receiver = receiver.unwrap_or(from);
                let owner = owner.unwrap_or(from);

                let available = binder::token_balance(self.client.as_ref(), *vault, owner).await?;
                if available < shares {
                    return Err(OrchestratorError::InsufficientShares {
                        owner,
                        available,
                        required: shares,
                    });
                }

                let probe = match asset {
                    Some(asset) => self.probe(asset.address, receiver).await,
                    None => None,
                };

                Plan {
                    kind,
                    from,
                    to: *vault,
                    value: U256::ZERO,
                    call: Some(ContractCall::Redeem {
                        shares,
                        receiver,
                        owner,
                    }),
                    gas_limit,
                    gas_price: None,
                    approval: None,
                    probe,
                    details: OperationDetails::VaultRedeem {
                        vault: *vault,
                        receiver,
                        owner,
                        shares,
                        assets_received: None,
                    },
                }
            }
        };

        tracing::debug!(
            kind = %plan.kind,
            from = %plan.from,
            to = %plan.to,
            needs_approval = plan.approval.is_some(),
            "Preconditions passed"
        );

        Ok(plan)
    }

    /// Assemble the unsigned transaction for `plan`.
    ///
    /// Nonce and gas price are read here, immediately before signing.
    pub async fn build(&self, plan: &Plan) -> OrchestratorResult<UnsignedTransaction> {
        let nonce = self.client.get_nonce(plan.from).await?;
        let gas_price = match plan.gas_price {
            Some(price) => price,
            None => self.client.get_gas_price().await?,
        };
        let data = plan.call.as_ref().map(encode_call).unwrap_or_default();

        Ok(UnsignedTransaction {
            from: plan.from,
            to: plan.to,
            value: plan.value,
            data,
            gas_limit: plan.gas_limit,
            gas_price,
            nonce,
            chain_id: self.client.chain_id(),
        })
    }

    /// Balance delta since `probe` was taken, `None` if unreadable or negative.
    pub async fn measure(&self, probe: &BalanceProbe) -> Option<U256> {
        match binder::token_balance(self.client.as_ref(), probe.token, probe.holder).await {
            Ok(after) => after.checked_sub(probe.before),
            Err(e) => {
                tracing::debug!(token = %probe.token, error = %e, "Could not measure balance delta");
                None
            }
        }
    }

    /// Native balance of `account`.
    pub async fn native_balance(&self, account: Address) -> OrchestratorResult<BalanceView> {
        let raw = self.client.get_balance(account).await?;
        Ok(BalanceView {
            account,
            token: None,
            symbol: self.client.network().native_symbol().to_string(),
            decimals: NATIVE_DECIMALS,
            raw,
            amount: from_base_units(raw, NATIVE_DECIMALS)?,
        })
    }

    /// ERC-20 balance of `account`.
    pub async fn token_balance(&self, token: &TokenRef, account: Address) -> OrchestratorResult<BalanceView> {
        let raw = binder::token_balance(self.client.as_ref(), token.address, account).await?;
        Ok(BalanceView {
            account,
            token: Some(token.address),
            symbol: self.symbol_for(token).await,
            decimals: token.decimals,
            raw,
            amount: from_base_units(raw, token.decimals)?,
        })
    }

    /// USDT balance of `account` on the client's network.
    ///
    /// Fails with `UnsupportedOperation` on networks without a known USDT
    /// deployment.
    pub async fn usdt_balance(&self, account: Address) -> OrchestratorResult<BalanceView> {
        let network = self.client.network();
        let address = network.usdt_address().ok_or_else(|| {
            OrchestratorError::UnsupportedOperation(format!("no USDT deployment known on {network}"))
        })?;
        self.token_balance(&TokenRef::new(address, USDT_DECIMALS), account).await
    }

    /// Fee and total cost of sending `amount` natively.
    pub async fn estimate_native_transfer_cost(&self, amount: Decimal) -> OrchestratorResult<NativeTransferCost> {
        let value = to_base_units(amount, NATIVE_DECIMALS)?;
        gas::estimate_native_transfer_cost(self.client.as_ref(), &self.gas, value).await
    }

    /// Display symbol for `token`: the hint, a cached lookup, or `TOKEN`.
    pub async fn symbol_for(&self, token: &TokenRef) -> String {
        if let Some(symbol) = &token.symbol {
            return symbol.clone();
        }
        let cached = self.symbols.get(&token.address).map(|entry| entry.value().clone());
        if let Some(symbol) = cached {
            return symbol;
        }

        match binder::symbol(self.client.as_ref(), token.address).await {
            Ok(symbol) => {
                self.symbols.insert(token.address, symbol.clone());
                symbol
            }
            Err(e) => {
                tracing::debug!(token = %token.address, error = %e, "symbol() unavailable");
                FALLBACK_SYMBOL.to_string()
            }
        }
    }

    async fn ensure_token_balance(
        &self,
        token: Address,
        holder: Address,
        required: U256,
        symbol: &str,
    ) -> OrchestratorResult<()> {
        let available = binder::token_balance(self.client.as_ref(), token, holder).await?;
        if available < required {
            return Err(OrchestratorError::InsufficientBalance {
                account: holder,
                asset: symbol.to_string(),
                available,
                required,
            });
        }
        Ok(())
    }

    async fn approval_for(
        &self,
        token: &TokenRef,
        owner: Address,
        spender: Address,
        required: U256,
        auto_approve: bool,
    ) -> OrchestratorResult<Option<OperationRequest>> {
        let available = binder::allowance(self.client.as_ref(), token.address, owner, spender).await?;
        if available >= required {
            return Ok(None);
        }
        if !auto_approve {
            return Err(OrchestratorError::InsufficientAllowance {
                spender,
                available,
                required,
            });
        }
        Ok(Some(OperationRequest::Approve {
            token: token.clone(),
            spender,
            amount: ApprovalAmount::Max,
        }))
    }

    async fn probe(&self, token: Address, holder: Address) -> Option<BalanceProbe> {
        binder::token_balance(self.client.as_ref(), token, holder)
            .await
            .ok()
            .map(|before| BalanceProbe { token, holder, before })
    }
}

impl std::fmt::Debug for TxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxBuilder")
            .field("network", &self.client.network())
            .field("gas", &self.gas)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::{fixture_address, MockChain};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<MockChain>, TxBuilder, Address) {
        let chain = Arc::new(MockChain::new());
        let builder = TxBuilder::new(chain.clone(), GasConfig::default());
        (chain, builder, fixture_address("sender"))
    }

    #[tokio::test]
    async fn test_native_insufficient_balance() {
        let (chain, builder, from) = setup();
        chain.set_native_balance(from, U256::from(10u64));
        let request = OperationRequest::SendNative {
            to: fixture_address("bob"),
            amount: dec("1"),
            gas_price_gwei: None,
        };
        let err = builder.validate(from, &request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InsufficientBalance { ref asset, .. } if asset == "ETH"));
    }

    #[tokio::test]
    async fn test_usdt_balance_uses_network_deployment() {
        let chain = Arc::new(MockChain::new().with_network(crate::network::NetworkId::Arbitrum));
        let builder = TxBuilder::new(chain.clone(), GasConfig::default());
        let holder = fixture_address("holder");
        let usdt = crate::network::NetworkId::Arbitrum.usdt_address().unwrap();
        chain.add_token(usdt, "USDT");
        chain.set_token_balance(usdt, holder, U256::from(12_500_000u64));

        let view = builder.usdt_balance(holder).await.unwrap();
        assert_eq!(view.token, Some(usdt));
        assert_eq!(view.decimals, 6);
        assert_eq!(view.amount, dec("12.5"));
        assert_eq!(view.symbol, "USDT");

        let amoy = TxBuilder::new(
            Arc::new(MockChain::new().with_network(crate::network::NetworkId::PolygonAmoy)),
            GasConfig::default(),
        );
        let err = amoy.usdt_balance(holder).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_symbol_falls_back_and_caches() {
        let (chain, builder, _) = setup();
        let unknown = TokenRef::new(fixture_address("unknown"), 18);
        assert_eq!(builder.symbol_for(&unknown).await, FALLBACK_SYMBOL);

        let usdt = fixture_address("usdt");
        chain.add_token(usdt, "USDT");
        assert_eq!(builder.symbol_for(&TokenRef::new(usdt, 6)).await, "USDT");
        chain.add_token(usdt, "CHANGED");
        assert_eq!(builder.symbol_for(&TokenRef::new(usdt, 6)).await, "USDT");
    }

    #[tokio::test]
    async fn test_supply_plans_approval_when_allowance_short() {
        let (chain, builder, from) = setup();
        let asset = TokenRef::new(fixture_address("usdt"), 6).with_symbol("USDT");
        let pool = fixture_address("pool");
        chain.set_token_balance(asset.address, from, U256::from(50_000_000u64));

        let mut request = OperationRequest::SupplyToPool {
            pool,
            asset: asset.clone(),
            amount: dec("25"),
            on_behalf_of: None,
            referral_code: 0,
            auto_approve: true,
        };
        let plan = builder.validate(from, &request).await.unwrap();
        assert!(matches!(
            plan.approval,
            Some(OperationRequest::Approve { spender, amount: ApprovalAmount::Max, .. }) if spender == pool
        ));

        if let OperationRequest::SupplyToPool { auto_approve, .. } = &mut request {
            *auto_approve = false;
        }
        let err = builder.validate(from, &request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InsufficientAllowance { .. }));
    }

    #[tokio::test]
    async fn test_redeem_rejects_fractional_shares() {
        let (_, builder, from) = setup();
        let request = OperationRequest::VaultRedeem {
            vault: fixture_address("vault"),
            shares: dec("1.5"),
            receiver: None,
            owner: None,
            asset: None,
        };
        let err = builder.validate(from, &request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_build_reads_fresh_nonce_and_gas_price() {
        let (chain, builder, from) = setup();
        chain.set_native_balance(from, U256::from(10u64).pow(U256::from(18u64)));
        let request = OperationRequest::SendNative {
            to: fixture_address("bob"),
            amount: dec("0.1"),
            gas_price_gwei: Some(dec("3")),
        };
        let plan = builder.validate(from, &request).await.unwrap();
        let tx = builder.build(&plan).await.unwrap();
        assert_eq!(tx.nonce, 0);
        assert_eq!(tx.gas_limit, 21_000);
        assert_eq!(tx.gas_price, 3_000_000_000);
        assert_eq!(tx.chain_id, MockChain::DEFAULT_CHAIN_ID);
        assert!(tx.data.is_empty());
    }

    #[tokio::test]
    async fn test_balance_views() {
        let (chain, builder, from) = setup();
        chain.set_native_balance(from, U256::from(1_500_000_000_000_000_000u64));
        let view = builder.native_balance(from).await.unwrap();
        assert_eq!(view.amount, dec("1.5"));
        assert_eq!(view.symbol, "ETH");

        let usdt = fixture_address("usdt");
        chain.add_token(usdt, "USDT");
        chain.set_token_balance(usdt, from, U256::from(2_250_000u64));
        let view = builder.token_balance(&TokenRef::new(usdt, 6), from).await.unwrap();
        assert_eq!(view.amount, dec("2.25"));
        assert_eq!(view.symbol, "USDT");
    }
}
