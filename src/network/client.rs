//! JSON-RPC network client.
//!
//! # Responsibilities
//! - Connect to a JSON-RPC endpoint, failing fast when it is unreachable
//! - Query chain state (balances, nonces, gas price, contract reads)
//! - Broadcast signed transactions (primary endpoint only, never retried)
//! - Poll for receipts with a bounded wait

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::network::types::{NetworkConfig, NetworkId, Receipt};
use crate::observability::metrics;

/// Lower bound for the receipt poll interval; tokio intervals must be non-zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Error for a broadcast the node never answered.
///
/// The transaction may still propagate, so its hash is computed locally
/// from the EIP-2718 encoding and attached.
pub fn unanswered_broadcast(raw: &[u8], waited_secs: u64) -> OrchestratorError {
    OrchestratorError::Broadcast {
        reason: format!("no answer within {waited_secs}s, transaction may still propagate"),
        tx_hash: Some(keccak256(raw)),
    }
}

/// Chain access used by the builder and orchestrator.
///
/// Calls are stateless; implementations must be safe to share between
/// tasks and accounts.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Network this client is bound to.
    fn network(&self) -> NetworkId;

    /// Chain id used for EIP-155 signing.
    fn chain_id(&self) -> u64;

    /// Native balance in base units.
    async fn get_balance(&self, address: Address) -> OrchestratorResult<U256>;

    /// Next nonce for `address`, pending transactions included.
    async fn get_nonce(&self, address: Address) -> OrchestratorResult<u64>;

    /// Current gas price in wei.
    async fn get_gas_price(&self) -> OrchestratorResult<u128>;

    /// Read-only contract call (`eth_call`).
    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes>;

    /// Submit a signed, EIP-2718 encoded transaction.
    async fn broadcast(&self, raw: Bytes) -> OrchestratorResult<TxHash>;

    /// Receipt for `tx_hash`, `None` while pending or unknown.
    async fn get_receipt(&self, tx_hash: TxHash) -> OrchestratorResult<Option<Receipt>>;

    /// Poll for a receipt until it appears or `wait` elapses.
    ///
    /// A timeout does not mean the transaction failed; it may still be mined.
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] when shorter.
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        wait: Duration,
        poll_interval: Duration,
    ) -> OrchestratorResult<Receipt> {
        let result = timeout(wait, async {
            let mut ticker = interval(poll_interval.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.get_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                    }
                    Err(e) => {
                        tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                    }
                }
            }
        })
        .await;

        result.map_err(|_| OrchestratorError::ConfirmationTimeout {
            tx_hash,
            timeout_secs: wait.as_secs(),
        })
    }
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Network client over alloy HTTP providers, with read failover.
#[derive(Clone)]
pub struct RpcClient {
    /// Primary provider first, then failovers.
    providers: Vec<DynProvider>,
    config: NetworkConfig,
    timeout_duration: Duration,
}

impl RpcClient {
    /// Connect and verify the endpoint.
    ///
    /// Fails with `ConnectionError` when the primary endpoint is unreachable
    /// or reports a different chain id than configured.
    pub async fn connect(config: NetworkConfig) -> OrchestratorResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            OrchestratorError::Configuration(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            config,
            timeout_duration,
        };

        let remote_chain_id = match timeout(timeout_duration, client.providers[0].get_chain_id()).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                return Err(OrchestratorError::Connection(format!(
                    "could not reach {} RPC: {}",
                    client.config.network, e
                )))
            }
            Err(_) => {
                return Err(OrchestratorError::Connection(format!(
                    "{} RPC did not answer within {}s",
                    client.config.network, client.config.rpc_timeout_secs
                )))
            }
        };

        if remote_chain_id != client.config.chain_id {
            return Err(OrchestratorError::Connection(format!(
                "chain id mismatch: expected {}, got {}",
                client.config.chain_id, remote_chain_id
            )));
        }

        tracing::info!(
            network = %client.config.network,
            chain_id = client.config.chain_id,
            failovers = client.providers.len() - 1,
            "Network client connected"
        );

        Ok(client)
    }

    /// Get the configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Run a read call against each provider in order until one answers.
    async fn read<T, F, Fut>(&self, what: &'static str, op: F) -> OrchestratorResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, call = what, error = %e, "RPC error"),
                Err(_) => tracing::warn!(provider_idx = i, call = what, "RPC timeout"),
            }
        }
        metrics::record_rpc_error(what);
        Err(OrchestratorError::Rpc(format!("All providers failed to {what}")))
    }
}

#[async_trait]
impl NetworkClient for RpcClient {
    fn network(&self) -> NetworkId {
        self.config.network
    }

    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn get_balance(&self, address: Address) -> OrchestratorResult<U256> {
        self.read("get balance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn get_nonce(&self, address: Address) -> OrchestratorResult<u64> {
        self.read("get transaction count", |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn get_gas_price(&self) -> OrchestratorResult<u128> {
        self.read("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes> {
        self.read("call contract", |p| {
            let request = TransactionRequest::default().with_to(to).with_input(data.clone());
            async move { p.call(request).await }
        })
        .await
    }

    async fn broadcast(&self, raw: Bytes) -> OrchestratorResult<TxHash> {
        let primary = &self.providers[0];
        match timeout(self.timeout_duration, primary.send_raw_transaction(&raw)).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => Err(OrchestratorError::broadcast_rejected(e.to_string())),
            Err(_) => Err(unanswered_broadcast(&raw, self.config.rpc_timeout_secs)),
        }
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> OrchestratorResult<Option<Receipt>> {
        let receipt = self
            .read("get receipt", |p| async move { p.get_transaction_receipt(tx_hash).await })
            .await?;

        Ok(receipt.and_then(|r| {
            // Pending receipts without a block are treated as not yet mined
            let block_number = r.block_number?;
            Some(Receipt {
                tx_hash: r.transaction_hash,
                success: r.status(),
                block_number,
                gas_used: r.gas_used,
            })
        }))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("network", &self.config.network)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MockChain;
    use crate::transaction::UnsignedTransaction;
    use crate::wallet::Account;

    fn unreachable_config() -> NetworkConfig {
        NetworkConfig {
            network: NetworkId::Sepolia,
            rpc_url: "http://127.0.0.1:1".to_string(),
            failover_urls: Vec::new(),
            chain_id: 11_155_111,
            rpc_timeout_secs: 2,
        }
    }

    #[tokio::test]
    async fn test_connect_fails_fast_when_unreachable() {
        let err = RpcClient::connect(unreachable_config()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Connection(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let mut config = unreachable_config();
        config.rpc_url = "not a url".into();
        let err = RpcClient::connect(config).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_unanswered_broadcast_carries_local_hash() {
        let account =
            Account::from_private_key("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80").unwrap();
        let signed = account
            .sign(&UnsignedTransaction {
                from: account.address(),
                to: Address::repeat_byte(0x22),
                value: U256::from(1u64),
                data: Bytes::new(),
                gas_limit: 21_000,
                gas_price: 1_000_000_000,
                nonce: 0,
                chain_id: 11_155_111,
            })
            .unwrap();

        let err = unanswered_broadcast(&signed.raw, 10);
        assert_eq!(err.tx_hash(), Some(signed.hash));
        assert!(!err.is_retryable_after_remediation());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_does_not_panic() {
        let chain = MockChain::new();
        let err = chain
            .wait_for_receipt(TxHash::repeat_byte(0x01), Duration::from_millis(20), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfirmationTimeout { .. }));
    }
}
