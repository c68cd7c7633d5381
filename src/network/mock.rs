//! In-memory chain double.
//!
//! `MockChain` implements [`NetworkClient`] over a small ledger: native
//! balances, ERC-20 balances and allowances, a lending pool and ERC-4626
//! vaults with 1:1 share accounting. Broadcast transactions are decoded and
//! their signatures verified, so the orchestrator is exercised end to end
//! without a node. Gas fees are not charged.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;

use crate::contracts::binder::{ContractFunction, IERC20, ILendingPool, IVault};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::network::client::{unanswered_broadcast, NetworkClient};
use crate::network::types::{NetworkId, Receipt};

/// Gas reported for a plain value transfer.
const NATIVE_GAS_USED: u64 = 21_000;
/// Gas reported for any contract call.
const CONTRACT_GAS_USED: u64 = 65_000;

/// How receipts become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    /// Mined in the same step as the broadcast.
    Immediate,
    /// Held back until [`MockChain::mine_pending`] is called.
    Withheld,
}

/// A transaction accepted by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub function: Option<ContractFunction>,
}

#[derive(Debug, Default)]
struct Ledger {
    native: HashMap<Address, U256>,
    /// (token, holder) → balance. Vault shares live here under the vault address.
    tokens: HashMap<(Address, Address), U256>,
    /// (token, owner, spender) → allowance.
    allowances: HashMap<(Address, Address, Address), U256>,
    symbols: HashMap<Address, String>,
    /// vault → underlying asset.
    vaults: HashMap<Address, Address>,
    pools: HashSet<Address>,
    nonces: HashMap<Address, u64>,
    block_number: u64,
    receipts: HashMap<TxHash, Receipt>,
    pending: Vec<Receipt>,
    sent: Vec<SentTransaction>,
    reject_next: Option<String>,
    revert_next: HashSet<ContractFunction>,
    /// Functions whose next call succeeds without changing state.
    inert_next: HashSet<ContractFunction>,
    drop_next_response: bool,
}

impl Ledger {
    fn token(&self, token: Address, holder: Address) -> U256 {
        self.tokens.get(&(token, holder)).copied().unwrap_or_default()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn move_tokens(&mut self, token: Address, from: Address, to: Address, amount: U256) -> bool {
        let available = self.token(token, from);
        if available < amount {
            return false;
        }
        self.tokens.insert((token, from), available - amount);
        *self.tokens.entry((token, to)).or_default() += amount;
        true
    }

    /// `transferFrom` by `spender`, consuming allowance unless it is unlimited.
    fn pull_tokens(&mut self, token: Address, owner: Address, spender: Address, amount: U256) -> bool {
        let allowance = self.allowance(token, owner, spender);
        if allowance < amount || self.token(token, owner) < amount {
            return false;
        }
        if allowance != U256::MAX {
            self.allowances.insert((token, owner, spender), allowance - amount);
        }
        self.move_tokens(token, owner, spender, amount)
    }

    /// Apply a transaction's effects. Returns false when it reverts; state is
    /// left untouched in that case.
    fn execute(&mut self, from: Address, to: Address, value: U256, data: &[u8]) -> bool {
        if data.is_empty() {
            let balance = self.native.get(&from).copied().unwrap_or_default();
            if balance < value {
                return false;
            }
            self.native.insert(from, balance - value);
            *self.native.entry(to).or_default() += value;
            return true;
        }

        let Some(function) = function_for(data) else {
            return false;
        };
        if self.revert_next.remove(&function) {
            return false;
        }
        if self.inert_next.remove(&function) {
            return true;
        }

        match function {
            ContractFunction::Transfer => match IERC20::transferCall::abi_decode(data) {
                Ok(call) => self.move_tokens(to, from, call.to, call.amount),
                Err(_) => false,
            },
            ContractFunction::Approve => match IERC20::approveCall::abi_decode(data) {
                Ok(call) => {
                    self.allowances.insert((to, from, call.spender), call.amount);
                    true
                }
                Err(_) => false,
            },
            ContractFunction::Supply => {
                let Ok(call) = ILendingPool::supplyCall::abi_decode(data) else {
                    return false;
                };
                if !self.pools.contains(&to) || !self.pull_tokens(call.asset, from, to, call.amount) {
                    return false;
                }
                // Receipt tokens are tracked under the pool address
                *self.tokens.entry((to, call.onBehalfOf)).or_default() += call.amount;
                true
            }
            ContractFunction::Deposit => {
                let Ok(call) = IVault::depositCall::abi_decode(data) else {
                    return false;
                };
                let Some(asset) = self.vaults.get(&to).copied() else {
                    return false;
                };
                if !self.pull_tokens(asset, from, to, call.assets) {
                    return false;
                }
                *self.tokens.entry((to, call.receiver)).or_default() += call.assets;
                true
            }
            ContractFunction::Redeem => {
                let Ok(call) = IVault::redeemCall::abi_decode(data) else {
                    return false;
                };
                let Some(asset) = self.vaults.get(&to).copied() else {
                    return false;
                };
                if call.owner != from && self.allowance(to, call.owner, from) < call.shares {
                    return false;
                }
                let shares = self.token(to, call.owner);
                if shares < call.shares || self.token(asset, to) < call.shares {
                    return false;
                }
                self.tokens.insert((to, call.owner), shares - call.shares);
                self.move_tokens(asset, to, call.receiver, call.shares)
            }
            ContractFunction::BalanceOf | ContractFunction::Symbol | ContractFunction::Allowance => true,
        }
    }
}

fn function_for(data: &[u8]) -> Option<ContractFunction> {
    let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;
    ContractFunction::ALL
        .into_iter()
        .find(|f| f.selector() == selector)
}

/// In-memory [`NetworkClient`].
#[derive(Debug)]
pub struct MockChain {
    network: NetworkId,
    chain_id: u64,
    gas_price: u128,
    latency: Duration,
    receipt_mode: Mutex<ReceiptMode>,
    ledger: Mutex<Ledger>,
    broadcast_attempts: AtomicUsize,
}

impl MockChain {
    /// Local chain id used by default (Anvil/Hardhat).
    pub const DEFAULT_CHAIN_ID: u64 = 31_337;

    pub fn new() -> Self {
        Self {
            network: NetworkId::Sepolia,
            chain_id: Self::DEFAULT_CHAIN_ID,
            gas_price: 1_000_000_000,
            latency: Duration::ZERO,
            receipt_mode: Mutex::new(ReceiptMode::Immediate),
            ledger: Mutex::new(Ledger::default()),
            broadcast_attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_network(mut self, network: NetworkId) -> Self {
        self.network = network;
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Delay applied to every call, to force interleaving between tasks.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        // A panicked test thread must not poison every later assertion.
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub fn set_native_balance(&self, account: Address, amount: U256) {
        self.ledger().native.insert(account, amount);
    }

    /// Register a token contract with its symbol.
    pub fn add_token(&self, token: Address, symbol: &str) {
        self.ledger().symbols.insert(token, symbol.to_string());
    }

    pub fn set_token_balance(&self, token: Address, holder: Address, amount: U256) {
        self.ledger().tokens.insert((token, holder), amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.ledger().allowances.insert((token, owner, spender), amount);
    }

    pub fn add_pool(&self, pool: Address) {
        self.ledger().pools.insert(pool);
    }

    /// Register a vault over `asset`. The vault is also an ERC-20 for its shares.
    pub fn add_vault(&self, vault: Address, asset: Address, symbol: &str) {
        let mut ledger = self.ledger();
        ledger.vaults.insert(vault, asset);
        ledger.symbols.insert(vault, symbol.to_string());
    }

    pub fn token_balance_of(&self, token: Address, holder: Address) -> U256 {
        self.ledger().token(token, holder)
    }

    pub fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.ledger().allowance(token, owner, spender)
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        *self.receipt_mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    /// Reject the next broadcast with `reason`.
    pub fn reject_next_broadcast(&self, reason: &str) {
        self.ledger().reject_next = Some(reason.to_string());
    }

    /// Make the next transaction calling `function` revert on-chain.
    pub fn revert_next(&self, function: ContractFunction) {
        self.ledger().revert_next.insert(function);
    }

    /// Mine the next transaction calling `function` as a success that
    /// leaves all balances and allowances unchanged.
    pub fn succeed_without_effect_next(&self, function: ContractFunction) {
        self.ledger().inert_next.insert(function);
    }

    /// Accept the next broadcast but answer as if the node timed out.
    pub fn drop_next_broadcast_response(&self) {
        self.ledger().drop_next_response = true;
    }

    /// Mine every withheld transaction. Returns how many were mined.
    pub fn mine_pending(&self) -> usize {
        let mut ledger = self.ledger();
        let pending = std::mem::take(&mut ledger.pending);
        let count = pending.len();
        for receipt in pending {
            ledger.receipts.insert(receipt.tx_hash, receipt);
        }
        count
    }

    /// Transactions accepted so far, in broadcast order.
    pub fn sent(&self) -> Vec<SentTransaction> {
        self.ledger().sent.clone()
    }

    /// Accepted broadcasts.
    pub fn broadcast_count(&self) -> usize {
        self.ledger().sent.len()
    }

    /// Every call to `broadcast`, rejected ones included.
    pub fn broadcast_attempts(&self) -> usize {
        self.broadcast_attempts.load(Ordering::SeqCst)
    }

    fn accept(&self, raw: &[u8]) -> OrchestratorResult<TxHash> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| OrchestratorError::broadcast_rejected(format!("malformed transaction: {e}")))?;
        let signed = envelope
            .as_legacy()
            .ok_or_else(|| OrchestratorError::broadcast_rejected("only legacy transactions are accepted"))?;
        let tx = signed.tx();

        let from = signed
            .signature()
            .recover_address_from_prehash(&tx.signature_hash())
            .map_err(|e| OrchestratorError::broadcast_rejected(format!("invalid signature: {e}")))?;

        if tx.chain_id != Some(self.chain_id) {
            return Err(OrchestratorError::broadcast_rejected(format!(
                "invalid chain id {:?}",
                tx.chain_id
            )));
        }

        let to = tx
            .to()
            .ok_or_else(|| OrchestratorError::broadcast_rejected("contract creation not supported"))?;

        let mut ledger = self.ledger();

        if let Some(reason) = ledger.reject_next.take() {
            return Err(OrchestratorError::broadcast_rejected(reason));
        }

        let expected_nonce = ledger.nonces.get(&from).copied().unwrap_or_default();
        if tx.nonce < expected_nonce {
            return Err(OrchestratorError::broadcast_rejected(format!(
                "nonce too low: next nonce {expected_nonce}, tx nonce {}",
                tx.nonce
            )));
        }
        if tx.nonce > expected_nonce {
            return Err(OrchestratorError::broadcast_rejected(format!(
                "nonce gap: next nonce {expected_nonce}, tx nonce {}",
                tx.nonce
            )));
        }

        let native = ledger.native.get(&from).copied().unwrap_or_default();
        if native < tx.value {
            return Err(OrchestratorError::broadcast_rejected("insufficient funds for gas * price + value"));
        }

        ledger.nonces.insert(from, expected_nonce + 1);

        let hash = *signed.hash();
        let success = ledger.execute(from, to, tx.value, &tx.input);
        ledger.block_number += 1;

        let gas_used = if tx.input.is_empty() {
            NATIVE_GAS_USED
        } else {
            CONTRACT_GAS_USED.min(tx.gas_limit)
        };
        let receipt = Receipt {
            tx_hash: hash,
            success,
            block_number: ledger.block_number,
            gas_used,
        };

        ledger.sent.push(SentTransaction {
            hash,
            from,
            to,
            nonce: tx.nonce,
            value: tx.value,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            function: function_for(&tx.input),
        });

        match *self.receipt_mode.lock().unwrap_or_else(|e| e.into_inner()) {
            ReceiptMode::Immediate => {
                ledger.receipts.insert(hash, receipt);
            }
            ReceiptMode::Withheld => ledger.pending.push(receipt),
        }

        Ok(hash)
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkClient for MockChain {
    fn network(&self) -> NetworkId {
        self.network
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address) -> OrchestratorResult<U256> {
        self.simulate_latency().await;
        Ok(self.ledger().native.get(&address).copied().unwrap_or_default())
    }

    async fn get_nonce(&self, address: Address) -> OrchestratorResult<u64> {
        self.simulate_latency().await;
        Ok(self.ledger().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn get_gas_price(&self) -> OrchestratorResult<u128> {
        self.simulate_latency().await;
        Ok(self.gas_price)
    }

    async fn call(&self, to: Address, data: Bytes) -> OrchestratorResult<Bytes> {
        self.simulate_latency().await;
        let ledger = self.ledger();
        let reverted = || OrchestratorError::Rpc("execution reverted".into());

        let encoded = match function_for(&data) {
            Some(ContractFunction::BalanceOf) => {
                let call = IERC20::balanceOfCall::abi_decode(&data).map_err(|_| reverted())?;
                ledger.token(to, call.owner).abi_encode()
            }
            Some(ContractFunction::Allowance) => {
                let call = IERC20::allowanceCall::abi_decode(&data).map_err(|_| reverted())?;
                ledger.allowance(to, call.owner, call.spender).abi_encode()
            }
            Some(ContractFunction::Symbol) => ledger.symbols.get(&to).ok_or_else(reverted)?.abi_encode(),
            _ => return Err(reverted()),
        };
        Ok(Bytes::from(encoded))
    }

    async fn broadcast(&self, raw: Bytes) -> OrchestratorResult<TxHash> {
        self.simulate_latency().await;
        self.broadcast_attempts.fetch_add(1, Ordering::SeqCst);
        let hash = self.accept(&raw)?;
        tracing::debug!(tx_hash = %hash, "Mock chain accepted transaction");
        if std::mem::take(&mut self.ledger().drop_next_response) {
            return Err(unanswered_broadcast(&raw, 0));
        }
        Ok(hash)
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> OrchestratorResult<Option<Receipt>> {
        self.simulate_latency().await;
        Ok(self.ledger().receipts.get(&tx_hash).copied())
    }
}

/// Deterministic address for fixtures, e.g. `fixture_address("usdt")`.
pub fn fixture_address(label: &str) -> Address {
    Address::from_slice(&keccak256(label.as_bytes())[12..])
}
