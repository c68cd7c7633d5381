//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tx_orchestrator::config::{ConfirmationConfig, GasConfig};
use tx_orchestrator::network::mock::fixture_address;
use tx_orchestrator::network::MockChain;
use tx_orchestrator::transaction::TokenRef;
use tx_orchestrator::{Account, Orchestrator};

/// Anvil's first development key.
pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// Anvil's second development key.
pub const SECOND_PRIVATE_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub struct Fixture {
    pub chain: Arc<MockChain>,
    pub orchestrator: Arc<Orchestrator>,
    pub account: Address,
}

/// Short confirmation bounds so timeouts resolve quickly.
pub fn fast_confirmation() -> ConfirmationConfig {
    ConfirmationConfig {
        timeout_secs: 1,
        poll_interval_ms: 10,
    }
}

pub fn fixture() -> Fixture {
    fixture_on(Arc::new(MockChain::new()))
}

pub fn fixture_on(chain: Arc<MockChain>) -> Fixture {
    let orchestrator = orchestrator_for(&chain, TEST_PRIVATE_KEY);
    let account = orchestrator.address();
    Fixture {
        chain,
        orchestrator: Arc::new(orchestrator),
        account,
    }
}

pub fn orchestrator_for(chain: &Arc<MockChain>, private_key: &str) -> Orchestrator {
    let account = Account::from_private_key(private_key).unwrap();
    Orchestrator::with_settings(chain.clone(), account, GasConfig::default(), fast_confirmation())
}

/// `amount * 10^decimals`
pub fn units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

pub fn ether(amount: u64) -> U256 {
    units(amount, 18)
}

pub fn dec(s: &str) -> rust_decimal::Decimal {
    s.parse().unwrap()
}

/// A 6-decimal stablecoin registered on `chain`.
pub fn usdt(chain: &MockChain) -> TokenRef {
    let address = fixture_address("usdt");
    chain.add_token(address, "USDT");
    TokenRef::new(address, 6)
}

/// A lending pool registered on `chain`.
pub fn pool(chain: &MockChain) -> Address {
    let address = fixture_address("pool");
    chain.add_pool(address);
    address
}

/// A 1:1 vault over `asset` registered on `chain`.
pub fn vault(chain: &MockChain, asset: &TokenRef) -> Address {
    let address = fixture_address("vault");
    chain.add_vault(address, asset.address, "vUSDT");
    address
}
