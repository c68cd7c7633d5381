//! Network identifiers, connection settings and receipt type.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{address, Address, TxHash};
use serde::{Deserialize, Serialize};

use crate::config::schema::NetworkSection;
use crate::config::Credentials;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Chain id used when neither the config nor the network name provides one.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Decimals of the USDT deployments listed by [`NetworkId::usdt_address`].
pub const USDT_DECIMALS: u8 = 6;

/// Resolve a configured network name. An empty name means mainnet.
pub fn parse_network_name(name: &str) -> OrchestratorResult<NetworkId> {
    if name.trim().is_empty() {
        return Ok(NetworkId::Mainnet);
    }
    name.parse()
}

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkId {
    Mainnet,
    Sepolia,
    Polygon,
    PolygonAmoy,
    Arbitrum,
    Optimism,
    Base,
}

impl NetworkId {
    pub const ALL: [NetworkId; 7] = [
        Self::Mainnet,
        Self::Sepolia,
        Self::Polygon,
        Self::PolygonAmoy,
        Self::Arbitrum,
        Self::Optimism,
        Self::Base,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Sepolia => "sepolia",
            Self::Polygon => "polygon",
            Self::PolygonAmoy => "polygon-amoy",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Base => "base",
        }
    }

    /// Well-known chain id.
    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Mainnet => DEFAULT_CHAIN_ID,
            Self::Sepolia => 11_155_111,
            Self::Polygon => 137,
            Self::PolygonAmoy => 80_002,
            Self::Arbitrum => 42_161,
            Self::Optimism => 10,
            Self::Base => 8_453,
        }
    }

    /// Ticker of the native currency.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Polygon | Self::PolygonAmoy => "POL",
            _ => "ETH",
        }
    }

    /// Canonical USDT contract, `None` where no deployment is known.
    pub fn usdt_address(&self) -> Option<Address> {
        match self {
            Self::Mainnet => Some(address!("dac17f958d2ee523a2206206994597c13d831ec7")),
            Self::Sepolia => Some(address!("aa8e23fb1079ea71e0a56f48a2aa51851d8433d0")),
            Self::Polygon => Some(address!("c2132d05d31c914a87c6611c10748aeb04b58e8f")),
            Self::PolygonAmoy => None,
            Self::Arbitrum => Some(address!("fd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9")),
            Self::Optimism => Some(address!("94b008aa00579c1307b0ef2c499ad98a8ce58e58")),
            Self::Base => Some(address!("fde4c96c8593536e31f229ea8f37b2ada2699ef2")),
        }
    }

    /// Provider-hosted RPC endpoint for `project_id`.
    pub fn rpc_url(&self, project_id: &str) -> String {
        let host = match self {
            Self::Mainnet => "mainnet",
            Self::Sepolia => "sepolia",
            Self::Polygon => "polygon-mainnet",
            Self::PolygonAmoy => "polygon-amoy",
            Self::Arbitrum => "arbitrum-mainnet",
            Self::Optimism => "optimism-mainnet",
            Self::Base => "base-mainnet",
        };
        format!("https://{host}.infura.io/v3/{project_id}")
    }

    /// Block explorer link for a transaction.
    pub fn explorer_tx_url(&self, tx_hash: &TxHash) -> String {
        let base = match self {
            Self::Mainnet => "https://etherscan.io",
            Self::Sepolia => "https://sepolia.etherscan.io",
            Self::Polygon => "https://polygonscan.com",
            Self::PolygonAmoy => "https://amoy.polygonscan.com",
            Self::Arbitrum => "https://arbiscan.io",
            Self::Optimism => "https://optimistic.etherscan.io",
            Self::Base => "https://basescan.org",
        };
        format!("{base}/tx/{tx_hash}")
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkId {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|n| n.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|n| n.name()).collect();
                OrchestratorError::Configuration(format!(
                    "unsupported network '{s}', expected one of {known:?}"
                ))
            })
    }
}

/// Immutable connection settings for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: NetworkId,
    pub rpc_url: String,
    pub failover_urls: Vec<String>,
    pub chain_id: u64,
    pub rpc_timeout_secs: u64,
}

impl NetworkConfig {
    /// Settings for `network` with its templated URL and known chain id.
    pub fn for_network(network: NetworkId, project_id: &str) -> Self {
        Self {
            network,
            rpc_url: network.rpc_url(project_id),
            failover_urls: Vec::new(),
            chain_id: network.chain_id(),
            rpc_timeout_secs: 10,
        }
    }

    /// Resolve settings from the config section and credentials.
    pub fn from_section(section: &NetworkSection, credentials: &Credentials) -> OrchestratorResult<Self> {
        let network = parse_network_name(&section.name)?;

        let rpc_url = match (&section.rpc_url, &credentials.provider_project_id) {
            (Some(url), _) => url.clone(),
            (None, Some(project_id)) => network.rpc_url(project_id),
            (None, None) => {
                return Err(OrchestratorError::Configuration(
                    "no rpc_url and no provider project id".into(),
                ))
            }
        };

        Ok(Self {
            network,
            rpc_url,
            failover_urls: section.failover_urls.clone(),
            chain_id: section.chain_id.unwrap_or_else(|| network.chain_id()),
            rpc_timeout_secs: section.rpc_timeout_secs,
        })
    }
}

/// Outcome record of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// Status bit: true = executed, false = mined but reverted.
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
}
