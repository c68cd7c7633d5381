//! tx-orchestrator command line.
//!
//! A thin caller over the library: every subcommand maps to one fully
//! specified `OperationRequest` or read, and prints the result as JSON.
//!
//! ```text
//! config (TOML + env) → credentials → RpcClient::connect → Account
//!     → Orchestrator::execute(request) → TransactionOutcome (JSON)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;

use tx_orchestrator::config::{self, Credentials, OrchestratorConfig};
use tx_orchestrator::network::{NetworkConfig, RpcClient};
use tx_orchestrator::observability::{init_logging, init_metrics};
use tx_orchestrator::transaction::{ApprovalAmount, OperationRequest, TokenRef};
use tx_orchestrator::{Account, Orchestrator};

#[derive(Parser)]
#[command(name = "tx-orchestrator")]
#[command(about = "Validate, sign, broadcast and confirm EVM transactions", long_about = None)]
struct Cli {
    /// TOML config file. Without it, defaults plus environment are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Native balance of an address (defaults to the signing account)
    Balance {
        #[arg(long)]
        address: Option<Address>,
    },
    /// ERC-20 balance of an address
    TokenBalance {
        #[arg(long)]
        token: Address,
        #[arg(long)]
        decimals: u8,
        #[arg(long)]
        address: Option<Address>,
    },
    /// USDT balance of an address on the configured network
    UsdtBalance {
        #[arg(long)]
        address: Option<Address>,
    },
    /// Fee estimate for a native transfer
    EstimateNative {
        #[arg(long)]
        amount: Decimal,
    },
    /// Send native currency
    SendNative {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        gas_price_gwei: Option<Decimal>,
    },
    /// Transfer an ERC-20 token
    SendToken {
        #[arg(long)]
        token: Address,
        #[arg(long)]
        decimals: u8,
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: Decimal,
    },
    /// Approve a spender
    Approve {
        #[arg(long)]
        token: Address,
        #[arg(long)]
        decimals: u8,
        #[arg(long)]
        spender: Address,
        /// Exact allowance; omit together with --max
        #[arg(long, conflicts_with = "max", required_unless_present = "max")]
        amount: Option<Decimal>,
        /// Unlimited allowance
        #[arg(long)]
        max: bool,
    },
    /// Supply an asset to the lending pool
    Supply {
        #[arg(long)]
        pool: Address,
        #[arg(long)]
        asset: Address,
        #[arg(long)]
        decimals: u8,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        on_behalf_of: Option<Address>,
        #[arg(long, default_value_t = 0)]
        referral_code: u16,
        /// Fail instead of approving when the allowance is too low
        #[arg(long)]
        no_auto_approve: bool,
    },
    /// Deposit assets into a vault
    Deposit {
        #[arg(long)]
        vault: Option<Address>,
        #[arg(long)]
        asset: Option<Address>,
        #[arg(long)]
        decimals: Option<u8>,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        receiver: Option<Address>,
        #[arg(long)]
        no_auto_approve: bool,
    },
    /// Redeem vault shares (whole units)
    Redeem {
        #[arg(long)]
        vault: Option<Address>,
        #[arg(long)]
        shares: Decimal,
        #[arg(long)]
        receiver: Option<Address>,
        #[arg(long)]
        owner: Option<Address>,
    },
    /// Look up a receipt by hash, e.g. after a confirmation timeout
    Receipt {
        #[arg(long)]
        tx_hash: TxHash,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::loader::load_from_env()?,
    };

    init_logging(&config.observability).map_err(|e| e.to_string())?;

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let credentials = Credentials::from_config(&config)?;
    let network = NetworkConfig::from_section(&config.network, &credentials)?;
    tracing::info!(network = %network.network, chain_id = network.chain_id, "Configuration loaded");

    let client = RpcClient::connect(network).await?;
    let account = Account::from_secret(&credentials.private_key)?;
    let orchestrator = Orchestrator::new(Arc::new(client), account, &config);

    run(cli.command, &orchestrator, &config).await
}

async fn run(
    command: Commands,
    orchestrator: &Orchestrator,
    config: &OrchestratorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let me = orchestrator.address();

    let request = match command {
        Commands::Balance { address } => {
            return print(&orchestrator.builder().native_balance(address.unwrap_or(me)).await?);
        }
        Commands::TokenBalance {
            token,
            decimals,
            address,
        } => {
            let view = orchestrator
                .builder()
                .token_balance(&TokenRef::new(token, decimals), address.unwrap_or(me))
                .await?;
            return print(&view);
        }
        Commands::UsdtBalance { address } => {
            return print(&orchestrator.builder().usdt_balance(address.unwrap_or(me)).await?);
        }
        Commands::EstimateNative { amount } => {
            return print(&orchestrator.builder().estimate_native_transfer_cost(amount).await?);
        }
        Commands::Receipt { tx_hash } => {
            return match orchestrator.lookup_receipt(tx_hash).await? {
                Some(receipt) => print(&receipt),
                None => Err(format!("no receipt for {tx_hash} yet").into()),
            };
        }
        Commands::SendNative {
            to,
            amount,
            gas_price_gwei,
        } => OperationRequest::SendNative {
            to,
            amount,
            gas_price_gwei,
        },
        Commands::SendToken {
            token,
            decimals,
            to,
            amount,
        } => OperationRequest::SendToken {
            token: TokenRef::new(token, decimals),
            to,
            amount,
        },
        Commands::Approve {
            token,
            decimals,
            spender,
            amount,
            max,
        } => OperationRequest::Approve {
            token: TokenRef::new(token, decimals),
            spender,
            amount: match amount {
                Some(amount) if !max => ApprovalAmount::Exact(amount),
                _ => ApprovalAmount::Max,
            },
        },
        Commands::Supply {
            pool,
            asset,
            decimals,
            amount,
            on_behalf_of,
            referral_code,
            no_auto_approve,
        } => OperationRequest::SupplyToPool {
            pool,
            asset: TokenRef::new(asset, decimals),
            amount,
            on_behalf_of,
            referral_code,
            auto_approve: !no_auto_approve,
        },
        Commands::Deposit {
            vault,
            asset,
            decimals,
            amount,
            receiver,
            no_auto_approve,
        } => {
            let defaults = &config.vault;
            let decimals = decimals
                .or(defaults.asset_decimals)
                .ok_or("asset decimals not given (--decimals or vault.asset_decimals)")?;
            OperationRequest::VaultDeposit {
                vault: or_default(vault, &defaults.vault_address, "vault")?,
                asset: TokenRef::new(or_default(asset, &defaults.asset_address, "asset")?, decimals),
                assets: amount,
                receiver: receiver.or(optional_default(&defaults.receiver)?),
                auto_approve: !no_auto_approve,
            }
        }
        Commands::Redeem {
            vault,
            shares,
            receiver,
            owner,
        } => {
            let defaults = &config.vault;
            let asset = match (optional_default(&defaults.asset_address)?, defaults.asset_decimals) {
                (Some(address), Some(decimals)) => Some(TokenRef::new(address, decimals)),
                _ => None,
            };
            OperationRequest::VaultRedeem {
                vault: or_default(vault, &defaults.vault_address, "vault")?,
                shares,
                receiver: receiver.or(optional_default(&defaults.receiver)?),
                owner,
                asset,
            }
        }
    };

    let outcome = orchestrator.execute(request).await?;
    print(&outcome)?;
    if !outcome.is_success() {
        return Err(format!("transaction {} reverted", outcome.tx_hash).into());
    }
    Ok(())
}

fn or_default(
    given: Option<Address>,
    default: &Option<String>,
    what: &str,
) -> Result<Address, Box<dyn std::error::Error>> {
    match given {
        Some(address) => Ok(address),
        None => optional_default(default)?
            .ok_or_else(|| format!("{what} address not given and no default configured").into()),
    }
}

fn optional_default(default: &Option<String>) -> Result<Option<Address>, Box<dyn std::error::Error>> {
    Ok(default.as_deref().map(str::parse).transpose()?)
}

fn print<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
