//! TON Giver Miner - Main Application
//!
//! Perpetual proof-of-work miner for TON giver contracts.

use ton_giver_miner::{
    client::{TonapiClient, ToncenterClient},
    config::Config,
    miner::MiningLoop,
    solver::SolverInvoker,
    submitter::TransactionSubmitter,
    wallet::{WalletKeyPair, WalletV4},
    Result, APP_NAME, APP_VERSION,
};

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load and validate configuration
    let config = Config::load().await?;

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let network = config.network();
    info!(
        "Network: {}, giver: {}, solver: {}",
        network,
        config.giver()?,
        config.solver_bin.display()
    );

    let keypair = WalletKeyPair::from_mnemonic(&config.mnemonic_words()?)?;
    let wallet = WalletV4::new(keypair)?;
    info!(
        "Funding wallet: {}",
        wallet.address().to_friendly(false, false)
    );

    let params_source = TonapiClient::new(
        network.tonapi_base(),
        config.http_timeout_duration(),
        config.tonapi_bearer.clone(),
    )?;
    let chain_client = ToncenterClient::new(
        network.rpc_endpoint(),
        config.http_timeout_duration(),
        config.rpc_api_key.clone(),
    )?;

    let solver = SolverInvoker::new(&config);
    let submitter = TransactionSubmitter::new(wallet, chain_client, config.giver()?);
    let mut mining_loop = MiningLoop::new(&config, params_source, solver, submitter)?;

    tokio::select! {
        _ = mining_loop.run() => unreachable!("mining loop never returns"),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
        }
    }

    Ok(())
}

/// Print current configuration; secret fields are skipped during
/// serialization and never appear in the output.
fn print_configuration(config: &Config) -> Result<()> {
    let config_yaml = serde_yaml::to_string(config)?;
    println!("{}", config_yaml);
    Ok(())
}
