//! Brotherhood creator-fee distributor.
//!
//! Checks the fee wallet every interval, keeps the buyback share in place
//! and airdrops the rest to randomly drawn token holders.

use std::env;

use anyhow::Context;
use brotherhood_common::lamports_to_sol;
use brotherhood_distributor::allocation::BucketKind;
use brotherhood_distributor::config::{CliArgs, DistributorConfig};
use brotherhood_distributor::cycle::CycleController;
use brotherhood_distributor::helius::HeliusHolderSource;
use brotherhood_distributor::publish::{GithubPublisher, LedgerPublisher};
use brotherhood_distributor::solana::{parse_keypair, SolanaChain};
use brotherhood_distributor::state::LedgerStore;
use brotherhood_distributor::DistributorError;
use clap::Parser;
use solana_sdk::signature::Signer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = CliArgs::parse();

    let secret = args.private_key.as_deref().ok_or_else(|| {
        DistributorError::config("CREATOR_WALLET_PRIVATE_KEY", "missing required setting")
    })?;
    let keypair = parse_keypair(secret)?;
    let config = DistributorConfig::from_args(&args, keypair.pubkey().to_string())?;
    log_startup(&config);

    let chain = SolanaChain::new(config.rpc_url.clone(), keypair);
    let holders = HeliusHolderSource::new(config.rpc_url.clone())?;
    let publisher = config
        .github
        .clone()
        .map(|github| Box::new(GithubPublisher::new(github)) as Box<dyn LedgerPublisher>);

    let store = LedgerStore::new(config.stats_path.clone());
    let mut controller = CycleController::load(&config, &chain, &holders, store)
        .await
        .with_publisher(publisher);

    if args.once {
        tokio::select! {
            outcome = controller.run_cycle() => {
                let outcome = outcome.context("distribution cycle failed")?;
                info!(?outcome, "single cycle finished");
            }
            _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
        }
        return Ok(());
    }

    tokio::select! {
        _ = controller.run_forever() => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }
    Ok(())
}

fn log_startup(config: &DistributorConfig) {
    info!("brotherhood distributor v{}", env!("CARGO_PKG_VERSION"));
    info!(operator = %config.operator, fee_wallet = %config.fee_wallet, "wallets");
    info!(mint = %config.token_mint, "token");
    info!(
        interval_minutes = config.interval.as_secs() / 60,
        min_balance_sol = lamports_to_sol(config.allocation.min_balance_to_process),
        reserve_for_fees_sol = lamports_to_sol(config.allocation.reserve_for_fees()),
        "schedule"
    );
    for bucket in &config.allocation.buckets {
        let role = match bucket.kind {
            BucketKind::Reserve => "kept in wallet",
            BucketKind::Prize => "paid to winners",
        };
        info!(bucket = %bucket.name, percent = bucket.percent, role, "allocation");
    }
    info!(
        min_holders = config.draw.min_pool_size,
        winners = config.draw.winners_per_draw,
        min_holder_balance = config.draw.min_holder_balance,
        "draw"
    );
    info!(
        path = %config.stats_path.display(),
        github_sync = config.github.is_some(),
        "stats"
    );
}
