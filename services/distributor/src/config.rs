//! Startup configuration.
//!
//! Every setting is a CLI flag backed by an environment variable, so the
//! service runs unchanged from a `.env`-driven process manager. The parsed
//! [`CliArgs`] are validated once into an immutable [`DistributorConfig`]
//! that the cycle controller borrows for the life of the process.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use brotherhood_common::sol_to_lamports;
use clap::{Parser, ValueEnum};
use solana_sdk::pubkey::Pubkey;

use crate::allocation::{AllocationConfig, Bucket, BucketKind};
use crate::draw::DrawConfig;
use crate::error::DistributorError;

pub const DEFAULT_STATS_PATH: &str = "data/stats.json";

/// One year. Keeps `now + interval` well inside chrono's range.
pub const MAX_INTERVAL_MINUTES: u64 = 60 * 24 * 365;

/// How the spendable balance is split each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AllocationProfile {
    /// Buyback share stays in the wallet, airdrop share goes to winners.
    Split,
    /// One prize pool paid out to winners.
    Payout,
}

/// Brotherhood creator-fee distributor
#[derive(Parser, Debug, Clone)]
#[command(name = "brotherhood-distributor", author, version, about, long_about = None)]
pub struct CliArgs {
    /// JSON-RPC endpoint used for balances, holder snapshots and transactions
    #[arg(long, env = "HELIUS_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Operator keypair, base58-encoded 64-byte secret key
    #[arg(long, env = "CREATOR_WALLET_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Mint of the token whose holders are eligible
    #[arg(long, env = "YMN_TOKEN_MINT")]
    pub token_mint: Option<String>,

    /// Account whose balance is distributed (defaults to the operator wallet)
    #[arg(long, env = "CREATOR_FEE_WALLET")]
    pub fee_wallet: Option<String>,

    #[arg(long, env = "CHECK_INTERVAL_MINUTES", default_value_t = 10)]
    pub interval_minutes: u64,

    /// Balance (SOL) below which a cycle does nothing
    #[arg(long, env = "MIN_BALANCE_TO_PROCESS", default_value_t = 0.1)]
    pub min_balance_to_process: f64,

    #[arg(long, env = "ALLOCATION_PROFILE", value_enum, default_value_t = AllocationProfile::Split)]
    pub allocation_profile: AllocationProfile,

    #[arg(long, env = "BUYBACK_PERCENTAGE", default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub buyback_percentage: u8,

    #[arg(long, env = "AIRDROP_PERCENTAGE", default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub airdrop_percentage: u8,

    #[arg(long, env = "PRIZE_POOL_PERCENTAGE", default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub prize_pool_percentage: u8,

    /// Eligible holders required before a draw runs
    #[arg(long, env = "MIN_HOLDERS_FOR_AIRDROP", default_value_t = 10)]
    pub min_holders_for_airdrop: usize,

    #[arg(long, env = "NUMBER_OF_WINNERS_PER_ROUND", default_value_t = 1)]
    pub winners_per_round: usize,

    /// Token units a holder needs to be eligible
    #[arg(long, env = "MIN_HOLDER_BALANCE", default_value_t = 100.0)]
    pub min_holder_balance: f64,

    /// Estimated network fee per winner transfer (SOL)
    #[arg(long, env = "FEE_PER_TRANSFER", default_value_t = 0.005)]
    pub fee_per_transfer: f64,

    /// Extra SOL held back on top of the transfer fee estimate
    #[arg(long, env = "FEE_SAFETY_BUFFER", default_value_t = 0.01)]
    pub fee_safety_buffer: f64,

    #[arg(long, env = "CONFIRMATION_TIMEOUT_SECS", default_value_t = 60)]
    pub confirmation_timeout_secs: u64,

    /// Winner transfers allowed in flight at once
    #[arg(long, env = "DISBURSE_CONCURRENCY", default_value_t = 1)]
    pub disburse_concurrency: usize,

    #[arg(long, env = "STATS_PATH", default_value = DEFAULT_STATS_PATH)]
    pub stats_path: PathBuf,

    /// Push the stats file to GitHub after every save
    #[arg(long, env = "GITHUB_SYNC_ENABLED")]
    pub github_sync: bool,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Target repository as `owner/name`
    #[arg(long, env = "GITHUB_REPO")]
    pub github_repo: Option<String>,

    #[arg(long, env = "GITHUB_BRANCH", default_value = "main")]
    pub github_branch: String,

    #[arg(long, env = "GITHUB_STATS_PATH", default_value = "stats.json")]
    pub github_stats_path: String,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSyncConfig {
    pub token: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

/// Validated, immutable settings for one process lifetime.
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub rpc_url: String,
    pub token_mint: String,
    /// Signs every transfer.
    pub operator: String,
    /// Balance source; equals `operator` unless a distinct fee wallet is set.
    pub fee_wallet: String,
    pub interval: Duration,
    pub allocation: AllocationConfig,
    pub draw: DrawConfig,
    pub confirmation_timeout: Duration,
    pub disburse_concurrency: usize,
    pub stats_path: PathBuf,
    pub github: Option<GithubSyncConfig>,
}

impl DistributorConfig {
    /// Validate raw arguments. `operator` is the public key of the already
    /// loaded signing keypair.
    pub fn from_args(args: &CliArgs, operator: String) -> Result<Self, DistributorError> {
        let rpc_url = required(&args.rpc_url, "HELIUS_RPC_URL")?;
        let token_mint = required(&args.token_mint, "YMN_TOKEN_MINT")?;
        parse_address(&token_mint, "YMN_TOKEN_MINT")?;

        let fee_wallet = match args.fee_wallet.as_deref().map(str::trim) {
            Some(wallet) if !wallet.is_empty() => {
                parse_address(wallet, "CREATOR_FEE_WALLET")?;
                wallet.to_string()
            }
            _ => operator.clone(),
        };

        if args.interval_minutes == 0 {
            return Err(DistributorError::config(
                "CHECK_INTERVAL_MINUTES",
                "must be at least 1",
            ));
        }
        let interval_secs = args
            .interval_minutes
            .checked_mul(60)
            .filter(|_| args.interval_minutes <= MAX_INTERVAL_MINUTES)
            .ok_or_else(|| {
                DistributorError::config(
                    "CHECK_INTERVAL_MINUTES",
                    format!("must be at most {}", MAX_INTERVAL_MINUTES),
                )
            })?;
        if args.confirmation_timeout_secs == 0 {
            return Err(DistributorError::config(
                "CONFIRMATION_TIMEOUT_SECS",
                "must be at least 1",
            ));
        }
        if args.winners_per_round == 0 {
            return Err(DistributorError::config(
                "NUMBER_OF_WINNERS_PER_ROUND",
                "must be at least 1",
            ));
        }
        if args.disburse_concurrency == 0 {
            return Err(DistributorError::config(
                "DISBURSE_CONCURRENCY",
                "must be at least 1",
            ));
        }
        for (field, value) in [
            ("MIN_BALANCE_TO_PROCESS", args.min_balance_to_process),
            ("MIN_HOLDER_BALANCE", args.min_holder_balance),
            ("FEE_PER_TRANSFER", args.fee_per_transfer),
            ("FEE_SAFETY_BUFFER", args.fee_safety_buffer),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DistributorError::config(
                    field,
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }

        let buckets = buckets_for_profile(args)?;

        let allocation = AllocationConfig {
            min_balance_to_process: sol_to_lamports(args.min_balance_to_process),
            fee_per_transfer: sol_to_lamports(args.fee_per_transfer),
            safety_buffer: sol_to_lamports(args.fee_safety_buffer),
            transfers_per_cycle: args.winners_per_round as u64,
            buckets,
        };

        let draw = DrawConfig {
            min_holder_balance: args.min_holder_balance,
            min_pool_size: args.min_holders_for_airdrop,
            winners_per_draw: args.winners_per_round,
        };

        let github = if args.github_sync {
            let token = required(&args.github_token, "GITHUB_TOKEN")?;
            let repo = required(&args.github_repo, "GITHUB_REPO")?;
            if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
                return Err(DistributorError::config(
                    "GITHUB_REPO",
                    format!("expected owner/name, got {}", repo),
                ));
            }
            Some(GithubSyncConfig {
                token,
                repo,
                branch: args.github_branch.clone(),
                path: args.github_stats_path.clone(),
            })
        } else {
            None
        };

        Ok(DistributorConfig {
            rpc_url,
            token_mint,
            operator,
            fee_wallet,
            interval: Duration::from_secs(interval_secs),
            allocation,
            draw,
            confirmation_timeout: Duration::from_secs(args.confirmation_timeout_secs),
            disburse_concurrency: args.disburse_concurrency,
            stats_path: args.stats_path.clone(),
            github,
        })
    }

    /// Wallets that may never receive their own redistributed funds.
    pub fn excluded_addresses(&self) -> HashSet<String> {
        let mut excluded = HashSet::new();
        excluded.insert(self.operator.clone());
        excluded.insert(self.fee_wallet.clone());
        excluded
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, DistributorError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DistributorError::config(field, "missing required setting")),
    }
}

fn parse_address(value: &str, field: &str) -> Result<Pubkey, DistributorError> {
    Pubkey::from_str(value)
        .map_err(|e| DistributorError::config(field, format!("invalid address {}: {}", value, e)))
}

fn buckets_for_profile(args: &CliArgs) -> Result<Vec<Bucket>, DistributorError> {
    let buckets = match args.allocation_profile {
        AllocationProfile::Split => vec![
            Bucket::new("buyback", args.buyback_percentage, BucketKind::Reserve),
            Bucket::new("airdrop", args.airdrop_percentage, BucketKind::Prize),
        ],
        AllocationProfile::Payout => vec![Bucket::new(
            "prizePool",
            args.prize_pool_percentage,
            BucketKind::Prize,
        )],
    };

    let total: u32 = buckets.iter().map(|b| b.percent as u32).sum();
    if total > 100 {
        return Err(DistributorError::config(
            "ALLOCATION_PERCENTAGES",
            format!("bucket percentages sum to {}%, must not exceed 100%", total),
        ));
    }
    Ok(buckets)
}
