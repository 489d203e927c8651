pub mod allocation;
pub mod chain;
pub mod config;
pub mod cycle;
pub mod disburse;
pub mod draw;
pub mod error;
pub mod helius;
pub mod publish;
pub mod solana;
pub mod state;

pub use chain::{ChainClient, HolderSource};
pub use config::{CliArgs, DistributorConfig};
pub use cycle::{CycleController, CycleOutcome, CyclePhase, SkipReason};
pub use error::{DistributorError, PublishError, TransferFailure};
pub use state::{LedgerStore, StatisticsLedger};
