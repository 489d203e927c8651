//! One distribution cycle, and the loop that runs them.
//!
//! A cycle walks `CheckingBalance -> Allocating -> Selecting -> Disbursing
//! -> RecordingStats` and returns to `Idle`, or drops to `Skipped` as soon
//! as there is nothing to do. Cycles never overlap: the scheduler awaits
//! each one before sleeping for the configured interval.

use std::collections::HashSet;

use brotherhood_common::lamports_to_sol;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::allocation::{allocate, check_minimum_balance, AllocationPlan};
use crate::chain::{ChainClient, HolderSource};
use crate::config::DistributorConfig;
use crate::disburse::{amount_per_winner, disburse, DisbursementResult, DisburseOptions};
use crate::draw::{draw, filter_eligible};
use crate::error::DistributorError;
use crate::publish::LedgerPublisher;
use crate::state::{LedgerStore, StatisticsLedger, TransferRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    CheckingBalance,
    Allocating,
    Selecting,
    Disbursing,
    RecordingStats,
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No bucket routes anything to winners.
    NoPrize,
    SnapshotUnavailable(String),
    NotEnoughHolders { eligible: usize, required: usize },
    /// The prize split across winners rounds down to zero lamports.
    PayoutTooSmall { prize: u64, winners: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Under the processing gate. Nothing persisted.
    BelowMinimum { balance: u64 },
    /// Gate passed, but the fee reserve ate the whole balance.
    InsufficientFunds { balance: u64, reserve: u64 },
    /// Allocation done, no winner transfers attempted.
    DrawSkipped {
        plan: AllocationPlan,
        reason: SkipReason,
    },
    Distributed {
        plan: AllocationPlan,
        results: Vec<DisbursementResult>,
    },
}

impl CycleOutcome {
    pub fn confirmed_transfers(&self) -> usize {
        match self {
            CycleOutcome::Distributed { results, .. } => {
                results.iter().filter(|r| r.is_success()).count()
            }
            _ => 0,
        }
    }
}

/// Owns the statistics ledger and drives cycles against the chain.
pub struct CycleController<'a> {
    config: &'a DistributorConfig,
    chain: &'a dyn ChainClient,
    holders: &'a dyn HolderSource,
    store: LedgerStore,
    publisher: Option<Box<dyn LedgerPublisher>>,
    excluded: HashSet<String>,
    ledger: StatisticsLedger,
    phase: CyclePhase,
}

impl<'a> CycleController<'a> {
    pub fn new(
        config: &'a DistributorConfig,
        chain: &'a dyn ChainClient,
        holders: &'a dyn HolderSource,
        store: LedgerStore,
        ledger: StatisticsLedger,
    ) -> Self {
        Self {
            config,
            chain,
            holders,
            store,
            publisher: None,
            excluded: config.excluded_addresses(),
            ledger,
            phase: CyclePhase::Idle,
        }
    }

    /// Build a controller seeded with whatever ledger is on disk.
    pub async fn load(
        config: &'a DistributorConfig,
        chain: &'a dyn ChainClient,
        holders: &'a dyn HolderSource,
        store: LedgerStore,
    ) -> Self {
        let ledger = store.load().await;
        info!(
            cycles = ledger.total_cycles,
            winners = ledger.total_winners,
            distributed_sol = lamports_to_sol(ledger.total_distributed),
            "loaded stats"
        );
        Self::new(config, chain, holders, store, ledger)
    }

    pub fn with_publisher(mut self, publisher: Option<Box<dyn LedgerPublisher>>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn ledger(&self) -> &StatisticsLedger {
        &self.ledger
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(from = ?self.phase, to = ?phase, "cycle phase");
        self.phase = phase;
    }

    /// Run one full cycle.
    ///
    /// Only a failed balance check is an error; every other shortfall is a
    /// skip reported through [`CycleOutcome`].
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, DistributorError> {
        let config = self.config;
        info!("starting distribution cycle");
        self.enter(CyclePhase::CheckingBalance);

        let balance = match self.chain.balance(&config.fee_wallet).await {
            Ok(balance) => balance,
            Err(e) => {
                self.enter(CyclePhase::Idle);
                return Err(e);
            }
        };
        let now = Utc::now();
        self.ledger.record_balance_check(balance, now);
        info!(
            wallet = %config.fee_wallet,
            balance_sol = lamports_to_sol(balance),
            "fee wallet balance"
        );

        let allocation = &config.allocation;
        if check_minimum_balance(balance, allocation).is_err() {
            info!(
                balance_sol = lamports_to_sol(balance),
                minimum_sol = lamports_to_sol(allocation.min_balance_to_process),
                "balance below minimum, skipping cycle"
            );
            self.enter(CyclePhase::Skipped);
            self.enter(CyclePhase::Idle);
            return Ok(CycleOutcome::BelowMinimum { balance });
        }

        self.enter(CyclePhase::Allocating);
        let outcome = match allocate(balance, allocation) {
            Ok(plan) => {
                log_plan(&plan);
                self.ledger.record_reserved(plan.reserved_amount());
                self.select_and_disburse(plan).await
            }
            Err(DistributorError::InsufficientFunds { balance, reserve }) => {
                warn!(
                    balance_sol = lamports_to_sol(balance),
                    reserve_sol = lamports_to_sol(reserve),
                    "balance does not cover the fee reserve, skipping payout"
                );
                self.enter(CyclePhase::Skipped);
                CycleOutcome::InsufficientFunds { balance, reserve }
            }
            Err(e) => {
                self.enter(CyclePhase::Idle);
                return Err(e);
            }
        };

        self.record_stats(now).await;
        self.enter(CyclePhase::Idle);
        Ok(outcome)
    }

    async fn select_and_disburse(&mut self, plan: AllocationPlan) -> CycleOutcome {
        let config = self.config;
        self.enter(CyclePhase::Selecting);

        let prize = plan.prize_amount();
        if prize == 0 {
            info!("no prize allocated this cycle");
            return self.skip(plan, SkipReason::NoPrize);
        }

        let snapshot = match self.holders.snapshot(&config.token_mint).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "holder snapshot failed, skipping draw");
                return self.skip(plan, SkipReason::SnapshotUnavailable(e.to_string()));
            }
        };

        let draw_config = &config.draw;
        let eligible = filter_eligible(&snapshot, draw_config.min_holder_balance, &self.excluded);
        info!(
            holders = snapshot.len(),
            eligible = eligible.len(),
            min_balance = draw_config.min_holder_balance,
            "holders qualified"
        );

        let drawn = draw(&eligible, draw_config);
        if drawn.winners.is_empty() {
            warn!(
                eligible = eligible.len(),
                required = draw_config.min_pool_size,
                "not enough qualified holders, skipping draw"
            );
            let reason = SkipReason::NotEnoughHolders {
                eligible: eligible.len(),
                required: draw_config.min_pool_size,
            };
            return self.skip(plan, reason);
        }

        if amount_per_winner(prize, drawn.winners.len()) == 0 {
            warn!(prize, winners = drawn.winners.len(), "prize rounds to zero per winner");
            let reason = SkipReason::PayoutTooSmall {
                prize,
                winners: drawn.winners.len(),
            };
            return self.skip(plan, reason);
        }

        info!(
            seed = %drawn.record.seed,
            snapshot_root = drawn.record.snapshot_root.as_deref().unwrap_or("-"),
            winners = ?drawn.record.winners,
            "winners drawn"
        );
        self.ledger.record_draw(drawn.record);

        self.enter(CyclePhase::Disbursing);
        let options = DisburseOptions {
            confirmation_timeout: config.confirmation_timeout,
            concurrency: config.disburse_concurrency,
        };
        let results = disburse(self.chain, prize, &drawn.winners, options).await;

        let confirmed_at = Utc::now();
        for result in &results {
            if let Some(signature) = result.signature() {
                self.ledger.record_transfer(TransferRecord {
                    address: result.address.clone(),
                    amount: result.amount,
                    signature: signature.to_string(),
                    at: confirmed_at,
                });
            }
        }
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "airdrops complete"
        );

        CycleOutcome::Distributed { plan, results }
    }

    fn skip(&mut self, plan: AllocationPlan, reason: SkipReason) -> CycleOutcome {
        self.enter(CyclePhase::Skipped);
        CycleOutcome::DrawSkipped { plan, reason }
    }

    /// Count the cycle and flush the ledger. Failures here are logged; the
    /// in-memory ledger stays authoritative and the next flush retries.
    async fn record_stats(&mut self, started_at: DateTime<Utc>) {
        self.enter(CyclePhase::RecordingStats);
        let next_at = TimeDelta::from_std(self.config.interval)
            .ok()
            .map(|interval| Utc::now() + interval);
        self.ledger.record_cycle(started_at, next_at);

        if let Err(e) = self.store.save(&self.ledger).await {
            error!(error = %e, "failed to save stats");
            return;
        }
        debug!(path = %self.store.path().display(), "stats saved");

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(&self.ledger).await {
                warn!(error = %e, "failed to publish stats");
            }
        }
    }

    /// Run cycles back to back, `interval` apart, until the future is dropped.
    pub async fn run_forever(&mut self) {
        loop {
            match self.run_cycle().await {
                Ok(outcome) => debug!(?outcome, "cycle finished"),
                Err(e) => error!(error = %e, "cycle failed"),
            }
            info!(
                minutes = self.config.interval.as_secs() / 60,
                "waiting for next cycle"
            );
            tokio::time::sleep(self.config.interval).await;
        }
    }
}

fn log_plan(plan: &AllocationPlan) {
    info!(
        total_sol = lamports_to_sol(plan.total_balance),
        reserve_for_fees_sol = lamports_to_sol(plan.reserve_for_fees),
        spendable_sol = lamports_to_sol(plan.spendable),
        unallocated_sol = lamports_to_sol(plan.unallocated()),
        "allocation"
    );
    for part in &plan.parts {
        info!(
            bucket = %part.name,
            percent = part.percent,
            amount_sol = lamports_to_sol(part.amount),
            "allocation bucket"
        );
    }
}
