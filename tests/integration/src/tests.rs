//! End-to-end tests for the Brotherhood distributor.
//!
//! These drive full cycles through `CycleController` against an in-memory
//! chain and holder source, with the ledger persisted to a temp directory.
//! Nothing touches the network.
//!
//! Run:
//! ```bash
//! cargo test -p brotherhood-integration-tests
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use brotherhood_common::merkle::{merkle_proof, snapshot_leaves};
use brotherhood_common::{compute_leaf_hash, verify_merkle_proof, Holder, LAMPORTS_PER_SOL};
use brotherhood_distributor::allocation::{AllocationConfig, Bucket, BucketKind};
use brotherhood_distributor::config::DistributorConfig;
use brotherhood_distributor::draw::{draw_with_seed, filter_eligible, DrawConfig};
use brotherhood_distributor::{
    ChainClient, CycleController, CycleOutcome, CyclePhase, DistributorError, HolderSource,
    LedgerStore, SkipReason, StatisticsLedger, TransferFailure,
};

// ─── Constants ───

const OPERATOR: &str = "operator";
const FEE_WALLET: &str = "fee_wallet";
const NETWORK_FEE: u64 = 5_000;

// ─── In-memory chain ───

/// Tracks native balances and applies transfers the moment they confirm.
struct MemoryChain {
    balances: Mutex<HashMap<String, u64>>,
    pending: Mutex<HashMap<String, (String, u64)>>,
    reject_submit: HashSet<String>,
    never_confirm: HashSet<String>,
    submissions: Mutex<Vec<String>>,
}

impl MemoryChain {
    fn new(fee_wallet_balance: u64) -> Self {
        let mut balances = HashMap::new();
        balances.insert(FEE_WALLET.to_string(), fee_wallet_balance);
        Self {
            balances: Mutex::new(balances),
            pending: Mutex::new(HashMap::new()),
            reject_submit: HashSet::new(),
            never_confirm: HashSet::new(),
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, recipients: &[&str]) -> Self {
        self.reject_submit = recipients.iter().map(|s| s.to_string()).collect();
        self
    }

    fn stalling(mut self, recipients: &[&str]) -> Self {
        self.never_confirm = recipients.iter().map(|s| s.to_string()).collect();
        self
    }

    fn balance_of(&self, address: &str) -> u64 {
        self.balances.lock().unwrap().get(address).copied().unwrap_or(0)
    }

    fn fund(&self, address: &str, lamports: u64) {
        *self
            .balances
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert(0) += lamports;
    }

    fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn balance(&self, address: &str) -> Result<u64, DistributorError> {
        Ok(self.balance_of(address))
    }

    async fn submit_transfer(
        &self,
        recipient: &str,
        lamports: u64,
    ) -> Result<String, TransferFailure> {
        self.submissions.lock().unwrap().push(recipient.to_string());
        if self.reject_submit.contains(recipient) {
            return Err(TransferFailure::Submission {
                reason: "Transaction simulation failed".to_string(),
            });
        }
        let signature = format!("sig-{}-{}", recipient, self.submissions.lock().unwrap().len());
        self.pending
            .lock()
            .unwrap()
            .insert(signature.clone(), (recipient.to_string(), lamports));
        Ok(signature)
    }

    async fn await_confirmation(&self, signature: &str) -> Result<(), TransferFailure> {
        let (recipient, lamports) = self
            .pending
            .lock()
            .unwrap()
            .remove(signature)
            .ok_or_else(|| TransferFailure::Rejected {
                signature: signature.to_string(),
                reason: "unknown signature".to_string(),
            })?;

        if self.never_confirm.contains(&recipient) {
            std::future::pending::<()>().await;
        }

        let mut balances = self.balances.lock().unwrap();
        let source = balances.entry(FEE_WALLET.to_string()).or_insert(0);
        *source = source.saturating_sub(lamports + NETWORK_FEE);
        *balances.entry(recipient).or_insert(0) += lamports;
        Ok(())
    }
}

// ─── Holder source ───

struct MemoryHolders {
    holders: Mutex<Option<Vec<Holder>>>,
    snapshots: AtomicUsize,
}

impl MemoryHolders {
    fn new(holders: Vec<Holder>) -> Self {
        Self {
            holders: Mutex::new(Some(holders)),
            snapshots: AtomicUsize::new(0),
        }
    }

    fn unavailable() -> Self {
        Self {
            holders: Mutex::new(None),
            snapshots: AtomicUsize::new(0),
        }
    }

    fn snapshots(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HolderSource for MemoryHolders {
    async fn snapshot(&self, _mint: &str) -> Result<Vec<Holder>, DistributorError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.holders
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DistributorError::SnapshotUnavailable {
                reason: "429 Too Many Requests".to_string(),
            })
    }
}

// ─── Helpers ───

fn holders(qualified: usize) -> Vec<Holder> {
    let mut list: Vec<Holder> = (0..qualified)
        .map(|i| Holder::new(format!("holder{:02}", i), 100.0 + 10.0 * i as f64))
        .collect();
    list.push(Holder::new(OPERATOR, 5_000_000.0));
    list.push(Holder::new(FEE_WALLET, 1_000.0));
    list.push(Holder::new("small_fry", 99.5));
    list
}

fn config(stats_path: PathBuf, winners: usize) -> DistributorConfig {
    DistributorConfig {
        rpc_url: "http://127.0.0.1:8899".to_string(),
        token_mint: "mint".to_string(),
        operator: OPERATOR.to_string(),
        fee_wallet: FEE_WALLET.to_string(),
        interval: Duration::from_secs(600),
        allocation: AllocationConfig {
            min_balance_to_process: 100_000_000,
            fee_per_transfer: 5_000_000,
            safety_buffer: 10_000_000,
            transfers_per_cycle: winners as u64,
            buckets: vec![
                Bucket::new("buyback", 50, BucketKind::Reserve),
                Bucket::new("airdrop", 50, BucketKind::Prize),
            ],
        },
        draw: DrawConfig {
            min_holder_balance: 100.0,
            min_pool_size: 10,
            winners_per_draw: winners,
        },
        confirmation_timeout: Duration::from_secs(60),
        disburse_concurrency: 1,
        stats_path,
        github: None,
    }
}

fn controller<'a>(
    config: &'a DistributorConfig,
    chain: &'a MemoryChain,
    source: &'a MemoryHolders,
) -> CycleController<'a> {
    CycleController::new(
        config,
        chain,
        source,
        LedgerStore::new(config.stats_path.clone()),
        StatisticsLedger::default(),
    )
}

// ─── Full cycle ───

#[tokio::test]
async fn test_one_sol_twelve_holders_pays_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("data/stats.json"), 1);
    let chain = MemoryChain::new(LAMPORTS_PER_SOL);
    let source = MemoryHolders::new(holders(12));

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    let CycleOutcome::Distributed { plan, results } = outcome else {
        panic!("expected a distribution");
    };
    assert_eq!(plan.reserve_for_fees, 15_000_000);
    assert_eq!(plan.part("buyback"), Some(492_500_000));
    assert_eq!(plan.part("airdrop"), Some(492_500_000));
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());

    let winner = &results[0].address;
    assert!(winner.starts_with("holder"));
    assert_eq!(chain.balance_of(winner), 492_500_000);
    // Buyback share and fee reserve stay behind
    assert_eq!(
        chain.balance_of(FEE_WALLET),
        LAMPORTS_PER_SOL - 492_500_000 - NETWORK_FEE
    );

    let ledger = controller.ledger();
    assert_eq!(ledger.total_cycles, 1);
    assert_eq!(ledger.total_winners, 1);
    assert_eq!(ledger.total_distributed, 492_500_000);
    assert_eq!(ledger.average_win, 492_500_000);
    assert_eq!(ledger.last_winner.as_deref(), Some(winner.as_str()));
    assert_eq!(ledger.recent_transfers.len(), 1);
    assert_eq!(controller.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn test_excluded_and_small_holders_never_win() {
    let dir = tempfile::tempdir().unwrap();
    // Draw everyone who qualifies
    let config = config(dir.path().join("stats.json"), 50);
    let chain = MemoryChain::new(10 * LAMPORTS_PER_SOL);
    let source = MemoryHolders::new(holders(12));

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    let CycleOutcome::Distributed { results, .. } = outcome else {
        panic!("expected a distribution");
    };
    assert_eq!(results.len(), 12);
    for result in &results {
        assert_ne!(result.address, OPERATOR);
        assert_ne!(result.address, FEE_WALLET);
        assert_ne!(result.address, "small_fry");
    }
    let unique: HashSet<&str> = results.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(unique.len(), 12);
}

// ─── Skips ───

#[tokio::test]
async fn test_below_gate_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 1);
    let chain = MemoryChain::new(99_999_999);
    let source = MemoryHolders::new(holders(12));

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::BelowMinimum { balance: 99_999_999 });
    assert_eq!(source.snapshots(), 0);
    assert!(chain.submissions().is_empty());
    assert_eq!(controller.ledger().total_cycles, 0);
    assert!(!config.stats_path.exists());
}

#[tokio::test]
async fn test_eight_holders_skips_draw_but_counts_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 1);
    let chain = MemoryChain::new(LAMPORTS_PER_SOL);
    let source = MemoryHolders::new(holders(8));

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    let CycleOutcome::DrawSkipped { plan, reason } = outcome else {
        panic!("expected a skipped draw");
    };
    assert_eq!(
        reason,
        SkipReason::NotEnoughHolders {
            eligible: 8,
            required: 10
        }
    );
    assert_eq!(plan.prize_amount(), 492_500_000);
    assert!(chain.submissions().is_empty());
    assert_eq!(chain.balance_of(FEE_WALLET), LAMPORTS_PER_SOL);

    let persisted = LedgerStore::new(config.stats_path.clone()).load().await;
    assert_eq!(persisted.total_cycles, 1);
    assert_eq!(persisted.total_winners, 0);
    assert_eq!(persisted.total_distributed, 0);
    assert_eq!(persisted.total_reserved, 492_500_000);
}

#[tokio::test]
async fn test_snapshot_outage_skips_draw() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 1);
    let chain = MemoryChain::new(LAMPORTS_PER_SOL);
    let source = MemoryHolders::unavailable();

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::DrawSkipped {
            reason: SkipReason::SnapshotUnavailable(_),
            ..
        }
    ));
    assert!(chain.submissions().is_empty());
    assert_eq!(controller.ledger().total_cycles, 1);
}

// ─── Failure isolation ───

#[tokio::test]
async fn test_partial_failures_only_count_confirmed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path().join("stats.json"), 5);
    // Five qualified holders and five winners, so every holder is drawn
    config.draw.min_pool_size = 5;
    let failing = ["holder01", "holder03", "holder04"];
    let chain = MemoryChain::new(LAMPORTS_PER_SOL).failing(&failing);
    let source = MemoryHolders::new(holders(5));

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    let CycleOutcome::Distributed { plan, results } = outcome else {
        panic!("expected a distribution");
    };
    // Reserve 5 * 0.005 + 0.01 SOL, half of the rest to the airdrop
    assert_eq!(plan.prize_amount(), 482_500_000);
    let share = 96_500_000;
    assert_eq!(results.len(), 5);
    assert_eq!(chain.submissions().len(), 5);
    assert!(results.iter().all(|r| r.amount == share));

    let mut confirmed: Vec<&str> = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.address.as_str())
        .collect();
    confirmed.sort();
    assert_eq!(confirmed, vec!["holder00", "holder02"]);
    for address in failing {
        assert_eq!(chain.balance_of(address), 0);
    }
    assert_eq!(
        chain.balance_of(FEE_WALLET),
        LAMPORTS_PER_SOL - 2 * (share + NETWORK_FEE)
    );

    let ledger = controller.ledger();
    assert_eq!(ledger.total_winners, 2);
    assert_eq!(ledger.total_distributed, 2 * share);
    assert_eq!(ledger.recent_transfers.len(), 2);
    assert_eq!(ledger.total_cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_confirmation_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 50);
    let chain = MemoryChain::new(10 * LAMPORTS_PER_SOL).stalling(&["holder03"]);
    let source = MemoryHolders::new(holders(12));

    let mut controller = controller(&config, &chain, &source);
    let outcome = controller.run_cycle().await.unwrap();

    let CycleOutcome::Distributed { results, .. } = outcome else {
        panic!("expected a distribution");
    };
    let stalled = results.iter().find(|r| r.address == "holder03").unwrap();
    assert!(matches!(
        stalled.outcome,
        Err(TransferFailure::Unconfirmed { waited_secs: 60, .. })
    ));
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 11);
    assert_eq!(controller.ledger().total_winners, 11);
}

// ─── Draw audit ───

#[tokio::test]
async fn test_draw_record_is_verifiable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 3);
    let chain = MemoryChain::new(LAMPORTS_PER_SOL);
    let snapshot = holders(12);
    let source = MemoryHolders::new(snapshot.clone());

    let mut controller = controller(&config, &chain, &source);
    controller.run_cycle().await.unwrap();
    let record = controller.ledger().last_draw.clone().unwrap();
    assert_eq!(record.pool_size, 12);
    assert_eq!(record.winners.len(), 3);

    // Rebuild the eligible pool and replay the draw from the stored seed
    let eligible = filter_eligible(&snapshot, 100.0, &config.excluded_addresses());
    let seed: [u8; 32] = hex::decode(&record.seed).unwrap().try_into().unwrap();
    let replay = draw_with_seed(&eligible, &config.draw, seed);
    assert_eq!(replay.record, record);

    // Each winner has an inclusion proof against the recorded root
    let root = record.snapshot_root.as_deref().unwrap();
    let leaves = snapshot_leaves(&eligible);
    let mut sorted: Vec<&str> = eligible.iter().map(|h| h.address.as_str()).collect();
    sorted.sort_unstable();
    for winner in &record.winners {
        let index = sorted.iter().position(|a| a == winner).unwrap();
        let leaf = compute_leaf_hash(winner, index as u64, index as u64 + 1);
        let proof: Vec<String> = merkle_proof(&leaves, index)
            .unwrap()
            .iter()
            .map(hex::encode)
            .collect();
        assert!(verify_merkle_proof(root, &proof, &leaf));
    }
}

// ─── Persistence ───

#[tokio::test]
async fn test_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 1);
    let chain = MemoryChain::new(LAMPORTS_PER_SOL);
    let source = MemoryHolders::new(holders(12));

    {
        let mut first = controller(&config, &chain, &source);
        first.run_cycle().await.unwrap();
    }

    chain.fund(FEE_WALLET, LAMPORTS_PER_SOL);
    let mut second = CycleController::load(
        &config,
        &chain,
        &source,
        LedgerStore::new(config.stats_path.clone()),
    )
    .await;
    assert_eq!(second.ledger().total_cycles, 1);
    second.run_cycle().await.unwrap();

    let ledger = LedgerStore::new(config.stats_path.clone()).load().await;
    assert_eq!(ledger.total_cycles, 2);
    assert_eq!(ledger.total_winners, 2);
    assert_eq!(ledger.recent_transfers.len(), 2);
    assert_eq!(
        ledger.total_distributed,
        ledger.recent_transfers.iter().map(|t| t.amount).sum::<u64>()
    );

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&config.stats_path).unwrap()).unwrap();
    assert_eq!(raw["total_cycles"], 2);
    assert!(raw["last_draw"]["seed"].is_string());
}

#[tokio::test]
async fn test_corrupt_ledger_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().join("stats.json"), 1);
    std::fs::write(&config.stats_path, "{\"total_cycles\": ").unwrap();
    let chain = MemoryChain::new(LAMPORTS_PER_SOL);
    let source = MemoryHolders::new(holders(12));

    let mut controller = CycleController::load(
        &config,
        &chain,
        &source,
        LedgerStore::new(config.stats_path.clone()),
    )
    .await;
    assert_eq!(controller.ledger(), &StatisticsLedger::default());

    controller.run_cycle().await.unwrap();
    let ledger = LedgerStore::new(config.stats_path.clone()).load().await;
    assert_eq!(ledger.total_cycles, 1);
}
