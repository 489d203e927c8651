//! Cumulative distribution statistics and their on-disk form.
//!
//! The ledger is a single JSON document. Writes go to a sibling temp file
//! that is then renamed over the target, so a crash mid-write leaves the
//! previous version intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::draw::DrawRecord;
use crate::error::DistributorError;

/// Transfers kept in `recent_transfers`, newest first.
pub const RECENT_TRANSFERS_CAPACITY: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub address: String,
    pub amount: u64,
    pub signature: String,
    pub at: DateTime<Utc>,
}

/// All amounts are lamports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsLedger {
    pub total_distributed: u64,
    /// Cumulative reserve-bucket amounts left in the wallet.
    pub total_reserved: u64,
    pub total_cycles: u64,
    /// Confirmed winner transfers.
    pub total_winners: u64,
    pub current_balance: u64,
    pub average_win: u64,
    pub last_winner: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub next_cycle_at: Option<DateTime<Utc>>,
    pub last_draw: Option<DrawRecord>,
    pub recent_transfers: Vec<TransferRecord>,
}

impl StatisticsLedger {
    pub fn record_balance_check(&mut self, balance: u64, at: DateTime<Utc>) {
        self.current_balance = balance;
        self.last_checked_at = Some(at);
    }

    pub fn record_reserved(&mut self, amount: u64) {
        self.total_reserved = self.total_reserved.saturating_add(amount);
    }

    pub fn record_draw(&mut self, draw: DrawRecord) {
        self.last_draw = Some(draw);
    }

    /// Count one confirmed winner transfer.
    pub fn record_transfer(&mut self, transfer: TransferRecord) {
        self.total_distributed = self.total_distributed.saturating_add(transfer.amount);
        self.total_winners += 1;
        self.average_win = self.total_distributed / self.total_winners;
        self.last_winner = Some(transfer.address.clone());

        self.recent_transfers.insert(0, transfer);
        self.recent_transfers.truncate(RECENT_TRANSFERS_CAPACITY);
    }

    pub fn record_cycle(&mut self, at: DateTime<Utc>, next_at: Option<DateTime<Utc>>) {
        self.total_cycles += 1;
        self.last_cycle_at = Some(at);
        self.next_cycle_at = next_at;
    }
}

pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the ledger, falling back to an empty one when the file is missing
    /// or unreadable.
    pub async fn load(&self) -> StatisticsLedger {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no stats file yet, starting fresh");
                return StatisticsLedger::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read stats file, starting fresh");
                return StatisticsLedger::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "stats file is corrupt, starting fresh");
                StatisticsLedger::default()
            }
        }
    }

    pub async fn save(&self, ledger: &StatisticsLedger) -> Result<(), DistributorError> {
        let fail = |reason: String| DistributorError::Persistence {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fail(e.to_string()))?;
        }

        let body = serde_json::to_vec_pretty(ledger).map_err(|e| fail(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| fail(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| fail(e.to_string()))
    }
}
