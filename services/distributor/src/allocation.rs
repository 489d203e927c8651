//! Splitting a fluctuating fee balance into a fee reserve and named buckets.
//!
//! Everything is integer lamports. Each bucket is `spendable * percent / 100`
//! rounded down; whatever the floor drops, plus any percentage left
//! unassigned, simply stays in the source wallet.

use serde::{Deserialize, Serialize};

use crate::error::DistributorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    /// Bookkeeping only; the amount stays in the wallet for manual use.
    Reserve,
    /// Paid out to the winners of the draw.
    Prize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub percent: u8,
    pub kind: BucketKind,
}

impl Bucket {
    pub fn new(name: &str, percent: u8, kind: BucketKind) -> Self {
        Self {
            name: name.to_string(),
            percent,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationConfig {
    /// Gate checked before anything else in a cycle.
    pub min_balance_to_process: u64,
    /// Estimated network cost of one winner transfer.
    pub fee_per_transfer: u64,
    pub safety_buffer: u64,
    /// Transfers the fee reserve must cover (the configured draw size).
    pub transfers_per_cycle: u64,
    pub buckets: Vec<Bucket>,
}

impl AllocationConfig {
    pub fn reserve_for_fees(&self) -> u64 {
        self.fee_per_transfer
            .saturating_mul(self.transfers_per_cycle)
            .saturating_add(self.safety_buffer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAllocation {
    pub name: String,
    pub kind: BucketKind,
    pub percent: u8,
    pub amount: u64,
}

/// One cycle's split of the fee balance.
///
/// # Invariants
///
/// - `reserve_for_fees + spendable == total_balance`
/// - `sum(parts) <= spendable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub total_balance: u64,
    pub reserve_for_fees: u64,
    pub spendable: u64,
    pub parts: Vec<BucketAllocation>,
}

impl AllocationPlan {
    pub fn part(&self, name: &str) -> Option<u64> {
        self.parts.iter().find(|p| p.name == name).map(|p| p.amount)
    }

    /// Amount the draw winners share.
    pub fn prize_amount(&self) -> u64 {
        self.sum_of(BucketKind::Prize)
    }

    /// Amount kept in the wallet for manual use.
    pub fn reserved_amount(&self) -> u64 {
        self.sum_of(BucketKind::Reserve)
    }

    pub fn allocated(&self) -> u64 {
        self.parts.iter().map(|p| p.amount).sum()
    }

    pub fn unallocated(&self) -> u64 {
        self.spendable.saturating_sub(self.allocated())
    }

    fn sum_of(&self, kind: BucketKind) -> u64 {
        self.parts
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.amount)
            .sum()
    }
}

pub fn check_minimum_balance(
    total_balance: u64,
    config: &AllocationConfig,
) -> Result<(), DistributorError> {
    if total_balance < config.min_balance_to_process {
        return Err(DistributorError::BelowMinimumBalance {
            balance: total_balance,
            minimum: config.min_balance_to_process,
        });
    }
    Ok(())
}

/// Compute the allocation plan for `total_balance` lamports.
///
/// Fails with `BelowMinimumBalance` under the processing gate and with
/// `InsufficientFunds` when the fee reserve leaves nothing to spend.
pub fn allocate(
    total_balance: u64,
    config: &AllocationConfig,
) -> Result<AllocationPlan, DistributorError> {
    check_minimum_balance(total_balance, config)?;

    let reserve_for_fees = config.reserve_for_fees();
    if total_balance <= reserve_for_fees {
        return Err(DistributorError::InsufficientFunds {
            balance: total_balance,
            reserve: reserve_for_fees,
        });
    }
    let spendable = total_balance - reserve_for_fees;

    let parts = config
        .buckets
        .iter()
        .map(|bucket| BucketAllocation {
            name: bucket.name.clone(),
            kind: bucket.kind,
            percent: bucket.percent,
            amount: (spendable as u128 * bucket.percent as u128 / 100) as u64,
        })
        .collect();

    Ok(AllocationPlan {
        total_balance,
        reserve_for_fees,
        spendable,
        parts,
    })
}
