//! Eligibility filtering and winner selection.
//!
//! A draw is reproducible from its seed and the holder snapshot: the
//! eligible pool is put in address order, then a ChaCha20 stream seeded with
//! the recorded seed drives a partial Fisher-Yates shuffle over it.

use std::collections::HashSet;

use brotherhood_common::{snapshot_root, Holder};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct DrawConfig {
    /// Token units a holder needs to be eligible.
    pub min_holder_balance: f64,
    /// Eligible holders required before a draw runs at all.
    pub min_pool_size: usize,
    pub winners_per_draw: usize,
}

/// Audit record of one draw, stored with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    /// Hex-encoded 32-byte ChaCha20 seed.
    pub seed: String,
    /// Merkle root over the address-sorted eligible pool.
    pub snapshot_root: Option<String>,
    pub pool_size: usize,
    pub winners: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DrawOutcome {
    pub record: DrawRecord,
    pub winners: Vec<Holder>,
}

/// Holders with at least `min_balance` tokens that are not excluded.
pub fn filter_eligible(
    holders: &[Holder],
    min_balance: f64,
    excluded: &HashSet<String>,
) -> Vec<Holder> {
    holders
        .iter()
        .filter(|h| h.balance >= min_balance && !excluded.contains(&h.address))
        .cloned()
        .collect()
}

/// Draw `min(requested, eligible.len())` distinct holders uniformly at random.
///
/// Returns an empty set when the pool is smaller than `min_pool_size`; the
/// caller treats that as insufficient participation and skips payout.
pub fn select_winners<R: Rng + ?Sized>(
    eligible: &[Holder],
    min_pool_size: usize,
    requested: usize,
    rng: &mut R,
) -> Vec<Holder> {
    if eligible.is_empty() || eligible.len() < min_pool_size {
        return Vec::new();
    }

    let count = requested.min(eligible.len());
    let mut pool = eligible.to_vec();
    let (chosen, _) = pool.partial_shuffle(rng, count);
    chosen.to_vec()
}

pub fn generate_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Run a draw over `eligible` with a fixed seed.
pub fn draw_with_seed(eligible: &[Holder], config: &DrawConfig, seed: [u8; 32]) -> DrawOutcome {
    let mut pool = eligible.to_vec();
    pool.sort_by(|a, b| a.address.cmp(&b.address));

    let mut rng = ChaCha20Rng::from_seed(seed);
    let winners = select_winners(&pool, config.min_pool_size, config.winners_per_draw, &mut rng);

    DrawOutcome {
        record: DrawRecord {
            seed: hex::encode(seed),
            snapshot_root: snapshot_root(&pool),
            pool_size: pool.len(),
            winners: winners.iter().map(|w| w.address.clone()).collect(),
        },
        winners,
    }
}

/// Run a draw with a fresh seed from the OS.
pub fn draw(eligible: &[Holder], config: &DrawConfig) -> DrawOutcome {
    draw_with_seed(eligible, config, generate_seed())
}
