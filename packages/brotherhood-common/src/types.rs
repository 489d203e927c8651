use serde::{Deserialize, Serialize};

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// A wallet owning a non-zero balance of the tracked token.
/// Rebuilt from every holder snapshot, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holder {
    pub address: String,
    /// Whole token units (raw amount scaled down by the mint decimals).
    pub balance: f64,
}

impl Holder {
    pub fn new(address: impl Into<String>, balance: f64) -> Self {
        Self {
            address: address.into(),
            balance,
        }
    }
}

/// Convert a SOL amount (as written in configuration) to lamports.
///
/// Rounds to the nearest lamport so that decimal inputs like `0.57` do not
/// lose a lamport to binary float representation. Negative, NaN and
/// infinite inputs map to zero.
pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Convert lamports to SOL for display.
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
