//! Paying the draw winners.
//!
//! Each winner gets an independent submit-then-confirm sequence. One
//! winner's failure never stops or rolls back another's transfer; the
//! caller gets an outcome for every winner that was attempted.

use std::time::Duration;

use brotherhood_common::{lamports_to_sol, Holder};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::chain::ChainClient;
use crate::error::TransferFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisbursementResult {
    pub address: String,
    pub amount: u64,
    /// Confirmed signature, or why the transfer did not land.
    pub outcome: Result<String, TransferFailure>,
}

impl DisbursementResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn signature(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DisburseOptions {
    pub confirmation_timeout: Duration,
    /// Transfers allowed in flight at once; 1 means strictly sequential.
    pub concurrency: usize,
}

pub fn amount_per_winner(amount: u64, winners: usize) -> u64 {
    if winners == 0 {
        return 0;
    }
    amount / winners as u64
}

pub fn explorer_url(signature: &str) -> String {
    format!("https://solscan.io/tx/{}", signature)
}

/// Split `amount` evenly across `winners` and transfer each share.
///
/// Results come back in winner order regardless of concurrency.
pub async fn disburse<C: ChainClient + ?Sized>(
    chain: &C,
    amount: u64,
    winners: &[Holder],
    options: DisburseOptions,
) -> Vec<DisbursementResult> {
    let share = amount_per_winner(amount, winners.len());
    if share == 0 {
        if !winners.is_empty() {
            warn!(amount, winners = winners.len(), "prize too small to split, no transfers sent");
        }
        return Vec::new();
    }

    stream::iter(winners)
        .map(|winner| pay_winner(chain, &winner.address, share, options.confirmation_timeout))
        .buffered(options.concurrency.max(1))
        .collect()
        .await
}

async fn pay_winner<C: ChainClient + ?Sized>(
    chain: &C,
    address: &str,
    lamports: u64,
    timeout: Duration,
) -> DisbursementResult {
    let outcome = send_and_confirm(chain, address, lamports, timeout).await;
    match &outcome {
        Ok(signature) => info!(
            winner = %address,
            amount_sol = lamports_to_sol(lamports),
            %signature,
            explorer = %explorer_url(signature),
            "airdrop sent"
        ),
        Err(failure) => error!(
            winner = %address,
            amount_sol = lamports_to_sol(lamports),
            error = %failure,
            "airdrop failed"
        ),
    }
    DisbursementResult {
        address: address.to_string(),
        amount: lamports,
        outcome,
    }
}

async fn send_and_confirm<C: ChainClient + ?Sized>(
    chain: &C,
    address: &str,
    lamports: u64,
    timeout: Duration,
) -> Result<String, TransferFailure> {
    let signature = chain.submit_transfer(address, lamports).await?;
    match tokio::time::timeout(timeout, chain.await_confirmation(&signature)).await {
        Ok(Ok(())) => Ok(signature),
        Ok(Err(failure)) => Err(failure),
        // The transfer may still land later; it is reported, never retried.
        Err(_) => Err(TransferFailure::Unconfirmed {
            signature,
            waited_secs: timeout.as_secs(),
        }),
    }
}
