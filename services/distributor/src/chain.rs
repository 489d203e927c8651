//! Seams to the network. The cycle engine only sees these traits; the
//! Solana and Helius implementations live in [`crate::solana`] and
//! [`crate::helius`].

use async_trait::async_trait;
use brotherhood_common::Holder;

use crate::error::{DistributorError, TransferFailure};

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance of `address`, in lamports.
    async fn balance(&self, address: &str) -> Result<u64, DistributorError>;

    /// Sign and submit a single-recipient transfer from the operator wallet.
    /// Returns the transaction signature without waiting for confirmation.
    async fn submit_transfer(&self, recipient: &str, lamports: u64)
        -> Result<String, TransferFailure>;

    /// Resolve once `signature` is confirmed, or fail if the network rejected
    /// it. May wait indefinitely; callers bound it with a timeout.
    async fn await_confirmation(&self, signature: &str) -> Result<(), TransferFailure>;
}

#[async_trait]
pub trait HolderSource: Send + Sync {
    /// Every wallet with a non-zero balance of `mint`.
    async fn snapshot(&self, mint: &str) -> Result<Vec<Holder>, DistributorError>;
}
