use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistributorError {
    #[error("configuration error: {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("holder snapshot unavailable: {reason}")]
    SnapshotUnavailable { reason: String },

    #[error("balance {balance} below minimum to process {minimum} (lamports)")]
    BelowMinimumBalance { balance: u64, minimum: u64 },

    #[error("insufficient funds: balance {balance} does not cover fee reserve {reserve} (lamports)")]
    InsufficientFunds { balance: u64, reserve: u64 },

    #[error("rpc request {operation} failed: {reason}")]
    Rpc { operation: String, reason: String },

    #[error("failed to persist ledger to {path}: {reason}")]
    Persistence { path: String, reason: String },
}

impl DistributorError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        DistributorError::Configuration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rpc(operation: &str, reason: impl ToString) -> Self {
        DistributorError::Rpc {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single winner transfer did not land. Isolated per winner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferFailure {
    #[error("invalid recipient address {address}")]
    InvalidRecipient { address: String },

    #[error("submission failed: {reason}")]
    Submission { reason: String },

    #[error("transaction {signature} rejected: {reason}")]
    Rejected { signature: String, reason: String },

    #[error("transaction {signature} unconfirmed after {waited_secs}s")]
    Unconfirmed { signature: String, waited_secs: u64 },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote rejected ledger upload: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}
