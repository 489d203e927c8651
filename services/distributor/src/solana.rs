use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tracing::debug;

use crate::chain::ChainClient;
use crate::error::{DistributorError, TransferFailure};

const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Decode the operator keypair from its base58 secret key.
pub fn parse_keypair(secret: &str) -> Result<Keypair, DistributorError> {
    let bytes = bs58::decode(secret.trim()).into_vec().map_err(|e| {
        DistributorError::config(
            "CREATOR_WALLET_PRIVATE_KEY",
            format!("not valid base58: {}", e),
        )
    })?;
    Keypair::from_bytes(&bytes).map_err(|e| {
        DistributorError::config(
            "CREATOR_WALLET_PRIVATE_KEY",
            format!("not a 64-byte keypair: {}", e),
        )
    })
}

/// Native SOL transfers signed by the operator keypair.
pub struct SolanaChain {
    rpc: RpcClient,
    payer: Keypair,
}

impl SolanaChain {
    pub fn new(rpc_url: String, payer: Keypair) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()),
            payer,
        }
    }
}

#[async_trait]
impl ChainClient for SolanaChain {
    async fn balance(&self, address: &str) -> Result<u64, DistributorError> {
        let pubkey =
            Pubkey::from_str(address).map_err(|e| DistributorError::rpc("getBalance", e))?;
        self.rpc
            .get_balance(&pubkey)
            .await
            .map_err(|e| DistributorError::rpc("getBalance", e))
    }

    async fn submit_transfer(
        &self,
        recipient: &str,
        lamports: u64,
    ) -> Result<String, TransferFailure> {
        let to = Pubkey::from_str(recipient).map_err(|_| TransferFailure::InvalidRecipient {
            address: recipient.to_string(),
        })?;

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| TransferFailure::Submission {
                reason: format!("getLatestBlockhash: {}", e),
            })?;

        let payer = self.payer.pubkey();
        let instruction = system_instruction::transfer(&payer, &to, lamports);
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&payer),
            &[&self.payer],
            blockhash,
        );

        // Preflight simulation rejects transfers the wallet can no longer cover.
        let signature = self
            .rpc
            .send_transaction(&transaction)
            .await
            .map_err(|e| TransferFailure::Submission {
                reason: e.to_string(),
            })?;
        Ok(signature.to_string())
    }

    async fn await_confirmation(&self, signature: &str) -> Result<(), TransferFailure> {
        let parsed = Signature::from_str(signature).map_err(|e| TransferFailure::Rejected {
            signature: signature.to_string(),
            reason: format!("malformed signature: {}", e),
        })?;

        loop {
            match self.rpc.get_signature_status(&parsed).await {
                Ok(Some(Ok(()))) => return Ok(()),
                Ok(Some(Err(err))) => {
                    return Err(TransferFailure::Rejected {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    })
                }
                Ok(None) => {}
                Err(e) => debug!(%signature, error = %e, "signature status poll failed, retrying"),
            }
            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }
}
