//! Solana RPC client

use std::time::Duration;

use solana_client::client_error::ClientError;
use solana_client::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use super::{ChainClient, ChainError, TxStatus};

pub struct RpcChainClient {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcChainClient {
    pub fn new(rpc_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.into(), commitment),
            commitment,
        }
    }

    pub fn with_timeout(
        rpc_url: impl Into<String>,
        commitment: CommitmentConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(rpc_url.into(), timeout, commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

/// Parse a commitment level name, defaulting to `confirmed`.
pub fn parse_commitment(level: &str) -> CommitmentConfig {
    match level {
        "processed" => CommitmentConfig::processed(),
        "finalized" => CommitmentConfig::finalized(),
        "confirmed" => CommitmentConfig::confirmed(),
        other => {
            tracing::warn!(commitment = other, "unknown commitment level, using confirmed");
            CommitmentConfig::confirmed()
        }
    }
}

fn map_client_error(err: ClientError) -> ChainError {
    match err.get_transaction_error() {
        Some(tx_err) => ChainError::Rejected(tx_err),
        None => ChainError::Transport(err.to_string()),
    }
}

impl ChainClient for RpcChainClient {
    fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        self.rpc.get_latest_blockhash().map_err(map_client_error)
    }

    fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, ChainError> {
        self.rpc
            .is_blockhash_valid(blockhash, self.commitment)
            .map_err(map_client_error)
    }

    fn send_transaction(&self, tx: &Transaction) -> Result<Signature, ChainError> {
        self.rpc.send_transaction(tx).map_err(map_client_error)
    }

    fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError> {
        let status = self
            .rpc
            .get_signature_status_with_commitment(signature, self.commitment)
            .map_err(map_client_error)?;
        let Some(result) = status else {
            return Ok(None);
        };
        let slot = self
            .rpc
            .get_slot_with_commitment(self.commitment)
            .map_err(map_client_error)?;
        Ok(Some(TxStatus { slot, result }))
    }
}
