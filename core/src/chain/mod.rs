//! Chain access
//!
//! [`ChainClient`] is the blocking surface the submitter needs from a
//! cluster. [`rpc::RpcChainClient`] talks to a Solana RPC node;
//! [`local::LocalChain`] executes the verifier program in-process for tests
//! and local development.

pub mod local;
pub mod program;
pub mod rpc;

use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use thiserror::Error;

pub use local::LocalChain;
pub use program::{ShieldedPool, VerifierProgramError};
pub use rpc::RpcChainClient;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChainError {
    /// The request may or may not have reached the cluster
    #[error("transport error: {0}")]
    Transport(String),

    /// The cluster refused the transaction
    #[error("transaction rejected: {0}")]
    Rejected(TransactionError),
}

/// Outcome of a processed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxStatus {
    pub slot: u64,
    pub result: Result<(), TransactionError>,
}

pub trait ChainClient: Send + Sync {
    fn latest_blockhash(&self) -> Result<Hash, ChainError>;

    /// Whether a transaction signed with `blockhash` can still land
    fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, ChainError>;

    fn send_transaction(&self, tx: &Transaction) -> Result<Signature, ChainError>;

    /// `None` while the signature is unknown to the cluster
    fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError>;
}
