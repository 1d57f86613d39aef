//! Transaction submission
//!
//! ```text
//!   ┌──────────┐   ┌──────────┐   ┌─────────────┐
//!   │  sign    │──▶│   send   │──▶│ poll status │──▶ Confirmed / Rejected
//!   └──────────┘   └──────────┘   └─────────────┘
//!        ▲              │ transport error │ timeout
//!        │              ▼                 ▼
//!        │        ┌──────────────────────────────┐
//!        └────────│ backoff, check last signature │
//!     (blockhash  │ re-send same tx if still valid│
//!      expired)   └──────────────────────────────┘
//! ```
//!
//! Only transport failures and confirmation timeouts are retried. A
//! transaction the cluster has seen is never re-signed while its blockhash
//! can still land, so a retry cannot spend the same nullifiers twice. A
//! node answering the resend with `AlreadyProcessed` means an earlier send
//! landed, and the attempt goes on to poll its status.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use veil_config::{SubmissionConfig, VeilConfig};
use veil_prover::TransactionProof;

use crate::chain::rpc::{RpcChainClient, parse_commitment};
use crate::chain::{ChainClient, ChainError, TxStatus};
use crate::error::{Error, Rejection, Result};
use crate::instruction::{TransactInstruction, transact_instruction};
use crate::public_inputs::VerifierInputs;
use crate::transaction::ExtData;
use crate::verifier::Verifier;

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub compute_unit_limit: u32,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self::from(&SubmissionConfig::default())
    }
}

impl From<&SubmissionConfig> for SubmitterConfig {
    fn from(config: &SubmissionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            compute_unit_limit: config.compute_unit_limit,
        }
    }
}

impl SubmitterConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_ms.saturating_mul(factor))
    }
}

/// A transaction the verifier program accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub signature: Signature,
    pub slot: u64,
    pub attempts: u32,
}

enum AttemptError {
    /// Worth another attempt
    Transient(String),
    Rejected {
        signature: Option<Signature>,
        reason: Rejection,
    },
}

impl From<ChainError> for AttemptError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Transport(reason) => AttemptError::Transient(reason),
            ChainError::Rejected(tx_err) => AttemptError::Rejected {
                signature: None,
                reason: Rejection::from(tx_err),
            },
        }
    }
}

pub struct Submitter {
    client: Arc<dyn ChainClient>,
    payer: Arc<Keypair>,
    config: SubmitterConfig,
}

impl Submitter {
    pub fn new(client: Arc<dyn ChainClient>, payer: Arc<Keypair>, config: SubmitterConfig) -> Self {
        Self {
            client,
            payer,
            config,
        }
    }

    /// RPC-backed submitter from the global configuration
    pub fn from_config(config: &VeilConfig) -> anyhow::Result<Self> {
        let path = config
            .solana
            .payer_keypair_path
            .as_deref()
            .context("no payer keypair configured (VEIL_PAYER_KEYPAIR)")?;
        let payer = load_keypair(Path::new(path))?;
        let client = RpcChainClient::new(
            config.solana.rpc_url.clone(),
            parse_commitment(&config.solana.commitment),
        );
        info!(rpc = %config.solana.rpc_url, payer = %payer.pubkey(), "submitter initialized");
        Ok(Self::new(
            Arc::new(client),
            Arc::new(payer),
            SubmitterConfig::from(&config.submission),
        ))
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Compute budget plus the verifier instruction
    pub fn build_instructions(
        &self,
        verifier: &Verifier,
        proof: &TransactionProof,
        inputs: &VerifierInputs,
        ext_data: &ExtData,
    ) -> Vec<Instruction> {
        let transact = TransactInstruction {
            proof: *proof,
            inputs: inputs.clone(),
            ext_data: ext_data.clone(),
        };
        vec![
            ComputeBudgetInstruction::set_compute_unit_limit(self.config.compute_unit_limit),
            transact_instruction(verifier.program_id(), &self.payer.pubkey(), &transact),
        ]
    }

    /// Submit and wait for confirmation, retrying transport failures.
    pub async fn submit(
        &self,
        verifier: &Verifier,
        proof: &TransactionProof,
        inputs: &VerifierInputs,
        ext_data: &ExtData,
    ) -> Result<Confirmation> {
        let instructions = self.build_instructions(verifier, proof, inputs, ext_data);
        let mut pending: Option<Transaction> = None;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.attempt(&instructions, &mut pending).await {
                Ok((signature, slot)) => {
                    info!(
                        verifier = %verifier.kind(),
                        %signature,
                        slot,
                        attempt,
                        "transaction confirmed"
                    );
                    return Ok(Confirmation {
                        signature,
                        slot,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Rejected { signature, reason }) => {
                    warn!(verifier = %verifier.kind(), %reason, "transaction rejected");
                    return Err(Error::OnChainRejection { signature, reason });
                }
                Err(AttemptError::Transient(reason)) if attempt <= self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        verifier = %verifier.kind(),
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "submission failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(AttemptError::Transient(reason)) => {
                    return Err(Error::Submission {
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        instructions: &[Instruction],
        pending: &mut Option<Transaction>,
    ) -> std::result::Result<(Signature, u64), AttemptError> {
        if let Some(tx) = pending.as_ref() {
            let signature = tx.signatures.first().copied().unwrap_or_default();
            let blockhash = tx.message.recent_blockhash;
            let valid = self.call(move |c| c.is_blockhash_valid(&blockhash)).await?;
            // queried after the blockhash so a landing in between is seen
            if let Some(status) = self.call(move |c| c.signature_status(&signature)).await? {
                debug!(%signature, "previous attempt already processed");
                return settle(signature, status);
            }
            if valid {
                let tx = tx.clone();
                return self.send_and_confirm(tx).await;
            }
            debug!(%signature, "previous blockhash expired, signing again");
        }

        let blockhash = self.call(|c| c.latest_blockhash()).await?;
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.payer.pubkey()),
            &[self.payer.as_ref()],
            blockhash,
        );
        *pending = Some(tx.clone());
        self.send_and_confirm(tx).await
    }

    async fn send_and_confirm(
        &self,
        tx: Transaction,
    ) -> std::result::Result<(Signature, u64), AttemptError> {
        let signature = tx.signatures.first().copied().unwrap_or_default();
        match self.call(move |c| c.send_transaction(&tx)).await {
            Ok(_) => debug!(%signature, "transaction sent"),
            // an earlier send landed; its status may not be visible yet
            Err(ChainError::Rejected(TransactionError::AlreadyProcessed)) => {
                debug!(%signature, "transaction already processed, awaiting status");
            }
            Err(err) => return Err(err.into()),
        }
        self.wait_confirmation(signature).await
    }

    async fn wait_confirmation(
        &self,
        signature: Signature,
    ) -> std::result::Result<(Signature, u64), AttemptError> {
        let deadline = Instant::now() + self.config.confirm_timeout;
        loop {
            match self.call(move |c| c.signature_status(&signature)).await {
                Ok(Some(status)) => return settle(signature, status),
                Ok(None) => {}
                Err(ChainError::Transport(e)) => {
                    debug!(%signature, error = %e, "status poll failed")
                }
                Err(err) => return Err(err.into()),
            }
            if Instant::now() >= deadline {
                return Err(AttemptError::Transient(format!(
                    "confirmation of {signature} timed out after {:?}",
                    self.config.confirm_timeout
                )));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Run a blocking client call off the async runtime.
    async fn call<T, F>(&self, f: F) -> std::result::Result<T, ChainError>
    where
        F: FnOnce(&dyn ChainClient) -> std::result::Result<T, ChainError> + Send + 'static,
        T: Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(client.as_ref()))
            .await
            .map_err(|e| ChainError::Transport(format!("chain task failed: {e}")))?
    }
}

fn settle(
    signature: Signature,
    status: TxStatus,
) -> std::result::Result<(Signature, u64), AttemptError> {
    match status.result {
        Ok(()) => Ok((signature, status.slot)),
        Err(tx_err) => Err(AttemptError::Rejected {
            signature: Some(signature),
            reason: Rejection::from(tx_err),
        }),
    }
}

/// Read a Solana CLI keypair file (JSON byte array)
pub fn load_keypair(path: &Path) -> anyhow::Result<Keypair> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read keypair {}", path.display()))?;
    let bytes: Vec<u8> = serde_json::from_str(&contents)
        .with_context(|| format!("invalid keypair JSON in {}", path.display()))?;
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| anyhow::anyhow!("invalid keypair bytes in {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let config = SubmitterConfig {
            retry_base_ms: 100,
            ..SubmitterConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn test_config_from_file_section() {
        let section = SubmissionConfig {
            max_retries: 5,
            retry_base_ms: 10,
            confirm_timeout_secs: 2,
            poll_interval_ms: 20,
            compute_unit_limit: 300_000,
        };
        let config = SubmitterConfig::from(&section);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.confirm_timeout, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_keypair_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        std::fs::write(&path, json).unwrap();

        assert_eq!(load_keypair(&path).unwrap().pubkey(), keypair.pubkey());
        assert!(load_keypair(&dir.path().join("missing.json")).is_err());
    }
}
