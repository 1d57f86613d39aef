//! Shielded transaction pipeline
//!
//! ```text
//!  Built ──▶ Assembled ──▶ WitnessGenerated ──▶ Proved ──▶ Submitted ──▶ Confirmed
//!    │           │               │                 │  ▲         │
//!    ▼           ▼               ▼                 ▼  │         ├──▶ Rejected
//!  Failed     Failed          Failed          Cancelled│         │
//!  (resolve,  (witness)       (prove)                  └─────────┴──▶ SubmissionFailed
//!   assemble)
//! ```
//!
//! Assembly, witness generation and proving are deterministic and run once.
//! Submission may be repeated from `Proved`. Witness generation and proving
//! are CPU-bound and run on the blocking pool.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use veil_prover::{TransactionProof, Witness};

use crate::error::{Error, Result, Stage};
use crate::public_inputs::VerifierInputs;
use crate::submitter::{Confirmation, Submitter};
use crate::transaction::{ExtData, TransactionDescriptor};
use crate::verifier::{Verifier, VerifierRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Built,
    Assembled,
    WitnessGenerated,
    Proved,
    Submitted,
    Confirmed,
    Rejected,
    SubmissionFailed,
    Failed(Stage),
    Cancelled,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxState::Confirmed | TxState::Rejected | TxState::Failed(_) | TxState::Cancelled
        )
    }

    fn can_transition_to(self, next: TxState) -> bool {
        use TxState::*;
        match (self, next) {
            (Built, Assembled) => true,
            (Built, Failed(Stage::Resolve | Stage::Assemble)) => true,
            (Assembled, WitnessGenerated) => true,
            (Assembled, Failed(Stage::Witness)) => true,
            (WitnessGenerated, Proved) => true,
            (WitnessGenerated, Failed(Stage::Prove)) => true,
            (Proved, Submitted) => true,
            (Submitted, Confirmed | Rejected | SubmissionFailed) => true,
            (SubmissionFailed, Proved) => true,
            (Built | Assembled | WitnessGenerated | Proved, Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: TxState,
    pub to: TxState,
}

/// States a transaction has passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    history: Vec<TxState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![TxState::Built],
        }
    }

    pub fn current(&self) -> TxState {
        // history always holds Built
        self.history.last().copied().unwrap_or(TxState::Built)
    }

    pub fn history(&self) -> &[TxState] {
        &self.history
    }

    pub fn advance(&mut self, next: TxState) -> std::result::Result<(), IllegalTransition> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(IllegalTransition { from, to: next });
        }
        self.history.push(next);
        Ok(())
    }

    /// Record the state an error leaves the transaction in
    fn record_failure(&mut self, err: &Error) {
        let next = match err {
            Error::Cancelled => TxState::Cancelled,
            Error::OnChainRejection { .. } => TxState::Rejected,
            Error::Submission { .. } => TxState::SubmissionFailed,
            other => match other.stage() {
                Some(stage) => TxState::Failed(stage),
                None => return,
            },
        };
        if let Err(e) = self.advance(next) {
            warn!(error = %e, "failure not recorded");
        }
    }
}

/// Output of the deterministic stages, ready for (re)submission
#[derive(Debug, Clone)]
pub struct ProvedTransaction {
    pub verifier: Arc<Verifier>,
    pub inputs: VerifierInputs,
    pub proof: TransactionProof,
    pub ext_data: ExtData,
}

/// Result of [`Pipeline::execute`]
#[derive(Debug)]
pub struct Execution {
    pub lifecycle: Lifecycle,
    pub proved: Option<ProvedTransaction>,
    pub outcome: Result<Confirmation>,
}

pub struct Pipeline {
    registry: Arc<VerifierRegistry>,
    submitter: Submitter,
}

impl Pipeline {
    pub fn new(registry: Arc<VerifierRegistry>, submitter: Submitter) -> Self {
        Self { registry, submitter }
    }

    pub fn registry(&self) -> &Arc<VerifierRegistry> {
        &self.registry
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Resolve, assemble, prove and submit `tx`.
    pub async fn send_transaction(&self, tx: TransactionDescriptor) -> Result<Confirmation> {
        self.execute(tx, CancellationToken::new()).await.outcome
    }

    /// Like [`Pipeline::send_transaction`] with a caller-chosen verifier.
    pub async fn send_with_verifier(
        &self,
        verifier: Arc<Verifier>,
        tx: TransactionDescriptor,
    ) -> Result<Confirmation> {
        let mut lifecycle = Lifecycle::new();
        let cancel = CancellationToken::new();
        let proved = self.prove_with(verifier, tx, &mut lifecycle, &cancel).await?;
        self.submit(&proved, &mut lifecycle).await
    }

    /// Full run that also reports the lifecycle and the proved transaction.
    pub async fn execute(&self, tx: TransactionDescriptor, cancel: CancellationToken) -> Execution {
        let mut lifecycle = Lifecycle::new();
        let proved = match self.prepare(tx, &mut lifecycle, &cancel).await {
            Ok(proved) => proved,
            Err(e) => {
                return Execution {
                    lifecycle,
                    proved: None,
                    outcome: Err(e),
                };
            }
        };
        let outcome = self.submit(&proved, &mut lifecycle).await;
        Execution {
            lifecycle,
            proved: Some(proved),
            outcome,
        }
    }

    /// Run the deterministic stages up to `Proved`.
    pub async fn prepare(
        &self,
        tx: TransactionDescriptor,
        lifecycle: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<ProvedTransaction> {
        let shape = tx.shape();
        let verifier = match self.registry.resolve_shape(shape) {
            Ok(verifier) => verifier,
            Err(e) => {
                lifecycle.record_failure(&e);
                return Err(e);
            }
        };
        self.prove_with(verifier, tx, lifecycle, cancel).await
    }

    async fn prove_with(
        &self,
        verifier: Arc<Verifier>,
        tx: TransactionDescriptor,
        lifecycle: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<ProvedTransaction> {
        let result = self.run_stages(verifier, tx, lifecycle, cancel).await;
        if let Err(e) = &result {
            lifecycle.record_failure(e);
        }
        result
    }

    async fn run_stages(
        &self,
        verifier: Arc<Verifier>,
        tx: TransactionDescriptor,
        lifecycle: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<ProvedTransaction> {
        let kind = verifier.kind();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let inputs = verifier.assemble(&tx)?;
        advance(lifecycle, TxState::Assembled);
        debug!(verifier = %kind, "public inputs assembled");

        let witness = {
            let verifier = Arc::clone(&verifier);
            let inputs = inputs.clone();
            let private = tx.private;
            run_blocking(cancel, move || verifier.calculate_wtns(&private, &inputs), |reason| {
                Error::WitnessGeneration {
                    verifier: kind,
                    reason,
                }
            })
            .await?
        };
        check_public_signals(&verifier, &witness, &inputs)?;
        advance(lifecycle, TxState::WitnessGenerated);

        let proof = {
            let verifier = Arc::clone(&verifier);
            run_blocking(cancel, move || verifier.prove(&witness), |reason| {
                Error::ProofGeneration {
                    verifier: kind,
                    reason,
                }
            })
            .await?
        };
        advance(lifecycle, TxState::Proved);
        info!(verifier = %kind, "transaction proved");

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        Ok(ProvedTransaction {
            verifier,
            inputs,
            proof,
            ext_data: tx.ext_data,
        })
    }

    /// Submit a proved transaction. May be called again after a
    /// `SubmissionFailed` outcome.
    pub async fn submit(
        &self,
        proved: &ProvedTransaction,
        lifecycle: &mut Lifecycle,
    ) -> Result<Confirmation> {
        if lifecycle.current() == TxState::SubmissionFailed {
            advance(lifecycle, TxState::Proved);
        }
        lifecycle.advance(TxState::Submitted)?;

        let result = self
            .submitter
            .submit(&proved.verifier, &proved.proof, &proved.inputs, &proved.ext_data)
            .await;
        match &result {
            Ok(_) => advance(lifecycle, TxState::Confirmed),
            Err(e) => lifecycle.record_failure(e),
        }
        result
    }
}

fn advance(lifecycle: &mut Lifecycle, next: TxState) {
    if let Err(e) = lifecycle.advance(next) {
        warn!(error = %e, "unexpected pipeline transition");
    }
}

/// The witness must expose exactly the inputs that were assembled.
fn check_public_signals(
    verifier: &Verifier,
    witness: &Witness,
    inputs: &VerifierInputs,
) -> Result<()> {
    let parsed = verifier
        .parse_public_inputs_from_array(&witness.public_signals())
        .map_err(|e| Error::WitnessGeneration {
            verifier: verifier.kind(),
            reason: format!("unreadable public signals: {e}"),
        })?;
    if parsed != *inputs {
        return Err(Error::WitnessGeneration {
            verifier: verifier.kind(),
            reason: "witness public signals differ from the assembled inputs".into(),
        });
    }
    Ok(())
}

/// Run CPU-bound work on the blocking pool, abandoning it on cancellation.
async fn run_blocking<T, F, E>(cancel: &CancellationToken, work: F, on_panic: E) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
    E: FnOnce(String) -> Error,
{
    let handle = tokio::task::spawn_blocking(work);
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        joined = handle => joined.map_err(|e| on_panic(format!("task failed: {e}")))?,
    }
}
