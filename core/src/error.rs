//! Pipeline error taxonomy.
//!
//! Every failure a caller can observe while turning a transaction descriptor
//! into a confirmed on-chain transaction. Only [`Error::Submission`] is ever
//! retried; everything before it is deterministic and everything after it is
//! final.

use std::fmt;

use solana_sdk::signature::Signature;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;
use veil_privacy::FieldError;

use crate::chain::program::VerifierProgramError;
use crate::pipeline::IllegalTransition;
use crate::verifier::VerifierKind;

/// Pipeline stage at which a transaction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Assemble,
    Witness,
    Prove,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Assemble => "assemble",
            Stage::Witness => "witness",
            Stage::Prove => "prove",
            Stage::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// Why the verifier program (or the runtime in front of it) refused a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A verifier program check failed
    Program(VerifierProgramError),
    /// Runtime-level failure (bad signature, unknown program, ...)
    Transaction(TransactionError),
}

impl From<TransactionError> for Rejection {
    fn from(err: TransactionError) -> Self {
        match VerifierProgramError::from_transaction_error(&err) {
            Some(program) => Rejection::Program(program),
            None => Rejection::Transaction(err),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Program(e) => write!(f, "{e} (code {})", e.code()),
            Rejection::Transaction(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Public data is internally inconsistent or does not match the verifier
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    /// A value does not fit the circuit field
    #[error("cannot encode {field}: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: FieldError,
    },

    /// No verifier variant accepts this input/output arity
    #[error("no verifier supports {inputs} inputs, {outputs} outputs (cpi: {cpi})")]
    UnsupportedShape {
        inputs: usize,
        outputs: usize,
        cpi: bool,
    },

    /// The witness routine failed or the inputs do not satisfy the circuit
    #[error("witness generation failed for {verifier}: {reason}")]
    WitnessGeneration { verifier: VerifierKind, reason: String },

    /// Witness artifact missing or unreadable
    #[error("{verifier} circuit artifact unavailable at {location}: {reason}")]
    ResourceUnavailable {
        verifier: VerifierKind,
        location: String,
        reason: String,
    },

    /// Proving key missing or unreadable
    #[error("{verifier} proving key unavailable at {location}: {reason}")]
    ProvingKeyUnavailable {
        verifier: VerifierKind,
        location: String,
        reason: String,
    },

    #[error("proof generation failed for {verifier}: {reason}")]
    ProofGeneration { verifier: VerifierKind, reason: String },

    /// Network failure or confirmation timeout, after retries were exhausted
    #[error("submission failed after {attempts} attempt(s): {reason}")]
    Submission { attempts: u32, reason: String },

    /// The verifier program refused the transaction
    #[error("transaction rejected on-chain: {reason}")]
    OnChainRejection {
        signature: Option<Signature>,
        reason: Rejection,
    },

    #[error("transaction abandoned before submission")]
    Cancelled,

    /// The lifecycle does not allow this step, e.g. submitting twice
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl Error {
    pub fn encoding(field: &'static str) -> impl FnOnce(FieldError) -> Self {
        move |source| Error::Encoding { field, source }
    }

    /// Only transport-level submission failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Submission { .. })
    }

    /// Stage this error belongs to, `None` for cancellation and misuse
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::UnsupportedShape { .. } => Some(Stage::Resolve),
            Error::MalformedTransaction(_) | Error::Encoding { .. } => Some(Stage::Assemble),
            Error::WitnessGeneration { .. } | Error::ResourceUnavailable { .. } => {
                Some(Stage::Witness)
            }
            Error::ProvingKeyUnavailable { .. } | Error::ProofGeneration { .. } => {
                Some(Stage::Prove)
            }
            Error::Submission { .. } | Error::OnChainRejection { .. } => Some(Stage::Submit),
            Error::Cancelled | Error::IllegalTransition(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TxState;
    use solana_sdk::instruction::InstructionError;

    #[test]
    fn test_only_submission_is_retryable() {
        let retryable = Error::Submission {
            attempts: 1,
            reason: "connection reset".into(),
        };
        assert!(retryable.is_retryable());

        let final_errors = [
            Error::MalformedTransaction("dup".into()),
            Error::UnsupportedShape {
                inputs: 3,
                outputs: 2,
                cpi: false,
            },
            Error::ProofGeneration {
                verifier: VerifierKind::Zero,
                reason: "x".into(),
            },
            Error::OnChainRejection {
                signature: None,
                reason: Rejection::Program(VerifierProgramError::InvalidProof),
            },
            Error::Cancelled,
            Error::IllegalTransition(IllegalTransition {
                from: TxState::Confirmed,
                to: TxState::Submitted,
            }),
        ];
        assert!(final_errors.iter().all(|e| !e.is_retryable()));
    }

    #[test]
    fn test_program_errors_are_decoded() {
        let err = TransactionError::InstructionError(
            1,
            InstructionError::Custom(VerifierProgramError::NullifierAlreadySpent.code()),
        );
        assert_eq!(
            Rejection::from(err),
            Rejection::Program(VerifierProgramError::NullifierAlreadySpent)
        );

        let runtime = Rejection::from(TransactionError::BlockhashNotFound);
        assert_eq!(
            runtime,
            Rejection::Transaction(TransactionError::BlockhashNotFound)
        );
    }

    #[test]
    fn test_stage_mapping() {
        let err = Error::ResourceUnavailable {
            verifier: VerifierKind::Two,
            location: "a".into(),
            reason: "b".into(),
        };
        assert_eq!(err.stage(), Some(Stage::Witness));
        assert_eq!(Error::Cancelled.stage(), None);

        let misuse = Error::from(IllegalTransition {
            from: TxState::Built,
            to: TxState::Submitted,
        });
        assert_eq!(misuse.stage(), None);
        assert!(misuse.to_string().contains("illegal transition"));
        assert!(err.to_string().contains("verifier_two"));
    }
}
