//! Verifier variants
//!
//! ```text
//! ┌───────────────┬────────┬─────────┬──────────────────────────────┐
//! │ Variant       │ Inputs │ Outputs │ Public input record          │
//! ├───────────────┼────────┼─────────┼──────────────────────────────┤
//! │ verifier_zero │   2    │    2    │ PublicInputs                 │
//! │ verifier_one  │  10    │    2    │ PublicInputs                 │
//! │ verifier_two  │   4    │    4    │ PublicInputsCpi (+ CPI data) │
//! └───────────────┴────────┴─────────┴──────────────────────────────┘
//! ```
//!
//! A [`Verifier`] bundles the variant's arity with its circuit artifacts and
//! on-chain program id. Artifacts that failed to load are kept as
//! [`Resource::Unavailable`] so the failure surfaces on first use instead of
//! at registry construction.

pub mod registry;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ark_bn254::Bn254;
use ark_groth16::VerifyingKey;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use veil_privacy::FieldElement;
use veil_prover::{
    CircuitShape, Groth16Prover, PrivateInputs, ProverError, TransactionProof, Witness,
    WitnessCalculator,
};

use crate::error::{Error, Result};
use crate::public_inputs::{self, VerifierInputs};
use crate::transaction::TransactionDescriptor;

pub use registry::{RegistrySettings, VerifierRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerifierKind {
    Zero,
    One,
    Two,
}

/// Fixed arity of a verifier variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerifierConfig {
    pub ins: usize,
    pub outs: usize,
}

impl VerifierKind {
    pub const ALL: [VerifierKind; 3] = [VerifierKind::Zero, VerifierKind::One, VerifierKind::Two];

    pub fn config(self) -> VerifierConfig {
        match self {
            VerifierKind::Zero => VerifierConfig { ins: 2, outs: 2 },
            VerifierKind::One => VerifierConfig { ins: 10, outs: 2 },
            VerifierKind::Two => VerifierConfig { ins: 4, outs: 4 },
        }
    }

    /// Whether the variant carries the cross-program-invocation extension
    pub fn supports_cpi(self) -> bool {
        matches!(self, VerifierKind::Two)
    }

    /// Artifact base name
    pub fn name(self) -> &'static str {
        match self {
            VerifierKind::Zero => "verifier_zero",
            VerifierKind::One => "verifier_one",
            VerifierKind::Two => "verifier_two",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn circuit_shape(self, tree_height: usize) -> CircuitShape {
        let config = self.config();
        CircuitShape::new(config.ins, config.outs, self.supports_cpi(), tree_height)
    }

    /// Length of the flat public input array
    pub fn public_input_count(self) -> usize {
        // tree height does not change the public arity
        self.circuit_shape(0).public_input_count()
    }
}

impl fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VerifierKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "zero" | "0" | "verifier_zero" => Ok(VerifierKind::Zero),
            "one" | "1" | "verifier_one" => Ok(VerifierKind::One),
            "two" | "2" | "verifier_two" => Ok(VerifierKind::Two),
            other => Err(format!("unknown verifier variant: {other}")),
        }
    }
}

/// A lazily failing handle on a loaded artifact
#[derive(Clone)]
pub enum Resource<T> {
    Loaded(T),
    Unavailable { location: String, reason: String },
}

impl<T> Resource<T> {
    pub fn unavailable(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Resource::Unavailable {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Resource::Loaded(_))
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Loaded(_) => f.write_str("Loaded"),
            Resource::Unavailable { location, reason } => f
                .debug_struct("Unavailable")
                .field("location", location)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// One verifier variant with its artifacts and on-chain program
#[derive(Debug)]
pub struct Verifier {
    kind: VerifierKind,
    program_id: Pubkey,
    shape: CircuitShape,
    witness: Resource<Arc<dyn WitnessCalculator>>,
    prover: Resource<Arc<Groth16Prover>>,
}

impl Verifier {
    pub fn new(
        kind: VerifierKind,
        program_id: Pubkey,
        tree_height: usize,
        witness: Resource<Arc<dyn WitnessCalculator>>,
        prover: Resource<Arc<Groth16Prover>>,
    ) -> Self {
        Self {
            kind,
            program_id,
            shape: kind.circuit_shape(tree_height),
            witness,
            prover,
        }
    }

    pub fn kind(&self) -> VerifierKind {
        self.kind
    }

    pub fn config(&self) -> VerifierConfig {
        self.kind.config()
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn shape(&self) -> CircuitShape {
        self.shape
    }

    /// Verifying key of the loaded proving key, if any
    pub fn verifying_key(&self) -> Option<&VerifyingKey<Bn254>> {
        match &self.prover {
            Resource::Loaded(prover) => Some(prover.verifying_key()),
            Resource::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.witness.is_loaded() && self.prover.is_loaded()
    }

    /// Encode the public half of `tx` in this variant's input layout.
    pub fn assemble(&self, tx: &TransactionDescriptor) -> Result<VerifierInputs> {
        public_inputs::assemble(self.kind, tx)
    }

    pub fn parse_public_inputs_from_array(
        &self,
        signals: &[FieldElement],
    ) -> Result<VerifierInputs> {
        public_inputs::parse_public_inputs_from_array(self.kind, signals)
    }

    /// Run the witness routine over the assembled public inputs.
    pub fn calculate_wtns(
        &self,
        private: &PrivateInputs,
        inputs: &VerifierInputs,
    ) -> Result<Witness> {
        let calculator = match &self.witness {
            Resource::Loaded(calculator) => calculator,
            Resource::Unavailable { location, reason } => {
                return Err(Error::ResourceUnavailable {
                    verifier: self.kind,
                    location: location.clone(),
                    reason: reason.clone(),
                });
            }
        };
        let signals = inputs.to_signals()?;
        calculator
            .calculate(private, &signals)
            .map_err(|e| Error::WitnessGeneration {
                verifier: self.kind,
                reason: e.to_string(),
            })
    }

    pub fn prove(&self, witness: &Witness) -> Result<TransactionProof> {
        let prover = match &self.prover {
            Resource::Loaded(prover) => prover,
            Resource::Unavailable { location, reason } => {
                return Err(Error::ProvingKeyUnavailable {
                    verifier: self.kind,
                    location: location.clone(),
                    reason: reason.clone(),
                });
            }
        };
        prover.prove(witness).map_err(|e| match e {
            ProverError::KeyUnavailable { path, reason } => Error::ProvingKeyUnavailable {
                verifier: self.kind,
                location: path,
                reason,
            },
            other => Error::ProofGeneration {
                verifier: self.kind,
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_table() {
        assert_eq!(VerifierKind::Zero.config(), VerifierConfig { ins: 2, outs: 2 });
        assert_eq!(VerifierKind::One.config(), VerifierConfig { ins: 10, outs: 2 });
        assert_eq!(VerifierKind::Two.config(), VerifierConfig { ins: 4, outs: 4 });
        assert!(!VerifierKind::Zero.supports_cpi());
        assert!(!VerifierKind::One.supports_cpi());
        assert!(VerifierKind::Two.supports_cpi());
    }

    #[test]
    fn test_public_input_counts() {
        assert_eq!(VerifierKind::Zero.public_input_count(), 5 + 2 + 2);
        assert_eq!(VerifierKind::One.public_input_count(), 5 + 10 + 2);
        assert_eq!(VerifierKind::Two.public_input_count(), 8 + 4 + 4);
    }

    #[test]
    fn test_parse_variant_names() {
        for kind in VerifierKind::ALL {
            assert_eq!(kind.name().parse::<VerifierKind>(), Ok(kind));
        }
        assert_eq!("two".parse::<VerifierKind>(), Ok(VerifierKind::Two));
        assert!("three".parse::<VerifierKind>().is_err());
    }

    #[test]
    fn test_unavailable_resources_fail_on_use() {
        let verifier = Verifier::new(
            VerifierKind::Zero,
            Pubkey::new_unique(),
            4,
            Resource::unavailable("artifacts/verifier_zero.circuit.json", "missing"),
            Resource::unavailable("artifacts/verifier_zero.pk", "missing"),
        );
        assert!(!verifier.is_ready());
        assert!(verifier.verifying_key().is_none());
    }
}
