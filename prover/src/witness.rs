//! Witness generation
//!
//! A `WitnessCalculator` turns private and public inputs into a fully
//! assigned, satisfied circuit. Generation is a pure function of its inputs:
//! identical inputs give a byte-identical witness.

use ark_bn254::Fr;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, SynthesisError};
use ark_serialize::CanonicalSerialize;
use thiserror::Error;
use veil_privacy::{FieldElement, MerklePath};

use crate::circuit::{PrivateInputs, TransactionCircuit};
use crate::shape::CircuitShape;

#[derive(Debug, Error)]
pub enum WitnessError {
    /// Inputs do not have the arity the circuit was compiled for
    #[error("witness inputs do not fit circuit {shape}: {reason}")]
    ShapeMismatch { shape: CircuitShape, reason: String },

    /// Assignment exists but violates a constraint
    #[error("inputs do not satisfy circuit {shape} (first failing constraint: {constraint})")]
    Unsatisfied {
        shape: CircuitShape,
        constraint: String,
    },

    #[error("constraint synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

/// A satisfied assignment for one circuit
#[derive(Clone, Debug)]
pub struct Witness {
    circuit: TransactionCircuit,
    /// Instance assignment without the leading constant one
    instance: Vec<Fr>,
    assignment: Vec<Fr>,
}

impl Witness {
    pub fn shape(&self) -> CircuitShape {
        self.circuit.shape
    }

    pub fn circuit(&self) -> &TransactionCircuit {
        &self.circuit
    }

    /// Ordered public inputs as seen by the verifier
    pub fn public_signals(&self) -> Vec<FieldElement> {
        self.instance.iter().copied().map(FieldElement::from_field).collect()
    }

    pub fn public_inputs(&self) -> &[Fr] {
        &self.instance
    }

    /// Canonical serialization of the full assignment (public then private)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.instance.len() + self.assignment.len()) * 32 + 16);
        // Vec<Fr> serialization into a Vec cannot fail
        let _ = self.instance.serialize_compressed(&mut bytes);
        let _ = self.assignment.serialize_compressed(&mut bytes);
        bytes
    }

    pub fn digest(&self) -> [u8; 32] {
        *blake3::hash(&self.to_bytes()).as_bytes()
    }

    pub fn num_private(&self) -> usize {
        self.assignment.len()
    }
}

/// Computes witnesses for one circuit shape
pub trait WitnessCalculator: Send + Sync {
    fn shape(&self) -> CircuitShape;

    fn calculate(
        &self,
        private: &PrivateInputs,
        public: &[FieldElement],
    ) -> Result<Witness, WitnessError>;
}

/// Synthesises the transaction circuit in-process
#[derive(Debug, Clone)]
pub struct CircuitWitnessCalculator {
    shape: CircuitShape,
}

impl CircuitWitnessCalculator {
    pub fn new(shape: CircuitShape) -> Self {
        Self { shape }
    }

    fn check_arity(
        &self,
        private: &PrivateInputs,
        public: &[FieldElement],
    ) -> Result<(), WitnessError> {
        let shape = self.shape;
        let mismatch = |reason: String| Err(WitnessError::ShapeMismatch { shape, reason });
        let wrong_height = |path: &MerklePath| {
            path.height() != shape.tree_height || path.path_bits.len() != shape.tree_height
        };

        if public.len() != shape.public_input_count() {
            return mismatch(format!(
                "{} public inputs, expected {}",
                public.len(),
                shape.public_input_count()
            ));
        }
        if private.inputs.len() != shape.ins || private.outputs.len() != shape.outs {
            return mismatch(format!(
                "{} inputs / {} outputs, expected {} / {}",
                private.inputs.len(),
                private.outputs.len(),
                shape.ins,
                shape.outs
            ));
        }
        if let Some(bad) = private.inputs.iter().position(|i| wrong_height(&i.merkle_path)) {
            return mismatch(format!("input {bad} has a merkle path of the wrong height"));
        }
        match (&private.kyc, shape.cpi) {
            (None, true) => mismatch("missing kyc membership path".into()),
            (Some(_), false) => {
                mismatch("kyc path given to a circuit without the cpi extension".into())
            }
            (Some(kyc), true) if wrong_height(&kyc.path) => {
                mismatch("kyc path has the wrong height".into())
            }
            _ => Ok(()),
        }
    }
}

impl WitnessCalculator for CircuitWitnessCalculator {
    fn shape(&self) -> CircuitShape {
        self.shape
    }

    fn calculate(
        &self,
        private: &PrivateInputs,
        public: &[FieldElement],
    ) -> Result<Witness, WitnessError> {
        self.check_arity(private, public)?;

        let circuit = TransactionCircuit::new(
            self.shape,
            public.iter().map(FieldElement::to_field).collect(),
            private.clone(),
        );

        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.clone().generate_constraints(cs.clone())?;

        if !cs.is_satisfied()? {
            let constraint = cs
                .which_is_unsatisfied()?
                .unwrap_or_else(|| "unknown".to_string());
            tracing::debug!(shape = %self.shape, %constraint, "witness does not satisfy circuit");
            return Err(WitnessError::Unsatisfied {
                shape: self.shape,
                constraint,
            });
        }

        let (instance, assignment) = {
            let inner = cs.borrow().ok_or(SynthesisError::MissingCS)?;
            (
                inner.instance_assignment[1..].to_vec(),
                inner.witness_assignment.clone(),
            )
        };

        tracing::debug!(
            shape = %self.shape,
            constraints = cs.num_constraints(),
            private = assignment.len(),
            "witness generated"
        );

        Ok(Witness {
            circuit,
            instance,
            assignment,
        })
    }
}
