//! Veil prover
//!
//! Transaction circuit, witness generation and Groth16 proving for the
//! verifier variants.

pub mod artifacts;
pub mod circuit;
pub mod groth16;
pub mod shape;
pub mod witness;

pub use artifacts::{ArtifactError, ArtifactPaths, CircuitManifest};
pub use circuit::{
    InputNoteWitness, KycWitness, OutputNoteWitness, PrivateInputs, TransactionCircuit,
};
pub use groth16::{Groth16Prover, PROOF_BYTES, ProverError, TransactionProof, verify_proof};
pub use shape::CircuitShape;
pub use witness::{CircuitWitnessCalculator, Witness, WitnessCalculator, WitnessError};
