//! Groth16 proving over BN254
//!
//! Proofs are serialized in the layout the on-chain verifier consumes:
//! `-a (64) || b (128) || c (64)`, every coordinate 32 bytes little endian.

use std::path::Path;
use std::sync::Arc;

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{BigInteger, PrimeField};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use ark_std::rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;
use veil_privacy::FieldElement;

use crate::circuit::TransactionCircuit;
use crate::shape::CircuitShape;
use crate::witness::Witness;

pub const PROOF_BYTES: usize = 256;

#[derive(Debug, Error)]
pub enum ProverError {
    /// Proving key missing or undecodable
    #[error("proving key unavailable at {path}: {reason}")]
    KeyUnavailable { path: String, reason: String },

    /// The witness was built for a different statement than the key
    #[error("witness has {actual} public inputs but the proving key expects {expected}")]
    WitnessSizeMismatch { expected: usize, actual: usize },

    #[error("groth16 proving failed: {0}")]
    Proving(String),

    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("key serialization failed: {0}")]
    Serialization(String),
}

/// A Groth16 proof in the on-chain byte layout
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TransactionProof(pub [u8; PROOF_BYTES]);

impl std::fmt::Debug for TransactionProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionProof({}..)", hex::encode(&self.0[..8]))
    }
}

impl TransactionProof {
    pub fn from_ark(proof: &Proof<Bn254>) -> Self {
        let mut bytes = [0u8; PROOF_BYTES];
        let a = -proof.a;
        let coords: [Fq; 8] = [
            a.x, a.y, proof.b.x.c0, proof.b.x.c1, proof.b.y.c0, proof.b.y.c1, proof.c.x, proof.c.y,
        ];
        for (chunk, coord) in bytes.chunks_exact_mut(32).zip(coords.iter()) {
            let le = coord.into_bigint().to_bytes_le();
            chunk[..le.len()].copy_from_slice(&le);
        }
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProverError> {
        let arr: [u8; PROOF_BYTES] = bytes.try_into().map_err(|_| {
            let found = bytes.len();
            ProverError::MalformedProof(format!("expected {PROOF_BYTES} bytes, got {found}"))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PROOF_BYTES] {
        &self.0
    }

    /// Decode back to curve points, rejecting non-canonical coordinates and
    /// points outside the prime-order subgroup.
    pub fn to_ark(&self) -> Result<Proof<Bn254>, ProverError> {
        let coord = |i: usize| -> Result<Fq, ProverError> {
            let chunk = &self.0[i * 32..(i + 1) * 32];
            let value = Fq::from_le_bytes_mod_order(chunk);
            if value.into_bigint().to_bytes_le() != chunk {
                return Err(ProverError::MalformedProof(format!("coordinate {i} is not canonical")));
            }
            Ok(value)
        };

        let a_neg = G1Affine::new_unchecked(coord(0)?, coord(1)?);
        let b = G2Affine::new_unchecked(
            Fq2::new(coord(2)?, coord(3)?),
            Fq2::new(coord(4)?, coord(5)?),
        );
        let c = G1Affine::new_unchecked(coord(6)?, coord(7)?);

        let on_curve = a_neg.is_on_curve() && b.is_on_curve() && c.is_on_curve();
        let in_subgroup = a_neg.is_in_correct_subgroup_assuming_on_curve()
            && b.is_in_correct_subgroup_assuming_on_curve()
            && c.is_in_correct_subgroup_assuming_on_curve();
        if !on_curve || !in_subgroup {
            return Err(ProverError::MalformedProof("point not in the BN254 groups".into()));
        }

        Ok(Proof { a: -a_neg, b, c })
    }
}

/// Proves witnesses for one circuit with a loaded proving key
pub struct Groth16Prover {
    proving_key: Arc<ProvingKey<Bn254>>,
    vk_hash: [u8; 32],
}

impl Groth16Prover {
    pub fn new(proving_key: ProvingKey<Bn254>) -> Result<Self, ProverError> {
        let vk_hash = compute_vk_hash(&proving_key.vk)?;
        Ok(Self {
            proving_key: Arc::new(proving_key),
            vk_hash,
        })
    }

    pub fn from_bytes(pk_bytes: &[u8]) -> Result<Self, ProverError> {
        let proving_key = ProvingKey::<Bn254>::deserialize_compressed(pk_bytes).map_err(|e| {
            ProverError::KeyUnavailable {
                path: "<memory>".into(),
                reason: format!("failed to deserialize proving key: {e}"),
            }
        })?;
        Self::new(proving_key)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProverError> {
        let unavailable = |reason: String| ProverError::KeyUnavailable {
            path: path.display().to_string(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        let proving_key = ProvingKey::<Bn254>::deserialize_compressed(bytes.as_slice())
            .map_err(|e| unavailable(format!("failed to deserialize proving key: {e}")))?;
        Self::new(proving_key)
    }

    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.proving_key.vk
    }

    pub fn vk_hash(&self) -> [u8; 32] {
        self.vk_hash
    }

    /// Number of public inputs the key was generated for
    pub fn public_input_count(&self) -> usize {
        self.proving_key.vk.gamma_abc_g1.len().saturating_sub(1)
    }

    /// Prove `witness`. The randomness is seeded from the witness digest, so
    /// the same witness always yields the same proof.
    pub fn prove(&self, witness: &Witness) -> Result<TransactionProof, ProverError> {
        let actual = witness.public_inputs().len();
        let expected = self.public_input_count();
        if actual != expected {
            return Err(ProverError::WitnessSizeMismatch { expected, actual });
        }

        let started = std::time::Instant::now();
        let mut rng = StdRng::from_seed(witness.digest());
        let circuit = witness.circuit().clone();
        let proof = Groth16::<Bn254>::prove(self.proving_key.as_ref(), circuit, &mut rng)
            .map_err(|e| ProverError::Proving(e.to_string()))?;

        tracing::info!(
            shape = %witness.shape(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "groth16 proof generated"
        );
        Ok(TransactionProof::from_ark(&proof))
    }
}

/// Circuit-specific setup for `shape`, deterministic in `seed`
pub fn setup(
    shape: CircuitShape,
    seed: u64,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ProverError> {
    let mut rng = StdRng::seed_from_u64(seed);
    Groth16::<Bn254>::circuit_specific_setup(TransactionCircuit::blank(shape), &mut rng)
        .map_err(|e| ProverError::Proving(format!("setup failed: {e}")))
}

pub fn prepare_verifying_key(
    vk: &VerifyingKey<Bn254>,
) -> Result<PreparedVerifyingKey<Bn254>, ProverError> {
    Groth16::<Bn254>::process_vk(vk).map_err(|e| ProverError::Proving(e.to_string()))
}

/// Check `proof` against ordered public inputs.
pub fn verify_proof(
    pvk: &PreparedVerifyingKey<Bn254>,
    proof: &TransactionProof,
    public_inputs: &[FieldElement],
) -> Result<bool, ProverError> {
    if public_inputs.len() + 1 != pvk.vk.gamma_abc_g1.len() {
        return Ok(false);
    }
    let proof = proof.to_ark()?;
    let inputs: Vec<Fr> = public_inputs.iter().map(FieldElement::to_field).collect();
    Groth16::<Bn254>::verify_with_processed_vk(pvk, &inputs, &proof)
        .map_err(|e| ProverError::Proving(e.to_string()))
}

pub fn compute_vk_hash(vk: &VerifyingKey<Bn254>) -> Result<[u8; 32], ProverError> {
    let mut vk_bytes = Vec::new();
    vk.serialize_compressed(&mut vk_bytes)
        .map_err(|e| ProverError::Serialization(e.to_string()))?;
    Ok(*blake3::hash(&vk_bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_length_checked() {
        assert!(matches!(
            TransactionProof::from_bytes(&[0u8; 255]),
            Err(ProverError::MalformedProof(_))
        ));
        assert!(TransactionProof::from_bytes(&[0u8; 256]).is_ok());
    }

    #[test]
    fn test_garbage_proof_rejected() {
        let proof = TransactionProof([7u8; PROOF_BYTES]);
        assert!(proof.to_ark().is_err());
    }

    #[test]
    fn test_corrupt_key_is_unavailable() {
        assert!(matches!(
            Groth16Prover::from_bytes(&[1, 2, 3]),
            Err(ProverError::KeyUnavailable { .. })
        ));
    }

    #[test]
    fn test_missing_key_file_is_unavailable() {
        let err = Groth16Prover::from_file(Path::new("/nonexistent/veil.pk"))
            .err()
            .expect("missing file must fail");
        assert!(matches!(err, ProverError::KeyUnavailable { .. }));
    }
}
