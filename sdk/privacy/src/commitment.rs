//! Note Commitments
//!
//! ```text
//! Commitment = Poseidon(value || randomness || owner || mint)
//! ```
//!
//! Binding the mint keeps notes of different assets from balancing
//! against each other inside one transaction.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge},
};
use serde::{Deserialize, Serialize};

use crate::field::FieldElement;
use crate::poseidon::poseidon_config;

/// A note commitment (32 bytes, canonical field element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    pub fn from_field(f: Fr) -> Self {
        Self(FieldElement::from_field(f).0)
    }

    pub fn to_field(&self) -> Fr {
        FieldElement(self.0).to_field()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_field_element(&self) -> FieldElement {
        FieldElement(self.0)
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Commitment scheme using Poseidon hash
pub struct CommitmentScheme {
    config: &'static PoseidonConfig<Fr>,
}

impl CommitmentScheme {
    pub fn new() -> Self {
        Self {
            config: poseidon_config(),
        }
    }

    pub fn commit(
        &self,
        value: u64,
        randomness: &FieldElement,
        owner: &FieldElement,
        mint: &FieldElement,
    ) -> Commitment {
        let mut sponge = PoseidonSponge::new(self.config);

        sponge.absorb(&Fr::from(value));
        sponge.absorb(&randomness.to_field());
        sponge.absorb(&owner.to_field());
        sponge.absorb(&mint.to_field());

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Commitment::from_field(result)
    }
}

impl Default for CommitmentScheme {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from_u64(v)
    }

    #[test]
    fn test_commitment_deterministic() {
        let scheme = CommitmentScheme::new();
        let c1 = scheme.commit(1000, &fe(42), &fe(1), &fe(7));
        let c2 = scheme.commit(1000, &fe(42), &fe(1), &fe(7));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_commitment_hiding() {
        let scheme = CommitmentScheme::new();
        let c1 = scheme.commit(1000, &fe(1), &fe(1), &fe(7));
        let c2 = scheme.commit(1000, &fe(2), &fe(1), &fe(7));
        assert_ne!(c1, c2, "different randomness should produce different commitments");
    }

    #[test]
    fn test_commitment_binds_mint() {
        let scheme = CommitmentScheme::new();
        let c1 = scheme.commit(1000, &fe(42), &fe(1), &fe(7));
        let c2 = scheme.commit(1000, &fe(42), &fe(1), &fe(8));
        assert_ne!(c1, c2);
    }
}
