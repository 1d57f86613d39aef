//! Shielded Notes
//!
//! ```text
//! Note = {
//!     value: u64,              // amount in the mint's smallest unit
//!     randomness: Fr,          // blinding factor
//!     owner: Fr,               // Poseidon(PK_DOMAIN, spending_key)
//!     mint: Fr,                // hash_to_field(mint pubkey)
//! }
//! ```

use ark_bn254::Fr;
use ark_std::UniformRand;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, CommitmentScheme};
use crate::field::FieldElement;
use crate::nullifier::{Nullifier, NullifierKey};
use crate::poseidon::{poseidon_hash, public_key_domain};

/// Secret key authorising spends of notes owned by its public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingKey(pub FieldElement);

impl SpendingKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(FieldElement::from_field(Fr::rand(rng)))
    }

    /// owner = Poseidon(PK_DOMAIN, sk)
    pub fn public_key(&self) -> FieldElement {
        FieldElement::from_field(poseidon_hash(&[public_key_domain(), self.0.to_field()]))
    }

    pub fn nullifier_key(&self) -> NullifierKey {
        NullifierKey::from_field(self.0)
    }
}

/// A shielded note representing privately held value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub value: u64,
    pub randomness: FieldElement,
    pub owner: FieldElement,
    pub mint: FieldElement,
}

impl Note {
    /// Create a note with fresh blinding
    pub fn new<R: RngCore + CryptoRng>(
        value: u64,
        owner: FieldElement,
        mint: FieldElement,
        rng: &mut R,
    ) -> Self {
        Self {
            value,
            randomness: FieldElement::from_field(Fr::rand(rng)),
            owner,
            mint,
        }
    }

    pub fn commitment(&self) -> Commitment {
        CommitmentScheme::new().commit(self.value, &self.randomness, &self.owner, &self.mint)
    }

    /// Nullifier for this note at `position`, derivable only with the owner's key
    pub fn nullifier(&self, key: &SpendingKey, position: u64) -> Nullifier {
        key.nullifier_key()
            .derive_nullifier(&self.commitment(), position)
    }
}
