//! Nullifiers
//!
//! ```text
//! Nullifier = Poseidon(NULL, spending_key, commitment, position)
//! ```
//!
//! Once a nullifier is published, the corresponding note cannot be spent again.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{CryptographicSponge, poseidon::PoseidonSponge};
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::field::FieldElement;
use crate::poseidon::{NULLIFIER_DOMAIN, poseidon_config};

/// A nullifier (32 bytes) - unique tag for a spent note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    pub fn from_field(f: Fr) -> Self {
        Self(FieldElement::from_field(f).0)
    }

    pub fn to_field(&self) -> Fr {
        FieldElement(self.0).to_field()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Nullifier derivation key (the spending key as a field element)
#[derive(Debug, Clone)]
pub struct NullifierKey {
    key: FieldElement,
}

impl NullifierKey {
    pub fn from_field(key: FieldElement) -> Self {
        Self { key }
    }

    /// Derive the nullifier of the note committed as `commitment` at `position`.
    ///
    /// The position prevents two identical notes from sharing a nullifier.
    pub fn derive_nullifier(&self, commitment: &Commitment, position: u64) -> Nullifier {
        let mut sponge = PoseidonSponge::new(poseidon_config());

        sponge.absorb(&Fr::from(NULLIFIER_DOMAIN));
        sponge.absorb(&self.key.to_field());
        sponge.absorb(&commitment.to_field());
        sponge.absorb(&Fr::from(position));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        Nullifier::from_field(result)
    }
}
