//! Veil Privacy SDK
//!
//! Note-based privacy primitives over the BN254 scalar field, shared by the
//! client pipeline, the transaction circuit and the verifier program.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Shielded Transaction                      │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │  Nullifiers  │  │ Commitments  │  │  Ext data hash     │  │
//! │  │  (spent)     │  │  (leaves)    │  │  (recipient, fee)  │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! │         │                 │                     │            │
//! │         ▼                 ▼                     ▼            │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              ZK Proof (Groth16 / BN254)                │  │
//! │  │  • nullifiers derived from owned, committed notes      │  │
//! │  │  • leaves are well-formed output commitments           │  │
//! │  │  • Σ in + public amount = Σ out + fee                  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod field;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod poseidon;

pub use commitment::{Commitment, CommitmentScheme};
pub use field::{FIELD_BYTES, FieldElement, FieldError, hash_to_field, signed_amount_to_field};
pub use merkle::{
    DEFAULT_ROOT_HISTORY, DEFAULT_TREE_HEIGHT, MerkleError, MerkleHasher, MerklePath, MerkleTree,
    RootHistory,
};
pub use note::{Note, SpendingKey};
pub use nullifier::{Nullifier, NullifierKey};
pub use poseidon::{poseidon_config, poseidon_hash};
