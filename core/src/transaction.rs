//! Transaction descriptors
//!
//! A [`TransactionDescriptor`] is everything the pipeline needs to prove and
//! submit one shielded transaction: the public data the verifier program
//! sees, plus the private witness that stays on the client.
//! [`TransactionBuilder`] produces descriptors from spendable notes and pads
//! them to a verifier's fixed arity with zero-value dummies.

use rand::{CryptoRng, RngCore};
use solana_sdk::pubkey::Pubkey;
use veil_privacy::{FieldElement, MerklePath, Note, SpendingKey, hash_to_field};
use veil_prover::{InputNoteWitness, KycWitness, OutputNoteWitness, PrivateInputs};

use crate::error::{Error, Result};
use crate::verifier::VerifierKind;

/// Data bound into the proof through its hash but checked by the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtData {
    pub recipient: Pubkey,
    pub relayer: Pubkey,
    pub relayer_fee: u64,
    /// Ciphertexts of the output notes for their recipients
    pub encrypted_outputs: Vec<u8>,
}

impl ExtData {
    pub fn hash(&self) -> FieldElement {
        let len = (self.encrypted_outputs.len() as u32).to_le_bytes();
        hash_to_field(&[
            self.recipient.as_ref(),
            self.relayer.as_ref(),
            &self.relayer_fee.to_le_bytes(),
            &len,
            &self.encrypted_outputs,
        ])
    }
}

/// Extra public data for transactions issued through another program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpiContext {
    pub invoking_program: Pubkey,
    pub app_hash: [u8; 32],
    pub kyc_mt_root: [u8; 32],
}

impl CpiContext {
    /// Field encoding of the invoking program id
    pub fn verifier_field(&self) -> FieldElement {
        hash_to_field(&[self.invoking_program.as_ref()])
    }
}

/// Arity of a transaction, used for verifier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxShape {
    pub inputs: usize,
    pub outputs: usize,
    pub cpi: bool,
}

#[derive(Debug, Clone)]
pub struct TransactionDescriptor {
    /// Commitment-tree root the inputs are proven against
    pub root: [u8; 32],
    /// Net value entering (positive) or leaving (negative) the pool
    pub public_amount: i128,
    pub fee_amount: u64,
    pub mint: Pubkey,
    pub ext_data: ExtData,
    pub nullifiers: Vec<[u8; 32]>,
    /// Output commitments
    pub leaves: Vec<[u8; 32]>,
    pub cpi: Option<CpiContext>,
    pub private: PrivateInputs,
}

impl TransactionDescriptor {
    pub fn shape(&self) -> TxShape {
        TxShape {
            inputs: self.nullifiers.len(),
            outputs: self.leaves.len(),
            cpi: self.cpi.is_some(),
        }
    }

    pub fn mint_field(&self) -> FieldElement {
        mint_to_field(&self.mint)
    }
}

pub fn mint_to_field(mint: &Pubkey) -> FieldElement {
    hash_to_field(&[mint.as_ref()])
}

/// A note the caller owns, located in the commitment tree
#[derive(Debug, Clone)]
pub struct SpendableNote {
    pub note: Note,
    pub key: SpendingKey,
    pub path: MerklePath,
}

/// Builds padded descriptors for a chosen verifier variant.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    mint: Pubkey,
    root: [u8; 32],
    tree_height: usize,
    inputs: Vec<SpendableNote>,
    outputs: Vec<Note>,
    public_amount: i128,
    fee_amount: u64,
    ext_data: ExtData,
    cpi: Option<(CpiContext, MerklePath)>,
}

impl TransactionBuilder {
    pub fn new(mint: Pubkey, root: [u8; 32], tree_height: usize, ext_data: ExtData) -> Self {
        Self {
            mint,
            root,
            tree_height,
            inputs: Vec::new(),
            outputs: Vec::new(),
            public_amount: 0,
            fee_amount: 0,
            ext_data,
            cpi: None,
        }
    }

    pub fn spend(mut self, note: Note, key: SpendingKey, path: MerklePath) -> Self {
        self.inputs.push(SpendableNote { note, key, path });
        self
    }

    pub fn output(mut self, note: Note) -> Self {
        self.outputs.push(note);
        self
    }

    pub fn public_amount(mut self, amount: i128) -> Self {
        self.public_amount = amount;
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee_amount = fee;
        self
    }

    /// Attach CPI data and the sender's membership path in the KYC tree
    pub fn cpi(mut self, context: CpiContext, kyc_path: MerklePath) -> Self {
        self.cpi = Some((context, kyc_path));
        self
    }

    /// Pad to `kind`'s arity and derive nullifiers and leaves.
    ///
    /// Real inputs keep their slot order, dummies follow them.
    pub fn build<R: RngCore + CryptoRng>(
        self,
        kind: VerifierKind,
        rng: &mut R,
    ) -> Result<TransactionDescriptor> {
        let config = kind.config();
        if self.inputs.len() > config.ins || self.outputs.len() > config.outs {
            return Err(Error::MalformedTransaction(format!(
                "{} inputs / {} outputs do not fit {kind} ({} / {})",
                self.inputs.len(),
                self.outputs.len(),
                config.ins,
                config.outs
            )));
        }
        if kind.supports_cpi() != self.cpi.is_some() {
            return Err(Error::MalformedTransaction(format!(
                "{kind} {} cpi data",
                if kind.supports_cpi() { "requires" } else { "does not accept" }
            )));
        }

        let mint = mint_to_field(&self.mint);
        let foreign_input = self.inputs.iter().any(|i| i.note.mint != mint);
        if foreign_input || self.outputs.iter().any(|o| o.mint != mint) {
            return Err(Error::MalformedTransaction(
                "note mint differs from transaction mint".into(),
            ));
        }
        if let Some(bad) = self.inputs.iter().position(|i| i.path.height() != self.tree_height) {
            return Err(Error::MalformedTransaction(format!(
                "input {bad} has a merkle path of height {}, expected {}",
                self.inputs[bad].path.height(),
                self.tree_height
            )));
        }

        let mut nullifiers = Vec::with_capacity(config.ins);
        let mut input_witnesses = Vec::with_capacity(config.ins);
        for spend in &self.inputs {
            nullifiers.push(spend.note.nullifier(&spend.key, spend.path.position).0);
            input_witnesses.push(InputNoteWitness {
                value: spend.note.value,
                randomness: spend.note.randomness,
                spending_key: spend.key.0,
                merkle_path: spend.path.clone(),
            });
        }
        while input_witnesses.len() < config.ins {
            let key = SpendingKey::random(rng);
            let dummy = Note::new(0, key.public_key(), mint, rng);
            nullifiers.push(dummy.nullifier(&key, 0).0);
            let padding = InputNoteWitness::padding(self.tree_height, dummy.randomness, key.0);
            input_witnesses.push(padding);
        }

        let mut outputs = self.outputs;
        while outputs.len() < config.outs {
            let owner = SpendingKey::random(rng).public_key();
            outputs.push(Note::new(0, owner, mint, rng));
        }
        let leaves = outputs.iter().map(|n| n.commitment().0).collect();
        let output_witnesses = outputs
            .iter()
            .map(|n| OutputNoteWitness {
                value: n.value,
                randomness: n.randomness,
                recipient: n.owner,
            })
            .collect();

        let (cpi, kyc) = match self.cpi {
            Some((context, path)) => (Some(context), Some(KycWitness { path })),
            None => (None, None),
        };

        Ok(TransactionDescriptor {
            root: self.root,
            public_amount: self.public_amount,
            fee_amount: self.fee_amount,
            mint: self.mint,
            ext_data: self.ext_data,
            nullifiers,
            leaves,
            cpi,
            private: PrivateInputs {
                inputs: input_witnesses,
                outputs: output_witnesses,
                kyc,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ext() -> ExtData {
        ExtData {
            recipient: Pubkey::new_from_array([1u8; 32]),
            relayer: Pubkey::new_from_array([2u8; 32]),
            relayer_fee: 10,
            encrypted_outputs: vec![9u8; 48],
        }
    }

    #[test]
    fn test_ext_data_hash_binds_every_field() {
        let base = ext().hash();
        let mut changed = ext();
        changed.relayer_fee = 11;
        assert_ne!(changed.hash(), base);

        let mut changed = ext();
        changed.encrypted_outputs.push(0);
        assert_ne!(changed.hash(), base);
        assert_eq!(ext().hash(), base);
    }

    #[test]
    fn test_builder_pads_to_variant() {
        let mut rng = StdRng::seed_from_u64(1);
        let mint = Pubkey::new_from_array([5u8; 32]);
        let mint_field = mint_to_field(&mint);
        let key = SpendingKey::random(&mut rng);
        let note = Note::new(40, key.public_key(), mint_field, &mut rng);
        let mut path = MerklePath::empty(4);
        path.position = 3;
        path.path_bits = vec![true, true, false, false];

        let tx = TransactionBuilder::new(mint, [0u8; 32], 4, ext())
            .spend(note, key, path)
            .output(Note::new(40, key.public_key(), mint_field, &mut rng))
            .build(VerifierKind::Zero, &mut rng)
            .unwrap();

        assert_eq!(tx.shape(), TxShape { inputs: 2, outputs: 2, cpi: false });
        assert_eq!(tx.nullifiers[0], note.nullifier(&key, 3).0);
        assert_eq!(tx.private.inputs[1].value, 0);
        assert_eq!(tx.private.outputs[1].value, 0);
        assert_ne!(tx.nullifiers[0], tx.nullifiers[1]);
    }

    #[test]
    fn test_builder_rejects_overflow_and_cpi_mismatch() {
        let mut rng = StdRng::seed_from_u64(2);
        let mint = Pubkey::new_from_array([5u8; 32]);
        let mint_field = mint_to_field(&mint);
        let owner = SpendingKey::random(&mut rng).public_key();

        let mut builder = TransactionBuilder::new(mint, [0u8; 32], 4, ext());
        for _ in 0..3 {
            builder = builder.output(Note::new(1, owner, mint_field, &mut rng));
        }
        assert!(matches!(
            builder.build(VerifierKind::Zero, &mut rng),
            Err(Error::MalformedTransaction(_))
        ));

        let builder = TransactionBuilder::new(mint, [0u8; 32], 4, ext());
        assert!(matches!(
            builder.build(VerifierKind::Two, &mut rng),
            Err(Error::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_builder_rejects_foreign_mint() {
        let mut rng = StdRng::seed_from_u64(3);
        let mint = Pubkey::new_from_array([5u8; 32]);
        let owner = SpendingKey::random(&mut rng).public_key();
        let other_mint = mint_to_field(&Pubkey::new_from_array([6u8; 32]));

        let result = TransactionBuilder::new(mint, [0u8; 32], 4, ext())
            .output(Note::new(1, owner, other_mint, &mut rng))
            .build(VerifierKind::Zero, &mut rng);
        assert!(matches!(result, Err(Error::MalformedTransaction(_))));
    }
}
