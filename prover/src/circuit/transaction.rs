//! Shielded Transaction Circuit
//!
//! ZK proof that a shielded transaction is valid:
//! 1. Each non-zero input note is committed under the public root
//! 2. Each nullifier is derived from an owned input note and its position
//! 3. Output leaves are correctly formed commitments
//! 4. Balance holds: Σ inputs + public_amount = Σ outputs + fee
//! 5. (CPI) the owner of input 0 is a member of the KYC tree
//!
//! ```text
//! Public Inputs (allocation order = wire order):
//!   root, public_amount, ext_data_hash, fee_amount, mint,
//!   [verifier, app_hash, kyc_mt_root],
//!   nullifiers[ins], leaves[outs]
//!
//! Private Witness:
//!   inputs[]:  value, randomness, spending_key, merkle path
//!   outputs[]: value, randomness, recipient
//!   kyc:       merkle path of Poseidon(KYC, owner_0)
//! ```

use ark_bn254::Fr;
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde::{Deserialize, Serialize};
use veil_privacy::poseidon::{KYC_LEAF_DOMAIN, NULLIFIER_DOMAIN, public_key_domain};
use veil_privacy::{FieldElement, MerklePath, poseidon_config};

use crate::circuit::gadgets::{alloc_u64, merkle_root_gadget, poseidon_gadget};
use crate::shape::{
    APP_HASH, CircuitShape, EXT_DATA_HASH, FEE_AMOUNT, KYC_MT_ROOT, MINT, PUBLIC_AMOUNT, ROOT,
    VERIFIER,
};

/// Witness for a spent note
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputNoteWitness {
    pub value: u64,
    pub randomness: FieldElement,
    pub spending_key: FieldElement,
    /// Authentication path; its direction bits encode the leaf position
    pub merkle_path: MerklePath,
}

impl InputNoteWitness {
    /// Zero-value note that fills an unused input slot
    pub fn padding(height: usize, randomness: FieldElement, spending_key: FieldElement) -> Self {
        Self {
            value: 0,
            randomness,
            spending_key,
            merkle_path: MerklePath::empty(height),
        }
    }
}

/// Witness for a created note
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputNoteWitness {
    pub value: u64,
    pub randomness: FieldElement,
    pub recipient: FieldElement,
}

/// Membership of the sender in the compliance tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycWitness {
    pub path: MerklePath,
}

/// Everything the circuit needs besides the public inputs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateInputs {
    pub inputs: Vec<InputNoteWitness>,
    pub outputs: Vec<OutputNoteWitness>,
    pub kyc: Option<KycWitness>,
}

#[derive(Clone, Debug)]
pub struct TransactionCircuit {
    pub shape: CircuitShape,
    /// Public inputs in wire order
    pub public_inputs: Vec<Fr>,
    pub private: PrivateInputs,
}

impl TransactionCircuit {
    pub fn new(shape: CircuitShape, public_inputs: Vec<Fr>, private: PrivateInputs) -> Self {
        Self {
            shape,
            public_inputs,
            private,
        }
    }

    /// All-zero assignment with the right arity, for key generation
    pub fn blank(shape: CircuitShape) -> Self {
        let input =
            InputNoteWitness::padding(shape.tree_height, FieldElement::ZERO, FieldElement::ZERO);
        let output = OutputNoteWitness {
            value: 0,
            randomness: FieldElement::ZERO,
            recipient: FieldElement::ZERO,
        };
        Self {
            shape,
            public_inputs: vec![Fr::from(0u64); shape.public_input_count()],
            private: PrivateInputs {
                inputs: vec![input; shape.ins],
                outputs: vec![output; shape.outs],
                kyc: shape.cpi.then(|| KycWitness {
                    path: MerklePath::empty(shape.tree_height),
                }),
            },
        }
    }

    fn has_valid_arity(&self) -> bool {
        let shape = &self.shape;
        let paths_ok = self.private.inputs.iter().all(|i| {
            i.merkle_path.siblings.len() == shape.tree_height
                && i.merkle_path.path_bits.len() == shape.tree_height
        });
        let kyc_ok = match (&self.private.kyc, shape.cpi) {
            (Some(kyc), true) => {
                kyc.path.siblings.len() == shape.tree_height
                    && kyc.path.path_bits.len() == shape.tree_height
            }
            (None, false) => true,
            _ => false,
        };
        self.public_inputs.len() == shape.public_input_count()
            && self.private.inputs.len() == shape.ins
            && self.private.outputs.len() == shape.outs
            && paths_ok
            && kyc_ok
    }
}

impl ConstraintSynthesizer<Fr> for TransactionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        if !self.has_valid_arity() {
            return Err(SynthesisError::AssignmentMissing);
        }
        let shape = self.shape;
        let config = poseidon_config();

        // === Allocate Public Inputs ===
        let public = self
            .public_inputs
            .iter()
            .map(|v| FpVar::new_input(cs.clone(), || Ok(*v)))
            .collect::<Result<Vec<_>, _>>()?;
        let root = &public[ROOT];
        let mint = &public[MINT];

        // Inputs that no other constraint reads still get a quadratic term
        let _ext_data_binding = public[EXT_DATA_HASH].square()?;
        if shape.cpi {
            let _verifier_binding = public[VERIFIER].square()?;
            let _app_hash_binding = public[APP_HASH].square()?;
        }

        let pk_domain = FpVar::constant(public_key_domain());
        let nf_domain = FpVar::constant(Fr::from(NULLIFIER_DOMAIN));

        // === Process Inputs ===
        let mut total_input_value = FpVar::zero();
        let mut first_owner = None;

        for (i, input) in self.private.inputs.iter().enumerate() {
            let value = alloc_u64(cs.clone(), input.value)?;
            let randomness =
                FpVar::new_witness(cs.clone(), || Ok(input.randomness.to_field()))?;
            let spending_key =
                FpVar::new_witness(cs.clone(), || Ok(input.spending_key.to_field()))?;

            let owner =
                poseidon_gadget(cs.clone(), config, &[pk_domain.clone(), spending_key.clone()])?;
            let commitment = poseidon_gadget(
                cs.clone(),
                config,
                &[value.clone(), randomness, owner.clone(), mint.clone()],
            )?;

            // Zero-value inputs pad the shape and carry no membership proof
            let (computed_root, position) =
                merkle_root_gadget(cs.clone(), config, &commitment, &input.merkle_path)?;
            let is_real = value.is_neq(&FpVar::zero())?;
            computed_root.conditional_enforce_equal(root, &is_real)?;

            let nullifier = poseidon_gadget(
                cs.clone(),
                config,
                &[nf_domain.clone(), spending_key, commitment, position],
            )?;
            nullifier.enforce_equal(&public[shape.nullifier_offset() + i])?;

            total_input_value = total_input_value + &value;
            if i == 0 {
                first_owner = Some(owner);
            }
        }

        // === Process Outputs ===
        let mut total_output_value = FpVar::zero();

        for (j, output) in self.private.outputs.iter().enumerate() {
            let value = alloc_u64(cs.clone(), output.value)?;
            let randomness =
                FpVar::new_witness(cs.clone(), || Ok(output.randomness.to_field()))?;
            let recipient = FpVar::new_witness(cs.clone(), || Ok(output.recipient.to_field()))?;

            let commitment = poseidon_gadget(
                cs.clone(),
                config,
                &[value.clone(), randomness, recipient, mint.clone()],
            )?;
            commitment.enforce_equal(&public[shape.leaf_offset() + j])?;

            total_output_value = total_output_value + &value;
        }

        // === Balance Constraint ===
        let credit = &total_input_value + &public[PUBLIC_AMOUNT];
        let debit = &total_output_value + &public[FEE_AMOUNT];
        credit.enforce_equal(&debit)?;

        // === Compliance ===
        if shape.cpi {
            let kyc = self.private.kyc.as_ref().ok_or(SynthesisError::AssignmentMissing)?;
            let owner = first_owner.ok_or(SynthesisError::AssignmentMissing)?;
            let leaf = poseidon_gadget(
                cs.clone(),
                config,
                &[FpVar::constant(Fr::from(KYC_LEAF_DOMAIN)), owner],
            )?;
            let (kyc_root, _) = merkle_root_gadget(cs.clone(), config, &leaf, &kyc.path)?;
            kyc_root.enforce_equal(&public[KYC_MT_ROOT])?;
        }

        Ok(())
    }
}
