//! Public input records
//!
//! ```text
//! index  standard (zero, one)      cpi (two)
//! ─────  ────────────────────      ─────────────────
//!   0    root                      root
//!   1    public_amount             public_amount
//!   2    ext_data_hash             ext_data_hash
//!   3    fee_amount                fee_amount
//!   4    mint_pubkey               mint_pubkey
//!   5    nullifiers[ins]           verifier
//!   6    leaves[outs]              app_hash
//!   7                              kyc_mt_root
//!   8                              nullifiers[ins], leaves[outs]
//! ```
//!
//! The order above is the circuit's public input order and the order the
//! on-chain verifier reads; both must agree or every proof fails.
//!
//! The standard record keeps nullifiers as raw bytes and leaves as field
//! elements; the CPI record keeps both as raw bytes because the invoking
//! program forwards them untouched. Raw values are still checked to be
//! canonical field elements before they reach the witness.

use std::collections::HashSet;

use veil_privacy::{FieldElement, signed_amount_to_field};
use veil_prover::shape::{
    APP_HASH, EXT_DATA_HASH, FEE_AMOUNT, KYC_MT_ROOT, MINT, PUBLIC_AMOUNT, ROOT, VERIFIER,
};

use crate::error::{Error, Result};
use crate::transaction::TransactionDescriptor;
use crate::verifier::VerifierKind;

/// Public inputs of the standard variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicInputs {
    pub root: FieldElement,
    pub public_amount: FieldElement,
    pub ext_data_hash: FieldElement,
    pub fee_amount: FieldElement,
    pub mint_pubkey: FieldElement,
    pub nullifiers: Vec<[u8; 32]>,
    pub leaves: Vec<FieldElement>,
}

/// Public inputs of the CPI variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicInputsCpi {
    pub root: FieldElement,
    pub public_amount: FieldElement,
    pub ext_data_hash: FieldElement,
    pub fee_amount: FieldElement,
    pub mint_pubkey: FieldElement,
    /// Field encoding of the invoking program id
    pub verifier: FieldElement,
    pub app_hash: FieldElement,
    pub kyc_mt_root: FieldElement,
    pub nullifiers: Vec<[u8; 32]>,
    pub leaves: Vec<[u8; 32]>,
}

/// The record a verifier variant consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierInputs {
    Standard(PublicInputs),
    Cpi(PublicInputsCpi),
}

fn raw_signals(values: &[[u8; 32]], field: &'static str) -> Result<Vec<FieldElement>> {
    values
        .iter()
        .map(|v| FieldElement::from_canonical_bytes(*v).map_err(Error::encoding(field)))
        .collect()
}

impl PublicInputs {
    /// Flat array in circuit order
    pub fn to_signals(&self) -> Result<Vec<FieldElement>> {
        let mut signals = vec![
            self.root,
            self.public_amount,
            self.ext_data_hash,
            self.fee_amount,
            self.mint_pubkey,
        ];
        signals.extend(raw_signals(&self.nullifiers, "nullifier")?);
        signals.extend_from_slice(&self.leaves);
        Ok(signals)
    }
}

impl PublicInputsCpi {
    pub fn to_signals(&self) -> Result<Vec<FieldElement>> {
        let mut signals = vec![
            self.root,
            self.public_amount,
            self.ext_data_hash,
            self.fee_amount,
            self.mint_pubkey,
            self.verifier,
            self.app_hash,
            self.kyc_mt_root,
        ];
        signals.extend(raw_signals(&self.nullifiers, "nullifier")?);
        signals.extend(raw_signals(&self.leaves, "leaf")?);
        Ok(signals)
    }
}

impl VerifierInputs {
    pub fn to_signals(&self) -> Result<Vec<FieldElement>> {
        match self {
            VerifierInputs::Standard(inputs) => inputs.to_signals(),
            VerifierInputs::Cpi(inputs) => inputs.to_signals(),
        }
    }

    pub fn is_cpi(&self) -> bool {
        matches!(self, VerifierInputs::Cpi(_))
    }

    pub fn root(&self) -> &FieldElement {
        match self {
            VerifierInputs::Standard(inputs) => &inputs.root,
            VerifierInputs::Cpi(inputs) => &inputs.root,
        }
    }

    pub fn ext_data_hash(&self) -> &FieldElement {
        match self {
            VerifierInputs::Standard(inputs) => &inputs.ext_data_hash,
            VerifierInputs::Cpi(inputs) => &inputs.ext_data_hash,
        }
    }

    pub fn nullifiers(&self) -> &[[u8; 32]] {
        match self {
            VerifierInputs::Standard(inputs) => &inputs.nullifiers,
            VerifierInputs::Cpi(inputs) => &inputs.nullifiers,
        }
    }

    /// Output commitments as raw bytes
    pub fn leaves(&self) -> Vec<[u8; 32]> {
        match self {
            VerifierInputs::Standard(inputs) => {
                inputs.leaves.iter().map(|l| l.to_bytes()).collect()
            }
            VerifierInputs::Cpi(inputs) => inputs.leaves.clone(),
        }
    }

    pub fn kyc_mt_root(&self) -> Option<&FieldElement> {
        match self {
            VerifierInputs::Standard(_) => None,
            VerifierInputs::Cpi(inputs) => Some(&inputs.kyc_mt_root),
        }
    }
}

/// Encode the public half of `tx` for `kind`.
///
/// Deterministic: the same descriptor always yields the same record.
pub fn assemble(kind: VerifierKind, tx: &TransactionDescriptor) -> Result<VerifierInputs> {
    let config = kind.config();
    if tx.nullifiers.len() != config.ins || tx.leaves.len() != config.outs {
        return Err(Error::MalformedTransaction(format!(
            "{kind} takes {} nullifiers and {} leaves, got {} and {}",
            config.ins,
            config.outs,
            tx.nullifiers.len(),
            tx.leaves.len()
        )));
    }
    if kind.supports_cpi() != tx.cpi.is_some() {
        return Err(Error::UnsupportedShape {
            inputs: tx.nullifiers.len(),
            outputs: tx.leaves.len(),
            cpi: tx.cpi.is_some(),
        });
    }

    let mut seen = HashSet::with_capacity(tx.nullifiers.len());
    if let Some(dup) = tx.nullifiers.iter().find(|n| !seen.insert(**n)) {
        return Err(Error::MalformedTransaction(format!(
            "duplicate nullifier {}",
            hex::encode(dup)
        )));
    }

    let root = FieldElement::from_canonical_bytes(tx.root).map_err(Error::encoding("root"))?;
    let public_amount =
        signed_amount_to_field(tx.public_amount).map_err(Error::encoding("public_amount"))?;
    let ext_data_hash = tx.ext_data.hash();
    let fee_amount = FieldElement::from_u64(tx.fee_amount);
    let mint_pubkey = tx.mint_field();

    // canonical check only, the records keep the raw bytes
    raw_signals(&tx.nullifiers, "nullifier")?;

    match &tx.cpi {
        None => {
            let leaves = raw_signals(&tx.leaves, "leaf")?;
            Ok(VerifierInputs::Standard(PublicInputs {
                root,
                public_amount,
                ext_data_hash,
                fee_amount,
                mint_pubkey,
                nullifiers: tx.nullifiers.clone(),
                leaves,
            }))
        }
        Some(cpi) => {
            raw_signals(&tx.leaves, "leaf")?;
            let app_hash = FieldElement::from_canonical_bytes(cpi.app_hash)
                .map_err(Error::encoding("app_hash"))?;
            let kyc_mt_root = FieldElement::from_canonical_bytes(cpi.kyc_mt_root)
                .map_err(Error::encoding("kyc_mt_root"))?;
            Ok(VerifierInputs::Cpi(PublicInputsCpi {
                root,
                public_amount,
                ext_data_hash,
                fee_amount,
                mint_pubkey,
                verifier: cpi.verifier_field(),
                app_hash,
                kyc_mt_root,
                nullifiers: tx.nullifiers.clone(),
                leaves: tx.leaves.clone(),
            }))
        }
    }
}

/// Rebuild the record for `kind` from a flat public-signal array.
pub fn parse_public_inputs_from_array(
    kind: VerifierKind,
    signals: &[FieldElement],
) -> Result<VerifierInputs> {
    let expected = kind.public_input_count();
    if signals.len() != expected {
        return Err(Error::MalformedTransaction(format!(
            "{kind} expects {expected} public signals, got {}",
            signals.len()
        )));
    }

    let config = kind.config();
    let header = if kind.supports_cpi() { KYC_MT_ROOT + 1 } else { MINT + 1 };
    let nullifiers: Vec<[u8; 32]> = signals[header..header + config.ins]
        .iter()
        .map(|s| s.to_bytes())
        .collect();
    let leaves = &signals[header + config.ins..];

    if kind.supports_cpi() {
        Ok(VerifierInputs::Cpi(PublicInputsCpi {
            root: signals[ROOT],
            public_amount: signals[PUBLIC_AMOUNT],
            ext_data_hash: signals[EXT_DATA_HASH],
            fee_amount: signals[FEE_AMOUNT],
            mint_pubkey: signals[MINT],
            verifier: signals[VERIFIER],
            app_hash: signals[APP_HASH],
            kyc_mt_root: signals[KYC_MT_ROOT],
            nullifiers,
            leaves: leaves.iter().map(|l| l.to_bytes()).collect(),
        }))
    } else {
        Ok(VerifierInputs::Standard(PublicInputs {
            root: signals[ROOT],
            public_amount: signals[PUBLIC_AMOUNT],
            ext_data_hash: signals[EXT_DATA_HASH],
            fee_amount: signals[FEE_AMOUNT],
            mint_pubkey: signals[MINT],
            nullifiers,
            leaves: leaves.to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{CpiContext, ExtData};
    use solana_sdk::pubkey::Pubkey;
    use veil_prover::PrivateInputs;

    fn descriptor(ins: usize, outs: usize, cpi: bool) -> TransactionDescriptor {
        let element = |tag: u8, i: usize| {
            let mut bytes = [0u8; 32];
            bytes[0] = tag;
            bytes[1] = i as u8;
            bytes
        };
        TransactionDescriptor {
            root: element(1, 0),
            public_amount: -25,
            fee_amount: 5,
            mint: Pubkey::new_from_array([3u8; 32]),
            ext_data: ExtData {
                recipient: Pubkey::new_from_array([4u8; 32]),
                relayer: Pubkey::new_from_array([5u8; 32]),
                relayer_fee: 5,
                encrypted_outputs: vec![1, 2, 3],
            },
            nullifiers: (0..ins).map(|i| element(7, i)).collect(),
            leaves: (0..outs).map(|i| element(8, i)).collect(),
            cpi: cpi.then(|| CpiContext {
                invoking_program: Pubkey::new_from_array([6u8; 32]),
                app_hash: element(9, 0),
                kyc_mt_root: element(10, 0),
            }),
            private: PrivateInputs::default(),
        }
    }

    #[test]
    fn test_standard_field_order() {
        let tx = descriptor(2, 2, false);
        let inputs = assemble(VerifierKind::Zero, &tx).unwrap();
        let signals = inputs.to_signals().unwrap();

        assert_eq!(signals.len(), 9);
        assert_eq!(signals[ROOT].to_bytes(), tx.root);
        assert_eq!(signals[PUBLIC_AMOUNT], signed_amount_to_field(-25).unwrap());
        assert_eq!(signals[EXT_DATA_HASH], tx.ext_data.hash());
        assert_eq!(signals[FEE_AMOUNT], FieldElement::from_u64(5));
        assert_eq!(signals[MINT], tx.mint_field());
        assert_eq!(signals[5].to_bytes(), tx.nullifiers[0]);
        assert_eq!(signals[6].to_bytes(), tx.nullifiers[1]);
        assert_eq!(signals[7].to_bytes(), tx.leaves[0]);
        assert_eq!(signals[8].to_bytes(), tx.leaves[1]);
    }

    #[test]
    fn test_cpi_field_order() {
        let tx = descriptor(4, 4, true);
        let inputs = assemble(VerifierKind::Two, &tx).unwrap();
        let signals = inputs.to_signals().unwrap();
        let cpi = tx.cpi.unwrap();

        assert_eq!(signals.len(), 16);
        assert_eq!(signals[VERIFIER], cpi.verifier_field());
        assert_eq!(signals[APP_HASH].to_bytes(), cpi.app_hash);
        assert_eq!(signals[KYC_MT_ROOT].to_bytes(), cpi.kyc_mt_root);
        assert_eq!(signals[8].to_bytes(), tx.nullifiers[0]);
        assert_eq!(signals[12].to_bytes(), tx.leaves[0]);
        assert_eq!(signals[15].to_bytes(), tx.leaves[3]);
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let tx = descriptor(10, 2, false);
        assert_eq!(
            assemble(VerifierKind::One, &tx).unwrap(),
            assemble(VerifierKind::One, &tx).unwrap()
        );
    }

    #[test]
    fn test_count_mismatch_is_malformed() {
        let tx = descriptor(3, 2, false);
        assert!(matches!(
            assemble(VerifierKind::Zero, &tx),
            Err(Error::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_cpi_data_on_standard_variant_is_unsupported() {
        let tx = descriptor(4, 4, false);
        assert!(matches!(
            assemble(VerifierKind::Two, &tx),
            Err(Error::UnsupportedShape { cpi: false, .. })
        ));
    }

    #[test]
    fn test_duplicate_nullifiers_rejected() {
        let mut tx = descriptor(2, 2, false);
        tx.nullifiers[1] = tx.nullifiers[0];
        assert!(matches!(
            assemble(VerifierKind::Zero, &tx),
            Err(Error::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_non_canonical_values_rejected() {
        let mut tx = descriptor(2, 2, false);
        tx.root = [0xff; 32];
        assert!(matches!(
            assemble(VerifierKind::Zero, &tx),
            Err(Error::Encoding { field: "root", .. })
        ));

        let mut tx = descriptor(2, 2, false);
        tx.leaves[0] = [0xff; 32];
        assert!(matches!(
            assemble(VerifierKind::Zero, &tx),
            Err(Error::Encoding { field: "leaf", .. })
        ));

        let mut tx = descriptor(2, 2, false);
        tx.public_amount = i128::from(u64::MAX) + 1;
        assert!(matches!(
            assemble(VerifierKind::Zero, &tx),
            Err(Error::Encoding { field: "public_amount", .. })
        ));
    }

    #[test]
    fn test_parse_inverts_assemble() {
        for (kind, tx) in [
            (VerifierKind::Zero, descriptor(2, 2, false)),
            (VerifierKind::One, descriptor(10, 2, false)),
            (VerifierKind::Two, descriptor(4, 4, true)),
        ] {
            let inputs = assemble(kind, &tx).unwrap();
            let signals = inputs.to_signals().unwrap();
            let parsed = parse_public_inputs_from_array(kind, &signals).unwrap();
            assert_eq!(parsed, inputs);
        }
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let signals = vec![FieldElement::ZERO; 10];
        assert!(matches!(
            parse_public_inputs_from_array(VerifierKind::Zero, &signals),
            Err(Error::MalformedTransaction(_))
        ));
    }
}
