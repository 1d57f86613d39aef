//! Verifier program instruction format
//!
//! ```text
//! offset  size        field
//! ──────  ──────────  ─────────────────────────────────────────────
//!   0     1           discriminator (1 = transact, 2 = transact_cpi)
//!   1     256         proof (-a || b || c)
//! 257     32 x 5      root, public_amount, ext_data_hash, fee, mint
//!         32 x 3      verifier, app_hash, kyc_mt_root          (cpi)
//!         32 x ins    nullifiers      (cpi: u32 LE count first)
//!         32 x outs   leaves          (cpi: u32 LE count first)
//!         32          recipient
//!         32          relayer
//!         8           relayer_fee (u64 LE)
//!         4 + n       encrypted outputs (u32 LE length, bytes)
//! ```
//!
//! Accounts: payer (signer), pool, one nullifier record per nullifier,
//! recipient, relayer.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use veil_privacy::FieldElement;
use veil_prover::{PROOF_BYTES, TransactionProof};

use crate::public_inputs::{PublicInputs, PublicInputsCpi, VerifierInputs};
use crate::transaction::ExtData;
use crate::verifier::VerifierConfig;

pub const TRANSACT: u8 = 1;
pub const TRANSACT_CPI: u8 = 2;

pub const POOL_SEED: &[u8] = b"pool";
pub const NULLIFIER_SEED: &[u8] = b"nullifier";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("instruction data ends early: need {needed} bytes, {remaining} left")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("unknown instruction discriminator {0}")]
    UnknownDiscriminator(u8),

    #[error("{0} trailing bytes after instruction")]
    TrailingBytes(usize),

    #[error("expected {expected} {what}, found {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{0} is not a canonical field element")]
    NonCanonical(&'static str),

    #[error("malformed proof: {0}")]
    Proof(String),
}

/// Decoded verifier instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactInstruction {
    pub proof: TransactionProof,
    pub inputs: VerifierInputs,
    pub ext_data: ExtData,
}

impl TransactInstruction {
    pub fn discriminator(&self) -> u8 {
        if self.inputs.is_cpi() { TRANSACT_CPI } else { TRANSACT }
    }

    pub fn encode(&self) -> Vec<u8> {
        let capacity = 1 + PROOF_BYTES + 32 * 24 + 80 + self.ext_data.encrypted_outputs.len();
        let mut data = Vec::with_capacity(capacity);
        data.push(self.discriminator());
        data.extend_from_slice(self.proof.as_bytes());

        match &self.inputs {
            VerifierInputs::Standard(inputs) => {
                put_fields(&mut data, &[
                    inputs.root,
                    inputs.public_amount,
                    inputs.ext_data_hash,
                    inputs.fee_amount,
                    inputs.mint_pubkey,
                ]);
                for nullifier in &inputs.nullifiers {
                    data.extend_from_slice(nullifier);
                }
                for leaf in &inputs.leaves {
                    data.extend_from_slice(leaf.as_bytes());
                }
            }
            VerifierInputs::Cpi(inputs) => {
                put_fields(&mut data, &[
                    inputs.root,
                    inputs.public_amount,
                    inputs.ext_data_hash,
                    inputs.fee_amount,
                    inputs.mint_pubkey,
                    inputs.verifier,
                    inputs.app_hash,
                    inputs.kyc_mt_root,
                ]);
                put_counted(&mut data, &inputs.nullifiers);
                put_counted(&mut data, &inputs.leaves);
            }
        }

        data.extend_from_slice(self.ext_data.recipient.as_ref());
        data.extend_from_slice(self.ext_data.relayer.as_ref());
        data.extend_from_slice(&self.ext_data.relayer_fee.to_le_bytes());
        data.extend_from_slice(&(self.ext_data.encrypted_outputs.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.ext_data.encrypted_outputs);
        data
    }

    /// Decode for a verifier with `config` arity. The whole buffer must be consumed.
    pub fn decode(data: &[u8], config: VerifierConfig) -> Result<Self, CodecError> {
        let mut reader = Reader::new(data);
        let discriminator = reader.u8()?;
        let proof = TransactionProof::from_bytes(reader.take(PROOF_BYTES)?)
            .map_err(|e| CodecError::Proof(e.to_string()))?;

        let root = reader.field("root")?;
        let public_amount = reader.field("public_amount")?;
        let ext_data_hash = reader.field("ext_data_hash")?;
        let fee_amount = reader.field("fee_amount")?;
        let mint_pubkey = reader.field("mint")?;

        let inputs = match discriminator {
            TRANSACT => {
                let nullifiers = (0..config.ins)
                    .map(|_| reader.array32())
                    .collect::<Result<Vec<_>, _>>()?;
                let leaves = (0..config.outs)
                    .map(|_| reader.field("leaf"))
                    .collect::<Result<Vec<_>, _>>()?;
                VerifierInputs::Standard(PublicInputs {
                    root,
                    public_amount,
                    ext_data_hash,
                    fee_amount,
                    mint_pubkey,
                    nullifiers,
                    leaves,
                })
            }
            TRANSACT_CPI => {
                let verifier = reader.field("verifier")?;
                let app_hash = reader.field("app_hash")?;
                let kyc_mt_root = reader.field("kyc_mt_root")?;
                let nullifiers = reader.counted("nullifiers", config.ins)?;
                let leaves = reader.counted("leaves", config.outs)?;
                VerifierInputs::Cpi(PublicInputsCpi {
                    root,
                    public_amount,
                    ext_data_hash,
                    fee_amount,
                    mint_pubkey,
                    verifier,
                    app_hash,
                    kyc_mt_root,
                    nullifiers,
                    leaves,
                })
            }
            other => return Err(CodecError::UnknownDiscriminator(other)),
        };

        let recipient = Pubkey::new_from_array(reader.array32()?);
        let relayer = Pubkey::new_from_array(reader.array32()?);
        let relayer_fee = reader.u64()?;
        let len = reader.u32()? as usize;
        let encrypted_outputs = reader.take(len)?.to_vec();
        reader.finish()?;

        Ok(Self {
            proof,
            inputs,
            ext_data: ExtData {
                recipient,
                relayer,
                relayer_fee,
                encrypted_outputs,
            },
        })
    }
}

fn put_fields(data: &mut Vec<u8>, fields: &[FieldElement]) {
    for field in fields {
        data.extend_from_slice(field.as_bytes());
    }
}

fn put_counted(data: &mut Vec<u8>, values: &[[u8; 32]]) {
    data.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for value in values {
        data.extend_from_slice(value);
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.data.len() - self.offset;
        if n > remaining {
            return Err(CodecError::UnexpectedEnd { needed: n, remaining });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn array32(&mut self) -> Result<[u8; 32], CodecError> {
        self.array::<32>()
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array::<8>()?))
    }

    fn field(&mut self, name: &'static str) -> Result<FieldElement, CodecError> {
        FieldElement::from_canonical_bytes(self.array32()?)
            .map_err(|_| CodecError::NonCanonical(name))
    }

    fn counted(
        &mut self,
        what: &'static str,
        expected: usize,
    ) -> Result<Vec<[u8; 32]>, CodecError> {
        let found = self.u32()? as usize;
        if found != expected {
            return Err(CodecError::CountMismatch { what, expected, found });
        }
        (0..found).map(|_| self.array32()).collect()
    }

    fn finish(self) -> Result<(), CodecError> {
        match self.data.len() - self.offset {
            0 => Ok(()),
            trailing => Err(CodecError::TrailingBytes(trailing)),
        }
    }
}

pub fn pool_address(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[POOL_SEED], program_id).0
}

pub fn nullifier_address(program_id: &Pubkey, nullifier: &[u8; 32]) -> Pubkey {
    Pubkey::find_program_address(&[NULLIFIER_SEED, nullifier], program_id).0
}

/// Build the verifier instruction with its account list.
pub fn transact_instruction(
    program_id: &Pubkey,
    payer: &Pubkey,
    transact: &TransactInstruction,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*payer, true),                         // payer/signer
        AccountMeta::new(pool_address(program_id), false),      // pool state
    ];
    accounts.extend(
        transact
            .inputs
            .nullifiers()
            .iter()
            .map(|n| AccountMeta::new(nullifier_address(program_id, n), false)),
    );
    accounts.push(AccountMeta::new(transact.ext_data.recipient, false));
    accounts.push(AccountMeta::new_readonly(transact.ext_data.relayer, false));

    Instruction {
        program_id: *program_id,
        accounts,
        data: transact.encode(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::VerifierKind;

    fn element(tag: u8) -> FieldElement {
        FieldElement::from_u64(tag as u64 + 1000)
    }

    fn ext() -> ExtData {
        ExtData {
            recipient: Pubkey::new_from_array([4u8; 32]),
            relayer: Pubkey::new_from_array([5u8; 32]),
            relayer_fee: 77,
            encrypted_outputs: vec![0xab; 20],
        }
    }

    fn standard() -> TransactInstruction {
        TransactInstruction {
            proof: TransactionProof([3u8; PROOF_BYTES]),
            inputs: VerifierInputs::Standard(PublicInputs {
                root: element(1),
                public_amount: element(2),
                ext_data_hash: element(3),
                fee_amount: element(4),
                mint_pubkey: element(5),
                nullifiers: vec![element(6).to_bytes(), element(7).to_bytes()],
                leaves: vec![element(8), element(9)],
            }),
            ext_data: ext(),
        }
    }

    fn cpi() -> TransactInstruction {
        TransactInstruction {
            proof: TransactionProof([3u8; PROOF_BYTES]),
            inputs: VerifierInputs::Cpi(PublicInputsCpi {
                root: element(1),
                public_amount: element(2),
                ext_data_hash: element(3),
                fee_amount: element(4),
                mint_pubkey: element(5),
                verifier: element(6),
                app_hash: element(7),
                kyc_mt_root: element(8),
                nullifiers: (10..14).map(|i| element(i).to_bytes()).collect(),
                leaves: (20..24).map(|i| element(i).to_bytes()).collect(),
            }),
            ext_data: ext(),
        }
    }

    #[test]
    fn test_standard_layout() {
        let data = standard().encode();
        assert_eq!(data[0], TRANSACT);
        assert_eq!(&data[1..257], &[3u8; PROOF_BYTES]);
        assert_eq!(&data[257..289], element(1).as_bytes());
        // nullifiers follow the five header fields
        let nullifiers = 257 + 5 * 32;
        assert_eq!(&data[nullifiers..nullifiers + 32], &element(6).to_bytes());
        assert_eq!(data.len(), 257 + 9 * 32 + 64 + 8 + 4 + 20);
    }

    #[test]
    fn test_cpi_layout_has_counts() {
        let data = cpi().encode();
        assert_eq!(data[0], TRANSACT_CPI);
        let counts = 257 + 8 * 32;
        assert_eq!(&data[counts..counts + 4], &4u32.to_le_bytes());
        assert_eq!(data.len(), 257 + 8 * 32 + 2 * (4 + 4 * 32) + 64 + 8 + 4 + 20);
    }

    #[test]
    fn test_decode_recovers_instruction() {
        let ix = standard();
        let decoded = TransactInstruction::decode(&ix.encode(), VerifierKind::Zero.config());
        assert_eq!(decoded.unwrap(), ix);

        let ix = cpi();
        let decoded = TransactInstruction::decode(&ix.encode(), VerifierKind::Two.config());
        assert_eq!(decoded.unwrap(), ix);
    }

    #[test]
    fn test_decode_rejects_bad_framing() {
        let mut data = standard().encode();
        data.push(0);
        assert_eq!(
            TransactInstruction::decode(&data, VerifierKind::Zero.config()),
            Err(CodecError::TrailingBytes(1))
        );

        let data = standard().encode();
        assert!(matches!(
            TransactInstruction::decode(&data[..300], VerifierKind::Zero.config()),
            Err(CodecError::UnexpectedEnd { .. })
        ));

        // a 2x2 payload read with the 10x2 arity runs off the end
        assert!(TransactInstruction::decode(&data, VerifierKind::One.config()).is_err());

        let mut data = standard().encode();
        data[0] = 9;
        assert_eq!(
            TransactInstruction::decode(&data, VerifierKind::Zero.config()),
            Err(CodecError::UnknownDiscriminator(9))
        );
    }

    #[test]
    fn test_decode_rejects_non_canonical_header() {
        let mut data = standard().encode();
        data[257..289].copy_from_slice(&[0xff; 32]);
        assert_eq!(
            TransactInstruction::decode(&data, VerifierKind::Zero.config()),
            Err(CodecError::NonCanonical("root"))
        );
    }

    #[test]
    fn test_accounts_include_nullifier_records() {
        let program = Pubkey::new_unique();
        let payer = Pubkey::new_unique();
        let ix = standard();
        let instruction = transact_instruction(&program, &payer, &ix);

        assert_eq!(instruction.accounts.len(), 2 + 2 + 2);
        assert!(instruction.accounts[0].is_signer);
        assert_eq!(instruction.accounts[1].pubkey, pool_address(&program));
        assert_eq!(
            instruction.accounts[2].pubkey,
            nullifier_address(&program, &ix.inputs.nullifiers()[0])
        );
        assert_eq!(instruction.accounts[4].pubkey, ix.ext_data.recipient);
    }
}
