//! Verifier program logic
//!
//! The checks a verifier program runs before it accepts a shielded
//! transaction, and the pool state it mutates when it does:
//!
//! 1. instruction data decodes for the variant's arity
//! 2. the ext data in the instruction hashes to the public `ext_data_hash`
//! 3. the root is one of the recent commitment-tree roots
//! 4. (cpi) the KYC root is accepted
//! 5. every nullifier account is the derived nullifier record
//! 6. the recipient and relayer accounts are the ones named in the ext data
//! 7. no nullifier is spent, none repeats
//! 8. the tree has room for the new leaves
//! 9. the Groth16 proof verifies over the public inputs
//!
//! Only after all checks pass are nullifiers marked and leaves appended.

use std::collections::HashSet;

use ark_bn254::Bn254;
use ark_groth16::{PreparedVerifyingKey, VerifyingKey};
use solana_sdk::instruction::InstructionError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;
use tracing::debug;
use veil_privacy::{Commitment, MerkleError, MerklePath, MerkleTree, RootHistory};
use veil_prover::groth16::{prepare_verifying_key, verify_proof};
use veil_prover::ProverError;

use crate::instruction::{TransactInstruction, nullifier_address, pool_address};
use crate::verifier::VerifierKind;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VerifierProgramError {
    #[error("instruction data could not be decoded")]
    InvalidInstructionData = 0,

    #[error("ext data does not match its public hash")]
    ExtDataHashMismatch = 1,

    #[error("merkle root is not a recent pool root")]
    UnknownRoot = 2,

    #[error("kyc root is not accepted")]
    UnknownKycRoot = 3,

    #[error("nullifier account does not match its derived address")]
    InvalidNullifierAccount = 4,

    #[error("nullifier already spent")]
    NullifierAlreadySpent = 5,

    #[error("proof verification failed")]
    InvalidProof = 6,

    #[error("commitment tree is full")]
    TreeFull = 7,

    #[error("recipient or relayer account does not match the ext data")]
    InvalidExtAccount = 8,
}

impl VerifierProgramError {
    const ALL: [VerifierProgramError; 9] = [
        VerifierProgramError::InvalidInstructionData,
        VerifierProgramError::ExtDataHashMismatch,
        VerifierProgramError::UnknownRoot,
        VerifierProgramError::UnknownKycRoot,
        VerifierProgramError::InvalidNullifierAccount,
        VerifierProgramError::NullifierAlreadySpent,
        VerifierProgramError::InvalidProof,
        VerifierProgramError::TreeFull,
        VerifierProgramError::InvalidExtAccount,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /// Decode a program error carried by a failed transaction
    pub fn from_transaction_error(err: &TransactionError) -> Option<Self> {
        match err {
            TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
                Self::from_code(*code)
            }
            _ => None,
        }
    }

    pub fn into_transaction_error(self, instruction_index: u8) -> TransactionError {
        TransactionError::InstructionError(instruction_index, InstructionError::Custom(self.code()))
    }
}

/// A deployed verifier: its variant and prepared key
#[derive(Clone)]
pub struct VerifierProgram {
    pub program_id: Pubkey,
    pub kind: VerifierKind,
    pvk: PreparedVerifyingKey<Bn254>,
}

impl VerifierProgram {
    pub fn new(
        program_id: Pubkey,
        kind: VerifierKind,
        vk: &VerifyingKey<Bn254>,
    ) -> Result<Self, ProverError> {
        Ok(Self {
            program_id,
            kind,
            pvk: prepare_verifying_key(vk)?,
        })
    }
}

/// Pool state shared by every verifier variant
#[derive(Debug, Clone)]
pub struct ShieldedPool {
    tree: MerkleTree,
    roots: RootHistory,
    nullifiers: HashSet<[u8; 32]>,
    kyc_roots: HashSet<[u8; 32]>,
}

impl ShieldedPool {
    pub fn new(tree_height: usize, root_history: usize) -> Result<Self, MerkleError> {
        let tree = MerkleTree::new(tree_height)?;
        let mut roots = RootHistory::new(root_history);
        roots.push(tree.root());
        Ok(Self {
            tree,
            roots,
            nullifiers: HashSet::new(),
            kyc_roots: HashSet::new(),
        })
    }

    pub fn root(&self) -> [u8; 32] {
        self.tree.root()
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn merkle_path(&self, position: u64) -> Option<MerklePath> {
        self.tree.path(position)
    }

    pub fn is_known_root(&self, root: &[u8; 32]) -> bool {
        self.roots.is_valid(root)
    }

    pub fn is_spent(&self, nullifier: &[u8; 32]) -> bool {
        self.nullifiers.contains(nullifier)
    }

    pub fn accept_kyc_root(&mut self, root: [u8; 32]) {
        self.kyc_roots.insert(root);
    }

    /// Append a commitment outside a proof (deposits, test fixtures)
    pub fn append(&mut self, commitment: Commitment) -> Result<u64, MerkleError> {
        let position = self.tree.insert(&commitment)?;
        self.roots.push(self.tree.root());
        Ok(position)
    }

    /// Run the verifier checks and apply the transaction.
    ///
    /// `accounts` are the instruction's account keys in order. State changes
    /// only after every check has passed.
    pub fn process(
        &mut self,
        program: &VerifierProgram,
        accounts: &[Pubkey],
        data: &[u8],
    ) -> Result<(), VerifierProgramError> {
        let ix = TransactInstruction::decode(data, program.kind.config()).map_err(|e| {
            debug!(verifier = %program.kind, error = %e, "undecodable instruction");
            VerifierProgramError::InvalidInstructionData
        })?;
        if ix.inputs.is_cpi() != program.kind.supports_cpi() {
            return Err(VerifierProgramError::InvalidInstructionData);
        }

        if ix.ext_data.hash() != *ix.inputs.ext_data_hash() {
            return Err(VerifierProgramError::ExtDataHashMismatch);
        }
        if !self.roots.is_valid(ix.inputs.root().as_bytes()) {
            return Err(VerifierProgramError::UnknownRoot);
        }
        if let Some(kyc_root) = ix.inputs.kyc_mt_root() {
            if !self.kyc_roots.contains(kyc_root.as_bytes()) {
                return Err(VerifierProgramError::UnknownKycRoot);
            }
        }

        let nullifiers = ix.inputs.nullifiers();
        let expected_accounts = 2 + nullifiers.len() + 2;
        if accounts.len() != expected_accounts || accounts[1] != pool_address(&program.program_id) {
            return Err(VerifierProgramError::InvalidInstructionData);
        }
        for (nullifier, account) in nullifiers.iter().zip(&accounts[2..]) {
            if *account != nullifier_address(&program.program_id, nullifier) {
                return Err(VerifierProgramError::InvalidNullifierAccount);
            }
        }
        let (recipient, relayer) = (accounts[2 + nullifiers.len()], accounts[3 + nullifiers.len()]);
        if recipient != ix.ext_data.recipient || relayer != ix.ext_data.relayer {
            return Err(VerifierProgramError::InvalidExtAccount);
        }
        let mut seen = HashSet::with_capacity(nullifiers.len());
        for nullifier in nullifiers {
            if self.nullifiers.contains(nullifier) || !seen.insert(*nullifier) {
                return Err(VerifierProgramError::NullifierAlreadySpent);
            }
        }

        let leaves = ix.inputs.leaves();
        if self.tree.next_position() + leaves.len() as u64 > self.tree.capacity() {
            return Err(VerifierProgramError::TreeFull);
        }

        let signals = ix
            .inputs
            .to_signals()
            .map_err(|_| VerifierProgramError::InvalidInstructionData)?;
        match verify_proof(&program.pvk, &ix.proof, &signals) {
            Ok(true) => {}
            Ok(false) | Err(_) => return Err(VerifierProgramError::InvalidProof),
        }

        self.nullifiers.extend(nullifiers.iter().copied());
        for leaf in leaves {
            self.tree
                .insert(&Commitment(leaf))
                .map_err(|_| VerifierProgramError::TreeFull)?;
        }
        self.roots.push(self.tree.root());

        debug!(
            verifier = %program.kind,
            nullifiers = nullifiers.len(),
            next_position = self.tree.next_position(),
            "shielded transaction applied"
        );
        Ok(())
    }
}
