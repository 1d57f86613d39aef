//! In-process chain
//!
//! Executes verifier instructions against a local [`ShieldedPool`] with the
//! same signature, blockhash and error semantics the submitter sees from a
//! real cluster. Faults can be injected to exercise the retry path.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use ark_bn254::Bn254;
use ark_groth16::VerifyingKey;
use sha2::{Digest, Sha256};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::InstructionError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use tracing::{debug, info};
use veil_privacy::{Commitment, DEFAULT_ROOT_HISTORY, MerkleError, MerklePath};
use veil_prover::ProverError;

use super::program::{ShieldedPool, VerifierProgram};
use super::{ChainClient, ChainError, TxStatus};
use crate::verifier::{VerifierKind, VerifierRegistry};

/// Blockhashes stay valid for this many advances
const BLOCKHASH_WINDOW: usize = 150;

struct Ledger {
    slot: u64,
    blockhashes: VecDeque<Hash>,
    statuses: HashMap<Signature, TxStatus>,
    programs: HashMap<Pubkey, VerifierProgram>,
    pool: ShieldedPool,
    fail_sends: u32,
    drop_responses: u32,
    hide_statuses: u32,
    reject_duplicates: bool,
    executed: u64,
}

impl Ledger {
    fn advance(&mut self) -> Hash {
        self.slot += 1;
        let hash = Hash::new_from_array(Sha256::digest(self.slot.to_le_bytes()).into());
        self.blockhashes.push_back(hash);
        if self.blockhashes.len() > BLOCKHASH_WINDOW {
            self.blockhashes.pop_front();
        }
        hash
    }

    /// Landing a transaction takes a slot but keeps the blockhash window
    fn advance_slot(&mut self) -> u64 {
        self.slot += 1;
        self.slot
    }

    fn execute(
        &mut self,
        tx: &Transaction,
        compute_budget: &Pubkey,
    ) -> Result<(), TransactionError> {
        let keys = &tx.message.account_keys;
        let mut pool = self.pool.clone();

        for (index, ix) in tx.message.instructions.iter().enumerate() {
            let index = index as u8;
            let missing =
                TransactionError::InstructionError(index, InstructionError::MissingAccount);
            let program_id = keys
                .get(ix.program_id_index as usize)
                .ok_or_else(|| missing.clone())?;
            if program_id == compute_budget {
                continue;
            }
            let program = self
                .programs
                .get(program_id)
                .ok_or(TransactionError::InstructionError(
                    index,
                    InstructionError::IncorrectProgramId,
                ))?;
            let accounts = ix
                .accounts
                .iter()
                .map(|i| keys.get(*i as usize).copied())
                .collect::<Option<Vec<_>>>()
                .ok_or(missing)?;

            pool.process(program, &accounts, &ix.data)
                .map_err(|e| e.into_transaction_error(index))?;
        }

        self.pool = pool;
        Ok(())
    }
}

pub struct LocalChain {
    ledger: Mutex<Ledger>,
    compute_budget: Pubkey,
}

impl LocalChain {
    pub fn new(tree_height: usize) -> Result<Self, MerkleError> {
        let mut ledger = Ledger {
            slot: 0,
            blockhashes: VecDeque::new(),
            statuses: HashMap::new(),
            programs: HashMap::new(),
            pool: ShieldedPool::new(tree_height, DEFAULT_ROOT_HISTORY)?,
            fail_sends: 0,
            drop_responses: 0,
            hide_statuses: 0,
            reject_duplicates: false,
            executed: 0,
        };
        ledger.advance();
        Ok(Self {
            ledger: Mutex::new(ledger),
            compute_budget: ComputeBudgetInstruction::set_compute_unit_limit(0).program_id,
        })
    }

    /// A chain with every registry variant that has a verifying key deployed
    pub fn with_registry(registry: &VerifierRegistry, tree_height: usize) -> anyhow::Result<Self> {
        let chain = Self::new(tree_height)?;
        for verifier in registry.iter() {
            if let Some(vk) = verifier.verifying_key() {
                chain.deploy(*verifier.program_id(), verifier.kind(), vk)?;
            }
        }
        Ok(chain)
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn deploy(
        &self,
        program_id: Pubkey,
        kind: VerifierKind,
        vk: &VerifyingKey<Bn254>,
    ) -> Result<(), ProverError> {
        let program = VerifierProgram::new(program_id, kind, vk)?;
        self.lock().programs.insert(program_id, program);
        info!(verifier = %kind, %program_id, "verifier program deployed");
        Ok(())
    }

    /// Append a commitment directly, as a deposit would
    pub fn deposit(&self, commitment: Commitment) -> Result<u64, MerkleError> {
        self.lock().pool.append(commitment)
    }

    pub fn accept_kyc_root(&self, root: [u8; 32]) {
        self.lock().pool.accept_kyc_root(root);
    }

    pub fn root(&self) -> [u8; 32] {
        self.lock().pool.root()
    }

    pub fn merkle_path(&self, position: u64) -> Option<MerklePath> {
        self.lock().pool.merkle_path(position)
    }

    pub fn is_spent(&self, nullifier: &[u8; 32]) -> bool {
        self.lock().pool.is_spent(nullifier)
    }

    pub fn leaf_count(&self) -> u64 {
        self.lock().pool.tree().next_position()
    }

    /// Number of transactions that changed state
    pub fn executed_transactions(&self) -> u64 {
        self.lock().executed
    }

    /// Fail the next `n` sends before they reach the program
    pub fn fail_next_sends(&self, n: u32) {
        self.lock().fail_sends = n;
    }

    /// Execute the next `n` sends but report a transport failure
    pub fn drop_next_responses(&self, n: u32) {
        self.lock().drop_responses = n;
    }

    /// Report the next `n` status queries as not yet visible
    pub fn hide_next_statuses(&self, n: u32) {
        self.lock().hide_statuses = n;
    }

    /// Answer redelivered signatures with `AlreadyProcessed`, as an RPC
    /// node's preflight does
    pub fn reject_duplicate_sends(&self, reject: bool) {
        self.lock().reject_duplicates = reject;
    }

    /// Produce a new blockhash, expiring the oldest beyond the window
    pub fn advance_blockhash(&self) -> Hash {
        self.lock().advance()
    }

    /// Expire every blockhash handed out so far
    pub fn expire_blockhashes(&self) {
        let mut ledger = self.lock();
        ledger.blockhashes.clear();
        ledger.advance();
    }
}

impl ChainClient for LocalChain {
    fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        let ledger = self.lock();
        ledger
            .blockhashes
            .back()
            .copied()
            .ok_or_else(|| ChainError::Transport("no blockhash available".into()))
    }

    fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, ChainError> {
        Ok(self.lock().blockhashes.contains(blockhash))
    }

    fn send_transaction(&self, tx: &Transaction) -> Result<Signature, ChainError> {
        let mut ledger = self.lock();
        if ledger.fail_sends > 0 {
            ledger.fail_sends -= 1;
            return Err(ChainError::Transport("connection reset by peer".into()));
        }

        let signature = *tx
            .signatures
            .first()
            .ok_or(ChainError::Rejected(TransactionError::SignatureFailure))?;

        if ledger.statuses.contains_key(&signature) {
            if ledger.reject_duplicates {
                return Err(ChainError::Rejected(TransactionError::AlreadyProcessed));
            }
            debug!(%signature, "duplicate signature acknowledged");
            return Ok(signature);
        }
        if !ledger.blockhashes.contains(&tx.message.recent_blockhash) {
            return Err(ChainError::Rejected(TransactionError::BlockhashNotFound));
        }
        tx.verify().map_err(ChainError::Rejected)?;

        let result = ledger.execute(tx, &self.compute_budget);
        let slot = ledger.advance_slot();
        if let Err(err) = &result {
            debug!(%signature, error = %err, "transaction failed");
        } else {
            ledger.executed += 1;
        }
        ledger.statuses.insert(signature, TxStatus { slot, result });

        if ledger.drop_responses > 0 {
            ledger.drop_responses -= 1;
            return Err(ChainError::Transport("response lost".into()));
        }
        Ok(signature)
    }

    fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError> {
        let mut ledger = self.lock();
        if ledger.hide_statuses > 0 {
            ledger.hide_statuses -= 1;
            return Ok(None);
        }
        Ok(ledger.statuses.get(signature).cloned())
    }
}
