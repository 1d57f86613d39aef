#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use ark_bn254::Bn254;
use ark_groth16::ProvingKey;
use rand::SeedableRng;
use rand::rngs::StdRng;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use veil_core::chain::{ChainClient, LocalChain};
use veil_core::transaction::mint_to_field;
use veil_core::{ExtData, Pipeline, Submitter, SubmitterConfig, VerifierKind, VerifierRegistry};
use veil_privacy::{FieldElement, MerklePath, Note, SpendingKey};
use veil_prover::groth16::setup;

pub const HEIGHT: usize = 4;

static KEYS: [OnceLock<ProvingKey<Bn254>>; 3] = [const { OnceLock::new() }; 3];

/// Proving key for `kind`, generated once per test binary
pub fn proving_key(kind: VerifierKind) -> ProvingKey<Bn254> {
    KEYS[kind.index()]
        .get_or_init(|| setup(kind.circuit_shape(HEIGHT), 7 + kind.index() as u64).unwrap().0)
        .clone()
}

pub fn program_ids() -> [Pubkey; 3] {
    [
        Pubkey::new_from_array([0xa0; 32]),
        Pubkey::new_from_array([0xa1; 32]),
        Pubkey::new_from_array([0xa2; 32]),
    ]
}

pub fn mint() -> Pubkey {
    Pubkey::new_from_array([0x33; 32])
}

pub fn ext_data() -> ExtData {
    ExtData {
        recipient: Pubkey::new_from_array([0x44; 32]),
        relayer: Pubkey::new_from_array([0x55; 32]),
        relayer_fee: 5,
        encrypted_outputs: vec![0xee; 64],
    }
}

pub fn fast_submitter_config() -> SubmitterConfig {
    SubmitterConfig {
        max_retries: 3,
        retry_base_ms: 1,
        confirm_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(5),
        compute_unit_limit: 1_400_000,
    }
}

/// A registry with keys for `kinds`, a local chain running their programs
/// and a pipeline submitting to it
pub struct Harness {
    pub registry: Arc<VerifierRegistry>,
    pub chain: Arc<LocalChain>,
    pub pipeline: Pipeline,
    pub rng: StdRng,
}

impl Harness {
    pub fn new(kinds: &[VerifierKind]) -> Self {
        Self::with_config(kinds, fast_submitter_config())
    }

    pub fn with_config(kinds: &[VerifierKind], config: SubmitterConfig) -> Self {
        let keys = kinds.iter().map(|kind| (*kind, proving_key(*kind))).collect();
        let registry = Arc::new(VerifierRegistry::from_keys(HEIGHT, program_ids(), keys));
        let chain = Arc::new(LocalChain::with_registry(&registry, HEIGHT).unwrap());
        let client: Arc<dyn ChainClient> = chain.clone();
        let submitter = Submitter::new(client, Arc::new(Keypair::new()), config);
        Self {
            pipeline: Pipeline::new(Arc::clone(&registry), submitter),
            registry,
            chain,
            rng: StdRng::seed_from_u64(99),
        }
    }

    pub fn key(&mut self) -> SpendingKey {
        SpendingKey::random(&mut self.rng)
    }

    pub fn note(&mut self, value: u64, owner: FieldElement) -> Note {
        Note::new(value, owner, mint_to_field(&mint()), &mut self.rng)
    }

    /// Deposit a note straight into the pool and return its position
    pub fn fund(&mut self, value: u64, key: &SpendingKey) -> (Note, u64) {
        let note = self.note(value, key.public_key());
        let position = self.chain.deposit(note.commitment()).unwrap();
        (note, position)
    }

    /// Path against the current root
    pub fn path(&self, position: u64) -> MerklePath {
        self.chain.merkle_path(position).unwrap()
    }
}
