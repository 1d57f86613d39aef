//! Verifier registry
//!
//! Loads the three verifier variants once and selects one per transaction by
//! exact arity. Artifact failures are recorded per variant, so a missing
//! `verifier_one` key does not stop 2-in/2-out transfers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, bail};
use ark_bn254::Bn254;
use ark_groth16::ProvingKey;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};
use veil_config::VeilConfig;
use veil_prover::artifacts::{ArtifactPaths, CircuitManifest, load_witness_calculator};
use veil_prover::{CircuitWitnessCalculator, Groth16Prover, WitnessCalculator};

use super::{Resource, Verifier, VerifierKind};
use crate::error::{Error, Result};
use crate::transaction::TxShape;

static GLOBAL_REGISTRY: OnceLock<Arc<VerifierRegistry>> = OnceLock::new();

/// Where artifacts live and which programs verify them
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub artifact_dir: PathBuf,
    pub tree_height: usize,
    /// Program ids in variant order (zero, one, two)
    pub program_ids: [Pubkey; 3],
}

impl RegistrySettings {
    pub fn from_config(config: &VeilConfig) -> anyhow::Result<Self> {
        let program_ids = config
            .verifiers
            .program_ids()
            .context("invalid verifier program ids")?;
        Ok(Self {
            artifact_dir: config.verifiers.artifact_dir(),
            tree_height: config.verifiers.tree_height,
            program_ids,
        })
    }
}

#[derive(Debug)]
pub struct VerifierRegistry {
    verifiers: [Arc<Verifier>; 3],
}

impl VerifierRegistry {
    /// Load every variant from `settings.artifact_dir`. Never fails: broken
    /// artifacts become unavailable resources and surface on first use.
    pub fn load(settings: &RegistrySettings) -> Self {
        let verifiers = VerifierKind::ALL.map(|kind| {
            let paths = ArtifactPaths::new(&settings.artifact_dir, kind.name());
            let verifier = load_verifier(
                kind,
                settings.program_ids[kind.index()],
                settings.tree_height,
                &paths,
            );
            info!(
                verifier = %kind,
                program_id = %verifier.program_id(),
                ready = verifier.is_ready(),
                "verifier loaded"
            );
            Arc::new(verifier)
        });
        Self { verifiers }
    }

    /// Build from in-memory proving keys. Variants without a key stay
    /// unavailable for proving.
    pub fn from_keys(
        tree_height: usize,
        program_ids: [Pubkey; 3],
        keys: Vec<(VerifierKind, ProvingKey<Bn254>)>,
    ) -> Self {
        let mut keys = keys;
        let verifiers = VerifierKind::ALL.map(|kind| {
            let shape = kind.circuit_shape(tree_height);
            let witness: Arc<dyn WitnessCalculator> =
                Arc::new(CircuitWitnessCalculator::new(shape));
            let prover = match keys.iter().position(|(k, _)| *k == kind) {
                Some(i) => {
                    let (_, pk) = keys.swap_remove(i);
                    match Groth16Prover::new(pk) {
                        Ok(prover) => {
                            check_prover(kind, "<memory>", prover, shape.public_input_count())
                        }
                        Err(e) => Resource::unavailable("<memory>", e.to_string()),
                    }
                }
                None => Resource::unavailable("<memory>", "no proving key supplied"),
            };
            Arc::new(Verifier::new(
                kind,
                program_ids[kind.index()],
                tree_height,
                Resource::Loaded(witness),
                prover,
            ))
        });
        Self { verifiers }
    }

    /// Build from verifiers given in variant order (zero, one, two)
    pub fn from_verifiers(verifiers: [Verifier; 3]) -> anyhow::Result<Self> {
        for (verifier, kind) in verifiers.iter().zip(VerifierKind::ALL) {
            if verifier.kind() != kind {
                bail!("registry slot {kind} holds {}", verifier.kind());
            }
        }
        Ok(Self {
            verifiers: verifiers.map(Arc::new),
        })
    }

    pub fn get(&self, kind: VerifierKind) -> &Arc<Verifier> {
        &self.verifiers[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Verifier>> {
        self.verifiers.iter()
    }

    /// Select the variant whose arity is exactly `inputs` x `outputs` and
    /// whose CPI support matches `wants_cpi`.
    pub fn resolve(&self, inputs: usize, outputs: usize, wants_cpi: bool) -> Result<Arc<Verifier>> {
        self.verifiers
            .iter()
            .find(|v| {
                let config = v.config();
                config.ins == inputs
                    && config.outs == outputs
                    && v.kind().supports_cpi() == wants_cpi
            })
            .cloned()
            .ok_or(Error::UnsupportedShape {
                inputs,
                outputs,
                cpi: wants_cpi,
            })
    }

    pub fn resolve_shape(&self, shape: TxShape) -> Result<Arc<Verifier>> {
        self.resolve(shape.inputs, shape.outputs, shape.cpi)
    }

    /// Install the process-wide registry. Returns the rejected registry if
    /// one is already installed.
    pub fn install_global(
        registry: Arc<VerifierRegistry>,
    ) -> std::result::Result<(), Arc<VerifierRegistry>> {
        GLOBAL_REGISTRY.set(registry)
    }

    /// Process-wide registry, loaded from the global config on first use.
    pub fn global() -> anyhow::Result<&'static Arc<VerifierRegistry>> {
        if let Some(registry) = GLOBAL_REGISTRY.get() {
            return Ok(registry);
        }
        let settings = RegistrySettings::from_config(VeilConfig::global())?;
        Ok(GLOBAL_REGISTRY.get_or_init(|| Arc::new(VerifierRegistry::load(&settings))))
    }
}

fn load_verifier(
    kind: VerifierKind,
    program_id: Pubkey,
    tree_height: usize,
    paths: &ArtifactPaths,
) -> Verifier {
    let shape = kind.circuit_shape(tree_height);
    let loaded = load_witness_calculator(paths, shape);
    let witness: Resource<Arc<dyn WitnessCalculator>> = match loaded {
        Ok(calculator) => Resource::Loaded(Arc::new(calculator)),
        Err(e) => {
            warn!(verifier = %kind, error = %e, "circuit artifact unavailable");
            Resource::unavailable(display(&paths.manifest), e.to_string())
        }
    };

    let location = display(&paths.proving_key);
    let prover = match Groth16Prover::from_file(&paths.proving_key) {
        Ok(prover) => match manifest_vk_hash(&paths.manifest) {
            Some(expected) if expected != hex::encode(prover.vk_hash()) => Resource::unavailable(
                location,
                "proving key does not match the circuit manifest",
            ),
            _ => check_prover(kind, &location, prover, shape.public_input_count()),
        },
        Err(e) => {
            warn!(verifier = %kind, error = %e, "proving key unavailable");
            Resource::unavailable(location, e.to_string())
        }
    };

    Verifier::new(kind, program_id, tree_height, witness, prover)
}

fn check_prover(
    kind: VerifierKind,
    location: &str,
    prover: Groth16Prover,
    public_inputs: usize,
) -> Resource<Arc<Groth16Prover>> {
    if prover.public_input_count() != public_inputs {
        warn!(
            verifier = %kind,
            expected = public_inputs,
            found = prover.public_input_count(),
            "proving key built for another circuit"
        );
        return Resource::unavailable(
            location,
            format!(
                "key has {} public inputs, {kind} needs {public_inputs}",
                prover.public_input_count()
            ),
        );
    }
    Resource::Loaded(Arc::new(prover))
}

fn manifest_vk_hash(path: &Path) -> Option<String> {
    CircuitManifest::load(path).ok().map(|m| m.vk_hash)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> [Pubkey; 3] {
        [Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique()]
    }

    #[test]
    fn test_resolve_exact_arity() {
        let registry = VerifierRegistry::from_keys(4, ids(), Vec::new());

        assert_eq!(registry.resolve(2, 2, false).unwrap().kind(), VerifierKind::Zero);
        assert_eq!(registry.resolve(10, 2, false).unwrap().kind(), VerifierKind::One);
        assert_eq!(registry.resolve(4, 4, true).unwrap().kind(), VerifierKind::Two);
    }

    #[test]
    fn test_resolve_rejects_other_shapes() {
        let registry = VerifierRegistry::from_keys(4, ids(), Vec::new());

        let shapes = [(3, 2, false), (2, 3, false), (4, 4, false), (2, 2, true), (0, 0, false)];
        for (ins, outs, cpi) in shapes {
            assert!(matches!(
                registry.resolve(ins, outs, cpi),
                Err(Error::UnsupportedShape { inputs, outputs, .. })
                    if inputs == ins && outputs == outs
            ));
        }
    }

    #[test]
    fn test_missing_artifacts_are_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RegistrySettings {
            artifact_dir: dir.path().to_path_buf(),
            tree_height: 4,
            program_ids: ids(),
        };
        let registry = VerifierRegistry::load(&settings);

        let verifier = registry.resolve(2, 2, false).unwrap();
        assert!(!verifier.is_ready());
        assert_eq!(verifier.program_id(), &settings.program_ids[0]);
    }

    #[test]
    fn test_from_verifiers_checks_slots() {
        let make = |kind| {
            Verifier::new(
                kind,
                Pubkey::new_unique(),
                4,
                Resource::unavailable("-", "-"),
                Resource::unavailable("-", "-"),
            )
        };
        let ordered = [make(VerifierKind::Zero), make(VerifierKind::One), make(VerifierKind::Two)];
        assert!(VerifierRegistry::from_verifiers(ordered).is_ok());

        let swapped = [make(VerifierKind::One), make(VerifierKind::Zero), make(VerifierKind::Two)];
        let err = VerifierRegistry::from_verifiers(swapped).unwrap_err();
        assert!(err.to_string().contains("slot verifier_zero holds verifier_one"));
    }
}
