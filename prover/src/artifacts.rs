//! On-disk circuit artifacts
//!
//! ```text
//! <artifact_dir>/<name>.pk             compressed ProvingKey<Bn254>
//! <artifact_dir>/<name>.vk             compressed VerifyingKey<Bn254>
//! <artifact_dir>/<name>.circuit.json   manifest binding the keys to a circuit shape
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ark_bn254::Bn254;
use ark_groth16::{ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::groth16::compute_vk_hash;
use crate::shape::CircuitShape;
use crate::witness::CircuitWitnessCalculator;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid circuit manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("artifact {path} was built for circuit {found}, expected {expected}")]
    ShapeMismatch {
        path: String,
        expected: CircuitShape,
        found: CircuitShape,
    },

    #[error("key (de)serialization failed for {path}: {reason}")]
    Serialization { path: String, reason: String },
}

/// File locations for one verifier's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub proving_key: PathBuf,
    pub verifying_key: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            proving_key: dir.join(format!("{name}.pk")),
            verifying_key: dir.join(format!("{name}.vk")),
            manifest: dir.join(format!("{name}.circuit.json")),
        }
    }

    pub fn exist(&self) -> bool {
        self.proving_key.exists() || self.verifying_key.exists() || self.manifest.exists()
    }
}

/// Describes the circuit a key pair was generated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitManifest {
    pub name: String,
    pub ins: usize,
    pub outs: usize,
    pub cpi: bool,
    pub tree_height: usize,
    /// hex blake3 of the shape
    pub circuit_id: String,
    /// hex blake3 of the compressed verifying key
    pub vk_hash: String,
}

impl CircuitManifest {
    pub fn new(name: &str, shape: CircuitShape, vk_hash: [u8; 32]) -> Self {
        Self {
            name: name.to_string(),
            ins: shape.ins,
            outs: shape.outs,
            cpi: shape.cpi,
            tree_height: shape.tree_height,
            circuit_id: hex::encode(shape.circuit_id()),
            vk_hash: hex::encode(vk_hash),
        }
    }

    pub fn shape(&self) -> CircuitShape {
        CircuitShape::new(self.ins, self.outs, self.cpi, self.tree_height)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let contents = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|e| ArtifactError::Manifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), ArtifactError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ArtifactError::Manifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Reject a manifest compiled for another statement or with a tampered id.
    pub fn check(&self, path: &Path, expected: CircuitShape) -> Result<(), ArtifactError> {
        let found = self.shape();
        if found != expected {
            return Err(ArtifactError::ShapeMismatch {
                path: path.display().to_string(),
                expected,
                found,
            });
        }
        if self.circuit_id != hex::encode(expected.circuit_id()) {
            return Err(ArtifactError::Manifest {
                path: path.display().to_string(),
                reason: "circuit id does not match the declared shape".into(),
            });
        }
        Ok(())
    }
}

/// Load the witness routine for `expected`, validated against its manifest.
pub fn load_witness_calculator(
    paths: &ArtifactPaths,
    expected: CircuitShape,
) -> Result<CircuitWitnessCalculator, ArtifactError> {
    let manifest = CircuitManifest::load(&paths.manifest)?;
    manifest.check(&paths.manifest, expected)?;
    Ok(CircuitWitnessCalculator::new(expected))
}

pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey<Bn254>, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    VerifyingKey::<Bn254>::deserialize_compressed(bytes.as_slice()).map_err(|e| {
        ArtifactError::Serialization {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

/// Write the key pair and its manifest.
pub fn write_artifacts(
    paths: &ArtifactPaths,
    name: &str,
    shape: CircuitShape,
    pk: &ProvingKey<Bn254>,
    vk: &VerifyingKey<Bn254>,
) -> Result<CircuitManifest, ArtifactError> {
    write_compressed(&paths.proving_key, pk)?;
    write_compressed(&paths.verifying_key, vk)?;

    let vk_hash = compute_vk_hash(vk).map_err(|e| ArtifactError::Serialization {
        path: paths.verifying_key.display().to_string(),
        reason: e.to_string(),
    })?;
    let manifest = CircuitManifest::new(name, shape, vk_hash);
    manifest.write(&paths.manifest)?;
    Ok(manifest)
}

fn write_compressed<T: CanonicalSerialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let mut bytes = Vec::new();
    value
        .serialize_compressed(&mut bytes)
        .map_err(|e| ArtifactError::Serialization {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    fs::write(path, &bytes).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })
}
