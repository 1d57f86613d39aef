//! Verifier key generation CLI
//!
//! Usage: veil-keygen [--variant all|zero|one|two] [--out-dir <dir>]
//!                    [--tree-height <n>] [--seed <n>] [--force]
//!
//! Runs a circuit-specific Groth16 setup per verifier variant and writes
//! `<name>.pk`, `<name>.vk` and `<name>.circuit.json` to the artifact
//! directory. The setup randomness is derived from `--seed`; keys produced
//! this way are for development clusters only.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use veil_config::VeilConfig;
use veil_core::VerifierKind;
use veil_prover::artifacts::{ArtifactPaths, write_artifacts};
use veil_prover::groth16::setup;

#[derive(Parser, Debug)]
#[command(name = "veil-keygen")]
#[command(about = "Generate Groth16 keys and circuit manifests for the Veil verifiers")]
struct Args {
    /// Variant to generate: all, zero, one or two
    #[arg(long, default_value = "all")]
    variant: String,

    /// Artifact directory (default: verifiers.artifact_dir from config)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Commitment tree height (default: verifiers.tree_height from config)
    #[arg(long)]
    tree_height: Option<usize>,

    /// Seed for the setup randomness
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Overwrite existing artifacts
    #[arg(long, short)]
    force: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = VeilConfig::global();

    let kinds = match args.variant.as_str() {
        "all" => VerifierKind::ALL.to_vec(),
        other => vec![other.parse::<VerifierKind>().map_err(|e| anyhow::anyhow!(e))?],
    };
    let out_dir = args.out_dir.unwrap_or_else(|| config.verifiers.artifact_dir());
    let tree_height = args.tree_height.unwrap_or(config.verifiers.tree_height);
    if tree_height == 0 || tree_height > 32 {
        bail!("tree height must be between 1 and 32, got {tree_height}");
    }

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create artifact directory {}", out_dir.display()))?;

    println!("Veil verifier key generation");
    println!("============================");
    println!("  Artifact dir: {}", out_dir.display());
    println!("  Tree height:  {tree_height}");
    println!();

    for kind in kinds {
        let paths = ArtifactPaths::new(&out_dir, kind.name());
        if !args.force && paths.exist() {
            println!("{kind}: artifacts already exist, use --force to regenerate");
            continue;
        }

        let shape = kind.circuit_shape(tree_height);
        println!(
            "{kind}: setup for circuit {shape} ({} public inputs)...",
            shape.public_input_count()
        );

        let started = Instant::now();
        let (pk, vk) = setup(shape, args.seed).with_context(|| format!("setup failed for {kind}"))?;
        let manifest = write_artifacts(&paths, kind.name(), shape, &pk, &vk)
            .with_context(|| format!("failed to write artifacts for {kind}"))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(verifier = %kind, elapsed_ms, "keys generated");
        println!("  Proving key:   {}", paths.proving_key.display());
        println!("  Verifying key: {}", paths.verifying_key.display());
        println!("  Manifest:      {}", paths.manifest.display());
        println!("  Circuit id:    {}", manifest.circuit_id);
        println!("  VK hash:       {}", manifest.vk_hash);
        println!();
    }

    println!("Key generation complete.");
    Ok(())
}
