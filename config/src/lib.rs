//! Veil Configuration
//!
//! Handles loading configuration from:
//! 1. VEIL_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.veil/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance, set once per process
pub static GLOBAL_CONFIG: OnceLock<VeilConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".veil";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_COMMITMENT: &str = "confirmed";
const DEFAULT_ARTIFACT_DIR: &str = "./artifacts";
const DEFAULT_TREE_HEIGHT: usize = 18;
const DEFAULT_VERIFIER_ZERO: &str = "J1RRetZ4ujphU75LP8RadjXMf3sA12yC2R44CF7PmU7i";
const DEFAULT_VERIFIER_ONE: &str = "3KS2k14CmtnuVv2fvYcvdrNgC94Y11WETBpMUGgXyWZL";
const DEFAULT_VERIFIER_TWO: &str = "GFDwN8PXuKZG2d2JLxRhbggXYe9eQHoGYoYK5K3G5tV8";

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeilConfig {
    #[serde(default)]
    pub solana: SolanaConfig,
    #[serde(default)]
    pub verifiers: VerifiersConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
}

/// Solana connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default)]
    pub payer_keypair_path: Option<String>,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.into(),
            commitment: DEFAULT_COMMITMENT.into(),
            payer_keypair_path: None,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}
fn default_commitment() -> String {
    DEFAULT_COMMITMENT.into()
}

/// Verifier programs and their circuit artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiersConfig {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    #[serde(default = "default_tree_height")]
    pub tree_height: usize,
    #[serde(default = "default_verifier_zero")]
    pub zero_program_id: String,
    #[serde(default = "default_verifier_one")]
    pub one_program_id: String,
    #[serde(default = "default_verifier_two")]
    pub two_program_id: String,
}

impl Default for VerifiersConfig {
    fn default() -> Self {
        Self {
            artifact_dir: DEFAULT_ARTIFACT_DIR.into(),
            tree_height: DEFAULT_TREE_HEIGHT,
            zero_program_id: DEFAULT_VERIFIER_ZERO.into(),
            one_program_id: DEFAULT_VERIFIER_ONE.into(),
            two_program_id: DEFAULT_VERIFIER_TWO.into(),
        }
    }
}

fn default_artifact_dir() -> String {
    DEFAULT_ARTIFACT_DIR.into()
}
fn default_tree_height() -> usize {
    DEFAULT_TREE_HEIGHT
}
fn default_verifier_zero() -> String {
    DEFAULT_VERIFIER_ZERO.into()
}
fn default_verifier_one() -> String {
    DEFAULT_VERIFIER_ONE.into()
}
fn default_verifier_two() -> String {
    DEFAULT_VERIFIER_TWO.into()
}

impl VerifiersConfig {
    pub fn artifact_dir(&self) -> PathBuf {
        PathBuf::from(&self.artifact_dir)
    }

    /// Parsed program ids in variant order (zero, one, two)
    pub fn program_ids(&self) -> Result<[Pubkey; 3]> {
        let parse = |label: &str, value: &str| {
            Pubkey::from_str(value).with_context(|| format!("Invalid {label} program id: {value}"))
        };
        Ok([
            parse("verifier zero", &self.zero_program_id)?,
            parse("verifier one", &self.one_program_id)?,
            parse("verifier two", &self.two_program_id)?,
        ])
    }
}

/// Submission retry and confirmation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            confirm_timeout_secs: DEFAULT_CONFIRM_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}
fn default_confirm_timeout() -> u64 {
    DEFAULT_CONFIRM_TIMEOUT_SECS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_compute_unit_limit() -> u32 {
    DEFAULT_COMPUTE_UNIT_LIMIT
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {key}={v}"),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl VeilConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("VEIL_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        // Solana
        env_string("SOLANA_RPC_URL", &mut self.solana.rpc_url);
        env_string("VEIL_COMMITMENT", &mut self.solana.commitment);
        env_option_string("VEIL_PAYER_KEYPAIR", &mut self.solana.payer_keypair_path);

        // Verifiers
        env_string("VEIL_ARTIFACT_DIR", &mut self.verifiers.artifact_dir);
        env_parse("VEIL_TREE_HEIGHT", &mut self.verifiers.tree_height);
        env_string("VEIL_VERIFIER_ZERO", &mut self.verifiers.zero_program_id);
        env_string("VEIL_VERIFIER_ONE", &mut self.verifiers.one_program_id);
        env_string("VEIL_VERIFIER_TWO", &mut self.verifiers.two_program_id);

        // Submission
        env_parse("VEIL_MAX_RETRIES", &mut self.submission.max_retries);
        env_parse("VEIL_RETRY_BASE_MS", &mut self.submission.retry_base_ms);
        env_parse(
            "VEIL_CONFIRM_TIMEOUT_SECS",
            &mut self.submission.confirm_timeout_secs,
        );
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.solana.payer_keypair_path = Some("~/.config/solana/id.json".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static VeilConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: VeilConfig) -> Result<(), VeilConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let config = VeilConfig::default();
        assert_eq!(config.verifiers.tree_height, 18);
        assert_eq!(config.submission.max_retries, 3);
        assert!(config.verifiers.program_ids().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[verifiers]\ntree_height = 4\n\n[submission]\nmax_retries = 7\n",
        )
        .unwrap();

        let config = VeilConfig::parse_file(&path).unwrap();
        assert_eq!(config.verifiers.tree_height, 4);
        assert_eq!(config.submission.max_retries, 7);
        assert_eq!(config.submission.retry_base_ms, DEFAULT_RETRY_BASE_MS);
        assert_eq!(config.solana.commitment, "confirmed");
    }

    #[test]
    fn test_invalid_program_id_rejected() {
        let mut config = VerifiersConfig::default();
        config.one_program_id = "not-a-key".into();
        assert!(config.program_ids().is_err());
    }

    #[test]
    fn test_sample_roundtrips() {
        let sample = VeilConfig::generate_sample();
        let parsed: VeilConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.verifiers.zero_program_id, DEFAULT_VERIFIER_ZERO);
    }
}
