use serde::{Deserialize, Serialize};

/// Public input slots shared by every shape, in wire order
pub const ROOT: usize = 0;
pub const PUBLIC_AMOUNT: usize = 1;
pub const EXT_DATA_HASH: usize = 2;
pub const FEE_AMOUNT: usize = 3;
pub const MINT: usize = 4;
/// CPI-only slots
pub const VERIFIER: usize = 5;
pub const APP_HASH: usize = 6;
pub const KYC_MT_ROOT: usize = 7;

const BASE_SLOTS: usize = 5;
const CPI_SLOTS: usize = 3;

/// The statement a transaction circuit is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitShape {
    /// Spendable inputs
    pub ins: usize,
    /// Creatable outputs
    pub outs: usize,
    /// Whether the statement carries the CPI/KYC extension
    pub cpi: bool,
    pub tree_height: usize,
}

impl CircuitShape {
    pub fn new(ins: usize, outs: usize, cpi: bool, tree_height: usize) -> Self {
        Self {
            ins,
            outs,
            cpi,
            tree_height,
        }
    }

    pub fn nullifier_offset(&self) -> usize {
        BASE_SLOTS + if self.cpi { CPI_SLOTS } else { 0 }
    }

    pub fn leaf_offset(&self) -> usize {
        self.nullifier_offset() + self.ins
    }

    /// Number of public inputs, excluding the constant one
    pub fn public_input_count(&self) -> usize {
        self.leaf_offset() + self.outs
    }

    /// Stable identifier of the compiled circuit, recorded next to its keys
    pub fn circuit_id(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"veil-transaction-circuit-v1");
        hasher.update(&(self.ins as u64).to_le_bytes());
        hasher.update(&(self.outs as u64).to_le_bytes());
        hasher.update(&[self.cpi as u8]);
        hasher.update(&(self.tree_height as u64).to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl std::fmt::Display for CircuitShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}{} (height {})",
            self.ins,
            self.outs,
            if self.cpi { "+cpi" } else { "" },
            self.tree_height
        )
    }
}
