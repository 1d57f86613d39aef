//! Merkle Tree for Note Commitments
//!
//! Append-only sparse Poseidon tree. Only non-empty nodes are stored; empty
//! subtrees hash to precomputed per-level roots.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (Note Commitments)
//! ```

use std::collections::{HashMap, VecDeque};

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::Commitment;
use crate::field::FieldElement;
use crate::poseidon::poseidon_hash;

/// Tree height used by the deployed verifier circuits
pub const DEFAULT_TREE_HEIGHT: usize = 18;
/// Roots a transaction may reference besides the current one
pub const DEFAULT_ROOT_HISTORY: usize = 20;

const MAX_TREE_HEIGHT: usize = 63;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("merkle tree of height {height} is full ({capacity} leaves)")]
    TreeFull { height: usize, capacity: u64 },

    #[error("unsupported merkle tree height {0}")]
    UnsupportedHeight(usize),
}

/// A Merkle path proving inclusion of a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<[u8; 32]>,
    /// Direction bits (true = current node is the right child)
    pub path_bits: Vec<bool>,
    pub position: u64,
}

impl MerklePath {
    /// Placeholder path for zero-value padding notes
    pub fn empty(height: usize) -> Self {
        Self {
            siblings: vec![[0u8; 32]; height],
            path_bits: vec![false; height],
            position: 0,
        }
    }

    pub fn height(&self) -> usize {
        self.siblings.len()
    }

    pub fn verify(&self, leaf: &[u8; 32], root: &[u8; 32]) -> bool {
        compute_root_from_path(leaf, &self.siblings, &self.path_bits) == *root
    }

    pub fn to_field_elements(&self) -> Vec<Fr> {
        self.siblings
            .iter()
            .map(|s| FieldElement(*s).to_field())
            .collect()
    }
}

pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let parent = poseidon_hash(&[FieldElement(*left).to_field(), FieldElement(*right).to_field()]);
    FieldElement::from_field(parent).0
}

pub fn compute_root_from_path(
    leaf: &[u8; 32],
    siblings: &[[u8; 32]],
    path_bits: &[bool],
) -> [u8; 32] {
    siblings
        .iter()
        .zip(path_bits)
        .fold(*leaf, |current, (sibling, is_right)| {
            if *is_right {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            }
        })
}

/// Precomputed roots of empty subtrees, one per level
#[derive(Debug, Clone)]
pub struct MerkleHasher {
    empty_roots: Vec<[u8; 32]>,
}

impl MerkleHasher {
    pub fn new(height: usize) -> Self {
        let empty_leaf = FieldElement::from_field(poseidon_hash(&[Fr::from(0u64)])).0;
        let mut empty_roots = Vec::with_capacity(height + 1);
        empty_roots.push(empty_leaf);
        for level in 0..height {
            let below = empty_roots[level];
            empty_roots.push(hash_pair(&below, &below));
        }
        Self { empty_roots }
    }

    pub fn empty_root(&self, level: usize) -> &[u8; 32] {
        &self.empty_roots[level]
    }
}

/// Sparse append-only Merkle tree for note commitments
#[derive(Debug, Clone)]
pub struct MerkleTree {
    height: usize,
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), [u8; 32]>,
    next_index: u64,
    hasher: MerkleHasher,
    root: [u8; 32],
}

impl MerkleTree {
    pub fn new(height: usize) -> Result<Self, MerkleError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(MerkleError::UnsupportedHeight(height));
        }
        let hasher = MerkleHasher::new(height);
        let root = *hasher.empty_root(height);

        Ok(Self {
            height,
            nodes: HashMap::new(),
            next_index: 0,
            hasher,
            root,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    pub fn next_position(&self) -> u64 {
        self.next_index
    }

    /// Append a commitment and return its position
    pub fn insert(&mut self, commitment: &Commitment) -> Result<u64, MerkleError> {
        if self.next_index >= self.capacity() {
            return Err(MerkleError::TreeFull {
                height: self.height,
                capacity: self.capacity(),
            });
        }
        let position = self.next_index;
        self.nodes.insert((0, position), commitment.0);

        let mut index = position;
        let mut current = commitment.0;
        for level in 0..self.height {
            let sibling = self.node(level, index ^ 1);
            current = if index & 1 == 1 {
                hash_pair(&sibling, &current)
            } else {
                hash_pair(&current, &sibling)
            };
            index >>= 1;
            self.nodes.insert((level + 1, index), current);
        }

        self.root = current;
        self.next_index += 1;
        Ok(position)
    }

    /// Authentication path for an inserted leaf
    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_index {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.height);
        let mut path_bits = Vec::with_capacity(self.height);
        let mut index = position;
        for level in 0..self.height {
            path_bits.push(index & 1 == 1);
            siblings.push(self.node(level, index ^ 1));
            index >>= 1;
        }

        Some(MerklePath {
            siblings,
            path_bits,
            position,
        })
    }

    pub fn get(&self, position: u64) -> Option<Commitment> {
        self.nodes.get(&(0, position)).map(|h| Commitment(*h))
    }

    fn node(&self, level: usize, index: u64) -> [u8; 32] {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or_else(|| *self.hasher.empty_root(level))
    }
}

/// Bounded history of recent roots
///
/// Lets a transaction reference a root that was current when its proof was
/// built even if other transactions landed in between.
#[derive(Debug, Clone)]
pub struct RootHistory {
    roots: VecDeque<[u8; 32]>,
    capacity: usize,
}

impl RootHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, root: [u8; 32]) {
        if self.roots.len() == self.capacity {
            self.roots.pop_front();
        }
        self.roots.push_back(root);
    }

    pub fn is_valid(&self, root: &[u8; 32]) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<&[u8; 32]> {
        self.roots.back()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl Default for RootHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(v: u64) -> Commitment {
        Commitment::from_field(Fr::from(v))
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new(4).unwrap();
        assert_eq!(tree.next_position(), 0);
        assert_eq!(tree.root(), *MerkleHasher::new(4).empty_root(4));
    }

    #[test]
    fn test_insert_and_path() {
        let mut tree = MerkleTree::new(4).unwrap();
        let c1 = leaf(1);
        let c2 = leaf(2);

        assert_eq!(tree.insert(&c1).unwrap(), 0);
        assert_eq!(tree.insert(&c2).unwrap(), 1);

        let path1 = tree.path(0).unwrap();
        assert!(path1.verify(&c1.0, &tree.root()));
        let path2 = tree.path(1).unwrap();
        assert!(path2.verify(&c2.0, &tree.root()));
        assert_eq!(path2.path_bits[0], true);
        assert!(tree.path(2).is_none());
    }

    #[test]
    fn test_path_rejects_wrong_leaf() {
        let mut tree = MerkleTree::new(4).unwrap();
        tree.insert(&leaf(1)).unwrap();
        let path = tree.path(0).unwrap();
        assert!(!path.verify(&leaf(99).0, &tree.root()));
    }

    #[test]
    fn test_tree_full() {
        let mut tree = MerkleTree::new(1).unwrap();
        tree.insert(&leaf(1)).unwrap();
        tree.insert(&leaf(2)).unwrap();
        assert_eq!(
            tree.insert(&leaf(3)),
            Err(MerkleError::TreeFull {
                height: 1,
                capacity: 2
            })
        );
    }

    #[test]
    fn test_rejects_zero_height() {
        assert_eq!(MerkleTree::new(0).unwrap_err(), MerkleError::UnsupportedHeight(0));
    }

    #[test]
    fn test_root_history_evicts_oldest() {
        let mut history = RootHistory::new(2);
        history.push([1u8; 32]);
        history.push([2u8; 32]);
        history.push([3u8; 32]);

        assert!(!history.is_valid(&[1u8; 32]));
        assert!(history.is_valid(&[2u8; 32]));
        assert_eq!(history.current(), Some(&[3u8; 32]));
        assert_eq!(history.len(), 2);
    }
}
