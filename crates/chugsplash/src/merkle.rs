//! Merkle commitments over ordered leaves.
//!
//! The tree is binary and padded per level: when a level has an odd number of nodes, the last
//! node is paired with the default hash of that level. The default hash of the leaf level is
//! `keccak256(bytes32(0))`, and the default hash of every higher level is the hash of two default
//! hashes of the level below. This is the layout verified by the manager, so a proof is only valid
//! for the exact number of leaves it was built for.

use alloy_primitives::{keccak256, B256};

/// The root committed for an empty list of leaves.
pub const EMPTY_ROOT: B256 = B256::ZERO;

/// Hashes two nodes into their parent.
#[inline]
pub fn hash_pair(left: B256, right: B256) -> B256 {
    keccak256(left.concat_const::<32, 64>(right))
}

/// Returns the default hashes of levels `0..depth`.
fn default_hashes(depth: usize) -> Vec<B256> {
    let mut defaults = Vec::with_capacity(depth);
    let mut current = keccak256(B256::ZERO);
    for _ in 0..depth {
        defaults.push(current);
        current = hash_pair(current, current);
    }
    defaults
}

/// Number of levels between the leaves and the root of a tree with `num_leaves` leaves.
pub const fn tree_depth(num_leaves: usize) -> usize {
    if num_leaves <= 1 {
        0
    } else {
        (usize::BITS - (num_leaves - 1).leading_zeros()) as usize
    }
}

/// A Merkle tree holding every level, so that proofs can be produced for any leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level is the root.
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Builds the tree over `leaves`.
    pub fn new(leaves: Vec<B256>) -> Self {
        if leaves.is_empty() {
            return Self { levels: vec![] };
        }

        let defaults = default_hashes(tree_depth(leaves.len()));
        let mut levels = Vec::with_capacity(defaults.len() + 1);
        let mut current = leaves;
        for default in defaults {
            let next = current
                .chunks(2)
                .map(|pair| hash_pair(pair[0], pair.get(1).copied().unwrap_or(default)))
                .collect();
            levels.push(std::mem::replace(&mut current, next));
        }
        levels.push(current);
        Self { levels }
    }

    /// The number of leaves.
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The leaves of the tree.
    pub fn leaves(&self) -> &[B256] {
        self.levels.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// The root, or [`EMPTY_ROOT`] for an empty tree.
    pub fn root(&self) -> B256 {
        self.levels.last().map_or(EMPTY_ROOT, |level| level[0])
    }

    /// The sibling hashes proving the leaf at `index`, ordered from the leaf level upwards.
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.len() {
            return None;
        }

        let defaults = default_hashes(self.levels.len() - 1);
        let mut proof = Vec::with_capacity(defaults.len());
        let mut position = index;
        for (level, default) in self.levels.iter().zip(defaults) {
            let sibling = position ^ 1;
            proof.push(level.get(sibling).copied().unwrap_or(default));
            position >>= 1;
        }
        Some(proof)
    }
}

/// Computes the root over `leaves` without keeping the tree around.
pub fn merkle_root(leaves: &[B256]) -> B256 {
    MerkleTree::new(leaves.to_vec()).root()
}

/// Verifies that `leaf` sits at `index` of a tree with `total_leaves` leaves committed by `root`.
///
/// The tree size is part of the check: a proof must have exactly [`tree_depth`] siblings and the
/// index must be in range, so proofs built against a differently sized tree are rejected.
pub fn verify_proof(
    root: B256,
    leaf: B256,
    index: u64,
    siblings: &[B256],
    total_leaves: u64,
) -> bool {
    if total_leaves == 0 || index >= total_leaves {
        return false;
    }
    let Ok(total) = usize::try_from(total_leaves) else { return false };
    if siblings.len() != tree_depth(total) {
        return false;
    }

    let mut computed = leaf;
    let mut position = index;
    for sibling in siblings {
        computed = if position & 1 == 1 {
            hash_pair(*sibling, computed)
        } else {
            hash_pair(computed, *sibling)
        };
        position >>= 1;
    }
    computed == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(i: u8) -> B256 {
        keccak256([i])
    }

    #[test]
    fn test_depth() {
        assert_eq!(tree_depth(0), 0);
        assert_eq!(tree_depth(1), 0);
        assert_eq!(tree_depth(2), 1);
        assert_eq!(tree_depth(3), 2);
        assert_eq!(tree_depth(4), 2);
        assert_eq!(tree_depth(5), 3);
        assert_eq!(tree_depth(1024), 10);
        assert_eq!(tree_depth(1025), 11);
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new(vec![]);
        assert_eq!(tree.root(), EMPTY_ROOT);
        assert!(tree.proof(0).is_none());
        assert!(!verify_proof(EMPTY_ROOT, leaf(0), 0, &[], 0));
    }

    #[test]
    fn test_single_leaf_is_root() {
        let tree = MerkleTree::new(vec![leaf(1)]);
        assert_eq!(tree.root(), leaf(1));
        assert_eq!(tree.proof(0), Some(vec![]));
        assert!(verify_proof(tree.root(), leaf(1), 0, &[], 1));
    }

    #[test]
    fn test_three_leaves_pad_with_default() {
        // Level 0: l0, l1, l2, default0
        // Level 1: hash(l0, l1), hash(l2, default0)
        let tree = MerkleTree::new(vec![leaf(0), leaf(1), leaf(2)]);
        let default0 = keccak256(B256::ZERO);
        let expected = hash_pair(hash_pair(leaf(0), leaf(1)), hash_pair(leaf(2), default0));
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.proof(2), Some(vec![default0, hash_pair(leaf(0), leaf(1))]));
    }

    #[test]
    fn test_five_leaves_pad_upper_level() {
        let tree = MerkleTree::new((0..5).map(leaf).collect());
        let default0 = keccak256(B256::ZERO);
        let default1 = hash_pair(default0, default0);
        let left = hash_pair(hash_pair(leaf(0), leaf(1)), hash_pair(leaf(2), leaf(3)));
        let right = hash_pair(hash_pair(leaf(4), default0), default1);
        assert_eq!(tree.root(), hash_pair(left, right));
    }

    #[test]
    fn test_proof_rejected_for_other_tree_size() {
        let leaves: Vec<_> = (0..4).map(leaf).collect();
        let tree = MerkleTree::new(leaves);
        let proof = tree.proof(1).unwrap();
        assert!(verify_proof(tree.root(), leaf(1), 1, &proof, 4));
        // same depth, different padding
        let three = MerkleTree::new((0..3).map(leaf).collect());
        assert!(!verify_proof(three.root(), leaf(1), 1, &proof, 3));
        // different depth
        assert!(!verify_proof(tree.root(), leaf(1), 1, &proof, 5));
        assert!(!verify_proof(tree.root(), leaf(1), 4, &proof, 4));
    }
}
