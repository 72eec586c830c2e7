//! Merkle root over a block's transaction references.

use super::{hash_pair, Hash};

/// Compute the merkle root of a list of hashes
///
/// An empty list yields the zero hash. Odd levels duplicate their last element.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    let mut level: Vec<Hash> = hashes.to_vec();
    if level.is_empty() {
        return Hash::zero();
    }

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    level[0]
}
