//! Acceptance gate state

use std::collections::{HashMap, HashSet};

use crate::consensus::SourceBlock;
use crate::crypto::Hash;
use crate::validation::TxRef;

/// Result of offering a block to the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Indexed; it may or may not have become the best block
    Accepted,
    /// Failed a structural, contextual or indexing check
    Rejected,
    /// Held until its predecessor arrives
    Orphan,
    /// Some transaction bodies could not be found
    Incomplete { missing: Vec<TxRef> },
    Duplicate,
    /// Dropped without judgement
    Ignored,
}

/// Orphans keyed by the hash of the block they are waiting for
#[derive(Debug, Default)]
pub struct Gate {
    orphans: HashMap<Hash, SourceBlock>,
    hashes: HashSet<Hash>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn is_waiting_on(&self, prev: &Hash) -> bool {
        self.orphans.contains_key(prev)
    }

    pub fn insert(&mut self, block: SourceBlock) {
        self.hashes.insert(block.hash());
        if let Some(replaced) = self.orphans.insert(block.prev_hash(), block) {
            self.hashes.remove(&replaced.hash());
        }
    }

    /// Remove the orphan waiting on `prev`
    pub fn take_child(&mut self, prev: &Hash) -> Option<SourceBlock> {
        let block = self.orphans.remove(prev)?;
        self.hashes.remove(&block.hash());
        Some(block)
    }

    /// Drop every orphan descending from `root`; returns how many went
    pub fn discard_descendants(&mut self, root: &Hash) -> usize {
        let mut parent = *root;
        let mut dropped = 0;
        while let Some(block) = self.take_child(&parent) {
            parent = block.hash();
            dropped += 1;
        }
        dropped
    }
}
