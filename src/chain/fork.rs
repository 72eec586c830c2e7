//! Fork choice and reorganization

use tracing::{info, warn};

use crate::consensus::BlockState;
use crate::crypto::Hash;
use crate::storage::Ledger;

use super::{connect_block, disconnect_block, ChainError, Context, Effects};

/// Snapshot of the best chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestChain {
    pub hash: Hash,
    pub trust: u64,
    pub height: u32,
    pub tip: BlockState,
    pub genesis: BlockState,
    /// Height of the tip's checkpoint block
    pub checkpoint_height: u32,
}

impl BestChain {
    /// Rebuild the snapshot for tip `hash` from the ledger
    pub fn load(ledger: &Ledger<'_>, hash: &Hash) -> Result<Self, ChainError> {
        let tip = ledger.read_block(hash)?.ok_or(ChainError::MissingBlock(*hash))?;
        let genesis_hash = ledger.read_height(0)?.ok_or(ChainError::NoGenesis)?;
        let genesis = ledger
            .read_block(&genesis_hash)?
            .ok_or(ChainError::MissingBlock(genesis_hash))?;
        let checkpoint = ledger
            .read_block(&tip.hash_checkpoint)?
            .ok_or(ChainError::MissingBlock(tip.hash_checkpoint))?;

        Ok(Self {
            hash: *hash,
            trust: tip.chain_trust,
            height: tip.height(),
            checkpoint_height: checkpoint.height(),
            tip,
            genesis,
        })
    }
}

/// Outcome of offering an indexed block to the fork choice
#[derive(Debug, Clone)]
pub enum Selection {
    /// The block became the first block of the chain
    Genesis(BestChain),
    /// Stored, but barred from the best chain
    Conflicted,
    /// Stored on a side branch
    NotBetter,
    Reorganized(Reorg),
}

impl Selection {
    /// The new best chain, if it changed
    pub fn best(&self) -> Option<&BestChain> {
        match self {
            Selection::Genesis(best) => Some(best),
            Selection::Reorganized(reorg) => Some(&reorg.best),
            Selection::Conflicted | Selection::NotBetter => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reorg {
    /// Tip-first
    pub disconnected: Vec<BlockState>,
    /// Ancestor-first
    pub connected: Vec<BlockState>,
    pub best: BestChain,
}

/// Whether `candidate` beats the current best tip `best`.
///
/// Old block versions and hybrid blocks compare raw chain trust. Everything
/// else counts the channels where the candidate's accumulated weight ties or
/// exceeds the best chain's.
pub fn prefers(candidate: &BlockState, best: &BlockState) -> bool {
    if candidate.uses_trust_scoring() {
        return candidate.chain_trust > best.chain_trust;
    }

    let mut equals = 0;
    let mut greater = 0;
    for (ours, theirs) in candidate.channel_weight.iter().zip(&best.channel_weight) {
        if ours == theirs {
            equals += 1;
        } else if ours > theirs {
            greater += 1;
        }
    }

    // A branch that is more than one block taller breaks a one-one split
    if candidate.height() > best.height().saturating_add(1) && equals == 1 && greater == 1 {
        greater += 1;
    }

    (equals == 2 && greater == 1) || greater > 1
}

/// Offer the freshly indexed `state` to the fork choice
pub fn set_best(
    state: &BlockState,
    ledger: &Ledger<'_>,
    context: &Context,
    best: Option<&BestChain>,
    effects: &mut Effects,
) -> Result<Selection, ChainError> {
    let Some(best) = best else {
        if !state.is_genesis() {
            return Err(ChainError::NoGenesis);
        }
        let hash = state.hash();
        connect_block(&hash, ledger, context, effects)?;
        ledger.write_best(&hash)?;
        let best = BestChain::load(ledger, &hash)?;
        info!(%hash, "genesis block initialized");
        return Ok(Selection::Genesis(best));
    };

    if state.conflicted {
        warn!(hash = %state.hash(), height = state.height(), "conflicted block kept off the best chain");
        return Ok(Selection::Conflicted);
    }
    if !prefers(state, &best.tip) {
        return Ok(Selection::NotBetter);
    }

    let reorg = reorganize(state, ledger, context, best, effects)?;
    info!(
        hash = %reorg.best.hash,
        height = reorg.best.height,
        trust = reorg.best.trust,
        weights = ?reorg.best.tip.channel_weight,
        "new best block"
    );
    Ok(Selection::Reorganized(reorg))
}

fn step_back(state: &BlockState, ledger: &Ledger<'_>) -> Result<BlockState, ChainError> {
    ledger
        .prev(state)?
        .ok_or(ChainError::MissingPredecessor(state.prev_hash()))
}

/// Last block shared by the branches ending in `a` and `b`
pub fn common_ancestor(a: &BlockState, b: &BlockState, ledger: &Ledger<'_>) -> Result<BlockState, ChainError> {
    let mut fork = a.clone();
    let mut longer = b.clone();
    while fork.hash() != longer.hash() {
        while longer.height() > fork.height() {
            longer = step_back(&longer, ledger)?;
        }
        if fork.hash() == longer.hash() {
            break;
        }
        fork = step_back(&fork, ledger)?;
    }
    Ok(fork)
}

/// Blocks from `tip` down to, but excluding, `ancestor`
fn branch(tip: &BlockState, ancestor: &Hash, ledger: &Ledger<'_>) -> Result<Vec<BlockState>, ChainError> {
    let mut blocks = Vec::new();
    let mut cursor = tip.clone();
    while cursor.hash() != *ancestor {
        let prev = step_back(&cursor, ledger)?;
        blocks.push(cursor);
        cursor = prev;
    }
    Ok(blocks)
}

/// Move the best chain from `best` to `target`.
///
/// Disconnects the old branch tip-first, then connects the new branch
/// ancestor-first. When `target` is an ancestor of the best tip nothing is
/// connected and the disconnected blocks are erased.
pub fn reorganize(
    target: &BlockState,
    ledger: &Ledger<'_>,
    context: &Context,
    best: &BestChain,
    effects: &mut Effects,
) -> Result<Reorg, ChainError> {
    let ancestor = common_ancestor(&best.tip, target, ledger)?;
    let disconnected = branch(&best.tip, &ancestor.hash(), ledger)?;
    let mut connected = branch(target, &ancestor.hash(), ledger)?;
    connected.reverse();

    for block in &disconnected {
        let hash = block.hash();
        disconnect_block(&hash, ledger, context, effects).map_err(|e| ChainError::Reorg {
            hash,
            source: Box::new(e),
        })?;
    }

    if connected.is_empty() {
        for block in &disconnected {
            ledger.erase_block(&block.hash())?;
        }
    }

    for block in &connected {
        let hash = block.hash();
        connect_block(&hash, ledger, context, effects).map_err(|e| ChainError::Reorg {
            hash,
            source: Box::new(e),
        })?;
    }

    let hash = target.hash();
    ledger.write_best(&hash)?;
    let new_best = BestChain::load(ledger, &hash)?;

    if !disconnected.is_empty() {
        info!(
            ancestor = %ancestor.hash(),
            disconnect = disconnected.len(),
            connect = connected.len(),
            from = %best.hash,
            to = %hash,
            "REORGANIZE"
        );
    }

    Ok(Reorg {
        disconnected,
        connected,
        best: new_best,
    })
}
