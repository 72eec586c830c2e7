//! The chain context
//!
//! `ChainStore` owns the database, the collaborators and the best-chain
//! snapshot. Every mutating pipeline holds the gate lock from the first read
//! to the last side effect, so at most one block is processed at a time.
//! Readers take the snapshot lock only and see either the old or the new
//! best chain, never a half-applied reorganization.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use crate::consensus::{accept_block, check_block, BlockState, SourceBlock};
use crate::config::ChainConfig;
use crate::crypto::Hash;
use crate::mempool::Mempool;
use crate::node::Announcement;
use crate::storage::{KeyValueStore, Ledger, StagedStore};
use crate::validation::Transaction;

use super::{index_block, reorganize, BestChain, ChainError, Context, Effects, Gate, ProcessStatus, Reorg, Selection};

pub struct ChainStore<S: KeyValueStore> {
    store: S,
    context: Context,
    gate: Mutex<Gate>,
    best: RwLock<Option<BestChain>>,
    synchronizing: AtomicBool,
}

impl<S: KeyValueStore> ChainStore<S> {
    /// Open a chain over `store`, loading the best chain if there is one
    pub fn open(store: S, context: Context) -> Result<Self, ChainError> {
        let best = {
            let ledger = Ledger::new(&store);
            match ledger.read_best()? {
                Some(hash) => Some(BestChain::load(&ledger, &hash)?),
                None => None,
            }
        };

        if let Some(best) = &best {
            info!(hash = %best.hash, height = best.height, trust = best.trust, "loaded best chain");
        }

        Ok(Self {
            store,
            context,
            gate: Mutex::new(Gate::new()),
            best: RwLock::new(best),
            synchronizing: AtomicBool::new(false),
        })
    }

    /// Open a chain and initialize it with `genesis` if it is empty
    pub fn open_with_genesis(store: S, context: Context, genesis: SourceBlock) -> Result<Self, ChainError> {
        let chain = Self::open(store, context)?;
        if chain.read_best()?.is_none() {
            let time = genesis.header().time;
            match chain.process(genesis, time)? {
                ProcessStatus::Accepted => {}
                status => {
                    warn!(?status, "genesis block refused");
                    return Err(ChainError::NoGenesis);
                }
            }
        }
        Ok(chain)
    }

    fn lock_gate(&self) -> Result<MutexGuard<'_, Gate>, ChainError> {
        self.gate.lock().map_err(|_| ChainError::Poisoned)
    }

    fn read_best(&self) -> Result<Option<BestChain>, ChainError> {
        Ok(self.best.read().map_err(|_| ChainError::Poisoned)?.clone())
    }

    /// Current best chain
    pub fn best(&self) -> Result<BestChain, ChainError> {
        self.read_best()?.ok_or(ChainError::NoGenesis)
    }

    pub fn block(&self, hash: &Hash) -> Result<Option<BlockState>, ChainError> {
        Ok(self.ledger().read_block(hash)?)
    }

    /// Canonical block at `height`
    pub fn block_at(&self, height: u32) -> Result<Option<BlockState>, ChainError> {
        let ledger = self.ledger();
        match ledger.read_height(height)? {
            Some(hash) => Ok(ledger.read_block(&hash)?),
            None => Ok(None),
        }
    }

    /// Committed chain data
    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::new(&self.store)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &ChainConfig {
        &self.context.config
    }

    /// While synchronizing, new best blocks are not relayed
    pub fn set_synchronizing(&self, synchronizing: bool) {
        self.synchronizing.store(synchronizing, Ordering::SeqCst);
    }

    pub fn is_synchronizing(&self) -> bool {
        self.synchronizing.load(Ordering::SeqCst)
    }

    pub fn orphan_count(&self) -> Result<usize, ChainError> {
        Ok(self.lock_gate()?.len())
    }

    /// Offer `block` to the chain at local time `now`
    pub fn process(&self, block: SourceBlock, now: u64) -> Result<ProcessStatus, ChainError> {
        let mut gate = self.lock_gate()?;
        let hash = block.hash();
        let ledger = self.ledger();

        if ledger.has_block(&hash)? || gate.contains(&hash) {
            debug!(%hash, "duplicate block");
            return Ok(ProcessStatus::Duplicate);
        }

        let best = self.read_best()?;
        if block.header().is_genesis() {
            if best.is_some() {
                warn!(%hash, "second genesis block");
                return Ok(ProcessStatus::Rejected);
            }
            return self.accept(block, now, None);
        }
        let Some(best) = best else {
            return Err(ChainError::NoGenesis);
        };

        let prev = block.prev_hash();
        if !ledger.has_block(&prev)? {
            return Ok(self.hold_orphan(&mut gate, block, &best));
        }

        let status = self.accept(block, now, Some(&best))?;
        if status == ProcessStatus::Accepted {
            self.drain_orphans(&mut gate, hash, now);
        }
        Ok(status)
    }

    fn hold_orphan(&self, gate: &mut Gate, block: SourceBlock, best: &BestChain) -> ProcessStatus {
        let config = &self.context.config;
        let hash = block.hash();
        let height = block.header().height;

        if gate.is_waiting_on(&block.prev_hash()) || gate.len() >= config.max_orphans {
            debug!(%hash, height, "orphan dropped");
            return ProcessStatus::Ignored;
        }
        if !config.testnet && height <= best.checkpoint_height {
            debug!(%hash, height, checkpoint = best.checkpoint_height, "orphan below checkpoint");
            return ProcessStatus::Ignored;
        }

        info!(%hash, height, prev = %block.prev_hash(), "ORPHAN");
        gate.insert(block);
        ProcessStatus::Orphan
    }

    /// Connect orphans waiting on `parent`. The parent is already committed,
    /// so a failing orphan only ends the drain and takes its descendants
    /// with it.
    fn drain_orphans(&self, gate: &mut Gate, mut parent: Hash, now: u64) {
        while let Some(orphan) = gate.take_child(&parent) {
            let hash = orphan.hash();
            let outcome = self
                .read_best()
                .and_then(|best| self.accept(orphan, now, best.as_ref()));
            match outcome {
                Ok(ProcessStatus::Accepted) => parent = hash,
                Ok(ProcessStatus::Rejected) => {
                    let dropped = gate.discard_descendants(&hash);
                    warn!(%hash, dropped, "orphan rejected");
                    break;
                }
                Ok(status) => {
                    debug!(%hash, ?status, "orphan not accepted");
                    break;
                }
                Err(e) => {
                    let dropped = gate.discard_descendants(&hash);
                    warn!(%hash, dropped, error = %e, "orphan failed");
                    break;
                }
            }
        }
    }

    /// Validate, index and select `block`, whose predecessor is stored
    fn accept(&self, block: SourceBlock, now: u64, best: Option<&BestChain>) -> Result<ProcessStatus, ChainError> {
        let staged = StagedStore::new(&self.store);
        let ledger = Ledger::new(&staged);
        let mempool = &self.context.hooks.mempool;

        let carried = block.bodies();
        let mut state = BlockState::from(block);
        let hash = state.hash();

        let mut bodies = Vec::with_capacity(state.vtx.len());
        let mut missing = Vec::new();
        for tx_ref in &state.vtx {
            let body = match carried.iter().find(|body| body.to_ref() == *tx_ref) {
                Some(body) => Some(body.clone()),
                None => match ledger.read_tx(tx_ref)? {
                    Some(body) => Some(body),
                    None => mempool.get(&tx_ref.hash).filter(|body| body.kind() == tx_ref.kind),
                },
            };
            match body {
                Some(body) => bodies.push(body),
                None => missing.push(*tx_ref),
            }
        }
        if !missing.is_empty() {
            info!(%hash, missing = missing.len(), "block incomplete");
            return Ok(ProcessStatus::Incomplete { missing });
        }

        let genesis_config;
        let config = if state.is_genesis() {
            // Genesis carries no real proof of work
            genesis_config = ChainConfig { verify_work: false, ..self.context.config.clone() };
            &genesis_config
        } else {
            &self.context.config
        };
        if let Err(e) = check_block(&state, &bodies, config, self.context.hooks.primes.as_ref(), now) {
            warn!(%hash, error = %e, "block failed check");
            return Ok(ProcessStatus::Rejected);
        }

        if !state.is_genesis() {
            let prev = ledger
                .read_block(&state.prev_hash())?
                .ok_or(ChainError::MissingPredecessor(state.prev_hash()))?;
            if let Err(e) = accept_block(&state, &prev) {
                warn!(%hash, error = %e, "block failed accept");
                return Ok(ProcessStatus::Rejected);
            }
        }

        for body in &bodies {
            if !ledger.has_tx(&body.to_ref())? {
                ledger.write_tx(body)?;
            }
        }
        state.conflicted = state.vtx.iter().any(|tx| mempool.is_conflicted(&tx.hash));

        let height = state.height();
        let mut effects = Effects::new();
        let selection = match index_block(state, &ledger, &self.context, best, &mut effects) {
            Ok(selection) => selection,
            Err(e) if e.is_block_fault() => {
                warn!(%hash, height, error = %e, "block rejected");
                return Ok(ProcessStatus::Rejected);
            }
            Err(e) => return Err(e),
        };

        staged.commit()?;
        info!(%hash, height, "ACCEPTED");

        self.finish(selection, effects)?;
        Ok(ProcessStatus::Accepted)
    }

    /// Roll the best chain back to `target`, which must be on it.
    ///
    /// Every block above `target` is disconnected and erased.
    pub fn rewind(&self, target: &Hash) -> Result<BestChain, ChainError> {
        let _gate = self.lock_gate()?;
        let best = self.best()?;

        let staged = StagedStore::new(&self.store);
        let ledger = Ledger::new(&staged);
        let state = ledger.read_block(target)?.ok_or(ChainError::MissingBlock(*target))?;
        if !state.is_in_main_chain(&best.hash) {
            return Err(ChainError::NotInMainChain(*target));
        }

        let mut effects = Effects::new();
        let reorg = reorganize(&state, &ledger, &self.context, &best, &mut effects)?;
        staged.commit()?;
        info!(hash = %target, height = state.height(), "rewound best chain");

        let selection = Selection::Reorganized(reorg);
        self.finish(selection, effects)?;
        self.best()
    }

    /// Post-commit work: publish the snapshot, update the mempool, fire
    /// wallet effects and relay the new tip
    fn finish(&self, selection: Selection, effects: Effects) -> Result<(), ChainError> {
        let hooks = &self.context.hooks;
        let Some(best) = selection.best().cloned() else {
            effects.fire(hooks);
            return Ok(());
        };

        *self.best.write().map_err(|_| ChainError::Poisoned)? = Some(best.clone());

        if let Selection::Reorganized(reorg) = &selection {
            self.update_mempool(reorg)?;
        }
        effects.fire(hooks);

        if !self.is_synchronizing() {
            hooks.relay.push_relay(Announcement {
                hash: best.hash,
                height: best.height,
                trust: best.trust,
            });
        }
        Ok(())
    }

    /// Return transactions of abandoned blocks to the mempool and drop the
    /// ones that were just confirmed
    fn update_mempool(&self, reorg: &Reorg) -> Result<(), ChainError> {
        let ledger = self.ledger();
        let mempool = &self.context.hooks.mempool;
        let confirmed: HashSet<Hash> = reorg
            .connected
            .iter()
            .flat_map(|block| block.vtx.iter().map(|tx| tx.hash))
            .collect();

        // Ancestor-first, so sigchain transactions return in sequence
        for block in reorg.disconnected.iter().rev() {
            let producer = block.producer_index();
            for (index, tx_ref) in block.vtx.iter().enumerate() {
                if Some(index) == producer || confirmed.contains(&tx_ref.hash) {
                    continue;
                }
                match ledger.read_tx(tx_ref)? {
                    Some(tx) => resurrect(mempool.as_ref(), tx),
                    None => warn!(tx = %tx_ref.hash, "disconnected transaction body missing"),
                }
            }
        }

        for hash in &confirmed {
            mempool.remove(hash);
        }
        Ok(())
    }
}

fn resurrect(mempool: &dyn Mempool, tx: Transaction) {
    let hash = tx.hash();
    if mempool.accept(tx) {
        debug!(tx = %hash, "returned to mempool");
    }
}
