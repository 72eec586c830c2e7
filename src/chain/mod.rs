//! Chain state machine
//!
//! Blocks enter through the acceptance gate (`ChainStore::process`), get
//! indexed against their predecessor, and are compared with the best chain.
//! A winning block triggers a reorganization that disconnects the losing
//! branch tip-first and connects the winning branch ancestor-first.
//!
//! Every pipeline runs on a staged overlay of the store and is committed in
//! one batch once it has fully succeeded.

mod apply;
mod error;
mod fork;
mod index;
mod process;
mod store;

pub use apply::*;
pub use error::*;
pub use fork::*;
pub use index::*;
pub use process::*;
pub use store::*;

use std::sync::Arc;

use crate::config::ChainConfig;
use crate::consensus::{FermatClusters, MinuteRelease, PrimeDifficulty, ReserveSchedule};
use crate::mempool::{MemoryPool, Mempool};
use crate::node::{NullRelay, Relay};
use crate::validation::{OperationLayer, PassthroughOperations, ScriptEngine, SignatureScripts};
use crate::wallet::{Wallet, WalletNotifier};

/// External collaborators of the chain
#[derive(Clone)]
pub struct Hooks {
    pub operations: Arc<dyn OperationLayer>,
    pub scripts: Arc<dyn ScriptEngine>,
    pub mempool: Arc<dyn Mempool>,
    pub wallet: Arc<dyn WalletNotifier>,
    pub relay: Arc<dyn Relay>,
    pub reserves: Arc<dyn ReserveSchedule>,
    pub primes: Arc<dyn PrimeDifficulty>,
}

impl Hooks {
    /// Default collaborators for `config`
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            operations: Arc::new(PassthroughOperations),
            scripts: Arc::new(SignatureScripts),
            mempool: Arc::new(MemoryPool::new()),
            wallet: Arc::new(Wallet::new()),
            relay: Arc::new(NullRelay),
            reserves: Arc::new(MinuteRelease::from_config(config)),
            primes: Arc::new(FermatClusters),
        }
    }

    pub fn with_operations(mut self, operations: Arc<dyn OperationLayer>) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_mempool(mut self, mempool: Arc<dyn Mempool>) -> Self {
        self.mempool = mempool;
        self
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn WalletNotifier>) -> Self {
        self.wallet = wallet;
        self
    }

    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_reserves(mut self, reserves: Arc<dyn ReserveSchedule>) -> Self {
        self.reserves = reserves;
        self
    }

    pub fn with_primes(mut self, primes: Arc<dyn PrimeDifficulty>) -> Self {
        self.primes = primes;
        self
    }
}

/// Configuration plus collaborators, passed to every chain operation
pub struct Context {
    pub config: ChainConfig,
    pub hooks: Hooks,
}

impl Context {
    pub fn new(config: ChainConfig) -> Self {
        let hooks = Hooks::new(&config);
        Self { config, hooks }
    }

    pub fn with_hooks(config: ChainConfig, hooks: Hooks) -> Self {
        Self { config, hooks }
    }
}
