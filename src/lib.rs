//! Tri-channel ledger core
//!
//! Blocks are produced on three independent channels (proof-of-stake, prime
//! proof-of-work, hash proof-of-work). This crate derives each block's chain
//! position, scores competing branches with a per-channel weight metric, and
//! reorganizes ledger state onto the winning branch.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod chain;
pub mod mempool;
pub mod wallet;
pub mod node;

/// Protocol constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Integral value of one coin (6 decimal places)
    pub const COIN: u64 = 1_000_000;

    /// One hundredth of a coin
    pub const CENT: u64 = 10_000;

    /// First block version scored by per-channel weights instead of raw trust.
    /// Blocks at or above this version place their producer transaction last.
    pub const TRITIUM_VERSION: u32 = 7;

    /// Legacy block version whose producers were allowed to overdraw reserves
    pub const RESERVE_EXEMPT_VERSION: u32 = 5;

    /// Fixed-point scale of prime cluster difficulty
    pub const PRIME_BITS_SCALE: u64 = 10_000_000;

    /// Most offsets a prime header may carry
    pub const MAX_PRIME_OFFSETS: usize = 16;

    /// Widest gap between consecutive members of a prime cluster
    pub const MAX_PRIME_GAP: u8 = 12;

    /// Divisor applied to the raw proof ratio before it becomes weight
    pub const WEIGHT_DIVISOR: u64 = 10_000;

    /// Trust granted to a block whose predecessor came from another channel
    pub const CHANNEL_SWITCH_TRUST: u64 = 3;

    /// Output index marking a legacy coinbase input
    pub const COINBASE_MARKER: u32 = 0xFFFF_FFFF;

    /// Output index marking the trust-carrying input of a legacy coinstake
    pub const COINSTAKE_MARKER: u32 = 0xFFFF_FFFE;

    /// Chain name (short form for logs)
    pub const CHAIN_NAME: &str = "TRI";

    /// Genesis timestamp (Unix timestamp)
    pub const GENESIS_TIMESTAMP: u64 = 1_736_339_922;
}
