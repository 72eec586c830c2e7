//! Cryptography module - BLAKE3 identity hashes, SHA-256 proof hashes,
//! Schnorr signatures, Merkle roots

mod hash;
mod schnorr;
mod merkle;

pub use hash::*;
pub use schnorr::*;
pub use merkle::*;
