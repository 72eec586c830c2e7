//! Block validation
//!
//! `check_block` is the structural check that needs nothing but the block and
//! its transaction bodies. `accept_block` is the contextual check against the
//! predecessor.

use primitive_types::U256;
use thiserror::Error;

use crate::config::ChainConfig;
use crate::constants::MAX_PRIME_OFFSETS;
use crate::crypto::PublicKey;
use crate::validation::Transaction;

use super::{vtx_merkle_root, BlockState, Channel, PrimeDifficulty};

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Block has no transactions")]
    EmptyBlock,
    #[error("Hybrid blocks are disabled")]
    HybridDisabled,
    #[error("Timestamp {time} too far in the future")]
    FutureTimestamp { time: u64 },
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,
    #[error("Transaction bodies do not match the block's references")]
    BodyMismatch,
    #[error("Prime block without offsets")]
    MissingOffsets,
    #[error("Offsets on a non-prime block")]
    UnexpectedOffsets,
    #[error("{count} prime offsets exceed the limit")]
    TooManyOffsets { count: usize },
    #[error("Prime cluster proves {proven}, block requires {required}")]
    InsufficientPrimeWork { required: u64, proven: u64 },
    #[error("Stake block with zero nonce")]
    ZeroNonce,
    #[error("Invalid block signature")]
    InvalidSignature,
    #[error("Invalid proof of work")]
    InvalidPoW,
    #[error("Producer transaction does not match the channel")]
    InvalidProducer,
    #[error("More than one producer transaction")]
    ExtraProducer,
    #[error("Height {got}, expected {expected}")]
    InvalidHeight { expected: u32, got: u32 },
    #[error("Timestamp not after predecessor")]
    InvalidTimestamp,
}

/// Structural check of a block and its bodies (in `vtx` order)
pub fn check_block(
    block: &BlockState,
    bodies: &[Transaction],
    config: &ChainConfig,
    primes: &dyn PrimeDifficulty,
    now: u64,
) -> Result<(), ValidationError> {
    let header = &block.header;

    if block.vtx.is_empty() {
        return Err(ValidationError::EmptyBlock);
    }
    if header.channel == Channel::Hybrid && !config.hybrid {
        return Err(ValidationError::HybridDisabled);
    }
    if header.time > now.saturating_add(config.max_drift) {
        return Err(ValidationError::FutureTimestamp { time: header.time });
    }
    if vtx_merkle_root(&block.vtx) != header.merkle_root {
        return Err(ValidationError::InvalidMerkleRoot);
    }
    if bodies.len() != block.vtx.len()
        || bodies.iter().zip(&block.vtx).any(|(body, tx)| body.to_ref() != *tx)
    {
        return Err(ValidationError::BodyMismatch);
    }

    match header.channel {
        Channel::Prime if header.offsets.is_empty() => return Err(ValidationError::MissingOffsets),
        Channel::Prime if header.offsets.len() > MAX_PRIME_OFFSETS => {
            return Err(ValidationError::TooManyOffsets { count: header.offsets.len() })
        }
        Channel::Prime => {}
        _ if !header.offsets.is_empty() => return Err(ValidationError::UnexpectedOffsets),
        _ => {}
    }

    let producer_index = block.producer_index().ok_or(ValidationError::EmptyBlock)?;
    let producer = &bodies[producer_index];
    let producer_fits = match header.channel {
        Channel::Stake => producer.is_coinstake(),
        Channel::Prime | Channel::Hash | Channel::Hybrid => producer.is_coinbase(),
    };
    if !producer_fits {
        return Err(ValidationError::InvalidProducer);
    }
    if bodies
        .iter()
        .enumerate()
        .any(|(index, body)| index != producer_index && body.is_producer())
    {
        return Err(ValidationError::ExtraProducer);
    }

    if header.channel == Channel::Stake {
        if header.nonce == 0 {
            return Err(ValidationError::ZeroNonce);
        }
        let key = producer_key(producer).ok_or(ValidationError::InvalidSignature)?;
        if !key.verify_slice(&block.hash(), &block.signature) {
            return Err(ValidationError::InvalidSignature);
        }
    }

    if config.verify_work {
        match header.channel {
            Channel::Hash => validate_pow(block)?,
            Channel::Prime => validate_prime(block, primes)?,
            _ => {}
        }
    }

    Ok(())
}

/// Contextual check against the predecessor
pub fn accept_block(block: &BlockState, prev: &BlockState) -> Result<(), ValidationError> {
    let expected = prev.height().saturating_add(1);
    if block.height() != expected {
        return Err(ValidationError::InvalidHeight { expected, got: block.height() });
    }
    if block.time() <= prev.time() {
        return Err(ValidationError::InvalidTimestamp);
    }
    Ok(())
}

/// Key that must have signed a stake block
fn producer_key(producer: &Transaction) -> Option<PublicKey> {
    match producer {
        Transaction::Tritium(contract) => Some(contract.public_key),
        Transaction::Legacy(tx) => {
            let input = tx.spent_inputs().next()?;
            let key: [u8; 32] = input.script.get(..32)?.try_into().ok()?;
            PublicKey::from_bytes(&key).ok()
        }
    }
}

/// The proof hash must not exceed the compact target in `bits`
pub fn validate_pow(block: &BlockState) -> Result<(), ValidationError> {
    let target = compact_to_target(block.header.bits);
    if target.is_zero() || block.header.proof_hash().to_u256() > target {
        return Err(ValidationError::InvalidPoW);
    }
    Ok(())
}

/// The proven cluster difficulty must reach `bits`
pub fn validate_prime(block: &BlockState, primes: &dyn PrimeDifficulty) -> Result<(), ValidationError> {
    let required = block.header.bits as u64;
    let proven = primes.prime_bits(&block.header);
    if proven < required {
        return Err(ValidationError::InsufficientPrimeWork { required, proven });
    }
    Ok(())
}

/// Expand a compact difficulty (exponent byte + 3 byte mantissa)
pub fn compact_to_target(compact: u32) -> U256 {
    let exponent = (compact >> 24) as usize;
    let mantissa = U256::from(compact & 0x007F_FFFF);

    if exponent == 0 || exponent > 32 {
        return U256::zero();
    }
    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else {
        mantissa << (8 * (exponent - 3))
    }
}
