//! Prime cluster difficulty
//!
//! A prime block proves a dense cluster of probable primes starting at its
//! origin (see `BlockHeader::prime_origin`). Each offset is the gap from one
//! cluster member to the next. The proven difficulty is the cluster length in
//! `PRIME_BITS_SCALE` units; the walk stops at the first gap that is not a
//! valid step to another probable prime, so trailing offsets prove nothing.

use primitive_types::{U256, U512};

use crate::constants::{MAX_PRIME_GAP, PRIME_BITS_SCALE};

use super::BlockHeader;

/// Source of the cluster difficulty proven by a prime header
pub trait PrimeDifficulty: Send + Sync {
    fn prime_bits(&self, header: &BlockHeader) -> u64;
}

/// Base-2 Fermat tests along the offsets
#[derive(Debug, Default, Clone, Copy)]
pub struct FermatClusters;

impl PrimeDifficulty for FermatClusters {
    fn prime_bits(&self, header: &BlockHeader) -> u64 {
        cluster_size(header.prime_origin(), &header.offsets).saturating_mul(PRIME_BITS_SCALE)
    }
}

/// Number of probable primes reached from `origin` by following `offsets`
pub fn cluster_size(origin: U256, offsets: &[u8]) -> u64 {
    if !is_probable_prime(origin) {
        return 0;
    }

    let mut size = 1;
    let mut member = origin;
    for &gap in offsets {
        if gap == 0 || gap % 2 == 1 || gap > MAX_PRIME_GAP {
            break;
        }
        member = match member.checked_add(U256::from(gap)) {
            Some(next) => next,
            None => break,
        };
        if !is_probable_prime(member) {
            break;
        }
        size += 1;
    }
    size
}

/// `2^(n-1) mod n == 1`
pub fn is_probable_prime(n: U256) -> bool {
    let two = U256::from(2u8);
    if n < two {
        return false;
    }
    if n == two {
        return true;
    }
    if !n.bit(0) {
        return false;
    }
    pow_mod(two, n - U256::one(), n) == U256::one()
}

fn mul_mod(a: U256, b: U256, modulus: U256) -> U256 {
    let reduced = a.full_mul(b) % U512::from(modulus);
    let mut bytes = [0u8; 64];
    reduced.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

fn pow_mod(base: U256, exponent: U256, modulus: U256) -> U256 {
    let base = base % modulus;
    let mut result = U256::one() % modulus;
    for bit in (0..exponent.bits()).rev() {
        result = mul_mod(result, result, modulus);
        if exponent.bit(bit) {
            result = mul_mod(result, base, modulus);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Channel;
    use crate::crypto::Hash;

    #[test]
    fn test_small_primes() {
        let primes: Vec<u64> = (0..30).filter(|n| is_probable_prime(U256::from(*n))).collect();
        assert_eq!(primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn test_large_prime() {
        let mersenne = U256::from(2u8).pow(U256::from(127u32)) - U256::one();
        assert!(is_probable_prime(mersenne));
        assert!(!is_probable_prime(mersenne + U256::from(2u8)));
    }

    #[test]
    fn test_cluster_walk() {
        // 5, 7, 11, 13
        assert_eq!(cluster_size(U256::from(5u8), &[2, 4, 2]), 4);
        // 5 + 2 + 4 + 4 = 15 is composite
        assert_eq!(cluster_size(U256::from(5u8), &[2, 4, 4]), 3);
        assert_eq!(cluster_size(U256::from(9u8), &[2, 2]), 0);
        assert_eq!(cluster_size(U256::from(5u8), &[]), 1);
    }

    #[test]
    fn test_padding_proves_nothing() {
        let honest = cluster_size(U256::from(5u8), &[2, 4]);
        let mut padded = vec![2, 4];
        padded.extend(std::iter::repeat(0).take(500));
        assert_eq!(cluster_size(U256::from(5u8), &padded), honest);

        // Odd and oversized gaps end the walk too
        assert_eq!(cluster_size(U256::from(5u8), &[2, 3, 2]), 2);
        assert_eq!(cluster_size(U256::from(7u8), &[MAX_PRIME_GAP + 2]), 1);
    }

    #[test]
    fn test_fermat_difficulty_scale() {
        let header = BlockHeader {
            version: 7,
            prev_hash: Hash::zero(),
            merkle_root: Hash::zero(),
            channel: Channel::Prime,
            height: 1,
            bits: 0,
            nonce: 0,
            time: 1_000,
            offsets: vec![2],
        };
        let size = cluster_size(header.prime_origin(), &header.offsets);
        assert_eq!(FermatClusters.prime_bits(&header), size * PRIME_BITS_SCALE);
    }
}
