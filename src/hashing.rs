/* src/hashing.rs */
//! Deterministic seed derivation.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// FNV-1a hash over a byte slice.
#[inline]
pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Derives a child seed from a base seed and a path of discriminators
/// (cycle index, partition index, population member, ...).
///
/// The same `(base, parts)` always yields the same seed, so per-task RNGs do not
/// depend on which thread runs the task.
pub fn derive_seed(base: u64, parts: &[u64]) -> u64 {
    let mut bytes = Vec::with_capacity(8 * (parts.len() + 1));
    bytes.extend_from_slice(&base.to_le_bytes());
    for part in parts {
        bytes.extend_from_slice(&part.to_le_bytes());
    }
    fnv1a_hash(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_hash_determinism() {
        assert_eq!(fnv1a_hash(b"partition"), fnv1a_hash(b"partition"));
        assert_ne!(fnv1a_hash(b"partition"), fnv1a_hash(b"partitiom"));
        assert_eq!(fnv1a_hash(&[]), FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_derive_seed_depends_on_every_part() {
        let a = derive_seed(7, &[1, 2]);
        assert_eq!(a, derive_seed(7, &[1, 2]));
        assert_ne!(a, derive_seed(7, &[2, 1]));
        assert_ne!(a, derive_seed(8, &[1, 2]));
        assert_ne!(a, derive_seed(7, &[1, 2, 0]));
    }
}
