//! Key hashing.
//!
//! A seeded 64-bit MurmurHash2 digest (the x64 "A" variant by Austin Appleby)
//! drives every filter operation. Keys opt in through [`FilterKey`]; integral
//! keys hash their little-endian bytes, byte-string keys hash their contents.

use bytes::Bytes;
use rand::Rng;

const M64: u64 = 0xc6a4_a793_5bd1_e995;
const R64: u32 = 47;

/// A key the filter can hash.
///
/// The filter needs exactly one capability from a key type: a seeded 64-bit
/// digest. The seed is drawn once per filter instance, so two filters over
/// the same key stream do not share tag patterns.
pub trait FilterKey {
    /// Hash the key with the given seed.
    fn hash64(&self, seed: u64) -> u64;
}

/// 64-bit MurmurHash2 (x64 variant).
#[must_use]
pub fn murmur_hash2_x64a(data: &[u8], seed: u64) -> u64 {
    let mut h = seed ^ (data.len() as u64).wrapping_mul(M64);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M64);
        k ^= k >> R64;
        k = k.wrapping_mul(M64);
        h ^= k;
        h = h.wrapping_mul(M64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut t = 0u64;
        for (i, &byte) in tail.iter().enumerate() {
            t |= u64::from(byte) << (8 * i);
        }
        h ^= t;
        h = h.wrapping_mul(M64);
    }

    h ^= h >> R64;
    h = h.wrapping_mul(M64);
    h ^= h >> R64;
    h
}

/// Draw a process-random seed for a new filter instance.
pub(crate) fn generate_hash_seed() -> u64 {
    rand::thread_rng().gen()
}

macro_rules! impl_filter_key_for_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FilterKey for $ty {
                #[inline]
                fn hash64(&self, seed: u64) -> u64 {
                    murmur_hash2_x64a(&self.to_le_bytes(), seed)
                }
            }
        )*
    };
}

impl_filter_key_for_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl FilterKey for [u8] {
    #[inline]
    fn hash64(&self, seed: u64) -> u64 {
        murmur_hash2_x64a(self, seed)
    }
}

impl FilterKey for str {
    #[inline]
    fn hash64(&self, seed: u64) -> u64 {
        murmur_hash2_x64a(self.as_bytes(), seed)
    }
}

impl FilterKey for String {
    #[inline]
    fn hash64(&self, seed: u64) -> u64 {
        murmur_hash2_x64a(self.as_bytes(), seed)
    }
}

impl FilterKey for Vec<u8> {
    #[inline]
    fn hash64(&self, seed: u64) -> u64 {
        murmur_hash2_x64a(self, seed)
    }
}

impl FilterKey for Bytes {
    #[inline]
    fn hash64(&self, seed: u64) -> u64 {
        murmur_hash2_x64a(self, seed)
    }
}

impl<T: FilterKey + ?Sized> FilterKey for &T {
    #[inline]
    fn hash64(&self, seed: u64) -> u64 {
        (**self).hash64(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        let a = murmur_hash2_x64a(b"dynamic fingerprint filter", 7);
        let b = murmur_hash2_x64a(b"dynamic fingerprint filter", 7);
        assert_eq!(a, b);
    }

    #[test]
    fn seed_changes_digest() {
        let a = murmur_hash2_x64a(b"key", 1);
        let b = murmur_hash2_x64a(b"key", 2);
        assert_ne!(a, b);
    }

    #[test]
    fn tail_bytes_participate() {
        // Lengths 1..=16 cover the block loop and every tail size.
        for len in 1..=16usize {
            let data = vec![0xabu8; len];
            let mut shorter = data.clone();
            shorter.pop();
            assert_ne!(
                murmur_hash2_x64a(&data, 0),
                murmur_hash2_x64a(&shorter, 0),
                "length {len} collides with {}",
                len - 1
            );
        }
    }

    #[test]
    fn integral_keys_hash_their_le_bytes() {
        let n: u64 = 0x0123_4567_89ab_cdef;
        assert_eq!(n.hash64(42), murmur_hash2_x64a(&n.to_le_bytes(), 42));
    }

    #[test]
    fn string_and_bytes_agree() {
        let s = String::from("10.10.64.1");
        let b = Bytes::from_static(b"10.10.64.1");
        assert_eq!(s.hash64(3), b.hash64(3));
    }

    #[test]
    fn empty_input_is_hashable() {
        let _ = murmur_hash2_x64a(b"", 0);
    }
}
