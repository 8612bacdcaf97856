//! Seedable Random Number Generator
//!
//! Xorshift128+ behind the [`RandomSource`] trait. The scripted opponent
//! takes every random decision from a source, so a fixed seed (or a stub
//! source) replays the same choices in tests.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the random draws the scripted opponent makes.
pub trait RandomSource {
    /// Uniform float in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform index in `[0, len)`. Returns 0 when `len` is 0.
    fn next_index(&mut self, len: usize) -> usize;
}

/// Xorshift128+ generator.
///
/// ```
/// use connect_four::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(7);
/// let mut b = DeterministicRng::new(7);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    lo: u64,
    hi: u64,
}

impl DeterministicRng {
    /// Seed through SplitMix64 so nearby seeds diverge.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let lo = splitmix64(&mut s);
        let hi = splitmix64(&mut s);
        // An all-zero state would stay zero forever
        if lo | hi == 0 {
            return Self { lo: 1, hi: 1 };
        }
        Self { lo, hi }
    }

    /// Seed from the wall clock.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self::new((nanos ^ (nanos >> 64)) as u64)
    }

    /// Next raw 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let (s0, mut s1) = (self.lo, self.hi);
        let out = s0.wrapping_add(s1);
        s1 ^= s0;
        self.lo = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.hi = s1.rotate_left(37);
        out
    }
}

impl RandomSource for DeterministicRng {
    fn next_f64(&mut self) -> f64 {
        // Top 53 bits fill the mantissa exactly
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.next_u64() % len as u64) as usize
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
