//! Core primitives.
//!
//! Seedable randomness shared by the scripted opponent and its tests.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, RandomSource};
