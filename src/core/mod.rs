//! Core deterministic primitives.
//!
//! Everything here produces bit-identical results on every platform.
//! Client and server replays are only comparable because of that.

pub mod fixed;
pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use vec2::FixedVec2;
pub use rng::{DeterministicRng, Seed};
pub use hash::{Hash32, HASH_VERSION, chain_hash, compute_state_hash};
