//! State Hashing for Verification
//!
//! Provides the two hashes both sides of a replay must agree on:
//! - `stateHash32`: order-sensitive digest of the observable game state
//! - `chainHash32`: running hash binding each checkpoint to all prior ones
//!
//! Both are built from a versioned 32-bit mixer that only uses integer
//! arithmetic, so clients on any platform produce the same values.
//!
//! ```text
//! h₀ = domain_seed(tag)
//! hᵢ = fmix32(hᵢ₋₁ ⊕ wordᵢ)
//! digest = fmix32(hₙ ⊕ n)
//! ```
//!
//! Every step is a bijection in both the word and the prior `h`, so changing
//! any single word always changes the digest.

use sha2::{Sha256, Digest};

use super::fixed::Fixed;
use super::vec2::FixedVec2;

/// 32-bit hash value carried in checkpoints and segments.
pub type Hash32 = u32;

/// Version of the hash construction. Bump when the mixer or the hashed
/// field set changes; old recordings then fail verification loudly.
pub const HASH_VERSION: u32 = 1;

/// Domain tag for state hashes ("STAT").
const DOMAIN_STATE: u32 = 0x5354_4154;

/// Domain tag for chain hashes ("CHAN").
const DOMAIN_CHAIN: u32 = 0x4348_414E;

/// Murmur3 32-bit finalizer.
#[inline]
pub const fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    h
}

/// Initial mixer state for a domain, bound to `HASH_VERSION`.
#[inline]
const fn domain_seed(tag: u32) -> u32 {
    fmix32(tag ^ HASH_VERSION.wrapping_mul(0x9E37_79B9))
}

/// Incremental 32-bit hasher for game state.
///
/// Order of updates is part of the contract: client and server must feed
/// the same words in the same order.
#[derive(Clone, Debug)]
pub struct StateHasher32 {
    h: u32,
    words: u32,
}

impl StateHasher32 {
    /// Create a hasher for a raw domain tag.
    pub const fn new(tag: u32) -> Self {
        Self { h: domain_seed(tag), words: 0 }
    }

    /// Create hasher for a state snapshot.
    pub const fn for_state() -> Self {
        Self::new(DOMAIN_STATE)
    }

    /// Create hasher for the checkpoint chain.
    pub const fn for_chain() -> Self {
        Self::new(DOMAIN_CHAIN)
    }

    /// Mix one 32-bit word.
    #[inline]
    pub fn update_u32(&mut self, word: u32) {
        self.h = fmix32(self.h ^ word);
        self.words = self.words.wrapping_add(1);
    }

    /// Mix a u8 value as a full word.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.update_u32(value as u32);
    }

    /// Mix a u64 value (low word first).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.update_u32(value as u32);
        self.update_u32((value >> 32) as u32);
    }

    /// Mix an i64 value.
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.update_u64(value as u64);
    }

    /// Mix an i32 value.
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.update_u32(value as u32);
    }

    /// Mix a Fixed value.
    #[inline]
    pub fn update_fixed(&mut self, value: Fixed) {
        self.update_i32(value);
    }

    /// Mix a FixedVec2.
    #[inline]
    pub fn update_vec2(&mut self, value: FixedVec2) {
        self.update_fixed(value.x);
        self.update_fixed(value.y);
    }

    /// Mix a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u32(value as u32);
    }

    /// Finalize, folding in the word count.
    pub fn finalize(self) -> Hash32 {
        fmix32(self.h ^ self.words)
    }
}

/// Compute `stateHash32` for a tick.
///
/// The closure adds the state-specific words after the tick.
pub fn compute_state_hash<F>(tick: u32, add_state: F) -> Hash32
where
    F: FnOnce(&mut StateHasher32),
{
    let mut hasher = StateHasher32::for_state();
    hasher.update_u32(tick);
    add_state(&mut hasher);
    hasher.finalize()
}

/// Compute `chainHash32 = H(prev, tick, stateHash32)`.
///
/// The first checkpoint of a session uses `prev = 0`.
#[inline]
pub fn chain_hash(prev: Hash32, tick: u32, state_hash: Hash32) -> Hash32 {
    let mut hasher = StateHasher32::for_chain();
    hasher.update_u32(prev);
    hasher.update_u32(tick);
    hasher.update_u32(state_hash);
    hasher.finalize()
}

/// SHA-256 with domain separator. Off the hot path only (config
/// fingerprints, seed derivation).
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

// =============================================================================
// TESTS
// =============================================================================
