//! Checkpoints and the Hash Chain
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │ tick 30  │    │ tick 60  │    │ tick 77* │   * audit tick
//! │ state h₁ │    │ state h₂ │    │ state h₃ │
//! │ chain c₁ │───▶│ chain c₂ │───▶│ chain c₃ │
//! └──────────┘    └──────────┘    └──────────┘
//!   c₁ = H(0, 30, h₁)   cₖ = H(cₖ₋₁, tickₖ, hₖ)
//! ```
//!
//! Recomputing checkpoint *k* needs the exact chain value of *k−1*, so
//! replacing one checkpoint without recomputing every later one is caught.

use serde::{Serialize, Deserialize};

use crate::core::hash::{chain_hash, Hash32};
use crate::game::state::GameState;
use crate::proof::audit::AuditTicks;

/// Fingerprint of the state at one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Tick the state was hashed at
    pub tick: u32,
    /// Digest of the observable state
    #[serde(rename = "stateHash32")]
    pub state_hash: Hash32,
    /// Running chain hash through this checkpoint
    #[serde(rename = "chainHash32")]
    pub chain_hash: Hash32,
}

impl Checkpoint {
    /// Build the checkpoint that follows `prev_chain`.
    pub fn next(prev_chain: Hash32, tick: u32, state_hash: Hash32) -> Self {
        Self {
            tick,
            state_hash,
            chain_hash: chain_hash(prev_chain, tick, state_hash),
        }
    }
}

/// Emits checkpoints on audit ticks and every `interval` ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointRecorder {
    interval: u32,
    audit: AuditTicks,
    last_tick: u32,
    chain: Hash32,
    emitted: u32,
}

impl CheckpointRecorder {
    /// Create a recorder starting at tick 0 with an empty chain.
    pub fn new(interval: u32, audit: AuditTicks) -> Self {
        Self {
            interval: interval.max(1),
            audit,
            last_tick: 0,
            chain: 0,
            emitted: 0,
        }
    }

    /// Replace the audit set.
    pub fn set_audit_ticks(&mut self, audit: AuditTicks) {
        self.audit = audit;
    }

    /// Audit set in use.
    pub fn audit_ticks(&self) -> &AuditTicks {
        &self.audit
    }

    /// Is a checkpoint due at `tick`?
    #[inline]
    pub fn is_due(&self, tick: u32) -> bool {
        self.audit.contains(tick) || tick.saturating_sub(self.last_tick) >= self.interval
    }

    /// Emit a checkpoint if one is due for the state's tick.
    pub fn observe(&mut self, state: &GameState) -> Option<Checkpoint> {
        if self.emitted_at(state.tick) || !self.is_due(state.tick) {
            return None;
        }
        Some(self.emit(state))
    }

    /// Emit a checkpoint now unless one was already emitted this tick.
    pub fn force(&mut self, state: &GameState) -> Option<Checkpoint> {
        if self.emitted_at(state.tick) {
            return None;
        }
        Some(self.emit(state))
    }

    fn emitted_at(&self, tick: u32) -> bool {
        self.emitted > 0 && self.last_tick == tick
    }

    fn emit(&mut self, state: &GameState) -> Checkpoint {
        let checkpoint = Checkpoint::next(self.chain, state.tick, state.compute_hash());
        self.chain = checkpoint.chain_hash;
        self.last_tick = state.tick;
        self.emitted += 1;
        checkpoint
    }

    /// Current chain head (0 before the first checkpoint).
    pub fn chain(&self) -> Hash32 {
        self.chain
    }

    /// Tick of the last checkpoint (0 before the first).
    pub fn last_tick(&self) -> u32 {
        self.last_tick
    }

    /// Checkpoints emitted so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

/// Recompute a chain from `prev`, returning the final chain value or the
/// index of the first checkpoint whose stored chain hash does not follow.
pub fn verify_chain(checkpoints: &[Checkpoint], prev: Hash32) -> Result<Hash32, usize> {
    let mut chain = prev;
    for (index, checkpoint) in checkpoints.iter().enumerate() {
        let expected = chain_hash(chain, checkpoint.tick, checkpoint.state_hash);
        if expected != checkpoint.chain_hash {
            return Err(index);
        }
        chain = expected;
    }
    Ok(chain)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::SimConfig;

    fn state_at(tick: u32) -> GameState {
        let mut state = GameState::new(1, &SimConfig::endless());
        state.tick = tick;
        state
    }

    #[test]
    fn test_periodic_emission() {
        let mut recorder = CheckpointRecorder::new(30, AuditTicks::none());
        let emitted: Vec<u32> = (1..=300)
            .filter_map(|t| recorder.observe(&state_at(t)))
            .map(|c| c.tick)
            .collect();
        assert_eq!(emitted, (1..=10).map(|k| k * 30).collect::<Vec<_>>());
    }

    #[test]
    fn test_audit_ticks_force_emission_and_reset_interval() {
        let mut recorder = CheckpointRecorder::new(30, AuditTicks::new([7, 40]));
        let emitted: Vec<u32> = (1..=75)
            .filter_map(|t| recorder.observe(&state_at(t)))
            .map(|c| c.tick)
            .collect();
        assert_eq!(emitted, vec![7, 37, 40, 70]);
    }

    #[test]
    fn test_force_once_per_tick() {
        let mut recorder = CheckpointRecorder::new(30, AuditTicks::none());
        assert!(recorder.observe(&state_at(30)).is_some());
        assert!(recorder.force(&state_at(30)).is_none());
        assert!(recorder.force(&state_at(31)).is_some());
        assert_eq!(recorder.emitted(), 2);
    }

    #[test]
    fn test_first_checkpoint_chains_from_zero() {
        let mut recorder = CheckpointRecorder::new(30, AuditTicks::none());
        let state = state_at(30);
        let cp = recorder.observe(&state).unwrap();
        assert_eq!(cp.chain_hash, chain_hash(0, 30, state.compute_hash()));
        assert_eq!(recorder.chain(), cp.chain_hash);
    }

    #[test]
    fn test_verify_chain_finds_first_break() {
        let mut recorder = CheckpointRecorder::new(30, AuditTicks::none());
        let cps: Vec<Checkpoint> = (1..=120).filter_map(|t| recorder.observe(&state_at(t))).collect();
        assert_eq!(verify_chain(&cps, 0), Ok(recorder.chain()));

        let mut tampered = cps.clone();
        tampered[2].state_hash ^= 1;
        assert_eq!(verify_chain(&tampered, 0), Err(2));
    }

    #[test]
    fn test_wire_names() {
        let cp = Checkpoint { tick: 30, state_hash: 1, chain_hash: 2 };
        let json = serde_json::to_value(cp).unwrap();
        assert_eq!(json, serde_json::json!({"tick": 30, "stateHash32": 1, "chainHash32": 2}));
    }
}
