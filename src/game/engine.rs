//! Simulation Engine
//!
//! Owns one run's `GameState` and checkpoint recorder. Drivers call `step`
//! once per tick with that tick's events; the engine never does I/O and
//! never reads the wall clock.
//!
//! ```text
//! running ──▶ pendingChoice ──▶ running ──▶ … ──▶ ended
//!              (tick advances,              (terminal: step is a no-op)
//!               field frozen)
//! ```

use thiserror::Error;

use crate::core::hash::Hash32;
use crate::core::rng::Seed;
use crate::game::config::SimConfig;
use crate::game::events::{EventLog, GameEvent, SimNotice};
use crate::game::state::GameState;
use crate::game::tick::tick;
use crate::proof::audit::AuditTicks;
use crate::proof::checkpoint::{Checkpoint, CheckpointRecorder};

/// Engine misuse. Not a verification outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// An event was appended with a tick before the previous event's
    #[error("event at tick {tick} precedes previous event at tick {last}")]
    EventOutOfOrder {
        /// Offending tick
        tick: u32,
        /// Tick of the previous event
        last: u32,
    },

    /// An event passed to `step` is not for the tick being simulated
    #[error("event for tick {found} passed while simulating tick {expected}")]
    EventTickMismatch {
        /// Tick being simulated
        expected: u32,
        /// Tick on the event
        found: u32,
    },

    /// The run has ended; no further events are accepted
    #[error("run has ended")]
    RunEnded,
}

/// What one `step` produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Tick after the step
    pub tick: u32,
    /// Checkpoint emitted this tick, if any
    pub checkpoint: Option<Checkpoint>,
    /// Notices raised this tick
    pub notices: Vec<SimNotice>,
}

/// Deterministic simulation engine for one run.
#[derive(Clone, Debug)]
pub struct Engine {
    config: SimConfig,
    state: GameState,
    recorder: CheckpointRecorder,
}

impl Engine {
    /// Create a fresh engine from a seed and configuration.
    pub fn new(seed: Seed, config: SimConfig) -> Self {
        Self::with_audit_ticks(seed, config, AuditTicks::none())
    }

    /// Create a fresh engine with an audit-tick set.
    pub fn with_audit_ticks(seed: Seed, config: SimConfig, audit: AuditTicks) -> Self {
        let state = GameState::new(seed, &config);
        let recorder = CheckpointRecorder::new(config.checkpoint_interval, audit);
        Self { config, state, recorder }
    }

    /// Replace the audit-tick set.
    pub fn set_audit_ticks(&mut self, audit: AuditTicks) {
        self.recorder.set_audit_ticks(audit);
    }

    /// Advance one tick, applying `events` (all stamped with the next tick).
    ///
    /// After the run has ended this is a no-op that refuses events.
    pub fn step(&mut self, events: &[GameEvent]) -> Result<StepOutcome, EngineError> {
        if self.state.is_ended() {
            if !events.is_empty() {
                return Err(EngineError::RunEnded);
            }
            return Ok(StepOutcome { tick: self.state.tick, ..StepOutcome::default() });
        }

        let expected = self.state.tick + 1;
        if let Some(event) = events.iter().find(|e| e.tick != expected) {
            return Err(EngineError::EventTickMismatch { expected, found: event.tick });
        }

        let result = tick(&mut self.state, events, &self.config);
        let checkpoint = self.recorder.observe(&self.state);

        Ok(StepOutcome {
            tick: self.state.tick,
            checkpoint,
            notices: result.notices,
        })
    }

    /// Step until `end_tick` (or the run ends), feeding events from `log`.
    /// Returns every checkpoint emitted on the way.
    pub fn run_until(&mut self, log: &EventLog, end_tick: u32) -> Result<Vec<Checkpoint>, EngineError> {
        let mut checkpoints = Vec::new();
        while self.state.tick < end_tick && !self.state.is_ended() {
            let outcome = self.step(log.events_at(self.state.tick + 1))?;
            checkpoints.extend(outcome.checkpoint);
        }
        Ok(checkpoints)
    }

    /// Emit a checkpoint at the current tick unless one was already emitted.
    pub fn force_checkpoint(&mut self) -> Option<Checkpoint> {
        self.recorder.force(&self.state)
    }

    /// Current state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Run configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current tick.
    pub fn tick(&self) -> u32 {
        self.state.tick
    }

    /// Audit ticks in use.
    pub fn audit_ticks(&self) -> &AuditTicks {
        self.recorder.audit_ticks()
    }

    /// Current chain head.
    pub fn chain_head(&self) -> Hash32 {
        self.recorder.chain()
    }

    /// Tick of the last checkpoint.
    pub fn last_checkpoint_tick(&self) -> u32 {
        self.recorder.last_tick()
    }
}

// =============================================================================
// TESTS
// =============================================================================
