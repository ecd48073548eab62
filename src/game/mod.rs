//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `config`: Per-mode configuration (loadouts, wave tables, limits)
//! - `state`: Run state, fortress, heroes, enemies
//! - `events`: Player commands, the event log, simulation notices
//! - `relic`: Relic pool, choices and effects
//! - `wave`: Wave building, spawning and clears
//! - `combat`: Targeting, movement, attacks, status effects
//! - `tick`: Authoritative simulation step
//! - `engine`: Engine wrapper with checkpointing
//! - `arena`: Non-interactive PvP and guild battles

pub mod config;
pub mod state;
pub mod events;
pub mod relic;
pub mod wave;
pub mod combat;
pub mod tick;
pub mod engine;
pub mod arena;

// Re-export key types
pub use config::{GameMode, HeroKind, Loadout, SimConfig, SkillId};
pub use state::{EndReason, GameState, RunPhase, RunStats};
pub use events::{Command, EventLog, GameEvent, SimNotice};
pub use engine::{Engine, EngineError, StepOutcome};
pub use arena::{simulate_battle, BattleConfig, BattleResult, Side};
