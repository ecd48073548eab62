//! # Fortress Simulation
//!
//! Deterministic tower-defense simulation with replay verification, so a
//! server can re-derive a client's run from its inputs and refuse forged
//! results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FORTRESS SIM                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - 32-bit state and chain hashing            │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── config.rs   - Mode configuration                        │
//! │  ├── state.rs    - Run state and entities                    │
//! │  ├── tick.rs     - Authoritative simulation step             │
//! │  ├── engine.rs   - Engine with checkpoint recorder           │
//! │  └── arena.rs    - PvP / guild battles                       │
//! │                                                              │
//! │  proof/          - Tamper evidence (deterministic)           │
//! │  ├── checkpoint.rs - Hash chain                              │
//! │  ├── segment.rs  - Segment payloads                          │
//! │  └── verify.rs   - Replay verifier                           │
//! │                                                              │
//! │  network/        - Drivers (non-deterministic)               │
//! │  ├── session.rs  - Client session driver                     │
//! │  ├── submit.rs   - Retry/backoff state machine               │
//! │  ├── registry.rs - Server session registry                   │
//! │  └── pool.rs     - Parallel verification                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `game/` and `proof/` modules are **100% deterministic**:
//! - No floating-point arithmetic in the tick path
//! - No HashMap (uses Vec / BTreeMap for ordered iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+ held in the state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::vec2::FixedVec2;
pub use core::rng::{DeterministicRng, Seed};
pub use game::config::SimConfig;
pub use game::engine::{Engine, EngineError};
pub use game::events::{Command, GameEvent};
pub use game::state::GameState;
pub use proof::verify::{RejectReason, ReplayVerifier, Verdict};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 30;

/// Ticks between periodic checkpoints (1 second)
pub const CHECKPOINT_INTERVAL: u32 = 30;
