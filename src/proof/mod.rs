//! Proof of Play
//!
//! Tamper evidence for runs and the server-side replay that checks it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF OF PLAY                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  audit.rs      - Server-nominated mandatory checkpoint ticks│
//! │  checkpoint.rs - State fingerprints and the hash chain      │
//! │  segment.rs    - Segment boundaries and the wire payload    │
//! │  verify.rs     - Replay verification and verdicts           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod checkpoint;
pub mod segment;
pub mod verify;

// Re-export key types
pub use audit::AuditTicks;
pub use checkpoint::{verify_chain, Checkpoint, CheckpointRecorder};
pub use segment::{
    is_segment_boundary, segment_end_wave,
    ClaimedSummary, OpenSegment, Segment, SegmentSubmission,
};
pub use verify::{
    RejectReason, Rejection, ReplayVerifier, SummaryTolerance,
    Verdict, VerdictWire, VerifiedSummary, VerifierConfig,
};
