//! Networking Module
//!
//! Session drivers around the deterministic core (non-deterministic).
//!
//! - `session`: Client-side run driver and segment packaging
//! - `submit`: Retry/backoff state machine and transport seam
//! - `registry`: Server-side session table and segment verification
//! - `pool`: Semaphore-bounded parallel replay

pub mod session;
pub mod submit;
pub mod registry;
pub mod pool;

pub use session::{autopilot, Session, SessionError, SessionStatus, SessionStep, SessionTicket, VerifiedTotals};
pub use submit::{
    submit_with_retry, RetryPolicy, SegmentTransport, SubmissionMachine,
    SubmissionOutcome, SubmissionState, TransportError,
};
pub use registry::{RegistryConfig, RegistryError, SessionRegistry};
pub use pool::{PoolError, VerificationJob, VerificationPool};
