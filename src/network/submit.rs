//! Segment Submission with Retry
//!
//! Delivery of a closed segment is modelled as a small explicit state
//! machine, independent of any async runtime:
//!
//! ```text
//! Idle ──▶ Submitting{n} ──verdict──▶ Accepted | Rejected
//!               │  ▲
//!   transport   │  │ resume
//!     error     ▼  │
//!          Retrying{delay, n+1} ──(n = max)──▶ Abandoned
//! ```
//!
//! `submit_with_retry` drives the machine with tokio timers.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::proof::segment::SegmentSubmission;
use crate::proof::verify::{Rejection, Verdict, VerdictWire, VerifiedSummary};

/// Exponential backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up (including the first)
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Growth factor per failure
    pub multiplier: u32,
    /// Delay ceiling
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            multiplier: 2,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Transport-level failure. Retried; never a verification outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint unreachable
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// No response in time
    #[error("request timed out")]
    Timeout,

    /// Response could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Delivers a segment and returns the verifier's answer.
pub trait SegmentTransport: Send + Sync {
    /// Send one submission.
    fn send(
        &self,
        submission: &SegmentSubmission,
    ) -> impl Future<Output = Result<VerdictWire, TransportError>> + Send;
}

/// Submission state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    /// Nothing sent yet
    Idle,
    /// Attempt in flight
    Submitting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Waiting before the next attempt
    Retrying {
        /// Wait before resuming
        delay: Duration,
        /// Attempt that will be made next
        attempt: u32,
    },
    /// Verifier accepted the segment
    Accepted(VerifiedSummary),
    /// Verifier rejected the segment
    Rejected(Rejection),
    /// Gave up after repeated transport failures
    Abandoned {
        /// Attempts made
        attempts: u32,
    },
}

impl SubmissionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting { .. } => "submitting",
            Self::Retrying { .. } => "retrying",
            Self::Accepted(_) => "accepted",
            Self::Rejected(_) => "rejected",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// An event that does not apply in the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {event} while {state}")]
pub struct InvalidTransition {
    /// State name
    pub state: &'static str,
    /// Event name
    pub event: &'static str,
}

/// Pure retry state machine for one segment.
#[derive(Clone, Debug)]
pub struct SubmissionMachine {
    policy: RetryPolicy,
    state: SubmissionState,
}

impl SubmissionMachine {
    /// Create an idle machine.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, state: SubmissionState::Idle }
    }

    /// Current state.
    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Accepted, rejected or abandoned.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SubmissionState::Accepted(_) | SubmissionState::Rejected(_) | SubmissionState::Abandoned { .. }
        )
    }

    fn invalid(&self, event: &'static str) -> InvalidTransition {
        InvalidTransition { state: self.state.name(), event }
    }

    /// Start the first attempt, or the next one after a backoff.
    pub fn begin(&mut self) -> Result<u32, InvalidTransition> {
        let attempt = match self.state {
            SubmissionState::Idle => 1,
            SubmissionState::Retrying { attempt, .. } => attempt,
            _ => return Err(self.invalid("begin")),
        };
        self.state = SubmissionState::Submitting { attempt };
        Ok(attempt)
    }

    /// The verifier answered.
    pub fn on_verdict(&mut self, verdict: Verdict) -> Result<(), InvalidTransition> {
        if !matches!(self.state, SubmissionState::Submitting { .. }) {
            return Err(self.invalid("record verdict"));
        }
        self.state = match verdict {
            Verdict::Accepted(summary) => SubmissionState::Accepted(summary),
            Verdict::Rejected(rejection) => SubmissionState::Rejected(rejection),
        };
        Ok(())
    }

    /// The attempt failed in transport. Returns the new state.
    pub fn on_transport_error(&mut self) -> Result<&SubmissionState, InvalidTransition> {
        let attempt = match self.state {
            SubmissionState::Submitting { attempt } => attempt,
            _ => return Err(self.invalid("record transport error")),
        };
        self.state = if attempt >= self.policy.max_attempts {
            SubmissionState::Abandoned { attempts: attempt }
        } else {
            SubmissionState::Retrying {
                delay: self.policy.delay_for(attempt),
                attempt: attempt + 1,
            }
        };
        Ok(&self.state)
    }
}

/// Final result of `submit_with_retry`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Verifier said yes
    Accepted(VerifiedSummary),
    /// Verifier said no
    Rejected(Rejection),
    /// Every attempt failed in transport
    Abandoned {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: TransportError,
    },
}

/// Send `submission`, retrying transport failures with backoff.
pub async fn submit_with_retry<T: SegmentTransport>(
    transport: &T,
    submission: &SegmentSubmission,
    policy: &RetryPolicy,
) -> SubmissionOutcome {
    let mut machine = SubmissionMachine::new(*policy);
    let mut last_error = TransportError::Unavailable("no attempt made".into());

    loop {
        let attempt = match machine.begin() {
            Ok(attempt) => attempt,
            Err(_) => break,
        };
        debug!(attempt, start_wave = submission.segment.start_wave, "Submitting segment");

        match transport.send(submission).await {
            Ok(wire) => {
                let verdict = Verdict::from(wire);
                if machine.on_verdict(verdict).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "Segment submission failed");
                last_error = e;
                match machine.on_transport_error() {
                    Ok(SubmissionState::Retrying { delay, .. }) => {
                        let delay = *delay;
                        tokio::time::sleep(delay).await;
                    }
                    Ok(_) | Err(_) => {}
                }
            }
        }

        if machine.is_terminal() {
            break;
        }
    }

    match machine.state {
        SubmissionState::Accepted(summary) => SubmissionOutcome::Accepted(summary),
        SubmissionState::Rejected(rejection) => SubmissionOutcome::Rejected(rejection),
        SubmissionState::Abandoned { attempts } => {
            info!(attempts, "Giving up on segment");
            SubmissionOutcome::Abandoned { attempts, last_error }
        }
        SubmissionState::Idle | SubmissionState::Submitting { .. } | SubmissionState::Retrying { .. } => {
            SubmissionOutcome::Abandoned { attempts: 0, last_error }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
