//! Parallel Verification
//!
//! Replays are CPU-bound and share nothing, so each one runs on the blocking
//! thread pool. A semaphore bounds how many run at once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

use crate::core::rng::Seed;
use crate::game::config::SimConfig;
use crate::proof::audit::AuditTicks;
use crate::proof::segment::{ClaimedSummary, Segment};
use crate::proof::verify::{ReplayVerifier, Verdict};

/// Pool failures. Never a verification outcome.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The semaphore was closed
    #[error("verification pool is closed")]
    Closed,

    /// A verification task panicked or was cancelled
    #[error("verification task failed: {0}")]
    Join(#[from] JoinError),
}

/// Everything needed to verify one segment from scratch.
#[derive(Clone, Debug)]
pub struct VerificationJob {
    /// Session seed
    pub seed: Seed,
    /// Mode configuration
    pub config: SimConfig,
    /// Session audit ticks
    pub audit: AuditTicks,
    /// Segments already accepted for the session, in order
    pub accepted: Vec<Segment>,
    /// Segment to verify
    pub candidate: Segment,
    /// Client-reported figures
    pub claimed: Option<ClaimedSummary>,
}

/// Bounded pool of replay workers.
#[derive(Clone, Debug)]
pub struct VerificationPool {
    permits: Arc<Semaphore>,
    verifier: ReplayVerifier,
}

impl VerificationPool {
    /// Create a pool running at most `max_concurrent` replays at once.
    pub fn new(max_concurrent: usize, verifier: ReplayVerifier) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            verifier,
        }
    }

    /// Verifier the workers use.
    pub fn verifier(&self) -> &ReplayVerifier {
        &self.verifier
    }

    /// Run `job` on the blocking pool once a permit is free.
    pub async fn run<F, R>(&self, job: F) -> Result<R, PoolError>
    where
        F: FnOnce(&ReplayVerifier) -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.map_err(|_| PoolError::Closed)?;
        let verifier = self.verifier.clone();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&verifier)
        })
        .await?;
        Ok(result)
    }

    /// Verify independent jobs concurrently. Verdicts come back in job order.
    pub async fn verify_all(&self, jobs: Vec<VerificationJob>) -> Result<Vec<Verdict>, PoolError> {
        let count = jobs.len();
        let mut set = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let pool = self.clone();
            set.spawn(async move {
                let verdict = pool
                    .run(move |verifier| {
                        verifier.verify_from_seed(
                            job.seed,
                            &job.config,
                            &job.audit,
                            &job.accepted,
                            &job.candidate,
                            job.claimed.as_ref(),
                        )
                    })
                    .await?;
                Ok::<_, PoolError>((index, verdict))
            });
        }

        let mut verdicts: Vec<Option<Verdict>> = vec![None; count];
        while let Some(joined) = set.join_next().await {
            let (index, verdict) = joined??;
            verdicts[index] = Some(verdict);
        }
        debug!(jobs = count, "Batch verified");
        Ok(verdicts.into_iter().flatten().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
