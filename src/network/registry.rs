//! Server Session Registry
//!
//! Issues session tickets and verifies their segments in order. Each live
//! session keeps a trusted engine parked at the close of its last accepted
//! segment, so a new segment replays only its own ticks.
//!
//! A session is spent by its first rejection: later submissions under the
//! same token get `TOKEN_INVALID`. Spent and completed sessions drop their
//! engine at once; their records stay until the TTL prune.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::rng::{derive_seed, Seed};
use crate::game::config::SimConfig;
use crate::game::engine::Engine;
use crate::network::pool::{PoolError, VerificationPool};
use crate::network::session::{SessionStatus, SessionTicket, VerifiedTotals};
use crate::proof::audit::AuditTicks;
use crate::proof::segment::SegmentSubmission;
use crate::proof::verify::{RejectReason, ReplayVerifier, Verdict, VerifierConfig};
use crate::TICK_RATE;

/// Registry configuration.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// How long a session stays valid after it starts
    pub session_ttl: Duration,
    /// Replays allowed to run at once
    pub max_concurrent_verifications: usize,
    /// Verifier limits
    pub verifier: VerifierConfig,
    /// Audit ticks drawn per session
    pub audit_tick_count: u32,
    /// Audit ticks are drawn from `1..=audit_horizon`
    pub audit_horizon: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(2),
            max_concurrent_verifications: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            verifier: VerifierConfig::default(),
            audit_tick_count: 8,
            audit_horizon: TICK_RATE * 60 * 10,
        }
    }
}

/// Registry failures. Verification outcomes are `Verdict`s, not errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Config could not be fingerprinted
    #[error("failed to fingerprint config: {0}")]
    Fingerprint(#[from] bincode::Error),

    /// Verification worker failed
    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug)]
struct SessionRecord {
    status: SessionStatus,
    /// Trusted engine; `None` once the session is no longer active
    engine: Option<Engine>,
    totals: VerifiedTotals,
}

impl SessionRecord {
    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.engine = None;
    }
}

/// Table entry. `created_at` sits outside the record lock so pruning never
/// waits on an in-flight verification.
#[derive(Debug, Clone)]
struct SessionEntry {
    created_at: DateTime<Utc>,
    record: Arc<Mutex<SessionRecord>>,
}

/// Server-side session table.
pub struct SessionRegistry {
    config: RegistryConfig,
    pool: VerificationPool,
    sessions: RwLock<BTreeMap<String, SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        let pool = VerificationPool::new(
            config.max_concurrent_verifications,
            ReplayVerifier::new(config.verifier),
        );
        Self {
            config,
            pool,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Verification pool, for batch re-verification.
    pub fn pool(&self) -> &VerificationPool {
        &self.pool
    }

    /// Start a session: new token, seed derived from it, audit ticks drawn.
    pub async fn start_session(&self, config: SimConfig) -> Result<SessionTicket, RegistryError> {
        let fingerprint = config.fingerprint()?;
        let token = Uuid::new_v4().to_string();
        let seed = derive_seed(b"FORTRESS_SESSION_SEED_V1", &[token.as_bytes()]) as u32 as Seed;
        let audit_ticks = AuditTicks::derive(
            token.as_bytes(),
            seed,
            self.config.audit_horizon,
            self.config.audit_tick_count,
        );

        let record = SessionRecord {
            status: SessionStatus::Active,
            engine: Some(Engine::with_audit_ticks(seed, config.clone(), audit_ticks.clone())),
            totals: VerifiedTotals::default(),
        };
        let entry = SessionEntry {
            created_at: Utc::now(),
            record: Arc::new(Mutex::new(record)),
        };
        self.sessions.write().await.insert(token.clone(), entry);

        info!(
            token = %token,
            seed,
            mode = ?config.mode,
            audit_ticks = audit_ticks.len(),
            config = %hex::encode(&fingerprint[..8]),
            "Session issued"
        );

        Ok(SessionTicket { token, seed, audit_ticks, config })
    }

    /// Verify the next segment of a session.
    #[instrument(skip(self, submission), fields(token = %submission.session_token))]
    pub async fn submit(&self, submission: SegmentSubmission) -> Result<Verdict, RegistryError> {
        let entry = self.sessions.read().await.get(&submission.session_token).cloned();
        let Some(entry) = entry else {
            warn!("Unknown session token");
            return Ok(Verdict::reject(RejectReason::TokenInvalid, "unknown token"));
        };
        if Utc::now() - entry.created_at > self.config.session_ttl {
            warn!("Submission to expired session");
            return Ok(Verdict::reject(RejectReason::TokenInvalid, "session expired"));
        }

        let mut record = entry.record.lock().await;
        let engine = match (&record.status, &record.engine) {
            (SessionStatus::Active, Some(engine)) => engine.clone(),
            (status, _) => {
                warn!(status = ?status, "Submission to closed session");
                return Ok(Verdict::reject(RejectReason::TokenInvalid, format!("session is {:?}", status)));
            }
        };

        let (verdict, engine) = self
            .pool
            .run(move |verifier| {
                let mut engine = engine;
                let verdict = verifier.verify_on(&mut engine, &submission.segment, submission.summary.as_ref());
                (verdict, engine)
            })
            .await?;

        match &verdict {
            Verdict::Accepted(summary) => {
                record.totals.add(summary);
                if summary.ended {
                    record.finish(SessionStatus::Completed);
                } else {
                    record.engine = Some(engine);
                }
                info!(
                    end_wave = summary.end_wave,
                    ticks = summary.ticks,
                    segments = record.totals.segments,
                    "Segment verified"
                );
            }
            Verdict::Rejected(rejection) => {
                record.finish(SessionStatus::Terminated);
                warn!(
                    reason = %rejection.reason,
                    checkpoint = ?rejection.checkpoint_index,
                    detail = %rejection.detail,
                    "Segment rejected"
                );
            }
        }
        Ok(verdict)
    }

    /// Status of a session.
    pub async fn status(&self, token: &str) -> Option<SessionStatus> {
        let entry = self.sessions.read().await.get(token).cloned()?;
        let status = entry.record.lock().await.status;
        Some(status)
    }

    /// Verified totals of a session.
    pub async fn totals(&self, token: &str) -> Option<VerifiedTotals> {
        let entry = self.sessions.read().await.get(token).cloned()?;
        let totals = entry.record.lock().await.totals;
        Some(totals)
    }

    /// Number of sessions held.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions older than the TTL as of `now`. Returns how many.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.session_ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now - entry.created_at <= ttl);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(count = pruned, remaining = sessions.len(), "Pruned expired sessions");
        }
        pruned
    }

    /// Prune expired sessions every `every` until the handle is aborted.
    pub fn spawn_pruner(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = interval(every);
            loop {
                interval.tick().await;
                registry.prune_expired(Utc::now()).await;
            }
        })
    }

    #[cfg(test)]
    async fn holds_engine(&self, token: &str) -> Option<bool> {
        let entry = self.sessions.read().await.get(token).cloned()?;
        let held = entry.record.lock().await.engine.is_some();
        Some(held)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::{autopilot, Session};

    fn next_submission(session: &mut Session) -> SegmentSubmission {
        for _ in 0..50_000 {
            let commands = autopilot(session.state());
            if let Some(closed) = session.step(&commands).unwrap().closed {
                return closed;
            }
        }
        panic!("segment never closed");
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(RegistryConfig {
            max_concurrent_verifications: 2,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_ticket_is_self_consistent() {
        let registry = registry();
        let ticket = registry.start_session(SimConfig::endless()).await.unwrap();
        let expected = derive_seed(b"FORTRESS_SESSION_SEED_V1", &[ticket.token.as_bytes()]) as u32 as Seed;
        assert_eq!(ticket.seed, expected);
        assert!(!ticket.audit_ticks.is_empty());
        assert_eq!(registry.status(&ticket.token).await, Some(SessionStatus::Active));

        let other = registry.start_session(SimConfig::endless()).await.unwrap();
        assert_ne!(ticket.token, other.token);
        assert_eq!(registry.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_segments_verified_in_sequence() {
        let registry = registry();
        let ticket = registry.start_session(SimConfig::endless()).await.unwrap();
        let token = ticket.token.clone();
        let mut session = Session::start(ticket);

        for _ in 0..2 {
            let verdict = registry.submit(next_submission(&mut session)).await.unwrap();
            assert!(verdict.is_accepted(), "{:?}", verdict);
            session.record_verdict(&verdict);
        }
        let totals = registry.totals(&token).await.unwrap();
        assert_eq!(totals.segments, 2);
        assert_eq!(&totals, session.totals());
        assert_eq!(registry.holds_engine(&token).await, Some(true));
    }

    #[tokio::test]
    async fn test_completed_session_releases_engine() {
        let registry = registry();
        let mut config = SimConfig::endless();
        config.limits.max_ticks = Some(40);
        let ticket = registry.start_session(config).await.unwrap();
        let token = ticket.token.clone();
        let mut session = Session::start(ticket);

        let verdict = registry.submit(next_submission(&mut session)).await.unwrap();
        assert!(verdict.summary().unwrap().ended);
        assert_eq!(registry.status(&token).await, Some(SessionStatus::Completed));
        assert_eq!(registry.holds_engine(&token).await, Some(false));
        assert_eq!(registry.totals(&token).await.unwrap().segments, 1);
    }

    #[tokio::test]
    async fn test_rejection_spends_token() {
        let registry = registry();
        let ticket = registry.start_session(SimConfig::endless()).await.unwrap();
        let token = ticket.token.clone();
        let mut session = Session::start(ticket);

        let honest = next_submission(&mut session);
        let mut forged = honest.clone();
        forged.segment.final_hash ^= 1;

        let verdict = registry.submit(forged).await.unwrap();
        assert_eq!(verdict.reason(), Some(RejectReason::FinalHashMismatch));
        assert_eq!(registry.status(&token).await, Some(SessionStatus::Terminated));

        // Even the honest segment is refused now
        let verdict = registry.submit(honest).await.unwrap();
        assert_eq!(verdict.reason(), Some(RejectReason::TokenInvalid));
        assert_eq!(registry.holds_engine(&token).await, Some(false));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let registry = registry();
        let ticket = registry.start_session(SimConfig::endless()).await.unwrap();
        let mut session = Session::start(ticket);
        let mut submission = next_submission(&mut session);
        submission.session_token = "not-a-session".into();

        let verdict = registry.submit(submission).await.unwrap();
        assert_eq!(verdict.reason(), Some(RejectReason::TokenInvalid));
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let registry = registry();
        let ticket = registry.start_session(SimConfig::endless()).await.unwrap();

        assert_eq!(registry.prune_expired(Utc::now()).await, 0);
        let later = Utc::now() + Duration::hours(3);
        assert_eq!(registry.prune_expired(later).await, 1);
        assert_eq!(registry.status(&ticket.token).await, None);
    }

    #[tokio::test]
    async fn test_prune_skips_busy_sessions_lock() {
        let registry = registry();
        let busy = registry.start_session(SimConfig::endless()).await.unwrap();

        // Stands in for a verification in flight on this session
        let record = registry.sessions.read().await[&busy.token].record.clone();
        let _held = record.lock().await;

        let limit = std::time::Duration::from_millis(500);
        let later = Utc::now() + Duration::hours(3);
        let pruned = tokio::time::timeout(limit, registry.prune_expired(later)).await.unwrap();
        assert_eq!(pruned, 1);

        let fresh = tokio::time::timeout(limit, registry.start_session(SimConfig::endless()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tokio::time::timeout(limit, registry.session_count()).await.unwrap(), 1);
        assert_eq!(registry.status(&fresh.token).await, Some(SessionStatus::Active));
    }

    #[tokio::test]
    async fn test_pruner_task_evicts_expired() {
        let registry = Arc::new(SessionRegistry::new(RegistryConfig {
            session_ttl: Duration::zero(),
            max_concurrent_verifications: 1,
            ..Default::default()
        }));
        registry.start_session(SimConfig::endless()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let pruner = registry.spawn_pruner(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        pruner.abort();
        assert_eq!(registry.session_count().await, 0);
    }
}
