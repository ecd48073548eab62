//! Client Session Driver
//!
//! Drives one run on the client: stamps player commands with the next tick,
//! steps the engine, collects events and checkpoints into the open segment
//! and closes it at the first segment boundary.
//!
//! ```text
//! Active ──rejected──▶ Terminated
//!   │ ├───retries exhausted──▶ Abandoned
//!   │ └───final segment accepted──▶ Completed
//! ```
//!
//! Verified totals only ever grow from accepted verdicts.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::rng::Seed;
use crate::game::config::SimConfig;
use crate::game::engine::{Engine, EngineError};
use crate::game::events::{Command, GameEvent, SimNotice};
use crate::game::state::{GameState, SNAP_CHARGE_MAX};
use crate::network::submit::{submit_with_retry, RetryPolicy, SegmentTransport, SubmissionOutcome};
use crate::proof::audit::AuditTicks;
use crate::proof::checkpoint::Checkpoint;
use crate::proof::segment::{OpenSegment, SegmentSubmission};
use crate::proof::verify::{Verdict, VerifiedSummary};

/// What the server hands out when a session starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTicket {
    /// Opaque token binding submissions to this session
    pub token: String,
    /// Simulation seed
    pub seed: Seed,
    /// Mandatory checkpoint ticks
    pub audit_ticks: AuditTicks,
    /// Mode configuration
    pub config: SimConfig,
}

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Playing or waiting on verdicts
    Active,
    /// A segment was rejected
    Terminated,
    /// Submission retries ran out
    Abandoned,
    /// The run ended and every segment was accepted
    Completed,
}

/// Session driver errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session no longer accepts input
    #[error("session is {0:?}")]
    NotActive(SessionStatus),

    /// Engine refused the step
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Totals accumulated from accepted segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedTotals {
    /// Accepted segments
    pub segments: u32,
    /// Waves cleared
    pub waves_cleared: u32,
    /// Damage dealt, raw Q16.16
    pub damage_dealt: i64,
    /// Kills
    pub kills: u32,
    /// Gold
    pub gold: u64,
    /// Dust
    pub dust: u64,
    /// Xp
    pub xp: u64,
}

impl VerifiedTotals {
    /// Add an accepted segment.
    pub fn add(&mut self, summary: &VerifiedSummary) {
        self.segments = self.segments.saturating_add(1);
        self.waves_cleared = self.waves_cleared.saturating_add(summary.waves_cleared);
        self.damage_dealt = self.damage_dealt.saturating_add(summary.damage_dealt);
        self.kills = self.kills.saturating_add(summary.kills);
        self.gold = self.gold.saturating_add(summary.gold);
        self.dust = self.dust.saturating_add(summary.dust);
        self.xp = self.xp.saturating_add(summary.xp);
    }
}

/// Result of one session step.
#[derive(Clone, Debug)]
pub struct SessionStep {
    /// Tick after the step
    pub tick: u32,
    /// Periodic or audit checkpoint emitted this tick
    pub checkpoint: Option<Checkpoint>,
    /// Segment closed this tick, ready to submit
    pub closed: Option<SegmentSubmission>,
    /// Simulation notices
    pub notices: Vec<SimNotice>,
}

/// Client-side driver for one run.
#[derive(Debug)]
pub struct Session {
    token: String,
    engine: Engine,
    open: Option<OpenSegment>,
    status: SessionStatus,
    totals: VerifiedTotals,
}

impl Session {
    /// Start driving a run from a server ticket.
    pub fn start(ticket: SessionTicket) -> Self {
        let engine = Engine::with_audit_ticks(ticket.seed, ticket.config, ticket.audit_ticks);
        let open = Some(OpenSegment::open(engine.state()));
        info!(token = %ticket.token, seed = ticket.seed, "Session started");
        Self {
            token: ticket.token,
            engine,
            open,
            status: SessionStatus::Active,
            totals: VerifiedTotals::default(),
        }
    }

    /// Session token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Totals from accepted segments.
    pub fn totals(&self) -> &VerifiedTotals {
        &self.totals
    }

    /// Current run state.
    pub fn state(&self) -> &GameState {
        self.engine.state()
    }

    /// Current tick.
    pub fn tick(&self) -> u32 {
        self.engine.tick()
    }

    /// Advance one tick with this tick's player commands.
    pub fn step(&mut self, commands: &[Command]) -> Result<SessionStep, SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::NotActive(self.status));
        }

        let tick = self.engine.tick() + 1;
        let events: Vec<GameEvent> = commands.iter().map(|c| GameEvent::new(tick, *c)).collect();
        let outcome = self.engine.step(&events)?;

        let mut closable = false;
        if let Some(open) = self.open.as_mut() {
            open.record_events(&events);
            if let Some(checkpoint) = outcome.checkpoint {
                open.record_checkpoint(checkpoint);
            }
            closable = open.is_closable(self.engine.state());
        }
        let closed = if closable { self.close_segment() } else { None };

        Ok(SessionStep {
            tick: outcome.tick,
            checkpoint: outcome.checkpoint,
            closed,
            notices: outcome.notices,
        })
    }

    fn close_segment(&mut self) -> Option<SegmentSubmission> {
        let mut open = self.open.take()?;
        if let Some(checkpoint) = self.engine.force_checkpoint() {
            open.record_checkpoint(checkpoint);
        }
        let (segment, summary) = open.close(self.engine.state(), self.engine.chain_head());

        // The next segment starts right where this one closed
        if !self.engine.state().is_ended() {
            self.open = Some(OpenSegment::open(self.engine.state()));
        }

        debug!(
            start_wave = segment.start_wave,
            end_wave = segment.end_wave,
            end_tick = segment.end_tick,
            events = segment.events.len(),
            checkpoints = segment.checkpoints.len(),
            final_hash = %format!("{:08x}", segment.final_hash),
            "Segment closed"
        );

        Some(SegmentSubmission {
            session_token: self.token.clone(),
            segment,
            summary: Some(summary),
        })
    }

    /// Apply the server's verdict for a submitted segment.
    pub fn record_verdict(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Accepted(summary) => {
                self.totals.add(summary);
                if summary.ended && self.status == SessionStatus::Active {
                    self.status = SessionStatus::Completed;
                }
                info!(
                    end_wave = summary.end_wave,
                    kills = summary.kills,
                    segments = self.totals.segments,
                    "Segment accepted"
                );
            }
            Verdict::Rejected(rejection) => {
                warn!(reason = %rejection.reason, detail = %rejection.detail, "Segment rejected, session terminated");
                self.status = SessionStatus::Terminated;
                self.open = None;
            }
        }
    }

    /// Stop after exhausting submission retries. Totals from earlier accepted
    /// segments are kept; the unsent segment and any open one are dropped.
    pub fn abandon(&mut self) {
        warn!(segments = self.totals.segments, "Session abandoned");
        self.status = SessionStatus::Abandoned;
        self.open = None;
    }

    /// Play until the session leaves `Active` or `max_ticks` more ticks have
    /// run, choosing commands with `bot` and submitting each closed segment
    /// through `transport`.
    pub async fn play<T, B>(
        &mut self,
        transport: &T,
        policy: &RetryPolicy,
        mut bot: B,
        max_ticks: u32,
    ) -> Result<SessionStatus, SessionError>
    where
        T: SegmentTransport,
        B: FnMut(&GameState) -> Vec<Command>,
    {
        for _ in 0..max_ticks {
            if self.status != SessionStatus::Active {
                break;
            }
            let commands = if self.engine.state().is_ended() { Vec::new() } else { bot(self.engine.state()) };
            let step = self.step(&commands)?;

            if let Some(submission) = step.closed {
                match submit_with_retry(transport, &submission, policy).await {
                    SubmissionOutcome::Accepted(summary) => self.record_verdict(&Verdict::Accepted(summary)),
                    SubmissionOutcome::Rejected(rejection) => self.record_verdict(&Verdict::Rejected(rejection)),
                    SubmissionOutcome::Abandoned { .. } => self.abandon(),
                }
            } else if self.engine.state().is_ended() && self.open.is_none() {
                // Final segment already delivered
                break;
            }
        }
        Ok(self.status)
    }
}

/// Simple player: takes the first relic offered and fires snap when charged.
pub fn autopilot(state: &GameState) -> Vec<Command> {
    if state.is_ended() {
        return Vec::new();
    }
    if let Some(choice) = &state.pending_choice {
        return vec![Command::ChooseRelic { wave: choice.wave, option_index: 0 }];
    }
    if state.fortress.snap_charge >= SNAP_CHARGE_MAX && state.living_enemies() > 0 {
        return vec![Command::ActivateSnap];
    }
    Vec::new()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::submit::TransportError;
    use crate::proof::verify::{RejectReason, ReplayVerifier, VerdictWire};
    use std::sync::Mutex;

    fn ticket(seed: Seed) -> SessionTicket {
        SessionTicket {
            token: "session-1".into(),
            seed,
            audit_ticks: AuditTicks::new([17, 95]),
            config: SimConfig::endless(),
        }
    }

    fn play_until_closed(session: &mut Session) -> SegmentSubmission {
        for _ in 0..50_000 {
            let commands = autopilot(session.state());
            if let Some(closed) = session.step(&commands).unwrap().closed {
                return closed;
            }
        }
        panic!("segment never closed");
    }

    /// Verifies locally against its own trusted engine.
    struct Loopback {
        engine: Mutex<Engine>,
        verifier: ReplayVerifier,
    }

    impl Loopback {
        fn new(ticket: &SessionTicket) -> Self {
            Self {
                engine: Mutex::new(Engine::with_audit_ticks(
                    ticket.seed,
                    ticket.config.clone(),
                    ticket.audit_ticks.clone(),
                )),
                verifier: ReplayVerifier::default(),
            }
        }
    }

    impl SegmentTransport for Loopback {
        async fn send(&self, submission: &SegmentSubmission) -> Result<VerdictWire, TransportError> {
            let mut engine = self.engine.lock().map_err(|e| TransportError::Unavailable(e.to_string()))?;
            let verdict = self.verifier.verify_on(&mut engine, &submission.segment, submission.summary.as_ref());
            Ok(VerdictWire::from(&verdict))
        }
    }

    struct Down;

    impl SegmentTransport for Down {
        async fn send(&self, _submission: &SegmentSubmission) -> Result<VerdictWire, TransportError> {
            Err(TransportError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_totals_saturate() {
        let summary = VerifiedSummary {
            start_wave: 1,
            end_wave: 1,
            waves_cleared: u32::MAX,
            damage_dealt: i64::MAX,
            kills: u32::MAX,
            gold: u64::MAX,
            dust: 3,
            xp: u64::MAX,
            ticks: 90,
            fortress_hp: 0,
            ended: false,
            end_reason: None,
            final_hash: 0,
        };
        let mut totals = VerifiedTotals { segments: u32::MAX, kills: 7, ..Default::default() };
        totals.add(&summary);
        totals.add(&summary);

        assert_eq!(totals.segments, u32::MAX);
        assert_eq!(totals.waves_cleared, u32::MAX);
        assert_eq!(totals.damage_dealt, i64::MAX);
        assert_eq!(totals.kills, u32::MAX);
        assert_eq!(totals.gold, u64::MAX);
        assert_eq!(totals.dust, 6);
    }

    #[test]
    fn test_first_segment_closes_at_wave_boundary() {
        let mut session = Session::start(ticket(42));
        let submission = play_until_closed(&mut session);
        let segment = &submission.segment;

        assert_eq!(submission.session_token, "session-1");
        assert_eq!(segment.start_wave, 1);
        assert_eq!(segment.start_tick, 0);
        assert_eq!(segment.end_tick, session.tick());
        assert!(segment.checkpoints.iter().any(|c| c.tick == 17));
        assert_eq!(segment.checkpoints.last().map(|c| c.tick), Some(segment.end_tick));
        assert_eq!(segment.checkpoints.last().map(|c| c.chain_hash), Some(segment.final_hash));
        assert!(submission.summary.is_some());
    }

    #[test]
    fn test_honest_segments_verify() {
        let t = ticket(7);
        let mut session = Session::start(t.clone());
        let verifier = ReplayVerifier::default();
        let mut trusted = Engine::with_audit_ticks(t.seed, t.config.clone(), t.audit_ticks.clone());

        for _ in 0..2 {
            let submission = play_until_closed(&mut session);
            let verdict = verifier.verify_on(&mut trusted, &submission.segment, submission.summary.as_ref());
            assert!(verdict.is_accepted(), "{:?}", verdict);
            session.record_verdict(&verdict);
        }
        assert_eq!(session.totals().segments, 2);
        assert!(session.totals().waves_cleared >= 2);
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[test]
    fn test_rejection_terminates() {
        let mut session = Session::start(ticket(3));
        session.record_verdict(&Verdict::reject(RejectReason::FinalHashMismatch, "forged"));
        assert_eq!(session.status(), SessionStatus::Terminated);
        assert_eq!(
            session.step(&[]).unwrap_err(),
            SessionError::NotActive(SessionStatus::Terminated)
        );
    }

    #[tokio::test]
    async fn test_play_runs_to_completion() {
        let mut t = ticket(11);
        t.config.limits.max_ticks = Some(3_000);
        let transport = Loopback::new(&t);
        let mut session = Session::start(t);

        let status = session.play(&transport, &RetryPolicy::default(), autopilot, 10_000).await.unwrap();
        assert_eq!(status, SessionStatus::Completed);
        assert!(session.state().is_ended());
        assert!(session.totals().segments >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_abandon_session() {
        let mut session = Session::start(ticket(5));
        let status = session.play(&Down, &RetryPolicy::default(), autopilot, 50_000).await.unwrap();
        assert_eq!(status, SessionStatus::Abandoned);
        assert_eq!(session.totals(), &VerifiedTotals::default());
        assert!(matches!(session.step(&[]), Err(SessionError::NotActive(SessionStatus::Abandoned))));
    }
}
