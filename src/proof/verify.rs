//! Replay Verification
//!
//! The server never trusts a claimed outcome. It rebuilds the run from the
//! seed and configuration, replays the submitted events tick by tick and
//! compares every checkpoint it produces with the one the client claimed.
//!
//! Check order for one segment:
//!
//! ```text
//! caps ─▶ summary shape ─▶ tick order ─▶ replay (checkpoint k) ─▶
//!   window / boundary / end wave ─▶ final hash ─▶ summary tolerance
//! ```
//!
//! Everything a caller gets back on success comes from the replay itself.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::core::hash::Hash32;
use crate::core::rng::Seed;
use crate::game::config::SimConfig;
use crate::game::engine::Engine;
use crate::game::events::EventLog;
use crate::game::state::{EndReason, RunStats};
use crate::proof::audit::AuditTicks;
use crate::proof::checkpoint::Checkpoint;
use crate::proof::segment::{is_segment_boundary, segment_end_wave, ClaimedSummary, Segment};

/// Default cap on events per segment.
pub const DEFAULT_MAX_EVENTS: usize = 512;

/// Default cap on checkpoints per segment.
pub const DEFAULT_MAX_CHECKPOINTS: usize = 1024;

/// Default absolute slack for claimed figures.
pub const DEFAULT_TOLERANCE_ABSOLUTE: f64 = 1.0;

/// Default relative slack for claimed figures.
pub const DEFAULT_TOLERANCE_RELATIVE: f64 = 0.001;

/// Why a segment was rejected. Closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Event or checkpoint ticks go backwards
    TicksNotMonotonic,
    /// A recomputed checkpoint differs from the claimed one
    CheckpointHashMismatch,
    /// The claimed final hash is not the recomputed chain head
    FinalHashMismatch,
    /// Too many events or checkpoints
    PayloadTooLarge,
    /// Claimed figures are not finite non-negative numbers
    InvalidSummaryData,
    /// Replay diverged from the claim
    SimulationMismatch,
    /// Unknown, expired or spent session token
    TokenInvalid,
}

impl RejectReason {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicksNotMonotonic => "TICKS_NOT_MONOTONIC",
            Self::CheckpointHashMismatch => "CHECKPOINT_HASH_MISMATCH",
            Self::FinalHashMismatch => "FINAL_HASH_MISMATCH",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::InvalidSummaryData => "INVALID_SUMMARY_DATA",
            Self::SimulationMismatch => "SIMULATION_MISMATCH",
            Self::TokenInvalid => "TOKEN_INVALID",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection with context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Closed reason
    pub reason: RejectReason,
    /// Zero-based index of the offending checkpoint, when there is one
    pub checkpoint_index: Option<usize>,
    /// Human-readable detail for logs
    pub detail: String,
}

impl Rejection {
    /// Rejection without a checkpoint index.
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self { reason, checkpoint_index: None, detail: detail.into() }
    }

    /// `CHECKPOINT_HASH_MISMATCH` at `index`.
    pub fn at_checkpoint(index: usize, detail: impl Into<String>) -> Self {
        Self {
            reason: RejectReason::CheckpointHashMismatch,
            checkpoint_index: Some(index),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.checkpoint_index {
            Some(index) => write!(f, "{} at checkpoint {}: {}", self.reason, index, self.detail),
            None => write!(f, "{}: {}", self.reason, self.detail),
        }
    }
}

/// Segment outcome derived only from the verifier's own replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSummary {
    /// First wave covered
    pub start_wave: u32,
    /// Last wave covered
    pub end_wave: u32,
    /// Waves cleared during the segment
    pub waves_cleared: u32,
    /// Damage dealt during the segment, raw Q16.16
    pub damage_dealt: i64,
    /// Kills during the segment
    pub kills: u32,
    /// Gold earned during the segment
    pub gold: u64,
    /// Dust earned during the segment
    pub dust: u64,
    /// Xp earned during the segment
    pub xp: u64,
    /// Ticks covered
    pub ticks: u32,
    /// Fortress hp at the end of the segment
    pub fortress_hp: Fixed,
    /// Did the run end in this segment?
    pub ended: bool,
    /// Why it ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    /// Chain head at the end of the segment
    pub final_hash: Hash32,
}

/// Verification outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Segment replayed exactly
    Accepted(VerifiedSummary),
    /// Segment refused
    Rejected(Rejection),
}

impl Verdict {
    /// Shorthand for a rejection without an index.
    pub fn reject(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(reason, detail))
    }

    /// Was the segment accepted?
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Verified summary, if accepted.
    pub fn summary(&self) -> Option<&VerifiedSummary> {
        match self {
            Self::Accepted(summary) => Some(summary),
            Self::Rejected(_) => None,
        }
    }

    /// Rejection, if rejected.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }

    /// Reject reason, if rejected.
    pub fn reason(&self) -> Option<RejectReason> {
        self.rejection().map(|r| r.reason)
    }
}

/// Wire form of a verdict.
///
/// `{"verified":true,"summary":{…}}` or
/// `{"verified":false,"rejectReason":"CHECKPOINT_HASH_MISMATCH","checkpointIndex":1}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictWire {
    /// Accepted?
    pub verified: bool,
    /// Summary when accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<VerifiedSummary>,
    /// Reason when rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    /// Offending checkpoint when rejected on one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_index: Option<usize>,
}

impl From<&Verdict> for VerdictWire {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Accepted(summary) => Self {
                verified: true,
                summary: Some(summary.clone()),
                reject_reason: None,
                checkpoint_index: None,
            },
            Verdict::Rejected(rejection) => Self {
                verified: false,
                summary: None,
                reject_reason: Some(rejection.reason),
                checkpoint_index: rejection.checkpoint_index,
            },
        }
    }
}

impl From<VerdictWire> for Verdict {
    fn from(wire: VerdictWire) -> Self {
        match (wire.verified, wire.summary) {
            (true, Some(summary)) => Verdict::Accepted(summary),
            (true, None) => Verdict::reject(RejectReason::InvalidSummaryData, "verified verdict without summary"),
            (false, _) => Verdict::Rejected(Rejection {
                reason: wire.reject_reason.unwrap_or(RejectReason::SimulationMismatch),
                checkpoint_index: wire.checkpoint_index,
                detail: "reported by verifier".into(),
            }),
        }
    }
}

/// Slack allowed between claimed and replayed figures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryTolerance {
    /// Absolute slack
    pub absolute: f64,
    /// Slack relative to the replayed value
    pub relative: f64,
}

impl Default for SummaryTolerance {
    fn default() -> Self {
        Self {
            absolute: DEFAULT_TOLERANCE_ABSOLUTE,
            relative: DEFAULT_TOLERANCE_RELATIVE,
        }
    }
}

impl SummaryTolerance {
    /// Does `claimed` pass against `actual`?
    pub fn allows(&self, claimed: f64, actual: f64) -> bool {
        let slack = self.absolute.max(self.relative * actual.abs());
        (claimed - actual).abs() <= slack
    }
}

/// Verifier limits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Max events per segment (inclusive)
    pub max_events: usize,
    /// Max checkpoints per segment (inclusive)
    pub max_checkpoints: usize,
    /// Summary slack
    pub tolerance: SummaryTolerance,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            tolerance: SummaryTolerance::default(),
        }
    }
}

impl VerifierConfig {
    /// Load from environment variables, falling back to defaults for unset
    /// or unparsable values.
    ///
    /// - `FORTRESS_MAX_EVENTS`
    /// - `FORTRESS_MAX_CHECKPOINTS`
    /// - `FORTRESS_SUMMARY_TOLERANCE_ABS`
    /// - `FORTRESS_SUMMARY_TOLERANCE_REL`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_events: env_or("FORTRESS_MAX_EVENTS", defaults.max_events),
            max_checkpoints: env_or("FORTRESS_MAX_CHECKPOINTS", defaults.max_checkpoints),
            tolerance: SummaryTolerance {
                absolute: env_or("FORTRESS_SUMMARY_TOLERANCE_ABS", defaults.tolerance.absolute),
                relative: env_or("FORTRESS_SUMMARY_TOLERANCE_REL", defaults.tolerance.relative),
            },
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Replays segments against a trusted engine.
#[derive(Clone, Debug, Default)]
pub struct ReplayVerifier {
    config: VerifierConfig,
}

impl ReplayVerifier {
    /// Create a verifier.
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Limits in use.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify `candidate` from scratch: build a fresh engine, fast-forward
    /// through the already accepted segments, then verify the candidate.
    pub fn verify_from_seed(
        &self,
        seed: Seed,
        config: &SimConfig,
        audit: &AuditTicks,
        accepted: &[Segment],
        candidate: &Segment,
        claimed: Option<&ClaimedSummary>,
    ) -> Verdict {
        // Nothing is simulated for a malformed candidate
        if let Err(rejection) = self.precheck(candidate, claimed) {
            return Verdict::Rejected(rejection);
        }

        let mut engine = Engine::with_audit_ticks(seed, config.clone(), audit.clone());
        for (index, segment) in accepted.iter().enumerate() {
            if let Verdict::Rejected(rejection) = self.verify_on(&mut engine, segment, None) {
                return Verdict::reject(
                    RejectReason::SimulationMismatch,
                    format!("accepted segment {} no longer replays: {}", index, rejection),
                );
            }
        }
        self.verify_on(&mut engine, candidate, claimed)
    }

    /// Verify `segment` on `engine`, which must sit at the close of the
    /// previous accepted segment. The engine is advanced by the replay.
    pub fn verify_on(
        &self,
        engine: &mut Engine,
        segment: &Segment,
        claimed: Option<&ClaimedSummary>,
    ) -> Verdict {
        match self.precheck(segment, claimed).and_then(|_| self.replay(engine, segment, claimed)) {
            Ok(summary) => Verdict::Accepted(summary),
            Err(rejection) => Verdict::Rejected(rejection),
        }
    }

    /// Checks that need no simulation.
    fn precheck(&self, segment: &Segment, claimed: Option<&ClaimedSummary>) -> Result<(), Rejection> {
        if segment.events.len() > self.config.max_events {
            return Err(Rejection::new(
                RejectReason::PayloadTooLarge,
                format!("{} events, cap {}", segment.events.len(), self.config.max_events),
            ));
        }
        if segment.checkpoints.len() > self.config.max_checkpoints {
            return Err(Rejection::new(
                RejectReason::PayloadTooLarge,
                format!("{} checkpoints, cap {}", segment.checkpoints.len(), self.config.max_checkpoints),
            ));
        }

        if let Some(summary) = claimed {
            if !summary.is_well_formed() {
                return Err(Rejection::new(RejectReason::InvalidSummaryData, "non-finite or negative figure"));
            }
        }

        if segment.end_tick <= segment.start_tick {
            return Err(Rejection::new(
                RejectReason::TicksNotMonotonic,
                format!("end tick {} not after start tick {}", segment.end_tick, segment.start_tick),
            ));
        }
        let mut last = segment.start_tick;
        for event in &segment.events {
            if event.tick < last || event.tick <= segment.start_tick {
                return Err(Rejection::new(
                    RejectReason::TicksNotMonotonic,
                    format!("event at tick {} after tick {}", event.tick, last),
                ));
            }
            last = event.tick;
        }
        let mut last = segment.start_tick;
        for checkpoint in &segment.checkpoints {
            if checkpoint.tick <= last {
                return Err(Rejection::new(
                    RejectReason::TicksNotMonotonic,
                    format!("checkpoint at tick {} after tick {}", checkpoint.tick, last),
                ));
            }
            last = checkpoint.tick;
        }
        Ok(())
    }

    fn replay(
        &self,
        engine: &mut Engine,
        segment: &Segment,
        claimed: Option<&ClaimedSummary>,
    ) -> Result<VerifiedSummary, Rejection> {
        let mismatch = |detail: String| Rejection::new(RejectReason::SimulationMismatch, detail);

        let start = engine.state();
        if start.tick != segment.start_tick || start.waves_cleared + 1 != segment.start_wave {
            return Err(mismatch(format!(
                "segment starts at tick {} wave {}, run is at tick {} wave {}",
                segment.start_tick,
                segment.start_wave,
                start.tick,
                start.waves_cleared + 1
            )));
        }
        let before: RunStats = start.stats;
        let waves_before = start.waves_cleared;

        let log = EventLog::from_events(segment.events.clone())
            .map_err(|e| Rejection::new(RejectReason::TicksNotMonotonic, e.to_string()))?;

        let mut index = 0;
        while engine.tick() < segment.end_tick {
            let state = engine.state();
            if state.is_ended() {
                return Err(mismatch(format!("run ended at tick {} before end tick", state.tick)));
            }
            if state.tick > segment.start_tick && is_segment_boundary(state, segment.start_wave) {
                return Err(mismatch(format!("segment boundary reached at tick {}", state.tick)));
            }

            let outcome = engine
                .step(log.events_at(engine.tick() + 1))
                .map_err(|e| mismatch(e.to_string()))?;
            if let Some(checkpoint) = outcome.checkpoint {
                match_checkpoint(&segment.checkpoints, index, checkpoint)?;
                index += 1;
            }
        }

        if let Some(last) = log.last_tick() {
            if last > segment.end_tick {
                return Err(mismatch(format!("event at tick {} after end tick {}", last, segment.end_tick)));
            }
        }

        let state = engine.state();
        if !is_segment_boundary(state, segment.start_wave) {
            return Err(mismatch(format!("tick {} is not a segment boundary", state.tick)));
        }

        if let Some(checkpoint) = engine.force_checkpoint() {
            match_checkpoint(&segment.checkpoints, index, checkpoint)?;
            index += 1;
        }
        if index < segment.checkpoints.len() {
            return Err(Rejection::at_checkpoint(index, "claimed checkpoint was never emitted"));
        }

        let state = engine.state();
        let end_wave = segment_end_wave(state, segment.start_wave);
        if end_wave != segment.end_wave {
            return Err(mismatch(format!("end wave {} claimed, replay reached {}", segment.end_wave, end_wave)));
        }

        let chain = engine.chain_head();
        if segment.final_hash != chain {
            return Err(Rejection::new(
                RejectReason::FinalHashMismatch,
                format!("claimed {:08x}, replay {:08x}", segment.final_hash, chain),
            ));
        }

        let after = state.stats;
        let waves_cleared = state.waves_cleared - waves_before;

        if let Some(claim) = claimed {
            let actual = ClaimedSummary::between(&before, &after, waves_cleared);
            const FIELDS: [&str; 6] = ["damageDealt", "kills", "gold", "dust", "xp", "wavesCleared"];
            for ((name, c), a) in FIELDS.iter().zip(claim.figures()).zip(actual.figures()) {
                if !self.config.tolerance.allows(c, a) {
                    return Err(mismatch(format!("{} claimed {}, replay {}", name, c, a)));
                }
            }
        }

        Ok(VerifiedSummary {
            start_wave: segment.start_wave,
            end_wave,
            waves_cleared,
            damage_dealt: after.damage_dealt - before.damage_dealt,
            kills: after.kills - before.kills,
            gold: after.gold - before.gold,
            dust: after.dust - before.dust,
            xp: after.xp - before.xp,
            ticks: segment.end_tick - segment.start_tick,
            fortress_hp: state.fortress.hp,
            ended: state.is_ended(),
            end_reason: state.ended,
            final_hash: chain,
        })
    }
}

/// Compare the replay's `index`-th checkpoint with the claim.
fn match_checkpoint(claimed: &[Checkpoint], index: usize, actual: Checkpoint) -> Result<(), Rejection> {
    match claimed.get(index) {
        Some(c) if *c == actual => Ok(()),
        Some(c) => Err(Rejection::at_checkpoint(
            index,
            format!(
                "claimed tick {} state {:08x} chain {:08x}, replay tick {} state {:08x} chain {:08x}",
                c.tick, c.state_hash, c.chain_hash, actual.tick, actual.state_hash, actual.chain_hash
            ),
        )),
        None => Err(Rejection::at_checkpoint(
            index,
            format!("missing checkpoint for tick {}", actual.tick),
        )),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::{Command, GameEvent};
    use crate::proof::segment::OpenSegment;

    /// Play honestly until the next segment boundary.
    fn play_segment(engine: &mut Engine, events: &[GameEvent]) -> (Segment, ClaimedSummary) {
        let log = EventLog::from_events(events.to_vec()).unwrap();
        let mut open = OpenSegment::open(engine.state());
        for _ in 0..50_000 {
            let batch = log.events_at(engine.tick() + 1);
            let outcome = engine.step(batch).unwrap();
            open.record_events(batch);
            if let Some(cp) = outcome.checkpoint {
                open.record_checkpoint(cp);
            }
            if open.is_closable(engine.state()) {
                if let Some(cp) = engine.force_checkpoint() {
                    open.record_checkpoint(cp);
                }
                return open.close(engine.state(), engine.chain_head());
            }
        }
        panic!("no segment boundary reached");
    }

    fn pick(tick: u32) -> GameEvent {
        GameEvent::new(tick, Command::ChooseRelic { wave: 1, option_index: 0 })
    }

    fn first_segment(extra: &[GameEvent]) -> (Segment, ClaimedSummary) {
        let mut events = vec![pick(1)];
        events.extend_from_slice(extra);
        let mut engine = Engine::new(42, SimConfig::endless());
        play_segment(&mut engine, &events)
    }

    fn verify(segment: &Segment, claimed: Option<&ClaimedSummary>) -> Verdict {
        ReplayVerifier::default().verify_from_seed(
            42,
            &SimConfig::endless(),
            &AuditTicks::none(),
            &[],
            segment,
            claimed,
        )
    }

    #[test]
    fn test_honest_segment_accepted() {
        let (segment, claim) = first_segment(&[]);
        assert!(segment.checkpoints.len() >= 2);

        let verdict = verify(&segment, Some(&claim));
        let summary = verdict.summary().expect("accepted");
        assert_eq!(summary.start_wave, 1);
        assert_eq!(summary.end_wave, segment.end_wave);
        assert_eq!(summary.final_hash, segment.final_hash);
        assert_eq!(summary.ticks, segment.end_tick);
        assert_eq!(summary.kills as f64, claim.kills);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let (segment, claim) = first_segment(&[]);
        assert_eq!(verify(&segment, Some(&claim)), verify(&segment, Some(&claim)));
    }

    #[test]
    fn test_event_cap_boundary() {
        // Dropped commands leave the state untouched but still count
        let extra: Vec<GameEvent> = (2..5).map(|t| GameEvent::new(t, Command::RerollRelics)).collect();
        let (segment, _) = first_segment(&extra);
        assert_eq!(segment.events.len(), 4);

        let at_cap = VerifierConfig { max_events: 4, ..Default::default() };
        assert!(ReplayVerifier::new(at_cap)
            .verify_from_seed(42, &SimConfig::endless(), &AuditTicks::none(), &[], &segment, None)
            .is_accepted());

        let below = VerifierConfig { max_events: 3, ..Default::default() };
        let verdict = ReplayVerifier::new(below)
            .verify_from_seed(42, &SimConfig::endless(), &AuditTicks::none(), &[], &segment, None);
        assert_eq!(verdict.reason(), Some(RejectReason::PayloadTooLarge));
    }

    #[test]
    fn test_checkpoint_cap_boundary() {
        let (segment, _) = first_segment(&[]);
        let n = segment.checkpoints.len();
        let run = |max_checkpoints| {
            ReplayVerifier::new(VerifierConfig { max_checkpoints, ..Default::default() })
                .verify_from_seed(42, &SimConfig::endless(), &AuditTicks::none(), &[], &segment, None)
        };
        assert!(run(n).is_accepted());
        assert_eq!(run(n - 1).reason(), Some(RejectReason::PayloadTooLarge));
    }

    #[test]
    fn test_ticks_not_monotonic() {
        let (mut segment, _) = first_segment(&[]);
        segment.events.push(GameEvent::new(40, Command::RerollRelics));
        segment.events.push(GameEvent::new(20, Command::RerollRelics));
        assert_eq!(verify(&segment, None).reason(), Some(RejectReason::TicksNotMonotonic));

        let (mut segment, _) = first_segment(&[]);
        segment.events.insert(0, GameEvent::new(0, Command::RerollRelics));
        assert_eq!(verify(&segment, None).reason(), Some(RejectReason::TicksNotMonotonic));

        let (mut segment, _) = first_segment(&[]);
        segment.checkpoints.swap(0, 1);
        assert_eq!(verify(&segment, None).reason(), Some(RejectReason::TicksNotMonotonic));
    }

    #[test]
    fn test_altered_state_hash_rejected_at_that_checkpoint() {
        let (mut segment, _) = first_segment(&[]);
        segment.checkpoints[1].state_hash ^= 0xdead_beef;

        let verdict = verify(&segment, None);
        let rejection = verdict.rejection().expect("rejected");
        assert_eq!(rejection.reason, RejectReason::CheckpointHashMismatch);
        assert_eq!(rejection.checkpoint_index, Some(1));
    }

    #[test]
    fn test_dropped_checkpoint_rejected() {
        let (mut segment, _) = first_segment(&[]);
        segment.checkpoints.remove(0);
        let verdict = verify(&segment, None);
        assert_eq!(verdict.reason(), Some(RejectReason::CheckpointHashMismatch));
        assert_eq!(verdict.rejection().unwrap().checkpoint_index, Some(0));
    }

    #[test]
    fn test_final_hash_mismatch() {
        let (mut segment, _) = first_segment(&[]);
        segment.final_hash ^= 1;
        assert_eq!(verify(&segment, None).reason(), Some(RejectReason::FinalHashMismatch));
    }

    #[test]
    fn test_summary_tolerance() {
        let (segment, claim) = first_segment(&[]);

        let close = ClaimedSummary { damage_dealt: claim.damage_dealt + 0.5, ..claim };
        assert!(verify(&segment, Some(&close)).is_accepted());

        let inflated = ClaimedSummary { kills: claim.kills + 5.0, ..claim };
        assert_eq!(verify(&segment, Some(&inflated)).reason(), Some(RejectReason::SimulationMismatch));

        let broken = ClaimedSummary { gold: f64::INFINITY, ..claim };
        assert_eq!(verify(&segment, Some(&broken)).reason(), Some(RejectReason::InvalidSummaryData));
    }

    #[test]
    fn test_tolerance_from_env() {
        // Only this test touches these variables
        std::env::set_var("FORTRESS_SUMMARY_TOLERANCE_ABS", " 10 ");
        std::env::set_var("FORTRESS_SUMMARY_TOLERANCE_REL", "0.5");
        std::env::set_var("FORTRESS_MAX_CHECKPOINTS", "lots");
        let config = VerifierConfig::from_env();
        std::env::remove_var("FORTRESS_SUMMARY_TOLERANCE_ABS");
        std::env::remove_var("FORTRESS_SUMMARY_TOLERANCE_REL");
        std::env::remove_var("FORTRESS_MAX_CHECKPOINTS");

        assert_eq!(config.tolerance, SummaryTolerance { absolute: 10.0, relative: 0.5 });
        assert_eq!(config.max_checkpoints, DEFAULT_MAX_CHECKPOINTS);
        assert_eq!(config.max_events, DEFAULT_MAX_EVENTS);

        // The widened slack admits a claim the defaults refuse
        let (segment, claim) = first_segment(&[]);
        let inflated = ClaimedSummary { kills: claim.kills + 5.0, ..claim };
        assert_eq!(verify(&segment, Some(&inflated)).reason(), Some(RejectReason::SimulationMismatch));
        let verdict = ReplayVerifier::new(config).verify_from_seed(
            42,
            &SimConfig::endless(),
            &AuditTicks::none(),
            &[],
            &segment,
            Some(&inflated),
        );
        assert!(verdict.is_accepted(), "{:?}", verdict);
    }

    #[test]
    fn test_event_after_end_tick() {
        let (mut segment, _) = first_segment(&[]);
        segment.events.push(GameEvent::new(segment.end_tick + 3, Command::RerollRelics));
        assert_eq!(verify(&segment, None).reason(), Some(RejectReason::SimulationMismatch));
    }

    #[test]
    fn test_end_tick_must_be_first_boundary() {
        let (mut segment, _) = first_segment(&[]);
        segment.end_tick += 30;
        assert_eq!(verify(&segment, None).reason(), Some(RejectReason::SimulationMismatch));
    }

    #[test]
    fn test_segments_chain_across_verifications() {
        let mut engine = Engine::new(42, SimConfig::endless());
        let (first, _) = play_segment(&mut engine, &[pick(1)]);
        let (second, claim) = play_segment(&mut engine, &[]);
        assert_eq!(second.start_tick, first.end_tick);
        assert_eq!(second.start_wave, 2);

        let verifier = ReplayVerifier::default();
        let config = SimConfig::endless();
        let audit = AuditTicks::none();
        let verdict = verifier.verify_from_seed(42, &config, &audit, &[first.clone()], &second, Some(&claim));
        assert!(verdict.is_accepted());

        // Out of context the second segment does not line up
        let alone = verifier.verify_from_seed(42, &config, &audit, &[], &second, None);
        assert_eq!(alone.reason(), Some(RejectReason::SimulationMismatch));

        // Trusted engine path gives the same verdict
        let mut trusted = Engine::new(42, config);
        assert!(verifier.verify_on(&mut trusted, &first, None).is_accepted());
        assert_eq!(verifier.verify_on(&mut trusted, &second, Some(&claim)), verdict);
    }

    #[test]
    fn test_verdict_wire_shape() {
        let verdict = Verdict::Rejected(Rejection::at_checkpoint(1, "x"));
        let json = serde_json::to_value(VerdictWire::from(&verdict)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"verified": false, "rejectReason": "CHECKPOINT_HASH_MISMATCH", "checkpointIndex": 1})
        );
        let back = Verdict::from(serde_json::from_value::<VerdictWire>(json).unwrap());
        assert_eq!(back.reason(), Some(RejectReason::CheckpointHashMismatch));
    }

    #[test]
    fn test_tolerance_rule() {
        let tol = SummaryTolerance::default();
        assert!(tol.allows(101.0, 100.0));
        assert!(!tol.allows(101.5, 100.0));
        assert!(tol.allows(10_009.0, 10_000.0));
        assert!(!tol.allows(10_011.0, 10_000.0));
    }
}
