//! Segments
//!
//! A segment is the submittable slice of a run between two verification
//! boundaries: the events the player sent and the checkpoints the engine
//! emitted, closed off by the chain hash at the boundary tick.
//!
//! Wire format (`SegmentSubmission`):
//!
//! ```json
//! {
//!   "sessionToken": "…",
//!   "startWave": 1, "endWave": 1, "startTick": 0, "endTick": 412,
//!   "events": [{"tick":150,"type":"CHOOSE_RELIC","wave":1,"optionIndex":0}],
//!   "checkpoints": [{"tick":30,"stateHash32":…,"chainHash32":…}],
//!   "finalHash": 2864434397,
//!   "summary": {"damageDealt": 96.5, "kills": 6, …}
//! }
//! ```

use serde::{Serialize, Deserialize};

use crate::core::fixed::FIXED_ONE;
use crate::core::hash::Hash32;
use crate::game::events::{EventLog, GameEvent};
use crate::game::state::{GameState, RunStats};
use crate::proof::checkpoint::Checkpoint;

/// A closed segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// First wave this segment covers
    pub start_wave: u32,
    /// Last wave this segment covers
    pub end_wave: u32,
    /// Tick the segment opened at (the previous close, 0 for the first)
    pub start_tick: u32,
    /// Tick the segment closed at
    pub end_tick: u32,
    /// Events with ticks in `start_tick+1..=end_tick`
    pub events: Vec<GameEvent>,
    /// Checkpoints emitted in `start_tick+1..=end_tick`
    pub checkpoints: Vec<Checkpoint>,
    /// Chain hash at `end_tick`
    pub final_hash: Hash32,
}

/// Client-reported figures for a segment, as a display layer would show them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedSummary {
    /// Damage dealt in real units
    pub damage_dealt: f64,
    /// Kills
    pub kills: f64,
    /// Gold earned
    pub gold: f64,
    /// Dust earned
    pub dust: f64,
    /// Xp earned
    pub xp: f64,
    /// Waves cleared during the segment
    pub waves_cleared: f64,
}

impl ClaimedSummary {
    /// Figures accumulated between two snapshots of the run counters.
    pub fn between(before: &RunStats, after: &RunStats, waves_cleared: u32) -> Self {
        Self {
            damage_dealt: (after.damage_dealt - before.damage_dealt) as f64 / FIXED_ONE as f64,
            kills: after.kills.saturating_sub(before.kills) as f64,
            gold: after.gold.saturating_sub(before.gold) as f64,
            dust: after.dust.saturating_sub(before.dust) as f64,
            xp: after.xp.saturating_sub(before.xp) as f64,
            waves_cleared: waves_cleared as f64,
        }
    }

    /// All figures finite and non-negative.
    pub fn is_well_formed(&self) -> bool {
        self.figures().iter().all(|v| v.is_finite() && *v >= 0.0)
    }

    /// Figures in a fixed order: damage, kills, gold, dust, xp, waves.
    pub fn figures(&self) -> [f64; 6] {
        [self.damage_dealt, self.kills, self.gold, self.dust, self.xp, self.waves_cleared]
    }
}

/// What the client sends for one segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSubmission {
    /// Opaque session token, checked before verification
    pub session_token: String,
    /// The segment itself
    #[serde(flatten)]
    pub segment: Segment,
    /// Optional client-reported figures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ClaimedSummary>,
}

/// Is `state` at the natural break that closes a segment opened at `start_wave`?
///
/// The run has ended, or the segment's first wave is cleared and no relic
/// choice is waiting.
pub fn is_segment_boundary(state: &GameState, start_wave: u32) -> bool {
    state.is_ended() || (state.waves_cleared >= start_wave && state.pending_choice.is_none())
}

/// Last wave a segment opened at `start_wave` covers when closed at `state`.
pub fn segment_end_wave(state: &GameState, start_wave: u32) -> u32 {
    state.waves_cleared.max(start_wave)
}

/// A segment still accumulating.
#[derive(Clone, Debug)]
pub struct OpenSegment {
    start_wave: u32,
    start_tick: u32,
    baseline: RunStats,
    baseline_waves: u32,
    events: EventLog,
    checkpoints: Vec<Checkpoint>,
}

impl OpenSegment {
    /// Open a segment at the current state.
    pub fn open(state: &GameState) -> Self {
        Self {
            start_wave: state.waves_cleared + 1,
            start_tick: state.tick,
            baseline: state.stats,
            baseline_waves: state.waves_cleared,
            events: EventLog::new(),
            checkpoints: Vec::new(),
        }
    }

    /// First wave this segment covers.
    pub fn start_wave(&self) -> u32 {
        self.start_wave
    }

    /// Tick the segment opened at.
    pub fn start_tick(&self) -> u32 {
        self.start_tick
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[GameEvent] {
        self.events.events()
    }

    /// Checkpoints recorded so far.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Record events applied this tick. The caller has already stepped the
    /// engine with them, so they are in order.
    pub fn record_events(&mut self, events: &[GameEvent]) {
        for event in events {
            // Ticks only grow under the driver
            let _ = self.events.push(*event);
        }
    }

    /// Record an emitted checkpoint.
    pub fn record_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    /// Should this segment close at `state`?
    pub fn is_closable(&self, state: &GameState) -> bool {
        state.tick > self.start_tick && is_segment_boundary(state, self.start_wave)
    }

    /// Close at `state`, whose chain head is `final_hash`. Returns the
    /// segment and the figures the run accumulated over it.
    pub fn close(self, state: &GameState, final_hash: Hash32) -> (Segment, ClaimedSummary) {
        let summary = ClaimedSummary::between(
            &self.baseline,
            &state.stats,
            state.waves_cleared.saturating_sub(self.baseline_waves),
        );
        let segment = Segment {
            start_wave: self.start_wave,
            end_wave: segment_end_wave(state, self.start_wave),
            start_tick: self.start_tick,
            end_tick: state.tick,
            events: self.events.events().to_vec(),
            checkpoints: self.checkpoints,
            final_hash,
        };
        (segment, summary)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::SimConfig;
    use crate::game::events::Command;
    use crate::game::state::PendingChoice;

    #[test]
    fn test_boundary_predicate() {
        let mut state = GameState::new(1, &SimConfig::endless());
        // Opening choice pending, nothing cleared
        assert!(!is_segment_boundary(&state, 1));

        state.pending_choice = None;
        state.waves_cleared = 1;
        assert!(is_segment_boundary(&state, 1));
        assert!(!is_segment_boundary(&state, 2));

        state.pending_choice = Some(PendingChoice { wave: 2, options: Vec::new(), rerolls_left: 0 });
        assert!(!is_segment_boundary(&state, 1));

        state.ended = Some(crate::game::state::EndReason::TimeLimit);
        assert!(is_segment_boundary(&state, 5));
        assert_eq!(segment_end_wave(&state, 5), 5);
    }

    #[test]
    fn test_close_packages_deltas() {
        let mut state = GameState::new(1, &SimConfig::endless());
        state.stats.kills = 4;
        state.stats.gold = 10;
        let mut open = OpenSegment::open(&state);
        assert_eq!(open.start_wave(), 1);

        open.record_events(&[GameEvent::new(3, Command::RerollRelics)]);
        open.record_checkpoint(Checkpoint { tick: 30, state_hash: 1, chain_hash: 2 });

        state.tick = 40;
        state.waves_cleared = 1;
        state.stats.kills = 10;
        state.stats.gold = 25;
        state.stats.damage_dealt = 3 * FIXED_ONE as i64 / 2;

        let (segment, summary) = open.close(&state, 77);
        assert_eq!(segment.start_tick, 0);
        assert_eq!(segment.end_tick, 40);
        assert_eq!(segment.end_wave, 1);
        assert_eq!(segment.events.len(), 1);
        assert_eq!(segment.checkpoints.len(), 1);
        assert_eq!(segment.final_hash, 77);
        assert_eq!(summary.kills, 6.0);
        assert_eq!(summary.gold, 15.0);
        assert_eq!(summary.damage_dealt, 1.5);
        assert_eq!(summary.waves_cleared, 1.0);
    }

    #[test]
    fn test_summary_well_formed() {
        assert!(ClaimedSummary::default().is_well_formed());
        let bad = ClaimedSummary { kills: -1.0, ..Default::default() };
        assert!(!bad.is_well_formed());
        let nan = ClaimedSummary { damage_dealt: f64::NAN, ..Default::default() };
        assert!(!nan.is_well_formed());
    }

    #[test]
    fn test_submission_wire_shape() {
        let submission = SegmentSubmission {
            session_token: "abc".into(),
            segment: Segment {
                start_wave: 1,
                end_wave: 2,
                start_tick: 0,
                end_tick: 90,
                events: vec![GameEvent::new(5, Command::ActivateSnap)],
                checkpoints: Vec::new(),
                final_hash: 9,
            },
            summary: None,
        };
        let json = serde_json::to_value(&submission).unwrap();
        assert_eq!(json["sessionToken"], "abc");
        assert_eq!(json["startWave"], 1);
        assert_eq!(json["finalHash"], 9);
        assert_eq!(json["events"][0]["type"], "ACTIVATE_SNAP");
        assert!(json.get("summary").is_none());

        let back: SegmentSubmission = serde_json::from_value(json).unwrap();
        assert_eq!(back, submission);
    }
}
