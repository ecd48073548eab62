//! Game Events
//!
//! Player commands stamped with the tick they apply at, the driver-owned
//! event log, and the notices the simulation reports back.

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::game::config::SkillId;
use crate::game::engine::EngineError;
use crate::game::relic::RelicId;
use crate::game::state::EndReason;

/// A player command. Closed set; the engine matches it exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Pick option `option_index` of the pending choice for `wave`
    #[serde(rename_all = "camelCase")]
    ChooseRelic {
        wave: u32,
        option_index: u32,
    },

    /// Redraw the pending choice's options
    RerollRelics,

    /// Spend a full snap charge
    ActivateSnap,

    /// Order a hero to hold a new position (raw Q16.16 coordinates)
    #[serde(rename_all = "camelCase")]
    HeroCommand {
        hero_id: u32,
        target_x: Fixed,
        target_y: Fixed,
    },

    /// Cast a loadout skill at a point (raw Q16.16 coordinates)
    #[serde(rename_all = "camelCase")]
    ActivateSkill {
        skill_id: SkillId,
        target_x: Fixed,
        target_y: Fixed,
    },
}

/// A command stamped with the tick it must be applied at.
///
/// Wire form: `{"tick":150,"type":"CHOOSE_RELIC","wave":1,"optionIndex":0}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick at which the command applies
    pub tick: u32,
    /// The command
    #[serde(flatten)]
    pub command: Command,
}

impl GameEvent {
    /// Stamp a command.
    pub const fn new(tick: u32, command: Command) -> Self {
        Self { tick, command }
    }
}

/// Ordered, append-only list of events.
///
/// Owned by the session driver; the engine only reads slices of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<GameEvent>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from recorded events, checking tick order.
    pub fn from_events(events: Vec<GameEvent>) -> Result<Self, EngineError> {
        let mut log = Self::new();
        for event in events {
            log.push(event)?;
        }
        Ok(log)
    }

    /// Append an event. Ticks must be non-decreasing.
    pub fn push(&mut self, event: GameEvent) -> Result<(), EngineError> {
        if let Some(last) = self.events.last() {
            if event.tick < last.tick {
                return Err(EngineError::EventOutOfOrder {
                    tick: event.tick,
                    last: last.tick,
                });
            }
        }
        self.events.push(event);
        Ok(())
    }

    /// Events scheduled for exactly `tick`, in log order.
    pub fn events_at(&self, tick: u32) -> &[GameEvent] {
        let start = self.events.partition_point(|e| e.tick < tick);
        let end = self.events.partition_point(|e| e.tick <= tick);
        &self.events[start..end]
    }

    /// All events.
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Is the log empty?
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tick of the last event.
    pub fn last_tick(&self) -> Option<u32> {
        self.events.last().map(|e| e.tick)
    }

    /// Take the events, leaving the log empty.
    pub fn take(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Why a command was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// No relic choice is open
    NoPendingChoice,
    /// The choice is for a different wave
    WrongWave,
    /// Option index past the offered options
    OptionOutOfRange,
    /// No rerolls remain
    NoRerollsLeft,
    /// A relic choice blocks this command
    ChoicePending,
    /// Snap charge is not full
    SnapNotCharged,
    /// No hero with that id
    UnknownHero,
    /// Hero is dead or stunned
    HeroNotCommandable,
    /// Skill not in the loadout
    SkillNotEquipped,
    /// Skill still cooling down
    SkillOnCooldown,
}

/// Something the simulation reports about a tick. Never affects state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimNotice {
    /// A command failed validation and was dropped
    CommandDropped {
        tick: u32,
        command: Command,
        reason: DropReason,
    },
    /// A relic was picked
    RelicChosen { wave: u32, relic: RelicId },
    /// A choice was rerolled
    RelicsRerolled { wave: u32 },
    /// A relic choice opened
    ChoiceOffered { wave: u32 },
    /// The snap fired
    SnapActivated { killed: u32 },
    /// A skill was cast
    SkillCast { skill: SkillId },
    /// A wave began spawning
    WaveStarted { wave: u32 },
    /// A wave was cleared
    WaveCleared { wave: u32 },
    /// A hero fell
    HeroFell { hero_id: u32 },
    /// The run ended
    RunEnded { reason: EndReason },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = GameEvent::new(150, Command::ChooseRelic { wave: 1, option_index: 0 });
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tick": 150, "type": "CHOOSE_RELIC", "wave": 1, "optionIndex": 0})
        );

        let back: GameEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_unit_and_skill_commands_parse() {
        let reroll: GameEvent =
            serde_json::from_str(r#"{"tick":3,"type":"REROLL_RELICS"}"#).unwrap();
        assert_eq!(reroll.command, Command::RerollRelics);

        let skill: GameEvent = serde_json::from_str(
            r#"{"tick":9,"type":"ACTIVATE_SKILL","skillId":"FROST_NOVA","targetX":65536,"targetY":0}"#,
        )
        .unwrap();
        assert_eq!(
            skill.command,
            Command::ActivateSkill { skill_id: SkillId::FrostNova, target_x: 65536, target_y: 0 }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        let result: Result<GameEvent, _> =
            serde_json::from_str(r#"{"tick":3,"type":"GIVE_GOLD","amount":9999}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_enforces_order() {
        let mut log = EventLog::new();
        log.push(GameEvent::new(5, Command::ActivateSnap)).unwrap();
        log.push(GameEvent::new(5, Command::RerollRelics)).unwrap();
        log.push(GameEvent::new(9, Command::ActivateSnap)).unwrap();

        let err = log.push(GameEvent::new(8, Command::ActivateSnap)).unwrap_err();
        assert!(matches!(err, EngineError::EventOutOfOrder { tick: 8, last: 9 }));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_events_at() {
        let log = EventLog::from_events(vec![
            GameEvent::new(2, Command::ActivateSnap),
            GameEvent::new(4, Command::ActivateSnap),
            GameEvent::new(4, Command::RerollRelics),
            GameEvent::new(7, Command::ActivateSnap),
        ])
        .unwrap();

        assert_eq!(log.events_at(4).len(), 2);
        assert_eq!(log.events_at(4)[1].command, Command::RerollRelics);
        assert!(log.events_at(3).is_empty());
        assert!(log.events_at(100).is_empty());
        assert_eq!(log.last_tick(), Some(7));
    }
}
