//! Relics
//!
//! Relics are permanent run modifiers offered as a choice between waves.
//! Options are drawn from the session RNG, so a reroll or a different pick
//! changes everything downstream.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{fixed_percent, fixed_from_int, FIELD_LENGTH};
use crate::core::rng::DeterministicRng;
use crate::game::config::RelicRules;
use crate::game::state::{GameState, PendingChoice, StatusEffect, StatusKind};

/// Relic identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RelicId {
    /// +25% fortress max hp (and heal by the same amount)
    IronWalls = 0,
    /// +20% fortress damage
    SharpArrows = 1,
    /// -15% fortress attack interval
    Quickdraw = 2,
    /// +15% fortress range
    Longbow = 3,
    /// +20% hero damage
    HeroicSpirit = 4,
    /// Fortress shots slow their target
    FrostTouch = 5,
    /// Fortress shots burn their target
    EmberShot = 6,
    /// +25% gold from kills
    GoldenIdol = 7,
    /// Double snap charge per kill
    SnapCapacitor = 8,
}

impl RelicId {
    /// Every relic, in draw order.
    pub const ALL: [RelicId; 9] = [
        RelicId::IronWalls,
        RelicId::SharpArrows,
        RelicId::Quickdraw,
        RelicId::Longbow,
        RelicId::HeroicSpirit,
        RelicId::FrostTouch,
        RelicId::EmberShot,
        RelicId::GoldenIdol,
        RelicId::SnapCapacitor,
    ];
}

/// Draw `count` distinct options, preferring relics not yet owned.
///
/// Falls back to the full pool once too few unowned relics remain.
pub fn draw_options(rng: &mut DeterministicRng, owned: &[RelicId], count: u32) -> Vec<RelicId> {
    let mut pool: Vec<RelicId> = RelicId::ALL
        .iter()
        .copied()
        .filter(|r| !owned.contains(r))
        .collect();
    if pool.len() < count as usize {
        pool = RelicId::ALL.to_vec();
    }
    rng.shuffle(&mut pool);
    pool.truncate(count as usize);
    pool
}

/// Build a fresh choice for `wave`.
pub fn offer_choice(
    rng: &mut DeterministicRng,
    owned: &[RelicId],
    wave: u32,
    rules: &RelicRules,
) -> PendingChoice {
    PendingChoice {
        wave,
        options: draw_options(rng, owned, rules.options.max(1)),
        rerolls_left: rules.rerolls,
    }
}

/// Apply a picked relic to the run.
pub fn apply_relic(state: &mut GameState, relic: RelicId) {
    let fortress = &mut state.fortress;
    match relic {
        RelicId::IronWalls => {
            let bonus = fixed_percent(fortress.max_hp, 25);
            fortress.max_hp = fortress.max_hp.saturating_add(bonus);
            fortress.hp = fortress.hp.saturating_add(bonus).min(fortress.max_hp);
        }
        RelicId::SharpArrows => {
            fortress.damage = fixed_percent(fortress.damage, 120);
        }
        RelicId::Quickdraw => {
            fortress.attack_interval = (fortress.attack_interval * 85 / 100).max(5);
        }
        RelicId::Longbow => {
            fortress.range = fixed_percent(fortress.range, 115).min(FIELD_LENGTH);
        }
        RelicId::HeroicSpirit => {
            for hero in &mut state.heroes {
                hero.damage = fixed_percent(hero.damage, 120);
            }
        }
        RelicId::FrostTouch
        | RelicId::EmberShot
        | RelicId::GoldenIdol
        | RelicId::SnapCapacitor => {}
    }
    state.relics.push(relic);
}

/// Gold bonus from owned relics, in percent.
pub fn gold_bonus_pct(relics: &[RelicId]) -> i32 {
    relics.iter().filter(|r| **r == RelicId::GoldenIdol).count() as i32 * 25
}

/// Snap charge gained per kill.
pub fn snap_gain_per_kill(relics: &[RelicId]) -> u32 {
    if relics.contains(&RelicId::SnapCapacitor) {
        crate::game::state::SNAP_CHARGE_PER_KILL * 2
    } else {
        crate::game::state::SNAP_CHARGE_PER_KILL
    }
}

/// On-hit effect for fortress shots. The most recently acquired
/// elemental relic wins.
pub fn fortress_on_hit(relics: &[RelicId]) -> Option<StatusEffect> {
    relics.iter().rev().find_map(|r| match r {
        RelicId::FrostTouch => Some(StatusEffect {
            kind: StatusKind::Slow { pct: 30 },
            remaining: 45,
        }),
        RelicId::EmberShot => Some(StatusEffect {
            kind: StatusKind::Burn { per_tick: fixed_from_int(1) / 2 },
            remaining: 60,
        }),
        _ => None,
    })
}
