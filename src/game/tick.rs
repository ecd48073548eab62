//! Authoritative Simulation Tick
//!
//! The per-tick state transition. Client and server both run exactly this,
//! so it must be 100% deterministic.

use crate::core::vec2::FixedVec2;
use crate::game::combat;
use crate::game::config::SimConfig;
use crate::game::events::{Command, DropReason, GameEvent, SimNotice};
use crate::game::relic;
use crate::game::state::{EndReason, GameState};
use crate::game::wave;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// What happened this tick
    pub notices: Vec<SimNotice>,
    /// Whether the run is over after this tick
    pub ended: bool,
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `state` - The run state (will be mutated)
/// * `events` - Events for the new tick, in log order; events stamped with
///   any other tick are ignored
/// * `config` - Run configuration
///
/// # Determinism
///
/// This function is 100% deterministic:
/// - Entities are visited in ascending id order
/// - Uses fixed-point math only
/// - Uses deterministic RNG (state.rng)
/// - No system calls, no floating point, no wall clock
pub fn tick(state: &mut GameState, events: &[GameEvent], config: &SimConfig) -> TickResult {
    let mut result = TickResult::default();

    if state.is_ended() {
        result.ended = true;
        return result;
    }

    // 0. Advance tick counter
    state.tick += 1;

    // 1. Apply this tick's commands
    let now = state.tick;
    for event in events.iter().filter(|e| e.tick == now) {
        if let Err(reason) = apply_command(state, config, event.command, &mut result.notices) {
            result.notices.push(SimNotice::CommandDropped {
                tick: state.tick,
                command: event.command,
                reason,
            });
        }
    }

    // 2. A pending relic choice freezes the field
    if state.pending_choice.is_none() {
        // 3. Wave progression and spawning
        wave::update_waves(state, config, &mut result.notices);

        // 4. Movement
        combat::update_heroes(state);
        combat::update_enemies(state);

        // 5. Attacks and projectiles
        combat::fortress_attack(state);
        combat::update_projectiles(state);

        // 6. Status effects and cooldowns
        combat::tick_status(state);

        // 7. Deaths and rewards
        combat::cleanup_dead(state, config, &mut result.notices);

        // 8. Terminal conditions and wave clears
        if !state.fortress.is_alive() {
            end_run(state, EndReason::FortressDestroyed, &mut result.notices);
        } else {
            wave::check_wave_clear(state, config, &mut result.notices);
        }
    }

    if let Some(max_ticks) = config.limits.max_ticks {
        if !state.is_ended() && state.tick >= max_ticks {
            end_run(state, EndReason::TimeLimit, &mut result.notices);
        }
    }

    result.ended = state.is_ended();
    result
}

fn end_run(state: &mut GameState, reason: EndReason, notices: &mut Vec<SimNotice>) {
    state.ended = Some(reason);
    state.pending_choice = None;
    notices.push(SimNotice::RunEnded { reason });
}

/// Validate and apply one command. Invalid commands are dropped, never
/// errors: a client gains nothing by sending them.
fn apply_command(
    state: &mut GameState,
    config: &SimConfig,
    command: Command,
    notices: &mut Vec<SimNotice>,
) -> Result<(), DropReason> {
    match command {
        Command::ChooseRelic { wave, option_index } => {
            let choice = state.pending_choice.as_ref().ok_or(DropReason::NoPendingChoice)?;
            if choice.wave != wave {
                return Err(DropReason::WrongWave);
            }
            let relic = *choice
                .options
                .get(option_index as usize)
                .ok_or(DropReason::OptionOutOfRange)?;
            state.pending_choice = None;
            relic::apply_relic(state, relic);
            notices.push(SimNotice::RelicChosen { wave, relic });
        }

        Command::RerollRelics => {
            let owned = state.relics.clone();
            let choice = state.pending_choice.as_mut().ok_or(DropReason::NoPendingChoice)?;
            if choice.rerolls_left == 0 {
                return Err(DropReason::NoRerollsLeft);
            }
            choice.rerolls_left -= 1;
            choice.options = relic::draw_options(&mut state.rng, &owned, config.relics.options.max(1));
            notices.push(SimNotice::RelicsRerolled { wave: choice.wave });
        }

        Command::ActivateSnap => {
            require_running(state)?;
            let killed = combat::activate_snap(state)?;
            notices.push(SimNotice::SnapActivated { killed });
        }

        Command::HeroCommand { hero_id, target_x, target_y } => {
            require_running(state)?;
            let hero = state.hero_mut(hero_id).ok_or(DropReason::UnknownHero)?;
            if !hero.is_commandable() {
                return Err(DropReason::HeroNotCommandable);
            }
            hero.command_target = Some(FixedVec2::new(target_x, target_y).clamp_to_field());
        }

        Command::ActivateSkill { skill_id, target_x, target_y } => {
            require_running(state)?;
            combat::cast_skill(state, skill_id, FixedVec2::new(target_x, target_y))?;
            notices.push(SimNotice::SkillCast { skill: skill_id });
        }
    }
    Ok(())
}

fn require_running(state: &GameState) -> Result<(), DropReason> {
    if state.pending_choice.is_some() {
        Err(DropReason::ChoicePending)
    } else {
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
