//! Wave Progression
//!
//! Builds wave compositions from the configured wave source, spawns enemies
//! from the queue and detects wave clears. Compositions and spawn lanes come
//! from the session RNG; stats are scaled by wave number and tier.

use crate::core::fixed::{
    Fixed, FIXED_ONE, FIELD_LENGTH, FIELD_HALF_HEIGHT, fixed_percent,
};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::config::{SimConfig, WaveSource};
use crate::game::events::SimNotice;
use crate::game::relic;
use crate::game::state::{Enemy, EnemyKind, EndReason, EnemyTemplate, GameState};

/// Intermission used by boss tables, in ticks.
pub const BOSS_INTERMISSION_TICKS: u32 = 90;

/// Per-wave growth for boss-rush escorts, percent.
const ESCORT_GROWTH_PCT: i32 = 10;

/// Pause before each wave.
pub fn intermission_ticks(config: &SimConfig) -> u32 {
    match &config.waves {
        WaveSource::Scaling(table) => table.intermission_ticks,
        WaveSource::Bosses(_) => BOSS_INTERMISSION_TICKS,
    }
}

/// Ticks between spawns.
fn spawn_interval(config: &SimConfig) -> u32 {
    match &config.waves {
        WaveSource::Scaling(table) => table.spawn_interval,
        WaveSource::Bosses(_) => 20,
    }
}

/// Composition of wave `wave` (1-based), in spawn order.
pub fn build_wave(rng: &mut DeterministicRng, config: &SimConfig, wave: u32) -> Vec<EnemyKind> {
    match &config.waves {
        WaveSource::Scaling(table) => {
            let count = table
                .base_count
                .saturating_add(table.count_per_wave.saturating_mul(wave.saturating_sub(1)))
                .min(table.max_count);

            let runner_weight = if wave >= table.runner_from_wave { 3 } else { 0 };
            let brute_weight = if wave >= table.brute_from_wave { 1 + wave / 5 } else { 0 };
            let weights = [6, runner_weight, brute_weight];
            let kinds = [EnemyKind::Grunt, EnemyKind::Runner, EnemyKind::Brute];

            let mut queue: Vec<EnemyKind> = (0..count)
                .map(|_| kinds[rng.weighted_index(&weights)])
                .collect();
            if table.boss_every > 0 && wave % table.boss_every == 0 {
                queue.push(EnemyKind::Boss);
            }
            queue
        }
        WaveSource::Bosses(bosses) => match bosses.get(wave.saturating_sub(1) as usize) {
            Some(boss) => {
                let mut queue = vec![EnemyKind::Grunt; boss.escorts as usize];
                queue.push(EnemyKind::Boss);
                queue
            }
            None => Vec::new(),
        },
    }
}

/// Stats for `kind` on `wave` after growth and tier scaling.
pub fn scaled_template(kind: EnemyKind, wave: u32, config: &SimConfig) -> EnemyTemplate {
    let mut template = kind.template();
    let steps = wave.saturating_sub(1).min(1000) as i32;

    let (hp_growth, damage_growth) = match &config.waves {
        WaveSource::Scaling(table) => (table.hp_growth_pct, table.damage_growth_pct),
        WaveSource::Bosses(bosses) => {
            if kind == EnemyKind::Boss {
                if let Some(boss) = bosses.get(steps as usize) {
                    template.hp = boss.hp;
                    template.damage = boss.damage;
                    template.armor = boss.armor;
                    template.speed = boss.speed;
                }
                (0, 0)
            } else {
                (ESCORT_GROWTH_PCT, ESCORT_GROWTH_PCT / 2)
            }
        }
    };

    template.hp = fixed_percent(template.hp, 100 + hp_growth * steps);
    template.hp = fixed_percent(template.hp, config.tier.enemy_hp_pct).max(1);
    template.damage = fixed_percent(template.damage, 100 + damage_growth * steps);
    template.damage = fixed_percent(template.damage, config.tier.enemy_damage_pct);
    template
}

/// Spawn one enemy at the far edge of the field.
pub fn spawn_enemy(state: &mut GameState, config: &SimConfig, kind: EnemyKind) -> u32 {
    let template = scaled_template(kind, state.wave, config);
    let lane: Fixed = if kind == EnemyKind::Boss {
        0
    } else {
        let edge = FIELD_HALF_HEIGHT - FIXED_ONE;
        state.rng.next_fixed_range(-edge, edge)
    };

    let id = state.alloc_id();
    state.enemies.push(Enemy {
        id,
        kind,
        position: FixedVec2::new(FIELD_LENGTH, lane),
        hp: template.hp,
        max_hp: template.hp,
        damage: template.damage,
        armor: template.armor,
        speed: template.speed,
        range: template.range,
        attack_interval: template.attack_interval,
        cooldown: template.attack_interval,
        gold: template.gold,
        xp: template.xp,
        effects: Vec::new(),
    });
    id
}

/// Start the next wave when the intermission runs out, then spawn from the
/// queue.
pub fn update_waves(state: &mut GameState, config: &SimConfig, notices: &mut Vec<SimNotice>) {
    if !state.wave_active {
        state.intermission = state.intermission.saturating_sub(1);
        if state.intermission > 0 {
            return;
        }
        state.wave += 1;
        state.wave_active = true;
        state.spawn_queue = build_wave(&mut state.rng, config, state.wave);
        state.spawn_cooldown = 0;
        notices.push(SimNotice::WaveStarted { wave: state.wave });
    }

    if state.spawn_queue.is_empty() {
        return;
    }
    if state.spawn_cooldown > 0 {
        state.spawn_cooldown -= 1;
        return;
    }
    let kind = state.spawn_queue.remove(0);
    spawn_enemy(state, config, kind);
    state.spawn_cooldown = spawn_interval(config);
}

/// Detect a cleared wave: pay wave rewards, check wave-based terminal
/// conditions and open the next relic choice.
pub fn check_wave_clear(state: &mut GameState, config: &SimConfig, notices: &mut Vec<SimNotice>) {
    if !state.wave_active || !state.spawn_queue.is_empty() || !state.enemies.is_empty() {
        return;
    }

    state.wave_active = false;
    state.waves_cleared += 1;
    let reward_pct = config.tier.reward_pct;
    let dust = fixed_percent(FIXED_ONE * (1 + state.wave as i32 / 5), reward_pct) / FIXED_ONE;
    state.stats.dust = state.stats.dust.saturating_add(dust.max(0) as u64);
    state.stats.gold = state.stats.gold.saturating_add(5 * state.wave as u64);
    notices.push(SimNotice::WaveCleared { wave: state.wave });

    let reason = match &config.waves {
        WaveSource::Bosses(bosses) if state.waves_cleared as usize >= bosses.len() => {
            Some(EndReason::BossesDefeated)
        }
        _ => match config.limits.max_waves {
            Some(max) if state.waves_cleared >= max => Some(EndReason::WaveLimitReached),
            _ => None,
        },
    };
    if let Some(reason) = reason {
        state.ended = Some(reason);
        notices.push(SimNotice::RunEnded { reason });
        return;
    }

    let rules = &config.relics;
    if rules.choice_every > 0 && state.waves_cleared % rules.choice_every == 0 {
        let next = state.waves_cleared + 1;
        let choice = relic::offer_choice(&mut state.rng, &state.relics, next, rules);
        state.pending_choice = Some(choice);
        notices.push(SimNotice::ChoiceOffered { wave: next });
    }
    state.intermission = intermission_ticks(config);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::fixed_from_int;
    use crate::game::config::BossStats;

    #[test]
    fn test_wave_sizes_grow() {
        let config = SimConfig::endless();
        let mut rng = DeterministicRng::new(1);
        assert_eq!(build_wave(&mut rng, &config, 1).len(), 6);
        assert_eq!(build_wave(&mut rng, &config, 4).len(), 12);
        // Wave 10 closes with a boss
        let ten = build_wave(&mut rng, &config, 10);
        assert_eq!(ten.last(), Some(&EnemyKind::Boss));
    }

    #[test]
    fn test_early_waves_are_grunts() {
        let config = SimConfig::endless();
        let mut rng = DeterministicRng::new(77);
        let wave = build_wave(&mut rng, &config, 1);
        assert!(wave.iter().all(|k| *k == EnemyKind::Grunt));
    }

    #[test]
    fn test_boss_table_waves() {
        let config = SimConfig::boss_rush(vec![BossStats::standard(0), BossStats::standard(1)]);
        let mut rng = DeterministicRng::new(1);
        let wave = build_wave(&mut rng, &config, 2);
        assert_eq!(wave.len(), 4);
        assert_eq!(wave.last(), Some(&EnemyKind::Boss));
        assert!(build_wave(&mut rng, &config, 3).is_empty());

        let boss = scaled_template(EnemyKind::Boss, 2, &config);
        assert_eq!(boss.hp, fixed_from_int(450));
    }

    #[test]
    fn test_tier_scaling() {
        let base = scaled_template(EnemyKind::Grunt, 1, &SimConfig::endless());
        let tiered = scaled_template(EnemyKind::Grunt, 1, &SimConfig::pillar_challenge(2));
        assert_eq!(tiered.hp, fixed_percent(base.hp, 150));
        assert_eq!(tiered.damage, fixed_percent(base.damage, 130));
    }

    #[test]
    fn test_wave_starts_after_intermission() {
        let mut config = SimConfig::endless();
        config.relics.opening_choice = false;
        let mut state = GameState::new(5, &config);
        let mut notices = Vec::new();

        for _ in 0..89 {
            update_waves(&mut state, &config, &mut notices);
        }
        assert_eq!(state.wave, 0);
        update_waves(&mut state, &config, &mut notices);
        assert_eq!(state.wave, 1);
        assert_eq!(state.enemies.len(), 1);
        assert_eq!(notices, vec![SimNotice::WaveStarted { wave: 1 }]);
    }

    #[test]
    fn test_wave_clear_offers_choice() {
        let mut config = SimConfig::endless();
        config.relics.choice_every = 1;
        let mut state = GameState::new(5, &config);
        state.pending_choice = None;
        state.wave = 1;
        state.wave_active = true;
        let mut notices = Vec::new();

        check_wave_clear(&mut state, &config, &mut notices);
        assert_eq!(state.waves_cleared, 1);
        assert_eq!(state.pending_choice.as_ref().map(|c| c.wave), Some(2));
        assert_eq!(state.stats.dust, 1);
        assert_eq!(state.stats.gold, 5);
    }

    #[test]
    fn test_wave_limit_ends_run() {
        let mut config = SimConfig::pillar_challenge(0);
        config.limits.max_waves = Some(1);
        let mut state = GameState::new(5, &config);
        state.pending_choice = None;
        state.wave = 1;
        state.wave_active = true;
        let mut notices = Vec::new();

        check_wave_clear(&mut state, &config, &mut notices);
        assert_eq!(state.ended, Some(EndReason::WaveLimitReached));
        assert!(state.pending_choice.is_none());
    }

    #[test]
    fn test_last_boss_cleared_ends_run() {
        let config = SimConfig::boss_rush(vec![BossStats::standard(0), BossStats::standard(1)]);
        let mut state = GameState::new(5, &config);
        state.pending_choice = None;
        let mut notices = Vec::new();

        state.wave = 1;
        state.wave_active = true;
        check_wave_clear(&mut state, &config, &mut notices);
        assert_eq!(state.ended, None);
        assert_eq!(state.pending_choice.as_ref().map(|c| c.wave), Some(2));

        state.pending_choice = None;
        state.wave = 2;
        state.wave_active = true;
        check_wave_clear(&mut state, &config, &mut notices);
        // Also at the wave limit, but the boss table decides the reason
        assert_eq!(state.ended, Some(EndReason::BossesDefeated));
        assert_eq!(notices.last(), Some(&SimNotice::RunEnded { reason: EndReason::BossesDefeated }));
        assert!(state.pending_choice.is_none());
    }
}
