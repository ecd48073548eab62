//! Combat Resolution
//!
//! Movement, targeting and damage for every entity, plus the two player
//! powers (skills and the snap). Fixed-point only; entities are always
//! visited in ascending id order and ties go to the lowest id.

use crate::core::fixed::{Fixed, FIXED_ONE, fixed_from_int, fixed_max, fixed_percent};
use crate::core::vec2::FixedVec2;
use crate::core::fixed::FORTRESS_RADIUS;
use crate::game::config::{HeroKind, SimConfig, SkillId};
use crate::game::events::{DropReason, SimNotice};
use crate::game::relic;
use crate::game::state::{
    add_effect, decay_effects, is_stunned, slow_pct,
    Attacker, EnemyKind, Enemy, GameState, Projectile, StatusEffect, StatusKind,
    HERO_BLOCK_RADIUS, HERO_RESPAWN_TICKS, SNAP_CHARGE_MAX,
};

/// Hits never deal less than this share of their raw damage, in percent.
pub const MIN_DAMAGE_PCT: i32 = 25;

/// A projectile within this distance of its target hits.
pub const PROJECTILE_HIT_RADIUS: Fixed = 16384; // 0.25

/// Hero projectile speed per tick.
pub const HERO_PROJECTILE_SPEED: Fixed = 32768; // 0.5

/// How far a warrior leaves its post to engage.
pub const WARRIOR_LEASH: Fixed = 3 * FIXED_ONE;

/// Damage after flat armor, never below `MIN_DAMAGE_PCT` of the raw hit.
#[inline]
pub fn mitigate(damage: Fixed, armor: Fixed) -> Fixed {
    if damage <= 0 {
        return 0;
    }
    fixed_max(damage.saturating_sub(armor), fixed_percent(damage, MIN_DAMAGE_PCT))
}

/// Movement after slows.
#[inline]
fn effective_speed(speed: Fixed, effects: &[StatusEffect]) -> Fixed {
    fixed_percent(speed, 100 - slow_pct(effects))
}

/// Index of the living enemy nearest to `from` within `range`.
pub fn nearest_enemy(enemies: &[Enemy], from: FixedVec2, range: Fixed) -> Option<usize> {
    let limit = range.max(0);
    let mut best: Option<(usize, Fixed)> = None;
    for (i, enemy) in enemies.iter().enumerate() {
        if !enemy.is_alive() || !from.within(enemy.position, limit) {
            continue;
        }
        let d = from.distance_squared(enemy.position);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Damage the enemy at `idx`. Returns the hp actually removed.
pub fn damage_enemy(state: &mut GameState, idx: usize, amount: Fixed) -> Fixed {
    let Some(enemy) = state.enemies.get_mut(idx) else {
        return 0;
    };
    if !enemy.is_alive() {
        return 0;
    }
    let dealt = mitigate(amount, enemy.armor).min(enemy.hp);
    enemy.hp -= dealt;
    state.stats.damage_dealt += dealt as i64;
    dealt
}

/// Damage every living enemy within `radius` of `center`, optionally
/// applying an effect to each one hit.
pub fn damage_area(
    state: &mut GameState,
    center: FixedVec2,
    radius: Fixed,
    amount: Fixed,
    effect: Option<StatusEffect>,
) -> u32 {
    let mut hit = 0;
    for idx in 0..state.enemies.len() {
        let enemy = &state.enemies[idx];
        if !enemy.is_alive() || !center.within(enemy.position, radius) {
            continue;
        }
        damage_enemy(state, idx, amount);
        if let Some(effect) = effect {
            add_effect(&mut state.enemies[idx].effects, effect);
        }
        hit += 1;
    }
    hit
}

// =============================================================================
// HEROES
// =============================================================================

/// Hero respawns, movement and attacks.
pub fn update_heroes(state: &mut GameState) {
    for h in 0..state.heroes.len() {
        let hero = &mut state.heroes[h];
        if hero.respawn_in > 0 {
            hero.respawn_in -= 1;
            if hero.respawn_in == 0 {
                hero.hp = hero.max_hp;
                hero.position = hero.anchor();
                hero.cooldown = 0;
                hero.effects.clear();
            }
            continue;
        }
        if !hero.is_alive() || is_stunned(&hero.effects) {
            continue;
        }

        let anchor = hero.anchor();
        let position = hero.position;
        let step = effective_speed(hero.speed, &hero.effects);
        let ready = hero.cooldown == 0;
        let (kind, range, id, damage, splash, interval) = (
            hero.kind,
            hero.range,
            hero.id,
            hero.effective_damage(),
            hero.splash,
            hero.attack_interval,
        );

        match kind {
            HeroKind::Warrior => {
                match nearest_enemy(&state.enemies, anchor, WARRIOR_LEASH.saturating_add(range)) {
                    Some(idx) => {
                        let target = state.enemies[idx].position;
                        if position.within(target, range) {
                            if ready {
                                damage_enemy(state, idx, damage);
                                state.heroes[h].cooldown = interval;
                            }
                        } else {
                            state.heroes[h].position = position.move_towards(target, step);
                        }
                    }
                    None => {
                        state.heroes[h].position = position.move_towards(anchor, step);
                    }
                }
            }
            HeroKind::Archer | HeroKind::Mage => {
                let moved = position.move_towards(anchor, step);
                state.heroes[h].position = moved;
                if !ready {
                    continue;
                }
                if let Some(idx) = nearest_enemy(&state.enemies, moved, range) {
                    let target = state.enemies[idx].id;
                    let pid = state.alloc_id();
                    state.projectiles.push(Projectile {
                        id: pid,
                        owner: Attacker::Hero(id),
                        target,
                        position: moved,
                        speed: HERO_PROJECTILE_SPEED,
                        damage,
                        splash,
                        on_hit: None,
                    });
                    state.heroes[h].cooldown = interval;
                }
            }
        }
    }
}

// =============================================================================
// ENEMIES
// =============================================================================

/// Enemy movement, blocking and attacks on heroes and the fortress.
pub fn update_enemies(state: &mut GameState) {
    let fortress_pos = state.fortress.position;
    for e in 0..state.enemies.len() {
        let enemy = &state.enemies[e];
        if !enemy.is_alive() || is_stunned(&enemy.effects) {
            continue;
        }
        let position = enemy.position;
        let reach = enemy.range;
        let ready = enemy.cooldown == 0;
        let damage = enemy.damage;
        let interval = enemy.attack_interval;
        let step = effective_speed(enemy.speed, &enemy.effects);

        let blocker = state
            .heroes
            .iter()
            .position(|h| h.is_alive() && h.position.within(position, HERO_BLOCK_RADIUS.max(reach)));

        if let Some(h) = blocker {
            if ready {
                let hero = &mut state.heroes[h];
                hero.hp = hero.hp.saturating_sub(damage);
                state.enemies[e].cooldown = interval;
            }
            continue;
        }

        if position.within(fortress_pos, FORTRESS_RADIUS.saturating_add(reach)) {
            if ready {
                let fortress = &mut state.fortress;
                fortress.hp = fortress.hp.saturating_sub(mitigate(damage, fortress.armor));
                state.enemies[e].cooldown = interval;
            }
            continue;
        }

        state.enemies[e].position = position.move_towards(fortress_pos, step);
    }
}

// =============================================================================
// FORTRESS & PROJECTILES
// =============================================================================

/// Fortress picks the nearest enemy in range and fires.
pub fn fortress_attack(state: &mut GameState) {
    let fortress = &state.fortress;
    if fortress.cooldown > 0 || !fortress.is_alive() {
        return;
    }
    let Some(idx) = nearest_enemy(&state.enemies, fortress.position, fortress.range) else {
        return;
    };

    let projectile = Projectile {
        id: 0,
        owner: Attacker::Fortress,
        target: state.enemies[idx].id,
        position: fortress.position,
        speed: fortress.projectile_speed,
        damage: fortress.damage,
        splash: 0,
        on_hit: relic::fortress_on_hit(&state.relics),
    };
    let id = state.alloc_id();
    state.projectiles.push(Projectile { id, ..projectile });
    state.fortress.cooldown = state.fortress.attack_interval;
}

/// Move projectiles toward their targets and resolve impacts. Projectiles
/// whose target is gone fizzle.
pub fn update_projectiles(state: &mut GameState) {
    let projectiles = std::mem::take(&mut state.projectiles);
    let mut in_flight = Vec::with_capacity(projectiles.len());

    for mut projectile in projectiles {
        let Some(idx) = state
            .enemies
            .iter()
            .position(|e| e.id == projectile.target && e.is_alive())
        else {
            continue;
        };
        let target = state.enemies[idx].position;
        projectile.position = projectile.position.move_towards(target, projectile.speed);
        if !projectile.position.within(target, PROJECTILE_HIT_RADIUS) {
            in_flight.push(projectile);
            continue;
        }

        if projectile.splash > 0 {
            damage_area(state, target, projectile.splash, projectile.damage, projectile.on_hit);
        } else {
            damage_enemy(state, idx, projectile.damage);
            if let Some(effect) = projectile.on_hit {
                add_effect(&mut state.enemies[idx].effects, effect);
            }
        }
    }

    state.projectiles = in_flight;
}

// =============================================================================
// STATUS EFFECTS & COOLDOWNS
// =============================================================================

/// Apply burns, decay effect timers and count down every cooldown.
pub fn tick_status(state: &mut GameState) {
    for idx in 0..state.enemies.len() {
        let burn: Fixed = state.enemies[idx]
            .effects
            .iter()
            .filter_map(|e| match e.kind {
                StatusKind::Burn { per_tick } => Some(per_tick),
                _ => None,
            })
            .fold(0, |acc: Fixed, b| acc.saturating_add(b));
        if burn > 0 && state.enemies[idx].is_alive() {
            // Burns ignore armor
            let enemy = &mut state.enemies[idx];
            let dealt = burn.min(enemy.hp);
            enemy.hp -= dealt;
            state.stats.damage_dealt += dealt as i64;
        }
        let enemy = &mut state.enemies[idx];
        decay_effects(&mut enemy.effects);
        enemy.cooldown = enemy.cooldown.saturating_sub(1);
    }

    for hero in &mut state.heroes {
        decay_effects(&mut hero.effects);
        hero.cooldown = hero.cooldown.saturating_sub(1);
    }

    let fortress = &mut state.fortress;
    fortress.cooldown = fortress.cooldown.saturating_sub(1);
    for slot in &mut fortress.skills {
        slot.cooldown = slot.cooldown.saturating_sub(1);
    }
}

// =============================================================================
// DEATHS & REWARDS
// =============================================================================

/// Remove dead enemies and pay their rewards; send fallen heroes to the
/// respawn timer.
pub fn cleanup_dead(state: &mut GameState, config: &SimConfig, notices: &mut Vec<SimNotice>) {
    let gold_pct = (config.tier.reward_pct + relic::gold_bonus_pct(&state.relics)).max(0) as u64;
    let charge = relic::snap_gain_per_kill(&state.relics);

    for enemy in state.enemies.iter().filter(|e| !e.is_alive()) {
        state.stats.kills += 1;
        state.stats.gold = state.stats.gold.saturating_add(enemy.gold as u64 * gold_pct / 100);
        state.stats.xp = state.stats.xp.saturating_add(enemy.xp as u64);
        if enemy.kind == EnemyKind::Boss {
            state.stats.dust = state.stats.dust.saturating_add(5);
        }
        state.fortress.snap_charge = (state.fortress.snap_charge + charge).min(SNAP_CHARGE_MAX);
    }
    state.enemies.retain(|e| e.is_alive());

    for hero in &mut state.heroes {
        if hero.respawn_in == 0 && hero.hp <= 0 {
            hero.hp = 0;
            hero.respawn_in = HERO_RESPAWN_TICKS;
            hero.effects.clear();
            notices.push(SimNotice::HeroFell { hero_id: hero.id });
        }
    }
}

// =============================================================================
// PLAYER POWERS
// =============================================================================

/// Cast a loadout skill at `target`.
pub fn cast_skill(state: &mut GameState, skill: SkillId, target: FixedVec2) -> Result<(), DropReason> {
    let slot = state
        .fortress
        .skills
        .iter_mut()
        .find(|s| s.skill == skill)
        .ok_or(DropReason::SkillNotEquipped)?;
    if slot.cooldown > 0 {
        return Err(DropReason::SkillOnCooldown);
    }
    slot.cooldown = skill.cooldown_ticks();

    let target = target.clamp_to_field();
    match skill {
        SkillId::Meteor => {
            damage_area(state, target, 163840, fixed_from_int(40), None); // r = 2.5
        }
        SkillId::FrostNova => {
            let slow = StatusEffect { kind: StatusKind::Slow { pct: 50 }, remaining: 90 };
            damage_area(state, target, fixed_from_int(3), fixed_from_int(10), Some(slow));
        }
        SkillId::Rally => {
            let buff = StatusEffect { kind: StatusKind::Empowered { pct: 30 }, remaining: 150 };
            for hero in state.heroes.iter_mut().filter(|h| h.is_alive()) {
                add_effect(&mut hero.effects, buff);
            }
            let fortress = &mut state.fortress;
            let heal = fixed_percent(fortress.max_hp, 10);
            fortress.hp = fortress.hp.saturating_add(heal).min(fortress.max_hp);
        }
    }
    Ok(())
}

/// Spend a full snap charge: half of the living regular enemies (rounded
/// down, picked by RNG shuffle) die outright; bosses lose a quarter of their
/// max hp instead. Returns the number killed.
pub fn activate_snap(state: &mut GameState) -> Result<u32, DropReason> {
    if state.fortress.snap_charge < SNAP_CHARGE_MAX {
        return Err(DropReason::SnapNotCharged);
    }
    state.fortress.snap_charge = 0;

    let mut regulars: Vec<usize> = state
        .enemies
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_alive() && e.kind != EnemyKind::Boss)
        .map(|(i, _)| i)
        .collect();
    state.rng.shuffle(&mut regulars);
    let victims = regulars.len() / 2;

    for &idx in &regulars[..victims] {
        let enemy = &mut state.enemies[idx];
        let dealt = enemy.hp;
        enemy.hp = 0;
        state.stats.damage_dealt += dealt as i64;
    }

    for enemy in state.enemies.iter_mut().filter(|e| e.is_alive() && e.kind == EnemyKind::Boss) {
        let dealt = (enemy.max_hp / 4).min(enemy.hp);
        enemy.hp -= dealt;
        state.stats.damage_dealt += dealt as i64;
    }

    Ok(victims as u32)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::wave::spawn_enemy;

    fn running_state() -> (GameState, SimConfig) {
        let config = SimConfig::endless();
        let mut state = GameState::new(11, &config);
        state.pending_choice = None;
        state.wave = 1;
        (state, config)
    }

    #[test]
    fn test_mitigate() {
        assert_eq!(mitigate(fixed_from_int(10), fixed_from_int(2)), fixed_from_int(8));
        // Floor at a quarter of the raw hit
        assert_eq!(mitigate(fixed_from_int(4), fixed_from_int(10)), fixed_from_int(1));
        assert_eq!(mitigate(0, 0), 0);
    }

    #[test]
    fn test_nearest_enemy_ties_go_to_lowest_id() {
        let (mut state, config) = running_state();
        let a = spawn_enemy(&mut state, &config, EnemyKind::Grunt);
        let b = spawn_enemy(&mut state, &config, EnemyKind::Grunt);
        state.enemies[0].position = FixedVec2::from_ints(5, 1);
        state.enemies[1].position = FixedVec2::from_ints(5, -1);

        let idx = nearest_enemy(&state.enemies, FixedVec2::from_ints(5, 0), fixed_from_int(3));
        assert_eq!(idx.map(|i| state.enemies[i].id), Some(a));
        assert!(a < b);
        assert!(nearest_enemy(&state.enemies, FixedVec2::ZERO, FIXED_ONE).is_none());
    }

    #[test]
    fn test_damage_is_tallied() {
        let (mut state, config) = running_state();
        spawn_enemy(&mut state, &config, EnemyKind::Grunt);
        let hp = state.enemies[0].hp;
        let dealt = damage_enemy(&mut state, 0, fixed_from_int(1000));
        assert_eq!(dealt, hp);
        assert_eq!(state.stats.damage_dealt, hp as i64);
        assert_eq!(damage_enemy(&mut state, 0, fixed_from_int(5)), 0);
    }

    #[test]
    fn test_cleanup_pays_rewards() {
        let (mut state, config) = running_state();
        spawn_enemy(&mut state, &config, EnemyKind::Runner);
        state.enemies[0].hp = 0;
        let mut notices = Vec::new();
        cleanup_dead(&mut state, &config, &mut notices);
        assert!(state.enemies.is_empty());
        assert_eq!(state.stats.kills, 1);
        assert_eq!(state.stats.gold, 3);
        assert_eq!(state.fortress.snap_charge, 2);
    }

    #[test]
    fn test_enemy_walks_then_attacks_fortress() {
        let (mut state, config) = running_state();
        state.heroes.clear();
        spawn_enemy(&mut state, &config, EnemyKind::Grunt);
        state.enemies[0].position = FixedVec2::from_ints(3, 0);
        state.enemies[0].cooldown = 0;

        let hp = state.fortress.hp;
        for _ in 0..200 {
            update_enemies(&mut state);
            tick_status(&mut state);
        }
        assert!(state.fortress.hp < hp);
        let dist = state.enemies[0].position.distance(FixedVec2::ZERO);
        assert!(dist <= FORTRESS_RADIUS + state.enemies[0].range + 256);
    }

    #[test]
    fn test_fortress_shot_hits() {
        let (mut state, config) = running_state();
        spawn_enemy(&mut state, &config, EnemyKind::Grunt);
        state.enemies[0].position = FixedVec2::from_ints(6, 0);
        state.enemies[0].speed = 0;

        fortress_attack(&mut state);
        assert_eq!(state.projectiles.len(), 1);
        assert_eq!(state.fortress.cooldown, state.fortress.attack_interval);

        for _ in 0..20 {
            update_projectiles(&mut state);
        }
        assert!(state.projectiles.is_empty());
        assert!(state.stats.damage_dealt > 0);
    }

    #[test]
    fn test_hero_falls_and_respawns() {
        let (mut state, config) = running_state();
        state.heroes[0].hp = 0;
        let mut notices = Vec::new();
        cleanup_dead(&mut state, &config, &mut notices);
        assert_eq!(notices, vec![SimNotice::HeroFell { hero_id: 1 }]);
        assert!(!state.heroes[0].is_commandable());

        for _ in 0..HERO_RESPAWN_TICKS {
            update_heroes(&mut state);
        }
        assert!(state.heroes[0].is_alive());
        assert_eq!(state.heroes[0].hp, state.heroes[0].max_hp);
    }

    #[test]
    fn test_skill_cooldown() {
        let (mut state, _) = running_state();
        let target = FixedVec2::from_ints(20, 0);
        assert_eq!(cast_skill(&mut state, SkillId::Meteor, target), Ok(()));
        assert_eq!(cast_skill(&mut state, SkillId::Meteor, target), Err(DropReason::SkillOnCooldown));

        state.fortress.skills.clear();
        assert_eq!(cast_skill(&mut state, SkillId::Rally, target), Err(DropReason::SkillNotEquipped));
    }

    #[test]
    fn test_snap_kills_half() {
        let (mut state, config) = running_state();
        for _ in 0..5 {
            spawn_enemy(&mut state, &config, EnemyKind::Grunt);
        }
        spawn_enemy(&mut state, &config, EnemyKind::Boss);

        assert_eq!(activate_snap(&mut state), Err(DropReason::SnapNotCharged));
        state.fortress.snap_charge = SNAP_CHARGE_MAX;
        assert_eq!(activate_snap(&mut state), Ok(2));
        assert_eq!(state.fortress.snap_charge, 0);
        assert_eq!(state.living_enemies(), 4);

        let boss = state.enemies.iter().find(|e| e.kind == EnemyKind::Boss).unwrap();
        assert_eq!(boss.hp, boss.max_hp - boss.max_hp / 4);
    }
}
