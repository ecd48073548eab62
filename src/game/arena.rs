//! Arena Battles
//!
//! PvP and guild battles: two static loadouts fight to a terminal condition
//! inside one synchronous call. Neither side issues commands, so the result
//! is a pure function of `(seed, loadout A, loadout B, config)`.
//!
//! ```text
//!  A fortress                                       B fortress
//!  x = 0  ◀── A heroes ──▶  ⚔  ◀── B heroes ──▶  x = FIELD_LENGTH
//! ```
//!
//! Both sides plan from the same snapshot each tick and hits land together,
//! so neither side gets a first-mover advantage.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{
    Fixed, FIXED_ONE, FIELD_LENGTH, FORTRESS_RADIUS, fixed_from_int, fixed_percent,
};
use crate::core::hash::{compute_state_hash, Hash32, StateHasher32};
use crate::core::rng::{DeterministicRng, Seed};
use crate::core::vec2::FixedVec2;
use crate::game::combat::{mitigate, WARRIOR_LEASH};
use crate::game::config::{GameMode, Loadout};
use crate::game::state::{Fortress, Hero, HERO_LINE_X};
use crate::proof::checkpoint::Checkpoint;
use crate::{CHECKPOINT_INTERVAL, TICK_RATE};

/// Chance of a critical hit, as a Q16.16 probability (10%).
const CRIT_CHANCE: Fixed = 6554;

/// Critical hit damage, percent.
const CRIT_DAMAGE_PCT: i32 = 150;

/// Battle side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// First loadout, fortress at x = 0
    A,
    /// Second loadout, fortress at x = FIELD_LENGTH
    B,
}

impl Side {
    /// Index into per-side arrays.
    pub fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// Battle parameters. Arena and guild battles differ only in this data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Mode tag
    pub mode: GameMode,
    /// Tick cap
    pub max_ticks: u32,
    /// Fortress hp scale, percent
    pub fortress_hp_pct: i32,
    /// Checkpoint interval in ticks
    pub checkpoint_interval: u32,
}

impl BattleConfig {
    /// 1v1 arena: 90 seconds, standard fortresses.
    pub fn arena() -> Self {
        Self {
            mode: GameMode::Arena,
            max_ticks: TICK_RATE * 90,
            fortress_hp_pct: 100,
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }

    /// Guild battle: 150 seconds, reinforced fortresses.
    pub fn guild_battle() -> Self {
        Self {
            mode: GameMode::GuildBattle,
            max_ticks: TICK_RATE * 150,
            fortress_hp_pct: 150,
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }
}

/// Outcome of a battle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Winning side, `None` on a draw
    pub winner: Option<Side>,
    /// Heroes still standing, per side
    pub survivors: [u32; 2],
    /// Damage dealt (raw Q16.16), per side
    pub damage: [i64; 2],
    /// Ticks simulated
    pub duration_ticks: u32,
    /// Chain hash over the battle's checkpoints
    pub final_hash: Hash32,
}

struct BattleSide {
    fortress: Fortress,
    heroes: Vec<Hero>,
    damage: i64,
}

#[derive(Clone, Copy)]
enum Target {
    Hero(usize),
    Fortress,
}

#[derive(Clone, Copy)]
struct Hit {
    target: Target,
    amount: Fixed,
}

impl BattleSide {
    fn new(loadout: &Loadout, side: Side, config: &BattleConfig, rng: &mut DeterministicRng) -> Self {
        let stats = &loadout.fortress;
        let max_hp = fixed_percent(stats.max_hp, config.fortress_hp_pct).max(1);
        let (fortress_x, line_x) = match side {
            Side::A => (0, HERO_LINE_X),
            Side::B => (FIELD_LENGTH, FIELD_LENGTH - HERO_LINE_X),
        };

        let fortress = Fortress {
            position: FixedVec2::new(fortress_x, 0),
            hp: max_hp,
            max_hp,
            armor: stats.armor,
            damage: stats.damage,
            range: stats.range,
            attack_interval: stats.attack_interval.max(1),
            cooldown: 0,
            projectile_speed: stats.projectile_speed,
            snap_charge: 0,
            skills: Vec::new(),
        };

        let count = loadout.heroes.len() as i32;
        let heroes = loadout
            .heroes
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let lane = fixed_from_int(3 * i as i32) - fixed_from_int(3 * (count - 1)) / 2;
                let jitter = rng.next_fixed_range(-FIXED_ONE / 2, FIXED_ONE / 2);
                let home = FixedVec2::new(line_x, lane + jitter).clamp_to_field();
                Hero::from_slot(i as u32 + 1, slot, home)
            })
            .collect();

        Self { fortress, heroes, damage: 0 }
    }

    fn living(&self) -> u32 {
        self.heroes.iter().filter(|h| h.hp > 0).count() as u32
    }

    fn hash_into(&self, hasher: &mut StateHasher32) {
        hasher.update_fixed(self.fortress.hp);
        hasher.update_u32(self.fortress.cooldown);
        hasher.update_i64(self.damage);
        hasher.update_u32(self.heroes.len() as u32);
        for hero in &self.heroes {
            hasher.update_u32(hero.id);
            hasher.update_vec2(hero.position);
            hasher.update_fixed(hero.hp);
            hasher.update_u32(hero.cooldown);
        }
    }
}

fn nearest_hero(heroes: &[Hero], from: FixedVec2, range: Fixed) -> Option<usize> {
    let mut best: Option<(usize, Fixed)> = None;
    for (i, hero) in heroes.iter().enumerate() {
        if hero.hp <= 0 || !from.within(hero.position, range) {
            continue;
        }
        let d = from.distance_squared(hero.position);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// New hero positions for `side` given the foe's current layout.
fn plan_moves(side: &BattleSide, foe: &BattleSide) -> Vec<FixedVec2> {
    let foe_fortress = foe.fortress.position;
    side.heroes
        .iter()
        .map(|hero| {
            if hero.hp <= 0 {
                return hero.position;
            }
            if let Some(t) = nearest_hero(&foe.heroes, hero.position, hero.range.saturating_add(WARRIOR_LEASH)) {
                let target = foe.heroes[t].position;
                return if hero.position.within(target, hero.range) {
                    hero.position
                } else {
                    hero.position.move_towards(target, hero.speed)
                };
            }
            if hero.position.within(foe_fortress, hero.range.saturating_add(FORTRESS_RADIUS)) {
                hero.position
            } else {
                hero.position.move_towards(foe_fortress, hero.speed)
            }
        })
        .collect()
}

fn roll_damage(rng: &mut DeterministicRng, damage: Fixed) -> Fixed {
    if rng.next_bool(CRIT_CHANCE) {
        fixed_percent(damage, CRIT_DAMAGE_PCT)
    } else {
        damage
    }
}

/// Attacks `side` makes this tick. Sets cooldowns on the attackers.
fn plan_attacks(side: &mut BattleSide, foe: &BattleSide, rng: &mut DeterministicRng) -> Vec<Hit> {
    let mut hits = Vec::new();
    let foe_fortress = foe.fortress.position;

    for hero in side.heroes.iter_mut() {
        if hero.hp <= 0 || hero.cooldown > 0 {
            continue;
        }
        if let Some(t) = nearest_hero(&foe.heroes, hero.position, hero.range) {
            let amount = roll_damage(rng, hero.damage);
            hits.push(Hit { target: Target::Hero(t), amount });
            if hero.splash > 0 {
                let center = foe.heroes[t].position;
                for (i, other) in foe.heroes.iter().enumerate() {
                    if i != t && other.hp > 0 && center.within(other.position, hero.splash) {
                        hits.push(Hit { target: Target::Hero(i), amount });
                    }
                }
            }
            hero.cooldown = hero.attack_interval;
        } else if hero.position.within(foe_fortress, hero.range.saturating_add(FORTRESS_RADIUS)) {
            let amount = mitigate(roll_damage(rng, hero.damage), foe.fortress.armor);
            hits.push(Hit { target: Target::Fortress, amount });
            hero.cooldown = hero.attack_interval;
        }
    }

    let fortress = &mut side.fortress;
    if fortress.cooldown == 0 && fortress.hp > 0 {
        if let Some(t) = nearest_hero(&foe.heroes, fortress.position, fortress.range) {
            let amount = roll_damage(rng, fortress.damage);
            hits.push(Hit { target: Target::Hero(t), amount });
            fortress.cooldown = fortress.attack_interval;
        }
    }
    hits
}

/// Land `hits` from `attacker` on `defender`.
fn apply_hits(attacker: &mut BattleSide, defender: &mut BattleSide, hits: &[Hit]) {
    for hit in hits {
        let hp = match hit.target {
            Target::Hero(i) => &mut defender.heroes[i].hp,
            Target::Fortress => &mut defender.fortress.hp,
        };
        let dealt = hit.amount.max(0).min(*hp);
        *hp -= dealt;
        attacker.damage += dealt as i64;
    }
}

fn cool_down(side: &mut BattleSide) {
    side.fortress.cooldown = side.fortress.cooldown.saturating_sub(1);
    for hero in &mut side.heroes {
        hero.cooldown = hero.cooldown.saturating_sub(1);
    }
}

fn battle_hash(tick: u32, sides: &[BattleSide; 2], rng: &DeterministicRng) -> Hash32 {
    compute_state_hash(tick, |hasher| {
        for side in sides {
            side.hash_into(hasher);
        }
        let [s0, s1] = rng.state();
        hasher.update_u64(s0);
        hasher.update_u64(s1);
    })
}

/// Simulate a battle between two static loadouts.
pub fn simulate_battle(seed: Seed, a: &Loadout, b: &Loadout, config: &BattleConfig) -> BattleResult {
    let mut rng = DeterministicRng::new(seed);
    let mut sides = [
        BattleSide::new(a, Side::A, config, &mut rng),
        BattleSide::new(b, Side::B, config, &mut rng),
    ];
    let interval = config.checkpoint_interval.max(1);
    let mut chain: Hash32 = 0;
    let mut last_checkpoint = 0;
    let mut tick = 0;

    loop {
        let [side_a, side_b] = &mut sides;
        let a_down = side_a.fortress.hp <= 0;
        let b_down = side_b.fortress.hp <= 0;
        let stalemate = side_a.living() == 0 && side_b.living() == 0;
        if a_down || b_down || stalemate || tick >= config.max_ticks {
            break;
        }

        tick += 1;

        let moves_a = plan_moves(side_a, side_b);
        let moves_b = plan_moves(side_b, side_a);
        for (hero, pos) in side_a.heroes.iter_mut().zip(moves_a) {
            hero.position = pos;
        }
        for (hero, pos) in side_b.heroes.iter_mut().zip(moves_b) {
            hero.position = pos;
        }

        let hits_a = plan_attacks(side_a, side_b, &mut rng);
        let hits_b = plan_attacks(side_b, side_a, &mut rng);
        apply_hits(side_a, side_b, &hits_a);
        apply_hits(side_b, side_a, &hits_b);

        cool_down(side_a);
        cool_down(side_b);

        if tick - last_checkpoint >= interval {
            chain = Checkpoint::next(chain, tick, battle_hash(tick, &sides, &rng)).chain_hash;
            last_checkpoint = tick;
        }
    }

    if last_checkpoint != tick || tick == 0 {
        chain = Checkpoint::next(chain, tick, battle_hash(tick, &sides, &rng)).chain_hash;
    }

    let [side_a, side_b] = &sides;
    let winner = match (side_a.fortress.hp <= 0, side_b.fortress.hp <= 0) {
        (false, true) => Some(Side::A),
        (true, false) => Some(Side::B),
        _ => {
            // Compare remaining hp fractions without dividing
            let a_score = side_a.fortress.hp as i64 * side_b.fortress.max_hp as i64;
            let b_score = side_b.fortress.hp as i64 * side_a.fortress.max_hp as i64;
            match a_score.cmp(&b_score) {
                std::cmp::Ordering::Greater => Some(Side::A),
                std::cmp::Ordering::Less => Some(Side::B),
                std::cmp::Ordering::Equal => None,
            }
        }
    };

    BattleResult {
        winner,
        survivors: [side_a.living(), side_b.living()],
        damage: [side_a.damage, side_b.damage],
        duration_ticks: tick,
        final_hash: chain,
    }
}

// =============================================================================
// TESTS
// =============================================================================
