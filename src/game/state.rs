//! Game State Definitions
//!
//! All state types for the fortress simulation.
//! Entities live in `Vec`s ordered by ascending id (spawn order); that
//! iteration order is part of the determinism contract.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::fixed::{Fixed, FIXED_ONE, fixed_from_int, fixed_percent};
use crate::core::vec2::FixedVec2;
use crate::core::rng::{DeterministicRng, Seed};
use crate::core::hash::{Hash32, StateHasher32, compute_state_hash};
use crate::game::config::{HeroKind, HeroSlot, SimConfig, SkillId};
use crate::game::relic::{self, RelicId};
use crate::game::wave;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Snap charge required to activate the snap.
pub const SNAP_CHARGE_MAX: u32 = 100;

/// Snap charge gained per kill.
pub const SNAP_CHARGE_PER_KILL: u32 = 2;

/// Ticks a fallen hero waits before respawning at home.
pub const HERO_RESPAWN_TICKS: u32 = 300;

/// Enemies within this distance of a living hero are blocked by it.
pub const HERO_BLOCK_RADIUS: Fixed = FIXED_ONE;

/// X coordinate of the hero line.
pub const HERO_LINE_X: Fixed = 5 * FIXED_ONE;

// =============================================================================
// STATUS EFFECTS
// =============================================================================

/// Kind of status effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    /// Movement reduced by `pct` percent
    Slow { pct: i32 },
    /// Loses `per_tick` hp each tick
    Burn { per_tick: Fixed },
    /// Cannot move or attack
    Stun,
    /// Damage increased by `pct` percent
    Empowered { pct: i32 },
}

impl StatusKind {
    fn tag(self) -> u32 {
        match self {
            StatusKind::Slow { .. } => 0,
            StatusKind::Burn { .. } => 1,
            StatusKind::Stun => 2,
            StatusKind::Empowered { .. } => 3,
        }
    }

    fn magnitude(self) -> i32 {
        match self {
            StatusKind::Slow { pct } | StatusKind::Empowered { pct } => pct,
            StatusKind::Burn { per_tick } => per_tick,
            StatusKind::Stun => 0,
        }
    }
}

/// A timed status effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// What the effect does
    pub kind: StatusKind,
    /// Ticks left
    pub remaining: u32,
}

/// Add an effect, refreshing an existing one of the same kind.
///
/// A refresh keeps the stronger magnitude and the longer duration.
pub fn add_effect(effects: &mut Vec<StatusEffect>, effect: StatusEffect) {
    if let Some(existing) = effects.iter_mut().find(|e| e.kind.tag() == effect.kind.tag()) {
        if effect.kind.magnitude() >= existing.kind.magnitude() {
            existing.kind = effect.kind;
        }
        existing.remaining = existing.remaining.max(effect.remaining);
        return;
    }
    effects.push(effect);
}

/// Decay effect timers and drop expired ones. Order of the rest is kept.
pub fn decay_effects(effects: &mut Vec<StatusEffect>) {
    for effect in effects.iter_mut() {
        effect.remaining = effect.remaining.saturating_sub(1);
    }
    effects.retain(|e| e.remaining > 0);
}

/// Strongest active slow, in percent (capped at 90).
pub fn slow_pct(effects: &[StatusEffect]) -> i32 {
    effects
        .iter()
        .filter_map(|e| match e.kind {
            StatusKind::Slow { pct } => Some(pct),
            _ => None,
        })
        .max()
        .unwrap_or(0)
        .clamp(0, 90)
}

/// Is a stun active?
pub fn is_stunned(effects: &[StatusEffect]) -> bool {
    effects.iter().any(|e| e.kind == StatusKind::Stun)
}

/// Active damage bonus, in percent.
pub fn empowered_pct(effects: &[StatusEffect]) -> i32 {
    effects
        .iter()
        .filter_map(|e| match e.kind {
            StatusKind::Empowered { pct } => Some(pct),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn hash_effects(hasher: &mut StateHasher32, effects: &[StatusEffect]) {
    hasher.update_u32(effects.len() as u32);
    for effect in effects {
        hasher.update_u32(effect.kind.tag());
        hasher.update_i32(effect.kind.magnitude());
        hasher.update_u32(effect.remaining);
    }
}

// =============================================================================
// FORTRESS
// =============================================================================

/// A skill in the loadout with its cooldown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSlot {
    /// Skill
    pub skill: SkillId,
    /// Ticks until castable (0 = ready)
    pub cooldown: u32,
}

/// The player's fortress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fortress {
    /// Wall centre
    pub position: FixedVec2,
    /// Current hit points
    pub hp: Fixed,
    /// Maximum hit points
    pub max_hp: Fixed,
    /// Flat damage reduction
    pub armor: Fixed,
    /// Damage per shot
    pub damage: Fixed,
    /// Targeting range
    pub range: Fixed,
    /// Ticks between shots
    pub attack_interval: u32,
    /// Ticks until next shot
    pub cooldown: u32,
    /// Projectile speed per tick
    pub projectile_speed: Fixed,
    /// Snap charge (0..=SNAP_CHARGE_MAX)
    pub snap_charge: u32,
    /// Active skills
    pub skills: Vec<SkillSlot>,
}

impl Fortress {
    /// Is the fortress still standing?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    fn hash_into(&self, hasher: &mut StateHasher32) {
        hasher.update_fixed(self.hp);
        hasher.update_fixed(self.max_hp);
        hasher.update_fixed(self.armor);
        hasher.update_fixed(self.damage);
        hasher.update_fixed(self.range);
        hasher.update_u32(self.attack_interval);
        hasher.update_u32(self.cooldown);
        hasher.update_u32(self.snap_charge);
        for slot in &self.skills {
            hasher.update_u8(slot.skill as u8);
            hasher.update_u32(slot.cooldown);
        }
    }
}

// =============================================================================
// HEROES
// =============================================================================

/// A hero defending the fortress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    /// Hero id (1-based deployment order)
    pub id: u32,
    /// Archetype
    pub kind: HeroKind,
    /// Level
    pub level: u32,
    /// Default post
    pub home: FixedVec2,
    /// Current position
    pub position: FixedVec2,
    /// Current hit points
    pub hp: Fixed,
    /// Maximum hit points
    pub max_hp: Fixed,
    /// Damage per attack
    pub damage: Fixed,
    /// Attack range
    pub range: Fixed,
    /// Movement per tick
    pub speed: Fixed,
    /// Ticks between attacks
    pub attack_interval: u32,
    /// Ticks until next attack
    pub cooldown: u32,
    /// Splash radius (0 = single target)
    pub splash: Fixed,
    /// Player-ordered post, overrides `home`
    pub command_target: Option<FixedVec2>,
    /// Ticks until respawn (0 = on the field)
    pub respawn_in: u32,
    /// Active status effects
    pub effects: Vec<StatusEffect>,
}

impl Hero {
    /// Build a hero from a loadout slot.
    pub fn from_slot(id: u32, slot: &HeroSlot, home: FixedVec2) -> Self {
        let (hp, damage, range, speed, attack_interval, splash) = match slot.kind {
            HeroKind::Warrior => (120, fixed_from_int(6), FIXED_ONE, 6554, 30, 0),
            HeroKind::Archer => (60, fixed_from_int(5), fixed_from_int(8), 5898, 25, 0),
            HeroKind::Mage => (50, fixed_from_int(9), fixed_from_int(6), 5243, 45, 98304),
        };
        let level = slot.level.max(1);
        let level_pct = 100 + 10 * (level.min(101) as i32 - 1);
        let max_hp = fixed_percent(fixed_from_int(hp), level_pct);

        Self {
            id,
            kind: slot.kind,
            level,
            home,
            position: home,
            hp: max_hp,
            max_hp,
            damage: fixed_percent(damage, level_pct),
            range,
            speed,
            attack_interval,
            cooldown: 0,
            splash,
            command_target: None,
            respawn_in: 0,
            effects: Vec::new(),
        }
    }

    /// On the field and not dead.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.respawn_in == 0 && self.hp > 0
    }

    /// Alive and not stunned.
    #[inline]
    pub fn is_commandable(&self) -> bool {
        self.is_alive() && !is_stunned(&self.effects)
    }

    /// Where the hero holds position.
    #[inline]
    pub fn anchor(&self) -> FixedVec2 {
        self.command_target.unwrap_or(self.home)
    }

    /// Damage including active buffs.
    pub fn effective_damage(&self) -> Fixed {
        fixed_percent(self.damage, 100 + empowered_pct(&self.effects))
    }

    fn hash_into(&self, hasher: &mut StateHasher32) {
        hasher.update_u32(self.id);
        hasher.update_u8(self.kind as u8);
        hasher.update_vec2(self.position);
        hasher.update_fixed(self.hp);
        hasher.update_fixed(self.damage);
        hasher.update_u32(self.cooldown);
        hasher.update_u32(self.respawn_in);
        match self.command_target {
            Some(target) => {
                hasher.update_bool(true);
                hasher.update_vec2(target);
            }
            None => hasher.update_bool(false),
        }
        hash_effects(hasher, &self.effects);
    }
}

// =============================================================================
// ENEMIES
// =============================================================================

/// Enemy archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnemyKind {
    /// Baseline melee
    Grunt = 0,
    /// Fast and fragile
    Runner = 1,
    /// Slow and armored
    Brute = 2,
    /// Wave closer
    Boss = 3,
}

/// Base stat block for an enemy kind before wave and tier scaling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnemyTemplate {
    /// Hit points
    pub hp: Fixed,
    /// Damage per hit
    pub damage: Fixed,
    /// Flat damage reduction
    pub armor: Fixed,
    /// Movement per tick
    pub speed: Fixed,
    /// Attack range
    pub range: Fixed,
    /// Ticks between attacks
    pub attack_interval: u32,
    /// Gold on kill
    pub gold: u32,
    /// Xp on kill
    pub xp: u32,
}

impl EnemyKind {
    /// Base stats.
    pub fn template(self) -> EnemyTemplate {
        match self {
            EnemyKind::Grunt => EnemyTemplate {
                hp: fixed_from_int(20),
                damage: fixed_from_int(3),
                armor: 0,
                speed: 3932, // 0.06
                range: 52429, // 0.8
                attack_interval: 30,
                gold: 2,
                xp: 1,
            },
            EnemyKind::Runner => EnemyTemplate {
                hp: fixed_from_int(12),
                damage: fixed_from_int(2),
                armor: 0,
                speed: 7209, // 0.11
                range: 39322, // 0.6
                attack_interval: 20,
                gold: 3,
                xp: 1,
            },
            EnemyKind::Brute => EnemyTemplate {
                hp: fixed_from_int(60),
                damage: fixed_from_int(8),
                armor: fixed_from_int(2),
                speed: 2621, // 0.04
                range: FIXED_ONE,
                attack_interval: 45,
                gold: 6,
                xp: 3,
            },
            EnemyKind::Boss => EnemyTemplate {
                hp: fixed_from_int(400),
                damage: fixed_from_int(20),
                armor: fixed_from_int(4),
                speed: 1966, // 0.03
                range: 98304, // 1.5
                attack_interval: 60,
                gold: 50,
                xp: 20,
            },
        }
    }
}

/// An attacking enemy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    /// Entity id
    pub id: u32,
    /// Archetype
    pub kind: EnemyKind,
    /// Current position
    pub position: FixedVec2,
    /// Current hit points
    pub hp: Fixed,
    /// Maximum hit points
    pub max_hp: Fixed,
    /// Damage per hit
    pub damage: Fixed,
    /// Flat damage reduction
    pub armor: Fixed,
    /// Movement per tick
    pub speed: Fixed,
    /// Attack range
    pub range: Fixed,
    /// Ticks between attacks
    pub attack_interval: u32,
    /// Ticks until next attack
    pub cooldown: u32,
    /// Gold on kill
    pub gold: u32,
    /// Xp on kill
    pub xp: u32,
    /// Active status effects
    pub effects: Vec<StatusEffect>,
}

impl Enemy {
    /// Still fighting?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    fn hash_into(&self, hasher: &mut StateHasher32) {
        hasher.update_u32(self.id);
        hasher.update_u8(self.kind as u8);
        hasher.update_vec2(self.position);
        hasher.update_fixed(self.hp);
        hasher.update_u32(self.cooldown);
        hash_effects(hasher, &self.effects);
    }
}

// =============================================================================
// PROJECTILES
// =============================================================================

/// Who fired a projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attacker {
    /// The fortress
    Fortress,
    /// A hero, by id
    Hero(u32),
}

impl Attacker {
    fn code(self) -> u32 {
        match self {
            Attacker::Fortress => 0,
            Attacker::Hero(id) => id,
        }
    }
}

/// A homing projectile in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity id
    pub id: u32,
    /// Shooter
    pub owner: Attacker,
    /// Target enemy id
    pub target: u32,
    /// Current position
    pub position: FixedVec2,
    /// Movement per tick
    pub speed: Fixed,
    /// Damage on impact
    pub damage: Fixed,
    /// Splash radius (0 = single target)
    pub splash: Fixed,
    /// Effect applied on impact
    pub on_hit: Option<StatusEffect>,
}

// =============================================================================
// RUN STATE
// =============================================================================

/// An open relic choice blocking the simulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChoice {
    /// Wave the choice is offered for
    pub wave: u32,
    /// Options to pick from
    pub options: Vec<RelicId>,
    /// Rerolls remaining
    pub rerolls_left: u32,
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EndReason {
    /// Fortress hp reached zero
    FortressDestroyed = 0,
    /// Every boss in the table was defeated
    BossesDefeated = 1,
    /// Wave cap reached
    WaveLimitReached = 2,
    /// Tick cap reached
    TimeLimit = 3,
}

/// Accumulated run counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Total damage dealt, raw Q16.16 (i64 so it never overflows)
    pub damage_dealt: i64,
    /// Enemies killed
    pub kills: u32,
    /// Gold earned
    pub gold: u64,
    /// Dust earned
    pub dust: u64,
    /// Xp earned
    pub xp: u64,
}

/// Coarse run phase derived from the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Simulation advancing
    Running,
    /// Waiting for a relic pick
    PendingChoice,
    /// Terminal
    Ended,
}

/// Snapshot encode/decode failure.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Encoding failed
    #[error("failed to encode state: {0}")]
    Encode(bincode::Error),

    /// Decoding failed
    #[error("failed to decode state: {0}")]
    Decode(bincode::Error),
}

/// Complete state of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Session seed
    pub seed: Seed,

    /// Current tick (0 before the first step)
    pub tick: u32,

    /// Current wave number (0 before wave 1 starts)
    pub wave: u32,

    /// Waves fully cleared
    pub waves_cleared: u32,

    /// Is the current wave still in progress?
    pub wave_active: bool,

    /// Enemies still to spawn this wave, in order
    pub spawn_queue: Vec<EnemyKind>,

    /// Ticks until next spawn
    pub spawn_cooldown: u32,

    /// Ticks until the next wave starts
    pub intermission: u32,

    /// The fortress
    pub fortress: Fortress,

    /// Heroes, ascending id
    pub heroes: Vec<Hero>,

    /// Enemies, ascending id
    pub enemies: Vec<Enemy>,

    /// Projectiles, ascending id
    pub projectiles: Vec<Projectile>,

    /// Owned relics, in pick order
    pub relics: Vec<RelicId>,

    /// Open relic choice
    pub pending_choice: Option<PendingChoice>,

    /// Terminal state
    pub ended: Option<EndReason>,

    /// Run counters
    pub stats: RunStats,

    /// Next enemy/projectile id
    pub next_id: u32,

    /// Deterministic RNG state
    pub rng: DeterministicRng,
}

impl GameState {
    /// Create the initial state for a run.
    pub fn new(seed: Seed, config: &SimConfig) -> Self {
        let loadout = &config.loadout;
        let stats = &loadout.fortress;
        let mut rng = DeterministicRng::new(seed);

        let fortress = Fortress {
            position: FixedVec2::ZERO,
            hp: stats.max_hp,
            max_hp: stats.max_hp,
            armor: stats.armor,
            damage: stats.damage,
            range: stats.range,
            attack_interval: stats.attack_interval.max(1),
            cooldown: 0,
            projectile_speed: stats.projectile_speed,
            snap_charge: 0,
            skills: loadout
                .skills
                .iter()
                .map(|skill| SkillSlot { skill: *skill, cooldown: 0 })
                .collect(),
        };

        let count = loadout.heroes.len() as i32;
        let heroes = loadout
            .heroes
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let y = fixed_from_int(3 * i as i32) - fixed_from_int(3 * (count - 1)) / 2;
                Hero::from_slot(i as u32 + 1, slot, FixedVec2::new(HERO_LINE_X, y).clamp_to_field())
            })
            .collect();

        let pending_choice = if config.relics.opening_choice {
            Some(relic::offer_choice(&mut rng, &[], 1, &config.relics))
        } else {
            None
        };

        Self {
            seed,
            tick: 0,
            wave: 0,
            waves_cleared: 0,
            wave_active: false,
            spawn_queue: Vec::new(),
            spawn_cooldown: 0,
            intermission: wave::intermission_ticks(config),
            fortress,
            heroes,
            enemies: Vec::new(),
            projectiles: Vec::new(),
            relics: Vec::new(),
            pending_choice,
            ended: None,
            stats: RunStats::default(),
            next_id: 1,
            rng,
        }
    }

    /// Allocate an enemy/projectile id.
    #[inline]
    pub fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        if self.ended.is_some() {
            RunPhase::Ended
        } else if self.pending_choice.is_some() {
            RunPhase::PendingChoice
        } else {
            RunPhase::Running
        }
    }

    /// Has the run ended?
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.ended.is_some()
    }

    /// Get a hero by id.
    pub fn hero(&self, id: u32) -> Option<&Hero> {
        self.heroes.iter().find(|h| h.id == id)
    }

    /// Get a hero mutably by id.
    pub fn hero_mut(&mut self, id: u32) -> Option<&mut Hero> {
        self.heroes.iter_mut().find(|h| h.id == id)
    }

    /// Get an enemy by id.
    pub fn enemy(&self, id: u32) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.id == id)
    }

    /// Count of living enemies.
    pub fn living_enemies(&self) -> usize {
        self.enemies.iter().filter(|e| e.is_alive()).count()
    }

    /// Count of heroes on the field.
    pub fn living_heroes(&self) -> usize {
        self.heroes.iter().filter(|h| h.is_alive()).count()
    }

    /// Compute `stateHash32` for the current tick.
    pub fn compute_hash(&self) -> Hash32 {
        compute_state_hash(self.tick, |hasher| {
            hasher.update_u32(self.wave);
            hasher.update_u32(self.waves_cleared);
            hasher.update_bool(self.wave_active);
            hasher.update_u32(self.spawn_queue.len() as u32);
            for kind in &self.spawn_queue {
                hasher.update_u8(*kind as u8);
            }
            hasher.update_u32(self.spawn_cooldown);
            hasher.update_u32(self.intermission);

            self.fortress.hash_into(hasher);

            hasher.update_u32(self.heroes.len() as u32);
            for hero in &self.heroes {
                hero.hash_into(hasher);
            }

            hasher.update_u32(self.enemies.len() as u32);
            for enemy in &self.enemies {
                enemy.hash_into(hasher);
            }

            hasher.update_u32(self.projectiles.len() as u32);
            for projectile in &self.projectiles {
                hasher.update_u32(projectile.id);
                hasher.update_u32(projectile.owner.code());
                hasher.update_u32(projectile.target);
                hasher.update_vec2(projectile.position);
                hasher.update_fixed(projectile.damage);
            }

            hasher.update_u32(self.relics.len() as u32);
            for relic in &self.relics {
                hasher.update_u8(*relic as u8);
            }

            match &self.pending_choice {
                Some(choice) => {
                    hasher.update_bool(true);
                    hasher.update_u32(choice.wave);
                    hasher.update_u32(choice.rerolls_left);
                    for option in &choice.options {
                        hasher.update_u8(*option as u8);
                    }
                }
                None => hasher.update_bool(false),
            }

            hasher.update_u32(self.ended.map_or(u32::MAX, |r| r as u32));
            hasher.update_i64(self.stats.damage_dealt);
            hasher.update_u32(self.stats.kills);
            hasher.update_u64(self.stats.gold);
            hasher.update_u64(self.stats.dust);
            hasher.update_u64(self.stats.xp);
            hasher.update_u32(self.next_id);

            let [s0, s1] = self.rng.state();
            hasher.update_u64(s0);
            hasher.update_u64(s1);
        })
    }

    /// Encode a snapshot.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(SnapshotError::Encode)
    }

    /// Decode a snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        bincode::deserialize(bytes).map_err(SnapshotError::Decode)
    }
}

// =============================================================================
// TESTS
// =============================================================================
