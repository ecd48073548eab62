//! Simulation Configuration
//!
//! Every game mode drives the same engine and verifier. What differs between
//! endless runs, boss rush and pillar challenges is data: the loadout, the
//! wave source, limits and tier multipliers. Nothing here is code-forked per
//! mode.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, fixed_from_int};
use crate::core::hash::hash_with_domain;
use crate::CHECKPOINT_INTERVAL;

/// Game mode tag. Carried for bookkeeping and fingerprints only; the engine
/// never branches on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    /// Scaling waves until the fortress falls
    Endless,
    /// Fixed boss table
    BossRush,
    /// Tiered challenge with a wave cap
    PillarChallenge,
    /// PvP loadout battle
    Arena,
    /// Guild loadout battle
    GuildBattle,
}

/// Hero archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum HeroKind {
    /// Melee blocker
    Warrior = 0,
    /// Single-target ranged
    Archer = 1,
    /// Ranged splash
    Mage = 2,
}

/// Active fortress skill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum SkillId {
    /// Area damage at a target point
    Meteor = 0,
    /// Area slow plus chip damage
    FrostNova = 1,
    /// Empowers heroes and heals the fortress
    Rally = 2,
}

impl SkillId {
    /// Cooldown after a cast, in ticks.
    pub fn cooldown_ticks(self) -> u32 {
        match self {
            SkillId::Meteor => 900,
            SkillId::FrostNova => 600,
            SkillId::Rally => 1200,
        }
    }
}

/// Base fortress stats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FortressStats {
    /// Maximum hit points
    pub max_hp: Fixed,
    /// Flat damage reduction per hit
    pub armor: Fixed,
    /// Damage per shot
    pub damage: Fixed,
    /// Targeting range
    pub range: Fixed,
    /// Ticks between shots
    pub attack_interval: u32,
    /// Projectile speed per tick
    pub projectile_speed: Fixed,
}

impl Default for FortressStats {
    fn default() -> Self {
        Self {
            max_hp: fixed_from_int(500),
            armor: fixed_from_int(1),
            damage: fixed_from_int(8),
            range: fixed_from_int(12),
            attack_interval: 20,
            projectile_speed: 39321, // 0.6 units/tick
        }
    }
}

/// One hero in a loadout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroSlot {
    /// Archetype
    pub kind: HeroKind,
    /// Level (1-based, +10% stats per level above 1)
    pub level: u32,
}

/// Everything the player brings into a run or a battle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    /// Fortress stats
    pub fortress: FortressStats,
    /// Heroes, in deployment order
    pub heroes: Vec<HeroSlot>,
    /// Active skills
    pub skills: Vec<SkillId>,
}

impl Default for Loadout {
    fn default() -> Self {
        Self {
            fortress: FortressStats::default(),
            heroes: vec![
                HeroSlot { kind: HeroKind::Warrior, level: 1 },
                HeroSlot { kind: HeroKind::Archer, level: 1 },
                HeroSlot { kind: HeroKind::Mage, level: 1 },
            ],
            skills: vec![SkillId::Meteor, SkillId::FrostNova, SkillId::Rally],
        }
    }
}

/// Procedural wave table for scaling modes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveTable {
    /// Enemies in wave 1
    pub base_count: u32,
    /// Additional enemies per wave
    pub count_per_wave: u32,
    /// Upper bound on enemies per wave
    pub max_count: u32,
    /// Ticks between spawns within a wave
    pub spawn_interval: u32,
    /// Enemy hp growth per wave, percent
    pub hp_growth_pct: i32,
    /// Enemy damage growth per wave, percent
    pub damage_growth_pct: i32,
    /// A boss closes every Nth wave (0 = never)
    pub boss_every: u32,
    /// First wave that may contain runners
    pub runner_from_wave: u32,
    /// First wave that may contain brutes
    pub brute_from_wave: u32,
    /// Pause between waves, in ticks
    pub intermission_ticks: u32,
}

impl Default for WaveTable {
    fn default() -> Self {
        Self {
            base_count: 6,
            count_per_wave: 2,
            max_count: 60,
            spawn_interval: 24,
            hp_growth_pct: 12,
            damage_growth_pct: 6,
            boss_every: 10,
            runner_from_wave: 3,
            brute_from_wave: 5,
            intermission_ticks: 90,
        }
    }
}

/// Stat block for one boss-rush boss.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossStats {
    /// Hit points
    pub hp: Fixed,
    /// Damage per hit
    pub damage: Fixed,
    /// Flat damage reduction
    pub armor: Fixed,
    /// Movement per tick
    pub speed: Fixed,
    /// Grunts escorting the boss
    pub escorts: u32,
}

impl BossStats {
    /// Standard boss for position `index` in a rush (0-based).
    pub fn standard(index: u32) -> Self {
        let step = index as i32;
        Self {
            hp: fixed_from_int(300 + 150 * step),
            damage: fixed_from_int(15 + 5 * step),
            armor: fixed_from_int(3 + step),
            speed: 1966, // 0.03 units/tick
            escorts: 2 + index,
        }
    }
}

/// Where a run's waves come from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveSource {
    /// Procedural scaling waves
    Scaling(WaveTable),
    /// One boss per wave, in order
    Bosses(Vec<BossStats>),
}

/// Terminal limits for a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Run ends after clearing this many waves
    pub max_waves: Option<u32>,
    /// Run ends when the tick counter reaches this value
    pub max_ticks: Option<u32>,
}

/// Difficulty and reward multipliers, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMultipliers {
    /// Enemy hp scale
    pub enemy_hp_pct: i32,
    /// Enemy damage scale
    pub enemy_damage_pct: i32,
    /// Gold and dust scale
    pub reward_pct: i32,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            enemy_hp_pct: 100,
            enemy_damage_pct: 100,
            reward_pct: 100,
        }
    }
}

impl TierMultipliers {
    /// Multipliers for pillar tier `tier` (0 = base).
    pub fn for_tier(tier: u32) -> Self {
        let tier = tier as i32;
        Self {
            enemy_hp_pct: 100 + 25 * tier,
            enemy_damage_pct: 100 + 15 * tier,
            reward_pct: 100 + 20 * tier,
        }
    }
}

/// When and how relic choices are offered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelicRules {
    /// Offer a choice before wave 1
    pub opening_choice: bool,
    /// Offer a choice after every Nth cleared wave (0 = never)
    pub choice_every: u32,
    /// Options per choice
    pub options: u32,
    /// Rerolls allowed per choice
    pub rerolls: u32,
}

impl Default for RelicRules {
    fn default() -> Self {
        Self {
            opening_choice: true,
            choice_every: 5,
            options: 3,
            rerolls: 1,
        }
    }
}

/// Complete configuration for one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Mode tag
    pub mode: GameMode,
    /// Player loadout
    pub loadout: Loadout,
    /// Wave source
    pub waves: WaveSource,
    /// Terminal limits
    pub limits: RunLimits,
    /// Difficulty multipliers
    pub tier: TierMultipliers,
    /// Relic choice rules
    pub relics: RelicRules,
    /// Periodic checkpoint interval in ticks
    pub checkpoint_interval: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::endless()
    }
}

impl SimConfig {
    /// Endless scaling waves.
    pub fn endless() -> Self {
        Self {
            mode: GameMode::Endless,
            loadout: Loadout::default(),
            waves: WaveSource::Scaling(WaveTable::default()),
            limits: RunLimits::default(),
            tier: TierMultipliers::default(),
            relics: RelicRules::default(),
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }

    /// Boss rush over the given boss table. A relic is offered after every boss.
    pub fn boss_rush(bosses: Vec<BossStats>) -> Self {
        let count = bosses.len() as u32;
        Self {
            mode: GameMode::BossRush,
            waves: WaveSource::Bosses(bosses),
            limits: RunLimits {
                max_waves: Some(count),
                max_ticks: Some(crate::TICK_RATE * 60 * 15),
            },
            relics: RelicRules { choice_every: 1, ..RelicRules::default() },
            ..Self::endless()
        }
    }

    /// Pillar challenge at `tier`: ten scaling waves with tier multipliers.
    pub fn pillar_challenge(tier: u32) -> Self {
        Self {
            mode: GameMode::PillarChallenge,
            limits: RunLimits { max_waves: Some(10), max_ticks: None },
            tier: TierMultipliers::for_tier(tier),
            ..Self::endless()
        }
    }

    /// Replace the loadout.
    pub fn with_loadout(mut self, loadout: Loadout) -> Self {
        self.loadout = loadout;
        self
    }

    /// SHA-256 over the bincode encoding. Lets a server bind a session to
    /// the exact configuration it issued.
    pub fn fingerprint(&self) -> Result<[u8; 32], bincode::Error> {
        let bytes = bincode::serialize(self)?;
        Ok(hash_with_domain(b"FORTRESS_CONFIG_V1", &bytes))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_constructors() {
        let endless = SimConfig::endless();
        assert_eq!(endless.mode, GameMode::Endless);
        assert_eq!(endless.limits, RunLimits::default());

        let rush = SimConfig::boss_rush(vec![BossStats::standard(0), BossStats::standard(1)]);
        assert_eq!(rush.limits.max_waves, Some(2));
        assert_eq!(rush.relics.choice_every, 1);

        let pillar = SimConfig::pillar_challenge(2);
        assert_eq!(pillar.tier.enemy_hp_pct, 150);
        assert_eq!(pillar.limits.max_waves, Some(10));
    }

    #[test]
    fn test_fingerprint_binds_config() {
        let a = SimConfig::endless().fingerprint().unwrap();
        let b = SimConfig::endless().fingerprint().unwrap();
        let c = SimConfig::pillar_challenge(1).fingerprint().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = SimConfig::boss_rush(vec![BossStats::standard(0)]);
        let json = serde_json::to_string(&config).unwrap();
        let back: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
