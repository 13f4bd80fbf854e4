//! Static game content: quest definitions, unit templates and economy tuning.
//!
//! Loaded once at boot from an optional TOML file. Every field falls back to the
//! built-in defaults, so a partial file only overrides what it names.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::economy::ResourceKind;
use crate::error::{GameError, Result};

/// Quest id incremented by every successful sign-in.
pub const SIGN_IN_QUEST_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameContent {
    #[serde(default)]
    pub accrual: AccrualRates,

    #[serde(default = "default_quests")]
    pub quests: Vec<DailyQuest>,

    #[serde(default = "default_unit_templates")]
    pub unit_templates: Vec<UnitTemplate>,

    #[serde(default)]
    pub summon: SummonCost,
}

/// Per-second accrual for one resource: `base + (level / level_step) * growth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub base: i64,
    pub growth: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualRates {
    /// Levels per growth increment
    #[serde(default = "default_level_step")]
    pub level_step: i64,

    #[serde(default = "default_exp_rate")]
    pub exp: Rate,

    #[serde(default = "default_gold_rate")]
    pub gold: Rate,

    #[serde(default = "default_exp_stone_rate")]
    pub exp_stone: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub resource: ResourceKind,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyQuest {
    pub id: i64,
    pub description: String,
    pub required: i64,
    pub reward: Reward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Forest,
    Abyss,
    Fortress,
    Shadow,
    Light,
    Dark,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTemplate {
    pub id: i64,
    pub name: String,
    pub unit_type: UnitType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SummonCost {
    #[serde(default = "default_summon_resource")]
    pub resource: ResourceKind,

    #[serde(default = "default_summon_amount")]
    pub amount: i64,
}

fn default_level_step() -> i64 {
    5
}

fn default_exp_rate() -> Rate {
    Rate { base: 5, growth: 2 }
}

fn default_gold_rate() -> Rate {
    Rate { base: 20, growth: 5 }
}

fn default_exp_stone_rate() -> Rate {
    Rate { base: 2, growth: 1 }
}

fn default_summon_resource() -> ResourceKind {
    ResourceKind::Gems
}

fn default_summon_amount() -> i64 {
    100
}

fn default_quests() -> Vec<DailyQuest> {
    vec![DailyQuest {
        id: SIGN_IN_QUEST_ID,
        description: "Sign in".to_string(),
        required: 1,
        reward: Reward {
            resource: ResourceKind::Gems,
            amount: 100,
        },
    }]
}

fn default_unit_templates() -> Vec<UnitTemplate> {
    [
        (1, "Treant", UnitType::Forest),
        (2, "Kraken", UnitType::Abyss),
        (3, "Golem", UnitType::Fortress),
        (4, "Wraith", UnitType::Shadow),
        (5, "Seraph", UnitType::Light),
        (6, "Lich", UnitType::Dark),
    ]
    .into_iter()
    .map(|(id, name, unit_type)| UnitTemplate {
        id,
        name: name.to_string(),
        unit_type,
    })
    .collect()
}

impl Default for AccrualRates {
    fn default() -> Self {
        Self {
            level_step: default_level_step(),
            exp: default_exp_rate(),
            gold: default_gold_rate(),
            exp_stone: default_exp_stone_rate(),
        }
    }
}

impl Default for SummonCost {
    fn default() -> Self {
        Self {
            resource: default_summon_resource(),
            amount: default_summon_amount(),
        }
    }
}

impl Default for GameContent {
    fn default() -> Self {
        Self {
            accrual: AccrualRates::default(),
            quests: default_quests(),
            unit_templates: default_unit_templates(),
            summon: SummonCost::default(),
        }
    }
}

impl GameContent {
    /// Load content from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let content: GameContent =
            toml::from_str(&raw).map_err(|e| GameError::Config(e.to_string()))?;
        content.validate()?;
        Ok(content)
    }

    pub fn validate(&self) -> Result<()> {
        let rates = &self.accrual;
        if rates.level_step <= 0 {
            return Err(GameError::Config("accrual.level_step must be positive".into()));
        }
        for (name, rate) in [
            ("exp", rates.exp),
            ("gold", rates.gold),
            ("exp_stone", rates.exp_stone),
        ] {
            if rate.base < 0 || rate.growth < 0 {
                return Err(GameError::Config(format!(
                    "accrual.{name} must not be negative"
                )));
            }
        }

        let mut seen = HashSet::new();
        for quest in &self.quests {
            if !seen.insert(quest.id) {
                return Err(GameError::Config(format!("duplicate quest id {}", quest.id)));
            }
            if quest.required < 1 || quest.reward.amount < 0 {
                return Err(GameError::Config(format!(
                    "quest {} needs required >= 1 and a non-negative reward",
                    quest.id
                )));
            }
        }
        if self.quest(SIGN_IN_QUEST_ID).is_none() {
            return Err(GameError::Config(format!(
                "sign-in quest {SIGN_IN_QUEST_ID} is not defined"
            )));
        }

        if self.unit_templates.is_empty() {
            return Err(GameError::Config("at least one unit template is required".into()));
        }
        if self.summon.amount <= 0 {
            return Err(GameError::Config("summon.amount must be positive".into()));
        }
        Ok(())
    }

    pub fn quest(&self, id: i64) -> Option<&DailyQuest> {
        self.quests.iter().find(|quest| quest.id == id)
    }
}
