//! Tunables for proximity, sessions, combat, trade, chat and movement.
//!
//! Every section has a `Default` matching the live game, and every field is
//! `#[serde(default)]`, so a JSON file only needs the values it overrides.
//!
//! ```
//! use parley_logic::config::{validate_config, ParleyConfig};
//!
//! let config = ParleyConfig::from_json(r#"{ "interaction_range": 12.0 }"#).unwrap();
//! assert_eq!(config.interaction_range, 12.0);
//! assert_eq!(config.max_open_sessions, 3);
//! assert!(validate_config(&config).is_empty());
//! ```

use serde::{Deserialize, Serialize};

use crate::combat::{ActionEffect, CombatRewards, CombatRules};
use crate::movement::MovementConfig;
use crate::trade::TradePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Typing indicator stops after this long without input.
    pub typing_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_timeout_ms: 2000,
        }
    }
}

/// How the initiator's client plays an AI opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Repair instead of attacking below this HP.
    pub repair_below_hp: u32,
    /// Chance (0.0..=1.0) of picking the heaviest-hitting action.
    pub aggression: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            repair_below_hp: 30,
            aggression: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Inclusive proximity radius in world units.
    pub interaction_range: f32,
    pub proximity_interval_ms: u64,
    /// Concurrent sessions one client may hold open.
    pub max_open_sessions: usize,
    /// Rebase attempts after a version conflict before giving up.
    pub max_rebase_attempts: u32,
    pub movement: MovementConfig,
    pub combat: CombatRules,
    pub rewards: CombatRewards,
    pub trade: TradePolicy,
    pub chat: ChatConfig,
    pub ai: AiConfig,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            interaction_range: 8.0,
            proximity_interval_ms: 1000,
            max_open_sessions: 3,
            max_rebase_attempts: 3,
            movement: MovementConfig::default(),
            combat: CombatRules::default(),
            rewards: CombatRewards::default(),
            trade: TradePolicy::default(),
            chat: ChatConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl ParleyConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Proximity radius must be positive.
    NonPositiveRange(f32),
    /// A cadence of zero would fire every frame.
    ZeroInterval(&'static str),
    /// At least one session must be allowed.
    NoSessionSlots,
    NoCombatActions,
    ZeroStartingHp,
    /// Accuracy outside 0.0..=1.0.
    InvalidAccuracy { action: String, accuracy: f64 },
    /// Action range with `min > max`.
    InvertedRange { action: String, min: u32, max: u32 },
    /// A damage action that can never deal damage.
    HarmlessDamage(String),
    NonPositiveSpeed(f32),
    EmptyOcean,
    InvalidAggression(f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NonPositiveRange(r) => write!(f, "interaction_range must be > 0 (got {})", r),
            ConfigError::ZeroInterval(name) => write!(f, "{} must be > 0", name),
            ConfigError::NoSessionSlots => write!(f, "max_open_sessions must be at least 1"),
            ConfigError::NoCombatActions => write!(f, "combat action table is empty"),
            ConfigError::ZeroStartingHp => write!(f, "combat starting_hp must be > 0"),
            ConfigError::InvalidAccuracy { action, accuracy } => {
                write!(f, "{}: accuracy {} outside 0.0..=1.0", action, accuracy)
            }
            ConfigError::InvertedRange { action, min, max } => {
                write!(f, "{}: min {} exceeds max {}", action, min, max)
            }
            ConfigError::HarmlessDamage(action) => write!(f, "{}: damage action with max 0", action),
            ConfigError::NonPositiveSpeed(s) => write!(f, "ship_speed must be > 0 (got {})", s),
            ConfigError::EmptyOcean => write!(f, "ocean dimensions must be positive"),
            ConfigError::InvalidAggression(a) => write!(f, "ai aggression {} outside 0.0..=1.0", a),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &ParleyConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if !(config.interaction_range > 0.0) {
        errors.push(ConfigError::NonPositiveRange(config.interaction_range));
    }
    let intervals = [
        ("proximity_interval_ms", config.proximity_interval_ms),
        ("movement.commit_interval_ms", config.movement.commit_interval_ms),
        ("movement.ambient_interval_ms", config.movement.ambient_interval_ms),
        ("chat.typing_timeout_ms", config.chat.typing_timeout_ms),
    ];
    for (name, value) in intervals {
        if value == 0 {
            errors.push(ConfigError::ZeroInterval(name));
        }
    }
    if config.max_open_sessions == 0 {
        errors.push(ConfigError::NoSessionSlots);
    }

    if config.combat.actions.is_empty() {
        errors.push(ConfigError::NoCombatActions);
    }
    if config.combat.starting_hp == 0 {
        errors.push(ConfigError::ZeroStartingHp);
    }
    for action in &config.combat.actions {
        if !(0.0..=1.0).contains(&action.accuracy) {
            errors.push(ConfigError::InvalidAccuracy {
                action: action.name.clone(),
                accuracy: action.accuracy,
            });
        }
        if action.min > action.max {
            errors.push(ConfigError::InvertedRange {
                action: action.name.clone(),
                min: action.min,
                max: action.max,
            });
        }
        if action.effect == ActionEffect::Damage && action.max == 0 {
            errors.push(ConfigError::HarmlessDamage(action.name.clone()));
        }
    }

    if !(config.movement.ship_speed > 0.0) {
        errors.push(ConfigError::NonPositiveSpeed(config.movement.ship_speed));
    }
    if !(config.movement.ocean_width > 0.0 && config.movement.ocean_height > 0.0) {
        errors.push(ConfigError::EmptyOcean);
    }
    if !(0.0..=1.0).contains(&config.ai.aggression) {
        errors.push(ConfigError::InvalidAggression(config.ai.aggression));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::CombatAction;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ParleyConfig::default()).is_empty());
    }

    #[test]
    fn default_values() {
        let c = ParleyConfig::default();
        assert_eq!(c.interaction_range, 8.0);
        assert_eq!(c.proximity_interval_ms, 1000);
        assert_eq!(c.max_rebase_attempts, 3);
        assert_eq!(c.combat.starting_hp, 100);
        assert_eq!(c.combat.actions.len(), 6);
        assert_eq!(c.movement.commit_interval_ms, 1000);
        assert_eq!(c.movement.ambient_interval_ms, 15_000);
        assert_eq!(c.chat.typing_timeout_ms, 2000);
        assert!(!c.trade.allow_gifts);
    }

    #[test]
    fn collects_every_error() {
        let mut c = ParleyConfig::default();
        c.interaction_range = 0.0;
        c.max_open_sessions = 0;
        c.proximity_interval_ms = 0;
        c.ai.aggression = 1.5;
        let errors = validate_config(&c);
        assert!(errors.contains(&ConfigError::NonPositiveRange(0.0)));
        assert!(errors.contains(&ConfigError::NoSessionSlots));
        assert!(errors.contains(&ConfigError::ZeroInterval("proximity_interval_ms")));
        assert!(errors.contains(&ConfigError::InvalidAggression(1.5)));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn bad_actions_rejected() {
        let mut c = ParleyConfig::default();
        c.combat.actions = vec![
            CombatAction {
                name: "Wild".into(),
                description: String::new(),
                min: 30,
                max: 10,
                accuracy: 1.2,
                effect: ActionEffect::Damage,
            },
            CombatAction {
                name: "Blank".into(),
                description: String::new(),
                min: 0,
                max: 0,
                accuracy: 0.5,
                effect: ActionEffect::Damage,
            },
        ];
        let errors = validate_config(&c);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ConfigError::HarmlessDamage("Blank".into())));
    }

    #[test]
    fn nan_range_rejected() {
        let mut c = ParleyConfig::default();
        c.interaction_range = f32::NAN;
        assert_eq!(validate_config(&c).len(), 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = ParleyConfig::from_json(r#"{ "trade": { "allow_gifts": true }, "chat": {} }"#).unwrap();
        assert!(c.trade.allow_gifts);
        assert_eq!(c.chat.typing_timeout_ms, 2000);
        assert_eq!(c.combat, CombatRules::default());
    }

    #[test]
    fn json_round_trip() {
        let c = ParleyConfig::default();
        let back = ParleyConfig::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(back, c);
    }
}
