//! Ship stats, trade resources, and clamped stat mutation.
//!
//! A ship's `hull`, `crew`, `booty` and cargo counts are unsigned and every
//! mutation goes through [`ShipStats::apply`], which clamps at zero and caps
//! hull at `max_hull`. Handlers never write stats directly; they compute a
//! [`StatDelta`], apply it locally, and send the changed fields as a
//! [`StatPatch`] through the player's own stat-update path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::session::ShipId;

/// Hull points restored by one "Hull Repairs" kit.
pub const HULL_PER_REPAIR_KIT: u32 = 10;

/// Default hull cap.
pub const DEFAULT_MAX_HULL: u32 = 100;

/// Tradeable goods. The first three map onto ship stats; the rest live in cargo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resource {
    GoldCoins,
    CrewMembers,
    HullRepairs,
    RumBarrels,
    CannonBalls,
    TreasureMaps,
    Spices,
    Silk,
    Pearls,
}

/// Where a resource is held on the ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holding {
    Booty,
    Crew,
    /// Counted in kits; each kit is `HULL_PER_REPAIR_KIT` hull.
    HullKits,
    Cargo,
}

impl Resource {
    pub const ALL: [Resource; 9] = [
        Resource::GoldCoins,
        Resource::CrewMembers,
        Resource::HullRepairs,
        Resource::RumBarrels,
        Resource::CannonBalls,
        Resource::TreasureMaps,
        Resource::Spices,
        Resource::Silk,
        Resource::Pearls,
    ];

    pub fn holding(self) -> Holding {
        match self {
            Resource::GoldCoins => Holding::Booty,
            Resource::CrewMembers => Holding::Crew,
            Resource::HullRepairs => Holding::HullKits,
            _ => Holding::Cargo,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Resource::GoldCoins => "Gold Coins",
            Resource::CrewMembers => "Crew Members",
            Resource::HullRepairs => "Hull Repairs",
            Resource::RumBarrels => "Rum Barrels",
            Resource::CannonBalls => "Cannon Balls",
            Resource::TreasureMaps => "Treasure Maps",
            Resource::Spices => "Spices",
            Resource::Silk => "Silk",
            Resource::Pearls => "Pearls",
        }
    }
}

/// Persisted per-player stats. Never negative by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipStats {
    pub hull: u32,
    pub max_hull: u32,
    pub crew: u32,
    pub booty: u32,
    #[serde(default)]
    pub cargo: BTreeMap<Resource, u32>,
    #[serde(default)]
    pub combat_wins: u32,
    #[serde(default)]
    pub combat_losses: u32,
    #[serde(default)]
    pub trades_completed: u32,
}

impl Default for ShipStats {
    fn default() -> Self {
        Self {
            hull: DEFAULT_MAX_HULL,
            max_hull: DEFAULT_MAX_HULL,
            crew: 10,
            booty: 0,
            cargo: BTreeMap::new(),
            combat_wins: 0,
            combat_losses: 0,
            trades_completed: 0,
        }
    }
}

/// Signed change to a ship's stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatDelta {
    pub hull: i64,
    pub crew: i64,
    pub booty: i64,
    pub cargo: BTreeMap<Resource, i64>,
    pub combat_wins: u32,
    pub combat_losses: u32,
    pub trades_completed: u32,
}

impl StatDelta {
    pub fn is_empty(&self) -> bool {
        self.hull == 0
            && self.crew == 0
            && self.booty == 0
            && self.cargo.values().all(|v| *v == 0)
            && self.combat_wins == 0
            && self.combat_losses == 0
            && self.trades_completed == 0
    }

    /// Add `qty` units of `resource` (negative to remove).
    pub fn add_resource(&mut self, resource: Resource, qty: i64) {
        match resource.holding() {
            Holding::Booty => self.booty += qty,
            Holding::Crew => self.crew += qty,
            Holding::HullKits => self.hull += qty * HULL_PER_REPAIR_KIT as i64,
            Holding::Cargo => *self.cargo.entry(resource).or_insert(0) += qty,
        }
    }
}

fn clamp_add(value: u32, delta: i64, max: u32) -> u32 {
    (value as i64 + delta).clamp(0, max as i64) as u32
}

impl ShipStats {
    /// New stats with `delta` applied, clamped into valid ranges.
    pub fn apply(&self, delta: &StatDelta) -> ShipStats {
        let mut next = self.clone();
        next.hull = clamp_add(self.hull, delta.hull, self.max_hull);
        next.crew = clamp_add(self.crew, delta.crew, u32::MAX);
        next.booty = clamp_add(self.booty, delta.booty, u32::MAX);
        for (resource, qty) in &delta.cargo {
            let held = self.cargo.get(resource).copied().unwrap_or(0);
            let after = clamp_add(held, *qty, u32::MAX);
            if after == 0 {
                next.cargo.remove(resource);
            } else {
                next.cargo.insert(*resource, after);
            }
        }
        next.combat_wins = self.combat_wins.saturating_add(delta.combat_wins);
        next.combat_losses = self.combat_losses.saturating_add(delta.combat_losses);
        next.trades_completed = self.trades_completed.saturating_add(delta.trades_completed);
        next
    }

    /// How many units of `resource` this ship can offer.
    pub fn available(&self, resource: Resource) -> u32 {
        match resource.holding() {
            Holding::Booty => self.booty,
            Holding::Crew => self.crew,
            Holding::HullKits => self.hull / HULL_PER_REPAIR_KIT,
            Holding::Cargo => self.cargo.get(&resource).copied().unwrap_or(0),
        }
    }

    /// Apply a patch received from the store.
    pub fn patched(&self, patch: &StatPatch) -> ShipStats {
        let mut next = self.clone();
        if let Some(v) = patch.hull {
            next.hull = v.min(self.max_hull);
        }
        if let Some(v) = patch.crew {
            next.crew = v;
        }
        if let Some(v) = patch.booty {
            next.booty = v;
        }
        if let Some(ref cargo) = patch.cargo {
            next.cargo = cargo.iter().filter(|(_, q)| **q > 0).map(|(r, q)| (*r, *q)).collect();
        }
        if let Some(v) = patch.combat_wins {
            next.combat_wins = v;
        }
        if let Some(v) = patch.combat_losses {
            next.combat_losses = v;
        }
        if let Some(v) = patch.trades_completed {
            next.trades_completed = v;
        }
        next
    }
}

/// Partial stat update: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatPatch {
    pub hull: Option<u32>,
    pub crew: Option<u32>,
    pub booty: Option<u32>,
    pub cargo: Option<BTreeMap<Resource, u32>>,
    pub combat_wins: Option<u32>,
    pub combat_losses: Option<u32>,
    pub trades_completed: Option<u32>,
}

impl StatPatch {
    /// The fields that differ between `before` and `after`.
    pub fn between(before: &ShipStats, after: &ShipStats) -> StatPatch {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            if a == b {
                None
            } else {
                Some(b.clone())
            }
        }
        StatPatch {
            hull: changed(&before.hull, &after.hull),
            crew: changed(&before.crew, &after.crew),
            booty: changed(&before.booty, &after.booty),
            cargo: changed(&before.cargo, &after.cargo),
            combat_wins: changed(&before.combat_wins, &after.combat_wins),
            combat_losses: changed(&before.combat_losses, &after.combat_losses),
            trades_completed: changed(&before.trades_completed, &after.trades_completed),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StatPatch::default()
    }
}

/// A ship as seen by the world: identity, position, stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub id: ShipId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub is_ai: bool,
    pub stats: ShipStats,
    /// Store version of the pirate row (0 for AI ships, which aren't stored).
    #[serde(default)]
    pub version: u64,
}

impl Ship {
    pub fn new(id: ShipId, name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
            is_ai: false,
            stats: ShipStats::default(),
            version: 0,
        }
    }

    pub fn ai(id: ShipId, name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            is_ai: true,
            ..Self::new(id, name, x, y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_clamps_at_zero() {
        let stats = ShipStats {
            hull: 10,
            crew: 2,
            booty: 3,
            ..Default::default()
        };
        let delta = StatDelta {
            hull: -50,
            crew: -5,
            booty: -5,
            ..Default::default()
        };
        let after = stats.apply(&delta);
        assert_eq!(after.hull, 0);
        assert_eq!(after.crew, 0);
        assert_eq!(after.booty, 0);
    }

    #[test]
    fn apply_caps_hull_at_max() {
        let stats = ShipStats {
            hull: 95,
            ..Default::default()
        };
        let mut delta = StatDelta::default();
        delta.add_resource(Resource::HullRepairs, 2);
        assert_eq!(delta.hull, 20);
        assert_eq!(stats.apply(&delta).hull, 100);
    }

    #[test]
    fn cargo_entries_removed_at_zero() {
        let mut stats = ShipStats::default();
        stats.cargo.insert(Resource::Pearls, 2);
        let mut delta = StatDelta::default();
        delta.add_resource(Resource::Pearls, -5);
        let after = stats.apply(&delta);
        assert!(!after.cargo.contains_key(&Resource::Pearls));
        assert_eq!(after.available(Resource::Pearls), 0);
    }

    #[test]
    fn hull_kits_available_in_tens() {
        let stats = ShipStats {
            hull: 47,
            ..Default::default()
        };
        assert_eq!(stats.available(Resource::HullRepairs), 4);
    }

    #[test]
    fn patch_between_only_changed_fields() {
        let before = ShipStats::default();
        let mut after = before.clone();
        after.booty = 10;
        let patch = StatPatch::between(&before, &after);
        assert_eq!(patch.booty, Some(10));
        assert_eq!(patch.hull, None);
        assert_eq!(before.patched(&patch), after);
        assert!(StatPatch::between(&before, &before).is_empty());
    }

    #[test]
    fn resources_serialize_by_name() {
        let mut offer = BTreeMap::new();
        offer.insert(Resource::GoldCoins, 10u32);
        assert_eq!(serde_json::to_string(&offer).unwrap(), r#"{"GoldCoins":10}"#);
    }
}
