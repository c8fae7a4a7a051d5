//! AI ships: where they are, and how the initiator's client plays them.
//!
//! AI ships have no client of their own. A combat request against one is
//! accepted on the spot by the initiating client, which then takes the AI's
//! turns through the same combat handler. AI stats are never persisted.

use parley_logic::combat::{ActionEffect, CombatRules};
use parley_logic::config::AiConfig;
use parley_logic::error::InteractionError;
use parley_logic::session::{InteractionRequest, RequestStatus, ShipId};
use parley_logic::ship::Ship;
use rand::Rng;

use crate::store::{replace, SessionStore};

/// Source of AI ship positions.
pub trait AiFleet {
    fn ships(&self) -> Vec<Ship>;

    fn is_ai(&self, id: ShipId) -> bool {
        self.ships().iter().any(|s| s.id == id)
    }
}

/// A fixed set of AI ships, moved by hand.
#[derive(Debug, Clone, Default)]
pub struct StaticFleet {
    ships: Vec<Ship>,
}

impl StaticFleet {
    pub fn new(ships: Vec<Ship>) -> Self {
        Self { ships }
    }

    pub fn place(&mut self, id: ShipId, x: f32, y: f32) {
        if let Some(ship) = self.ships.iter_mut().find(|s| s.id == id) {
            ship.x = x;
            ship.y = y;
        }
    }
}

impl AiFleet for StaticFleet {
    fn ships(&self) -> Vec<Ship> {
        self.ships.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AiHelm {
    config: AiConfig,
}

impl AiHelm {
    pub fn new(config: AiConfig) -> Self {
        Self { config }
    }

    /// Accept `request` on the AI's behalf.
    pub fn accept(&self, request: &InteractionRequest, store: &dyn SessionStore) -> Result<InteractionRequest, InteractionError> {
        let accepted = request.transition(RequestStatus::Active)?;
        let written = replace(store, accepted, request.version)?;
        log::info!("AI ship {} accepts request {}", written.target_id, written.id);
        Ok(written)
    }

    /// Pick the AI's next action: patch the hull when low, otherwise
    /// usually the heaviest gun, sometimes any gun.
    pub fn choose_action<R: Rng + ?Sized>(&self, hp: u32, rules: &CombatRules, rng: &mut R) -> Option<usize> {
        let indexed = || rules.actions.iter().enumerate();
        if hp < self.config.repair_below_hp {
            if let Some((i, _)) = indexed().find(|(_, a)| a.effect == ActionEffect::Repair) {
                return Some(i);
            }
        }
        let guns: Vec<usize> = indexed()
            .filter(|(_, a)| a.effect == ActionEffect::Damage)
            .map(|(i, _)| i)
            .collect();
        if guns.is_empty() {
            return if rules.actions.is_empty() { None } else { Some(0) };
        }
        if rng.gen::<f64>() < self.config.aggression {
            guns.iter().copied().max_by_key(|i| rules.actions[*i].max)
        } else {
            Some(guns[rng.gen_range(0..guns.len())])
        }
    }
}
