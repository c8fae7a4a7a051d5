//! Proximity detection over remote players and AI ships.
//!
//! The detector rescans at a fixed cadence and replaces its list
//! wholesale; there is no incremental diffing. Range is inclusive:
//! a ship at exactly `range` is nearby, anything farther is not.

use serde::{Deserialize, Serialize};

use crate::session::{InteractionKind, ShipId};
use crate::ship::Ship;

/// Whether a nearby ship is another player or an AI ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactKind {
    Player,
    Ai,
}

/// One entry of the proximity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyShip {
    pub id: ShipId,
    pub kind: ContactKind,
    pub display_name: String,
}

impl NearbyShip {
    /// Interaction kinds offered against this ship. AI ships only fight.
    pub fn available_kinds(&self) -> &'static [InteractionKind] {
        match self.kind {
            ContactKind::Player => &InteractionKind::ALL,
            ContactKind::Ai => &[InteractionKind::Combat],
        }
    }

    pub fn offers(&self, kind: InteractionKind) -> bool {
        self.available_kinds().contains(&kind)
    }
}

pub fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt()
}

/// Ships within `range` of `local`, players first then AI, in input order.
pub fn scan<'a, P, A>(local: &Ship, players: P, ai_ships: A, range: f32) -> Vec<NearbyShip>
where
    P: IntoIterator<Item = &'a Ship>,
    A: IntoIterator<Item = &'a Ship>,
{
    players
        .into_iter()
        .chain(ai_ships)
        .filter(|s| s.id != local.id)
        .filter(|s| distance(local.x, local.y, s.x, s.y) <= range)
        .map(|s| NearbyShip {
            id: s.id,
            kind: if s.is_ai {
                ContactKind::Ai
            } else {
                ContactKind::Player
            },
            display_name: if s.is_ai {
                format!("{} (AI)", s.name)
            } else {
                s.name.clone()
            },
        })
        .collect()
}

/// Fixed-cadence proximity scanner holding the last computed list.
#[derive(Debug, Clone)]
pub struct ProximityDetector {
    range: f32,
    interval_ms: u64,
    last_scan_ms: Option<u64>,
    nearby: Vec<NearbyShip>,
}

impl ProximityDetector {
    pub fn new(range: f32, interval_ms: u64) -> Self {
        Self {
            range,
            interval_ms,
            last_scan_ms: None,
            nearby: Vec::new(),
        }
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_scan_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Rescan unconditionally and replace the list.
    pub fn rescan<'a, P, A>(
        &mut self,
        now_ms: u64,
        local: &Ship,
        players: P,
        ai_ships: A,
    ) -> &[NearbyShip]
    where
        P: IntoIterator<Item = &'a Ship>,
        A: IntoIterator<Item = &'a Ship>,
    {
        self.nearby = scan(local, players, ai_ships, self.range);
        self.last_scan_ms = Some(now_ms);
        &self.nearby
    }

    /// Last computed list.
    pub fn nearby(&self) -> &[NearbyShip] {
        &self.nearby
    }

    pub fn find(&self, id: ShipId) -> Option<&NearbyShip> {
        self.nearby.iter().find(|n| n.id == id)
    }
}
