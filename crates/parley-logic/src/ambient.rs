//! Random sea events raised while sailing.
//!
//! Effects go through the same clamped stat path as everything else and
//! never touch session records.

use rand::Rng;

use crate::ship::StatDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientEvent {
    pub text: &'static str,
    pub hull: i64,
    pub crew: i64,
    pub booty: i64,
}

impl AmbientEvent {
    const fn new(text: &'static str, hull: i64, crew: i64, booty: i64) -> Self {
        Self {
            text,
            hull,
            crew,
            booty,
        }
    }

    pub fn delta(&self) -> StatDelta {
        StatDelta {
            hull: self.hull,
            crew: self.crew,
            booty: self.booty,
            ..Default::default()
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.hull == 0 && self.crew == 0 && self.booty == 0
    }
}

pub const AMBIENT_EVENTS: &[AmbientEvent] = &[
    AmbientEvent::new("Rough waves! Hull takes 5 damage!", -5, 0, 0),
    AmbientEvent::new("A storm sweeps a crew member overboard!", 0, -1, 0),
    AmbientEvent::new("Ye find a floating barrel of rum! +2 crew!", 0, 2, 0),
    AmbientEvent::new("A sneaky kraken nicks yer hull! -10 hull!", -10, 0, 0),
    AmbientEvent::new("A rival pirate fires a warning shot! -3 hull!", -3, 0, 0),
    AmbientEvent::new("A mutiny brews! Lose 2 crew!", 0, -2, 0),
    AmbientEvent::new("A friendly merchant gifts ye supplies. +3 hull!", 3, 0, 0),
    AmbientEvent::new("Ye rescue a stranded sailor. +1 crew!", 0, 1, 0),
    AmbientEvent::new("A sea monster attacks! -4 hull, -1 crew!", -4, -1, 0),
    AmbientEvent::new("A mysterious fog rolls in. No effect.", 0, 0, 0),
    AmbientEvent::new("A pod of whales guides ye to safety. +2 hull!", 2, 0, 0),
    AmbientEvent::new("A shark bites yer hull! -8 hull!", -8, 0, 0),
    AmbientEvent::new("A pirate legend inspires yer crew! +3 crew!", 0, 3, 0),
    AmbientEvent::new("Merchant cargo floats by! +3 booty!", 0, 0, 3),
    AmbientEvent::new("A cursed idol surfaces! -2 crew, +4 booty!", 0, -2, 4),
    AmbientEvent::new("Ye discover a sunken treasure vault! +8 booty!", 0, 0, 8),
    AmbientEvent::new("An old naval mine goes off! -15 hull!", -15, 0, 0),
    AmbientEvent::new("A message in a bottle points to treasure! +5 booty!", 0, 0, 5),
    AmbientEvent::new("A mimic chest bites! -2 hull, +6 booty!", -2, 0, 6),
    AmbientEvent::new("Ye pay the sirens their tribute. -2 booty!", 0, 0, -2),
    AmbientEvent::new("A sudden calm. Nothing happens.", 0, 0, 0),
];

pub fn roll_ambient<R: Rng + ?Sized>(rng: &mut R) -> &'static AmbientEvent {
    &AMBIENT_EVENTS[rng.gen_range(0..AMBIENT_EVENTS.len())]
}
