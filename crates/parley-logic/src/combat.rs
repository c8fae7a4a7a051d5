//! Turn-alternating naval combat.
//!
//! A combat record is only ever written by the captain whose turn it is.
//! [`resolve_turn`] takes the last observed record and returns the full
//! replacement record. When an HP reaches zero the same record also carries
//! `completed` and the winner, so no snapshot shows HP 0 with combat active.
//!
//! ```
//! use parley_logic::combat::{resolve_turn, CombatRules, CombatSession};
//! use parley_logic::session::{InteractionKind, InteractionRequest, RequestPayload};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut request = InteractionRequest::new(1, 2, InteractionKind::Combat, RequestPayload::default());
//! request.id = 7;
//! let rules = CombatRules::default();
//! let session = CombatSession::open(&request, &rules);
//! let mut rng = StdRng::seed_from_u64(42);
//! let (next, _outcome) = resolve_turn(&session, 1, 0, &rules, &mut rng).unwrap();
//! assert_eq!(next.current_turn, 2);
//! assert_eq!(next.turn_number, 2);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::InvalidAction;
use crate::session::{InteractionRequest, Lifecycle, Phase, RecordId, ShipId};
use crate::ship::StatDelta;

/// What an action does when it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionEffect {
    /// Rolls accuracy, then damages the opponent.
    Damage,
    /// Logged only; no numeric effect.
    Defend,
    /// Heals the actor; never misses.
    Repair,
}

/// One entry of the combat action table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatAction {
    pub name: String,
    pub description: String,
    /// Inclusive damage (or heal) range.
    pub min: u32,
    pub max: u32,
    /// Hit probability in 0.0..=1.0 (only rolled for `Damage`).
    pub accuracy: f64,
    pub effect: ActionEffect,
}

impl CombatAction {
    fn new(name: &str, description: &str, min: u32, max: u32, accuracy: f64, effect: ActionEffect) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            min,
            max,
            accuracy,
            effect,
        }
    }
}

/// The standard broadside table.
pub fn default_actions() -> Vec<CombatAction> {
    use ActionEffect::*;
    vec![
        CombatAction::new("Cannon Blast", "Fire your main cannons", 15, 25, 0.7, Damage),
        CombatAction::new("Chain Shot", "Target their rigging", 8, 15, 0.8, Damage),
        CombatAction::new("Grape Shot", "Devastating but inaccurate crew attack", 20, 30, 0.5, Damage),
        CombatAction::new("Ramming Speed", "Risk everything for massive damage", 25, 35, 0.4, Damage),
        CombatAction::new("Defensive Maneuver", "Brace for the next volley", 0, 0, 1.0, Defend),
        CombatAction::new("Repair Hull", "Restore 10-20 hull points", 10, 20, 1.0, Repair),
    ]
}

/// Starting HP and the action table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatRules {
    pub starting_hp: u32,
    pub actions: Vec<CombatAction>,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            starting_hp: 100,
            actions: default_actions(),
        }
    }
}

/// Combat status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatStatus {
    Active,
    Completed,
}

impl CombatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Shared combat record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSession {
    /// Same id as the originating request.
    pub id: RecordId,
    pub player1_id: ShipId,
    pub player2_id: ShipId,
    pub current_turn: ShipId,
    pub player1_hp: u32,
    pub player2_hp: u32,
    pub turn_number: u32,
    pub combat_log: Vec<String>,
    pub status: CombatStatus,
    pub winner_id: Option<ShipId>,
    pub version: u64,
}

impl CombatSession {
    /// Initial record for an accepted request. The initiator shoots first.
    pub fn open(request: &InteractionRequest, rules: &CombatRules) -> Self {
        Self {
            id: request.id,
            player1_id: request.initiator_id,
            player2_id: request.target_id,
            current_turn: request.initiator_id,
            player1_hp: rules.starting_hp,
            player2_hp: rules.starting_hp,
            turn_number: 1,
            combat_log: vec!["Combat begins! Player 1 fires first.".to_string()],
            status: CombatStatus::Active,
            winner_id: None,
            version: 0,
        }
    }

    pub fn hp_of(&self, ship: ShipId) -> Option<u32> {
        if ship == self.player1_id {
            Some(self.player1_hp)
        } else if ship == self.player2_id {
            Some(self.player2_hp)
        } else {
            None
        }
    }

    pub fn is_turn_of(&self, ship: ShipId) -> bool {
        self.status == CombatStatus::Active && self.current_turn == ship
    }

    fn hp_mut(&mut self, ship: ShipId) -> &mut u32 {
        if ship == self.player1_id {
            &mut self.player1_hp
        } else {
            &mut self.player2_hp
        }
    }
}

impl Lifecycle for CombatSession {
    fn record_id(&self) -> RecordId {
        self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn participants(&self) -> (ShipId, ShipId) {
        (self.player1_id, self.player2_id)
    }
    fn phase(&self) -> Phase {
        match self.status {
            CombatStatus::Active => Phase::Active,
            CombatStatus::Completed => Phase::Completed,
        }
    }
}

/// What a single turn did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Miss,
    Hit { damage: u32 },
    Repaired { amount: u32 },
    Defended,
}

/// Resolve `actor`'s chosen action against the last observed record.
///
/// Returns the full replacement record. The caller writes it predicated on
/// `session.version`.
pub fn resolve_turn<R: Rng + ?Sized>(
    session: &CombatSession,
    actor: ShipId,
    action_index: usize,
    rules: &CombatRules,
    rng: &mut R,
) -> Result<(CombatSession, TurnOutcome), InvalidAction> {
    let opponent = session
        .counterpart_of(actor)
        .ok_or(InvalidAction::NotParticipant(actor))?;
    if session.status == CombatStatus::Completed {
        return Err(InvalidAction::SessionClosed);
    }
    if session.current_turn != actor {
        return Err(InvalidAction::NotYourTurn);
    }
    let action = rules
        .actions
        .get(action_index)
        .ok_or(InvalidAction::UnknownAction(action_index))?;

    let mut next = session.clone();
    let (outcome, line) = match action.effect {
        ActionEffect::Damage => {
            let hit = rng.gen::<f64>() < action.accuracy;
            if hit {
                let damage = roll(rng, action.min, action.max);
                let hp = next.hp_mut(opponent);
                *hp = hp.saturating_sub(damage);
                (
                    TurnOutcome::Hit { damage },
                    format!("{} hits for {} damage!", action.name, damage),
                )
            } else {
                (TurnOutcome::Miss, format!("{} missed!", action.name))
            }
        }
        ActionEffect::Repair => {
            let amount = roll(rng, action.min, action.max);
            let hp = next.hp_mut(actor);
            // A hull already above the cap keeps what it has.
            let healed = hp.saturating_add(amount).min(rules.starting_hp.max(*hp));
            let gained = healed - *hp;
            *hp = healed;
            (
                TurnOutcome::Repaired { amount: gained },
                format!("Repaired hull for {} points!", gained),
            )
        }
        ActionEffect::Defend => (
            TurnOutcome::Defended,
            format!("{} - the crew braces for the next volley.", action.name),
        ),
    };
    next.combat_log.push(line);
    next.current_turn = opponent;
    next.turn_number += 1;

    if next.player1_hp == 0 {
        next.status = CombatStatus::Completed;
        next.winner_id = Some(next.player2_id);
        next.combat_log.push("Player 2 wins the battle!".to_string());
    } else if next.player2_hp == 0 {
        next.status = CombatStatus::Completed;
        next.winner_id = Some(next.player1_id);
        next.combat_log.push("Player 1 wins the battle!".to_string());
    }

    Ok((next, outcome))
}

fn roll<R: Rng + ?Sized>(rng: &mut R, min: u32, max: u32) -> u32 {
    if max <= min {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

/// Stat consequences of a finished battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatRewards {
    pub winner_booty: i64,
    pub winner_hull: i64,
    pub loser_booty: i64,
    pub loser_hull: i64,
}

impl Default for CombatRewards {
    fn default() -> Self {
        Self {
            winner_booty: 10,
            winner_hull: -5,
            loser_booty: -5,
            loser_hull: -15,
        }
    }
}

/// The delta `me` applies to its own stats once combat is completed.
///
/// `None` while combat is still active or when `me` didn't fight. Each
/// side computes only its own delta from the shared terminal record.
pub fn outcome_delta(session: &CombatSession, me: ShipId, rewards: &CombatRewards) -> Option<StatDelta> {
    if session.status != CombatStatus::Completed || !session.involves(me) {
        return None;
    }
    let won = session.winner_id == Some(me);
    Some(if won {
        StatDelta {
            booty: rewards.winner_booty,
            hull: rewards.winner_hull,
            combat_wins: 1,
            ..Default::default()
        }
    } else {
        StatDelta {
            booty: rewards.loser_booty,
            hull: rewards.loser_hull,
            combat_losses: 1,
            ..Default::default()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InteractionKind, RequestPayload};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session() -> CombatSession {
        let mut req = InteractionRequest::new(1, 2, InteractionKind::Combat, RequestPayload::default());
        req.id = 11;
        CombatSession::open(&req, &CombatRules::default())
    }

    fn sure_shot(damage: u32) -> CombatRules {
        CombatRules {
            starting_hp: 100,
            actions: vec![CombatAction::new("Broadside", "", damage, damage, 1.0, ActionEffect::Damage)],
        }
    }

    #[test]
    fn open_gives_initiator_first_turn() {
        let s = session();
        assert_eq!(s.id, 11);
        assert_eq!(s.current_turn, 1);
        assert_eq!((s.player1_hp, s.player2_hp), (100, 100));
        assert_eq!(s.status, CombatStatus::Active);
    }

    #[test]
    fn out_of_turn_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = resolve_turn(&session(), 2, 0, &CombatRules::default(), &mut rng).unwrap_err();
        assert_eq!(err, InvalidAction::NotYourTurn);
    }

    #[test]
    fn outsider_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = resolve_turn(&session(), 3, 0, &CombatRules::default(), &mut rng).unwrap_err();
        assert_eq!(err, InvalidAction::NotParticipant(3));
    }

    #[test]
    fn unknown_action_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = resolve_turn(&session(), 1, 99, &CombatRules::default(), &mut rng).unwrap_err();
        assert_eq!(err, InvalidAction::UnknownAction(99));
    }

    #[test]
    fn hit_damages_opponent_only() {
        let rules = sure_shot(30);
        let mut rng = StdRng::seed_from_u64(1);
        let (next, outcome) = resolve_turn(&session(), 1, 0, &rules, &mut rng).unwrap();
        assert_eq!(outcome, TurnOutcome::Hit { damage: 30 });
        assert_eq!(next.player1_hp, 100);
        assert_eq!(next.player2_hp, 70);
        assert_eq!(next.current_turn, 2);
        assert!(next.combat_log.last().unwrap().contains("30 damage"));
    }

    #[test]
    fn miss_changes_no_hp_but_passes_turn() {
        let rules = CombatRules {
            starting_hp: 100,
            actions: vec![CombatAction::new("Blind Shot", "", 10, 10, 0.0, ActionEffect::Damage)],
        };
        let mut rng = StdRng::seed_from_u64(5);
        let (next, outcome) = resolve_turn(&session(), 1, 0, &rules, &mut rng).unwrap();
        assert_eq!(outcome, TurnOutcome::Miss);
        assert_eq!((next.player1_hp, next.player2_hp), (100, 100));
        assert_eq!(next.current_turn, 2);
    }

    #[test]
    fn repair_heals_actor_capped() {
        let rules = CombatRules::default();
        let mut s = session();
        s.player1_hp = 95;
        let mut rng = StdRng::seed_from_u64(9);
        let (next, outcome) = resolve_turn(&s, 1, 5, &rules, &mut rng).unwrap();
        assert_eq!(next.player1_hp, 100);
        assert_eq!(outcome, TurnOutcome::Repaired { amount: 5 });
        assert_eq!(next.player2_hp, 100);
    }

    #[test]
    fn repair_never_lowers_hp_above_cap() {
        let opened_under = CombatRules {
            starting_hp: 150,
            ..CombatRules::default()
        };
        let mut req = InteractionRequest::new(1, 2, InteractionKind::Combat, RequestPayload::default());
        req.id = 12;
        let mut s = CombatSession::open(&req, &opened_under);
        s.player1_hp = 120;
        let mut rng = StdRng::seed_from_u64(4);
        let (next, outcome) = resolve_turn(&s, 1, 5, &CombatRules::default(), &mut rng).unwrap();
        assert_eq!(next.player1_hp, 120);
        assert_eq!(outcome, TurnOutcome::Repaired { amount: 0 });
        assert_eq!(next.current_turn, 2);
    }

    #[test]
    fn repair_within_range() {
        let rules = CombatRules::default();
        for seed in 0..50 {
            let mut s = session();
            s.player1_hp = 40;
            let mut rng = StdRng::seed_from_u64(seed);
            let (next, _) = resolve_turn(&s, 1, 5, &rules, &mut rng).unwrap();
            assert!((50..=60).contains(&next.player1_hp));
        }
    }

    #[test]
    fn defend_is_logged_without_numeric_change() {
        let rules = CombatRules::default();
        let mut rng = StdRng::seed_from_u64(3);
        let (next, outcome) = resolve_turn(&session(), 1, 4, &rules, &mut rng).unwrap();
        assert_eq!(outcome, TurnOutcome::Defended);
        assert_eq!((next.player1_hp, next.player2_hp), (100, 100));
        assert_eq!(next.combat_log.len(), 2);
    }

    #[test]
    fn lethal_hit_completes_in_same_record() {
        let rules = sure_shot(60);
        let mut s = session();
        s.player2_hp = 50;
        let mut rng = StdRng::seed_from_u64(1);
        let (next, _) = resolve_turn(&s, 1, 0, &rules, &mut rng).unwrap();
        assert_eq!(next.player2_hp, 0);
        assert_eq!(next.status, CombatStatus::Completed);
        assert_eq!(next.winner_id, Some(1));
        assert_eq!(next.combat_log.last().unwrap(), "Player 1 wins the battle!");
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            resolve_turn(&next, 2, 0, &rules, &mut rng).unwrap_err(),
            InvalidAction::SessionClosed
        );
    }

    #[test]
    fn damage_within_inclusive_range() {
        let rules = CombatRules {
            starting_hp: 100,
            actions: vec![CombatAction::new("Cannon", "", 15, 25, 1.0, ActionEffect::Damage)],
        };
        let mut seen_min = false;
        let mut seen_max = false;
        for seed in 0..400 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (next, _) = resolve_turn(&session(), 1, 0, &rules, &mut rng).unwrap();
            let dealt = 100 - next.player2_hp;
            assert!((15..=25).contains(&dealt));
            seen_min |= dealt == 15;
            seen_max |= dealt == 25;
        }
        assert!(seen_min && seen_max);
    }

    #[test]
    fn rewards_are_asymmetric() {
        let rules = sure_shot(100);
        let mut rng = StdRng::seed_from_u64(1);
        let (done, _) = resolve_turn(&session(), 1, 0, &rules, &mut rng).unwrap();
        let rewards = CombatRewards::default();
        let win = outcome_delta(&done, 1, &rewards).unwrap();
        let lose = outcome_delta(&done, 2, &rewards).unwrap();
        assert_eq!((win.booty, win.hull, win.combat_wins), (10, -5, 1));
        assert_eq!((lose.booty, lose.hull, lose.combat_losses), (-5, -15, 1));
        assert!(outcome_delta(&done, 3, &rewards).is_none());
        assert!(outcome_delta(&session(), 1, &rewards).is_none());
    }
}
