//! Combat handler: plays turns and settles the outcome once.

use parley_logic::combat::{outcome_delta, resolve_turn, CombatRewards, CombatRules, CombatSession, CombatStatus};
use parley_logic::error::{InteractionError, StoreError};
use parley_logic::session::{InteractionRequest, RecordId, RequestStatus, ShipId};
use rand::Rng;

use super::{write_rebased, Effect};
use crate::store::{fetch, insert_if_absent, SessionStore};
use crate::ui::UiEvent;

#[derive(Debug, Clone)]
pub struct CombatHandler {
    me: ShipId,
    session: CombatSession,
    rewarded: bool,
}

impl CombatHandler {
    /// Create the combat record, or adopt the one the peer already made.
    pub fn open(
        request: &InteractionRequest,
        me: ShipId,
        rules: &CombatRules,
        store: &dyn SessionStore,
    ) -> Result<Self, StoreError> {
        let session = insert_if_absent(store, CombatSession::open(request, rules))?;
        Ok(Self {
            me,
            session,
            rewarded: false,
        })
    }

    pub fn id(&self) -> RecordId {
        self.session.id
    }

    pub fn session(&self) -> &CombatSession {
        &self.session
    }

    pub fn is_my_turn(&self) -> bool {
        self.session.is_turn_of(self.me)
    }

    /// Play `action_index` as `actor` (the local captain, or an AI ship
    /// this client steers).
    #[allow(clippy::too_many_arguments)]
    pub fn act<R: Rng>(
        &mut self,
        actor: ShipId,
        action_index: usize,
        rules: &CombatRules,
        rewards: &CombatRewards,
        max_rebases: u32,
        store: &dyn SessionStore,
        rng: &mut R,
    ) -> Result<Vec<Effect>, InteractionError> {
        let written = write_rebased(store, &self.session, max_rebases, |latest| {
            resolve_turn(latest, actor, action_index, rules, &mut *rng).map(|(next, _)| next)
        })?;
        if let Some(line) = written.combat_log.last() {
            log::info!("combat {} turn {}: {}", written.id, written.turn_number - 1, line);
        }
        Ok(self.observe(written, rewards))
    }

    /// Take in a delivered record. Stale and repeated deliveries are dropped.
    pub fn observe(&mut self, session: CombatSession, rewards: &CombatRewards) -> Vec<Effect> {
        if session.version <= self.session.version {
            log::debug!(
                "combat {} ignoring v{} (have v{})",
                session.id,
                session.version,
                self.session.version
            );
            return Vec::new();
        }
        self.session = session;
        let mut effects = vec![Effect::Render(UiEvent::Combat(self.session.clone()))];
        effects.extend(self.settle(rewards));
        effects
    }

    /// Read the latest record and take it in.
    pub fn sync(&mut self, rewards: &CombatRewards, store: &dyn SessionStore) -> Result<Vec<Effect>, StoreError> {
        let latest = fetch(store, self.session.id)?;
        Ok(self.observe(latest, rewards))
    }

    fn settle(&mut self, rewards: &CombatRewards) -> Vec<Effect> {
        if self.session.status != CombatStatus::Completed || self.rewarded {
            return Vec::new();
        }
        self.rewarded = true;
        let mut effects = Vec::new();
        if let Some(delta) = outcome_delta(&self.session, self.me, rewards) {
            let won = self.session.winner_id == Some(self.me);
            log::info!("combat {} over, {}", self.session.id, if won { "victory" } else { "defeat" });
            effects.push(Effect::ApplyDelta {
                delta,
                reason: if won {
                    "Victory! Plunder taken.".to_string()
                } else {
                    "Defeat! Yer ship limps away.".to_string()
                },
            });
        }
        effects.push(Effect::Close(RequestStatus::Completed));
        effects
    }
}
