//! Trade handler: edits one side of the offer, commits once both sides
//! approve, and settles the local captain's half exactly once.
//!
//! Whichever client first sees both approvals in one snapshot writes
//! `completed` against that snapshot's version. The other client's commit
//! loses the version race and it settles on seeing `completed` instead.

use parley_logic::error::{InteractionError, InvalidAction, StoreError};
use parley_logic::session::{InteractionRequest, RecordId, RequestStatus, ShipId};
use parley_logic::ship::{Resource, ShipStats};
use parley_logic::trade::{
    check_approval, settlement_delta, validate_offer, Offer, TradePolicy, TradeSession, TradeStatus,
};

use super::{write_rebased, Effect};
use crate::store::{fetch, insert_if_absent, replace, SessionStore};
use crate::ui::UiEvent;

#[derive(Debug, Clone)]
pub struct TradeHandler {
    me: ShipId,
    session: TradeSession,
    settled: bool,
}

impl TradeHandler {
    pub fn open(request: &InteractionRequest, me: ShipId, store: &dyn SessionStore) -> Result<Self, StoreError> {
        let session = insert_if_absent(store, TradeSession::open(request))?;
        Ok(Self {
            me,
            session,
            settled: false,
        })
    }

    pub fn id(&self) -> RecordId {
        self.session.id
    }

    pub fn session(&self) -> &TradeSession {
        &self.session
    }

    pub fn my_offer(&self) -> Offer {
        self.session
            .side_of(self.me)
            .map(|side| self.session.offer(side).clone())
            .unwrap_or_default()
    }

    /// Replace the local offer. Clears the local approval.
    pub fn set_offer(
        &mut self,
        offer: &Offer,
        holdings: &ShipStats,
        max_rebases: u32,
        store: &dyn SessionStore,
    ) -> Result<Vec<Effect>, InteractionError> {
        validate_offer(holdings, offer)?;
        let me = self.me;
        let written = write_rebased(store, &self.session, max_rebases, |latest| latest.with_offer(me, offer))?;
        Ok(self.observe(written, store))
    }

    pub fn add_to_offer(
        &mut self,
        resource: Resource,
        qty: u32,
        holdings: &ShipStats,
        max_rebases: u32,
        store: &dyn SessionStore,
    ) -> Result<Vec<Effect>, InteractionError> {
        let mut offer = self.my_offer();
        *offer.entry(resource).or_insert(0) += qty;
        self.set_offer(&offer, holdings, max_rebases, store)
    }

    pub fn remove_from_offer(
        &mut self,
        resource: Resource,
        holdings: &ShipStats,
        max_rebases: u32,
        store: &dyn SessionStore,
    ) -> Result<Vec<Effect>, InteractionError> {
        let mut offer = self.my_offer();
        offer.remove(&resource);
        self.set_offer(&offer, holdings, max_rebases, store)
    }

    pub fn approve(
        &mut self,
        policy: &TradePolicy,
        max_rebases: u32,
        store: &dyn SessionStore,
    ) -> Result<Vec<Effect>, InteractionError> {
        let me = self.me;
        let written = write_rebased(store, &self.session, max_rebases, |latest| {
            check_approval(latest, me, policy)?;
            latest.with_approval(me, true)
        })?;
        Ok(self.observe(written, store))
    }

    pub fn revoke(&mut self, max_rebases: u32, store: &dyn SessionStore) -> Result<Vec<Effect>, InteractionError> {
        let me = self.me;
        let written = write_rebased(store, &self.session, max_rebases, |latest| latest.with_approval(me, false))?;
        Ok(self.observe(written, store))
    }

    /// Leave the table. The local approval is withdrawn first so no commit
    /// computed from an older snapshot can still land; if the trade already
    /// went through, it settles instead.
    pub fn walk_away(&mut self, max_rebases: u32, store: &dyn SessionStore) -> Result<Vec<Effect>, InteractionError> {
        let me = self.me;
        match write_rebased(store, &self.session, max_rebases, |latest| latest.with_approval(me, false)) {
            Ok(written) => {
                let mut effects = self.observe(written, store);
                effects.push(Effect::Close(RequestStatus::Cancelled));
                Ok(effects)
            }
            Err(InteractionError::InvalidAction(InvalidAction::SessionClosed)) => Ok(self.sync(store)?),
            Err(e) => Err(e),
        }
    }

    /// Take in a delivered record; commit or settle if it calls for it.
    pub fn observe(&mut self, session: TradeSession, store: &dyn SessionStore) -> Vec<Effect> {
        if session.version <= self.session.version {
            log::debug!(
                "trade {} ignoring v{} (have v{})",
                session.id,
                session.version,
                self.session.version
            );
            return Vec::new();
        }
        self.session = session;
        let mut effects = vec![Effect::Render(UiEvent::Trade(self.session.clone()))];
        effects.extend(self.commit_if_ready(store));
        effects.extend(self.settle());
        effects
    }

    pub fn sync(&mut self, store: &dyn SessionStore) -> Result<Vec<Effect>, StoreError> {
        let latest = fetch(store, self.session.id)?;
        Ok(self.observe(latest, store))
    }

    fn commit_if_ready(&mut self, store: &dyn SessionStore) -> Vec<Effect> {
        let Some(done) = self.session.commit() else {
            return Vec::new();
        };
        match replace(store, done, self.session.version) {
            Ok(done) => {
                log::info!("trade {} committed at v{}", done.id, done.version);
                self.session = done;
                vec![Effect::Render(UiEvent::Trade(self.session.clone()))]
            }
            Err(StoreError::VersionConflict { found, .. }) => {
                log::debug!("trade {} moved to v{} before commit, waiting for it", self.session.id, found);
                Vec::new()
            }
            Err(e) => {
                log::warn!("trade {} commit failed: {}", self.session.id, e);
                vec![Effect::Render(UiEvent::Notice(format!("Trade couldn't be sealed: {}", e)))]
            }
        }
    }

    fn settle(&mut self) -> Vec<Effect> {
        if self.session.status != TradeStatus::Completed || self.settled {
            return Vec::new();
        }
        self.settled = true;
        let mut effects = Vec::new();
        if let Some(delta) = settlement_delta(&self.session, self.me) {
            effects.push(Effect::ApplyDelta {
                delta,
                reason: "Trade completed successfully!".to_string(),
            });
        }
        effects.push(Effect::Close(RequestStatus::Completed));
        effects
    }
}
