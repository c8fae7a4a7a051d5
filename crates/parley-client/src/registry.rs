//! Open sessions on this client, at most one per counterpart.
//!
//! The registry is the per-pair guard: a second session with the same
//! captain is refused locally. Two clients racing can still produce two
//! sessions for one pair; the client resolves that by keeping the older
//! request.

use std::collections::BTreeMap;

use parley_logic::combat::CombatRewards;
use parley_logic::error::{InvalidAction, StoreError};
use parley_logic::session::{InteractionKind, Lifecycle, RecordId, ShipId};

use crate::handlers::{ChatHandler, CombatHandler, Effect, TradeHandler};
use crate::store::SessionStore;

#[derive(Debug, Clone)]
pub enum SessionHandler {
    Combat(CombatHandler),
    Trade(TradeHandler),
    Chat(ChatHandler),
}

impl SessionHandler {
    pub fn id(&self) -> RecordId {
        match self {
            SessionHandler::Combat(h) => h.id(),
            SessionHandler::Trade(h) => h.id(),
            SessionHandler::Chat(h) => h.id(),
        }
    }

    pub fn kind(&self) -> InteractionKind {
        match self {
            SessionHandler::Combat(_) => InteractionKind::Combat,
            SessionHandler::Trade(_) => InteractionKind::Trade,
            SessionHandler::Chat(_) => InteractionKind::Chat,
        }
    }

    pub fn counterpart_of(&self, me: ShipId) -> Option<ShipId> {
        match self {
            SessionHandler::Combat(h) => h.session().counterpart_of(me),
            SessionHandler::Trade(h) => h.session().counterpart_of(me),
            SessionHandler::Chat(h) => h.session().counterpart_of(me),
        }
    }

    /// Read the session's latest record and take it in.
    pub fn sync(&mut self, rewards: &CombatRewards, store: &dyn SessionStore) -> Result<Vec<Effect>, StoreError> {
        match self {
            SessionHandler::Combat(h) => h.sync(rewards, store),
            SessionHandler::Trade(h) => h.sync(store),
            SessionHandler::Chat(h) => h.sync(store),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    capacity: usize,
    handlers: BTreeMap<RecordId, SessionHandler>,
    by_counterpart: BTreeMap<ShipId, RecordId>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            handlers: BTreeMap::new(),
            by_counterpart: BTreeMap::new(),
        }
    }

    /// Whether a new session with `counterpart` may open.
    pub fn can_open(&self, counterpart: ShipId) -> Result<(), InvalidAction> {
        if self.by_counterpart.contains_key(&counterpart) {
            return Err(InvalidAction::AlreadyInSession(counterpart));
        }
        if self.handlers.len() >= self.capacity {
            return Err(InvalidAction::RegistryFull(self.capacity));
        }
        Ok(())
    }

    pub fn insert(&mut self, counterpart: ShipId, handler: SessionHandler) -> Result<(), InvalidAction> {
        self.can_open(counterpart)?;
        self.by_counterpart.insert(counterpart, handler.id());
        self.handlers.insert(handler.id(), handler);
        Ok(())
    }

    pub fn remove(&mut self, id: RecordId) -> Option<SessionHandler> {
        let handler = self.handlers.remove(&id)?;
        self.by_counterpart.retain(|_, session| *session != id);
        Some(handler)
    }

    pub fn get(&self, id: RecordId) -> Option<&SessionHandler> {
        self.handlers.get(&id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut SessionHandler> {
        self.handlers.get_mut(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn session_with(&self, counterpart: ShipId) -> Option<RecordId> {
        self.by_counterpart.get(&counterpart).copied()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SessionHandler> {
        self.handlers.values_mut()
    }
}
