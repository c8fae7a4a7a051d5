//! Negotiation manager: turns a proximity hit into an interaction request
//! and follows that request through accept, decline, withdraw and close.
//!
//! Request writes are fire-and-forget. Whatever happens to a request is
//! learned from the change feed (or from the manager's own successful
//! write) and reported as a [`RequestUpdate`] for the client to act on.
//! A status write that loses the version race is not retried: the request
//! already moved, and the manager takes the stored state as the answer.

use std::collections::BTreeMap;

use parley_logic::error::{InteractionError, InvalidAction, StoreError};
use parley_logic::proximity::ProximityDetector;
use parley_logic::session::{
    InteractionKind, InteractionRequest, Lifecycle, RecordId, RequestPayload, RequestStatus, ShipId,
};

use crate::feed::{StoredRecord, Table, VersionGate};
use crate::registry::SessionRegistry;
use crate::store::{fetch, replace, SessionStore};

/// What a request change means for this client.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestUpdate {
    /// Stale, repeated, or nothing to do.
    Ignored,
    /// Someone is asking us; ask the captain.
    Prompt(InteractionRequest),
    /// Accepted; open the matching handler.
    Activated(InteractionRequest),
    /// Declined or withdrawn before any session opened.
    Cancelled(InteractionRequest),
    /// A running session's request closed; tear the handler down.
    Closed(InteractionRequest),
}

#[derive(Debug, Clone)]
pub struct NegotiationManager {
    me: ShipId,
    my_name: String,
    /// Latest copy of every live request involving us.
    requests: BTreeMap<RecordId, InteractionRequest>,
    gate: VersionGate,
}

impl NegotiationManager {
    pub fn new(me: ShipId, my_name: impl Into<String>) -> Self {
        Self {
            me,
            my_name: my_name.into(),
            requests: BTreeMap::new(),
            gate: VersionGate::default(),
        }
    }

    pub fn get(&self, id: RecordId) -> Option<&InteractionRequest> {
        self.requests.get(&id)
    }

    /// Requests waiting on our answer, oldest first.
    pub fn incoming(&self) -> Vec<&InteractionRequest> {
        self.requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending && r.target_id == self.me)
            .collect()
    }

    /// Our requests still waiting on the other captain.
    pub fn outgoing(&self) -> Vec<&InteractionRequest> {
        self.requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending && r.initiator_id == self.me)
            .collect()
    }

    /// Ask `target_id` for a session of `kind`.
    ///
    /// The target must be in the last proximity scan, must offer `kind`, and
    /// must not already share a session with us. Nothing is written when any
    /// of that fails.
    pub fn initiate(
        &mut self,
        target_id: ShipId,
        kind: InteractionKind,
        proximity: &ProximityDetector,
        registry: &SessionRegistry,
        store: &dyn SessionStore,
        now_ms: u64,
    ) -> Result<InteractionRequest, InteractionError> {
        let target = proximity
            .find(target_id)
            .ok_or(InteractionError::StaleTarget { target_id })?;
        if !target.offers(kind) {
            return Err(InvalidAction::AiOnlyCombat(kind).into());
        }
        registry.can_open(target_id)?;

        let payload = RequestPayload {
            initiator_name: self.my_name.clone(),
            target_name: target.display_name.clone(),
            created_at_ms: now_ms,
        };
        let request = InteractionRequest::new(self.me, target_id, kind, payload);
        let row = store.insert(request.into_row())?;
        let sent = InteractionRequest::from_row(row)
            .ok_or_else(|| StoreError::Rejected("store returned a different record kind".into()))?;
        log::info!(
            "request {} sent: {} -> {} ({})",
            sent.id,
            sent.initiator_id,
            sent.target_id,
            sent.kind.as_str()
        );
        self.on_request(sent.clone());
        Ok(sent)
    }

    /// Feed entry point for request rows.
    pub fn on_request(&mut self, request: InteractionRequest) -> RequestUpdate {
        if !request.involves(self.me) {
            return RequestUpdate::Ignored;
        }
        if !self.gate.admit(Table::InteractionRequest, request.id, request.version) {
            log::debug!("request {} v{} already seen", request.id, request.version);
            return RequestUpdate::Ignored;
        }

        let previous = self.requests.get(&request.id).map(|r| r.status);
        match request.status {
            RequestStatus::Pending => {
                self.requests.insert(request.id, request.clone());
                if request.target_id == self.me {
                    log::info!("request {} from {} awaiting answer", request.id, request.initiator_id);
                    RequestUpdate::Prompt(request)
                } else {
                    RequestUpdate::Ignored
                }
            }
            RequestStatus::Active => {
                self.requests.insert(request.id, request.clone());
                log::info!("request {} accepted", request.id);
                RequestUpdate::Activated(request)
            }
            RequestStatus::Cancelled if previous.is_none() || previous == Some(RequestStatus::Pending) => {
                self.requests.remove(&request.id);
                log::info!("request {} cancelled before opening", request.id);
                RequestUpdate::Cancelled(request)
            }
            RequestStatus::Completed | RequestStatus::Cancelled => {
                self.requests.remove(&request.id);
                log::info!("request {} closed as {}", request.id, request.status.as_str());
                RequestUpdate::Closed(request)
            }
        }
    }

    /// Accept or decline a pending request addressed to us.
    ///
    /// Answering a request that is no longer pending does nothing. A failed
    /// write leaves the request pending so the captain can answer again.
    pub fn respond(
        &mut self,
        request_id: RecordId,
        accept: bool,
        registry: &SessionRegistry,
        store: &dyn SessionStore,
    ) -> Result<RequestUpdate, InteractionError> {
        let current = self.latest(request_id, store)?;
        if current.status != RequestStatus::Pending {
            return Ok(RequestUpdate::Ignored);
        }
        if current.target_id != self.me {
            return Err(InvalidAction::NotParticipant(self.me).into());
        }
        if accept {
            registry.can_open(current.initiator_id)?;
        }
        let next = if accept {
            RequestStatus::Active
        } else {
            RequestStatus::Cancelled
        };
        self.write_status(current, next, store)
    }

    /// Cancel our own request before it is answered.
    pub fn withdraw(&mut self, request_id: RecordId, store: &dyn SessionStore) -> Result<RequestUpdate, InteractionError> {
        let current = self.latest(request_id, store)?;
        if current.initiator_id != self.me {
            return Err(InvalidAction::NotParticipant(self.me).into());
        }
        if current.status != RequestStatus::Pending {
            return Ok(RequestUpdate::Ignored);
        }
        self.write_status(current, RequestStatus::Cancelled, store)
    }

    /// Close a running session's request. Closing one that is already
    /// closed is a no-op.
    pub fn close_request(
        &mut self,
        request_id: RecordId,
        status: RequestStatus,
        store: &dyn SessionStore,
    ) -> Result<RequestUpdate, InteractionError> {
        let current = self.latest(request_id, store)?;
        if current.is_closed() {
            return Ok(RequestUpdate::Ignored);
        }
        self.write_status(current, status, store)
    }

    /// Drop what we know about a request whose handler has been torn down.
    pub fn forget(&mut self, request_id: RecordId) {
        self.requests.remove(&request_id);
    }

    /// Our copy of a live request, or the stored one once we've let go of it.
    fn latest(&self, request_id: RecordId, store: &dyn SessionStore) -> Result<InteractionRequest, InteractionError> {
        match self.requests.get(&request_id) {
            Some(r) => Ok(r.clone()),
            None => match fetch(store, request_id) {
                Ok(r) => Ok(r),
                Err(StoreError::NotFound(_)) => Err(InvalidAction::NoSuchSession(request_id).into()),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn write_status(
        &mut self,
        current: InteractionRequest,
        next: RequestStatus,
        store: &dyn SessionStore,
    ) -> Result<RequestUpdate, InteractionError> {
        let updated = current.transition(next)?;
        match replace(store, updated, current.version) {
            Ok(written) => Ok(self.on_request(written)),
            Err(StoreError::VersionConflict { found, .. }) => {
                log::debug!(
                    "request {} moved to v{} before our {} landed",
                    current.id,
                    found,
                    next.as_str()
                );
                let latest: InteractionRequest = fetch(store, current.id)?;
                Ok(self.on_request(latest))
            }
            Err(e) => {
                log::warn!("request {} {} write failed: {}", current.id, next.as_str(), e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use parley_logic::ship::Ship;

    fn scanned(me: &Ship, others: &[Ship]) -> ProximityDetector {
        let mut det = ProximityDetector::new(8.0, 1000);
        det.rescan(0, me, others, std::iter::empty::<&Ship>());
        det
    }

    fn pair() -> (MemoryStore, NegotiationManager, NegotiationManager, ProximityDetector) {
        let store = MemoryStore::new();
        let anne = Ship::new(1, "Anne", 0.0, 0.0);
        let mary = Ship::new(2, "Mary", 3.0, 0.0);
        let det = scanned(&anne, &[mary]);
        (store, NegotiationManager::new(1, "Anne"), NegotiationManager::new(2, "Mary"), det)
    }

    #[test]
    fn stale_target_writes_nothing() {
        let (store, mut anne, _, det) = pair();
        let reg = SessionRegistry::new(3);
        let err = anne
            .initiate(9, InteractionKind::Chat, &det, &reg, &store, 0)
            .unwrap_err();
        assert_eq!(err, InteractionError::StaleTarget { target_id: 9 });
        assert!(store.audit().is_empty());
    }

    #[test]
    fn ai_targets_only_fight() {
        let store = MemoryStore::new();
        let me = Ship::new(1, "Anne", 0.0, 0.0);
        let mut det = ProximityDetector::new(8.0, 1000);
        det.rescan(0, &me, std::iter::empty::<&Ship>(), &[Ship::ai(50, "Bart", 1.0, 1.0)]);
        let mut anne = NegotiationManager::new(1, "Anne");
        let reg = SessionRegistry::new(3);
        let err = anne
            .initiate(50, InteractionKind::Trade, &det, &reg, &store, 0)
            .unwrap_err();
        assert_eq!(
            err,
            InteractionError::InvalidAction(InvalidAction::AiOnlyCombat(InteractionKind::Trade))
        );
        assert!(anne.initiate(50, InteractionKind::Combat, &det, &reg, &store, 0).is_ok());
    }

    #[test]
    fn target_is_prompted_once() {
        let (store, mut anne, mut mary, det) = pair();
        let reg = SessionRegistry::new(3);
        let sent = anne
            .initiate(2, InteractionKind::Chat, &det, &reg, &store, 5)
            .unwrap();
        assert_eq!(sent.payload.target_name, "Mary");
        assert_eq!(anne.outgoing().len(), 1);
        assert!(matches!(mary.on_request(sent.clone()), RequestUpdate::Prompt(_)));
        assert_eq!(mary.on_request(sent), RequestUpdate::Ignored);
        assert_eq!(mary.incoming().len(), 1);
    }

    #[test]
    fn accept_activates_both_sides() {
        let (store, mut anne, mut mary, det) = pair();
        let reg = SessionRegistry::new(3);
        let sent = anne
            .initiate(2, InteractionKind::Trade, &det, &reg, &store, 0)
            .unwrap();
        mary.on_request(sent.clone());
        let update = mary.respond(sent.id, true, &reg, &store).unwrap();
        let active = match update {
            RequestUpdate::Activated(r) => r,
            other => panic!("expected activation, got {:?}", other),
        };
        assert_eq!(active.status, RequestStatus::Active);
        assert!(matches!(anne.on_request(active), RequestUpdate::Activated(_)));
        // a second answer is a no-op
        assert_eq!(mary.respond(sent.id, false, &reg, &store).unwrap(), RequestUpdate::Ignored);
    }

    #[test]
    fn failed_answer_keeps_request_pending() {
        let (store, mut anne, mut mary, det) = pair();
        let reg = SessionRegistry::new(3);
        let sent = anne
            .initiate(2, InteractionKind::Chat, &det, &reg, &store, 0)
            .unwrap();
        mary.on_request(sent.clone());
        store.fail_next_writes(1);
        let err = mary.respond(sent.id, true, &reg, &store).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mary.incoming().len(), 1);
        assert!(matches!(
            mary.respond(sent.id, true, &reg, &store).unwrap(),
            RequestUpdate::Activated(_)
        ));
    }

    #[test]
    fn withdraw_loses_to_earlier_accept() {
        let (store, mut anne, mut mary, det) = pair();
        let reg = SessionRegistry::new(3);
        let sent = anne
            .initiate(2, InteractionKind::Chat, &det, &reg, &store, 0)
            .unwrap();
        mary.on_request(sent.clone());
        mary.respond(sent.id, true, &reg, &store).unwrap();
        // anne hasn't seen the accept yet
        let update = anne.withdraw(sent.id, &store).unwrap();
        assert!(matches!(update, RequestUpdate::Activated(_)));
    }

    #[test]
    fn decline_reports_cancelled_and_close_is_idempotent() {
        let (store, mut anne, mut mary, det) = pair();
        let reg = SessionRegistry::new(3);
        let sent = anne
            .initiate(2, InteractionKind::Combat, &det, &reg, &store, 0)
            .unwrap();
        mary.on_request(sent.clone());
        let update = mary.respond(sent.id, false, &reg, &store).unwrap();
        assert!(matches!(update, RequestUpdate::Cancelled(_)));
        assert_eq!(
            mary.close_request(sent.id, RequestStatus::Cancelled, &store).unwrap(),
            RequestUpdate::Ignored
        );
    }
}
