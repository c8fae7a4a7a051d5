//! Chat handler: message log, read receipts, typing indicator.

use parley_logic::chat::{ChatSession, ChatStatus, QuickMessage, TypingSignal, TypingState};
use parley_logic::error::{InteractionError, StoreError};
use parley_logic::session::{InteractionRequest, RecordId, RequestStatus, ShipId};

use super::{write_rebased, write_rebased_if, Effect};
use crate::store::{fetch, insert_if_absent, SessionStore};
use crate::ui::UiEvent;

#[derive(Debug, Clone)]
pub struct ChatHandler {
    me: ShipId,
    my_name: String,
    session: ChatSession,
    typing: TypingState,
    peer_typing: bool,
    closed: bool,
}

impl ChatHandler {
    pub fn open(
        request: &InteractionRequest,
        me: ShipId,
        my_name: &str,
        store: &dyn SessionStore,
    ) -> Result<Self, StoreError> {
        let session = insert_if_absent(store, ChatSession::open(request))?;
        Ok(Self {
            me,
            my_name: my_name.to_string(),
            session,
            typing: TypingState::default(),
            peer_typing: false,
            closed: false,
        })
    }

    pub fn id(&self) -> RecordId {
        self.session.id
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    pub fn send(
        &mut self,
        content: &str,
        now_ms: u64,
        max_rebases: u32,
        store: &dyn SessionStore,
    ) -> Result<Vec<Effect>, InteractionError> {
        let (me, name) = (self.me, self.my_name.clone());
        let written = write_rebased(store, &self.session, max_rebases, |latest| {
            latest.with_message(me, &name, content, now_ms)
        })?;
        let stop = self.typing.stop();
        self.signal(stop, store);
        Ok(self.observe(written))
    }

    pub fn send_quick(
        &mut self,
        quick: QuickMessage,
        now_ms: u64,
        max_rebases: u32,
        store: &dyn SessionStore,
    ) -> Result<Vec<Effect>, InteractionError> {
        self.send(quick.text(), now_ms, max_rebases, store)
    }

    /// Mark the peer's messages read. No write when nothing is unread.
    pub fn mark_read(&mut self, max_rebases: u32, store: &dyn SessionStore) -> Result<Vec<Effect>, InteractionError> {
        if self.session.unread_for(self.me) == 0 {
            return Ok(Vec::new());
        }
        let me = self.me;
        let written = write_rebased_if(store, &self.session, max_rebases, |latest| Ok(latest.with_read_by(me)))?;
        Ok(self.observe(written))
    }

    /// A keystroke in the message box.
    pub fn on_input(&mut self, now_ms: u64, store: &dyn SessionStore) {
        let edge = self.typing.on_input(now_ms);
        self.signal(edge, store);
    }

    pub fn tick(&mut self, now_ms: u64, timeout_ms: u64, store: &dyn SessionStore) {
        let edge = self.typing.tick(now_ms, timeout_ms);
        self.signal(edge, store);
    }

    /// End the chat for both sides. History stays in the record.
    pub fn close(&mut self, max_rebases: u32, store: &dyn SessionStore) -> Result<Vec<Effect>, InteractionError> {
        let me = self.me;
        let written = write_rebased(store, &self.session, max_rebases, |latest| latest.closed(me))?;
        let stop = self.typing.stop();
        self.signal(stop, store);
        log::info!("chat {} closed by {}", written.id, me);
        Ok(self.observe(written))
    }

    pub fn observe(&mut self, session: ChatSession) -> Vec<Effect> {
        if session.version <= self.session.version {
            log::debug!(
                "chat {} ignoring v{} (have v{})",
                session.id,
                session.version,
                self.session.version
            );
            return Vec::new();
        }
        self.session = session;
        let mut effects = vec![Effect::Render(UiEvent::Chat(self.session.clone()))];
        if self.session.status == ChatStatus::Completed && !self.closed {
            self.closed = true;
            self.peer_typing = false;
            effects.push(Effect::Close(RequestStatus::Completed));
        }
        effects
    }

    pub fn on_typing(&mut self, signal: TypingSignal) -> Vec<Effect> {
        if signal.ship_id == self.me || signal.session_id != self.session.id || signal.is_typing == self.peer_typing {
            return Vec::new();
        }
        self.peer_typing = signal.is_typing;
        vec![Effect::Render(UiEvent::PeerTyping {
            session_id: signal.session_id,
            ship_id: signal.ship_id,
            typing: signal.is_typing,
        })]
    }

    pub fn sync(&mut self, store: &dyn SessionStore) -> Result<Vec<Effect>, StoreError> {
        let latest = fetch(store, self.session.id)?;
        Ok(self.observe(latest))
    }

    fn signal(&self, edge: Option<bool>, store: &dyn SessionStore) {
        let Some(is_typing) = edge else {
            return;
        };
        let signal = TypingSignal {
            session_id: self.session.id,
            ship_id: self.me,
            is_typing,
        };
        if let Err(e) = store.broadcast(signal) {
            log::debug!("typing signal for chat {} dropped: {}", self.session.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ChangeEvent, Filter, Table};
    use crate::store::MemoryStore;
    use parley_logic::session::{InteractionKind, RequestPayload};

    fn request() -> InteractionRequest {
        let mut r = InteractionRequest::new(1, 2, InteractionKind::Chat, RequestPayload::default());
        r.id = 12;
        r.status = RequestStatus::Active;
        r
    }

    #[test]
    fn typing_edges_reach_the_peer() {
        let store = MemoryStore::new();
        let mut a = ChatHandler::open(&request(), 1, "Anne", &store).unwrap();
        let mut b = ChatHandler::open(&request(), 2, "Mary", &store).unwrap();
        let sub = store.subscribe(vec![Filter::Record(Table::ChatSession, 12)]);

        a.on_input(0, &store);
        a.on_input(100, &store);
        let signals: Vec<_> = store
            .poll(sub)
            .into_iter()
            .filter_map(|e| match e {
                ChangeEvent::Typing(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(signals.len(), 1);
        assert_eq!(b.on_typing(signals[0]).len(), 1);
        assert!(b.peer_typing());

        a.tick(2100, 2000, &store);
        let stop: Vec<_> = store.poll(sub);
        assert_eq!(stop, vec![ChangeEvent::Typing(TypingSignal {
            session_id: 12,
            ship_id: 1,
            is_typing: false
        })]);
    }

    #[test]
    fn sending_stops_typing() {
        let store = MemoryStore::new();
        let mut a = ChatHandler::open(&request(), 1, "Anne", &store).unwrap();
        a.on_input(0, &store);
        let sub = store.subscribe(vec![Filter::Record(Table::ChatSession, 12)]);
        a.send("Ahoy", 10, 3, &store).unwrap();
        let events = store.poll(sub);
        assert!(events.contains(&ChangeEvent::Typing(TypingSignal {
            session_id: 12,
            ship_id: 1,
            is_typing: false
        })));
    }

    #[test]
    fn mark_read_writes_only_when_needed() {
        let store = MemoryStore::new();
        let mut a = ChatHandler::open(&request(), 1, "Anne", &store).unwrap();
        let mut b = ChatHandler::open(&request(), 2, "Mary", &store).unwrap();
        assert!(b.mark_read(3, &store).unwrap().is_empty());
        a.send_quick(QuickMessage::Ahoy, 5, 3, &store).unwrap();
        b.sync(&store).unwrap();
        b.mark_read(3, &store).unwrap();
        assert!(b.session().messages[0].read);
        let writes = store.audit().len();
        b.mark_read(3, &store).unwrap();
        assert_eq!(store.audit().len(), writes);
    }

    #[test]
    fn mark_read_already_done_elsewhere_writes_nothing() {
        let store = MemoryStore::new();
        let mut a = ChatHandler::open(&request(), 1, "Anne", &store).unwrap();
        let mut b = ChatHandler::open(&request(), 2, "Mary", &store).unwrap();
        a.send("Ahoy", 5, 3, &store).unwrap();
        b.sync(&store).unwrap();
        let mut other_window = ChatHandler::open(&request(), 2, "Mary", &store).unwrap();
        other_window.mark_read(3, &store).unwrap();
        let read_version = other_window.session().version;
        let writes = store.audit().len();

        b.mark_read(3, &store).unwrap();
        assert_eq!(store.audit().len(), writes);
        assert_eq!(b.session().version, read_version);
        assert!(b.session().messages[0].read);
    }

    #[test]
    fn close_observed_once() {
        let store = MemoryStore::new();
        let mut a = ChatHandler::open(&request(), 1, "Anne", &store).unwrap();
        let mut b = ChatHandler::open(&request(), 2, "Mary", &store).unwrap();
        let effects = a.close(3, &store).unwrap();
        assert!(effects.contains(&Effect::Close(RequestStatus::Completed)));
        let effects = b.sync(&store).unwrap();
        assert!(effects.contains(&Effect::Close(RequestStatus::Completed)));
        assert!(b.sync(&store).unwrap().is_empty());
        assert!(b.send("anyone?", 1, 3, &store).is_err());
    }
}
