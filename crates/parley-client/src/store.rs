//! Session Store port and the in-process `MemoryStore`.
//!
//! The store is the single authority every client talks to. Writes are
//! full-record replaces predicated on the version the writer last saw;
//! the store bumps the version on every accepted write and fans the new
//! row out to every matching subscription.
//!
//! `MemoryStore` is a shared, single-threaded implementation used by tests,
//! the simulation harness and local play. Each handle carries the caller's
//! ship id (like a reducer's sender) so ownership rules can be enforced and
//! every accepted write lands in an audit log.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use parley_logic::chat::TypingSignal;
use parley_logic::error::StoreError;
use parley_logic::session::{RecordId, ShipId};
use parley_logic::ship::{Ship, StatPatch};

use crate::feed::{ChangeEvent, Filter, Row, StoredRecord, Table};

pub type SubscriptionId = u64;

/// Backend every client shares.
pub trait SessionStore {
    /// Ship this handle writes on behalf of, if any.
    fn caller(&self) -> Option<ShipId>;

    /// Insert a new row. A request with id 0 is assigned a fresh id; any
    /// other id must be unused. The stored row starts at version 1.
    fn insert(&self, row: Row) -> Result<Row, StoreError>;

    /// Replace a row, only if it is still at `expected_version`.
    fn update(&self, row: Row, expected_version: u64) -> Result<Row, StoreError>;

    fn get(&self, table: Table, id: RecordId) -> Result<Option<Row>, StoreError>;

    fn list(&self, table: Table) -> Result<Vec<Row>, StoreError>;

    /// A player's own stat write path. Only changed fields are sent.
    fn update_stats(&self, player_id: ShipId, patch: &StatPatch) -> Result<Ship, StoreError>;

    /// Authoritative position commit for the caller's own ship.
    fn commit_position(&self, player_id: ShipId, x: f32, y: f32) -> Result<(), StoreError>;

    fn subscribe(&self, filters: Vec<Filter>) -> SubscriptionId;

    /// Drain everything delivered to `subscription` since the last poll.
    fn poll(&self, subscription: SubscriptionId) -> Vec<ChangeEvent>;

    /// Ephemeral channel keyed by chat session id. Never persisted.
    fn broadcast(&self, signal: TypingSignal) -> Result<(), StoreError>;
}

/// Typed read; `NotFound` when absent.
pub fn fetch<T: StoredRecord>(store: &dyn SessionStore, id: RecordId) -> Result<T, StoreError> {
    store
        .get(T::TABLE, id)?
        .and_then(T::from_row)
        .ok_or(StoreError::NotFound(id))
}

/// Typed version-checked replace.
pub fn replace<T: StoredRecord>(store: &dyn SessionStore, record: T, expected_version: u64) -> Result<T, StoreError> {
    let row = store.update(record.into_row(), expected_version)?;
    T::from_row(row).ok_or_else(|| StoreError::Rejected("store returned a different record kind".into()))
}

/// Insert `record`, or adopt the row already stored under its id.
pub fn insert_if_absent<T: StoredRecord>(store: &dyn SessionStore, record: T) -> Result<T, StoreError> {
    let id = record.clone().into_row().id();
    match store.insert(record.into_row()) {
        Ok(row) => T::from_row(row).ok_or(StoreError::AlreadyExists(id)),
        Err(StoreError::AlreadyExists(existing)) => {
            log::debug!("{:?} {} already created by peer, adopting", T::TABLE, existing);
            fetch(store, existing)
        }
        Err(e) => Err(e),
    }
}

/// One accepted write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAudit {
    pub caller: Option<ShipId>,
    pub table: Table,
    pub id: RecordId,
    pub version: u64,
    pub row: Row,
}

struct Subscription {
    filters: Vec<Filter>,
    mailbox: VecDeque<ChangeEvent>,
}

struct Inner {
    rows: BTreeMap<(Table, RecordId), Row>,
    next_request_id: RecordId,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_subscription: SubscriptionId,
    failures_pending: usize,
    unavailable: bool,
    duplicate_delivery: bool,
    audit: Vec<WriteAudit>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_request_id: 1,
            subscriptions: BTreeMap::new(),
            next_subscription: 1,
            failures_pending: 0,
            unavailable: false,
            duplicate_delivery: false,
            audit: Vec::new(),
        }
    }
}

impl Inner {
    fn check_write(&mut self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable);
        }
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(StoreError::Rejected("write timed out".into()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, event: ChangeEvent) {
        let Some(row) = event.row() else {
            return;
        };
        let copies = if self.duplicate_delivery { 2 } else { 1 };
        for sub in self.subscriptions.values_mut() {
            if sub.filters.iter().any(|f| f.matches(row)) {
                for _ in 0..copies {
                    sub.mailbox.push_back(event.clone());
                }
            }
        }
    }

    fn record(&mut self, caller: Option<ShipId>, row: &Row) {
        self.audit.push(WriteAudit {
            caller,
            table: row.table(),
            id: row.id(),
            version: row.version(),
            row: row.clone(),
        });
    }
}

/// Shared in-process store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
    caller: Option<ShipId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the same data that writes as `ship`.
    pub fn as_caller(&self, ship: ShipId) -> MemoryStore {
        MemoryStore {
            inner: Rc::clone(&self.inner),
            caller: Some(ship),
        }
    }

    /// The next `n` writes fail with `Rejected`.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.borrow_mut().failures_pending = n;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.borrow_mut().unavailable = unavailable;
    }

    /// Deliver every event twice.
    pub fn set_duplicate_delivery(&self, duplicate: bool) {
        self.inner.borrow_mut().duplicate_delivery = duplicate;
    }

    /// Re-deliver an old copy of a row to every matching subscription.
    pub fn replay(&self, row: Row) {
        self.inner.borrow_mut().notify(ChangeEvent::Updated(row));
    }

    pub fn audit(&self) -> Vec<WriteAudit> {
        self.inner.borrow().audit.clone()
    }

    fn owns(&self, ship: ShipId) -> Result<(), StoreError> {
        match self.caller {
            Some(c) if c != ship => Err(StoreError::Rejected(format!(
                "ship {} may not write ship {}",
                c, ship
            ))),
            _ => Ok(()),
        }
    }

    fn may_write(&self, row: &Row) -> Result<(), StoreError> {
        match (self.caller, row) {
            (_, Row::Pirate(s)) => self.owns(s.id),
            (Some(c), r) if !r.involves(c) => Err(StoreError::Rejected(format!(
                "ship {} is not part of {:?} {}",
                c,
                r.table(),
                r.id()
            ))),
            _ => Ok(()),
        }
    }

    fn pirate_write(&self, player_id: ShipId, edit: impl FnOnce(&mut Ship)) -> Result<Ship, StoreError> {
        self.owns(player_id)?;
        let mut inner = self.inner.borrow_mut();
        inner.check_write()?;
        let key = (Table::Pirate, player_id);
        let mut ship = match inner.rows.get(&key) {
            Some(Row::Pirate(s)) => s.clone(),
            _ => return Err(StoreError::NotFound(player_id)),
        };
        edit(&mut ship);
        ship.version += 1;
        let row = Row::Pirate(ship.clone());
        inner.rows.insert(key, row.clone());
        inner.record(self.caller, &row);
        inner.notify(ChangeEvent::Updated(row));
        Ok(ship)
    }
}

impl SessionStore for MemoryStore {
    fn caller(&self) -> Option<ShipId> {
        self.caller
    }

    fn insert(&self, mut row: Row) -> Result<Row, StoreError> {
        self.may_write(&row)?;
        let mut inner = self.inner.borrow_mut();
        inner.check_write()?;
        let table = row.table();
        if row.id() == 0 {
            if table != Table::InteractionRequest {
                return Err(StoreError::Rejected(format!("{:?} rows need an id", table)));
            }
            let id = inner.next_request_id;
            row.set_id(id);
        }
        let key = (table, row.id());
        if inner.rows.contains_key(&key) {
            return Err(StoreError::AlreadyExists(row.id()));
        }
        if table == Table::InteractionRequest && row.id() >= inner.next_request_id {
            inner.next_request_id = row.id() + 1;
        }
        row.set_version(1);
        inner.rows.insert(key, row.clone());
        inner.record(self.caller, &row);
        inner.notify(ChangeEvent::Inserted(row.clone()));
        Ok(row)
    }

    fn update(&self, mut row: Row, expected_version: u64) -> Result<Row, StoreError> {
        self.may_write(&row)?;
        let mut inner = self.inner.borrow_mut();
        inner.check_write()?;
        let key = (row.table(), row.id());
        let found = match inner.rows.get(&key) {
            Some(current) => current.version(),
            None => return Err(StoreError::NotFound(row.id())),
        };
        if found != expected_version {
            log::debug!(
                "{:?} {} write at v{} rejected, store has v{}",
                key.0,
                key.1,
                expected_version,
                found
            );
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                found,
            });
        }
        row.set_version(found + 1);
        inner.rows.insert(key, row.clone());
        inner.record(self.caller, &row);
        inner.notify(ChangeEvent::Updated(row.clone()));
        Ok(row)
    }

    fn get(&self, table: Table, id: RecordId) -> Result<Option<Row>, StoreError> {
        let inner = self.inner.borrow();
        inner.check_read()?;
        Ok(inner.rows.get(&(table, id)).cloned())
    }

    fn list(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let inner = self.inner.borrow();
        inner.check_read()?;
        Ok(inner
            .rows
            .range((table, RecordId::MIN)..=(table, RecordId::MAX))
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn update_stats(&self, player_id: ShipId, patch: &StatPatch) -> Result<Ship, StoreError> {
        self.pirate_write(player_id, |ship| ship.stats = ship.stats.patched(patch))
    }

    fn commit_position(&self, player_id: ShipId, x: f32, y: f32) -> Result<(), StoreError> {
        self.pirate_write(player_id, |ship| {
            ship.x = x;
            ship.y = y;
        })
        .map(|_| ())
    }

    fn subscribe(&self, filters: Vec<Filter>) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.subscriptions.insert(
            id,
            Subscription {
                filters,
                mailbox: VecDeque::new(),
            },
        );
        id
    }

    fn poll(&self, subscription: SubscriptionId) -> Vec<ChangeEvent> {
        let mut inner = self.inner.borrow_mut();
        match inner.subscriptions.get_mut(&subscription) {
            Some(sub) => sub.mailbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn broadcast(&self, signal: TypingSignal) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        if inner.unavailable {
            return Err(StoreError::Unavailable);
        }
        let chat = inner.rows.get(&(Table::ChatSession, signal.session_id)).cloned();
        for sub in inner.subscriptions.values_mut() {
            let wanted = sub.filters.iter().any(|f| match (f, &chat) {
                (Filter::Record(Table::ChatSession, id), _) => *id == signal.session_id,
                (Filter::Participant(_), Some(row)) => f.matches(row),
                _ => false,
            });
            if wanted {
                sub.mailbox.push_back(ChangeEvent::Typing(signal));
            }
        }
        Ok(())
    }
}
