//! Change-feed vocabulary: tables, rows, events and subscription filters.
//!
//! The feed only promises causal order per record. Deliveries may repeat,
//! and records may arrive in any order relative to each other, so every
//! consumer runs incoming rows through a version check first.

use std::collections::BTreeMap;

use parley_logic::chat::{ChatSession, TypingSignal};
use parley_logic::combat::CombatSession;
use parley_logic::session::{InteractionRequest, Lifecycle, RecordId, ShipId};
use parley_logic::ship::Ship;
use parley_logic::trade::TradeSession;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Pirate,
    InteractionRequest,
    CombatSession,
    TradeSession,
    ChatSession,
}

/// A full stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Row {
    Pirate(Ship),
    Request(InteractionRequest),
    Combat(CombatSession),
    Trade(TradeSession),
    Chat(ChatSession),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::Pirate(_) => Table::Pirate,
            Row::Request(_) => Table::InteractionRequest,
            Row::Combat(_) => Table::CombatSession,
            Row::Trade(_) => Table::TradeSession,
            Row::Chat(_) => Table::ChatSession,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Row::Pirate(s) => s.id,
            Row::Request(r) => r.id,
            Row::Combat(c) => c.id,
            Row::Trade(t) => t.id,
            Row::Chat(c) => c.id,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Row::Pirate(s) => s.version,
            Row::Request(r) => r.version,
            Row::Combat(c) => c.version,
            Row::Trade(t) => t.version,
            Row::Chat(c) => c.version,
        }
    }

    pub(crate) fn set_id(&mut self, id: RecordId) {
        match self {
            Row::Pirate(s) => s.id = id,
            Row::Request(r) => r.id = id,
            Row::Combat(c) => c.id = id,
            Row::Trade(t) => t.id = id,
            Row::Chat(c) => c.id = id,
        }
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        match self {
            Row::Pirate(s) => s.version = version,
            Row::Request(r) => r.version = version,
            Row::Combat(c) => c.version = version,
            Row::Trade(t) => t.version = version,
            Row::Chat(c) => c.version = version,
        }
    }

    /// Whether `ship` may see and write this row. A pirate row belongs
    /// to its own ship only.
    pub fn involves(&self, ship: ShipId) -> bool {
        match self {
            Row::Pirate(s) => s.id == ship,
            Row::Request(r) => r.involves(ship),
            Row::Combat(c) => c.involves(ship),
            Row::Trade(t) => t.involves(ship),
            Row::Chat(c) => c.involves(ship),
        }
    }
}

/// A typed record that lives in one table.
pub trait StoredRecord: Clone + Sized {
    const TABLE: Table;
    fn into_row(self) -> Row;
    fn from_row(row: Row) -> Option<Self>;
}

macro_rules! stored_record {
    ($ty:ty, $table:ident, $variant:ident) => {
        impl StoredRecord for $ty {
            const TABLE: Table = Table::$table;
            fn into_row(self) -> Row {
                Row::$variant(self)
            }
            fn from_row(row: Row) -> Option<Self> {
                match row {
                    Row::$variant(r) => Some(r),
                    _ => None,
                }
            }
        }
    };
}

stored_record!(Ship, Pirate, Pirate);
stored_record!(InteractionRequest, InteractionRequest, Request);
stored_record!(CombatSession, CombatSession, Combat);
stored_record!(TradeSession, TradeSession, Trade);
stored_record!(ChatSession, ChatSession, Chat);

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Inserted(Row),
    Updated(Row),
    /// Ephemeral; never stored.
    Typing(TypingSignal),
}

impl ChangeEvent {
    pub fn row(&self) -> Option<&Row> {
        match self {
            ChangeEvent::Inserted(row) | ChangeEvent::Updated(row) => Some(row),
            ChangeEvent::Typing(_) => None,
        }
    }
}

/// What a subscription wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Table(Table),
    Record(Table, RecordId),
    /// Every request and session row involving this ship.
    Participant(ShipId),
}

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Table(t) => row.table() == *t,
            Filter::Record(t, id) => row.table() == *t && row.id() == *id,
            Filter::Participant(ship) => row.table() != Table::Pirate && row.involves(*ship),
        }
    }
}

/// Highest version seen per record; rejects stale and repeated deliveries.
#[derive(Debug, Clone, Default)]
pub struct VersionGate {
    seen: BTreeMap<(Table, RecordId), u64>,
}

impl VersionGate {
    /// `true` when `version` is newer than anything seen for this record.
    pub fn admit(&mut self, table: Table, id: RecordId, version: u64) -> bool {
        let entry = self.seen.entry((table, id)).or_insert(0);
        if version > *entry {
            *entry = version;
            true
        } else {
            false
        }
    }

    pub fn seen(&self, table: Table, id: RecordId) -> Option<u64> {
        self.seen.get(&(table, id)).copied()
    }

    pub fn forget(&mut self, table: Table, id: RecordId) {
        self.seen.remove(&(table, id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_logic::session::{InteractionKind, RequestPayload};

    fn request(id: RecordId) -> InteractionRequest {
        let mut r = InteractionRequest::new(1, 2, InteractionKind::Chat, RequestPayload::default());
        r.id = id;
        r
    }

    #[test]
    fn gate_rejects_repeats_and_stale() {
        let mut gate = VersionGate::default();
        assert!(gate.admit(Table::InteractionRequest, 1, 1));
        assert!(!gate.admit(Table::InteractionRequest, 1, 1));
        assert!(gate.admit(Table::InteractionRequest, 1, 3));
        assert!(!gate.admit(Table::InteractionRequest, 1, 2));
        assert!(gate.admit(Table::CombatSession, 1, 1));
        assert_eq!(gate.seen(Table::InteractionRequest, 1), Some(3));
    }

    #[test]
    fn participant_filter_skips_pirate_rows() {
        let f = Filter::Participant(1);
        assert!(f.matches(&Row::Request(request(4))));
        assert!(!f.matches(&Row::Pirate(Ship::new(1, "me", 0.0, 0.0))));
        assert!(Filter::Table(Table::Pirate).matches(&Row::Pirate(Ship::new(1, "me", 0.0, 0.0))));
        assert!(!Filter::Participant(9).matches(&Row::Request(request(4))));
    }

    #[test]
    fn record_filter_matches_one_row() {
        let f = Filter::Record(Table::InteractionRequest, 4);
        assert!(f.matches(&Row::Request(request(4))));
        assert!(!f.matches(&Row::Request(request(5))));
    }

    #[test]
    fn rows_round_trip_through_typed_records() {
        let row = request(7).into_row();
        assert_eq!(row.table(), Table::InteractionRequest);
        assert_eq!(row.id(), 7);
        assert!(InteractionRequest::from_row(row.clone()).is_some());
        assert!(CombatSession::from_row(row).is_none());
    }

    #[test]
    fn rows_carry_lowercase_status_literals() {
        let json = serde_json::to_string(&Row::Request(request(3))).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"kind\":\"chat\""));
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), 3);
    }
}
