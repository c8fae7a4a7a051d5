//! Shared session lifecycle and the interaction request envelope.
//!
//! Every record kind (request, combat, trade, chat) moves through the same
//! lifecycle: `Pending → Active → {Completed | Cancelled}`, created once,
//! closed once, never reopened. Each kind keeps its own literal status
//! vocabulary on the wire (`negotiating` for trades, etc.) and maps it onto
//! a [`Phase`] through the [`Lifecycle`] trait.
//!
//! ```
//! use parley_logic::session::{InteractionKind, InteractionRequest, RequestPayload, RequestStatus};
//!
//! let req = InteractionRequest::new(1, 2, InteractionKind::Trade, RequestPayload::default());
//! let accepted = req.transition(RequestStatus::Active).unwrap();
//! assert_eq!(accepted.status, RequestStatus::Active);
//! assert!(accepted.transition(RequestStatus::Pending).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::InvalidAction;

/// Ship identifier (players and AI ships share the space).
pub type ShipId = u64;

/// Store record identifier. Session records reuse their request's id.
pub type RecordId = u64;

/// Position of a record in the shared lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl Phase {
    pub fn is_closed(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled)
    }

    /// Legal lifecycle edges. Self-loops are not edges.
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Pending, Phase::Active)
                | (Phase::Pending, Phase::Cancelled)
                | (Phase::Active, Phase::Completed)
                | (Phase::Active, Phase::Cancelled)
        )
    }
}

/// Common view over every stored session record.
pub trait Lifecycle {
    fn record_id(&self) -> RecordId;
    fn version(&self) -> u64;
    fn participants(&self) -> (ShipId, ShipId);
    fn phase(&self) -> Phase;

    fn is_closed(&self) -> bool {
        self.phase().is_closed()
    }

    fn involves(&self, ship: ShipId) -> bool {
        let (a, b) = self.participants();
        a == ship || b == ship
    }

    /// The other participant, if `ship` is one of the two.
    fn counterpart_of(&self, ship: ShipId) -> Option<ShipId> {
        let (a, b) = self.participants();
        if a == ship {
            Some(b)
        } else if b == ship {
            Some(a)
        } else {
            None
        }
    }
}

/// Unordered pair key, so `(a, b)` and `(b, a)` name the same pair.
pub fn pair_key(a: ShipId, b: ShipId) -> (ShipId, ShipId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// What the initiator wants to do with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Combat,
    Trade,
    Chat,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [
        InteractionKind::Combat,
        InteractionKind::Trade,
        InteractionKind::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Combat => "combat",
            Self::Trade => "trade",
            Self::Chat => "chat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

/// Request status vocabulary. The literals are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Active,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|st| st.as_str() == s)
    }

    pub fn phase(self) -> Phase {
        match self {
            Self::Pending => Phase::Pending,
            Self::Active => Phase::Active,
            Self::Completed => Phase::Completed,
            Self::Cancelled => Phase::Cancelled,
        }
    }
}

/// Display data carried alongside a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub initiator_name: String,
    pub target_name: String,
    pub created_at_ms: u64,
}

/// The pending/accept/decline envelope that precedes every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    /// Assigned by the store on insert (0 before that).
    pub id: RecordId,
    pub initiator_id: ShipId,
    pub target_id: ShipId,
    pub kind: InteractionKind,
    pub status: RequestStatus,
    pub payload: RequestPayload,
    /// Assigned by the store (0 before insert).
    pub version: u64,
}

impl InteractionRequest {
    pub fn new(
        initiator_id: ShipId,
        target_id: ShipId,
        kind: InteractionKind,
        payload: RequestPayload,
    ) -> Self {
        Self {
            id: 0,
            initiator_id,
            target_id,
            kind,
            status: RequestStatus::Pending,
            payload,
            version: 0,
        }
    }

    /// Copy of this request moved to `next`, if that is a legal edge.
    pub fn transition(&self, next: RequestStatus) -> Result<Self, InvalidAction> {
        let from = self.status.phase();
        let to = next.phase();
        if !from.can_transition_to(to) {
            return Err(InvalidAction::IllegalTransition { from, to });
        }
        let mut updated = self.clone();
        updated.status = next;
        Ok(updated)
    }

    pub fn pair(&self) -> (ShipId, ShipId) {
        pair_key(self.initiator_id, self.target_id)
    }
}

impl Lifecycle for InteractionRequest {
    fn record_id(&self) -> RecordId {
        self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn participants(&self) -> (ShipId, ShipId) {
        (self.initiator_id, self.target_id)
    }
    fn phase(&self) -> Phase {
        self.status.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InteractionRequest {
        InteractionRequest::new(1, 2, InteractionKind::Combat, RequestPayload::default())
    }

    #[test]
    fn legal_edges_only() {
        use Phase::*;
        let all = [Pending, Active, Completed, Cancelled];
        let mut legal = 0;
        for from in all {
            for to in all {
                if from.can_transition_to(to) {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 4);
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn closed_requests_never_reopen() {
        let declined = request().transition(RequestStatus::Cancelled).unwrap();
        for next in RequestStatus::ALL {
            assert!(declined.transition(next).is_err());
        }
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let err = request().transition(RequestStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            InvalidAction::IllegalTransition {
                from: Phase::Pending,
                to: Phase::Completed
            }
        );
    }

    #[test]
    fn status_literals_are_wire_contract() {
        let json = serde_json::to_string(&RequestStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let kind: InteractionKind = serde_json::from_str("\"chat\"").unwrap();
        assert_eq!(kind, InteractionKind::Chat);
        for st in RequestStatus::ALL {
            assert_eq!(RequestStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(RequestStatus::parse("closed"), None);
    }

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(pair_key(7, 3), pair_key(3, 7));
        let mut r = request();
        r.initiator_id = 9;
        assert_eq!(r.pair(), (2, 9));
    }

    #[test]
    fn counterpart_lookup() {
        let r = request();
        assert_eq!(r.counterpart_of(1), Some(2));
        assert_eq!(r.counterpart_of(2), Some(1));
        assert_eq!(r.counterpart_of(3), None);
        assert!(r.involves(2));
    }
}
