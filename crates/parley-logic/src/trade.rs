//! Dual-approval trading.
//!
//! Each captain edits only their own side of the record. Touching your own
//! offer clears your own approval and never the other captain's. The trade
//! executes once both approvals are seen together in one snapshot; the
//! commit write is predicated on that snapshot's version, so the store
//! accepts exactly one `completed` write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::InvalidAction;
use crate::session::{InteractionRequest, Lifecycle, Phase, RecordId, ShipId};
use crate::ship::{Resource, ShipStats, StatDelta};

/// Quantities offered per resource. Zero entries are never stored.
pub type Offer = BTreeMap<Resource, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Negotiating,
    Completed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negotiating => "negotiating",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "negotiating" => Some(Self::Negotiating),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Which half of the record a captain owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Player1,
    Player2,
}

/// Shared trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSession {
    pub id: RecordId,
    pub player1_id: ShipId,
    pub player2_id: ShipId,
    pub player1_offer: Offer,
    pub player2_offer: Offer,
    pub player1_approved: bool,
    pub player2_approved: bool,
    pub status: TradeStatus,
    pub version: u64,
}

impl TradeSession {
    pub fn open(request: &InteractionRequest) -> Self {
        Self {
            id: request.id,
            player1_id: request.initiator_id,
            player2_id: request.target_id,
            player1_offer: Offer::new(),
            player2_offer: Offer::new(),
            player1_approved: false,
            player2_approved: false,
            status: TradeStatus::Negotiating,
            version: 0,
        }
    }

    pub fn side_of(&self, ship: ShipId) -> Option<Side> {
        if ship == self.player1_id {
            Some(Side::Player1)
        } else if ship == self.player2_id {
            Some(Side::Player2)
        } else {
            None
        }
    }

    pub fn offer(&self, side: Side) -> &Offer {
        match side {
            Side::Player1 => &self.player1_offer,
            Side::Player2 => &self.player2_offer,
        }
    }

    pub fn approved(&self, side: Side) -> bool {
        match side {
            Side::Player1 => self.player1_approved,
            Side::Player2 => self.player2_approved,
        }
    }

    fn side_checked(&self, ship: ShipId) -> Result<Side, InvalidAction> {
        if self.status == TradeStatus::Completed {
            return Err(InvalidAction::SessionClosed);
        }
        self.side_of(ship).ok_or(InvalidAction::NotParticipant(ship))
    }

    /// Record with `ship`'s offer replaced and `ship`'s approval cleared.
    pub fn with_offer(&self, ship: ShipId, offer: &Offer) -> Result<TradeSession, InvalidAction> {
        let side = self.side_checked(ship)?;
        let cleaned: Offer = offer.iter().filter(|(_, q)| **q > 0).map(|(r, q)| (*r, *q)).collect();
        let mut next = self.clone();
        match side {
            Side::Player1 => {
                next.player1_offer = cleaned;
                next.player1_approved = false;
            }
            Side::Player2 => {
                next.player2_offer = cleaned;
                next.player2_approved = false;
            }
        }
        Ok(next)
    }

    /// Record with `ship`'s approval set to `approved`. Offers untouched.
    pub fn with_approval(&self, ship: ShipId, approved: bool) -> Result<TradeSession, InvalidAction> {
        let side = self.side_checked(ship)?;
        let mut next = self.clone();
        match side {
            Side::Player1 => next.player1_approved = approved,
            Side::Player2 => next.player2_approved = approved,
        }
        Ok(next)
    }

    pub fn ready_to_execute(&self) -> bool {
        self.status == TradeStatus::Negotiating && self.player1_approved && self.player2_approved
    }

    /// The `completed` record to write, if this snapshot is ready.
    pub fn commit(&self) -> Option<TradeSession> {
        if !self.ready_to_execute() {
            return None;
        }
        let mut next = self.clone();
        next.status = TradeStatus::Completed;
        Some(next)
    }
}

impl Lifecycle for TradeSession {
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
            TradeStatus::Negotiating => Phase::Active,
            TradeStatus::Completed => Phase::Completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradePolicy {
    /// Allow approving an empty own offer (a one-sided gift).
    pub allow_gifts: bool,
}

/// Check an offer against what the ship actually holds.
pub fn validate_offer(stats: &ShipStats, offer: &Offer) -> Result<(), InvalidAction> {
    for (resource, qty) in offer {
        let available = stats.available(*resource);
        if *qty > available {
            return Err(InvalidAction::InsufficientHoldings {
                resource: *resource,
                offered: *qty,
                available,
            });
        }
    }
    Ok(())
}

/// Whether `ship` may approve given its own current offer.
pub fn check_approval(session: &TradeSession, ship: ShipId, policy: &TradePolicy) -> Result<(), InvalidAction> {
    let side = session.side_checked(ship)?;
    if session.offer(side).is_empty() && !policy.allow_gifts {
        return Err(InvalidAction::EmptyOffer);
    }
    Ok(())
}

/// What `me` gains and loses from a completed trade.
pub fn settlement_delta(session: &TradeSession, me: ShipId) -> Option<StatDelta> {
    if session.status != TradeStatus::Completed {
        return None;
    }
    let side = session.side_of(me)?;
    let (gave, got) = match side {
        Side::Player1 => (&session.player1_offer, &session.player2_offer),
        Side::Player2 => (&session.player2_offer, &session.player1_offer),
    };
    let mut delta = StatDelta::default();
    for (resource, qty) in gave {
        delta.add_resource(*resource, -(*qty as i64));
    }
    for (resource, qty) in got {
        delta.add_resource(*resource, *qty as i64);
    }
    delta.trades_completed = 1;
    Some(delta)
}

pub fn encode_offer(offer: &Offer) -> Result<String, serde_json::Error> {
    serde_json::to_string(offer)
}

/// Parse an offer; an empty string is an empty offer.
pub fn decode_offer(raw: &str) -> Result<Offer, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Offer::new());
    }
    serde_json::from_str(raw)
}
