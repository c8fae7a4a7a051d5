//! Conversions between table rows and `parley-logic` records, and the
//! checks every write runs before it touches a table.
//!
//! Reducers never edit row fields by hand: they convert the stored row into
//! a logic record, let `parley-logic` produce the next record, and convert
//! that back. This keeps the module and the clients on one set of rules.

use std::collections::BTreeMap;

use parley_logic::chat::{ChatMessage, ChatSession, ChatStatus};
use parley_logic::combat::{CombatSession, CombatStatus};
use parley_logic::error::StoreError;
use parley_logic::session::{InteractionKind, InteractionRequest, RequestPayload, RequestStatus};
use parley_logic::ship::{Resource, Ship, ShipStats};
use parley_logic::trade::{decode_offer, encode_offer, TradeSession, TradeStatus};

use crate::tables::{ChatRecord, CombatRecord, Interaction, Pirate, TradeRecord};

/// Refuse a write computed from an out-of-date row.
pub fn expect_version(found: u64, expected: u64) -> Result<(), String> {
    if found != expected {
        return Err(StoreError::VersionConflict { expected, found }.to_string());
    }
    Ok(())
}

/// Whether the captain of `caller` may act as `actor` in a session between
/// `participants`. Captains act for their own ship, and for an AI opponent,
/// which has no client of its own.
pub fn may_act_as(caller: u64, actor: u64, participants: (u64, u64), actor_is_pirate: bool) -> bool {
    let (a, b) = participants;
    let seated = |id: u64| id == a || id == b;
    seated(caller) && seated(actor) && (actor == caller || !actor_is_pirate)
}

fn corrupt(what: &str, err: serde_json::Error) -> String {
    format!("corrupt {}: {}", what, err)
}

fn encode<T: serde::Serialize>(what: &str, value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| corrupt(what, e))
}

fn decode_list<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> Result<Vec<T>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| corrupt(what, e))
}

// ============================================================================
// PIRATES
// ============================================================================

impl Pirate {
    pub fn to_ship(&self) -> Result<Ship, String> {
        let cargo: BTreeMap<Resource, u32> = if self.cargo.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.cargo).map_err(|e| corrupt("cargo", e))?
        };
        Ok(Ship {
            id: self.id,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            is_ai: false,
            stats: ShipStats {
                hull: self.hull,
                max_hull: self.max_hull,
                crew: self.crew,
                booty: self.booty,
                cargo,
                combat_wins: self.combat_wins,
                combat_losses: self.combat_losses,
                trades_completed: self.trades_completed,
            },
            version: self.version,
        })
    }

    /// Overwrite the stat columns. Owner, name and position are untouched.
    pub fn set_stats(&mut self, stats: &ShipStats) -> Result<(), String> {
        self.cargo = encode("cargo", &stats.cargo)?;
        self.hull = stats.hull;
        self.max_hull = stats.max_hull;
        self.crew = stats.crew;
        self.booty = stats.booty;
        self.combat_wins = stats.combat_wins;
        self.combat_losses = stats.combat_losses;
        self.trades_completed = stats.trades_completed;
        Ok(())
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

impl Interaction {
    pub fn to_request(&self) -> Result<InteractionRequest, String> {
        let kind = InteractionKind::parse(&self.kind).ok_or_else(|| format!("unknown interaction kind '{}'", self.kind))?;
        let status =
            RequestStatus::parse(&self.status).ok_or_else(|| format!("unknown request status '{}'", self.status))?;
        Ok(InteractionRequest {
            id: self.id,
            initiator_id: self.initiator_id,
            target_id: self.target_id,
            kind,
            status,
            payload: RequestPayload {
                initiator_name: self.initiator_name.clone(),
                target_name: self.target_name.clone(),
                created_at_ms: self.created_at_ms,
            },
            version: self.version,
        })
    }

    pub fn from_request(request: &InteractionRequest) -> Self {
        Self {
            id: request.id,
            initiator_id: request.initiator_id,
            target_id: request.target_id,
            kind: request.kind.as_str().to_string(),
            status: request.status.as_str().to_string(),
            initiator_name: request.payload.initiator_name.clone(),
            target_name: request.payload.target_name.clone(),
            created_at_ms: request.payload.created_at_ms,
            version: request.version,
        }
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

impl CombatRecord {
    pub fn to_session(&self) -> Result<CombatSession, String> {
        let status =
            CombatStatus::parse(&self.status).ok_or_else(|| format!("unknown combat status '{}'", self.status))?;
        Ok(CombatSession {
            id: self.id,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            current_turn: self.current_turn,
            player1_hp: self.player1_hp,
            player2_hp: self.player2_hp,
            turn_number: self.turn_number,
            combat_log: decode_list("combat log", &self.combat_log)?,
            status,
            winner_id: self.winner_id,
            version: self.version,
        })
    }

    pub fn from_session(session: &CombatSession) -> Result<Self, String> {
        Ok(Self {
            id: session.id,
            player1_id: session.player1_id,
            player2_id: session.player2_id,
            current_turn: session.current_turn,
            player1_hp: session.player1_hp,
            player2_hp: session.player2_hp,
            turn_number: session.turn_number,
            combat_log: encode("combat log", &session.combat_log)?,
            status: session.status.as_str().to_string(),
            winner_id: session.winner_id,
            version: session.version,
        })
    }
}

impl TradeRecord {
    pub fn to_session(&self) -> Result<TradeSession, String> {
        let status =
            TradeStatus::parse(&self.status).ok_or_else(|| format!("unknown trade status '{}'", self.status))?;
        Ok(TradeSession {
            id: self.id,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            player1_offer: decode_offer(&self.player1_offer).map_err(|e| corrupt("offer", e))?,
            player2_offer: decode_offer(&self.player2_offer).map_err(|e| corrupt("offer", e))?,
            player1_approved: self.player1_approved,
            player2_approved: self.player2_approved,
            status,
            version: self.version,
        })
    }

    pub fn from_session(session: &TradeSession) -> Result<Self, String> {
        Ok(Self {
            id: session.id,
            player1_id: session.player1_id,
            player2_id: session.player2_id,
            player1_offer: encode_offer(&session.player1_offer).map_err(|e| corrupt("offer", e))?,
            player2_offer: encode_offer(&session.player2_offer).map_err(|e| corrupt("offer", e))?,
            player1_approved: session.player1_approved,
            player2_approved: session.player2_approved,
            status: session.status.as_str().to_string(),
            version: session.version,
        })
    }
}

impl ChatRecord {
    pub fn to_session(&self) -> Result<ChatSession, String> {
        let status = ChatStatus::parse(&self.status).ok_or_else(|| format!("unknown chat status '{}'", self.status))?;
        let messages: Vec<ChatMessage> = decode_list("messages", &self.messages)?;
        Ok(ChatSession {
            id: self.id,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            messages,
            status,
            version: self.version,
        })
    }

    pub fn from_session(session: &ChatSession) -> Result<Self, String> {
        Ok(Self {
            id: session.id,
            player1_id: session.player1_id,
            player2_id: session.player2_id,
            messages: encode("messages", &session.messages)?,
            status: session.status.as_str().to_string(),
            version: session.version,
        })
    }
}
