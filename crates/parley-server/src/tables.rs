//! SpacetimeDB table definitions for the Parley session store.
//!
//! Each table mirrors a record from `parley-logic`. Nested values (cargo,
//! offers, combat log, chat messages) are stored as JSON strings and
//! statuses as their lowercase literals, so the rows read the same on the
//! wire as the records the clients work with.

use spacetimedb::{table, Identity};

// ============================================================================
// SETTINGS
// ============================================================================

/// Module settings singleton (id always 0)
#[table(name = settings, public)]
#[derive(Clone)]
pub struct Settings {
    #[primary_key]
    pub id: u32,
    /// Serialized `ParleyConfig`
    pub config_json: String,
}

// ============================================================================
// PIRATES
// ============================================================================

/// A player's ship. AI ships are never stored.
#[table(name = pirate, public)]
#[derive(Clone)]
pub struct Pirate {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    /// Only this identity may change the row.
    #[unique]
    pub owner: Identity,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub hull: u32,
    pub max_hull: u32,
    pub crew: u32,
    pub booty: u32,
    /// Serialized map of cargo resource to quantity
    pub cargo: String,
    pub combat_wins: u32,
    pub combat_losses: u32,
    pub trades_completed: u32,
    pub version: u64,
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Pending/accept/decline envelope that precedes every session
#[table(name = interaction_request, public)]
#[derive(Clone)]
pub struct Interaction {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub initiator_id: u64,
    #[index(btree)]
    pub target_id: u64,
    /// "combat" | "trade" | "chat"
    pub kind: String,
    /// "pending" | "active" | "completed" | "cancelled"
    pub status: String,
    pub initiator_name: String,
    pub target_name: String,
    pub created_at_ms: u64,
    pub version: u64,
}

// ============================================================================
// SESSIONS
// ============================================================================

/// Turn-alternating combat. Same id as its request.
#[table(name = combat_session, public)]
#[derive(Clone)]
pub struct CombatRecord {
    #[primary_key]
    pub id: u64,
    pub player1_id: u64,
    pub player2_id: u64,
    pub current_turn: u64,
    pub player1_hp: u32,
    pub player2_hp: u32,
    pub turn_number: u32,
    /// Serialized list of log lines
    pub combat_log: String,
    /// "active" | "completed"
    pub status: String,
    pub winner_id: Option<u64>,
    pub version: u64,
}

/// Dual-approval trade. Same id as its request.
#[table(name = trade_session, public)]
#[derive(Clone)]
pub struct TradeRecord {
    #[primary_key]
    pub id: u64,
    pub player1_id: u64,
    pub player2_id: u64,
    /// Serialized offer, e.g. `{"GoldCoins":10}`
    pub player1_offer: String,
    pub player2_offer: String,
    pub player1_approved: bool,
    pub player2_approved: bool,
    /// "negotiating" | "completed"
    pub status: String,
    pub version: u64,
}

/// Chat between two ships. Same id as its request.
#[table(name = chat_session, public)]
#[derive(Clone)]
pub struct ChatRecord {
    #[primary_key]
    pub id: u64,
    pub player1_id: u64,
    pub player2_id: u64,
    /// Serialized list of messages
    pub messages: String,
    /// "active" | "completed"
    pub status: String,
    pub version: u64,
}
