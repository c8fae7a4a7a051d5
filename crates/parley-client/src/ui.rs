//! Events for whatever renders the client.

use parley_logic::chat::ChatSession;
use parley_logic::combat::CombatSession;
use parley_logic::proximity::NearbyShip;
use parley_logic::session::{InteractionKind, InteractionRequest, RecordId, RequestStatus, ShipId};
use parley_logic::ship::ShipStats;
use parley_logic::trade::TradeSession;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Fresh proximity list, replacing the previous one.
    Nearby(Vec<NearbyShip>),
    /// Someone wants to parley; answer with `respond`.
    RequestPrompt(InteractionRequest),
    RequestSent(InteractionRequest),
    /// Our request was declined or withdrawn.
    RequestCancelled(InteractionRequest),
    Combat(CombatSession),
    Trade(TradeSession),
    Chat(ChatSession),
    PeerTyping {
        session_id: RecordId,
        ship_id: ShipId,
        typing: bool,
    },
    Stats(ShipStats),
    Ambient(String),
    SessionClosed {
        session_id: RecordId,
        kind: InteractionKind,
        status: RequestStatus,
    },
    /// Short message for the captain's log.
    Notice(String),
}
