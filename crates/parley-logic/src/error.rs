//! Failure taxonomy shared by every layer.
//!
//! Every failure is terminal for the attempted operation and carries a
//! short user-facing message through `Display`. Nothing here is retried
//! automatically; the player is the retry mechanism.

use crate::session::{InteractionKind, Phase, RecordId, ShipId};
use crate::ship::Resource;

/// Client-side rule violations, rejected before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidAction {
    /// Combat action attempted while the opponent holds the turn.
    NotYourTurn,
    /// The session already reached a terminal status.
    SessionClosed,
    /// Combat action index outside the action table.
    UnknownAction(usize),
    /// The acting ship is not one of the two participants.
    NotParticipant(ShipId),
    /// AI ships only fight.
    AiOnlyCombat(InteractionKind),
    /// A session with this counterpart is already open locally.
    AlreadyInSession(ShipId),
    /// Too many sessions open on this client.
    RegistryFull(usize),
    /// Offer exceeds what the ship actually holds.
    InsufficientHoldings {
        resource: Resource,
        offered: u32,
        available: u32,
    },
    /// Approving an empty offer is against trade policy.
    EmptyOffer,
    /// Chat message is blank after trimming.
    EmptyMessage,
    /// Status edge not present in the lifecycle.
    IllegalTransition { from: Phase, to: Phase },
    /// No local handler for this session.
    NoSuchSession(RecordId),
}

impl std::fmt::Display for InvalidAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidAction::NotYourTurn => write!(f, "Wait for your turn, captain"),
            InvalidAction::SessionClosed => write!(f, "That session is already over"),
            InvalidAction::UnknownAction(i) => write!(f, "Unknown combat action #{}", i),
            InvalidAction::NotParticipant(id) => {
                write!(f, "Ship {} is not part of this session", id)
            }
            InvalidAction::AiOnlyCombat(kind) => {
                write!(f, "AI ships don't {} - combat only", kind.as_str())
            }
            InvalidAction::AlreadyInSession(id) => {
                write!(f, "Already in a session with ship {}", id)
            }
            InvalidAction::RegistryFull(limit) => {
                write!(f, "Too many open sessions (limit {})", limit)
            }
            InvalidAction::InsufficientHoldings {
                resource,
                offered,
                available,
            } => write!(
                f,
                "Not enough {}: offered {}, have {}",
                resource.label(),
                offered,
                available
            ),
            InvalidAction::EmptyOffer => write!(f, "Add something to your offer first"),
            InvalidAction::EmptyMessage => write!(f, "Message is empty"),
            InvalidAction::IllegalTransition { from, to } => {
                write!(f, "Cannot move a session from {:?} to {:?}", from, to)
            }
            InvalidAction::NoSuchSession(id) => write!(f, "No open session {}", id),
        }
    }
}

impl std::error::Error for InvalidAction {}

/// Store-level write/read failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store refused or timed out the write.
    Rejected(String),
    /// The record changed since the version the write was computed from.
    VersionConflict { expected: u64, found: u64 },
    /// No record with this id.
    NotFound(RecordId),
    /// Insert collided with an existing record id.
    AlreadyExists(RecordId),
    /// The store cannot be reached.
    Unavailable,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Rejected(reason) => write!(f, "write rejected: {}", reason),
            StoreError::VersionConflict { expected, found } => write!(
                f,
                "record changed underneath (expected v{}, found v{})",
                expected, found
            ),
            StoreError::NotFound(id) => write!(f, "record {} not found", id),
            StoreError::AlreadyExists(id) => write!(f, "record {} already exists", id),
            StoreError::Unavailable => write!(f, "store unavailable"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Everything an interaction operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    /// Target left range before the request was sent.
    StaleTarget { target_id: ShipId },
    /// Store write rejected or timed out; nothing was mutated locally.
    WriteFailure(StoreError),
    /// Rejected client-side before any write.
    InvalidAction(InvalidAction),
}

impl InteractionError {
    /// Whether the player can sensibly try the same thing again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InteractionError::WriteFailure(_))
    }
}

impl From<StoreError> for InteractionError {
    fn from(e: StoreError) -> Self {
        InteractionError::WriteFailure(e)
    }
}

impl From<InvalidAction> for InteractionError {
    fn from(e: InvalidAction) -> Self {
        InteractionError::InvalidAction(e)
    }
}

impl std::fmt::Display for InteractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionError::StaleTarget { .. } => write!(f, "Target ship has sailed away!"),
            InteractionError::WriteFailure(e) => write!(f, "Couldn't reach the harbour ({})", e),
            InteractionError::InvalidAction(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InteractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InteractionError::WriteFailure(e) => Some(e),
            InteractionError::InvalidAction(e) => Some(e),
            InteractionError::StaleTarget { .. } => None,
        }
    }
}
