//! Ship-to-ship chat: append-only message log, read receipts, and the
//! typing indicator state machine.
//!
//! Messages carry no ordering guarantee beyond the order they were appended
//! in; both captains append through version-checked writes, and a conflicting
//! append is rebased onto the latest log rather than overwriting it.

use serde::{Deserialize, Serialize};

use crate::error::InvalidAction;
use crate::session::{InteractionRequest, Lifecycle, Phase, RecordId, ShipId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: ShipId,
    pub sender_name: String,
    pub content: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Completed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Shared chat record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: RecordId,
    pub player1_id: ShipId,
    pub player2_id: ShipId,
    pub messages: Vec<ChatMessage>,
    pub status: ChatStatus,
    pub version: u64,
}

impl ChatSession {
    pub fn open(request: &InteractionRequest) -> Self {
        Self {
            id: request.id,
            player1_id: request.initiator_id,
            player2_id: request.target_id,
            messages: Vec::new(),
            status: ChatStatus::Active,
            version: 0,
        }
    }

    fn check_open(&self, ship: ShipId) -> Result<(), InvalidAction> {
        if self.status == ChatStatus::Completed {
            return Err(InvalidAction::SessionClosed);
        }
        if !self.involves(ship) {
            return Err(InvalidAction::NotParticipant(ship));
        }
        Ok(())
    }

    /// Record with one more message appended. Content is trimmed.
    pub fn with_message(
        &self,
        sender_id: ShipId,
        sender_name: &str,
        content: &str,
        timestamp_ms: u64,
    ) -> Result<ChatSession, InvalidAction> {
        self.check_open(sender_id)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(InvalidAction::EmptyMessage);
        }
        let mut next = self.clone();
        next.messages.push(ChatMessage {
            sender_id,
            sender_name: sender_name.to_string(),
            content: content.to_string(),
            timestamp_ms,
            read: false,
        });
        Ok(next)
    }

    /// Record with every message from the other captain marked read.
    /// `None` when there is nothing left to mark.
    pub fn with_read_by(&self, reader: ShipId) -> Option<ChatSession> {
        if self.check_open(reader).is_err() || self.unread_for(reader) == 0 {
            return None;
        }
        let mut next = self.clone();
        for msg in next.messages.iter_mut().filter(|m| m.sender_id != reader) {
            msg.read = true;
        }
        Some(next)
    }

    pub fn unread_for(&self, reader: ShipId) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id != reader && !m.read)
            .count()
    }

    /// Record with the session closed. History is kept.
    pub fn closed(&self, ship: ShipId) -> Result<ChatSession, InvalidAction> {
        self.check_open(ship)?;
        let mut next = self.clone();
        next.status = ChatStatus::Completed;
        Ok(next)
    }
}

impl Lifecycle for ChatSession {
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
            ChatStatus::Active => Phase::Active,
            ChatStatus::Completed => Phase::Completed,
        }
    }
}

/// Canned pirate phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickMessage {
    Ahoy,
    Parley,
    Treasure,
    Warning,
    Farewell,
    Challenge,
    Trade,
    Help,
}

impl QuickMessage {
    pub const ALL: [QuickMessage; 8] = [
        QuickMessage::Ahoy,
        QuickMessage::Parley,
        QuickMessage::Treasure,
        QuickMessage::Warning,
        QuickMessage::Farewell,
        QuickMessage::Challenge,
        QuickMessage::Trade,
        QuickMessage::Help,
    ];

    pub fn text(self) -> &'static str {
        match self {
            QuickMessage::Ahoy => "Ahoy there, matey!",
            QuickMessage::Parley => "I request parley!",
            QuickMessage::Treasure => "Know ye of any treasure nearby?",
            QuickMessage::Warning => "Beware, these waters be dangerous!",
            QuickMessage::Farewell => "Fair winds and following seas!",
            QuickMessage::Challenge => "Care for a friendly duel?",
            QuickMessage::Trade => "Interested in some trading?",
            QuickMessage::Help => "Could use some assistance, captain!",
        }
    }
}

/// Ephemeral typing broadcast. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub session_id: RecordId,
    pub ship_id: ShipId,
    pub is_typing: bool,
}

/// Local typing indicator: starts on input, stops after a quiet period,
/// on send, or on close. Returns the edge to broadcast, if any.
#[derive(Debug, Clone, Default)]
pub struct TypingState {
    typing: bool,
    last_input_ms: u64,
}

impl TypingState {
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Keystroke. `Some(true)` on the not-typing → typing edge.
    pub fn on_input(&mut self, now_ms: u64) -> Option<bool> {
        self.last_input_ms = now_ms;
        if self.typing {
            None
        } else {
            self.typing = true;
            Some(true)
        }
    }

    /// `Some(false)` once `timeout_ms` has passed without input.
    pub fn tick(&mut self, now_ms: u64, timeout_ms: u64) -> Option<bool> {
        if self.typing && now_ms.saturating_sub(self.last_input_ms) >= timeout_ms {
            self.typing = false;
            Some(false)
        } else {
            None
        }
    }

    pub fn stop(&mut self) -> Option<bool> {
        if self.typing {
            self.typing = false;
            Some(false)
        } else {
            None
        }
    }
}
