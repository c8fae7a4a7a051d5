//! What each reducer decides, without a database.
//!
//! Every function takes the stored record, the version the caller last saw
//! and who is calling, and returns the record to store with its version
//! already bumped. Reducers only load rows, call one of these, and write
//! the result back, so every rule here is testable off-module.

use parley_logic::chat::ChatSession;
use parley_logic::combat::{resolve_turn, CombatRules, CombatSession, TurnOutcome};
use parley_logic::error::InvalidAction;
use parley_logic::session::{InteractionKind, InteractionRequest, Lifecycle, RequestPayload, RequestStatus, ShipId};
use parley_logic::ship::{Ship, ShipStats, StatPatch};
use parley_logic::trade::{check_approval, validate_offer, Offer, TradePolicy, TradeSession};
use rand::Rng;

use crate::records::{expect_version, may_act_as};

fn refuse(e: InvalidAction) -> String {
    e.to_string()
}

/// The stored copy of a record carries the next version.
trait Bumped: Sized {
    fn bumped(self) -> Self;
}

macro_rules! impl_bumped {
    ($($ty:ty),*) => {
        $(impl Bumped for $ty {
            fn bumped(mut self) -> Self {
                self.version += 1;
                self
            }
        })*
    };
}

impl_bumped!(InteractionRequest, CombatSession, TradeSession, ChatSession);

fn next_request(request: &InteractionRequest, status: RequestStatus) -> Result<InteractionRequest, String> {
    let next = request.transition(status).map_err(refuse)?;
    Ok(next.bumped())
}

// ============================================================================
// PIRATES
// ============================================================================

/// Stats after applying `patch` to the caller's own ship. `None` when the
/// patch changes nothing.
pub fn patch_stats(stats: &ShipStats, caller_owns: bool, patch: &StatPatch) -> Result<Option<ShipStats>, String> {
    if !caller_owns {
        return Err("Captains may only change their own ship".to_string());
    }
    if patch.is_empty() {
        return Ok(None);
    }
    Ok(Some(stats.patched(patch)))
}

// ============================================================================
// REQUESTS
// ============================================================================

/// A fresh pending request from `initiator`. `stored_target` is the
/// target's name if it is a registered pirate; anything else is an AI ship
/// and only takes combat.
pub fn new_request(
    initiator: &Ship,
    target_id: ShipId,
    kind: InteractionKind,
    stored_target: Option<String>,
    claimed_name: String,
    created_at_ms: u64,
) -> Result<InteractionRequest, String> {
    if target_id == initiator.id {
        return Err("You cannot hail your own ship".to_string());
    }
    let target_name = match stored_target {
        Some(name) => name,
        None if kind != InteractionKind::Combat => return Err(refuse(InvalidAction::AiOnlyCombat(kind))),
        None => claimed_name,
    };
    let mut request = InteractionRequest::new(
        initiator.id,
        target_id,
        kind,
        RequestPayload {
            initiator_name: initiator.name.clone(),
            target_name,
            created_at_ms,
        },
    );
    request.version = 1;
    Ok(request)
}

/// Accept or decline. The target answers; for an AI target the initiator
/// answers on its behalf.
pub fn respond(
    request: &InteractionRequest,
    expected_version: u64,
    caller: ShipId,
    target_is_pirate: bool,
    accept: bool,
) -> Result<InteractionRequest, String> {
    expect_version(request.version, expected_version)?;
    if !may_act_as(caller, request.target_id, request.participants(), target_is_pirate) {
        return Err(refuse(InvalidAction::NotParticipant(caller)));
    }
    if request.status != RequestStatus::Pending {
        return Err(refuse(InvalidAction::SessionClosed));
    }
    let status = if accept {
        RequestStatus::Active
    } else {
        RequestStatus::Cancelled
    };
    next_request(request, status)
}

/// The initiator takes back a request nobody has answered yet.
pub fn withdraw(request: &InteractionRequest, expected_version: u64, caller: ShipId) -> Result<InteractionRequest, String> {
    expect_version(request.version, expected_version)?;
    if request.initiator_id != caller {
        return Err(refuse(InvalidAction::NotParticipant(caller)));
    }
    if request.status != RequestStatus::Pending {
        return Err(refuse(InvalidAction::SessionClosed));
    }
    next_request(request, RequestStatus::Cancelled)
}

/// Close an active request as `completed` or `cancelled`.
pub fn close(
    request: &InteractionRequest,
    expected_version: u64,
    caller: ShipId,
    status: RequestStatus,
) -> Result<InteractionRequest, String> {
    expect_version(request.version, expected_version)?;
    if !request.involves(caller) {
        return Err(refuse(InvalidAction::NotParticipant(caller)));
    }
    if request.status != RequestStatus::Active {
        return Err(refuse(InvalidAction::SessionClosed));
    }
    next_request(request, status)
}

/// Check that `request` may back a `kind` session opened by `caller`.
pub fn check_active(request: &InteractionRequest, caller: ShipId, kind: InteractionKind) -> Result<(), String> {
    if !request.involves(caller) {
        return Err(refuse(InvalidAction::NotParticipant(caller)));
    }
    if request.kind != kind {
        return Err(format!("Request {} is a {} request", request.id, request.kind.as_str()));
    }
    if request.status != RequestStatus::Active {
        return Err(format!("Request {} is {}", request.id, request.status.as_str()));
    }
    Ok(())
}

// ============================================================================
// COMBAT
// ============================================================================

/// Fire `action_index` as `actor`. The attacker writes the defender's HP.
#[allow(clippy::too_many_arguments)]
pub fn combat_turn<R: Rng + ?Sized>(
    session: &CombatSession,
    expected_version: u64,
    caller: ShipId,
    actor: ShipId,
    actor_is_pirate: bool,
    action_index: usize,
    rules: &CombatRules,
    rng: &mut R,
) -> Result<(CombatSession, TurnOutcome), String> {
    expect_version(session.version, expected_version)?;
    if !may_act_as(caller, actor, session.participants(), actor_is_pirate) {
        return Err(refuse(InvalidAction::NotParticipant(actor)));
    }
    let (next, outcome) = resolve_turn(session, actor, action_index, rules, rng).map_err(refuse)?;
    Ok((next.bumped(), outcome))
}

// ============================================================================
// TRADE
// ============================================================================

/// Replace the caller's own offer. Clears only the caller's approval.
pub fn set_offer(
    session: &TradeSession,
    expected_version: u64,
    caller: &Ship,
    offer: &Offer,
) -> Result<TradeSession, String> {
    expect_version(session.version, expected_version)?;
    validate_offer(&caller.stats, offer).map_err(refuse)?;
    let next = session.with_offer(caller.id, offer).map_err(refuse)?;
    Ok(next.bumped())
}

/// Set the caller's own approval. The other side's approval is untouched.
pub fn approve(
    session: &TradeSession,
    expected_version: u64,
    caller: ShipId,
    approved: bool,
    policy: &TradePolicy,
) -> Result<TradeSession, String> {
    expect_version(session.version, expected_version)?;
    if approved {
        check_approval(session, caller, policy).map_err(refuse)?;
    }
    let next = session.with_approval(caller, approved).map_err(refuse)?;
    Ok(next.bumped())
}

/// Mark the trade completed. Only a snapshot with both approvals commits,
/// and the version check lets exactly one commit through.
pub fn commit(session: &TradeSession, expected_version: u64, caller: ShipId) -> Result<TradeSession, String> {
    expect_version(session.version, expected_version)?;
    if !session.involves(caller) {
        return Err(refuse(InvalidAction::NotParticipant(caller)));
    }
    let next = session
        .commit()
        .ok_or_else(|| "Both captains must approve first".to_string())?;
    Ok(next.bumped())
}

// ============================================================================
// CHAT
// ============================================================================

pub fn send(
    session: &ChatSession,
    expected_version: u64,
    caller: &Ship,
    content: &str,
    now_ms: u64,
) -> Result<ChatSession, String> {
    expect_version(session.version, expected_version)?;
    let next = session
        .with_message(caller.id, &caller.name, content, now_ms)
        .map_err(refuse)?;
    Ok(next.bumped())
}

/// `None` when nothing is unread; nothing gets written then.
pub fn mark_read(session: &ChatSession, expected_version: u64, caller: ShipId) -> Result<Option<ChatSession>, String> {
    expect_version(session.version, expected_version)?;
    Ok(session.with_read_by(caller).map(Bumped::bumped))
}

pub fn close_chat(session: &ChatSession, expected_version: u64, caller: ShipId) -> Result<ChatSession, String> {
    expect_version(session.version, expected_version)?;
    let next = session.closed(caller).map_err(refuse)?;
    Ok(next.bumped())
}
