//! Client-facing reducers for pirates, interaction requests and sessions.
//!
//! Every reducer that changes an existing row takes the version the caller
//! last observed and fails with a version conflict if the row has moved on.
//! A failed reducer writes nothing; SpacetimeDB reports the error string
//! back to the calling client. The decisions themselves live in
//! [`crate::intents`].

use crate::intents;
use crate::tables::*;
use parley_logic::chat::ChatSession;
use parley_logic::combat::{CombatSession, CombatStatus, TurnOutcome};
use parley_logic::config::{validate_config, ParleyConfig};
use parley_logic::error::StoreError;
use parley_logic::session::{InteractionKind, InteractionRequest, RequestStatus};
use parley_logic::ship::{ShipStats, StatPatch};
use parley_logic::trade::{decode_offer, TradeSession};
use rand::rngs::StdRng;
use rand::SeedableRng;
use spacetimedb::{reducer, ReducerContext, Table};

// ============================================================================
// LIFECYCLE
// ============================================================================

#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    let config_json = ParleyConfig::default().to_json().unwrap_or_else(|e| {
        log::warn!("Default config failed to serialize: {}", e);
        "{}".to_string()
    });
    ctx.db.settings().insert(Settings { id: 0, config_json });
    log::info!("Parley module initialized");
}

/// Called when a client connects
#[reducer(client_connected)]
pub fn client_connected(ctx: &ReducerContext) {
    match ctx.db.pirate().owner().find(ctx.sender) {
        Some(p) => log::info!("Captain {} ({}) is back aboard", p.name, p.id),
        None => log::info!("Client connected: {:?}", ctx.sender),
    }
}

/// Called when a client disconnects
#[reducer(client_disconnected)]
pub fn client_disconnected(ctx: &ReducerContext) {
    log::info!("Client disconnected: {:?}", ctx.sender);
}

/// Replace the module's tunables. Rejects configs that fail validation.
#[reducer]
pub fn set_config(ctx: &ReducerContext, config_json: String) -> Result<(), String> {
    let config = ParleyConfig::from_json(&config_json).map_err(|e| format!("invalid config: {}", e))?;
    let errors = validate_config(&config);
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(joined.join("; "));
    }
    let settings = Settings { id: 0, config_json };
    if ctx.db.settings().id().find(0).is_some() {
        ctx.db.settings().id().update(settings);
    } else {
        ctx.db.settings().insert(settings);
    }
    log::info!("Config updated");
    Ok(())
}

// ============================================================================
// PIRATE REDUCERS
// ============================================================================

/// Create the caller's ship. One per identity.
#[reducer]
pub fn register_pirate(ctx: &ReducerContext, name: String, x: f32, y: f32) -> Result<(), String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err("Every ship needs a name".to_string());
    }
    if let Some(existing) = ctx.db.pirate().owner().find(ctx.sender) {
        log::warn!("Identity already sails ship {}", existing.id);
        return Err(format!("You already captain {}", existing.name));
    }
    let mut pirate = Pirate {
        id: 0,
        owner: ctx.sender,
        name,
        x,
        y,
        hull: 0,
        max_hull: 0,
        crew: 0,
        booty: 0,
        cargo: String::new(),
        combat_wins: 0,
        combat_losses: 0,
        trades_completed: 0,
        version: 1,
    };
    pirate.set_stats(&ShipStats::default())?;
    let row = ctx.db.pirate().insert(pirate);
    log::info!("Pirate {} registered as ship {}", row.name, row.id);
    Ok(())
}

/// Write the changed stat fields of the caller's own ship.
#[reducer]
pub fn update_stats(ctx: &ReducerContext, pirate_id: u64, patch_json: String) -> Result<(), String> {
    let mut row = find_pirate(ctx, pirate_id)?;
    let patch: StatPatch = serde_json::from_str(&patch_json).map_err(|e| format!("invalid stat patch: {}", e))?;
    let ship = row.to_ship()?;
    let owns = row.owner == ctx.sender;
    if !owns {
        log::warn!("{:?} tried to change stats of ship {}", ctx.sender, pirate_id);
    }
    let Some(stats) = intents::patch_stats(&ship.stats, owns, &patch)? else {
        return Ok(());
    };
    row.set_stats(&stats)?;
    row.version += 1;
    log::info!("Ship {} stats updated (v{})", row.id, row.version);
    ctx.db.pirate().id().update(row);
    Ok(())
}

/// Persist the caller's committed position.
#[reducer]
pub fn commit_position(ctx: &ReducerContext, x: f32, y: f32) -> Result<(), String> {
    if !x.is_finite() || !y.is_finite() {
        return Err("Position must be finite".to_string());
    }
    let mut row = caller_pirate(ctx)?;
    row.x = x;
    row.y = y;
    row.version += 1;
    ctx.db.pirate().id().update(row);
    Ok(())
}

// ============================================================================
// REQUEST REDUCERS
// ============================================================================

/// Ask `target_id` for a session. AI targets only accept combat.
#[reducer]
pub fn create_request(
    ctx: &ReducerContext,
    target_id: u64,
    kind: String,
    target_name: String,
    created_at_ms: u64,
) -> Result<(), String> {
    let me = caller_pirate(ctx)?.to_ship()?;
    let kind = InteractionKind::parse(&kind).ok_or_else(|| format!("unknown interaction kind '{}'", kind))?;
    let stored_target = ctx.db.pirate().id().find(target_id).map(|p| p.name);
    let request = intents::new_request(&me, target_id, kind, stored_target, target_name, created_at_ms)?;
    let row = ctx.db.interaction_request().insert(Interaction::from_request(&request));
    log::info!("{} requests {} with ship {} (request {})", me.name, row.kind, target_id, row.id);
    Ok(())
}

/// Accept or decline a pending request. The target answers; for an AI
/// target the initiator answers on its behalf.
#[reducer]
pub fn respond_request(ctx: &ReducerContext, request_id: u64, expected_version: u64, accept: bool) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let request = load_request(ctx, request_id)?;
    let target_is_pirate = is_pirate(ctx, request.target_id);
    let next = intents::respond(&request, expected_version, me.id, target_is_pirate, accept)?;
    log::info!("Request {} {} by ship {}", request_id, next.status.as_str(), me.id);
    write_request(ctx, &next);
    Ok(())
}

/// The initiator takes back a request nobody has answered yet.
#[reducer]
pub fn withdraw_request(ctx: &ReducerContext, request_id: u64, expected_version: u64) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let request = load_request(ctx, request_id)?;
    write_request(ctx, &intents::withdraw(&request, expected_version, me.id)?);
    log::info!("Request {} withdrawn by ship {}", request_id, me.id);
    Ok(())
}

/// Close an active request as `completed` or `cancelled`.
#[reducer]
pub fn close_request(ctx: &ReducerContext, request_id: u64, expected_version: u64, status: String) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let next = RequestStatus::parse(&status).ok_or_else(|| format!("unknown request status '{}'", status))?;
    let request = load_request(ctx, request_id)?;
    write_request(ctx, &intents::close(&request, expected_version, me.id, next)?);
    log::info!("Request {} closed as {} by ship {}", request_id, next.as_str(), me.id);
    Ok(())
}

// ============================================================================
// SESSION CREATION
// ============================================================================

// Both captains may race to open the same session. The session id is the
// request id, so the second call finds the row and leaves it alone.

#[reducer]
pub fn open_combat_session(ctx: &ReducerContext, request_id: u64) -> Result<(), String> {
    let request = active_request(ctx, request_id, InteractionKind::Combat)?;
    if ctx.db.combat_session().id().find(request_id).is_some() {
        log::debug!("Combat {} already open", request_id);
        return Ok(());
    }
    let config = load_config(ctx);
    let mut session = CombatSession::open(&request, &config.combat);
    session.version = 1;
    ctx.db.combat_session().insert(CombatRecord::from_session(&session)?);
    log::info!("Combat {} opened: {} vs {}", request_id, session.player1_id, session.player2_id);
    Ok(())
}

#[reducer]
pub fn open_trade_session(ctx: &ReducerContext, request_id: u64) -> Result<(), String> {
    let request = active_request(ctx, request_id, InteractionKind::Trade)?;
    if ctx.db.trade_session().id().find(request_id).is_some() {
        log::debug!("Trade {} already open", request_id);
        return Ok(());
    }
    let mut session = TradeSession::open(&request);
    session.version = 1;
    ctx.db.trade_session().insert(TradeRecord::from_session(&session)?);
    log::info!("Trade {} opened: {} and {}", request_id, session.player1_id, session.player2_id);
    Ok(())
}

#[reducer]
pub fn open_chat_session(ctx: &ReducerContext, request_id: u64) -> Result<(), String> {
    let request = active_request(ctx, request_id, InteractionKind::Chat)?;
    if ctx.db.chat_session().id().find(request_id).is_some() {
        log::debug!("Chat {} already open", request_id);
        return Ok(());
    }
    let mut session = ChatSession::open(&request);
    session.version = 1;
    ctx.db.chat_session().insert(ChatRecord::from_session(&session)?);
    log::info!("Chat {} opened: {} and {}", request_id, session.player1_id, session.player2_id);
    Ok(())
}

// ============================================================================
// COMBAT REDUCERS
// ============================================================================

/// Fire `action_index` as `actor_id`. The attacker writes the defender's HP.
#[reducer]
pub fn combat_turn(
    ctx: &ReducerContext,
    session_id: u64,
    expected_version: u64,
    actor_id: u64,
    action_index: u32,
) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let session = ctx
        .db
        .combat_session()
        .id()
        .find(session_id)
        .ok_or_else(|| StoreError::NotFound(session_id).to_string())?
        .to_session()?;

    let config = load_config(ctx);
    let seed = ctx.timestamp.to_micros_since_unix_epoch() as u64 ^ session_id.rotate_left(32) ^ session.turn_number as u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let (next, outcome) = intents::combat_turn(
        &session,
        expected_version,
        me.id,
        actor_id,
        is_pirate(ctx, actor_id),
        action_index as usize,
        &config.combat,
        &mut rng,
    )?;

    match outcome {
        TurnOutcome::Hit { damage } => log::info!("Combat {}: ship {} hits for {}", session_id, actor_id, damage),
        TurnOutcome::Miss => log::info!("Combat {}: ship {} misses", session_id, actor_id),
        TurnOutcome::Repaired { amount } => log::info!("Combat {}: ship {} repairs {}", session_id, actor_id, amount),
        TurnOutcome::Defended => log::info!("Combat {}: ship {} braces", session_id, actor_id),
    }
    if next.status == CombatStatus::Completed {
        log::info!("Combat {} won by {:?}", session_id, next.winner_id);
    }

    ctx.db.combat_session().id().update(CombatRecord::from_session(&next)?);
    Ok(())
}

// ============================================================================
// TRADE REDUCERS
// ============================================================================

/// Replace the caller's own offer. Clears the caller's own approval.
#[reducer]
pub fn trade_set_offer(ctx: &ReducerContext, session_id: u64, expected_version: u64, offer_json: String) -> Result<(), String> {
    let me = caller_pirate(ctx)?.to_ship()?;
    let session = load_trade(ctx, session_id)?;
    let offer = decode_offer(&offer_json).map_err(|e| format!("invalid offer: {}", e))?;
    write_trade(ctx, &intents::set_offer(&session, expected_version, &me, &offer)?)?;
    log::info!("Trade {}: ship {} offers {}", session_id, me.id, offer_json);
    Ok(())
}

#[reducer]
pub fn trade_approve(ctx: &ReducerContext, session_id: u64, expected_version: u64, approved: bool) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let session = load_trade(ctx, session_id)?;
    let policy = load_config(ctx).trade;
    write_trade(ctx, &intents::approve(&session, expected_version, me.id, approved, &policy)?)?;
    log::info!("Trade {}: ship {} approval {}", session_id, me.id, approved);
    Ok(())
}

/// Mark the trade completed. Only a snapshot with both approvals commits,
/// and the version check lets exactly one commit through.
#[reducer]
pub fn trade_commit(ctx: &ReducerContext, session_id: u64, expected_version: u64) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let session = load_trade(ctx, session_id)?;
    write_trade(ctx, &intents::commit(&session, expected_version, me.id)?)?;
    log::info!("Trade {} completed", session_id);
    Ok(())
}

// ============================================================================
// CHAT REDUCERS
// ============================================================================

#[reducer]
pub fn chat_send(ctx: &ReducerContext, session_id: u64, expected_version: u64, content: String) -> Result<(), String> {
    let me = caller_pirate(ctx)?.to_ship()?;
    let session = load_chat(ctx, session_id)?;
    write_chat(ctx, &intents::send(&session, expected_version, &me, &content, now_ms(ctx))?)
}

/// Mark the other captain's messages read. Nothing unread writes nothing.
#[reducer]
pub fn chat_mark_read(ctx: &ReducerContext, session_id: u64, expected_version: u64) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let session = load_chat(ctx, session_id)?;
    match intents::mark_read(&session, expected_version, me.id)? {
        Some(next) => write_chat(ctx, &next),
        None => Ok(()),
    }
}

#[reducer]
pub fn chat_close(ctx: &ReducerContext, session_id: u64, expected_version: u64) -> Result<(), String> {
    let me = caller_pirate(ctx)?;
    let session = load_chat(ctx, session_id)?;
    write_chat(ctx, &intents::close_chat(&session, expected_version, me.id)?)?;
    log::info!("Chat {} closed by ship {}", session_id, me.id);
    Ok(())
}

// ============================================================================
// HELPERS
// ============================================================================

fn caller_pirate(ctx: &ReducerContext) -> Result<Pirate, String> {
    ctx.db
        .pirate()
        .owner()
        .find(ctx.sender)
        .ok_or_else(|| "Register a ship first".to_string())
}

fn find_pirate(ctx: &ReducerContext, id: u64) -> Result<Pirate, String> {
    ctx.db
        .pirate()
        .id()
        .find(id)
        .ok_or_else(|| StoreError::NotFound(id).to_string())
}

fn is_pirate(ctx: &ReducerContext, id: u64) -> bool {
    ctx.db.pirate().id().find(id).is_some()
}

fn load_config(ctx: &ReducerContext) -> ParleyConfig {
    let Some(settings) = ctx.db.settings().id().find(0) else {
        return ParleyConfig::default();
    };
    ParleyConfig::from_json(&settings.config_json).unwrap_or_else(|e| {
        log::warn!("Stored config unreadable, using defaults: {}", e);
        ParleyConfig::default()
    })
}

fn now_ms(ctx: &ReducerContext) -> u64 {
    (ctx.timestamp.to_micros_since_unix_epoch() / 1000).max(0) as u64
}

fn load_request(ctx: &ReducerContext, id: u64) -> Result<InteractionRequest, String> {
    ctx.db
        .interaction_request()
        .id()
        .find(id)
        .ok_or_else(|| StoreError::NotFound(id).to_string())?
        .to_request()
}

/// An active request of `kind` that the caller takes part in.
fn active_request(ctx: &ReducerContext, id: u64, kind: InteractionKind) -> Result<InteractionRequest, String> {
    let me = caller_pirate(ctx)?;
    let request = load_request(ctx, id)?;
    intents::check_active(&request, me.id, kind)?;
    Ok(request)
}

fn write_request(ctx: &ReducerContext, request: &InteractionRequest) {
    ctx.db.interaction_request().id().update(Interaction::from_request(request));
}

fn load_trade(ctx: &ReducerContext, id: u64) -> Result<TradeSession, String> {
    ctx.db
        .trade_session()
        .id()
        .find(id)
        .ok_or_else(|| StoreError::NotFound(id).to_string())?
        .to_session()
}

fn write_trade(ctx: &ReducerContext, session: &TradeSession) -> Result<(), String> {
    ctx.db.trade_session().id().update(TradeRecord::from_session(session)?);
    Ok(())
}

fn load_chat(ctx: &ReducerContext, id: u64) -> Result<ChatSession, String> {
    ctx.db
        .chat_session()
        .id()
        .find(id)
        .ok_or_else(|| StoreError::NotFound(id).to_string())?
        .to_session()
}

fn write_chat(ctx: &ReducerContext, session: &ChatSession) -> Result<(), String> {
    ctx.db.chat_session().id().update(ChatRecord::from_session(session)?);
    Ok(())
}
