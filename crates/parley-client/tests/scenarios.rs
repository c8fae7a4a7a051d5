//! End-to-end sessions between clients sharing one `MemoryStore`.

use parley_client::ai::StaticFleet;
use parley_client::feed::{Row, Table};
use parley_client::registry::SessionHandler;
use parley_client::store::fetch;
use parley_client::ui::UiEvent;
use parley_client::{ConnectError, MemoryStore, PirateClient, SessionStore};
use parley_logic::chat::{ChatSession, ChatStatus, QuickMessage};
use parley_logic::combat::{ActionEffect, CombatAction, CombatRules, CombatSession, CombatStatus};
use parley_logic::config::{ConfigError, ParleyConfig};
use parley_logic::error::{InteractionError, InvalidAction};
use parley_logic::movement::{MoveInput, OpenSea};
use parley_logic::session::{InteractionKind, InteractionRequest, RecordId, RequestStatus, ShipId};
use parley_logic::ship::{Resource, Ship, StatPatch};
use parley_logic::trade::{Offer, TradeSession, TradeStatus};

type Client = PirateClient<MemoryStore>;

// ── Helpers ──────────────────────────────────────────────────────────────

/// One action: always hits for exactly 50.
fn broadside_config() -> ParleyConfig {
    ParleyConfig {
        combat: CombatRules {
            starting_hp: 100,
            actions: vec![CombatAction {
                name: "Broadside".into(),
                description: "Every gun at once".into(),
                min: 50,
                max: 50,
                accuracy: 1.0,
                effect: ActionEffect::Damage,
            }],
        },
        ..Default::default()
    }
}

fn join(store: &MemoryStore, config: &ParleyConfig, id: ShipId, name: &str, x: f32) -> Client {
    PirateClient::connect(store.as_caller(id), config.clone(), id, name, x, 100.0)
        .unwrap()
        .with_seed(id)
}

/// Put a ship in the store before its captain connects.
fn seed(store: &MemoryStore, id: ShipId, name: &str, x: f32, booty: u32, pearls: u32) {
    let mut ship = Ship::new(id, name, x, 100.0);
    ship.stats.booty = booty;
    if pearls > 0 {
        ship.stats.cargo.insert(Resource::Pearls, pearls);
    }
    store.insert(Row::Pirate(ship)).unwrap();
}

fn pump_all(a: &mut Client, b: &mut Client) {
    for _ in 0..10 {
        if a.pump() + b.pump() == 0 {
            break;
        }
    }
}

/// Anne (1) and Mary (2), three units apart and aware of each other.
fn pair(store: &MemoryStore, config: &ParleyConfig) -> (Client, Client) {
    let mut a = join(store, config, 1, "Anne", 100.0);
    let mut b = join(store, config, 2, "Mary", 103.0);
    pump_all(&mut a, &mut b);
    a.scan_now();
    b.scan_now();
    (a, b)
}

/// Initiate from `a`, accept on `b`, and let both sides open the session.
fn open_session(a: &mut Client, b: &mut Client, kind: InteractionKind) -> RecordId {
    let id = a.initiate(b.ship().id, kind).unwrap().id;
    pump_all(a, b);
    b.respond(id, true).unwrap();
    pump_all(a, b);
    assert!(a.session(id).is_some(), "initiator never opened session {}", id);
    assert!(b.session(id).is_some(), "target never opened session {}", id);
    id
}

fn offer(resource: Resource, qty: u32) -> Offer {
    let mut o = Offer::new();
    o.insert(resource, qty);
    o
}

fn closed_with(events: &[UiEvent], wanted: RequestStatus) -> bool {
    events
        .iter()
        .any(|e| matches!(e, UiEvent::SessionClosed { status, .. } if *status == wanted))
}

fn stored_request(store: &MemoryStore, id: RecordId) -> InteractionRequest {
    fetch(store, id).unwrap()
}

// ── 1. Combat to the finish ──────────────────────────────────────────────

#[test]
fn combat_three_turns_to_victory() {
    let store = MemoryStore::new();
    let config = broadside_config();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Combat);

    a.combat_action(id, 0).unwrap();
    pump_all(&mut a, &mut b);
    b.combat_action(id, 0).unwrap();
    pump_all(&mut a, &mut b);
    a.combat_action(id, 0).unwrap();
    pump_all(&mut a, &mut b);

    let combat: CombatSession = fetch(&store, id).unwrap();
    assert_eq!(combat.status, CombatStatus::Completed);
    assert_eq!(combat.winner_id, Some(1));
    assert_eq!(combat.player2_hp, 0);
    assert_eq!(combat.player1_hp, 50);
    assert_eq!(combat.turn_number, 4);
    assert_eq!(combat.combat_log.last().map(String::as_str), Some("Player 1 wins the battle!"));

    assert_eq!(stored_request(&store, id).status, RequestStatus::Completed);
    assert!(a.session(id).is_none());
    assert!(b.session(id).is_none());

    assert_eq!(a.ship().stats.booty, 10);
    assert_eq!(a.ship().stats.hull, 95);
    assert_eq!(a.ship().stats.combat_wins, 1);
    assert_eq!(b.ship().stats.booty, 0);
    assert_eq!(b.ship().stats.hull, 85);
    assert_eq!(b.ship().stats.combat_losses, 1);

    assert!(closed_with(&a.drain_ui(), RequestStatus::Completed));
    assert!(closed_with(&b.drain_ui(), RequestStatus::Completed));
}

#[test]
fn acting_out_of_turn_is_refused() {
    let store = MemoryStore::new();
    let config = broadside_config();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Combat);
    let writes = store.audit().len();
    let err = b.combat_action(id, 0).unwrap_err();
    assert_eq!(err, InteractionError::InvalidAction(InvalidAction::NotYourTurn));
    assert_eq!(store.audit().len(), writes);
}

// ── 2. Trade ─────────────────────────────────────────────────────────────

#[test]
fn trade_gold_for_pearls() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    seed(&store, 1, "Anne", 100.0, 50, 0);
    seed(&store, 2, "Mary", 103.0, 0, 5);
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Trade);

    a.set_offer(id, &offer(Resource::GoldCoins, 10)).unwrap();
    a.approve_trade(id).unwrap();
    pump_all(&mut a, &mut b);
    b.set_offer(id, &offer(Resource::Pearls, 2)).unwrap();
    b.approve_trade(id).unwrap();
    pump_all(&mut a, &mut b);

    let trade: TradeSession = fetch(&store, id).unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    assert_eq!(stored_request(&store, id).status, RequestStatus::Completed);

    assert_eq!(a.ship().stats.booty, 40);
    assert_eq!(a.ship().stats.available(Resource::Pearls), 2);
    assert_eq!(a.ship().stats.trades_completed, 1);
    assert_eq!(b.ship().stats.booty, 10);
    assert_eq!(b.ship().stats.available(Resource::Pearls), 3);
    assert_eq!(b.ship().stats.trades_completed, 1);

    let stored: Ship = fetch(&store, 2).unwrap();
    assert_eq!(stored.stats, b.ship().stats);
}

#[test]
fn editing_offer_withdraws_own_approval() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    seed(&store, 1, "Anne", 100.0, 50, 0);
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Trade);

    a.set_offer(id, &offer(Resource::GoldCoins, 10)).unwrap();
    a.approve_trade(id).unwrap();
    a.set_offer(id, &offer(Resource::GoldCoins, 5)).unwrap();

    let trade: TradeSession = fetch(&store, id).unwrap();
    assert!(!trade.player1_approved);
    assert_eq!(trade.player1_offer.get(&Resource::GoldCoins), Some(&5));
    assert_eq!(trade.status, TradeStatus::Negotiating);
}

#[test]
fn simultaneous_approvals_commit_once() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    seed(&store, 1, "Anne", 100.0, 50, 0);
    seed(&store, 2, "Mary", 103.0, 0, 5);
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Trade);

    a.set_offer(id, &offer(Resource::GoldCoins, 10)).unwrap();
    pump_all(&mut a, &mut b);
    b.set_offer(id, &offer(Resource::Pearls, 2)).unwrap();
    pump_all(&mut a, &mut b);

    // neither side has seen the other's approval when it approves
    a.approve_trade(id).unwrap();
    b.approve_trade(id).unwrap();
    pump_all(&mut a, &mut b);

    let commits = store
        .audit()
        .into_iter()
        .filter(|w| matches!(&w.row, Row::Trade(t) if t.status == TradeStatus::Completed))
        .count();
    assert_eq!(commits, 1);
    assert_eq!(a.ship().stats.trades_completed, 1);
    assert_eq!(b.ship().stats.trades_completed, 1);
    assert_eq!(a.ship().stats.booty, 40);
    assert_eq!(b.ship().stats.booty, 10);
}

#[test]
fn overdrawn_offer_refused() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Trade);
    let err = a.set_offer(id, &offer(Resource::GoldCoins, 10)).unwrap_err();
    assert!(matches!(
        err,
        InteractionError::InvalidAction(InvalidAction::InsufficientHoldings { .. })
    ));
    let err = a.approve_trade(id).unwrap_err();
    assert_eq!(err, InteractionError::InvalidAction(InvalidAction::EmptyOffer));
}

#[test]
fn walking_away_cancels_for_both() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    seed(&store, 1, "Anne", 100.0, 50, 0);
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Trade);
    a.set_offer(id, &offer(Resource::GoldCoins, 10)).unwrap();
    a.approve_trade(id).unwrap();
    a.cancel_trade(id).unwrap();
    pump_all(&mut a, &mut b);

    assert_eq!(stored_request(&store, id).status, RequestStatus::Cancelled);
    assert!(a.session(id).is_none());
    assert!(b.session(id).is_none());
    assert!(closed_with(&b.drain_ui(), RequestStatus::Cancelled));
    assert_eq!(a.ship().stats.booty, 50);
}

// ── 3. Negotiation ───────────────────────────────────────────────────────

#[test]
fn declined_combat_never_opens() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let id = a.initiate(2, InteractionKind::Combat).unwrap().id;
    pump_all(&mut a, &mut b);
    assert!(b
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::RequestPrompt(r) if r.id == id)));

    b.respond(id, false).unwrap();
    pump_all(&mut a, &mut b);

    assert_eq!(stored_request(&store, id).status, RequestStatus::Cancelled);
    assert!(store.list(Table::CombatSession).unwrap().is_empty());
    assert!(a
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::RequestCancelled(r) if r.id == id)));
}

#[test]
fn stale_target_writes_nothing() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let mut far = join(&store, &config, 3, "Jack", 600.0);
    pump_all(&mut a, &mut far);
    a.scan_now();

    let writes = store.audit().len();
    let err = a.initiate(3, InteractionKind::Chat).unwrap_err();
    assert_eq!(err, InteractionError::StaleTarget { target_id: 3 });
    assert_eq!(store.audit().len(), writes);
    assert_eq!(err.to_string(), "Target ship has sailed away!");
    pump_all(&mut b, &mut far);
}

#[test]
fn target_that_sailed_off_is_stale() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let east = MoveInput {
        right: true,
        ..Default::default()
    };
    a.tick(east, 1000, 1.0, &OpenSea);
    pump_all(&mut a, &mut b);
    b.scan_now();
    assert!(b.nearby().is_empty());
    let err = b.initiate(1, InteractionKind::Chat).unwrap_err();
    assert_eq!(err, InteractionError::StaleTarget { target_id: 1 });
}

#[test]
fn withdrawn_request_cannot_be_accepted() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let id = a.initiate(2, InteractionKind::Trade).unwrap().id;
    pump_all(&mut a, &mut b);
    a.withdraw(id).unwrap();
    pump_all(&mut a, &mut b);

    assert!(b
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::RequestCancelled(r) if r.id == id)));
    b.respond(id, true).unwrap();
    assert_eq!(stored_request(&store, id).status, RequestStatus::Cancelled);
    assert!(store.list(Table::TradeSession).unwrap().is_empty());
    assert!(b.incoming().is_empty());
}

#[test]
fn failed_write_leaves_everything_as_it_was() {
    let store = MemoryStore::new();
    let config = broadside_config();
    let (mut a, mut b) = pair(&store, &config);
    let id = a.initiate(2, InteractionKind::Combat).unwrap().id;
    pump_all(&mut a, &mut b);

    store.fail_next_writes(1);
    let err = b.respond(id, true).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(stored_request(&store, id).status, RequestStatus::Pending);
    assert_eq!(b.incoming().len(), 1);

    b.respond(id, true).unwrap();
    pump_all(&mut a, &mut b);
    let before: CombatSession = fetch(&store, id).unwrap();
    store.fail_next_writes(1);
    assert!(a.combat_action(id, 0).unwrap_err().is_retryable());
    let after: CombatSession = fetch(&store, id).unwrap();
    assert_eq!(before, after);
    match a.session(id) {
        Some(SessionHandler::Combat(h)) => assert_eq!(h.session(), &before),
        other => panic!("expected combat handler, got {:?}", other),
    }
    a.combat_action(id, 0).unwrap();
}

#[test]
fn one_session_per_pair() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    open_session(&mut a, &mut b, InteractionKind::Chat);
    assert_eq!(
        a.initiate(2, InteractionKind::Trade).unwrap_err(),
        InteractionError::InvalidAction(InvalidAction::AlreadyInSession(2))
    );
    assert_eq!(
        b.initiate(1, InteractionKind::Combat).unwrap_err(),
        InteractionError::InvalidAction(InvalidAction::AlreadyInSession(1))
    );
}

#[test]
fn crossed_requests_settle_on_the_older_one() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let first = a.initiate(2, InteractionKind::Chat).unwrap().id;
    let second = b.initiate(1, InteractionKind::Chat).unwrap().id;
    pump_all(&mut a, &mut b);

    a.respond(second, true).unwrap();
    b.respond(first, true).unwrap();
    pump_all(&mut a, &mut b);

    assert_eq!(a.session_with(2), Some(first));
    assert_eq!(b.session_with(1), Some(first));
    assert_eq!(a.open_sessions(), vec![first]);
    assert_eq!(stored_request(&store, second).status, RequestStatus::Cancelled);
    assert_eq!(stored_request(&store, first).status, RequestStatus::Active);
}

#[test]
fn registry_limit_refuses_new_sessions() {
    let store = MemoryStore::new();
    let config = ParleyConfig {
        max_open_sessions: 1,
        ..Default::default()
    };
    let (mut a, mut b) = pair(&store, &config);
    let mut c = join(&store, &config, 3, "Jack", 101.0);
    pump_all(&mut a, &mut c);
    pump_all(&mut b, &mut c);
    a.scan_now();
    c.scan_now();

    open_session(&mut a, &mut b, InteractionKind::Chat);
    assert_eq!(
        a.initiate(3, InteractionKind::Chat).unwrap_err(),
        InteractionError::InvalidAction(InvalidAction::RegistryFull(1))
    );
    let id = c.initiate(1, InteractionKind::Chat).unwrap().id;
    pump_all(&mut a, &mut c);
    assert_eq!(
        a.respond(id, true).unwrap_err(),
        InteractionError::InvalidAction(InvalidAction::RegistryFull(1))
    );
}

// ── 4. Feed anomalies and trust ──────────────────────────────────────────

#[test]
fn repeated_and_replayed_deliveries_reward_once() {
    let store = MemoryStore::new();
    store.set_duplicate_delivery(true);
    let config = broadside_config();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Combat);

    a.combat_action(id, 0).unwrap();
    pump_all(&mut a, &mut b);
    let opening = store
        .audit()
        .into_iter()
        .find(|w| w.table == Table::CombatSession && w.version == 1)
        .map(|w| w.row)
        .unwrap();
    store.replay(opening);
    pump_all(&mut a, &mut b);
    b.combat_action(id, 0).unwrap();
    pump_all(&mut a, &mut b);
    a.combat_action(id, 0).unwrap();
    pump_all(&mut a, &mut b);

    let finished = fetch::<CombatSession>(&store, id).unwrap();
    store.replay(Row::Combat(finished));
    pump_all(&mut a, &mut b);

    assert_eq!(a.ship().stats.combat_wins, 1);
    assert_eq!(a.ship().stats.booty, 10);
    assert_eq!(b.ship().stats.combat_losses, 1);
    let stat_writes = |ship: ShipId| {
        store
            .audit()
            .iter()
            .filter(|w| w.table == Table::Pirate && w.id == ship && w.version > 1)
            .count()
    };
    assert_eq!(stat_writes(1), 1);
    assert_eq!(stat_writes(2), 1);
}

#[test]
fn repeated_deliveries_settle_trade_once() {
    let store = MemoryStore::new();
    store.set_duplicate_delivery(true);
    let config = ParleyConfig::default();
    seed(&store, 1, "Anne", 100.0, 50, 0);
    seed(&store, 2, "Mary", 103.0, 0, 5);
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Trade);
    a.set_offer(id, &offer(Resource::GoldCoins, 10)).unwrap();
    a.approve_trade(id).unwrap();
    pump_all(&mut a, &mut b);
    b.set_offer(id, &offer(Resource::Pearls, 2)).unwrap();
    b.approve_trade(id).unwrap();
    pump_all(&mut a, &mut b);

    assert_eq!(a.ship().stats.booty, 40);
    assert_eq!(b.ship().stats.booty, 10);
    assert_eq!(a.ship().stats.trades_completed, 1);
    assert_eq!(b.ship().stats.trades_completed, 1);
}

#[test]
fn attacker_writes_victim_hp_but_never_victim_stats() {
    let store = MemoryStore::new();
    let config = broadside_config();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Combat);
    a.combat_action(id, 0).unwrap();

    let hit = store
        .audit()
        .into_iter()
        .find(|w| w.table == Table::CombatSession && w.version == 2)
        .unwrap();
    assert_eq!(hit.caller, Some(1));
    match hit.row {
        Row::Combat(c) => assert_eq!(c.player2_hp, 50),
        other => panic!("expected combat row, got {:?}", other),
    }

    let anne = store.as_caller(1);
    let patch = StatPatch {
        hull: Some(1),
        ..Default::default()
    };
    assert!(anne.update_stats(2, &patch).is_err());
    assert!(store
        .audit()
        .iter()
        .filter(|w| w.table == Table::Pirate)
        .all(|w| w.caller.map_or(true, |c| c == w.id)));
    pump_all(&mut a, &mut b);
}

// ── 5. AI ships ──────────────────────────────────────────────────────────

#[test]
fn ai_ship_accepts_and_fights_back() {
    let store = MemoryStore::new();
    let config = broadside_config();
    let fleet = StaticFleet::new(vec![Ship::ai(50, "Black Bart", 104.0, 100.0)]);
    let mut a = join(&store, &config, 1, "Anne", 100.0).with_fleet(fleet);
    a.scan_now();

    assert_eq!(
        a.initiate(50, InteractionKind::Trade).unwrap_err(),
        InteractionError::InvalidAction(InvalidAction::AiOnlyCombat(InteractionKind::Trade))
    );
    let id = a.initiate(50, InteractionKind::Combat).unwrap().id;
    assert_eq!(stored_request(&store, id).status, RequestStatus::Active);
    assert_eq!(a.session_with(50), Some(id));

    a.combat_action(id, 0).unwrap();
    a.pump();
    let mid: CombatSession = fetch(&store, id).unwrap();
    assert_eq!(mid.player1_hp, 50, "AI ship should have fired back");
    assert_eq!(mid.current_turn, 1);

    a.combat_action(id, 0).unwrap();
    a.pump();
    let done: CombatSession = fetch(&store, id).unwrap();
    assert_eq!(done.winner_id, Some(1));
    assert_eq!(a.ship().stats.combat_wins, 1);
    assert!(store.get(Table::Pirate, 50).unwrap().is_none());
}

// ── 6. Chat ──────────────────────────────────────────────────────────────

#[test]
fn chat_exchange_typing_and_close() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Chat);
    b.drain_ui();

    a.typing_input(id).unwrap();
    pump_all(&mut a, &mut b);
    assert!(b
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::PeerTyping { typing: true, .. })));

    a.send_message(id, "  Ahoy there  ").unwrap();
    a.send_quick(id, QuickMessage::Treasure).unwrap();
    pump_all(&mut a, &mut b);
    let ui = b.drain_ui();
    assert!(ui
        .iter()
        .any(|e| matches!(e, UiEvent::PeerTyping { typing: false, .. })));
    match b.session(id) {
        Some(SessionHandler::Chat(h)) => {
            assert_eq!(h.session().messages.len(), 2);
            assert_eq!(h.session().messages[0].content, "Ahoy there");
            assert_eq!(h.session().unread_for(2), 2);
        }
        other => panic!("expected chat handler, got {:?}", other),
    }

    b.mark_read(id).unwrap();
    assert_eq!(
        a.send_message(id, "   ").unwrap_err(),
        InteractionError::InvalidAction(InvalidAction::EmptyMessage)
    );
    b.close_chat(id).unwrap();
    pump_all(&mut a, &mut b);

    let chat: ChatSession = fetch(&store, id).unwrap();
    assert_eq!(chat.status, ChatStatus::Completed);
    assert_eq!(chat.messages.len(), 2);
    assert!(chat.messages.iter().all(|m| m.read));
    assert_eq!(stored_request(&store, id).status, RequestStatus::Completed);
    assert!(closed_with(&a.drain_ui(), RequestStatus::Completed));

    // history stays; a fresh chat can start
    let again = open_session(&mut a, &mut b, InteractionKind::Chat);
    assert_ne!(again, id);
}

#[test]
fn typing_indicator_times_out() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let (mut a, mut b) = pair(&store, &config);
    let id = open_session(&mut a, &mut b, InteractionKind::Chat);
    a.tick(MoveInput::default(), 10, 0.016, &OpenSea);
    a.typing_input(id).unwrap();
    pump_all(&mut a, &mut b);
    b.drain_ui();

    a.tick(MoveInput::default(), 2_500, 0.016, &OpenSea);
    pump_all(&mut a, &mut b);
    assert!(b
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::PeerTyping { typing: false, .. })));
}

// ── 7. Movement ──────────────────────────────────────────────────────────

#[test]
fn sailing_commits_position_and_rolls_ambient_events() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let mut a = join(&store, &config, 1, "Anne", 100.0);
    let east = MoveInput {
        right: true,
        ..Default::default()
    };
    let mut t = 0;
    while t <= 16_000 {
        a.tick(east, t, 0.1, &OpenSea);
        t += 100;
    }
    let ui = a.drain_ui();
    assert!(ui.iter().any(|e| matches!(e, UiEvent::Ambient(_))));

    let stored: Ship = fetch(&store, 1).unwrap();
    assert!(stored.x > 100.0);
    assert!((a.ship().x - stored.x).abs() <= config.movement.ship_speed * 1.1);
    let commits = store
        .audit()
        .iter()
        .filter(|w| w.table == Table::Pirate && w.id == 1)
        .count();
    // insert, ~one commit per second, ambient stat writes
    assert!((16..=20).contains(&commits), "{} pirate writes", commits);
}

#[test]
fn failed_position_commit_is_retried_after_stopping() {
    let store = MemoryStore::new();
    let config = ParleyConfig::default();
    let mut a = join(&store, &config, 1, "Anne", 100.0);
    let east = MoveInput {
        right: true,
        ..Default::default()
    };
    store.fail_next_writes(1);
    a.tick(east, 0, 1.0, &OpenSea);
    assert!(a
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::Notice(text) if text.contains("Position not charted"))));
    let stored: Ship = fetch(&store, 1).unwrap();
    assert_eq!(stored.x, 100.0);

    for second in 1..10 {
        a.tick(MoveInput::default(), second * 1000, 1.0, &OpenSea);
    }
    let stored: Ship = fetch(&store, 1).unwrap();
    assert_eq!(a.ship().x, 130.0);
    assert_eq!(stored.x, a.ship().x);
}

// ── 8. Setup ─────────────────────────────────────────────────────────────

#[test]
fn invalid_config_refused_at_connect() {
    let store = MemoryStore::new();
    let mut config = ParleyConfig::default();
    config.combat.actions.clear();
    config.movement.commit_interval_ms = 0;

    let err = PirateClient::connect(store.as_caller(1), config, 1, "Anne", 100.0, 100.0)
        .err()
        .unwrap();
    match err {
        ConnectError::Config(errors) => {
            assert!(errors.contains(&ConfigError::NoCombatActions));
            assert!(errors.contains(&ConfigError::ZeroInterval("movement.commit_interval_ms")));
        }
        other => panic!("expected a config error, got {:?}", other),
    }
    assert!(fetch::<Ship>(&store, 1).is_err());
}
