//! Parley Headless Session Harness
//!
//! Plays whole ship-to-ship sessions between in-process clients sharing one
//! `MemoryStore`, then sweeps the pure rules with seeded randomness.
//! No SpacetimeDB, no networking, no rendering.
//!
//! Usage:
//!   cargo run -p parley-simtest
//!   cargo run -p parley-simtest -- --verbose
//!   cargo run -p parley-simtest -- --seed 7 --config data/parley_config.json

use parley_client::ai::StaticFleet;
use parley_client::feed::{Row, Table};
use parley_client::registry::SessionHandler;
use parley_client::store::fetch;
use parley_client::ui::UiEvent;
use parley_client::{MemoryStore, PirateClient, SessionStore};
use parley_logic::combat::{resolve_turn, ActionEffect, CombatAction, CombatSession, CombatStatus};
use parley_logic::config::{validate_config, ParleyConfig};
use parley_logic::proximity::scan;
use parley_logic::session::{InteractionKind, InteractionRequest, RecordId, RequestPayload, RequestStatus, ShipId};
use parley_logic::ship::{Resource, Ship};
use parley_logic::trade::{Offer, TradeSession, TradeStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ── Default tunables (same JSON the module starts from) ─────────────────
const CONFIG_JSON: &str = include_str!("../../../data/parley_config.json");

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn pass_if(name: &str, passed: bool, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail: detail.into(),
    }
}

struct Options {
    verbose: bool,
    seed: u64,
    config_path: Option<String>,
}

fn parse_args() -> Options {
    let mut opts = Options {
        verbose: false,
        seed: 42,
        config_path: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verbose" => opts.verbose = true,
            "--seed" => match args.next().and_then(|v| v.parse().ok()) {
                Some(seed) => opts.seed = seed,
                None => {
                    eprintln!("--seed needs a number");
                    std::process::exit(2);
                }
            },
            "--config" => match args.next() {
                Some(path) => opts.config_path = Some(path),
                None => {
                    eprintln!("--config needs a path");
                    std::process::exit(2);
                }
            },
            other => eprintln!("ignoring unknown argument {}", other),
        }
    }
    opts
}

fn main() {
    let opts = parse_args();
    println!("=== Parley Session Harness (seed {}) ===\n", opts.seed);

    let mut results = Vec::new();

    // 1. Config loading & validation
    let (config, config_results) = load_config(opts.config_path.as_deref());
    results.extend(config_results);

    // 2-5. The four reference sessions
    results.extend(run_scenario("scenario_a_combat", || scenario_combat(&config)));
    results.extend(run_scenario("scenario_b_trade", || scenario_trade(&config)));
    results.extend(run_scenario("scenario_c_offer_edit", || scenario_offer_edit(&config)));
    results.extend(run_scenario("scenario_d_decline", || scenario_decline(&config)));

    // 6. Proximity boundary sweep
    results.extend(sweep_proximity(opts.verbose));

    // 7. Combat rule sweep
    results.extend(sweep_combat(&config, opts.seed, opts.verbose));

    // 8. Trade approval sweep
    results.extend(sweep_trade(opts.seed, opts.verbose));

    // 9. AI battles through the full client
    results.extend(sweep_ai_battles(&config, opts.seed, opts.verbose));

    // 10. Repeated feed deliveries
    results.extend(run_scenario("duplicate_delivery", || duplicate_delivery(&config)));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || opts.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!("\n=== RESULT: {}/{} passed, {} failed ===", passed, total, failed);

    if failed > 0 {
        std::process::exit(1);
    }
}

/// Run a scenario that may fail part-way; a setup error becomes one failed result.
fn run_scenario<F>(name: &str, scenario: F) -> Vec<TestResult>
where
    F: FnOnce() -> Result<Vec<TestResult>, String>,
{
    println!("--- {} ---", name);
    scenario().unwrap_or_else(|e| vec![pass_if(name, false, format!("aborted: {}", e))])
}

// ── Session helpers ─────────────────────────────────────────────────────

type Client = PirateClient<MemoryStore>;

fn join(store: &MemoryStore, config: &ParleyConfig, id: ShipId, name: &str, x: f32) -> Result<Client, String> {
    PirateClient::connect(store.as_caller(id), config.clone(), id, name, x, 100.0)
        .map(|c| c.with_seed(id))
        .map_err(|e| e.to_string())
}

fn seed_ship(store: &MemoryStore, id: ShipId, name: &str, x: f32, booty: u32, pearls: u32) -> Result<(), String> {
    let mut ship = Ship::new(id, name, x, 100.0);
    ship.stats.booty = booty;
    if pearls > 0 {
        ship.stats.cargo.insert(Resource::Pearls, pearls);
    }
    store.insert(Row::Pirate(ship)).map(|_| ()).map_err(|e| e.to_string())
}

fn pump_all(a: &mut Client, b: &mut Client) {
    for _ in 0..10 {
        if a.pump() + b.pump() == 0 {
            break;
        }
    }
}

fn pair(store: &MemoryStore, config: &ParleyConfig) -> Result<(Client, Client), String> {
    let mut a = join(store, config, 1, "Anne", 100.0)?;
    let mut b = join(store, config, 2, "Mary", 103.0)?;
    pump_all(&mut a, &mut b);
    a.scan_now();
    b.scan_now();
    Ok((a, b))
}

fn open_session(a: &mut Client, b: &mut Client, kind: InteractionKind) -> Result<RecordId, String> {
    let id = a.initiate(b.ship().id, kind).map_err(|e| e.to_string())?.id;
    pump_all(a, b);
    b.respond(id, true).map_err(|e| e.to_string())?;
    pump_all(a, b);
    if a.session(id).is_none() || b.session(id).is_none() {
        return Err(format!("session {} did not open on both sides", id));
    }
    Ok(id)
}

fn offer(resource: Resource, qty: u32) -> Offer {
    let mut o = Offer::new();
    o.insert(resource, qty);
    o
}

fn request_status(store: &MemoryStore, id: RecordId) -> Result<RequestStatus, String> {
    fetch::<InteractionRequest>(store, id)
        .map(|r| r.status)
        .map_err(|e| e.to_string())
}

// ── 1. Config ───────────────────────────────────────────────────────────

fn load_config(path: Option<&str>) -> (ParleyConfig, Vec<TestResult>) {
    println!("--- Config ---");
    let mut results = Vec::new();

    let raw = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(raw) => raw,
            Err(e) => {
                results.push(pass_if("config_read", false, format!("{}: {}", p, e)));
                return (ParleyConfig::default(), results);
            }
        },
        None => CONFIG_JSON.to_string(),
    };

    let config = match ParleyConfig::from_json(&raw) {
        Ok(c) => c,
        Err(e) => {
            results.push(pass_if("config_parse", false, format!("JSON parse error: {}", e)));
            return (ParleyConfig::default(), results);
        }
    };
    results.push(pass_if(
        "config_parse",
        true,
        format!("{} combat actions, range {}", config.combat.actions.len(), config.interaction_range),
    ));

    // serde(default) silently drops misspelled keys, so list them
    let known = ParleyConfig::default().to_json().ok().and_then(|j| serde_json::from_str::<serde_json::Value>(&j).ok());
    let given = serde_json::from_str::<serde_json::Value>(&raw).ok();
    let unknown: Vec<String> = match (known, given) {
        (Some(serde_json::Value::Object(known)), Some(serde_json::Value::Object(given))) => {
            given.keys().filter(|k| !known.contains_key(*k)).cloned().collect()
        }
        _ => Vec::new(),
    };
    results.push(pass_if(
        "config_known_keys",
        unknown.is_empty(),
        if unknown.is_empty() {
            "every key recognised".to_string()
        } else {
            format!("unrecognised keys: {}", unknown.join(", "))
        },
    ));

    let errors = validate_config(&config);
    results.push(pass_if(
        "config_valid",
        errors.is_empty(),
        if errors.is_empty() {
            "no validation errors".to_string()
        } else {
            errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
        },
    ));

    (config, results)
}

// ── 2. Scenario A: combat to the finish ─────────────────────────────────

fn scenario_combat(base: &ParleyConfig) -> Result<Vec<TestResult>, String> {
    // one gun that always hits for 50, so three turns decide it
    let mut config = base.clone();
    config.combat.starting_hp = 100;
    config.combat.actions = vec![CombatAction {
        name: "Broadside".into(),
        description: "Every gun at once".into(),
        min: 50,
        max: 50,
        accuracy: 1.0,
        effect: ActionEffect::Damage,
    }];

    let store = MemoryStore::new();
    let (mut a, mut b) = pair(&store, &config)?;
    let id = open_session(&mut a, &mut b, InteractionKind::Combat)?;

    let mut turns_seen = Vec::new();
    for actor in [1, 2, 1] {
        let client = if actor == 1 { &mut a } else { &mut b };
        client.combat_action(id, 0).map_err(|e| e.to_string())?;
        pump_all(&mut a, &mut b);
        let snapshot: CombatSession = fetch(&store, id).map_err(|e| e.to_string())?;
        turns_seen.push(snapshot.current_turn);
    }
    let combat: CombatSession = fetch(&store, id).map_err(|e| e.to_string())?;

    Ok(vec![
        pass_if(
            "a_turns_alternate",
            turns_seen == vec![2, 1, 2],
            format!("current_turn after each write: {:?}", turns_seen),
        ),
        pass_if(
            "a_victory_on_turn_3",
            combat.status == CombatStatus::Completed && combat.winner_id == Some(1) && combat.player2_hp == 0,
            format!(
                "status {}, winner {:?}, hp {}/{}",
                combat.status.as_str(),
                combat.winner_id,
                combat.player1_hp,
                combat.player2_hp
            ),
        ),
        pass_if(
            "a_request_completed",
            request_status(&store, id)? == RequestStatus::Completed,
            "request closed as completed",
        ),
        pass_if(
            "a_rewards_applied",
            a.ship().stats.combat_wins == 1 && b.ship().stats.combat_losses == 1,
            format!(
                "winner booty {} hull {}, loser hull {}",
                a.ship().stats.booty,
                a.ship().stats.hull,
                b.ship().stats.hull
            ),
        ),
        pass_if(
            "a_handlers_released",
            a.session(id).is_none() && b.session(id).is_none(),
            "both registries empty",
        ),
    ])
}

// ── 3. Scenario B: gold for pearls ──────────────────────────────────────

fn scenario_trade(config: &ParleyConfig) -> Result<Vec<TestResult>, String> {
    let store = MemoryStore::new();
    seed_ship(&store, 1, "Anne", 100.0, 50, 0)?;
    seed_ship(&store, 2, "Mary", 103.0, 0, 5)?;
    let (mut a, mut b) = pair(&store, config)?;
    let id = open_session(&mut a, &mut b, InteractionKind::Trade)?;

    a.set_offer(id, &offer(Resource::GoldCoins, 10)).map_err(|e| e.to_string())?;
    a.approve_trade(id).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);
    b.set_offer(id, &offer(Resource::Pearls, 2)).map_err(|e| e.to_string())?;
    b.approve_trade(id).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);

    let trade: TradeSession = fetch(&store, id).map_err(|e| e.to_string())?;
    let stored_b: Ship = fetch(&store, 2).map_err(|e| e.to_string())?;

    Ok(vec![
        pass_if(
            "b_trade_completed",
            trade.status == TradeStatus::Completed && request_status(&store, id)? == RequestStatus::Completed,
            format!("trade {}", trade.status.as_str()),
        ),
        pass_if(
            "b_gold_moved",
            a.ship().stats.booty == 40 && b.ship().stats.booty == 10,
            format!("Anne {} gold, Mary {} gold", a.ship().stats.booty, b.ship().stats.booty),
        ),
        pass_if(
            "b_pearls_moved",
            a.ship().stats.available(Resource::Pearls) == 2 && b.ship().stats.available(Resource::Pearls) == 3,
            format!(
                "Anne {} pearls, Mary {} pearls",
                a.ship().stats.available(Resource::Pearls),
                b.ship().stats.available(Resource::Pearls)
            ),
        ),
        pass_if(
            "b_store_matches_client",
            stored_b.stats == b.ship().stats,
            "Mary's stored stats equal her local stats",
        ),
    ])
}

// ── 4. Scenario C: editing an approved offer ────────────────────────────

fn scenario_offer_edit(config: &ParleyConfig) -> Result<Vec<TestResult>, String> {
    let store = MemoryStore::new();
    seed_ship(&store, 1, "Anne", 100.0, 50, 0)?;
    seed_ship(&store, 2, "Mary", 103.0, 0, 5)?;
    let (mut a, mut b) = pair(&store, config)?;
    let id = open_session(&mut a, &mut b, InteractionKind::Trade)?;

    a.set_offer(id, &offer(Resource::GoldCoins, 10)).map_err(|e| e.to_string())?;
    a.approve_trade(id).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);
    a.set_offer(id, &offer(Resource::GoldCoins, 5)).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);
    let edited: TradeSession = fetch(&store, id).map_err(|e| e.to_string())?;

    // Mary approves against the unapproved offer; Anne's next edit must not clear it
    b.set_offer(id, &offer(Resource::Pearls, 1)).map_err(|e| e.to_string())?;
    b.approve_trade(id).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);
    a.set_offer(id, &offer(Resource::GoldCoins, 4)).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);

    let trade: TradeSession = fetch(&store, id).map_err(|e| e.to_string())?;
    Ok(vec![
        pass_if(
            "c_own_approval_cleared",
            !edited.player1_approved && edited.player1_offer.get(&Resource::GoldCoins) == Some(&5),
            format!("player1 approved {}, offer {:?}", edited.player1_approved, edited.player1_offer),
        ),
        pass_if(
            "c_other_side_untouched",
            trade.player2_approved && trade.player2_offer.get(&Resource::Pearls) == Some(&1),
            format!("player2 approved {}", trade.player2_approved),
        ),
        pass_if(
            "c_still_negotiating",
            trade.status == TradeStatus::Negotiating,
            trade.status.as_str(),
        ),
    ])
}

// ── 5. Scenario D: declined request ─────────────────────────────────────

fn scenario_decline(config: &ParleyConfig) -> Result<Vec<TestResult>, String> {
    let store = MemoryStore::new();
    let (mut a, mut b) = pair(&store, config)?;
    let id = a.initiate(2, InteractionKind::Combat).map_err(|e| e.to_string())?.id;
    pump_all(&mut a, &mut b);
    let prompted = b
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::RequestPrompt(r) if r.id == id));
    b.respond(id, false).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);

    let sessions = store.list(Table::CombatSession).map_err(|e| e.to_string())?;
    let told = a
        .drain_ui()
        .iter()
        .any(|e| matches!(e, UiEvent::RequestCancelled(r) if r.id == id));
    Ok(vec![
        pass_if("d_target_prompted", prompted, "Mary saw the request"),
        pass_if(
            "d_request_cancelled",
            request_status(&store, id)? == RequestStatus::Cancelled,
            "request closed as cancelled",
        ),
        pass_if(
            "d_no_combat_record",
            sessions.is_empty(),
            format!("{} combat records", sessions.len()),
        ),
        pass_if("d_initiator_told", told, "Anne saw the cancellation"),
    ])
}

// ── 6. Proximity ────────────────────────────────────────────────────────

fn sweep_proximity(verbose: bool) -> Vec<TestResult> {
    println!("--- Proximity ---");
    let eps = 0.01;
    let mut misses = 0;
    let mut leaks = 0;
    let mut samples = 0;

    for range in [1.0_f32, 8.0, 50.0, 300.0] {
        for step in 0..16 {
            let angle = step as f32 * std::f32::consts::PI / 8.0;
            let (dx, dy) = (angle.cos(), angle.sin());
            let local = Ship::new(1, "Anne", 500.0, 500.0);
            let inside = Ship::new(2, "Mary", 500.0 + dx * (range - eps), 500.0 + dy * (range - eps));
            let outside = Ship::ai(3, "Bart", 500.0 + dx * (range + eps), 500.0 + dy * (range + eps));
            let found = scan(&local, [&inside], [&outside], range);
            samples += 1;
            if !found.iter().any(|n| n.id == 2) {
                misses += 1;
            }
            if found.iter().any(|n| n.id == 3) {
                leaks += 1;
            }
        }
        if verbose {
            println!("  range {}: {} misses, {} leaks so far", range, misses, leaks);
        }
    }

    vec![
        pass_if(
            "proximity_inside_listed",
            misses == 0,
            format!("{} of {} ships just inside range missed", misses, samples),
        ),
        pass_if(
            "proximity_outside_hidden",
            leaks == 0,
            format!("{} of {} ships just outside range listed", leaks, samples),
        ),
    ]
}

// ── 7. Combat rules ─────────────────────────────────────────────────────

fn sweep_combat(config: &ParleyConfig, seed: u64, verbose: bool) -> Vec<TestResult> {
    println!("--- Combat Sweep ---");
    let rules = &config.combat;
    let battles = 200;
    let turn_cap = 1000;
    let mut violations: Vec<String> = Vec::new();
    let mut unfinished = 0;
    let mut total_turns = 0;

    if rules.actions.is_empty() {
        return vec![pass_if("combat_sweep", false, "no combat actions configured")];
    }

    for battle in 0..battles {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(battle));
        let request = InteractionRequest {
            id: battle + 1,
            ..InteractionRequest::new(1, 2, InteractionKind::Combat, RequestPayload::default())
        };
        let mut session = CombatSession::open(&request, rules);
        let mut turns = 0;

        while session.status == CombatStatus::Active && turns < turn_cap {
            let actor = session.current_turn;
            let action = rng.gen_range(0..rules.actions.len());
            let (next, _) = match resolve_turn(&session, actor, action, rules, &mut rng) {
                Ok(r) => r,
                Err(e) => {
                    violations.push(format!("battle {} turn {}: {}", battle, turns, e));
                    break;
                }
            };
            let changed = [
                next.player1_hp != session.player1_hp,
                next.player2_hp != session.player2_hp,
            ]
            .iter()
            .filter(|c| **c)
            .count();
            if changed > 1 {
                violations.push(format!("battle {} turn {}: both hulls changed", battle, turns));
            }
            if next.current_turn == actor {
                violations.push(format!("battle {} turn {}: turn did not pass", battle, turns));
            }
            if next.player1_hp > rules.starting_hp || next.player2_hp > rules.starting_hp {
                violations.push(format!("battle {} turn {}: hull above starting hp", battle, turns));
            }
            let someone_sunk = next.player1_hp == 0 || next.player2_hp == 0;
            if someone_sunk != (next.status == CombatStatus::Completed) {
                violations.push(format!("battle {} turn {}: completion out of step with hp", battle, turns));
            }
            if let Some(winner) = next.winner_id {
                if next.hp_of(winner) == Some(0) {
                    violations.push(format!("battle {}: sunk ship declared winner", battle));
                }
            }
            session = next;
            turns += 1;
        }
        if session.status == CombatStatus::Active {
            unfinished += 1;
        }
        total_turns += turns;
    }

    if verbose {
        println!(
            "  {} battles, {:.1} turns on average",
            battles,
            total_turns as f64 / battles as f64
        );
    }

    vec![
        pass_if(
            "combat_invariants",
            violations.is_empty(),
            if violations.is_empty() {
                format!("{} battles, no violations", battles)
            } else {
                format!("{} violations, first: {}", violations.len(), violations[0])
            },
        ),
        pass_if(
            "combat_terminates",
            unfinished == 0,
            format!("{} of {} battles still active after {} turns", unfinished, battles, turn_cap),
        ),
    ]
}

// ── 8. Trade approvals ──────────────────────────────────────────────────

fn sweep_trade(seed: u64, verbose: bool) -> Vec<TestResult> {
    println!("--- Trade Sweep ---");
    let rounds = 300;
    let mut violations: Vec<String> = Vec::new();
    let mut commits = 0;

    for round in 0..rounds {
        let mut rng = StdRng::seed_from_u64(seed ^ (round << 16));
        let request = InteractionRequest {
            id: round + 1,
            ..InteractionRequest::new(1, 2, InteractionKind::Trade, RequestPayload::default())
        };
        let mut session = TradeSession::open(&request);
        let mut committed = 0;

        for _ in 0..20 {
            let ship = if rng.gen_bool(0.5) { 1 } else { 2 };
            let before = session.clone();
            let result = if rng.gen_bool(0.4) {
                let resource = Resource::ALL[rng.gen_range(0..Resource::ALL.len())];
                session.with_offer(ship, &offer(resource, rng.gen_range(0..5)))
            } else {
                session.with_approval(ship, rng.gen_bool(0.8))
            };
            let next = match result {
                Ok(next) => next,
                Err(_) if before.status == TradeStatus::Completed => continue,
                Err(e) => {
                    violations.push(format!("round {}: {}", round, e));
                    break;
                }
            };

            // the other side's half of the record must never move
            let (other_offer_same, other_approval_same) = if ship == 1 {
                (
                    next.player2_offer == before.player2_offer,
                    next.player2_approved == before.player2_approved,
                )
            } else {
                (
                    next.player1_offer == before.player1_offer,
                    next.player1_approved == before.player1_approved,
                )
            };
            if !other_offer_same || !other_approval_same {
                violations.push(format!("round {}: ship {} touched the other side", round, ship));
            }
            let own_offer_changed = if ship == 1 {
                next.player1_offer != before.player1_offer
            } else {
                next.player2_offer != before.player2_offer
            };
            let own_approved = if ship == 1 {
                next.player1_approved
            } else {
                next.player2_approved
            };
            if own_offer_changed && own_approved {
                violations.push(format!("round {}: edited offer kept its approval", round));
            }

            session = next;
            if let Some(done) = session.commit() {
                session = done;
                committed += 1;
            }
        }

        if committed > 1 {
            violations.push(format!("round {}: committed {} times", round, committed));
        }
        commits += committed;
    }

    if verbose {
        println!("  {} rounds, {} commits", rounds, commits);
    }

    vec![pass_if(
        "trade_invariants",
        violations.is_empty(),
        if violations.is_empty() {
            format!("{} rounds, {} commits, no violations", rounds, commits)
        } else {
            format!("{} violations, first: {}", violations.len(), violations[0])
        },
    )]
}

// ── 9. AI battles ───────────────────────────────────────────────────────

fn sweep_ai_battles(config: &ParleyConfig, seed: u64, verbose: bool) -> Vec<TestResult> {
    println!("--- AI Battles ---");
    let battles = 10;
    let mut failures: Vec<String> = Vec::new();
    let mut wins = 0;

    for battle in 0..battles {
        match ai_battle(config, seed.wrapping_add(battle)) {
            Ok(won) => wins += won as u32,
            Err(e) => failures.push(format!("battle {}: {}", battle, e)),
        }
    }

    if verbose {
        println!("  captain won {} of {}", wins, battles);
    }

    vec![pass_if(
        "ai_battles_finish",
        failures.is_empty(),
        if failures.is_empty() {
            format!("{} battles finished, captain won {}", battles, wins)
        } else {
            format!("{} failed, first: {}", failures.len(), failures[0])
        },
    )]
}

/// One battle against an AI ship. Returns whether the captain won.
fn ai_battle(config: &ParleyConfig, seed: u64) -> Result<bool, String> {
    let store = MemoryStore::new();
    let fleet = StaticFleet::new(vec![Ship::ai(50, "Black Bart", 104.0, 100.0)]);
    let mut a = PirateClient::connect(store.as_caller(1), config.clone(), 1, "Anne", 100.0, 100.0)
        .map_err(|e| e.to_string())?
        .with_fleet(fleet)
        .with_seed(seed);
    a.scan_now();
    let id = a.initiate(50, InteractionKind::Combat).map_err(|e| e.to_string())?.id;

    for _ in 0..1000 {
        let my_turn = match a.session(id) {
            Some(SessionHandler::Combat(h)) => h.is_my_turn(),
            Some(_) => return Err("session opened with the wrong kind".to_string()),
            None => break,
        };
        if my_turn {
            a.combat_action(id, 0).map_err(|e| e.to_string())?;
        }
        a.pump();
    }

    let combat: CombatSession = fetch(&store, id).map_err(|e| e.to_string())?;
    if combat.status != CombatStatus::Completed {
        return Err(format!("still active after turn {}", combat.turn_number));
    }
    if store.get(Table::Pirate, 50).map_err(|e| e.to_string())?.is_some() {
        return Err("AI ship was written to the store".to_string());
    }
    let stats = &a.ship().stats;
    if stats.combat_wins + stats.combat_losses != 1 {
        return Err(format!(
            "expected one result, got {} wins {} losses",
            stats.combat_wins, stats.combat_losses
        ));
    }
    Ok(combat.winner_id == Some(1))
}

// ── 10. Repeated deliveries ─────────────────────────────────────────────

fn duplicate_delivery(config: &ParleyConfig) -> Result<Vec<TestResult>, String> {
    let store = MemoryStore::new();
    store.set_duplicate_delivery(true);
    seed_ship(&store, 1, "Anne", 100.0, 50, 0)?;
    seed_ship(&store, 2, "Mary", 103.0, 0, 5)?;
    let (mut a, mut b) = pair(&store, config)?;
    let id = open_session(&mut a, &mut b, InteractionKind::Trade)?;

    a.set_offer(id, &offer(Resource::GoldCoins, 10)).map_err(|e| e.to_string())?;
    a.approve_trade(id).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);
    b.set_offer(id, &offer(Resource::Pearls, 2)).map_err(|e| e.to_string())?;
    b.approve_trade(id).map_err(|e| e.to_string())?;
    pump_all(&mut a, &mut b);

    let finished: TradeSession = fetch(&store, id).map_err(|e| e.to_string())?;
    store.replay(Row::Trade(finished));
    pump_all(&mut a, &mut b);

    let completed_writes = store
        .audit()
        .iter()
        .filter(|w| w.table == Table::TradeSession && matches!(&w.row, Row::Trade(t) if t.status == TradeStatus::Completed))
        .count();

    Ok(vec![
        pass_if(
            "dup_single_commit",
            completed_writes == 1,
            format!("{} completed writes", completed_writes),
        ),
        pass_if(
            "dup_settled_once",
            a.ship().stats.booty == 40 && a.ship().stats.trades_completed == 1 && b.ship().stats.trades_completed == 1,
            format!(
                "Anne {} gold, trades {} / {}",
                a.ship().stats.booty,
                a.ship().stats.trades_completed,
                b.ship().stats.trades_completed
            ),
        ),
    ])
}
