//! `PirateClient`: one captain's view of the shared world.
//!
//! The client is single-threaded and event-driven. [`PirateClient::tick`]
//! advances movement and proximity once per frame, and
//! [`PirateClient::pump`] drains the change feed into the negotiation
//! manager and the open session handlers. Player actions write at most one
//! record each and return right away; what they caused arrives through the
//! feed like everything else.

use std::collections::BTreeMap;

use parley_logic::ambient::roll_ambient;
use parley_logic::chat::QuickMessage;
use parley_logic::config::{validate_config, ConfigError, ParleyConfig};
use parley_logic::error::{InteractionError, InvalidAction, StoreError};
use parley_logic::movement::{MoveInput, MovementReconciler, Waters};
use parley_logic::proximity::{NearbyShip, ProximityDetector};
use parley_logic::session::{InteractionKind, InteractionRequest, Lifecycle, RecordId, RequestStatus, ShipId};
use parley_logic::ship::{Resource, Ship, StatDelta};
use parley_logic::trade::Offer;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ai::{AiFleet, AiHelm, StaticFleet};
use crate::feed::{ChangeEvent, Filter, Row, Table};
use crate::handlers::{ChatHandler, CombatHandler, Effect, TradeHandler};
use crate::negotiation::{NegotiationManager, RequestUpdate};
use crate::registry::{SessionHandler, SessionRegistry};
use crate::stats::apply_delta;
use crate::store::{insert_if_absent, SessionStore, SubscriptionId};
use crate::ui::UiEvent;

/// Why a captain couldn't join.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectError {
    /// Every problem found in the configuration.
    Config(Vec<ConfigError>),
    Store(StoreError),
}

impl From<StoreError> for ConnectError {
    fn from(e: StoreError) -> Self {
        ConnectError::Store(e)
    }
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::Config(errors) => {
                write!(f, "invalid config:")?;
                for e in errors {
                    write!(f, " {};", e)?;
                }
                Ok(())
            }
            ConnectError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConnectError {}

pub struct PirateClient<S: SessionStore> {
    store: S,
    config: ParleyConfig,
    ship: Ship,
    subscription: SubscriptionId,
    /// Every other captain's pirate row, by id.
    players: BTreeMap<ShipId, Ship>,
    fleet: Box<dyn AiFleet>,
    helm: AiHelm,
    proximity: ProximityDetector,
    movement: MovementReconciler,
    negotiation: NegotiationManager,
    registry: SessionRegistry,
    rng: StdRng,
    now_ms: u64,
    ui: Vec<UiEvent>,
    renderer: Option<Box<dyn FnMut(&UiEvent)>>,
}

impl<S: SessionStore> PirateClient<S> {
    // ========================================================================
    // SETUP
    // ========================================================================

    /// Register (or rejoin as) ship `id` and subscribe to everything that
    /// involves it.
    pub fn connect(store: S, config: ParleyConfig, id: ShipId, name: &str, x: f32, y: f32) -> Result<Self, ConnectError> {
        let errors = validate_config(&config);
        if !errors.is_empty() {
            return Err(ConnectError::Config(errors));
        }
        let ship = insert_if_absent(&store, Ship::new(id, name, x, y))?;
        let subscription = store.subscribe(vec![Filter::Participant(id), Filter::Table(Table::Pirate)]);
        let players = store
            .list(Table::Pirate)?
            .into_iter()
            .filter_map(|row| match row {
                Row::Pirate(s) if s.id != id => Some((s.id, s)),
                _ => None,
            })
            .collect();
        log::info!("{} ({}) joined at ({:.1}, {:.1})", ship.name, ship.id, ship.x, ship.y);

        Ok(Self {
            proximity: ProximityDetector::new(config.interaction_range, config.proximity_interval_ms),
            movement: MovementReconciler::new(config.movement, ship.x, ship.y),
            negotiation: NegotiationManager::new(id, ship.name.clone()),
            registry: SessionRegistry::new(config.max_open_sessions),
            helm: AiHelm::new(config.ai.clone()),
            fleet: Box::new(StaticFleet::default()),
            rng: StdRng::from_entropy(),
            now_ms: 0,
            ui: Vec::new(),
            renderer: None,
            store,
            config,
            ship,
            subscription,
            players,
        })
    }

    pub fn with_fleet(mut self, fleet: impl AiFleet + 'static) -> Self {
        self.fleet = Box::new(fleet);
        self
    }

    /// Deterministic dice, for tests and replays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Called with every UI event as it is raised.
    pub fn on_render(&mut self, renderer: impl FnMut(&UiEvent) + 'static) {
        self.renderer = Some(Box::new(renderer));
    }

    pub fn ship(&self) -> &Ship {
        &self.ship
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn nearby(&self) -> &[NearbyShip] {
        self.proximity.nearby()
    }

    pub fn incoming(&self) -> Vec<&InteractionRequest> {
        self.negotiation.incoming()
    }

    pub fn session(&self, id: RecordId) -> Option<&SessionHandler> {
        self.registry.get(id)
    }

    pub fn session_with(&self, counterpart: ShipId) -> Option<RecordId> {
        self.registry.session_with(counterpart)
    }

    pub fn open_sessions(&self) -> Vec<RecordId> {
        self.registry.ids()
    }

    /// Take every UI event raised since the last call.
    pub fn drain_ui(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.ui)
    }

    // ========================================================================
    // FRAME LOOP
    // ========================================================================

    /// Advance one frame: move, commit position when due, roll ambient
    /// events, rescan proximity, expire typing indicators.
    pub fn tick(&mut self, input: MoveInput, now_ms: u64, dt_secs: f32, waters: &dyn Waters) {
        self.now_ms = now_ms;
        let frame = self.movement.frame(input, now_ms, dt_secs, waters);
        self.ship.x = frame.x;
        self.ship.y = frame.y;

        if let Some((x, y)) = frame.commit {
            match self.store.commit_position(self.ship.id, x, y) {
                Ok(()) => self.movement.confirm_commit((x, y)),
                Err(e) => {
                    log::warn!("position commit for {} failed: {}", self.ship.id, e);
                    let failure = InteractionError::WriteFailure(e);
                    self.emit(UiEvent::Notice(format!("Position not charted: {}", failure)));
                }
            }
        }

        if frame.ambient_due {
            let event = roll_ambient(&mut self.rng);
            log::debug!("ambient event for {}: {}", self.ship.id, event.text);
            self.emit(UiEvent::Ambient(event.text.to_string()));
            if !event.is_quiet() {
                self.apply_own_delta(&event.delta());
            }
        }

        if self.proximity.is_due(now_ms) {
            self.scan_now();
        }

        let timeout = self.config.chat.typing_timeout_ms;
        for handler in self.registry.iter_mut() {
            if let SessionHandler::Chat(h) = handler {
                h.tick(now_ms, timeout, &self.store);
            }
        }
    }

    /// Rescan proximity immediately and publish the new list.
    pub fn scan_now(&mut self) {
        let ai_ships = self.fleet.ships();
        let nearby = self
            .proximity
            .rescan(self.now_ms, &self.ship, self.players.values(), &ai_ships)
            .to_vec();
        self.emit(UiEvent::Nearby(nearby));
    }

    /// Drain the change feed, then let the AI helm take any turn it owes.
    /// Returns the number of feed events handled.
    pub fn pump(&mut self) -> usize {
        let events = self.store.poll(self.subscription);
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        self.drive_ai();
        count
    }

    fn handle_event(&mut self, event: ChangeEvent) {
        let row = match event {
            ChangeEvent::Typing(signal) => {
                let effects = match self.registry.get_mut(signal.session_id) {
                    Some(SessionHandler::Chat(h)) => h.on_typing(signal),
                    _ => return,
                };
                self.apply_effects(signal.session_id, effects);
                return;
            }
            ChangeEvent::Inserted(row) | ChangeEvent::Updated(row) => row,
        };

        let row = match row {
            Row::Pirate(ship) => {
                self.on_pirate(ship);
                return;
            }
            Row::Request(request) => {
                let update = self.negotiation.on_request(request);
                self.on_request_update(update);
                return;
            }
            session_row => session_row,
        };

        let id = row.id();
        let effects = match (row, self.registry.get_mut(id)) {
            (Row::Combat(session), Some(SessionHandler::Combat(h))) => h.observe(session, &self.config.rewards),
            (Row::Trade(session), Some(SessionHandler::Trade(h))) => h.observe(session, &self.store),
            (Row::Chat(session), Some(SessionHandler::Chat(h))) => h.observe(session),
            (row, _) => {
                log::debug!("{:?} {} has no local handler", row.table(), id);
                return;
            }
        };
        self.apply_effects(id, effects);
    }

    fn on_pirate(&mut self, ship: Ship) {
        if ship.id == self.ship.id {
            // position stays local; the store only ever lags it
            if ship.version > self.ship.version {
                self.ship.stats = ship.stats;
                self.ship.version = ship.version;
            }
            return;
        }
        let newer = self.players.get(&ship.id).map_or(true, |known| ship.version > known.version);
        if newer {
            self.players.insert(ship.id, ship);
        }
    }

    // ========================================================================
    // NEGOTIATION
    // ========================================================================

    /// Ask a nearby ship for a session. AI ships accept combat on the spot.
    pub fn initiate(&mut self, target_id: ShipId, kind: InteractionKind) -> Result<InteractionRequest, InteractionError> {
        let request = self.negotiation.initiate(
            target_id,
            kind,
            &self.proximity,
            &self.registry,
            &self.store,
            self.now_ms,
        )?;
        self.emit(UiEvent::RequestSent(request.clone()));
        if self.fleet.is_ai(target_id) {
            let accepted = self.helm.accept(&request, &self.store)?;
            let update = self.negotiation.on_request(accepted);
            self.on_request_update(update);
        }
        Ok(request)
    }

    pub fn respond(&mut self, request_id: RecordId, accept: bool) -> Result<(), InteractionError> {
        let update = self
            .negotiation
            .respond(request_id, accept, &self.registry, &self.store)?;
        self.on_request_update(update);
        Ok(())
    }

    pub fn withdraw(&mut self, request_id: RecordId) -> Result<(), InteractionError> {
        let update = self.negotiation.withdraw(request_id, &self.store)?;
        self.on_request_update(update);
        Ok(())
    }

    fn on_request_update(&mut self, update: RequestUpdate) {
        match update {
            RequestUpdate::Ignored => {}
            RequestUpdate::Prompt(request) => self.emit(UiEvent::RequestPrompt(request)),
            RequestUpdate::Activated(request) => self.activate(request),
            RequestUpdate::Cancelled(request) => self.emit(UiEvent::RequestCancelled(request)),
            RequestUpdate::Closed(request) => self.teardown(request.id, request.status),
        }
    }

    /// Open the handler for an accepted request.
    fn activate(&mut self, request: InteractionRequest) {
        let Some(counterpart) = request.counterpart_of(self.ship.id) else {
            return;
        };
        if self.registry.contains(request.id) {
            return;
        }

        // Both captains asked each other at once and both said yes. Keep
        // the older request on both sides.
        if let Some(existing) = self.registry.session_with(counterpart) {
            if existing < request.id {
                log::info!(
                    "request {} duplicates session {} with {}, cancelling it",
                    request.id,
                    existing,
                    counterpart
                );
                self.close_session(request.id, RequestStatus::Cancelled);
                return;
            }
            log::info!("session {} superseded by older request {}", existing, request.id);
            self.close_session(existing, RequestStatus::Cancelled);
        }

        if let Err(e) = self.registry.can_open(counterpart) {
            log::warn!("cannot open session {}: {}", request.id, e);
            self.emit(UiEvent::Notice(e.to_string()));
            self.close_session(request.id, RequestStatus::Cancelled);
            return;
        }

        let me = self.ship.id;
        let opened = match request.kind {
            InteractionKind::Combat => {
                CombatHandler::open(&request, me, &self.config.combat, &self.store).map(SessionHandler::Combat)
            }
            InteractionKind::Trade => TradeHandler::open(&request, me, &self.store).map(SessionHandler::Trade),
            InteractionKind::Chat => {
                ChatHandler::open(&request, me, &self.ship.name, &self.store).map(SessionHandler::Chat)
            }
        };
        let handler = match opened {
            Ok(handler) => handler,
            Err(e) => {
                log::warn!("session {} could not be opened: {}", request.id, e);
                self.emit(UiEvent::Notice(format!("Couldn't open the session ({})", e)));
                return;
            }
        };

        let first_view = match &handler {
            SessionHandler::Combat(h) => UiEvent::Combat(h.session().clone()),
            SessionHandler::Trade(h) => UiEvent::Trade(h.session().clone()),
            SessionHandler::Chat(h) => UiEvent::Chat(h.session().clone()),
        };
        if let Err(e) = self.registry.insert(counterpart, handler) {
            log::warn!("session {} not registered: {}", request.id, e);
            return;
        }
        log::info!("{} session {} open with {}", request.kind.as_str(), request.id, counterpart);
        self.emit(first_view);
    }

    /// Close a session's request and tear the session down locally.
    fn close_session(&mut self, id: RecordId, status: RequestStatus) {
        match self.negotiation.close_request(id, status, &self.store) {
            Ok(update) => self.on_request_update(update),
            Err(e) => {
                log::warn!("closing request {} failed: {}", id, e);
                self.emit(UiEvent::Notice(e.to_string()));
            }
        }
        if self.registry.contains(id) {
            self.teardown(id, status);
        }
    }

    /// Drop the handler for `id` once its request is closed.
    ///
    /// The session record is read one last time first: with no ordering
    /// across records, its final state can land after the request closes.
    fn teardown(&mut self, id: RecordId, status: RequestStatus) {
        self.negotiation.forget(id);
        let Some(mut handler) = self.registry.remove(id) else {
            return;
        };
        match handler.sync(&self.config.rewards, &self.store) {
            Ok(effects) => {
                for effect in effects {
                    match effect {
                        Effect::Render(event) => self.emit(event),
                        Effect::ApplyDelta { delta, reason } => {
                            self.apply_own_delta(&delta);
                            self.emit(UiEvent::Notice(reason));
                        }
                        Effect::Close(_) => {}
                    }
                }
            }
            Err(e) => log::debug!("final read of session {} failed: {}", id, e),
        }
        log::info!("{} session {} closed ({})", handler.kind().as_str(), id, status.as_str());
        self.emit(UiEvent::SessionClosed {
            session_id: id,
            kind: handler.kind(),
            status,
        });
    }

    // ========================================================================
    // COMBAT
    // ========================================================================

    pub fn combat_action(&mut self, session_id: RecordId, action_index: usize) -> Result<(), InteractionError> {
        let effects = combat_in(&mut self.registry, session_id)?.act(
            self.ship.id,
            action_index,
            &self.config.combat,
            &self.config.rewards,
            self.config.max_rebase_attempts,
            &self.store,
            &mut self.rng,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    /// Take the turn for any AI ship whose move it is.
    fn drive_ai(&mut self) {
        for id in self.registry.ids() {
            let Some(SessionHandler::Combat(h)) = self.registry.get_mut(id) else {
                continue;
            };
            let ai_id = h.session().current_turn;
            if ai_id == self.ship.id || h.session().is_closed() || !self.fleet.is_ai(ai_id) {
                continue;
            }
            let hp = h.session().hp_of(ai_id).unwrap_or(0);
            let Some(action) = self.helm.choose_action(hp, &self.config.combat, &mut self.rng) else {
                continue;
            };
            let result = h.act(
                ai_id,
                action,
                &self.config.combat,
                &self.config.rewards,
                self.config.max_rebase_attempts,
                &self.store,
                &mut self.rng,
            );
            match result {
                Ok(effects) => self.apply_effects(id, effects),
                Err(e) => log::warn!("AI ship {} could not act in combat {}: {}", ai_id, id, e),
            }
        }
    }

    // ========================================================================
    // TRADE
    // ========================================================================

    pub fn set_offer(&mut self, session_id: RecordId, offer: &Offer) -> Result<(), InteractionError> {
        let effects = trade_in(&mut self.registry, session_id)?.set_offer(
            offer,
            &self.ship.stats,
            self.config.max_rebase_attempts,
            &self.store,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    pub fn add_to_offer(&mut self, session_id: RecordId, resource: Resource, qty: u32) -> Result<(), InteractionError> {
        let effects = trade_in(&mut self.registry, session_id)?.add_to_offer(
            resource,
            qty,
            &self.ship.stats,
            self.config.max_rebase_attempts,
            &self.store,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    pub fn remove_from_offer(&mut self, session_id: RecordId, resource: Resource) -> Result<(), InteractionError> {
        let effects = trade_in(&mut self.registry, session_id)?.remove_from_offer(
            resource,
            &self.ship.stats,
            self.config.max_rebase_attempts,
            &self.store,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    pub fn approve_trade(&mut self, session_id: RecordId) -> Result<(), InteractionError> {
        let effects = trade_in(&mut self.registry, session_id)?.approve(
            &self.config.trade,
            self.config.max_rebase_attempts,
            &self.store,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    pub fn revoke_approval(&mut self, session_id: RecordId) -> Result<(), InteractionError> {
        let effects =
            trade_in(&mut self.registry, session_id)?.revoke(self.config.max_rebase_attempts, &self.store)?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    /// Walk away from the table. Cancels the request for both sides.
    pub fn cancel_trade(&mut self, session_id: RecordId) -> Result<(), InteractionError> {
        let effects =
            trade_in(&mut self.registry, session_id)?.walk_away(self.config.max_rebase_attempts, &self.store)?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    // ========================================================================
    // CHAT
    // ========================================================================

    pub fn send_message(&mut self, session_id: RecordId, content: &str) -> Result<(), InteractionError> {
        let effects = chat_in(&mut self.registry, session_id)?.send(
            content,
            self.now_ms,
            self.config.max_rebase_attempts,
            &self.store,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    pub fn send_quick(&mut self, session_id: RecordId, quick: QuickMessage) -> Result<(), InteractionError> {
        let effects = chat_in(&mut self.registry, session_id)?.send_quick(
            quick,
            self.now_ms,
            self.config.max_rebase_attempts,
            &self.store,
        )?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    pub fn mark_read(&mut self, session_id: RecordId) -> Result<(), InteractionError> {
        let effects =
            chat_in(&mut self.registry, session_id)?.mark_read(self.config.max_rebase_attempts, &self.store)?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    /// A keystroke in the chat box.
    pub fn typing_input(&mut self, session_id: RecordId) -> Result<(), InteractionError> {
        chat_in(&mut self.registry, session_id)?.on_input(self.now_ms, &self.store);
        Ok(())
    }

    pub fn close_chat(&mut self, session_id: RecordId) -> Result<(), InteractionError> {
        let effects =
            chat_in(&mut self.registry, session_id)?.close(self.config.max_rebase_attempts, &self.store)?;
        self.apply_effects(session_id, effects);
        Ok(())
    }

    // ========================================================================
    // EFFECTS
    // ========================================================================

    fn apply_effects(&mut self, session_id: RecordId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Render(event) => self.emit(event),
                Effect::ApplyDelta { delta, reason } => {
                    self.apply_own_delta(&delta);
                    self.emit(UiEvent::Notice(reason));
                }
                Effect::Close(status) => self.close_session(session_id, status),
            }
        }
    }

    fn apply_own_delta(&mut self, delta: &StatDelta) {
        match apply_delta(&self.store, &mut self.ship, delta) {
            Ok(true) => self.emit(UiEvent::Stats(self.ship.stats.clone())),
            Ok(false) => {}
            Err(e) => {
                log::warn!("stat update for {} failed: {}", self.ship.id, e);
                self.emit(UiEvent::Notice(format!("Couldn't record the ship's log ({})", e)));
            }
        }
    }

    fn emit(&mut self, event: UiEvent) {
        if let Some(render) = self.renderer.as_mut() {
            render(&event);
        }
        self.ui.push(event);
    }
}

fn combat_in(registry: &mut SessionRegistry, id: RecordId) -> Result<&mut CombatHandler, InvalidAction> {
    match registry.get_mut(id) {
        Some(SessionHandler::Combat(h)) => Ok(h),
        _ => Err(InvalidAction::NoSuchSession(id)),
    }
}

fn trade_in(registry: &mut SessionRegistry, id: RecordId) -> Result<&mut TradeHandler, InvalidAction> {
    match registry.get_mut(id) {
        Some(SessionHandler::Trade(h)) => Ok(h),
        _ => Err(InvalidAction::NoSuchSession(id)),
    }
}

fn chat_in(registry: &mut SessionRegistry, id: RecordId) -> Result<&mut ChatHandler, InvalidAction> {
    match registry.get_mut(id) {
        Some(SessionHandler::Chat(h)) => Ok(h),
        _ => Err(InvalidAction::NoSuchSession(id)),
    }
}
