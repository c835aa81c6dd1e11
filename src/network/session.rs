//! Session Engine and Action Arbiter
//!
//! A `Session` owns one lobby/game's roster and authoritative `GameState`.
//! Mutation only ever happens through `submit_action`, which pushes onto an
//! explicit FIFO queue drained by `run_arbiter` — the total-order guarantee
//! the wire protocol promises (`broadcast(N)` always precedes
//! `broadcast(N+1)`). Connection tasks call `Session` methods directly
//! against a `RwLock<Session>`, with the queue layered on top for action
//! ordering specifically.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, Instant};
use tracing::{info, instrument, warn};

use crate::diff;
use crate::game::{self, Action, ExecuteError, GameState, PrincipalId, UnitId};

use super::protocol::{ActionOutcome, DmCommand, RosterEntry, ServerMessage};

/// Session identifier, issued at creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new_random() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Lobby,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Disconnected at `since`; still within grace, counts as present for
    /// turn purposes until the grace period elapses.
    Disconnected { since: Instant },
    /// Past the reconnect window: permanently replaced by AI control for
    /// the remainder of the session.
    DemotedToAi,
}

/// One roster member.
pub struct Member {
    pub principal_id: PrincipalId,
    pub unit_id: Option<UnitId>,
    pub ready: bool,
    pub is_dm: bool,
    pub connection: ConnectionStatus,
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Member {
    fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            principal_id: self.principal_id.0.clone(),
            ready: self.ready,
            connected: matches!(self.connection, ConnectionStatus::Connected),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_players: usize,
    pub min_players: usize,
    /// Turn timer in seconds. 0 disables auto-skip entirely.
    pub turn_timer_secs: u64,
    /// How long a disconnected unit's turn is still honored as "maybe coming back".
    pub reconnect_grace_secs: u64,
    /// Total window after disconnect before permanent AI demotion.
    pub reconnect_window_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 6,
            min_players: 1,
            turn_timer_secs: 15,
            reconnect_grace_secs: 30,
            reconnect_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is full")]
    SessionFull,
    #[error("principal already in session")]
    AlreadyJoined,
    #[error("session is not in lobby")]
    NotInLobby,
    #[error("game is not in progress")]
    NotPlaying,
    #[error("not enough ready players to start")]
    NotReady,
    #[error("principal is not the dungeon master")]
    NotDm,
    #[error("principal not found in session")]
    UnknownPrincipal,
}

/// One queued action awaiting arbitration.
struct QueuedAction {
    principal_id: PrincipalId,
    req_seq: u64,
    action: Action,
}

/// The authoritative session: roster, game state, and the action queue that
/// feeds the arbiter.
pub struct Session {
    pub id: SessionId,
    pub config: SessionConfig,
    pub state: SessionState,
    members: BTreeMap<PrincipalId, Member>,
    game_state: Option<GameState>,
    /// Version counter for `FullState`/`StateDelta` correlation; incremented
    /// once per accepted action.
    version: u64,
    queue_tx: mpsc::Sender<QueuedAction>,
    queue_rx: Option<mpsc::Receiver<QueuedAction>>,
    events_tx: broadcast::Sender<ServerMessage>,
    map_seed: u32,
    /// When the active turn's auto-skip timer expires, or `None` if no turn
    /// is active or the timer is disabled (`turn_timer_secs == 0`).
    turn_deadline: Option<Instant>,
}

impl Session {
    pub fn new(id: SessionId, config: SessionConfig, map_seed: u32) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(256);
        let (events_tx, _) = broadcast::channel(256);
        Self {
            id,
            config,
            state: SessionState::Lobby,
            members: BTreeMap::new(),
            game_state: None,
            version: 0,
            queue_tx,
            queue_rx: Some(queue_rx),
            events_tx,
            map_seed,
            turn_deadline: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events_tx.subscribe()
    }

    fn broadcast(&self, message: ServerMessage) {
        let _ = self.events_tx.send(message);
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.members.values().map(Member::roster_entry).collect()
    }

    pub fn join(
        &mut self,
        principal_id: PrincipalId,
        is_dm: bool,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::NotInLobby);
        }
        if self.members.contains_key(&principal_id) {
            return Err(SessionError::AlreadyJoined);
        }
        if self.members.len() >= self.config.max_players {
            return Err(SessionError::SessionFull);
        }

        self.members.insert(
            principal_id.clone(),
            Member {
                principal_id: principal_id.clone(),
                unit_id: None,
                ready: false,
                is_dm,
                connection: ConnectionStatus::Connected,
                sender,
            },
        );

        self.broadcast(ServerMessage::PlayerJoined { principal_id: principal_id.0 });
        Ok(())
    }

    pub fn leave(&mut self, principal_id: &PrincipalId) {
        if self.members.remove(principal_id).is_some() {
            self.broadcast(ServerMessage::PlayerLeft { principal_id: principal_id.0.clone() });
        }
    }

    /// The member's direct-message channel, if still connected under this
    /// session — used to notify a connection it is being replaced before
    /// evicting it.
    pub fn sender_for(&self, principal_id: &PrincipalId) -> Option<mpsc::Sender<ServerMessage>> {
        self.members.get(principal_id).map(|m| m.sender.clone())
    }

    pub fn broadcast_chat(&self, principal_id: &PrincipalId, text: String) {
        self.broadcast(ServerMessage::ChatReceived { principal_id: principal_id.0.clone(), text });
    }

    pub fn set_ready(&mut self, principal_id: &PrincipalId, ready: bool) -> Result<(), SessionError> {
        let member = self.members.get_mut(principal_id).ok_or(SessionError::UnknownPrincipal)?;
        member.ready = ready;
        Ok(())
    }

    fn all_ready(&self) -> bool {
        self.members.len() >= self.config.min_players
            && self.members.values().all(|m| m.ready)
    }

    /// Start the game: assigns each ready member a `Unit`, seeds the game
    /// state, and runs `start_combat`.
    #[instrument(skip(self))]
    pub fn start_game(&mut self, requester: &PrincipalId) -> Result<(), SessionError> {
        if self.state != SessionState::Lobby {
            return Err(SessionError::NotInLobby);
        }
        let is_dm = self.members.get(requester).map(|m| m.is_dm).unwrap_or(false);
        if !is_dm {
            return Err(SessionError::NotDm);
        }
        if !self.all_ready() {
            return Err(SessionError::NotReady);
        }

        let mut state = GameState::new(self.map_seed);
        for (idx, (principal_id, member)) in self.members.iter_mut().enumerate() {
            let unit_id = UnitId::new(format!("player-{idx}"));
            member.unit_id = Some(unit_id.clone());
            state.units.insert(
                unit_id.clone(),
                game::Unit {
                    id: unit_id,
                    kind: game::UnitKind::Player,
                    owner_principal: Some(principal_id.clone()),
                    stats: game::Stats {
                        hp: 20,
                        hp_max: 20,
                        attack: 4,
                        defense: 2,
                        initiative: 10 - idx as i32,
                        move_range: 5,
                        attack_range: 1,
                    },
                    position: crate::core::Position::new(idx as i64, 0),
                    equipped_weapon_id: None,
                },
            );
        }

        let seed = self.map_seed;
        let (new_state, events) = game::start_combat(state, seed);
        self.game_state = Some(new_state);
        self.state = SessionState::Playing;
        self.version += 1;

        self.broadcast(ServerMessage::Events { events });
        self.announce_turn();
        Ok(())
    }

    fn announce_turn(&mut self) {
        let Some(state) = &self.game_state else {
            self.turn_deadline = None;
            return;
        };
        let Some(turn) = &state.combat.turn else {
            self.turn_deadline = None;
            return;
        };
        let unit_id = turn.current_unit.0.clone();
        let round = state.combat.round;

        let deadline_ms = if self.config.turn_timer_secs > 0 {
            self.turn_deadline = Some(Instant::now() + Duration::from_secs(self.config.turn_timer_secs));
            Some(self.config.turn_timer_secs * 1000)
        } else {
            self.turn_deadline = None;
            None
        };
        self.broadcast(ServerMessage::TurnChange { unit_id, round, deadline_ms });
    }

    /// Whether the active turn's auto-skip timer has expired. Always `false`
    /// outside `Playing` or when the timer is disabled.
    pub fn turn_timer_expired(&self) -> bool {
        self.state == SessionState::Playing
            && self.turn_deadline.map(|deadline| Instant::now() >= deadline).unwrap_or(false)
    }

    /// Auto-skip the active unit's turn once its deadline has passed:
    /// submits a synthetic `EndTurn` directly (bypassing the queue, since
    /// this runs from the same task that owns the per-session lock) and
    /// emits `GameEvent::TurnTimeout` alongside the resulting delta. Intended
    /// to be polled periodically by the session's timer task.
    #[instrument(skip(self))]
    pub async fn force_timeout_current_turn(&mut self) {
        if !self.turn_timer_expired() {
            return;
        }
        let Some(before) = self.game_state.clone() else { return };
        let Some(turn) = &before.combat.turn else { return };
        let unit_id = turn.current_unit.clone();

        let Ok((after, mut events)) = game::execute(&before, Action::EndTurn { unit_id: unit_id.clone() }) else {
            // Can't end turn right now (e.g. combat just ended); clear the
            // deadline so this doesn't fire again every tick.
            self.turn_deadline = None;
            return;
        };

        events.push(game::GameEvent::TurnTimeout { unit_id });
        self.version += 1;
        let delta = diff::diff(&before, &after, self.version - 1, self.version);
        let ended = matches!(after.combat.status, game::CombatStatus::EndedVictory | game::CombatStatus::EndedDefeat);
        self.game_state = Some(after);
        self.broadcast(ServerMessage::StateDelta { delta });
        self.broadcast(ServerMessage::Events { events });
        self.announce_turn();
        if ended {
            self.state = SessionState::Ended;
        }
    }

    pub fn full_state(&self) -> Option<(u64, GameState)> {
        self.game_state.clone().map(|s| (self.version, s))
    }

    /// Enqueue an action for arbitration. Step 1-3 of the pipeline: resolve
    /// the submitting principal to a unit, run the cheap reject checks that
    /// don't need mutable access, then push onto the FIFO.
    #[instrument(skip(self, action))]
    pub async fn submit_action(
        &self,
        principal_id: PrincipalId,
        req_seq: u64,
        action: Action,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Playing {
            return Err(SessionError::NotPlaying);
        }
        let member = self.members.get(&principal_id).ok_or(SessionError::UnknownPrincipal)?;
        if member.unit_id.as_ref() != Some(action.unit_id()) {
            // Submitting on behalf of another unit is always rejected; the
            // arbiter answers this as a normal `ActionResult`, not a queue error.
            let _ = member
                .sender
                .send(ServerMessage::ActionResult {
                    req_seq,
                    outcome: ActionOutcome::Rejected {
                        code: "not_your_unit".into(),
                        message: "you do not control this unit".into(),
                    },
                })
                .await;
            return Ok(());
        }

        let _ = self
            .queue_tx
            .send(QueuedAction { principal_id, req_seq, action })
            .await;
        Ok(())
    }

    /// Step 4-5 of the pipeline: dequeue one action, run it through
    /// `execute`, broadcast the resulting events/delta, and answer the
    /// submitter. Call in a loop from the session's dedicated task.
    pub async fn drain_one(&mut self) -> bool {
        let Some(rx) = self.queue_rx.as_mut() else { return false };
        let Some(queued) = rx.recv().await else { return false };
        self.arbitrate(queued).await;
        true
    }

    async fn arbitrate(&mut self, queued: QueuedAction) {
        let QueuedAction { principal_id, req_seq, action } = queued;

        let Some(before) = self.game_state.clone() else { return };
        let result = game::execute(&before, action);

        let outcome = match &result {
            Ok((after, events)) => {
                self.version += 1;
                let delta = diff::diff(&before, after, self.version - 1, self.version);
                let ended = matches!(after.combat.status, game::CombatStatus::EndedVictory | game::CombatStatus::EndedDefeat);
                self.game_state = Some(after.clone());
                self.broadcast(ServerMessage::StateDelta { delta });
                if !events.is_empty() {
                    self.broadcast(ServerMessage::Events { events: events.clone() });
                }
                self.announce_turn();
                if ended {
                    self.state = SessionState::Ended;
                }
                ActionOutcome::Accepted
            }
            Err(err) => {
                if err.is_fatal() {
                    warn!(error = %err, "fatal invariant violation, ending session");
                    self.state = SessionState::Ended;
                    self.broadcast(ServerMessage::Error {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                }
                ActionOutcome::from(err)
            }
        };

        if let Some(member) = self.members.get(&principal_id) {
            let _ = member.sender.send(ServerMessage::ActionResult { req_seq, outcome }).await;
        }

        if matches!(result, Err(ExecuteError::InvariantViolated(_))) {
            return;
        }

        self.maybe_run_ai_turn().await;
    }

    /// If the unit whose turn it now is belongs to an NPC/monster, or to a
    /// principal demoted to AI control, decide and submit its action
    /// immediately rather than waiting on a client that will never come.
    async fn maybe_run_ai_turn(&mut self) {
        let Some(state) = &self.game_state else { return };
        let Some(turn) = &state.combat.turn else { return };
        let current = turn.current_unit.clone();

        let Some(unit) = state.units.get(&current) else { return };
        let owner_demoted = unit
            .owner_principal
            .as_ref()
            .and_then(|p| self.members.get(p))
            .map(|m| matches!(m.connection, ConnectionStatus::DemotedToAi))
            .unwrap_or(false);

        if unit.kind == game::UnitKind::Player && !owner_demoted {
            return;
        }

        let action = game::ai::decide_action(state, &current);
        let before = state.clone();
        if let Ok((after, events)) = game::execute(&before, action) {
            self.version += 1;
            let delta = diff::diff(&before, &after, self.version - 1, self.version);
            self.game_state = Some(after.clone());
            self.broadcast(ServerMessage::StateDelta { delta });
            if !events.is_empty() {
                self.broadcast(ServerMessage::Events { events });
            }
            self.announce_turn();
            if matches!(after.combat.status, game::CombatStatus::EndedVictory | game::CombatStatus::EndedDefeat) {
                self.state = SessionState::Ended;
            }
        }
    }

    pub fn apply_dm_command(&mut self, requester: &PrincipalId, command: DmCommand) -> Result<(), SessionError> {
        let is_dm = self.members.get(requester).map(|m| m.is_dm).unwrap_or(false);
        if !is_dm {
            return Err(SessionError::NotDm);
        }
        match command {
            DmCommand::EndCombat { status } => {
                if let Some(state) = &mut self.game_state {
                    state.combat.status = status;
                }
                self.state = SessionState::Ended;
            }
            DmCommand::SetPaused { paused } => {
                self.state = if paused { SessionState::Paused } else { SessionState::Playing };
                self.broadcast(if paused {
                    ServerMessage::GamePaused { reason: "dm_command".into() }
                } else {
                    ServerMessage::GameResumed
                });
            }
        }
        Ok(())
    }

    /// Mark a principal disconnected. Past `reconnect_window_secs` without a
    /// reconnect, `promote_expired_disconnects` demotes it to permanent AI
    /// control.
    pub fn mark_disconnected(&mut self, principal_id: &PrincipalId) {
        if let Some(member) = self.members.get_mut(principal_id) {
            member.connection = ConnectionStatus::Disconnected { since: Instant::now() };
            self.broadcast(ServerMessage::PlayerDisconnected {
                principal_id: principal_id.0.clone(),
                grace_seconds: self.config.reconnect_grace_secs as u32,
            });
        }
    }

    pub fn reconnect(&mut self, principal_id: &PrincipalId, sender: mpsc::Sender<ServerMessage>) -> bool {
        if let Some(member) = self.members.get_mut(principal_id) {
            if matches!(member.connection, ConnectionStatus::DemotedToAi) {
                return false;
            }
            member.connection = ConnectionStatus::Connected;
            member.sender = sender;
            self.broadcast(ServerMessage::PlayerReconnected { principal_id: principal_id.0.clone() });
            true
        } else {
            false
        }
    }

    /// Sweep disconnected members past the reconnect window. Intended to be
    /// called periodically (e.g. once per turn-timer tick) from the
    /// session's driving task.
    pub fn promote_expired_disconnects(&mut self) {
        let window = Duration::from_secs(self.config.reconnect_window_secs);
        for member in self.members.values_mut() {
            if let ConnectionStatus::Disconnected { since } = member.connection {
                if since.elapsed() >= window {
                    member.connection = ConnectionStatus::DemotedToAi;
                    info!(principal = %member.principal_id.0, "reconnect window elapsed, demoting to AI");
                }
            }
        }
    }
}

/// Registry of active sessions: coarse `RwLock`-guarded maps, no
/// per-session locking beyond the session's own `RwLock`.
pub struct SessionManager {
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<Session>>>>,
    principal_sessions: RwLock<BTreeMap<PrincipalId, SessionId>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            principal_sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a session and start its per-session arbiter and turn-timer
    /// tasks. `map_seed` is the client-supplied seed if one was given;
    /// otherwise the map seed is derived from the new session id.
    pub async fn create_session(&self, config: SessionConfig, map_seed: Option<u32>) -> SessionId {
        let id = SessionId::new_random();
        let seed = map_seed.unwrap_or_else(|| session_seed(&id));
        let session = Arc::new(RwLock::new(Session::new(id.clone(), config, seed)));
        self.sessions.write().await.insert(id.clone(), session.clone());
        spawn_arbiter_loop(session.clone());
        spawn_turn_timer_loop(session);
        id
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<RwLock<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn get_for_principal(&self, principal_id: &PrincipalId) -> Option<Arc<RwLock<Session>>> {
        let session_id = self.principal_sessions.read().await.get(principal_id).cloned()?;
        self.get(&session_id).await
    }

    /// Enforces at most one session per principal: joining a second session
    /// replaces the mapping, and the caller is responsible for closing the
    /// old connection with `close_code::REPLACED`.
    pub async fn register(&self, principal_id: PrincipalId, session_id: SessionId) -> Option<SessionId> {
        self.principal_sessions.write().await.insert(principal_id, session_id)
    }

    pub async fn unregister(&self, principal_id: &PrincipalId) {
        self.principal_sessions.write().await.remove(principal_id);
    }

    pub async fn remove(&self, id: &SessionId) {
        self.sessions.write().await.remove(id);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn get_all(&self) -> Vec<(SessionId, Arc<RwLock<Session>>)> {
        self.sessions.read().await.iter().map(|(id, s)| (id.clone(), s.clone())).collect()
    }

    /// Tear down sessions that have ended, so the registry doesn't grow
    /// unbounded as games finish.
    pub async fn cleanup_ended(&self) {
        let mut sessions = self.sessions.write().await;
        let mut to_remove = Vec::new();
        for (id, session) in sessions.iter() {
            if session.read().await.state == SessionState::Ended {
                to_remove.push(id.clone());
            }
        }
        for id in to_remove {
            sessions.remove(&id);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a hash of a session id, used as the map seed when the client didn't
/// supply one of its own.
fn session_seed(id: &SessionId) -> u32 {
    let mut acc: u32 = 2166136261;
    for b in id.0.as_bytes() {
        acc = (acc ^ *b as u32).wrapping_mul(16777619);
    }
    acc
}

/// The dedicated per-session task that drains the action queue in order:
/// waits for a queued action with no lock held, then briefly takes the
/// session's write lock to run it through `arbitrate`. Holding the lock only
/// across the synchronous part of arbitration (not across the channel wait)
/// keeps `submit_action`/read access from blocking on an idle session.
fn spawn_arbiter_loop(session: Arc<RwLock<Session>>) {
    tokio::spawn(async move {
        let mut rx = {
            let mut guard = session.write().await;
            match guard.queue_rx.take() {
                Some(rx) => rx,
                None => return,
            }
        };
        while let Some(queued) = rx.recv().await {
            let mut guard = session.write().await;
            if guard.state == SessionState::Ended {
                break;
            }
            guard.arbitrate(queued).await;
        }
    });
}

/// Polls once a second for an expired turn timer and auto-skips the active
/// unit's turn when one fires. A no-op session (timer disabled, or not
/// currently playing) just burns an empty tick.
fn spawn_turn_timer_loop(session: Arc<RwLock<Session>>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let mut guard = session.write().await;
            if guard.state == SessionState::Ended {
                break;
            }
            if guard.turn_timer_expired() {
                guard.force_timeout_current_turn().await;
            }
        }
    });
}
