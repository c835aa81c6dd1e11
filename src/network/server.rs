//! Connection Broker
//!
//! Async WebSocket server: owns the connection↔principal↔session mapping,
//! enforces at most one live connection per principal, and routes
//! `ClientMessage`s to the right `Session`. Turn-based play has no fixed
//! tick loop — the arbiter drains its FIFO as actions arrive.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::PrincipalId;
use crate::persistence::{CharacterRecord, Storage};

use super::auth::{validate_token, AuthConfig};
use super::protocol::{close_code, ActionOutcome, CharacterSummary, ClientMessage, ServerMessage};
use super::session::{Session, SessionConfig, SessionError, SessionId, SessionManager};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    /// A connection idle this long without any message (including pings) is dropped.
    pub idle_timeout: Duration,
    pub session: SessionConfig,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            session: SessionConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

struct Connection {
    principal_id: Option<PrincipalId>,
    session_id: Option<SessionId>,
    authenticated: bool,
    last_activity: Instant,
    sender: mpsc::Sender<ServerMessage>,
}

pub struct ConnectionBroker {
    config: ServerConfig,
    auth: AuthConfig,
    sessions: Arc<SessionManager>,
    connections: Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
    storage: Arc<dyn Storage>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionBroker {
    pub fn new(config: ServerConfig, auth: AuthConfig, storage: Arc<dyn Storage>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            auth,
            sessions: Arc::new(SessionManager::new()),
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            storage,
            shutdown_tx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), BrokerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "connection broker listening");

        let cleanup_connections = self.connections.clone();
        let cleanup_sessions = self.sessions.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_connections, cleanup_sessions, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if self.connections.read().await.len() >= self.config.max_connections {
                                warn!(%addr, "connection limit reached, rejecting");
                                continue;
                            }
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let connections = self.connections.clone();
        let sessions = self.sessions.clone();
        let auth = self.auth.clone();
        let storage = self.storage.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!(%addr, error = %e, "websocket handshake failed");
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            connections.write().await.insert(
                addr,
                Connection {
                    principal_id: None,
                    session_id: None,
                    authenticated: false,
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                },
            );

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let Ok(text) = serde_json::to_string(&msg) else { continue };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!(%addr, error = %e, "invalid client message");
                                        let _ = msg_tx.send(ServerMessage::Error {
                                            code: "invalid_input".into(),
                                            message: "could not parse message".into(),
                                        }).await;
                                        continue;
                                    }
                                };
                                if let Some(conn) = connections.write().await.get_mut(&addr) {
                                    conn.last_activity = Instant::now();
                                }
                                Self::dispatch(addr, client_msg, &connections, &sessions, &auth, &storage, &msg_tx).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: now_millis(),
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(e)) => {
                                error!(%addr, error = %e, "websocket error");
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            sender_task.abort();
            Self::teardown_connection(addr, &connections, &sessions).await;
        });
    }

    async fn dispatch(
        addr: SocketAddr,
        msg: ClientMessage,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
        auth: &AuthConfig,
        storage: &Arc<dyn Storage>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong { timestamp, server_time: now_millis() }).await;
            }
            ClientMessage::Auth { token } => {
                Self::handle_auth(addr, &token, connections, sessions, auth, sender).await;
            }
            ClientMessage::CreateGame { seed, .. } => {
                Self::handle_create_game(addr, seed, connections, sessions, sender).await;
            }
            ClientMessage::JoinGame { session_id } => {
                Self::handle_join_game(addr, session_id, connections, sessions, sender).await;
            }
            ClientMessage::Ready => {
                // The DM marking themselves ready is the lobby's implicit
                // start-game trigger (the wire protocol has no separate
                // start-game message); any other principal's `Ready` just
                // updates roster readiness.
                Self::with_session(addr, connections, sessions, |principal, session| {
                    let _ = session.set_ready(&principal, true);
                    let _ = session.start_game(&principal);
                })
                .await;
            }
            ClientMessage::Action { req_seq, action } => {
                if let Some((principal, session)) = Self::resolve(addr, connections, sessions).await {
                    let guard = session.read().await;
                    let _ = guard.submit_action(principal, req_seq, action).await;
                }
            }
            ClientMessage::DmCommand { req_seq, command } => {
                let outcome = Self::with_session(addr, connections, sessions, move |principal, session| {
                    session.apply_dm_command(&principal, command)
                })
                .await;
                if let Some(Err(err)) = outcome {
                    let _ = sender
                        .send(ServerMessage::ActionResult {
                            req_seq,
                            outcome: ActionOutcome::Rejected { code: "dm_command_rejected".into(), message: err.to_string() },
                        })
                        .await;
                }
            }
            ClientMessage::Chat { text } => {
                Self::with_session(addr, connections, sessions, move |principal, session| {
                    session.broadcast_chat(&principal, text);
                })
                .await;
            }
            ClientMessage::LeaveGame => {
                Self::handle_leave(addr, connections, sessions).await;
            }
            ClientMessage::RequestSync => {
                if let Some((_principal, session)) = Self::resolve(addr, connections, sessions).await {
                    let full = session.read().await.full_state();
                    if let Some((version, state)) = full {
                        let _ = sender.send(ServerMessage::FullState { version, state }).await;
                    }
                }
            }
            ClientMessage::ListCharacters => {
                Self::handle_list_characters(addr, connections, storage, sender).await;
            }
            ClientMessage::CreateCharacter { name } => {
                Self::handle_create_character(addr, name, connections, storage, sender).await;
            }
            ClientMessage::SyncCharacter { character_id, state } => {
                Self::handle_sync_character(addr, character_id, state, connections, storage, sender).await;
            }
        }
    }

    async fn handle_list_characters(
        addr: SocketAddr,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        storage: &Arc<dyn Storage>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(principal_id) = Self::authenticated_principal(addr, connections).await else {
            let _ = sender.send(unauthenticated_error()).await;
            return;
        };
        match storage.list_characters(&principal_id).await {
            Ok(records) => {
                let characters = records
                    .into_iter()
                    .map(|r| CharacterSummary { character_id: r.character_id, version: r.version, sheet: r.sheet })
                    .collect();
                let _ = sender.send(ServerMessage::CharacterList { characters }).await;
            }
            Err(e) => {
                let _ = sender.send(ServerMessage::Error { code: "persistence_error".into(), message: e.to_string() }).await;
            }
        }
    }

    async fn handle_create_character(
        addr: SocketAddr,
        name: String,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        storage: &Arc<dyn Storage>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(principal_id) = Self::authenticated_principal(addr, connections).await else {
            let _ = sender.send(unauthenticated_error()).await;
            return;
        };
        let character_id = uuid::Uuid::new_v4().to_string();
        let record = CharacterRecord {
            character_id: character_id.clone(),
            owner_principal: principal_id,
            sheet: serde_json::json!({ "name": name }),
            version: 0,
        };
        Self::upsert_and_reply(character_id, record, storage, sender).await;
    }

    async fn handle_sync_character(
        addr: SocketAddr,
        character_id: String,
        state: serde_json::Value,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        storage: &Arc<dyn Storage>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(principal_id) = Self::authenticated_principal(addr, connections).await else {
            let _ = sender.send(unauthenticated_error()).await;
            return;
        };
        let record = CharacterRecord { character_id: character_id.clone(), owner_principal: principal_id, sheet: state, version: 0 };
        Self::upsert_and_reply(character_id, record, storage, sender).await;
    }

    async fn upsert_and_reply(
        character_id: String,
        record: CharacterRecord,
        storage: &Arc<dyn Storage>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if let Err(e) = storage.upsert_character(record).await {
            let _ = sender.send(ServerMessage::Error { code: "persistence_error".into(), message: e.to_string() }).await;
            return;
        }
        match storage.get_character(&character_id).await {
            Ok(Some(stored)) => {
                let _ = sender.send(ServerMessage::CharacterSynced { character_id, version: stored.version }).await;
            }
            Ok(None) => {
                let _ = sender
                    .send(ServerMessage::Error { code: "persistence_error".into(), message: "character vanished after upsert".into() })
                    .await;
            }
            Err(e) => {
                let _ = sender.send(ServerMessage::Error { code: "persistence_error".into(), message: e.to_string() }).await;
            }
        }
    }

    async fn handle_auth(
        addr: SocketAddr,
        token: &str,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
        auth: &AuthConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match validate_token(token, auth) {
            Ok(claims) => {
                let principal_id = claims.principal_id();

                if let Some(conn) = connections.write().await.get_mut(&addr) {
                    conn.principal_id = Some(principal_id.clone());
                    conn.authenticated = true;
                }

                let _ = sender
                    .send(ServerMessage::AuthResult {
                        success: true,
                        principal_id: Some(principal_id.0),
                        error: None,
                    })
                    .await;
            }
            Err(e) => {
                let _ = sender
                    .send(ServerMessage::AuthResult { success: false, principal_id: None, error: Some(e.to_string()) })
                    .await;
            }
        }
    }

    async fn handle_create_game(
        addr: SocketAddr,
        seed: Option<u32>,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(principal_id) = Self::authenticated_principal(addr, connections).await else {
            let _ = sender.send(unauthenticated_error()).await;
            return;
        };

        let session_id = sessions.create_session(SessionConfig::default(), seed).await;
        Self::join_common(addr, principal_id, session_id, true, connections, sessions, sender).await;
    }

    async fn handle_join_game(
        addr: SocketAddr,
        session_id: String,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(principal_id) = Self::authenticated_principal(addr, connections).await else {
            let _ = sender.send(unauthenticated_error()).await;
            return;
        };
        Self::join_common(addr, principal_id, SessionId(session_id), false, connections, sessions, sender).await;
    }

    async fn join_common(
        addr: SocketAddr,
        principal_id: PrincipalId,
        session_id: SessionId,
        is_dm: bool,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(session) = sessions.get(&session_id).await else {
            let _ = sender.send(ServerMessage::Error { code: "session_not_found".into(), message: "no such session".into() }).await;
            return;
        };

        let previous = sessions.register(principal_id.clone(), session_id.clone()).await;
        if let Some(prev_id) = previous {
            if prev_id != session_id {
                if let Some(prev_session) = sessions.get(&prev_id).await {
                    let mut guard = prev_session.write().await;
                    if let Some(old_sender) = guard.sender_for(&principal_id) {
                        let _ = old_sender
                            .send(ServerMessage::Error {
                                code: format!("{}", close_code::REPLACED),
                                message: "connection replaced by a newer session for this principal".into(),
                            })
                            .await;
                    }
                    guard.leave(&principal_id);
                }
            }
        }

        let join_result = {
            let mut guard = session.write().await;
            guard.join(principal_id.clone(), is_dm, sender.clone())
        };

        if let Err(err) = join_result {
            let _ = sender.send(ServerMessage::Error { code: "join_rejected".into(), message: err.to_string() }).await;
            return;
        }

        if let Some(conn) = connections.write().await.get_mut(&addr) {
            conn.session_id = Some(session_id);
        }

        let roster = session.read().await.roster();
        let _ = sender
            .send(ServerMessage::LobbyState { session_id: session.read().await.id.0.clone(), members: roster })
            .await;
    }

    async fn authenticated_principal(
        addr: SocketAddr,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
    ) -> Option<PrincipalId> {
        let conns = connections.read().await;
        let conn = conns.get(&addr)?;
        if conn.authenticated {
            conn.principal_id.clone()
        } else {
            None
        }
    }

    async fn resolve(
        addr: SocketAddr,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
    ) -> Option<(PrincipalId, Arc<RwLock<Session>>)> {
        let (principal_id, session_id) = {
            let conns = connections.read().await;
            let conn = conns.get(&addr)?;
            (conn.principal_id.clone()?, conn.session_id.clone()?)
        };
        let session = sessions.get(&session_id).await?;
        Some((principal_id, session))
    }

    async fn with_session<F, R>(
        addr: SocketAddr,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(PrincipalId, &mut Session) -> R,
    {
        let (principal_id, session) = Self::resolve(addr, connections, sessions).await?;
        let mut guard = session.write().await;
        Some(f(principal_id, &mut guard))
    }

    async fn handle_leave(
        addr: SocketAddr,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
    ) {
        if let Some((principal_id, session)) = Self::resolve(addr, connections, sessions).await {
            session.write().await.leave(&principal_id);
            sessions.unregister(&principal_id).await;
        }
        if let Some(conn) = connections.write().await.get_mut(&addr) {
            conn.session_id = None;
        }
    }

    async fn teardown_connection(
        addr: SocketAddr,
        connections: &Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: &Arc<SessionManager>,
    ) {
        let removed = connections.write().await.remove(&addr);
        if let Some(conn) = removed {
            if let (Some(principal_id), Some(session_id)) = (conn.principal_id, conn.session_id) {
                if let Some(session) = sessions.get(&session_id).await {
                    session.write().await.mark_disconnected(&principal_id);
                }
            }
        }
        info!(%addr, "connection cleaned up");
    }

    async fn run_cleanup_loop(
        connections: Arc<RwLock<BTreeMap<SocketAddr, Connection>>>,
        sessions: Arc<SessionManager>,
        idle_timeout: Duration,
    ) {
        let mut tick = interval(Duration::from_secs(30));
        loop {
            tick.tick().await;

            let now = Instant::now();
            let stale: Vec<SocketAddr> = connections
                .read()
                .await
                .iter()
                .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                .map(|(addr, _)| *addr)
                .collect();

            for addr in stale {
                connections.write().await.remove(&addr);
                info!(%addr, "removed idle connection");
            }

            for (_, session) in sessions.get_all().await {
                session.write().await.promote_expired_disconnects();
            }

            sessions.cleanup_ended().await;
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn unauthenticated_error() -> ServerMessage {
    ServerMessage::Error { code: "not_authenticated".into(), message: "authenticate first".into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default_has_sane_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert!(config.idle_timeout.as_secs() > 0);
    }

    #[tokio::test]
    async fn broker_creation_starts_with_no_connections() {
        let config = ServerConfig { bind_addr: "127.0.0.1:0".parse().unwrap(), ..Default::default() };
        let broker = ConnectionBroker::new(config, AuthConfig::default(), crate::persistence::InMemoryStorage::shared());
        assert_eq!(broker.connection_count().await, 0);
        assert_eq!(broker.session_count().await, 0);
    }
}
