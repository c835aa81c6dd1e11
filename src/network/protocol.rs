//! Wire Protocol
//!
//! Message taxonomy for client-server communication over WebSocket. Sent as
//! JSON for debugging ease; the tagged-enum shape matches the rest of the
//! simulation's wire types (`Action`, `GameEvent`).

use serde::{Deserialize, Serialize};

use crate::diff::Delta;
use crate::game::{Action, ExecuteError, GameEvent, GameState};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate the connection with an external JWT.
    Auth { token: String },

    /// Keep-alive probe; server answers with `Pong`.
    Ping { timestamp: u64 },

    /// Create a new game lobby. `seed` overrides the map seed; when absent
    /// the server derives one from the new session id.
    CreateGame { mode: GameMode, seed: Option<u32> },

    /// Join an existing lobby by id.
    JoinGame { session_id: String },

    /// Leave the current lobby or game.
    LeaveGame,

    /// Signal readiness to start.
    Ready,

    /// List the caller's persisted characters.
    ListCharacters,

    /// Create a new character.
    CreateCharacter { name: String },

    /// Push a character's current sheet for idempotent persistence.
    SyncCharacter { character_id: String, state: serde_json::Value },

    /// Submit a simulation action. `req_seq` lets the client correlate the
    /// eventual `ActionResult`.
    Action { req_seq: u64, action: Action },

    /// Dungeon-master-only override command (only valid for the DM principal).
    DmCommand { req_seq: u64, command: DmCommand },

    /// Chat line, broadcast to the session's roster.
    Chat { text: String },

    /// Ask the server for a full resync (used after a detected drift).
    RequestSync,
}

/// Lobby creation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Standard party-vs-monsters combat.
    Standard,
    /// Single-player practice against AI-controlled monsters only.
    Solo,
}

/// DM override commands, applied outside the normal action-legality checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DmCommand {
    /// Force the combat to end immediately with the given status.
    EndCombat { status: crate::game::CombatStatus },
    /// Pause or resume the turn timer.
    SetPaused { paused: bool },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Keep-alive response.
    Pong { timestamp: u64, server_time: u64 },

    /// Result of an `Auth` request.
    AuthResult { success: bool, principal_id: Option<String>, error: Option<String> },

    /// Current lobby roster and readiness.
    LobbyState { session_id: String, members: Vec<RosterEntry> },

    /// A full snapshot of the authoritative state — sent on join, on
    /// resync, and whenever a delta would be larger than a full state.
    FullState { version: u64, state: GameState },

    /// An incremental change since `delta.from_version`.
    StateDelta { delta: Delta },

    /// Simulation events produced by the most recently accepted action.
    Events { events: Vec<GameEvent> },

    /// Outcome of a submitted action, correlated via `req_seq`.
    ActionResult {
        req_seq: u64,
        outcome: ActionOutcome,
    },

    /// Whose turn it now is, and the deadline (server epoch millis) if a
    /// turn timer is active.
    TurnChange { unit_id: String, round: u32, deadline_ms: Option<u64> },

    /// Roster change notifications.
    PlayerJoined { principal_id: String },
    PlayerLeft { principal_id: String },
    PlayerDisconnected { principal_id: String, grace_seconds: u32 },
    PlayerReconnected { principal_id: String },

    /// Chat relay.
    ChatReceived { principal_id: String, text: String },

    /// Session-wide pause/resume (DM override or auto-pause on empty roster).
    GamePaused { reason: String },
    GameResumed,

    /// A request could not be honored.
    Error { code: String, message: String },

    /// Response to `ListCharacters`.
    CharacterList { characters: Vec<CharacterSummary> },

    /// Response to `CreateCharacter`/`SyncCharacter`: the record's id and the
    /// version it now holds after the upsert.
    CharacterSynced { character_id: String, version: u64 },
}

/// One roster member as shown in lobby/session-state broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub principal_id: String,
    pub ready: bool,
    pub connected: bool,
}

/// One character sheet as shown in `CharacterList`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub character_id: String,
    pub version: u64,
    pub sheet: serde_json::Value,
}

/// The result carried by `ActionResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Accepted,
    Rejected { code: String, message: String },
}

impl From<&ExecuteError> for ActionOutcome {
    fn from(err: &ExecuteError) -> Self {
        ActionOutcome::Rejected {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Close codes used when the connection broker tears down a socket outside
/// the normal `Error` message flow (the client may not be able to read a
/// text frame once the transport itself is closing).
pub mod close_code {
    /// Authentication failed or token missing.
    pub const AUTH_FAILED: u16 = 4001;
    /// A second connection authenticated as the same principal replaced this one.
    pub const REPLACED: u16 = 4002;
}
