//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod auth;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{ClientMessage, DmCommand, GameMode, ServerMessage};
pub use server::{BrokerError, ConnectionBroker, ServerConfig};
pub use session::{Session, SessionConfig, SessionError, SessionId, SessionManager, SessionState};
