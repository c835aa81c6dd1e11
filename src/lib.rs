//! # Rune Forge Server
//!
//! Authoritative session server and deterministic tactical-combat simulation
//! for Rune Forge.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RUNE FORGE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/          - Grid primitives (Position, direction, RNG) │
//! │  map/           - Deterministic seeded terrain generation    │
//! │  pathfind/      - A* pathing over the grid                   │
//! │  game/          - Deterministic combat simulation             │
//! │  ├── unit.rs    - Units, stats, principals                   │
//! │  ├── action.rs  - Player/AI action taxonomy                  │
//! │  ├── execute.rs - The single point of truth for rule logic   │
//! │  ├── combat.rs  - Turn order and combat status                │
//! │  ├── ai.rs      - NPC/monster decision making                │
//! │  ├── loot.rs    - Loot drops and collection                   │
//! │  └── events.rs  - Display-only event stream                  │
//! │  diff/          - GameState delta computation and replay      │
//! │  network/       - WebSocket session server (non-deterministic)│
//! │  ├── auth.rs    - JWT validation                              │
//! │  ├── protocol.rs- Wire message taxonomy                       │
//! │  ├── session.rs - Per-game lobby/turn/reconnect state machine │
//! │  └── server.rs  - Connection broker and lifecycle             │
//! │  persistence/   - Character and session storage façade        │
//! │  client/        - Pure client-side state reconciler            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/`, `map/`, `pathfind/`, and `game/` are **100% deterministic**:
//! - No floating-point arithmetic in combat resolution
//! - No `HashMap` in simulation state (`BTreeMap` for sorted iteration)
//! - No system time dependencies
//! - All randomness from a seeded RNG carried in `GameState::map_seed` and
//!   combat's own seed
//!
//! Given identical inputs and seed, the simulation produces **identical
//! results** on any platform. `network/`, `persistence/`, and `client/` sit
//! outside that guarantee by necessity (wall-clock timers, I/O, sockets) but
//! never themselves decide combat outcomes — they only submit actions to and
//! relay state from the deterministic core.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod diff;
pub mod game;
pub mod map;
pub mod network;
pub mod pathfind;
pub mod persistence;

// Re-export commonly used types
pub use client::Reconciler;
pub use diff::{apply, diff as compute_diff, Change, Delta};
pub use game::{Action, ExecuteError, GameEvent, GameState, PrincipalId, Unit, UnitId};
pub use network::{ConnectionBroker, ServerConfig, Session, SessionId, SessionManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
