//! Client State Reconciler
//!
//! Pure state-tracking logic for a client connection: no rendering, no
//! networking. Applies `FullState`/`StateDelta` messages in order, detects
//! gaps left by a missed delta, and tells the caller when a `RequestSync` is
//! due. `Events` are display-only and never mutate the tracked state.

use crate::diff::{self, Delta};
use crate::game::{GameEvent, GameState};
use crate::network::protocol::ServerMessage;

/// What the reconciler learned from processing one server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// State unchanged (e.g. a `Pong` or lobby message).
    Ignored,
    /// `state` now reflects `version`.
    Applied { version: u64 },
    /// Events to surface to the UI; state unchanged.
    Events(Vec<GameEvent>),
    /// A delta arrived that doesn't chain from the tracked version. The
    /// caller should send `ClientMessage::RequestSync`.
    DriftDetected { tracked_version: Option<u64>, delta_from: u64 },
}

/// Tracks one client's view of the authoritative game state.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    state: Option<GameState>,
    version: Option<u64>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self { state: None, version: None }
    }

    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Feed one incoming server message through the reconciler.
    pub fn apply_message(&mut self, msg: &ServerMessage) -> ReconcileOutcome {
        match msg {
            ServerMessage::FullState { version, state } => {
                self.state = Some(state.clone());
                self.version = Some(*version);
                ReconcileOutcome::Applied { version: *version }
            }
            ServerMessage::StateDelta { delta } => self.apply_delta(delta),
            ServerMessage::Events { events } => ReconcileOutcome::Events(events.clone()),
            _ => ReconcileOutcome::Ignored,
        }
    }

    fn apply_delta(&mut self, delta: &Delta) -> ReconcileOutcome {
        let (current_state, current_version) = match (&self.state, self.version) {
            (Some(state), Some(version)) => (state, version),
            _ => {
                return ReconcileOutcome::DriftDetected {
                    tracked_version: self.version,
                    delta_from: delta.from_version,
                }
            }
        };

        if delta.from_version != current_version {
            return ReconcileOutcome::DriftDetected {
                tracked_version: Some(current_version),
                delta_from: delta.from_version,
            };
        }

        let next = diff::apply(delta, current_state);
        self.version = Some(delta.to_version);
        self.state = Some(next);
        ReconcileOutcome::Applied { version: delta.to_version }
    }

    /// True once a `DriftDetected` outcome means a resync should be
    /// requested before any further deltas are trusted.
    pub fn needs_resync(&self, outcome: &ReconcileOutcome) -> bool {
        matches!(outcome, ReconcileOutcome::DriftDetected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{Change, Delta};
    use crate::game::{Stats, Unit, UnitId, UnitKind};
    use crate::core::Position;

    fn sample_state(hp: u32) -> GameState {
        let mut state = GameState::new(7);
        state.units.insert(
            UnitId::new("hero"),
            Unit {
                id: UnitId::new("hero"),
                kind: UnitKind::Player,
                owner_principal: None,
                stats: Stats {
                    hp,
                    hp_max: 20,
                    attack: 4,
                    defense: 2,
                    initiative: 10,
                    move_range: 5,
                    attack_range: 1,
                },
                position: Position::new(0, 0),
                equipped_weapon_id: None,
            },
        );
        state
    }

    #[test]
    fn applying_full_state_sets_tracked_version() {
        let mut reconciler = Reconciler::new();
        let outcome = reconciler.apply_message(&ServerMessage::FullState {
            version: 3,
            state: sample_state(20),
        });
        assert_eq!(outcome, ReconcileOutcome::Applied { version: 3 });
        assert_eq!(reconciler.version(), Some(3));
    }

    #[test]
    fn contiguous_delta_applies_cleanly() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_message(&ServerMessage::FullState { version: 1, state: sample_state(20) });

        let delta = diff::diff(&sample_state(20), &sample_state(15), 1, 2);
        let outcome = reconciler.apply_message(&ServerMessage::StateDelta { delta });
        assert_eq!(outcome, ReconcileOutcome::Applied { version: 2 });
        assert_eq!(
            reconciler.state().unwrap().units.get(&UnitId::new("hero")).unwrap().stats.hp,
            15
        );
    }

    #[test]
    fn delta_with_gap_is_flagged_as_drift() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_message(&ServerMessage::FullState { version: 1, state: sample_state(20) });

        let skipping_delta = Delta {
            from_version: 5,
            to_version: 6,
            changes: vec![Change { path: "units.hero.stats.hp".into(), value: Some(serde_json::json!(1)) }],
        };
        let outcome = reconciler.apply_message(&ServerMessage::StateDelta { delta: skipping_delta });
        assert!(matches!(outcome, ReconcileOutcome::DriftDetected { .. }));
        assert!(reconciler.needs_resync(&outcome));
        // Tracked state must not have been mutated by the rejected delta.
        assert_eq!(reconciler.version(), Some(1));
    }

    #[test]
    fn delta_before_any_full_state_is_drift() {
        let mut reconciler = Reconciler::new();
        let delta = Delta { from_version: 0, to_version: 1, changes: vec![] };
        let outcome = reconciler.apply_message(&ServerMessage::StateDelta { delta });
        assert!(matches!(outcome, ReconcileOutcome::DriftDetected { tracked_version: None, .. }));
    }

    #[test]
    fn events_do_not_mutate_tracked_state() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_message(&ServerMessage::FullState { version: 1, state: sample_state(20) });
        let outcome = reconciler.apply_message(&ServerMessage::Events { events: vec![] });
        assert_eq!(outcome, ReconcileOutcome::Events(vec![]));
        assert_eq!(reconciler.version(), Some(1));
    }
}
