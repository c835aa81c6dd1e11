//! State Diff Engine: path-based deltas between two `GameState` snapshots.
//!
//! Operates generically over the `serde_json::Value` tree rather than
//! hand-walking `GameState`'s fields, so every field added to the state
//! model is diffed automatically. Only `map_seed` is excluded at the top
//! level — the map is always reconstructed from the seed, never diffed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::GameState;

/// One leaf-level change: the dotted path to a value, and either its new
/// value (`Some`) or a removal (`None`, used when a map/array entry
/// disappears, e.g. a collected loot drop).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub from_version: u64,
    pub to_version: u64,
    pub changes: Vec<Change>,
}

const EXCLUDED_TOP_LEVEL: &str = "map_seed";

/// Compute the delta that turns `before` into `after`.
pub fn diff(before: &GameState, after: &GameState, from_version: u64, to_version: u64) -> Delta {
    let a = serde_json::to_value(before).expect("GameState always serializes");
    let b = serde_json::to_value(after).expect("GameState always serializes");

    let mut changes = Vec::new();
    diff_values("", &a, &b, &mut changes);

    Delta {
        from_version,
        to_version,
        changes,
    }
}

fn diff_values(path: &str, a: &Value, b: &Value, out: &mut Vec<Change>) {
    if a == b {
        return;
    }

    match (a, b) {
        (Value::Object(map_a), Value::Object(map_b)) => {
            let mut keys: std::collections::BTreeSet<&String> = map_a.keys().collect();
            keys.extend(map_b.keys());

            for key in keys {
                if path.is_empty() && key == EXCLUDED_TOP_LEVEL {
                    continue;
                }
                let child_path = join(path, key);
                match (map_a.get(key), map_b.get(key)) {
                    (Some(va), Some(vb)) => diff_values(&child_path, va, vb, out),
                    (Some(_), None) => out.push(Change { path: child_path, value: None }),
                    (None, Some(vb)) => out.push(Change { path: child_path, value: Some(vb.clone()) }),
                    (None, None) => unreachable!(),
                }
            }
        }
        (Value::Array(arr_a), Value::Array(arr_b)) => {
            let max_len = arr_a.len().max(arr_b.len());
            for i in 0..max_len {
                let child_path = format!("{path}.{i}");
                match (arr_a.get(i), arr_b.get(i)) {
                    (Some(va), Some(vb)) => diff_values(&child_path, va, vb, out),
                    (Some(_), None) => out.push(Change { path: child_path, value: None }),
                    (None, Some(vb)) => out.push(Change { path: child_path, value: Some(vb.clone()) }),
                    (None, None) => unreachable!(),
                }
            }
            if arr_a.len() != arr_b.len() {
                out.push(Change {
                    path: format!("{path}.length"),
                    value: Some(Value::from(arr_b.len())),
                });
            }
        }
        _ => out.push(Change {
            path: path.to_string(),
            value: Some(b.clone()),
        }),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Apply a delta to `state`, producing the state it was computed against.
/// `apply(diff(a, b), a) == b` for any reachable `a`/`b` pair.
pub fn apply(delta: &Delta, state: &GameState) -> GameState {
    let mut value = serde_json::to_value(state).expect("GameState always serializes");

    for change in &delta.changes {
        apply_change(&mut value, &change.path, change.value.as_ref());
    }

    serde_json::from_value(value).expect("applying a well-formed delta keeps GameState's shape")
}

fn apply_change(root: &mut Value, path: &str, new_value: Option<&Value>) {
    let segments: Vec<&str> = path.split('.').collect();
    apply_at(root, &segments, new_value);
}

fn apply_at(node: &mut Value, segments: &[&str], new_value: Option<&Value>) {
    if segments.is_empty() {
        return;
    }

    let (head, rest) = (segments[0], &segments[1..]);

    if rest.is_empty() {
        if head == "length" {
            if let (Value::Array(arr), Some(Value::Number(n))) = (node, new_value) {
                let new_len = n.as_u64().unwrap_or(0) as usize;
                arr.truncate(new_len);
            }
            return;
        }

        match node {
            Value::Object(map) => match new_value {
                Some(v) => {
                    map.insert(head.to_string(), v.clone());
                }
                None => {
                    map.remove(head);
                }
            },
            Value::Array(arr) => {
                if let Ok(idx) = head.parse::<usize>() {
                    match new_value {
                        Some(v) => {
                            while arr.len() <= idx {
                                arr.push(Value::Null);
                            }
                            arr[idx] = v.clone();
                        }
                        None => {
                            if idx < arr.len() {
                                arr[idx] = Value::Null;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        return;
    }

    match node {
        Value::Object(map) => {
            let child = map.entry(head.to_string()).or_insert(Value::Object(Default::default()));
            apply_at(child, rest, new_value);
        }
        Value::Array(arr) => {
            if let Ok(idx) = head.parse::<usize>() {
                if idx < arr.len() {
                    apply_at(&mut arr[idx], rest, new_value);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::unit::{PrincipalId, Stats, Unit, UnitId, UnitKind};
    use crate::core::Position;

    fn sample_state() -> GameState {
        let mut state = GameState::new(42);
        state.units.insert(
            UnitId::new("hero"),
            Unit {
                id: UnitId::new("hero"),
                kind: UnitKind::Player,
                owner_principal: Some(PrincipalId::new("p1")),
                stats: Stats {
                    hp: 10,
                    hp_max: 10,
                    attack: 3,
                    defense: 1,
                    initiative: 5,
                    move_range: 4,
                    attack_range: 1,
                },
                position: Position::new(0, 0),
                equipped_weapon_id: None,
            },
        );
        state
    }

    #[test]
    fn diff_of_identical_states_is_empty() {
        let a = sample_state();
        let d = diff(&a, &a, 1, 1);
        assert!(d.changes.is_empty());
    }

    #[test]
    fn map_seed_is_never_diffed() {
        let mut a = sample_state();
        let mut b = sample_state();
        a.map_seed = 1;
        b.map_seed = 2;
        let d = diff(&a, &b, 1, 2);
        assert!(d.changes.iter().all(|c| c.path != "map_seed"));
    }

    #[test]
    fn apply_diff_round_trips() {
        let a = sample_state();
        let mut b = sample_state();
        b.units.get_mut(&UnitId::new("hero")).unwrap().stats.hp = 4;
        b.units.get_mut(&UnitId::new("hero")).unwrap().position = Position::new(2, 3);

        let d = diff(&a, &b, 1, 2);
        let reconstructed = apply(&d, &a);

        assert_eq!(reconstructed.units[&UnitId::new("hero")].stats.hp, 4);
        assert_eq!(reconstructed.units[&UnitId::new("hero")].position, Position::new(2, 3));
    }

    #[test]
    fn removed_map_entry_round_trips() {
        let mut a = sample_state();
        a.loot_drops.insert(
            crate::game::LootId::new("loot-1"),
            crate::game::LootDrop {
                id: crate::game::LootId::new("loot-1"),
                position: Position::new(1, 1),
                contents: crate::game::LootContents::default(),
            },
        );
        let b = sample_state(); // no loot drops

        let d = diff(&a, &b, 1, 2);
        let reconstructed = apply(&d, &a);
        assert!(reconstructed.loot_drops.is_empty());
    }

    #[test]
    fn array_truncation_round_trips() {
        let mut a = sample_state();
        a.record_history(UnitId::new("hero"), "one");
        a.record_history(UnitId::new("hero"), "two");
        let b = sample_state();

        let d = diff(&a, &b, 1, 2);
        let reconstructed = apply(&d, &a);
        assert_eq!(reconstructed.turn_history.len(), 0);
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use crate::game::unit::{PrincipalId, Stats, Unit, UnitId, UnitKind};
    use crate::core::Position;
    use proptest::prelude::*;

    /// A small, valid `GameState` driven entirely by a handful of bounded
    /// integers, so proptest can shrink failures down to a minimal unit.
    fn arb_state() -> impl Strategy<Value = GameState> {
        (1u32..1000, 1u32..50, 0i64..20, 0i64..20, 1u64..30).prop_map(
            |(seed, hp, x, y, history_len)| {
                let mut state = GameState::new(seed);
                state.units.insert(
                    UnitId::new("hero"),
                    Unit {
                        id: UnitId::new("hero"),
                        kind: UnitKind::Player,
                        owner_principal: Some(PrincipalId::new("p1")),
                        stats: Stats {
                            hp,
                            hp_max: 50,
                            attack: 3,
                            defense: 1,
                            initiative: 5,
                            move_range: 4,
                            attack_range: 1,
                        },
                        position: Position::new(x, y),
                        equipped_weapon_id: None,
                    },
                );
                for i in 0..(history_len % 5) {
                    state.record_history(UnitId::new("hero"), format!("entry-{i}"));
                }
                state
            },
        )
    }

    proptest! {
        /// `apply(diff(a, b), a) == b` for any pair of small, valid states —
        /// the diff engine's core correctness law.
        #[test]
        fn apply_diff_round_trips_for_any_pair(a in arb_state(), b in arb_state()) {
            let delta = diff(&a, &b, 0, 1);
            let reconstructed = apply(&delta, &a);
            prop_assert_eq!(reconstructed, b);
        }

        /// Diffing a state against itself is always empty, regardless of
        /// what that state happens to contain.
        #[test]
        fn diff_of_identical_states_is_always_empty(a in arb_state()) {
            let delta = diff(&a, &a, 3, 4);
            prop_assert!(delta.changes.is_empty());
        }
    }
}
