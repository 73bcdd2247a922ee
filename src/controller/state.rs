//! Controller state machine and its hysteresis transition rule.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Building,
    Maintaining,
    Reducing,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Building => write!(f, "BUILDING"),
            ControllerState::Maintaining => write!(f, "MAINTAINING"),
            ControllerState::Reducing => write!(f, "REDUCING"),
        }
    }
}

/// Hysteresis width in effect: the wider `h_recent` while the last
/// transition was within `recent_window_sec`, the narrower `h_stable`
/// otherwise.
pub fn hysteresis_width(
    seconds_since_last_change: f64,
    recent_window_sec: f64,
    h_recent: f64,
    h_stable: f64,
) -> f64 {
    if seconds_since_last_change < recent_window_sec {
        h_recent
    } else {
        h_stable
    }
}

/// Evaluates the hysteresis transition rule given the cached P95 (`p`, `None`
/// if never cached) and the current state. Returns the next state; the
/// caller is responsible for resetting the last-change timestamp only when
/// the returned state differs from `current`.
#[allow(clippy::too_many_arguments)]
pub fn next_state(
    current: ControllerState,
    p: Option<f64>,
    target_min: f64,
    target_max: f64,
    h: f64,
) -> ControllerState {
    let p = match p {
        Some(p) => p,
        // A None reading never forces a transition; the cached P95 stays at
        // its previous value rather than letting "no data" drive hysteresis
        // on its own.
        None => return current,
    };

    if current != ControllerState::Building && p < target_min - h {
        return ControllerState::Building;
    }
    if current != ControllerState::Reducing && p > target_max + h {
        return ControllerState::Reducing;
    }
    if current != ControllerState::Maintaining && (target_min..=target_max).contains(&p) {
        return ControllerState::Maintaining;
    }
    current
}
