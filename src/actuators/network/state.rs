//! Network actuator state machine (spec §3/§4.G). Transitions are guarded
//! by debounce/min-on/min-off, except the very first transition out of
//! `OFF` at startup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkState {
    Off,
    Initializing,
    Validating,
    ActiveUdp,
    ActiveTcp,
    DegradedLocal,
    Error,
}

impl std::fmt::Display for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NetworkState::Off => "OFF",
            NetworkState::Initializing => "INITIALIZING",
            NetworkState::Validating => "VALIDATING",
            NetworkState::ActiveUdp => "ACTIVE_UDP",
            NetworkState::ActiveTcp => "ACTIVE_TCP",
            NetworkState::DegradedLocal => "DEGRADED_LOCAL",
            NetworkState::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

impl NetworkState {
    pub fn is_active(self) -> bool {
        matches!(self, NetworkState::ActiveUdp | NetworkState::ActiveTcp)
    }
}

/// Whether a transition away from `current` (which began at
/// `current_since`) to a new state is allowed at `now`. `is_first` marks
/// the very first transition out of `OFF`, which bypasses every guard per
/// spec §3.
#[allow(clippy::too_many_arguments)]
pub fn can_transition(
    current_since: f64,
    now: f64,
    is_first: bool,
    debounce_sec: f64,
    min_on_sec: f64,
    min_off_sec: f64,
    current_was_active: bool,
) -> bool {
    if is_first {
        return true;
    }
    let elapsed = now - current_since;
    if elapsed < debounce_sec {
        return false;
    }
    let min_hold = if current_was_active {
        min_on_sec
    } else {
        min_off_sec
    };
    elapsed >= min_hold
}
