//! Pure formulas for commanded intensity, commanded exceedance target, and
//! load-based proportional safety scaling. Kept free of any mutable
//! controller state so each rule can be tested in isolation.

use super::state::ControllerState;

/// Commanded CPU intensity for the *current* state, given the cached P95
/// (`None` if never cached). `baseline`/`high` are `B`/`H`; `target_min`/
/// `target_max` bound the setpoint band.
pub fn commanded_intensity(
    state: ControllerState,
    p: Option<f64>,
    target_min: f64,
    target_max: f64,
    baseline: f64,
    high: f64,
) -> f64 {
    let setpoint = (target_min + target_max) / 2.0;
    match state {
        ControllerState::Building => {
            let far_below = matches!(p, Some(p) if p < target_min - 5.0);
            let raw = if far_below { high + 8.0 } else { high + 5.0 };
            raw.max(baseline)
        }
        ControllerState::Reducing => {
            let far_above = matches!(p, Some(p) if p > target_max + 10.0);
            if far_above {
                baseline.max(high - 5.0)
            } else {
                baseline.max(high - 2.0)
            }
        }
        ControllerState::Maintaining => {
            let p = p.unwrap_or(setpoint);
            let raw = setpoint + 0.2 * (setpoint - p);
            raw.clamp(baseline, high)
        }
    }
}

/// Commanded exceedance target (the share of slots that should be "high")
/// for the current state. `e0` is the baseline exceedance target
/// (`CPU_P95_EXCEEDANCE_TARGET`).
pub fn commanded_exceedance_target(
    state: ControllerState,
    p: Option<f64>,
    target_min: f64,
    target_max: f64,
    e0: f64,
) -> f64 {
    match state {
        ControllerState::Building => {
            let far_below = matches!(p, Some(p) if p < target_min - 5.0);
            if far_below {
                (e0 + 4.0).min(12.0)
            } else {
                e0 + 1.0
            }
        }
        ControllerState::Reducing => {
            let far_above = matches!(p, Some(p) if p > target_max + 10.0);
            if far_above {
                1.0
            } else {
                2.5
            }
        }
        ControllerState::Maintaining => e0,
    }
}

/// Proportional safety scaling: between `scale_start` and `scale_full` the
/// intensity is linearly interpolated down to `max(baseline,
/// intensity*min_scale)`; at or above `scale_full` it clamps to
/// `baseline`. A `None` load leaves intensity untouched (no load signal to
/// scale against).
pub fn scale_for_load(
    intensity: f64,
    load_avg: Option<f64>,
    baseline: f64,
    scale_start: f64,
    scale_full: f64,
    min_scale: f64,
) -> f64 {
    let load = match load_avg {
        Some(l) => l,
        None => return intensity,
    };
    if load <= scale_start {
        intensity
    } else if load >= scale_full {
        baseline
    } else {
        let floor = baseline.max(intensity * min_scale);
        let frac = (load - scale_start) / (scale_full - scale_start);
        intensity - frac * (intensity - floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_building_far_below_adds_eight() {
        let v = commanded_intensity(ControllerState::Building, Some(15.0), 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 43.0);
    }

    #[test]
    fn test_building_near_target_adds_five() {
        let v = commanded_intensity(ControllerState::Building, Some(20.0), 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 40.0);
    }

    #[test]
    fn test_building_none_p_is_near_target_case() {
        let v = commanded_intensity(ControllerState::Building, None, 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 40.0);
    }

    #[test]
    fn test_reducing_far_above_drops_five() {
        let v = commanded_intensity(ControllerState::Reducing, Some(40.0), 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 30.0);
    }

    #[test]
    fn test_reducing_near_target_drops_two() {
        let v = commanded_intensity(ControllerState::Reducing, Some(29.0), 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 33.0);
    }

    #[test]
    fn test_reducing_never_drops_below_baseline() {
        let v = commanded_intensity(ControllerState::Reducing, Some(40.0), 22.0, 28.0, 34.0, 35.0);
        assert_eq!(v, 34.0);
    }

    #[test]
    fn test_maintaining_proportional_nudge() {
        // setpoint = 25; P=20 -> 25 + 0.2*(25-20) = 26
        let v = commanded_intensity(ControllerState::Maintaining, Some(20.0), 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 26.0);
    }

    #[test]
    fn test_maintaining_none_p_returns_setpoint() {
        let v = commanded_intensity(ControllerState::Maintaining, None, 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 25.0);
    }

    #[test]
    fn test_maintaining_clamped_to_band() {
        let v = commanded_intensity(ControllerState::Maintaining, Some(-100.0), 22.0, 28.0, 20.0, 35.0);
        assert_eq!(v, 35.0);
    }

    #[test]
    fn test_exceedance_building_far_below() {
        let v = commanded_exceedance_target(ControllerState::Building, Some(15.0), 22.0, 28.0, 6.5);
        assert_eq!(v, 10.5);
    }

    #[test]
    fn test_exceedance_building_capped_at_twelve() {
        let v = commanded_exceedance_target(ControllerState::Building, Some(1.0), 22.0, 28.0, 9.0);
        assert_eq!(v, 12.0);
    }

    #[test]
    fn test_exceedance_reducing_far_above() {
        let v = commanded_exceedance_target(ControllerState::Reducing, Some(50.0), 22.0, 28.0, 6.5);
        assert_eq!(v, 1.0);
    }

    #[test]
    fn test_exceedance_maintaining_is_baseline() {
        let v = commanded_exceedance_target(ControllerState::Maintaining, Some(25.0), 22.0, 28.0, 6.5);
        assert_eq!(v, 6.5);
    }

    #[test]
    fn test_scale_for_load_below_start_is_noop() {
        assert_eq!(scale_for_load(40.0, Some(0.3), 20.0, 0.5, 0.8, 0.7), 40.0);
    }

    #[test]
    fn test_scale_for_load_above_full_clamps_to_baseline() {
        assert_eq!(scale_for_load(40.0, Some(0.9), 20.0, 0.5, 0.8, 0.7), 20.0);
    }

    #[test]
    fn test_scale_for_load_midpoint_interpolates() {
        // load=0.65 is the midpoint of [0.5,0.8]; floor=max(20, 40*0.7)=28
        let v = scale_for_load(40.0, Some(0.65), 20.0, 0.5, 0.8, 0.7);
        assert!((v - 34.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_for_load_none_is_noop() {
        assert_eq!(scale_for_load(40.0, None, 20.0, 0.5, 0.8, 0.7), 40.0);
    }
}
