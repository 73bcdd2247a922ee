//! The CPU P95 slot controller.
//!
//! Schedules discrete 60 s (configurable) slots at "high" or "baseline"
//! intensity so the 7-day P95 of observed CPU utilization converges on a
//! setpoint, while persisting its slot-decision ring so a restart doesn't
//! cold-start the 24 h exceedance budget. Formulas live in [`slot`], the
//! ring in [`ring`], the hysteresis rule in [`state`].

pub mod ring;
pub mod slot;
pub mod state;

use crate::config::Config;
use crate::metrics::{Metric, MetricsStore};
use ring::SlotRing;
use serde::{Deserialize, Serialize};
use state::{hysteresis_width, next_state, ControllerState};
use std::path::PathBuf;

const P95_CACHE_TTL_SEC: f64 = 180.0;
const SEVEN_DAYS_SEC: f64 = 7.0 * 86_400.0;
const SECONDS_PER_DAY: f64 = 86_400.0;
const H_RECENT: f64 = 2.5;
const H_STABLE: f64 = 1.0;
const RECENT_CHANGE_WINDOW_SEC: f64 = 300.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: String,
    pub cpu_p95: Option<f64>,
    pub current_exceedance_pct: f64,
    pub exceedance_target_pct: f64,
    pub target_intensity_pct: f64,
    pub slots_recorded: u64,
    pub ring_size: u64,
    pub slot_history_index: u64,
    pub slots_skipped_safety: u64,
    pub degraded_persistence: bool,
    pub current_slot_is_high: bool,
}

pub struct CpuP95Controller {
    target_min: f64,
    target_max: f64,
    baseline_intensity: f64,
    high_intensity: f64,
    exceedance_target_base: f64,
    slot_duration_sec: f64,
    ring_batch_size: u64,
    load_threshold: f64,
    load_check_enabled: bool,
    load_scale_start: f64,
    load_scale_full: f64,
    load_scale_min: f64,
    persistence_dir: PathBuf,

    state: ControllerState,
    last_state_change_at: f64,

    cached_p95: Option<f64>,
    cached_p95_at: f64,
    cache_primed: bool,

    ring: SlotRing,
    current_slot_start: f64,
    current_slot_is_high: bool,
    current_slot_forced_low: bool,
    slots_skipped_safety: u64,
    slots_since_save: u64,
    degraded_persistence: bool,
}

impl CpuP95Controller {
    /// Builds a controller from `config`, loading a persisted ring snapshot
    /// from `config.persistence_dir` if one exists and is fresh (age <= 2h
    /// and matching ring size); otherwise starts with an empty ring. `now`
    /// seeds the first slot's start time.
    pub fn new(config: &Config, now: f64) -> CpuP95Controller {
        let ring_size = ((SECONDS_PER_DAY / config.cpu_p95_slot_duration_sec as f64).round() as usize).max(1);

        let (ring, current_slot_is_high, loaded_from_snapshot) =
            match SlotRing::load_snapshot(&config.persistence_dir, ring_size) {
                Ok(Some((ring, is_high))) => (ring, is_high, true),
                Ok(None) => (SlotRing::new(ring_size), false, false),
                Err(e) => {
                    log::warn!("failed to load p95 ring snapshot, starting empty: {}", e);
                    (SlotRing::new(ring_size), false, false)
                }
            };

        let mut controller = CpuP95Controller {
            target_min: config.cpu_p95_target_min,
            target_max: config.cpu_p95_target_max,
            baseline_intensity: config.cpu_p95_baseline_intensity,
            high_intensity: config.cpu_p95_high_intensity,
            exceedance_target_base: config.cpu_p95_exceedance_target,
            slot_duration_sec: config.cpu_p95_slot_duration_sec as f64,
            ring_batch_size: config.cpu_p95_ring_buffer_batch_size,
            load_threshold: config.load_threshold,
            load_check_enabled: config.load_check_enabled,
            load_scale_start: config.cpu_p95_load_scale_start,
            load_scale_full: config.cpu_p95_load_scale_full,
            load_scale_min: config.cpu_p95_load_scale_min,
            persistence_dir: config.persistence_dir.clone(),

            state: ControllerState::Maintaining,
            last_state_change_at: now,

            cached_p95: None,
            cached_p95_at: f64::NEG_INFINITY,
            cache_primed: false,

            ring,
            current_slot_start: now,
            current_slot_is_high,
            current_slot_forced_low: false,
            slots_skipped_safety: 0,
            slots_since_save: 0,
            degraded_persistence: false,
        };

        // With no persisted decision to resume, the first slot still needs
        // an is_high call before any tick reaches the boundary-crossing
        // loop in `should_run_high_slot`; decide it the same way a slot
        // rollover would, against the (empty) ring's exceedance.
        if !loaded_from_snapshot {
            controller.current_slot_is_high = controller.initial_slot_is_high();
        }

        controller
    }

    fn initial_slot_is_high(&self) -> bool {
        self.ring.current_exceedance() < self.exceedance_target()
    }

    /// Refreshes the TTL-cached 7-day CPU P95 from `store`. A `None` query
    /// result never overwrites a previously cached value — a transient
    /// store failure must not blank the controller's view of the world.
    pub fn get_cpu_p95(&mut self, store: &MetricsStore, now: f64) -> Option<f64> {
        if self.cache_primed && (now - self.cached_p95_at) < P95_CACHE_TTL_SEC {
            return self.cached_p95;
        }
        self.cached_p95_at = now;
        self.cache_primed = true;
        if let Some(p) = store.percentile(Metric::Cpu, 95.0, SEVEN_DAYS_SEC) {
            self.cached_p95 = Some(p);
        }
        self.cached_p95
    }

    /// Refreshes the state machine's hysteresis rule against the cached
    /// P95. Callers pass the value already returned by
    /// [`get_cpu_p95`] so the transition rule and the cache policy stay
    /// decoupled and independently testable.
    pub fn update_state(&mut self, cpu_p95: Option<f64>, now: f64) {
        let h = hysteresis_width(
            now - self.last_state_change_at,
            RECENT_CHANGE_WINDOW_SEC,
            H_RECENT,
            H_STABLE,
        );
        let next = next_state(self.state, cpu_p95, self.target_min, self.target_max, h);
        if next != self.state {
            self.state = next;
            self.last_state_change_at = now;
        }
        // Same non-destructive rule as `get_cpu_p95`: a `None` reading never
        // blanks out the last known value used by the intensity/exceedance
        // formulas.
        if let Some(p) = cpu_p95 {
            self.cached_p95 = Some(p);
        }
    }

    fn target_intensity(&self) -> f64 {
        slot::commanded_intensity(
            self.state,
            self.cached_p95,
            self.target_min,
            self.target_max,
            self.baseline_intensity,
            self.high_intensity,
        )
    }

    fn exceedance_target(&self) -> f64 {
        slot::commanded_exceedance_target(
            self.state,
            self.cached_p95,
            self.target_min,
            self.target_max,
            self.exceedance_target_base,
        )
    }

    pub fn get_current_exceedance(&self) -> f64 {
        self.ring.current_exceedance()
    }

    pub fn get_exceedance_target(&self) -> f64 {
        self.exceedance_target()
    }

    pub fn get_target_intensity(&self) -> f64 {
        self.target_intensity()
    }

    /// Advances the slot engine and returns `(is_high, intensity_pct)` for
    /// the current slot. Must be called at least once per control tick;
    /// closes and opens slots on boundary crossings.
    pub fn should_run_high_slot(&mut self, load_avg: Option<f64>, now: f64) -> (bool, f64) {
        while now >= self.current_slot_start + self.slot_duration_sec {
            self.close_current_slot();
            self.current_slot_start += self.slot_duration_sec;
            self.open_new_slot(load_avg);
        }

        let is_high = self.current_slot_is_high && !self.current_slot_forced_low;
        let intensity = if is_high {
            slot::scale_for_load(
                self.target_intensity(),
                load_avg,
                self.baseline_intensity,
                self.load_scale_start,
                self.load_scale_full,
                self.load_scale_min,
            )
        } else {
            self.baseline_intensity
        };
        (is_high, intensity)
    }

    fn close_current_slot(&mut self) {
        let effective_is_high = self.current_slot_is_high && !self.current_slot_forced_low;
        self.ring.record(effective_is_high);
        self.slots_since_save += 1;
        if self.slots_since_save >= self.ring_batch_size {
            self.flush_snapshot();
            self.slots_since_save = 0;
        }
    }

    fn open_new_slot(&mut self, load_avg: Option<f64>) {
        let e = self.ring.current_exceedance();
        let e_target = self.exceedance_target();
        let mut is_high = e < e_target;

        if self.load_check_enabled {
            if let Some(load) = load_avg {
                if load > self.load_threshold {
                    is_high = false;
                    self.slots_skipped_safety += 1;
                }
            }
        }

        self.current_slot_is_high = is_high;
        self.current_slot_forced_low = false;
    }

    /// Forces the in-flight slot to record as "low" when it closes,
    /// regardless of how many times it is called within the same slot
    /// (idempotent: the effect is identical to calling it once).
    pub fn mark_current_slot_low(&mut self) {
        self.current_slot_forced_low = true;
    }

    fn flush_snapshot(&mut self) {
        if self.degraded_persistence {
            return;
        }
        if let Err(e) = self.ring.save_snapshot(&self.persistence_dir, self.current_slot_is_high) {
            if e.raw_os_error() == Some(libc::ENOSPC) {
                log::error!(
                    "p95 ring snapshot write hit ENOSPC; entering degraded-persistence mode"
                );
                self.degraded_persistence = true;
            } else {
                log::warn!("failed to write p95 ring snapshot: {}", e);
            }
        }
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state.to_string(),
            cpu_p95: self.cached_p95,
            current_exceedance_pct: self.get_current_exceedance(),
            exceedance_target_pct: self.exceedance_target(),
            target_intensity_pct: self.target_intensity(),
            slots_recorded: self.ring.population() as u64,
            ring_size: self.ring.ring_size() as u64,
            slot_history_index: self.ring.write_index() as u64,
            slots_skipped_safety: self.slots_skipped_safety,
            degraded_persistence: self.degraded_persistence,
            current_slot_is_high: self.current_slot_is_high && !self.current_slot_forced_low,
        }
    }

    /// Flushes the ring snapshot unconditionally, bypassing the batch
    /// counter — shutdown always forces a flush regardless of persistence
    /// batching.
    pub fn shutdown(&mut self) {
        if self.degraded_persistence {
            return;
        }
        if let Err(e) = self.ring.save_snapshot(&self.persistence_dir, self.current_slot_is_high) {
            log::warn!("failed to flush p95 ring snapshot on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config(overrides: &[(&str, &str)]) -> Config {
        let mut map = HashMap::new();
        for (k, v) in overrides {
            map.insert(k.to_string(), v.to_string());
        }
        Config::from_env_with_overrides(&map).unwrap()
    }

    #[test]
    fn test_cold_start_low_p95_building_and_high_first_slot() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&[
            ("CPU_P95_SLOT_DURATION", "60"),
            ("CPU_P95_TARGET_MIN", "22"),
            ("CPU_P95_TARGET_MAX", "28"),
            ("CPU_P95_HIGH_INTENSITY", "35"),
            ("CPU_P95_BASELINE_INTENSITY", "20"),
            ("CPU_P95_EXCEEDANCE_TARGET", "6.5"),
            ("LOADSHAPER_PERSISTENCE_DIR", dir.path().to_str().unwrap()),
        ]);
        let mut controller = CpuP95Controller::new(&config, 1000.0);
        controller.update_state(Some(15.0), 1000.0);
        assert_eq!(controller.state, ControllerState::Building);
        assert_eq!(controller.get_exceedance_target(), 10.5);
        assert_eq!(controller.get_current_exceedance(), 0.0);

        let (is_high, intensity) = controller.should_run_high_slot(None, 1000.0);
        assert!(is_high);
        assert_eq!(intensity, 43.0);
    }

    #[test]
    fn test_high_load_forces_baseline_after_slot_rollover() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&[
            ("CPU_P95_SLOT_DURATION", "60"),
            ("CPU_P95_TARGET_MIN", "22"),
            ("CPU_P95_TARGET_MAX", "28"),
            ("CPU_P95_HIGH_INTENSITY", "35"),
            ("CPU_P95_BASELINE_INTENSITY", "20"),
            ("CPU_P95_EXCEEDANCE_TARGET", "6.5"),
            ("LOAD_THRESHOLD", "0.6"),
            ("LOADSHAPER_PERSISTENCE_DIR", dir.path().to_str().unwrap()),
        ]);
        let mut controller = CpuP95Controller::new(&config, 1000.0);
        controller.update_state(Some(15.0), 1000.0);
        // Roll over one slot with load above threshold.
        let (is_high, intensity) = controller.should_run_high_slot(Some(0.8), 1061.0);
        assert!(!is_high);
        assert_eq!(intensity, 20.0);
        assert!(controller.slots_skipped_safety >= 1);
    }

    #[test]
    fn test_percentile_on_empty_window_keeps_previous_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&[("LOADSHAPER_PERSISTENCE_DIR", dir.path().to_str().unwrap())]);
        let store = MetricsStore::open(dir.path()).unwrap();
        let mut controller = CpuP95Controller::new(&config, 1000.0);

        let p95 = controller.get_cpu_p95(&store, 1000.0);
        assert_eq!(p95, None);
        controller.update_state(p95, 1000.0);
        // setpoint = (22+28)/2 = 25 for the default band, matching the
        // config's CPU_P95_SETPOINT default of 25.
        assert_eq!(controller.get_target_intensity(), 25.0);
    }

    #[test]
    fn test_ring_wraparound_keeps_slots_recorded_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&[
            ("CPU_P95_SLOT_DURATION", "1"),
            ("LOADSHAPER_PERSISTENCE_DIR", dir.path().to_str().unwrap()),
        ]);
        let mut controller = CpuP95Controller::new(&config, 0.0);
        let ring_size = controller.ring.ring_size();
        let mut now = 0.0;
        for _ in 0..ring_size {
            now += 1.0;
            controller.should_run_high_slot(None, now);
        }
        assert_eq!(controller.ring.population(), ring_size);
        assert_eq!(controller.ring.write_index(), 0);
        now += 1.0;
        controller.should_run_high_slot(None, now);
        assert_eq!(controller.ring.population(), ring_size);
        assert_eq!(controller.ring.write_index(), 1);
    }

    #[test]
    fn test_mark_current_slot_low_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&[
            ("CPU_P95_SLOT_DURATION", "60"),
            ("LOADSHAPER_PERSISTENCE_DIR", dir.path().to_str().unwrap()),
        ]);
        let mut controller = CpuP95Controller::new(&config, 0.0);
        controller.should_run_high_slot(None, 0.0);
        controller.mark_current_slot_low();
        controller.mark_current_slot_low();
        controller.mark_current_slot_low();
        let (is_high, _) = controller.should_run_high_slot(None, 30.0);
        assert!(!is_high);
    }

    #[test]
    fn test_shutdown_persists_snapshot_that_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&[
            ("CPU_P95_SLOT_DURATION", "60"),
            ("LOADSHAPER_PERSISTENCE_DIR", dir.path().to_str().unwrap()),
        ]);
        let mut controller = CpuP95Controller::new(&config, 0.0);
        for i in 0..5 {
            controller.should_run_high_slot(None, (i * 60) as f64);
        }
        let before = controller.status();
        controller.shutdown();

        let reloaded = CpuP95Controller::new(&config, 300.0);
        let after = reloaded.status();
        assert_eq!(before.slots_recorded, after.slots_recorded);
        assert_eq!(before.slot_history_index, after.slot_history_index);
        assert_eq!(before.ring_size, after.ring_size);
    }

    #[test]
    fn test_slot_duration_zero_is_rejected_at_config_layer() {
        let mut overrides = HashMap::new();
        overrides.insert("CPU_P95_SLOT_DURATION".to_string(), "0".to_string());
        assert!(Config::from_env_with_overrides(&overrides).is_err());
    }
}
