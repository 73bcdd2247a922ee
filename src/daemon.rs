//! The main control loop and shutdown sequencing.
//!
//! `Daemon` owns every subsystem handle and steps them from one coordinating
//! thread, rather than scattering state across callbacks or channels. `now`
//! is threaded through every method explicitly, the way the rest of the core
//! already does, so the tick logic is testable without a real clock.

use crate::actuators::{CpuActuator, MemoryActuator, NetworkActuator};
use crate::config::Config;
use crate::controller::CpuP95Controller;
use crate::ema::Ema;
use crate::hardware::HostInfo;
use crate::health::{
    CurrentMetrics, HealthSnapshot, MetricsSnapshot, Percentiles7d, StorageStatus, TargetMetrics,
};
use crate::metrics::{Metric, MetricsStore};
use crate::sampler::{self, Sampler};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const RECLAMATION_THRESHOLD_PCT: f64 = 20.0;
const CLEANUP_INTERVAL_SEC: f64 = 1.4 * 3600.0;
const SEVEN_DAYS_SEC: f64 = 7.0 * 86_400.0;
const RETENTION_SEC: f64 = 7.0 * 86_400.0;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Holds every subsystem started in A->B->C->D->(E,F,G) order and steps them
/// from `tick()`, called once per `CONTROL_PERIOD_SEC` by `run()`.
pub struct Daemon {
    config: Config,
    host: HostInfo,

    sampler: Sampler,
    store: MetricsStore,
    controller: CpuP95Controller,
    cpu_actuator: CpuActuator,
    mem_actuator: MemoryActuator,
    net_actuator: NetworkActuator,

    ema_cpu: Ema,
    ema_mem: Ema,
    ema_net: Ema,
    ema_load: Ema,

    duty: f64,
    net_rate_mbps: f64,
    paused: bool,
    pause_logged: bool,
    resume_logged: bool,

    jitter: f64,
    next_jitter_at: f64,

    started_at: f64,
    last_cleanup_at: f64,
    last_sample: Option<sampler::Sample>,
}

impl Daemon {
    /// Starts every subsystem for `config`/`host` at time `now`, loading any
    /// persisted ring snapshot along the way (component D). The metrics
    /// store's directory must already have passed
    /// [`crate::metrics::store::require_independent_mount`] — that check
    /// happens once at process startup, not per-`Daemon`.
    pub fn start(config: Config, host: HostInfo, now: f64) -> Result<Daemon, crate::error::LoadshaperError> {
        let store = MetricsStore::open(&config.persistence_dir)?;
        let controller = CpuP95Controller::new(&config, now);

        let sampler = Sampler::new("eth0", host.logical_cpus, config.net_link_mbit);
        let cpu_actuator = CpuActuator::start(host.logical_cpus);
        let mem_actuator = MemoryActuator::start(config.mem_step_mb, config.mem_touch_interval_sec);
        let net_actuator = NetworkActuator::start(
            config.net_peers.clone(),
            config.net_port,
            config.net_packet_size,
            config.net_ttl,
            config.net_require_external,
            config.net_peer_validation_timeout_sec,
            config.net_reputation_success_step,
            config.net_reputation_failure_step,
            config.net_reputation_blacklist_threshold,
            config.net_blacklist_cooldown_sec,
            config.net_debounce_sec,
            config.net_min_on_sec,
            config.net_min_off_sec,
            config.net_peer_recovery_interval_sec,
            config.net_min_rate_mbit,
            now,
        );

        let avg_window = config.avg_window_sec;
        let step = config.control_period_sec;

        Ok(Daemon {
            ema_cpu: Ema::new(avg_window, step),
            ema_mem: Ema::new(avg_window, step),
            ema_net: Ema::new(avg_window, step),
            ema_load: Ema::new(avg_window, step),

            duty: 0.0,
            net_rate_mbps: config.net_min_rate_mbit,
            paused: false,
            pause_logged: false,
            resume_logged: true,

            jitter: 0.0,
            next_jitter_at: now,

            started_at: now,
            last_cleanup_at: now,
            last_sample: None,

            sampler,
            store,
            controller,
            cpu_actuator,
            mem_actuator,
            net_actuator,
            config,
            host,
        })
    }

    /// Runs the control loop until `stop` is set, then performs an orderly
    /// [`Daemon::shutdown`]. `stop` is shared with the process's signal
    /// handlers; every sleep here is bounded so a signal is honored within
    /// one control period.
    pub fn run(mut self, stop: &AtomicBool) {
        let period = Duration::from_secs_f64(self.config.control_period_sec.max(0.05));
        while !stop.load(Ordering::Relaxed) {
            self.tick(now_secs());
            thread_sleep_interruptible(period, stop);
        }
        self.shutdown();
    }

    /// One control-period iteration: sample, update EMAs and the slot
    /// controller, compute jittered targets, run the safety gate, command
    /// actuators, then persist the sample. Exposed directly
    /// for tests that need deterministic timestamps instead of the wall clock.
    pub fn tick(&mut self, now: f64) {
        // 1. Sample.
        let sample = self.sampler.sample();
        self.last_sample = Some(sample);

        // 2. Update EMAs; update D's cached P95 and state.
        self.ema_cpu.update(sample.cpu_pct);
        self.ema_mem.update(sample.mem_pct);
        self.ema_net.update(sample.net_pct);
        self.ema_load.update(sample.load_per_core);

        let cpu_p95 = self.controller.get_cpu_p95(&self.store, now);
        self.controller.update_state(cpu_p95, now);

        // 3. Jittered targets.
        if now >= self.next_jitter_at {
            self.reroll_jitter();
            self.next_jitter_at = now + self.config.jitter_period_sec;
        }
        let mem_target = (self.config.mem_target_pct * (1.0 + self.jitter)).max(0.0);
        let net_target = (self.config.net_target_pct * (1.0 + self.jitter)).max(0.0);

        // 4/5. Safety stop / resume gate.
        self.update_safety_gate(now);

        // 6. Command actuators while active.
        if self.paused {
            self.cpu_actuator.set_duty(0.0);
            self.mem_actuator.set_target_bytes(0);
            self.net_actuator.set_paused(true, self.config.net_min_rate_mbit);
        } else {
            let load_avg = Some(sample.load_per_core);
            let (_is_high, intensity) = self.controller.should_run_high_slot(load_avg, now);
            let jittered_intensity = (intensity * (1.0 + self.jitter)).max(0.0);

            self.duty = (self.duty
                + self.config.k_cpu * (jittered_intensity - self.ema_cpu.value_or_zero()) / 100.0)
                .clamp(0.0, self.config.max_duty);
            self.cpu_actuator.set_duty(self.duty);

            self.command_memory(mem_target);

            let needs_net = self.needs_network_activation(cpu_p95);
            let effective_net_target = if needs_net { net_target } else { 0.0 };
            self.net_rate_mbps = crate::actuators::network::next_rate(
                self.net_rate_mbps,
                self.config.k_net,
                effective_net_target,
                self.ema_net.value_or_zero(),
                self.config.net_min_rate_mbit,
                self.config.net_max_rate_mbit,
            );
            self.net_actuator.set_rate_mbps(self.net_rate_mbps);
        }

        // 7. Append sample, periodically clean up.
        if let Err(e) = self.store.store(sample) {
            log::warn!("failed to store sample: {}", e);
        }
        if now - self.last_cleanup_at >= CLEANUP_INTERVAL_SEC {
            match self.store.cleanup(RETENTION_SEC) {
                Ok(removed) => log::debug!("metrics cleanup removed {} stale records", removed),
                Err(e) => log::warn!("metrics cleanup failed: {}", e),
            }
            self.last_cleanup_at = now;
        }
    }

    fn reroll_jitter(&mut self) {
        let pct = self.config.jitter_pct;
        self.jitter = if pct <= 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(-pct / 100.0..=pct / 100.0)
        };
    }

    fn update_safety_gate(&mut self, now: f64) {
        let load_ema = self.ema_load.value_or_zero();
        let stop_triggered = self.ema_cpu.value_or_zero() > self.config.cpu_stop_pct
            || self.ema_mem.value_or_zero() > self.config.mem_stop_pct
            || self.ema_net.value_or_zero() > self.config.net_stop_pct
            || (self.config.load_check_enabled && load_ema > self.config.load_threshold);

        if stop_triggered && !self.paused {
            self.paused = true;
            self.pause_logged = false;
            self.resume_logged = false;
        }

        if self.paused && !self.pause_logged {
            log::warn!(
                "safety stop engaged at t={:.0}: cpu_ema={:.1} mem_ema={:.1} net_ema={:.1} load_ema={:.2}",
                now,
                self.ema_cpu.value_or_zero(),
                self.ema_mem.value_or_zero(),
                self.ema_net.value_or_zero(),
                load_ema
            );
            self.pause_logged = true;
        }

        if self.paused {
            let h = self.config.hysteresis_pct;
            let below_cpu = self.ema_cpu.value_or_zero() < self.config.cpu_stop_pct - h;
            let below_mem = self.ema_mem.value_or_zero() < self.config.mem_stop_pct - h;
            let below_net = self.ema_net.value_or_zero() < self.config.net_stop_pct - h;
            let load_ok = !self.config.load_check_enabled || load_ema < self.config.load_resume_threshold;

            if below_cpu && below_mem && below_net && load_ok {
                self.paused = false;
                if !self.resume_logged {
                    log::info!("safety stop cleared, resuming at t={:.0}", now);
                    self.resume_logged = true;
                }
            }
        }
    }

    fn command_memory(&self, mem_target_pct: f64) {
        let desired_raw = ((self.host.ram_total_bytes as f64) * mem_target_pct / 100.0).round();
        let desired_raw = if desired_raw.is_finite() && desired_raw > 0.0 {
            desired_raw as u64
        } else {
            0
        };

        let desired = match sampler::mem::read_meminfo() {
            Ok(info) => {
                let current = self.mem_actuator.current_size_bytes();
                let min_free_bytes = self.config.mem_min_free_mb.saturating_mul(1024 * 1024);
                if desired_raw > current {
                    let growth = desired_raw - current;
                    let allowed_growth = info.free_bytes.saturating_sub(min_free_bytes);
                    current + growth.min(allowed_growth)
                } else {
                    desired_raw
                }
            }
            Err(_) => desired_raw,
        };

        self.mem_actuator.set_target_bytes(desired);
    }

    fn needs_network_activation(&self, cpu_p95: Option<f64>) -> bool {
        let cpu_p95_at_risk = cpu_p95.map(|p| p < RECLAMATION_THRESHOLD_PCT).unwrap_or(true);
        let mem_avg_at_risk = self.ema_mem.value_or_zero() < RECLAMATION_THRESHOLD_PCT;
        let net_avg_at_risk = self.ema_net.value_or_zero() < RECLAMATION_THRESHOLD_PCT;
        crate::actuators::network::smart_activation_needed(
            self.config.shape_class,
            cpu_p95_at_risk,
            mem_avg_at_risk,
            net_avg_at_risk,
        )
    }

    /// Component I: stop flag already set by the caller; drives every
    /// actuator to its minimum, joins the nurse/send-loop threads, flushes
    /// D's ring unconditionally, and releases C.
    pub fn shutdown(self) {
        self.cpu_actuator.set_duty(0.0);
        self.mem_actuator.set_target_bytes(0);
        self.cpu_actuator.shutdown();
        self.mem_actuator.shutdown();
        self.net_actuator.shutdown();

        let mut controller = self.controller;
        controller.shutdown();
    }

    pub fn health_snapshot(&self, now: f64) -> HealthSnapshot {
        let mut checks = HashMap::new();
        checks.insert("metrics_store".to_string(), !self.store.is_degraded());
        checks.insert("controller_persistence".to_string(), !self.controller.status().degraded_persistence);

        let status = if self.store.is_degraded() || self.controller.status().degraded_persistence {
            "degraded".to_string()
        } else {
            "ok".to_string()
        };

        HealthSnapshot {
            uptime_sec: (now - self.started_at).max(0.0),
            status,
            checks,
            storage: StorageStatus {
                degraded: self.store.is_degraded(),
                consecutive_write_failures: self.store.consecutive_write_failures(),
                sample_count_7d: self.store.count(SEVEN_DAYS_SEC) as u64,
            },
            paused: self.paused,
            controller_state: self.controller.status().state,
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let status = self.controller.status();
        let current = self.last_sample.unwrap_or(sampler::Sample {
            t: 0.0,
            cpu_pct: 0.0,
            mem_pct: 0.0,
            net_pct: 0.0,
            load_per_core: 0.0,
        });

        MetricsSnapshot {
            current: CurrentMetrics {
                cpu_pct: current.cpu_pct,
                mem_pct: current.mem_pct,
                net_pct: current.net_pct,
                load_per_core: current.load_per_core,
            },
            target: TargetMetrics {
                cpu_p95_setpoint: self.config.cpu_p95_setpoint,
                mem_target_pct: self.config.mem_target_pct,
                net_target_pct: self.config.net_target_pct,
            },
            percentiles_7d: Percentiles7d {
                cpu_p95: status.cpu_p95,
                mem_p95: self.store.percentile(Metric::Mem, 95.0, SEVEN_DAYS_SEC),
                net_p95: self.store.percentile(Metric::Net, 95.0, SEVEN_DAYS_SEC),
            },
            exceedance_pct: status.current_exceedance_pct,
            slots_recorded: status.slots_recorded,
            slots_skipped_safety: status.slots_skipped_safety,
        }
    }
}

/// Sleeps for `period`, but in short slices so a stop signal set mid-sleep
/// is observed within roughly 100 ms rather than the full control period.
fn thread_sleep_interruptible(period: Duration, stop: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = period;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let slice = remaining.min(SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
}
