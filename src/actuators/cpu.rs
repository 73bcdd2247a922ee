//! One busy-spin/sleep worker per logical CPU.
//!
//! Grounded on `original_source/loadshaper.py`'s `cpu_worker` (100 ms tick,
//! trivial arithmetic busy-loop, `SLEEP_SLICE` minimum yield), expressed as a
//! thread-per-core worker pool with `nice(19)`. Duty is shared as a
//! fixed-point permille `AtomicU32` so a logically-`f64` value stays a
//! lock-free single-writer/many-reader cell.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TICK_MS: u64 = 100;
const SLEEP_SLICE_MS: u64 = 5;
const DUTY_SCALE: f64 = 1000.0;

/// One worker per logical CPU, driven by a shared duty cell. `H` (the main
/// control loop) is the sole writer of `duty`/`paused`; workers only read.
pub struct CpuActuator {
    duty_permille: Arc<AtomicU32>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl CpuActuator {
    /// Spawns `logical_cpus` workers, each running at the lowest available
    /// OS priority.
    pub fn start(logical_cpus: u32) -> CpuActuator {
        let duty_permille = Arc::new(AtomicU32::new(0));
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(logical_cpus.max(1) as usize);
        for worker_id in 0..logical_cpus.max(1) {
            let duty = Arc::clone(&duty_permille);
            let paused = Arc::clone(&paused);
            let stop = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name(format!("cpu-actuator-{}", worker_id))
                .spawn(move || cpu_worker_loop(duty, paused, stop))
                .expect("failed to spawn cpu actuator worker thread");
            workers.push(handle);
        }

        CpuActuator {
            duty_permille,
            paused,
            stop,
            workers,
        }
    }

    /// Sets the commanded duty (0..=`MAX_DUTY`, a fraction in `[0,1]`).
    /// Written only by the control loop.
    pub fn set_duty(&self, duty: f64) {
        let permille = (duty.clamp(0.0, 1.0) * DUTY_SCALE).round() as u32;
        self.duty_permille.store(permille, Ordering::Relaxed);
    }

    pub fn duty(&self) -> f64 {
        self.duty_permille.load(Ordering::Relaxed) as f64 / DUTY_SCALE
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Signals all workers to stop and joins them with no deadline beyond
    /// the worker's own tick granularity (at most one 100 ms tick).
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn setup_worker_priority() {
    unsafe {
        let _ = libc::nice(19);
    }
}

fn cpu_worker_loop(duty: Arc<AtomicU32>, paused: Arc<AtomicBool>, stop: Arc<AtomicBool>) {
    setup_worker_priority();

    while !stop.load(Ordering::Relaxed) {
        if paused.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(SLEEP_SLICE_MS));
            continue;
        }

        let duty_frac = duty.load(Ordering::Relaxed) as f64 / DUTY_SCALE;
        if duty_frac <= 0.0 {
            thread::sleep(Duration::from_millis(SLEEP_SLICE_MS));
            continue;
        }

        let busy_ms = (duty_frac * TICK_MS as f64).min(TICK_MS as f64);
        busy_spin(Duration::from_micros((busy_ms * 1000.0) as u64));

        let sleep_ms = (TICK_MS as f64 - busy_ms).max(SLEEP_SLICE_MS as f64) as u64;
        thread::sleep(Duration::from_millis(sleep_ms));
    }
}

/// Trivial arithmetic busy-loop: no allocation, no I/O, a volatile write
/// each iteration so the compiler can't elide the loop.
fn busy_spin(duration: Duration) {
    let start = Instant::now();
    let mut acc: u64 = 0;
    while start.elapsed() < duration {
        for i in 0..1000u64 {
            acc = acc.wrapping_add(i.wrapping_mul(2654435761));
        }
        unsafe {
            std::ptr::write_volatile(&mut acc, acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_duty_clamps_to_unit_interval() {
        let actuator = CpuActuator::start(1);
        actuator.set_duty(1.5);
        assert_eq!(actuator.duty(), 1.0);
        actuator.set_duty(-0.5);
        assert_eq!(actuator.duty(), 0.0);
        actuator.shutdown();
    }

    #[test]
    fn test_set_duty_roundtrips_within_permille_precision() {
        let actuator = CpuActuator::start(1);
        actuator.set_duty(0.30);
        assert!((actuator.duty() - 0.30).abs() < 1e-3);
        actuator.shutdown();
    }

    #[test]
    fn test_paused_flag_roundtrips() {
        let actuator = CpuActuator::start(1);
        assert!(!actuator.is_paused());
        actuator.set_paused(true);
        assert!(actuator.is_paused());
        actuator.shutdown();
    }

    #[test]
    fn test_shutdown_joins_all_workers() {
        let actuator = CpuActuator::start(2);
        actuator.set_duty(0.1);
        thread::sleep(Duration::from_millis(20));
        actuator.shutdown();
    }
}
