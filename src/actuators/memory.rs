//! A growable/shrinkable byte buffer plus a page-touching nurse thread.
//!
//! Grounded on `original_source/loadshaper.py`'s `set_mem_target_bytes` /
//! `mem_nurse_thread` (global buffer behind a lock, page-touch loop over
//! 4096-byte strides, default 1 s nurse interval), expressed with an owned
//! `Vec<u8>`, `std::ptr::write_volatile` to defeat dead-store elimination on
//! the touch, and explicit `truncate`/`shrink_to_fit` on shrink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const PAGE_SIZE: usize = 4096;

struct Buffer {
    bytes: Vec<u8>,
}

/// Owns the memory-pressure buffer exclusively; the nurse thread touches it
/// under the same lock the resize path uses, per spec §5's shared-resource
/// policy for F.
pub struct MemoryActuator {
    buffer: Arc<Mutex<Buffer>>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    step_bytes: u64,
    nurse: Option<JoinHandle<()>>,
}

impl MemoryActuator {
    pub fn start(mem_step_mb: u64, touch_interval_sec: f64) -> MemoryActuator {
        let buffer = Arc::new(Mutex::new(Buffer { bytes: Vec::new() }));
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let nurse_buffer = Arc::clone(&buffer);
        let nurse_paused = Arc::clone(&paused);
        let nurse_stop = Arc::clone(&stop);
        let interval = Duration::from_secs_f64(touch_interval_sec.max(0.01));
        let nurse = thread::Builder::new()
            .name("mem-actuator-nurse".to_string())
            .spawn(move || nurse_loop(nurse_buffer, nurse_paused, nurse_stop, interval))
            .expect("failed to spawn memory actuator nurse thread");

        MemoryActuator {
            buffer,
            paused,
            stop,
            step_bytes: mem_step_mb.saturating_mul(1024 * 1024),
            nurse: Some(nurse),
        }
    }

    /// Moves the buffer's size at most one step toward `desired_bytes`.
    /// A no-op while paused — the invariant "the actuator never grows
    /// while paused" is enforced by the caller (the control loop) never
    /// calling this with a growing target while paused, but shrink
    /// requests (`desired_bytes` below current size) are always honored
    /// even while paused, since releasing memory under pressure is safe.
    pub fn set_target_bytes(&self, desired_bytes: u64) {
        let mut buffer = self.buffer.lock().unwrap();
        let current = buffer.bytes.len() as u64;

        if desired_bytes > current {
            if self.paused.load(Ordering::Relaxed) {
                return;
            }
            let grow_by = (desired_bytes - current).min(self.step_bytes) as usize;
            buffer.bytes.resize(buffer.bytes.len() + grow_by, 0);
        } else if desired_bytes < current {
            let shrink_by = (current - desired_bytes).min(self.step_bytes) as usize;
            let new_len = buffer.bytes.len() - shrink_by;
            buffer.bytes.truncate(new_len);
            buffer.bytes.shrink_to_fit();
        }
    }

    pub fn current_size_bytes(&self) -> u64 {
        self.buffer.lock().unwrap().bytes.len() as u64
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Stops the nurse thread and releases the buffer entirely.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.nurse.take() {
            let _ = handle.join();
        }
        let mut buffer = self.buffer.lock().unwrap();
        buffer.bytes.clear();
        buffer.bytes.shrink_to_fit();
    }
}

fn nurse_loop(buffer: Arc<Mutex<Buffer>>, paused: Arc<AtomicBool>, stop: Arc<AtomicBool>, interval: Duration) {
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(interval);
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if paused.load(Ordering::Relaxed) {
            continue;
        }
        let mut buffer = buffer.lock().unwrap();
        let len = buffer.bytes.len();
        let mut offset = 0;
        while offset < len {
            let b = buffer.bytes[offset];
            unsafe {
                std::ptr::write_volatile(&mut buffer.bytes[offset], b);
            }
            offset += PAGE_SIZE;
        }
    }
}
