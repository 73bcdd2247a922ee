//! Static host detection: CPU identity and installed RAM.
//!
//! This is intentionally small — loadshaper only needs enough hardware
//! identity to size its actuators (logical CPU count) and sanity-check
//! configuration (total RAM for memory-target clamping). Everything
//! dynamic (current utilization) lives in `crate::sampler`.

pub mod cpu;
pub mod ram;

pub use cpu::{detect_cpu_cores, detect_cpu_model, detect_logical_cpus};
pub use ram::{detect_ram_total_bytes, detect_ram_total_gb};

use crate::error::SamplerError;

/// Static facts about the host, detected once at startup and held for the
/// lifetime of the daemon (none of these values change while running).
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub cpu_model: String,
    pub cpu_cores: u32,
    pub logical_cpus: u32,
    pub ram_total_bytes: u64,
}

impl HostInfo {
    /// Detect all static host facts, falling back to conservative defaults
    /// (1 core, 0 bytes RAM) on any individual detection failure so that
    /// startup never aborts over a missing `/proc` field.
    pub fn detect() -> Result<HostInfo, SamplerError> {
        Ok(HostInfo {
            cpu_model: detect_cpu_model().unwrap_or_else(|_| "Unknown".to_string()),
            cpu_cores: detect_cpu_cores().unwrap_or(1),
            logical_cpus: detect_logical_cpus(),
            ram_total_bytes: detect_ram_total_bytes().unwrap_or(0),
        })
    }
}
