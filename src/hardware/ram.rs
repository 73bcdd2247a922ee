//! Total installed RAM detection, used for config clamping and the memory
//! actuator's byte-budget calculations. Per-sample memory *utilization* is
//! computed by the sampler, not here — this module only reports the static
//! total.

use crate::error::SamplerError;
use std::fs;

/// Total installed RAM in bytes, read from `MemTotal` in `/proc/meminfo`
/// (reported there in kB). Returns `Ok(0)` if the field is missing or
/// unparseable rather than erroring, since callers treat 0 as "unknown."
pub fn detect_ram_total_bytes() -> Result<u64, SamplerError> {
    match fs::read_to_string("/proc/meminfo") {
        Ok(content) => {
            for line in content.lines() {
                if line.starts_with("MemTotal") {
                    if let Some(value_str) = line.split_whitespace().nth(1) {
                        if let Ok(ram_kb) = value_str.parse::<u64>() {
                            return Ok(ram_kb * 1024);
                        }
                    }
                }
            }
            Ok(0)
        }
        Err(_) => Ok(0),
    }
}

/// Convenience wrapper for callers that only care about gigabytes (health
/// snapshot display, config sanity checks).
pub fn detect_ram_total_gb() -> Result<u32, SamplerError> {
    let bytes = detect_ram_total_bytes()?;
    Ok((bytes / (1024 * 1024 * 1024)) as u32)
}
