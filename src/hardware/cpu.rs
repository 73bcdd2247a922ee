//! CPU identification: model string, physical core count, and logical CPU
//! count. The sampler's duty-cycle calculations only need the logical count
//! (one worker per logical CPU); model/physical counts are carried through
//! for the health snapshot and config validation.

use crate::error::SamplerError;
use std::collections::HashSet;
use std::fs;

fn parse_cpuinfo() -> (String, u32, u32) {
    match fs::read_to_string("/proc/cpuinfo") {
        Ok(content) => {
            let mut model = "Unknown".to_string();
            let mut core_ids = HashSet::new();
            let mut processor_count = 0;

            for line in content.lines() {
                if line.starts_with("model name") && model == "Unknown" {
                    if let Some(value) = line.split(": ").nth(1) {
                        model = value.to_string();
                    }
                }
                if line.starts_with("processor") {
                    processor_count += 1;
                }
                if line.starts_with("core id") {
                    if let Some(value) = line.split(": ").nth(1) {
                        if let Ok(core_id) = value.trim().parse::<u32>() {
                            core_ids.insert(core_id);
                        }
                    }
                }
            }

            let cores = if !core_ids.is_empty() {
                core_ids.len() as u32
            } else if processor_count > 0 {
                processor_count
            } else {
                1
            };

            let threads = if processor_count == 0 {
                1
            } else {
                processor_count
            };

            (model, cores, threads)
        }
        Err(_) => ("Unknown".to_string(), 1, 1),
    }
}

/// CPU model name read from `/proc/cpuinfo`. Falls back to "Unknown" rather
/// than erroring, since a model string is cosmetic (health snapshot only).
pub fn detect_cpu_model() -> Result<String, SamplerError> {
    let (model, _, _) = parse_cpuinfo();
    Ok(model)
}

/// Physical core count, derived from distinct `core id` values where the
/// kernel exposes them.
pub fn detect_cpu_cores() -> Result<u32, SamplerError> {
    let (_, cores, _) = parse_cpuinfo();
    Ok(cores)
}

/// Logical CPU count as seen by the scheduler. This is what the CPU duty
/// actuator uses to size its worker pool (one thread per logical CPU).
pub fn detect_logical_cpus() -> u32 {
    num_cpus::get() as u32
}
