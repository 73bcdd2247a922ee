//! Kernel load average, normalized per logical CPU.

use std::fs;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAvg {
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
    pub per_core: f64,
}

/// Reads `/proc/loadavg` and divides the 1-minute average by `logical_cpus`.
/// Any parse failure yields all-zero, matching the original sampler's
/// "never fatal" contract for counter reads.
pub fn read_loadavg(logical_cpus: u32) -> LoadAvg {
    match fs::read_to_string("/proc/loadavg") {
        Ok(content) => parse_loadavg(&content, logical_cpus),
        Err(_) => LoadAvg {
            load_1min: 0.0,
            load_5min: 0.0,
            load_15min: 0.0,
            per_core: 0.0,
        },
    }
}

fn parse_loadavg(content: &str, logical_cpus: u32) -> LoadAvg {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return LoadAvg {
            load_1min: 0.0,
            load_5min: 0.0,
            load_15min: 0.0,
            per_core: 0.0,
        };
    }
    let load_1min = parts[0].parse::<f64>().unwrap_or(0.0);
    let load_5min = parts[1].parse::<f64>().unwrap_or(0.0);
    let load_15min = parts[2].parse::<f64>().unwrap_or(0.0);
    let cpu_count = logical_cpus.max(1) as f64;
    LoadAvg {
        load_1min,
        load_5min,
        load_15min,
        per_core: load_1min / cpu_count,
    }
}
