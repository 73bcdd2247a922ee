//! CPU utilization over a control period, computed from two reads of the
//! kernel's aggregate `/proc/stat` counters. Column layout and the
//! idle/iowait split are grounded line-for-line on the original sampler.

use crate::error::SamplerError;
use std::fs;

/// `(total, idle)` accumulator read from the first `cpu ` line of
/// `/proc/stat`. `idle` folds in iowait, matching the original's choice
/// that iowait time isn't "busy" time for this purpose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub total: f64,
    pub idle: f64,
}

pub fn read_proc_stat() -> Result<CpuTimes, SamplerError> {
    read_proc_stat_from_path("/proc/stat")
}

fn read_proc_stat_from_path(path: &str) -> Result<CpuTimes, SamplerError> {
    let content = fs::read_to_string(path).map_err(|source| SamplerError::Read {
        path: path.to_string(),
        source,
    })?;
    let line = content.lines().next().ok_or_else(|| SamplerError::Format {
        path: path.to_string(),
        reason: "empty file".to_string(),
    })?;
    if !line.starts_with("cpu ") {
        return Err(SamplerError::Format {
            path: path.to_string(),
            reason: "first line does not start with 'cpu '".to_string(),
        });
    }

    let vals: Vec<f64> = line
        .split_whitespace()
        .skip(1)
        .take(10)
        .map(|s| s.parse::<f64>().unwrap_or(0.0))
        .collect();
    if vals.len() < 8 {
        return Err(SamplerError::Format {
            path: path.to_string(),
            reason: "fewer than 8 numeric fields on cpu line".to_string(),
        });
    }

    let idle = vals[3] + vals[4];
    let nonidle = vals[0] + vals[1] + vals[2] + vals[5] + vals[6] + vals[7];
    Ok(CpuTimes {
        total: idle + nonidle,
        idle,
    })
}

/// Percentage of CPU time spent busy between two `CpuTimes` readings.
/// Returns 0.0 (never an error) when the interval is degenerate, since a
/// zero-width window carries no usable signal rather than being a fault.
pub fn cpu_percent_between(prev: CpuTimes, cur: CpuTimes) -> f64 {
    let total_delta = cur.total - prev.total;
    if total_delta <= 0.0 {
        return 0.0;
    }
    let idle_delta = cur.idle - prev.idle;
    (100.0 * (total_delta - idle_delta) / total_delta).max(0.0)
}
