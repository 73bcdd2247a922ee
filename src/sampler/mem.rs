//! Memory utilization from `/proc/meminfo`. Prefers the kernel's own
//! `MemAvailable` estimate when present (it already accounts for reclaimable
//! cache the way callers actually care about); falls back to the manual
//! buff/cache formula otherwise, grounded on the original's `read_meminfo`.

use crate::error::SamplerError;
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_pct: f64,
    pub used_bytes: u64,
}

pub fn read_meminfo() -> Result<MemInfo, SamplerError> {
    read_meminfo_from_str(&fs::read_to_string("/proc/meminfo").map_err(|source| {
        SamplerError::Read {
            path: "/proc/meminfo".to_string(),
            source,
        }
    })?)
}

fn parse_kb_fields(content: &str) -> HashMap<String, u64> {
    let mut fields = HashMap::new();
    for line in content.lines() {
        if let Some((key, rest)) = line.split_once(':') {
            let value_str = rest.split_whitespace().next().unwrap_or("0");
            let value: u64 = value_str.parse().unwrap_or(0);
            fields.insert(key.trim().to_string(), value);
        }
    }
    fields
}

fn read_meminfo_from_str(content: &str) -> Result<MemInfo, SamplerError> {
    let m = parse_kb_fields(content);
    let total = *m.get("MemTotal").unwrap_or(&0);
    let free = *m.get("MemFree").unwrap_or(&0);

    if total == 0 {
        return Ok(MemInfo {
            total_bytes: 0,
            free_bytes: 0,
            used_pct: 0.0,
            used_bytes: 0,
        });
    }

    let used_kb = if let Some(&available) = m.get("MemAvailable") {
        total.saturating_sub(available)
    } else {
        let buffers = *m.get("Buffers").unwrap_or(&0);
        let cached = *m.get("Cached").unwrap_or(&0);
        let srecl = *m.get("SReclaimable").unwrap_or(&0);
        let shmem = *m.get("Shmem").unwrap_or(&0);
        let buff_cache = buffers + (cached + srecl).saturating_sub(shmem);
        total.saturating_sub(free).saturating_sub(buff_cache)
    };

    let used_pct = 100.0 * used_kb as f64 / total as f64;

    Ok(MemInfo {
        total_bytes: total * 1024,
        free_bytes: free * 1024,
        used_pct,
        used_bytes: used_kb * 1024,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_mem_available_when_present() {
        let content = "MemTotal:       10000 kB\nMemFree:         2000 kB\nMemAvailable:    4000 kB\nBuffers:          100 kB\nCached:          500 kB\nSReclaimable:    100 kB\nShmem:            50 kB\n";
        let info = read_meminfo_from_str(content).unwrap();
        // used = total - available = 6000 kB
        assert_eq!(info.used_bytes, 6000 * 1024);
        assert!((info.used_pct - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_falls_back_to_manual_formula_without_mem_available() {
        let content = "MemTotal:       10000 kB\nMemFree:         2000 kB\nBuffers:          100 kB\nCached:          500 kB\nSReclaimable:    100 kB\nShmem:            50 kB\n";
        let info = read_meminfo_from_str(content).unwrap();
        // buff_cache = 100 + max(0, 500+100-50) = 650
        // used = 10000 - 2000 - 650 = 7350
        assert_eq!(info.used_bytes, 7350 * 1024);
    }

    #[test]
    fn test_zero_total_is_graceful() {
        let info = read_meminfo_from_str("SomeField: 100 kB\n").unwrap();
        assert_eq!(info.used_pct, 0.0);
        assert_eq!(info.total_bytes, 0);
    }

    #[test]
    fn test_shmem_larger_than_cached_does_not_underflow() {
        let content = "MemTotal:       10000 kB\nMemFree:         2000 kB\nBuffers:          0 kB\nCached:          10 kB\nSReclaimable:    0 kB\nShmem:            500 kB\n";
        let info = read_meminfo_from_str(content).unwrap();
        // buff_cache = 0 + max(0, 10 - 500) = 0 (saturating)
        assert_eq!(info.used_bytes, 8000 * 1024);
    }
}
