//! Telemetry snapshot shapes consumed by the out-of-scope HTTP health/metrics
//! wrapper. These mirror the field shapes of the original's
//! `_handle_health`/`_handle_metrics` handlers so that whatever thin HTTP
//! layer eventually serializes them has a ready-made contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatus {
    pub degraded: bool,
    pub consecutive_write_failures: u32,
    pub sample_count_7d: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub uptime_sec: f64,
    pub status: String,
    pub checks: HashMap<String, bool>,
    pub storage: StorageStatus,
    pub paused: bool,
    pub controller_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMetrics {
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub net_pct: f64,
    pub load_per_core: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub cpu_p95_setpoint: f64,
    pub mem_target_pct: f64,
    pub net_target_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles7d {
    pub cpu_p95: Option<f64>,
    pub mem_p95: Option<f64>,
    pub net_p95: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub current: CurrentMetrics,
    pub target: TargetMetrics,
    pub percentiles_7d: Percentiles7d,
    pub exceedance_pct: f64,
    pub slots_recorded: u64,
    pub slots_skipped_safety: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_snapshot_serializes_to_json() {
        let snapshot = HealthSnapshot {
            uptime_sec: 12.5,
            status: "ok".to_string(),
            checks: HashMap::new(),
            storage: StorageStatus {
                degraded: false,
                consecutive_write_failures: 0,
                sample_count_7d: 100,
            },
            paused: false,
            controller_state: "MAINTAINING".to_string(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }

    #[test]
    fn test_metrics_snapshot_roundtrips() {
        let snapshot = MetricsSnapshot {
            current: CurrentMetrics {
                cpu_pct: 30.0,
                mem_pct: 10.0,
                net_pct: 5.0,
                load_per_core: 0.4,
            },
            target: TargetMetrics {
                cpu_p95_setpoint: 25.0,
                mem_target_pct: 0.0,
                net_target_pct: 0.0,
            },
            percentiles_7d: Percentiles7d {
                cpu_p95: Some(24.9),
                mem_p95: None,
                net_p95: None,
            },
            exceedance_pct: 6.5,
            slots_recorded: 1440,
            slots_skipped_safety: 3,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.slots_recorded, 1440);
        assert_eq!(parsed.percentiles_7d.cpu_p95, Some(24.9));
    }
}
