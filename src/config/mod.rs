//! Configuration module.
//!
//! `Config` is built once at startup by [`Config::from_env`], which reads
//! every environment variable the core honors, falling back to a shape
//! template (`config-templates/<shape>.env`) and then to a built-in default,
//! in that precedence order (env > template > default). Every field is
//! validated on the way in through `validator`'s small typed functions; the
//! first invalid key aborts startup with a `ConfigError` naming the key and
//! the accepted range.

pub mod template;
pub mod validator;

use crate::error::ConfigError;
use crate::shape::ShapeClass;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fully resolved, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // CPU P95 slot controller
    pub cpu_p95_setpoint: f64,
    pub cpu_p95_target_min: f64,
    pub cpu_p95_target_max: f64,
    pub cpu_p95_baseline_intensity: f64,
    pub cpu_p95_high_intensity: f64,
    pub cpu_p95_exceedance_target: f64,
    pub cpu_p95_slot_duration_sec: i64,
    pub cpu_p95_ring_buffer_batch_size: u64,

    // Resource targets and stop thresholds
    pub mem_target_pct: f64,
    pub net_target_pct: f64,
    pub cpu_stop_pct: f64,
    pub mem_stop_pct: f64,
    pub net_stop_pct: f64,
    pub hysteresis_pct: f64,
    pub jitter_pct: f64,

    // Durations
    pub control_period_sec: f64,
    pub avg_window_sec: f64,
    pub jitter_period_sec: f64,
    pub net_burst_sec: f64,
    pub net_idle_sec: f64,

    // Counts/sizes
    pub mem_min_free_mb: u64,
    pub mem_step_mb: u64,
    pub net_port: u16,
    pub net_packet_size: u32,

    // Booleans
    pub load_check_enabled: bool,

    // Rates (Mbps)
    pub net_min_rate_mbit: f64,
    pub net_max_rate_mbit: f64,
    pub net_link_mbit: f64,

    // Not in the env-var subset table but required to locate on-disk state.
    pub persistence_dir: PathBuf,

    // Shape classification, supplied by the (out-of-scope) detection
    // collaborator; defaults to Unknown when absent.
    pub shape_class: ShapeClass,

    // --- Safety gating ---
    pub load_threshold: f64,
    pub load_resume_threshold: f64,

    // --- CPU P95 proportional safety scaling ---
    pub cpu_p95_load_scale_start: f64,
    pub cpu_p95_load_scale_full: f64,
    pub cpu_p95_load_scale_min: f64,

    // --- Actuator proportional gains ---
    pub k_cpu: f64,
    pub k_net: f64,
    pub max_duty: f64,

    // --- Memory actuator ---
    pub mem_touch_interval_sec: f64,

    // --- Network actuator ---
    pub net_peers: Vec<String>,
    pub net_require_external: bool,
    pub net_peer_validation_timeout_sec: f64,
    pub net_ttl: u32,
    pub net_reputation_success_step: i32,
    pub net_reputation_failure_step: i32,
    pub net_reputation_blacklist_threshold: f64,
    pub net_blacklist_cooldown_sec: f64,
    pub net_debounce_sec: f64,
    pub net_min_on_sec: f64,
    pub net_min_off_sec: f64,
    pub net_peer_recovery_interval_sec: f64,
    pub net_rate_ramp_sec: f64,
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// `overrides` (typically a parsed shape template) and then to
    /// defaults. `std::env::var` is consulted directly so this is the one
    /// function that touches process environment; everything downstream
    /// works with the resolved `Config`.
    pub fn from_env() -> Result<Config, ConfigError> {
        let overrides = Self::load_shape_template_overrides();
        Self::from_env_with_overrides(&overrides)
    }

    /// Testable entry point: resolve config given an explicit override map
    /// instead of reading `config-templates/` from disk.
    pub fn from_env_with_overrides(overrides: &HashMap<String, String>) -> Result<Config, ConfigError> {
        let lookup = |key: &str, default: &str| -> String {
            std::env::var(key)
                .ok()
                .or_else(|| overrides.get(key).cloned())
                .unwrap_or_else(|| default.to_string())
        };

        use validator::*;

        let cpu_p95_setpoint = validate_percent("CPU_P95_SETPOINT", &lookup("CPU_P95_SETPOINT", "25"))?;
        let cpu_p95_target_min =
            validate_percent("CPU_P95_TARGET_MIN", &lookup("CPU_P95_TARGET_MIN", "22"))?;
        let cpu_p95_target_max =
            validate_percent("CPU_P95_TARGET_MAX", &lookup("CPU_P95_TARGET_MAX", "28"))?;
        let cpu_p95_baseline_intensity = validate_percent(
            "CPU_P95_BASELINE_INTENSITY",
            &lookup("CPU_P95_BASELINE_INTENSITY", "20"),
        )?;
        let cpu_p95_high_intensity = validate_percent(
            "CPU_P95_HIGH_INTENSITY",
            &lookup("CPU_P95_HIGH_INTENSITY", "35"),
        )?;
        let cpu_p95_exceedance_target = validate_percent(
            "CPU_P95_EXCEEDANCE_TARGET",
            &lookup("CPU_P95_EXCEEDANCE_TARGET", "6.5"),
        )?;
        let cpu_p95_slot_duration_sec = validate_slot_duration(
            "CPU_P95_SLOT_DURATION",
            &lookup("CPU_P95_SLOT_DURATION", "60"),
        )?;
        let cpu_p95_ring_buffer_batch_size = validate_count(
            "CPU_P95_RING_BUFFER_BATCH_SIZE",
            &lookup("CPU_P95_RING_BUFFER_BATCH_SIZE", "10"),
            1,
            10_000,
        )?;

        let mem_target_pct = validate_percent("MEM_TARGET_PCT", &lookup("MEM_TARGET_PCT", "0"))?;
        let net_target_pct = validate_percent("NET_TARGET_PCT", &lookup("NET_TARGET_PCT", "0"))?;
        let cpu_stop_pct = validate_percent("CPU_STOP_PCT", &lookup("CPU_STOP_PCT", "85"))?;
        let mem_stop_pct = validate_percent("MEM_STOP_PCT", &lookup("MEM_STOP_PCT", "90"))?;
        let net_stop_pct = validate_percent("NET_STOP_PCT", &lookup("NET_STOP_PCT", "90"))?;
        let hysteresis_pct = validate_percent("HYSTERESIS_PCT", &lookup("HYSTERESIS_PCT", "5"))?;
        let jitter_pct = validate_percent("JITTER_PCT", &lookup("JITTER_PCT", "10"))?;

        let control_period_sec = validate_duration_sec(
            "CONTROL_PERIOD_SEC",
            &lookup("CONTROL_PERIOD_SEC", "5"),
            0.1,
            300.0,
        )?;
        let avg_window_sec =
            validate_duration_sec("AVG_WINDOW_SEC", &lookup("AVG_WINDOW_SEC", "30"), 1.0, 3600.0)?;
        let jitter_period_sec = validate_duration_sec(
            "JITTER_PERIOD_SEC",
            &lookup("JITTER_PERIOD_SEC", "300"),
            1.0,
            3600.0,
        )?;
        let net_burst_sec =
            validate_duration_sec("NET_BURST_SEC", &lookup("NET_BURST_SEC", "30"), 0.0, 3600.0)?;
        let net_idle_sec =
            validate_duration_sec("NET_IDLE_SEC", &lookup("NET_IDLE_SEC", "10"), 0.0, 3600.0)?;

        let mem_min_free_mb =
            validate_count("MEM_MIN_FREE_MB", &lookup("MEM_MIN_FREE_MB", "512"), 0, 1_000_000)?;
        let mem_step_mb = validate_count("MEM_STEP_MB", &lookup("MEM_STEP_MB", "64"), 1, 65_536)?;
        let net_port = validate_port("NET_PORT", &lookup("NET_PORT", "15201"))?;
        let net_packet_size =
            validate_packet_size("NET_PACKET_SIZE", &lookup("NET_PACKET_SIZE", "1100"))?;

        let load_check_enabled =
            validate_bool("LOAD_CHECK_ENABLED", &lookup("LOAD_CHECK_ENABLED", "true"))?;

        let net_min_rate_mbit =
            validate_rate_mbps("NET_MIN_RATE_MBIT", &lookup("NET_MIN_RATE_MBIT", "1"))?;
        let net_max_rate_mbit =
            validate_rate_mbps("NET_MAX_RATE_MBIT", &lookup("NET_MAX_RATE_MBIT", "100"))?;
        let net_link_mbit =
            validate_rate_mbps("NET_LINK_MBIT", &lookup("NET_LINK_MBIT", "1000"))?;

        if cpu_p95_target_min >= cpu_p95_target_max {
            return Err(ConfigError::InvalidValue {
                key: "CPU_P95_TARGET_MIN/MAX".to_string(),
                value: format!("{}/{}", cpu_p95_target_min, cpu_p95_target_max),
                reason: "CPU_P95_TARGET_MIN must be strictly less than CPU_P95_TARGET_MAX"
                    .to_string(),
            });
        }
        if net_min_rate_mbit > net_max_rate_mbit {
            return Err(ConfigError::InvalidValue {
                key: "NET_MIN_RATE_MBIT/NET_MAX_RATE_MBIT".to_string(),
                value: format!("{}/{}", net_min_rate_mbit, net_max_rate_mbit),
                reason: "NET_MIN_RATE_MBIT must not exceed NET_MAX_RATE_MBIT".to_string(),
            });
        }

        let persistence_dir = PathBuf::from(lookup(
            "LOADSHAPER_PERSISTENCE_DIR",
            "/var/lib/loadshaper",
        ));

        let shape_class = match std::env::var("LOADSHAPER_SHAPE_CLASS").ok() {
            Some(raw) => ShapeClass::from_str_lenient(&raw),
            None => ShapeClass::Unknown,
        };

        // --- Safety gating ---
        let load_threshold =
            validate_rate_mbps("LOAD_THRESHOLD", &lookup("LOAD_THRESHOLD", "0.6"))?;
        let load_resume_threshold = validate_rate_mbps(
            "LOAD_RESUME_THRESHOLD",
            &lookup("LOAD_RESUME_THRESHOLD", "0.4"),
        )?;

        // --- CPU P95 proportional safety scaling ---
        let cpu_p95_load_scale_start = validate_rate_mbps(
            "CPU_P95_LOAD_SCALE_START",
            &lookup("CPU_P95_LOAD_SCALE_START", "0.5"),
        )?;
        let cpu_p95_load_scale_full = validate_rate_mbps(
            "CPU_P95_LOAD_SCALE_FULL",
            &lookup("CPU_P95_LOAD_SCALE_FULL", "0.8"),
        )?;
        let cpu_p95_load_scale_min = validate_rate_mbps(
            "CPU_P95_LOAD_SCALE_MIN",
            &lookup("CPU_P95_LOAD_SCALE_MIN", "0.7"),
        )?;

        // --- Actuator proportional gains ---
        let k_cpu = validate_rate_mbps("K_CPU", &lookup("K_CPU", "0.30"))?;
        let k_net = validate_rate_mbps("K_NET", &lookup("K_NET", "0.60"))?;
        let max_duty = validate_percent("MAX_DUTY_PCT", &lookup("MAX_DUTY_PCT", "95"))? / 100.0;

        // --- Memory actuator ---
        let mem_touch_interval_sec = validate_duration_sec(
            "MEM_TOUCH_INTERVAL_SEC",
            &lookup("MEM_TOUCH_INTERVAL_SEC", "1"),
            0.01,
            3600.0,
        )?;

        // --- Network actuator ---
        let net_peers_raw = lookup("NET_PEERS", "");
        let net_peers: Vec<String> = net_peers_raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let net_require_external = validate_bool(
            "NET_REQUIRE_EXTERNAL",
            &lookup("NET_REQUIRE_EXTERNAL", "false"),
        )?;
        let net_peer_validation_timeout_sec = validate_duration_sec(
            "NET_PEER_VALIDATION_TIMEOUT_SEC",
            &lookup("NET_PEER_VALIDATION_TIMEOUT_SEC", "5"),
            0.1,
            60.0,
        )?;
        let net_ttl = validate_count("NET_TTL", &lookup("NET_TTL", "1"), 1, 255)? as u32;
        let net_reputation_success_step = validate_count(
            "NET_REPUTATION_SUCCESS_STEP",
            &lookup("NET_REPUTATION_SUCCESS_STEP", "5"),
            1,
            100,
        )? as i32;
        let net_reputation_failure_step = validate_count(
            "NET_REPUTATION_FAILURE_STEP",
            &lookup("NET_REPUTATION_FAILURE_STEP", "10"),
            1,
            100,
        )? as i32;
        let net_reputation_blacklist_threshold = validate_percent(
            "NET_REPUTATION_BLACKLIST_THRESHOLD",
            &lookup("NET_REPUTATION_BLACKLIST_THRESHOLD", "20"),
        )?;
        let net_blacklist_cooldown_sec = validate_duration_sec(
            "NET_BLACKLIST_COOLDOWN_SEC",
            &lookup("NET_BLACKLIST_COOLDOWN_SEC", "300"),
            1.0,
            86_400.0,
        )?;
        let net_debounce_sec = validate_duration_sec(
            "NET_DEBOUNCE_SEC",
            &lookup("NET_DEBOUNCE_SEC", "10"),
            0.0,
            3600.0,
        )?;
        let net_min_on_sec = validate_duration_sec(
            "NET_MIN_ON_SEC",
            &lookup("NET_MIN_ON_SEC", "30"),
            0.0,
            3600.0,
        )?;
        let net_min_off_sec = validate_duration_sec(
            "NET_MIN_OFF_SEC",
            &lookup("NET_MIN_OFF_SEC", "30"),
            0.0,
            3600.0,
        )?;
        let net_peer_recovery_interval_sec = validate_duration_sec(
            "NET_PEER_RECOVERY_INTERVAL_SEC",
            &lookup("NET_PEER_RECOVERY_INTERVAL_SEC", "60"),
            1.0,
            3600.0,
        )?;
        let net_rate_ramp_sec = validate_duration_sec(
            "NET_RATE_RAMP_SEC",
            &lookup("NET_RATE_RAMP_SEC", "30"),
            0.0,
            3600.0,
        )?;

        Ok(Config {
            cpu_p95_setpoint,
            cpu_p95_target_min,
            cpu_p95_target_max,
            cpu_p95_baseline_intensity,
            cpu_p95_high_intensity,
            cpu_p95_exceedance_target,
            cpu_p95_slot_duration_sec,
            cpu_p95_ring_buffer_batch_size,
            mem_target_pct,
            net_target_pct,
            cpu_stop_pct,
            mem_stop_pct,
            net_stop_pct,
            hysteresis_pct,
            jitter_pct,
            control_period_sec,
            avg_window_sec,
            jitter_period_sec,
            net_burst_sec,
            net_idle_sec,
            mem_min_free_mb,
            mem_step_mb,
            net_port,
            net_packet_size,
            load_check_enabled,
            net_min_rate_mbit,
            net_max_rate_mbit,
            net_link_mbit,
            persistence_dir,
            shape_class,
            load_threshold,
            load_resume_threshold,
            cpu_p95_load_scale_start,
            cpu_p95_load_scale_full,
            cpu_p95_load_scale_min,
            k_cpu,
            k_net,
            max_duty,
            mem_touch_interval_sec,
            net_peers,
            net_require_external,
            net_peer_validation_timeout_sec,
            net_ttl,
            net_reputation_success_step,
            net_reputation_failure_step,
            net_reputation_blacklist_threshold,
            net_blacklist_cooldown_sec,
            net_debounce_sec,
            net_min_on_sec,
            net_min_off_sec,
            net_peer_recovery_interval_sec,
            net_rate_ramp_sec,
        })
    }

    fn load_shape_template_overrides() -> HashMap<String, String> {
        let template_dir = std::env::var("LOADSHAPER_TEMPLATE_DIR")
            .unwrap_or_else(|_| "config-templates".to_string());
        let shape = std::env::var("LOADSHAPER_SHAPE_CLASS").unwrap_or_default();
        if shape.is_empty() {
            return HashMap::new();
        }
        let path = Path::new(&template_dir).join(format!("{}.env", shape.to_ascii_lowercase()));
        match template::parse_template_file(&path) {
            Ok(values) => values,
            Err(_) => HashMap::new(),
        }
    }

    /// Mirrors the original's `validate_oracle_configuration`: non-fatal
    /// startup warnings for configurations that are risky on specific shape
    /// classes (reclamation-threshold targets set below 20% where the
    /// provider's reclamation rule would actually fire).
    pub fn reclamation_risk_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        const RECLAMATION_THRESHOLD: f64 = 20.0;

        if self.cpu_p95_setpoint < RECLAMATION_THRESHOLD {
            warnings.push(format!(
                "CPU_P95_SETPOINT={} is below the {}% reclamation threshold; the instance may still be reclaimed",
                self.cpu_p95_setpoint, RECLAMATION_THRESHOLD
            ));
        }

        match self.shape_class {
            ShapeClass::DedicatedArm => {
                if self.mem_target_pct < RECLAMATION_THRESHOLD {
                    warnings.push(format!(
                        "MEM_TARGET_PCT={} is below {}% on a dedicated-ARM shape, which checks all three metrics",
                        self.mem_target_pct, RECLAMATION_THRESHOLD
                    ));
                }
                if self.net_target_pct < RECLAMATION_THRESHOLD {
                    warnings.push(format!(
                        "NET_TARGET_PCT={} is below {}% on a dedicated-ARM shape, which checks all three metrics",
                        self.net_target_pct, RECLAMATION_THRESHOLD
                    ));
                }
            }
            ShapeClass::SharedTenancy => {
                if self.net_target_pct < RECLAMATION_THRESHOLD && self.cpu_p95_setpoint < RECLAMATION_THRESHOLD {
                    warnings.push(
                        "both NET_TARGET_PCT and CPU_P95_SETPOINT are below the reclamation threshold on a shared-tenancy shape".to_string(),
                    );
                }
            }
            ShapeClass::Unknown => {}
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_with_overrides_uses_defaults() {
        let config = Config::from_env_with_overrides(&HashMap::new()).unwrap();
        assert_eq!(config.cpu_p95_setpoint, 25.0);
        assert_eq!(config.net_port, 15201);
    }

    #[test]
    fn test_from_env_with_overrides_honors_override_map() {
        let mut overrides = HashMap::new();
        overrides.insert("CPU_P95_SETPOINT".to_string(), "30".to_string());
        let config = Config::from_env_with_overrides(&overrides).unwrap();
        assert_eq!(config.cpu_p95_setpoint, 30.0);
    }

    #[test]
    fn test_from_env_rejects_inverted_target_band() {
        let mut overrides = HashMap::new();
        overrides.insert("CPU_P95_TARGET_MIN".to_string(), "28".to_string());
        overrides.insert("CPU_P95_TARGET_MAX".to_string(), "22".to_string());
        assert!(Config::from_env_with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_from_env_rejects_invalid_percent() {
        let mut overrides = HashMap::new();
        overrides.insert("MEM_TARGET_PCT".to_string(), "150".to_string());
        assert!(Config::from_env_with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_reclamation_risk_warnings_flags_low_setpoint() {
        let mut overrides = HashMap::new();
        overrides.insert("CPU_P95_SETPOINT".to_string(), "10".to_string());
        let config = Config::from_env_with_overrides(&overrides).unwrap();
        assert!(!config.reclamation_risk_warnings().is_empty());
    }

    #[test]
    fn test_reclamation_risk_warnings_empty_for_safe_config() {
        let config = Config::from_env_with_overrides(&HashMap::new()).unwrap();
        // Default config: setpoint 25 (safe), shape Unknown (no mem/net check).
        assert!(config.reclamation_risk_warnings().is_empty());
    }
}
