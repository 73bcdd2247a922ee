//! Small typed `validate_*` functions used by `Config::from_env()`. Each one
//! checks a single environment-variable value and returns a `ConfigError`
//! naming the offending key, its raw value, and the accepted range.

use crate::error::ConfigError;

/// Parse and validate a percentage (`0..=100`).
pub fn validate_percent(key: &str, raw: &str) -> Result<f64, ConfigError> {
    let value = parse_f64(key, raw)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: raw.to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        });
    }
    Ok(value)
}

/// Parse and validate a duration in seconds, bounded by `min..=max`.
pub fn validate_duration_sec(key: &str, raw: &str, min: f64, max: f64) -> Result<f64, ConfigError> {
    let value = parse_f64(key, raw)?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: raw.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(value)
}

/// Parse and validate a TCP/UDP port (`1024..=65535`, the unprivileged range).
pub fn validate_port(key: &str, raw: &str) -> Result<u16, ConfigError> {
    let value = parse_u64(key, raw)?;
    if !(1024..=65535).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: raw.to_string(),
            min: "1024".to_string(),
            max: "65535".to_string(),
        });
    }
    Ok(value as u16)
}

/// Parse and validate a packet payload size (`64..=65535`; UDP further
/// clamps this to 65507 at the actuator, since that's the UDP datagram
/// ceiling, not a config-time concern).
pub fn validate_packet_size(key: &str, raw: &str) -> Result<u32, ConfigError> {
    let value = parse_u64(key, raw)?;
    if !(64..=65535).contains(&value) {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: raw.to_string(),
            min: "64".to_string(),
            max: "65535".to_string(),
        });
    }
    Ok(value as u32)
}

/// Parse and validate a non-negative count/size field with an upper bound.
pub fn validate_count(key: &str, raw: &str, min: u64, max: u64) -> Result<u64, ConfigError> {
    let value = parse_u64(key, raw)?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: raw.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(value)
}

/// Parse and validate a transmission rate in Mbps (strictly positive).
pub fn validate_rate_mbps(key: &str, raw: &str) -> Result<f64, ConfigError> {
    let value = parse_f64(key, raw)?;
    if value < 0.0 {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: raw.to_string(),
            min: "0".to_string(),
            max: "unbounded".to_string(),
        });
    }
    Ok(value)
}

/// Parse a boolean from common truthy/falsy spellings (`1`, `true`, `yes`,
/// `on` vs `0`, `false`, `no`, `off`), case-insensitively.
pub fn validate_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected one of: 1/0, true/false, yes/no, on/off".to_string(),
        }),
    }
}

/// Slot-duration validation rejects zero and negative values outright.
pub fn validate_slot_duration(key: &str, raw: &str) -> Result<i64, ConfigError> {
    let value = parse_i64(key, raw)?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "slot duration must be a positive number of seconds".to_string(),
        });
    }
    Ok(value)
}

fn parse_f64(key: &str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim().parse::<f64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "expected a number".to_string(),
    })
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

fn parse_i64(key: &str, raw: &str) -> Result<i64, ConfigError> {
    raw.trim().parse::<i64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "expected an integer".to_string(),
    })
}
