//! Unified error type hierarchy for loadshaper.
//!
//! Each subsystem gets its own `thiserror`-derived enum; `LoadshaperError`
//! aggregates them for callers (chiefly `main.rs`) that don't care which
//! subsystem failed.

use std::io;
use thiserror::Error;

/// Errors reading host counters (CPU, memory, NIC, load average).
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected format in {path}: {reason}")]
    Format { path: String, reason: String },
}

/// Errors from the metrics store.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("I/O error on metrics store: {0}")]
    Io(#[from] io::Error),

    #[error("metrics store is corrupt: {0}")]
    Corrupt(String),

    #[error("persistence directory is not usable: {0}")]
    BadStoreDir(String),

    #[error("persistence directory {0} is not an independent mount point")]
    NotAMountPoint(String),
}

/// Errors from the CPU P95 slot controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("failed to persist ring-buffer snapshot: {0}")]
    SnapshotWrite(#[from] io::Error),

    #[error("failed to parse ring-buffer snapshot: {0}")]
    SnapshotParse(#[from] serde_json::Error),

    #[error("invalid slot duration: {0} (must be positive)")]
    InvalidSlotDuration(i64),
}

/// Errors from actuators (CPU duty, memory, network).
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("OS call failed: {0}")]
    OsCall(String),

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),
}

/// Configuration parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("value for {key} out of range: {value} (accepted range: {min}..={max})")]
    OutOfRange {
        key: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("failed to read config template {path}: {source}")]
    TemplateIo {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Crate-wide aggregate error type.
#[derive(Error, Debug)]
pub enum LoadshaperError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = LoadshaperError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::OutOfRange {
            key: "MEM_TARGET_PCT".to_string(),
            value: "150".to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "value for MEM_TARGET_PCT out of range: 150 (accepted range: 0..=100)"
        );
    }

    #[test]
    fn test_metrics_error_corrupt_display() {
        let err = MetricsError::Corrupt("truncated record at offset 48".to_string());
        assert_eq!(
            err.to_string(),
            "metrics store is corrupt: truncated record at offset 48"
        );
    }

    #[test]
    fn test_aggregate_from_config() {
        let err: LoadshaperError = ConfigError::Missing("NET_PORT".to_string()).into();
        assert!(matches!(err, LoadshaperError::Config(_)));
    }
}
