//! Logging setup.
//!
//! loadshaper runs headless (no UI to stream log lines into, unlike a
//! desktop tool), so this is a thin wrapper around `env_logger` rather than
//! a custom `log::Log` implementation: install once at startup, then every
//! module just uses `log::{info,warn,error,debug}!` as normal.

use log::LevelFilter;

/// Install the global logger. `default_level` is used when `RUST_LOG` is
/// unset, so a plain `loadshaper` invocation still logs at a sane level
/// without requiring the operator to set an env var.
pub fn init(default_level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(default_level)
        .format_timestamp_millis();

    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    // Safe to ignore: happens only if a logger was already installed, which
    // means init() was called twice (e.g. in a test harness).
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_panic() {
        init(LevelFilter::Info);
    }
}
