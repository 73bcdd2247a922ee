//! loadshaper daemon entrypoint.
//!
//! Loads configuration, verifies the persistence directory is an
//! independent mount, starts every subsystem in A->B->C->D->(E,F,G)->H
//! order, and runs the control loop until SIGTERM/SIGINT.

use loadshaper::metrics::require_independent_mount;
use loadshaper::{Config, Daemon, HostInfo};
use log::LevelFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_stop_signal(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, handle_stop_signal as libc::sighandler_t);
        libc::signal(libc::SIGINT, handle_stop_signal as libc::sighandler_t);
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn main() {
    loadshaper::logging::init(LevelFilter::Info);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    for warning in config.reclamation_risk_warnings() {
        log::warn!("{}", warning);
    }

    if let Err(e) = require_independent_mount(&config.persistence_dir) {
        log::error!("persistence directory check failed: {}", e);
        std::process::exit(1);
    }

    let host = match HostInfo::detect() {
        Ok(host) => host,
        Err(e) => {
            log::error!("hardware detection failed: {}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "detected host: {} ({} cores, {} logical CPUs, {} MB RAM)",
        host.cpu_model,
        host.cpu_cores,
        host.logical_cpus,
        host.ram_total_bytes / (1024 * 1024)
    );

    install_signal_handlers();

    let daemon = match Daemon::start(config, host, now_secs()) {
        Ok(daemon) => daemon,
        Err(e) => {
            log::error!("failed to start daemon: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("loadshaper started");
    daemon.run(&STOP);
    log::info!("loadshaper stopped");
}
