//! loadshaper core
//!
//! A resource-shaping daemon for cloud VMs on "always-free" tiers: it keeps
//! the 7-day P95 of CPU utilization, and optionally memory/network
//! utilization, above the provider's reclamation threshold by generating
//! just enough synthetic load to stay safely above it, backing off whenever
//! real workload or operator-set safety limits are hit.
//!
//! The system is organized the way the core's component table describes it:
//! - **sampler**: reads host CPU/memory/NIC/loadavg counters each tick
//! - **ema**: exponentially-weighted moving averages for safety gating
//! - **metrics**: durable time-series store and percentile engine
//! - **controller**: the CPU P95 slot scheduler
//! - **actuators**: CPU duty, memory buffer, and network generator
//! - **config**: environment-variable driven configuration
//! - **error**: unified error type hierarchy
//! - **health**: telemetry snapshot shapes for an out-of-scope HTTP wrapper
//! - **shape**: VM shape classification consumed by the network actuator
//! - **daemon**: the main control loop tying every subsystem together

#![allow(dead_code)]

pub mod actuators;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod ema;
pub mod error;
pub mod hardware;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod sampler;
pub mod shape;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{LoadshaperError, Result};
pub use hardware::HostInfo;
