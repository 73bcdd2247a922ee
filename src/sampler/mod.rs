//! Component A: reads CPU/memory/NIC/loadavg counters from the host each
//! control tick and converts them to the `Sample` tuple the rest of the
//! core consumes.

pub mod cpu;
pub mod load;
pub mod mem;
pub mod net;

use std::time::{SystemTime, UNIX_EPOCH};

/// One control-tick observation. Percentages are in `[0, 100]`;
/// `load_per_core` is the 1-minute load average divided by logical CPUs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sample {
    pub t: f64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub net_pct: f64,
    pub load_per_core: f64,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Sampler holds only what it needs across two successive reads: the
/// previous CPU-time and NIC-byte readings for delta computations, plus the
/// static facts (iface name, logical CPU count, configured link speed)
/// needed to interpret them.
pub struct Sampler {
    iface: String,
    logical_cpus: u32,
    configured_link_mbit: f64,
    prev_cpu: Option<cpu::CpuTimes>,
    prev_nic: Option<(net::NicBytes, f64)>,
}

impl Sampler {
    pub fn new(iface: impl Into<String>, logical_cpus: u32, configured_link_mbit: f64) -> Sampler {
        Sampler {
            iface: iface.into(),
            logical_cpus,
            configured_link_mbit,
            prev_cpu: None,
            prev_nic: None,
        }
    }

    /// Take one sample. Any individual counter that can't be read yields
    /// 0.0 for that field rather than failing the whole sample — per §4.A,
    /// a missing counter is logged once per event class and never fatal.
    /// The caller is expected to rate-limit the logging; this method itself
    /// is silent so it can be called every tick without flooding.
    pub fn sample(&mut self) -> Sample {
        let t = now_secs();

        let cpu_pct = match cpu::read_proc_stat() {
            Ok(cur) => {
                let pct = match self.prev_cpu {
                    Some(prev) => cpu::cpu_percent_between(prev, cur),
                    None => 0.0,
                };
                self.prev_cpu = Some(cur);
                pct
            }
            Err(_) => 0.0,
        };

        let mem_pct = mem::read_meminfo().map(|m| m.used_pct).unwrap_or(0.0);

        let net_pct = match net::read_nic_bytes(&self.iface) {
            Some(cur) => {
                let link_mbit = net::read_host_nic_speed_mbit(&self.iface, self.configured_link_mbit);
                let pct = match self.prev_nic {
                    Some((prev, prev_t)) => {
                        let dt = t - prev_t;
                        net::nic_utilization_pct(prev, cur, dt, link_mbit)
                    }
                    None => 0.0,
                };
                self.prev_nic = Some((cur, t));
                pct
            }
            None => 0.0,
        };

        let load_per_core = load::read_loadavg(self.logical_cpus).per_core;

        Sample {
            t,
            cpu_pct,
            mem_pct,
            net_pct,
            load_per_core,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_has_zero_deltas() {
        let mut sampler = Sampler::new("eth0", 4, 1000.0);
        let sample = sampler.sample();
        assert_eq!(sample.cpu_pct, 0.0);
        assert_eq!(sample.net_pct, 0.0);
        assert!(sample.t > 0.0);
    }

    #[test]
    fn test_successive_samples_are_monotonic_in_time() {
        let mut sampler = Sampler::new("eth0", 4, 1000.0);
        let s1 = sampler.sample();
        let s2 = sampler.sample();
        assert!(s2.t >= s1.t);
    }
}
