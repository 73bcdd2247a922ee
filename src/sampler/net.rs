//! NIC byte-counter sampling and utilization percentage.
//!
//! Two counter sources are supported, selected by whichever is readable:
//! a bind-mounted `/host_sys_class_net/<iface>/statistics/{tx,rx}_bytes`
//! (host-level counters, available when the operator mounts `/sys/class/net`
//! into the container) and the container-local `/proc/net/dev` (always
//! present, but only sees the container's own network namespace).

use std::fs;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NicBytes {
    pub tx: u64,
    pub rx: u64,
}

/// Read TX/RX byte counters for `iface`, preferring the host-mounted
/// statistics directory and falling back to `/proc/net/dev`. Returns `None`
/// if neither source has the interface — a missing NIC reading yields 0.0
/// utilization rather than an error, per the sampler's "never fatal" rule.
pub fn read_nic_bytes(iface: &str) -> Option<NicBytes> {
    read_host_nic_bytes(iface).or_else(|| read_container_nic_bytes(iface))
}

fn read_host_nic_bytes(iface: &str) -> Option<NicBytes> {
    let base = format!("/host_sys_class_net/{}/statistics", iface);
    let tx = fs::read_to_string(format!("{}/tx_bytes", base)).ok()?;
    let rx = fs::read_to_string(format!("{}/rx_bytes", base)).ok()?;
    Some(NicBytes {
        tx: tx.trim().parse().ok()?,
        rx: rx.trim().parse().ok()?,
    })
}

fn read_container_nic_bytes(iface: &str) -> Option<NicBytes> {
    let content = fs::read_to_string("/proc/net/dev").ok()?;
    parse_proc_net_dev(&content, iface)
}

fn parse_proc_net_dev(content: &str, iface: &str) -> Option<NicBytes> {
    for line in content.lines() {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != iface {
            continue;
        }
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.len() < 9 {
            return None;
        }
        let rx = parts[0].parse().ok()?;
        let tx = parts[8].parse().ok()?;
        return Some(NicBytes { tx, rx });
    }
    None
}

/// Reads the host-reported link speed in Mbit/s for `iface`, falling back
/// to `configured_default` (the `NET_LINK_MBIT` config value) when the
/// host-mount isn't present or reports a non-positive speed.
pub fn read_host_nic_speed_mbit(iface: &str, configured_default: f64) -> f64 {
    match fs::read_to_string(format!("/host_sys_class_net/{}/speed", iface)) {
        Ok(content) => match content.trim().parse::<f64>() {
            Ok(speed) if speed > 0.0 => speed,
            _ => configured_default,
        },
        Err(_) => configured_default,
    }
}

/// Percentage of link capacity consumed between two counter readings taken
/// `dt_sec` apart.
pub fn nic_utilization_pct(prev: NicBytes, cur: NicBytes, dt_sec: f64, link_mbit: f64) -> f64 {
    if dt_sec <= 0.0 || link_mbit <= 0.0 {
        return 0.0;
    }
    let dtx = cur.tx.saturating_sub(prev.tx) as f64;
    let drx = cur.rx.saturating_sub(prev.rx) as f64;
    let bits = (dtx + drx) * 8.0;
    let bps = bits / dt_sec;
    let cap_bps = link_mbit * 1_000_000.0;
    (100.0 * bps / cap_bps).max(0.0)
}
