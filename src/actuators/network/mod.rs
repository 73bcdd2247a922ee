//! Token-bucket-paced UDP/TCP packet generator with a validate-then-transmit
//! state machine.
//!
//! A deliberate redesign relative to `original_source/loadshaper.py`'s
//! `net_client_thread` (an `iperf3` subprocess client): this is a native
//! in-process generator instead. Socket work uses plain blocking `std::net`
//! (`UdpSocket`/`TcpStream` with `set_write_timeout`/`set_read_timeout`) and
//! raw `libc`/`nix` calls rather than an async runtime.

pub mod address;
pub mod peer;
pub mod state;
pub mod token_bucket;

use crate::shape::ShapeClass;
use peer::PeerTable;
use state::NetworkState;
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use token_bucket::TokenBucket;

const MIN_UDP_PACKET: u32 = 64;
const MAX_UDP_PACKET: u32 = 65_507;
const MIN_TCP_PACKET: u32 = 64;
const MAX_TCP_PACKET: u32 = 65_535;
/// 203.0.113.0/24 (TEST-NET-3) — used as the degraded-local send target so
/// no real host is bothered while the generator is in `DEGRADED_LOCAL`.
const DEGRADED_LOCAL_TARGET: &str = "203.0.113.1";

pub fn clamp_packet_size(size: u32, is_udp: bool) -> u32 {
    let (min, max) = if is_udp {
        (MIN_UDP_PACKET, MAX_UDP_PACKET)
    } else {
        (MIN_TCP_PACKET, MAX_TCP_PACKET)
    };
    size.clamp(min, max)
}

/// Packet payload: first 8 bytes a timestamp, the rest a benign repeating
/// pattern (spec §4.G).
pub fn build_packet(size: usize, now: f64) -> Vec<u8> {
    let mut buf = vec![0u8; size.max(8)];
    buf[0..8].copy_from_slice(&now.to_ne_bytes());
    for (i, byte) in buf.iter_mut().enumerate().skip(8) {
        *byte = (i % 256) as u8;
    }
    buf
}

/// Next token-bucket rate per spec §4.G's proportional rule:
/// `rate <- clamp(rate + k_net*(target - net_ema), min, max)`.
pub fn next_rate(current: f64, k_net: f64, target_pct: f64, net_ema: f64, min: f64, max: f64) -> f64 {
    (current + k_net * (target_pct - net_ema)).clamp(min, max)
}

/// Smart activation (spec §4.G): whether G should be active given the
/// detected shape class and which metrics are "at risk" (below the
/// provider's 20% reclamation threshold).
pub fn smart_activation_needed(
    shape: ShapeClass,
    cpu_p95_at_risk: bool,
    mem_avg_at_risk: bool,
    net_avg_at_risk: bool,
) -> bool {
    match shape {
        ShapeClass::SharedTenancy => cpu_p95_at_risk && net_avg_at_risk,
        ShapeClass::DedicatedArm => cpu_p95_at_risk && mem_avg_at_risk && net_avg_at_risk,
        ShapeClass::Unknown => cpu_p95_at_risk || mem_avg_at_risk || net_avg_at_risk,
    }
}

/// External-egress verification (spec §9 Open Question, resolved as
/// bytes/s): the generator's view of its own egress is "verified" once the
/// moving average of attributable TX bytes/s rises above zero.
pub fn egress_verified(tx_bytes_per_sec_ema: f64) -> bool {
    tx_bytes_per_sec_ema > 0.0
}

struct SharedState {
    state: NetworkState,
    state_since: f64,
    first_transition_done: bool,
}

pub struct NetworkActuator {
    shared: Arc<Mutex<SharedState>>,
    peers: Arc<Mutex<PeerTable>>,
    bucket: Arc<Mutex<TokenBucket>>,
    tx_ema: Arc<Mutex<crate::ema::Ema>>,
    stop: Arc<AtomicBool>,
    send_thread: Option<JoinHandle<()>>,

    port: u16,
    packet_size: u32,
    ttl: u32,
    require_external: bool,
    validation_timeout_sec: f64,
    debounce_sec: f64,
    min_on_sec: f64,
    min_off_sec: f64,
    peer_recovery_interval_sec: f64,
}

#[allow(clippy::too_many_arguments)]
impl NetworkActuator {
    pub fn start(
        peer_addrs: Vec<String>,
        port: u16,
        packet_size: u32,
        ttl: u32,
        require_external: bool,
        validation_timeout_sec: f64,
        success_step: i32,
        failure_step: i32,
        blacklist_threshold: f64,
        blacklist_cooldown_sec: f64,
        debounce_sec: f64,
        min_on_sec: f64,
        min_off_sec: f64,
        peer_recovery_interval_sec: f64,
        min_rate_mbit: f64,
        now: f64,
    ) -> NetworkActuator {
        let mut peers = PeerTable::new(
            success_step as f64,
            failure_step as f64,
            blacklist_threshold,
            blacklist_cooldown_sec,
        );
        for addr in &peer_addrs {
            let is_external = resolve_is_external(addr);
            peers.ensure(addr, is_external);
        }

        let shared = Arc::new(Mutex::new(SharedState {
            state: NetworkState::Off,
            state_since: now,
            first_transition_done: false,
        }));
        let peers = Arc::new(Mutex::new(peers));
        let bucket = Arc::new(Mutex::new(TokenBucket::new(min_rate_mbit, now)));
        let tx_ema = Arc::new(Mutex::new(crate::ema::Ema::new(30.0, 5.0)));
        let stop = Arc::new(AtomicBool::new(false));

        let send_thread = {
            let shared = Arc::clone(&shared);
            let peers = Arc::clone(&peers);
            let bucket = Arc::clone(&bucket);
            let tx_ema = Arc::clone(&tx_ema);
            let stop = Arc::clone(&stop);
            let peer_addrs = peer_addrs.clone();
            thread::Builder::new()
                .name("net-actuator-send".to_string())
                .spawn(move || {
                    send_loop(
                        shared,
                        peers,
                        bucket,
                        tx_ema,
                        stop,
                        peer_addrs,
                        port,
                        packet_size,
                        ttl,
                        require_external,
                        validation_timeout_sec,
                        debounce_sec,
                        min_on_sec,
                        min_off_sec,
                        peer_recovery_interval_sec,
                    )
                })
                .expect("failed to spawn network actuator send thread")
        };

        NetworkActuator {
            shared,
            peers,
            bucket,
            tx_ema,
            stop,
            send_thread: Some(send_thread),
            port,
            packet_size,
            ttl,
            require_external,
            validation_timeout_sec,
            debounce_sec,
            min_on_sec,
            min_off_sec,
            peer_recovery_interval_sec,
        }
    }

    pub fn set_rate_mbps(&self, rate_mbps: f64) {
        self.bucket.lock().unwrap().set_rate(rate_mbps);
    }

    pub fn rate_mbps(&self) -> f64 {
        self.bucket.lock().unwrap().rate_mbps()
    }

    pub fn state(&self) -> NetworkState {
        self.shared.lock().unwrap().state
    }

    pub fn set_paused(&self, paused: bool, min_rate_mbit: f64) {
        if paused {
            self.bucket.lock().unwrap().set_rate(min_rate_mbit);
        }
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.send_thread.take() {
            let _ = handle.join();
        }
    }
}

fn resolve_is_external(addr: &str) -> bool {
    match addr.parse::<IpAddr>() {
        Ok(ip) => address::is_external(ip),
        Err(_) => (addr, 0u16)
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next())
            .map(|sa| address::is_external(sa.ip()))
            .unwrap_or(false),
    }
}

fn now_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[allow(clippy::too_many_arguments)]
fn send_loop(
    shared: Arc<Mutex<SharedState>>,
    peers: Arc<Mutex<PeerTable>>,
    bucket: Arc<Mutex<TokenBucket>>,
    tx_ema: Arc<Mutex<crate::ema::Ema>>,
    stop: Arc<AtomicBool>,
    peer_addrs: Vec<String>,
    port: u16,
    packet_size: u32,
    ttl: u32,
    require_external: bool,
    validation_timeout_sec: f64,
    debounce_sec: f64,
    min_on_sec: f64,
    min_off_sec: f64,
    peer_recovery_interval_sec: f64,
) {
    transition(&shared, NetworkState::Initializing, debounce_sec, min_on_sec, min_off_sec);

    let mut last_recovery = 0.0;
    let udp_socket = UdpSocket::bind("0.0.0.0:0").ok();
    if let Some(sock) = &udp_socket {
        let _ = sock.set_ttl(ttl);
    }

    while !stop.load(Ordering::Relaxed) {
        let current = shared.lock().unwrap().state;
        match current {
            NetworkState::Off => {
                thread::sleep(Duration::from_millis(200));
            }
            NetworkState::Initializing => {
                transition(&shared, NetworkState::Validating, debounce_sec, min_on_sec, min_off_sec);
            }
            NetworkState::Validating => {
                validate_peers(&peers, &peer_addrs, port, validation_timeout_sec);
                let any_valid = peers.lock().unwrap().any_valid();
                let satisfies_external = !require_external || peers.lock().unwrap().any_valid_external();
                if any_valid && satisfies_external {
                    let next = if udp_socket.is_some() {
                        NetworkState::ActiveUdp
                    } else {
                        NetworkState::ActiveTcp
                    };
                    transition(&shared, next, debounce_sec, min_on_sec, min_off_sec);
                } else if any_valid && !satisfies_external {
                    thread::sleep(Duration::from_secs(1));
                } else {
                    transition(&shared, NetworkState::DegradedLocal, debounce_sec, min_on_sec, min_off_sec);
                }
            }
            NetworkState::ActiveUdp | NetworkState::ActiveTcp => {
                let targets = peers.lock().unwrap().valid_addrs();
                if targets.is_empty() {
                    transition(&shared, NetworkState::DegradedLocal, debounce_sec, min_on_sec, min_off_sec);
                    continue;
                }

                let now = now_secs();
                let bits = (packet_size as f64) * 8.0;
                let can_send = bucket.lock().unwrap().try_consume(bits, now).is_ok();
                if can_send {
                    for addr in &targets {
                        let sent = send_one(current, addr, port, &udp_socket, packet_size, ttl, now);
                        if sent > 0 {
                            tx_ema.lock().unwrap().update(sent as f64);
                        }
                    }
                } else {
                    thread::sleep(Duration::from_millis(10));
                }

                if now - last_recovery >= peer_recovery_interval_sec.max(60.0) {
                    last_recovery = now;
                    peers.lock().unwrap().requeue_expired(now);
                    validate_peers(&peers, &peer_addrs, port, validation_timeout_sec);
                }
            }
            NetworkState::DegradedLocal => {
                let now = now_secs();
                let bits = (packet_size as f64) * 8.0;
                if bucket.lock().unwrap().try_consume(bits, now).is_ok() {
                    let _ = send_one(
                        NetworkState::ActiveUdp,
                        DEGRADED_LOCAL_TARGET,
                        port,
                        &udp_socket,
                        packet_size,
                        ttl,
                        now,
                    );
                }
                if now - last_recovery >= peer_recovery_interval_sec.max(60.0) {
                    last_recovery = now;
                    peers.lock().unwrap().requeue_expired(now);
                    validate_peers(&peers, &peer_addrs, port, validation_timeout_sec);
                    if peers.lock().unwrap().any_valid() {
                        transition(&shared, NetworkState::Validating, debounce_sec, min_on_sec, min_off_sec);
                    }
                }
                thread::sleep(Duration::from_millis(100));
            }
            NetworkState::Error => {
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    let mut guard = shared.lock().unwrap();
    guard.state = NetworkState::Off;
}

fn transition(
    shared: &Arc<Mutex<SharedState>>,
    next: NetworkState,
    debounce_sec: f64,
    min_on_sec: f64,
    min_off_sec: f64,
) {
    let now = now_secs();
    let mut guard = shared.lock().unwrap();
    let is_first = !guard.first_transition_done && guard.state == NetworkState::Off;
    let allowed = is_first
        || state::can_transition(
            guard.state_since,
            now,
            is_first,
            debounce_sec,
            min_on_sec,
            min_off_sec,
            guard.state.is_active(),
        );
    if allowed {
        guard.state = next;
        guard.state_since = now;
        guard.first_transition_done = true;
    }
}

fn validate_peers(peers: &Arc<Mutex<PeerTable>>, peer_addrs: &[String], port: u16, timeout_sec: f64) {
    let now = now_secs();
    let candidates: Vec<String> = {
        let table = peers.lock().unwrap();
        peer_addrs
            .iter()
            .filter(|addr| !table.is_blacklisted(addr, now))
            .cloned()
            .collect()
    };

    for addr in candidates {
        let target = format!("{}:{}", addr, port);
        let ok = target
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next())
            .map(|sa: SocketAddr| TcpStream::connect_timeout(&sa, Duration::from_secs_f64(timeout_sec.max(0.1))).is_ok())
            .unwrap_or(false);

        let mut table = peers.lock().unwrap();
        if ok {
            table.record_success(&addr, now);
        } else {
            table.record_failure(&addr, now);
        }
    }
}

fn send_one(
    state: NetworkState,
    addr: &str,
    port: u16,
    udp_socket: &Option<UdpSocket>,
    packet_size: u32,
    ttl: u32,
    now: f64,
) -> usize {
    let size = clamp_packet_size(packet_size, state != NetworkState::ActiveTcp) as usize;
    let payload = build_packet(size, now);
    let target = format!("{}:{}", addr, port);

    match state {
        NetworkState::ActiveTcp => {
            let resolved = target.to_socket_addrs().ok().and_then(|mut it| it.next());
            if let Some(sa) = resolved {
                if let Ok(mut stream) = TcpStream::connect_timeout(&sa, Duration::from_millis(500)) {
                    let _ = stream.set_write_timeout(Some(Duration::from_millis(500)));
                    if stream.write_all(&payload).is_ok() {
                        return payload.len();
                    }
                }
            }
            0
        }
        _ => {
            if let Some(sock) = udp_socket {
                let _ = sock.set_ttl(ttl);
                let resolved = target.to_socket_addrs().ok().and_then(|mut it| it.next());
                if let Some(sa) = resolved {
                    if sock.send_to(&payload, sa).is_ok() {
                        return payload.len();
                    }
                }
            }
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_packet_size_udp_bounds() {
        assert_eq!(clamp_packet_size(10, true), MIN_UDP_PACKET);
        assert_eq!(clamp_packet_size(100_000, true), MAX_UDP_PACKET);
        assert_eq!(clamp_packet_size(1100, true), 1100);
    }

    #[test]
    fn test_clamp_packet_size_tcp_bounds() {
        assert_eq!(clamp_packet_size(100_000, false), MAX_TCP_PACKET);
    }

    #[test]
    fn test_build_packet_embeds_timestamp_in_first_eight_bytes() {
        let packet = build_packet(64, 12345.5);
        let t = f64::from_ne_bytes(packet[0..8].try_into().unwrap());
        assert_eq!(t, 12345.5);
        assert_eq!(packet.len(), 64);
    }

    #[test]
    fn test_next_rate_clamped_to_bounds() {
        assert_eq!(next_rate(5.0, 0.6, 10.0, 0.0, 1.0, 100.0), 11.0);
        assert_eq!(next_rate(5.0, 0.6, 1000.0, 0.0, 1.0, 20.0), 20.0);
        assert_eq!(next_rate(5.0, 0.6, -1000.0, 0.0, 1.0, 20.0), 1.0);
    }

    #[test]
    fn test_smart_activation_shared_tenancy_requires_both_at_risk() {
        assert!(smart_activation_needed(ShapeClass::SharedTenancy, true, false, true));
        assert!(!smart_activation_needed(ShapeClass::SharedTenancy, false, false, true));
        assert!(!smart_activation_needed(ShapeClass::SharedTenancy, true, false, false));
    }

    #[test]
    fn test_smart_activation_dedicated_arm_requires_all_three() {
        assert!(smart_activation_needed(ShapeClass::DedicatedArm, true, true, true));
        assert!(!smart_activation_needed(ShapeClass::DedicatedArm, true, true, false));
    }

    #[test]
    fn test_egress_verified_requires_positive_ema() {
        assert!(!egress_verified(0.0));
        assert!(egress_verified(1.0));
    }

    #[test]
    fn test_resolve_is_external_classifies_literal_ip() {
        assert!(!resolve_is_external("10.0.0.1"));
        assert!(resolve_is_external("8.8.8.8"));
    }
}
