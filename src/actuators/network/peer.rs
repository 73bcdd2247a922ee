//! Peer table: per-peer validation state, reputation, and blacklisting
//! (spec §3/§4.G).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Unvalidated,
    Valid,
    Invalid,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub state: PeerState,
    pub reputation: f64,
    pub successes: u64,
    pub failures: u64,
    pub blacklist_until: f64,
    pub is_external: bool,
}

impl PeerRecord {
    fn new(is_external: bool) -> PeerRecord {
        PeerRecord {
            state: PeerState::Unvalidated,
            reputation: 50.0,
            successes: 0,
            failures: 0,
            blacklist_until: 0.0,
            is_external,
        }
    }

    pub fn is_blacklisted(&self, now: f64) -> bool {
        now < self.blacklist_until
    }
}

/// Mapping from peer address string to its record. Reputation starts at
/// 50, nudges up on success and down on failure, and crossing below 20
/// blacklists the peer for `blacklist_cooldown_sec`.
pub struct PeerTable {
    peers: HashMap<String, PeerRecord>,
    success_step: f64,
    failure_step: f64,
    blacklist_threshold: f64,
    blacklist_cooldown_sec: f64,
}

impl PeerTable {
    pub fn new(
        success_step: f64,
        failure_step: f64,
        blacklist_threshold: f64,
        blacklist_cooldown_sec: f64,
    ) -> PeerTable {
        PeerTable {
            peers: HashMap::new(),
            success_step,
            failure_step,
            blacklist_threshold,
            blacklist_cooldown_sec,
        }
    }

    /// Registers a peer on first use; subsequent calls are no-ops for an
    /// already-known address.
    pub fn ensure(&mut self, addr: &str, is_external: bool) {
        self.peers
            .entry(addr.to_string())
            .or_insert_with(|| PeerRecord::new(is_external));
    }

    pub fn get(&self, addr: &str) -> Option<&PeerRecord> {
        self.peers.get(addr)
    }

    pub fn record_success(&mut self, addr: &str, now: f64) {
        if let Some(record) = self.peers.get_mut(addr) {
            record.successes += 1;
            record.reputation = (record.reputation + self.success_step).min(100.0);
            record.state = PeerState::Valid;
            let _ = now;
        }
    }

    /// Records a failed validation attempt. Reputation falling below the
    /// blacklist threshold sets `blacklist_until = now + cooldown` and
    /// marks the peer `Invalid`.
    pub fn record_failure(&mut self, addr: &str, now: f64) {
        if let Some(record) = self.peers.get_mut(addr) {
            record.failures += 1;
            record.reputation = (record.reputation - self.failure_step).max(0.0);
            record.state = PeerState::Invalid;
            if record.reputation < self.blacklist_threshold {
                record.blacklist_until = now + self.blacklist_cooldown_sec;
            }
        }
    }

    pub fn mark_degraded(&mut self, addr: &str) {
        if let Some(record) = self.peers.get_mut(addr) {
            record.state = PeerState::Degraded;
        }
    }

    pub fn is_blacklisted(&self, addr: &str, now: f64) -> bool {
        self.peers
            .get(addr)
            .map(|r| r.is_blacklisted(now))
            .unwrap_or(false)
    }

    /// Peers whose cooldown has expired get requeued for revalidation
    /// (back to `Unvalidated`) on the recovery pass (spec: runs no more
    /// often than every 60 s, enforced by the caller).
    pub fn requeue_expired(&mut self, now: f64) {
        for record in self.peers.values_mut() {
            if record.blacklist_until > 0.0 && now >= record.blacklist_until {
                record.blacklist_until = 0.0;
                record.state = PeerState::Unvalidated;
                // A peer only leaves the blacklist below the threshold
                // otherwise; give it a neutral reputation so it gets a
                // fair revalidation instead of being re-blacklisted by the
                // next failure it hasn't even attempted yet.
                record.reputation = record.reputation.max(50.0);
            }
        }
    }

    pub fn any_valid(&self) -> bool {
        self.peers.values().any(|r| r.state == PeerState::Valid)
    }

    pub fn any_valid_external(&self) -> bool {
        self.peers
            .values()
            .any(|r| r.state == PeerState::Valid && r.is_external)
    }

    pub fn valid_addrs(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|(_, r)| r.state == PeerState::Valid)
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
