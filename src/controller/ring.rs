//! Fixed-capacity ring of slot decisions covering the last 24 h, plus its
//! atomically-persisted snapshot.
//!
//! Uses a fixed-capacity structure with a write index and population count,
//! but a `Vec<Option<bool>>` addressed by `write_index % ring_size` rather
//! than a push/pop-front `VecDeque`, since slot history needs O(1)
//! random-access overwrite rather than eviction from the front.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const SNAPSHOT_FILE_NAME: &str = "p95_ring_buffer.json";
const SNAPSHOT_MAX_AGE_SEC: f64 = 2.0 * 3600.0;

/// Ring of the last 24 h of slot decisions. `history[i]` is `None` for
/// slots never written (still warming up), `Some(is_high)` once recorded.
#[derive(Debug, Clone)]
pub struct SlotRing {
    history: Vec<Option<bool>>,
    write_index: usize,
    population: usize,
}

impl SlotRing {
    pub fn new(ring_size: usize) -> SlotRing {
        SlotRing {
            history: vec![None; ring_size.max(1)],
            write_index: 0,
            population: 0,
        }
    }

    pub fn ring_size(&self) -> usize {
        self.history.len()
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Records the just-finished slot's decision, advances the write index
    /// modulo the ring size, and grows the population count up to
    /// `ring_size`.
    pub fn record(&mut self, is_high: bool) {
        let size = self.history.len();
        self.history[self.write_index] = Some(is_high);
        self.write_index = (self.write_index + 1) % size;
        if self.population < size {
            self.population += 1;
        }
    }

    /// `high_count / population * 100`, or `0.0` when the ring is empty —
    /// a freshly reset ring is never in exceedance.
    pub fn current_exceedance(&self) -> f64 {
        if self.population == 0 {
            return 0.0;
        }
        let high_count = self.history.iter().filter(|s| **s == Some(true)).count();
        100.0 * high_count as f64 / self.population as f64
    }

    fn to_snapshot(&self, current_slot_is_high: bool) -> RingSnapshot {
        RingSnapshot {
            slot_history: self.history.clone(),
            slot_history_index: self.write_index,
            slots_recorded: self.population,
            slot_history_size: self.history.len(),
            timestamp: now_secs(),
            current_slot_is_high,
        }
    }

    /// Restores ring state from a snapshot already validated for freshness
    /// and ring-size match by [`load_snapshot`].
    fn from_snapshot(snapshot: &RingSnapshot) -> SlotRing {
        SlotRing {
            history: snapshot.slot_history.clone(),
            write_index: snapshot.slot_history_index,
            population: snapshot.slots_recorded,
        }
    }

    /// Writes the ring-buffer snapshot atomically (temp file + fsync +
    /// rename) under `dir`. Callers batch calls to this per spec (every K
    /// slot closes or on shutdown); this function itself always writes
    /// unconditionally when called.
    pub fn save_snapshot(&self, dir: &Path, current_slot_is_high: bool) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let snapshot = self.to_snapshot(current_slot_is_high);
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let final_path = dir.join(SNAPSHOT_FILE_NAME);
        let tmp_path = dir.join(format!("{}.tmp", SNAPSHOT_FILE_NAME));

        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Loads a previously-saved snapshot from `dir`, accepting it only if
    /// it is fresh (`now - saved_at <= 2h`) and its ring size matches
    /// `expected_ring_size`; otherwise returns `Ok(None)` so the caller
    /// initializes an empty ring rather than erroring out at startup.
    pub fn load_snapshot(dir: &Path, expected_ring_size: usize) -> io::Result<Option<(SlotRing, bool)>> {
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let snapshot: RingSnapshot = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(_) => return Ok(None),
        };

        let age = now_secs() - snapshot.timestamp;
        if age > SNAPSHOT_MAX_AGE_SEC || snapshot.slot_history_size != expected_ring_size {
            return Ok(None);
        }

        let ring = SlotRing::from_snapshot(&snapshot);
        Ok(Some((ring, snapshot.current_slot_is_high)))
    }
}

/// JSON-shaped record persisted to `p95_ring_buffer.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RingSnapshot {
    slot_history: Vec<Option<bool>>,
    slot_history_index: usize,
    slots_recorded: usize,
    slot_history_size: usize,
    timestamp: f64,
    current_slot_is_high: bool,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ring_has_zero_exceedance() {
        let ring = SlotRing::new(1440);
        assert_eq!(ring.current_exceedance(), 0.0);
        assert_eq!(ring.population(), 0);
    }

    #[test]
    fn test_record_advances_index_and_population() {
        let mut ring = SlotRing::new(4);
        ring.record(true);
        ring.record(false);
        assert_eq!(ring.write_index(), 2);
        assert_eq!(ring.population(), 2);
        assert_eq!(ring.current_exceedance(), 50.0);
    }

    #[test]
    fn test_population_caps_at_ring_size() {
        let mut ring = SlotRing::new(3);
        for _ in 0..10 {
            ring.record(true);
        }
        assert_eq!(ring.population(), 3);
    }

    #[test]
    fn test_wraparound_write_index() {
        let mut ring = SlotRing::new(4);
        for _ in 0..4 {
            ring.record(true);
        }
        assert_eq!(ring.write_index(), 0);
        ring.record(false);
        assert_eq!(ring.write_index(), 1);
        // population caps at ring_size and the oldest slot (index 0, now
        // False) keeps the population count unchanged.
        assert_eq!(ring.population(), 4);
    }

    #[test]
    fn test_save_and_load_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = SlotRing::new(10);
        ring.record(true);
        ring.record(false);
        ring.save_snapshot(dir.path(), true).unwrap();

        let (loaded, current_is_high) = SlotRing::load_snapshot(dir.path(), 10).unwrap().unwrap();
        assert_eq!(loaded.population(), ring.population());
        assert_eq!(loaded.write_index(), ring.write_index());
        assert!(current_is_high);
    }

    #[test]
    fn test_load_snapshot_rejects_mismatched_ring_size() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SlotRing::new(10);
        ring.save_snapshot(dir.path(), false).unwrap();
        let loaded = SlotRing::load_snapshot(dir.path(), 20).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_snapshot_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SlotRing::load_snapshot(dir.path(), 10).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_snapshot_rejects_stale_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let stale = RingSnapshot {
            slot_history: vec![None; 10],
            slot_history_index: 0,
            slots_recorded: 0,
            slot_history_size: 10,
            timestamp: now_secs() - 3.0 * 3600.0,
            current_slot_is_high: false,
        };
        fs::write(
            dir.path().join(SNAPSHOT_FILE_NAME),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();
        let loaded = SlotRing::load_snapshot(dir.path(), 10).unwrap();
        assert!(loaded.is_none());
    }
}
