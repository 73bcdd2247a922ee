//! Durable, append-mostly time-series store, backing `metrics.db` under the
//! persistence directory.
//!
//! The original backs this with SQLite; nothing in this workspace's
//! dependency stack pulls in a SQL engine, so the "durable table keyed by
//! timestamp" is implemented here as a fixed-width binary log with an
//! in-memory index rebuilt at open time — small enough (7 days at the
//! default 5 s tick is well under 3 MB) that rescanning the file per query
//! would be wasteful, but keeping an index avoids it entirely.

use crate::error::MetricsError;
use crate::sampler::Sample;
use std::collections::BTreeMap;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const RECORD_SIZE: usize = 24;
const STORE_FILE_NAME: &str = "metrics.db";
const DEGRADED_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Cpu,
    Mem,
    Net,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Record {
    t: f64,
    cpu: f32,
    mem: f32,
    net: f32,
    load: f32,
}

impl Record {
    fn from_sample(s: Sample) -> Record {
        Record {
            t: s.t,
            cpu: s.cpu_pct as f32,
            mem: s.mem_pct as f32,
            net: s.net_pct as f32,
            load: s.load_per_core as f32,
        }
    }

    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.t.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.cpu.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.mem.to_ne_bytes());
        buf[16..20].copy_from_slice(&self.net.to_ne_bytes());
        buf[20..24].copy_from_slice(&self.load.to_ne_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Record {
        Record {
            t: f64::from_ne_bytes(buf[0..8].try_into().unwrap()),
            cpu: f32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            mem: f32::from_ne_bytes(buf[12..16].try_into().unwrap()),
            net: f32::from_ne_bytes(buf[16..20].try_into().unwrap()),
            load: f32::from_ne_bytes(buf[20..24].try_into().unwrap()),
        }
    }

    fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu as f64,
            Metric::Mem => self.mem as f64,
            Metric::Net => self.net as f64,
            Metric::Load => self.load as f64,
        }
    }
}

/// Validates a byte buffer as a sequence of fixed-width records whose
/// timestamps are finite and monotonically non-decreasing. Returns the
/// valid prefix length in bytes and the decoded records within it; a
/// trailing partial record or an out-of-order/non-finite timestamp ends
/// the valid prefix at that point.
fn valid_prefix(buf: &[u8]) -> (usize, Vec<Record>) {
    let mut records = Vec::new();
    let mut last_t = f64::NEG_INFINITY;
    let mut offset = 0;
    while offset + RECORD_SIZE <= buf.len() {
        let record = Record::decode(&buf[offset..offset + RECORD_SIZE]);
        if !record.t.is_finite() || record.t < last_t {
            break;
        }
        last_t = record.t;
        records.push(record);
        offset += RECORD_SIZE;
    }
    (offset, records)
}

struct Inner {
    dir: PathBuf,
    file: File,
    index: BTreeMap<u64, Record>,
    consecutive_write_failures: u32,
    degraded: bool,
}

impl Inner {
    /// Applies the outcome of one write attempt: a success clears the
    /// failure streak and indexes `record`; a failure extends the streak
    /// and latches `degraded` once it reaches [`DEGRADED_THRESHOLD`].
    /// `degraded` is sticky for the life of the store once set.
    fn record_write_result(&mut self, result: io::Result<()>, record: Record) -> Result<(), MetricsError> {
        match result {
            Ok(()) => {
                self.consecutive_write_failures = 0;
                self.index.insert(timestamp_key(record.t), record);
                Ok(())
            }
            Err(e) => {
                self.consecutive_write_failures += 1;
                if self.consecutive_write_failures >= DEGRADED_THRESHOLD {
                    self.degraded = true;
                }
                Err(MetricsError::Io(e))
            }
        }
    }
}

pub struct MetricsStore {
    inner: Mutex<Inner>,
}

fn timestamp_key(t: f64) -> u64 {
    t.to_bits()
}

unsafe fn device_id(path: &Path) -> io::Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
    let mut st: libc::stat = std::mem::zeroed();
    if libc::stat(c_path.as_ptr(), &mut st) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(st.st_dev as u64)
}

/// Hard-failure gate: the persistence directory must sit on a different
/// device than its parent (i.e. be an actual mounted volume), or the
/// process refuses to start. This guards against silent data loss when a
/// container's persistent volume mount is missing.
pub fn require_independent_mount(dir: &Path) -> Result<(), MetricsError> {
    let parent = dir.parent().unwrap_or(Path::new("/"));
    let dir_dev = unsafe { device_id(dir) }.map_err(MetricsError::Io)?;
    let parent_dev = unsafe { device_id(parent) }.map_err(MetricsError::Io)?;
    if dir_dev == parent_dev {
        return Err(MetricsError::NotAMountPoint(dir.display().to_string()));
    }
    Ok(())
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl MetricsStore {
    /// Open (or create) the store under `dir`. Does **not** perform the
    /// mount-point hard-failure check — callers that need that guarantee
    /// (i.e. the daemon at startup) call [`require_independent_mount`]
    /// separately, since tests open stores in plain temp directories.
    pub fn open(dir: &Path) -> Result<MetricsStore, MetricsError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE_NAME);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let (valid_len, records) = valid_prefix(&buf);
        if valid_len != buf.len() {
            Self::quarantine_and_recreate(dir, &path, &buf)?;
            file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&path)?;
        }

        let mut index = BTreeMap::new();
        for record in records {
            index.insert(timestamp_key(record.t), record);
        }

        Ok(MetricsStore {
            inner: Mutex::new(Inner {
                dir: dir.to_path_buf(),
                file,
                index,
                consecutive_write_failures: 0,
                degraded: false,
            }),
        })
    }

    fn quarantine_and_recreate(dir: &Path, path: &Path, original: &[u8]) -> Result<(), MetricsError> {
        let backup = dir.join(format!("{}-corrupt-{}", STORE_FILE_NAME, now_secs() as i64));
        std::fs::write(&backup, original)?;
        log::error!(
            "metrics store at {} is corrupt; backed up to {} and recreating",
            path.display(),
            backup.display()
        );
        std::fs::write(path, [])?;
        Ok(())
    }

    /// Append one sample. Idempotent on exact-timestamp conflict (the new
    /// record supersedes the old one in the index; the stale copy remains
    /// in the file but is never surfaced by queries). Callers are expected
    /// to throttle to one call per control tick.
    pub fn store(&self, sample: Sample) -> Result<(), MetricsError> {
        let mut inner = self.inner.lock().unwrap();
        let record = Record::from_sample(sample);
        let result = (|| -> io::Result<()> {
            inner.file.seek(SeekFrom::End(0))?;
            inner.file.write_all(&record.encode())?;
            inner.file.flush()
        })();
        inner.record_write_result(result, record)
    }

    /// The p-th percentile of `metric` over samples with `t >= now -
    /// window_sec`. `None` iff there are zero qualifying samples.
    pub fn percentile(&self, metric: Metric, p: f64, window_sec: f64) -> Option<f64> {
        let inner = self.inner.lock().unwrap();
        let cutoff = now_secs() - window_sec;
        let mut values: Vec<f64> = inner
            .index
            .values()
            .filter(|r| r.t >= cutoff)
            .map(|r| r.metric(metric))
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        crate::metrics::percentile::linear_interpolated_percentile(&values, p)
    }

    /// Count of samples with `t >= now - window_sec`.
    pub fn count(&self, window_sec: f64) -> usize {
        let inner = self.inner.lock().unwrap();
        let cutoff = now_secs() - window_sec;
        inner.index.values().filter(|r| r.t >= cutoff).count()
    }

    /// Deletes rows older than `retention_sec`, rewriting the on-disk file
    /// to match. Returns the number of rows removed.
    pub fn cleanup(&self, retention_sec: f64) -> Result<usize, MetricsError> {
        let mut inner = self.inner.lock().unwrap();
        let cutoff = now_secs() - retention_sec;
        let before = inner.index.len();
        inner.index.retain(|_, r| r.t >= cutoff);
        let removed = before - inner.index.len();

        if removed > 0 {
            let path = inner.dir.join(STORE_FILE_NAME);
            let mut buf = Vec::with_capacity(inner.index.len() * RECORD_SIZE);
            for record in inner.index.values() {
                buf.extend_from_slice(&record.encode());
            }
            std::fs::write(&path, &buf)?;
            inner.file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&path)?;
        }
        Ok(removed)
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.lock().unwrap().degraded
    }

    pub fn consecutive_write_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_write_failures
    }
}
