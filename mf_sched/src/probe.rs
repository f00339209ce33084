use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::MfError;

/// Prefix of every telemetry channel name; the instance id is appended.
pub const PROBE_NAME_PREFIX: &str = "mf_probe";

struct Slot {
    ts_nanos: AtomicU64,
    backlog: AtomicU32,
}

/// Fixed-capacity single-writer/single-reader ring of backlog samples.
///
/// The enqueue path writes, a control-plane reader drains; they synchronize
/// only through the head/tail counters (release store on publish, acquire
/// load on drain). When the writer laps a slow reader the overwritten
/// samples are lost, and a reader overtaken mid-slot can observe one stale
/// field pairing. Both are accepted lossy-telemetry outcomes; the ring
/// bounds memory, it does not promise completeness.
pub struct ProbeLog {
    slots: Box<[Slot]>,
    mask: usize,
    /// Next write position. Monotonic; masked for indexing.
    head: AtomicUsize,
    /// Next read position. Written only by the drain side.
    tail: AtomicUsize,
}

impl ProbeLog {
    /// Allocates the ring up front; `capacity` is rounded up to a power of
    /// two so indexing reduces to masking.
    pub fn with_capacity(capacity: usize) -> Result<Self, MfError> {
        let cap = capacity.max(2).next_power_of_two();
        let mut slots = Vec::new();
        slots.try_reserve_exact(cap).map_err(|_| MfError::NoMemory)?;
        for _ in 0..cap {
            slots.push(Slot {
                ts_nanos: AtomicU64::new(0),
                backlog: AtomicU32::new(0),
            });
        }
        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: cap - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends one sample. Never blocks; wraps over the oldest sample when
    /// the ring is saturated. Single writer.
    pub fn record(&self, ts_nanos: u64, backlog_bytes: u32) {
        let head = self.head.load(Ordering::Relaxed);
        let slot = &self.slots[head & self.mask];
        slot.ts_nanos.store(ts_nanos, Ordering::Relaxed);
        slot.backlog.store(backlog_bytes, Ordering::Relaxed);
        self.head.store(head.wrapping_add(1), Ordering::Release);
    }

    /// Number of samples currently readable.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail).min(self.slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pops samples oldest-to-newest, each formatted
    /// `"<secs>.<nanos> <backlogBytes>\n"`, stopping when the ring is empty
    /// or appending the next record would exceed `max_bytes`. Destructive:
    /// only emitted records are consumed. Single reader.
    pub fn drain(&self, max_bytes: usize) -> String {
        let head = self.head.load(Ordering::Acquire);
        let mut tail = self.tail.load(Ordering::Relaxed);

        // The writer may have lapped us; whatever it overwrote is gone.
        if head.wrapping_sub(tail) > self.slots.len() {
            tail = head.wrapping_sub(self.slots.len());
        }

        let mut out = String::new();
        while tail != head {
            let slot = &self.slots[tail & self.mask];
            let ts = slot.ts_nanos.load(Ordering::Relaxed);
            let backlog = slot.backlog.load(Ordering::Relaxed);
            let line = format!(
                "{}.{:09} {}\n",
                ts / 1_000_000_000,
                ts % 1_000_000_000,
                backlog
            );
            if out.len() + line.len() > max_bytes {
                break;
            }
            out.push_str(&line);
            tail = tail.wrapping_add(1);
        }
        self.tail.store(tail, Ordering::Release);
        out
    }
}

/// Names one drain endpoint per live queue instance (`mf_probe0`,
/// `mf_probe1`, ...), standing in for the original per-instance procfs
/// files. Instances register at attach and unregister at destroy.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    channels: Arc<Mutex<HashMap<String, Arc<ProbeLog>>>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_name(id: u32) -> String {
        format!("{PROBE_NAME_PREFIX}{id}")
    }

    pub(crate) fn register(&self, id: u32, log: Arc<ProbeLog>) -> String {
        let name = Self::channel_name(id);
        self.channels.lock().unwrap().insert(name.clone(), log);
        name
    }

    pub(crate) fn unregister(&self, id: u32) {
        self.channels.lock().unwrap().remove(&Self::channel_name(id));
    }

    /// Opens a destructive reader over a channel's probe log.
    pub fn open(&self, name: &str) -> Option<ProbeReader> {
        let log = self.channels.lock().unwrap().get(name).cloned()?;
        Some(ProbeReader {
            log,
            pending: Vec::new(),
            pos: 0,
        })
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.channels.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Destructive byte-stream view of one probe log. Reads drain records as
/// newline-delimited text; partial reads are served from an internal
/// carry-over so a small caller buffer never loses a record.
pub struct ProbeReader {
    log: Arc<ProbeLog>,
    pending: Vec<u8>,
    pos: usize,
}

// Floor for each underlying drain, so tiny read() buffers still make
// progress one full record at a time.
const MIN_DRAIN_BYTES: usize = 64;

impl Read for ProbeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.pending.len() {
            self.pending = self
                .log
                .drain(buf.len().max(MIN_DRAIN_BYTES))
                .into_bytes();
            self.pos = 0;
        }
        let remaining = &self.pending[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}
