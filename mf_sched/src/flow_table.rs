use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use mf_core::FlowKey;

/// Capped set of flows attributed to a queue instance.
///
/// Handles are cheap clones of one shared table. `MfQdisc::init` gives each
/// instance its own table; cloning a handle into several instances via
/// `MfQdisc::init_shared` reproduces the original module's process-wide
/// table, where flows of unrelated queues share one cap and one bulk
/// `clear`. Callers opting into sharing own those semantics.
///
/// Admission is a single check-and-insert under one lock acquisition, so
/// concurrent `admit` calls from different packet contexts cannot double
/// count a flow.
#[derive(Debug, Clone)]
pub struct FlowTable {
    inner: Arc<Mutex<HashSet<FlowKey>>>,
    cap: usize,
}

impl FlowTable {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashSet::new())),
            cap,
        }
    }

    pub fn is_known(&self, key: &FlowKey) -> bool {
        self.inner.lock().unwrap().contains(key)
    }

    /// Inserts a previously unseen flow. Returns `false` for flows already
    /// present and no-ops once the table is at its cap; existing entries are
    /// never evicted by admission pressure.
    pub fn admit(&self, key: &FlowKey) -> bool {
        let mut flows = self.inner.lock().unwrap();
        if flows.contains(key) || flows.len() >= self.cap {
            return false;
        }
        flows.insert(*key)
    }

    /// Purges every entry. Called at instance destruction; on a shared
    /// table this also drops flows admitted by other instances.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key(last: u8) -> FlowKey {
        FlowKey::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 1, last))
    }

    #[test]
    fn test_admit_deduplicates() {
        let table = FlowTable::new(3);
        assert!(table.admit(&key(1)));
        assert!(table.admit(&key(2)));
        assert!(!table.admit(&key(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_cap_stops_new_admissions() {
        let table = FlowTable::new(2);
        assert!(table.admit(&key(1)));
        assert!(table.admit(&key(2)));
        assert!(!table.admit(&key(3)));
        // existing flows stay known
        assert!(table.is_known(&key(1)));
        assert!(!table.is_known(&key(3)));
    }

    #[test]
    fn test_clear_purges_shared_handle() {
        let table = FlowTable::new(3);
        let shared = table.clone();
        table.admit(&key(1));
        shared.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_concurrent_admit_counts_once() {
        let table = FlowTable::new(8);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let table = table.clone();
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0;
                for last in 0..8 {
                    if table.admit(&key(last)) {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 8);
        assert_eq!(table.len(), 8);
    }
}
