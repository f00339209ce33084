use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, trace, warn};

use mf_core::option;
use mf_core::Packet;

use crate::config::{ControlLaw, MfConfig};
use crate::error::MfError;
use crate::flow_table::FlowTable;
use crate::probe::{ProbeLog, ProbeRegistry};
use crate::rate::{self, FeedbackController, LinkSnapshot, RateError};

// Instance ids are unique for the lifetime of the process; they index the
// telemetry channel names.
static NEXT_INSTANCE_ID: AtomicU32 = AtomicU32::new(0);

/// Outcome of an enqueue. Queue-full is an expected, counted condition,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
    Queued,
    Dropped,
}

#[derive(Debug, Default)]
struct QdiscStats {
    tx_packets: AtomicU64,
    tx_bytes: AtomicU64,
    drops: AtomicU64,
    backlog: AtomicU64,
}

/// Point-in-time copy of the discipline counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub drops: u64,
    pub backlog: u64,
    pub qlen: usize,
}

/// Handle of a child class. mf has exactly one: the built-in leaf queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassId(pub u32);

/// The sole child class exposed for class-management tooling.
pub const LEAF_CLASS: ClassId = ClassId(1);

/// View of the leaf class returned by `leaf()`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LeafView {
    pub class: ClassId,
    pub qlen: usize,
    pub backlog: u64,
}

/// Serializable snapshot returned by `dump()`, mirroring a tc-style
/// options+stats dump.
#[derive(Debug, Clone, Serialize)]
pub struct QdiscDump {
    pub id: u32,
    pub limit: usize,
    pub capacity: u64,
    pub control_law: ControlLaw,
    pub flow_count: usize,
    pub probe_channel: String,
    pub stats: StatsSnapshot,
}

/// The mf queueing discipline: a FIFO wrapping one bounded inner queue,
/// with flow classification and backlog telemetry on the enqueue path and
/// fair-share feedback rewrite on the dequeue path.
///
/// Enqueue and dequeue may run concurrently with each other and with the
/// telemetry reader; each public operation is non-blocking. `destroy`
/// assumes the caller has quiesced packet processing first.
pub struct MfQdisc {
    id: u32,
    config: MfConfig,
    inner: Mutex<VecDeque<Packet>>,
    controller: Mutex<Box<dyn FeedbackController>>,
    flows: FlowTable,
    flow_count: AtomicUsize,
    probe: Arc<ProbeLog>,
    probe_channel: String,
    registry: ProbeRegistry,
    stats: QdiscStats,
}

impl MfQdisc {
    /// Attaches a new instance with its own flow table.
    pub fn init(config: MfConfig, registry: ProbeRegistry) -> Result<Self, MfError> {
        let flows = FlowTable::new(config.max_flows);
        Self::init_shared(config, registry, flows)
    }

    /// Attaches a new instance using a caller-provided (possibly shared)
    /// flow table. All packet-path memory is allocated here; failure leaves
    /// nothing registered and the instance unusable.
    pub fn init_shared(
        config: MfConfig,
        registry: ProbeRegistry,
        flows: FlowTable,
    ) -> Result<Self, MfError> {
        let mut queue = VecDeque::new();
        queue
            .try_reserve_exact(config.limit)
            .map_err(|_| MfError::NoMemory)?;
        let probe = Arc::new(ProbeLog::with_capacity(config.probe_capacity)?);

        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        let probe_channel = registry.register(id, Arc::clone(&probe));
        let controller = Mutex::new(rate::controller_for(&config));

        debug!(
            id,
            channel = %probe_channel,
            limit = config.limit,
            capacity = config.capacity,
            law = ?config.control_law,
            "mf instance attached"
        );

        Ok(Self {
            id,
            config,
            inner: Mutex::new(queue),
            controller,
            flows,
            flow_count: AtomicUsize::new(0),
            probe,
            probe_channel,
            registry,
            stats: QdiscStats::default(),
        })
    }

    /// Classifies the packet's flow, records a backlog sample, and accepts
    /// the packet unless the inner queue is at its limit. Never blocks.
    pub fn enqueue(&self, packet: Packet) -> EnqueueStatus {
        let flow = packet.flow();
        if self.config.monitors(&flow.dst) && self.flows.admit(&flow) {
            let count = self.flow_count.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(id = self.id, src = %flow.src, dst = %flow.dst, count, "new flow admitted");
        }

        self.probe
            .record(unix_nanos(), self.stats.backlog.load(Ordering::Relaxed) as u32);

        let mut queue = self.inner.lock().unwrap();
        if queue.len() < self.config.limit {
            self.stats
                .backlog
                .fetch_add(packet.len() as u64, Ordering::Relaxed);
            queue.push_back(packet);
            EnqueueStatus::Queued
        } else {
            drop(queue);
            self.stats.drops.fetch_add(1, Ordering::Relaxed);
            debug!(id = self.id, "inner queue full, packet dropped");
            EnqueueStatus::Dropped
        }
    }

    /// Pops the oldest packet, updates the counters, and rewrites the MF
    /// feedback byte in place when the packet carries a TCP options area.
    /// The packet is returned regardless of whether the rewrite happened.
    pub fn dequeue(&self) -> Option<Packet> {
        let mut packet = self.inner.lock().unwrap().pop_front()?;
        let pkt_len = packet.len();

        let backlog = self
            .stats
            .backlog
            .fetch_sub(pkt_len as u64, Ordering::Relaxed)
            .saturating_sub(pkt_len as u64);
        self.stats.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.stats.tx_bytes.fetch_add(pkt_len as u64, Ordering::Relaxed);

        let link = LinkSnapshot {
            capacity: self.config.capacity,
            backlog,
            flow_count: self.flow_count.load(Ordering::Relaxed),
        };

        if let Some(options) = packet.tcp_options_mut() {
            let computed = self
                .controller
                .lock()
                .unwrap()
                .feedback_rate(&link, pkt_len, Instant::now());
            match computed {
                Ok(rate_kbs) => {
                    let wire = rate::saturate_to_wire(rate_kbs);
                    match option::rewrite_feedback(
                        options,
                        self.config.rewrite_strategy,
                        wire,
                    ) {
                        Ok(cookie) => trace!(
                            id = self.id,
                            feedback = wire,
                            requested = cookie.requested,
                            prop_delay = cookie.prop_delay,
                            "feedback rewritten"
                        ),
                        Err(err) => {
                            debug!(id = self.id, %err, "option rewrite skipped")
                        }
                    }
                }
                Err(RateError::ZeroFlowCount) => {
                    warn!(id = self.id, "feedback skipped: no tracked flows")
                }
            }
        }

        Some(packet)
    }

    /// Detaches the instance: releases queued packets, purges the flow
    /// table entries it owns, and unregisters the telemetry channel. The
    /// caller guarantees no further enqueue/dequeue calls are in flight.
    pub fn destroy(self) {
        let released = self.inner.lock().unwrap().len();
        self.flows.clear();
        self.registry.unregister(self.id);
        debug!(id = self.id, released, "mf instance detached");
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name of this instance's telemetry channel (`mf_probe{id}`).
    pub fn probe_channel(&self) -> &str {
        &self.probe_channel
    }

    pub fn qlen(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn backlog(&self) -> u64 {
        self.stats.backlog.load(Ordering::Relaxed)
    }

    pub fn flow_count(&self) -> usize {
        self.flow_count.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            tx_packets: self.stats.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.stats.tx_bytes.load(Ordering::Relaxed),
            drops: self.stats.drops.load(Ordering::Relaxed),
            backlog: self.stats.backlog.load(Ordering::Relaxed),
            qlen: self.qlen(),
        }
    }

    // Classful introspection. The inner bounded queue is the one and only
    // child class; these exist for compatibility with generic
    // class-management tooling and carry no extra state.

    /// The sole child class and its occupancy.
    pub fn leaf(&self) -> LeafView {
        LeafView {
            class: LEAF_CLASS,
            qlen: self.qlen(),
            backlog: self.backlog(),
        }
    }

    /// Replacing the inner queue is not supported.
    pub fn graft(&self, _class: ClassId) -> Result<(), MfError> {
        Err(MfError::SingleClassOnly)
    }

    /// Class lookup; only the leaf handle exists.
    pub fn get(&self, class: ClassId) -> Option<ClassId> {
        (class == LEAF_CLASS).then_some(LEAF_CLASS)
    }

    /// Reference drop for a handle from `get`. Nothing to release.
    pub fn put(&self, _class: ClassId) {}

    /// Visits every child class, i.e. exactly the leaf.
    pub fn walk<F: FnMut(ClassId)>(&self, mut visit: F) {
        visit(LEAF_CLASS);
    }

    /// Options-and-stats snapshot for inspection tooling.
    pub fn dump(&self) -> QdiscDump {
        QdiscDump {
            id: self.id,
            limit: self.config.limit,
            capacity: self.config.capacity,
            control_law: self.config.control_law,
            flow_count: self.flow_count(),
            probe_channel: self.probe_channel.clone(),
            stats: self.stats(),
        }
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
