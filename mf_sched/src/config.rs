use std::net::Ipv4Addr;
use std::time::Duration;

use mf_core::RewriteStrategy;
use serde::Serialize;

/// Which control law the dequeue path runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlLaw {
    /// Max-throughput-minus-queue-penalty heuristic.
    Proportional,
    /// XCP-style law with a polled control interval.
    Xcp,
}

/// Attach-time configuration of one mf instance.
///
/// The proportional scale/divisor and the XCP gains were tuned empirically
/// on the original test topology; they are defaults here, not invariants.
#[derive(Debug, Clone)]
pub struct MfConfig {
    /// Inner queue bound, in packets.
    pub limit: usize,
    /// Link capacity, bytes per second.
    pub capacity: u64,
    pub control_law: ControlLaw,
    /// How the MF option is located for the rewrite.
    pub rewrite_strategy: RewriteStrategy,
    /// Maximum distinct flows attributed to this instance.
    pub max_flows: usize,
    /// Destination network that marks a packet's flow as monitored.
    pub monitored_net: Ipv4Addr,
    pub monitored_prefix_len: u8,
    /// Probe ring capacity in samples; rounded up to a power of two.
    pub probe_capacity: usize,
    /// Proportional-law numerator scale.
    pub prop_scale: u64,
    /// Proportional-law per-flow divisor.
    pub prop_divisor: u64,
    /// XCP spare-capacity gain, applied as `alpha / 10`.
    pub xcp_alpha: i64,
    /// XCP persistent-queue gain, applied as `beta / 1000`.
    pub xcp_beta: i64,
    /// XCP control interval.
    pub xcp_interval: Duration,
}

impl Default for MfConfig {
    fn default() -> Self {
        Self {
            limit: 1000,
            capacity: 1_250_000, // 10 Mbit/s
            control_law: ControlLaw::Proportional,
            rewrite_strategy: RewriteStrategy::GenericScan,
            max_flows: 3,
            monitored_net: Ipv4Addr::new(10, 0, 0, 0),
            monitored_prefix_len: 8,
            probe_capacity: 1024,
            prop_scale: 12,
            prop_divisor: 10,
            xcp_alpha: 4,
            xcp_beta: 226,
            xcp_interval: Duration::from_millis(140),
        }
    }
}

impl MfConfig {
    pub fn builder() -> MfConfigBuilder {
        MfConfigBuilder::default()
    }

    /// Whether `addr` falls inside the monitored destination network.
    pub fn monitors(&self, addr: &Ipv4Addr) -> bool {
        let len = u32::from(self.monitored_prefix_len.min(32));
        if len == 0 {
            return true;
        }
        let mask = u32::MAX << (32 - len);
        (u32::from(*addr) & mask) == (u32::from(self.monitored_net) & mask)
    }
}

/// Builder for MfConfig
#[derive(Debug, Default)]
pub struct MfConfigBuilder {
    limit: Option<usize>,
    capacity: Option<u64>,
    control_law: Option<ControlLaw>,
    rewrite_strategy: Option<RewriteStrategy>,
    max_flows: Option<usize>,
    monitored_net: Option<(Ipv4Addr, u8)>,
    probe_capacity: Option<usize>,
    prop_scale: Option<u64>,
    prop_divisor: Option<u64>,
    xcp_alpha: Option<i64>,
    xcp_beta: Option<i64>,
    xcp_interval: Option<Duration>,
}

impl MfConfigBuilder {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn capacity(mut self, bytes_per_sec: u64) -> Self {
        self.capacity = Some(bytes_per_sec);
        self
    }

    pub fn control_law(mut self, law: ControlLaw) -> Self {
        self.control_law = Some(law);
        self
    }

    pub fn rewrite_strategy(mut self, strategy: RewriteStrategy) -> Self {
        self.rewrite_strategy = Some(strategy);
        self
    }

    pub fn max_flows(mut self, max: usize) -> Self {
        self.max_flows = Some(max);
        self
    }

    pub fn monitored_net(mut self, net: Ipv4Addr, prefix_len: u8) -> Self {
        self.monitored_net = Some((net, prefix_len));
        self
    }

    pub fn probe_capacity(mut self, samples: usize) -> Self {
        self.probe_capacity = Some(samples);
        self
    }

    pub fn proportional_tuning(mut self, scale: u64, divisor: u64) -> Self {
        self.prop_scale = Some(scale);
        self.prop_divisor = Some(divisor);
        self
    }

    pub fn xcp_gains(mut self, alpha: i64, beta: i64) -> Self {
        self.xcp_alpha = Some(alpha);
        self.xcp_beta = Some(beta);
        self
    }

    pub fn xcp_interval(mut self, interval: Duration) -> Self {
        self.xcp_interval = Some(interval);
        self
    }

    pub fn build(self) -> MfConfig {
        let defaults = MfConfig::default();
        let (monitored_net, monitored_prefix_len) = self
            .monitored_net
            .unwrap_or((defaults.monitored_net, defaults.monitored_prefix_len));
        MfConfig {
            limit: self.limit.unwrap_or(defaults.limit),
            capacity: self.capacity.unwrap_or(defaults.capacity),
            control_law: self.control_law.unwrap_or(defaults.control_law),
            rewrite_strategy: self
                .rewrite_strategy
                .unwrap_or(defaults.rewrite_strategy),
            max_flows: self.max_flows.unwrap_or(defaults.max_flows),
            monitored_net,
            monitored_prefix_len,
            probe_capacity: self.probe_capacity.unwrap_or(defaults.probe_capacity),
            prop_scale: self.prop_scale.unwrap_or(defaults.prop_scale),
            prop_divisor: self.prop_divisor.unwrap_or(defaults.prop_divisor),
            xcp_alpha: self.xcp_alpha.unwrap_or(defaults.xcp_alpha),
            xcp_beta: self.xcp_beta.unwrap_or(defaults.xcp_beta),
            xcp_interval: self.xcp_interval.unwrap_or(defaults.xcp_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = MfConfig::builder().build();
        assert_eq!(config.limit, 1000);
        assert_eq!(config.max_flows, 3);
        assert_eq!(config.control_law, ControlLaw::Proportional);
    }

    #[test]
    fn test_builder_overrides() {
        let config = MfConfig::builder()
            .limit(5)
            .capacity(20 * 1024)
            .control_law(ControlLaw::Xcp)
            .proportional_tuning(6, 5)
            .build();
        assert_eq!(config.limit, 5);
        assert_eq!(config.capacity, 20 * 1024);
        assert_eq!(config.prop_scale, 6);
        assert_eq!(config.prop_divisor, 5);
    }

    #[test]
    fn test_monitored_prefix() {
        let config = MfConfig::builder()
            .monitored_net(Ipv4Addr::new(10, 0, 0, 0), 8)
            .build();
        assert!(config.monitors(&Ipv4Addr::new(10, 0, 1, 1)));
        assert!(config.monitors(&Ipv4Addr::new(10, 255, 0, 9)));
        assert!(!config.monitors(&Ipv4Addr::new(192, 168, 0, 1)));
    }

    #[test]
    fn test_zero_prefix_matches_everything() {
        let config = MfConfig::builder()
            .monitored_net(Ipv4Addr::new(0, 0, 0, 0), 0)
            .build();
        assert!(config.monitors(&Ipv4Addr::new(8, 8, 8, 8)));
    }
}
