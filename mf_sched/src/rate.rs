use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{ControlLaw, MfConfig};

/// Live view of one queue instance handed to the controller per dequeued
/// packet.
#[derive(Debug, Clone, Copy)]
pub struct LinkSnapshot {
    /// Configured link capacity, bytes per second.
    pub capacity: u64,
    /// Bytes resident in the inner queue after the pop.
    pub backlog: u64,
    /// Distinct flows currently attributed to the instance.
    pub flow_count: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateError {
    #[error("no tracked flows; feedback rate is undefined")]
    ZeroFlowCount,
}

/// A control law mapping queue state to a per-flow feedback rate.
///
/// Rates are KB/s wire units; callers saturate them into the one-byte
/// feedback field with [`saturate_to_wire`]. Implementations may keep
/// interval state but must never block; time is passed in explicitly.
pub trait FeedbackController: Send + std::fmt::Debug {
    fn feedback_rate(
        &mut self,
        link: &LinkSnapshot,
        pkt_len: usize,
        now: Instant,
    ) -> Result<u64, RateError>;
}

/// Builds the controller selected by the configuration.
pub fn controller_for(config: &MfConfig) -> Box<dyn FeedbackController> {
    match config.control_law {
        ControlLaw::Proportional => Box::new(ProportionalLaw::new(
            config.prop_scale,
            config.prop_divisor,
        )),
        ControlLaw::Xcp => Box::new(XcpLaw::new(
            config.xcp_alpha,
            config.xcp_beta,
            config.xcp_interval,
        )),
    }
}

/// Truncating to the one-byte wire field saturates; it never wraps.
pub fn saturate_to_wire(rate: u64) -> u8 {
    rate.min(u8::MAX as u64) as u8
}

/// `scale * (capacity - backlog) / (flow_count * divisor)` heuristic:
/// spare capacity split across flows, with the queue occupancy as penalty.
#[derive(Debug)]
pub struct ProportionalLaw {
    scale: u64,
    divisor: u64,
}

impl ProportionalLaw {
    pub fn new(scale: u64, divisor: u64) -> Self {
        Self {
            scale,
            divisor: divisor.max(1),
        }
    }
}

impl FeedbackController for ProportionalLaw {
    fn feedback_rate(
        &mut self,
        link: &LinkSnapshot,
        _pkt_len: usize,
        _now: Instant,
    ) -> Result<u64, RateError> {
        if link.flow_count == 0 {
            return Err(RateError::ZeroFlowCount);
        }
        if link.capacity <= link.backlog {
            return Ok(0);
        }
        let spare = link.capacity - link.backlog;
        let rate = self.scale * spare / (link.flow_count as u64 * self.divisor);
        Ok(rate / 1024)
    }
}

#[derive(Debug)]
struct ControlWindow {
    start: Instant,
    min_backlog: u64,
    bytes_processed: u64,
}

/// XCP-style integral/derivative law.
///
/// The control interval is a polled state machine advanced opportunistically
/// on each dequeue rather than by a timer; the resulting sampling jitter
/// matches the original behavior. Within an interval the law tracks the
/// minimum backlog seen and the bytes it processed; at a boundary those
/// become the persistent-queue and incoming-rate estimates.
#[derive(Debug)]
pub struct XcpLaw {
    alpha: i64,
    beta: i64,
    interval: Duration,
    window: Option<ControlWindow>,
    persistent_queue: u64,
    incoming_rate: u64,
}

impl XcpLaw {
    pub fn new(alpha: i64, beta: i64, interval: Duration) -> Self {
        Self {
            alpha,
            beta,
            interval: interval.max(Duration::from_millis(1)),
            window: None,
            persistent_queue: 0,
            incoming_rate: 0,
        }
    }

    fn roll_window(&mut self, link: &LinkSnapshot, now: Instant) {
        let window = self.window.get_or_insert_with(|| ControlWindow {
            start: now,
            min_backlog: link.backlog,
            bytes_processed: 0,
        });

        let elapsed = now.saturating_duration_since(window.start);
        if elapsed >= self.interval {
            self.persistent_queue = window.min_backlog;
            let elapsed_ms = (elapsed.as_millis() as u64).max(1);
            self.incoming_rate = window.bytes_processed * 1000 / elapsed_ms;
            *window = ControlWindow {
                start: now,
                min_backlog: link.backlog,
                bytes_processed: 0,
            };
        }
    }
}

impl FeedbackController for XcpLaw {
    fn feedback_rate(
        &mut self,
        link: &LinkSnapshot,
        pkt_len: usize,
        now: Instant,
    ) -> Result<u64, RateError> {
        if link.flow_count == 0 {
            return Err(RateError::ZeroFlowCount);
        }

        self.roll_window(link, now);
        if let Some(window) = self.window.as_mut() {
            window.min_backlog = window.min_backlog.min(link.backlog);
            window.bytes_processed += pkt_len as u64;
        }

        let spare = link.capacity as i64 - self.incoming_rate as i64;
        let delta =
            self.alpha * spare / 10 - self.beta * self.persistent_queue as i64 / 1000;
        // a negative budget clamps to zero before the per-flow division
        let budget = (link.capacity as i64 + delta).max(0) as u64;
        Ok(budget / link.flow_count as u64 / 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(capacity: u64, backlog: u64, flow_count: usize) -> LinkSnapshot {
        LinkSnapshot {
            capacity,
            backlog,
            flow_count,
        }
    }

    #[test]
    fn test_proportional_monotone_in_backlog() {
        let mut law = ProportionalLaw::new(12, 10);
        let now = Instant::now();
        let mut last = u64::MAX;
        for backlog in [0u64, 10_000, 100_000, 500_000, 1_250_000] {
            let rate = law
                .feedback_rate(&link(1_250_000, backlog, 2), 1500, now)
                .unwrap();
            assert!(rate <= last);
            last = rate;
        }
        // fully backlogged link yields zero
        assert_eq!(last, 0);
    }

    #[test]
    fn test_proportional_known_value() {
        let mut law = ProportionalLaw::new(12, 10);
        // 12 * 10240 / (1 * 10) / 1024 = 12
        let rate = law
            .feedback_rate(&link(10_240, 0, 1), 1500, Instant::now())
            .unwrap();
        assert_eq!(rate, 12);
    }

    #[test]
    fn test_zero_flow_count_is_guarded() {
        let now = Instant::now();
        let mut prop = ProportionalLaw::new(12, 10);
        assert_eq!(
            prop.feedback_rate(&link(10_240, 0, 0), 1500, now),
            Err(RateError::ZeroFlowCount)
        );
        let mut xcp = XcpLaw::new(4, 226, Duration::from_millis(140));
        assert_eq!(
            xcp.feedback_rate(&link(10_240, 0, 0), 1500, now),
            Err(RateError::ZeroFlowCount)
        );
    }

    #[test]
    fn test_wire_saturates_instead_of_wrapping() {
        assert_eq!(saturate_to_wire(0), 0);
        assert_eq!(saturate_to_wire(255), 255);
        assert_eq!(saturate_to_wire(7_000), 255);
    }

    #[test]
    fn test_xcp_window_boundary_updates_estimates() {
        let mut law = XcpLaw::new(4, 226, Duration::from_millis(140));
        let start = Instant::now();
        let capacity = 1_024_000u64;

        // first interval: estimates still zero, rate = (C + 0.4*C)/flows
        let rate = law
            .feedback_rate(&link(capacity, 50_000, 2), 1000, start)
            .unwrap();
        let expected = (capacity + 4 * capacity / 10) / 2 / 1024;
        assert_eq!(rate, expected);

        // accumulate bytes inside the window
        for i in 1..10 {
            law.feedback_rate(
                &link(capacity, 50_000, 2),
                1000,
                start + Duration::from_millis(i * 10),
            )
            .unwrap();
        }

        // crossing the boundary publishes the window's estimates
        law.feedback_rate(
            &link(capacity, 40_000, 2),
            1000,
            start + Duration::from_millis(150),
        )
        .unwrap();
        assert_eq!(law.persistent_queue, 50_000);
        // 10 packets of 1000 bytes over 150 ms
        assert_eq!(law.incoming_rate, 10_000 * 1000 / 150);
    }

    #[test]
    fn test_xcp_negative_budget_clamps_to_zero() {
        let mut law = XcpLaw::new(4, 226, Duration::from_millis(140));
        // force a huge persistent queue so the delta swamps capacity
        law.persistent_queue = 50_000_000;
        law.window = Some(ControlWindow {
            start: Instant::now(),
            min_backlog: 0,
            bytes_processed: 0,
        });
        let rate = law
            .feedback_rate(&link(1_024, 0, 1), 1000, Instant::now())
            .unwrap();
        assert_eq!(rate, 0);
    }

    #[test]
    fn test_controller_for_matches_config() {
        let prop = controller_for(&MfConfig::default());
        assert!(format!("{prop:?}").contains("ProportionalLaw"));
        let xcp = controller_for(
            &crate::config::MfConfig::builder()
                .control_law(ControlLaw::Xcp)
                .build(),
        );
        assert!(format!("{xcp:?}").contains("XcpLaw"));
    }
}
