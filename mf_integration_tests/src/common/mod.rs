// Common test utilities for integration tests
#![allow(dead_code)]

use std::net::Ipv4Addr;

use mf_core::{FlowKey, MfCookie, Packet};

/// Flow inside the default monitored network (10.0.0.0/8), distinguished by
/// the last destination octet.
pub fn monitored_flow(last: u8) -> FlowKey {
    FlowKey::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 1, last))
}

/// Flow whose destination is outside the monitored network.
pub fn unmonitored_flow() -> FlowKey {
    FlowKey::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(192, 168, 0, 1))
}

/// TCP segment carrying a fresh MF option and a payload of `payload_len`
/// bytes.
pub fn mf_segment(flow: FlowKey, payload_len: usize) -> Packet {
    let options = MfCookie {
        requested: 10,
        current: 5,
        feedback: 0,
        prop_delay: 3,
    }
    .encode();
    Packet::tcp_segment(flow, &options, payload_len)
}
