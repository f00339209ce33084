use std::net::Ipv4Addr;
use std::ops::Range;

use bytes::{BufMut, BytesMut};

/// Length of a TCP header without options.
pub const TCP_HDR_LEN: usize = 20;

/// Flow identity: the (source, destination) address pair a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl FlowKey {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self { src, dst }
    }
}

/// Single-owner handle over one packet's bytes.
///
/// The packet moves into `enqueue` and back out of `dequeue`; no second
/// reference exists while the feedback byte is rewritten in place, so the
/// mutation window is exclusive by construction.
#[derive(Debug)]
pub struct Packet {
    flow: FlowKey,
    buf: BytesMut,
    tcp: bool,
}

impl Packet {
    /// Builds a minimal TCP segment: a 20-byte header with the data-offset
    /// nibble set, `options` padded to a 4-byte boundary with end-of-list
    /// bytes, and a zeroed payload of `payload_len` bytes.
    ///
    /// Panics if the padded options exceed the 40 bytes a TCP header can
    /// carry.
    pub fn tcp_segment(flow: FlowKey, options: &[u8], payload_len: usize) -> Self {
        let padded = (options.len() + 3) & !3;
        let doff_words = 5 + padded / 4;
        assert!(doff_words <= 15, "options area larger than 40 bytes");

        let mut buf = BytesMut::with_capacity(TCP_HDR_LEN + padded + payload_len);
        buf.put_bytes(0, TCP_HDR_LEN);
        buf[12] = (doff_words as u8) << 4;
        buf.put_slice(options);
        buf.put_bytes(0, padded - options.len());
        buf.put_bytes(0, payload_len);

        Self { flow, buf, tcp: true }
    }

    /// Builds a non-TCP packet of `len` bytes. The dequeue path passes these
    /// through without touching their contents.
    pub fn opaque(flow: FlowKey, len: usize) -> Self {
        let mut buf = BytesMut::with_capacity(len);
        buf.put_bytes(0, len);
        Self { flow, buf, tcp: false }
    }

    pub fn flow(&self) -> FlowKey {
        self.flow
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_tcp(&self) -> bool {
        self.tcp
    }

    /// Options area, recomputed from the data-offset nibble
    /// (`doff * 4 - 20`). `None` for non-TCP packets or a header whose
    /// declared length does not fit the buffer.
    pub fn tcp_options(&self) -> Option<&[u8]> {
        let range = self.options_range()?;
        Some(&self.buf[range])
    }

    /// Mutable view of the options area for the in-place feedback rewrite.
    pub fn tcp_options_mut(&mut self) -> Option<&mut [u8]> {
        let range = self.options_range()?;
        Some(&mut self.buf[range])
    }

    fn options_range(&self) -> Option<Range<usize>> {
        if !self.tcp || self.buf.len() < TCP_HDR_LEN {
            return None;
        }
        let header_len = usize::from(self.buf[12] >> 4) * 4;
        if header_len < TCP_HDR_LEN || header_len > self.buf.len() {
            return None;
        }
        Some(TCP_HDR_LEN..header_len)
    }
}
