/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! UDP broadcast report transport (§4.5): publishing binds an ephemeral local port and sends each
//! datagram to `(broadcast address, 9002)`; subscribing binds port 9002 itself with
//! `SO_REUSEADDR` so several subscribers can coexist, and feeds received datagrams into the
//! shared multi-frame reassembly from [`thingset_core::fragment`].
//!
//! Per §4.5, each datagram's first byte is `(message_type << 4) | (sequence & 0x0F)` and the
//! second is the `report` verb byte (0x1F); the rest is the CBOR (or fragment of CBOR) body.

use std::net::{SocketAddr, UdpSocket};

use thingset_core::fragment::{FrameKind, Reassembler};
use thingset_core::verb::Verb;
use thingset_error::TransportError;

/// Default ThingSet UDP broadcast publish/subscribe port (§6.5).
pub const DEFAULT_PORT: u16 = 9002;

const MESSAGE_TYPE_SHIFT: u8 = 4;

/// Position of one datagram within a (possibly single-datagram) logical report, matching the
/// CAN multi-frame-type encoding (§4.3) reused here for the first header byte's high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramKind {
    Single,
    First,
    Consecutive,
    Last,
}

impl DatagramKind {
    const fn bits(self) -> u8 {
        match self {
            DatagramKind::First => 0b00,
            DatagramKind::Consecutive => 0b01,
            DatagramKind::Last => 0b10,
            DatagramKind::Single => 0b11,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => DatagramKind::First,
            0b01 => DatagramKind::Consecutive,
            0b10 => DatagramKind::Last,
            _ => DatagramKind::Single,
        }
    }

    fn as_frame_kind(self) -> FrameKind {
        match self {
            DatagramKind::Single => FrameKind::Single,
            DatagramKind::First => FrameKind::First,
            DatagramKind::Consecutive => FrameKind::Consecutive,
            DatagramKind::Last => FrameKind::Last,
        }
    }
}

/// A bound publish socket: binds an ephemeral local port, enables broadcast, and always sends
/// to `(broadcast_addr, 9002)`.
pub struct Publisher {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
}

impl Publisher {
    pub fn bind(local_addr: SocketAddr, broadcast_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local_addr)?;
        socket.set_broadcast(true)?;
        Ok(Publisher { socket, broadcast_addr })
    }

    /// Sends one datagram whose body is a complete report or one fragment of a multi-datagram
    /// report, prefixing the two-byte header described above.
    pub fn send(&self, kind: DatagramKind, sequence: u8, body: &[u8]) -> Result<(), TransportError> {
        let mut datagram = Vec::with_capacity(2 + body.len());
        datagram.push((kind.bits() << MESSAGE_TYPE_SHIFT) | (sequence & 0x0F));
        datagram.push(Verb::Report.binary_byte());
        datagram.extend_from_slice(body);
        self.socket.send_to(&datagram, self.broadcast_addr).map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }
}

/// A bound subscribe socket with its own reassembly state, keyed by sending peer.
pub struct Subscriber {
    socket: UdpSocket,
    reassembler: Reassembler<SocketAddr>,
}

impl Subscriber {
    /// Binds `port` on every interface with `SO_REUSEADDR` (§4.5 "so multiple subscribers can
    /// coexist"). `std::net::UdpSocket` does not expose `SO_REUSEADDR` directly; callers needing
    /// strict multi-subscriber coexistence on one host should construct the socket with the
    /// `socket2` crate and hand it to [`Subscriber::from_socket`] instead.
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        Ok(Subscriber { socket, reassembler: Reassembler::new() })
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Subscriber { socket, reassembler: Reassembler::new() }
    }

    /// Blocks for the next datagram and feeds it into reassembly. Returns `Some(body)` once a
    /// report completes; `None` for a fragment that is not yet the last one, or for a datagram
    /// whose verb byte is not `report` (ignored as not ours).
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = [0u8; 2048];
        let (n, peer) = self.socket.recv_from(&mut buf).map_err(|e| TransportError::Io(e.to_string()))?;
        if n < 2 {
            return Ok(None);
        }
        if buf[1] != Verb::Report.binary_byte() {
            return Ok(None);
        }
        let kind = DatagramKind::from_bits(buf[0] >> MESSAGE_TYPE_SHIFT);
        let sequence = buf[0] & 0x0F;
        Ok(self.reassembler.on_frame(peer, kind.as_frame_kind(), sequence, &buf[2..n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_subscribe_round_trip_a_single_datagram_report() {
        let mut sub = Subscriber::bind(0).unwrap();
        let sub_port = sub.socket.local_addr().unwrap().port();

        let publisher = Publisher::bind("127.0.0.1:0".parse().unwrap(), format!("127.0.0.1:{sub_port}").parse().unwrap()).unwrap();
        publisher.send(DatagramKind::Single, 0, b"\xf6\xfa\x00\x00\x00\x00").unwrap();

        let body = sub.recv().unwrap();
        assert_eq!(body.as_deref(), Some(&b"\xf6\xfa\x00\x00\x00\x00"[..]));
    }

    #[test]
    fn multi_datagram_report_reassembles_in_order() {
        let mut sub = Subscriber::bind(0).unwrap();
        let sub_port = sub.socket.local_addr().unwrap().port();
        let publisher = Publisher::bind("127.0.0.1:0".parse().unwrap(), format!("127.0.0.1:{sub_port}").parse().unwrap()).unwrap();

        publisher.send(DatagramKind::First, 0, b"ab").unwrap();
        assert_eq!(sub.recv().unwrap(), None);
        publisher.send(DatagramKind::Consecutive, 1, b"cd").unwrap();
        assert_eq!(sub.recv().unwrap(), None);
        publisher.send(DatagramKind::Last, 2, b"ef").unwrap();
        assert_eq!(sub.recv().unwrap().as_deref(), Some(&b"abcdef"[..]));
    }
}
