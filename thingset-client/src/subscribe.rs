/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Client-side report subscription (§4.6, §2 "Clients mirror"): read an already-reassembled
//! report body off a [`ReportTransport`] (the UDP subscriber in `thingset-ip` and the CAN report
//! receiver in `thingset-can` both hand this crate a complete body, never raw frames — the
//! fragmenting transport owns reassembly, per §4.3), decode its top-level CBOR map, and look each
//! entry's key up in the caller's registry to decode straight into the matching node.

use thingset_core::registry::Registry;
use thingset_error::TransportError;
use thingset_wire::binary::streaming::StreamingDecoder;
use thingset_wire::{MapKey, ValueDecoder};

/// Default chunk size report bodies are decoded through once reassembled. Matches the chunk used
/// by both publishing transports (`thingset-can::report::CHUNK` is 8; `thingset-ip` frames are
/// larger) — since the body is already fully buffered by the time it reaches this crate, the
/// choice only affects internal lookahead granularity, not wire compatibility.
const DECODE_CHUNK: usize = 64;

/// A source of already-reassembled report bodies. `Ok(None)` means "no report ready yet, try
/// again" (a non-blocking poll) or "this datagram/frame was a fragment, not a complete message"
/// — the same shape `thingset_core::fragment::Reassembler::on_frame` and
/// `thingset_ip::udp::Subscriber::recv` already return.
pub trait ReportTransport {
    fn recv_report(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// One report once decoded: the raw node IDs present and, for each, whether decoding into the
/// matching registered node succeeded. Nodes absent from the registry are counted but not
/// treated as an error — a client only ever knows a subset of a server's namespace.
#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub decoded: Vec<u16>,
    pub unknown: Vec<u16>,
}

/// Drives one [`ReportTransport`] against a [`Registry`] the caller owns. Kept as a thin struct
/// rather than a free function so a caller can hold one per subscription without re-threading a
/// transport reference through every call.
pub struct Subscription<T: ReportTransport> {
    transport: T,
}

impl<T: ReportTransport> Subscription<T> {
    pub fn new(transport: T) -> Self {
        Subscription { transport }
    }

    /// Polls the transport once. Returns `Ok(None)` if nothing completed this call (no data
    /// ready, or the frame received was an interior fragment); `Ok(Some(outcome))` once a report
    /// body decodes.
    pub fn poll(&mut self, registry: &mut Registry) -> Result<Option<ReportOutcome>, thingset_wire::WireError> {
        let body = match self.transport.recv_report() {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(None),
            Err(_) => return Ok(None),
        };
        let mut dec = StreamingDecoder::<DECODE_CHUNK>::over_complete_buffer(body);
        let mut outcome = ReportOutcome::default();
        dec.decode_map(&mut |d, key| {
            let id = match key {
                MapKey::Id(id) => id,
                MapKey::Name(name) => {
                    // A report keyed by name rather than ID is legal (§2(b) symmetric key
                    // naming) but this client only resolves by ID; skip without failing the
                    // whole report.
                    let _ = name;
                    d.skip()?;
                    return Ok(true);
                }
            };
            match registry.get_mut(id) {
                Some(node) if node.capabilities().decodable => {
                    node.decode_value(d)?;
                    outcome.decoded.push(id);
                }
                _ => {
                    d.skip()?;
                    outcome.unknown.push(id);
                }
            }
            Ok(true)
        })?;
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use thingset_core::access::Access;
    use thingset_core::node::{Node, NodeKind};
    use thingset_core::registry::ROOT_ID;
    use thingset_wire::binary::streaming::StreamingEncoder;
    use thingset_wire::ValueEncoder;

    struct Voltage(f32);
    impl Node for Voltage {
        fn id(&self) -> u16 {
            0x300
        }
        fn parent_id(&self) -> u16 {
            ROOT_ID
        }
        fn name(&self) -> &str {
            "voltage"
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Property
        }
        fn access(&self) -> Access {
            Access::READ_WRITE
        }
        fn encode_value(&self, enc: &mut dyn ValueEncoder) -> thingset_wire::Result<()> {
            enc.encode_f32(self.0)
        }
        fn decode_value(&mut self, dec: &mut dyn ValueDecoder) -> thingset_wire::Result<()> {
            self.0 = dec.decode_f32()?;
            Ok(())
        }
    }

    struct QueueTransport(VecDeque<Vec<u8>>);
    impl ReportTransport for QueueTransport {
        fn recv_report(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.0.pop_front())
        }
    }

    fn encode_report(id: u16, value: f32) -> Vec<u8> {
        let mut body = Vec::new();
        let mut write = |chunk: &[u8], _final: bool| -> thingset_wire::Result<()> {
            body.extend_from_slice(chunk);
            Ok(())
        };
        let mut enc = StreamingEncoder::<64>::new(&mut write);
        enc.start_map(Some(1)).unwrap();
        enc.encode_u64(id as u64).unwrap();
        enc.encode_f32(value).unwrap();
        enc.end_map().unwrap();
        enc.flush().unwrap();
        body
    }

    #[test]
    fn decodes_a_known_node_and_updates_it() {
        let mut registry = Registry::new();
        registry.register(Box::new(Voltage(0.0))).unwrap();
        let mut sub = Subscription::new(QueueTransport(VecDeque::from([encode_report(0x300, 24.0)])));

        let outcome = sub.poll(&mut registry).unwrap().unwrap();
        assert_eq!(outcome.decoded, vec![0x300]);
        assert!(outcome.unknown.is_empty());

        let node = registry.get(0x300).unwrap();
        let mut buf = [0u8; 8];
        let mut enc = thingset_wire::binary::BinaryEncoder::new(&mut buf);
        node.encode_value(&mut enc).unwrap();
        let mut dec = thingset_wire::binary::BinaryDecoder::new(&buf);
        assert_eq!(dec.decode_f32().unwrap(), 24.0);
    }

    #[test]
    fn unknown_node_id_is_skipped_not_an_error() {
        let mut registry = Registry::new();
        let mut sub = Subscription::new(QueueTransport(VecDeque::from([encode_report(0x999, 1.0)])));
        let outcome = sub.poll(&mut registry).unwrap().unwrap();
        assert_eq!(outcome.unknown, vec![0x999]);
    }

    #[test]
    fn no_report_ready_returns_none() {
        let mut registry = Registry::new();
        let mut sub = Subscription::new(QueueTransport(VecDeque::new()));
        assert!(sub.poll(&mut registry).unwrap().is_none());
    }
}
