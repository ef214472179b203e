/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The server facade (§4.7): wires a shared [`Registry`]/[`RequestEngine`] pair to however many
//! transports a deployment listens on, and implements `publish(nodes…)` / `publish(subset)` once
//! so `thingset-can`'s report path and `thingset-ip`'s UDP broadcast path share the same map-
//! encoding logic and differ only in how they turn a stream of chunks into frames on the wire
//! (§5: "the transport provides a fresh encoder per publish call").
//!
//! This crate owns none of the actual I/O — a transport's `listen(callback)` wraps
//! [`Server::handle_request`]/[`Server::handle_text_request`], and its publish path supplies the
//! `write(chunk, is_final)` callback [`Server::publish`] drives.

use std::sync::{Arc, Mutex};

use thingset_core::engine::RequestEngine;
use thingset_core::registry::Registry;
use thingset_core::subset::Subset;
use thingset_wire::binary::streaming::StreamingEncoder;
use thingset_wire::{MapKey, ValueEncoder, WireError};

/// Failure building a published report: either the map encoding itself failed (buffer-full in a
/// fixed sink, or a node's `encode_value` erroring) or the underlying transport's chunk sink
/// rejected a write.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("report encoding failed: {0}")]
    Wire(#[from] WireError),
}

/// A registry plus the request engine dispatching against it, shared across every transport a
/// deployment listens on (§4.7, §5 "the registry is process-wide state ... safe to interleave
/// with request handling").
pub struct Server {
    engine: RequestEngine,
    registry: Arc<Mutex<Registry>>,
}

impl Server {
    pub fn new(engine: RequestEngine, registry: Arc<Mutex<Registry>>) -> Self {
        Server { engine, registry }
    }

    /// The shared registry, for a caller that needs to register nodes or read `nodes_in_subset`
    /// outside of a publish call.
    pub fn registry(&self) -> &Arc<Mutex<Registry>> {
        &self.registry
    }

    /// Dispatches one binary request (§4.2). Transports call this from their own
    /// accept/read loop; see `thingset_ip::tcp::serve` and `thingset_can::transport::RequestChannel`
    /// for the two shipped examples.
    pub fn handle_request(&self, request: &[u8], response: &mut [u8]) -> usize {
        let mut registry = self.registry.lock().expect("registry mutex poisoned");
        self.engine.dispatch_binary(&mut registry, request, response)
    }

    /// Dispatches one text-mode request (§4.2, §6.2 ASCII verbs).
    pub fn handle_text_request(&self, request: &str, response: &mut [u8]) -> usize {
        let mut registry = self.registry.lock().expect("registry mutex poisoned");
        self.engine.dispatch_text(&mut registry, request, response)
    }

    /// Publishes an explicit list of nodes (§4.7 `publish(nodes…)`): encodes a CBOR map keyed by
    /// node ID with each value from [`thingset_core::node::Node::encode_value`], driving `write`
    /// as the streaming encoder's buffer fills. `CHUNK` is the transport's frame payload size (8
    /// for classic CAN, larger for a UDP datagram) — the same const-generic knob
    /// `thingset_wire::binary::streaming::StreamingEncoder` already takes. Nodes not present in
    /// the registry, or without the `encodable` capability, are silently omitted — a stale ID in
    /// a caller-supplied publish list is not a protocol error.
    pub fn publish<const CHUNK: usize>(&self, ids: &[u16], write: &mut dyn FnMut(&[u8], bool) -> thingset_wire::Result<()>) -> Result<(), ServerError> {
        let registry = self.registry.lock().expect("registry mutex poisoned");
        let publishable: Vec<u16> = ids.iter().copied().filter(|id| registry.get(*id).map(|n| n.capabilities().encodable).unwrap_or(false)).collect();
        let mut enc = StreamingEncoder::<CHUNK>::new(write);
        enc.start_map(Some(publishable.len()))?;
        for id in publishable {
            if let Some(node) = registry.get(id) {
                enc.encode_key(MapKey::Id(id))?;
                node.encode_value(&mut enc)?;
            }
        }
        enc.end_map()?;
        enc.flush()?;
        Ok(())
    }

    /// Publishes every node carrying every bit of `subset` (§3.4, §4.7 `publish(subset)`), e.g.
    /// the periodic `Subset::LIVE` report.
    pub fn publish_subset<const CHUNK: usize>(&self, subset: Subset, write: &mut dyn FnMut(&[u8], bool) -> thingset_wire::Result<()>) -> Result<(), ServerError> {
        let registry = self.registry.lock().expect("registry mutex poisoned");
        let matching: Vec<u16> = registry.nodes_in_subset(subset).filter(|n| n.capabilities().encodable).map(|n| n.id()).collect();
        let mut enc = StreamingEncoder::<CHUNK>::new(write);
        enc.start_map(Some(matching.len()))?;
        for id in matching {
            if let Some(node) = registry.get(id) {
                enc.encode_key(MapKey::Id(id))?;
                node.encode_value(&mut enc)?;
            }
        }
        enc.end_map()?;
        enc.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingset_core::access::{Access, RoleSet};
    use thingset_core::node::{Node, NodeKind};
    use thingset_core::registry::ROOT_ID;
    use thingset_wire::binary::streaming::StreamingDecoder;
    use thingset_wire::ValueDecoder;

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
        fn subset(&self) -> Subset {
            Subset::LIVE
        }
        fn encode_value(&self, enc: &mut dyn ValueEncoder) -> thingset_wire::Result<()> {
            enc.encode_f32(self.0)
        }
    }

    fn server_with_voltage() -> Server {
        let mut registry = Registry::new();
        registry.register(Box::new(Voltage(24.0))).unwrap();
        Server::new(RequestEngine::new(RoleSet::ALL), Arc::new(Mutex::new(registry)))
    }

    #[test]
    fn handle_request_dispatches_against_the_shared_registry() {
        let server = server_with_voltage();
        let mut response = [0u8; 32];
        let request = [0x01u8, 0x19, 0x03, 0x00]; // get id=0x300
        let len = server.handle_request(&request, &mut response);
        assert_eq!(response[0], thingset_error::Status::Content.code());
        let _ = len;
    }

    #[test]
    fn publish_emits_a_map_keyed_by_node_id() {
        let server = server_with_voltage();
        let mut body = Vec::new();
        let mut write = |chunk: &[u8], _final: bool| -> thingset_wire::Result<()> {
            body.extend_from_slice(chunk);
            Ok(())
        };
        server.publish::<64>(&[0x300], &mut write).unwrap();

        let mut dec = StreamingDecoder::<64>::over_complete_buffer(body);
        dec.decode_map(&mut |d, key| {
            assert_eq!(key.as_id(), Some(0x300));
            assert_eq!(d.decode_f32().unwrap(), 24.0);
            Ok(true)
        })
        .unwrap();
    }

    #[test]
    fn publish_subset_only_includes_matching_nodes() {
        let server = server_with_voltage();
        let mut body = Vec::new();
        let mut write = |chunk: &[u8], _final: bool| -> thingset_wire::Result<()> {
            body.extend_from_slice(chunk);
            Ok(())
        };
        server.publish_subset::<64>(Subset::PERSISTED, &mut write).unwrap();

        let mut dec = StreamingDecoder::<64>::over_complete_buffer(body);
        let mut count = 0;
        dec.decode_map(&mut |_, _| {
            count += 1;
            Ok(true)
        })
        .unwrap();
        assert_eq!(count, 0);
    }
}
