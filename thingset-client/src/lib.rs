/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The typed client facade (§4.6): `get`/`fetch`/`update`/`exec`/`subscribe` built once against a
//! [`ClientTransport`] trait object, so the same call sites serve a TCP connection
//! (`thingset-ip::tcp`), an ISO-TP-backed CAN request channel (`thingset-can::transport`), or a
//! test double, without this crate depending on either transport crate.
//!
//! Every RPC here follows the same shape: write the verb byte, encode the endpoint, encode the
//! payload, hand the buffer to the transport, then validate the response the way §4.6 specifies —
//! the status byte must be one of the four success codes and the following byte must be CBOR
//! `null` — before decoding the remainder into the caller's destination.

use thingset_error::{Status, TransportError};
use thingset_wire::binary::{BinaryDecoder, BinaryEncoder};
use thingset_wire::{MapKey, ValueDecoder, ValueEncoder, WireError, WireValue};

use thingset_core::verb::Verb;

pub mod subscribe;

pub use subscribe::{ReportTransport, Subscription};

/// An endpoint a request targets: either a node's 16-bit ID or a `/`-delimited path, mirroring
/// the symmetric key naming §2(b) describes for the wire itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Id(u16),
    Path(String),
}

impl From<u16> for Endpoint {
    fn from(id: u16) -> Self {
        Endpoint::Id(id)
    }
}

impl From<&str> for Endpoint {
    fn from(path: &str) -> Self {
        Endpoint::Path(path.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(path: String) -> Self {
        Endpoint::Path(path)
    }
}

/// A blocking client-side transport: hands a request buffer to the peer and returns its
/// response buffer. `thingset-ip`'s TCP stream and `thingset-can`'s ISO-TP request channel both
/// satisfy this with their existing blocking `call`-shaped methods; this crate never constructs a
/// socket or CAN interface itself (§4.6: "over any client transport").
pub trait ClientTransport {
    fn call(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Failure surfaced to a client caller: either the transport failed outright, the response could
/// not be decoded, or the peer answered with a non-success [`Status`] (§7: "the client surfaces
/// non-success statuses to the caller as a typed result carrying the status code").
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    Wire(#[from] WireError),
    #[error("request failed with status {0:?}")]
    Status(Status),
    #[error("response too short to carry a status byte")]
    EmptyResponse,
}

const REQUEST_BUF_LEN: usize = 512;

/// A typed client over one blocking [`ClientTransport`].
pub struct Client<T: ClientTransport> {
    transport: T,
}

impl<T: ClientTransport> Client<T> {
    pub fn new(transport: T) -> Self {
        Client { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn call(&mut self, verb: Verb, endpoint: &Endpoint, encode_payload: impl FnOnce(&mut dyn ValueEncoder) -> thingset_wire::Result<()>) -> Result<Vec<u8>, ClientError> {
        let mut buf = vec![0u8; REQUEST_BUF_LEN];
        buf[0] = verb.binary_byte();
        let len = {
            let mut enc = BinaryEncoder::new(&mut buf[1..]);
            encode_endpoint(&mut enc, endpoint)?;
            encode_payload(&mut enc)?;
            enc.len()
        };
        buf.truncate(1 + len);
        let response = self.transport.call(&buf)?;
        validate_response(&response)?;
        Ok(response)
    }

    /// GET (§4.2, §4.6): fetches `endpoint`'s current value and decodes it as `V`.
    pub fn get<V: WireValue>(&mut self, endpoint: impl Into<Endpoint>) -> Result<V, ClientError> {
        let endpoint = endpoint.into();
        let response = self.call(Verb::Get, &endpoint, |_| Ok(()))?;
        let mut dec = BinaryDecoder::new(&response[2..]);
        Ok(V::decode(&mut dec)?)
    }

    /// FETCH with an explicit child list (§4.2): requests `children` of `endpoint` and decodes
    /// each in order via `decode_each`, which is handed the response decoder positioned at the
    /// start of each list element.
    pub fn fetch_children(&mut self, endpoint: impl Into<Endpoint>, children: &[Endpoint], mut decode_each: impl FnMut(&mut dyn ValueDecoder) -> thingset_wire::Result<()>) -> Result<(), ClientError> {
        let endpoint = endpoint.into();
        let response = self.call(Verb::Fetch, &endpoint, |enc| {
            enc.start_array(Some(children.len()))?;
            for child in children {
                encode_endpoint(enc, child)?;
            }
            enc.end_array()
        })?;
        let mut dec = BinaryDecoder::new(&response[2..]);
        dec.decode_list(&mut |d| {
            decode_each(d)?;
            Ok(true)
        })?;
        Ok(())
    }

    /// UPDATE (§4.2, §4.6): writes a single-entry map `{endpoint_key: value}` at the parent group
    /// named by `group`, keyed by `child`.
    pub fn update<V: WireValue>(&mut self, group: impl Into<Endpoint>, child: MapKey<'_>, value: &V) -> Result<(), ClientError> {
        let group = group.into();
        self.call(Verb::Update, &group, |enc| {
            enc.start_map(Some(1))?;
            enc.encode_key(child)?;
            value.encode(enc)?;
            enc.end_map()
        })?;
        Ok(())
    }

    /// EXEC (§4.2, §4.6): invokes the function at `endpoint` with `encode_args` writing the
    /// argument list, decoding the return value (or `null` for a void function) with `decode_ret`.
    pub fn exec(
        &mut self,
        endpoint: impl Into<Endpoint>,
        encode_args: impl FnOnce(&mut dyn ValueEncoder) -> thingset_wire::Result<()>,
        decode_ret: impl FnOnce(&mut dyn ValueDecoder) -> thingset_wire::Result<()>,
    ) -> Result<(), ClientError> {
        let endpoint = endpoint.into();
        let response = self.call(Verb::Exec, &endpoint, encode_args)?;
        let mut dec = BinaryDecoder::new(&response[2..]);
        decode_ret(&mut dec)?;
        Ok(())
    }
}

fn encode_endpoint(enc: &mut dyn ValueEncoder, endpoint: &Endpoint) -> thingset_wire::Result<()> {
    match endpoint {
        Endpoint::Id(id) => enc.encode_u64(*id as u64),
        Endpoint::Path(path) => enc.encode_str(path),
    }
}

/// Validates a response per §4.6: the status byte must be a success code, and the byte that
/// follows must be the CBOR `null` preamble.
fn validate_response(response: &[u8]) -> Result<(), ClientError> {
    let Some(&code) = response.first() else {
        return Err(ClientError::EmptyResponse);
    };
    let status = Status::from_code(code).ok_or(ClientError::EmptyResponse)?;
    if !status.is_success() {
        return Err(ClientError::Status(status));
    }
    if response.len() < 2 {
        return Err(ClientError::EmptyResponse);
    }
    let mut dec = BinaryDecoder::new(&response[1..2]);
    dec.decode_null()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use thingset_core::access::RoleSet;
    use thingset_core::engine::RequestEngine;
    use thingset_core::node::{Capabilities, CustomHandled, Node, NodeKind};
    use thingset_core::registry::{Registry, ROOT_ID};

    /// A client transport wired straight to an in-process engine/registry, standing in for a
    /// real socket the way the engine's own unit tests stand in for a transport.
    struct LoopbackTransport {
        engine: RequestEngine,
        registry: RefCell<Registry>,
    }

    impl ClientTransport for LoopbackTransport {
        fn call(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
            let mut response = vec![0u8; 256];
            let len = self.engine.dispatch_binary(&mut self.registry.borrow_mut(), request, &mut response);
            response.truncate(len);
            Ok(response)
        }
    }

    struct Voltage(f32);
    impl Node for Voltage {
        fn id(&self) -> u16 {
            0x300
        }
        fn parent_id(&self) -> u16 {
            0x200
        }
        fn name(&self) -> &str {
            "voltage"
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Property
        }
        fn access(&self) -> thingset_core::access::Access {
            thingset_core::access::Access::READ_WRITE
        }
        fn encode_value(&self, enc: &mut dyn ValueEncoder) -> thingset_wire::Result<()> {
            enc.encode_f32(self.0)
        }
        fn decode_value(&mut self, dec: &mut dyn ValueDecoder) -> thingset_wire::Result<()> {
            self.0 = dec.decode_f32()?;
            Ok(())
        }
    }

    struct Bms;
    impl Node for Bms {
        fn id(&self) -> u16 {
            0x200
        }
        fn parent_id(&self) -> u16 {
            ROOT_ID
        }
        fn name(&self) -> &str {
            "bms"
        }
        fn kind(&self) -> NodeKind {
            NodeKind::Group
        }
        fn access(&self) -> thingset_core::access::Access {
            thingset_core::access::Access::READ_ONLY
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::for_kind(NodeKind::Group)
        }
        fn handle_request(&mut self, _verb: Verb, _index: Option<usize>, _payload: &mut dyn ValueDecoder, _response: &mut dyn ValueEncoder) -> CustomHandled {
            CustomHandled::NotHandled
        }
    }

    fn loopback() -> LoopbackTransport {
        let mut registry = Registry::new();
        registry.register(Box::new(Bms)).unwrap();
        let mut voltage = Voltage(24.0);
        voltage.0 = 24.0;
        registry.register(Box::new(voltage)).unwrap();
        LoopbackTransport { engine: RequestEngine::new(RoleSet::ALL), registry: RefCell::new(registry) }
    }

    #[test]
    fn get_decodes_the_scalar_value() {
        let mut client = Client::new(loopback());
        let voltage: f32 = client.get(0x300u16).unwrap();
        assert_eq!(voltage, 24.0);
    }

    #[test]
    fn update_then_get_observes_the_new_value() {
        let mut client = Client::new(loopback());
        client.update(0x200u16, MapKey::Name("voltage"), &25.0f32).unwrap();
        let voltage: f32 = client.get(0x300u16).unwrap();
        assert_eq!(voltage, 25.0);
    }

    #[test]
    fn get_on_missing_node_surfaces_not_found() {
        let mut client = Client::new(loopback());
        let err = client.get::<f32>(0xFFFFu16).unwrap_err();
        assert!(matches!(err, ClientError::Status(Status::NotFound)));
    }
}
