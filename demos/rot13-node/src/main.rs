/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in
 * thingset-error/src/lib.rs.
 **************************************************************************************************/
//! A minimal demonstration ThingSet node: a single group exposing a ROT13 "encryption" function
//! and an invocation counter, served over TCP (§4.5 port 9001) and periodically published over
//! UDP broadcast (§4.5 port 9002, §3.4 `Subset::LIVE`).
//!
//! Run two copies on different hosts (or `127.0.0.1` with distinct `--tcp-port`s) to see a
//! client's `thingset-client` facade talk to this node, or just `nc localhost 9001` and send a
//! raw binary request by hand.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thingset_core::access::{Access, RoleSet};
use thingset_core::engine::RequestEngine;
use thingset_core::node::{Node, NodeKind};
use thingset_core::registry::{Registry, ROOT_ID};
use thingset_core::subset::Subset;
use thingset_core::verb::Verb;
use thingset_error::Status;
use thingset_ip::tcp::{self, Framing};
use thingset_ip::udp::{DatagramKind, Publisher};
use thingset_server::Server;
use thingset_wire::{Result as WireResult, ValueDecoder, ValueEncoder};

const ROT13_GROUP_ID: u16 = 0x0100;
const ROT13_ROTATE_ID: u16 = 0x0101;
const ROT13_COUNT_ID: u16 = 0x0102;

fn rot13_char(c: char) -> char {
    let base = if c.is_ascii_lowercase() {
        b'a'
    } else if c.is_ascii_uppercase() {
        b'A'
    } else {
        return c;
    };
    let offset = (c as u8 - base + 13) % 26;
    (base + offset) as char
}

struct Rot13Group;

impl Node for Rot13Group {
    fn id(&self) -> u16 {
        ROT13_GROUP_ID
    }
    fn parent_id(&self) -> u16 {
        ROOT_ID
    }
    fn name(&self) -> &str {
        "rot13"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Group
    }
    fn access(&self) -> Access {
        Access::READ_ONLY
    }
}

/// EXEC target: decodes a single-element argument list `[tstr]`, transforms it, and encodes the
/// result as the return value (§4.2 "decode argument list ... encode the return value").
struct Rot13Function {
    invocations: Arc<AtomicU32>,
}

impl Node for Rot13Function {
    fn id(&self) -> u16 {
        ROT13_ROTATE_ID
    }
    fn parent_id(&self) -> u16 {
        ROT13_GROUP_ID
    }
    fn name(&self) -> &str {
        "rotate"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Function
    }
    fn access(&self) -> Access {
        Access::READ_WRITE
    }

    fn invoke(&mut self, args: &mut dyn ValueDecoder, ret: &mut dyn ValueEncoder) -> Result<(), Status> {
        let mut input = String::new();
        let mut saw_arg = false;
        args.decode_list(&mut |d| {
            let mut s = String::new();
            d.decode_str(&mut |chunk| {
                s.push_str(chunk);
                Ok(())
            })?;
            input = s;
            saw_arg = true;
            Ok(false) // this function takes exactly one argument; stop after the first.
        })
        .map_err(|_| Status::BadRequest)?;
        if !saw_arg {
            return Err(Status::BadRequest);
        }

        self.invocations.fetch_add(1, Ordering::Relaxed);
        let rotated: String = input.chars().map(rot13_char).collect();
        ret.encode_str(&rotated).map_err(|_| Status::UnsupportedFormat)
    }
}

/// A read-only counter property, `Subset::LIVE` so it shows up in the periodic UDP report.
struct InvocationCount {
    invocations: Arc<AtomicU32>,
}

impl Node for InvocationCount {
    fn id(&self) -> u16 {
        ROT13_COUNT_ID
    }
    fn parent_id(&self) -> u16 {
        ROT13_GROUP_ID
    }
    fn name(&self) -> &str {
        "count"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Property
    }
    fn access(&self) -> Access {
        Access::READ_ONLY
    }
    fn subset(&self) -> Subset {
        Subset::LIVE
    }
    fn capabilities(&self) -> thingset_core::node::Capabilities {
        thingset_core::node::Capabilities {
            encodable: true,
            decodable: false,
            has_children: false,
            invocable: false,
            custom_request_handler: false,
        }
    }
    fn encode_value(&self, enc: &mut dyn ValueEncoder) -> WireResult<()> {
        enc.encode_u32(self.invocations.load(Ordering::Relaxed))
    }
}

fn build_registry() -> (Registry, Arc<AtomicU32>) {
    let invocations = Arc::new(AtomicU32::new(0));
    let mut registry = Registry::new();
    registry.register(Box::new(Rot13Group)).expect("group id is unique");
    registry.register(Box::new(Rot13Function { invocations: Arc::clone(&invocations) })).expect("function id is unique");
    registry.register(Box::new(InvocationCount { invocations: Arc::clone(&invocations) })).expect("property id is unique");
    (registry, invocations)
}

fn main() {
    env_logger::init();

    let (registry, _invocations) = build_registry();
    let registry = Arc::new(Mutex::new(registry));

    let engine = Arc::new(RequestEngine::new(RoleSet::ALL));
    let tcp_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), tcp::DEFAULT_PORT);
    {
        let engine = Arc::clone(&engine);
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            if let Err(e) = tcp::serve(tcp_addr, Framing::OneReadPerRequest, engine, registry) {
                log::error!("rot13-node: TCP listener stopped: {e}");
            }
        });
    }
    log::info!("rot13-node: serving requests on {tcp_addr}");

    // `Server` here is used purely for its `publish_subset` helper; request dispatch above goes
    // straight through `thingset_ip::tcp::serve` since that API predates this crate and already
    // owns its own `Arc<RequestEngine>`/`Arc<Mutex<Registry>>` pair.
    let publish_server = Server::new(RequestEngine::new(RoleSet::ALL), Arc::clone(&registry));

    let publisher = Publisher::bind(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255)), thingset_ip::udp::DEFAULT_PORT),
    )
    .expect("failed to bind the UDP publish socket");

    loop {
        thread::sleep(Duration::from_secs(1));
        if let Err(e) = publish_live_subset(&publish_server, &publisher) {
            log::warn!("rot13-node: publish failed: {e}");
        }
    }
}

/// Drives [`Server::publish_subset`]'s streaming encoder straight into UDP datagrams: the first
/// `write` callback (i.e. the one `flush()` makes if the whole map fit in one chunk) is tagged
/// `Single`; otherwise the first is `First`, the last (the one with `is_final`) is `Last`, and
/// everything between is `Consecutive` (§4.5).
fn publish_live_subset(server: &Server, publisher: &Publisher) -> Result<(), thingset_server::ServerError> {
    const UDP_CHUNK: usize = 480;
    let mut sequence: u8 = 0;
    let mut first_call = true;
    let mut write = |chunk: &[u8], is_final: bool| -> WireResult<()> {
        let kind = match (first_call, is_final) {
            (true, true) => DatagramKind::Single,
            (true, false) => DatagramKind::First,
            (false, true) => DatagramKind::Last,
            (false, false) => DatagramKind::Consecutive,
        };
        first_call = false;
        publisher.send(kind, sequence, chunk).map_err(|_| thingset_wire::WireError::NotSupported)?;
        sequence = sequence.wrapping_add(1) & 0x0F;
        Ok(())
    };
    server.publish_subset::<UDP_CHUNK>(Subset::LIVE, &mut write)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rot13_is_its_own_inverse() {
        let text = "Hello, ThingSet!";
        let once: String = text.chars().map(rot13_char).collect();
        let twice: String = once.chars().map(rot13_char).collect();
        assert_eq!(twice, text);
        assert_ne!(once, text);
    }

    #[test]
    fn registry_wires_group_function_and_property_together() {
        let (registry, _invocations) = build_registry();
        assert_eq!(registry.children_of(ROT13_GROUP_ID), &[ROT13_ROTATE_ID, ROT13_COUNT_ID]);
        assert_eq!(registry.resolve_path("rot13/rotate"), Some(ROT13_ROTATE_ID));
    }

    #[test]
    fn exec_request_rotates_the_argument_and_bumps_the_counter() {
        let (mut registry, invocations) = build_registry();
        let engine = RequestEngine::new(RoleSet::ALL);

        let mut request = vec![Verb::Exec.binary_byte(), 0x19, 0x01, 0x01]; // uint16(0x101)
        let mut payload = [0u8; 32];
        let payload_len = {
            let mut enc = thingset_wire::binary::BinaryEncoder::new(&mut payload);
            enc.start_array(Some(1)).unwrap();
            enc.encode_str("Uryyb").unwrap();
            enc.end_array().unwrap();
            enc.len()
        };
        request.extend_from_slice(&payload[..payload_len]);

        let mut response = [0u8; 64];
        let len = engine.dispatch_binary(&mut registry, &request, &mut response);
        assert_eq!(response[0], Status::Content.code());
        let mut dec = thingset_wire::binary::BinaryDecoder::new(&response[2..len]);
        let mut out = String::new();
        dec.decode_str(&mut |s| {
            out.push_str(s);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, "Hello");
        assert_eq!(invocations.load(Ordering::Relaxed), 1);
    }
}
