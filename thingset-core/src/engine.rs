/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The request engine (§4.2): parses a request buffer's verb-and-endpoint header, resolves the
//! endpoint against a [`Registry`], invokes the per-verb handler, and writes a status-prefixed
//! response. The per-verb bodies (`do_get`, `do_fetch`, ...) are written once against the
//! [`ValueDecoder`]/[`ValueEncoder`] trait objects, so the same code serves both the binary and
//! text wire formats — only [`RequestEngine::dispatch_binary`] and
//! [`RequestEngine::dispatch_text`] know which concrete codec is in play.

use thingset_error::Status;
use thingset_wire::binary::{BinaryDecoder, BinaryEncoder};
use thingset_wire::text::{TextDecoder, TextEncoder};
use thingset_wire::{MapKey, Result as WireResult, ValueDecoder, ValueEncoder, WireError};

use crate::access::{Operation, RoleSet};
use crate::node::CustomHandled;
use crate::registry::{Registry, METADATA_ID};
use crate::verb::Verb;

/// A request's endpoint, before it is resolved against a registry (§4.2: "either an unsigned int
/// ID or a text-string path").
enum Endpoint {
    Id(u16),
    Path(String),
}

impl Endpoint {
    fn resolve(&self, registry: &Registry) -> Option<u16> {
        match self {
            Endpoint::Id(id) => registry.contains(*id).then_some(*id),
            Endpoint::Path(path) => registry.resolve_path(path),
        }
    }
}

/// Dispatches parsed requests against a [`Registry`] under a fixed [`RoleSet`] (§4.2, §3.3). One
/// engine instance is typically shared by every transport a server listens on.
pub struct RequestEngine {
    roles: RoleSet,
}

impl RequestEngine {
    pub fn new(roles: RoleSet) -> Self {
        RequestEngine { roles }
    }

    pub fn roles(&self) -> RoleSet {
        self.roles
    }

    /// Parses and dispatches a binary request (§6.2 byte verbs). Returns the number of bytes
    /// written to `response` (always at least 1: the status byte).
    pub fn dispatch_binary(&self, registry: &mut Registry, request: &[u8], response: &mut [u8]) -> usize {
        if response.is_empty() {
            return 0;
        }
        let Some(&verb_byte) = request.first() else {
            response[0] = Status::BadRequest.code();
            return 1;
        };
        let Some(verb) = Verb::from_binary_byte(verb_byte) else {
            response[0] = Status::BadRequest.code();
            return 1;
        };
        let mut dec = BinaryDecoder::new(&request[1..]);
        let Some(endpoint) = decode_endpoint(&mut dec) else {
            response[0] = Status::BadRequest.code();
            return 1;
        };

        let status;
        let payload_len;
        {
            let mut enc = BinaryEncoder::new(&mut response[1..]);
            status = self.run(registry, verb, &endpoint, &mut dec, &mut enc);
            payload_len = enc.len();
        }
        response[0] = status.code();
        1 + payload_len
    }

    /// Parses and dispatches a text request (§6.2 ASCII verbs). The wire shape used here is
    /// `<verb><path>[ <json-payload>]` in and `:<hex-status> <json-payload>` out, the textual
    /// analogue of the binary header in §4.2's request-layout table.
    pub fn dispatch_text(&self, registry: &mut Registry, request: &str, response: &mut [u8]) -> usize {
        let Some(verb_byte) = request.as_bytes().first().copied() else {
            return write_text_status(response, Status::BadRequest, "");
        };
        let Some(verb) = Verb::from_text_byte(verb_byte) else {
            return write_text_status(response, Status::BadRequest, "");
        };
        let rest = request[1..].trim_start();
        let (path, payload_src) = match rest.find(char::is_whitespace) {
            Some(at) => (&rest[..at], rest[at..].trim_start()),
            None => (rest, ""),
        };
        let endpoint = Endpoint::Path(path.to_string());

        let mut dec = match TextDecoder::<64>::new(payload_src.as_bytes()) {
            Ok(d) => d,
            Err(_) => return write_text_status(response, Status::BadRequest, ""),
        };

        let mut payload_buf = Vec::new();
        let status = {
            let mut enc_buf = vec![0u8; response.len().saturating_sub(8).max(1)];
            let mut enc = TextEncoder::new(&mut enc_buf);
            let status = self.run(registry, verb, &endpoint, &mut dec, &mut enc);
            let len = enc.len();
            payload_buf.extend_from_slice(&enc_buf[..len]);
            status
        };
        let payload_str = std::str::from_utf8(&payload_buf).unwrap_or("");
        write_text_status(response, status, payload_str)
    }

    fn run(
        &self,
        registry: &mut Registry,
        verb: Verb,
        endpoint: &Endpoint,
        payload: &mut dyn ValueDecoder,
        resp: &mut dyn ValueEncoder,
    ) -> Status {
        let Some(id) = endpoint.resolve(registry) else {
            return Status::NotFound;
        };

        if let Some(node) = registry.get_mut(id) {
            if node.capabilities().custom_request_handler {
                if let CustomHandled::Handled(status) = node.handle_request(verb, None, payload, resp) {
                    return status;
                }
            }
        }

        match verb {
            Verb::Get => self.do_get(registry, id, resp),
            Verb::Fetch => self.do_fetch(registry, id, payload, resp),
            Verb::Update => self.do_update(registry, id, payload),
            Verb::Exec => self.do_exec(registry, id, payload, resp),
            Verb::Delete | Verb::Create => Status::MethodNotAllowed,
            Verb::Desire | Verb::Report => Status::MethodNotAllowed,
            // Gateway forwarding (§4.8) needs a second transport to re-dispatch to, which this
            // engine does not own; a server that enables gateway support peels the request with
            // `crate::gateway::rewrite_forward_request` before it ever reaches `dispatch_binary`.
            Verb::Forward => Status::NotAGateway,
        }
    }

    fn do_get(&self, registry: &Registry, id: u16, resp: &mut dyn ValueEncoder) -> Status {
        let Some(node) = registry.get(id) else {
            return Status::NotFound;
        };
        if !node.allows(self.roles, Operation::Read) {
            return Status::Forbidden;
        }
        let caps = node.capabilities();
        let result = if caps.has_children && !caps.encodable {
            resp.encode_preamble().and_then(|_| self.encode_group_map(registry, id, resp))
        } else if caps.encodable {
            resp.encode_preamble().and_then(|_| node.encode_value(resp))
        } else {
            return Status::UnsupportedFormat;
        };
        match result {
            Ok(()) => Status::Content,
            Err(_) => Status::UnsupportedFormat,
        }
    }

    fn encode_group_map(&self, registry: &Registry, group_id: u16, resp: &mut dyn ValueEncoder) -> WireResult<()> {
        let children = registry.children_of(group_id);
        resp.start_map(Some(children.len()))?;
        for &child_id in children {
            let Some(child) = registry.get(child_id) else { continue };
            if !child.allows(self.roles, Operation::Read) {
                continue;
            }
            resp.encode_key(MapKey::Id(child_id))?;
            let caps = child.capabilities();
            if caps.has_children && !caps.encodable {
                self.encode_group_map(registry, child_id, resp)?;
            } else if caps.encodable {
                child.encode_value(resp)?;
            } else {
                resp.encode_null()?;
            }
        }
        resp.end_map()
    }

    fn do_fetch(
        &self,
        registry: &Registry,
        id: u16,
        payload: &mut dyn ValueDecoder,
        resp: &mut dyn ValueEncoder,
    ) -> Status {
        let Some(node) = registry.get(id) else {
            return Status::NotFound;
        };
        if !node.allows(self.roles, Operation::Read) {
            return Status::Forbidden;
        }
        if !node.capabilities().has_children {
            return Status::MethodNotAllowed;
        }

        if payload.decode_null().is_ok() {
            let children = registry.children_of(id);
            let result: WireResult<()> = (|| {
                resp.encode_preamble()?;
                resp.start_array(Some(children.len()))?;
                for &cid in children {
                    resp.encode_u64(cid as u64)?;
                }
                resp.end_array()
            })();
            return match result {
                Ok(()) => Status::Content,
                Err(_) => Status::UnsupportedFormat,
            };
        }

        if id == METADATA_ID {
            return self.fetch_metadata(registry, payload, resp);
        }

        let mut failure: Option<Status> = None;
        let result = (|| -> WireResult<()> {
            resp.encode_preamble()?;
            resp.start_array(None)?;
            payload.decode_list(&mut |d| {
                let requested = match decode_endpoint_element(d) {
                    Ok(e) => e,
                    Err(_) => {
                        failure = Some(Status::BadRequest);
                        return Ok(false);
                    }
                };
                let child_id = match &requested {
                    Endpoint::Id(cid) => Some(*cid),
                    Endpoint::Path(name) => registry.child_by_name(id, name),
                };
                let Some(child_id) = child_id else {
                    failure = Some(Status::NotFound);
                    return Ok(false);
                };
                let Some(child) = registry.get(child_id) else {
                    failure = Some(Status::NotFound);
                    return Ok(false);
                };
                if !child.allows(self.roles, Operation::Read) {
                    failure = Some(Status::Forbidden);
                    return Ok(false);
                }
                if !child.capabilities().encodable {
                    failure = Some(Status::UnsupportedFormat);
                    return Ok(false);
                }
                if child.encode_value(resp).is_err() {
                    failure = Some(Status::UnsupportedFormat);
                    return Ok(false);
                }
                Ok(true)
            })?;
            resp.end_array()
        })();

        if let Some(status) = failure {
            return status;
        }
        match result {
            Ok(()) => Status::Content,
            Err(_) => Status::UnsupportedFormat,
        }
    }

    fn fetch_metadata(&self, registry: &Registry, payload: &mut dyn ValueDecoder, resp: &mut dyn ValueEncoder) -> Status {
        let mut failure: Option<Status> = None;
        let result = (|| -> WireResult<()> {
            resp.encode_preamble()?;
            resp.start_array(None)?;
            payload.decode_list(&mut |d| {
                let id = match d.decode_u64() {
                    Ok(v) => match u16::try_from(v) {
                        Ok(id) => id,
                        Err(_) => {
                            failure = Some(Status::BadRequest);
                            return Ok(false);
                        }
                    },
                    Err(_) => {
                        failure = Some(Status::BadRequest);
                        return Ok(false);
                    }
                };
                let Some(node) = registry.get(id) else {
                    failure = Some(Status::NotFound);
                    return Ok(false);
                };
                let result: WireResult<()> = (|| {
                    resp.start_map(Some(3))?;
                    resp.encode_key(MapKey::Name("name"))?;
                    resp.encode_str(node.name())?;
                    resp.encode_key(MapKey::Name("type"))?;
                    resp.encode_str(kind_name(node.kind()))?;
                    resp.encode_key(MapKey::Name("access"))?;
                    resp.encode_u64(node.access().raw() as u64)?;
                    resp.end_map()
                })();
                if result.is_err() {
                    failure = Some(Status::UnsupportedFormat);
                    return Ok(false);
                }
                Ok(true)
            })?;
            resp.end_array()
        })();

        if let Some(status) = failure {
            return status;
        }
        match result {
            Ok(()) => Status::Content,
            Err(_) => Status::UnsupportedFormat,
        }
    }

    fn do_update(&self, registry: &mut Registry, id: u16, payload: &mut dyn ValueDecoder) -> Status {
        let Some(node) = registry.get(id) else {
            return Status::NotFound;
        };
        if !node.capabilities().has_children {
            return Status::MethodNotAllowed;
        }
        // §4.2 UPDATE checks write access per child, not on the container — a read-only group is
        // the normal way to expose writable properties underneath it.

        let mut outcome = Status::Changed;
        let map_result = payload.decode_map(&mut |d, key| {
            let child_id = match key {
                MapKey::Id(cid) => Some(cid),
                MapKey::Name(name) => registry.child_by_name(id, name),
            };
            let Some(child_id) = child_id else {
                outcome = Status::NotFound;
                return Ok(false);
            };
            let allowed = match registry.get(child_id) {
                Some(child) if !child.capabilities().decodable => {
                    outcome = Status::MethodNotAllowed;
                    false
                }
                Some(child) if !child.allows(self.roles, Operation::Write) => {
                    outcome = Status::Forbidden;
                    false
                }
                Some(_) => true,
                None => {
                    outcome = Status::NotFound;
                    false
                }
            };
            if !allowed {
                return Ok(false);
            }
            let Some(child) = registry.get_mut(child_id) else {
                outcome = Status::NotFound;
                return Ok(false);
            };
            child.will_write();
            let decode_result = child.decode_value(d);
            child.did_write();
            if decode_result.is_err() {
                outcome = Status::BadRequest;
                return Ok(false);
            }
            Ok(true)
        });
        if map_result.is_err() {
            return Status::BadRequest;
        }
        outcome
    }

    fn do_exec(&self, registry: &mut Registry, id: u16, payload: &mut dyn ValueDecoder, resp: &mut dyn ValueEncoder) -> Status {
        let allowed = match registry.get(id) {
            Some(node) if !node.capabilities().invocable => return Status::MethodNotAllowed,
            Some(node) => node.allows(self.roles, Operation::Write),
            None => return Status::NotFound,
        };
        if !allowed {
            return Status::Forbidden;
        }
        let Some(node) = registry.get_mut(id) else {
            return Status::NotFound;
        };
        if resp.encode_preamble().is_err() {
            return Status::UnsupportedFormat;
        }
        match node.invoke(payload, resp) {
            Ok(()) => Status::Content,
            Err(status) => status,
        }
    }
}

fn kind_name(kind: crate::node::NodeKind) -> &'static str {
    use crate::node::NodeKind::*;
    match kind {
        Property => "property",
        Group => "group",
        Function => "function",
        RecordArray => "recordArray",
        RecordMember => "recordMember",
    }
}

/// Decodes a ThingSet endpoint off the front of a binary decoder: either an unsigned int ID or a
/// text-string path (§4.2).
fn decode_endpoint(dec: &mut BinaryDecoder<'_>) -> Option<Endpoint> {
    if let Ok(v) = dec.decode_u64() {
        return u16::try_from(v).ok().map(Endpoint::Id);
    }
    let mut out = String::new();
    dec.decode_str(&mut |s| {
        out.push_str(s);
        Ok(())
    })
    .ok()?;
    Some(Endpoint::Path(out))
}

/// Decodes one element of a FETCH id/name list: each element is independently either an ID or a
/// name (§2(b) symmetric key naming applied to list elements).
fn decode_endpoint_element(d: &mut dyn ValueDecoder) -> WireResult<Endpoint> {
    if let Ok(v) = d.decode_u64() {
        return u16::try_from(v).map(Endpoint::Id).map_err(|_| WireError::Overflow);
    }
    let mut out = String::new();
    d.decode_str(&mut |s| {
        out.push_str(s);
        Ok(())
    })?;
    Ok(Endpoint::Path(out))
}

/// Writes a text response `:<hex-status> <payload>` into `response`, returning the byte count.
fn write_text_status(response: &mut [u8], status: Status, payload: &str) -> usize {
    let rendered = format!(":{:02X} {}", status.code(), payload);
    let bytes = rendered.as_bytes();
    let len = bytes.len().min(response.len());
    response[..len].copy_from_slice(&bytes[..len]);
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Access;
    use crate::node::{Capabilities, Node, NodeKind};
    use crate::registry::ROOT_ID;
    use crate::subset::Subset;

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
        fn access(&self) -> Access {
            Access::READ_WRITE
        }
        fn encode_value(&self, enc: &mut dyn ValueEncoder) -> WireResult<()> {
            enc.encode_f32(self.0)
        }
        fn decode_value(&mut self, dec: &mut dyn ValueDecoder) -> WireResult<()> {
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
        fn access(&self) -> Access {
            Access::READ_ONLY
        }
        fn subset(&self) -> Subset {
            Subset::LIVE
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::for_kind(NodeKind::Group)
        }
    }

    fn registry_with_voltage() -> Registry {
        let mut reg = Registry::new();
        reg.register(Box::new(Bms)).unwrap();
        reg.register(Box::new(Voltage(24.0))).unwrap();
        reg
    }

    #[test]
    fn get_on_a_property_matches_the_spec_example() {
        // §8 #3: GET on id=0x300 value 24.0 -> [0x85, 0xF6, <CBOR 24.0>]
        let mut reg = registry_with_voltage();
        let engine = RequestEngine::new(RoleSet::ALL);
        let mut request = vec![Verb::Get.binary_byte()];
        request.extend_from_slice(&[0x19, 0x03, 0x00]); // uint16(0x300)
        let mut response = [0u8; 32];
        let len = engine.dispatch_binary(&mut reg, &request, &mut response);
        assert_eq!(response[0], Status::Content.code());
        assert_eq!(&response[1..3], &[0xF6, 0xFA]); // null, then float32 head
        let _ = len;
    }

    #[test]
    fn update_on_group_changes_child_value() {
        // §8 #3: UPDATE of the containing group with {"voltage": 25.0} -> 0x84, value becomes 25.0
        let mut reg = registry_with_voltage();
        let engine = RequestEngine::new(RoleSet::ALL);

        let mut req_payload = [0u8; 64];
        {
            let mut enc = BinaryEncoder::new(&mut req_payload);
            enc.start_map(Some(1)).unwrap();
            enc.encode_str("voltage").unwrap();
            enc.encode_f32(25.0).unwrap();
            enc.end_map().unwrap();
        }
        let mut request = vec![Verb::Update.binary_byte(), 0x19, 0x02, 0x00]; // uint16(0x200)
        request.extend_from_slice(&req_payload);

        let mut response = [0u8; 32];
        let _ = engine.dispatch_binary(&mut reg, &request, &mut response);
        assert_eq!(response[0], Status::Changed.code());

        let mut get_req = vec![Verb::Get.binary_byte(), 0x19, 0x03, 0x00];
        let mut get_resp = [0u8; 32];
        engine.dispatch_binary(&mut reg, &mut get_req, &mut get_resp);
        let mut dec = BinaryDecoder::new(&get_resp[2..6]);
        assert_eq!(dec.decode_f32().unwrap(), 25.0);
    }

    #[test]
    fn not_found_path_returns_status() {
        let mut reg = registry_with_voltage();
        let engine = RequestEngine::new(RoleSet::ALL);
        let mut request = vec![Verb::Get.binary_byte()];
        request.push(0x67); // tstr(7)
        request.extend_from_slice(b"missing");
        let mut response = [0u8; 16];
        engine.dispatch_binary(&mut reg, &request, &mut response);
        assert_eq!(response[0], Status::NotFound.code());
    }

    #[test]
    fn text_mode_round_trip() {
        let mut reg = registry_with_voltage();
        let engine = RequestEngine::new(RoleSet::ALL);
        let mut response = [0u8; 64];
        let len = engine.dispatch_text(&mut reg, "?bms/voltage", &mut response);
        let text = std::str::from_utf8(&response[..len]).unwrap();
        assert!(text.starts_with(":85 "));
        assert!(text.contains("24"));
    }
}
