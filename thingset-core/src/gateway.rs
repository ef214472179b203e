/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Optional gateway forwarding (§4.8): a pure rewrite over request bytes, with no transport
//! dependency of its own. A caller that enables gateway support peels the forwarding target off
//! an incoming `forward` request, decides (by whatever means is local to it — a routing table, a
//! second transport) where `target` lives, and re-dispatches the rewritten request there.
//!
//! Kept as a free function rather than a method on [`crate::engine::RequestEngine`] because the
//! engine has no notion of "another transport reachable by node-ID string" (§1: cross-segment
//! routing is out of scope for the core; only the rewrite contract is specified).

use thingset_error::Status;

use crate::verb::Verb;

/// A `forward` request peeled into its downstream target and the request to re-issue there
/// (§4.8, §8 testable property 8).
pub struct Forwarded {
    /// The 16 hex-char node-ID string the `forward` payload carried.
    pub target: String,
    /// The re-dispatchable request: original verb + residual path/payload, with the `forward`
    /// framing removed.
    pub rewritten: Vec<u8>,
}

/// Rewrites a binary `forward` request (§6.2 verb `0x1e`): `forward, <16-hex-char tstr>, <verb>,
/// <path>...` becomes `<verb>, <path>...` plus the peeled target string.
///
/// Length accounting is exact (§8 #8): `rewritten.len()` equals `request.len()` minus the bytes
/// consumed by the `forward` verb byte and the target-ID CBOR text string.
pub fn rewrite_forward_request(request: &[u8]) -> Result<Forwarded, Status> {
    let Some((&verb_byte, rest)) = request.split_first() else {
        return Err(Status::BadRequest);
    };
    if Verb::from_binary_byte(verb_byte) != Some(Verb::Forward) {
        return Err(Status::BadRequest);
    }

    let mut dec = thingset_wire::binary::BinaryDecoder::new(rest);
    let mut target = String::new();
    dec.decode_str(&mut |s| {
        target.push_str(s);
        Ok(())
    })
    .map_err(|_| Status::BadRequest)?;
    if target.len() != 16 || !target.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Status::BadRequest);
    }

    let consumed = rest.len() - dec.remaining().len();
    let rewritten = rest[consumed..].to_vec();
    Ok(Forwarded { target, rewritten })
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingset_wire::binary::BinaryEncoder;

    #[test]
    fn peels_target_and_rewrites_to_the_inner_request() {
        let mut payload = [0u8; 32];
        let target_len;
        {
            let mut enc = BinaryEncoder::new(&mut payload);
            enc.encode_str("deadbeef12345678").unwrap();
            target_len = enc.len();
        }
        let mut request = vec![Verb::Forward.binary_byte()];
        request.extend_from_slice(&payload[..target_len]);
        request.push(Verb::Get.binary_byte());
        request.extend_from_slice(b"/Something"); // not valid CBOR but irrelevant to the rewrite

        let forwarded = rewrite_forward_request(&request).unwrap();
        assert_eq!(forwarded.target, "deadbeef12345678");
        assert_eq!(forwarded.rewritten[0], Verb::Get.binary_byte());
        assert_eq!(&forwarded.rewritten[1..], b"/Something");
        assert_eq!(
            1 + target_len + forwarded.rewritten.len(),
            request.len(),
            "length accounting must be exact"
        );
    }

    #[test]
    fn rejects_a_non_forward_verb() {
        let request = [Verb::Get.binary_byte()];
        assert!(rewrite_forward_request(&request).is_err());
    }

    #[test]
    fn rejects_a_target_that_is_not_16_hex_chars() {
        let mut payload = [0u8; 32];
        let mut enc = BinaryEncoder::new(&mut payload);
        enc.encode_str("too-short").unwrap();
        let len = enc.len();
        let mut request = vec![Verb::Forward.binary_byte()];
        request.extend_from_slice(&payload[..len]);
        assert!(rewrite_forward_request(&request).is_err());
    }
}
