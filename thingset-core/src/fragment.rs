/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The multi-frame reassembly algorithm (§4.3), shared by the CAN and UDP transports: CAN tags a
//! fragment's position in the 2-bit "multi-frame type" field of the CAN ID, with a 4-bit rolling
//! sequence number; UDP packs the same two facts into the first byte of each datagram
//! (`(message_type << 4) | (sequence & 0x0F)`). Both reduce to the same four-state decision this
//! module implements once, so `thingset-can` and `thingset-ip` differ only in how they peel a
//! [`FrameKind`] and sequence number off their own framing, not in how they reassemble.
//!
//! One [`Reassembler`] holds one [`Context`] per sender, keyed by whatever the transport uses to
//! identify a sender (a CAN source address, a UDP peer `SocketAddr`, ...). Per §5's resource
//! table, a `Reassembler` is "not shared": it is owned entirely by the thread that reads frames
//! off the transport.

use std::collections::HashMap;
use std::hash::Hash;

/// A fragment's position within its logical message (§4.3, §3.5 "multi-frame type").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The whole message fit in one frame; no reassembly needed.
    Single,
    First,
    Consecutive,
    Last,
}

struct Context {
    next_seq: u8,
    buf: Vec<u8>,
}

/// Per-sender multi-frame reassembly state (§4.3). `Sender` is whatever identifies a peer to the
/// owning transport: `u8` (CAN source address) or `std::net::SocketAddr` (UDP).
pub struct Reassembler<Sender> {
    contexts: HashMap<Sender, Context>,
}

impl<Sender: Eq + Hash + Clone> Reassembler<Sender> {
    pub fn new() -> Self {
        Reassembler { contexts: HashMap::new() }
    }

    /// Feeds one received fragment. `seq` is the 4-bit rolling sequence number carried by
    /// `first`/`consecutive`/`last` frames (ignored for `single`). Returns the reassembled
    /// message once `last` arrives; returns `None` for every other frame, including a fragment
    /// that caused reassembly to abandon (§4.3 step 3: "on mismatch, abandon the context").
    pub fn on_frame(&mut self, sender: Sender, kind: FrameKind, seq: u8, payload: &[u8]) -> Option<Vec<u8>> {
        let seq = seq & 0x0F;
        match kind {
            FrameKind::Single => Some(payload.to_vec()),
            FrameKind::First => {
                self.contexts.insert(sender, Context { next_seq: seq.wrapping_add(1) & 0x0F, buf: payload.to_vec() });
                None
            }
            FrameKind::Consecutive => {
                let Some(ctx) = self.contexts.get_mut(&sender) else {
                    return None;
                };
                if ctx.next_seq != seq {
                    self.contexts.remove(&sender);
                    return None;
                }
                ctx.buf.extend_from_slice(payload);
                ctx.next_seq = ctx.next_seq.wrapping_add(1) & 0x0F;
                None
            }
            FrameKind::Last => {
                let Some(mut ctx) = self.contexts.remove(&sender) else {
                    return None;
                };
                if ctx.next_seq != seq {
                    return None;
                }
                ctx.buf.extend_from_slice(payload);
                Some(ctx.buf)
            }
        }
    }

    /// Number of senders with a partial message currently buffered. Exposed for diagnostics and
    /// tests; this layer has no timeout of its own (§4.3 policy: "the underlying transport owns
    /// timeliness").
    pub fn pending_contexts(&self) -> usize {
        self.contexts.len()
    }
}

impl<Sender: Eq + Hash + Clone> Default for Reassembler<Sender> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_delivers_immediately() {
        let mut r: Reassembler<u8> = Reassembler::new();
        let out = r.on_frame(1, FrameKind::Single, 0, b"hello");
        assert_eq!(out.as_deref(), Some(&b"hello"[..]));
        assert_eq!(r.pending_contexts(), 0);
    }

    #[test]
    fn first_consecutive_last_reassembles_in_order() {
        let mut r: Reassembler<u8> = Reassembler::new();
        assert_eq!(r.on_frame(1, FrameKind::First, 0, b"ab"), None);
        assert_eq!(r.on_frame(1, FrameKind::Consecutive, 1, b"cd"), None);
        let out = r.on_frame(1, FrameKind::Last, 2, b"ef");
        assert_eq!(out.as_deref(), Some(&b"abcdef"[..]));
        assert_eq!(r.pending_contexts(), 0);
    }

    #[test]
    fn sequence_gap_abandons_the_message() {
        let mut r: Reassembler<u8> = Reassembler::new();
        r.on_frame(1, FrameKind::First, 0, b"ab");
        // Skips sequence 1: a dropped interior frame.
        let out = r.on_frame(1, FrameKind::Last, 2, b"ef");
        assert_eq!(out, None);
        assert_eq!(r.pending_contexts(), 0);
    }

    #[test]
    fn sequence_wraps_at_16() {
        let mut r: Reassembler<u8> = Reassembler::new();
        r.on_frame(1, FrameKind::First, 15, b"ab");
        let out = r.on_frame(1, FrameKind::Last, 0, b"cd");
        assert_eq!(out.as_deref(), Some(&b"abcd"[..]));
    }

    #[test]
    fn independent_senders_do_not_interfere() {
        let mut r: Reassembler<u8> = Reassembler::new();
        r.on_frame(1, FrameKind::First, 0, b"aa");
        r.on_frame(2, FrameKind::First, 0, b"bb");
        let out1 = r.on_frame(1, FrameKind::Last, 1, b"11");
        let out2 = r.on_frame(2, FrameKind::Last, 1, b"22");
        assert_eq!(out1.as_deref(), Some(&b"aa11"[..]));
        assert_eq!(out2.as_deref(), Some(&b"bb22"[..]));
    }
}
