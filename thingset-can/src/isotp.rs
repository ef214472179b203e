/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! A minimal ISO 15765-2 (ISO-TP) segmenter (§4.4.3). The base spec treats ISO-TP as an external
//! black-box fragmentation service (§1); `SPEC_FULL.md` restores it as a small in-crate
//! reimplementation so the request/response channel in `transport.rs` has something concrete to
//! drive, rather than depending on a platform ISO-TP stack this workspace cannot assume exists.
//!
//! This implements single-frame and first/consecutive-frame segmentation over classic 8-byte CAN
//! frames without the flow-control handshake (no `block_size`/`STmin` back-pressure): sufficient
//! for the bounded request/response payloads ThingSet exchanges over CAN, not a general-purpose
//! ISO-TP stack. A real deployment with larger multi-ECU buses should substitute a full ISO-TP
//! implementation here; the segmenter is isolated behind this module specifically so that swap is
//! local.

use thiserror::Error;

/// Single classic-CAN data frame, payload only (the CAN ID is the transport's concern, not
/// this module's).
pub type Frame = [u8; 8];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IsoTpError {
    #[error("frame shorter than its declared PCI length")]
    Truncated,
    #[error("consecutive frame index did not match the expected successor")]
    SequenceMismatch,
    #[error("no first frame has been received for this context")]
    NoActiveTransfer,
    #[error("payload exceeds this segmenter's maximum transfer size")]
    TooLarge,
    #[error("unrecognised protocol control information nibble")]
    UnknownPci,
}

const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;

/// Largest payload this segmenter will fragment (first frame's 12-bit length field).
pub const MAX_TRANSFER_LEN: usize = 0x0FFF;

/// Splits `payload` into one or more 8-byte ISO-TP frames (§4.4.3).
pub fn segment(payload: &[u8]) -> Result<Vec<Frame>, IsoTpError> {
    if payload.len() > MAX_TRANSFER_LEN {
        return Err(IsoTpError::TooLarge);
    }
    if payload.len() <= 7 {
        let mut frame = [0u8; 8];
        frame[0] = (PCI_SINGLE << 4) | payload.len() as u8;
        frame[1..1 + payload.len()].copy_from_slice(payload);
        return Ok(vec![frame]);
    }

    let mut frames = Vec::new();
    let mut first = [0u8; 8];
    let len = payload.len() as u16;
    first[0] = (PCI_FIRST << 4) | ((len >> 8) as u8 & 0x0F);
    first[1] = (len & 0xFF) as u8;
    first[2..8].copy_from_slice(&payload[..6]);
    frames.push(first);

    let mut index: u8 = 1;
    for chunk in payload[6..].chunks(7) {
        let mut cf = [0u8; 8];
        cf[0] = (PCI_CONSECUTIVE << 4) | (index & 0x0F);
        cf[1..1 + chunk.len()].copy_from_slice(chunk);
        frames.push(cf);
        index = index.wrapping_add(1);
    }
    Ok(frames)
}

/// Reassembles frames produced by [`segment`] back into the original payload. One reassembler
/// serves one in-flight transfer; the request/response channel keeps one per peer (§4.4.3 "holds
/// a lock around the response buffer to serialise concurrent senders").
pub struct Reassembler {
    expected_len: Option<usize>,
    buf: Vec<u8>,
    next_index: u8,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler { expected_len: None, buf: Vec::new(), next_index: 1 }
    }

    /// Feeds one received frame. Returns `Some(payload)` once the transfer completes (a single
    /// frame completes immediately; a first/consecutive transfer completes when enough bytes
    /// have arrived).
    pub fn on_frame(&mut self, frame: &Frame) -> Result<Option<Vec<u8>>, IsoTpError> {
        let pci = frame[0] >> 4;
        match pci {
            PCI_SINGLE => {
                let len = (frame[0] & 0x0F) as usize;
                if 1 + len > frame.len() {
                    return Err(IsoTpError::Truncated);
                }
                Ok(Some(frame[1..1 + len].to_vec()))
            }
            PCI_FIRST => {
                let len = (((frame[0] & 0x0F) as usize) << 8) | frame[1] as usize;
                self.expected_len = Some(len);
                self.buf.clear();
                self.buf.extend_from_slice(&frame[2..8]);
                self.next_index = 1;
                self.maybe_complete()
            }
            PCI_CONSECUTIVE => {
                let Some(_expected) = self.expected_len else {
                    return Err(IsoTpError::NoActiveTransfer);
                };
                let index = frame[0] & 0x0F;
                if index != self.next_index & 0x0F {
                    self.expected_len = None;
                    self.buf.clear();
                    return Err(IsoTpError::SequenceMismatch);
                }
                self.buf.extend_from_slice(&frame[1..8]);
                self.next_index = self.next_index.wrapping_add(1);
                self.maybe_complete()
            }
            _ => Err(IsoTpError::UnknownPci),
        }
    }

    fn maybe_complete(&mut self) -> Result<Option<Vec<u8>>, IsoTpError> {
        let Some(expected) = self.expected_len else { return Ok(None) };
        if self.buf.len() >= expected {
            self.buf.truncate(expected);
            self.expected_len = None;
            Ok(Some(std::mem::take(&mut self.buf)))
        } else {
            Ok(None)
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_round_trip() {
        let payload = b"short";
        let frames = segment(payload).unwrap();
        assert_eq!(frames.len(), 1);
        let mut reasm = Reassembler::new();
        let out = reasm.on_frame(&frames[0]).unwrap();
        assert_eq!(out.as_deref(), Some(&payload[..]));
    }

    #[test]
    fn multi_frame_round_trip() {
        let payload: Vec<u8> = (0..40u8).collect();
        let frames = segment(&payload).unwrap();
        assert!(frames.len() > 1);
        let mut reasm = Reassembler::new();
        let mut out = None;
        for frame in &frames {
            out = reasm.on_frame(frame).unwrap();
        }
        assert_eq!(out, Some(payload));
    }

    #[test]
    fn sequence_gap_fails_reassembly() {
        let payload: Vec<u8> = (0..40u8).collect();
        let frames = segment(&payload).unwrap();
        let mut reasm = Reassembler::new();
        reasm.on_frame(&frames[0]).unwrap();
        // Skip frames[1], jump straight to frames[2].
        let err = reasm.on_frame(&frames[2]).unwrap_err();
        assert_eq!(err, IsoTpError::SequenceMismatch);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_TRANSFER_LEN + 1];
        assert_eq!(segment(&payload), Err(IsoTpError::TooLarge));
    }
}
