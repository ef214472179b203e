/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Unsolicited reports over CAN (§4.4.4): a `report` verb's CBOR payload published without a
//! request, carried either as a single `SingleFrameReport` ID when it fits one classic CAN frame,
//! or fragmented across `MultiFrameReport` IDs whose `sequence_number`/`multi_frame_type` fields
//! feed `thingset_core::fragment::Reassembler` directly — unlike the request/response path, no
//! ISO-TP PCI byte is spent on framing here, since the CAN ID itself already carries it (§3.5).

use thingset_core::fragment::{FrameKind, Reassembler};
use thingset_error::TransportError;
use thingset_wire::binary::streaming::{StreamingDecoder, StreamingEncoder};
use thingset_wire::Result as WireResult;

use crate::can_id::{CanId, MessageType, MultiFrameType};
use crate::transport::CanInterface;

/// Classic CAN carries 8 data bytes per frame, and the multi-frame report path spends none of
/// them on PCI framing (that lives in the CAN ID), so the streaming codec's chunk size is the
/// full frame.
const CHUNK: usize = 8;

/// Publishes one report. `data_id` identifies the reported node or subset (§3.5); `encode` fills
/// the CBOR body via the usual `ValueEncoder` contract. Buffers the whole message first to decide
/// whether it fits a single frame, then emits either one `SingleFrameReport` frame or a sequence
/// of `MultiFrameReport` frames.
pub fn publish_report<I: CanInterface>(
    interface: &mut I,
    source: u8,
    data_id: u16,
    message_number: u8,
    encode: impl FnOnce(&mut dyn thingset_wire::ValueEncoder) -> WireResult<()>,
) -> Result<(), TransportError> {
    let mut body = Vec::new();
    {
        let mut write = |chunk: &[u8], _final: bool| -> WireResult<()> {
            body.extend_from_slice(chunk);
            Ok(())
        };
        let mut enc = StreamingEncoder::<CHUNK>::new(&mut write);
        encode(&mut enc).map_err(|e| TransportError::Io(e.to_string()))?;
        enc.flush().map_err(|e| TransportError::Io(e.to_string()))?;
    }

    if body.len() <= CHUNK {
        let id = CanId::new().set_message_type(MessageType::SingleFrameReport).set_source(source).set_data_id(data_id);
        return interface.send(id, &body);
    }

    let mut seq: u8 = 0;
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + CHUNK).min(body.len());
        let is_first = offset == 0;
        let is_last = end == body.len();
        let kind = match (is_first, is_last) {
            (true, true) => unreachable!("body.len() > CHUNK was checked above"),
            (true, false) => MultiFrameType::First,
            (false, true) => MultiFrameType::Last,
            (false, false) => MultiFrameType::Consecutive,
        };
        let id = CanId::new()
            .set_message_type(MessageType::MultiFrameReport)
            .set_source(source)
            .set_data_id(data_id)
            .set_sequence_number(seq)
            .set_multi_frame_type(kind)
            .set_message_number(message_number);
        interface.send(id, &body[offset..end])?;
        seq = seq.wrapping_add(1) & 0x0F;
        offset = end;
    }
    Ok(())
}

fn frame_kind(mft: MultiFrameType) -> FrameKind {
    match mft {
        MultiFrameType::First => FrameKind::First,
        MultiFrameType::Consecutive => FrameKind::Consecutive,
        MultiFrameType::Last => FrameKind::Last,
        MultiFrameType::Single => FrameKind::Single,
    }
}

/// Subscriber-side reassembly: feed every report frame observed on the bus (both single- and
/// multi-frame) through [`ReportReceiver::on_frame`]; get back the completed body once a message
/// finishes, ready for a `StreamingDecoder::over_complete_buffer` or equivalent consumer.
pub struct ReportReceiver {
    reassembler: Reassembler<u8>,
}

impl ReportReceiver {
    pub fn new() -> Self {
        ReportReceiver { reassembler: Reassembler::new() }
    }

    /// `id`/`data` are one frame read off the bus. Returns `Some((data_id, body))` once a report
    /// completes; non-report frames (request/response, network management) are ignored.
    pub fn on_frame(&mut self, id: CanId, data: &[u8]) -> Option<(u16, Vec<u8>)> {
        match id.message_type() {
            MessageType::SingleFrameReport => Some((id.data_id(), data.to_vec())),
            MessageType::MultiFrameReport => {
                let kind = frame_kind(id.multi_frame_type());
                self.reassembler.on_frame(id.source(), kind, id.sequence_number(), data).map(|body| (id.data_id(), body))
            }
            _ => None,
        }
    }
}

impl Default for ReportReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a reassembled report body with the streaming CBOR decoder, matching the encoder used
/// by [`publish_report`].
pub fn decode_report_body(body: Vec<u8>) -> StreamingDecoder<'static, CHUNK> {
    StreamingDecoder::<CHUNK>::over_complete_buffer(body)
}
