/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! CAN ID algebra (§3.5): a 29-bit extended CAN identifier, partitioned into named sub-fields
//! whose meaning depends on [`MessageType`]. A dedicated value type composes the raw 29-bit
//! integer from typed setters (`set_source`, `set_target`, ...) plus a mask of which fields have
//! been set explicitly, rather than exposing the packed bits directly — this is the transport's
//! addressing currency, never constructed by hand-rolled bit-shifting at the call site.
//!
//! Bit budget (`SPEC_FULL.md`, this module's own Open Question — the base spec gives field
//! widths but not a single cross-type bit table, since the layout is explicitly type-dependent):
//! `priority` (3) and `message_type` (2) are always present at the top of the ID; `source` (8)
//! follows. The low 16 bits are then reinterpreted per [`MessageType`]:
//! - `RequestResponse`: `target` (8) then `bridge` (8).
//! - `MultiFrameReport`: `data_id` (8), `message_number` (2), `sequence_number` (4),
//!   `multi_frame_type` (2) — a narrower `data_id` than the request/response path's full 16-bit
//!   range, traded for room to carry sequencing in the same word; see `DESIGN.md`.
//! - `SingleFrameReport`: `data_id` (16), using the whole low half.

/// Reserved CAN addresses (§3.5).
pub const ANONYMOUS_ADDRESS: u8 = 0xFE;
pub const BROADCAST_ADDRESS: u8 = 0xFF;
/// Inclusive legal range for a claimed node address (§3.5, §4.4.2).
pub const CLAIMABLE_RANGE: std::ops::RangeInclusive<u8> = 0x01..=0xFD;

const PRIORITY_SHIFT: u32 = 26;
const MESSAGE_TYPE_SHIFT: u32 = 24;
const SOURCE_SHIFT: u32 = 16;
const TARGET_SHIFT: u32 = 8;
const BRIDGE_SHIFT: u32 = 0;
const REPORT_DATA_ID_SHIFT: u32 = 8;
const MESSAGE_NUMBER_SHIFT: u32 = 6;
const SEQUENCE_NUMBER_SHIFT: u32 = 2;
const MULTI_FRAME_TYPE_SHIFT: u32 = 0;
const SINGLE_DATA_ID_SHIFT: u32 = 0;

const MASK_3: u32 = 0b111;
const MASK_2: u32 = 0b11;
const MASK_8: u32 = 0xFF;
const MASK_16: u32 = 0xFFFF;
const MASK_4: u32 = 0b1111;

/// The 2-bit message-type field (§3.5). Selects which interpretation the low 16 bits of the ID
/// carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    RequestResponse = 0b00,
    MultiFrameReport = 0b01,
    SingleFrameReport = 0b10,
    NetworkManagement = 0b11,
}

impl MessageType {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            0b00 => MessageType::RequestResponse,
            0b01 => MessageType::MultiFrameReport,
            0b10 => MessageType::SingleFrameReport,
            _ => MessageType::NetworkManagement,
        }
    }
}

/// The 2-bit multi-frame-type field carried in a [`MessageType::MultiFrameReport`] ID (§4.3):
/// which position this fragment occupies in its logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiFrameType {
    First = 0b00,
    Consecutive = 0b01,
    Last = 0b10,
    Single = 0b11,
}

impl MultiFrameType {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            0b00 => MultiFrameType::First,
            0b01 => MultiFrameType::Consecutive,
            0b10 => MultiFrameType::Last,
            _ => MultiFrameType::Single,
        }
    }
}

/// Which fields have been set explicitly on a [`CanId`] under construction (§3.5: "plus a mask
/// indicating which bits have been set explicitly"). A small hand-rolled bitset, in the same
/// spirit as `thingset-core::access::RoleSet`, rather than pulling in a flags crate for nine
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMask(u16);

impl FieldMask {
    pub const PRIORITY: FieldMask = FieldMask(1 << 0);
    pub const MESSAGE_TYPE: FieldMask = FieldMask(1 << 1);
    pub const SOURCE: FieldMask = FieldMask(1 << 2);
    pub const TARGET: FieldMask = FieldMask(1 << 3);
    pub const DATA_ID: FieldMask = FieldMask(1 << 4);
    pub const SEQUENCE_NUMBER: FieldMask = FieldMask(1 << 5);
    pub const MULTI_FRAME_TYPE: FieldMask = FieldMask(1 << 6);
    pub const MESSAGE_NUMBER: FieldMask = FieldMask(1 << 7);
    pub const BRIDGE: FieldMask = FieldMask(1 << 8);

    pub const fn empty() -> Self {
        FieldMask(0)
    }

    pub const fn contains(self, other: FieldMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FieldMask {
    type Output = FieldMask;
    fn bitor(self, rhs: FieldMask) -> FieldMask {
        FieldMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FieldMask {
    fn bitor_assign(&mut self, rhs: FieldMask) {
        self.0 |= rhs.0;
    }
}

/// A 29-bit extended CAN identifier plus a record of which fields were set explicitly (§3.5).
/// Built incrementally with the `set_*` methods; `reply_id` swaps source and target for a
/// response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanId {
    raw: u32,
    set: FieldMask,
}

impl CanId {
    pub const fn new() -> Self {
        CanId { raw: 0, set: FieldMask::empty() }
    }

    pub const fn from_raw(raw: u32) -> Self {
        CanId { raw: raw & 0x1FFF_FFFF, set: FieldMask::empty() }
    }

    pub const fn raw(self) -> u32 {
        self.raw
    }

    pub const fn is_set(self, field: FieldMask) -> bool {
        self.set.contains(field)
    }

    pub fn set_priority(mut self, priority: u8) -> Self {
        self.raw = replace_field(self.raw, PRIORITY_SHIFT, MASK_3, priority as u32);
        self.set |= FieldMask::PRIORITY;
        self
    }

    pub fn set_message_type(mut self, mt: MessageType) -> Self {
        self.raw = replace_field(self.raw, MESSAGE_TYPE_SHIFT, MASK_2, mt as u32);
        self.set |= FieldMask::MESSAGE_TYPE;
        self
    }

    pub fn set_source(mut self, source: u8) -> Self {
        self.raw = replace_field(self.raw, SOURCE_SHIFT, MASK_8, source as u32);
        self.set |= FieldMask::SOURCE;
        self
    }

    pub fn set_target(mut self, target: u8) -> Self {
        self.raw = replace_field(self.raw, TARGET_SHIFT, MASK_8, target as u32);
        self.set |= FieldMask::TARGET;
        self
    }

    pub fn set_bridge(mut self, bridge: u8) -> Self {
        self.raw = replace_field(self.raw, BRIDGE_SHIFT, MASK_8, bridge as u32);
        self.set |= FieldMask::BRIDGE;
        self
    }

    /// Sets the data-id field, using whichever width the current [`MessageType`] affords it
    /// (8 bits for a multi-frame report, 16 for a single-frame one).
    pub fn set_data_id(mut self, data_id: u16) -> Self {
        match self.message_type() {
            MessageType::MultiFrameReport => {
                self.raw = replace_field(self.raw, REPORT_DATA_ID_SHIFT, MASK_8, data_id as u32);
            }
            _ => {
                self.raw = replace_field(self.raw, SINGLE_DATA_ID_SHIFT, MASK_16, data_id as u32);
            }
        }
        self.set |= FieldMask::DATA_ID;
        self
    }

    pub fn set_sequence_number(mut self, seq: u8) -> Self {
        self.raw = replace_field(self.raw, SEQUENCE_NUMBER_SHIFT, MASK_4, seq as u32);
        self.set |= FieldMask::SEQUENCE_NUMBER;
        self
    }

    pub fn set_multi_frame_type(mut self, mft: MultiFrameType) -> Self {
        self.raw = replace_field(self.raw, MULTI_FRAME_TYPE_SHIFT, MASK_2, mft as u32);
        self.set |= FieldMask::MULTI_FRAME_TYPE;
        self
    }

    pub fn set_message_number(mut self, number: u8) -> Self {
        self.raw = replace_field(self.raw, MESSAGE_NUMBER_SHIFT, MASK_2, number as u32);
        self.set |= FieldMask::MESSAGE_NUMBER;
        self
    }

    pub const fn priority(self) -> u8 {
        extract_field(self.raw, PRIORITY_SHIFT, MASK_3) as u8
    }

    pub const fn message_type(self) -> MessageType {
        MessageType::from_bits(extract_field(self.raw, MESSAGE_TYPE_SHIFT, MASK_2))
    }

    pub const fn source(self) -> u8 {
        extract_field(self.raw, SOURCE_SHIFT, MASK_8) as u8
    }

    pub const fn target(self) -> u8 {
        extract_field(self.raw, TARGET_SHIFT, MASK_8) as u8
    }

    pub const fn bridge(self) -> u8 {
        extract_field(self.raw, BRIDGE_SHIFT, MASK_8) as u8
    }

    pub const fn sequence_number(self) -> u8 {
        extract_field(self.raw, SEQUENCE_NUMBER_SHIFT, MASK_4) as u8
    }

    pub const fn multi_frame_type(self) -> MultiFrameType {
        MultiFrameType::from_bits(extract_field(self.raw, MULTI_FRAME_TYPE_SHIFT, MASK_2))
    }

    pub const fn message_number(self) -> u8 {
        extract_field(self.raw, MESSAGE_NUMBER_SHIFT, MASK_2) as u8
    }

    pub const fn data_id(self) -> u16 {
        match self.message_type() {
            MessageType::MultiFrameReport => extract_field(self.raw, REPORT_DATA_ID_SHIFT, MASK_8) as u16,
            _ => extract_field(self.raw, SINGLE_DATA_ID_SHIFT, MASK_16) as u16,
        }
    }

    /// Swaps source and target, keeping every other field (§4.4.1 `reply_id(x)`): builds the ID
    /// a response reuses to address the original requester.
    pub fn reply_id(self) -> Self {
        let mut out = self;
        out.raw = replace_field(out.raw, SOURCE_SHIFT, MASK_8, self.target() as u32);
        out.raw = replace_field(out.raw, TARGET_SHIFT, MASK_8, self.source() as u32);
        out
    }
}

impl Default for CanId {
    fn default() -> Self {
        Self::new()
    }
}

const fn replace_field(raw: u32, shift: u32, mask: u32, value: u32) -> u32 {
    (raw & !(mask << shift)) | ((value & mask) << shift)
}

const fn extract_field(raw: u32, shift: u32, mask: u32) -> u32 {
    (raw >> shift) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trips_every_field() {
        let id = CanId::new()
            .set_priority(5)
            .set_message_type(MessageType::RequestResponse)
            .set_source(0x10)
            .set_target(0x20);
        assert_eq!(id.priority(), 5);
        assert_eq!(id.message_type(), MessageType::RequestResponse);
        assert_eq!(id.source(), 0x10);
        assert_eq!(id.target(), 0x20);
        assert!(id.is_set(FieldMask::SOURCE));
        assert!(!id.is_set(FieldMask::BRIDGE));
    }

    #[test]
    fn reply_id_swaps_source_and_target_only() {
        let id = CanId::new()
            .set_message_type(MessageType::RequestResponse)
            .set_source(0x10)
            .set_target(0x20)
            .set_priority(3);
        let reply = id.reply_id();
        assert_eq!(reply.source(), 0x20);
        assert_eq!(reply.target(), 0x10);
        assert_eq!(reply.priority(), 3);
    }

    #[test]
    fn multi_frame_report_fields_compose() {
        let id = CanId::new()
            .set_message_type(MessageType::MultiFrameReport)
            .set_source(0x42)
            .set_data_id(0x0304)
            .set_sequence_number(7)
            .set_multi_frame_type(MultiFrameType::Consecutive)
            .set_message_number(2);
        assert_eq!(id.source(), 0x42);
        assert_eq!(id.data_id(), 0x04); // 8-bit window in report mode
        assert_eq!(id.sequence_number(), 7);
        assert_eq!(id.multi_frame_type(), MultiFrameType::Consecutive);
        assert_eq!(id.message_number(), 2);
    }

    #[test]
    fn single_frame_report_keeps_full_width_data_id() {
        let id = CanId::new().set_message_type(MessageType::SingleFrameReport).set_data_id(0x1234);
        assert_eq!(id.data_id(), 0x1234);
    }

    #[test]
    fn claimable_range_excludes_the_sentinels() {
        assert!(!CLAIMABLE_RANGE.contains(&ANONYMOUS_ADDRESS));
        assert!(!CLAIMABLE_RANGE.contains(&BROADCAST_ADDRESS));
        assert!(CLAIMABLE_RANGE.contains(&0x01));
        assert!(CLAIMABLE_RANGE.contains(&0xFD));
    }
}
