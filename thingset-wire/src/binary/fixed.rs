/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Fixed-size (buffer-backed) binary codec. Maps and lists carry a definite length, computed
//! up front when the caller knows it, or reserved-and-backfilled when it does not (§4.1.1).
//!
//! This is the "buffer cursor" half of the crate: unlike an AST-based CBOR library, there is no
//! intermediate parsed representation kept around — each decode call reads directly off the
//! underlying byte slice, in the same spirit as `tps_minicbor`'s `SequenceBuffer` low-level
//! decode path, just exposed through the higher-level [`ValueEncoder`]/[`ValueDecoder`] traits
//! instead of an AST enum.

use super::constants::*;
use crate::error::{Result, WireError};
use crate::value::{MapKey, ValueDecoder, ValueEncoder};

#[cfg(feature = "trace")]
use func_trace::trace;
#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// Number of bytes reserved for a deferred (backfilled) length prefix: one head byte plus a
/// 2-byte count, i.e. up to 65535 elements. Sufficient for any ThingSet map or list; a report
/// with more than 65535 entries is not a realistic embedded payload.
const DEFERRED_LEN_RESERVE: usize = 3;

#[derive(Clone, Copy)]
struct OpenContainer {
    /// Byte offset of the reserved head in `buf`.
    head_at: usize,
    count: usize,
}

/// Binary encoder over a caller-supplied fixed buffer.
pub struct BinaryEncoder<'buf> {
    buf: &'buf mut [u8],
    pos: usize,
    stack: Vec<OpenContainer>,
}

impl<'buf> BinaryEncoder<'buf> {
    pub fn new(buf: &'buf mut [u8]) -> Self {
        BinaryEncoder { buf, pos: 0, stack: Vec::new() }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn into_bytes(self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(WireError::BufferFull);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    fn write_head(&mut self, major: u8, value: u64) -> Result<()> {
        if value <= 23 {
            self.write_bytes(&[head_byte(major, value as u8)])
        } else if value <= u8::MAX as u64 {
            self.write_bytes(&[head_byte(major, AI_ONE_BYTE), value as u8])
        } else if value <= u16::MAX as u64 {
            let v = value as u16;
            self.write_bytes(&[head_byte(major, AI_TWO_BYTES)])?;
            self.write_bytes(&v.to_be_bytes())
        } else if value <= u32::MAX as u64 {
            let v = value as u32;
            self.write_bytes(&[head_byte(major, AI_FOUR_BYTES)])?;
            self.write_bytes(&v.to_be_bytes())
        } else {
            self.write_bytes(&[head_byte(major, AI_EIGHT_BYTES)])?;
            self.write_bytes(&value.to_be_bytes())
        }
    }

    /// Reserves `DEFERRED_LEN_RESERVE` bytes for a length to be patched in once the container
    /// closes; pushes a bookkeeping entry.
    fn reserve_len(&mut self) -> Result<usize> {
        let at = self.pos;
        self.write_bytes(&[0u8; DEFERRED_LEN_RESERVE])?;
        Ok(at)
    }

    fn patch_len(&mut self, major: u8, head_at: usize, count: usize) -> Result<()> {
        let head = head_byte(major, AI_TWO_BYTES);
        let count = u16::try_from(count).map_err(|_| WireError::BufferFull)?;
        self.buf[head_at] = head;
        self.buf[head_at + 1..head_at + 3].copy_from_slice(&count.to_be_bytes());
        Ok(())
    }

    fn bump_parent_count(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.count += 1;
        }
    }
}

impl<'buf> ValueEncoder for BinaryEncoder<'buf> {
    fn is_forward_only(&self) -> bool {
        false
    }

    #[cfg_attr(feature = "trace", trace)]
    fn encode_null(&mut self) -> Result<()> {
        self.write_bytes(&[head_byte(MT_SIMPLE, SIMPLE_NULL)])?;
        self.bump_parent_count();
        Ok(())
    }

    fn encode_bool(&mut self, v: bool) -> Result<()> {
        let simple = if v { SIMPLE_TRUE } else { SIMPLE_FALSE };
        self.write_bytes(&[head_byte(MT_SIMPLE, simple)])?;
        self.bump_parent_count();
        Ok(())
    }

    fn encode_u64(&mut self, v: u64) -> Result<()> {
        self.write_head(MT_UINT, v)?;
        self.bump_parent_count();
        Ok(())
    }

    fn encode_i64(&mut self, v: i64) -> Result<()> {
        if v >= 0 {
            self.write_head(MT_UINT, v as u64)?;
        } else {
            // CBOR negative integers encode -(n+1) as the unsigned payload.
            self.write_head(MT_NINT, (-1 - v) as u64)?;
        }
        self.bump_parent_count();
        Ok(())
    }

    #[cfg(feature = "float")]
    fn encode_f32(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&[head_byte(MT_SIMPLE, SIMPLE_FLOAT32)])?;
        self.write_bytes(&v.to_be_bytes())?;
        self.bump_parent_count();
        Ok(())
    }

    #[cfg(not(feature = "float"))]
    fn encode_f32(&mut self, _v: f32) -> Result<()> {
        Err(WireError::NotSupported)
    }

    #[cfg(feature = "float")]
    fn encode_f64(&mut self, v: f64) -> Result<()> {
        self.write_bytes(&[head_byte(MT_SIMPLE, SIMPLE_FLOAT64)])?;
        self.write_bytes(&v.to_be_bytes())?;
        self.bump_parent_count();
        Ok(())
    }

    #[cfg(not(feature = "float"))]
    fn encode_f64(&mut self, _v: f64) -> Result<()> {
        Err(WireError::NotSupported)
    }

    fn encode_str(&mut self, v: &str) -> Result<()> {
        self.write_head(MT_TSTR, v.len() as u64)?;
        self.write_bytes(v.as_bytes())?;
        self.bump_parent_count();
        Ok(())
    }

    fn encode_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.write_head(MT_BSTR, v.len() as u64)?;
        self.write_bytes(v)?;
        self.bump_parent_count();
        Ok(())
    }

    fn start_array(&mut self, len: Option<usize>) -> Result<()> {
        match len {
            Some(n) => self.write_head(MT_ARRAY, n as u64)?,
            None => {
                let at = self.reserve_len()?;
                self.stack.push(OpenContainer { head_at: at, count: 0 });
            }
        }
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        if let Some(top) = self.stack.pop() {
            self.patch_len(MT_ARRAY, top.head_at, top.count)?;
            self.bump_parent_count();
        }
        Ok(())
    }

    fn start_map(&mut self, len: Option<usize>) -> Result<()> {
        match len {
            Some(n) => self.write_head(MT_MAP, n as u64)?,
            None => {
                let at = self.reserve_len()?;
                self.stack.push(OpenContainer { head_at: at, count: 0 });
            }
        }
        Ok(())
    }

    fn end_map(&mut self) -> Result<()> {
        if let Some(top) = self.stack.pop() {
            // Map count is pairs, not items; each key+value bumped the count twice.
            self.patch_len(MT_MAP, top.head_at, top.count / 2)?;
            self.bump_parent_count();
        }
        Ok(())
    }

    fn encode_key(&mut self, key: MapKey<'_>) -> Result<()> {
        match key {
            MapKey::Id(id) => self.encode_u64(id as u64),
            MapKey::Name(name) => self.encode_str(name),
        }
    }
}

/// Binary decoder over a caller-supplied byte slice.
pub struct BinaryDecoder<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> BinaryDecoder<'buf> {
    pub fn new(buf: &'buf [u8]) -> Self {
        BinaryDecoder { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'buf [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn peek_byte(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or(WireError::EndOfBuffer)
    }

    fn take(&mut self, n: usize) -> Result<&'buf [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(WireError::EndOfBuffer);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_head(&mut self) -> Result<(u8, u8)> {
        let b = self.take(1)?[0];
        Ok((major_of(b), additional_of(b)))
    }

    /// Reads the additional-information payload of the current head as a raw `u64`, given the
    /// additional-info nibble already extracted by the caller.
    fn read_value(&mut self, ai: u8) -> Result<u64> {
        match ai {
            0..=23 => Ok(ai as u64),
            AI_ONE_BYTE => Ok(self.take(1)?[0] as u64),
            AI_TWO_BYTES => {
                let bytes = self.take(2)?;
                Ok(u16::from_be_bytes(bytes.try_into().unwrap()) as u64)
            }
            AI_FOUR_BYTES => {
                let bytes = self.take(4)?;
                Ok(u32::from_be_bytes(bytes.try_into().unwrap()) as u64)
            }
            AI_EIGHT_BYTES => {
                let bytes = self.take(8)?;
                Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
            }
            _ => Err(WireError::MalformedEncoding),
        }
    }

    fn expect_major(&mut self, expected: u8) -> Result<u8> {
        let (major, ai) = self.read_head()?;
        if major != expected {
            // Un-read the head byte so the caller's `skip()` still works.
            self.pos -= 1;
            return Err(WireError::UnexpectedType(major_name(expected)));
        }
        Ok(ai)
    }

    /// Skips exactly one CBOR item (scalar, string, or a whole nested array/map), used by
    /// `skip()` and by array-size-mismatch recovery (§4.1.1).
    fn skip_item(&mut self) -> Result<()> {
        let (major, ai) = self.read_head()?;
        match major {
            MT_UINT | MT_NINT => {
                self.read_value(ai)?;
            }
            MT_BSTR | MT_TSTR => {
                let len = self.read_value(ai)? as usize;
                self.take(len)?;
            }
            MT_ARRAY => {
                if ai == AI_INDEFINITE {
                    while self.peek_byte()? != head_byte(MT_SIMPLE, SIMPLE_BREAK) {
                        self.skip_item()?;
                    }
                    self.take(1)?;
                } else {
                    let n = self.read_value(ai)?;
                    for _ in 0..n {
                        self.skip_item()?;
                    }
                }
            }
            MT_MAP => {
                if ai == AI_INDEFINITE {
                    while self.peek_byte()? != head_byte(MT_SIMPLE, SIMPLE_BREAK) {
                        self.skip_item()?;
                        self.skip_item()?;
                    }
                    self.take(1)?;
                } else {
                    let n = self.read_value(ai)?;
                    for _ in 0..2 * n {
                        self.skip_item()?;
                    }
                }
            }
            MT_TAG => {
                self.read_value(ai)?;
                self.skip_item()?;
            }
            MT_SIMPLE => match ai {
                SIMPLE_FLOAT16 => {
                    self.take(2)?;
                }
                SIMPLE_FLOAT32 => {
                    self.take(4)?;
                }
                SIMPLE_FLOAT64 => {
                    self.take(8)?;
                }
                AI_ONE_BYTE => {
                    self.take(1)?;
                }
                _ => {}
            },
            _ => return Err(WireError::MalformedEncoding),
        }
        Ok(())
    }
}

fn major_name(major: u8) -> &'static str {
    match major {
        MT_UINT => "uint",
        MT_NINT => "nint",
        MT_BSTR => "bstr",
        MT_TSTR => "tstr",
        MT_ARRAY => "array",
        MT_MAP => "map",
        MT_TAG => "tag",
        MT_SIMPLE => "simple",
        _ => "unknown",
    }
}

impl<'buf> ValueDecoder for BinaryDecoder<'buf> {
    fn is_forward_only(&self) -> bool {
        false
    }

    fn decode_null(&mut self) -> Result<()> {
        let (major, ai) = self.read_head()?;
        if major == MT_SIMPLE && ai == SIMPLE_NULL {
            Ok(())
        } else {
            self.pos -= 1;
            Err(WireError::UnexpectedType("null"))
        }
    }

    fn decode_bool(&mut self) -> Result<bool> {
        let (major, ai) = self.read_head()?;
        if major != MT_SIMPLE {
            self.pos -= 1;
            return Err(WireError::UnexpectedType("bool"));
        }
        match ai {
            SIMPLE_TRUE => Ok(true),
            SIMPLE_FALSE => Ok(false),
            _ => Err(WireError::UnexpectedType("bool")),
        }
    }

    fn decode_u64(&mut self) -> Result<u64> {
        let ai = self.expect_major(MT_UINT)?;
        self.read_value(ai)
    }

    fn decode_i64(&mut self) -> Result<i64> {
        let (major, ai) = self.read_head()?;
        match major {
            MT_UINT => {
                let v = self.read_value(ai)?;
                i64::try_from(v).map_err(|_| WireError::Overflow)
            }
            MT_NINT => {
                let v = self.read_value(ai)?;
                let v = i64::try_from(v).map_err(|_| WireError::Overflow)?;
                Ok(-1 - v)
            }
            _ => {
                self.pos -= 1;
                Err(WireError::UnexpectedType("int"))
            }
        }
    }

    #[cfg(feature = "float")]
    fn decode_f32(&mut self) -> Result<f32> {
        let (major, ai) = self.read_head()?;
        if major != MT_SIMPLE || ai != SIMPLE_FLOAT32 {
            self.pos -= 1;
            return Err(WireError::UnexpectedType("f32"));
        }
        let bytes = self.take(4)?;
        Ok(f32::from_be_bytes(bytes.try_into().unwrap()))
    }

    #[cfg(not(feature = "float"))]
    fn decode_f32(&mut self) -> Result<f32> {
        Err(WireError::NotSupported)
    }

    #[cfg(feature = "float")]
    fn decode_f64(&mut self) -> Result<f64> {
        let (major, ai) = self.read_head()?;
        if major != MT_SIMPLE || ai != SIMPLE_FLOAT64 {
            self.pos -= 1;
            return Err(WireError::UnexpectedType("f64"));
        }
        let bytes = self.take(8)?;
        Ok(f64::from_be_bytes(bytes.try_into().unwrap()))
    }

    #[cfg(not(feature = "float"))]
    fn decode_f64(&mut self) -> Result<f64> {
        Err(WireError::NotSupported)
    }

    fn decode_str(&mut self, visit: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        let ai = self.expect_major(MT_TSTR)?;
        let len = self.read_value(ai)? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
        visit(s)
    }

    fn decode_bytes(&mut self, visit: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        let ai = self.expect_major(MT_BSTR)?;
        let len = self.read_value(ai)? as usize;
        let bytes = self.take(len)?;
        visit(bytes)
    }

    fn decode_list(&mut self, visit: &mut dyn FnMut(&mut dyn ValueDecoder) -> Result<bool>) -> Result<()> {
        let ai = self.expect_major(MT_ARRAY)?;
        if ai == AI_INDEFINITE {
            loop {
                if self.peek_byte()? == head_byte(MT_SIMPLE, SIMPLE_BREAK) {
                    self.take(1)?;
                    break;
                }
                if !visit(self)? {
                    break;
                }
            }
            Ok(())
        } else {
            let n = self.read_value(ai)?;
            for _ in 0..n {
                if !visit(self)? {
                    return Ok(());
                }
            }
            Ok(())
        }
    }

    fn decode_map(
        &mut self,
        visit: &mut dyn FnMut(&mut dyn ValueDecoder, MapKey<'_>) -> Result<bool>,
    ) -> Result<()> {
        let ai = self.expect_major(MT_MAP)?;
        let mut remaining_pairs: Option<u64> = if ai == AI_INDEFINITE {
            None
        } else {
            Some(self.read_value(ai)?)
        };
        loop {
            match remaining_pairs {
                Some(0) => break,
                None => {
                    if self.peek_byte()? == head_byte(MT_SIMPLE, SIMPLE_BREAK) {
                        self.take(1)?;
                        break;
                    }
                }
                _ => {}
            }
            let key = self.decode_map_key()?;
            let go_on = visit(self, key)?;
            if let Some(n) = remaining_pairs.as_mut() {
                *n -= 1;
            }
            if !go_on {
                break;
            }
        }
        Ok(())
    }

    fn skip(&mut self) -> Result<()> {
        self.skip_item()
    }
}

impl<'buf> BinaryDecoder<'buf> {
    /// Map keys are either a uint or a tstr (§2(b) symmetric key naming). Decoding one leaves
    /// `self` positioned at the associated value.
    fn decode_map_key(&mut self) -> Result<MapKey<'buf>> {
        let (major, ai) = self.read_head()?;
        match major {
            MT_UINT => {
                let v = self.read_value(ai)?;
                let id = u16::try_from(v).map_err(|_| WireError::Overflow)?;
                Ok(MapKey::Id(id))
            }
            MT_TSTR => {
                let len = self.read_value(ai)? as usize;
                let bytes = self.take(len)?;
                let s = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
                Ok(MapKey::Name(s))
            }
            _ => {
                self.pos -= 1;
                Err(WireError::UnexpectedType("map key"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalar_round_trip() {
        let mut buf = [0u8; 32];
        let mut enc = BinaryEncoder::new(&mut buf);
        enc.encode_u32(24).unwrap();
        let len = enc.len();
        let mut dec = BinaryDecoder::new(&buf[..len]);
        assert_eq!(dec.decode_u64().unwrap(), 24);
    }

    #[test]
    fn encodes_concrete_struct_example() {
        // §8 testable property 10: {0x601: 24.0f32, 0x602: 10.0f32, 0x603: 0u64}
        let mut buf = [0u8; 64];
        let mut enc = BinaryEncoder::new(&mut buf);
        enc.start_map(Some(3)).unwrap();
        enc.encode_u16(0x601).unwrap();
        enc.encode_f32(24.0).unwrap();
        enc.encode_u16(0x602).unwrap();
        enc.encode_f32(10.0).unwrap();
        enc.encode_u16(0x603).unwrap();
        enc.encode_u64(0).unwrap();
        enc.end_map().unwrap();
        let len = enc.len();
        let expected: &[u8] = &[
            0xA3, 0x19, 0x06, 0x01, 0xFA, 0x41, 0xC0, 0x00, 0x00, 0x19, 0x06, 0x02, 0xFA, 0x41,
            0x20, 0x00, 0x00, 0x19, 0x06, 0x03, 0x00,
        ];
        assert_eq!(&buf[..len], expected);
    }

    #[test]
    fn deferred_length_list_backfills_count() {
        let mut buf = [0u8; 32];
        let mut enc = BinaryEncoder::new(&mut buf);
        enc.start_array(None).unwrap();
        enc.encode_u8(1).unwrap();
        enc.encode_u8(2).unwrap();
        enc.encode_u8(3).unwrap();
        enc.end_array().unwrap();
        let len = enc.len();
        let mut dec = BinaryDecoder::new(&buf[..len]);
        let mut seen = Vec::new();
        dec.decode_list(&mut |d| {
            seen.push(d.decode_u64()?);
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn array_size_mismatch_then_skip_consumes_whole_list() {
        let mut buf = [0u8; 32];
        let mut enc = BinaryEncoder::new(&mut buf);
        enc.start_array(Some(3)).unwrap();
        enc.encode_u8(1).unwrap();
        enc.encode_u8(2).unwrap();
        enc.encode_u8(3).unwrap();
        enc.end_array().unwrap();
        let len = enc.len();

        let mut dec = BinaryDecoder::new(&buf[..len]);
        // Simulate the fixed-size-array destination rejecting a 3-element list (expects 4).
        let before = dec.position();
        let ai = dec.expect_major(MT_ARRAY).unwrap();
        let n = dec.read_value(ai).unwrap();
        assert_eq!(n, 3);
        // Roll back and skip instead, as §4.1.1 requires on a non-forward-only rejection.
        dec = BinaryDecoder::new(&buf[..len]);
        assert_eq!(dec.position(), 0);
        dec.skip().unwrap();
        assert_eq!(dec.position(), len);
        let _ = before;
    }

    #[test]
    fn decode_map_yields_id_and_name_keys() {
        let mut buf = [0u8; 64];
        let mut enc = BinaryEncoder::new(&mut buf);
        enc.start_map(Some(2)).unwrap();
        enc.encode_key(MapKey::Id(0x300)).unwrap();
        enc.encode_f32(24.0).unwrap();
        enc.encode_key(MapKey::Name("totalVoltage")).unwrap();
        enc.encode_f32(25.0).unwrap();
        enc.end_map().unwrap();
        let len = enc.len();

        let mut dec = BinaryDecoder::new(&buf[..len]);
        let mut ids = Vec::new();
        dec.decode_map(&mut |d, key| {
            match key {
                MapKey::Id(id) => ids.push(format!("id:{:x}", id)),
                MapKey::Name(n) => ids.push(format!("name:{}", n)),
            }
            let _ = d.decode_f32()?;
            Ok(true)
        })
        .unwrap();
        assert_eq!(ids, vec!["id:300", "name:totalVoltage"]);
    }
}
