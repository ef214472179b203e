/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! JSON text encoder over a caller-supplied fixed buffer (§4.1.2). Booleans emit as `0`/`1` per
//! the protocol's documented quirk (§9); byte strings, which JSON has no native representation
//! for, are emitted as lower-case hex strings — the printf-style per-type formatting §4.1.2
//! describes extended to a type JSON itself does not model.

use crate::error::{Result, WireError};
use crate::value::{MapKey, ValueEncoder};
use std::fmt::Write as _;

struct Frame {
    is_map: bool,
    items: usize,
    /// For maps: true when the next item emitted should be treated as a key (comma-separated,
    /// no leading colon); false when it is the value half of the current pair (colon-prefixed).
    at_key: bool,
}

/// Text (JSON) encoder over a fixed buffer.
pub struct TextEncoder<'buf> {
    buf: &'buf mut [u8],
    pos: usize,
    stack: Vec<Frame>,
}

impl<'buf> TextEncoder<'buf> {
    pub fn new(buf: &'buf mut [u8]) -> Self {
        TextEncoder { buf, pos: 0, stack: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    fn write_raw(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > self.buf.len() - self.pos {
            return Err(WireError::BufferFull);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Emits the separator (`,` or `:`) that precedes the item about to be written, based on the
    /// enclosing container's state, and returns whether we are inside an array/map at all.
    fn before_item(&mut self, is_key: bool) -> Result<()> {
        if let Some(top) = self.stack.last() {
            let (is_map, items, at_key) = (top.is_map, top.items, top.at_key);
            if is_map {
                if at_key {
                    if items > 0 {
                        self.write_raw(",")?;
                    }
                } else {
                    self.write_raw(":")?;
                }
            } else if items > 0 {
                self.write_raw(",")?;
            }
        }
        let _ = is_key;
        Ok(())
    }

    fn item_written(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            if top.is_map {
                if top.at_key {
                    top.at_key = false;
                } else {
                    top.at_key = true;
                    top.items += 1;
                }
            } else {
                top.items += 1;
            }
        }
    }

    fn write_escaped_str(&mut self, v: &str) -> Result<()> {
        self.write_raw("\"")?;
        for c in v.chars() {
            match c {
                '"' => self.write_raw("\\\"")?,
                '\\' => self.write_raw("\\\\")?,
                '\n' => self.write_raw("\\n")?,
                '\r' => self.write_raw("\\r")?,
                '\t' => self.write_raw("\\t")?,
                c if (c as u32) < 0x20 => {
                    let mut tmp = String::new();
                    write!(tmp, "\\u{:04x}", c as u32).map_err(|_| WireError::BufferFull)?;
                    self.write_raw(&tmp)?;
                }
                c => {
                    let mut tmp = [0u8; 4];
                    self.write_raw(c.encode_utf8(&mut tmp))?;
                }
            }
        }
        self.write_raw("\"")
    }
}

impl<'buf> ValueEncoder for TextEncoder<'buf> {
    fn is_forward_only(&self) -> bool {
        false
    }

    fn encode_null(&mut self) -> Result<()> {
        self.before_item(false)?;
        self.write_raw("null")?;
        self.item_written();
        Ok(())
    }

    fn encode_bool(&mut self, v: bool) -> Result<()> {
        self.before_item(false)?;
        self.write_raw(if v { "1" } else { "0" })?;
        self.item_written();
        Ok(())
    }

    fn encode_u64(&mut self, v: u64) -> Result<()> {
        self.before_item(false)?;
        let mut tmp = String::new();
        write!(tmp, "{v}").map_err(|_| WireError::BufferFull)?;
        self.write_raw(&tmp)?;
        self.item_written();
        Ok(())
    }

    fn encode_i64(&mut self, v: i64) -> Result<()> {
        self.before_item(false)?;
        let mut tmp = String::new();
        write!(tmp, "{v}").map_err(|_| WireError::BufferFull)?;
        self.write_raw(&tmp)?;
        self.item_written();
        Ok(())
    }

    #[cfg(feature = "float")]
    fn encode_f32(&mut self, v: f32) -> Result<()> {
        self.before_item(false)?;
        let mut tmp = String::new();
        write!(tmp, "{v}").map_err(|_| WireError::BufferFull)?;
        self.write_raw(&tmp)?;
        self.item_written();
        Ok(())
    }
    #[cfg(not(feature = "float"))]
    fn encode_f32(&mut self, _v: f32) -> Result<()> {
        Err(WireError::NotSupported)
    }

    #[cfg(feature = "float")]
    fn encode_f64(&mut self, v: f64) -> Result<()> {
        self.before_item(false)?;
        let mut tmp = String::new();
        write!(tmp, "{v}").map_err(|_| WireError::BufferFull)?;
        self.write_raw(&tmp)?;
        self.item_written();
        Ok(())
    }
    #[cfg(not(feature = "float"))]
    fn encode_f64(&mut self, _v: f64) -> Result<()> {
        Err(WireError::NotSupported)
    }

    fn encode_str(&mut self, v: &str) -> Result<()> {
        self.before_item(false)?;
        self.write_escaped_str(v)?;
        self.item_written();
        Ok(())
    }

    fn encode_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.before_item(false)?;
        self.write_raw("\"")?;
        let mut tmp = String::new();
        for byte in v {
            tmp.clear();
            write!(tmp, "{byte:02x}").map_err(|_| WireError::BufferFull)?;
            self.write_raw(&tmp)?;
        }
        self.write_raw("\"")?;
        self.item_written();
        Ok(())
    }

    fn start_array(&mut self, _len: Option<usize>) -> Result<()> {
        self.before_item(false)?;
        self.write_raw("[")?;
        self.stack.push(Frame { is_map: false, items: 0, at_key: false });
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        self.stack.pop();
        self.write_raw("]")?;
        self.item_written();
        Ok(())
    }

    fn start_map(&mut self, _len: Option<usize>) -> Result<()> {
        self.before_item(false)?;
        self.write_raw("{")?;
        self.stack.push(Frame { is_map: true, items: 0, at_key: true });
        Ok(())
    }

    fn end_map(&mut self) -> Result<()> {
        self.stack.pop();
        self.write_raw("}")?;
        self.item_written();
        Ok(())
    }

    fn encode_key(&mut self, key: MapKey<'_>) -> Result<()> {
        self.before_item(true)?;
        match key {
            MapKey::Id(id) => {
                let mut tmp = String::new();
                write!(tmp, "{id}").map_err(|_| WireError::BufferFull)?;
                self.write_raw(&tmp)?;
            }
            MapKey::Name(name) => self.write_escaped_str(name)?,
        }
        self.item_written();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_map_with_id_and_name_keys() {
        let mut buf = [0u8; 64];
        let mut enc = TextEncoder::new(&mut buf);
        enc.start_map(None).unwrap();
        enc.encode_key(MapKey::Id(0x300)).unwrap();
        enc.encode_f32(24.0).unwrap();
        enc.encode_key(MapKey::Name("flag")).unwrap();
        enc.encode_bool(true).unwrap();
        enc.end_map().unwrap();
        let len = enc.len();
        assert_eq!(&buf[..len], br#"{768:24,"flag":1}"#);
    }

    #[test]
    fn encodes_nested_array() {
        let mut buf = [0u8; 32];
        let mut enc = TextEncoder::new(&mut buf);
        enc.start_array(Some(3)).unwrap();
        enc.encode_u8(1).unwrap();
        enc.encode_u8(2).unwrap();
        enc.encode_u8(3).unwrap();
        enc.end_array().unwrap();
        let len = enc.len();
        assert_eq!(&buf[..len], b"[1,2,3]");
    }

    #[test]
    fn escapes_strings() {
        let mut buf = [0u8; 32];
        let mut enc = TextEncoder::new(&mut buf);
        enc.encode_str("a\"b").unwrap();
        let len = enc.len();
        assert_eq!(&buf[..len], br#""a\"b""#);
    }
}
