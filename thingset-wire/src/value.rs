/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The abstract encode/decode operation set shared by the binary and text codecs (§4.1 of the
//! spec). `thingset-core`'s request engine and structured encode/decode are written against
//! these traits so that a single handler body serves both CBOR and JSON, and both fixed-size and
//! forward-only (streaming) buffering.
//!
//! Variable-length data (strings, byte strings, list/map elements) is delivered through a
//! callback rather than returned as a borrow, because the streaming variants do not keep the
//! whole payload resident: a borrow that outlived the call could be invalidated by the next
//! chunk refill. This mirrors the lazy-iteration contract in §4.1.3 (`decode_list`/`decode_map`
//! already work this way in the protocol; this crate applies the same shape to scalars so one
//! trait covers every mode).

use crate::error::Result;

/// A map key as the wire actually carries it: either the node's integer ID or its name, per the
/// symmetric key naming described in §2(b).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKey<'a> {
    Id(u16),
    Name(&'a str),
}

impl<'a> MapKey<'a> {
    pub fn as_id(self) -> Option<u16> {
        match self {
            MapKey::Id(id) => Some(id),
            MapKey::Name(_) => None,
        }
    }

    pub fn as_name(self) -> Option<&'a str> {
        match self {
            MapKey::Name(name) => Some(name),
            MapKey::Id(_) => None,
        }
    }
}

/// Encoder-side operation set. Implemented by the fixed-size and streaming binary encoders, and
/// by the text (JSON) encoder.
pub trait ValueEncoder {
    /// True if this encoder is forward-only (streaming): callers must not expect to rewind or
    /// backfill a length prefix once more has been written.
    fn is_forward_only(&self) -> bool;

    fn encode_null(&mut self) -> Result<()>;
    fn encode_bool(&mut self, v: bool) -> Result<()>;
    fn encode_u64(&mut self, v: u64) -> Result<()>;
    fn encode_i64(&mut self, v: i64) -> Result<()>;
    fn encode_f32(&mut self, v: f32) -> Result<()>;
    fn encode_f64(&mut self, v: f64) -> Result<()>;
    fn encode_str(&mut self, v: &str) -> Result<()>;
    fn encode_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Begin a list. `len` is `Some(n)` for a definite-length list (fixed-size mode always
    /// supplies this); `None` requests an indefinite-length list, which is the only form a
    /// forward-only encoder can produce.
    fn start_array(&mut self, len: Option<usize>) -> Result<()>;
    fn end_array(&mut self) -> Result<()>;
    fn start_map(&mut self, len: Option<usize>) -> Result<()>;
    fn end_map(&mut self) -> Result<()>;

    /// Emits the single CBOR `null` (or, in text mode, the bare token) that separates a
    /// response's status byte from its payload (§4.1.1 `encode_preamble`).
    fn encode_preamble(&mut self) -> Result<()> {
        self.encode_null()
    }

    fn encode_key(&mut self, key: MapKey<'_>) -> Result<()> {
        match key {
            MapKey::Id(id) => self.encode_u64(id as u64),
            MapKey::Name(name) => self.encode_str(name),
        }
    }

    fn encode_u8(&mut self, v: u8) -> Result<()> {
        self.encode_u64(v as u64)
    }
    fn encode_u16(&mut self, v: u16) -> Result<()> {
        self.encode_u64(v as u64)
    }
    fn encode_u32(&mut self, v: u32) -> Result<()> {
        self.encode_u64(v as u64)
    }
    fn encode_i8(&mut self, v: i8) -> Result<()> {
        self.encode_i64(v as i64)
    }
    fn encode_i16(&mut self, v: i16) -> Result<()> {
        self.encode_i64(v as i64)
    }
    fn encode_i32(&mut self, v: i32) -> Result<()> {
        self.encode_i64(v as i64)
    }
}

/// Decoder-side operation set.
pub trait ValueDecoder {
    fn is_forward_only(&self) -> bool;

    fn decode_null(&mut self) -> Result<()>;
    fn decode_bool(&mut self) -> Result<bool>;
    fn decode_u64(&mut self) -> Result<u64>;
    fn decode_i64(&mut self) -> Result<i64>;
    fn decode_f32(&mut self) -> Result<f32>;
    fn decode_f64(&mut self) -> Result<f64>;

    /// Decodes a text string, handing borrowed chunks to `visit`. Fixed-size decoders call
    /// `visit` exactly once with the whole string; streaming decoders may call it more than
    /// once if the string straddles a chunk refill.
    fn decode_str(&mut self, visit: &mut dyn FnMut(&str) -> Result<()>) -> Result<()>;
    fn decode_bytes(&mut self, visit: &mut dyn FnMut(&[u8]) -> Result<()>) -> Result<()>;

    /// Invokes `visit` once per list element until the list ends or `visit` returns `Ok(false)`
    /// (§4.1.3 lazy-iteration contract).
    fn decode_list(&mut self, visit: &mut dyn FnMut(&mut dyn ValueDecoder) -> Result<bool>) -> Result<()>;

    /// Invokes `visit` once per map entry with the decoded key; `visit` must consume exactly one
    /// value from the decoder (or call `skip`) before returning, and returns `Ok(false)` to abort
    /// early.
    fn decode_map(
        &mut self,
        visit: &mut dyn FnMut(&mut dyn ValueDecoder, MapKey<'_>) -> Result<bool>,
    ) -> Result<()>;

    /// Discards the next item, whatever it is (scalar, string, or a whole nested
    /// array/map). Used by the request engine to skip unknown map keys (§4.1.3).
    fn skip(&mut self) -> Result<()>;

    fn decode_u8(&mut self) -> Result<u8> {
        let v = self.decode_u64()?;
        u8::try_from(v).map_err(|_| crate::error::WireError::Overflow)
    }
    fn decode_u16(&mut self) -> Result<u16> {
        let v = self.decode_u64()?;
        u16::try_from(v).map_err(|_| crate::error::WireError::Overflow)
    }
    fn decode_u32(&mut self) -> Result<u32> {
        let v = self.decode_u64()?;
        u32::try_from(v).map_err(|_| crate::error::WireError::Overflow)
    }
    fn decode_i8(&mut self) -> Result<i8> {
        let v = self.decode_i64()?;
        i8::try_from(v).map_err(|_| crate::error::WireError::Overflow)
    }
    fn decode_i16(&mut self) -> Result<i16> {
        let v = self.decode_i64()?;
        i16::try_from(v).map_err(|_| crate::error::WireError::Overflow)
    }
    fn decode_i32(&mut self) -> Result<i32> {
        let v = self.decode_i64()?;
        i32::try_from(v).map_err(|_| crate::error::WireError::Overflow)
    }
}

/// A scalar type that knows how to encode/decode itself through a [`ValueEncoder`]/
/// [`ValueDecoder`], the way `rs_minicbor`'s `EncodeItem`/`DecodeItem` let a generic caller write
/// `value.encode(buf)` instead of matching on a type tag by hand. `thingset-client` uses this to
/// offer a generic `get<T: WireValue>(...)` / `update<T: WireValue>(...)` facade over any node's
/// scalar value without the caller hand-picking `decode_f32` vs. `decode_u32`.
pub trait WireValue: Sized {
    fn encode(&self, enc: &mut dyn ValueEncoder) -> Result<()>;
    fn decode(dec: &mut dyn ValueDecoder) -> Result<Self>;
}

macro_rules! impl_wire_value_int {
    ($t:ty, $enc:ident, $dec:ident) => {
        impl WireValue for $t {
            fn encode(&self, enc: &mut dyn ValueEncoder) -> Result<()> {
                enc.$enc(*self)
            }
            fn decode(dec: &mut dyn ValueDecoder) -> Result<Self> {
                dec.$dec()
            }
        }
    };
}

impl_wire_value_int!(u8, encode_u8, decode_u8);
impl_wire_value_int!(u16, encode_u16, decode_u16);
impl_wire_value_int!(u32, encode_u32, decode_u32);
impl_wire_value_int!(u64, encode_u64, decode_u64);
impl_wire_value_int!(i8, encode_i8, decode_i8);
impl_wire_value_int!(i16, encode_i16, decode_i16);
impl_wire_value_int!(i32, encode_i32, decode_i32);
impl_wire_value_int!(i64, encode_i64, decode_i64);
impl_wire_value_int!(f32, encode_f32, decode_f32);
impl_wire_value_int!(f64, encode_f64, decode_f64);

impl WireValue for bool {
    fn encode(&self, enc: &mut dyn ValueEncoder) -> Result<()> {
        enc.encode_bool(*self)
    }
    fn decode(dec: &mut dyn ValueDecoder) -> Result<Self> {
        dec.decode_bool()
    }
}

impl WireValue for String {
    fn encode(&self, enc: &mut dyn ValueEncoder) -> Result<()> {
        enc.encode_str(self)
    }
    fn decode(dec: &mut dyn ValueDecoder) -> Result<Self> {
        let mut out = String::new();
        dec.decode_str(&mut |s| {
            out.push_str(s);
            Ok(())
        })?;
        Ok(out)
    }
}

impl WireValue for Vec<u8> {
    fn encode(&self, enc: &mut dyn ValueEncoder) -> Result<()> {
        enc.encode_bytes(self)
    }
    fn decode(dec: &mut dyn ValueDecoder) -> Result<Self> {
        let mut out = Vec::new();
        dec.decode_bytes(&mut |chunk| {
            out.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(out)
    }
}
