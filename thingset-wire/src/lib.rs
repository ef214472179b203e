/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy of this software
 * and associated documentation files (the "Software"), to deal in the Software without
 * restriction, including without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all copies or
 * substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
 * BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
 * DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
 **************************************************************************************************/
//! Wire-level encode/decode for the ThingSet protocol (§4.1): a binary CBOR codec and a text JSON
//! codec, each available in a fixed-buffer form and (binary only) a forward-only streaming form
//! for transports that fragment a message across several frames.
//!
//! [`value`] defines the `ValueEncoder`/`ValueDecoder` traits both codecs implement, so higher
//! layers (the request engine and structured encode/decode in `thingset-core`) are written once
//! against the trait objects and work unmodified against either wire format.
pub mod binary;
pub mod error;
pub mod text;
pub mod value;

pub use error::{Result, WireError};
pub use value::{MapKey, ValueDecoder, ValueEncoder, WireValue};
