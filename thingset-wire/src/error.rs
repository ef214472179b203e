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
use std::result;
use thiserror::Error;

/// An alias for `Result<T, WireError>` used throughout this crate.
pub type Result<T> = result::Result<T, WireError>;

/// Failure while encoding or decoding a ThingSet binary or text payload. Produced by codec
/// operations in place of a panic (§4.1.1: "produce a domain error, not a panic").
#[derive(Copy, Clone, Error, Debug, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ran out of bytes before the value being decoded ended.
    #[error("insufficient bytes to decode the next item")]
    EndOfBuffer,
    /// The output buffer (fixed mode) or chunk callback (streaming mode) had no room left.
    #[error("insufficient space to encode the next item")]
    BufferFull,
    /// The next item's major type did not match what the caller asked to decode.
    #[error("unexpected CBOR/JSON type, expected {0}")]
    UnexpectedType(&'static str),
    /// A numeric value decoded but did not fit in the requested integer width.
    #[error("numeric value out of range for the target type")]
    Overflow,
    /// An array was an illegal size for the requested fixed destination.
    #[error("array size does not match the fixed destination (or is out of the permitted range)")]
    ArraySizeMismatch,
    /// A byte/text string contained a malformed UTF-8 sequence.
    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,
    /// The CBOR additional-information encoding, or JSON token stream, is malformed.
    #[error("malformed encoding")]
    MalformedEncoding,
    /// A map key was requested that the map input does not contain.
    #[error("map does not contain the requested key")]
    KeyNotPresent,
    /// The JSON tokenizer's fixed token table filled up before the document ended.
    #[error("token buffer exhausted")]
    TooManyTokens,
    /// Operation is not meaningful in the codec's current mode (e.g. asking a streaming decoder
    /// to rewind).
    #[error("operation not supported in this codec mode")]
    NotSupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_messages_are_non_empty() {
        assert!(!WireError::EndOfBuffer.to_string().is_empty());
        assert!(!WireError::UnexpectedType("array").to_string().contains("{0}"));
    }
}
