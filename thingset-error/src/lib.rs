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
//! Status codes and transport-facing error vocabulary shared by every crate in the ThingSet
//! workspace.
//!
//! [`Status`] mirrors the CoAP-derived one-byte status codes carried in every ThingSet
//! response (see the protocol's wire format). Component crates keep their own richer error
//! enums for internal diagnostics and convert to [`Status`] only at the request-engine boundary,
//! the same boundary-conversion shape the reference TPS client API uses to turn a C error code
//! into a Rust error (`tps_client_api::connector::from_c_error_code`).

use std::result;
use thiserror::Error;

/// An alias for `Result<T, Status>`, used at API boundaries that speak the wire vocabulary
/// directly.
pub type Result<T> = result::Result<T, Status>;

/// One-byte ThingSet response status code. Numeric values match the CoAP response codes the
/// protocol borrows them from.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
#[repr(u8)]
pub enum Status {
    /// A `create` request produced a new child node.
    #[error("created")]
    Created = 0x81,
    /// A `delete` request removed a node.
    #[error("deleted")]
    Deleted = 0x82,
    /// An `update` request succeeded.
    #[error("changed")]
    Changed = 0x84,
    /// A `get`/`fetch` request succeeded and carries a payload.
    #[error("content")]
    Content = 0x85,
    /// The request could not be parsed, or named a verb its target does not support.
    #[error("bad request")]
    BadRequest = 0xa0,
    /// The active role set does not grant the requested access.
    #[error("unauthorised")]
    Unauthorised = 0xa1,
    /// The node's access mask forbids the requested operation.
    #[error("forbidden")]
    Forbidden = 0xa3,
    /// No node matches the requested ID or path.
    #[error("not found")]
    NotFound = 0xa4,
    /// The verb does not apply to this node kind.
    #[error("method not allowed")]
    MethodNotAllowed = 0xa5,
    /// The request buffer ended before a complete request could be parsed.
    #[error("request incomplete")]
    RequestIncomplete = 0xa8,
    /// The request is well formed but conflicts with current state.
    #[error("conflict")]
    Conflict = 0xa9,
    /// The response would not fit in the available buffer.
    #[error("request too large")]
    RequestTooLarge = 0xad,
    /// The payload could not be encoded/decoded in the requested wire format.
    #[error("unsupported format")]
    UnsupportedFormat = 0xaf,
    /// An unexpected failure occurred while handling the request.
    #[error("internal server error")]
    InternalServerError = 0xc0,
    /// The verb or feature is recognised but not implemented by this node.
    #[error("not implemented")]
    NotImplemented = 0xc1,
    /// A forwarded request did not receive a reply from the downstream gateway target.
    #[error("gateway timeout")]
    GatewayTimeout = 0xc4,
    /// A `forward` verb was received by a node with gateway support disabled.
    #[error("not a gateway")]
    NotAGateway = 0xc5,
}

impl Status {
    /// The raw wire byte for this status.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// True for the four success codes (`created`, `deleted`, `changed`, `content`).
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(
            self,
            Status::Created | Status::Deleted | Status::Changed | Status::Content
        )
    }

    /// Recover a `Status` from its wire byte, if it names a status this crate knows about.
    pub const fn from_code(code: u8) -> Option<Status> {
        Some(match code {
            0x81 => Status::Created,
            0x82 => Status::Deleted,
            0x84 => Status::Changed,
            0x85 => Status::Content,
            0xa0 => Status::BadRequest,
            0xa1 => Status::Unauthorised,
            0xa3 => Status::Forbidden,
            0xa4 => Status::NotFound,
            0xa5 => Status::MethodNotAllowed,
            0xa8 => Status::RequestIncomplete,
            0xa9 => Status::Conflict,
            0xad => Status::RequestTooLarge,
            0xaf => Status::UnsupportedFormat,
            0xc0 => Status::InternalServerError,
            0xc1 => Status::NotImplemented,
            0xc4 => Status::GatewayTimeout,
            0xc5 => Status::NotAGateway,
            _ => return None,
        })
    }
}

/// Abstract transport failure, surfaced to client callers without exposing the concrete
/// transport's own error type. Not retried by any code in this workspace (§7: "not retried in
/// the core").
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket, CAN peripheral, or ISO-TP binding failed.
    #[error("transport send/receive failure: {0}")]
    Io(String),
    /// No response arrived before the caller's deadline.
    #[error("timed out waiting for a response")]
    Timeout,
    /// The transport (or an in-flight shutdown) closed the channel.
    #[error("transport is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_status_code() {
        let all = [
            Status::Created,
            Status::Deleted,
            Status::Changed,
            Status::Content,
            Status::BadRequest,
            Status::Unauthorised,
            Status::Forbidden,
            Status::NotFound,
            Status::MethodNotAllowed,
            Status::RequestIncomplete,
            Status::Conflict,
            Status::RequestTooLarge,
            Status::UnsupportedFormat,
            Status::InternalServerError,
            Status::NotImplemented,
            Status::GatewayTimeout,
            Status::NotAGateway,
        ];
        for status in all {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(Status::from_code(0x00), None);
    }

    #[test]
    fn success_codes_are_tagged() {
        assert!(Status::Content.is_success());
        assert!(!Status::BadRequest.is_success());
    }
}
