/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Binary (CBOR) codec (§4.1.1, §4.1.4). `fixed` encodes/decodes over a buffer held entirely in
//! memory; `streaming` does the same job over a rolling `2*CHUNK` window for transports that
//! cannot hold a whole message (CAN, UDP fragmentation — §4.3). Both share the definite-vs-
//! indefinite-length framing rules in `constants`.

pub mod constants;
pub mod fixed;
pub mod streaming;

pub use fixed::{BinaryDecoder, BinaryEncoder};
pub use streaming::{StreamingDecoder, StreamingEncoder};
