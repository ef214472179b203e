/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Text (JSON) codec (§4.1.2). Unlike the binary codec there is only one buffering mode here:
//! JSON objects arriving over CAN or UDP are reassembled by the transport into a complete buffer
//! before tokenizing starts, since a token's byte range must stay valid for the whole decode.

pub mod decoder;
pub mod encoder;
pub mod tokenizer;

pub use decoder::TextDecoder;
pub use encoder::TextEncoder;
