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
//! CAN transport binding for the ThingSet protocol (§4.4): the 29-bit CAN ID algebra, dynamic
//! address claiming, a request/response channel over an in-crate ISO-TP segmenter, and
//! unsolicited multi-frame reports.
//!
//! `can_id` and `address_claim` have no hardware dependency and are exercised directly in their
//! own unit tests; `transport` and `report` are generic over [`transport::CanInterface`], so they
//! too are testable without a bus. [`socketcan_iface`] (behind the `socketcan` feature) is the
//! only piece that touches a real Linux SocketCAN device.

pub mod address_claim;
pub mod can_id;
pub mod isotp;
pub mod report;
pub mod transport;

#[cfg(feature = "socketcan")]
pub mod socketcan_iface;

pub use address_claim::{Action, AddressClaim, Event, State as AddressClaimState};
pub use can_id::{CanId, MessageType, MultiFrameType};
pub use report::{decode_report_body, publish_report, ReportReceiver};
pub use transport::{CanInterface, RequestChannel};
