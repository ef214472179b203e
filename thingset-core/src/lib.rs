/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The ThingSet object model and registry (§3), the request engine (§4.2, §4.8), and the
//! transport-agnostic multi-frame reassembly algorithm shared by every fragmenting transport
//! (§4.3).
//!
//! This crate never touches a socket or a CAN peripheral: those live in `thingset-can` and
//! `thingset-ip`, which depend on it for [`registry::Registry`], [`engine::RequestEngine`], and
//! [`fragment::Reassembler`].

pub mod access;
pub mod engine;
pub mod fragment;
pub mod gateway;
pub mod node;
pub mod persist;
pub mod registry;
pub mod subset;
pub mod verb;

pub use access::{Access, Operation, Role, RoleSet};
pub use engine::RequestEngine;
pub use node::{Capabilities, CustomHandled, Node, NodeKind};
pub use registry::{Registry, RegistryError};
pub use subset::Subset;
pub use verb::Verb;
