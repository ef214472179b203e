/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! The node taxonomy (§3.1). A [`Node`] is a trait object rather than a deep class hierarchy: the
//! per-kind behaviour table in §3.1 becomes a set of capability flags plus a handful of trait
//! methods with a "not supported" default, so a property that never writes simply never
//! overrides `decode_value`. This is the "replace deep templates with a tagged enum / trait
//! object" redesign (§9): a node's [`NodeKind`] is a plain tag used for dispatch decisions
//! (group vs. property vs. function), while its actual behaviour is reached through the trait,
//! never through a downcast.

use thingset_error::Status;
use thingset_wire::{Result as WireResult, ValueDecoder, ValueEncoder};

use crate::access::{Access, Operation, RoleSet};
use crate::subset::Subset;
use crate::verb::Verb;

/// The tag every node carries (§3.1). Dispatch in the request engine switches on this to decide
/// the default verb behaviour; it is never used for a downcast, only to pick a default-handler
/// branch before capability checks confirm the node actually supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Property,
    Group,
    Function,
    RecordArray,
    RecordMember,
}

/// Capability bits a node exposes (§3.1): queried by tag, not by downcast. The default set for
/// each [`NodeKind`] matches the table in §3.1; a concrete node may still deviate (e.g. a
/// read-only property clears `decodable` even though its kind's default allows it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub encodable: bool,
    pub decodable: bool,
    pub has_children: bool,
    pub invocable: bool,
    pub custom_request_handler: bool,
}

impl Capabilities {
    pub const fn none() -> Self {
        Capabilities {
            encodable: false,
            decodable: false,
            has_children: false,
            invocable: false,
            custom_request_handler: false,
        }
    }

    /// The default capability set for `kind`, per the §3.1 table. Properties are assumed
    /// writable (`decodable: true`); a read-only property clears it explicitly.
    pub const fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Property => Capabilities {
                encodable: true,
                decodable: true,
                has_children: false,
                invocable: false,
                custom_request_handler: false,
            },
            NodeKind::Group => Capabilities {
                encodable: false,
                decodable: false,
                has_children: true,
                invocable: false,
                custom_request_handler: false,
            },
            NodeKind::Function => Capabilities {
                encodable: true,
                decodable: true,
                has_children: true,
                invocable: true,
                custom_request_handler: false,
            },
            NodeKind::RecordArray => Capabilities {
                encodable: true,
                decodable: true,
                has_children: true,
                invocable: false,
                custom_request_handler: true,
            },
            NodeKind::RecordMember => Capabilities {
                encodable: true,
                decodable: true,
                has_children: true,
                invocable: false,
                custom_request_handler: false,
            },
        }
    }
}

/// Outcome of [`Node::handle_request`]: either the node fully handled the request itself (the
/// engine emits `status` and whatever the node already wrote to the response encoder), or it
/// declines and the engine falls back to default per-verb dispatch (§4.2).
pub enum CustomHandled {
    Handled(Status),
    NotHandled,
}

/// An addressable element of the object model (§3.1). Implementors are registered into a
/// [`crate::registry::Registry`] and looked up by ID or path; the engine reaches all node
/// behaviour through this trait, never through a concrete type.
pub trait Node: Send {
    fn id(&self) -> u16;
    fn parent_id(&self) -> u16;
    fn name(&self) -> &str;
    fn kind(&self) -> NodeKind;
    fn access(&self) -> Access;
    fn subset(&self) -> Subset {
        Subset::NONE
    }

    /// Capability set for this node instance. Defaults to the kind's table entry; override to
    /// narrow (e.g. a read-only property clears `decodable`).
    fn capabilities(&self) -> Capabilities {
        Capabilities::for_kind(self.kind())
    }

    /// True if `roles` may perform `op` on this node (§3.3).
    fn allows(&self, roles: RoleSet, op: Operation) -> bool {
        self.access().allows(roles, op)
    }

    /// Encodes this node's current value (§3.1 "encodable"). Properties encode their scalar;
    /// groups encode a map of children (handled generically by the engine, not here); functions
    /// encode their return value after `invoke` runs.
    fn encode_value(&self, _enc: &mut dyn ValueEncoder) -> WireResult<()> {
        Err(thingset_wire::WireError::NotSupported)
    }

    /// Decodes a new value into this node (§3.1 "decodable"). Called by UPDATE on a writable
    /// property or record member, and to decode each function argument.
    fn decode_value(&mut self, _dec: &mut dyn ValueDecoder) -> WireResult<()> {
        Err(thingset_wire::WireError::NotSupported)
    }

    /// Hook fired before a write is applied to this node (§4.2 UPDATE: "invoke `will_write`
    /// callback, decode into the child, invoke `did_write`"). Default is a no-op.
    fn will_write(&mut self) {}
    /// Hook fired after a write is applied.
    fn did_write(&mut self) {}

    /// Invokes this node as a function (§3.1 "invocable"). `args` yields the argument list;
    /// `ret` receives the encoded return value. A void function must still call
    /// `ret.encode_null()` — the engine writes exactly what `invoke` wrote, it does not invent a
    /// `null` on the implementor's behalf.
    fn invoke(&mut self, _args: &mut dyn ValueDecoder, _ret: &mut dyn ValueEncoder) -> Result<(), Status> {
        Err(Status::MethodNotAllowed)
    }

    /// Record-array access (§3.1, §9 proxy simplification — see `DESIGN.md`): `Some(n)` with the
    /// live element count when this node is a record array, used by the registry to resolve a
    /// decimal path segment into a child index.
    fn record_len(&self) -> Option<usize> {
        None
    }

    /// Custom per-request handling (§4.2): asked first on every dispatch. `index` carries a
    /// decimal path segment the registry could not resolve as a named child (the record-array
    /// indexing case). Returning [`CustomHandled::NotHandled`] (the default) falls through to
    /// the engine's default per-verb dispatch.
    fn handle_request(
        &mut self,
        _verb: Verb,
        _index: Option<usize>,
        _payload: &mut dyn ValueDecoder,
        _response: &mut dyn ValueEncoder,
    ) -> CustomHandled {
        CustomHandled::NotHandled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_match_the_table() {
        assert!(Capabilities::for_kind(NodeKind::Property).encodable);
        assert!(!Capabilities::for_kind(NodeKind::Group).encodable);
        assert!(Capabilities::for_kind(NodeKind::Group).has_children);
        assert!(Capabilities::for_kind(NodeKind::Function).invocable);
        assert!(Capabilities::for_kind(NodeKind::RecordArray).custom_request_handler);
    }
}
