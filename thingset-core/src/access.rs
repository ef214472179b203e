/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Access control (§3.3): an 8-bit mask, two nibbles (read / write) times three roles (user,
//! expert, manufacturer). A node carries one mask describing what it permits; a request carries
//! a role set describing who is asking. The request is allowed when every bit the operation
//! requires is also set in the node's mask.

/// A single role a request can be attributed to. Requests are not restricted to one role: the
/// server attaches a [`RoleSet`], typically "all roles" for a trusted local caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Role {
    User = 0,
    Expert = 1,
    Manufacturer = 2,
}

/// Which half of the access nibble pair an operation consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// The set of roles a request is executed under. The server's default is "every role granted",
/// matching §4.2's "the server defaults to all-roles".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const NONE: RoleSet = RoleSet(0);
    pub const ALL: RoleSet = RoleSet(0b0000_0111);

    pub const fn single(role: Role) -> Self {
        RoleSet(1 << role as u8)
    }

    pub const fn with(self, role: Role) -> Self {
        RoleSet(self.0 | (1 << role as u8))
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & (1 << role as u8) != 0
    }

    /// The access bits this role set would need present in a node's mask to perform `op`.
    const fn required_mask(self, op: Operation) -> u8 {
        let shift = match op {
            Operation::Read => 0,
            Operation::Write => 4,
        };
        self.0 << shift
    }
}

/// A node's access mask (§3.3). Bits 0-2 are read-user/expert/manufacturer, bits 4-6 are the
/// write equivalents; bits 3 and 7 are reserved and always clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access(u8);

impl Access {
    pub const NONE: Access = Access(0);

    pub const READ_USER: u8 = 0b0000_0001;
    pub const READ_EXPERT: u8 = 0b0000_0010;
    pub const READ_MANUFACTURER: u8 = 0b0000_0100;
    pub const WRITE_USER: u8 = 0b0001_0000;
    pub const WRITE_EXPERT: u8 = 0b0010_0000;
    pub const WRITE_MANUFACTURER: u8 = 0b0100_0000;

    pub const READ_ANY: u8 = Self::READ_USER | Self::READ_EXPERT | Self::READ_MANUFACTURER;
    pub const WRITE_ANY: u8 = Self::WRITE_USER | Self::WRITE_EXPERT | Self::WRITE_MANUFACTURER;

    /// A property readable and writable by every role: the common case for application state.
    pub const READ_WRITE: Access = Access(Self::READ_ANY | Self::WRITE_ANY);
    /// Readable by every role, writable by none: the common case for measured values.
    pub const READ_ONLY: Access = Access(Self::READ_ANY);

    pub const fn new(mask: u8) -> Self {
        Access(mask & (Self::READ_ANY | Self::WRITE_ANY))
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// True if `roles` includes at least one role with `op` permission in this mask.
    pub const fn allows(self, roles: RoleSet, op: Operation) -> bool {
        self.0 & roles.required_mask(op) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_roles_satisfies_any_single_role_requirement() {
        let access = Access::new(Access::READ_EXPERT);
        assert!(access.allows(RoleSet::ALL, Operation::Read));
        assert!(!access.allows(RoleSet::ALL, Operation::Write));
    }

    #[test]
    fn a_role_without_the_bit_is_denied() {
        let access = Access::new(Access::READ_MANUFACTURER);
        assert!(!access.allows(RoleSet::single(Role::User), Operation::Read));
        assert!(access.allows(RoleSet::single(Role::Manufacturer), Operation::Read));
    }

    #[test]
    fn read_write_covers_both_operations_for_every_role() {
        for role in [Role::User, Role::Expert, Role::Manufacturer] {
            let roles = RoleSet::single(role);
            assert!(Access::READ_WRITE.allows(roles, Operation::Read));
            assert!(Access::READ_WRITE.allows(roles, Operation::Write));
            assert!(Access::READ_ONLY.allows(roles, Operation::Read));
            assert!(!Access::READ_ONLY.allows(roles, Operation::Write));
        }
    }
}
