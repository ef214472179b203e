/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Subsets (§3.4): a 32-bit label a node carries so it can be swept up in a bulk operation
//! (persist to storage, periodic live report) without the caller enumerating nodes by hand.

/// A bitmask of subset membership. The two bits the protocol itself assigns meaning to are
/// [`Subset::PERSISTED`] and [`Subset::LIVE`]; the remaining bits are free for application use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subset(u32);

impl Subset {
    pub const NONE: Subset = Subset(0);
    /// Included in save/load of the persisted snapshot (§6.4).
    pub const PERSISTED: Subset = Subset(1 << 0);
    /// Included in the periodic report a server publishes (§4.7 `publish(subset)`).
    pub const LIVE: Subset = Subset(1 << 1);

    pub const fn new(bits: u32) -> Self {
        Subset(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Subset) -> Subset {
        Subset(self.0 | other.0)
    }

    /// True when `self` carries every bit set in `query`: the predicate `nodes_in_subset(s)`
    /// applies per node (§3.4).
    pub const fn contains(self, query: Subset) -> bool {
        self.0 & query.0 == query.0
    }

    /// A user-defined subset bit beyond the two protocol-reserved ones, numbered from 0.
    pub const fn user_defined(bit: u32) -> Subset {
        Subset(1 << (bit + 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_requires_every_queried_bit() {
        let both = Subset::PERSISTED.union(Subset::LIVE);
        assert!(both.contains(Subset::PERSISTED));
        assert!(both.contains(Subset::LIVE));
        assert!(both.contains(both));
        assert!(!Subset::PERSISTED.contains(both));
    }

    #[test]
    fn user_defined_bits_do_not_collide_with_protocol_bits() {
        let custom = Subset::user_defined(0);
        assert_ne!(custom, Subset::PERSISTED);
        assert_ne!(custom, Subset::LIVE);
    }
}
