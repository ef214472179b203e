/***************************************************************************************************
 * Copyright (c) 2024 ThingSet Contributors. All rights reserved. See LICENSE header in lib.rs.
 **************************************************************************************************/
//! Dynamic CAN address acquisition (§4.4.2): a small explicit state machine rather than a
//! callback-driven timer loop, per §9's redesign note on modelling virtual callbacks as an event
//! channel. The caller owns the clock and the CAN peripheral; this type only decides, given the
//! next [`Event`], what [`Action`] (if any) to take and what state to move to. It never sends a
//! frame or reads a timer itself — see `transport.rs` for the piece that drives real hardware
//! through this machine.

use rand::Rng;

use crate::can_id::{CanId, MessageType, CLAIMABLE_RANGE};

/// States of the address-claim machine (§4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unbound,
    Discovering,
    Claiming,
    Bound,
}

/// An event the caller feeds into the machine (§4.4.2).
#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// The discover frame for the current attempt has gone out on the bus.
    DiscoverSent,
    /// Another node claimed `address` with a different EUI than ours.
    ClaimReceived { address: u8, eui: u64 },
    /// A discover frame targeted our already-bound address arrived.
    DiscoverReceivedForUs,
    /// The 500 ms claim-window timer elapsed with no competing claim observed.
    Timeout,
    /// The claim frame we just sent either collided on the bus (`true`, tx error counter
    /// increased) or went out cleanly (`false`).
    ClaimTransmitResult { collided: bool },
}

/// What the machine wants the caller to do in response to an [`Event`] (§4.4.2). The caller is
/// responsible for actually building the CAN frame (priority, bridge, etc. are transport
/// concerns) and for reading back the result as a further [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Emit a discover frame addressed to `desired`, source = anonymous, carrying `nonce`.
    SendDiscover { desired: u8, nonce: u32 },
    /// Emit a claim frame from `desired` carrying the local EUI-64.
    SendClaim { desired: u8, eui: u64 },
}

/// Address-claim state machine for one local node (§4.4.2). One instance per node that needs a
/// dynamic CAN address; `local_eui` is that node's EUI-64 tiebreaker.
pub struct AddressClaim {
    state: State,
    desired: u8,
    local_eui: u64,
    nonce: u32,
}

impl AddressClaim {
    /// A fresh machine in [`State::Unbound`], preferring `desired` as its first address attempt.
    pub fn new(local_eui: u64, desired: u8) -> Self {
        AddressClaim { state: State::Unbound, desired: clamp_to_claimable(desired), local_eui, nonce: 0 }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn bound_address(&self) -> Option<u8> {
        (self.state == State::Bound).then_some(self.desired)
    }

    /// Starts (or restarts) the discover/claim cycle: `unbound -> discovering` (§4.4.2).
    pub fn start(&mut self, rng: &mut impl Rng) -> Action {
        self.nonce = rng.gen();
        self.state = State::Discovering;
        Action::SendDiscover { desired: self.desired, nonce: self.nonce }
    }

    /// Feeds one event, returning the next action to take (if any) and leaving `self.state`
    /// updated.
    pub fn on_event(&mut self, event: Event, rng: &mut impl Rng) -> Option<Action> {
        match (self.state, event) {
            (State::Discovering, Event::ClaimReceived { address, eui }) if address == self.desired && eui != self.local_eui => {
                // Someone else already holds our desired address: reroll and restart (§4.4.2).
                self.desired = random_claimable(rng);
                Some(self.start(rng))
            }
            (State::Discovering, Event::Timeout) => {
                self.state = State::Claiming;
                Some(Action::SendClaim { desired: self.desired, eui: self.local_eui })
            }
            (State::Claiming, Event::ClaimTransmitResult { collided: false }) => {
                self.state = State::Bound;
                None
            }
            (State::Claiming, Event::ClaimTransmitResult { collided: true }) => {
                // Simultaneous claim detected via the peripheral's arbitration (tx error
                // counter); the slower claimant (us) retries with a fresh address.
                self.desired = random_claimable(rng);
                Some(self.start(rng))
            }
            (State::Bound, Event::DiscoverReceivedForUs) => Some(Action::SendClaim { desired: self.desired, eui: self.local_eui }),
            // Any other (state, event) pair is either a no-op for this machine (an unrelated
            // address claim on the bus) or not meaningful in the current state.
            _ => None,
        }
    }

    /// Builds the CAN ID for a discover frame (anonymous source, network-management type,
    /// targeting `desired`).
    pub fn discover_can_id(desired: u8) -> CanId {
        CanId::new()
            .set_message_type(MessageType::NetworkManagement)
            .set_source(crate::can_id::ANONYMOUS_ADDRESS)
            .set_target(desired)
    }

    /// Builds the CAN ID for a claim frame sent from `desired`.
    pub fn claim_can_id(desired: u8) -> CanId {
        CanId::new().set_message_type(MessageType::NetworkManagement).set_source(desired)
    }
}

fn clamp_to_claimable(address: u8) -> u8 {
    if CLAIMABLE_RANGE.contains(&address) {
        address
    } else {
        *CLAIMABLE_RANGE.start()
    }
}

fn random_claimable(rng: &mut impl Rng) -> u8 {
    rng.gen_range(CLAIMABLE_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn happy_path_reaches_bound_without_collision() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut claim = AddressClaim::new(0x1122_3344_5566_7788, 0x10);
        let action = claim.start(&mut rng);
        assert!(matches!(action, Action::SendDiscover { desired: 0x10, .. }));
        assert_eq!(claim.state(), State::Discovering);

        let action = claim.on_event(Event::Timeout, &mut rng).unwrap();
        assert!(matches!(action, Action::SendClaim { desired: 0x10, .. }));
        assert_eq!(claim.state(), State::Claiming);

        assert!(claim.on_event(Event::ClaimTransmitResult { collided: false }, &mut rng).is_none());
        assert_eq!(claim.state(), State::Bound);
        assert_eq!(claim.bound_address(), Some(0x10));
    }

    #[test]
    fn collision_during_claim_rerolls_and_retries() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut claim = AddressClaim::new(42, 0x10);
        claim.start(&mut rng);
        claim.on_event(Event::Timeout, &mut rng);
        assert_eq!(claim.state(), State::Claiming);

        claim.on_event(Event::ClaimTransmitResult { collided: true }, &mut rng);
        assert_eq!(claim.state(), State::Discovering);
    }

    #[test]
    fn bound_node_reclaims_on_discover_for_us() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut claim = AddressClaim::new(99, 0x20);
        claim.start(&mut rng);
        claim.on_event(Event::Timeout, &mut rng);
        claim.on_event(Event::ClaimTransmitResult { collided: false }, &mut rng);
        assert_eq!(claim.state(), State::Bound);

        let action = claim.on_event(Event::DiscoverReceivedForUs, &mut rng).unwrap();
        assert!(matches!(action, Action::SendClaim { desired: 0x20, eui: 99 }));
    }

    /// §8 #7: two nodes simultaneously claiming the same address end up with distinct,
    /// in-range addresses after at most `K` retries.
    #[test]
    fn two_simultaneous_claimants_converge_on_distinct_addresses() {
        let mut rng_a = StdRng::seed_from_u64(10);
        let mut rng_b = StdRng::seed_from_u64(20);
        let mut a = AddressClaim::new(0xAAAA, 0x30);
        let mut b = AddressClaim::new(0xBBBB, 0x30);
        a.start(&mut rng_a);
        b.start(&mut rng_b);

        const MAX_ROUNDS: usize = 50;
        for _ in 0..MAX_ROUNDS {
            if a.bound_address().is_some() && b.bound_address().is_some() {
                break;
            }
            if a.state() == State::Discovering {
                a.on_event(Event::Timeout, &mut rng_a);
            }
            if b.state() == State::Discovering {
                b.on_event(Event::Timeout, &mut rng_b);
            }
            // Arbitration: if both are claiming the same address this round, exactly one wins.
            if a.state() == State::Claiming && b.state() == State::Claiming && a.desired == b.desired {
                a.on_event(Event::ClaimTransmitResult { collided: true }, &mut rng_a);
                b.on_event(Event::ClaimTransmitResult { collided: false }, &mut rng_b);
            } else {
                if a.state() == State::Claiming {
                    a.on_event(Event::ClaimTransmitResult { collided: false }, &mut rng_a);
                }
                if b.state() == State::Claiming {
                    b.on_event(Event::ClaimTransmitResult { collided: false }, &mut rng_b);
                }
            }
        }

        let addr_a = a.bound_address().expect("a converges within the round budget");
        let addr_b = b.bound_address().expect("b converges within the round budget");
        assert_ne!(addr_a, addr_b);
        assert!(CLAIMABLE_RANGE.contains(&addr_a));
        assert!(CLAIMABLE_RANGE.contains(&addr_b));
        assert_ne!(addr_a, crate::can_id::ANONYMOUS_ADDRESS);
        assert_ne!(addr_a, crate::can_id::BROADCAST_ADDRESS);
    }
}
