//! X-MAC protocol engine
//!
//! A duty-cycled, preamble-sampling MAC for discrete-event wireless network
//! simulation. Nodes sleep for most of each cycle, senders strobe RTS
//! preambles until the receiver's periodic wake-up catches one, and the
//! exchange completes with a CTS / DATA / ACK handshake.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

#![no_std]

#[cfg(any(test, feature="std"))]
extern crate std;

pub mod timer;

pub mod frame;

pub mod phy;

pub mod mac;

pub mod error;

pub mod prelude;

#[cfg(feature="std")]
pub mod sim;


/// Timestamps and durations are counted in simulation steps
pub type Ts = u64;

/// Node identifier within a simulation
pub type NodeId = u16;

/// Frame destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// A single node
    Node(NodeId),
    /// All nodes in range
    Broadcast,
}

impl Address {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Address::Broadcast)
    }

    /// Check whether a frame to this address should be accepted by `id`
    pub fn accepts(&self, id: NodeId) -> bool {
        match self {
            Address::Broadcast => true,
            Address::Node(n) => *n == id,
        }
    }
}

impl From<NodeId> for Address {
    fn from(id: NodeId) -> Self {
        Address::Node(id)
    }
}
