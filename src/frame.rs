//! X-MAC frame model
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use heapless::Vec;
use strum::{Display, EnumIter, IntoStaticStr};

use crate::{Address, NodeId, error::PayloadError};

pub const MAX_PAYLOAD_LEN: usize = 128;

/// Upper-layer payload carried by DATA frames, with owned storage.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub destination: Address,

    pub priority: u8,

    data: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Payload {
    pub fn new(destination: Address, priority: u8, data: &[u8]) -> Result<Self, PayloadError> {
        let data = Vec::from_slice(data).map_err(|_| PayloadError::TooLong(data.len()))?;

        Ok(Self { destination, priority, data })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Wire frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum FrameKind {
    Rts,
    Cts,
    Ack,
    Data,
}

/// Frame object, created by the MAC and immutable once handed to the radio.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    kind: FrameKind,

    pub source: NodeId,

    pub destination: Address,

    /// Transmit signal strength in dBm
    pub signal_strength: i16,

    /// Header length in bits
    pub header_len: u16,

    /// Remaining attempts, or the RTS stamp echoed by a CTS
    retries: u16,

    pub ack_request: bool,

    pub priority: u8,

    payload: Option<Payload>,
}

impl Frame {
    fn control(kind: FrameKind, source: NodeId, destination: Address, retries: u16) -> Frame {
        Frame {
            kind,
            source,
            destination,
            signal_strength: 0,
            header_len: 0,
            retries,
            ack_request: false,
            priority: 0,
            payload: None,
        }
    }

    pub fn rts(source: NodeId, destination: Address, retries: u16) -> Frame {
        Self::control(FrameKind::Rts, source, destination, retries)
    }

    /// Generate a CTS answering the provided RTS, echoing its retry stamp
    pub fn cts_for(rts: &Frame, source: NodeId) -> Frame {
        let mut f = Self::control(FrameKind::Cts, source, Address::Node(rts.source), rts.retries);
        f.priority = rts.priority;
        f
    }

    /// Generate an ACK for the provided DATA frame
    pub fn ack_for(data: &Frame, source: NodeId) -> Frame {
        let mut f = Self::control(FrameKind::Ack, source, Address::Node(data.source), data.retries);
        f.priority = data.priority;
        f
    }

    /// Wrap an upper-layer payload, destination and priority follow the payload.
    /// Broadcast frames are never acknowledged.
    pub fn data(source: NodeId, payload: Payload, ack_request: bool, retries: u16) -> Frame {
        Frame {
            kind: FrameKind::Data,
            source,
            destination: payload.destination,
            signal_strength: 0,
            header_len: 0,
            retries,
            ack_request: ack_request && !payload.destination.is_broadcast(),
            priority: payload.priority,
            payload: Some(payload),
        }
    }

    pub fn with_header_len(mut self, bits: u16) -> Self {
        self.header_len = bits;
        self
    }

    pub fn with_signal_strength(mut self, dbm: i16) -> Self {
        self.signal_strength = dbm;
        self
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn retries(&self) -> u16 {
        self.retries
    }

    /// Consume one attempt, returning the remaining count (floored at zero)
    pub fn decrement_retry(&mut self) -> u16 {
        self.retries = self.retries.saturating_sub(1);
        self.retries
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decrement_floors_at_zero() {
        let mut rts = Frame::rts(1, Address::Node(2), 2);

        assert_eq!(rts.decrement_retry(), 1);
        assert_eq!(rts.decrement_retry(), 0);
        for _ in 0..5 {
            assert_eq!(rts.decrement_retry(), 0);
        }
        assert_eq!(rts.retries(), 0);
    }

    #[test]
    fn data_inherits_from_payload() {
        let p = Payload::new(Address::Node(7), 3, &[1, 2, 3]).unwrap();
        let f = Frame::data(1, p.clone(), true, 4);

        assert_eq!(f.kind(), FrameKind::Data);
        assert_eq!(f.destination, Address::Node(7));
        assert_eq!(f.priority, 3);
        assert_eq!(f.retries(), 4);
        assert!(f.ack_request);
        assert_eq!(f.payload(), Some(&p));
    }

    #[test]
    fn broadcast_data_never_requests_ack() {
        let p = Payload::new(Address::Broadcast, 0, &[0xaa]).unwrap();
        let f = Frame::data(1, p, true, 1);

        assert!(!f.ack_request);
    }

    #[test]
    fn responses_address_the_requester() {
        let mut rts = Frame::rts(1, Address::Node(2), 9);
        rts.decrement_retry();

        let cts = Frame::cts_for(&rts, 2);
        assert_eq!(cts.kind(), FrameKind::Cts);
        assert_eq!(cts.source, 2);
        assert_eq!(cts.destination, Address::Node(1));
        assert_eq!(cts.retries(), 8);

        let p = Payload::new(Address::Node(2), 0, &[]).unwrap();
        let data = Frame::data(1, p, true, 3);
        let ack = Frame::ack_for(&data, 2);
        assert_eq!(ack.kind(), FrameKind::Ack);
        assert_eq!(ack.destination, Address::Node(1));
        assert!(ack.payload().is_none());
    }

    #[test]
    fn payload_length_limit() {
        let big = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            Payload::new(Address::Node(1), 0, &big),
            Err(PayloadError::TooLong(MAX_PAYLOAD_LEN + 1))
        );
        assert!(Payload::new(Address::Node(1), 0, &big[..MAX_PAYLOAD_LEN]).is_ok());
    }
}
