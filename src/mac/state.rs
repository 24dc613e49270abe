//! Per-node X-MAC protocol state
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use bitflags::bitflags;
use strum::{Display, EnumIter, IntoStaticStr};

use crate::{Address, frame::Frame};

/// X-MAC protocol states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum XmacState {
    /// Radio off between wake-ups
    Sleep,
    /// Periodic wake-up, listening for preambles
    Cs,
    /// Carrier sensing before sending
    CsStart,
    /// Listening for follow-up traffic after an exchange
    CsEnd,
    SendingRts,
    SendingCts,
    SendingData,
    SendingAck,
    WaitingCts,
    WaitingData,
    WaitingAck,
    /// Backing off after a busy channel at the start of a send
    BoStart,
}

/// Events driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum Event {
    TimeOut,
    UpperSend,
    RtsReceived,
    CtsReceived,
    DataReceived,
    AckReceived,
    SendComplete,
    ChannelBusy,
    ChannelFree,
    Collision,
    FrameStart,
}

/// Side effect executed by the MAC after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum Action {
    /// Power the radio and query the channel
    AskChannel,
    RadioOn,
    RadioOff,
    /// Build the RTS for the pending DATA frame and send it
    BeginRts,
    /// Hand the received DATA payload to the upper layer
    DeliverUp,
    /// Send the frame belonging to the new state
    Transmit,
    None,
}

bitflags! {
    /// Protocol condition flags
    pub struct Flags: u8 {
        const CHANNEL_BUSY      = 0b001;
        const DATA_PENDING      = 0b010;
        const WAITING_BROADCAST = 0b100;
    }
}

/// Mutable protocol record, one per node
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolState {
    state: XmacState,
    seq: u64,
    action: Action,

    /// Preamble being strobed
    rts: Option<Frame>,
    /// Outgoing DATA frame
    data: Option<Frame>,
    /// DATA frame received in the current exchange
    inbound: Option<Frame>,
    /// Most recently received frame of any kind
    received: Option<Frame>,

    /// Peer of the exchange in progress
    peer: Option<Address>,

    flags: Flags,
    backoff_retries: u8,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolState {
    pub fn new() -> Self {
        Self {
            state: XmacState::Sleep,
            seq: 0,
            action: Action::None,
            rts: None,
            data: None,
            inbound: None,
            received: None,
            peer: None,
            flags: Flags::empty(),
            backoff_retries: 0,
        }
    }

    pub fn state(&self) -> XmacState {
        self.state
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Commit a transition, invalidating every timer armed so far
    pub fn set_state(&mut self, state: XmacState, action: Action) {
        self.state = state;
        self.action = action;
        self.seq += 1;
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: Flags, value: bool) {
        self.flags.set(flag, value);
    }

    pub fn data_pending(&self) -> bool {
        self.flags.contains(Flags::DATA_PENDING)
    }

    pub fn waiting_broadcast(&self) -> bool {
        self.flags.contains(Flags::WAITING_BROADCAST)
    }

    pub fn channel_busy(&self) -> bool {
        self.flags.contains(Flags::CHANNEL_BUSY)
    }

    pub fn rts(&self) -> Option<&Frame> {
        self.rts.as_ref()
    }

    pub fn rts_mut(&mut self) -> Option<&mut Frame> {
        self.rts.as_mut()
    }

    pub fn set_rts(&mut self, rts: Frame) {
        self.rts = Some(rts);
    }

    pub fn data(&self) -> Option<&Frame> {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> Option<&mut Frame> {
        self.data.as_mut()
    }

    pub fn set_data(&mut self, data: Frame) {
        self.data = Some(data);
    }

    pub fn inbound(&self) -> Option<&Frame> {
        self.inbound.as_ref()
    }

    pub fn set_inbound(&mut self, frame: Frame) {
        self.inbound = Some(frame);
    }

    pub fn take_inbound(&mut self) -> Option<Frame> {
        self.inbound.take()
    }

    pub fn received(&self) -> Option<&Frame> {
        self.received.as_ref()
    }

    pub fn set_received(&mut self, frame: Frame) {
        self.received = Some(frame);
    }

    pub fn take_received(&mut self) -> Option<Frame> {
        self.received.take()
    }

    pub fn peer(&self) -> Option<Address> {
        self.peer
    }

    pub fn set_peer(&mut self, peer: Option<Address>) {
        self.peer = peer;
    }

    pub fn backoff_retries(&self) -> u8 {
        self.backoff_retries
    }

    pub fn inc_backoff(&mut self) -> u8 {
        self.backoff_retries = self.backoff_retries.saturating_add(1);
        self.backoff_retries
    }

    pub fn reset_backoff(&mut self) {
        self.backoff_retries = 0;
    }

    /// Drop the outgoing exchange, the send is complete or abandoned
    pub fn clear_send(&mut self) {
        self.flags.remove(Flags::DATA_PENDING);
        self.data = None;
        self.rts = None;
        self.backoff_retries = 0;
    }
}
