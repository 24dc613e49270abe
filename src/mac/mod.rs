//! Medium Access Control (MAC) layer module.
//! Contains the MAC traits and the X-MAC implementation.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub mod config;
pub use config::Config;

pub mod timing;
pub use timing::TimingModel;

pub mod state;
pub use state::{Action, Event, Flags, ProtocolState, XmacState};

pub mod fsm;
pub use fsm::{Outcome, SendReport, StateMachine, Transition};

pub mod schedule;
pub use schedule::{Aligned, Fixed, RandomStart, Schedule};

pub mod xmac;
pub use xmac::{MacStats, XMac};

use crate::{frame::{Frame, Payload}, phy::RadioEvent, timer::MacTimer};

/// Notifications delivered to the MAC by its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Payload from the upper layer
    UpperSend(Payload),
    /// Frame received by the physical layer
    LowerReceive(Frame),
    /// Physical layer status
    Radio(RadioEvent),
    /// Scheduled timer expiry
    Timer(MacTimer),
}

/// Generic MAC trait, implemented by all MACs
pub trait Mac {
    type Error;

    /// Queue a payload for transmission
    fn on_upper_send(&mut self, payload: Payload) -> Result<(), Self::Error>;

    /// Handle a frame received from the physical layer
    fn on_lower_receive(&mut self, frame: Frame) -> Result<(), Self::Error>;

    /// Handle a physical layer status notification
    fn on_radio_event(&mut self, event: RadioEvent) -> Result<(), Self::Error>;

    /// Handle a timer expiry
    fn on_timer(&mut self, timer: MacTimer) -> Result<(), Self::Error>;

    /// Dispatch a notification
    fn handle(&mut self, notification: Notification) -> Result<(), Self::Error> {
        match notification {
            Notification::UpperSend(p) => self.on_upper_send(p),
            Notification::LowerReceive(f) => self.on_lower_receive(f),
            Notification::Radio(e) => self.on_radio_event(e),
            Notification::Timer(t) => self.on_timer(t),
        }
    }
}

/// Upper layer receiving payloads from the MAC
pub trait Upper {
    /// Deliver a received payload
    fn deliver(&mut self, payload: Payload);

    /// Notify completion of a previously queued send
    fn send_done(&mut self, _report: SendReport) {}
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;

    #[derive(Debug, Default)]
    struct Inner {
        delivered: Vec<Payload>,
        reports: Vec<SendReport>,
    }

    /// Mock upper layer collecting delivered payloads and send reports
    #[derive(Clone, Debug, Default)]
    pub struct MockUpper (Arc<Mutex<Inner>>);

    impl MockUpper {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn delivered(&self) -> Vec<Payload> {
            self.0.lock().unwrap().delivered.clone()
        }

        pub fn reports(&self) -> Vec<SendReport> {
            self.0.lock().unwrap().reports.clone()
        }
    }

    impl Upper for MockUpper {
        fn deliver(&mut self, payload: Payload) {
            self.0.lock().unwrap().delivered.push(payload);
        }

        fn send_done(&mut self, report: SendReport) {
            self.0.lock().unwrap().reports.push(report);
        }
    }
}
