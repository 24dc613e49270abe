//! Radio / physical layer interface
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::fmt::Debug;

use strum::{Display, IntoStaticStr};

use crate::frame::Frame;

/// Radio operating state as reported by the physical layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum RadioState {
    Off,
    Listening,
    Receiving,
    Transmitting,
}

impl RadioState {
    /// A radio that is neither off nor listening cannot start a transmission
    pub fn is_busy(&self) -> bool {
        match self {
            RadioState::Off | RadioState::Listening => false,
            _ => true,
        }
    }
}

/// Asynchronous notifications from the physical layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum RadioEvent {
    /// Carrier sense result, channel in use
    ChannelBusy,
    /// Carrier sense result, channel clear
    ChannelFree,
    /// The last `transmit` has left the antenna
    SendingTerminated,
    /// Start-of-frame delimiter detected
    FrameStart,
    /// Reception was corrupted by overlapping transmissions
    Collision,
}

/// Physical layer operations used by the MAC.
///
/// Carrier sensing and transmission are asynchronous, their results come back
/// as [`RadioEvent`]s.
pub trait Phy {
    type Error: Debug;

    /// Power the radio on (listening) or off
    fn set_radio(&mut self, on: bool) -> Result<(), Self::Error>;

    /// Start a carrier sense query
    fn carrier_sense(&mut self) -> Result<(), Self::Error>;

    /// Start transmitting a frame
    fn transmit(&mut self, frame: &Frame) -> Result<(), Self::Error>;

    /// Fetch the current radio state
    fn radio_state(&self) -> RadioState;
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;

    /// Operations recorded by the mock radio
    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Radio(bool),
        CarrierSense,
        Transmit(Frame),
    }

    #[derive(Debug)]
    struct Inner {
        state: RadioState,
        ops: Vec<Op>,
    }

    /// Mock radio recording every MAC request
    #[derive(Clone, Debug)]
    pub struct MockPhy (Arc<Mutex<Inner>>);

    impl MockPhy {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner{ state: RadioState::Off, ops: Vec::new() })))
        }

        /// Override the reported radio state
        pub fn set_state(&mut self, state: RadioState) {
            self.0.lock().unwrap().state = state;
        }

        /// Drain recorded operations
        pub fn take(&mut self) -> Vec<Op> {
            core::mem::take(&mut self.0.lock().unwrap().ops)
        }

        /// Drain recorded operations, keeping only transmitted frames
        pub fn take_frames(&mut self) -> Vec<Frame> {
            self.take().into_iter().filter_map(|o| match o {
                Op::Transmit(f) => Some(f),
                _ => None,
            }).collect()
        }
    }

    impl Default for MockPhy {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Phy for MockPhy {
        type Error = ();

        fn set_radio(&mut self, on: bool) -> Result<(), Self::Error> {
            let mut i = self.0.lock().unwrap();
            i.ops.push(Op::Radio(on));
            if !i.state.is_busy() {
                i.state = match on {
                    true => RadioState::Listening,
                    false => RadioState::Off,
                };
            }
            Ok(())
        }

        fn carrier_sense(&mut self) -> Result<(), Self::Error> {
            self.0.lock().unwrap().ops.push(Op::CarrierSense);
            Ok(())
        }

        fn transmit(&mut self, frame: &Frame) -> Result<(), Self::Error> {
            self.0.lock().unwrap().ops.push(Op::Transmit(frame.clone()));
            Ok(())
        }

        fn radio_state(&self) -> RadioState {
            self.0.lock().unwrap().state
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn busy_states() {
        assert!(!RadioState::Off.is_busy());
        assert!(!RadioState::Listening.is_busy());
        assert!(RadioState::Receiving.is_busy());
        assert!(RadioState::Transmitting.is_busy());
    }
}
