//! X-MAC Timer API
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::Ts;

/// Timer request handed to the scheduler, stamped with the protocol state
/// sequence number it was armed for.
///
/// Timers are never cancelled, a delivery whose stamp no longer matches the
/// current sequence number is stale and is dropped by the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacTimer {
    seq: u64,
}

impl MacTimer {
    pub fn new(seq: u64) -> Self {
        Self { seq }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Timer trait provides access to the discrete-event scheduler.
///
/// All times are in simulation steps and relative to the start of the simulation
pub trait Timer {
    /// Returns the current simulation time
    fn now(&self) -> Ts;

    /// Request `timer` be delivered back to the MAC after `delay` steps
    fn schedule(&mut self, delay: Ts, timer: MacTimer);
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::*;

    #[derive(Debug, Default)]
    struct Inner {
        now: Ts,
        scheduled: Vec<(Ts, MacTimer)>,
    }

    /// Mock timer implementation to assist with testing
    #[derive(Clone, Debug, Default)]
    pub struct MockTimer (Arc<Mutex<Inner>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&mut self, now: Ts) {
            self.0.lock().unwrap().now = now;
        }

        pub fn inc(&mut self, steps: Ts) {
            self.0.lock().unwrap().now += steps;
        }

        /// Most recently armed timer and its delay
        pub fn last(&self) -> Option<(Ts, MacTimer)> {
            self.0.lock().unwrap().scheduled.last().copied()
        }

        /// Drain all armed timers
        pub fn take(&mut self) -> Vec<(Ts, MacTimer)> {
            core::mem::take(&mut self.0.lock().unwrap().scheduled)
        }
    }

    impl super::Timer for MockTimer {
        fn now(&self) -> Ts {
            self.0.lock().unwrap().now
        }

        fn schedule(&mut self, delay: Ts, timer: MacTimer) {
            self.0.lock().unwrap().scheduled.push((delay, timer));
        }
    }
}
