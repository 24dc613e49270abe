//! Boot schedule strategies
//!
//! Selects the delay before a node's first wake-up, free-running nodes
//! start at a random phase while backbone nodes follow their sync offset.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use rand_core::RngCore;

use crate::Ts;

use super::timing::TimingModel;

pub trait Schedule {
    /// Delay from `now` until the first wake-up
    fn boot_delay(&mut self, timing: &TimingModel, now: Ts) -> Ts;
}

/// Random phase within the first cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RandomStart<R> {
    rng: R,
}

impl <R: RngCore> RandomStart<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl <R: RngCore> Schedule for RandomStart<R> {
    fn boot_delay(&mut self, timing: &TimingModel, _now: Ts) -> Ts {
        self.rng.next_u64() % timing.cycle_length()
    }
}

/// Wake on the node's cycle phase, aligned to an adopted parent offset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aligned;

impl Schedule for Aligned {
    fn boot_delay(&mut self, timing: &TimingModel, now: Ts) -> Ts {
        timing.next_phase(now)
    }
}

/// Fixed boot delay, used by the simulation bench and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed(pub Ts);

impl Schedule for Fixed {
    fn boot_delay(&mut self, _timing: &TimingModel, _now: Ts) -> Ts {
        self.0
    }
}

#[cfg(test)]
mod test {
    use rand::{SeedableRng, rngs::StdRng};

    use crate::mac::Config;
    use super::*;

    #[test]
    fn random_start_within_cycle() {
        let t = TimingModel::new(&Config::default()).unwrap();
        let mut s = RandomStart::new(StdRng::seed_from_u64(17));

        for _ in 0..100 {
            assert!(s.boot_delay(&t, 0) < t.cycle_length());
        }
    }

    #[test]
    fn aligned_follows_offset() {
        let mut t = TimingModel::new(&Config::default()).unwrap();

        // Without an offset wake at the start of the next cycle
        assert_eq!(Aligned.boot_delay(&t, 0), t.cycle_length());
        assert_eq!(Aligned.boot_delay(&t, 40_000), 60_000);

        let o = t.update_sync_offset(0.0);
        let phase = (o * t.cycle_length() as f64) as Ts;
        assert_eq!(Aligned.boot_delay(&t, 0), phase);
    }

    #[test]
    fn fixed_delay() {
        let t = TimingModel::new(&Config::default()).unwrap();
        assert_eq!(Fixed(1234).boot_delay(&t, 99), 1234);
    }
}
