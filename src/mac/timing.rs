//! X-MAC cycle timing model
//!
//! Converts frame lengths, bit rate and cycle length into simulation-step
//! durations for every protocol phase.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::{Ts, error::ConfigError, frame::FrameKind};

use super::config::Config;
use super::state::XmacState;

#[derive(Debug, Clone, PartialEq)]
pub struct TimingModel {
    cycle: Ts,
    margin: Ts,

    rts: Ts,
    cts: Ts,
    ack: Ts,
    data: Ts,

    carrier_sense: Ts,
    max_preambles: u16,

    max_data_retries: u16,
    max_backoff_retries: u8,
    ack_required: bool,

    /// Phase of the wake-up within the cycle, set once a parent is adopted
    sync_offset: Option<f64>,
}

/// Airtime in steps, rounded up
fn airtime_steps(bits: u32, steps_per_second: u32, bits_per_second: u32) -> Ts {
    let n = bits as u64 * steps_per_second as u64;
    let d = bits_per_second as u64;
    (n + d - 1) / d
}

impl TimingModel {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        if config.bits_per_second == 0 {
            return Err(ConfigError::BitRate)
        }
        if config.steps_per_second == 0 {
            return Err(ConfigError::StepRate)
        }
        if config.rts_bits == 0 || config.cts_bits == 0 || config.ack_bits == 0 || config.data_bits == 0 {
            return Err(ConfigError::FrameLength)
        }
        if config.max_data_retries == 0 {
            return Err(ConfigError::DataRetries)
        }

        let cycle = config.cycle_length_ms as u64 * config.steps_per_second as u64 / 1000;
        if cycle == 0 {
            return Err(ConfigError::CycleLength)
        }

        let airtime = |bits| airtime_steps(bits, config.steps_per_second, config.bits_per_second);
        let (rts, cts, ack, data) = (
            airtime(config.rts_bits),
            airtime(config.cts_bits),
            airtime(config.ack_bits),
            airtime(config.data_bits),
        );
        let margin = config.transmission_margin;

        // One RTS plus the CTS window that follows it
        let period = rts + cts + 2 * margin;

        // Long enough to overlap a whole RTS wherever the train is
        let carrier_sense = period + rts + config.carrier_sense_margin;
        if carrier_sense >= cycle {
            return Err(ConfigError::CarrierSense{ carrier_sense, cycle })
        }

        let preambles = (cycle + period - 1) / period + 1;
        let max_preambles = u16::try_from(preambles).map_err(|_| ConfigError::Preambles(preambles))?;

        Ok(Self {
            cycle,
            margin,
            rts,
            cts,
            ack,
            data,
            carrier_sense,
            max_preambles,
            max_data_retries: config.max_data_retries,
            max_backoff_retries: config.max_backoff_retries,
            ack_required: config.ack_required,
            sync_offset: None,
        })
    }

    pub fn cycle_length(&self) -> Ts {
        self.cycle
    }

    pub fn margin(&self) -> Ts {
        self.margin
    }

    /// Time on air for a frame of the given kind
    pub fn airtime(&self, kind: FrameKind) -> Ts {
        match kind {
            FrameKind::Rts => self.rts,
            FrameKind::Cts => self.cts,
            FrameKind::Ack => self.ack,
            FrameKind::Data => self.data,
        }
    }

    /// Time to wait for a transmission of this kind to complete
    pub fn tx_delay(&self, kind: FrameKind) -> Ts {
        self.airtime(kind) + self.margin
    }

    /// Time to wait for a frame of this kind to be received,
    /// with extra slack for scheduling on the receiving side
    pub fn rx_delay(&self, kind: FrameKind) -> Ts {
        self.tx_delay(kind) + self.margin
    }

    /// Interval between consecutive preambles (RTS plus CTS window)
    pub fn preamble_period(&self) -> Ts {
        self.rts + self.rx_delay(FrameKind::Cts)
    }

    /// Number of preambles needed to cover a whole cycle
    pub fn max_preambles(&self) -> u16 {
        self.max_preambles
    }

    pub fn carrier_sense_duration(&self) -> Ts {
        self.carrier_sense
    }

    pub fn max_data_retries(&self) -> u16 {
        self.max_data_retries
    }

    pub fn max_backoff_retries(&self) -> u8 {
        self.max_backoff_retries
    }

    pub fn ack_required(&self) -> bool {
        self.ack_required
    }

    pub fn sync_offset(&self) -> Option<f64> {
        self.sync_offset
    }

    /// Sleep duration following a period of activity.
    ///
    /// Synchronised nodes with a known elapsed time sleep until their next
    /// wake-up phase, everyone else sleeps for the cycle less carrier sensing.
    pub fn sleep_duration(&self, elapsed: Option<Ts>) -> Ts {
        match (self.sync_offset, elapsed) {
            (Some(_), Some(now)) => self.next_phase(now),
            _ => self.cycle - self.carrier_sense,
        }
    }

    /// Delay from `now` to the next wake-up phase, in (0, cycle]
    pub fn next_phase(&self, now: Ts) -> Ts {
        let phase = (self.sync_offset.unwrap_or(0.0) * self.cycle as f64) as Ts % self.cycle;
        let pos = now % self.cycle;

        if phase > pos {
            phase - pos
        } else {
            self.cycle - pos + phase
        }
    }

    /// Sleep after overhearing a broadcast RTS with `remaining` preambles to
    /// follow, waking as the final preamble starts
    pub fn broadcast_sleep(&self, remaining: u16) -> Ts {
        (remaining as Ts * self.preamble_period()).saturating_sub(self.rts)
    }

    /// Listening window for broadcast DATA after waking on the final preamble
    pub fn broadcast_wait(&self) -> Ts {
        self.rts + self.rx_delay(FrameKind::Cts) + self.rx_delay(FrameKind::Data)
    }

    /// Backoff after a busy channel, retrying at the next wake-up
    pub fn backoff_duration(&self) -> Ts {
        self.cycle - self.carrier_sense
    }

    /// Timeout for a newly entered state.
    ///
    /// SLEEP is the default sleep duration; the RTS-received rule computes
    /// its own sleep durations.
    pub fn state_duration(&self, state: XmacState, waiting_broadcast: bool, now: Ts) -> Ts {
        use XmacState::*;

        match state {
            Sleep => self.sleep_duration(Some(now)),
            Cs | CsStart | CsEnd => self.carrier_sense,
            SendingRts => self.tx_delay(FrameKind::Rts),
            SendingCts => self.tx_delay(FrameKind::Cts),
            SendingData => self.tx_delay(FrameKind::Data),
            SendingAck => self.tx_delay(FrameKind::Ack),
            WaitingCts => self.rx_delay(FrameKind::Cts),
            WaitingData if waiting_broadcast => self.broadcast_wait(),
            WaitingData => self.rx_delay(FrameKind::Data),
            WaitingAck => self.rx_delay(FrameKind::Ack),
            BoStart => self.backoff_duration(),
        }
    }

    /// Adopt a parent's cycle phase, shifted by the time one forwarded
    /// exchange takes, returning the new offset ratio in [0, 1)
    pub fn update_sync_offset(&mut self, parent: f64) -> f64 {
        let parent = if parent.is_finite() { parent } else { 0.0 };

        let mut shift = self.cts as f64 / 2.0 + self.rx_delay(FrameKind::Data) as f64;
        if self.ack_required {
            shift += self.tx_delay(FrameKind::Ack) as f64;
        }

        let mut offset = (parent + shift / self.cycle as f64) % 1.0;
        if offset < 0.0 {
            offset += 1.0;
        }
        if offset >= 1.0 {
            offset = 0.0;
        }

        self.sync_offset = Some(offset);
        offset
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn default_durations() {
        let t = TimingModel::new(&Config::default()).unwrap();

        // 120 bits at 250 kbps in microsecond steps
        assert_eq!(t.airtime(FrameKind::Rts), 480);
        assert_eq!(t.airtime(FrameKind::Ack), 352);
        assert_eq!(t.airtime(FrameKind::Data), 4096);

        assert_eq!(t.cycle_length(), 100_000);
        assert_eq!(t.preamble_period(), 1160);
        assert_eq!(t.carrier_sense_duration(), 1740);
        assert_eq!(t.sleep_duration(None), 98_260);
        assert_eq!(t.max_preambles(), 88);
    }

    #[test]
    fn invariants_hold_for_valid_configs() {
        for cycle_length_ms in [20, 50, 100, 250, 1000] {
            for bits_per_second in [19_200, 100_000, 250_000, 1_000_000] {
                for transmission_margin in [0, 10, 250] {
                    let c = Config{ cycle_length_ms, bits_per_second, transmission_margin, ..Default::default() };
                    let t = match TimingModel::new(&c) {
                        Ok(t) => t,
                        Err(_) => continue,
                    };

                    for k in FrameKind::iter() {
                        assert_eq!(t.rx_delay(k), t.tx_delay(k) + t.margin());
                    }
                    assert_eq!(t.sleep_duration(None) + t.carrier_sense_duration(), t.cycle_length());
                    assert!(t.max_preambles() as u64 * t.preamble_period() >= t.cycle_length());
                }
            }
        }
    }

    #[test]
    fn invalid_configs() {
        let c = Config{ bits_per_second: 0, ..Default::default() };
        assert_eq!(TimingModel::new(&c), Err(ConfigError::BitRate));

        let c = Config{ cycle_length_ms: 0, ..Default::default() };
        assert_eq!(TimingModel::new(&c), Err(ConfigError::CycleLength));

        let c = Config{ max_data_retries: 0, ..Default::default() };
        assert_eq!(TimingModel::new(&c), Err(ConfigError::DataRetries));

        let c = Config{ cycle_length_ms: 1, ..Default::default() };
        assert!(matches!(TimingModel::new(&c), Err(ConfigError::CarrierSense{ .. })));
    }

    #[test]
    fn broadcast_sleep_ends_on_final_preamble() {
        let t = TimingModel::new(&Config::default()).unwrap();

        assert_eq!(t.broadcast_sleep(0), 0);
        assert_eq!(t.broadcast_sleep(1), 1160 - 480);
        assert_eq!(t.broadcast_sleep(10), 10 * 1160 - 480);
        assert!(t.broadcast_sleep(t.max_preambles() - 2) < t.cycle_length());

        // Heard on the first preamble, the final one is over a cycle away
        assert_eq!(t.broadcast_sleep(t.max_preambles() - 1), 87 * 1160 - 480);
        assert!(t.broadcast_sleep(t.max_preambles() - 1) > t.cycle_length());
    }

    #[test]
    fn sync_offset_wraps() {
        let mut t = TimingModel::new(&Config::default()).unwrap();
        assert_eq!(t.sync_offset(), None);

        // CTS / 2 + DATA rx delay + ACK tx delay
        let shift = (240.0 + 4296.0 + 452.0) / 100_000.0;

        let o = t.update_sync_offset(0.0);
        assert!((o - shift).abs() < 1e-9);

        let o = t.update_sync_offset(0.99);
        assert!(o >= 0.0 && o < 1.0);
        assert!((o - (0.99 + shift - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn synchronised_sleep_aligns_to_phase() {
        let mut t = TimingModel::new(&Config::default()).unwrap();

        // Unsynchronised nodes always use the default
        assert_eq!(t.sleep_duration(Some(12_345)), 98_260);

        t.update_sync_offset(0.25 - (240.0 + 4296.0 + 452.0) / 100_000.0);

        // Phase at 25_000 steps into each cycle
        let s = t.sleep_duration(Some(10_000));
        assert!((14_999..=15_001).contains(&s));

        let s = t.sleep_duration(Some(130_000));
        assert!((94_999..=95_001).contains(&s));

        // Without an elapsed time the default is used
        assert_eq!(t.sleep_duration(None), 98_260);
    }
}
