//! X-MAC driver
//!
//! Translates notifications into state machine events, executes the
//! resulting actions against the radio and arms the follow-up timer.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{trace, debug, info, warn};

use crate::{Ts, NodeId};
use crate::error::MacError;
use crate::frame::{Frame, FrameKind, Payload};
use crate::phy::{Phy, RadioEvent};
use crate::timer::{MacTimer, Timer};

use super::{Mac, Upper};
use super::config::Config;
use super::fsm::{Outcome, SendReport, StateMachine, Transition};
use super::schedule::Schedule;
use super::state::{Action, Event, Flags, ProtocolState, XmacState};
use super::timing::TimingModel;

/// MAC statistics counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacStats {
    /// Timers discarded as superseded
    pub stale_timers: u32,
    /// Events not handled in the state they arrived in
    pub unexpected_events: u32,
    pub rts_sent: u32,
    pub data_sent: u32,
    /// Payloads handed to the upper layer
    pub delivered: u32,
    /// Sends acknowledged, or completed without acknowledgement
    pub sends_completed: u32,
    pub retries_exhausted: u32,
    pub backoff_exhausted: u32,
    /// Transmissions aborted as the radio was busy
    pub radio_unavailable: u32,
}

/// X-MAC instance, generic over Phy (P), Timer (T), Upper layer (U)
/// and boot Schedule (S)
pub struct XMac<P, T, U, S> {
    id: NodeId,
    config: Config,
    timing: TimingModel,
    machine: StateMachine,

    state: ProtocolState,
    stats: MacStats,

    phy: P,
    timer: T,
    upper: U,
    schedule: S,
}

impl <P, E, T, U, S> XMac<P, T, U, S>
where
    P: Phy<Error=E>,
    E: core::fmt::Debug,
    T: Timer,
    U: Upper,
    S: Schedule,
{
    /// Create a new MAC, validating the configuration
    pub fn new(id: NodeId, config: Config, phy: P, timer: T, upper: U, schedule: S) -> Result<Self, MacError<E>> {
        let timing = TimingModel::new(&config)?;

        debug!("Node {}: cycle {} steps, {} preambles of {} steps, carrier sense {} steps",
            id, timing.cycle_length(), timing.max_preambles(), timing.preamble_period(),
            timing.carrier_sense_duration());

        Ok(Self {
            id,
            config,
            timing,
            machine: StateMachine::new(id),
            state: ProtocolState::new(),
            stats: MacStats::default(),
            phy,
            timer,
            upper,
            schedule,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timing(&self) -> &TimingModel {
        &self.timing
    }

    pub fn protocol(&self) -> &ProtocolState {
        &self.state
    }

    pub fn state(&self) -> XmacState {
        self.state.state()
    }

    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    pub fn phy(&self) -> &P {
        &self.phy
    }

    pub fn upper(&self) -> &U {
        &self.upper
    }

    /// Power down and sleep until the first wake-up picked by the schedule
    pub fn start(&mut self) -> Result<(), MacError<E>> {
        let now = self.timer.now();
        let delay = self.schedule.boot_delay(&self.timing, now);

        debug!("Node {}: starting at {}, first wake-up in {} steps", self.id, now, delay);

        let t = self.machine.boot(&mut self.state, delay);
        self.apply(t, now)
    }

    /// Align this node's cycle to a parent's phase, returning the new offset
    pub fn adopt_parent(&mut self, parent: f64) -> f64 {
        let offset = self.timing.update_sync_offset(parent);
        info!("Node {}: adopted parent offset {:.4}, sync offset now {:.4}", self.id, parent, offset);
        offset
    }

    fn inject(&mut self, event: Event) -> Result<(), MacError<E>> {
        let now = self.timer.now();
        let prev = self.state.state();

        trace!("Node {}: event {} in {} at {}", self.id, event, prev, now);

        match self.machine.step(&self.timing, &mut self.state, event, now) {
            Outcome::Transition(t) => {
                debug!("Node {}: {} --{}--> {} ({}) for {} steps",
                    self.id, prev, event, t.state, t.action, t.delay);
                self.apply(t, now)
            },
            Outcome::Stay => Ok(()),
            Outcome::Unexpected => {
                debug!("Node {}: unexpected event {} in {} (after {})", self.id, event, prev, self.state.action());
                self.stats.unexpected_events += 1;
                Ok(())
            },
        }
    }

    /// Execute a committed transition and arm its timer
    fn apply(&mut self, t: Transition, now: Ts) -> Result<(), MacError<E>> {
        if let Some(r) = t.report {
            self.report(r);
        }

        let t = match self.execute(t.action, t.state, now)? {
            Some(rerouted) => rerouted,
            None => t,
        };

        self.timer.schedule(t.delay, MacTimer::new(self.state.seq()));

        Ok(())
    }

    fn report(&mut self, report: SendReport) {
        match report {
            SendReport::Delivered => {
                debug!("Node {}: send complete", self.id);
                self.stats.sends_completed += 1;
            },
            SendReport::RetriesExhausted => {
                warn!("Node {}: send abandoned, no retries remaining", self.id);
                self.stats.retries_exhausted += 1;
            },
            SendReport::BackoffExhausted => {
                warn!("Node {}: send abandoned, channel busy for every backoff", self.id);
                self.stats.backoff_exhausted += 1;
            },
        }

        self.upper.send_done(report);
    }

    /// Run an action, returning a replacement transition when a transmission
    /// could not be started
    fn execute(&mut self, action: Action, state: XmacState, now: Ts) -> Result<Option<Transition>, MacError<E>> {
        match action {
            Action::AskChannel => {
                self.phy.set_radio(true).map_err(MacError::Radio)?;
                self.state.set_flag(Flags::CHANNEL_BUSY, false);
                self.phy.carrier_sense().map_err(MacError::Radio)?;
            },
            Action::RadioOn => {
                self.phy.set_radio(true).map_err(MacError::Radio)?;
            },
            Action::RadioOff => {
                self.phy.set_radio(false).map_err(MacError::Radio)?;
            },
            Action::BeginRts => {
                let destination = match self.state.data() {
                    Some(d) => d.destination,
                    None => {
                        warn!("Node {}: no pending data for preamble", self.id);
                        return Ok(None)
                    },
                };

                // The train counts down to zero on the final preamble
                let mut rts = self.stamp(Frame::rts(self.id, destination, self.timing.max_preambles()));
                rts.decrement_retry();
                self.state.set_rts(rts);

                return self.transmit(state, now)
            },
            Action::Transmit => return self.transmit(state, now),
            Action::DeliverUp => {
                match self.state.take_inbound().and_then(|f| f.into_payload()) {
                    Some(p) => {
                        info!("Node {}: delivering {} bytes", self.id, p.data().len());
                        self.stats.delivered += 1;
                        self.upper.deliver(p);
                    },
                    None => warn!("Node {}: nothing to deliver", self.id),
                }

                if state == XmacState::Sleep {
                    self.phy.set_radio(false).map_err(MacError::Radio)?;
                }
            },
            Action::None => (),
        }

        Ok(None)
    }

    /// Send the frame belonging to a sending state
    fn transmit(&mut self, state: XmacState, now: Ts) -> Result<Option<Transition>, MacError<E>> {
        let radio = self.phy.radio_state();
        if radio.is_busy() {
            warn!("Node {}: radio {} in {}, aborting transmission", self.id, radio, state);
            self.stats.radio_unavailable += 1;

            let outbound = matches!(state, XmacState::SendingRts | XmacState::SendingData);
            let t = self.machine.radio_unavailable(&self.timing, &mut self.state, outbound, now);
            self.phy.set_radio(false).map_err(MacError::Radio)?;

            return Ok(Some(t))
        }

        let frame = match state {
            XmacState::SendingRts => self.state.rts().cloned(),
            XmacState::SendingData => self.state.data().cloned(),
            XmacState::SendingCts => self.state.received()
                .map(|rts| self.stamp(Frame::cts_for(rts, self.id))),
            XmacState::SendingAck => self.state.inbound()
                .map(|data| self.stamp(Frame::ack_for(data, self.id))),
            _ => None,
        };

        let frame = match frame {
            Some(f) => f,
            None => {
                warn!("Node {}: no frame to send in {}", self.id, state);
                return Ok(None)
            },
        };

        trace!("Node {}: transmit {} to {:?} ({} retries)", self.id, frame.kind(), frame.destination, frame.retries());

        match frame.kind() {
            FrameKind::Rts => self.stats.rts_sent += 1,
            FrameKind::Data => self.stats.data_sent += 1,
            _ => (),
        }

        self.phy.transmit(&frame).map_err(MacError::Radio)?;

        Ok(None)
    }

    /// Apply configured header length and transmit power
    fn stamp(&self, frame: Frame) -> Frame {
        frame.with_header_len(self.config.header_bits)
            .with_signal_strength(self.config.tx_power_dbm)
    }
}

impl <P, E, T, U, S> Mac for XMac<P, T, U, S>
where
    P: Phy<Error=E>,
    E: core::fmt::Debug,
    T: Timer,
    U: Upper,
    S: Schedule,
{
    type Error = MacError<E>;

    fn on_upper_send(&mut self, payload: Payload) -> Result<(), Self::Error> {
        if self.state.data_pending() {
            debug!("Node {}: send already pending", self.id);
            return Err(MacError::BufferFull(payload))
        }

        let frame = Frame::data(self.id, payload, self.timing.ack_required(), self.timing.max_data_retries());
        let frame = self.stamp(frame);

        debug!("Node {}: queued {} bytes for {:?}", self.id,
            frame.payload().map(|p| p.data().len()).unwrap_or(0), frame.destination);

        self.state.set_data(frame);
        self.state.set_flag(Flags::DATA_PENDING, true);

        self.inject(Event::UpperSend)
    }

    fn on_lower_receive(&mut self, frame: Frame) -> Result<(), Self::Error> {
        if frame.source == self.id {
            trace!("Node {}: ignoring own {}", self.id, frame.kind());
            return Ok(())
        }

        let event = match frame.kind() {
            FrameKind::Rts => Event::RtsReceived,
            FrameKind::Cts => Event::CtsReceived,
            FrameKind::Ack => Event::AckReceived,
            FrameKind::Data => Event::DataReceived,
        };

        trace!("Node {}: received {} from {}", self.id, frame.kind(), frame.source);

        self.state.set_received(frame);
        self.inject(event)
    }

    fn on_radio_event(&mut self, event: RadioEvent) -> Result<(), Self::Error> {
        let event = match event {
            RadioEvent::ChannelBusy => {
                self.state.set_flag(Flags::CHANNEL_BUSY, true);
                Event::ChannelBusy
            },
            RadioEvent::ChannelFree => {
                self.state.set_flag(Flags::CHANNEL_BUSY, false);
                Event::ChannelFree
            },
            RadioEvent::SendingTerminated => Event::SendComplete,
            RadioEvent::FrameStart => Event::FrameStart,
            RadioEvent::Collision => Event::Collision,
        };

        self.inject(event)
    }

    fn on_timer(&mut self, timer: MacTimer) -> Result<(), Self::Error> {
        if timer.seq() != self.state.seq() {
            trace!("Node {}: stale timer {} (current {})", self.id, timer.seq(), self.state.seq());
            self.stats.stale_timers += 1;
            return Ok(())
        }

        self.inject(Event::TimeOut)
    }
}
