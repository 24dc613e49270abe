//! X-MAC state machine
//!
//! Pure transition function over the [`ProtocolState`], the driver
//! executes the resulting action and arms the timer.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::trace;
use strum::{Display, IntoStaticStr};

use crate::{Address, NodeId, Ts};

use super::state::{Action, Event, Flags, ProtocolState, XmacState};
use super::timing::TimingModel;

/// Final result of an outgoing send, reported once per staged payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum SendReport {
    /// Acknowledged, or sent when no acknowledgement was requested
    Delivered,
    /// Data retry budget used up
    RetriesExhausted,
    /// Channel busy for every backoff
    BackoffExhausted,
}

/// Committed transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: XmacState,
    /// Timeout for the new state, in steps
    pub delay: Ts,
    pub action: Action,
    pub report: Option<SendReport>,
}

/// Result of applying an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// State committed, sequence number incremented
    Transition(Transition),
    /// Expected event with nothing to do
    Stay,
    /// Event not handled in the current state
    Unexpected,
}

/// Pending transition prior to commit
struct Next {
    state: XmacState,
    action: Action,
    delay: Option<Ts>,
    report: Option<SendReport>,
}

impl Next {
    fn to(state: XmacState, action: Action) -> Self {
        Self { state, action, delay: None, report: None }
    }

    fn sleep_for(delay: Ts) -> Self {
        Self { state: XmacState::Sleep, action: Action::RadioOff, delay: Some(delay), report: None }
    }

    fn report(mut self, report: Option<SendReport>) -> Self {
        self.report = report;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    id: NodeId,
}

impl StateMachine {
    pub fn new(id: NodeId) -> Self {
        Self { id }
    }

    /// Enter SLEEP with the radio off, waking after `delay`
    pub fn boot(&self, ps: &mut ProtocolState, delay: Ts) -> Transition {
        self.commit(ps, Next::sleep_for(delay), None)
    }

    /// Abort a transmission the radio cannot start.
    ///
    /// Outbound data backs off and retries, a CTS / ACK response is dropped.
    pub fn radio_unavailable(&self, timing: &TimingModel, ps: &mut ProtocolState, outbound: bool, now: Ts) -> Transition {
        let next = match outbound {
            true => Next::to(XmacState::BoStart, Action::RadioOff),
            false => Next::to(XmacState::Sleep, Action::RadioOff),
        };
        self.commit(ps, next, Some((timing, now)))
    }

    /// Apply an event to the protocol state
    pub fn step(&self, timing: &TimingModel, ps: &mut ProtocolState, event: Event, now: Ts) -> Outcome {
        use XmacState::*;

        let next = match (ps.state(), event) {
            // Reception outcomes are not acted on
            (_, Event::Collision) | (_, Event::FrameStart) => return Outcome::Stay,

            (Sleep, Event::TimeOut) if ps.data_pending() => {
                ps.set_flag(Flags::WAITING_BROADCAST, false);
                Next::to(CsStart, Action::AskChannel)
            },
            (Sleep, Event::TimeOut) if ps.waiting_broadcast() => Next::to(WaitingData, Action::RadioOn),
            (Sleep, Event::TimeOut) => Next::to(Cs, Action::RadioOn),
            (Sleep, Event::UpperSend) => {
                ps.set_flag(Flags::WAITING_BROADCAST, false);
                Next::to(CsStart, Action::AskChannel)
            },

            (Cs, Event::TimeOut) => Next::to(Sleep, Action::RadioOff),
            (Cs, Event::UpperSend) => Next::to(CsStart, Action::AskChannel),
            (Cs, Event::RtsReceived) | (CsStart, Event::RtsReceived) | (CsEnd, Event::RtsReceived) => {
                self.rts_received(timing, ps)
            },
            (Cs, _) => Next::to(Sleep, Action::RadioOff),

            (CsStart, Event::TimeOut) if ps.channel_busy() => Next::to(BoStart, Action::RadioOff),
            (CsStart, Event::TimeOut) => {
                // Channel access consumes one data attempt
                ps.reset_backoff();
                let peer = ps.data_mut().map(|d| {
                    d.decrement_retry();
                    d.destination
                });
                ps.set_peer(peer);
                Next::to(SendingRts, Action::BeginRts)
            },
            (CsStart, Event::ChannelBusy) | (CsStart, Event::ChannelFree) => return Outcome::Stay,
            (CsStart, _) => Next::to(Sleep, Action::RadioOff),

            (CsEnd, Event::TimeOut) => Next::to(CsEnd, Action::AskChannel),
            (CsEnd, Event::ChannelFree) => Next::to(Sleep, Action::RadioOff),
            (CsEnd, Event::ChannelBusy) => Next::to(WaitingData, Action::RadioOn),
            (CsEnd, _) => Next::to(Sleep, Action::RadioOff),

            (SendingRts, Event::TimeOut) => Next::to(Sleep, Action::RadioOff).report(attempt_failed(ps)),
            (SendingRts, Event::SendComplete) => Next::to(WaitingCts, Action::RadioOn),

            (SendingCts, Event::TimeOut) => Next::to(Sleep, Action::RadioOff),
            (SendingCts, Event::SendComplete) => Next::to(WaitingData, Action::RadioOn),

            (SendingData, Event::TimeOut) => Next::to(Sleep, Action::RadioOff).report(attempt_failed(ps)),
            (SendingData, Event::SendComplete) if ps.data().map(|d| d.ack_request).unwrap_or(false) => {
                Next::to(WaitingAck, Action::RadioOn)
            },
            (SendingData, Event::SendComplete) => {
                ps.clear_send();
                Next::to(CsEnd, Action::RadioOn).report(Some(SendReport::Delivered))
            },

            (SendingAck, Event::TimeOut) => Next::to(Sleep, Action::RadioOff),
            (SendingAck, Event::SendComplete) => Next::to(Sleep, Action::DeliverUp),

            (WaitingCts, Event::TimeOut) => {
                match ps.rts().map(|r| (r.retries(), r.destination.is_broadcast())) {
                    Some((remaining, _)) if remaining > 0 => {
                        if let Some(rts) = ps.rts_mut() {
                            rts.decrement_retry();
                        }
                        Next::to(SendingRts, Action::Transmit)
                    },
                    Some((_, true)) => Next::to(SendingData, Action::Transmit),
                    _ => Next::to(Cs, Action::RadioOn).report(attempt_failed(ps)),
                }
            },
            (WaitingCts, Event::CtsReceived) if self.cts_matches(ps) => Next::to(SendingData, Action::Transmit),
            (WaitingCts, Event::CtsReceived) => Next::to(Sleep, Action::RadioOff).report(attempt_failed(ps)),

            (WaitingData, Event::TimeOut) => Next::to(Sleep, Action::RadioOff),
            (WaitingData, Event::DataReceived) => {
                let data = match ps.take_received() {
                    Some(d) if d.destination.accepts(self.id) => d,
                    Some(d) => {
                        ps.set_received(d);
                        return Outcome::Unexpected
                    },
                    None => return Outcome::Unexpected,
                };

                let ack = data.ack_request;
                ps.set_peer(Some(Address::Node(data.source)));
                ps.set_inbound(data);

                match ack {
                    true => Next::to(SendingAck, Action::Transmit),
                    false => Next::to(CsEnd, Action::DeliverUp),
                }
            },

            (WaitingAck, Event::TimeOut) => Next::to(Sleep, Action::RadioOff).report(attempt_failed(ps)),
            (WaitingAck, Event::AckReceived) if self.ack_matches(ps) => {
                ps.clear_send();
                Next::to(CsEnd, Action::RadioOn).report(Some(SendReport::Delivered))
            },

            (BoStart, Event::TimeOut) if ps.backoff_retries() < timing.max_backoff_retries() => {
                Next::to(CsStart, Action::AskChannel)
            },
            (BoStart, Event::TimeOut) => {
                ps.clear_send();
                Next::to(Sleep, Action::RadioOff).report(Some(SendReport::BackoffExhausted))
            },

            // Staged data is picked up at the next wake-up
            (_, Event::UpperSend) => return Outcome::Stay,

            _ => return Outcome::Unexpected,
        };

        Outcome::Transition(self.commit(ps, next, Some((timing, now))))
    }

    /// RTS-received rule, shared by the listening states
    fn rts_received(&self, timing: &TimingModel, ps: &mut ProtocolState) -> Next {
        let (destination, source, remaining) = match ps.received() {
            Some(rts) => (rts.destination, rts.source, rts.retries()),
            None => return Next::sleep_for(timing.sleep_duration(None)),
        };

        match destination {
            Address::Node(id) if id == self.id => {
                ps.set_peer(Some(Address::Node(source)));
                Next::to(XmacState::SendingCts, Action::Transmit)
            },
            Address::Broadcast => {
                trace!("Node {}: broadcast RTS from {}, {} preambles remaining", self.id, source, remaining);

                // Early in the train the final preamble is more than a cycle
                // away, the next wake-up still lands inside the train
                let sleep = timing.broadcast_sleep(remaining);
                if sleep >= timing.cycle_length() {
                    return Next::sleep_for(timing.sleep_duration(None))
                }

                ps.set_flag(Flags::WAITING_BROADCAST, true);
                Next::sleep_for(sleep)
            },
            _ => Next::sleep_for(timing.sleep_duration(None)),
        }
    }

    /// A CTS answers our preamble if it is addressed to us, from the
    /// preamble destination, and echoes the current retry stamp
    fn cts_matches(&self, ps: &ProtocolState) -> bool {
        match (ps.received(), ps.rts()) {
            (Some(cts), Some(rts)) => {
                cts.destination == Address::Node(self.id)
                    && rts.destination == Address::Node(cts.source)
                    && cts.retries() == rts.retries()
            },
            _ => false,
        }
    }

    fn ack_matches(&self, ps: &ProtocolState) -> bool {
        match ps.received() {
            Some(ack) => {
                ack.destination == Address::Node(self.id)
                    && ps.peer() == Some(Address::Node(ack.source))
            },
            None => false,
        }
    }

    fn commit(&self, ps: &mut ProtocolState, next: Next, timing: Option<(&TimingModel, Ts)>) -> Transition {
        if ps.state() == XmacState::WaitingData {
            ps.set_flag(Flags::WAITING_BROADCAST, false);
        }
        if next.state == XmacState::BoStart {
            ps.inc_backoff();
        }

        let delay = match (next.delay, timing) {
            (Some(d), _) => d,
            (None, Some((t, now))) => t.state_duration(next.state, ps.waiting_broadcast(), now),
            (None, None) => 0,
        };

        ps.set_state(next.state, next.action);

        Transition {
            state: next.state,
            delay,
            action: next.action,
            report: next.report,
        }
    }
}

/// Account a failed attempt, abandoning the send once no retries remain
fn attempt_failed(ps: &mut ProtocolState) -> Option<SendReport> {
    if !ps.data_pending() {
        return None
    }

    match ps.data().map(|d| d.retries()) {
        Some(r) if r > 0 => None,
        _ => {
            ps.clear_send();
            Some(SendReport::RetriesExhausted)
        },
    }
}
