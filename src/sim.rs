//! Discrete-event simulation bench
//!
//! Runs a set of X-MAC nodes over a single shared medium (a fully connected
//! cell). Events are ordered by time then insertion sequence so runs are
//! deterministic. A frame is received by every node whose radio was on for
//! the whole airtime, overlapping transmissions collide.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::vec::Vec;

use log::{trace, debug, warn};

use crate::{NodeId, Ts};
use crate::error::{ConfigError, MacError};
use crate::frame::{Frame, Payload};
use crate::mac::{Config, Fixed, Mac, Schedule, SendReport, TimingModel, Upper, XMac};
use crate::phy::{Phy, RadioEvent, RadioState};
use crate::timer::{MacTimer, Timer};

/// Default delay before a carrier sense result is reported, in steps
pub const DEFAULT_CS_DELAY: Ts = 128;

/// Bench errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimError {
    /// Transmission requested while already transmitting
    RadioBusy,
    /// No node with this id
    UnknownNode(NodeId),
    /// Every node id is already taken
    TooManyNodes,
}

/// Id for the next node added to a bench holding `count` nodes
fn next_node_id(count: usize) -> Result<NodeId, SimError> {
    NodeId::try_from(count).map_err(|_| SimError::TooManyNodes)
}

/// MAC instance as run by the bench
pub type BenchMac<S = Fixed> = XMac<BenchPhy, BenchTimer, BenchUpper, S>;

/// Requests made by a node's MAC, applied once the MAC call returns
#[derive(Debug, Clone, PartialEq)]
enum Request {
    Timer(Ts, MacTimer),
    CarrierSense,
    Transmit(Frame),
}

/// Per-node shared state between the bench and the MAC collaborators
#[derive(Debug)]
struct Port {
    clock: Rc<Cell<Ts>>,

    powered: bool,
    transmitting: bool,
    /// Time the radio last started listening
    on_since: Ts,

    requests: Vec<Request>,

    delivered: Vec<Payload>,
    reports: Vec<SendReport>,
}

type Shared = Rc<RefCell<Port>>;

/// Radio attached to the bench medium
#[derive(Debug, Clone)]
pub struct BenchPhy(Shared);

impl Phy for BenchPhy {
    type Error = SimError;

    fn set_radio(&mut self, on: bool) -> Result<(), Self::Error> {
        let mut p = self.0.borrow_mut();
        if on && !p.powered {
            p.on_since = p.clock.get();
        }
        p.powered = on;
        Ok(())
    }

    fn carrier_sense(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().requests.push(Request::CarrierSense);
        Ok(())
    }

    fn transmit(&mut self, frame: &Frame) -> Result<(), Self::Error> {
        let mut p = self.0.borrow_mut();
        if p.transmitting {
            return Err(SimError::RadioBusy)
        }
        p.transmitting = true;
        p.requests.push(Request::Transmit(frame.clone()));
        Ok(())
    }

    fn radio_state(&self) -> RadioState {
        let p = self.0.borrow();
        match (p.transmitting, p.powered) {
            (true, _) => RadioState::Transmitting,
            (false, true) => RadioState::Listening,
            (false, false) => RadioState::Off,
        }
    }
}

/// Timer backed by the bench event queue
#[derive(Debug, Clone)]
pub struct BenchTimer(Shared);

impl Timer for BenchTimer {
    fn now(&self) -> Ts {
        self.0.borrow().clock.get()
    }

    fn schedule(&mut self, delay: Ts, timer: MacTimer) {
        self.0.borrow_mut().requests.push(Request::Timer(delay, timer));
    }
}

/// Upper layer collecting payloads and send reports
#[derive(Debug, Clone)]
pub struct BenchUpper(Shared);

impl Upper for BenchUpper {
    fn deliver(&mut self, payload: Payload) {
        self.0.borrow_mut().delivered.push(payload);
    }

    fn send_done(&mut self, report: SendReport) {
        self.0.borrow_mut().reports.push(report);
    }
}

#[derive(Debug, Clone)]
enum SimEvent {
    Timer{ node: NodeId, timer: MacTimer },
    CarrierSense{ node: NodeId, since: Ts },
    TxEnd{ tx: u64 },
    Send{ node: NodeId, payload: Payload },
}

#[derive(Debug, Clone)]
struct Scheduled {
    time: Ts,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap, earliest time then lowest sequence
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

#[derive(Debug, Clone)]
struct Transmission {
    id: u64,
    source: NodeId,
    frame: Frame,
    start: Ts,
    end: Ts,
    collided: bool,
}

struct SimNode<S> {
    mac: BenchMac<S>,
    port: Shared,
}

/// Simulation bench, generic over the boot schedule (S) used by every node
pub struct Bench<S = Fixed> {
    config: Config,
    timing: TimingModel,
    cs_delay: Ts,

    clock: Rc<Cell<Ts>>,
    nodes: Vec<SimNode<S>>,

    queue: BinaryHeap<Scheduled>,
    next_seq: u64,

    medium: Vec<Transmission>,
    next_tx: u64,
}

impl <S: Schedule> Bench<S> {
    /// Create an empty bench, all nodes share the provided configuration
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let timing = TimingModel::new(&config)?;

        Ok(Self {
            config,
            timing,
            cs_delay: DEFAULT_CS_DELAY,
            clock: Rc::new(Cell::new(0)),
            nodes: Vec::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            medium: Vec::new(),
            next_tx: 0,
        })
    }

    /// Set the delay before carrier sense results are reported
    pub fn with_cs_delay(mut self, cs_delay: Ts) -> Self {
        self.cs_delay = cs_delay;
        self
    }

    /// Add and start a node, returning its id
    pub fn add_node(&mut self, schedule: S) -> Result<NodeId, MacError<SimError>> {
        self.add_node_inner(schedule, None)
    }

    /// Add and start a node aligned to a parent's cycle offset
    pub fn add_synced_node(&mut self, schedule: S, parent: f64) -> Result<NodeId, MacError<SimError>> {
        self.add_node_inner(schedule, Some(parent))
    }

    fn add_node_inner(&mut self, schedule: S, parent: Option<f64>) -> Result<NodeId, MacError<SimError>> {
        let id = next_node_id(self.nodes.len()).map_err(MacError::Radio)?;

        let port = Rc::new(RefCell::new(Port {
            clock: self.clock.clone(),
            powered: false,
            transmitting: false,
            on_since: 0,
            requests: Vec::new(),
            delivered: Vec::new(),
            reports: Vec::new(),
        }));

        let mut mac = XMac::new(
            id,
            self.config.clone(),
            BenchPhy(port.clone()),
            BenchTimer(port.clone()),
            BenchUpper(port.clone()),
            schedule,
        )?;

        if let Some(p) = parent {
            mac.adopt_parent(p);
        }

        mac.start()?;

        self.nodes.push(SimNode{ mac, port });
        self.pump(id);

        Ok(id)
    }

    pub fn now(&self) -> Ts {
        self.clock.get()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn mac(&self, node: NodeId) -> Option<&BenchMac<S>> {
        self.nodes.get(node as usize).map(|n| &n.mac)
    }

    /// Payloads delivered to a node's upper layer
    pub fn delivered(&self, node: NodeId) -> Vec<Payload> {
        self.nodes.get(node as usize)
            .map(|n| n.port.borrow().delivered.clone())
            .unwrap_or_default()
    }

    /// Send reports received by a node's upper layer
    pub fn reports(&self, node: NodeId) -> Vec<SendReport> {
        self.nodes.get(node as usize)
            .map(|n| n.port.borrow().reports.clone())
            .unwrap_or_default()
    }

    /// Queue a payload to be handed to a node's MAC at `time`
    pub fn send_at(&mut self, time: Ts, node: NodeId, payload: Payload) -> Result<(), SimError> {
        if node as usize >= self.nodes.len() {
            return Err(SimError::UnknownNode(node))
        }

        self.schedule(time, SimEvent::Send{ node, payload });
        Ok(())
    }

    /// Process events up to and including `end`
    pub fn run_until(&mut self, end: Ts) -> Result<(), MacError<SimError>> {
        while self.queue.peek().map(|e| e.time <= end).unwrap_or(false) {
            let e = match self.queue.pop() {
                Some(e) => e,
                None => break,
            };

            self.clock.set(e.time);
            self.dispatch(e.event)?;
        }

        if end > self.clock.get() {
            self.clock.set(end);
        }

        Ok(())
    }

    pub fn run_for(&mut self, duration: Ts) -> Result<(), MacError<SimError>> {
        self.run_until(self.now() + duration)
    }

    fn schedule(&mut self, time: Ts, event: SimEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled{ time, seq, event });
    }

    fn dispatch(&mut self, event: SimEvent) -> Result<(), MacError<SimError>> {
        let now = self.now();
        trace!("{}: {:?}", now, event);

        match event {
            SimEvent::Timer{ node, timer } => {
                self.nodes[node as usize].mac.on_timer(timer)?;
                self.pump(node);
            },
            SimEvent::Send{ node, payload } => {
                match self.nodes[node as usize].mac.on_upper_send(payload) {
                    Err(MacError::BufferFull(_)) => warn!("{}: node {} busy, dropping payload", now, node),
                    r => r?,
                }
                self.pump(node);
            },
            SimEvent::CarrierSense{ node, since } => {
                let busy = self.medium.iter()
                    .any(|t| t.source != node && t.start <= now && t.end > since);

                let e = match busy {
                    true => RadioEvent::ChannelBusy,
                    false => RadioEvent::ChannelFree,
                };
                self.nodes[node as usize].mac.on_radio_event(e)?;
                self.pump(node);
            },
            SimEvent::TxEnd{ tx } => self.tx_end(tx)?,
        }

        Ok(())
    }

    /// Apply requests made by a node's MAC
    fn pump(&mut self, node: NodeId) {
        let now = self.now();
        let requests = core::mem::take(&mut self.nodes[node as usize].port.borrow_mut().requests);

        for r in requests {
            match r {
                Request::Timer(delay, timer) => self.schedule(now + delay, SimEvent::Timer{ node, timer }),
                Request::CarrierSense => self.schedule(now + self.cs_delay, SimEvent::CarrierSense{ node, since: now }),
                Request::Transmit(frame) => self.tx_start(node, frame),
            }
        }
    }

    fn tx_start(&mut self, source: NodeId, frame: Frame) {
        let now = self.now();
        let end = now + self.timing.airtime(frame.kind());
        let id = self.next_tx;
        self.next_tx += 1;

        let mut collided = false;
        for t in self.medium.iter_mut().filter(|t| t.end > now) {
            debug!("{}: {} from {} collides with {} from {}", now, frame.kind(), source, t.frame.kind(), t.source);
            t.collided = true;
            collided = true;
        }

        debug!("{}: node {} sending {} to {:?} until {}", now, source, frame.kind(), frame.destination, end);

        self.medium.push(Transmission{ id, source, frame, start: now, end, collided });
        self.schedule(end, SimEvent::TxEnd{ tx: id });
    }

    fn tx_end(&mut self, id: u64) -> Result<(), MacError<SimError>> {
        let now = self.now();

        let tx = match self.medium.iter().find(|t| t.id == id) {
            Some(t) => t.clone(),
            None => return Ok(()),
        };

        // Sender first, it is listening again from the end of the frame
        {
            let mut p = self.nodes[tx.source as usize].port.borrow_mut();
            p.transmitting = false;
            p.on_since = now;
        }
        self.nodes[tx.source as usize].mac.on_radio_event(RadioEvent::SendingTerminated)?;
        self.pump(tx.source);

        for n in 0..self.nodes.len() as NodeId {
            if n == tx.source {
                continue;
            }

            let listening = {
                let p = self.nodes[n as usize].port.borrow();
                p.powered && !p.transmitting && p.on_since <= tx.start
            };
            if !listening {
                continue;
            }

            match tx.collided {
                true => self.nodes[n as usize].mac.on_radio_event(RadioEvent::Collision)?,
                false => self.nodes[n as usize].mac.on_lower_receive(tx.frame.clone())?,
            }
            self.pump(n);
        }

        let cs_delay = self.cs_delay;
        self.medium.retain(|t| t.end + cs_delay >= now);

        Ok(())
    }
}
