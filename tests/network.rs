//! Multi-node X-MAC scenarios run on the simulation bench

use xmac::prelude::*;
use xmac::mac::TimingModel;
use xmac::sim::Bench;

fn init_log() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Info, simplelog::Config::default());
}

fn timing() -> TimingModel {
    TimingModel::new(&XmacConfig::default()).unwrap()
}

#[test]
fn unicast_with_ack() {
    init_log();

    let mut b = Bench::new(XmacConfig::default()).unwrap();
    let sender = b.add_node(Fixed(10_000)).unwrap();
    let receiver = b.add_node(Fixed(50_000)).unwrap();

    let p = Payload::new(Address::Node(receiver), 2, b"hello").unwrap();
    b.send_at(1_000, sender, p.clone()).unwrap();

    b.run_until(200_000).unwrap();

    assert_eq!(b.delivered(receiver), vec![p]);
    assert_eq!(b.reports(sender), vec![SendReport::Delivered]);

    let s = b.mac(sender).unwrap().stats();
    assert_eq!(s.data_sent, 1);
    assert_eq!(s.sends_completed, 1);
    assert!(s.rts_sent > 1);
    assert!(s.rts_sent <= timing().max_preambles() as u32);
    // Superseded timeouts are discarded
    assert!(s.stale_timers > 0);

    assert!(!b.mac(sender).unwrap().protocol().data_pending());
}

#[test]
fn unanswered_preambles_exhaust_retries() {
    init_log();
    let t = timing();

    let mut b = Bench::new(XmacConfig::default()).unwrap();
    let sender = b.add_node(Fixed(10_000)).unwrap();
    let _other = b.add_node(Fixed(30_000)).unwrap();

    // Nobody answers for node 9
    let p = Payload::new(Address::Node(9), 0, &[1, 2, 3]).unwrap();
    b.send_at(0, sender, p).unwrap();

    b.run_until(10 * t.cycle_length()).unwrap();

    let s = b.mac(sender).unwrap().stats();
    assert_eq!(s.rts_sent, t.max_data_retries() as u32 * t.max_preambles() as u32);
    assert_eq!(s.data_sent, 0);
    assert_eq!(s.retries_exhausted, 1);
    assert_eq!(b.reports(sender), vec![SendReport::RetriesExhausted]);
    assert!(b.delivered(1).is_empty());
}

#[test]
fn broadcast_reaches_every_neighbour() {
    init_log();

    let mut b = Bench::new(XmacConfig::default()).unwrap();
    let sender = b.add_node(Fixed(10_000)).unwrap();
    let a = b.add_node(Fixed(30_000)).unwrap();
    let c = b.add_node(Fixed(60_000)).unwrap();

    let p = Payload::new(Address::Broadcast, 0, b"beacon").unwrap();
    b.send_at(1_000, sender, p.clone()).unwrap();

    b.run_until(200_000).unwrap();

    assert_eq!(b.delivered(a), vec![p.clone()]);
    assert_eq!(b.delivered(c), vec![p]);
    assert_eq!(b.reports(sender), vec![SendReport::Delivered]);

    let s = b.mac(sender).unwrap().stats();
    assert_eq!(s.rts_sent, timing().max_preambles() as u32);
    assert_eq!(s.data_sent, 1);

    for n in [a, c] {
        assert!(!b.mac(n).unwrap().protocol().waiting_broadcast());
    }
}

#[test]
fn broadcast_caught_on_first_preamble() {
    init_log();
    let t = timing();

    let mut b = Bench::new(XmacConfig::default()).unwrap();
    let sender = b.add_node(Fixed(10_000)).unwrap();
    // Sensing when the train starts
    let early = b.add_node(Fixed(2_000)).unwrap();

    let p = Payload::new(Address::Broadcast, 0, b"first").unwrap();
    b.send_at(1_000, sender, p.clone()).unwrap();

    // Asleep for less than a cycle after the first preamble
    b.run_until(2_000 + t.carrier_sense_duration()).unwrap();
    assert_eq!(b.mac(early).unwrap().state(), XmacState::Sleep);
    assert!(!b.mac(early).unwrap().protocol().waiting_broadcast());

    b.run_until(200_000).unwrap();

    assert_eq!(b.delivered(early), vec![p]);
    assert_eq!(b.reports(sender), vec![SendReport::Delivered]);
}

#[test]
fn busy_sender_rejects_second_payload() {
    init_log();

    let mut b = Bench::new(XmacConfig::default()).unwrap();
    let sender = b.add_node(Fixed(10_000)).unwrap();
    let receiver = b.add_node(Fixed(50_000)).unwrap();

    let first = Payload::new(Address::Node(receiver), 0, &[1]).unwrap();
    let second = Payload::new(Address::Node(receiver), 0, &[2]).unwrap();
    b.send_at(1_000, sender, first.clone()).unwrap();
    b.send_at(2_000, sender, second).unwrap();

    b.run_until(200_000).unwrap();

    // The second payload is dropped while the first is pending
    assert_eq!(b.delivered(receiver), vec![first]);
}

#[test]
fn aligned_nodes_share_a_phase() {
    init_log();

    let mut b = Bench::new(XmacConfig::default()).unwrap();
    let n0 = b.add_synced_node(Aligned, 0.3).unwrap();
    let n1 = b.add_synced_node(Aligned, 0.3).unwrap();

    let offset = b.mac(n0).unwrap().timing().sync_offset().unwrap();
    let wake = (offset * timing().cycle_length() as f64) as Ts;

    b.run_until(wake).unwrap();

    for n in [n0, n1] {
        assert_eq!(b.mac(n).unwrap().state(), XmacState::Cs);
    }
}
