//! X-MAC simulation example
//!
//! Runs a cell of duty-cycled nodes exchanging random traffic and reports
//! per-node MAC statistics.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{debug, info};

use humantime::Duration;
use rand::{Rng, SeedableRng, rngs::StdRng};
use structopt::StructOpt;

use xmac::prelude::*;
use xmac::sim::Bench;

#[derive(Debug, StructOpt)]
struct Options {
    #[structopt(long, default_value = "4")]
    /// Number of nodes in the cell
    pub nodes: u16,

    #[structopt(long, default_value = "30s")]
    /// Simulated run time
    pub duration: Duration,

    #[structopt(long, default_value = "2s")]
    /// Interval between upper layer sends
    pub interval: Duration,

    #[structopt(long, default_value = "100")]
    /// Duty cycle length in milliseconds
    pub cycle_ms: u32,

    #[structopt(long)]
    /// Send every payload to the broadcast address
    pub broadcast: bool,

    #[structopt(long, default_value = "1")]
    /// Seed for boot phases and traffic
    pub seed: u64,

    #[structopt(long, default_value = "info")]
    /// Configure log level
    pub log_level: simplelog::LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Load options
    let opts = Options::from_args();

    // Initialise logging
    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    if opts.nodes < 2 {
        return Err(anyhow::anyhow!("at least two nodes are required"));
    }

    let config = XmacConfig {
        cycle_length_ms: opts.cycle_ms,
        ..Default::default()
    };

    let steps = |d: &Duration| -> Ts {
        d.as_micros() as Ts * config.steps_per_second as Ts / 1_000_000
    };
    let (end, interval) = (steps(&opts.duration), steps(&opts.interval).max(1));

    info!("Starting xmac-sim with {} nodes for {}", opts.nodes, opts.duration);

    let mut bench = Bench::new(config.clone())
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    for i in 0..opts.nodes {
        let rng = StdRng::seed_from_u64(opts.seed.wrapping_add(i as u64 + 1));
        bench.add_node(RandomStart::new(rng))
            .map_err(|e| anyhow::anyhow!("Error adding node {}: {:?}", i, e))?;
    }

    // Random traffic between distinct nodes
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut sent = 0;
    let mut t = interval;
    while t < end {
        let src = rng.gen_range(0..opts.nodes);
        let dest = match opts.broadcast {
            true => Address::Broadcast,
            false => {
                let n = opts.nodes as u32;
                let d = (src as u32 + rng.gen_range(1..n)) % n;
                Address::from(d as NodeId)
            },
        };

        let data: [u8; 8] = rng.gen();
        let payload = Payload::new(dest, 0, &data)
            .map_err(|e| anyhow::anyhow!("Payload error: {:?}", e))?;

        debug!("Queueing send at {} from {} to {:?}", t, src, dest);
        bench.send_at(t, src, payload)
            .map_err(|e| anyhow::anyhow!("Send error: {:?}", e))?;

        sent += 1;
        t += interval;
    }

    bench.run_until(end)
        .map_err(|e| anyhow::anyhow!("Simulation error: {:?}", e))?;

    info!("Simulation complete, {} payloads queued", sent);

    println!("{:>5} {:>8} {:>8} {:>9} {:>9} {:>8} {:>8} {:>6}",
        "node", "rts", "data", "received", "complete", "retries", "backoff", "stale");

    for n in 0..opts.nodes {
        let s = match bench.mac(n) {
            Some(m) => m.stats(),
            None => continue,
        };

        println!("{:>5} {:>8} {:>8} {:>9} {:>9} {:>8} {:>8} {:>6}",
            n, s.rts_sent, s.data_sent, s.delivered, s.sends_completed,
            s.retries_exhausted, s.backoff_exhausted, s.stale_timers);
    }

    Ok(())
}
