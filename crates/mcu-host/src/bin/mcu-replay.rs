//! Exercises Offline Replay Mode end to end: builds a stub firmware
//! dictionary, connects without a real port, allocates a stepper, pushes a
//! handful of steps through compression, and prints the resulting command
//! trace.

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use mcu_host::{McuSessionConfig, OfflineSerialLink, McuSession};
use mcu_proto::Dictionary;

/// Replays a synthetic step sequence through the MCU coordination core in
/// Offline Replay Mode and prints the generated command trace to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Firmware clock frequency to simulate, in Hz.
    #[arg(long, default_value_t = 16_000_000)]
    clock_freq: u32,

    /// Number of evenly-spaced steps to push through the stepper's queue.
    #[arg(long, default_value_t = 8)]
    steps: u32,

    /// Ticks between consecutive steps before compression.
    #[arg(long, default_value_t = 4_000)]
    interval_ticks: i64,

    /// Pace print-time tracking instead of using the constant 0.25s buffer.
    #[arg(long)]
    pace: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let dictionary = Dictionary::stub(cli.clock_freq, "mcu-replay");
    let link = OfflineSerialLink::new(dictionary, io::stdout());
    let mut session = McuSession::connect_file(link, McuSessionConfig::default(), cli.pace)?;
    session.build_config()?;

    let stepper_oid = session.create_stepper("PA0", "PA1", 0, 25)?;
    info!(oid = stepper_oid, "allocated stepper");

    let mut t = 0i64;
    for _ in 0..cli.steps {
        t += cli.interval_ticks;
        session.steppers_mut()[0].step(t);
    }

    let dispatch = session.flush_moves(f64::from(cli.steps) * (cli.interval_ticks as f64) / f64::from(cli.clock_freq))?;
    info!(released = dispatch.len(), "replay complete");
    Ok(())
}
