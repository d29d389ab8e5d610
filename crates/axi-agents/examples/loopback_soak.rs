//! Streams randomized frames through a writer/reader loopback with idle gaps
//! and random back-pressure, then checks every frame arrived intact.
//!
//! Set `RUST_LOG=axi_agents=debug` to follow individual frames.

use std::process::ExitCode;

use axi_agents::{
    ReadyPolicy, SignalBank, StreamConfig, StreamFrame, StreamReader, StreamWriter,
    StreamWriterConfig, TbError, Testbench, TestbenchConfig,
};
use proptest as _;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const FRAMES: usize = 500;
const SEED: u64 = 0x5eed;

fn random_frame(rng: &mut Xoshiro256StarStar) -> Result<StreamFrame, TbError> {
    let beats = rng.gen_range(1..=32);
    let words = (0..beats).map(|_| u128::from(rng.gen::<u64>()));
    let frame = StreamFrame::from_words(words)?;
    Ok(if rng.gen_bool(0.25) {
        frame.with_last_keep(rng.gen_range(1..0xFF))
    } else {
        frame
    })
}

fn soak() -> Result<Testbench, TbError> {
    let mut bus = SignalBank::new();
    for (field, width) in [
        ("tdata", 64),
        ("tvalid", 1),
        ("tready", 1),
        ("tlast", 1),
        ("tkeep", 8),
    ] {
        bus.declare(format!("axis_{field}"), width)?;
    }

    let stream = StreamConfig::with_prefix("axis");
    let mut writer =
        StreamWriter::connect(&mut bus, &stream, StreamWriterConfig::with_random_gaps(SEED))?;
    let mut reader = StreamReader::connect(
        &mut bus,
        &stream,
        ReadyPolicy::Random {
            stall_percent: 30,
            seed: SEED.rotate_left(17),
        },
    )?;
    let mut tb = Testbench::new(bus, TestbenchConfig::default().with_clock_mhz(250));

    let mut rng = Xoshiro256StarStar::seed_from_u64(SEED);
    let mut words = 0usize;
    for index in 0..FRAMES {
        let frame = random_frame(&mut rng)?;
        words += frame.beats();
        writer.begin_send(tb.bus_mut(), frame.clone());
        let received = reader.receive(&mut tb, &mut [&mut writer])?;
        if received != frame {
            error!(index, "frame corrupted in loopback");
            return Err(TbError::Incomplete {
                agent: "loopback".to_string(),
            });
        }
    }

    info!(frames = FRAMES, words, edges = tb.edges(), "soak complete");
    Ok(tb)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .init();

    match soak() {
        Ok(tb) => {
            info!(sim_time_ps = tb.sim_time_ps(), "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "soak failed");
            ExitCode::FAILURE
        }
    }
}
