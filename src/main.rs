//! Demo binary: samples a simulated target process until Ctrl+C.

use anyhow::Result;
use memory_sampler::access::sim::SimAccess;
use memory_sampler::core::types::{
    Address, BitwiseOp, OffsetFormat, ProcessArchitecture, ReadRequest, ValueType,
};
use memory_sampler::sampler::{BatchPlan, Sampler, TickSnapshot};
use memory_sampler::Config;
use std::sync::Arc;
use tracing::{info, Level};

const BASE: Address = Address::new(0x0040_0000);

fn build_target() -> SimAccess {
    let sim = SimAccess::new();
    let pid = sim.spawn("game.exe", ProcessArchitecture::X64, BASE, 0x10000);
    sim.add_module(pid, "engine.dll", Address::new(0x1000_0000), 0x8000);

    // player struct reachable through a pointer at engine.dll+0x20
    sim.write_u64(pid, Address::new(0x1000_0020), 0x0050_0000);
    sim.write_u32(pid, Address::new(0x0050_0010), 100); // health
    sim.write_f32(pid, Address::new(0x0050_0014), 12.5); // position x
    sim.write_u32(pid, Address::new(0x0050_0018), 0x3F00); // packed flags

    sim
}

fn requests() -> Result<Vec<ReadRequest>> {
    Ok(vec![
        ReadRequest::module_offset("health", "engine.dll", "0x20", OffsetFormat::Hex, ValueType::U32)?
            .with_pointer_offsets(vec![0x10])
            .fast(),
        ReadRequest::module_offset(
            "position_x",
            "engine.dll",
            "0x20",
            OffsetFormat::Hex,
            ValueType::F32,
        )?
        .with_pointer_offsets(vec![0x14]),
        ReadRequest::direct("flags_mid", Address::new(0x0050_0018), ValueType::U32)
            .with_bitmask(0x0F00, BitwiseOp::And)
            .with_bitfield_extract(),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("memory-sampler.toml")?;

    let level: Level = config.logging.level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    info!(
        "Starting memory-sampler demo v{}",
        env!("CARGO_PKG_VERSION")
    );

    let access = Arc::new(build_target());
    let sampler = Sampler::new(access, config.engine())?;

    let requests = requests()?;
    sampler.start(
        move || BatchPlan {
            process: "game.exe".to_string(),
            requests: requests.clone(),
        },
        |tick: TickSnapshot| {
            for outcome in &tick.outcomes {
                match &outcome.result {
                    Ok(sample) => info!(
                        id = %outcome.id,
                        value = %sample.value,
                        address = %sample.address,
                        "sample"
                    ),
                    Err(err) => info!(id = %outcome.id, error = %err, "sample failed"),
                }
            }
        },
    );

    info!("Sampling started. Press Ctrl+C to shut down.");
    tokio::signal::ctrl_c().await?;

    let metrics = sampler.metrics();
    info!(
        ticks_per_second = metrics.ticks_per_second,
        avg_tick_ms = metrics.avg_tick_ms,
        skipped = metrics.skipped_ticks,
        "Shutting down"
    );
    sampler.stop();
    Ok(())
}
