//! Cache-tier behavior observed through the simulated backend's counters

use memory_sampler::access::sim::SimAccess;
use memory_sampler::config::EngineConfig;
use memory_sampler::core::types::{
    Address, OffsetFormat, ProcessArchitecture, ProcessId, ReadError, ReadRequest, SampleValue,
    ValueType,
};
use memory_sampler::memory::ADDRESS_CACHE_TTL;
use memory_sampler::sampler::Sampler;
use std::sync::Arc;
use std::time::Duration;

const BASE: Address = Address::new(0x0040_0000);

fn sim_with_target() -> (SimAccess, ProcessId) {
    let sim = SimAccess::new();
    let pid = sim.spawn("game.exe", ProcessArchitecture::X64, BASE, 0x10000);
    (sim, pid)
}

#[test]
fn test_value_cache_serves_repeat_reads() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 42);

    let sampler = Sampler::new(Arc::new(sim.clone()), EngineConfig::default()).unwrap();
    let request = ReadRequest::direct("hp", BASE.offset(0x10), ValueType::U32);

    sampler.read_batch("game.exe", vec![request.clone()]);
    let reads = sim.read_count();

    // Within the TTL the stale value is returned without touching memory.
    sim.write_u32(pid, BASE.offset(0x10), 43);
    let outcomes = sampler.read_batch("game.exe", vec![request]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(42)));
    assert_eq!(sim.read_count(), reads);
}

#[test]
fn test_value_cache_expires_with_poll_interval() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 1);

    let config = EngineConfig {
        // 10 ms interval floors the value TTL at 5 ms.
        poll_interval: Duration::from_millis(10),
        ..EngineConfig::default()
    };
    let sampler = Sampler::new(Arc::new(sim.clone()), config).unwrap();
    let request = ReadRequest::direct("hp", BASE.offset(0x10), ValueType::U32);

    sampler.read_batch("game.exe", vec![request.clone()]);
    sim.write_u32(pid, BASE.offset(0x10), 2);
    std::thread::sleep(Duration::from_millis(30));

    let outcomes = sampler.read_batch("game.exe", vec![request]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(2)));
}

#[test]
fn test_module_base_enumerated_once() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 5);

    let sampler = Sampler::new(Arc::new(sim.clone()), EngineConfig::default()).unwrap();
    let request = ReadRequest::module_offset(
        "hp",
        "game.exe",
        "0x10",
        OffsetFormat::Hex,
        ValueType::U32,
    )
    .unwrap()
    // Bypass the value cache so every batch resolves the address again.
    .uncached();

    sampler.read_batch("game.exe", vec![request.clone()]);
    sampler.read_batch("game.exe", vec![request.clone()]);
    sampler.read_batch("game.exe", vec![request]);
    assert_eq!(sim.module_list_count(), 1);
}

#[test]
fn test_clear_caches_forces_fresh_reads() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 42);

    let sampler = Sampler::new(Arc::new(sim.clone()), EngineConfig::default()).unwrap();
    let request = ReadRequest::direct("hp", BASE.offset(0x10), ValueType::U32);

    sampler.read_batch("game.exe", vec![request.clone()]);
    sim.write_u32(pid, BASE.offset(0x10), 99);

    sampler.clear_caches();
    let outcomes = sampler.read_batch("game.exe", vec![request]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(99)));
}

#[test]
fn test_set_poll_rate_shrinks_value_ttl() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 1);

    // Default 100 ms interval gives an 80 ms TTL.
    let sampler = Sampler::new(Arc::new(sim.clone()), EngineConfig::default()).unwrap();
    let request = ReadRequest::direct("hp", BASE.offset(0x10), ValueType::U32);

    sampler.set_poll_rate(Duration::from_millis(10));
    sampler.read_batch("game.exe", vec![request.clone()]);
    sim.write_u32(pid, BASE.offset(0x10), 2);

    // 30 ms is far beyond the new 5 ms floor but well inside the old TTL.
    std::thread::sleep(Duration::from_millis(30));
    let outcomes = sampler.read_batch("game.exe", vec![request]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(2)));
}

#[test]
fn test_resolved_address_expiry_forces_retraversal() {
    let (sim, pid) = sim_with_target();
    sim.write_u64(pid, BASE.offset(0x10), 0x0050_0000);
    sim.write_u32(pid, Address::new(0x0050_0008), 5);

    let sampler = Sampler::new(Arc::new(sim.clone()), EngineConfig::default()).unwrap();
    let request = ReadRequest::direct("chain", BASE.offset(0x10), ValueType::U32)
        .with_pointer_offsets(vec![0x8])
        .fast();

    let outcomes = sampler.read_batch("game.exe", vec![request.clone()]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(5)));

    // Break the chain pointer. Past the resolved-address TTL the chain is
    // walked again instead of the stale final address being served, so the
    // break becomes visible as a failure.
    sim.write_u64(pid, BASE.offset(0x10), 0);
    std::thread::sleep(ADDRESS_CACHE_TTL + Duration::from_millis(100));
    let outcomes = sampler.read_batch("game.exe", vec![request]);
    assert!(matches!(
        outcomes[0].result,
        Err(ReadError::NullPointer { level: 0 })
    ));
}

#[test]
fn test_restart_under_new_pid_is_transparent() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 7);

    let config = EngineConfig {
        // Probe liveness on every batch.
        liveness_interval: Duration::ZERO,
        ..EngineConfig::default()
    };
    let sampler = Sampler::new(Arc::new(sim.clone()), config).unwrap();
    let request = ReadRequest::direct("hp", BASE.offset(0x10), ValueType::U32).uncached();

    let outcomes = sampler.read_batch("game.exe", vec![request.clone()]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(7)));

    sim.kill(pid);
    let new_pid = sim.spawn("game.exe", ProcessArchitecture::X64, BASE, 0x10000);
    sim.write_u32(new_pid, BASE.offset(0x10), 8);

    let outcomes = sampler.read_batch("game.exe", vec![request]);
    assert_eq!(outcomes[0].value(), Some(SampleValue::U64(8)));
}

#[test]
fn test_cache_sizes_reported_in_metrics() {
    let (sim, pid) = sim_with_target();
    sim.write_u32(pid, BASE.offset(0x10), 1);

    let sampler = Sampler::new(Arc::new(sim.clone()), EngineConfig::default()).unwrap();
    let request = ReadRequest::direct("hp", BASE.offset(0x10), ValueType::U32);
    sampler.read_batch("game.exe", vec![request]);

    let metrics = sampler.metrics();
    assert!(metrics.cache_sizes.values >= 1);

    sampler.clear_caches();
    sampler.read_batch("game.exe", Vec::new());
    assert_eq!(sampler.metrics().cache_sizes.values, 0);
}
