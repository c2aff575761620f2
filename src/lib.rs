//! High-frequency batched sampling of external process memory
//!
//! The engine turns named read requests (module-relative addresses, pointer
//! chains, bitfield post-processing) into per-tick value snapshots, spreading
//! reads across a bounded pool of worker threads and caching module bases,
//! resolved chains, and recent values on separate TTLs.

pub mod access;
pub mod config;
pub mod core;
pub mod memory;
pub mod process;
pub mod sampler;

// Re-export main types from core module
pub use core::types::{
    Address, AddressSpec, BitwiseOp, EngineResult, ModuleInfo, OffsetFormat, ProcessArchitecture,
    ProcessId, ProcessInfo, ReadError, ReadOutcome, ReadRequest, Sample, SampleValue, ValueType,
};

pub use config::{Config, EngineConfig};
pub use sampler::{BatchPlan, MetricsSnapshot, Sampler, TickSnapshot};
