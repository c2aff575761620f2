//! Access seam for the raw process-memory primitive
//!
//! The engine never opens handles or reads memory itself; it drives an
//! implementation of these traits. A production backend wraps the platform's
//! read-process-memory facility, tests and the demo binary use [`sim`].

pub mod sim;

use crate::core::types::{Address, EngineResult, ModuleInfo, ProcessId, ProcessInfo, ReadError};

/// An open handle to one target process, owned by a single execution context.
pub trait ProcessMemory: Send {
    /// Fills `buf` from the target's memory at `address`. Partial reads are
    /// errors; the buffer is either fully written or the call fails.
    fn read_exact(&self, address: Address, buf: &mut [u8]) -> EngineResult<()>;
}

/// The external read-process-memory capability.
///
/// Implementations may be slow; the engine caches around every call. Shared
/// across worker threads, so it must be `Sync` — each worker opens its own
/// [`ProcessMemory`] handles through it.
pub trait MemoryAccess: Send + Sync {
    fn processes(&self) -> EngineResult<Vec<ProcessInfo>>;

    fn open_process(&self, pid: ProcessId) -> EngineResult<Box<dyn ProcessMemory>>;

    fn modules(&self, pid: ProcessId) -> EngineResult<Vec<ModuleInfo>>;

    /// Cheap liveness probe, expected to be much cheaper than `processes()`.
    fn is_alive(&self, pid: ProcessId) -> bool;
}

/// Finds a process by case-insensitive name via full enumeration.
pub fn find_process(access: &dyn MemoryAccess, name: &str) -> EngineResult<ProcessInfo> {
    access
        .processes()?
        .into_iter()
        .find(|p| p.matches_name(name))
        .ok_or_else(|| ReadError::ProcessNotFound(name.to_string()))
}
