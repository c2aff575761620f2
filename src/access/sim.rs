//! Simulated target processes
//!
//! An in-memory [`MemoryAccess`] backend: fake processes with named modules
//! and a sparse byte map, plus per-operation call counters and an injectable
//! read delay. The demo binary samples from it, and the test suite uses the
//! counters to observe cache hits and the delay to exercise worker timeouts.

use super::{MemoryAccess, ProcessMemory};
use crate::core::types::{
    Address, EngineResult, ModuleInfo, ProcessArchitecture, ProcessId, ProcessInfo, ReadError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct SimCounters {
    process_lists: AtomicU64,
    opens: AtomicU64,
    module_lists: AtomicU64,
    reads: AtomicU64,
}

struct SimProcess {
    info: ProcessInfo,
    modules: Vec<ModuleInfo>,
    memory: BTreeMap<u64, u8>,
}

#[derive(Default)]
struct SimState {
    processes: HashMap<ProcessId, SimProcess>,
    next_pid: ProcessId,
}

struct SimShared {
    state: Mutex<SimState>,
    counters: SimCounters,
    read_delay: Mutex<Duration>,
}

/// Shared simulated process table. Clones refer to the same table.
#[derive(Clone)]
pub struct SimAccess {
    shared: Arc<SimShared>,
}

impl Default for SimAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl SimAccess {
    pub fn new() -> Self {
        SimAccess {
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState {
                    processes: HashMap::new(),
                    next_pid: 1000,
                }),
                counters: SimCounters::default(),
                read_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a process whose main module spans `[base, base + size)`.
    pub fn spawn(&self, name: &str, arch: ProcessArchitecture, base: Address, size: u64) -> ProcessId {
        let mut state = self.state();
        let pid = state.next_pid;
        state.next_pid += 1;
        let mut info = ProcessInfo::new(pid, name);
        info.architecture = arch;
        state.processes.insert(
            pid,
            SimProcess {
                info,
                modules: vec![ModuleInfo::new(name, base, size)],
                memory: BTreeMap::new(),
            },
        );
        pid
    }

    pub fn add_module(&self, pid: ProcessId, name: &str, base: Address, size: u64) {
        if let Some(proc) = self.state().processes.get_mut(&pid) {
            proc.modules.push(ModuleInfo::new(name, base, size));
        }
    }

    pub fn kill(&self, pid: ProcessId) {
        self.state().processes.remove(&pid);
    }

    pub fn write_bytes(&self, pid: ProcessId, address: Address, bytes: &[u8]) {
        if let Some(proc) = self.state().processes.get_mut(&pid) {
            for (i, b) in bytes.iter().enumerate() {
                proc.memory.insert(address.as_u64() + i as u64, *b);
            }
        }
    }

    pub fn write_u32(&self, pid: ProcessId, address: Address, value: u32) {
        self.write_bytes(pid, address, &value.to_le_bytes());
    }

    pub fn write_u64(&self, pid: ProcessId, address: Address, value: u64) {
        self.write_bytes(pid, address, &value.to_le_bytes());
    }

    pub fn write_f32(&self, pid: ProcessId, address: Address, value: f32) {
        self.write_bytes(pid, address, &value.to_le_bytes());
    }

    /// Every subsequent read sleeps this long before touching the table.
    pub fn set_read_delay(&self, delay: Duration) {
        *self
            .shared
            .read_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn process_list_count(&self) -> u64 {
        self.shared.counters.process_lists.load(Ordering::Relaxed)
    }

    pub fn open_count(&self) -> u64 {
        self.shared.counters.opens.load(Ordering::Relaxed)
    }

    pub fn module_list_count(&self) -> u64 {
        self.shared.counters.module_lists.load(Ordering::Relaxed)
    }

    pub fn read_count(&self) -> u64 {
        self.shared.counters.reads.load(Ordering::Relaxed)
    }
}

impl MemoryAccess for SimAccess {
    fn processes(&self) -> EngineResult<Vec<ProcessInfo>> {
        self.shared
            .counters
            .process_lists
            .fetch_add(1, Ordering::Relaxed);
        Ok(self.state().processes.values().map(|p| p.info.clone()).collect())
    }

    fn open_process(&self, pid: ProcessId) -> EngineResult<Box<dyn ProcessMemory>> {
        self.shared.counters.opens.fetch_add(1, Ordering::Relaxed);
        if !self.state().processes.contains_key(&pid) {
            return Err(ReadError::ProcessNotFound(format!("pid {pid}")));
        }
        Ok(Box::new(SimHandle {
            shared: Arc::clone(&self.shared),
            pid,
        }))
    }

    fn modules(&self, pid: ProcessId) -> EngineResult<Vec<ModuleInfo>> {
        self.shared
            .counters
            .module_lists
            .fetch_add(1, Ordering::Relaxed);
        self.state()
            .processes
            .get(&pid)
            .map(|p| p.modules.clone())
            .ok_or_else(|| ReadError::ProcessNotFound(format!("pid {pid}")))
    }

    fn is_alive(&self, pid: ProcessId) -> bool {
        self.state().processes.contains_key(&pid)
    }
}

struct SimHandle {
    shared: Arc<SimShared>,
    pid: ProcessId,
}

impl ProcessMemory for SimHandle {
    fn read_exact(&self, address: Address, buf: &mut [u8]) -> EngineResult<()> {
        self.shared.counters.reads.fetch_add(1, Ordering::Relaxed);

        let delay = *self
            .shared
            .read_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        let proc = state
            .processes
            .get(&self.pid)
            .ok_or_else(|| ReadError::read_failed(address, "process exited"))?;

        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = *proc
                .memory
                .get(&(address.as_u64() + i as u64))
                .ok_or_else(|| ReadError::read_failed(address, "address not mapped"))?;
        }
        Ok(())
    }
}
