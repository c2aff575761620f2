//! Per-execution-context process state
//!
//! Each logical owner of reads (the dispatcher's fallback path, or one pooled
//! worker) holds its own [`ExecContext`]: a liveness-checked process handle
//! plus a module-base cache. Contexts are never shared, so none of this is
//! locked.

use crate::access::{find_process, MemoryAccess, ProcessMemory};
use crate::core::types::{EngineResult, ProcessInfo, ReadError, ReadOutcome, ReadRequest};
use crate::memory::{execute_request, ModuleBaseCache};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct CachedHandle {
    info: ProcessInfo,
    memory: Box<dyn ProcessMemory>,
    last_checked: Instant,
}

/// Owns the handle to the target process and revalidates it cheaply.
///
/// While the cached handle matches the requested name, liveness is probed by
/// PID at most once per `revalidate_after`; full enumeration and re-open only
/// happen when the probe fails or a different process is requested.
pub struct ProcessHandleCache {
    access: Arc<dyn MemoryAccess>,
    revalidate_after: Duration,
    cached: Option<CachedHandle>,
}

impl ProcessHandleCache {
    pub fn new(access: Arc<dyn MemoryAccess>, revalidate_after: Duration) -> Self {
        ProcessHandleCache {
            access,
            revalidate_after,
            cached: None,
        }
    }

    /// Makes sure an open handle for `process` is cached. Returns `true` when
    /// the underlying process instance changed (first open, PID change, or
    /// re-open after exit) — the caller must then invalidate dependent caches.
    pub fn ensure(&mut self, process: &str) -> EngineResult<bool> {
        if let Some(cached) = &mut self.cached {
            if cached.info.matches_name(process) {
                if cached.last_checked.elapsed() < self.revalidate_after {
                    return Ok(false);
                }
                if self.access.is_alive(cached.info.pid) {
                    cached.last_checked = Instant::now();
                    return Ok(false);
                }
                debug!(process, pid = cached.info.pid, "target process exited, re-opening");
            }
        }

        let info = find_process(self.access.as_ref(), process)?;
        let changed = self
            .cached
            .as_ref()
            .map(|c| c.info.pid != info.pid)
            .unwrap_or(true);
        let memory = self.access.open_process(info.pid)?;
        debug!(process, pid = info.pid, changed, "process handle opened");
        self.cached = Some(CachedHandle {
            info,
            memory,
            last_checked: Instant::now(),
        });
        Ok(changed)
    }

    pub fn handle(&self) -> EngineResult<(&dyn ProcessMemory, &ProcessInfo)> {
        self.cached
            .as_ref()
            .map(|c| (c.memory.as_ref(), &c.info))
            .ok_or_else(|| ReadError::ProcessNotFound("no process attached".to_string()))
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

/// One read executor: handle cache + module cache + the shared access
/// capability. The worker pool gives each worker one of these; the
/// single-threaded fallback path owns another.
pub struct ExecContext {
    access: Arc<dyn MemoryAccess>,
    handles: ProcessHandleCache,
    modules: ModuleBaseCache,
}

impl ExecContext {
    pub fn new(access: Arc<dyn MemoryAccess>, revalidate_after: Duration) -> Self {
        ExecContext {
            handles: ProcessHandleCache::new(Arc::clone(&access), revalidate_after),
            modules: ModuleBaseCache::new(),
            access,
        }
    }

    /// Reads every request in the chunk, one outcome per request. A failure
    /// to attach the process fails the whole chunk; individual read failures
    /// stay individual.
    pub fn read_chunk(&mut self, process: &str, requests: &[ReadRequest]) -> Vec<ReadOutcome> {
        match self.handles.ensure(process) {
            Ok(true) => self.modules.clear(),
            Ok(false) => {}
            Err(err) => {
                return requests
                    .iter()
                    .map(|r| ReadOutcome::err(r.id.clone(), err.clone()))
                    .collect();
            }
        }
        self.modules.sweep();

        requests
            .iter()
            .map(|request| self.read_one(request))
            .collect()
    }

    fn read_one(&mut self, request: &ReadRequest) -> ReadOutcome {
        let (memory, info) = match self.handles.handle() {
            Ok(pair) => pair,
            Err(err) => return ReadOutcome::err(request.id.clone(), err),
        };
        let result = execute_request(self.access.as_ref(), memory, info, &mut self.modules, request);
        ReadOutcome {
            id: request.id.clone(),
            result,
        }
    }

    /// Resolves the base of `module` once, for module-grouped fallback reads.
    pub fn module_base(&mut self, module: &str) -> EngineResult<crate::core::types::Address> {
        let (_, info) = self.handles.handle()?;
        let info = info.clone();
        crate::memory::module_base(self.access.as_ref(), &mut self.modules, &info, module)
    }

    /// Attaches to `process` without reading anything.
    pub fn attach(&mut self, process: &str) -> EngineResult<()> {
        if self.handles.ensure(process)? {
            self.modules.clear();
        }
        Ok(())
    }

    pub fn module_cache_len(&self) -> usize {
        self.modules.len()
    }

    pub fn clear_caches(&mut self) {
        self.modules.clear();
        self.handles.invalidate();
    }
}
