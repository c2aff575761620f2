//! Bounded pool of read workers
//!
//! Workers are grown lazily up to the effective cap, pruned when their
//! threads exit, and evicted (detached, never reused) after a timeout or
//! crash. Eviction cannot force an OS thread to die; the stuck thread
//! unwinds on its own once its blocking read returns, while the pool has
//! already replaced it.

use super::protocol::WorkerCommand;
use super::worker::worker_main;
use crate::access::MemoryAccess;
use crate::core::types::WorkerId;
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Requests per chunk below which a fast-mode batch still splits across at
/// least two workers.
const FAST_MODE_CHUNK: usize = 5;

struct PooledWorker {
    id: WorkerId,
    commands: Sender<WorkerCommand>,
    thread: JoinHandle<()>,
}

pub struct WorkerPool {
    access: Arc<dyn MemoryAccess>,
    liveness_interval: Duration,
    cap: usize,
    min_per_worker: usize,
    workers: Vec<PooledWorker>,
    next_id: WorkerId,
}

impl WorkerPool {
    pub fn new(
        access: Arc<dyn MemoryAccess>,
        cap: usize,
        min_per_worker: usize,
        liveness_interval: Duration,
    ) -> Self {
        WorkerPool {
            access,
            liveness_interval,
            cap: effective_cap(cap),
            min_per_worker,
            workers: Vec::new(),
            next_id: 0,
        }
    }

    /// Pool size the sizing formula asks for, before capacity limits bite.
    pub fn target_count(&self, request_count: usize, fast_mode: bool) -> usize {
        if request_count == 0 {
            return 0;
        }
        let wanted = if fast_mode {
            request_count.div_ceil(FAST_MODE_CHUNK).max(2)
        } else {
            request_count.div_ceil(self.min_per_worker)
        };
        wanted.max(1).min(self.cap)
    }

    /// Drops workers whose threads have exited or whose channels are gone.
    fn prune(&mut self) {
        self.workers.retain(|w| {
            let dead = w.thread.is_finished();
            if dead {
                warn!(worker = w.id, "pruning dead worker");
            }
            !dead
        });
    }

    /// Grows the pool toward `target` and returns how many workers are
    /// actually available. Spawn failures are logged, not propagated: zero
    /// available workers triggers the caller's fallback path.
    pub fn ensure(&mut self, target: usize) -> usize {
        self.prune();
        while self.workers.len() < target {
            let id = self.next_id;
            let (tx, rx) = unbounded();
            let access = Arc::clone(&self.access);
            let liveness = self.liveness_interval;
            let spawned = std::thread::Builder::new()
                .name(format!("sampler-worker-{id}"))
                .spawn(move || worker_main(id, access, liveness, rx));
            match spawned {
                Ok(thread) => {
                    self.next_id += 1;
                    debug!(worker = id, pool = self.workers.len() + 1, "worker spawned");
                    self.workers.push(PooledWorker {
                        id,
                        commands: tx,
                        thread,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "failed to spawn worker thread");
                    break;
                }
            }
        }
        self.workers.len()
    }

    /// Snapshot of the live workers' ids and command channels. Dispatch works
    /// against this snapshot, so evicting a worker mid-dispatch never shifts
    /// later chunks onto the wrong channel.
    pub fn senders(&self) -> Vec<(WorkerId, Sender<WorkerCommand>)> {
        self.workers
            .iter()
            .map(|w| (w.id, w.commands.clone()))
            .collect()
    }

    /// Removes a worker from the pool without waiting for its thread. The
    /// detached thread finishes (or stays stuck) on its own.
    pub fn evict(&mut self, id: WorkerId) {
        if let Some(pos) = self.workers.iter().position(|w| w.id == id) {
            warn!(worker = id, "evicting worker");
            let worker = self.workers.remove(pos);
            drop(worker.commands);
        }
    }

    pub fn broadcast_clear_caches(&self) {
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::ClearCaches);
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Graceful teardown: terminate and join every worker.
    pub fn shutdown(&mut self) {
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::Terminate);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.thread.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `clamp(cpus - 1, 1, cap)` — leave a core for the dispatcher.
fn effective_cap(cap: usize) -> usize {
    num_cpus::get().saturating_sub(1).clamp(1, cap.max(1))
}
