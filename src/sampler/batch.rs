//! Batched reading across the worker pool
//!
//! The dispatcher validates and defaults requests, answers what it can from
//! the value cache, injects resolved-address hints for fast-mode chains,
//! splits the rest into contiguous chunks across the pool, and merges
//! replies back by request id. A failed address never aborts its batch, a
//! timed-out worker is evicted and its chunk surfaces explicit failures, and
//! with no workers at all reads degrade to a module-grouped single-threaded
//! path.

use super::metrics::CacheSizes;
use super::pool::WorkerPool;
use super::protocol::{ChunkReply, WorkerCommand};
use crate::access::{find_process, MemoryAccess};
use crate::config::EngineConfig;
use crate::core::types::{
    AddressSpec, EngineResult, ProcessInfo, ReadError, ReadOutcome, ReadRequest, WorkerId,
};
use crate::memory::{value_cache_ttl, ResolvedAddressCache, TtlCache, ValueCache, ADDRESS_CACHE_TTL};
use crate::process::ExecContext;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Group key used by the fallback path for requests with no module.
const DIRECT_GROUP: &str = "direct";

pub struct BatchReader {
    access: Arc<dyn MemoryAccess>,
    pool: WorkerPool,
    /// Execution context for the single-threaded fallback path.
    fallback: ExecContext,
    resolved: ResolvedAddressCache,
    values: ValueCache,
    worker_timeout: Duration,
}

impl BatchReader {
    pub fn new(access: Arc<dyn MemoryAccess>, config: &EngineConfig) -> Self {
        BatchReader {
            pool: WorkerPool::new(
                Arc::clone(&access),
                config.worker_cap,
                config.min_per_worker,
                config.liveness_interval,
            ),
            fallback: ExecContext::new(Arc::clone(&access), config.liveness_interval),
            resolved: TtlCache::new(ADDRESS_CACHE_TTL),
            values: TtlCache::new(value_cache_ttl(config.poll_interval)),
            worker_timeout: config.worker_timeout,
            access,
        }
    }

    /// Re-derives the value-cache TTL when the poll rate changes.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.values.set_ttl(value_cache_ttl(interval));
    }

    /// One-off liveness check used at the start of a polling session.
    pub fn verify_process(&self, process: &str) -> EngineResult<ProcessInfo> {
        find_process(self.access.as_ref(), process)
    }

    pub fn cache_sizes(&self) -> CacheSizes {
        CacheSizes {
            modules: self.fallback.module_cache_len(),
            resolved_addresses: self.resolved.len(),
            values: self.values.len(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    /// Clears every cache tier, including the pooled workers' own.
    pub fn clear_caches(&mut self) {
        self.values.clear();
        self.resolved.clear();
        self.fallback.clear_caches();
        self.pool.broadcast_clear_caches();
    }

    /// Reads a batch; always returns one outcome per request, in request
    /// order. An empty process name or request list yields an empty result
    /// set rather than an error.
    pub fn read_batch(&mut self, process: &str, requests: Vec<ReadRequest>) -> Vec<ReadOutcome> {
        if process.trim().is_empty() || requests.is_empty() {
            return Vec::new();
        }

        self.resolved.sweep();
        self.values.sweep();

        let total = requests.len();
        let mut outcomes: Vec<Option<ReadOutcome>> = (0..total).map(|_| None).collect();
        let mut pending: Vec<(usize, ReadRequest)> = Vec::new();

        for (idx, mut request) in requests.into_iter().enumerate() {
            if let Err(err) = request.validate(process) {
                outcomes[idx] = Some(ReadOutcome::err(request.id.clone(), err));
                continue;
            }
            if !request.disable_caching {
                if let Some(sample) = request
                    .cache_key(process)
                    .and_then(|key| self.values.get(&key))
                {
                    outcomes[idx] = Some(ReadOutcome {
                        id: request.id.clone(),
                        result: Ok(sample),
                    });
                    continue;
                }
                if request.fast_mode && request.has_pointer_chain() {
                    request.resolved_hint = self.resolved.get(&request.id);
                }
            }
            pending.push((idx, request));
        }

        if !pending.is_empty() {
            let fast = pending.iter().any(|(_, r)| r.fast_mode);
            let target = self.pool.target_count(pending.len(), fast);
            let available = self.pool.ensure(target);

            let results = if available == 0 {
                warn!("no workers available, using single-threaded fallback");
                self.fallback_read(process, &pending)
            } else {
                self.dispatch(process, &pending, available)
            };

            let request_by_idx: HashMap<usize, &ReadRequest> =
                pending.iter().map(|(i, r)| (*i, r)).collect();
            for (idx, outcome) in results {
                if let (Ok(sample), Some(request)) = (&outcome.result, request_by_idx.get(&idx)) {
                    if !request.disable_caching {
                        if request.fast_mode && request.has_pointer_chain() {
                            self.resolved.put(request.id.clone(), sample.address);
                        }
                        if let Some(key) = request.cache_key(process) {
                            self.values.put(key, *sample);
                        }
                    }
                }
                outcomes[idx] = Some(outcome);
            }
        }

        outcomes
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ReadOutcome::err(
                        String::new(),
                        ReadError::validation("request produced no outcome"),
                    )
                })
            })
            .collect()
    }

    /// Splits `pending` into contiguous chunks, one per available worker,
    /// and waits for every chunk under one shared deadline.
    fn dispatch(
        &mut self,
        process: &str,
        pending: &[(usize, ReadRequest)],
        available: usize,
    ) -> Vec<(usize, ReadOutcome)> {
        // Assignments are fixed against this snapshot; an eviction while
        // chunks are going out must not shift later chunks onto another
        // worker's channel.
        let workers = self.pool.senders();
        let chunk_size = pending.len().div_ceil(available);
        let mut results = Vec::with_capacity(pending.len());
        let mut waits: Vec<(&[(usize, ReadRequest)], WorkerId, Receiver<ChunkReply>)> = Vec::new();

        for (chunk, (worker, sender)) in pending.chunks(chunk_size).zip(workers.iter()) {
            let (reply_tx, reply_rx) = bounded(1);
            let command = WorkerCommand::ReadChunk {
                process: process.to_string(),
                requests: chunk.iter().map(|(_, r)| r.clone()).collect(),
                reply: reply_tx,
            };
            if sender.send(command).is_ok() {
                waits.push((chunk, *worker, reply_rx));
            } else {
                self.pool.evict(*worker);
                results.extend(crash_chunk(chunk, *worker, "worker channel closed"));
            }
        }

        let deadline = Instant::now() + self.worker_timeout;
        for (chunk, worker, reply_rx) in waits {
            match reply_rx.recv_deadline(deadline) {
                Ok(reply) => {
                    debug!(
                        worker = reply.worker,
                        requests = chunk.len(),
                        elapsed_us = reply.elapsed.as_micros() as u64,
                        "chunk reply"
                    );
                    results.extend(correlate(chunk, reply));
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(worker, "worker timed out, evicting");
                    self.pool.evict(worker);
                    results.extend(
                        chunk
                            .iter()
                            .map(|(i, r)| (*i, ReadOutcome::err(r.id.clone(), ReadError::WorkerTimeout(worker)))),
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(worker, "worker crashed mid-chunk, evicting");
                    self.pool.evict(worker);
                    results.extend(crash_chunk(chunk, worker, "worker exited before replying"));
                }
            }
        }
        results
    }

    /// Single-threaded path: requests grouped by module so each group's base
    /// resolves once. Groups fail independently, requests within a group
    /// fail independently.
    fn fallback_read(
        &mut self,
        process: &str,
        pending: &[(usize, ReadRequest)],
    ) -> Vec<(usize, ReadOutcome)> {
        if let Err(err) = self.fallback.attach(process) {
            return pending
                .iter()
                .map(|(i, r)| (*i, ReadOutcome::err(r.id.clone(), err.clone())))
                .collect();
        }

        let mut groups: Vec<(String, Vec<&(usize, ReadRequest)>)> = Vec::new();
        for entry in pending {
            let key = match &entry.1.spec {
                AddressSpec::Direct { .. } => DIRECT_GROUP.to_string(),
                AddressSpec::ModuleOffset { module, .. } => module.to_lowercase(),
            };
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(entry),
                None => groups.push((key, vec![entry])),
            }
        }

        let mut results = Vec::with_capacity(pending.len());
        for (key, members) in groups {
            if key != DIRECT_GROUP {
                if let Err(err) = self.fallback.module_base(&key) {
                    warn!(module = %key, error = %err, "fallback group failed");
                    results.extend(
                        members
                            .iter()
                            .map(|(i, r)| (*i, ReadOutcome::err(r.id.clone(), err.clone()))),
                    );
                    continue;
                }
            }
            let requests: Vec<ReadRequest> = members.iter().map(|(_, r)| r.clone()).collect();
            let outcomes = self.fallback.read_chunk(process, &requests);
            results.extend(
                members
                    .iter()
                    .zip(outcomes)
                    .map(|((i, _), outcome)| (*i, outcome)),
            );
        }
        results.sort_by_key(|(i, _)| *i);
        results
    }
}

fn crash_chunk(
    chunk: &[(usize, ReadRequest)],
    worker: WorkerId,
    reason: &str,
) -> Vec<(usize, ReadOutcome)> {
    chunk
        .iter()
        .map(|(i, r)| {
            (
                *i,
                ReadOutcome::err(r.id.clone(), ReadError::worker_crash(worker, reason)),
            )
        })
        .collect()
}

/// Matches reply outcomes back to chunk entries by id; order within the
/// chunk is not assumed. Missing entries become explicit crashes rather
/// than silent omissions.
fn correlate(
    chunk: &[(usize, ReadRequest)],
    reply: ChunkReply,
) -> Vec<(usize, ReadOutcome)> {
    let mut by_id: HashMap<String, VecDeque<ReadOutcome>> = HashMap::new();
    for outcome in reply.outcomes {
        by_id.entry(outcome.id.clone()).or_default().push_back(outcome);
    }
    chunk
        .iter()
        .map(|(idx, request)| {
            let outcome = by_id
                .get_mut(&request.id)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| {
                    ReadOutcome::err(
                        request.id.clone(),
                        ReadError::worker_crash(reply.worker, "no outcome for request"),
                    )
                });
            (*idx, outcome)
        })
        .collect()
}
