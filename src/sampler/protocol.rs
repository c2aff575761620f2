//! Message protocol between the dispatcher and pooled workers
//!
//! All cross-thread traffic is tagged variants with full ownership transfer;
//! replies carry the worker id so the dispatcher can correlate and evict.

use crate::core::types::{ReadOutcome, ReadRequest, WorkerId};
use crossbeam_channel::Sender;
use std::time::Duration;

/// Commands a worker accepts.
#[derive(Debug)]
pub enum WorkerCommand {
    /// One contiguous chunk of a batch. The reply channel is created per
    /// dispatch, so responses can never be confused across ticks.
    ReadChunk {
        process: String,
        requests: Vec<ReadRequest>,
        reply: Sender<ChunkReply>,
    },
    /// Drops the worker's caches without tearing the thread down.
    ClearCaches,
    /// Graceful shutdown.
    Terminate,
}

/// A worker's answer for one chunk.
#[derive(Debug)]
pub struct ChunkReply {
    pub worker: WorkerId,
    pub outcomes: Vec<ReadOutcome>,
    pub elapsed: Duration,
}
