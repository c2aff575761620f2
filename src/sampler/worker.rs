//! Pooled worker thread body

use super::protocol::{ChunkReply, WorkerCommand};
use crate::access::MemoryAccess;
use crate::core::types::WorkerId;
use crate::process::ExecContext;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Runs until told to terminate or the command channel closes. The worker
/// owns its process handle and module cache; nothing is shared with the
/// dispatcher beyond the channels.
pub fn worker_main(
    id: WorkerId,
    access: Arc<dyn MemoryAccess>,
    liveness_interval: Duration,
    commands: Receiver<WorkerCommand>,
) {
    let mut context = ExecContext::new(access, liveness_interval);
    debug!(worker = id, "worker started");

    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::ReadChunk {
                process,
                requests,
                reply,
            } => {
                let started = Instant::now();
                let outcomes = context.read_chunk(&process, &requests);
                trace!(
                    worker = id,
                    requests = outcomes.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "chunk done"
                );
                // A dispatcher that timed out has dropped the receiver;
                // nothing to do with the result then.
                let _ = reply.send(ChunkReply {
                    worker: id,
                    outcomes,
                    elapsed: started.elapsed(),
                });
            }
            WorkerCommand::ClearCaches => context.clear_caches(),
            WorkerCommand::Terminate => break,
        }
    }

    debug!(worker = id, "worker stopped");
}
