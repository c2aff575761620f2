//! Polling loop and the public engine facade
//!
//! One engine thread owns the [`BatchReader`] (and through it every cache
//! and the worker pool) from construction to shutdown; the [`Sampler`]
//! facade talks to it exclusively through the control channel, so no cache
//! is ever touched by two owners. Ticks and one-shot batch reads interleave
//! on the same thread, which is what prevents two ticks from ever running
//! concurrently against the same handle set.

use super::batch::BatchReader;
use super::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::access::MemoryAccess;
use crate::config::EngineConfig;
use crate::core::types::{ReadError, ReadOutcome, ReadRequest};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// What to sample on the next tick.
pub struct BatchPlan {
    pub process: String,
    pub requests: Vec<ReadRequest>,
}

/// Supplies the active request set; called once per tick so the set may
/// change between ticks without restarting the loop.
pub trait RequestSource: Send {
    fn next_batch(&mut self) -> BatchPlan;
}

impl<F> RequestSource for F
where
    F: FnMut() -> BatchPlan + Send,
{
    fn next_batch(&mut self) -> BatchPlan {
        (self)()
    }
}

/// One tick's merged results. All outcomes share the tick's single
/// timestamp, so consumers can treat them as a consistent snapshot.
pub struct TickSnapshot {
    pub timestamp: SystemTime,
    pub duration: Duration,
    pub outcomes: Vec<ReadOutcome>,
}

/// Receives each tick's snapshot; the engine's downstream collaborator.
pub trait SampleSink: Send {
    fn deliver(&mut self, tick: TickSnapshot);
}

impl<F> SampleSink for F
where
    F: FnMut(TickSnapshot) + Send,
{
    fn deliver(&mut self, tick: TickSnapshot) {
        (self)(tick)
    }
}

enum Control {
    ReadBatch {
        process: String,
        requests: Vec<ReadRequest>,
        reply: Sender<Vec<ReadOutcome>>,
    },
    Start {
        source: Box<dyn RequestSource>,
        sink: Box<dyn SampleSink>,
        reply: Sender<()>,
    },
    Stop,
    SetRate(Duration),
    ClearCaches,
    Shutdown,
}

struct Session {
    source: Box<dyn RequestSource>,
    sink: Box<dyn SampleSink>,
    /// Process liveness is verified once per session, not per tick.
    verified: bool,
}

struct Engine {
    reader: BatchReader,
    metrics: Arc<Mutex<MetricsRecorder>>,
    interval: Duration,
    session: Option<Session>,
    next_tick: Option<Instant>,
}

impl Engine {
    fn run(mut self, control: Receiver<Control>) {
        loop {
            let message = match self.next_tick {
                Some(deadline) => match control.recv_deadline(deadline) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => {
                        self.run_tick();
                        None
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match control.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };

            match message {
                None => {}
                Some(Control::Shutdown) => break,
                Some(message) => self.handle(message),
            }
        }

        // Teardown: caches emptied, pooled workers terminated by the
        // reader's drop.
        self.reader.clear_caches();
        debug!("engine thread exiting");
    }

    fn handle(&mut self, message: Control) {
        match message {
            Control::ReadBatch {
                process,
                requests,
                reply,
            } => {
                let outcomes = self.reader.read_batch(&process, requests);
                self.publish_resources();
                let _ = reply.send(outcomes);
            }
            Control::Start {
                source,
                sink,
                reply,
            } => {
                info!(interval_ms = self.interval.as_millis() as u64, "polling started");
                self.session = Some(Session {
                    source,
                    sink,
                    verified: false,
                });
                self.next_tick = Some(Instant::now() + self.interval);
                let _ = reply.send(());
            }
            Control::Stop => {
                info!("polling stopped");
                self.session = None;
                self.next_tick = None;
            }
            Control::SetRate(interval) => {
                debug!(interval_ms = interval.as_millis() as u64, "poll rate changed");
                self.interval = interval;
                self.reader.set_poll_interval(interval);
                // Restart the cadence in place; the session survives.
                if self.next_tick.is_some() {
                    self.next_tick = Some(Instant::now() + interval);
                }
            }
            Control::ClearCaches => {
                self.reader.clear_caches();
                self.publish_resources();
            }
            Control::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn run_tick(&mut self) {
        let started = Instant::now();

        if let Some(session) = &mut self.session {
            let plan = session.source.next_batch();

            if !session.verified {
                match self.reader.verify_process(&plan.process) {
                    Ok(info) => {
                        debug!(process = %plan.process, pid = info.pid, "target verified");
                        session.verified = true;
                    }
                    Err(err) => {
                        warn!(process = %plan.process, error = %err, "target not available");
                        let outcomes = plan
                            .requests
                            .iter()
                            .map(|r| ReadOutcome::err(r.id.clone(), err.clone()))
                            .collect();
                        session.sink.deliver(TickSnapshot {
                            timestamp: SystemTime::now(),
                            duration: started.elapsed(),
                            outcomes,
                        });
                        self.finish_tick(started);
                        return;
                    }
                }
            }

            let outcomes = self.reader.read_batch(&plan.process, plan.requests);
            session.sink.deliver(TickSnapshot {
                timestamp: SystemTime::now(),
                duration: started.elapsed(),
                outcomes,
            });
        }

        self.finish_tick(started);
    }

    /// Records metrics and schedules the next tick. Intervals the tick
    /// overran are counted as skipped, never run late back-to-back.
    fn finish_tick(&mut self, started: Instant) {
        let duration = started.elapsed();
        let mut skipped = 0u64;
        if let Some(deadline) = self.next_tick {
            let now = Instant::now();
            let mut next = deadline + self.interval;
            while next <= now {
                next += self.interval;
                skipped += 1;
            }
            self.next_tick = Some(next);
        }

        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_tick(duration);
            if skipped > 0 {
                metrics.add_skipped(skipped);
            }
            metrics.set_resources(self.reader.cache_sizes(), self.reader.worker_count());
        }
    }

    fn publish_resources(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.set_resources(self.reader.cache_sizes(), self.reader.worker_count());
        }
    }
}

/// Handle to the sampling engine.
///
/// Owns the engine thread; dropping the sampler shuts the engine and its
/// worker pool down gracefully.
pub struct Sampler {
    control: Sender<Control>,
    metrics: Arc<Mutex<MetricsRecorder>>,
    thread: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn new(access: Arc<dyn MemoryAccess>, config: EngineConfig) -> std::io::Result<Self> {
        let metrics = Arc::new(Mutex::new(MetricsRecorder::new()));
        let engine = Engine {
            reader: BatchReader::new(access, &config),
            metrics: Arc::clone(&metrics),
            interval: config.poll_interval,
            session: None,
            next_tick: None,
        };
        let (control, control_rx) = unbounded();
        let thread = std::thread::Builder::new()
            .name("sampler-engine".to_string())
            .spawn(move || engine.run(control_rx))?;
        Ok(Sampler {
            control,
            metrics,
            thread: Some(thread),
        })
    }

    /// One-shot batch read, serviced by the engine thread between ticks.
    pub fn read_batch(&self, process: &str, requests: Vec<ReadRequest>) -> Vec<ReadOutcome> {
        let ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
        let (reply, reply_rx) = bounded(1);
        let sent = self.control.send(Control::ReadBatch {
            process: process.to_string(),
            requests,
            reply,
        });
        if sent.is_ok() {
            if let Ok(outcomes) = reply_rx.recv() {
                return outcomes;
            }
        }
        ids.into_iter()
            .map(|id| {
                ReadOutcome::err(
                    id,
                    ReadError::EngineUnavailable("engine thread stopped".to_string()),
                )
            })
            .collect()
    }

    /// Starts fixed-interval polling. Returns once the engine has installed
    /// the session; the first tick fires one interval later.
    pub fn start(
        &self,
        source: impl RequestSource + 'static,
        sink: impl SampleSink + 'static,
    ) {
        let (reply, reply_rx) = bounded(1);
        if self
            .control
            .send(Control::Start {
                source: Box::new(source),
                sink: Box::new(sink),
                reply,
            })
            .is_ok()
        {
            let _ = reply_rx.recv();
        }
    }

    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Changes the tick interval; also re-derives the value-cache TTL. If
    /// polling is active the loop restarts at the new rate without losing
    /// the request set.
    pub fn set_poll_rate(&self, interval: Duration) {
        let _ = self.control.send(Control::SetRate(interval));
    }

    pub fn clear_caches(&self) {
        let _ = self.control.send(Control::ClearCaches);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .lock()
            .map(|m| m.snapshot())
            .unwrap_or_default()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
