//! Batched sampling engine: worker pool, dispatcher, and polling loop

pub mod batch;
pub mod metrics;
pub mod polling;
pub mod pool;
pub mod protocol;
pub mod worker;

pub use batch::BatchReader;
pub use metrics::{CacheSizes, MetricsRecorder, MetricsSnapshot};
pub use polling::{BatchPlan, RequestSource, Sampler, SampleSink, TickSnapshot};
pub use pool::WorkerPool;
