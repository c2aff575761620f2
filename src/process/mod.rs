//! Process handle and execution-context management

pub mod context;

pub use context::{ExecContext, ProcessHandleCache};
