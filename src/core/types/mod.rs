//! Core type definitions for the sampling engine

mod address;
mod error;
mod outcome;
mod process_info;
mod request;
mod sample;

pub use address::{parse_offset, Address, OffsetFormat};
pub use error::{EngineResult, ReadError, WorkerId};
pub use outcome::{ReadOutcome, Sample};
pub use process_info::{ModuleInfo, ProcessArchitecture, ProcessId, ProcessInfo};
pub use request::{AddressSpec, ReadRequest, RequestId};
pub use sample::{extract_bitfield, BitwiseOp, SampleValue, ValueType};
