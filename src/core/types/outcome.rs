//! Per-request read outcomes

use super::address::Address;
use super::error::ReadError;
use super::request::RequestId;
use super::sample::SampleValue;
use serde::Serialize;

/// A successful read: the value after post-processing plus the absolute
/// address it came from, which feeds the resolved-address cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub value: SampleValue,
    pub address: Address,
}

/// The result of one request within a batch. Batches always return one
/// outcome per input request; failure is data, not an exception.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub id: RequestId,
    pub result: Result<Sample, ReadError>,
}

impl ReadOutcome {
    pub fn ok(id: impl Into<RequestId>, value: SampleValue, address: Address) -> Self {
        ReadOutcome {
            id: id.into(),
            result: Ok(Sample { value, address }),
        }
    }

    pub fn err(id: impl Into<RequestId>, error: ReadError) -> Self {
        ReadOutcome {
            id: id.into(),
            result: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<SampleValue> {
        self.result.as_ref().ok().map(|s| s.value)
    }
}
