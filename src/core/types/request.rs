//! Read request specification
//!
//! The address variant is decided once at construction time: textual offsets
//! are parsed up front, so the hot path never re-infers what kind of address
//! a request carries.

use super::address::{parse_offset, Address, OffsetFormat};
use super::error::{EngineResult, ReadError};
use super::sample::{extract_bitfield, BitwiseOp, SampleValue, ValueType};
use serde::{Deserialize, Serialize};

/// Stable request identifier, reused across ticks for address caching.
pub type RequestId = String;

/// Where in the target's address space a request points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressSpec {
    /// A literal absolute address.
    Direct { address: Address },
    /// An offset from a named module's base. An empty module name is filled
    /// in with the target process name during validation.
    ModuleOffset { module: String, offset: i64 },
}

/// One memory read, immutable for the duration of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub id: RequestId,
    pub spec: AddressSpec,
    /// Pointer-chain offsets applied after the base resolves; empty means no
    /// chain. Each step reads a pointer and adds the next offset.
    #[serde(default)]
    pub pointer_offsets: Vec<i64>,
    pub value_type: ValueType,
    #[serde(default)]
    pub bitmask: Option<u64>,
    #[serde(default)]
    pub bitwise_op: Option<BitwiseOp>,
    #[serde(default)]
    pub bitfield_extract: bool,
    /// Allows reuse of a previously resolved chain address within its TTL.
    #[serde(default)]
    pub fast_mode: bool,
    /// Bypasses the value and resolved-address caches entirely.
    #[serde(default)]
    pub disable_caching: bool,
    /// Final address from a previous tick, injected by the dispatcher before
    /// the request is handed to a worker. Never part of the wire spec.
    #[serde(skip)]
    pub resolved_hint: Option<Address>,
}

/// Borrowed view serialized as the value-cache key. Excludes `id` and the
/// caching flags so identical specs share entries while differing masks or
/// types never collide.
#[derive(Serialize)]
struct SpecKey<'a> {
    process: &'a str,
    spec: &'a AddressSpec,
    pointer_offsets: &'a [i64],
    value_type: ValueType,
    bitmask: Option<u64>,
    bitwise_op: Option<BitwiseOp>,
    bitfield_extract: bool,
}

impl ReadRequest {
    /// A request for a literal address.
    pub fn direct(id: impl Into<RequestId>, address: Address, value_type: ValueType) -> Self {
        ReadRequest {
            id: id.into(),
            spec: AddressSpec::Direct { address },
            pointer_offsets: Vec::new(),
            value_type,
            bitmask: None,
            bitwise_op: None,
            bitfield_extract: false,
            fast_mode: false,
            disable_caching: false,
            resolved_hint: None,
        }
    }

    /// A module-relative request; the textual offset is normalized here.
    pub fn module_offset(
        id: impl Into<RequestId>,
        module: impl Into<String>,
        offset: &str,
        format: OffsetFormat,
        value_type: ValueType,
    ) -> EngineResult<Self> {
        let offset = parse_offset(offset, format)?;
        Ok(ReadRequest {
            id: id.into(),
            spec: AddressSpec::ModuleOffset {
                module: module.into(),
                offset,
            },
            pointer_offsets: Vec::new(),
            value_type,
            bitmask: None,
            bitwise_op: None,
            bitfield_extract: false,
            fast_mode: false,
            disable_caching: false,
            resolved_hint: None,
        })
    }

    pub fn with_pointer_offsets(mut self, offsets: Vec<i64>) -> Self {
        self.pointer_offsets = offsets;
        self
    }

    /// Parses textual chain offsets in one go.
    pub fn with_pointer_offsets_str(
        mut self,
        offsets: &[&str],
        format: OffsetFormat,
    ) -> EngineResult<Self> {
        self.pointer_offsets = offsets
            .iter()
            .map(|s| parse_offset(s, format))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(self)
    }

    pub fn with_bitmask(mut self, mask: u64, op: BitwiseOp) -> Self {
        self.bitmask = Some(mask);
        self.bitwise_op = Some(op);
        self
    }

    pub fn with_bitfield_extract(mut self) -> Self {
        self.bitfield_extract = true;
        self
    }

    pub fn fast(mut self) -> Self {
        self.fast_mode = true;
        self
    }

    pub fn uncached(mut self) -> Self {
        self.disable_caching = true;
        self
    }

    pub fn has_pointer_chain(&self) -> bool {
        !self.pointer_offsets.is_empty()
    }

    /// Validates the request and fills defaultable gaps.
    ///
    /// A missing module name defaults to the target process name; a bitmask
    /// without an operation defaults to AND. A bitmask on a float type and
    /// bitfield extraction without a mask are rejected, never guessed.
    pub fn validate(&mut self, process: &str) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(ReadError::validation("request id must not be empty"));
        }

        if let AddressSpec::ModuleOffset { module, .. } = &mut self.spec {
            if module.trim().is_empty() {
                if process.trim().is_empty() {
                    return Err(ReadError::validation(format!(
                        "request {}: no module name and no process name to default to",
                        self.id
                    )));
                }
                *module = process.to_string();
            }
        }

        if self.bitmask.is_some() && !self.value_type.is_integer() {
            return Err(ReadError::validation(format!(
                "request {}: bitmask requires an integer value type, got {}",
                self.id, self.value_type
            )));
        }
        if self.bitmask.is_some() && self.bitwise_op.is_none() {
            self.bitwise_op = Some(BitwiseOp::And);
        }
        if let Some(op) = self.bitwise_op {
            if self.bitmask.is_none() && op != BitwiseOp::Not {
                return Err(ReadError::validation(format!(
                    "request {}: bitwise {:?} needs a bitmask",
                    self.id, op
                )));
            }
        }
        if self.bitfield_extract && self.bitmask.is_none() {
            return Err(ReadError::validation(format!(
                "request {}: bitfield extraction needs a bitmask",
                self.id
            )));
        }

        Ok(())
    }

    /// Canonical serialization of the full read spec, used as the value-cache
    /// key. `None` only if serialization fails, in which case caching is
    /// simply skipped for this request.
    pub fn cache_key(&self, process: &str) -> Option<String> {
        serde_json::to_string(&SpecKey {
            process,
            spec: &self.spec,
            pointer_offsets: &self.pointer_offsets,
            value_type: self.value_type,
            bitmask: self.bitmask,
            bitwise_op: self.bitwise_op,
            bitfield_extract: self.bitfield_extract,
        })
        .ok()
    }

    /// Applies the request's bit transforms to a raw read value.
    pub fn post_process(&self, raw: SampleValue) -> EngineResult<SampleValue> {
        let Some(op) = self.bitwise_op else {
            return Ok(raw);
        };
        let mask = self.bitmask.unwrap_or(0);

        let bits = raw.as_bits().ok_or_else(|| {
            ReadError::UnsupportedType(format!(
                "request {}: bitwise transform on non-integer value",
                self.id
            ))
        })?;

        let mut out = op.apply(bits, mask);
        if self.bitfield_extract {
            out = extract_bitfield(out, mask);
        }
        Ok(SampleValue::U64(out))
    }
}
