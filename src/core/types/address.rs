//! Memory address wrapper with hex/decimal parsing and offset normalization

use super::error::{EngineResult, ReadError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A virtual address inside the target process.
///
/// Arithmetic is done in `u64` regardless of the host pointer width so that
/// 64-bit targets resolve correctly from a 32-bit host build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Lowest address considered sane; anything below is the null page
    /// (or close enough to it) and is rejected before a read is attempted.
    pub const MIN_VALID: Address = Address(0x10000);

    pub const fn new(value: u64) -> Self {
        Address(value)
    }

    pub const fn null() -> Self {
        Address(0)
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// True when the address clears the null-page floor.
    pub const fn is_sane(&self) -> bool {
        self.0 >= Self::MIN_VALID.0
    }

    /// Adds a signed offset, wrapping on overflow like target-side pointer
    /// arithmetic would.
    pub const fn offset(&self, offset: i64) -> Self {
        Address(self.0.wrapping_add(offset as u64))
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for Address {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
            // Bare hex like "DEADBEEF"
            u64::from_str_radix(s, 16)
        } else {
            s.parse::<u64>()
        };

        value
            .map(Address::new)
            .map_err(|_| ReadError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

/// How a textual offset should be interpreted when it carries no `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetFormat {
    Hex,
    Decimal,
}

/// Normalizes a textual offset to a signed 64-bit value.
///
/// A `0x` prefix always wins; otherwise `format` decides the radix. A leading
/// `-` is honored in either radix.
pub fn parse_offset(s: &str, format: OffsetFormat) -> EngineResult<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ReadError::Validation("empty offset".to_string()));
    }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        match format {
            OffsetFormat::Hex => u64::from_str_radix(body, 16),
            OffsetFormat::Decimal => body.parse::<u64>(),
        }
    }
    .map_err(|_| ReadError::Validation(format!("malformed offset: {s}")))?;

    if negative {
        Ok((magnitude as i64).wrapping_neg())
    } else {
        Ok(magnitude as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        assert_eq!(Address::from_str("0x1000").unwrap(), Address::new(0x1000));
        assert_eq!(Address::from_str("0X1000").unwrap(), Address::new(0x1000));
        assert_eq!(
            Address::from_str("DEADBEEF").unwrap(),
            Address::new(0xDEAD_BEEF)
        );
        assert_eq!(Address::from_str("4096").unwrap(), Address::new(4096));
        assert!(Address::from_str("zz").is_err());
    }

    #[test]
    fn test_null_page_floor() {
        assert!(!Address::new(0).is_sane());
        assert!(!Address::new(0xFFFF).is_sane());
        assert!(Address::new(0x10000).is_sane());
    }

    #[test]
    fn test_address_offset() {
        let addr = Address::new(0x1000);
        assert_eq!(addr.offset(0x10), Address::new(0x1010));
        assert_eq!(addr.offset(-0x10), Address::new(0x0FF0));
    }

    #[test]
    fn test_offset_parsing() {
        assert_eq!(
            parse_offset("0xBEEF", OffsetFormat::Decimal).unwrap(),
            0xBEEF
        );
        assert_eq!(parse_offset("BEEF", OffsetFormat::Hex).unwrap(), 0xBEEF);
        assert_eq!(parse_offset("48", OffsetFormat::Decimal).unwrap(), 48);
        assert_eq!(parse_offset("48", OffsetFormat::Hex).unwrap(), 0x48);
        assert_eq!(parse_offset("-0x10", OffsetFormat::Hex).unwrap(), -16);
        assert!(parse_offset("", OffsetFormat::Hex).is_err());
        assert!(parse_offset("0x", OffsetFormat::Hex).is_err());
        assert!(parse_offset("12G4", OffsetFormat::Hex).is_err());
    }

    #[test]
    fn test_address_display() {
        assert_eq!(format!("{}", Address::new(0xDEAD_BEEF)), "0xDEADBEEF");
    }
}
