//! Domain primitives: identifiers, rates and timestamps.

use crate::codec;
use ethers::types::{Address, U256};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("empty identifier")]
    Empty,
    #[error("not a 0x-prefixed 20-byte hex address: {0}")]
    MalformedAddress(String),
    #[error("not a decimal company id: {0}")]
    MalformedCompanyId(String),
}

/// Parse a ledger address strictly: `0x` followed by exactly 40 hex digits.
pub fn parse_address(input: &str) -> Result<Address, IdentifierError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::Empty);
    }
    let Some(hex_part) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    else {
        return Err(IdentifierError::MalformedAddress(trimmed.to_string()));
    };
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IdentifierError::MalformedAddress(trimmed.to_string()));
    }
    let bytes = hex::decode(hex_part)
        .map_err(|_| IdentifierError::MalformedAddress(trimmed.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Full lowercase `0x…` form of an address.
pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Company identity as registered on the ledger (a uint256).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompanyId(pub U256);

impl CompanyId {
    pub fn new(id: U256) -> Self {
        CompanyId(id)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl FromStr for CompanyId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdentifierError::MalformedCompanyId(trimmed.to_string()));
        }
        U256::from_dec_str(trimmed)
            .map(CompanyId)
            .map_err(|_| IdentifierError::MalformedCompanyId(trimmed.to_string()))
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CompanyId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("basis-point rate {value} exceeds ceiling {ceiling}")]
pub struct RateError {
    pub value: u64,
    pub ceiling: u64,
}

/// A rate in basis points (1/10000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BasisPointRate(u16);

impl BasisPointRate {
    pub const MAX: u16 = 10_000;
    pub const ZERO: BasisPointRate = BasisPointRate(0);

    pub fn new(bps: u64) -> Result<Self, RateError> {
        Self::with_ceiling(bps, Self::MAX)
    }

    /// Builds a rate that must not exceed `ceiling` basis points.
    pub fn with_ceiling(bps: u64, ceiling: u16) -> Result<Self, RateError> {
        let ceiling = ceiling.min(Self::MAX);
        if bps > ceiling as u64 {
            return Err(RateError {
                value: bps,
                ceiling: ceiling as u64,
            });
        }
        Ok(BasisPointRate(bps as u16))
    }

    pub fn bps(&self) -> u16 {
        self.0
    }

    pub fn as_u256(&self) -> U256 {
        U256::from(self.0)
    }
}

impl fmt::Display for BasisPointRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", codec::format_bps(u128::from(self.0)))
    }
}

/// Seconds since Unix epoch. Zero means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EpochTimestamp(pub u64);

impl EpochTimestamp {
    pub fn new(seconds: u64) -> Self {
        EpochTimestamp(seconds)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    pub fn now() -> Self {
        EpochTimestamp(chrono::Utc::now().timestamp().max(0) as u64)
    }
}

impl fmt::Display for EpochTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", codec::format_timestamp(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_valid() {
        let addr = parse_address("0x00000000000000000000000000000000000000aB").unwrap();
        assert_eq!(
            address_hex(&addr),
            "0x00000000000000000000000000000000000000ab"
        );
    }

    #[test]
    fn test_parse_address_rejects_malformed() {
        assert_eq!(parse_address("  "), Err(IdentifierError::Empty));
        assert!(parse_address("0x123").is_err());
        assert!(parse_address("00000000000000000000000000000000000000ab").is_err());
        assert!(parse_address("0xZZ000000000000000000000000000000000000ab").is_err());
        assert!(parse_address("0x00000000000000000000000000000000000000abcd").is_err());
    }

    #[test]
    fn test_company_id_parse() {
        assert_eq!(
            "42".parse::<CompanyId>().unwrap(),
            CompanyId::new(U256::from(42u64))
        );
        assert!("-1".parse::<CompanyId>().is_err());
        assert!("0x10".parse::<CompanyId>().is_err());
        assert!("".parse::<CompanyId>().is_err());
    }

    #[test]
    fn test_rate_ceiling() {
        assert!(BasisPointRate::with_ceiling(5000, 5000).is_ok());
        let err = BasisPointRate::with_ceiling(5001, 5000).unwrap_err();
        assert_eq!(err.ceiling, 5000);
        assert!(BasisPointRate::new(10_001).is_err());
        assert_eq!(BasisPointRate::new(250).unwrap().to_string(), "2.50%");
    }

    #[test]
    fn test_timestamp_unset_display() {
        assert!(EpochTimestamp::default().is_unset());
        assert_eq!(EpochTimestamp::new(0).to_string(), "N/A");
    }
}
