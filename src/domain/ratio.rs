//! Dimensionless ratios derived from two same-domain amounts.
//!
//! Stored as an integer scaled by `10^18` so the value stays exact and
//! floating-point free; converts to `rust_decimal` for consumers that want
//! arithmetic on the result.

use crate::codec::{self, DisplayOptions};
use crate::domain::amount::{mul_div, scale};
use ethers::types::U256;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// Fractional digits kept by every ratio.
pub const RATIO_PRECISION: u8 = 18;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ratio {
    scaled: U256,
}

impl Ratio {
    /// `numerator / denominator`, floored at 18 fractional digits.
    ///
    /// Returns `None` when the denominator is zero or the ratio is too large to
    /// represent.
    pub fn from_parts(numerator: U256, denominator: U256) -> Option<Self> {
        mul_div(numerator, scale(RATIO_PRECISION), denominator).map(|scaled| Ratio { scaled })
    }

    pub fn zero() -> Self {
        Ratio::default()
    }

    pub fn is_zero(&self) -> bool {
        self.scaled.is_zero()
    }

    /// The underlying value scaled by `10^18`.
    pub fn scaled(&self) -> U256 {
        self.scaled
    }

    pub fn checked_add(&self, other: &Ratio) -> Option<Ratio> {
        self.scaled
            .checked_add(other.scaled)
            .map(|scaled| Ratio { scaled })
    }

    /// Convert to a `rust_decimal::Decimal`.
    ///
    /// Returns `None` if the value exceeds the 96-bit mantissa.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let as_u128 = u128::try_from(self.scaled).ok()?;
        let as_i128 = i128::try_from(as_u128).ok()?;
        Decimal::try_from_i128_with_scale(as_i128, RATIO_PRECISION as u32)
            .ok()
            .map(|d| d.normalize())
    }

    /// `self × 100` as a decimal, e.g. `30` for a ratio of `0.3`.
    pub fn to_percent(&self) -> Option<Decimal> {
        self.to_decimal()?
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|d| d.normalize())
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            codec::to_display(self.scaled, RATIO_PRECISION, &DisplayOptions::default())
        )
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ratio_exact_fraction() {
        let r = Ratio::from_parts(U256::from(300u64), U256::from(1000u64)).unwrap();
        assert_eq!(r.to_string(), "0.3");
        assert_eq!(r.to_decimal().unwrap(), Decimal::from_str("0.30").unwrap());
        assert_eq!(r.to_percent().unwrap(), Decimal::from(30));
    }

    #[test]
    fn test_percent_keeps_every_digit() {
        let r = Ratio::from_parts(U256::one(), U256::from(3u64)).unwrap();
        assert_eq!(
            r.to_percent().unwrap(),
            Decimal::from_str("33.3333333333333333").unwrap()
        );
        assert_eq!(Ratio::from_parts(U256::one(), U256::one()).unwrap().to_percent().unwrap(), Decimal::from(100));
    }

    #[test]
    fn test_ratio_zero_denominator() {
        assert!(Ratio::from_parts(U256::one(), U256::zero()).is_none());
    }

    #[test]
    fn test_ratio_floor_rounding() {
        let r = Ratio::from_parts(U256::one(), U256::from(3u64)).unwrap();
        assert_eq!(r.to_string(), "0.333333333333333333");
    }

    #[test]
    fn test_ratio_sum() {
        let a = Ratio::from_parts(U256::from(300u64), U256::from(1000u64)).unwrap();
        let b = Ratio::from_parts(U256::from(700u64), U256::from(1000u64)).unwrap();
        assert_eq!(
            a.checked_add(&b).unwrap(),
            Ratio::from_parts(U256::one(), U256::one()).unwrap()
        );
    }

    #[test]
    fn test_ratio_ordering() {
        let a = Ratio::from_parts(U256::from(1u64), U256::from(4u64)).unwrap();
        let b = Ratio::from_parts(U256::from(1u64), U256::from(2u64)).unwrap();
        assert!(a < b);
        assert!(Ratio::zero().is_zero());
    }
}
