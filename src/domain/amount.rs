//! Minor-unit amounts tagged with their numeric domain.
//!
//! Ledger balances are unsigned 256-bit integers. Every amount carries the
//! domain it belongs to (settlement currency or share token) and the number of
//! decimals that domain uses, so that arithmetic across domains is rejected
//! instead of silently producing nonsense.

use crate::codec::{self, DisplayOptions};
use crate::domain::Ratio;
use ethers::types::{I256, U256, U512};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Numeric domain of a ledger amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NumericDomain {
    /// Settlement currency (USDC-like, 6 decimals by default).
    Currency,
    /// Tokenized equity shares (18 decimals by default).
    ShareToken,
}

impl fmt::Display for NumericDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericDomain::Currency => write!(f, "currency"),
            NumericDomain::ShareToken => write!(f, "share-token"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("cannot combine {left} amount with {right} amount")]
    DomainMismatch {
        left: NumericDomain,
        right: NumericDomain,
    },
    #[error("decimals mismatch: {left} vs {right}")]
    DecimalsMismatch { left: u8, right: u8 },
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
    #[error("division by zero")]
    DivisionByZero,
}

/// Computes `a * b / denominator` with a 512-bit intermediate.
///
/// Returns `None` when the denominator is zero or the quotient does not fit
/// into 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let product: U512 = a.full_mul(b);
    let quotient = product / U512::from(denominator);
    U256::try_from(quotient).ok()
}

/// `10^decimals` as a U256.
pub fn scale(decimals: u8) -> U256 {
    U256::exp10(decimals as usize)
}

/// A non-negative integer amount in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MinorUnitAmount {
    raw: U256,
    decimals: u8,
    domain: NumericDomain,
}

impl MinorUnitAmount {
    pub fn new(raw: U256, domain: NumericDomain, decimals: u8) -> Self {
        Self {
            raw,
            decimals,
            domain,
        }
    }

    pub fn zero(domain: NumericDomain, decimals: u8) -> Self {
        Self::new(U256::zero(), domain, decimals)
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn domain(&self) -> NumericDomain {
        self.domain
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    fn ensure_compatible(&self, other: &Self) -> Result<(), AmountError> {
        if self.domain != other.domain {
            return Err(AmountError::DomainMismatch {
                left: self.domain,
                right: other.domain,
            });
        }
        if self.decimals != other.decimals {
            return Err(AmountError::DecimalsMismatch {
                left: self.decimals,
                right: other.decimals,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, AmountError> {
        self.ensure_compatible(other)?;
        let raw = self.raw.checked_add(other.raw).ok_or(AmountError::Overflow)?;
        Ok(Self::new(raw, self.domain, self.decimals))
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, AmountError> {
        self.ensure_compatible(other)?;
        let raw = self.raw.checked_sub(other.raw).ok_or(AmountError::Underflow)?;
        Ok(Self::new(raw, self.domain, self.decimals))
    }

    /// Same-domain comparison. Returns an error if the domains differ.
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering, AmountError> {
        self.ensure_compatible(other)?;
        Ok(self.raw.cmp(&other.raw))
    }

    /// Dimensionless ratio `self / other` of two same-domain amounts.
    pub fn ratio(&self, other: &Self) -> Result<Ratio, AmountError> {
        self.ensure_compatible(other)?;
        Ratio::from_parts(self.raw, other.raw).ok_or(AmountError::DivisionByZero)
    }

    /// Value of a share-token amount at `price` (currency per whole token).
    ///
    /// `shares × price / 10^share_decimals`, in the price's currency units.
    pub fn value_at(&self, price: &Self) -> Result<Self, AmountError> {
        if self.domain != NumericDomain::ShareToken || price.domain != NumericDomain::Currency {
            return Err(AmountError::DomainMismatch {
                left: self.domain,
                right: price.domain,
            });
        }
        let raw = mul_div(self.raw, price.raw, scale(self.decimals)).ok_or(AmountError::Overflow)?;
        Ok(Self::new(raw, NumericDomain::Currency, price.decimals))
    }

    /// Scales a currency amount by a same-domain fraction `numerator / denominator`.
    pub fn mul_div(&self, numerator: U256, denominator: U256) -> Result<Self, AmountError> {
        if denominator.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let raw = mul_div(self.raw, numerator, denominator).ok_or(AmountError::Overflow)?;
        Ok(Self::new(raw, self.domain, self.decimals))
    }

    pub fn to_display(&self, opts: &DisplayOptions) -> String {
        codec::to_display(self.raw, self.decimals, opts)
    }
}

impl PartialOrd for MinorUnitAmount {
    /// Amounts from different domains are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.checked_cmp(other).ok()
    }
}

impl fmt::Display for MinorUnitAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display(&DisplayOptions::default()))
    }
}

impl Serialize for MinorUnitAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Derives an asset's maximum share supply from its valuation.
///
/// `valuation × 10^share_decimals / initial_price`. Both inputs are currency
/// amounts with the same decimals, so the currency scale cancels out.
pub fn derive_max_supply(
    valuation: &MinorUnitAmount,
    initial_price: &MinorUnitAmount,
    share_decimals: u8,
) -> Result<MinorUnitAmount, AmountError> {
    valuation.ensure_compatible(initial_price)?;
    if initial_price.is_zero() {
        return Err(AmountError::DivisionByZero);
    }
    let raw = mul_div(valuation.raw, scale(share_decimals), initial_price.raw)
        .ok_or(AmountError::Overflow)?;
    Ok(MinorUnitAmount::new(
        raw,
        NumericDomain::ShareToken,
        share_decimals,
    ))
}

/// A signed amount, used for profit and loss aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignedAmount {
    value: I256,
    decimals: u8,
    domain: NumericDomain,
}

impl SignedAmount {
    pub fn zero(domain: NumericDomain, decimals: u8) -> Self {
        Self {
            value: I256::zero(),
            decimals,
            domain,
        }
    }

    pub fn from_unsigned(amount: &MinorUnitAmount) -> Result<Self, AmountError> {
        let value = I256::try_from(amount.raw).map_err(|_| AmountError::Overflow)?;
        Ok(Self {
            value,
            decimals: amount.decimals,
            domain: amount.domain,
        })
    }

    /// `left − right`, which may be negative.
    pub fn difference(left: &MinorUnitAmount, right: &MinorUnitAmount) -> Result<Self, AmountError> {
        left.ensure_compatible(right)?;
        let l = Self::from_unsigned(left)?;
        let r = Self::from_unsigned(right)?;
        l.checked_sub(&r)
    }

    pub fn value(&self) -> I256 {
        self.value
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn domain(&self) -> NumericDomain {
        self.domain
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_negative()
    }

    fn ensure_compatible(&self, other: &Self) -> Result<(), AmountError> {
        if self.domain != other.domain {
            return Err(AmountError::DomainMismatch {
                left: self.domain,
                right: other.domain,
            });
        }
        if self.decimals != other.decimals {
            return Err(AmountError::DecimalsMismatch {
                left: self.decimals,
                right: other.decimals,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, AmountError> {
        self.ensure_compatible(other)?;
        let value = self
            .value
            .checked_add(other.value)
            .ok_or(AmountError::Overflow)?;
        Ok(Self { value, ..*self })
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, AmountError> {
        self.ensure_compatible(other)?;
        let value = self
            .value
            .checked_sub(other.value)
            .ok_or(AmountError::Overflow)?;
        Ok(Self { value, ..*self })
    }

    pub fn to_display(&self, opts: &DisplayOptions) -> String {
        codec::format_signed(self.value, self.decimals, opts)
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display(&DisplayOptions::default()))
    }
}

impl Serialize for SignedAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc(raw: u64) -> MinorUnitAmount {
        MinorUnitAmount::new(U256::from(raw), NumericDomain::Currency, 6)
    }

    fn shares(raw: U256) -> MinorUnitAmount {
        MinorUnitAmount::new(raw, NumericDomain::ShareToken, 18)
    }

    #[test]
    fn test_max_supply_derivation() {
        let valuation = usdc(1_000_000);
        let price = usdc(10);
        let max_supply = derive_max_supply(&valuation, &price, 18).unwrap();
        assert_eq!(max_supply.raw(), U256::from(100_000u64) * U256::exp10(18));
        assert_eq!(max_supply.domain(), NumericDomain::ShareToken);
        assert_eq!(max_supply.to_string(), "100000");
    }

    #[test]
    fn test_max_supply_zero_price() {
        let err = derive_max_supply(&usdc(1), &usdc(0), 18).unwrap_err();
        assert_eq!(err, AmountError::DivisionByZero);
    }

    #[test]
    fn test_max_supply_uses_wide_intermediate() {
        // valuation * 10^18 overflows 256 bits but the quotient does not.
        let valuation = MinorUnitAmount::new(U256::MAX / 2, NumericDomain::Currency, 6);
        let price = MinorUnitAmount::new(U256::exp10(18), NumericDomain::Currency, 6);
        let max_supply = derive_max_supply(&valuation, &price, 18).unwrap();
        assert_eq!(max_supply.raw(), U256::MAX / 2);
    }

    #[test]
    fn test_cross_domain_add_rejected() {
        let err = usdc(1).checked_add(&shares(U256::one())).unwrap_err();
        assert!(matches!(err, AmountError::DomainMismatch { .. }));
        assert!(usdc(1).partial_cmp(&shares(U256::one())).is_none());
    }

    #[test]
    fn test_same_domain_ordering() {
        assert!(usdc(1) < usdc(2));
        assert_eq!(usdc(5).checked_sub(&usdc(2)).unwrap(), usdc(3));
        assert_eq!(usdc(1).checked_sub(&usdc(2)), Err(AmountError::Underflow));
    }

    #[test]
    fn test_value_at_price() {
        // 2.5 shares at 4.00 per share = 10.00
        let held = shares(U256::from(25u64) * U256::exp10(17));
        let price = usdc(4_000_000);
        assert_eq!(held.value_at(&price).unwrap(), usdc(10_000_000));
        assert!(price.value_at(&held).is_err());
    }

    #[test]
    fn test_signed_difference_can_be_negative() {
        let pnl = SignedAmount::difference(&usdc(1_500_000), &usdc(2_000_000)).unwrap();
        assert!(pnl.is_negative());
        assert_eq!(pnl.to_string(), "-0.5");
    }

    #[test]
    fn test_serializes_as_display_string() {
        let json = serde_json::to_value(usdc(1_250_000)).unwrap();
        assert_eq!(json, serde_json::json!("1.25"));
    }
}
