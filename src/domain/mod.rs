//! Domain types for the tokenized equity ledger.
//!
//! This module provides:
//! - Minor-unit amounts tagged with their numeric domain
//! - Exact dimensionless ratios
//! - Identifiers, basis-point rates and epoch timestamps
//! - Typed ledger records (valuations, assets, holdings, platform snapshot)

pub mod amount;
pub mod primitives;
pub mod ratio;
pub mod records;

pub use amount::{derive_max_supply, AmountError, MinorUnitAmount, NumericDomain, SignedAmount};
pub use primitives::{
    address_hex, parse_address, BasisPointRate, CompanyId, EpochTimestamp, IdentifierError,
    RateError,
};
pub use ratio::Ratio;
pub use records::{
    AssetCreatedEvent, AssetDetails, CompanyValuation, PlatformSnapshot, TradingStats,
    TradingStatus, UserHolding,
};
