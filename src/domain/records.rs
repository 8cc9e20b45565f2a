//! Typed ledger records, in minor units, exactly as the ledger reports them.

use crate::domain::{BasisPointRate, CompanyId, EpochTimestamp, MinorUnitAmount};
use ethers::types::{Address, U256};

/// Pending valuation for a company, consumed when its asset is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyValuation {
    pub company_id: CompanyId,
    pub valuation: MinorUnitAmount,
    pub initial_price: MinorUnitAmount,
    pub evaluator: Address,
    pub assessed_at: EpochTimestamp,
    pub exists: bool,
}

/// Full state of one tokenized asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDetails {
    pub asset: Address,
    pub company_id: CompanyId,
    pub name: String,
    pub symbol: String,
    pub max_supply: MinorUnitAmount,
    pub current_supply: MinorUnitAmount,
    pub price_per_token: MinorUnitAmount,
    pub buy_fee_rate: BasisPointRate,
    pub sell_fee_rate: BasisPointRate,
    pub trading_active: bool,
    pub paused: bool,
    pub last_price_update: EpochTimestamp,
    pub collected_fees: MinorUnitAmount,
    pub total_volume: MinorUnitAmount,
    /// Company treasury that receives `companyWithdraw` payouts.
    pub company: Address,
}

impl AssetDetails {
    /// `current_supply × price_per_token`, in currency minor units.
    pub fn market_cap(&self) -> Option<MinorUnitAmount> {
        self.current_supply.value_at(&self.price_per_token).ok()
    }

    /// Shares that can still be minted before the supply cap.
    pub fn remaining_supply(&self) -> Option<MinorUnitAmount> {
        self.max_supply.checked_sub(&self.current_supply).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingStatus {
    pub trading_active: bool,
    pub paused: bool,
    pub valuation_set: bool,
}

/// Per-asset trading statistics.
///
/// `average_trade_size` and `price_volatility` are computed by the ledger and
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingStats {
    pub total_trades: U256,
    pub total_volume: MinorUnitAmount,
    pub average_trade_size: MinorUnitAmount,
    pub price_volatility: U256,
}

/// One user's position in one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserHolding {
    pub asset: Address,
    pub user: Address,
    pub balance: MinorUnitAmount,
    pub total_purchase_value: MinorUnitAmount,
    pub total_sale_value: MinorUnitAmount,
    pub total_fees_paid: MinorUnitAmount,
    pub total_tokens_purchased: MinorUnitAmount,
    pub total_tokens_sold: MinorUnitAmount,
    pub last_trade_at: EpochTimestamp,
    pub has_traded: bool,
}

/// Platform-wide aggregates reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSnapshot {
    pub total_assets: U256,
    pub total_active_assets: U256,
    pub total_market_cap: MinorUnitAmount,
    pub total_volume: MinorUnitAmount,
    pub total_tokens_in_circulation: MinorUnitAmount,
    pub total_fees_collected: MinorUnitAmount,
}

/// Decoded `AssetCreated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCreatedEvent {
    pub company_id: CompanyId,
    pub asset: Address,
    pub name: String,
    pub symbol: String,
    pub max_supply: U256,
}
