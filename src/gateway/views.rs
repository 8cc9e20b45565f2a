//! Display forms of ledger records.
//!
//! Every minor-unit field is rendered through the fixed-point codec with the
//! decimals of its own domain, every rate as a percentage and every timestamp
//! in UTC.

use crate::domain::{
    address_hex, AssetDetails, CompanyValuation, PlatformSnapshot, TradingStats, TradingStatus,
    UserHolding,
};
use crate::gateway::TransactionOutcome;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyValuationView {
    pub company_id: String,
    pub valuation: String,
    pub initial_price: String,
    pub evaluator: String,
    pub assessed_at: String,
    pub exists: bool,
}

impl From<&CompanyValuation> for CompanyValuationView {
    fn from(v: &CompanyValuation) -> Self {
        Self {
            company_id: v.company_id.to_string(),
            valuation: v.valuation.to_string(),
            initial_price: v.initial_price.to_string(),
            evaluator: address_hex(&v.evaluator),
            assessed_at: v.assessed_at.to_string(),
            exists: v.exists,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetailsView {
    pub asset: String,
    pub company_id: String,
    pub name: String,
    pub symbol: String,
    pub max_supply: String,
    pub current_supply: String,
    pub remaining_supply: Option<String>,
    pub price_per_token: String,
    pub market_cap: Option<String>,
    pub buy_fee_rate: String,
    pub sell_fee_rate: String,
    pub trading_active: bool,
    pub paused: bool,
    pub last_price_update: String,
    pub collected_fees: String,
    pub total_volume: String,
    pub company: String,
}

impl From<&AssetDetails> for AssetDetailsView {
    fn from(d: &AssetDetails) -> Self {
        Self {
            asset: address_hex(&d.asset),
            company_id: d.company_id.to_string(),
            name: d.name.clone(),
            symbol: d.symbol.clone(),
            max_supply: d.max_supply.to_string(),
            current_supply: d.current_supply.to_string(),
            remaining_supply: d.remaining_supply().map(|s| s.to_string()),
            price_per_token: d.price_per_token.to_string(),
            market_cap: d.market_cap().map(|c| c.to_string()),
            buy_fee_rate: d.buy_fee_rate.to_string(),
            sell_fee_rate: d.sell_fee_rate.to_string(),
            trading_active: d.trading_active,
            paused: d.paused,
            last_price_update: d.last_price_update.to_string(),
            collected_fees: d.collected_fees.to_string(),
            total_volume: d.total_volume.to_string(),
            company: address_hex(&d.company),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatusView {
    pub trading_active: bool,
    pub paused: bool,
    pub valuation_set: bool,
}

impl From<&TradingStatus> for TradingStatusView {
    fn from(s: &TradingStatus) -> Self {
        Self {
            trading_active: s.trading_active,
            paused: s.paused,
            valuation_set: s.valuation_set,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStatsView {
    pub total_trades: String,
    pub total_volume: String,
    pub average_trade_size: String,
    /// Reported by the ledger as-is.
    pub price_volatility: String,
}

impl From<&TradingStats> for TradingStatsView {
    fn from(s: &TradingStats) -> Self {
        Self {
            total_trades: s.total_trades.to_string(),
            total_volume: s.total_volume.to_string(),
            average_trade_size: s.average_trade_size.to_string(),
            price_volatility: s.price_volatility.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHoldingView {
    pub asset: String,
    pub user: String,
    pub balance: String,
    pub total_purchase_value: String,
    pub total_sale_value: String,
    pub total_fees_paid: String,
    pub total_tokens_purchased: String,
    pub total_tokens_sold: String,
    pub last_trade_at: String,
    pub has_traded: bool,
}

impl From<&UserHolding> for UserHoldingView {
    fn from(h: &UserHolding) -> Self {
        Self {
            asset: address_hex(&h.asset),
            user: address_hex(&h.user),
            balance: h.balance.to_string(),
            total_purchase_value: h.total_purchase_value.to_string(),
            total_sale_value: h.total_sale_value.to_string(),
            total_fees_paid: h.total_fees_paid.to_string(),
            total_tokens_purchased: h.total_tokens_purchased.to_string(),
            total_tokens_sold: h.total_tokens_sold.to_string(),
            last_trade_at: h.last_trade_at.to_string(),
            has_traded: h.has_traded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSnapshotView {
    pub total_assets: String,
    pub total_active_assets: String,
    pub total_market_cap: String,
    pub total_volume: String,
    pub total_tokens_in_circulation: String,
    pub total_fees_collected: String,
}

impl From<&PlatformSnapshot> for PlatformSnapshotView {
    fn from(s: &PlatformSnapshot) -> Self {
        Self {
            total_assets: s.total_assets.to_string(),
            total_active_assets: s.total_active_assets.to_string(),
            total_market_cap: s.total_market_cap.to_string(),
            total_volume: s.total_volume.to_string(),
            total_tokens_in_circulation: s.total_tokens_in_circulation.to_string(),
            total_fees_collected: s.total_fees_collected.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCreatedView {
    pub company_id: String,
    pub asset: String,
    pub name: String,
    pub symbol: String,
    pub max_supply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcomeView {
    pub operation: &'static str,
    pub target: String,
    pub tx_hash: String,
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_created: Option<AssetCreatedView>,
    pub derived_identifier_unavailable: bool,
}

impl TransactionOutcomeView {
    /// `share_decimals` renders the event's max supply.
    pub fn new(outcome: &TransactionOutcome, share_decimals: u8) -> Self {
        Self {
            operation: outcome.operation.as_str(),
            target: address_hex(&outcome.target),
            tx_hash: format!("0x{}", hex::encode(outcome.tx_hash.as_bytes())),
            block_number: outcome.block_number,
            asset_created: outcome.asset_created.as_ref().map(|e| AssetCreatedView {
                company_id: e.company_id.to_string(),
                asset: address_hex(&e.asset),
                name: e.name.clone(),
                symbol: e.symbol.clone(),
                max_supply: crate::codec::to_display(
                    e.max_supply,
                    share_decimals,
                    &Default::default(),
                ),
            }),
            derived_identifier_unavailable: outcome.derived_identifier_unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NumericConfig;
    use crate::domain::{BasisPointRate, CompanyId, EpochTimestamp};
    use ethers::types::{Address, U256};

    fn details() -> AssetDetails {
        let n = NumericConfig::default();
        AssetDetails {
            asset: Address::from_low_u64_be(0xa55e7001),
            company_id: CompanyId::new(U256::from(7u64)),
            name: "Acme".into(),
            symbol: "ACM".into(),
            max_supply: n.shares(U256::from(100_000u64) * U256::exp10(18)),
            current_supply: n.shares(U256::from(250u64) * U256::exp10(17)),
            price_per_token: n.currency(U256::from(10_500_000u64)),
            buy_fee_rate: BasisPointRate::new(250).unwrap(),
            sell_fee_rate: BasisPointRate::new(100).unwrap(),
            trading_active: true,
            paused: false,
            last_price_update: EpochTimestamp::new(1_700_000_000),
            collected_fees: n.currency(U256::zero()),
            total_volume: n.currency(U256::from(1_000_000u64)),
            company: Address::from_low_u64_be(0x0e),
        }
    }

    #[test]
    fn test_asset_view_renders_each_domain_with_its_decimals() {
        let view = AssetDetailsView::from(&details());
        assert_eq!(view.max_supply, "100000");
        assert_eq!(view.current_supply, "25");
        assert_eq!(view.price_per_token, "10.5");
        assert_eq!(view.market_cap.as_deref(), Some("262.5"));
        assert_eq!(view.buy_fee_rate, "2.50%");
        assert_eq!(view.sell_fee_rate, "1.00%");
        assert_eq!(view.collected_fees, "0");
        assert_eq!(view.last_price_update, "2023-11-14 22:13:20 UTC");
        assert_eq!(view.asset, "0x00000000000000000000000000000000a55e7001");
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let json = serde_json::to_value(AssetDetailsView::from(&details())).unwrap();
        assert_eq!(json["pricePerToken"], "10.5");
        assert_eq!(json["tradingActive"], true);
    }
}
