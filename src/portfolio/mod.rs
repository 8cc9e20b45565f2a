//! Portfolio and platform aggregates over batch ledger reads.

use crate::config::NumericConfig;
use crate::domain::{
    parse_address, AssetDetails, MinorUnitAmount, NumericDomain, PlatformSnapshot, Ratio,
    SignedAmount, UserHolding,
};
use crate::error::DomainError;
use crate::gateway::{LedgerQueryGateway, PlatformSnapshotView};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// One position of a user portfolio, valued at the asset's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionValuation {
    pub asset: Address,
    pub symbol: String,
    pub balance: MinorUnitAmount,
    pub price_per_token: MinorUnitAmount,
    pub value: MinorUnitAmount,
    /// Purchase cost attributed to the shares still held.
    pub cost_basis: MinorUnitAmount,
    /// Floored at 18 fractional digits, so the shares of a portfolio can sum
    /// to slightly less than one.
    pub ownership_share: Ratio,
    /// `ownership_share` in percent.
    pub ownership_percent: Decimal,
    pub realized_pnl: SignedAmount,
    pub unrealized_pnl: SignedAmount,
    pub fees_paid: MinorUnitAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub user: Address,
    pub positions: Vec<PositionValuation>,
    pub total_value: MinorUnitAmount,
    pub total_realized_pnl: SignedAmount,
    pub total_unrealized_pnl: SignedAmount,
    pub total_fees_paid: MinorUnitAmount,
    pub platform: PlatformSnapshotView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMarketCap {
    pub asset: Address,
    pub symbol: String,
    pub market_cap: MinorUnitAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAnalytics {
    #[serde(serialize_with = "decimal_string")]
    pub total_assets: U256,
    #[serde(serialize_with = "decimal_string")]
    pub total_active_assets: U256,
    /// Sum of `currentSupply × price` over the listed assets.
    pub total_market_cap: MinorUnitAmount,
    pub average_asset_market_cap: MinorUnitAmount,
    pub asset_market_caps: Vec<AssetMarketCap>,
}

fn decimal_string<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Combines snapshot, asset and holding reads into valuations.
#[derive(Debug, Clone)]
pub struct PortfolioAggregator {
    query: LedgerQueryGateway,
    numeric: NumericConfig,
}

struct Position {
    value: MinorUnitAmount,
    cost_basis: MinorUnitAmount,
    realized: SignedAmount,
    unrealized: SignedAmount,
}

impl PortfolioAggregator {
    pub fn new(query: LedgerQueryGateway) -> Self {
        let numeric = *query.numeric();
        Self { query, numeric }
    }

    fn currency_zero(&self) -> MinorUnitAmount {
        MinorUnitAmount::zero(NumericDomain::Currency, self.numeric.currency_decimals)
    }

    fn signed_zero(&self) -> SignedAmount {
        SignedAmount::zero(NumericDomain::Currency, self.numeric.currency_decimals)
    }

    /// Values one holding with a proportional cost basis.
    fn value_position(details: &AssetDetails, holding: &UserHolding) -> Result<Position, DomainError> {
        let value = holding.balance.value_at(&details.price_per_token)?;
        let purchased = holding.total_tokens_purchased.raw();
        let (cost_basis, cost_of_sold) = if purchased.is_zero() {
            let zero = holding.total_purchase_value.mul_div(U256::zero(), U256::one())?;
            (zero, zero)
        } else {
            (
                holding
                    .total_purchase_value
                    .mul_div(holding.balance.raw(), purchased)?,
                holding
                    .total_purchase_value
                    .mul_div(holding.total_tokens_sold.raw(), purchased)?,
            )
        };
        let realized = SignedAmount::difference(&holding.total_sale_value, &cost_of_sold)?;
        let unrealized = SignedAmount::difference(&value, &cost_basis)?;
        Ok(Position {
            value,
            cost_basis,
            realized,
            unrealized,
        })
    }

    /// Aggregates a user's holdings against the matching asset details.
    ///
    /// Each holding must have its asset among `assets`. Ownership shares are
    /// relative to the total portfolio value, rounded down, and are all zero
    /// when that total is zero. No remainder is redistributed.
    pub fn aggregate(
        &self,
        snapshot: &PlatformSnapshot,
        assets: &[AssetDetails],
        holdings: &[UserHolding],
        user: Address,
    ) -> Result<PortfolioView, DomainError> {
        let by_asset: HashMap<Address, &AssetDetails> =
            assets.iter().map(|d| (d.asset, d)).collect();

        let mut valued = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let details = by_asset.get(&holding.asset).ok_or_else(|| {
                DomainError::query_failed(format!("no details for held asset {:?}", holding.asset))
            })?;
            valued.push((*details, holding, Self::value_position(details, holding)?));
        }

        let mut total_value = self.currency_zero();
        let mut total_realized = self.signed_zero();
        let mut total_unrealized = self.signed_zero();
        let mut total_fees = self.currency_zero();
        for (_, holding, position) in &valued {
            total_value = total_value.checked_add(&position.value)?;
            total_realized = total_realized.checked_add(&position.realized)?;
            total_unrealized = total_unrealized.checked_add(&position.unrealized)?;
            total_fees = total_fees.checked_add(&holding.total_fees_paid)?;
        }

        let mut positions = Vec::with_capacity(valued.len());
        for (details, holding, position) in valued {
            let ownership_share = if total_value.is_zero() {
                Ratio::zero()
            } else {
                position.value.ratio(&total_value)?
            };
            let ownership_percent = ownership_share.to_percent().ok_or_else(|| {
                DomainError::OutOfRange(format!("ownership share {} out of range", ownership_share))
            })?;
            positions.push(PositionValuation {
                asset: details.asset,
                symbol: details.symbol.clone(),
                balance: holding.balance,
                price_per_token: details.price_per_token,
                value: position.value,
                cost_basis: position.cost_basis,
                ownership_share,
                ownership_percent,
                realized_pnl: position.realized,
                unrealized_pnl: position.unrealized,
                fees_paid: holding.total_fees_paid,
            });
        }

        Ok(PortfolioView {
            user,
            positions,
            total_value,
            total_realized_pnl: total_realized,
            total_unrealized_pnl: total_unrealized,
            total_fees_paid: total_fees,
            platform: PlatformSnapshotView::from(snapshot),
        })
    }

    /// Market capitalisation per asset and across the platform.
    pub fn platform_analytics(
        &self,
        snapshot: &PlatformSnapshot,
        assets: &[AssetDetails],
    ) -> Result<PlatformAnalytics, DomainError> {
        let mut total = self.currency_zero();
        let mut caps = Vec::with_capacity(assets.len());
        for details in assets {
            let market_cap = details.current_supply.value_at(&details.price_per_token)?;
            total = total.checked_add(&market_cap)?;
            caps.push(AssetMarketCap {
                asset: details.asset,
                symbol: details.symbol.clone(),
                market_cap,
            });
        }
        let average = if snapshot.total_active_assets.is_zero() {
            self.currency_zero()
        } else {
            total.mul_div(U256::one(), snapshot.total_active_assets)?
        };
        Ok(PlatformAnalytics {
            total_assets: snapshot.total_assets,
            total_active_assets: snapshot.total_active_assets,
            total_market_cap: total,
            average_asset_market_cap: average,
            asset_market_caps: caps,
        })
    }

    /// Fetches snapshot, details and holdings concurrently and aggregates them.
    pub async fn portfolio_for<S: AsRef<str>>(
        &self,
        user_id: &str,
        asset_ids: &[S],
    ) -> Result<PortfolioView, DomainError> {
        let user = parse_address(user_id)?;
        if asset_ids.is_empty() {
            return Err(DomainError::InvalidIdentifier(
                "asset list must not be empty".to_string(),
            ));
        }
        let assets = asset_ids
            .iter()
            .map(|id| parse_address(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.portfolio_of(user, &assets).await
    }

    /// Portfolio over every asset registered on the platform.
    pub async fn portfolio_for_all(&self, user_id: &str) -> Result<PortfolioView, DomainError> {
        let user = parse_address(user_id)?;
        let assets = self.query.all_assets().await?;
        self.portfolio_of(user, &assets).await
    }

    async fn portfolio_of(
        &self,
        user: Address,
        assets: &[Address],
    ) -> Result<PortfolioView, DomainError> {
        let (snapshot, details, holdings) = futures::try_join!(
            self.query.platform_snapshot(),
            self.query.fetch_batch_asset_details(assets),
            self.query.fetch_batch_user_holdings(assets, user),
        )?;
        debug!(user = ?user, assets = assets.len(), "aggregating portfolio");
        self.aggregate(&snapshot, &details, &holdings, user)
    }

    /// Fetches the snapshot and every asset's details and computes analytics.
    pub async fn platform(&self) -> Result<(PlatformSnapshot, PlatformAnalytics), DomainError> {
        let assets = self.query.all_assets().await?;
        let (snapshot, details) = futures::try_join!(
            self.query.platform_snapshot(),
            self.query.fetch_batch_asset_details(&assets),
        )?;
        let analytics = self.platform_analytics(&snapshot, &details)?;
        Ok((snapshot, analytics))
    }
}
