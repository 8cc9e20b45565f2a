//! Read-only ledger gateway.

use crate::config::NumericConfig;
use crate::domain::{
    address_hex, parse_address, AssetDetails, CompanyId, CompanyValuation, PlatformSnapshot,
    TradingStats, TradingStatus, UserHolding,
};
use crate::error::DomainError;
use crate::gateway::views::{
    AssetDetailsView, CompanyValuationView, PlatformSnapshotView, TradingStatsView,
    TradingStatusView, UserHoldingView,
};
use crate::ledger::abi::{self, AssetCall, RegistryCall};
use crate::ledger::{classify_revert, LedgerClient, LedgerError, RevertReason};
use ethers::types::{Address, Bytes};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read access to the Registry and Asset contracts.
///
/// String identifiers are validated before any I/O; a malformed identifier
/// fails with `InvalidIdentifier` and the ledger is never contacted. All
/// failures past validation surface as `QueryFailed`. Nothing is retried.
#[derive(Debug, Clone)]
pub struct LedgerQueryGateway {
    client: Arc<dyn LedgerClient>,
    registry: Address,
    numeric: NumericConfig,
}

fn describe(err: &LedgerError) -> String {
    match err {
        LedgerError::Reverted { data, .. } => match classify_revert(data) {
            RevertReason::Unknown => err.to_string(),
            reason => format!("call reverted with {:?}", reason),
        },
        other => other.to_string(),
    }
}

fn parse_company_id(raw: &str) -> Result<CompanyId, DomainError> {
    Ok(raw.parse::<CompanyId>()?)
}

fn parse_id_list<S: AsRef<str>>(ids: &[S]) -> Result<Vec<Address>, DomainError> {
    if ids.is_empty() {
        return Err(DomainError::InvalidIdentifier(
            "asset list must not be empty".to_string(),
        ));
    }
    ids.iter()
        .map(|id| parse_address(id.as_ref()).map_err(DomainError::from))
        .collect()
}

impl LedgerQueryGateway {
    pub fn new(client: Arc<dyn LedgerClient>, registry: Address, numeric: NumericConfig) -> Self {
        Self {
            client,
            registry,
            numeric,
        }
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn numeric(&self) -> &NumericConfig {
        &self.numeric
    }

    async fn call(&self, to: Address, data: Bytes, what: &str) -> Result<Bytes, DomainError> {
        debug!(to = %address_hex(&to), call = what, "ledger read");
        self.client.call(to, data).await.map_err(|e| {
            warn!(to = %address_hex(&to), call = what, error = %e, "ledger read failed");
            DomainError::query_failed(format!("{}: {}", what, describe(&e)))
        })
    }

    async fn call_registry(&self, call: RegistryCall) -> Result<Bytes, DomainError> {
        let what = call.signature();
        self.call(self.registry, call.encode(), what).await
    }

    async fn call_asset(&self, asset: Address, call: AssetCall) -> Result<Bytes, DomainError> {
        let what = call.signature();
        self.call(asset, call.encode(), what).await
    }

    fn decode_failed(what: &str, err: abi::AbiDecodeError) -> DomainError {
        DomainError::query_failed(format!("{}: {}", what, err))
    }

    // =========================================================================
    // Registry reads
    // =========================================================================

    /// Address of the asset implementation the Registry clones.
    pub async fn implementation(&self) -> Result<Address, DomainError> {
        let raw = self.call_registry(RegistryCall::AssetImplementation).await?;
        abi::decode_address(&raw).map_err(|e| Self::decode_failed("assetImplementation", e))
    }

    /// Settlement token accepted for buys and paid out on sells.
    pub async fn settlement_token(&self) -> Result<Address, DomainError> {
        let raw = self.call_registry(RegistryCall::UsdcToken).await?;
        abi::decode_address(&raw).map_err(|e| Self::decode_failed("usdcToken", e))
    }

    pub async fn company_valuation(&self, company_id: &str) -> Result<CompanyValuation, DomainError> {
        let id = parse_company_id(company_id)?;
        self.fetch_company_valuation(id).await
    }

    pub async fn fetch_company_valuation(
        &self,
        company_id: CompanyId,
    ) -> Result<CompanyValuation, DomainError> {
        let raw = self
            .call_registry(RegistryCall::GetCompanyValuation {
                company_id: company_id.as_u256(),
            })
            .await?;
        abi::decode_company_valuation(&raw, &self.numeric)
            .map_err(|e| Self::decode_failed("getCompanyValuation", e))
    }

    /// Asset created for a company; `None` while the company has no asset.
    pub async fn asset_for_company(&self, company_id: &str) -> Result<Option<Address>, DomainError> {
        let id = parse_company_id(company_id)?;
        self.fetch_asset_for_company(id).await
    }

    pub async fn fetch_asset_for_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<Address>, DomainError> {
        let raw = self
            .call_registry(RegistryCall::GetAssetByCompany {
                company_id: company_id.as_u256(),
            })
            .await?;
        let asset =
            abi::decode_address(&raw).map_err(|e| Self::decode_failed("getAssetByCompany", e))?;
        Ok((!asset.is_zero()).then_some(asset))
    }

    pub async fn all_assets(&self) -> Result<Vec<Address>, DomainError> {
        let raw = self.call_registry(RegistryCall::GetAllAssets).await?;
        abi::decode_address_list(&raw).map_err(|e| Self::decode_failed("getAllAssets", e))
    }

    pub async fn platform_snapshot(&self) -> Result<PlatformSnapshot, DomainError> {
        let raw = self.call_registry(RegistryCall::GetPlatformStats).await?;
        abi::decode_platform_stats(&raw, &self.numeric)
            .map_err(|e| Self::decode_failed("getPlatformStats", e))
    }

    // =========================================================================
    // Asset reads
    // =========================================================================

    pub async fn asset_details(&self, asset_id: &str) -> Result<AssetDetails, DomainError> {
        let asset = parse_address(asset_id)?;
        self.fetch_asset_details(asset).await
    }

    pub async fn fetch_asset_details(&self, asset: Address) -> Result<AssetDetails, DomainError> {
        let raw = self.call_asset(asset, AssetCall::GetAssetDetails).await?;
        abi::decode_asset_details(&raw, &self.numeric)
            .map_err(|e| Self::decode_failed("getAssetDetails", e))
    }

    pub async fn trading_status(&self, asset_id: &str) -> Result<TradingStatus, DomainError> {
        let asset = parse_address(asset_id)?;
        self.fetch_trading_status(asset).await
    }

    pub async fn fetch_trading_status(&self, asset: Address) -> Result<TradingStatus, DomainError> {
        let raw = self.call_asset(asset, AssetCall::GetTradingStatus).await?;
        abi::decode_trading_status(&raw).map_err(|e| Self::decode_failed("getTradingStatus", e))
    }

    pub async fn trading_stats(&self, asset_id: &str) -> Result<TradingStats, DomainError> {
        let asset = parse_address(asset_id)?;
        self.fetch_trading_stats(asset).await
    }

    pub async fn fetch_trading_stats(&self, asset: Address) -> Result<TradingStats, DomainError> {
        let raw = self.call_asset(asset, AssetCall::GetTradingStats).await?;
        abi::decode_trading_stats(&raw, &self.numeric)
            .map_err(|e| Self::decode_failed("getTradingStats", e))
    }

    pub async fn user_holding(
        &self,
        asset_id: &str,
        user_id: &str,
    ) -> Result<UserHolding, DomainError> {
        let asset = parse_address(asset_id)?;
        let user = parse_address(user_id)?;
        self.fetch_user_holding(asset, user).await
    }

    pub async fn fetch_user_holding(
        &self,
        asset: Address,
        user: Address,
    ) -> Result<UserHolding, DomainError> {
        let raw = self
            .call_asset(asset, AssetCall::GetUserHolding { user })
            .await?;
        abi::decode_user_holding(&raw, asset, user, &self.numeric)
            .map_err(|e| Self::decode_failed("getUserHolding", e))
    }

    // =========================================================================
    // Batch reads
    // =========================================================================

    /// Details of every listed asset in one round trip.
    ///
    /// The whole batch is rejected if the list is empty or any member is
    /// malformed.
    pub async fn batch_asset_details<S: AsRef<str>>(
        &self,
        asset_ids: &[S],
    ) -> Result<Vec<AssetDetails>, DomainError> {
        let assets = parse_id_list(asset_ids)?;
        self.fetch_batch_asset_details(&assets).await
    }

    pub async fn fetch_batch_asset_details(
        &self,
        assets: &[Address],
    ) -> Result<Vec<AssetDetails>, DomainError> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .call_registry(RegistryCall::GetAssetsDetails {
                assets: assets.to_vec(),
            })
            .await?;
        let details = abi::decode_asset_details_list(&raw, &self.numeric)
            .map_err(|e| Self::decode_failed("getAssetsDetails", e))?;
        if details.len() != assets.len() {
            return Err(DomainError::query_failed(format!(
                "getAssetsDetails: expected {} entries, got {}",
                assets.len(),
                details.len()
            )));
        }
        Ok(details)
    }

    pub async fn batch_user_holdings<S: AsRef<str>>(
        &self,
        asset_ids: &[S],
        user_id: &str,
    ) -> Result<Vec<UserHolding>, DomainError> {
        let assets = parse_id_list(asset_ids)?;
        let user = parse_address(user_id)?;
        self.fetch_batch_user_holdings(&assets, user).await
    }

    pub async fn fetch_batch_user_holdings(
        &self,
        assets: &[Address],
        user: Address,
    ) -> Result<Vec<UserHolding>, DomainError> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .call_registry(RegistryCall::GetUserHoldings {
                assets: assets.to_vec(),
                user,
            })
            .await?;
        abi::decode_user_holdings(&raw, assets, user, &self.numeric)
            .map_err(|e| Self::decode_failed("getUserHoldings", e))
    }

    // =========================================================================
    // Display forms
    // =========================================================================

    pub async fn company_valuation_view(
        &self,
        company_id: &str,
    ) -> Result<CompanyValuationView, DomainError> {
        Ok((&self.company_valuation(company_id).await?).into())
    }

    pub async fn asset_details_view(&self, asset_id: &str) -> Result<AssetDetailsView, DomainError> {
        Ok((&self.asset_details(asset_id).await?).into())
    }

    pub async fn trading_status_view(
        &self,
        asset_id: &str,
    ) -> Result<TradingStatusView, DomainError> {
        Ok((&self.trading_status(asset_id).await?).into())
    }

    pub async fn trading_stats_view(&self, asset_id: &str) -> Result<TradingStatsView, DomainError> {
        Ok((&self.trading_stats(asset_id).await?).into())
    }

    pub async fn user_holding_view(
        &self,
        asset_id: &str,
        user_id: &str,
    ) -> Result<UserHoldingView, DomainError> {
        Ok((&self.user_holding(asset_id, user_id).await?).into())
    }

    pub async fn platform_snapshot_view(&self) -> Result<PlatformSnapshotView, DomainError> {
        Ok((&self.platform_snapshot().await?).into())
    }

    pub async fn batch_asset_details_view<S: AsRef<str>>(
        &self,
        asset_ids: &[S],
    ) -> Result<Vec<AssetDetailsView>, DomainError> {
        let details = self.batch_asset_details(asset_ids).await?;
        Ok(details.iter().map(AssetDetailsView::from).collect())
    }

    pub async fn batch_user_holdings_view<S: AsRef<str>>(
        &self,
        asset_ids: &[S],
        user_id: &str,
    ) -> Result<Vec<UserHoldingView>, DomainError> {
        let holdings = self.batch_user_holdings(asset_ids, user_id).await?;
        Ok(holdings.iter().map(UserHoldingView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedger;

    fn registry() -> Address {
        Address::from_low_u64_be(0xee)
    }

    fn gateway(ledger: Arc<MockLedger>) -> LedgerQueryGateway {
        LedgerQueryGateway::new(ledger, registry(), NumericConfig::default())
    }

    #[tokio::test]
    async fn test_malformed_identifier_makes_no_call() {
        let ledger = Arc::new(MockLedger::new(registry()));
        let gw = gateway(ledger.clone());

        let err = gw.asset_details("0x1234").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidIdentifier");
        let err = gw.company_valuation("twelve").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidIdentifier");
        assert_eq!(ledger.io_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let ledger = Arc::new(MockLedger::new(registry()));
        let gw = gateway(ledger.clone());
        let empty: [&str; 0] = [];
        let err = gw.batch_asset_details(&empty).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidIdentifier");
        assert_eq!(ledger.io_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_query_failed() {
        let ledger = Arc::new(MockLedger::new(registry()));
        ledger.fail_next_call(LedgerError::NetworkError("connection refused".into()));
        let gw = gateway(ledger.clone());
        let err = gw.all_assets().await.unwrap_err();
        match err {
            DomainError::QueryFailed { reason } => assert!(reason.contains("connection refused")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_valuation_reads_as_not_existing() {
        let ledger = Arc::new(MockLedger::new(registry()));
        let gw = gateway(ledger);
        let valuation = gw.company_valuation("99").await.unwrap();
        assert!(!valuation.exists);
        assert!(gw.asset_for_company("99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_address_without_code_fails_to_decode() {
        let ledger = Arc::new(MockLedger::new(registry()));
        let gw = gateway(ledger);
        let err = gw
            .asset_details("0x00000000000000000000000000000000000000aa")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "QueryFailed");
    }
}
