//! Asset lifecycle orchestration.
//!
//! Every precondition is checked against freshly read ledger state before the
//! corresponding write is submitted. Nothing is rolled back: a failure part way
//! through a multi-step operation leaves the last finalized state, which
//! [`AssetLifecycleWorkflow::inspect`] reports and
//! [`AssetLifecycleWorkflow::reconcile`] repairs.

use crate::codec;
use crate::domain::{parse_address, AssetDetails, CompanyId, EpochTimestamp, TradingStatus};
use crate::error::DomainError;
use crate::gateway::{LedgerQueryGateway, LedgerTransactionGateway, TransactionOutcome, WriteOperation};
use ethers::types::Address;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Lifecycle position of a company, derived from ledger reads.
///
/// `paused` is orthogonal to whether trading is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LifecycleState {
    NoValuation,
    ValuationSubmitted,
    AssetCreated { paused: bool },
    TradingActive { paused: bool },
    TradingDeactivated { paused: bool },
    /// The asset exists and is not trading, but the ledger cannot tell a
    /// never-activated asset from a deactivated one and this journal holds no
    /// record of either.
    Undetermined { paused: bool },
}

/// What the local journal knows about an asset's past writes.
#[derive(Debug, Clone, Copy, Default)]
struct JournalHistory {
    created_here: bool,
    activated_here: bool,
}

impl LifecycleState {
    fn from_status(status: &TradingStatus, history: JournalHistory) -> Self {
        let paused = status.paused;
        if status.trading_active {
            LifecycleState::TradingActive { paused }
        } else if history.activated_here {
            LifecycleState::TradingDeactivated { paused }
        } else if history.created_here {
            LifecycleState::AssetCreated { paused }
        } else {
            LifecycleState::Undetermined { paused }
        }
    }
}

/// Entries kept in a workflow's action log.
pub const ACTION_LOG_CAPACITY: usize = 256;

/// Name and symbol of the asset issued for a company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyInfo {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action: WriteOperation,
    pub target: Address,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub at: EpochTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceStatus {
    Complete,
    NeedsReconciliation,
}

/// Result of `create_asset`: the creation step always finalized; activation
/// may not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceReport {
    pub company_id: CompanyId,
    pub asset: Option<Address>,
    pub creation: TransactionOutcome,
    pub activation: Option<TransactionOutcome>,
    pub activation_error: Option<DomainError>,
    pub status: IssuanceStatus,
}

impl IssuanceReport {
    pub fn is_complete(&self) -> bool {
        self.status == IssuanceStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleReport {
    pub company_id: CompanyId,
    pub state: LifecycleState,
    pub asset: Option<Address>,
    /// An activation write for the asset is still unresolved in the journal.
    pub activation_pending: bool,
    /// This journal created the asset, it is not trading, it was never
    /// activated from here and no activation is pending.
    pub inconsistent: bool,
}

/// Drives companies from valuation to active trading.
pub struct AssetLifecycleWorkflow {
    query: LedgerQueryGateway,
    transactions: Arc<LedgerTransactionGateway>,
    actions: Mutex<VecDeque<ActionRecord>>,
}

fn parse_company_id(raw: &str) -> Result<CompanyId, DomainError> {
    Ok(raw.parse::<CompanyId>()?)
}

fn require_text(value: &str, what: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::OutOfRange(format!("{} must not be empty", what)));
    }
    Ok(())
}

impl AssetLifecycleWorkflow {
    pub fn new(query: LedgerQueryGateway, transactions: Arc<LedgerTransactionGateway>) -> Self {
        Self {
            query,
            transactions,
            actions: Mutex::new(VecDeque::with_capacity(ACTION_LOG_CAPACITY)),
        }
    }

    /// The most recent writes attempted by this workflow instance, oldest
    /// first, up to [`ACTION_LOG_CAPACITY`].
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn record<T>(
        &self,
        action: WriteOperation,
        target: Address,
        result: &Result<T, DomainError>,
    ) {
        let entry = ActionRecord {
            action,
            target,
            succeeded: result.is_ok(),
            error_kind: result.as_ref().err().map(DomainError::kind),
            at: EpochTimestamp::now(),
        };
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        if actions.len() == ACTION_LOG_CAPACITY {
            actions.pop_front();
        }
        actions.push_back(entry);
    }

    // =========================================================================
    // Valuation and issuance
    // =========================================================================

    /// Accepted while the company has no unconsumed valuation, including
    /// after an earlier valuation was consumed by asset creation.
    pub async fn submit_valuation(
        &self,
        company_id: &str,
        valuation: &str,
        initial_price: &str,
        evaluator: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let id = parse_company_id(company_id)?;
        let evaluator = parse_address(evaluator)?;
        let decimals = self.query.numeric().currency_decimals;
        codec::positive_from_display(valuation, decimals, "valuation")?;
        codec::positive_from_display(initial_price, decimals, "initial price")?;

        if self.query.fetch_company_valuation(id).await?.exists {
            return Err(DomainError::ValuationAlreadyExists);
        }

        let result = self
            .transactions
            .submit_valuation(id, valuation, initial_price, evaluator)
            .await;
        self.record(WriteOperation::SubmitValuation, self.query.registry(), &result);
        if result.is_ok() {
            info!(company_id = %id, evaluator = %evaluator, "valuation submitted");
        }
        result
    }

    /// Creates the company's asset and immediately activates trading on it.
    ///
    /// Fails without writing if the company has no valuation or the signer is
    /// not its evaluator. Once creation finalizes the call succeeds; an
    /// activation failure is reported in the returned [`IssuanceReport`].
    pub async fn create_asset(
        &self,
        company_id: &str,
        info: CompanyInfo,
    ) -> Result<IssuanceReport, DomainError> {
        let id = parse_company_id(company_id)?;
        require_text(&info.name, "name")?;
        require_text(&info.symbol, "symbol")?;

        let valuation = self.query.fetch_company_valuation(id).await?;
        if !valuation.exists {
            return Err(DomainError::ValuationNotFound);
        }
        if valuation.evaluator != self.transactions.signer() {
            return Err(DomainError::NotAuthorizedEvaluator);
        }

        let creation = self
            .transactions
            .create_asset(id, &info.name, &info.symbol)
            .await;
        self.record(WriteOperation::CreateAsset, self.query.registry(), &creation);
        let creation = creation?;

        let asset = match &creation.asset_created {
            Some(event) => Ok(event.asset),
            None => match self.query.fetch_asset_for_company(id).await {
                Ok(Some(asset)) => Ok(asset),
                Ok(None) => Err(DomainError::query_failed(
                    "asset created but not yet visible in the registry",
                )),
                Err(e) => Err(e),
            },
        };
        let asset = match asset {
            Ok(asset) => asset,
            Err(e) => {
                warn!(company_id = %id, error = %e, "created asset could not be resolved");
                return Ok(IssuanceReport {
                    company_id: id,
                    asset: None,
                    creation,
                    activation: None,
                    activation_error: Some(e),
                    status: IssuanceStatus::NeedsReconciliation,
                });
            }
        };
        info!(company_id = %id, asset = %asset, "asset created");

        let (activation, activation_error) = match self.activate_address(asset).await {
            Ok(outcome) => (outcome, None),
            Err(e) => {
                warn!(company_id = %id, asset = %asset, error = %e, "activation after creation failed");
                (None, Some(e))
            }
        };
        let status = if activation_error.is_none() {
            IssuanceStatus::Complete
        } else {
            IssuanceStatus::NeedsReconciliation
        };
        Ok(IssuanceReport {
            company_id: id,
            asset: Some(asset),
            creation,
            activation,
            activation_error,
            status,
        })
    }

    /// Activates trading; an already active asset counts as success and
    /// yields `Ok(None)`.
    async fn activate_address(
        &self,
        asset: Address,
    ) -> Result<Option<TransactionOutcome>, DomainError> {
        match self.activate_checked(asset).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(DomainError::TradingAlreadyActive) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn activate_checked(&self, asset: Address) -> Result<TransactionOutcome, DomainError> {
        let status = self.query.fetch_trading_status(asset).await?;
        if !status.valuation_set {
            return Err(DomainError::ValuationNotSet);
        }
        if status.trading_active {
            return Err(DomainError::TradingAlreadyActive);
        }
        let result = self.transactions.activate_trading(asset).await;
        self.record(WriteOperation::ActivateTrading, asset, &result);
        result
    }

    // =========================================================================
    // Trading state
    // =========================================================================

    pub async fn activate(&self, asset_id: &str) -> Result<TransactionOutcome, DomainError> {
        let asset = parse_address(asset_id)?;
        self.activate_checked(asset).await
    }

    pub async fn deactivate(&self, asset_id: &str) -> Result<TransactionOutcome, DomainError> {
        let asset = parse_address(asset_id)?;
        let status = self.query.fetch_trading_status(asset).await?;
        if !status.trading_active {
            return Err(DomainError::TradingNotActive);
        }
        let result = self.transactions.deactivate_trading(asset).await;
        self.record(WriteOperation::DeactivateTrading, asset, &result);
        result
    }

    pub async fn pause(&self, asset_id: &str) -> Result<TransactionOutcome, DomainError> {
        let asset = parse_address(asset_id)?;
        if self.query.fetch_trading_status(asset).await?.paused {
            return Err(DomainError::AlreadyPaused);
        }
        let result = self.transactions.pause(asset).await;
        self.record(WriteOperation::Pause, asset, &result);
        result
    }

    pub async fn unpause(&self, asset_id: &str) -> Result<TransactionOutcome, DomainError> {
        let asset = parse_address(asset_id)?;
        if !self.query.fetch_trading_status(asset).await?.paused {
            return Err(DomainError::NotPaused);
        }
        let result = self.transactions.unpause(asset).await;
        self.record(WriteOperation::Unpause, asset, &result);
        result
    }

    // =========================================================================
    // Asset administration
    // =========================================================================

    /// Details of a registered asset; unregistered addresses are rejected.
    async fn existing_asset(&self, asset_id: &str) -> Result<AssetDetails, DomainError> {
        let asset = parse_address(asset_id)?;
        if !self.query.all_assets().await?.contains(&asset) {
            return Err(DomainError::InvalidIdentifier(format!(
                "no asset registered at {}",
                asset_id.trim()
            )));
        }
        self.query.fetch_asset_details(asset).await
    }

    pub async fn update_price(
        &self,
        asset_id: &str,
        price: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        parse_address(asset_id)?;
        codec::positive_from_display(price, self.query.numeric().currency_decimals, "price")?;
        let details = self.existing_asset(asset_id).await?;
        let result = self.transactions.update_price(details.asset, price).await;
        self.record(WriteOperation::UpdatePrice, details.asset, &result);
        result
    }

    pub async fn update_fees(
        &self,
        asset_id: &str,
        buy_fee_rate: &str,
        sell_fee_rate: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        parse_address(asset_id)?;
        let ceiling = self.query.numeric().max_fee_rate_bps;
        codec::parse_rate(buy_fee_rate, ceiling)?;
        codec::parse_rate(sell_fee_rate, ceiling)?;
        let details = self.existing_asset(asset_id).await?;
        let result = self
            .transactions
            .update_fee_rates(details.asset, buy_fee_rate, sell_fee_rate)
            .await;
        self.record(WriteOperation::UpdateFeeRates, details.asset, &result);
        result
    }

    pub async fn withdraw_fees(&self, asset_id: &str) -> Result<TransactionOutcome, DomainError> {
        let details = self.existing_asset(asset_id).await?;
        if details.collected_fees.is_zero() {
            return Err(DomainError::NoFeesToWithdraw);
        }
        let result = self.transactions.withdraw_fees(details.asset).await;
        self.record(WriteOperation::WithdrawFees, details.asset, &result);
        result
    }

    pub async fn company_withdraw(
        &self,
        asset_id: &str,
        amount: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        parse_address(asset_id)?;
        codec::positive_from_display(amount, self.query.numeric().currency_decimals, "amount")?;
        let details = self.existing_asset(asset_id).await?;
        let result = self
            .transactions
            .company_withdraw(details.asset, amount)
            .await;
        self.record(WriteOperation::CompanyWithdraw, details.asset, &result);
        result
    }

    // =========================================================================
    // Trading
    // =========================================================================

    async fn tradable(&self, asset: Address) -> Result<(), DomainError> {
        let status = self.query.fetch_trading_status(asset).await?;
        if !status.trading_active {
            return Err(DomainError::TradingNotActive);
        }
        if status.paused {
            return Err(DomainError::AlreadyPaused);
        }
        Ok(())
    }

    /// Spends `usdc_amount` of settlement currency on shares.
    pub async fn buy(
        &self,
        asset_id: &str,
        usdc_amount: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let asset = parse_address(asset_id)?;
        codec::positive_from_display(usdc_amount, self.query.numeric().currency_decimals, "amount")?;
        self.tradable(asset).await?;
        let result = self.transactions.buy(asset, usdc_amount).await;
        self.record(WriteOperation::Buy, asset, &result);
        result
    }

    pub async fn sell(
        &self,
        asset_id: &str,
        token_amount: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let asset = parse_address(asset_id)?;
        codec::positive_from_display(token_amount, self.query.numeric().share_decimals, "amount")?;
        self.tradable(asset).await?;
        let result = self.transactions.sell(asset, token_amount).await;
        self.record(WriteOperation::Sell, asset, &result);
        result
    }

    // =========================================================================
    // Inspection and repair
    // =========================================================================

    pub async fn inspect(&self, company_id: &str) -> Result<LifecycleReport, DomainError> {
        let id = parse_company_id(company_id)?;
        self.inspect_id(id).await
    }

    async fn inspect_id(&self, id: CompanyId) -> Result<LifecycleReport, DomainError> {
        let Some(asset) = self.query.fetch_asset_for_company(id).await? else {
            let valuation = self.query.fetch_company_valuation(id).await?;
            let state = if valuation.exists {
                LifecycleState::ValuationSubmitted
            } else {
                LifecycleState::NoValuation
            };
            return Ok(LifecycleReport {
                company_id: id,
                state,
                asset: None,
                activation_pending: false,
                inconsistent: false,
            });
        };

        let status = self.query.fetch_trading_status(asset).await?;
        let history = JournalHistory {
            created_here: self.transactions.creation_confirmed(id).await?,
            activated_here: self
                .transactions
                .write_confirmed(WriteOperation::ActivateTrading, asset)
                .await?
                || self
                    .transactions
                    .write_confirmed(WriteOperation::DeactivateTrading, asset)
                    .await?,
        };
        let activation_pending = self
            .transactions
            .write_in_flight(WriteOperation::ActivateTrading, asset)
            .await?;
        let state = LifecycleState::from_status(&status, history);
        let inconsistent =
            matches!(state, LifecycleState::AssetCreated { .. }) && !activation_pending;
        Ok(LifecycleReport {
            company_id: id,
            state,
            asset: Some(asset),
            activation_pending,
            inconsistent,
        })
    }

    /// Resolves unresolved journal rows, then retries activation when the
    /// report is inconsistent: this journal created the asset and holds no
    /// activation or deactivation for it. An undetermined asset is left alone.
    /// The asset itself is never re-created.
    pub async fn reconcile(&self, company_id: &str) -> Result<LifecycleReport, DomainError> {
        let id = parse_company_id(company_id)?;
        let resolved = self.transactions.reconcile_pending().await?;
        if !resolved.is_empty() {
            info!(company_id = %id, resolved = resolved.len(), "journal reconciled");
        }

        let report = self.inspect_id(id).await?;
        let Some(asset) = report.asset.filter(|_| report.inconsistent) else {
            return Ok(report);
        };
        warn!(company_id = %id, asset = %asset, "retrying activation");
        self.activate_address(asset).await?;
        self.inspect_id(id).await
    }
}
