//! State-changing ledger gateway.
//!
//! Each write is validated and encoded locally, submitted once from the
//! configured signing identity, journaled as pending and then awaited until it
//! finalizes or the finalization timeout elapses. Writes are serialized: the
//! write lock is held from submission through finalization.

use crate::codec;
use crate::config::{FinalizationConfig, NumericConfig};
use crate::db::{JournalEntry, JournalStatus, NewJournalEntry, Repository};
use crate::domain::{address_hex, AssetCreatedEvent, CompanyId};
use crate::error::{DomainError, TxStatus};
use crate::ledger::abi::{self, AssetCall, RegistryCall};
use crate::ledger::revert::revert_to_domain_error;
use crate::ledger::{LedgerClient, LedgerError, Receipt};
use backoff::ExponentialBackoffBuilder;
use ethers::types::{Address, Bytes, H256};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
    SubmitValuation,
    CreateAsset,
    UpdatePrice,
    UpdateFeeRates,
    ActivateTrading,
    DeactivateTrading,
    Pause,
    Unpause,
    Buy,
    Sell,
    WithdrawFees,
    CompanyWithdraw,
}

impl WriteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOperation::SubmitValuation => "submit_valuation",
            WriteOperation::CreateAsset => "create_asset",
            WriteOperation::UpdatePrice => "update_price",
            WriteOperation::UpdateFeeRates => "update_fee_rates",
            WriteOperation::ActivateTrading => "activate_trading",
            WriteOperation::DeactivateTrading => "deactivate_trading",
            WriteOperation::Pause => "pause",
            WriteOperation::Unpause => "unpause",
            WriteOperation::Buy => "buy",
            WriteOperation::Sell => "sell",
            WriteOperation::WithdrawFees => "withdraw_fees",
            WriteOperation::CompanyWithdraw => "company_withdraw",
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a finalized, successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub operation: WriteOperation,
    pub target: Address,
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    /// Decoded `AssetCreated` event, for `create_asset` only.
    pub asset_created: Option<AssetCreatedEvent>,
    /// `create_asset` succeeded but its event was missing or undecodable.
    pub derived_identifier_unavailable: bool,
}

/// Journal row resolved by [`LedgerTransactionGateway::reconcile_pending`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledWrite {
    pub operation: String,
    pub target: String,
    pub tx_hash: String,
    pub status: String,
}

fn tx_hash_hex(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

/// Digest identifying a write by operation, target and calldata.
fn args_digest(operation: WriteOperation, target: Address, calldata: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());
    hasher.update(calldata);
    hex::encode(hasher.finalize())
}

fn require_name(value: &str, what: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::OutOfRange(format!("{} must not be empty", what)));
    }
    Ok(())
}

#[derive(Debug)]
enum PollError {
    NotFinal,
    Transport(LedgerError),
}

pub struct LedgerTransactionGateway {
    client: Arc<dyn LedgerClient>,
    registry: Address,
    signer: Address,
    numeric: NumericConfig,
    finalization: FinalizationConfig,
    journal: Arc<Repository>,
    write_lock: Mutex<()>,
}

impl LedgerTransactionGateway {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        registry: Address,
        signer: Address,
        numeric: NumericConfig,
        finalization: FinalizationConfig,
        journal: Arc<Repository>,
    ) -> Self {
        Self {
            client,
            registry,
            signer,
            numeric,
            finalization,
            journal,
            write_lock: Mutex::new(()),
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn numeric(&self) -> &NumericConfig {
        &self.numeric
    }

    /// Whether a write of `operation` against `target` is still unresolved.
    pub async fn write_in_flight(
        &self,
        operation: WriteOperation,
        target: Address,
    ) -> Result<bool, DomainError> {
        Ok(self
            .journal
            .has_in_flight(operation.as_str(), &address_hex(&target))
            .await?)
    }

    /// Whether a write of `operation` against `target` has ever been confirmed.
    pub async fn write_confirmed(
        &self,
        operation: WriteOperation,
        target: Address,
    ) -> Result<bool, DomainError> {
        Ok(self
            .journal
            .has_confirmed(operation.as_str(), &address_hex(&target))
            .await?)
    }

    /// Whether this journal holds a confirmed `create_asset` for the company.
    pub async fn creation_confirmed(&self, company_id: CompanyId) -> Result<bool, DomainError> {
        Ok(self
            .journal
            .has_confirmed_for_subject(
                WriteOperation::CreateAsset.as_str(),
                &company_id.to_string(),
            )
            .await?)
    }

    // =========================================================================
    // Registry writes
    // =========================================================================

    pub async fn submit_valuation(
        &self,
        company_id: CompanyId,
        valuation: &str,
        initial_price: &str,
        evaluator: Address,
    ) -> Result<TransactionOutcome, DomainError> {
        let decimals = self.numeric.currency_decimals;
        let valuation = codec::positive_from_display(valuation, decimals, "valuation")?;
        let initial_price = codec::positive_from_display(initial_price, decimals, "initial price")?;
        let call = RegistryCall::SubmitValuation {
            company_id: company_id.as_u256(),
            valuation,
            initial_price,
            evaluator,
        };
        self.execute(
            WriteOperation::SubmitValuation,
            self.registry,
            Some(company_id),
            call.encode(),
        )
        .await
    }

    pub async fn create_asset(
        &self,
        company_id: CompanyId,
        name: &str,
        symbol: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        require_name(name, "name")?;
        require_name(symbol, "symbol")?;
        let call = RegistryCall::CreateAsset {
            company_id: company_id.as_u256(),
            name: name.trim().to_string(),
            symbol: symbol.trim().to_string(),
        };
        self.execute(
            WriteOperation::CreateAsset,
            self.registry,
            Some(company_id),
            call.encode(),
        )
        .await
    }

    // =========================================================================
    // Asset writes
    // =========================================================================

    pub async fn update_price(
        &self,
        asset: Address,
        price: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let price = codec::positive_from_display(price, self.numeric.currency_decimals, "price")?;
        self.execute(
            WriteOperation::UpdatePrice,
            asset,
            None,
            AssetCall::UpdatePrice { price }.encode(),
        )
        .await
    }

    /// Rates are percentages (`"2.5"`, `"2.50%"`) or basis points (`"250bps"`).
    pub async fn update_fee_rates(
        &self,
        asset: Address,
        buy_fee_rate: &str,
        sell_fee_rate: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let ceiling = self.numeric.max_fee_rate_bps;
        let buy = codec::parse_rate(buy_fee_rate, ceiling)?;
        let sell = codec::parse_rate(sell_fee_rate, ceiling)?;
        let call = AssetCall::UpdateFeeRates {
            buy_fee_rate: buy.as_u256(),
            sell_fee_rate: sell.as_u256(),
        };
        self.execute(WriteOperation::UpdateFeeRates, asset, None, call.encode())
            .await
    }

    pub async fn activate_trading(&self, asset: Address) -> Result<TransactionOutcome, DomainError> {
        self.execute(
            WriteOperation::ActivateTrading,
            asset,
            None,
            AssetCall::ActivateTrading.encode(),
        )
        .await
    }

    pub async fn deactivate_trading(
        &self,
        asset: Address,
    ) -> Result<TransactionOutcome, DomainError> {
        self.execute(
            WriteOperation::DeactivateTrading,
            asset,
            None,
            AssetCall::DeactivateTrading.encode(),
        )
        .await
    }

    pub async fn pause(&self, asset: Address) -> Result<TransactionOutcome, DomainError> {
        self.execute(WriteOperation::Pause, asset, None, AssetCall::Pause.encode())
            .await
    }

    pub async fn unpause(&self, asset: Address) -> Result<TransactionOutcome, DomainError> {
        self.execute(WriteOperation::Unpause, asset, None, AssetCall::Unpause.encode())
            .await
    }

    /// Buys shares for `usdc_amount` of settlement currency.
    pub async fn buy(
        &self,
        asset: Address,
        usdc_amount: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let usdc_amount =
            codec::positive_from_display(usdc_amount, self.numeric.currency_decimals, "amount")?;
        self.execute(
            WriteOperation::Buy,
            asset,
            None,
            AssetCall::BuyTokens { usdc_amount }.encode(),
        )
        .await
    }

    /// Sells `token_amount` shares.
    pub async fn sell(
        &self,
        asset: Address,
        token_amount: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let token_amount =
            codec::positive_from_display(token_amount, self.numeric.share_decimals, "amount")?;
        self.execute(
            WriteOperation::Sell,
            asset,
            None,
            AssetCall::SellTokens { token_amount }.encode(),
        )
        .await
    }

    pub async fn withdraw_fees(&self, asset: Address) -> Result<TransactionOutcome, DomainError> {
        self.execute(
            WriteOperation::WithdrawFees,
            asset,
            None,
            AssetCall::WithdrawFees.encode(),
        )
        .await
    }

    pub async fn company_withdraw(
        &self,
        asset: Address,
        amount: &str,
    ) -> Result<TransactionOutcome, DomainError> {
        let amount =
            codec::positive_from_display(amount, self.numeric.currency_decimals, "amount")?;
        self.execute(
            WriteOperation::CompanyWithdraw,
            asset,
            None,
            AssetCall::CompanyWithdraw { amount }.encode(),
        )
        .await
    }

    // =========================================================================
    // Submission and finalization
    // =========================================================================

    /// Journal failures after a successful submission are logged and do not
    /// change the reported outcome: the ledger state has already moved.
    async fn execute(
        &self,
        operation: WriteOperation,
        target: Address,
        company_id: Option<CompanyId>,
        calldata: Bytes,
    ) -> Result<TransactionOutcome, DomainError> {
        let _guard = self.write_lock.lock().await;
        let target_hex = address_hex(&target);
        let digest = args_digest(operation, target, &calldata);

        if let Some(existing) = self
            .journal
            .find_in_flight(operation.as_str(), &target_hex, &digest)
            .await?
        {
            warn!(
                operation = operation.as_str(),
                contract = %target_hex,
                tx_hash = %existing.tx_hash,
                "identical write still unresolved"
            );
            return Err(DomainError::WriteInFlight {
                operation: operation.as_str().to_string(),
                tx_hash: existing.tx_hash,
            });
        }

        let tx_hash = match self
            .client
            .send_transaction(self.signer, target, calldata)
            .await
        {
            Ok(hash) => hash,
            Err(LedgerError::Reverted { data, message }) => {
                let err = revert_to_domain_error(&data);
                warn!(
                    operation = operation.as_str(),
                    contract = %target_hex,
                    kind = err.kind(),
                    message = %message,
                    "write rejected"
                );
                return Err(err);
            }
            Err(other) => {
                warn!(
                    operation = operation.as_str(),
                    contract = %target_hex,
                    error = %other,
                    "submission failed"
                );
                return Err(DomainError::TransactionFailed {
                    status: TxStatus::Rejected,
                    tx_hash: None,
                });
            }
        };
        let hash_hex = tx_hash_hex(&tx_hash);
        info!(
            operation = operation.as_str(),
            contract = %target_hex,
            tx_hash = %hash_hex,
            "write submitted"
        );

        let signer_hex = address_hex(&self.signer);
        let subject = company_id.map(|id| id.to_string());
        let entry = match self
            .journal
            .record_submitted(NewJournalEntry {
                operation: operation.as_str(),
                target: &target_hex,
                subject: subject.as_deref(),
                signer: &signer_hex,
                args_digest: &digest,
                tx_hash: &hash_hex,
            })
            .await
        {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    operation = operation.as_str(),
                    tx_hash = %hash_hex,
                    error = %e,
                    "submitted write could not be journaled"
                );
                None
            }
        };

        let Some(receipt) = self.wait_for_receipt(tx_hash).await else {
            warn!(
                operation = operation.as_str(),
                tx_hash = %hash_hex,
                timeout_ms = self.finalization.timeout.as_millis() as u64,
                "write did not finalize in time"
            );
            self.mark(entry.as_ref(), JournalStatus::Timeout, Some("finalization timeout"))
                .await;
            return Err(DomainError::TransactionFailed {
                status: TxStatus::Timeout,
                tx_hash: Some(hash_hex),
            });
        };

        if !receipt.succeeded() {
            warn!(operation = operation.as_str(), tx_hash = %hash_hex, "write reverted");
            self.mark(entry.as_ref(), JournalStatus::Reverted, Some("receipt status 0"))
                .await;
            return Err(DomainError::TransactionFailed {
                status: TxStatus::Reverted,
                tx_hash: Some(hash_hex),
            });
        }

        self.mark(entry.as_ref(), JournalStatus::Confirmed, None).await;
        info!(
            operation = operation.as_str(),
            tx_hash = %hash_hex,
            block = receipt.block_number.unwrap_or_default(),
            "write confirmed"
        );

        let mut outcome = TransactionOutcome {
            operation,
            target,
            tx_hash,
            block_number: receipt.block_number,
            asset_created: None,
            derived_identifier_unavailable: false,
        };
        if operation == WriteOperation::CreateAsset {
            match abi::find_asset_created(&receipt.logs, self.registry) {
                Some(Ok(event)) => outcome.asset_created = Some(event),
                Some(Err(e)) => {
                    warn!(tx_hash = %hash_hex, error = %e, "AssetCreated log undecodable");
                    outcome.derived_identifier_unavailable = true;
                }
                None => {
                    warn!(tx_hash = %hash_hex, "AssetCreated log missing");
                    outcome.derived_identifier_unavailable = true;
                }
            }
        }
        Ok(outcome)
    }

    async fn mark(
        &self,
        entry: Option<&JournalEntry>,
        status: JournalStatus,
        error: Option<&str>,
    ) {
        let Some(entry) = entry else {
            return;
        };
        if let Err(e) = self.journal.update_status(&entry.id, status, error).await {
            warn!(
                tx_hash = %entry.tx_hash,
                status = status.as_str(),
                error = %e,
                "journal status update failed"
            );
        }
    }

    /// Polls for the receipt at the configured interval until the configured
    /// timeout. `None` when the write has not finalized in time, including
    /// when a single lookup hangs past the deadline.
    async fn wait_for_receipt(&self, tx_hash: H256) -> Option<Receipt> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.finalization.poll_interval)
            .with_max_interval(self.finalization.poll_interval)
            .with_multiplier(1.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(Some(self.finalization.timeout))
            .build();

        let polling = backoff::future::retry(policy, || async {
            match self.client.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => Ok(receipt),
                Ok(None) => Err(backoff::Error::transient(PollError::NotFinal)),
                Err(e) => Err(backoff::Error::transient(PollError::Transport(e))),
            }
        });
        let Ok(result) = tokio::time::timeout(self.finalization.timeout, polling).await else {
            return None;
        };

        match result {
            Ok(receipt) => Some(receipt),
            Err(PollError::NotFinal) => None,
            Err(PollError::Transport(e)) => {
                warn!(tx_hash = %tx_hash_hex(&tx_hash), error = %e, "receipt lookup kept failing");
                None
            }
        }
    }

    /// Re-queries the receipt of every unresolved journal row once and records
    /// the final status of those that have since finalized.
    pub async fn reconcile_pending(&self) -> Result<Vec<ReconciledWrite>, DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut resolved = Vec::new();
        for entry in self.journal.in_flight_entries().await? {
            let digits = entry.tx_hash.trim_start_matches("0x");
            let bytes = hex::decode(digits).map_err(|e| DomainError::Journal(e.to_string()))?;
            if bytes.len() != 32 {
                return Err(DomainError::Journal(format!(
                    "malformed tx hash in journal: {}",
                    entry.tx_hash
                )));
            }
            let tx_hash = H256::from_slice(&bytes);
            let receipt = self
                .client
                .transaction_receipt(tx_hash)
                .await
                .map_err(DomainError::query_failed)?;
            let Some(receipt) = receipt else {
                continue;
            };
            let status = if receipt.succeeded() {
                JournalStatus::Confirmed
            } else {
                JournalStatus::Reverted
            };
            self.journal.update_status(&entry.id, status, None).await?;
            info!(
                operation = %entry.operation,
                tx_hash = %entry.tx_hash,
                status = status.as_str(),
                "journal entry reconciled"
            );
            resolved.push(ReconciledWrite {
                operation: entry.operation,
                target: entry.target,
                tx_hash: entry.tx_hash,
                status: status.as_str().to_string(),
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_depends_on_every_input() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        let base = args_digest(WriteOperation::Pause, a, &[1, 2, 3]);
        assert_eq!(base, args_digest(WriteOperation::Pause, a, &[1, 2, 3]));
        assert_ne!(base, args_digest(WriteOperation::Unpause, a, &[1, 2, 3]));
        assert_ne!(base, args_digest(WriteOperation::Pause, b, &[1, 2, 3]));
        assert_ne!(base, args_digest(WriteOperation::Pause, a, &[1, 2]));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(WriteOperation::CreateAsset.as_str(), "create_asset");
        assert_eq!(
            serde_json::to_string(&WriteOperation::CompanyWithdraw).unwrap(),
            "\"company_withdraw\""
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(require_name("  ", "name").is_err());
        assert!(require_name("Acme", "name").is_ok());
    }
}
