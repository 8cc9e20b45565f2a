use async_trait::async_trait;
use equity_ledger::config::{FinalizationConfig, NumericConfig};
use equity_ledger::db::{init_db, Repository};
use equity_ledger::domain::{address_hex, CompanyId};
use equity_ledger::error::DomainError;
use equity_ledger::gateway::{LedgerQueryGateway, LedgerTransactionGateway, WriteOperation};
use equity_ledger::ledger::{LedgerClient, LedgerError, MockLedger, Receipt};
use equity_ledger::workflow::{
    AssetLifecycleWorkflow, CompanyInfo, IssuanceStatus, LifecycleState, ACTION_LOG_CAPACITY,
};
use ethers::types::{Address, Bytes, H256, U256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Delegates to a [`MockLedger`] but drops the n-th submission (1-based).
#[derive(Debug)]
struct DroppingSends {
    inner: Arc<MockLedger>,
    drop_send: AtomicUsize,
    seen: AtomicUsize,
}

#[async_trait]
impl LedgerClient for DroppingSends {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        self.inner.call(to, data).await
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, LedgerError> {
        let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.drop_send.load(Ordering::SeqCst) {
            return Err(LedgerError::NetworkError("connection reset".into()));
        }
        self.inner.send_transaction(from, to, data).await
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, LedgerError> {
        self.inner.transaction_receipt(tx_hash).await
    }
}

struct Harness {
    ledger: Arc<MockLedger>,
    workflow: AssetLifecycleWorkflow,
    transactions: Arc<LedgerTransactionGateway>,
    _temp: TempDir,
}

fn registry() -> Address {
    Address::repeat_byte(0xee)
}

fn signer() -> Address {
    Address::repeat_byte(0x0e)
}

fn signer_hex() -> String {
    address_hex(&signer())
}

fn acme() -> CompanyInfo {
    CompanyInfo {
        name: "Acme".into(),
        symbol: "ACM".into(),
    }
}

fn funded_ledger() -> Arc<MockLedger> {
    let usdc = U256::from(1_000_000u64) * U256::exp10(6);
    Arc::new(MockLedger::new(registry()).with_usdc(signer(), usdc, usdc))
}

/// `drop_send` of 0 never drops.
async fn setup(drop_send: usize) -> Harness {
    setup_on(funded_ledger(), drop_send).await
}

/// A workflow with its own journal over an existing ledger.
async fn setup_on(ledger: Arc<MockLedger>, drop_send: usize) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("journal.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let client: Arc<dyn LedgerClient> = Arc::new(DroppingSends {
        inner: ledger.clone(),
        drop_send: AtomicUsize::new(drop_send),
        seen: AtomicUsize::new(0),
    });
    let numeric = NumericConfig::default();
    let finalization = FinalizationConfig {
        timeout: Duration::from_millis(60),
        poll_interval: Duration::from_millis(5),
    };
    let query = LedgerQueryGateway::new(client.clone(), registry(), numeric);
    let transactions = Arc::new(LedgerTransactionGateway::new(
        client,
        registry(),
        signer(),
        numeric,
        finalization,
        repo,
    ));
    let workflow = AssetLifecycleWorkflow::new(query, transactions.clone());
    Harness {
        ledger,
        workflow,
        transactions,
        _temp: temp_dir,
    }
}

#[tokio::test]
async fn test_create_without_valuation_fails_before_writing() {
    let h = setup(0).await;
    let err = h.workflow.create_asset("1", acme()).await.unwrap_err();
    assert_eq!(err, DomainError::ValuationNotFound);
    assert_eq!(h.ledger.send_count(), 0);
    assert!(h.workflow.actions().is_empty());
}

#[tokio::test]
async fn test_create_by_foreign_evaluator_fails_before_writing() {
    let h = setup(0).await;
    let other = address_hex(&Address::repeat_byte(0x77));
    h.workflow
        .submit_valuation("1", "1000000", "10", &other)
        .await
        .unwrap();
    let sends = h.ledger.send_count();

    let err = h.workflow.create_asset("1", acme()).await.unwrap_err();
    assert_eq!(err, DomainError::NotAuthorizedEvaluator);
    assert_eq!(h.ledger.send_count(), sends);
}

#[tokio::test]
async fn test_duplicate_valuation_rejected() {
    let h = setup(0).await;
    h.workflow
        .submit_valuation("1", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    let err = h
        .workflow
        .submit_valuation("1", "2000000", "10", &signer_hex())
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::ValuationAlreadyExists);
    assert_eq!(h.ledger.send_count(), 1);
}

#[tokio::test]
async fn test_full_issuance_activates_right_after_creation() {
    let h = setup(0).await;
    assert_eq!(
        h.workflow.inspect("1").await.unwrap().state,
        LifecycleState::NoValuation
    );
    h.workflow
        .submit_valuation("1", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    assert_eq!(
        h.workflow.inspect("1").await.unwrap().state,
        LifecycleState::ValuationSubmitted
    );

    let report = h.workflow.create_asset("1", acme()).await.unwrap();
    assert_eq!(report.status, IssuanceStatus::Complete);
    assert!(report.activation.is_some());
    let asset = report.asset.unwrap();

    let actions: Vec<_> = h.workflow.actions().iter().map(|a| a.action).collect();
    assert_eq!(
        actions,
        vec![
            WriteOperation::SubmitValuation,
            WriteOperation::CreateAsset,
            WriteOperation::ActivateTrading
        ]
    );

    let lifecycle = h.workflow.inspect("1").await.unwrap();
    assert_eq!(lifecycle.state, LifecycleState::TradingActive { paused: false });
    assert_eq!(lifecycle.asset, Some(asset));
    assert!(!lifecycle.inconsistent);
}

#[tokio::test]
async fn test_failed_activation_is_detected_and_reconciled() {
    // Third send is the activation following submitValuation and createAsset.
    let h = setup(3).await;
    h.workflow
        .submit_valuation("7", "500000", "5", &signer_hex())
        .await
        .unwrap();
    let report = h.workflow.create_asset("7", acme()).await.unwrap();
    assert_eq!(report.status, IssuanceStatus::NeedsReconciliation);
    assert_eq!(
        report.activation_error.as_ref().map(DomainError::kind),
        Some("TransactionFailed")
    );
    let asset = report.asset.unwrap();

    let lifecycle = h.workflow.inspect("7").await.unwrap();
    assert_eq!(lifecycle.state, LifecycleState::AssetCreated { paused: false });
    assert!(lifecycle.inconsistent);

    let sends = h.ledger.send_count();
    let repaired = h.workflow.reconcile("7").await.unwrap();
    assert_eq!(repaired.state, LifecycleState::TradingActive { paused: false });
    assert!(!repaired.inconsistent);
    assert_eq!(repaired.asset, Some(asset));
    // Only the activation was retried.
    assert_eq!(h.ledger.send_count(), sends + 1);
}

#[tokio::test]
async fn test_pending_activation_is_not_inconsistent() {
    let h = setup(0).await;
    h.workflow
        .submit_valuation("2", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    let outcome = h
        .transactions
        .create_asset(CompanyId::new(U256::from(2u64)), "Beta", "BET")
        .await
        .unwrap();
    let asset = outcome.asset_created.unwrap().asset;

    h.ledger.withhold_receipts(true);
    h.ledger.fail_on_finalize(true);
    let err = h.transactions.activate_trading(asset).await.unwrap_err();
    assert_eq!(err.kind(), "TransactionFailed");

    let lifecycle = h.workflow.inspect("2").await.unwrap();
    assert!(lifecycle.activation_pending);
    assert!(!lifecycle.inconsistent);

    // Once the failed activation resolves, the gap becomes visible.
    h.ledger.release_receipts();
    h.ledger.fail_on_finalize(false);
    h.transactions.reconcile_pending().await.unwrap();
    let lifecycle = h.workflow.inspect("2").await.unwrap();
    assert!(!lifecycle.activation_pending);
    assert!(lifecycle.inconsistent);
}

#[tokio::test]
async fn test_transitions_check_current_state() {
    let h = setup(0).await;
    h.workflow
        .submit_valuation("3", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    let report = h.workflow.create_asset("3", acme()).await.unwrap();
    let asset = address_hex(&report.asset.unwrap());

    assert_eq!(
        h.workflow.activate(&asset).await.unwrap_err(),
        DomainError::TradingAlreadyActive
    );
    assert_eq!(
        h.workflow.unpause(&asset).await.unwrap_err(),
        DomainError::NotPaused
    );
    h.workflow.pause(&asset).await.unwrap();
    assert_eq!(
        h.workflow.pause(&asset).await.unwrap_err(),
        DomainError::AlreadyPaused
    );
    assert_eq!(
        h.workflow.buy(&asset, "100").await.unwrap_err(),
        DomainError::AlreadyPaused
    );
    h.workflow.unpause(&asset).await.unwrap();

    h.workflow.deactivate(&asset).await.unwrap();
    assert_eq!(
        h.workflow.deactivate(&asset).await.unwrap_err(),
        DomainError::TradingNotActive
    );
    assert_eq!(
        h.workflow.inspect("3").await.unwrap().state,
        LifecycleState::TradingDeactivated { paused: false }
    );
    assert!(!h.workflow.inspect("3").await.unwrap().inconsistent);
}

#[tokio::test]
async fn test_administration_requires_registered_asset() {
    let h = setup(0).await;
    let stranger = address_hex(&Address::repeat_byte(0x42));
    let err = h.workflow.update_price(&stranger, "12").await.unwrap_err();
    assert_eq!(err.kind(), "InvalidIdentifier");
    let err = h.workflow.withdraw_fees(&stranger).await.unwrap_err();
    assert_eq!(err.kind(), "InvalidIdentifier");
    assert_eq!(h.ledger.send_count(), 0);
}

#[tokio::test]
async fn test_activation_requires_valuation_flag() {
    let h = setup(0).await;
    h.workflow
        .submit_valuation("4", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    let report = h.workflow.create_asset("4", acme()).await.unwrap();
    let asset = report.asset.unwrap();
    h.workflow.deactivate(&address_hex(&asset)).await.unwrap();

    h.ledger.set_valuation_flag(asset, false);
    let err = h.workflow.activate(&address_hex(&asset)).await.unwrap_err();
    assert_eq!(err, DomainError::ValuationNotSet);
}

#[tokio::test]
async fn test_valuation_can_be_resubmitted_once_consumed() {
    let h = setup(0).await;
    h.workflow
        .submit_valuation("1", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    h.workflow.create_asset("1", acme()).await.unwrap();

    let outcome = h
        .workflow
        .submit_valuation("1", "2000000", "20", &signer_hex())
        .await
        .unwrap();
    assert_eq!(outcome.operation, WriteOperation::SubmitValuation);
    assert_eq!(h.ledger.send_count(), 4);
    assert!(h.workflow.actions().iter().all(|a| a.succeeded));
}

#[tokio::test]
async fn test_foreign_journal_never_reactivates_deactivated_asset() {
    let a = setup(0).await;
    a.workflow
        .submit_valuation("3", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    let report = a.workflow.create_asset("3", acme()).await.unwrap();
    let asset = address_hex(&report.asset.unwrap());
    a.workflow.deactivate(&asset).await.unwrap();

    let b = setup_on(a.ledger.clone(), 0).await;
    let lifecycle = b.workflow.inspect("3").await.unwrap();
    assert_eq!(lifecycle.state, LifecycleState::Undetermined { paused: false });
    assert!(!lifecycle.inconsistent);

    let sends = a.ledger.send_count();
    let after = b.workflow.reconcile("3").await.unwrap();
    assert_eq!(after.state, LifecycleState::Undetermined { paused: false });
    assert_eq!(a.ledger.send_count(), sends);

    // The journal that deactivated it still knows.
    assert_eq!(
        a.workflow.inspect("3").await.unwrap().state,
        LifecycleState::TradingDeactivated { paused: false }
    );
}

#[tokio::test]
async fn test_action_log_is_bounded() {
    let h = setup(0).await;
    h.workflow
        .submit_valuation("5", "1000000", "10", &signer_hex())
        .await
        .unwrap();
    let report = h.workflow.create_asset("5", acme()).await.unwrap();
    let asset = address_hex(&report.asset.unwrap());
    for _ in 0..(ACTION_LOG_CAPACITY / 2) {
        h.workflow.pause(&asset).await.unwrap();
        h.workflow.unpause(&asset).await.unwrap();
    }

    let actions = h.workflow.actions();
    assert_eq!(actions.len(), ACTION_LOG_CAPACITY);
    assert_eq!(actions[0].action, WriteOperation::Pause);
    assert!(actions
        .iter()
        .all(|a| a.action != WriteOperation::SubmitValuation));
    assert_eq!(actions.last().map(|a| a.action), Some(WriteOperation::Unpause));
}
