use async_trait::async_trait;
use equity_ledger::config::{FinalizationConfig, NumericConfig};
use equity_ledger::db::{init_db, JournalStatus, Repository};
use equity_ledger::domain::{address_hex, CompanyId};
use equity_ledger::error::{DomainError, TxStatus};
use equity_ledger::gateway::{LedgerQueryGateway, LedgerTransactionGateway, WriteOperation};
use equity_ledger::ledger::{LedgerClient, LedgerError, MockLedger, Receipt};
use ethers::types::{Address, Bytes, H256, U256};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    ledger: Arc<MockLedger>,
    tx: LedgerTransactionGateway,
    query: LedgerQueryGateway,
    repo: Arc<Repository>,
    _temp: TempDir,
}

fn registry() -> Address {
    Address::repeat_byte(0xee)
}

fn signer() -> Address {
    Address::repeat_byte(0x0e)
}

fn finalization() -> FinalizationConfig {
    FinalizationConfig {
        timeout: Duration::from_millis(60),
        poll_interval: Duration::from_millis(5),
    }
}

async fn journal() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("journal.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (pool, temp_dir)
}

fn funded_ledger() -> Arc<MockLedger> {
    let usdc = U256::from(1_000_000u64) * U256::exp10(6);
    Arc::new(MockLedger::new(registry()).with_usdc(signer(), usdc, usdc))
}

async fn setup_with(ledger: MockLedger) -> Harness {
    let (pool, temp_dir) = journal().await;
    let repo = Arc::new(Repository::new(pool));
    let ledger = Arc::new(ledger);
    let numeric = NumericConfig::default();
    let tx = LedgerTransactionGateway::new(
        ledger.clone(),
        registry(),
        signer(),
        numeric,
        finalization(),
        repo.clone(),
    );
    let query = LedgerQueryGateway::new(ledger.clone(), registry(), numeric);
    Harness {
        ledger,
        tx,
        query,
        repo,
        _temp: temp_dir,
    }
}

async fn setup() -> Harness {
    let usdc = U256::from(1_000_000u64) * U256::exp10(6);
    setup_with(MockLedger::new(registry()).with_usdc(signer(), usdc, usdc)).await
}

fn company(id: u64) -> CompanyId {
    CompanyId::new(U256::from(id))
}

async fn issue(h: &Harness, id: u64) -> Address {
    h.tx
        .submit_valuation(company(id), "1000000", "10", signer())
        .await
        .unwrap();
    let outcome = h.tx.create_asset(company(id), "Acme", "ACM").await.unwrap();
    outcome.asset_created.expect("AssetCreated decoded").asset
}

#[tokio::test]
async fn test_create_asset_decodes_event_and_derives_supply() {
    let h = setup().await;
    h.tx.submit_valuation(company(1), "1000000", "10", signer())
        .await
        .unwrap();
    let outcome = h.tx.create_asset(company(1), "Acme", "ACM").await.unwrap();

    assert_eq!(outcome.operation, WriteOperation::CreateAsset);
    assert!(!outcome.derived_identifier_unavailable);
    let event = outcome.asset_created.unwrap();
    assert_eq!(event.company_id, company(1));
    assert_eq!(event.max_supply, U256::from(100_000u64) * U256::exp10(18));

    let details = h.query.fetch_asset_details(event.asset).await.unwrap();
    assert_eq!(details.max_supply.to_string(), "100000");
    assert!(!details.trading_active);
}

#[tokio::test]
async fn test_missing_event_sets_flag_without_failing() {
    let h = setup().await;
    h.tx.submit_valuation(company(1), "1000000", "10", signer())
        .await
        .unwrap();
    h.ledger.omit_logs(true);
    let outcome = h.tx.create_asset(company(1), "Acme", "ACM").await.unwrap();
    assert!(outcome.asset_created.is_none());
    assert!(outcome.derived_identifier_unavailable);
}

#[tokio::test]
async fn test_revert_maps_to_domain_error_and_leaves_no_journal_row() {
    let h = setup().await;
    let asset = issue(&h, 1).await;

    let err = h.tx.unpause(asset).await.unwrap_err();
    assert_eq!(err, DomainError::NotPaused);
    h.tx.pause(asset).await.unwrap();
    assert_eq!(h.tx.pause(asset).await.unwrap_err(), DomainError::AlreadyPaused);

    let rows = h.repo.entries_for_target(&address_hex(&asset)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, JournalStatus::Confirmed);
}

#[tokio::test]
async fn test_buy_and_sell_settle_through_fees() {
    let h = setup().await;
    let asset = issue(&h, 1).await;
    h.tx.activate_trading(asset).await.unwrap();

    h.tx.buy(asset, "1000").await.unwrap();
    let holding = h.query.fetch_user_holding(asset, signer()).await.unwrap();
    assert_eq!(holding.balance.to_string(), "99");
    assert_eq!(holding.total_fees_paid.to_string(), "10");

    h.tx.sell(asset, "9").await.unwrap();
    let holding = h.query.fetch_user_holding(asset, signer()).await.unwrap();
    assert_eq!(holding.balance.to_string(), "90");

    let details = h.query.fetch_asset_details(asset).await.unwrap();
    assert!(!details.collected_fees.is_zero());
    h.tx.withdraw_fees(asset).await.unwrap();
    assert_eq!(
        h.tx.withdraw_fees(asset).await.unwrap_err(),
        DomainError::NoFeesToWithdraw
    );
}

#[tokio::test]
async fn test_validation_happens_before_io() {
    let h = setup().await;
    let asset = Address::repeat_byte(0xa5);

    let err = h.tx.buy(asset, "1e5").await.unwrap_err();
    assert_eq!(err.kind(), "MalformedAmount");
    let err = h.tx.update_fee_rates(asset, "60", "1").await.unwrap_err();
    assert_eq!(err.kind(), "OutOfRange");
    let err = h.tx.update_price(asset, "0").await.unwrap_err();
    assert_eq!(err.kind(), "OutOfRange");
    let err = h.tx.create_asset(company(1), " ", "ACM").await.unwrap_err();
    assert_eq!(err.kind(), "OutOfRange");

    assert_eq!(h.ledger.io_count(), 0);
}

#[tokio::test]
async fn test_transport_failure_at_submission_is_rejected() {
    let h = setup().await;
    h.ledger
        .fail_next_send(LedgerError::NetworkError("connection refused".into()));
    let err = h
        .tx
        .submit_valuation(company(1), "100", "1", signer())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::TransactionFailed {
            status: TxStatus::Rejected,
            tx_hash: None
        }
    );
    assert_eq!(h.ledger.send_count(), 1);
    assert!(h.repo.in_flight_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_zero_receipt_is_reverted() {
    let h = setup().await;
    let asset = issue(&h, 1).await;
    h.ledger.fail_on_finalize(true);
    let err = h.tx.activate_trading(asset).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::TransactionFailed {
            status: TxStatus::Reverted,
            tx_hash: Some(_)
        }
    ));
    h.ledger.fail_on_finalize(false);
    let status = h.query.fetch_trading_status(asset).await.unwrap();
    assert!(!status.trading_active);
}

#[tokio::test]
async fn test_timeout_blocks_identical_write_until_reconciled() {
    let h = setup().await;
    let asset = issue(&h, 1).await;

    h.ledger.withhold_receipts(true);
    let err = h.tx.activate_trading(asset).await.unwrap_err();
    let DomainError::TransactionFailed {
        status: TxStatus::Timeout,
        tx_hash: Some(hash),
    } = err
    else {
        panic!("expected timeout, got {:?}", err);
    };
    assert!(h
        .tx
        .write_in_flight(WriteOperation::ActivateTrading, asset)
        .await
        .unwrap());

    let sends = h.ledger.send_count();
    let err = h.tx.activate_trading(asset).await.unwrap_err();
    assert_eq!(
        err,
        DomainError::WriteInFlight {
            operation: "activate_trading".into(),
            tx_hash: hash.clone(),
        }
    );
    assert_eq!(h.ledger.send_count(), sends);

    // Still unresolved while the receipt is withheld.
    assert!(h.tx.reconcile_pending().await.unwrap().is_empty());

    h.ledger.release_receipts();
    let resolved = h.tx.reconcile_pending().await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].tx_hash, hash);
    assert_eq!(resolved[0].status, "confirmed");
    assert!(h
        .tx
        .write_confirmed(WriteOperation::ActivateTrading, asset)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_company_withdraw_pays_the_company() {
    let h = setup().await;
    let asset = issue(&h, 1).await;
    h.tx.activate_trading(asset).await.unwrap();
    h.tx.buy(asset, "1000").await.unwrap();

    let before = h.ledger.usdc_balance(signer());
    h.tx.company_withdraw(asset, "500").await.unwrap();
    assert_eq!(
        h.ledger.usdc_balance(signer()),
        before + U256::from(500u64) * U256::exp10(6)
    );
    let err = h.tx.company_withdraw(asset, "10000").await.unwrap_err();
    assert_eq!(err, DomainError::InsufficientBalance);
}

/// Receipt lookups never answer while `hang` is set.
#[derive(Debug)]
struct HangingReceipts {
    inner: Arc<MockLedger>,
    hang: AtomicBool,
}

#[async_trait]
impl LedgerClient for HangingReceipts {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        self.inner.call(to, data).await
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, LedgerError> {
        self.inner.send_transaction(from, to, data).await
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, LedgerError> {
        if self.hang.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.inner.transaction_receipt(tx_hash).await
    }
}

#[tokio::test]
async fn test_hung_receipt_lookup_times_out_and_releases_writes() {
    let ledger = funded_ledger();
    let client = Arc::new(HangingReceipts {
        inner: ledger.clone(),
        hang: AtomicBool::new(true),
    });
    let (pool, _temp) = journal().await;
    let repo = Arc::new(Repository::new(pool));
    let tx = LedgerTransactionGateway::new(
        client.clone(),
        registry(),
        signer(),
        NumericConfig::default(),
        finalization(),
        repo.clone(),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        tx.submit_valuation(company(1), "1000000", "10", signer()),
    )
    .await
    .expect("write must not outlive the finalization timeout");
    assert!(matches!(
        result,
        Err(DomainError::TransactionFailed {
            status: TxStatus::Timeout,
            tx_hash: Some(_)
        })
    ));
    assert_eq!(repo.in_flight_entries().await.unwrap().len(), 1);

    client.hang.store(false, Ordering::SeqCst);
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        tx.submit_valuation(company(2), "1000000", "10", signer()),
    )
    .await
    .expect("write lock released after the timeout");
    assert!(outcome.is_ok());
}

/// Drops the journal table right after the ledger accepts a write.
#[derive(Debug)]
struct JournalLostAfterSend {
    inner: Arc<MockLedger>,
    pool: SqlitePool,
}

#[async_trait]
impl LedgerClient for JournalLostAfterSend {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        self.inner.call(to, data).await
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<H256, LedgerError> {
        let hash = self.inner.send_transaction(from, to, data).await?;
        sqlx::query("DROP TABLE write_journal")
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::NetworkError(e.to_string()))?;
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<Receipt>, LedgerError> {
        self.inner.transaction_receipt(tx_hash).await
    }
}

#[tokio::test]
async fn test_journal_failure_after_send_reports_real_outcome() {
    let ledger = funded_ledger();
    let (pool, _temp) = journal().await;
    let client = Arc::new(JournalLostAfterSend {
        inner: ledger.clone(),
        pool: pool.clone(),
    });
    let tx = LedgerTransactionGateway::new(
        client,
        registry(),
        signer(),
        NumericConfig::default(),
        finalization(),
        Arc::new(Repository::new(pool)),
    );

    let outcome = tx
        .submit_valuation(company(1), "1000000", "10", signer())
        .await
        .unwrap();
    assert_eq!(outcome.operation, WriteOperation::SubmitValuation);

    let query = LedgerQueryGateway::new(ledger.clone(), registry(), NumericConfig::default());
    assert!(query.fetch_company_valuation(company(1)).await.unwrap().exists);
}
