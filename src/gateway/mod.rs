//! Typed gateways in front of the ledger.
//!
//! - `query` - read-only calls, identifier validation, display views
//! - `transaction` - state-changing writes, finalization and revert mapping
//! - `views` - codec-rendered display forms of ledger records

pub mod query;
pub mod transaction;
pub mod views;

pub use query::LedgerQueryGateway;
pub use transaction::{LedgerTransactionGateway, ReconciledWrite, TransactionOutcome, WriteOperation};
pub use views::{
    AssetDetailsView, CompanyValuationView, PlatformSnapshotView, TradingStatsView,
    TradingStatusView, TransactionOutcomeView, UserHoldingView,
};
